//! CLI definition and dispatch.

use clap::{Args, Parser, Subcommand};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing::{info, warn};

use crate::adapters::csv_adapter::CsvAdapter;
use crate::adapters::file_config_adapter::FileConfigAdapter;
use crate::adapters::sector_file_adapter::SectorFileAdapter;
use crate::adapters::snapshot_csv_adapter::SnapshotCsvAdapter;
use crate::domain::config_validation::{
    parse_session_time, validate_selection_config, validate_session_minutes,
};
use crate::domain::error::SelectorError;
use crate::domain::filter::{FilterThresholds, ThresholdOverrides};
use crate::domain::metrics::{ExtensionMetric, MetricConfig};
use crate::domain::scoring::{ScoringWeights, EXTENSION_PREFIX};
use crate::domain::selection::{HysteresisConfig, SectorCapConfig, UniverseSettings};
use crate::domain::service::{
    SelectionConfig, SelectionRequest, UniverseSelectionResult, UniverseSelectionService,
};
use crate::ports::config_port::ConfigPort;
use crate::ports::market_data_port::MarketDataConnector;
use crate::ports::report_port::ReportPort;
use crate::ports::sector_port::SectorLookup;
use crate::ports::selection_store_port::SelectionStore;
use crate::ports::symbol_directory_port::SymbolDirectory;

#[derive(Parser, Debug)]
#[command(name = "uniselect", about = "Trading universe selection")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run one selection cycle
    Select {
        #[arg(short, long)]
        config: PathBuf,
        #[arg(short, long)]
        market: Option<String>,
        /// Comma-separated candidate list (bypasses the symbol directory)
        #[arg(long)]
        symbols: Option<String>,
        /// Comma-separated previous Core (defaults to the persisted one)
        #[arg(long)]
        previous: Option<String>,
        /// Write the audit snapshot as CSV
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// Store the new Core and snapshot
        #[arg(long)]
        persist: bool,
        #[command(flatten)]
        overrides: OverrideArgs,
    },
    /// List candidate symbols for a market
    ListSymbols {
        #[arg(short, long)]
        config: PathBuf,
        #[arg(short, long)]
        market: Option<String>,
    },
    /// Validate a configuration file
    Validate {
        #[arg(short, long)]
        config: PathBuf,
    },
    /// Print the most recently persisted Core
    ShowCore {
        #[arg(short, long)]
        config: PathBuf,
        #[arg(short, long)]
        market: Option<String>,
    },
}

/// Per-run hard-filter threshold overrides.
#[derive(Args, Debug, Default, Clone)]
pub struct OverrideArgs {
    #[arg(long, value_parser = parse_threshold)]
    pub adv_min: Option<f64>,
    #[arg(long, value_parser = parse_threshold)]
    pub price_min: Option<f64>,
    #[arg(long, value_parser = parse_threshold)]
    pub price_max: Option<f64>,
    #[arg(long, value_parser = parse_threshold)]
    pub atr_pct_min: Option<f64>,
    #[arg(long, value_parser = parse_threshold)]
    pub atr_pct_max: Option<f64>,
    #[arg(long, value_parser = parse_threshold)]
    pub zero_volume_ratio_max: Option<f64>,
}

/// Finite, non-negative float for a threshold flag.
pub fn parse_threshold(value: &str) -> Result<f64, String> {
    let v: f64 = value
        .trim()
        .parse()
        .map_err(|e| format!("'{value}' is not a number: {e}"))?;
    if v.is_finite() && v >= 0.0 {
        Ok(v)
    } else {
        Err(format!("'{value}' must be a finite, non-negative number"))
    }
}

impl From<OverrideArgs> for ThresholdOverrides {
    fn from(args: OverrideArgs) -> Self {
        ThresholdOverrides {
            adv_min: args.adv_min,
            price_min: args.price_min,
            price_max: args.price_max,
            atr_pct_min: args.atr_pct_min,
            atr_pct_max: args.atr_pct_max,
            zero_volume_ratio_max: args.zero_volume_ratio_max,
        }
    }
}

pub fn run(cli: Cli) -> ExitCode {
    let outcome = match cli.command {
        Command::Select {
            config,
            market,
            symbols,
            previous,
            output,
            persist,
            overrides,
        } => run_select(
            &config,
            market.as_deref(),
            symbols.as_deref(),
            previous.as_deref(),
            output.as_deref(),
            persist,
            overrides.into(),
        ),
        Command::ListSymbols { config, market } => run_list_symbols(&config, market.as_deref()),
        Command::Validate { config } => run_validate(&config),
        Command::ShowCore { config, market } => run_show_core(&config, market.as_deref()),
    };

    match outcome {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e}");
            (&e).into()
        }
    }
}

pub fn load_config(path: &Path) -> Result<FileConfigAdapter, SelectorError> {
    FileConfigAdapter::from_file(path)
}

pub fn build_metric_config(config: &dyn ConfigPort) -> Result<MetricConfig, SelectorError> {
    let defaults = MetricConfig::default();
    let session_close = match config.get_string("metrics", "session_close") {
        Some(s) => parse_session_time(&s).ok_or_else(|| {
            SelectorError::invalid("metrics", "session_close", "expected HH:MM")
        })?,
        None => defaults.session_close,
    };
    let close_window_minutes =
        config.get_int("metrics", "close_window_minutes", defaults.close_window_minutes);
    validate_session_minutes("close_window_minutes", close_window_minutes)?;
    let opening_range_minutes =
        config.get_int("metrics", "opening_range_minutes", defaults.opening_range_minutes);
    validate_session_minutes("opening_range_minutes", opening_range_minutes)?;

    Ok(MetricConfig {
        target_atr_pct: config.get_double("metrics", "target_atr_pct", defaults.target_atr_pct),
        atr_tolerance: config.get_double("metrics", "atr_tolerance", defaults.atr_tolerance),
        ranking_pool_size: config.get_usize(
            "metrics",
            "ranking_pool_size",
            defaults.ranking_pool_size,
        ),
        close_volume_window_days: config.get_usize(
            "metrics",
            "close_volume_window_days",
            defaults.close_volume_window_days,
        ),
        session_close,
        close_window_minutes,
        opening_range_minutes,
        enable_efficiency_ratio: config.get_bool("metrics", "enable_efficiency_ratio", false),
        enable_orb_follow_through: config.get_bool("metrics", "enable_orb_follow_through", false),
        enable_vwap_persistence: config.get_bool("metrics", "enable_vwap_persistence", false),
    })
}

pub fn build_thresholds(config: &dyn ConfigPort) -> FilterThresholds {
    let d = FilterThresholds::default();
    FilterThresholds {
        adv_min: config.get_double("thresholds", "adv_min", d.adv_min),
        price_min: config.get_double("thresholds", "price_min", d.price_min),
        price_max: config.get_double("thresholds", "price_max", d.price_max),
        atr_pct_min: config.get_double("thresholds", "atr_pct_min", d.atr_pct_min),
        atr_pct_max: config.get_double("thresholds", "atr_pct_max", d.atr_pct_max),
        zero_volume_ratio_max: config.get_double(
            "thresholds",
            "zero_volume_ratio_max",
            d.zero_volume_ratio_max,
        ),
    }
}

pub fn build_weights(config: &dyn ConfigPort) -> ScoringWeights {
    let d = ScoringWeights::default();
    let mut extra = BTreeMap::new();
    for ext in ExtensionMetric::ALL {
        let key = format!("{EXTENSION_PREFIX}{}", ext.name());
        let weight = config.get_double("weights", &key, 0.0);
        if weight != 0.0 {
            extra.insert(ext.name().to_string(), weight);
        }
    }

    ScoringWeights {
        liquidity: config.get_double("weights", "liquidity", d.liquidity),
        volatility: config.get_double("weights", "volatility", d.volatility),
        cost: config.get_double("weights", "cost", d.cost),
        close_liquidity: config.get_double("weights", "close_liquidity", d.close_liquidity),
        zero_volume: config.get_double("weights", "zero_volume", d.zero_volume),
        extra,
    }
}

pub fn build_universe_settings(config: &dyn ConfigPort) -> UniverseSettings {
    let d = UniverseSettings::default();
    UniverseSettings {
        core_size: config.get_usize("universe", "core_size", d.core_size),
        bench_size: config.get_usize("universe", "bench_size", d.bench_size),
        hysteresis: HysteresisConfig {
            maintain_rank_max: config.get_usize(
                "universe",
                "maintain_rank_max",
                d.hysteresis.maintain_rank_max,
            ),
            add_rank_max: config.get_usize("universe", "add_rank_max", d.hysteresis.add_rank_max),
        },
        sector_cap: SectorCapConfig {
            max_ratio: config.get_double("universe", "sector_max_ratio", d.sector_cap.max_ratio),
            sector_map: config
                .get_string("universe", "sector_map")
                .filter(|s| !s.trim().is_empty()),
        },
    }
}

pub fn build_selection_config(config: &dyn ConfigPort) -> Result<SelectionConfig, SelectorError> {
    Ok(SelectionConfig {
        metrics: build_metric_config(config)?,
        thresholds: build_thresholds(config),
        weights: build_weights(config),
        universe: build_universe_settings(config),
    })
}

pub fn resolve_market(
    market_override: Option<&str>,
    config: &dyn ConfigPort,
) -> Result<String, SelectorError> {
    market_override
        .map(str::to_string)
        .or_else(|| config.get_string("data", "market"))
        .map(|m| m.trim().to_string())
        .filter(|m| !m.is_empty())
        .ok_or_else(|| SelectorError::ConfigMissing {
            section: "data".into(),
            key: "market".into(),
        })
}

/// Split a comma-separated symbol list, dropping blanks.
pub fn parse_symbol_list(list: &str) -> Vec<String> {
    list.split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

/// Market data, directory and (optionally) selection history behind one
/// configured source.
pub enum Backend {
    Csv(CsvAdapter),
    #[cfg(feature = "sqlite")]
    Sqlite(crate::adapters::sqlite_adapter::SqliteAdapter),
}

impl Backend {
    pub fn open(config: &dyn ConfigPort, market: &str) -> Result<Self, SelectorError> {
        let source = config
            .get_string("data", "source")
            .unwrap_or_else(|| "sqlite".to_string());
        match source.trim() {
            "csv" => {
                let dir = config
                    .get_string("csv", "dir")
                    .ok_or_else(|| SelectorError::ConfigMissing {
                        section: "csv".into(),
                        key: "dir".into(),
                    })?;
                Ok(Backend::Csv(CsvAdapter::new(PathBuf::from(dir), market)))
            }
            #[cfg(feature = "sqlite")]
            "sqlite" => {
                let adapter =
                    crate::adapters::sqlite_adapter::SqliteAdapter::from_config(config, market)?;
                adapter.initialize_schema()?;
                Ok(Backend::Sqlite(adapter))
            }
            #[cfg(not(feature = "sqlite"))]
            "sqlite" => Err(SelectorError::invalid(
                "data",
                "source",
                "sqlite feature is not enabled in this build",
            )),
            other => Err(SelectorError::invalid(
                "data",
                "source",
                format!("unknown source '{other}'"),
            )),
        }
    }

    pub fn connector(&self) -> &dyn MarketDataConnector {
        match self {
            Backend::Csv(a) => a,
            #[cfg(feature = "sqlite")]
            Backend::Sqlite(a) => a,
        }
    }

    pub fn directory(&self) -> &dyn SymbolDirectory {
        match self {
            Backend::Csv(a) => a,
            #[cfg(feature = "sqlite")]
            Backend::Sqlite(a) => a,
        }
    }

    pub fn store(&self) -> Option<&dyn SelectionStore> {
        match self {
            Backend::Csv(_) => None,
            #[cfg(feature = "sqlite")]
            Backend::Sqlite(a) => Some(a),
        }
    }
}

fn require_store(backend: &Backend) -> Result<&dyn SelectionStore, SelectorError> {
    backend.store().ok_or_else(|| {
        SelectorError::invalid("data", "source", "selection history requires the sqlite source")
    })
}

/// Collaborators for one selection cycle, as wired by the CLI.
pub struct SelectionPipeline<'a> {
    pub connector: &'a dyn MarketDataConnector,
    pub directory: &'a dyn SymbolDirectory,
    pub sectors: &'a dyn SectorLookup,
    pub store: Option<&'a dyn SelectionStore>,
    pub report: &'a dyn ReportPort,
}

/// Options taken from the command line for one `select` run.
#[derive(Debug, Default, Clone)]
pub struct SelectOptions {
    pub symbols: Option<Vec<String>>,
    pub previous: Option<Vec<String>>,
    pub output: Option<String>,
    pub persist: bool,
    pub overrides: ThresholdOverrides,
}

pub fn run_selection_pipeline(
    pipeline: &SelectionPipeline,
    config: SelectionConfig,
    market: &str,
    options: SelectOptions,
) -> Result<UniverseSelectionResult, SelectorError> {
    let previous_core = match (options.previous, pipeline.store) {
        (Some(list), _) => list,
        (None, Some(store)) => store.load_previous_core(market)?,
        (None, None) => Vec::new(),
    };

    let request = match options.symbols {
        Some(symbols) => SelectionRequest::from_symbols(market, symbols),
        None => SelectionRequest::from_directory(market),
    }
    .with_previous_core(previous_core)
    .with_overrides(options.overrides);

    let service = UniverseSelectionService::new(
        pipeline.connector,
        pipeline.directory,
        pipeline.sectors,
        config,
    );
    let result = service.run(&request)?;

    if let Some(path) = options.output.as_deref() {
        pipeline.report.write(&result, path)?;
    }

    if options.persist {
        let store = pipeline.store.ok_or_else(|| {
            SelectorError::invalid("data", "source", "--persist requires the sqlite source")
        })?;
        store.save_selection(market, chrono::Local::now().naive_local(), &result)?;
    }

    Ok(result)
}

pub fn print_selection(result: &UniverseSelectionResult) {
    println!("core ({}): {}", result.core.len(), result.core.join(","));
    println!("bench ({}): {}", result.bench.len(), result.bench.join(","));
    if !result.relaxed_core.is_empty() || !result.relaxed_bench.is_empty() {
        warn!(
            core = %result.relaxed_core.join(","),
            bench = %result.relaxed_bench.join(","),
            "sector cap relaxed to fill the universe"
        );
    }
    info!(
        total = result.total_symbols,
        with_metrics = result.metric_symbols,
        filtered = result.filtered_symbols,
        core = result.core.len(),
        bench = result.bench.len(),
        "selection summary"
    );
}

fn run_select(
    config_path: &Path,
    market_override: Option<&str>,
    symbols: Option<&str>,
    previous: Option<&str>,
    output: Option<&Path>,
    persist: bool,
    overrides: ThresholdOverrides,
) -> Result<(), SelectorError> {
    info!(path = %config_path.display(), "loading config");
    let adapter = load_config(config_path)?;
    validate_selection_config(&adapter)?;

    let market = resolve_market(market_override, &adapter)?;
    let selection_config = build_selection_config(&adapter)?;
    let backend = Backend::open(&adapter, &market)?;

    let pipeline = SelectionPipeline {
        connector: backend.connector(),
        directory: backend.directory(),
        sectors: &SectorFileAdapter,
        store: backend.store(),
        report: &SnapshotCsvAdapter,
    };
    let options = SelectOptions {
        symbols: symbols.map(parse_symbol_list),
        previous: previous.map(parse_symbol_list),
        output: output.map(|p| p.display().to_string()),
        persist,
        overrides,
    };

    let result = run_selection_pipeline(&pipeline, selection_config, &market, options)?;
    print_selection(&result);
    Ok(())
}

fn run_list_symbols(config_path: &Path, market_override: Option<&str>) -> Result<(), SelectorError> {
    let adapter = load_config(config_path)?;
    let market = resolve_market(market_override, &adapter)?;
    let backend = Backend::open(&adapter, &market)?;

    let symbols = backend.directory().load_symbols(&market);
    if symbols.is_empty() {
        eprintln!("No symbols found for market {}", market);
    } else {
        for symbol in &symbols {
            println!("{}", symbol);
        }
        eprintln!("{} symbols found", symbols.len());
    }
    Ok(())
}

fn run_validate(config_path: &Path) -> Result<(), SelectorError> {
    eprintln!("Validating config: {}", config_path.display());
    let adapter = load_config(config_path)?;
    validate_selection_config(&adapter)?;
    let config = build_selection_config(&adapter)?;

    let u = &config.universe;
    eprintln!(
        "core_size={} bench_size={} maintain_rank_max={} add_rank_max={} sector_max_ratio={}",
        u.core_size,
        u.bench_size,
        u.hysteresis.maintain_rank_max,
        u.hysteresis.add_rank_max,
        u.sector_cap.max_ratio
    );
    let extensions: Vec<&str> = config
        .metrics
        .enabled_extensions()
        .into_iter()
        .map(ExtensionMetric::name)
        .collect();
    if !extensions.is_empty() {
        eprintln!("extensions: {}", extensions.join(", "));
    }
    println!("configuration OK");
    Ok(())
}

fn run_show_core(config_path: &Path, market_override: Option<&str>) -> Result<(), SelectorError> {
    let adapter = load_config(config_path)?;
    let market = resolve_market(market_override, &adapter)?;
    let backend = Backend::open(&adapter, &market)?;
    let store = require_store(&backend)?;

    let core = store.load_previous_core(&market)?;
    if core.is_empty() {
        eprintln!("No persisted Core for market {}", market);
    }
    for (i, symbol) in core.iter().enumerate() {
        println!("{:>3} {}", i + 1, symbol);
    }
    Ok(())
}
