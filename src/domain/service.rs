//! Selection cycle orchestration.
//!
//! Resolves candidates, then runs metrics → hard filter → scoring →
//! selection while holding a market-data session, and assembles the result
//! with its audit snapshot. Any empty stage fails the cycle.

use crate::domain::error::SelectorError;
use crate::domain::filter::{apply_hard_filter, FilterThresholds, ThresholdOverrides};
use crate::domain::metrics::{MetricConfig, MetricsCalculator};
use crate::domain::scoring::{score_symbols, ScoreBreakdown, ScoringWeights};
use crate::domain::selection::{rank_by_score, select_universe, UniverseSettings};
use crate::domain::snapshot::{build_snapshot, SnapshotRow};
use crate::ports::market_data_port::{MarketDataConnector, MarketDataSession};
use crate::ports::sector_port::SectorLookup;
use crate::ports::symbol_directory_port::SymbolDirectory;
use std::collections::{BTreeMap, HashMap, HashSet};
use tracing::{info, info_span};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CandidateSource {
    ExplicitList,
    Directory,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SelectionRequest {
    pub candidate_source: CandidateSource,
    pub market: String,
    /// Takes precedence over the directory when present.
    pub explicit_symbols: Option<Vec<String>>,
    pub previous_core: Vec<String>,
    pub threshold_overrides: ThresholdOverrides,
}

impl SelectionRequest {
    pub fn from_directory(market: &str) -> Self {
        Self {
            candidate_source: CandidateSource::Directory,
            market: market.to_string(),
            explicit_symbols: None,
            previous_core: Vec::new(),
            threshold_overrides: ThresholdOverrides::default(),
        }
    }

    pub fn from_symbols(market: &str, symbols: Vec<String>) -> Self {
        Self {
            candidate_source: CandidateSource::ExplicitList,
            explicit_symbols: Some(symbols),
            ..Self::from_directory(market)
        }
    }

    pub fn with_previous_core(mut self, previous_core: Vec<String>) -> Self {
        self.previous_core = previous_core;
        self
    }

    pub fn with_overrides(mut self, overrides: ThresholdOverrides) -> Self {
        self.threshold_overrides = overrides;
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SelectionConfig {
    pub metrics: MetricConfig,
    pub thresholds: FilterThresholds,
    pub weights: ScoringWeights,
    pub universe: UniverseSettings,
}

#[derive(Debug, Clone, PartialEq)]
pub struct UniverseSelectionResult {
    /// Admission order, see [`Selection::core`](crate::domain::selection::Selection::core).
    pub core: Vec<String>,
    pub bench: Vec<String>,
    pub scores: BTreeMap<String, f64>,
    pub breakdown: BTreeMap<String, ScoreBreakdown>,
    pub snapshot_rows: Vec<SnapshotRow>,
    pub total_symbols: usize,
    /// Symbols that came out of the metrics stage complete.
    pub metric_symbols: usize,
    pub filtered_symbols: usize,
    pub relaxed_core: Vec<String>,
    pub relaxed_bench: Vec<String>,
}

pub struct UniverseSelectionService<'a> {
    connector: &'a dyn MarketDataConnector,
    directory: &'a dyn SymbolDirectory,
    sectors: &'a dyn SectorLookup,
    config: SelectionConfig,
}

impl<'a> UniverseSelectionService<'a> {
    pub fn new(
        connector: &'a dyn MarketDataConnector,
        directory: &'a dyn SymbolDirectory,
        sectors: &'a dyn SectorLookup,
        config: SelectionConfig,
    ) -> Self {
        Self {
            connector,
            directory,
            sectors,
            config,
        }
    }

    /// Candidate list for `request`: trimmed, de-duplicated, in source order.
    pub fn resolve_candidates(
        &self,
        request: &SelectionRequest,
    ) -> Result<Vec<String>, SelectorError> {
        let raw = match (&request.explicit_symbols, request.candidate_source) {
            (Some(symbols), _) => symbols.clone(),
            (None, CandidateSource::Directory) => self.directory.load_symbols(&request.market),
            (None, CandidateSource::ExplicitList) => return Err(SelectorError::MisconfiguredSource),
        };

        let mut seen = HashSet::new();
        let symbols: Vec<String> = raw
            .into_iter()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty() && seen.insert(s.clone()))
            .collect();

        if symbols.is_empty() {
            return Err(SelectorError::NoCandidates {
                market: request.market.clone(),
            });
        }
        Ok(symbols)
    }

    fn load_sectors(&self) -> HashMap<String, String> {
        match self.config.universe.sector_cap.sector_map.as_deref() {
            Some(locator) => self.sectors.load_sector_map(locator),
            None => HashMap::new(),
        }
    }

    pub fn run(&self, request: &SelectionRequest) -> Result<UniverseSelectionResult, SelectorError> {
        let span = info_span!("selection", market = %request.market);
        let _guard = span.enter();

        let candidates = self.resolve_candidates(request)?;
        let thresholds = request.threshold_overrides.apply(&self.config.thresholds);
        let sectors = self.load_sectors();
        info!(
            candidates = candidates.len(),
            sectors = sectors.len(),
            previous_core = request.previous_core.len(),
            "starting selection cycle"
        );

        let session = MarketDataSession::open(self.connector)?;

        let metrics = MetricsCalculator::new(session.port(), &self.config.metrics)
            .calculate(&candidates)?;

        let filtered = apply_hard_filter(&metrics, &thresholds);
        info!(
            total = candidates.len(),
            with_metrics = metrics.len(),
            filtered = filtered.len(),
            "hard filter applied"
        );
        if filtered.is_empty() {
            return Err(SelectorError::AllFilteredOut {
                market: request.market.clone(),
                total: candidates.len(),
                with_metrics: metrics.len(),
            });
        }

        let breakdown = score_symbols(&filtered, &self.config.weights, &self.config.metrics);
        let scores: BTreeMap<String, f64> = breakdown
            .iter()
            .map(|(s, b)| (s.clone(), b.total))
            .collect();

        let ranking = rank_by_score(&scores);
        let selection = select_universe(
            &ranking,
            &request.previous_core,
            &sectors,
            &self.config.universe,
        );
        let snapshot_rows = build_snapshot(&ranking, &filtered, &breakdown, &selection);

        drop(session);

        info!(
            core = selection.core.len(),
            bench = selection.bench.len(),
            relaxed = selection.relaxed_core.len() + selection.relaxed_bench.len(),
            "selection cycle complete"
        );

        Ok(UniverseSelectionResult {
            core: selection.core,
            bench: selection.bench,
            scores,
            breakdown,
            snapshot_rows,
            total_symbols: candidates.len(),
            metric_symbols: metrics.len(),
            filtered_symbols: filtered.len(),
            relaxed_core: selection.relaxed_core,
            relaxed_bench: selection.relaxed_bench,
        })
    }
}
