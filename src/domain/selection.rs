//! Core / Bench partition with sector caps and hysteresis.
//!
//! Selection walks the score-descending ranking greedily:
//!
//! 1. hysteresis: incumbents ranked inside `maintain_rank_max` go first;
//! 2. fill: remaining names, new entrants only inside `add_rank_max`;
//! 3. relaxation: if Core is still short, the sector cap is dropped;
//! 4. bench: a plain sector-capped walk over what Core left behind.
//!
//! Admissions made by relaxation are reported, never silent.

use crate::ports::sector_port::UNKNOWN_SECTOR;
use std::collections::{BTreeMap, HashMap, HashSet};
use tracing::warn;

#[derive(Debug, Clone, PartialEq)]
pub struct HysteresisConfig {
    /// Incumbents ranked strictly better than this keep their seat first.
    pub maintain_rank_max: usize,
    /// New entrants must rank strictly better than this.
    pub add_rank_max: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SectorCapConfig {
    pub max_ratio: f64,
    /// Where the sector classification is loaded from.
    pub sector_map: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct UniverseSettings {
    pub core_size: usize,
    pub bench_size: usize,
    pub hysteresis: HysteresisConfig,
    pub sector_cap: SectorCapConfig,
}

impl Default for UniverseSettings {
    fn default() -> Self {
        Self {
            core_size: 20,
            bench_size: 10,
            hysteresis: HysteresisConfig {
                maintain_rank_max: 30,
                add_rank_max: 20,
            },
            sector_cap: SectorCapConfig {
                max_ratio: 0.3,
                sector_map: None,
            },
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Selection {
    /// In admission order: incumbents held by hysteresis, then the normal
    /// fill, then members admitted past a full sector. Within each pass the
    /// order is rank order, so a held incumbent can precede a better-ranked
    /// newcomer.
    pub core: Vec<String>,
    /// Rank order.
    pub bench: Vec<String>,
    /// Core members admitted past a full sector.
    pub relaxed_core: Vec<String>,
    /// Bench members admitted past a full sector.
    pub relaxed_bench: Vec<String>,
}

/// `max(1, floor(size × ratio))`
pub fn max_per_sector(size: usize, max_ratio: f64) -> usize {
    let cap = (size as f64 * max_ratio).floor();
    if cap.is_finite() && cap >= 1.0 {
        cap as usize
    } else {
        1
    }
}

/// Symbols by score descending, ties by symbol ascending.
pub fn rank_by_score(scores: &BTreeMap<String, f64>) -> Vec<String> {
    let mut ranked: Vec<(&String, f64)> = scores.iter().map(|(s, v)| (s, *v)).collect();
    ranked.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| a.0.cmp(b.0)));
    ranked.into_iter().map(|(s, _)| s.clone()).collect()
}

pub fn sector_of<'a>(sectors: &'a HashMap<String, String>, symbol: &str) -> &'a str {
    sectors
        .get(symbol)
        .map(|s| s.as_str())
        .unwrap_or(UNKNOWN_SECTOR)
}

/// Greedy bookkeeping for one tier.
struct Tier<'a> {
    size: usize,
    cap: usize,
    sectors: &'a HashMap<String, String>,
    picked: Vec<String>,
    counts: HashMap<&'a str, usize>,
    relaxed: Vec<String>,
}

impl<'a> Tier<'a> {
    fn new(size: usize, max_ratio: f64, sectors: &'a HashMap<String, String>) -> Self {
        Self {
            size,
            cap: max_per_sector(size, max_ratio),
            sectors,
            picked: Vec::with_capacity(size),
            counts: HashMap::new(),
            relaxed: Vec::new(),
        }
    }

    fn is_full(&self) -> bool {
        self.picked.len() >= self.size
    }

    fn contains(&self, symbol: &str) -> bool {
        self.picked.iter().any(|s| s == symbol)
    }

    fn sector_open(&self, symbol: &str) -> bool {
        let sector = sector_of(self.sectors, symbol);
        self.counts.get(sector).copied().unwrap_or(0) < self.cap
    }

    fn admit(&mut self, symbol: &str) {
        let sector = sector_of(self.sectors, symbol);
        *self.counts.entry(sector).or_insert(0) += 1;
        self.picked.push(symbol.to_string());
    }

    /// Capped walk over `ranking`, admitting where `eligible(rank, symbol)`.
    fn fill<F>(&mut self, ranking: &[String], eligible: F)
    where
        F: Fn(usize, &str) -> bool,
    {
        for (rank, symbol) in ranking.iter().enumerate() {
            if self.is_full() {
                break;
            }
            if !self.contains(symbol) && eligible(rank, symbol) && self.sector_open(symbol) {
                self.admit(symbol);
            }
        }
    }

    /// Uncapped walk; whatever it admits is recorded as relaxed.
    fn relax<F>(&mut self, ranking: &[String], eligible: F)
    where
        F: Fn(&str) -> bool,
    {
        for symbol in ranking {
            if self.is_full() {
                break;
            }
            if !self.contains(symbol) && eligible(symbol) {
                self.admit(symbol);
                self.relaxed.push(symbol.clone());
            }
        }
    }
}

/// Partition `ranking` (best first) into Core and Bench.
pub fn select_universe(
    ranking: &[String],
    previous_core: &[String],
    sectors: &HashMap<String, String>,
    settings: &UniverseSettings,
) -> Selection {
    let incumbents: HashSet<&str> = previous_core.iter().map(|s| s.as_str()).collect();
    let hysteresis = &settings.hysteresis;
    let max_ratio = settings.sector_cap.max_ratio;

    let mut core = Tier::new(settings.core_size, max_ratio, sectors);
    core.fill(ranking, |rank, s| {
        incumbents.contains(s) && rank < hysteresis.maintain_rank_max
    });
    core.fill(ranking, |rank, s| {
        incumbents.contains(s) || rank < hysteresis.add_rank_max
    });
    if !core.is_full() {
        core.relax(ranking, |_| true);
        if !core.relaxed.is_empty() {
            warn!(
                admitted = ?core.relaxed,
                cap = core.cap,
                "core sector cap relaxed to reach target size"
            );
        }
    }

    let remaining: Vec<String> = ranking
        .iter()
        .filter(|s| !core.contains(s))
        .cloned()
        .collect();

    let mut bench = Tier::new(settings.bench_size, max_ratio, sectors);
    bench.fill(&remaining, |_, _| true);
    if !bench.is_full() {
        bench.relax(&remaining, |_| true);
        if !bench.relaxed.is_empty() {
            warn!(
                admitted = ?bench.relaxed,
                cap = bench.cap,
                "bench sector cap relaxed to reach target size"
            );
        }
    }

    Selection {
        core: core.picked,
        bench: bench.picked,
        relaxed_core: core.relaxed,
        relaxed_bench: bench.relaxed,
    }
}
