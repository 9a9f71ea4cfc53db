//! Sector classification from a `symbol,sector` CSV file.

use crate::ports::sector_port::SectorLookup;
use serde::Deserialize;
use std::collections::HashMap;
use tracing::{debug, warn};

#[derive(Debug, Deserialize)]
struct SectorRecord {
    symbol: String,
    sector: String,
}

#[derive(Debug, Default)]
pub struct SectorFileAdapter;

impl SectorLookup for SectorFileAdapter {
    fn load_sector_map(&self, locator: &str) -> HashMap<String, String> {
        let mut rdr = match csv::ReaderBuilder::new().trim(csv::Trim::All).from_path(locator) {
            Ok(r) => r,
            Err(e) => {
                warn!(path = locator, error = %e, "sector map unavailable, all symbols UNKNOWN");
                return HashMap::new();
            }
        };

        let mut map = HashMap::new();
        for result in rdr.deserialize::<SectorRecord>() {
            match result {
                Ok(rec) if !rec.symbol.is_empty() && !rec.sector.is_empty() => {
                    map.insert(rec.symbol, rec.sector);
                }
                Ok(_) => {}
                Err(e) => debug!(path = locator, error = %e, "skipping sector row"),
            }
        }
        debug!(path = locator, entries = map.len(), "sector map loaded");
        map
    }
}
