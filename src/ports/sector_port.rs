//! Sector classification lookup port.

use std::collections::HashMap;

/// Sector assigned to symbols missing from the classification map.
pub const UNKNOWN_SECTOR: &str = "UNKNOWN";

pub trait SectorLookup {
    /// Symbol → sector map read from `locator`. A missing resource yields an
    /// empty map.
    fn load_sector_map(&self, locator: &str) -> HashMap<String, String>;
}
