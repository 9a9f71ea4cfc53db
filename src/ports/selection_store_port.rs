//! Persistence sink for Core membership and audit snapshots.

use crate::domain::error::SelectorError;
use crate::domain::service::UniverseSelectionResult;
use chrono::NaiveDateTime;

pub trait SelectionStore {
    /// Core membership persisted by the most recent cycle, in rank order.
    /// Empty when no cycle has been stored for `market`.
    fn load_previous_core(&self, market: &str) -> Result<Vec<String>, SelectorError>;

    /// Store the new Core and the full audit snapshot of a cycle.
    fn save_selection(
        &self,
        market: &str,
        as_of: NaiveDateTime,
        result: &UniverseSelectionResult,
    ) -> Result<(), SelectorError>;
}
