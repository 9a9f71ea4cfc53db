//! Audit report port.

use crate::domain::error::SelectorError;
use crate::domain::service::UniverseSelectionResult;

/// Port for writing a cycle's audit snapshot somewhere a human can read it.
pub trait ReportPort {
    fn write(
        &self,
        result: &UniverseSelectionResult,
        output_path: &str,
    ) -> Result<(), SelectorError>;
}
