//! Audit snapshot written as CSV, one row per filtered symbol.
//!
//! Columns: symbol, rank, membership, total, the raw metrics, then one
//! `score_<component>` column per breakdown component seen in the cycle.
//! Absent values are written as empty cells.

use crate::domain::error::SelectorError;
use crate::domain::service::UniverseSelectionResult;
use crate::domain::snapshot::{component_columns, METRIC_COLUMNS};
use crate::ports::report_port::ReportPort;
use tracing::info;

#[derive(Debug, Default)]
pub struct SnapshotCsvAdapter;

fn cell(value: Option<f64>) -> String {
    value.map(|v| v.to_string()).unwrap_or_default()
}

fn csv_error(path: &str, e: impl std::fmt::Display) -> SelectorError {
    SelectorError::Io(std::io::Error::other(format!(
        "failed to write snapshot {path}: {e}"
    )))
}

impl ReportPort for SnapshotCsvAdapter {
    fn write(
        &self,
        result: &UniverseSelectionResult,
        output_path: &str,
    ) -> Result<(), SelectorError> {
        let components = component_columns(&result.snapshot_rows);
        let mut wtr = csv::Writer::from_path(output_path).map_err(|e| csv_error(output_path, e))?;

        let mut header: Vec<String> = ["symbol", "rank", "membership", "total"]
            .iter()
            .chain(METRIC_COLUMNS.iter())
            .map(|s| s.to_string())
            .collect();
        header.extend(components.iter().map(|c| format!("score_{c}")));
        wtr.write_record(&header)
            .map_err(|e| csv_error(output_path, e))?;

        for row in &result.snapshot_rows {
            let mut record = vec![
                row.symbol.clone(),
                row.rank.to_string(),
                row.membership.to_string(),
                row.total.to_string(),
            ];
            record.extend(row.metric_values().into_iter().map(cell));
            record.extend(components.iter().map(|c| cell(row.component(c))));
            wtr.write_record(&record)
                .map_err(|e| csv_error(output_path, e))?;
        }
        wtr.flush()?;

        info!(
            path = output_path,
            rows = result.snapshot_rows.len(),
            "snapshot written"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::metrics::SymbolMetrics;
    use crate::domain::snapshot::{Membership, SnapshotRow};
    use std::collections::BTreeMap;
    use tempfile::TempDir;

    fn row(symbol: &str, rank: usize, membership: Membership, ext: bool) -> SnapshotRow {
        let mut components = vec![("liquidity".to_string(), 0.35), ("cost".to_string(), 0.1)];
        if ext {
            components.push(("ext_efficiency_ratio".to_string(), 0.05));
        }
        SnapshotRow {
            symbol: symbol.into(),
            rank,
            membership,
            metrics: SymbolMetrics {
                symbol: symbol.into(),
                latest_close: 10.5,
                adv_value: 2e7,
                atr_pct: Some(0.02),
                median_intraday_range_bps: 15.0,
                close_volume_share: 0.1,
                no_trade_ratio: 0.0,
                efficiency_ratio: ext.then_some(0.6),
                orb_follow_through: None,
                vwap_persistence: None,
            },
            total: 0.5,
            components,
        }
    }

    fn result(rows: Vec<SnapshotRow>) -> UniverseSelectionResult {
        UniverseSelectionResult {
            core: vec!["AAA".into()],
            bench: vec![],
            scores: BTreeMap::new(),
            breakdown: BTreeMap::new(),
            total_symbols: rows.len(),
            metric_symbols: rows.len(),
            filtered_symbols: rows.len(),
            snapshot_rows: rows,
            relaxed_core: vec![],
            relaxed_bench: vec![],
        }
    }

    #[test]
    fn writes_header_and_rows() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("snapshot.csv");
        let path = path.to_str().unwrap();

        let res = result(vec![
            row("AAA", 1, Membership::Core, true),
            row("BBB", 2, Membership::Rejected, false),
        ]);
        SnapshotCsvAdapter.write(&res, path).unwrap();

        let content = std::fs::read_to_string(path).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[0].starts_with("symbol,rank,membership,total,latest_close"));
        assert!(lines[0].ends_with("score_liquidity,score_cost,score_ext_efficiency_ratio"));
        assert!(lines[1].starts_with("AAA,1,core,0.5,10.5"));
        assert!(lines[1].ends_with(",0.35,0.1,0.05"));
        assert!(lines[2].starts_with("BBB,2,rejected"));
        assert!(lines[2].ends_with(",0.35,0.1,"));
    }

    #[test]
    fn unwritable_path_is_io_error() {
        let res = result(vec![row("AAA", 1, Membership::Core, false)]);
        let err = SnapshotCsvAdapter
            .write(&res, "/nonexistent/dir/snapshot.csv")
            .unwrap_err();
        assert!(matches!(err, SelectorError::Io(_)));
    }
}
