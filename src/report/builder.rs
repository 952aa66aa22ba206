// src/report/builder.rs

//! Column-categorised failure report.

use crate::nodes::FailureMap;
use crate::types::{NodeId, Reason, ReportColumn};

/// Colour of one cell in the 3-column layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cell {
    /// Check passed (or was passed before the failing one).
    Green,
    /// The check the node failed.
    Red,
    /// Never reached: the node was excluded earlier.
    Gray,
}

/// Cells for a node whose failure lands in `failed` (or `None` if clear).
pub fn cells_for(failed: Option<ReportColumn>) -> [Cell; 3] {
    let mut cells = [Cell::Green; 3];
    if let Some(failed) = failed {
        for column in ReportColumn::ALL {
            cells[column.index()] = match column.cmp(&failed) {
                std::cmp::Ordering::Less => Cell::Green,
                std::cmp::Ordering::Equal => Cell::Red,
                std::cmp::Ordering::Greater => Cell::Gray,
            };
        }
    }
    cells
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportRow {
    pub node: NodeId,
    pub reason: Option<Reason>,
    pub cells: [Cell; 3],
}

impl ReportRow {
    pub fn is_clear(&self) -> bool {
        self.reason.is_none()
    }
}

/// Final outcome of a run: one row per node of the original selection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Report {
    rows: Vec<ReportRow>,
}

impl Report {
    /// Build the report from the original node list and the failure map.
    ///
    /// Failures for nodes outside `original` are ignored.
    pub fn build(original: &[NodeId], failures: &FailureMap) -> Self {
        let rows = original
            .iter()
            .map(|&node| {
                let reason = failures.get(node);
                ReportRow {
                    node,
                    reason,
                    cells: cells_for(reason.map(Reason::report_column)),
                }
            })
            .collect();
        Self { rows }
    }

    pub fn rows(&self) -> &[ReportRow] {
        &self.rows
    }

    pub fn row(&self, node: NodeId) -> Option<&ReportRow> {
        self.rows.iter().find(|r| r.node == node)
    }

    pub fn failed_rows(&self) -> impl Iterator<Item = &ReportRow> {
        self.rows.iter().filter(|r| !r.is_clear())
    }

    pub fn node_count(&self) -> usize {
        self.rows.len()
    }

    pub fn issue_count(&self) -> usize {
        self.failed_rows().count()
    }

    pub fn all_clear(&self) -> bool {
        self.issue_count() == 0
    }
}
