//! Row counters for live progress and the final report.
//!
//! Counts reflect rows *submitted* to a writer. With the pipelined writer a
//! submitted row may not be durable until `join` returns.

use std::collections::{BTreeSet, HashMap};
use std::fmt::Write as _;
use std::time::Instant;

use serde::Serialize;
use tracing::debug;

/// Per-table and total row counters for one run.
#[derive(Debug)]
pub struct ProgressTracker {
    table_stats: HashMap<String, u64>,
    total: u64,
    started: Instant,
    json_lines: bool,
}

/// One line of `--progress` output.
#[derive(Debug, Serialize)]
struct ProgressUpdate<'a> {
    table: &'a str,
    rows: u64,
    table_rows: u64,
    total_rows: u64,
    elapsed_secs: f64,
}

impl Default for ProgressTracker {
    fn default() -> Self {
        Self::new(false)
    }
}

impl ProgressTracker {
    /// Create a tracker; with `json_lines` every update is also written to
    /// stderr as a JSON object.
    pub fn new(json_lines: bool) -> Self {
        Self {
            table_stats: HashMap::new(),
            total: 0,
            started: Instant::now(),
            json_lines,
        }
    }

    /// Record `rows` rows submitted for `table`. Zero-row updates are ignored.
    pub fn update(&mut self, table: &str, rows: usize) {
        if rows == 0 {
            return;
        }
        let rows = rows as u64;

        let table_rows = {
            let count = self.table_stats.entry(table.to_string()).or_insert(0);
            *count += rows;
            *count
        };
        self.total += rows;

        debug!(table, rows, table_rows, total_rows = self.total, "progress");

        if self.json_lines {
            let update = ProgressUpdate {
                table,
                rows,
                table_rows,
                total_rows: self.total,
                elapsed_secs: self.started.elapsed().as_secs_f64(),
            };
            if let Ok(line) = serde_json::to_string(&update) {
                eprintln!("{}", line);
            }
        }
    }

    pub fn total(&self) -> u64 {
        self.total
    }

    pub fn table_count(&self, table: &str) -> u64 {
        self.table_stats.get(table).copied().unwrap_or(0)
    }

    /// Tables with at least one recorded row.
    pub fn dirty_tables(&self) -> BTreeSet<String> {
        self.table_stats.keys().cloned().collect()
    }

    /// `(table, rows)` by descending row count, ties by table name.
    pub fn sorted_table_stats(&self) -> Vec<(String, u64)> {
        let mut stats: Vec<(String, u64)> = self
            .table_stats
            .iter()
            .map(|(table, count)| (table.clone(), *count))
            .collect();
        stats.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        stats
    }

    /// Snapshot for the final report.
    pub fn summary(&self, sequences_repaired: usize) -> RestoreSummary {
        RestoreSummary {
            tables: self
                .sorted_table_stats()
                .into_iter()
                .map(|(table, rows)| TableCount { table, rows })
                .collect(),
            total_rows: self.total,
            duration_secs: self.started.elapsed().as_secs_f64(),
            sequences_repaired,
        }
    }
}

/// Rows written to one table.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TableCount {
    pub table: String,
    pub rows: u64,
}

/// Result of a completed run.
#[derive(Debug, Clone, Serialize)]
pub struct RestoreSummary {
    /// Rows per table, descending.
    pub tables: Vec<TableCount>,
    pub total_rows: u64,
    pub duration_secs: f64,
    pub sequences_repaired: usize,
}

impl RestoreSummary {
    /// Human-readable report.
    pub fn render_text(&self) -> String {
        let mut out = format!(
            "Copied {} rows in {:.1}s\n",
            self.total_rows, self.duration_secs
        );
        out.push_str("Rows copied:\n");
        for entry in &self.tables {
            let _ = writeln!(out, "\t{} {}", entry.rows, entry.table);
        }
        out
    }

    /// Convert to JSON string.
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}
