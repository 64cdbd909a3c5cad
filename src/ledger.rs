// 📒 Metric Ledger - the single mutable store of a reconciliation session
//
// Identity: Metric.key (never changes across fetches)
// Value:    Metric.title (last write wins)
//
// Only the batch merger (appending observations) and the conflict resolver
// (setting a selection) mutate the ledger; both go through the crate-private
// methods below. Everything else reads.

use crate::observation::Observation;
use crate::period::Period;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

// ============================================================================
// METRIC
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Metric {
    /// Stable identity across batches
    pub key: String,

    /// Display label
    pub title: String,
}

// ============================================================================
// CELL
// ============================================================================

/// All observations for one (metric, period) plus the user's selection.
///
/// Observations are only ever appended, so a selected index stays valid for
/// the lifetime of the cell.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Cell {
    observations: Vec<Observation>,
    selected_index: Option<usize>,
}

impl Cell {
    /// Observations in arrival order
    pub fn observations(&self) -> &[Observation] {
        &self.observations
    }

    /// Index chosen by the user, None = use the default
    pub fn selected_index(&self) -> Option<usize> {
        self.selected_index
    }

    pub fn len(&self) -> usize {
        self.observations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.observations.is_empty()
    }

    /// Appends unless a structural duplicate is already present.
    /// Returns true when the observation was added.
    pub(crate) fn append_unique(&mut self, observation: Observation) -> bool {
        if self
            .observations
            .iter()
            .any(|existing| existing.is_duplicate_of(&observation))
        {
            return false;
        }
        self.observations.push(observation);
        true
    }

    /// Caller must have checked `index < len()`
    pub(crate) fn set_selected(&mut self, index: usize) {
        debug_assert!(index < self.observations.len());
        self.selected_index = Some(index);
    }
}

// ============================================================================
// LEDGER
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct MetricEntry {
    metric: Metric,
    cells: BTreeMap<Period, Cell>,
}

/// Metric key → Metric and (metric key, period) → Cell.
///
/// Metrics iterate in first-seen order; periods within a metric iterate in
/// canonical (most recent first) order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MetricLedger {
    entries: IndexMap<String, MetricEntry>,
}

impl MetricLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn metric_count(&self) -> usize {
        self.entries.len()
    }

    pub fn cell_count(&self) -> usize {
        self.entries.values().map(|entry| entry.cells.len()).sum()
    }

    pub fn observation_count(&self) -> usize {
        self.entries
            .values()
            .flat_map(|entry| entry.cells.values())
            .map(Cell::len)
            .sum()
    }

    pub fn metric(&self, key: &str) -> Option<&Metric> {
        self.entries.get(key).map(|entry| &entry.metric)
    }

    /// Metrics in first-seen order
    pub fn metrics(&self) -> impl Iterator<Item = &Metric> {
        self.entries.values().map(|entry| &entry.metric)
    }

    pub fn cell(&self, metric_key: &str, period: &Period) -> Option<&Cell> {
        self.entries
            .get(metric_key)
            .and_then(|entry| entry.cells.get(period))
    }

    /// Every period that has at least one cell, canonical order
    pub fn periods(&self) -> Vec<Period> {
        let mut periods: Vec<Period> = self
            .entries
            .values()
            .flat_map(|entry| entry.cells.keys().copied())
            .collect();
        periods.sort();
        periods.dedup();
        periods
    }

    /// Registers the metric if unknown, otherwise refreshes its title.
    /// Registration order is kept as row order.
    pub(crate) fn register_metric(&mut self, key: &str, title: &str) {
        match self.entries.get_mut(key) {
            Some(entry) => {
                if entry.metric.title != title {
                    entry.metric.title = title.to_string();
                }
            }
            None => {
                self.entries.insert(
                    key.to_string(),
                    MetricEntry {
                        metric: Metric {
                            key: key.to_string(),
                            title: title.to_string(),
                        },
                        cells: BTreeMap::new(),
                    },
                );
            }
        }
    }

    /// Locates or creates the cell. The metric must already be registered.
    pub(crate) fn cell_entry(&mut self, metric_key: &str, period: Period) -> Option<&mut Cell> {
        self.entries
            .get_mut(metric_key)
            .map(|entry| entry.cells.entry(period).or_default())
    }

    pub(crate) fn cell_mut(&mut self, metric_key: &str, period: &Period) -> Option<&mut Cell> {
        self.entries
            .get_mut(metric_key)
            .and_then(|entry| entry.cells.get_mut(period))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn p(year: i32, month: u8) -> Period {
        Period::new(year, month).unwrap()
    }

    #[test]
    fn test_register_keeps_first_seen_order() {
        let mut ledger = MetricLedger::new();
        ledger.register_metric("revenue", "Revenue");
        ledger.register_metric("cogs", "Cost of Sales");
        ledger.register_metric("ebitda", "EBITDA");
        ledger.register_metric("revenue", "Net Revenue");

        let keys: Vec<&str> = ledger.metrics().map(|m| m.key.as_str()).collect();
        assert_eq!(keys, vec!["revenue", "cogs", "ebitda"]);

        // Title is last-write-wins
        assert_eq!(ledger.metric("revenue").unwrap().title, "Net Revenue");
    }

    #[test]
    fn test_cell_entry_requires_registered_metric() {
        let mut ledger = MetricLedger::new();
        assert!(ledger.cell_entry("revenue", p(2024, 1)).is_none());

        ledger.register_metric("revenue", "Revenue");
        assert!(ledger.cell_entry("revenue", p(2024, 1)).is_some());
        assert_eq!(ledger.cell_count(), 1);
    }

    #[test]
    fn test_append_unique_skips_duplicates() {
        let mut cell = Cell::default();
        assert!(cell.append_unique(Observation::new(Some(1.0), "10-K", "a")));
        assert!(!cell.append_unique(Observation::new(Some(1.0), "10-K", "b")));
        assert!(cell.append_unique(Observation::new(Some(1.0), "Deck", "c")));
        assert_eq!(cell.len(), 2);
    }

    #[test]
    fn test_periods_sorted_most_recent_first() {
        let mut ledger = MetricLedger::new();
        ledger.register_metric("revenue", "Revenue");
        ledger.register_metric("cogs", "COGS");
        ledger.cell_entry("revenue", p(2023, 4));
        ledger.cell_entry("revenue", p(2024, 1));
        ledger.cell_entry("cogs", p(2024, 1));
        ledger.cell_entry("cogs", p(2025, 2));

        assert_eq!(ledger.periods(), vec![p(2025, 2), p(2024, 1), p(2023, 4)]);
    }
}
