// 📊 Table Projector - flat metric × period table derived from the ledger
//
// Pure: two projections with no mutation in between are equal.
// Rows: first-seen metric order. Columns: most recent period first.
// Missing cells are explicit "no data" entries, never absent.

use crate::ledger::{Cell, MetricLedger};
use crate::observation::Observation;
use crate::period::Period;
use crate::resolver::{conflict_status, display_index};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectedCell {
    pub period: Period,

    /// Resolved display value (None = no data, or the source reported none)
    pub value: Option<f64>,

    /// Source of the resolved value
    pub source_label: Option<String>,

    /// True when the value comes from an explicit user selection
    pub selected: bool,

    pub is_conflict: bool,

    /// Every observation for the cell, arrival order
    pub candidates: Vec<Observation>,
}

impl ProjectedCell {
    pub fn no_data(period: Period) -> Self {
        ProjectedCell {
            period,
            value: None,
            source_label: None,
            selected: false,
            is_conflict: false,
            candidates: Vec::new(),
        }
    }

    fn from_cell(period: Period, cell: &Cell) -> Self {
        let shown = display_index(cell).and_then(|index| cell.observations().get(index));

        ProjectedCell {
            period,
            value: shown.and_then(|o| o.value),
            source_label: shown.map(|o| o.source_label.clone()),
            selected: cell.selected_index().is_some(),
            is_conflict: conflict_status(cell).is_conflict(),
            candidates: cell.observations().to_vec(),
        }
    }

    /// False for the explicit "no data" placeholder
    pub fn has_data(&self) -> bool {
        !self.candidates.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableRow {
    pub metric_key: String,
    pub title: String,

    /// One entry per table column, same order as `Table::periods`
    pub cells: Vec<ProjectedCell>,
}

impl TableRow {
    pub fn cell(&self, period: &Period) -> Option<&ProjectedCell> {
        self.cells.iter().find(|cell| &cell.period == period)
    }

    pub fn conflict_count(&self) -> usize {
        self.cells.iter().filter(|cell| cell.is_conflict).count()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Table {
    /// Column order
    pub periods: Vec<Period>,
    pub rows: Vec<TableRow>,
}

impl Table {
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn row(&self, metric_key: &str) -> Option<&TableRow> {
        self.rows.iter().find(|row| row.metric_key == metric_key)
    }

    pub fn conflict_count(&self) -> usize {
        self.rows.iter().map(TableRow::conflict_count).sum()
    }
}

/// Project the ledger onto the requested columns. Periods are sorted into
/// canonical order and de-duplicated; the caller's order does not matter.
pub fn project(ledger: &MetricLedger, periods: &[Period]) -> Table {
    let mut columns = periods.to_vec();
    columns.sort();
    columns.dedup();

    let rows = ledger
        .metrics()
        .map(|metric| TableRow {
            metric_key: metric.key.clone(),
            title: metric.title.clone(),
            cells: columns
                .iter()
                .map(|period| match ledger.cell(&metric.key, period) {
                    Some(cell) => ProjectedCell::from_cell(*period, cell),
                    None => ProjectedCell::no_data(*period),
                })
                .collect(),
        })
        .collect();

    Table { periods: columns, rows }
}

/// Project onto every period present in the ledger
pub fn project_all(ledger: &MetricLedger) -> Table {
    project(ledger, &ledger.periods())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::merge::merge_batch;
    use crate::resolver::ConflictResolver;

    fn p(year: i32, month: u8) -> Period {
        Period::new(year, month).unwrap()
    }

    fn obs(value: Option<f64>, source: &str) -> Observation {
        Observation::new(value, source, format!("https://docs.example/{}.png", source))
    }

    fn sample_ledger() -> MetricLedger {
        let mut ledger = MetricLedger::new();
        merge_batch(&mut ledger, "revenue", "Revenue", p(2024, 1), vec![obs(Some(1000.0), "10-K"), obs(Some(1200.0), "Deck")]);
        merge_batch(&mut ledger, "cogs", "Cost of Sales", p(2024, 1), vec![obs(Some(400.0), "10-K")]);
        merge_batch(&mut ledger, "revenue", "Revenue", p(2023, 12), vec![obs(None, "10-K")]);
        ledger
    }

    #[test]
    fn test_rows_follow_first_seen_order() {
        let mut ledger = MetricLedger::new();
        merge_batch(&mut ledger, "zeta", "Zeta", p(2024, 1), vec![obs(Some(1.0), "A")]);
        merge_batch(&mut ledger, "alpha", "Alpha", p(2024, 1), vec![obs(Some(1.0), "A")]);

        let table = project_all(&ledger);
        let keys: Vec<&str> = table.rows.iter().map(|r| r.metric_key.as_str()).collect();
        assert_eq!(keys, vec!["zeta", "alpha"]);
    }

    #[test]
    fn test_columns_most_recent_first() {
        let ledger = sample_ledger();
        let table = project(&ledger, &[p(2023, 12), p(2024, 2), p(2024, 1), p(2024, 2)]);

        assert_eq!(table.periods, vec![p(2024, 2), p(2024, 1), p(2023, 12)]);
        let row_periods: Vec<Period> = table.rows[0].cells.iter().map(|c| c.period).collect();
        assert_eq!(row_periods, table.periods);
    }

    #[test]
    fn test_missing_cells_are_explicit_no_data() {
        let ledger = sample_ledger();
        let table = project(&ledger, &[p(2024, 1), p(2023, 12)]);

        let cogs = table.row("cogs").unwrap();
        let missing = cogs.cell(&p(2023, 12)).unwrap();
        assert!(!missing.has_data());
        assert_eq!(missing.value, None);

        // A null observation is data, even though it has no value
        let revenue = table.row("revenue").unwrap();
        let null_cell = revenue.cell(&p(2023, 12)).unwrap();
        assert!(null_cell.has_data());
        assert_eq!(null_cell.value, None);
        assert_eq!(null_cell.source_label.as_deref(), Some("10-K"));
    }

    #[test]
    fn test_conflict_and_candidates() {
        let table = project_all(&sample_ledger());
        let revenue = table.row("revenue").unwrap().cell(&p(2024, 1)).unwrap();

        assert!(revenue.is_conflict);
        assert_eq!(revenue.candidates.len(), 2);
        assert_eq!(revenue.value, Some(1000.0));
        assert!(!revenue.selected);
        assert_eq!(table.conflict_count(), 1);
    }

    #[test]
    fn test_projection_reflects_selection_immediately() {
        let mut ledger = sample_ledger();
        let mut resolver = ConflictResolver::new();
        resolver.select_observation(&mut ledger, "revenue", p(2024, 1), 1).unwrap();

        let table = project_all(&ledger);
        let revenue = table.row("revenue").unwrap().cell(&p(2024, 1)).unwrap();
        assert_eq!(revenue.value, Some(1200.0));
        assert!(revenue.selected);
    }

    #[test]
    fn test_projection_is_pure() {
        let ledger = sample_ledger();
        let periods = Period::months_of_years(&[2023, 2024]);
        assert_eq!(project(&ledger, &periods), project(&ledger, &periods));
    }

    #[test]
    fn test_empty_ledger_projects_empty_table() {
        let table = project(&MetricLedger::new(), &[p(2024, 1)]);
        assert!(table.is_empty());
        assert_eq!(table.periods, vec![p(2024, 1)]);
    }
}
