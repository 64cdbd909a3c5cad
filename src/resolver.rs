// ⚖️ Conflict Resolver - conflict status, default resolution, user selection
//
// Default rule: the first-arrived observation is shown until the user picks
// one explicitly; an explicit pick always wins and survives later merges.
//
// Selections are applied as discrete commands and reported as events, so a
// journal or an audit log can replay them.

use crate::error::{ReconError, Result};
use crate::ledger::{Cell, MetricLedger};
use crate::observation::Observation;
use crate::period::Period;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};
use tracing::{info, warn};

// ============================================================================
// CONFLICT STATUS
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConflictStatus {
    /// Zero or one distinct non-null value
    None,

    /// Two or more observations disagree on value
    MultipleValues,
}

impl ConflictStatus {
    pub fn is_conflict(&self) -> bool {
        matches!(self, ConflictStatus::MultipleValues)
    }
}

/// Recomputed from the cell every time; merges can change it.
pub fn conflict_status(cell: &Cell) -> ConflictStatus {
    let mut first: Option<f64> = None;

    for value in cell.observations().iter().filter_map(|o| o.value) {
        match first {
            None => first = Some(value),
            Some(seen) if seen != value => return ConflictStatus::MultipleValues,
            Some(_) => {}
        }
    }

    ConflictStatus::None
}

// ============================================================================
// DEFAULT RESOLUTION
// ============================================================================

/// Index of the observation currently shown for this cell
pub fn display_index(cell: &Cell) -> Option<usize> {
    match cell.selected_index() {
        Some(index) => Some(index),
        None if !cell.is_empty() => Some(0),
        None => None,
    }
}

/// Selected observation, else the first arrival, else None ("no data")
pub fn display_value(cell: &Cell) -> Option<&Observation> {
    display_index(cell).and_then(|index| cell.observations().get(index))
}

// ============================================================================
// CELL DETAILS (inspection)
// ============================================================================

/// Everything a "show me the sources" panel needs for one cell
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CellDetails {
    pub metric_key: String,
    pub period: Period,
    pub candidates: Vec<Observation>,
    pub selected_index: Option<usize>,
    pub display_index: Option<usize>,
    pub status: ConflictStatus,
}

pub fn cell_details(ledger: &MetricLedger, metric_key: &str, period: Period) -> Result<CellDetails> {
    let cell = lookup(ledger, metric_key, period)?;

    Ok(CellDetails {
        metric_key: metric_key.to_string(),
        period,
        candidates: cell.observations().to_vec(),
        selected_index: cell.selected_index(),
        display_index: display_index(cell),
        status: conflict_status(cell),
    })
}

/// Conflict status addressed by key; UnknownCell when there is no such cell
pub fn cell_status(ledger: &MetricLedger, metric_key: &str, period: Period) -> Result<ConflictStatus> {
    lookup(ledger, metric_key, period).map(conflict_status)
}

fn lookup<'a>(ledger: &'a MetricLedger, metric_key: &str, period: Period) -> Result<&'a Cell> {
    ledger
        .cell(metric_key, &period)
        .ok_or_else(|| ReconError::UnknownCell {
            metric_key: metric_key.to_string(),
            period,
        })
}

// ============================================================================
// SELECTION COMMANDS & EVENTS
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SelectionCommand {
    pub metric_key: String,
    pub period: Period,
    pub index: usize,
}

impl SelectionCommand {
    pub fn new(metric_key: impl Into<String>, period: Period, index: usize) -> Self {
        SelectionCommand {
            metric_key: metric_key.into(),
            period,
            index,
        }
    }
}

/// Emitted exactly once per selection that changed a cell
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SelectionEvent {
    pub event_id: String,
    pub timestamp: DateTime<Utc>,

    /// Project the selection was made in; None outside any project
    #[serde(default)]
    pub project_id: Option<String>,
    pub metric_key: String,
    pub period: Period,
    pub index: usize,
    pub value: Option<f64>,
    pub source_label: String,
}

impl SelectionEvent {
    fn new(command: &SelectionCommand, observation: &Observation, project_id: Option<String>) -> Self {
        SelectionEvent {
            event_id: uuid::Uuid::new_v4().to_string(),
            timestamp: Utc::now(),
            project_id,
            metric_key: command.metric_key.clone(),
            period: command.period,
            index: command.index,
            value: observation.value,
            source_label: observation.source_label.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum SelectionResult {
    /// The cell's selection changed; this event was delivered to every sink
    Changed(SelectionEvent),

    /// The index was already selected; nothing emitted
    Unchanged,
}

impl SelectionResult {
    pub fn event(&self) -> Option<&SelectionEvent> {
        match self {
            SelectionResult::Changed(event) => Some(event),
            SelectionResult::Unchanged => None,
        }
    }
}

/// Subscriber for selection events (toasts, journals, audit logs)
pub trait SelectionSink: Send {
    fn record(&mut self, event: &SelectionEvent) -> Result<()>;
}

/// In-memory journal. Clones share the same event list, so a host can keep
/// one handle while the resolver owns another.
#[derive(Debug, Clone, Default)]
pub struct SelectionJournal {
    events: Arc<Mutex<Vec<SelectionEvent>>>,
}

impl SelectionJournal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<SelectionEvent> {
        self.events
            .lock()
            .map(|events| events.clone())
            .unwrap_or_default()
    }

    pub fn last(&self) -> Option<SelectionEvent> {
        self.events
            .lock()
            .ok()
            .and_then(|events| events.last().cloned())
    }

    pub fn len(&self) -> usize {
        self.events.lock().map(|events| events.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl SelectionSink for SelectionJournal {
    fn record(&mut self, event: &SelectionEvent) -> Result<()> {
        if let Ok(mut events) = self.events.lock() {
            events.push(event.clone());
        }
        Ok(())
    }
}

// ============================================================================
// CONFLICT RESOLVER
// ============================================================================

#[derive(Default)]
pub struct ConflictResolver {
    sinks: Vec<Box<dyn SelectionSink>>,
    project_id: Option<String>,
}

impl ConflictResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_sink(mut self, sink: impl SelectionSink + 'static) -> Self {
        self.add_sink(sink);
        self
    }

    pub fn add_sink(&mut self, sink: impl SelectionSink + 'static) {
        self.sinks.push(Box::new(sink));
    }

    /// Project stamped on every subsequent event
    pub fn set_project(&mut self, project_id: Option<String>) {
        self.project_id = project_id;
    }

    /// Apply a selection command.
    ///
    /// Fails with UnknownCell / OutOfRange without touching the ledger.
    /// Re-selecting the current index is a no-op and emits nothing.
    pub fn apply(&mut self, ledger: &mut MetricLedger, command: &SelectionCommand) -> Result<SelectionResult> {
        let cell = ledger
            .cell_mut(&command.metric_key, &command.period)
            .ok_or_else(|| ReconError::UnknownCell {
                metric_key: command.metric_key.clone(),
                period: command.period,
            })?;

        let Some(observation) = cell.observations().get(command.index) else {
            return Err(ReconError::OutOfRange {
                metric_key: command.metric_key.clone(),
                period: command.period,
                index: command.index,
                len: cell.len(),
            });
        };

        if cell.selected_index() == Some(command.index) {
            return Ok(SelectionResult::Unchanged);
        }

        let event = SelectionEvent::new(command, observation, self.project_id.clone());
        cell.set_selected(command.index);

        info!(
            project = event.project_id.as_deref().unwrap_or("-"),
            metric = %event.metric_key,
            period = %event.period,
            index = event.index,
            source = %event.source_label,
            "selected observation"
        );

        for sink in self.sinks.iter_mut() {
            if let Err(e) = sink.record(&event) {
                warn!(event_id = %event.event_id, error = %e, "selection sink failed");
            }
        }

        Ok(SelectionResult::Changed(event))
    }

    pub fn select_observation(
        &mut self,
        ledger: &mut MetricLedger,
        metric_key: &str,
        period: Period,
        index: usize,
    ) -> Result<SelectionResult> {
        self.apply(ledger, &SelectionCommand::new(metric_key, period, index))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::merge::merge_batch;

    fn p(year: i32, month: u8) -> Period {
        Period::new(year, month).unwrap()
    }

    fn obs(value: Option<f64>, source: &str) -> Observation {
        Observation::new(value, source, format!("https://docs.example/{}.png", source))
    }

    fn ledger_with(values: Vec<Observation>) -> MetricLedger {
        let mut ledger = MetricLedger::new();
        merge_batch(&mut ledger, "Revenue", "Revenue", p(2024, 1), values);
        ledger
    }

    /// Sink that always fails, to prove selection does not depend on sinks
    struct BrokenSink;

    impl SelectionSink for BrokenSink {
        fn record(&mut self, _event: &SelectionEvent) -> Result<()> {
            Err(ReconError::Config("sink offline".to_string()))
        }
    }

    #[test]
    fn test_conflict_detection() {
        let same = ledger_with(vec![obs(Some(100.0), "A"), obs(Some(100.0), "B")]);
        assert_eq!(cell_status(&same, "Revenue", p(2024, 1)).unwrap(), ConflictStatus::None);

        let differ = ledger_with(vec![obs(Some(100.0), "A"), obs(Some(200.0), "B")]);
        assert_eq!(cell_status(&differ, "Revenue", p(2024, 1)).unwrap(), ConflictStatus::MultipleValues);

        let with_null = ledger_with(vec![obs(Some(100.0), "A"), obs(None, "B")]);
        assert_eq!(cell_status(&with_null, "Revenue", p(2024, 1)).unwrap(), ConflictStatus::None);
    }

    #[test]
    fn test_conflict_status_follows_merges() {
        let mut ledger = ledger_with(vec![obs(Some(100.0), "A")]);
        assert!(!cell_status(&ledger, "Revenue", p(2024, 1)).unwrap().is_conflict());

        merge_batch(&mut ledger, "Revenue", "Revenue", p(2024, 1), vec![obs(Some(250.0), "B")]);
        assert!(cell_status(&ledger, "Revenue", p(2024, 1)).unwrap().is_conflict());
    }

    #[test]
    fn test_cell_status_unknown_cell() {
        let ledger = ledger_with(vec![obs(Some(100.0), "A")]);
        let err = cell_status(&ledger, "Revenue", p(2023, 1)).unwrap_err();
        assert!(matches!(err, ReconError::UnknownCell { .. }));
    }

    #[test]
    fn test_display_value_default_and_empty() {
        let ledger = ledger_with(vec![obs(Some(1.0), "A"), obs(Some(2.0), "B")]);
        let cell = ledger.cell("Revenue", &p(2024, 1)).unwrap();
        for _ in 0..3 {
            assert_eq!(display_value(cell).unwrap().source_label, "A");
        }

        let empty = Cell::default();
        assert!(display_value(&empty).is_none());
        assert_eq!(display_index(&empty), None);
    }

    #[test]
    fn test_select_emits_event_once() {
        let mut ledger = ledger_with(vec![obs(Some(1000.0), "10-K"), obs(Some(1200.0), "Investor Deck")]);
        let journal = SelectionJournal::new();
        let mut resolver = ConflictResolver::new().with_sink(journal.clone());

        let result = resolver.select_observation(&mut ledger, "Revenue", p(2024, 1), 1).unwrap();
        let event = result.event().unwrap();
        assert_eq!(event.value, Some(1200.0));
        assert_eq!(event.source_label, "Investor Deck");

        let cell = ledger.cell("Revenue", &p(2024, 1)).unwrap();
        assert_eq!(display_value(cell).unwrap().value, Some(1200.0));
        assert_eq!(cell.len(), 2); // Others kept for provenance

        // Same index again: no-op, no event
        let again = resolver.select_observation(&mut ledger, "Revenue", p(2024, 1), 1).unwrap();
        assert_eq!(again, SelectionResult::Unchanged);
        assert_eq!(journal.len(), 1);

        // Different index overwrites
        resolver.select_observation(&mut ledger, "Revenue", p(2024, 1), 0).unwrap();
        assert_eq!(journal.len(), 2);
        assert_eq!(journal.last().unwrap().index, 0);
    }

    #[test]
    fn test_select_out_of_range_leaves_ledger_untouched() {
        let mut ledger = ledger_with(vec![obs(Some(1.0), "A")]);
        let before = ledger.clone();
        let journal = SelectionJournal::new();
        let mut resolver = ConflictResolver::new().with_sink(journal.clone());

        let err = resolver.select_observation(&mut ledger, "Revenue", p(2024, 1), 5).unwrap_err();
        assert!(matches!(err, ReconError::OutOfRange { index: 5, len: 1, .. }));

        let err = resolver.select_observation(&mut ledger, "Missing", p(2024, 1), 0).unwrap_err();
        assert!(matches!(err, ReconError::UnknownCell { .. }));

        assert_eq!(ledger, before);
        assert!(journal.is_empty());
    }

    #[test]
    fn test_selection_survives_merge() {
        let mut ledger = ledger_with(vec![obs(Some(1000.0), "10-K"), obs(Some(1200.0), "Investor Deck")]);
        let mut resolver = ConflictResolver::new();
        resolver.select_observation(&mut ledger, "Revenue", p(2024, 1), 1).unwrap();

        merge_batch(
            &mut ledger,
            "Revenue",
            "Revenue",
            p(2024, 1),
            vec![obs(Some(1100.0), "Press Release"), obs(Some(1000.0), "10-K")],
        );

        let cell = ledger.cell("Revenue", &p(2024, 1)).unwrap();
        assert_eq!(cell.len(), 3);
        assert_eq!(cell.selected_index(), Some(1));
        assert_eq!(display_value(cell).unwrap().value, Some(1200.0));
    }

    #[test]
    fn test_failing_sink_does_not_block_selection() {
        let mut ledger = ledger_with(vec![obs(Some(1.0), "A"), obs(Some(2.0), "B")]);
        let journal = SelectionJournal::new();
        let mut resolver = ConflictResolver::new()
            .with_sink(BrokenSink)
            .with_sink(journal.clone());

        let result = resolver.select_observation(&mut ledger, "Revenue", p(2024, 1), 1).unwrap();
        assert!(result.event().is_some());
        assert_eq!(journal.len(), 1);
    }

    #[test]
    fn test_events_carry_project() {
        let mut ledger = ledger_with(vec![obs(Some(1.0), "A"), obs(Some(2.0), "B")]);
        let mut resolver = ConflictResolver::new();

        let first = resolver.select_observation(&mut ledger, "Revenue", p(2024, 1), 1).unwrap();
        assert_eq!(first.event().unwrap().project_id, None);

        resolver.set_project(Some("acme".to_string()));
        let second = resolver.select_observation(&mut ledger, "Revenue", p(2024, 1), 0).unwrap();
        assert_eq!(second.event().unwrap().project_id.as_deref(), Some("acme"));
    }

    #[test]
    fn test_cell_details() {
        let ledger = ledger_with(vec![obs(Some(1.0), "A"), obs(Some(2.0), "B")]);
        let details = cell_details(&ledger, "Revenue", p(2024, 1)).unwrap();

        assert_eq!(details.candidates.len(), 2);
        assert_eq!(details.selected_index, None);
        assert_eq!(details.display_index, Some(0));
        assert_eq!(details.status, ConflictStatus::MultipleValues);
    }
}
