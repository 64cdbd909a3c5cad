// 🧩 Batch Merger - fold freshly fetched observations into the ledger
//
// Guarantees:
// - idempotent: merging the same batch twice == merging it once
// - order-independent for disjoint (metric, period) keys
// - never touches a cell's selection, never removes an observation
// - silent: no selection events are emitted for ingestion

use crate::ledger::MetricLedger;
use crate::observation::Observation;
use crate::period::Period;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// What one merge call did to its cell
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MergeOutcome {
    pub appended: usize,
    pub duplicates: usize,
}

impl MergeOutcome {
    pub fn absorb(&mut self, other: MergeOutcome) {
        self.appended += other.appended;
        self.duplicates += other.duplicates;
    }

    /// True when the merge left the cell's observations unchanged
    pub fn is_noop(&self) -> bool {
        self.appended == 0
    }
}

/// Merge observations for one (metric, period) into the ledger.
///
/// An empty observation list has no effect at all, not even metric
/// registration.
pub fn merge_batch(
    ledger: &mut MetricLedger,
    metric_key: &str,
    title: &str,
    period: Period,
    observations: Vec<Observation>,
) -> MergeOutcome {
    let mut outcome = MergeOutcome::default();

    if observations.is_empty() {
        return outcome;
    }

    ledger.register_metric(metric_key, title);

    let Some(cell) = ledger.cell_entry(metric_key, period) else {
        return outcome;
    };

    for observation in observations {
        if cell.append_unique(observation) {
            outcome.appended += 1;
        } else {
            outcome.duplicates += 1;
        }
    }

    debug!(
        metric = metric_key,
        %period,
        appended = outcome.appended,
        duplicates = outcome.duplicates,
        "merged batch into cell"
    );

    outcome
}
