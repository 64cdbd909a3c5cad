// 🧭 Reconciliation Session - one project's ledger and everything acting on it
//
// The session owns the ledger; merges and selections go through it, and
// projections read it, so a selection is visible to the next projection
// without any synchronization step. Switching project discards the ledger.

use crate::audit::SqliteAuditLog;
use crate::config::ReconConfig;
use crate::error::Result;
use crate::export::{self, ExportOptions};
use crate::ledger::MetricLedger;
use crate::merge::{self, MergeOutcome};
use crate::observation::Observation;
use crate::period::Period;
use crate::projection::{self, Table};
use crate::resolver::{
    self, CellDetails, ConflictResolver, ConflictStatus, SelectionCommand, SelectionJournal,
    SelectionResult,
};
use crate::wire::{self, ExtractionResponse, KeyStrategy};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use tracing::info;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum BatchOutcome {
    Merged(MergeOutcome),

    /// Byte-identical response already merged in this project; skipped
    AlreadyMerged,
}

pub struct ReconciliationSession {
    project_id: Option<String>,
    ledger: MetricLedger,
    resolver: ConflictResolver,
    journal: SelectionJournal,
    seen_batches: HashSet<String>,
    key_strategy: KeyStrategy,
    columns: Option<Vec<Period>>,
    export_options: ExportOptions,
}

impl Default for ReconciliationSession {
    fn default() -> Self {
        Self::new()
    }
}

impl ReconciliationSession {
    pub fn new() -> Self {
        let journal = SelectionJournal::new();
        ReconciliationSession {
            project_id: None,
            ledger: MetricLedger::new(),
            resolver: ConflictResolver::new().with_sink(journal.clone()),
            journal,
            seen_batches: HashSet::new(),
            key_strategy: KeyStrategy::default(),
            columns: None,
            export_options: ExportOptions::default(),
        }
    }

    /// Session wired from configuration; opens the audit log when one is
    /// configured.
    pub fn from_config(config: &ReconConfig) -> Result<Self> {
        let mut session = Self::new()
            .with_key_strategy(config.ingest.key_strategy)
            .with_export_options(config.export.clone());

        if let Some(periods) = config.columns.periods() {
            session = session.with_columns(periods);
        }

        if let Some(path) = &config.audit.database {
            let log = SqliteAuditLog::open(path)?.with_actor(config.audit.actor.clone());
            session.resolver.add_sink(log);
            info!(path = %path.display(), actor = %config.audit.actor, "selection audit log enabled");
        }

        Ok(session)
    }

    pub fn with_key_strategy(mut self, strategy: KeyStrategy) -> Self {
        self.key_strategy = strategy;
        self
    }

    pub fn with_columns(mut self, periods: Vec<Period>) -> Self {
        self.columns = Some(periods);
        self
    }

    pub fn with_export_options(mut self, options: ExportOptions) -> Self {
        self.export_options = options;
        self
    }

    // ========================================================================
    // LIFECYCLE
    // ========================================================================

    pub fn project_id(&self) -> Option<&str> {
        self.project_id.as_deref()
    }

    /// Discard the current ledger and start empty for another project
    pub fn switch_project(&mut self, project_id: impl Into<String>) {
        let project_id = project_id.into();
        info!(
            from = self.project_id.as_deref().unwrap_or("-"),
            to = %project_id,
            discarded_cells = self.ledger.cell_count(),
            "switching project"
        );
        self.resolver.set_project(Some(project_id.clone()));
        self.project_id = Some(project_id);
        self.ledger = MetricLedger::new();
        self.seen_batches.clear();
    }

    // ========================================================================
    // MUTATION
    // ========================================================================

    /// Merge one extraction response.
    ///
    /// A re-delivered batch skips the observation walk but still refreshes
    /// metric titles, so the result equals a plain merge.
    pub fn ingest(&mut self, response: &ExtractionResponse) -> BatchOutcome {
        let fingerprint = response.fingerprint();
        if self.seen_batches.contains(&fingerprint) {
            wire::refresh_titles(&mut self.ledger, response, self.key_strategy);
            info!(fingerprint = %&fingerprint[..12], "batch already merged, titles refreshed");
            return BatchOutcome::AlreadyMerged;
        }

        let outcome = wire::ingest_response(&mut self.ledger, response, self.key_strategy);
        self.seen_batches.insert(fingerprint);
        BatchOutcome::Merged(outcome)
    }

    pub fn merge_batch(
        &mut self,
        metric_key: &str,
        title: &str,
        period: Period,
        observations: Vec<Observation>,
    ) -> MergeOutcome {
        merge::merge_batch(&mut self.ledger, metric_key, title, period, observations)
    }

    pub fn select(&mut self, command: &SelectionCommand) -> Result<SelectionResult> {
        self.resolver.apply(&mut self.ledger, command)
    }

    pub fn select_observation(&mut self, metric_key: &str, period: Period, index: usize) -> Result<SelectionResult> {
        self.resolver
            .select_observation(&mut self.ledger, metric_key, period, index)
    }

    // ========================================================================
    // READS
    // ========================================================================

    pub fn ledger(&self) -> &MetricLedger {
        &self.ledger
    }

    /// Every selection event of this session, all projects
    pub fn journal(&self) -> &SelectionJournal {
        &self.journal
    }

    pub fn conflict_status(&self, metric_key: &str, period: Period) -> Result<ConflictStatus> {
        resolver::cell_status(&self.ledger, metric_key, period)
    }

    pub fn cell_details(&self, metric_key: &str, period: Period) -> Result<CellDetails> {
        resolver::cell_details(&self.ledger, metric_key, period)
    }

    /// Displayed value for one cell; None when there is no cell or no data
    pub fn display_value(&self, metric_key: &str, period: Period) -> Option<&Observation> {
        self.ledger
            .cell(metric_key, &period)
            .and_then(resolver::display_value)
    }

    /// Project onto the configured columns, or onto every known period
    pub fn project(&self) -> Table {
        match &self.columns {
            Some(periods) => projection::project(&self.ledger, periods),
            None => projection::project_all(&self.ledger),
        }
    }

    pub fn export(&self) -> Result<Vec<u8>> {
        export::serialize(&self.project(), &self.export_options)
    }

    pub fn export_options(&self) -> &ExportOptions {
        &self.export_options
    }
}
