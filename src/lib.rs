// Metrics Reconciliation - Core Library
// Exposes all modules for use in CLI, API server, and tests

pub mod error;
pub mod period;
pub mod observation;
pub mod ledger;
pub mod merge;          // Batch merge, append-only and idempotent
pub mod resolver;       // Conflict status + selections
pub mod projection;     // Metric × period table
pub mod export;         // CSV export
pub mod wire;           // Extraction response ingestion
pub mod audit;          // SQLite selection log
pub mod config;
pub mod session;

#[cfg(feature = "fetch")]
pub mod fetch;

#[cfg(feature = "server")]
pub mod api;

// Re-export commonly used types
pub use error::{ReconError, Result};
pub use period::Period;
pub use observation::Observation;
pub use ledger::{Cell, Metric, MetricLedger};
pub use merge::{merge_batch, MergeOutcome};
pub use resolver::{
    cell_details, conflict_status, display_index, display_value,
    CellDetails, ConflictResolver, ConflictStatus,
    SelectionCommand, SelectionEvent, SelectionJournal, SelectionResult, SelectionSink,
};
pub use projection::{project, project_all, ProjectedCell, Table, TableRow};
pub use export::{format_number, serialize as serialize_csv, write_csv, ExportOptions};
pub use wire::{
    coerce_value, ingest_response, slugify,
    ExtractionItem, ExtractionResponse, ExtractionRow, ExtractionValue, KeyStrategy,
};
pub use audit::SqliteAuditLog;
pub use config::ReconConfig;
pub use session::{BatchOutcome, ReconciliationSession};

#[cfg(feature = "fetch")]
pub use fetch::ExtractionClient;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
