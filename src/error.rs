// Error taxonomy for the reconciliation engine
//
// Selection and inspection failures are recovered locally: the ledger is
// never touched when one of these is returned.

use crate::period::Period;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ReconError {
    /// A selection addressed an observation index the cell does not have
    #[error("observation index {index} out of range for {metric_key} @ {period} ({len} observations)")]
    OutOfRange {
        metric_key: String,
        period: Period,
        index: usize,
        len: usize,
    },

    /// No cell exists for this (metric, period)
    #[error("no cell for {metric_key} @ {period}")]
    UnknownCell { metric_key: String, period: Period },

    /// Spreadsheet export failed
    #[error("export error: {0}")]
    Export(#[from] csv::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Selection audit log failure
    #[error("audit log error: {0}")]
    Audit(#[from] rusqlite::Error),

    #[error("configuration error: {0}")]
    Config(String),

    /// Upstream fetch failed (network, auth, non-2xx)
    #[cfg(feature = "fetch")]
    #[error("fetch error: {0}")]
    Fetch(#[from] reqwest::Error),

    /// Fetch task for a year panicked or was cancelled before reporting
    #[cfg(feature = "fetch")]
    #[error("fetch for {year} did not complete: {reason}")]
    FetchAborted { year: i32, reason: String },

    /// Extraction payload could not be decoded
    #[error("wire format error: {0}")]
    Wire(#[from] serde_json::Error),
}

impl ReconError {
    /// True for the two addressing errors a caller can recover from by
    /// refreshing its view of the ledger.
    pub fn is_addressing(&self) -> bool {
        matches!(
            self,
            ReconError::OutOfRange { .. } | ReconError::UnknownCell { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, ReconError>;
