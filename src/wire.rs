// 🛰️ Extraction wire format - the response shape the extraction service
// returns per fetch, and the walk that turns it into merge calls.
//
// { rows: [ { period: {year, month}, pageNumber?, items: [
//     { title, key?, values: [ {value, source?, url} ] } ] } ] }
//
// Values are loosely typed upstream (numbers, numeric strings with
// separators, null, junk). Anything unparseable becomes None here, before
// the merger ever sees it.

use crate::error::Result;
use crate::ledger::MetricLedger;
use crate::merge::{merge_batch, MergeOutcome};
use crate::observation::Observation;
use crate::period::Period;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::path::Path;
use tracing::{debug, warn};

// ============================================================================
// WIRE TYPES
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExtractionResponse {
    #[serde(default)]
    pub rows: Vec<ExtractionRow>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractionRow {
    pub period: Period,

    /// Page the row was read from, used as a fallback source label
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page_number: Option<u32>,

    #[serde(default)]
    pub items: Vec<ExtractionItem>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractionItem {
    pub title: String,

    /// Stable key when the service provides one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,

    #[serde(default)]
    pub values: Vec<ExtractionValue>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractionValue {
    #[serde(default)]
    pub value: serde_json::Value,

    #[serde(default)]
    pub source: String,

    #[serde(default)]
    pub url: String,
}

impl ExtractionResponse {
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn from_path(path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json(&json)
    }

    /// SHA-256 of the canonical JSON form. Identical deliveries share a
    /// fingerprint regardless of upstream whitespace or key order.
    pub fn fingerprint(&self) -> String {
        let canonical = serde_json::to_vec(self).unwrap_or_default();
        let mut hasher = Sha256::new();
        hasher.update(&canonical);
        format!("{:x}", hasher.finalize())
    }
}

// ============================================================================
// METRIC KEYS
// ============================================================================

/// How a metric key is derived from a wire item
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeyStrategy {
    /// Key = display title
    #[default]
    Title,

    /// Key = slug of the title ("Net Revenue" → "net-revenue")
    Slug,

    /// Key = the item's own `key`, falling back to the title
    ItemKey,
}

impl KeyStrategy {
    pub fn key_for(&self, item: &ExtractionItem) -> String {
        match self {
            KeyStrategy::Title => item.title.trim().to_string(),
            KeyStrategy::Slug => slugify(&item.title),
            KeyStrategy::ItemKey => match item.key.as_deref().map(str::trim) {
                Some(key) if !key.is_empty() => key.to_string(),
                _ => item.title.trim().to_string(),
            },
        }
    }
}

/// Lowercase, runs of non-alphanumerics collapsed to a single '-'
pub fn slugify(title: &str) -> String {
    let mut slug = String::with_capacity(title.len());
    let mut pending_dash = false;

    for ch in title.chars() {
        if ch.is_alphanumeric() {
            if pending_dash && !slug.is_empty() {
                slug.push('-');
            }
            pending_dash = false;
            slug.extend(ch.to_lowercase());
        } else {
            pending_dash = true;
        }
    }

    slug
}

// ============================================================================
// VALUE COERCION
// ============================================================================

/// Numbers pass through, numeric strings are parsed after dropping grouping
/// separators, everything else (null, junk, non-finite) is None.
pub fn coerce_value(raw: &serde_json::Value) -> Option<f64> {
    match raw {
        serde_json::Value::Null => None,
        serde_json::Value::Number(n) => n.as_f64().filter(|v| v.is_finite()),
        serde_json::Value::String(s) => {
            let cleaned: String = s
                .trim()
                .chars()
                .filter(|c| !matches!(c, ',' | '_' | ' '))
                .collect();
            if cleaned.is_empty() || cleaned.eq_ignore_ascii_case("none") || cleaned == "-" {
                return None;
            }
            match cleaned.parse::<f64>() {
                Ok(v) if v.is_finite() => Some(v),
                _ => {
                    warn!(raw = %s, "unparseable value coerced to null");
                    None
                }
            }
        }
        other => {
            warn!(raw = %other, "non-numeric value coerced to null");
            None
        }
    }
}

// ============================================================================
// INGESTION
// ============================================================================

/// Walk a response and issue one merge per (metric, period) item.
pub fn ingest_response(
    ledger: &mut MetricLedger,
    response: &ExtractionResponse,
    strategy: KeyStrategy,
) -> MergeOutcome {
    let mut total = MergeOutcome::default();

    for row in &response.rows {
        for item in &row.items {
            let key = strategy.key_for(item);
            if key.is_empty() {
                warn!(period = %row.period, "skipping item without title");
                continue;
            }

            let observations = item
                .values
                .iter()
                .map(|v| Observation {
                    value: coerce_value(&v.value),
                    source_label: source_label(v, row.page_number),
                    source_ref: v.url.clone(),
                })
                .collect();

            total.absorb(merge_batch(ledger, &key, item.title.trim(), row.period, observations));
        }
    }

    debug!(
        rows = response.rows.len(),
        appended = total.appended,
        duplicates = total.duplicates,
        "ingested extraction response"
    );

    total
}

/// Title pass of `ingest_response` without touching any cell.
///
/// Re-registers every item a merge would register, in the same order, so a
/// skipped re-delivery still leaves the last-written titles in place.
pub fn refresh_titles(ledger: &mut MetricLedger, response: &ExtractionResponse, strategy: KeyStrategy) {
    for row in &response.rows {
        for item in row.items.iter().filter(|item| !item.values.is_empty()) {
            let key = strategy.key_for(item);
            if !key.is_empty() {
                ledger.register_metric(&key, item.title.trim());
            }
        }
    }
}

fn source_label(value: &ExtractionValue, page_number: Option<u32>) -> String {
    let source = value.source.trim();
    if !source.is_empty() {
        return source.to_string();
    }
    match page_number {
        Some(page) => format!("page {}", page),
        None => "unknown source".to_string(),
    }
}
