// 📅 Period - fiscal month value type
//
// Canonical ordering is most recent first: sorting a Vec<Period> ascending
// yields the display/export column order (2025-03, 2025-02, ..., 2023-12).

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "RawPeriod")]
pub struct Period {
    pub year: i32,
    pub month: u8,
}

/// Unvalidated wire shape, checked by `TryFrom` before it becomes a Period
#[derive(Deserialize)]
struct RawPeriod {
    year: i32,
    month: i64,
}

impl TryFrom<RawPeriod> for Period {
    type Error = String;

    fn try_from(raw: RawPeriod) -> Result<Self, Self::Error> {
        u8::try_from(raw.month)
            .ok()
            .and_then(|month| Period::new(raw.year, month))
            .ok_or_else(|| format!("month {} outside 1..=12", raw.month))
    }
}

impl Period {
    /// Returns None when month is outside 1..=12
    pub fn new(year: i32, month: u8) -> Option<Self> {
        if (1..=12).contains(&month) {
            Some(Period { year, month })
        } else {
            None
        }
    }

    /// Column label used in projections and exports, e.g. "2024-01"
    pub fn label(&self) -> String {
        format!("{:04}-{:02}", self.year, self.month)
    }

    /// Every month of the given years, canonical order, duplicates removed
    pub fn months_of_years(years: &[i32]) -> Vec<Period> {
        let mut periods: Vec<Period> = years
            .iter()
            .flat_map(|&year| (1..=12).map(move |month| Period { year, month }))
            .collect();
        periods.sort();
        periods.dedup();
        periods
    }
}

impl Ord for Period {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reversed: later periods sort first
        (other.year, other.month).cmp(&(self.year, self.month))
    }
}

impl PartialOrd for Period {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for Period {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.label())
    }
}
