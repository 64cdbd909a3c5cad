// 🔎 Observation - one candidate value with its provenance

use serde::{Deserialize, Serialize};

/// One value for one metric at one period, as reported by one source page.
///
/// `value == None` means the source had no figure for this cell. It is kept
/// (the citation still matters) but never counts as a disagreement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    pub value: Option<f64>,

    /// Human label of the source document, e.g. "10-K" or "Investor Deck"
    pub source_label: String,

    /// Citation / page image URL
    pub source_ref: String,
}

impl Observation {
    pub fn new(value: Option<f64>, source_label: impl Into<String>, source_ref: impl Into<String>) -> Self {
        Observation {
            value,
            source_label: source_label.into(),
            source_ref: source_ref.into(),
        }
    }

    /// Structural duplicate test used by the batch merger: same source label
    /// and same value. The citation URL is not part of identity.
    pub fn is_duplicate_of(&self, other: &Observation) -> bool {
        self.source_label == other.source_label && self.value == other.value
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_duplicate_ignores_citation() {
        let a = Observation::new(Some(1000.0), "10-K", "https://img/p3.png");
        let b = Observation::new(Some(1000.0), "10-K", "https://img/p9.png");
        assert!(a.is_duplicate_of(&b));
    }

    #[test]
    fn test_null_values_are_duplicates() {
        let a = Observation::new(None, "10-K", "u1");
        let b = Observation::new(None, "10-K", "u2");
        assert!(a.is_duplicate_of(&b));
    }

    #[test]
    fn test_different_source_or_value_not_duplicate() {
        let a = Observation::new(Some(1000.0), "10-K", "u");
        assert!(!a.is_duplicate_of(&Observation::new(Some(1000.0), "Investor Deck", "u")));
        assert!(!a.is_duplicate_of(&Observation::new(Some(1200.0), "10-K", "u")));
        assert!(!a.is_duplicate_of(&Observation::new(None, "10-K", "u")));
    }
}
