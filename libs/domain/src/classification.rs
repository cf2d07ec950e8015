//! Device-type classification result

use serde::{Deserialize, Serialize};

use crate::enums::Confidence;

/// A criterion that contributed to a classification match
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchCriterion {
    Vendor,
    Motherboard,
    Cpu,
    Cores,
}

/// Result of classifying discovered hardware against the catalog
///
/// For identical facts and an identical catalog snapshot the result is
/// identical; classification performs no I/O.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Classification {
    /// Best-matching device type, if any candidate cleared the floor
    pub device_type: Option<String>,

    /// Confidence bucket for the match
    pub confidence: Confidence,

    /// Criteria that matched for the winning candidate
    pub matched: Vec<MatchCriterion>,

    /// Raw weighted score of the winning candidate
    pub score: f64,
}

impl Classification {
    /// The result returned when no vendor matched at all
    #[must_use]
    pub fn no_match() -> Self {
        Self {
            device_type: None,
            confidence: Confidence::None,
            matched: Vec::new(),
            score: 0.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_match_shape() {
        let result = Classification::no_match();
        assert!(result.device_type.is_none());
        assert_eq!(result.confidence, Confidence::None);
        assert!(result.matched.is_empty());
    }
}
