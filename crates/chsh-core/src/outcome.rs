//! Joint binary outcomes of one correlation measurement.
//!
//! Labels are written Alice's bit first, Bob's bit second: `"01"` means Alice
//! read 0 and Bob read 1. Every sampler in this crate produces labels in that
//! order; the estimator only relies on the order being consistent.

use serde::{Deserialize, Serialize};

use crate::error::{ChshError, Result};

/// Tolerance on the probability sum in [`OutcomeDistribution::Probability`] mode.
pub const PROBABILITY_TOLERANCE: f64 = 1e-6;

/// One of the four joint outcomes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Outcome {
    #[serde(rename = "00")]
    ZeroZero,
    #[serde(rename = "01")]
    ZeroOne,
    #[serde(rename = "10")]
    OneZero,
    #[serde(rename = "11")]
    OneOne,
}

impl Outcome {
    /// All outcomes in label order.
    pub const ALL: [Outcome; 4] = [
        Outcome::ZeroZero,
        Outcome::ZeroOne,
        Outcome::OneZero,
        Outcome::OneOne,
    ];

    pub fn from_bits(alice: bool, bob: bool) -> Self {
        match (alice, bob) {
            (false, false) => Self::ZeroZero,
            (false, true) => Self::ZeroOne,
            (true, false) => Self::OneZero,
            (true, true) => Self::OneOne,
        }
    }

    /// Parse a two-symbol label such as `"10"`.
    pub fn from_label(label: &str) -> Option<Self> {
        match label {
            "00" => Some(Self::ZeroZero),
            "01" => Some(Self::ZeroOne),
            "10" => Some(Self::OneZero),
            "11" => Some(Self::OneOne),
            _ => None,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::ZeroZero => "00",
            Self::ZeroOne => "01",
            Self::OneZero => "10",
            Self::OneOne => "11",
        }
    }

    /// Both parties read the same bit.
    pub fn is_agreement(self) -> bool {
        matches!(self, Self::ZeroZero | Self::OneOne)
    }

    /// Position in [`Outcome::ALL`].
    pub fn index(self) -> usize {
        match self {
            Self::ZeroZero => 0,
            Self::ZeroOne => 1,
            Self::OneZero => 2,
            Self::OneOne => 3,
        }
    }
}

impl std::fmt::Display for Outcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// Weights over the four joint outcomes, indexed by [`Outcome::index`].
///
/// `Counts` is an empirical frequency table (total = number of trials).
/// `Probability` is an exact distribution (total = 1 within
/// [`PROBABILITY_TOLERANCE`]).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "mode", content = "weights", rename_all = "snake_case")]
pub enum OutcomeDistribution {
    Counts([u64; 4]),
    Probability([f64; 4]),
}

impl OutcomeDistribution {
    /// Build a frequency table from `(label, count)` pairs.
    ///
    /// Missing labels count as zero; repeated labels accumulate. Unknown
    /// labels are rejected.
    pub fn from_counts<'a, I>(pairs: I) -> Result<Self>
    where
        I: IntoIterator<Item = (&'a str, u64)>,
    {
        let mut counts = [0u64; 4];
        for (label, n) in pairs {
            let outcome = Outcome::from_label(label).ok_or_else(|| {
                ChshError::InvalidDistribution(format!("unknown outcome label '{label}'"))
            })?;
            counts[outcome.index()] += n;
        }
        Ok(Self::Counts(counts))
    }

    /// Build an exact distribution from `(label, probability)` pairs.
    pub fn from_probabilities<'a, I>(pairs: I) -> Result<Self>
    where
        I: IntoIterator<Item = (&'a str, f64)>,
    {
        let mut probs = [0.0f64; 4];
        for (label, p) in pairs {
            let outcome = Outcome::from_label(label).ok_or_else(|| {
                ChshError::InvalidDistribution(format!("unknown outcome label '{label}'"))
            })?;
            probs[outcome.index()] += p;
        }
        Ok(Self::Probability(probs))
    }

    pub fn is_counts(&self) -> bool {
        matches!(self, Self::Counts(_))
    }

    /// Weight of one outcome as a float.
    pub fn weight(&self, outcome: Outcome) -> f64 {
        match self {
            Self::Counts(c) => c[outcome.index()] as f64,
            Self::Probability(p) => p[outcome.index()],
        }
    }

    /// Sum of all four weights.
    pub fn total(&self) -> f64 {
        match self {
            Self::Counts(c) => c.iter().map(|&n| n as f64).sum(),
            Self::Probability(p) => p.iter().sum(),
        }
    }

    /// Number of trials behind a frequency table; `None` for exact distributions.
    pub fn trials(&self) -> Option<u64> {
        match self {
            Self::Counts(c) => Some(c.iter().sum()),
            Self::Probability(_) => None,
        }
    }

    /// Check the invariant: positive total, and for probabilities finite
    /// non-negative weights summing to one.
    pub fn validate(&self) -> Result<()> {
        match self {
            Self::Counts(c) => {
                if c.iter().all(|&n| n == 0) {
                    return Err(ChshError::InvalidDistribution(
                        "frequency table has zero total".into(),
                    ));
                }
            }
            Self::Probability(p) => {
                if let Some(bad) = p.iter().find(|w| !w.is_finite() || **w < 0.0) {
                    return Err(ChshError::InvalidDistribution(format!(
                        "probability weight {bad} is negative or not finite"
                    )));
                }
                let sum: f64 = p.iter().sum();
                if sum <= 0.0 {
                    return Err(ChshError::InvalidDistribution(
                        "probability vector has zero total".into(),
                    ));
                }
                if (sum - 1.0).abs() > PROBABILITY_TOLERANCE {
                    return Err(ChshError::InvalidDistribution(format!(
                        "probabilities sum to {sum}, expected 1.0"
                    )));
                }
            }
        }
        Ok(())
    }

    /// `(label, weight)` pairs in label order, for display.
    pub fn entries(&self) -> [(&'static str, f64); 4] {
        Outcome::ALL.map(|o| (o.label(), self.weight(o)))
    }
}

impl std::fmt::Display for OutcomeDistribution {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let body = match self {
            Self::Counts(c) => Outcome::ALL
                .iter()
                .map(|o| format!("'{}': {}", o.label(), c[o.index()]))
                .collect::<Vec<_>>(),
            Self::Probability(p) => Outcome::ALL
                .iter()
                .map(|o| format!("'{}': {:.6}", o.label(), p[o.index()]))
                .collect::<Vec<_>>(),
        };
        write!(f, "{{{}}}", body.join(", "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // -----------------------------------------------------------------------
    // Outcome labels
    // -----------------------------------------------------------------------

    #[test]
    fn test_label_roundtrip() {
        for o in Outcome::ALL {
            assert_eq!(Outcome::from_label(o.label()), Some(o));
        }
        assert_eq!(Outcome::from_label("2"), None);
        assert_eq!(Outcome::from_label("001"), None);
    }

    #[test]
    fn test_from_bits_alice_first() {
        assert_eq!(Outcome::from_bits(false, true).label(), "01");
        assert_eq!(Outcome::from_bits(true, false).label(), "10");
    }

    #[test]
    fn test_agreement() {
        assert!(Outcome::ZeroZero.is_agreement());
        assert!(Outcome::OneOne.is_agreement());
        assert!(!Outcome::ZeroOne.is_agreement());
        assert!(!Outcome::OneZero.is_agreement());
    }

    // -----------------------------------------------------------------------
    // Distribution construction and validation
    // -----------------------------------------------------------------------

    #[test]
    fn test_missing_labels_are_zero() {
        let d = OutcomeDistribution::from_counts([("00", 5), ("11", 3)]).unwrap();
        assert_eq!(d, OutcomeDistribution::Counts([5, 0, 0, 3]));
        assert_eq!(d.trials(), Some(8));
    }

    #[test]
    fn test_unknown_label_rejected() {
        let err = OutcomeDistribution::from_counts([("0x", 1)]).unwrap_err();
        assert!(matches!(err, ChshError::InvalidDistribution(_)));
    }

    #[test]
    fn test_zero_counts_invalid() {
        let d = OutcomeDistribution::Counts([0; 4]);
        assert!(d.validate().is_err());
    }

    #[test]
    fn test_probability_sum_checked() {
        assert!(
            OutcomeDistribution::Probability([0.5, 0.0, 0.0, 0.5])
                .validate()
                .is_ok()
        );
        assert!(
            OutcomeDistribution::Probability([0.5, 0.0, 0.0, 0.4])
                .validate()
                .is_err()
        );
        assert!(
            OutcomeDistribution::Probability([0.25 + 1e-8, 0.25, 0.25, 0.25])
                .validate()
                .is_ok()
        );
    }

    #[test]
    fn test_negative_probability_rejected() {
        let d = OutcomeDistribution::Probability([1.2, -0.2, 0.0, 0.0]);
        assert!(d.validate().is_err());
        let d = OutcomeDistribution::Probability([f64::NAN, 0.0, 0.0, 1.0]);
        assert!(d.validate().is_err());
    }

    #[test]
    fn test_display_lists_labels() {
        let d = OutcomeDistribution::Counts([1, 2, 3, 4]);
        assert_eq!(d.to_string(), "{'00': 1, '01': 2, '10': 3, '11': 4}");
    }

    #[test]
    fn test_serde_shape() {
        let d = OutcomeDistribution::Counts([1, 2, 3, 4]);
        let json = serde_json::to_string(&d).unwrap();
        assert_eq!(json, r#"{"mode":"counts","weights":[1,2,3,4]}"#);
        let back: OutcomeDistribution = serde_json::from_str(&json).unwrap();
        assert_eq!(back, d);
    }
}
