//! Measurement setting registry.
//!
//! Two Alice-side and two Bob-side angles, plus the four pairings that feed
//! the CHSH sum with their sign. This is configuration data: which pairing
//! carries the minus sign is a labelling choice (any of the four can be
//! singled out by permuting labels), and the default of (A0, B1) gives
//! S = E(A0B0) − E(A0B1) + E(A1B0) + E(A1B1).

use std::f64::consts::{FRAC_PI_2, FRAC_PI_4};

use serde::{Deserialize, Serialize};

use crate::error::{ChshError, Result};

/// Which of the two correlated subsystems a setting applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Party {
    Alice,
    Bob,
}

impl std::fmt::Display for Party {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Alice => write!(f, "alice"),
            Self::Bob => write!(f, "bob"),
        }
    }
}

/// A named measurement angle (radians) on one side.
///
/// Any real angle is accepted; the simulated samplers are periodic in it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MeasurementSetting {
    pub label: String,
    pub angle: f64,
    pub party: Party,
}

impl MeasurementSetting {
    pub fn new(label: impl Into<String>, angle: f64, party: Party) -> Self {
        Self {
            label: label.into(),
            angle,
            party,
        }
    }
}

/// Contribution sign of one pairing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Sign {
    Plus,
    Minus,
}

impl Sign {
    pub fn factor(self) -> f64 {
        match self {
            Self::Plus => 1.0,
            Self::Minus => -1.0,
        }
    }
}

impl std::fmt::Display for Sign {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Plus => write!(f, "+"),
            Self::Minus => write!(f, "-"),
        }
    }
}

/// One (Alice setting, Bob setting) combination, by index into the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SettingPairing {
    pub alice: usize,
    pub bob: usize,
    pub sign: Sign,
}

/// The four settings and four signed pairings of one CHSH experiment.
///
/// Immutable once built; every constructor, deserialization included, checks
/// that the pairings cover the 2×2 combinations exactly once and that exactly
/// one of them is negative.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawSettingRegistry")]
pub struct SettingRegistry {
    alice: [MeasurementSetting; 2],
    bob: [MeasurementSetting; 2],
    pairings: [SettingPairing; 4],
}

#[derive(Deserialize)]
struct RawSettingRegistry {
    alice: [MeasurementSetting; 2],
    bob: [MeasurementSetting; 2],
    pairings: [SettingPairing; 4],
}

impl TryFrom<RawSettingRegistry> for SettingRegistry {
    type Error = ChshError;

    fn try_from(raw: RawSettingRegistry) -> Result<Self> {
        Self::new(raw.alice, raw.bob, raw.pairings)
    }
}

/// Default Alice angles `[A0, A1]`: X basis then Z basis.
pub const DEFAULT_ALICE_ANGLES: [f64; 2] = [FRAC_PI_2, 0.0];
/// Default Bob angles `[B0, B1]`: ±π/4 from the Z axis.
pub const DEFAULT_BOB_ANGLES: [f64; 2] = [FRAC_PI_4, -FRAC_PI_4];
/// Default negative pairing `(alice index, bob index)`: (A0, B1).
pub const DEFAULT_NEGATIVE_PAIRING: (usize, usize) = (0, 1);

impl Default for SettingRegistry {
    fn default() -> Self {
        Self::standard_layout(DEFAULT_ALICE_ANGLES, DEFAULT_BOB_ANGLES, DEFAULT_NEGATIVE_PAIRING)
    }
}

impl SettingRegistry {
    /// Standard layout: labels A0/A1/B0/B1, pairings in the order
    /// (A0,B0), (A0,B1), (A1,B0), (A1,B1), with `negative` = (i, j) carrying
    /// the minus sign.
    pub fn standard(alice: [f64; 2], bob: [f64; 2], negative: (usize, usize)) -> Result<Self> {
        let registry = Self::standard_layout(alice, bob, negative);
        registry.validate()?;
        Ok(registry)
    }

    fn standard_layout(alice: [f64; 2], bob: [f64; 2], negative: (usize, usize)) -> Self {
        let pairings = [(0, 0), (0, 1), (1, 0), (1, 1)].map(|(a, b)| SettingPairing {
            alice: a,
            bob: b,
            sign: if (a, b) == negative {
                Sign::Minus
            } else {
                Sign::Plus
            },
        });
        Self {
            alice: [
                MeasurementSetting::new("A0", alice[0], Party::Alice),
                MeasurementSetting::new("A1", alice[1], Party::Alice),
            ],
            bob: [
                MeasurementSetting::new("B0", bob[0], Party::Bob),
                MeasurementSetting::new("B1", bob[1], Party::Bob),
            ],
            pairings,
        }
    }

    /// Build from explicit settings and pairings, checking consistency.
    pub fn new(
        alice: [MeasurementSetting; 2],
        bob: [MeasurementSetting; 2],
        pairings: [SettingPairing; 4],
    ) -> Result<Self> {
        let registry = Self {
            alice,
            bob,
            pairings,
        };
        registry.validate()?;
        Ok(registry)
    }

    /// Check party tags, 2×2 coverage and the single negative sign.
    pub fn validate(&self) -> Result<()> {
        if self.alice.iter().any(|s| s.party != Party::Alice)
            || self.bob.iter().any(|s| s.party != Party::Bob)
        {
            return Err(ChshError::InvalidConfig(
                "setting assigned to the wrong party".into(),
            ));
        }
        if let Some(s) = self
            .alice
            .iter()
            .chain(self.bob.iter())
            .find(|s| !s.angle.is_finite())
        {
            return Err(ChshError::InvalidConfig(format!(
                "setting {} has non-finite angle {}",
                s.label, s.angle
            )));
        }

        let mut seen = [[false; 2]; 2];
        for p in &self.pairings {
            if p.alice > 1 || p.bob > 1 {
                return Err(ChshError::InvalidConfig(format!(
                    "pairing index ({}, {}) out of range",
                    p.alice, p.bob
                )));
            }
            if seen[p.alice][p.bob] {
                return Err(ChshError::InvalidConfig(format!(
                    "pairing ({}, {}) listed twice",
                    self.alice[p.alice].label, self.bob[p.bob].label
                )));
            }
            seen[p.alice][p.bob] = true;
        }

        let negatives = self
            .pairings
            .iter()
            .filter(|p| p.sign == Sign::Minus)
            .count();
        if negatives != 1 {
            return Err(ChshError::InvalidConfig(format!(
                "exactly one pairing must carry the minus sign, found {negatives}"
            )));
        }
        Ok(())
    }

    pub fn alice(&self) -> &[MeasurementSetting; 2] {
        &self.alice
    }

    pub fn bob(&self) -> &[MeasurementSetting; 2] {
        &self.bob
    }

    /// Pairings in their fixed measurement order.
    pub fn pairings(&self) -> &[SettingPairing; 4] {
        &self.pairings
    }

    /// Angles `(alice, bob)` for a pairing.
    pub fn angles(&self, pairing: &SettingPairing) -> (f64, f64) {
        (self.alice[pairing.alice].angle, self.bob[pairing.bob].angle)
    }

    /// Display label such as `"A0B1"`.
    pub fn label(&self, pairing: &SettingPairing) -> String {
        format!(
            "{}{}",
            self.alice[pairing.alice].label, self.bob[pairing.bob].label
        )
    }

    /// The pairing carrying the minus sign.
    pub fn negative_pairing(&self) -> &SettingPairing {
        self.pairings
            .iter()
            .find(|p| p.sign == Sign::Minus)
            .unwrap_or(&self.pairings[0])
    }

    /// Copy of this registry with every Alice angle shifted by `-theta`.
    ///
    /// Rotating Alice's qubit by RY(θ) before a measurement at angle `a`
    /// is the same as measuring at `a − θ`.
    pub fn with_alice_rotation(&self, theta: f64) -> Self {
        let mut rotated = self.clone();
        for s in &mut rotated.alice {
            s.angle -= theta;
        }
        rotated
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_angles() {
        let r = SettingRegistry::default();
        assert_eq!(r.alice()[0].angle, FRAC_PI_2);
        assert_eq!(r.alice()[1].angle, 0.0);
        assert_eq!(r.bob()[0].angle, FRAC_PI_4);
        assert_eq!(r.bob()[1].angle, -FRAC_PI_4);
    }

    #[test]
    fn test_default_order_and_sign() {
        let r = SettingRegistry::default();
        let labels: Vec<String> = r.pairings().iter().map(|p| r.label(p)).collect();
        assert_eq!(labels, ["A0B0", "A0B1", "A1B0", "A1B1"]);
        let signs: Vec<Sign> = r.pairings().iter().map(|p| p.sign).collect();
        assert_eq!(signs, [Sign::Plus, Sign::Minus, Sign::Plus, Sign::Plus]);
        assert_eq!(r.label(r.negative_pairing()), "A0B1");
    }

    #[test]
    fn test_negative_pairing_is_configurable() {
        let r =
            SettingRegistry::standard(DEFAULT_ALICE_ANGLES, DEFAULT_BOB_ANGLES, (1, 0)).unwrap();
        assert_eq!(r.label(r.negative_pairing()), "A1B0");
    }

    #[test]
    fn test_out_of_range_negative_rejected() {
        // (2, 0) matches no pairing, so nothing is negative.
        let err = SettingRegistry::standard(DEFAULT_ALICE_ANGLES, DEFAULT_BOB_ANGLES, (2, 0))
            .unwrap_err();
        assert!(matches!(err, ChshError::InvalidConfig(_)));
    }

    #[test]
    fn test_duplicate_pairing_rejected() {
        let r = SettingRegistry::default();
        let mut pairings = *r.pairings();
        pairings[3] = SettingPairing {
            alice: 0,
            bob: 0,
            sign: Sign::Plus,
        };
        let err = SettingRegistry::new(r.alice().clone(), r.bob().clone(), pairings).unwrap_err();
        assert!(err.to_string().contains("listed twice"));
    }

    #[test]
    fn test_two_negatives_rejected() {
        let r = SettingRegistry::default();
        let mut pairings = *r.pairings();
        pairings[0].sign = Sign::Minus;
        assert!(SettingRegistry::new(r.alice().clone(), r.bob().clone(), pairings).is_err());
    }

    #[test]
    fn test_wrong_party_rejected() {
        let r = SettingRegistry::default();
        let mut alice = r.alice().clone();
        alice[1].party = Party::Bob;
        assert!(SettingRegistry::new(alice, r.bob().clone(), *r.pairings()).is_err());
    }

    #[test]
    fn test_non_finite_angle_rejected() {
        assert!(
            SettingRegistry::standard([f64::NAN, 0.0], DEFAULT_BOB_ANGLES, (0, 1)).is_err()
        );
    }

    #[test]
    fn test_large_angles_accepted() {
        let alice = [10.0 * std::f64::consts::PI, -7.5];
        let r = SettingRegistry::standard(alice, [123.0, -0.1], (0, 1));
        assert!(r.is_ok());
    }

    #[test]
    fn test_alice_rotation_leaves_original() {
        let r = SettingRegistry::default();
        let rotated = r.with_alice_rotation(0.25);
        assert_eq!(rotated.alice()[1].angle, -0.25);
        assert_eq!(r.alice()[1].angle, 0.0);
        assert_eq!(rotated.bob(), r.bob());
    }

    #[test]
    fn test_registry_serde_roundtrip() {
        let r = SettingRegistry::default();
        let json = serde_json::to_string(&r).unwrap();
        let back: SettingRegistry = serde_json::from_str(&json).unwrap();
        assert_eq!(back, r);
    }

    #[test]
    fn test_registry_deserialize_validates() {
        let mut value = serde_json::to_value(SettingRegistry::default()).unwrap();
        value["pairings"][0]["alice"] = serde_json::json!(5);
        let err = serde_json::from_value::<SettingRegistry>(value).unwrap_err();
        assert!(err.to_string().contains("out of range"), "{err}");

        let mut value = serde_json::to_value(SettingRegistry::default()).unwrap();
        value["pairings"][2]["sign"] = serde_json::json!("minus");
        assert!(serde_json::from_value::<SettingRegistry>(value).is_err());
    }
}
