//! Serializable summary of one CHSH run.

use serde::{Deserialize, Serialize};

use crate::chsh::{CLASSICAL_BOUND, ChshResult, TSIRELSON_BOUND};
use crate::settings::Sign;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PairingReport {
    pub label: String,
    pub alice_angle: f64,
    pub bob_angle: f64,
    pub sign: Sign,
    pub expectation: f64,
    /// Trials behind the estimate; absent for exact runs.
    pub trials: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChshReport {
    pub sampler: String,
    pub pairings: Vec<PairingReport>,
    pub s: f64,
    pub tsirelson_bound: f64,
    pub tsirelson_gap: f64,
    pub classical_bound: f64,
    pub violates_classical_bound: bool,
}

impl ChshReport {
    pub fn new(sampler: impl Into<String>, result: &ChshResult) -> Self {
        let pairings = result
            .pairings
            .iter()
            .map(|p| PairingReport {
                label: p.label.clone(),
                alice_angle: p.alice_angle,
                bob_angle: p.bob_angle,
                sign: p.sign(),
                expectation: p.expectation,
                trials: p.distribution.trials(),
            })
            .collect();
        Self {
            sampler: sampler.into(),
            pairings,
            s: result.s,
            tsirelson_bound: TSIRELSON_BOUND,
            tsirelson_gap: result.tsirelson_gap(),
            classical_bound: CLASSICAL_BOUND,
            violates_classical_bound: result.violates_classical_bound(),
        }
    }

    /// Plain-text lines: one `E(label) = value` per pairing, then S and its gap.
    pub fn lines(&self) -> Vec<String> {
        let mut out: Vec<String> = self
            .pairings
            .iter()
            .map(|p| format!("E({}) = {:.4}  [{}]", p.label, p.expectation, p.sign))
            .collect();
        out.push(format!("S = {:.6}", self.s));
        out.push(format!("S - 2√2: {:+.6}", self.tsirelson_gap));
        out.push(if self.violates_classical_bound {
            format!("|S| > {} : classical bound violated", self.classical_bound)
        } else {
            format!("|S| <= {} : no violation", self.classical_bound)
        });
        out
    }
}
