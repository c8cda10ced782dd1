//! Phase scan: S as a function of an extra rotation on Alice's qubit.

use serde::{Deserialize, Serialize};

use crate::chsh::{self, CLASSICAL_BOUND};
use crate::error::{ChshError, Result};
use crate::sampler::Sampler;
use crate::settings::SettingRegistry;

/// One point of a phase scan.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PhasePoint {
    pub theta: f64,
    pub s: f64,
}

/// `n` evenly spaced values from `start` to `end`, both ends included.
pub fn linspace(start: f64, end: f64, n: usize) -> Vec<f64> {
    match n {
        0 => Vec::new(),
        1 => vec![start],
        _ => {
            let step = (end - start) / (n - 1) as f64;
            (0..n)
                .map(|i| if i == n - 1 { end } else { start + step * i as f64 })
                .collect()
        }
    }
}

/// Run one CHSH measurement per phase, rotating Alice's qubit by θ first.
///
/// Stops at the first failing phase; no partial scan is returned.
pub fn phase_scan(
    sampler: &dyn Sampler,
    registry: &SettingRegistry,
    phases: &[f64],
    sample_size: Option<u64>,
) -> Result<Vec<PhasePoint>> {
    if let Some(theta) = phases.iter().find(|t| !t.is_finite()) {
        return Err(ChshError::InvalidConfig(format!("phase {theta} is not finite")));
    }

    let mut points = Vec::with_capacity(phases.len());
    for &theta in phases {
        let rotated = registry.with_alice_rotation(theta);
        let result = chsh::run(sampler, &rotated, sample_size)?;
        log::debug!("theta = {theta:.4}: S = {:.4}", result.s);
        points.push(PhasePoint { theta, s: result.s });
    }
    Ok(points)
}

/// Any point with |S| above the classical bound of 2.
pub fn violation_detected(points: &[PhasePoint]) -> bool {
    points.iter().any(|p| p.s.abs() > CLASSICAL_BOUND)
}
