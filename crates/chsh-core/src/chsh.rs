//! CHSH aggregator: four signed correlation estimates combined into S.
//!
//! The pairings are measured in registry order. A sampler or estimator
//! failure on any pairing fails the whole run; a value built from fewer than
//! four pairings is never returned.
//!
//! Each run measures pairing `i` on draw stream `first_stream + i`, so a
//! seeded sampler gives the same S for a run whether its pairings are
//! measured in order or on concurrent threads.

use serde::{Deserialize, Serialize};

use crate::error::{ChshError, Result};
use crate::estimator::estimate;
use crate::outcome::OutcomeDistribution;
use crate::sampler::Sampler;
use crate::settings::{SettingPairing, SettingRegistry, Sign};

/// Tsirelson's bound, the largest |S| quantum correlations can reach.
pub const TSIRELSON_BOUND: f64 = 2.0 * std::f64::consts::SQRT_2;

/// Largest |S| any local hidden-variable model can produce.
pub const CLASSICAL_BOUND: f64 = 2.0;

/// One measured pairing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PairingOutcome {
    pub label: String,
    pub pairing: SettingPairing,
    pub alice_angle: f64,
    pub bob_angle: f64,
    pub distribution: OutcomeDistribution,
    pub expectation: f64,
}

impl PairingOutcome {
    pub fn sign(&self) -> Sign {
        self.pairing.sign
    }

    /// Signed contribution to S.
    pub fn contribution(&self) -> f64 {
        self.pairing.sign.factor() * self.expectation
    }
}

/// The four pairing outcomes and S = Σ sign·E.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChshResult {
    pub pairings: Vec<PairingOutcome>,
    pub s: f64,
}

impl ChshResult {
    /// Signed difference S − 2√2.
    pub fn tsirelson_gap(&self) -> f64 {
        self.s - TSIRELSON_BOUND
    }

    /// |S| above the classical bound.
    pub fn violates_classical_bound(&self) -> bool {
        self.s.abs() > CLASSICAL_BOUND
    }

    /// Trials behind each pairing, `None` for an exact run.
    pub fn sample_size(&self) -> Option<u64> {
        self.pairings.first().and_then(|p| p.distribution.trials())
    }

    pub fn expectation(&self, label: &str) -> Option<f64> {
        self.pairings
            .iter()
            .find(|p| p.label == label)
            .map(|p| p.expectation)
    }
}

/// Draw streams consumed by one run.
pub const STREAMS_PER_RUN: u64 = 4;

/// Measure one pairing and estimate its correlation.
fn measure_pairing(
    sampler: &dyn Sampler,
    registry: &SettingRegistry,
    pairing: &SettingPairing,
    sample_size: Option<u64>,
    stream: u64,
) -> Result<PairingOutcome> {
    let label = registry.label(pairing);
    let (alice_angle, bob_angle) = registry.angles(pairing);

    let attempt = sampler
        .measure_stream(alice_angle, bob_angle, sample_size, stream)
        .and_then(|d| {
            if let (Some(n), Some(got)) = (sample_size, d.trials())
                && n != got
            {
                return Err(ChshError::InvalidDistribution(format!(
                    "requested {n} trials, sampler returned {got}"
                )));
            }
            estimate(&d).map(|e| (d, e))
        });

    let (distribution, expectation) = attempt.map_err(|source| ChshError::Pairing {
        label: label.clone(),
        source: Box::new(source),
    })?;

    log::debug!("E({label}) = {expectation:.4}, counts: {distribution}");
    Ok(PairingOutcome {
        label,
        pairing: *pairing,
        alice_angle,
        bob_angle,
        distribution,
        expectation,
    })
}

fn combine(pairings: Vec<PairingOutcome>) -> ChshResult {
    let s = pairings.iter().map(PairingOutcome::contribution).sum();
    ChshResult { pairings, s }
}

/// Run the four pairings one after another and combine them into S.
pub fn run(
    sampler: &dyn Sampler,
    registry: &SettingRegistry,
    sample_size: Option<u64>,
) -> Result<ChshResult> {
    let first_stream = sampler.reserve_streams(STREAMS_PER_RUN);
    run_from(sampler, registry, sample_size, first_stream)
}

/// [`run`] on streams already reserved by the caller.
pub fn run_from(
    sampler: &dyn Sampler,
    registry: &SettingRegistry,
    sample_size: Option<u64>,
    first_stream: u64,
) -> Result<ChshResult> {
    let mut outcomes = Vec::with_capacity(4);
    for (i, pairing) in (0u64..).zip(registry.pairings()) {
        let stream = first_stream.wrapping_add(i);
        outcomes.push(measure_pairing(sampler, registry, pairing, sample_size, stream)?);
    }
    let result = combine(outcomes);
    log::info!(
        "CHSH via {}: S = {:.4} (sample size {:?})",
        sampler.name(),
        result.s,
        sample_size
    );
    Ok(result)
}

/// Measure the four pairings on scoped threads.
///
/// S is combined only after every pairing has succeeded, in registry order;
/// if any pairing fails the first failure in registry order is returned.
pub fn run_parallel(
    sampler: &dyn Sampler,
    registry: &SettingRegistry,
    sample_size: Option<u64>,
) -> Result<ChshResult> {
    let first_stream = sampler.reserve_streams(STREAMS_PER_RUN);
    run_parallel_from(sampler, registry, sample_size, first_stream)
}

/// [`run_parallel`] on streams already reserved by the caller.
pub fn run_parallel_from(
    sampler: &dyn Sampler,
    registry: &SettingRegistry,
    sample_size: Option<u64>,
    first_stream: u64,
) -> Result<ChshResult> {
    let results: Vec<Result<PairingOutcome>> = std::thread::scope(|s| {
        let handles: Vec<_> = (0u64..)
            .zip(registry.pairings())
            .map(|(i, pairing)| {
                let stream = first_stream.wrapping_add(i);
                s.spawn(move || measure_pairing(sampler, registry, pairing, sample_size, stream))
            })
            .collect();

        handles
            .into_iter()
            .map(|h| {
                h.join().unwrap_or_else(|_| {
                    Err(ChshError::SamplerExecution(
                        "measurement thread panicked".into(),
                    ))
                })
            })
            .collect()
    });

    let outcomes = results.into_iter().collect::<Result<Vec<_>>>()?;
    let result = combine(outcomes);
    log::info!(
        "CHSH via {} (parallel): S = {:.4} (sample size {:?})",
        sampler.name(),
        result.s,
        sample_size
    );
    Ok(result)
}
