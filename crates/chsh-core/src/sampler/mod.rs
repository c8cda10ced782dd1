//! Sampler collaborator interface and its implementations.
//!
//! A [`Sampler`] turns a pair of measurement angles into an
//! [`OutcomeDistribution`]: exact probabilities when no sample size is given,
//! a frequency table of exactly `n` trials otherwise. Everything that touches
//! a backend (simulation, job queues, fallbacks) lives behind this trait so
//! the aggregator and sweep driver only ever see the blocking call.
//!
//! Outcome labels are Alice's bit first, Bob's bit second.
//!
//! Stochastic samplers may also key their draws by a stream number. The
//! aggregator reserves one block of four streams per CHSH run, so a seeded
//! sampler gives the same counts for a run no matter which thread measures
//! which pairing or in which order runs complete.

pub mod bell;
pub mod jobs;
pub mod wrappers;

use std::sync::Arc;

use crate::error::{ChshError, Result};
use crate::outcome::OutcomeDistribution;

pub use bell::{BellPairSampler, TwoQubitState};
pub use jobs::{JobBackend, JobId, JobStatus, LocalJobQueue, MeasurementRequest, PolledSampler};
pub use wrappers::{FallbackSampler, RetrySampler};

/// Produces outcome distributions for pairs of measurement angles.
///
/// `measure` may block for a long time (local simulation, queued remote job).
/// Implementations must be safe to call from several threads when used with
/// the parallel aggregator or a multi-worker sweep.
pub trait Sampler: Send + Sync {
    /// Short identifier used in logs and session metadata.
    fn name(&self) -> &str;

    /// Measure Alice at `angle_a` and Bob at `angle_b`.
    ///
    /// `None` requests an exact `Probability` distribution; `Some(n)` requests
    /// a `Counts` distribution with `n` total trials.
    fn measure(
        &self,
        angle_a: f64,
        angle_b: f64,
        sample_size: Option<u64>,
    ) -> Result<OutcomeDistribution>;

    /// Like [`measure`](Self::measure), with the draw keyed by `stream`.
    ///
    /// Samplers without a reproducible random source ignore the key.
    fn measure_stream(
        &self,
        angle_a: f64,
        angle_b: f64,
        sample_size: Option<u64>,
        stream: u64,
    ) -> Result<OutcomeDistribution> {
        let _ = stream;
        self.measure(angle_a, angle_b, sample_size)
    }

    /// Reserve `count` consecutive stream keys and return the first one.
    fn reserve_streams(&self, count: u64) -> u64 {
        let _ = count;
        0
    }
}

impl<S: Sampler + ?Sized> Sampler for &S {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn measure(&self, a: f64, b: f64, n: Option<u64>) -> Result<OutcomeDistribution> {
        (**self).measure(a, b, n)
    }

    fn measure_stream(
        &self,
        a: f64,
        b: f64,
        n: Option<u64>,
        stream: u64,
    ) -> Result<OutcomeDistribution> {
        (**self).measure_stream(a, b, n, stream)
    }

    fn reserve_streams(&self, count: u64) -> u64 {
        (**self).reserve_streams(count)
    }
}

impl<S: Sampler + ?Sized> Sampler for Box<S> {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn measure(&self, a: f64, b: f64, n: Option<u64>) -> Result<OutcomeDistribution> {
        (**self).measure(a, b, n)
    }

    fn measure_stream(
        &self,
        a: f64,
        b: f64,
        n: Option<u64>,
        stream: u64,
    ) -> Result<OutcomeDistribution> {
        (**self).measure_stream(a, b, n, stream)
    }

    fn reserve_streams(&self, count: u64) -> u64 {
        (**self).reserve_streams(count)
    }
}

impl<S: Sampler + ?Sized> Sampler for Arc<S> {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn measure(&self, a: f64, b: f64, n: Option<u64>) -> Result<OutcomeDistribution> {
        (**self).measure(a, b, n)
    }

    fn measure_stream(
        &self,
        a: f64,
        b: f64,
        n: Option<u64>,
        stream: u64,
    ) -> Result<OutcomeDistribution> {
        (**self).measure_stream(a, b, n, stream)
    }

    fn reserve_streams(&self, count: u64) -> u64 {
        (**self).reserve_streams(count)
    }
}

/// Reject `Some(0)`.
pub fn check_sample_size(sample_size: Option<u64>) -> Result<()> {
    match sample_size {
        Some(0) => Err(ChshError::InvalidSampleSize(0)),
        _ => Ok(()),
    }
}
