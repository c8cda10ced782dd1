//! Sampler combinators: fallback on an unreachable backend, explicit retry.
//!
//! Neither is applied implicitly anywhere in the crate. Repeating a
//! measurement changes what is being measured, so callers opt in.

use super::Sampler;
use crate::error::{ChshError, Result};
use crate::outcome::OutcomeDistribution;

/// Uses `primary`, and `fallback` only when `primary` reports
/// `SamplerUnavailable`. Timeouts and execution failures propagate.
pub struct FallbackSampler<P, F> {
    primary: P,
    fallback: F,
}

impl<P: Sampler, F: Sampler> FallbackSampler<P, F> {
    pub fn new(primary: P, fallback: F) -> Self {
        Self { primary, fallback }
    }

    fn with_fallback(
        &self,
        call: impl Fn(&dyn Sampler) -> Result<OutcomeDistribution>,
    ) -> Result<OutcomeDistribution> {
        match call(&self.primary) {
            Err(ChshError::SamplerUnavailable(reason)) => {
                log::warn!(
                    "{} unavailable ({reason}); using {} instead",
                    self.primary.name(),
                    self.fallback.name()
                );
                call(&self.fallback)
            }
            other => other,
        }
    }
}

impl<P: Sampler, F: Sampler> Sampler for FallbackSampler<P, F> {
    fn name(&self) -> &str {
        self.primary.name()
    }

    fn measure(
        &self,
        angle_a: f64,
        angle_b: f64,
        sample_size: Option<u64>,
    ) -> Result<OutcomeDistribution> {
        self.with_fallback(|s| s.measure(angle_a, angle_b, sample_size))
    }

    fn measure_stream(
        &self,
        angle_a: f64,
        angle_b: f64,
        sample_size: Option<u64>,
        stream: u64,
    ) -> Result<OutcomeDistribution> {
        self.with_fallback(|s| s.measure_stream(angle_a, angle_b, sample_size, stream))
    }

    fn reserve_streams(&self, count: u64) -> u64 {
        self.primary.reserve_streams(count)
    }
}

/// Re-issues a measurement up to `max_attempts` times while the inner sampler
/// is unavailable or timing out. Execution failures are returned at once.
pub struct RetrySampler<S> {
    inner: S,
    max_attempts: usize,
}

impl<S: Sampler> RetrySampler<S> {
    pub fn new(inner: S, max_attempts: usize) -> Self {
        Self {
            inner,
            max_attempts: max_attempts.max(1),
        }
    }

    fn with_retries(
        &self,
        call: impl Fn() -> Result<OutcomeDistribution>,
    ) -> Result<OutcomeDistribution> {
        let mut attempt = 1;
        loop {
            match call() {
                Err(e @ (ChshError::SamplerUnavailable(_) | ChshError::SamplerTimeout { .. }))
                    if attempt < self.max_attempts =>
                {
                    log::warn!(
                        "{} attempt {attempt}/{} failed: {e}; retrying",
                        self.inner.name(),
                        self.max_attempts
                    );
                    attempt += 1;
                }
                other => return other,
            }
        }
    }
}

impl<S: Sampler> Sampler for RetrySampler<S> {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn measure(
        &self,
        angle_a: f64,
        angle_b: f64,
        sample_size: Option<u64>,
    ) -> Result<OutcomeDistribution> {
        self.with_retries(|| self.inner.measure(angle_a, angle_b, sample_size))
    }

    fn measure_stream(
        &self,
        angle_a: f64,
        angle_b: f64,
        sample_size: Option<u64>,
        stream: u64,
    ) -> Result<OutcomeDistribution> {
        self.with_retries(|| {
            self.inner
                .measure_stream(angle_a, angle_b, sample_size, stream)
        })
    }

    fn reserve_streams(&self, count: u64) -> u64 {
        self.inner.reserve_streams(count)
    }
}
