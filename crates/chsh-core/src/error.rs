//! Error taxonomy shared by every layer of the experiment.
//!
//! Sampler failures travel up unchanged through the aggregator (wrapped in
//! [`ChshError::Pairing`] so the report names the setting pair that failed)
//! and then into the sweep driver, which turns them into an
//! [`IncompleteSweep`](crate::sweep::IncompleteSweep).

use std::time::Duration;

use thiserror::Error;

use crate::sweep::IncompleteSweep;

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, ChshError>;

#[derive(Debug, Error)]
pub enum ChshError {
    /// An outcome distribution broke its invariant (zero total, probabilities
    /// not summing to one, negative or non-finite weights, unknown label).
    #[error("invalid outcome distribution: {0}")]
    InvalidDistribution(String),

    /// Setting registry, sweep plan or config file is inconsistent.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("invalid sample size {0}: must be a positive integer")]
    InvalidSampleSize(u64),

    /// No backend reachable. Callers may switch to a fallback sampler.
    #[error("sampler unavailable: {0}")]
    SamplerUnavailable(String),

    #[error("sampler timed out after {waited:?}")]
    SamplerTimeout { waited: Duration },

    /// The backend reported a failed job.
    #[error("sampler execution failed: {0}")]
    SamplerExecution(String),

    /// A sampler or estimator failure attributed to one setting pairing.
    #[error("pairing {label} failed: {source}")]
    Pairing {
        label: String,
        #[source]
        source: Box<ChshError>,
    },

    #[error("run cancelled")]
    Cancelled,

    #[error(transparent)]
    IncompleteSweep(Box<IncompleteSweep>),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

impl ChshError {
    /// Strip [`ChshError::Pairing`] wrappers and return the underlying failure.
    pub fn root_cause(&self) -> &ChshError {
        match self {
            Self::Pairing { source, .. } => source.root_cause(),
            other => other,
        }
    }

    /// Whether the failure originated in a sampler (as opposed to bad data or config).
    pub fn is_sampler_failure(&self) -> bool {
        matches!(
            self.root_cause(),
            Self::SamplerUnavailable(_) | Self::SamplerTimeout { .. } | Self::SamplerExecution(_)
        )
    }
}

impl From<IncompleteSweep> for ChshError {
    fn from(err: IncompleteSweep) -> Self {
        Self::IncompleteSweep(Box::new(err))
    }
}
