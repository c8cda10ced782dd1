//! # chsh-core
//!
//! Estimate the CHSH parameter S from two-party measurement outcomes and
//! study how the estimate converges as the number of samples grows.
//!
//! ## Quick Start
//!
//! ```
//! use chsh_core::{BellPairSampler, SettingRegistry, TSIRELSON_BOUND, run};
//!
//! let sampler = BellPairSampler::new(Some(42));
//! let registry = SettingRegistry::default();
//!
//! // Exact probabilities: S sits on Tsirelson's bound.
//! let exact = run(&sampler, &registry, None).unwrap();
//! assert!((exact.s - TSIRELSON_BOUND).abs() < 1e-9);
//!
//! // 4096 shots per pairing: S scatters around it.
//! let sampled = run(&sampler, &registry, Some(4096)).unwrap();
//! assert!(sampled.violates_classical_bound());
//! ```
//!
//! ## Architecture
//!
//! Sampler → Outcome distribution → Estimator → Aggregator → Sweep driver
//!
//! - [`OutcomeDistribution`]: counts or exact probabilities over `00`, `01`,
//!   `10`, `11`, Alice's bit first.
//! - [`estimate`]: E = (w00 + w11 − w01 − w10) / total.
//! - [`SettingRegistry`]: two Alice angles, two Bob angles, four signed
//!   pairings with exactly one minus sign.
//! - [`run`] / [`run_parallel`]: S = Σ sign·E over the four pairings.
//! - [`SweepDriver`] / [`sweep`]: repeated runs across sample sizes.
//!
//! Every backend sits behind the [`Sampler`] trait: the state-vector
//! [`BellPairSampler`], job-polled backends via [`PolledSampler`], and the
//! explicit [`FallbackSampler`] / [`RetrySampler`] wrappers.

pub mod chsh;
pub mod config;
pub mod error;
pub mod estimator;
pub mod outcome;
pub mod render;
pub mod report;
pub mod sampler;
pub mod scan;
pub mod session;
pub mod settings;
pub mod sweep;

pub use chsh::{
    CLASSICAL_BOUND, ChshResult, PairingOutcome, STREAMS_PER_RUN, TSIRELSON_BOUND, run,
    run_from, run_parallel, run_parallel_from,
};
pub use config::{
    BackendConfig, BackendKind, ExperimentConfig, OutputConfig, SamplerConfig, SettingsConfig,
    SweepConfig,
};
pub use error::{ChshError, Result};
pub use estimator::estimate;
pub use outcome::{Outcome, OutcomeDistribution, PROBABILITY_TOLERANCE};
pub use render::{
    Chart, ChartFormat, ChartSeries, CsvRenderer, JsonRenderer, Renderer, Scale, renderer_for,
};
pub use report::{ChshReport, PairingReport};
pub use sampler::{
    BellPairSampler, FallbackSampler, JobBackend, JobId, JobStatus, LocalJobQueue,
    MeasurementRequest, PolledSampler, RetrySampler, Sampler, TwoQubitState,
};
pub use scan::{PhasePoint, linspace, phase_scan, violation_detected};
pub use session::{
    MachineInfo, SessionConfig, SessionMeta, SessionWriter, detect_machine_info, list_sessions,
    read_meta,
};
pub use settings::{MeasurementSetting, Party, SettingPairing, SettingRegistry, Sign};
pub use sweep::{
    CancelFlag, IncompleteSweep, ProgressFn, SweepDriver, SweepEntry, SweepJob, SweepOutcome,
    SweepPlan, SweepSeries, sweep,
};

/// Library version (from Cargo.toml).
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
