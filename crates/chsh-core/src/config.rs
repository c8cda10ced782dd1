//! Experiment configuration.
//!
//! Every field has a default, so a config file only needs the values it
//! changes. Command-line flags override the loaded values field by field.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{ChshError, Result};
use crate::render::ChartFormat;
use crate::sampler::{
    BellPairSampler, FallbackSampler, LocalJobQueue, PolledSampler, RetrySampler, Sampler,
};
use crate::settings::{
    DEFAULT_ALICE_ANGLES, DEFAULT_BOB_ANGLES, DEFAULT_NEGATIVE_PAIRING, SettingRegistry,
};
use crate::sweep::SweepPlan;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SettingsConfig {
    /// `[A0, A1]` in radians.
    pub alice: [f64; 2],
    /// `[B0, B1]` in radians.
    pub bob: [f64; 2],
    /// `[alice index, bob index]` of the pairing with the minus sign.
    pub negative: [usize; 2],
}

impl Default for SettingsConfig {
    fn default() -> Self {
        Self {
            alice: DEFAULT_ALICE_ANGLES,
            bob: DEFAULT_BOB_ANGLES,
            negative: [DEFAULT_NEGATIVE_PAIRING.0, DEFAULT_NEGATIVE_PAIRING.1],
        }
    }
}

impl SettingsConfig {
    pub fn registry(&self) -> Result<SettingRegistry> {
        SettingRegistry::standard(self.alice, self.bob, (self.negative[0], self.negative[1]))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SamplerConfig {
    /// RNG seed; unset seeds from the OS.
    pub seed: Option<u64>,
    pub visibility: f64,
}

impl Default for SamplerConfig {
    fn default() -> Self {
        Self {
            seed: None,
            visibility: 1.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SweepConfig {
    pub min_exponent: u32,
    pub max_exponent: u32,
    pub trials: usize,
    pub workers: usize,
}

impl Default for SweepConfig {
    fn default() -> Self {
        Self {
            min_exponent: 10,
            max_exponent: 20,
            trials: 6,
            workers: 1,
        }
    }
}

impl SweepConfig {
    pub fn plan(&self) -> Result<SweepPlan> {
        SweepPlan::powers_of_two(self.min_exponent, self.max_exponent, self.trials)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// Simulate in the calling thread.
    #[default]
    Direct,
    /// Submit each measurement as a job to an in-process queue and poll it.
    Queued,
}

impl std::str::FromStr for BackendKind {
    type Err = ChshError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "direct" => Ok(Self::Direct),
            "queued" => Ok(Self::Queued),
            other => Err(ChshError::InvalidConfig(format!(
                "unknown backend '{other}' (expected direct or queued)"
            ))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackendConfig {
    pub kind: BackendKind,
    pub poll_interval_ms: u64,
    pub timeout_ms: u64,
    /// Artificial latency per queued job.
    pub latency_ms: u64,
    /// Start the queue offline, so every submission is unavailable.
    pub offline: bool,
    /// Fall back to direct simulation when the queue is unavailable.
    pub fallback: bool,
    /// Attempts per measurement for unavailable/timed-out jobs; 1 disables retry.
    pub attempts: usize,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            kind: BackendKind::Direct,
            poll_interval_ms: 50,
            timeout_ms: 30_000,
            latency_ms: 0,
            offline: false,
            fallback: true,
            attempts: 1,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    pub sessions_dir: PathBuf,
    pub plots_dir: PathBuf,
    pub chart_format: ChartFormat,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            sessions_dir: PathBuf::from("sessions"),
            plots_dir: PathBuf::from("plots"),
            chart_format: ChartFormat::Csv,
        }
    }
}

/// Everything needed to set up a run or sweep.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExperimentConfig {
    pub settings: SettingsConfig,
    pub sampler: SamplerConfig,
    pub sweep: SweepConfig,
    pub backend: BackendConfig,
    pub output: OutputConfig,
}

impl ExperimentConfig {
    /// Read and validate a JSON config file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&text)?;
        config.validate()?;
        log::debug!("loaded config from {}", path.display());
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        self.settings.registry()?;
        if !(0.0..=1.0).contains(&self.sampler.visibility) {
            return Err(ChshError::InvalidConfig(format!(
                "visibility {} outside [0, 1]",
                self.sampler.visibility
            )));
        }
        self.sweep.plan()?;
        if self.sweep.workers == 0 {
            return Err(ChshError::InvalidConfig("workers must be at least 1".into()));
        }
        if self.backend.kind == BackendKind::Queued {
            if self.backend.poll_interval_ms == 0 {
                return Err(ChshError::InvalidConfig(
                    "poll_interval_ms must be positive".into(),
                ));
            }
            if self.backend.timeout_ms == 0 {
                return Err(ChshError::InvalidConfig("timeout_ms must be positive".into()));
            }
        }
        if self.backend.attempts == 0 {
            return Err(ChshError::InvalidConfig("attempts must be at least 1".into()));
        }
        Ok(())
    }

    pub fn registry(&self) -> Result<SettingRegistry> {
        self.settings.registry()
    }

    fn direct_sampler(&self, seed: Option<u64>) -> Result<BellPairSampler> {
        BellPairSampler::new(seed).with_visibility(self.sampler.visibility)
    }

    /// Build the sampler stack described by `sampler` and `backend`.
    pub fn build_sampler(&self) -> Result<Box<dyn Sampler>> {
        let direct = self.direct_sampler(self.sampler.seed)?;
        let sampler: Box<dyn Sampler> = match self.backend.kind {
            BackendKind::Direct => Box::new(direct),
            BackendKind::Queued => {
                let queue = LocalJobQueue::new(direct)
                    .with_latency(Duration::from_millis(self.backend.latency_ms));
                queue.set_offline(self.backend.offline);
                let polled = PolledSampler::new(queue)
                    .with_poll_interval(Duration::from_millis(self.backend.poll_interval_ms))
                    .with_timeout(Duration::from_millis(self.backend.timeout_ms));

                let retried: Box<dyn Sampler> = if self.backend.attempts > 1 {
                    Box::new(RetrySampler::new(polled, self.backend.attempts))
                } else {
                    Box::new(polled)
                };

                if self.backend.fallback {
                    // Separate stream so the fallback never replays the queue's draws.
                    let seed = self.sampler.seed.map(|s| s.wrapping_add(1));
                    let fallback = self.direct_sampler(seed)?.with_name("bell_pair_fallback");
                    Box::new(FallbackSampler::new(retried, fallback))
                } else {
                    retried
                }
            }
        };
        log::debug!("sampler stack: {}", sampler.name());
        Ok(sampler)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chsh::{self, TSIRELSON_BOUND};

    #[test]
    fn test_defaults() {
        let c = ExperimentConfig::default();
        c.validate().unwrap();
        let plan = c.sweep.plan().unwrap();
        assert_eq!(plan.sample_sizes().first(), Some(&1024));
        assert_eq!(plan.sample_sizes().last(), Some(&(1 << 20)));
        assert_eq!(plan.trials(), 6);
        assert_eq!(c.sweep.workers, 1);
        assert_eq!(c.backend.poll_interval_ms, 50);
        assert_eq!(c.backend.timeout_ms, 30_000);
        let r = c.registry().unwrap();
        assert_eq!(r.label(r.negative_pairing()), "A0B1");
    }

    #[test]
    fn test_partial_json_keeps_defaults() {
        let c: ExperimentConfig =
            serde_json::from_str(r#"{"sweep": {"trials": 3}, "backend": {"kind": "queued"}}"#)
                .unwrap();
        assert_eq!(c.sweep.trials, 3);
        assert_eq!(c.sweep.min_exponent, 10);
        assert_eq!(c.backend.kind, BackendKind::Queued);
        assert_eq!(c.output.chart_format, ChartFormat::Csv);
    }

    #[test]
    fn test_load_from_file() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("experiment.json");
        std::fs::write(
            &path,
            r#"{"sampler": {"seed": 7, "visibility": 0.9}, "settings": {"negative": [1, 1]}}"#,
        )
        .unwrap();
        let c = ExperimentConfig::load(&path).unwrap();
        assert_eq!(c.sampler.seed, Some(7));
        let registry = c.registry().unwrap();
        assert_eq!(registry.label(registry.negative_pairing()), "A1B1");
    }

    #[test]
    fn test_load_rejects_invalid() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("bad.json");
        std::fs::write(&path, r#"{"sweep": {"min_exponent": 12, "max_exponent": 4}}"#).unwrap();
        assert!(matches!(
            ExperimentConfig::load(&path),
            Err(ChshError::InvalidConfig(_))
        ));

        std::fs::write(&path, "not json").unwrap();
        assert!(matches!(ExperimentConfig::load(&path), Err(ChshError::Json(_))));

        assert!(matches!(
            ExperimentConfig::load(tmp.path().join("missing.json")),
            Err(ChshError::Io(_))
        ));
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut c = ExperimentConfig::default();
        c.sampler.visibility = 1.5;
        assert!(c.validate().is_err());

        let mut c = ExperimentConfig::default();
        c.settings.negative = [2, 0];
        assert!(c.validate().is_err());

        let mut c = ExperimentConfig::default();
        c.sweep.workers = 0;
        assert!(c.validate().is_err());
    }

    #[test]
    fn test_backend_kind_parse() {
        assert_eq!("Queued".parse::<BackendKind>().unwrap(), BackendKind::Queued);
        assert!("ibm".parse::<BackendKind>().is_err());
    }

    #[test]
    fn test_queued_stack_measures() {
        let mut c = ExperimentConfig::default();
        c.sampler.seed = Some(1);
        c.backend.kind = BackendKind::Queued;
        c.backend.poll_interval_ms = 1;
        let sampler = c.build_sampler().unwrap();
        let result = chsh::run(sampler.as_ref(), &c.registry().unwrap(), None).unwrap();
        assert!((result.s - TSIRELSON_BOUND).abs() < 1e-9);
    }

    #[test]
    fn test_offline_queue_falls_back() {
        let mut c = ExperimentConfig::default();
        c.sampler.seed = Some(1);
        c.backend.kind = BackendKind::Queued;
        c.backend.offline = true;
        let sampler = c.build_sampler().unwrap();
        assert!(sampler.measure(0.0, 0.0, Some(100)).is_ok());

        c.backend.fallback = false;
        let sampler = c.build_sampler().unwrap();
        assert!(matches!(
            sampler.measure(0.0, 0.0, Some(100)),
            Err(ChshError::SamplerUnavailable(_))
        ));
    }
}
