//! Sample-size sweep driver.
//!
//! Repeats the CHSH aggregator over a plan of (sample_size, trial) jobs and
//! collects the S values in run order. A sweep either completes every job or
//! fails with [`IncompleteSweep`], which hands back whatever did complete.
//!
//! With `workers > 1` jobs are pulled from a shared cursor by a fixed number
//! of scoped threads and results are stored by job index, so the series
//! order is the same as a sequential run.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::chsh::{self, TSIRELSON_BOUND};
use crate::error::{ChshError, Result};
use crate::sampler::Sampler;
use crate::settings::SettingRegistry;

/// Largest exponent accepted by [`SweepPlan::powers_of_two`].
pub const MAX_EXPONENT: u32 = 62;

// ---------------------------------------------------------------------------
// Series
// ---------------------------------------------------------------------------

/// One completed run.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SweepEntry {
    pub sample_size: u64,
    /// 1-based trial number within this sample size.
    pub trial: usize,
    pub s: f64,
}

impl SweepEntry {
    pub fn tsirelson_gap(&self) -> f64 {
        self.s - TSIRELSON_BOUND
    }
}

/// Completed runs in the order they were planned.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SweepSeries {
    entries: Vec<SweepEntry>,
}

impl SweepSeries {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, entry: SweepEntry) {
        self.entries.push(entry);
    }

    pub fn entries(&self) -> &[SweepEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// `(sample_size, S)` points in run order.
    pub fn points(&self) -> Vec<(u64, f64)> {
        self.entries.iter().map(|e| (e.sample_size, e.s)).collect()
    }

    /// Distinct sample sizes in first-seen order.
    pub fn sample_sizes(&self) -> Vec<u64> {
        let mut sizes: Vec<u64> = Vec::new();
        for e in &self.entries {
            if !sizes.contains(&e.sample_size) {
                sizes.push(e.sample_size);
            }
        }
        sizes
    }

    /// S values per sample size, sizes in first-seen order, values in run order.
    pub fn grouped(&self) -> Vec<(u64, Vec<f64>)> {
        self.sample_sizes()
            .into_iter()
            .map(|n| (n, self.values_for(n)))
            .collect()
    }

    pub fn values_for(&self, sample_size: u64) -> Vec<f64> {
        self.entries
            .iter()
            .filter(|e| e.sample_size == sample_size)
            .map(|e| e.s)
            .collect()
    }
}

impl FromIterator<SweepEntry> for SweepSeries {
    fn from_iter<I: IntoIterator<Item = SweepEntry>>(iter: I) -> Self {
        Self {
            entries: iter.into_iter().collect(),
        }
    }
}

// ---------------------------------------------------------------------------
// Plan
// ---------------------------------------------------------------------------

/// A single (sample_size, trial) job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SweepJob {
    pub sample_size: u64,
    pub trial: usize,
}

/// Ordered sample sizes and the number of trials run at each.
///
/// Deserializing goes through [`SweepPlan::validate`] like every constructor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawSweepPlan")]
pub struct SweepPlan {
    sample_sizes: Vec<u64>,
    trials: usize,
}

#[derive(Deserialize)]
struct RawSweepPlan {
    sample_sizes: Vec<u64>,
    trials: usize,
}

impl TryFrom<RawSweepPlan> for SweepPlan {
    type Error = ChshError;

    fn try_from(raw: RawSweepPlan) -> Result<Self> {
        Self::new(raw.sample_sizes, raw.trials)
    }
}

impl SweepPlan {
    pub fn new(sample_sizes: Vec<u64>, trials: usize) -> Result<Self> {
        let plan = Self {
            sample_sizes,
            trials,
        };
        plan.validate()?;
        Ok(plan)
    }

    /// Sample sizes 2^min_exp, 2^(min_exp+1), ..., 2^max_exp.
    pub fn powers_of_two(min_exp: u32, max_exp: u32, trials: usize) -> Result<Self> {
        if min_exp > max_exp {
            return Err(ChshError::InvalidConfig(format!(
                "exponent range {min_exp}..={max_exp} is empty"
            )));
        }
        if max_exp > MAX_EXPONENT {
            return Err(ChshError::InvalidConfig(format!(
                "exponent {max_exp} exceeds {MAX_EXPONENT}"
            )));
        }
        Self::new((min_exp..=max_exp).map(|e| 1u64 << e).collect(), trials)
    }

    pub fn validate(&self) -> Result<()> {
        if self.sample_sizes.is_empty() {
            return Err(ChshError::InvalidConfig("no sample sizes".into()));
        }
        if let Some(&n) = self.sample_sizes.iter().find(|&&n| n == 0) {
            return Err(ChshError::InvalidSampleSize(n));
        }
        if self.trials == 0 {
            return Err(ChshError::InvalidConfig(
                "trials per sample size must be at least 1".into(),
            ));
        }
        Ok(())
    }

    pub fn sample_sizes(&self) -> &[u64] {
        &self.sample_sizes
    }

    pub fn trials(&self) -> usize {
        self.trials
    }

    pub fn total_runs(&self) -> usize {
        self.sample_sizes.len() * self.trials
    }

    /// Jobs in run order: every trial of the first size, then the next size.
    pub fn jobs(&self) -> Vec<SweepJob> {
        self.sample_sizes
            .iter()
            .flat_map(|&sample_size| {
                (1..=self.trials).map(move |trial| SweepJob { sample_size, trial })
            })
            .collect()
    }
}

// ---------------------------------------------------------------------------
// Failure
// ---------------------------------------------------------------------------

/// A sweep that stopped before running every planned job.
///
/// `failed_at` is the job whose failure stopped the sweep, or for a
/// cancellation the first planned job that has no result.
#[derive(Debug, Error)]
#[error(
    "sweep incomplete at sample size {}, trial {} ({} of {planned} runs completed): {cause}",
    .failed_at.sample_size,
    .failed_at.trial,
    .completed.len()
)]
pub struct IncompleteSweep {
    pub completed: SweepSeries,
    pub planned: usize,
    pub failed_at: SweepJob,
    pub cause: ChshError,
}

impl IncompleteSweep {
    pub fn was_cancelled(&self) -> bool {
        matches!(self.cause, ChshError::Cancelled)
    }
}

/// Shared flag a caller sets to abandon the rest of a sweep.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

// ---------------------------------------------------------------------------
// Driver
// ---------------------------------------------------------------------------

/// Every planned entry, or the entries completed before the sweep stopped.
pub type SweepOutcome = std::result::Result<SweepSeries, IncompleteSweep>;

/// Called after each completed run with the entry, runs done and runs planned.
pub type ProgressFn<'a> = dyn Fn(&SweepEntry, usize, usize) + Send + Sync + 'a;

pub struct SweepDriver<'a> {
    sampler: &'a dyn Sampler,
    registry: &'a SettingRegistry,
    workers: usize,
    parallel_pairings: bool,
    cancel: CancelFlag,
    progress: Option<Box<ProgressFn<'a>>>,
}

impl<'a> SweepDriver<'a> {
    pub fn new(sampler: &'a dyn Sampler, registry: &'a SettingRegistry) -> Self {
        Self {
            sampler,
            registry,
            workers: 1,
            parallel_pairings: false,
            cancel: CancelFlag::new(),
            progress: None,
        }
    }

    /// Number of concurrent runs. Keep this within what the sampler's
    /// backend accepts.
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }

    /// Measure the four pairings of each run concurrently.
    pub fn with_parallel_pairings(mut self, parallel: bool) -> Self {
        self.parallel_pairings = parallel;
        self
    }

    pub fn with_cancel_flag(mut self, cancel: CancelFlag) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn with_progress(
        mut self,
        progress: impl Fn(&SweepEntry, usize, usize) + Send + Sync + 'a,
    ) -> Self {
        self.progress = Some(Box::new(progress));
        self
    }

    pub fn cancel_flag(&self) -> &CancelFlag {
        &self.cancel
    }

    /// Run job `idx` of the plan on its own block of draw streams, so the
    /// entry does not depend on worker count or completion order.
    fn run_one(&self, job: SweepJob, idx: usize, base_stream: u64) -> Result<SweepEntry> {
        let first = base_stream.wrapping_add((idx as u64).wrapping_mul(chsh::STREAMS_PER_RUN));
        let n = Some(job.sample_size);
        let result = if self.parallel_pairings {
            chsh::run_parallel_from(self.sampler, self.registry, n, first)?
        } else {
            chsh::run_from(self.sampler, self.registry, n, first)?
        };
        Ok(SweepEntry {
            sample_size: job.sample_size,
            trial: job.trial,
            s: result.s,
        })
    }

    fn report(&self, entry: &SweepEntry, done: usize, total: usize) {
        log::info!(
            "[{done}/{total}] n = {}, trial {}: S = {:.6}",
            entry.sample_size,
            entry.trial,
            entry.s
        );
        if let Some(progress) = &self.progress {
            progress(entry, done, total);
        }
    }

    /// Run every job of `plan`.
    pub fn run(&self, plan: &SweepPlan) -> SweepOutcome {
        let jobs = plan.jobs();
        let base_stream = self
            .sampler
            .reserve_streams((jobs.len() as u64).saturating_mul(chsh::STREAMS_PER_RUN));
        log::info!(
            "sweep: {} sizes x {} trials on {} with {} worker(s)",
            plan.sample_sizes().len(),
            plan.trials(),
            self.sampler.name(),
            self.workers
        );
        if self.workers == 1 || jobs.len() <= 1 {
            self.run_sequential(&jobs, base_stream)
        } else {
            self.run_pooled(&jobs, base_stream)
        }
    }

    fn run_sequential(&self, jobs: &[SweepJob], base_stream: u64) -> SweepOutcome {
        let mut series = SweepSeries::new();
        for (idx, &job) in jobs.iter().enumerate() {
            if self.cancel.is_cancelled() {
                log::warn!("sweep cancelled after {} of {} runs", series.len(), jobs.len());
                return Err(IncompleteSweep {
                    completed: series,
                    planned: jobs.len(),
                    failed_at: job,
                    cause: ChshError::Cancelled,
                });
            }
            match self.run_one(job, idx, base_stream) {
                Ok(entry) => {
                    series.push(entry);
                    self.report(&entry, series.len(), jobs.len());
                }
                Err(cause) => {
                    log::warn!(
                        "sweep abandoned at n = {}, trial {}: {cause}",
                        job.sample_size,
                        job.trial
                    );
                    return Err(IncompleteSweep {
                        completed: series,
                        planned: jobs.len(),
                        failed_at: job,
                        cause,
                    });
                }
            }
        }
        Ok(series)
    }

    fn run_pooled(&self, jobs: &[SweepJob], base_stream: u64) -> SweepOutcome {
        let cursor = AtomicUsize::new(0);
        let done = AtomicUsize::new(0);
        let stop = AtomicBool::new(false);
        let slots: Mutex<Vec<Option<SweepEntry>>> = Mutex::new(vec![None; jobs.len()]);
        let failure: Mutex<Option<(SweepJob, ChshError)>> = Mutex::new(None);
        let workers = self.workers.min(jobs.len());

        std::thread::scope(|s| {
            for _ in 0..workers {
                s.spawn(|| {
                    loop {
                        if stop.load(Ordering::SeqCst) || self.cancel.is_cancelled() {
                            break;
                        }
                        let idx = cursor.fetch_add(1, Ordering::SeqCst);
                        let Some(&job) = jobs.get(idx) else {
                            break;
                        };
                        match self.run_one(job, idx, base_stream) {
                            Ok(entry) => {
                                slots.lock().unwrap_or_else(PoisonError::into_inner)[idx] =
                                    Some(entry);
                                let n = done.fetch_add(1, Ordering::SeqCst) + 1;
                                self.report(&entry, n, jobs.len());
                            }
                            Err(cause) => {
                                stop.store(true, Ordering::SeqCst);
                                let mut first =
                                    failure.lock().unwrap_or_else(PoisonError::into_inner);
                                if first.is_none() {
                                    *first = Some((job, cause));
                                }
                                break;
                            }
                        }
                    }
                });
            }
        });

        let slots = slots.into_inner().unwrap_or_else(PoisonError::into_inner);
        let failure = failure.into_inner().unwrap_or_else(PoisonError::into_inner);
        let first_missing = slots.iter().position(Option::is_none);
        let completed: SweepSeries = slots.into_iter().flatten().collect();

        match (failure, first_missing) {
            (Some((job, cause)), _) => {
                log::warn!(
                    "sweep abandoned at n = {}, trial {}: {cause}",
                    job.sample_size,
                    job.trial
                );
                Err(IncompleteSweep {
                    completed,
                    planned: jobs.len(),
                    failed_at: job,
                    cause,
                })
            }
            (None, Some(idx)) => {
                log::warn!("sweep cancelled after {} of {} runs", completed.len(), jobs.len());
                Err(IncompleteSweep {
                    completed,
                    planned: jobs.len(),
                    failed_at: jobs[idx],
                    cause: ChshError::Cancelled,
                })
            }
            (None, None) => Ok(completed),
        }
    }
}

/// Run `trials_per_size` CHSH runs at each of `sample_sizes`, sequentially.
///
/// Invalid inputs fail with `InvalidSampleSize`/`InvalidConfig` before any
/// sampler call; a mid-sweep failure is `ChshError::IncompleteSweep`.
pub fn sweep(
    sampler: &dyn Sampler,
    registry: &SettingRegistry,
    sample_sizes: &[u64],
    trials_per_size: usize,
) -> Result<SweepSeries> {
    let plan = SweepPlan::new(sample_sizes.to_vec(), trials_per_size)?;
    SweepDriver::new(sampler, registry)
        .run(&plan)
        .map_err(ChshError::from)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::outcome::OutcomeDistribution;
    use crate::sampler::BellPairSampler;

    /// Counts with E = 1/√2-ish for every pairing; fails on call `fail_on`.
    struct CountingStub {
        calls: AtomicUsize,
        fail_on: usize,
    }

    impl CountingStub {
        fn new(fail_on: usize) -> Self {
            Self {
                calls: AtomicUsize::new(0),
                fail_on,
            }
        }
    }

    impl Sampler for CountingStub {
        fn name(&self) -> &str {
            "counting_stub"
        }
        fn measure(&self, _: f64, _: f64, n: Option<u64>) -> Result<OutcomeDistribution> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            if call == self.fail_on {
                return Err(ChshError::SamplerExecution(format!("call {call}")));
            }
            let n = n.unwrap_or(4);
            Ok(OutcomeDistribution::Counts([n / 2, 0, 0, n - n / 2]))
        }
    }

    // -----------------------------------------------------------------------
    // Plan
    // -----------------------------------------------------------------------

    #[test]
    fn test_plan_job_order() {
        let plan = SweepPlan::new(vec![100, 200], 3).unwrap();
        let sizes: Vec<u64> = plan.jobs().iter().map(|j| j.sample_size).collect();
        assert_eq!(sizes, [100, 100, 100, 200, 200, 200]);
        let trials: Vec<usize> = plan.jobs().iter().map(|j| j.trial).collect();
        assert_eq!(trials, [1, 2, 3, 1, 2, 3]);
        assert_eq!(plan.total_runs(), 6);
    }

    #[test]
    fn test_plan_powers_of_two() {
        let plan = SweepPlan::powers_of_two(3, 5, 2).unwrap();
        assert_eq!(plan.sample_sizes(), &[8, 16, 32]);
        assert!(SweepPlan::powers_of_two(5, 3, 2).is_err());
        assert!(SweepPlan::powers_of_two(1, 63, 2).is_err());
    }

    #[test]
    fn test_plan_rejects_zero() {
        assert!(matches!(
            SweepPlan::new(vec![10, 0], 1),
            Err(ChshError::InvalidSampleSize(0))
        ));
        assert!(matches!(
            SweepPlan::new(vec![10], 0),
            Err(ChshError::InvalidConfig(_))
        ));
        assert!(SweepPlan::new(vec![], 1).is_err());
    }

    #[test]
    fn test_plan_deserialize_validates() {
        let plan: SweepPlan =
            serde_json::from_str(r#"{"sample_sizes":[256,512],"trials":4}"#).unwrap();
        assert_eq!(plan.total_runs(), 8);

        for bad in [
            r#"{"sample_sizes":[256,0],"trials":4}"#,
            r#"{"sample_sizes":[],"trials":4}"#,
            r#"{"sample_sizes":[256],"trials":0}"#,
        ] {
            assert!(serde_json::from_str::<SweepPlan>(bad).is_err(), "{bad}");
        }
    }

    // -----------------------------------------------------------------------
    // Sequential
    // -----------------------------------------------------------------------

    #[test]
    fn test_sweep_length_and_order() {
        let stub = CountingStub::new(usize::MAX);
        let series = sweep(&stub, &SettingRegistry::default(), &[100, 200], 3).unwrap();
        assert_eq!(series.len(), 6);
        let sizes: Vec<u64> = series.entries().iter().map(|e| e.sample_size).collect();
        assert_eq!(sizes, [100, 100, 100, 200, 200, 200]);
        assert_eq!(stub.calls.load(Ordering::SeqCst), 24);
    }

    #[test]
    fn test_sweep_failure_carries_completed_entries() {
        // Fails on the second pairing of the third run.
        let stub = CountingStub::new(10);
        let err = sweep(&stub, &SettingRegistry::default(), &[100, 200], 3).unwrap_err();
        let ChshError::IncompleteSweep(inc) = err else {
            panic!("expected IncompleteSweep");
        };
        assert_eq!(inc.completed.len(), 2);
        assert_eq!(inc.planned, 6);
        assert_eq!(
            inc.failed_at,
            SweepJob {
                sample_size: 100,
                trial: 3
            }
        );
        assert!(matches!(inc.cause.root_cause(), ChshError::SamplerExecution(_)));
        assert!(!inc.was_cancelled());
    }

    #[test]
    fn test_sweep_invalid_input_is_not_incomplete() {
        let stub = CountingStub::new(usize::MAX);
        let err = sweep(&stub, &SettingRegistry::default(), &[0], 1).unwrap_err();
        assert!(matches!(err, ChshError::InvalidSampleSize(0)));
        assert_eq!(stub.calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_cancelled_before_start() {
        let stub = CountingStub::new(usize::MAX);
        let registry = SettingRegistry::default();
        let cancel = CancelFlag::new();
        cancel.cancel();
        let plan = SweepPlan::new(vec![10], 2).unwrap();
        let inc = SweepDriver::new(&stub, &registry)
            .with_cancel_flag(cancel)
            .run(&plan)
            .unwrap_err();
        assert!(inc.was_cancelled());
        assert!(inc.completed.is_empty());
        assert_eq!(stub.calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_cancel_from_progress_callback() {
        let stub = CountingStub::new(usize::MAX);
        let registry = SettingRegistry::default();
        let cancel = CancelFlag::new();
        let trigger = cancel.clone();
        let plan = SweepPlan::new(vec![10, 20], 2).unwrap();
        let inc = SweepDriver::new(&stub, &registry)
            .with_cancel_flag(cancel)
            .with_progress(move |_, done, _| {
                if done == 3 {
                    trigger.cancel();
                }
            })
            .run(&plan)
            .unwrap_err();
        assert!(inc.was_cancelled());
        assert_eq!(inc.completed.len(), 3);
        assert_eq!(
            inc.failed_at,
            SweepJob {
                sample_size: 20,
                trial: 2
            }
        );
    }

    // -----------------------------------------------------------------------
    // Pooled
    // -----------------------------------------------------------------------

    #[test]
    fn test_pooled_keeps_run_order() {
        let sampler = BellPairSampler::new(Some(11));
        let registry = SettingRegistry::default();
        let plan = SweepPlan::new(vec![64, 128, 256], 4).unwrap();
        let series = SweepDriver::new(&sampler, &registry)
            .with_workers(4)
            .run(&plan)
            .unwrap();
        let jobs: Vec<SweepJob> = series
            .entries()
            .iter()
            .map(|e| SweepJob {
                sample_size: e.sample_size,
                trial: e.trial,
            })
            .collect();
        assert_eq!(jobs, plan.jobs());
    }

    fn seeded_series(workers: usize, parallel_pairings: bool) -> SweepSeries {
        let sampler = BellPairSampler::new(Some(7));
        let registry = SettingRegistry::default();
        let plan = SweepPlan::new(vec![256, 512], 4).unwrap();
        SweepDriver::new(&sampler, &registry)
            .with_workers(workers)
            .with_parallel_pairings(parallel_pairings)
            .run(&plan)
            .unwrap()
    }

    #[test]
    fn test_seeded_pooled_sweep_repeats() {
        let first = seeded_series(4, false);
        for _ in 0..20 {
            assert_eq!(seeded_series(4, false), first);
        }
    }

    #[test]
    fn test_seeded_sweep_independent_of_scheduling() {
        let sequential = seeded_series(1, false);
        assert_eq!(seeded_series(4, false), sequential);
        assert_eq!(seeded_series(3, true), sequential);
        assert_eq!(seeded_series(1, true), sequential);
        // Trials at one size still differ from each other.
        let at_256 = sequential.values_for(256);
        assert!(at_256.windows(2).any(|w| w[0] != w[1]));
    }

    #[test]
    fn test_pooled_failure_is_incomplete() {
        let stub = CountingStub::new(7);
        let registry = SettingRegistry::default();
        let plan = SweepPlan::new(vec![10, 20, 30], 3).unwrap();
        let inc = SweepDriver::new(&stub, &registry)
            .with_workers(3)
            .run(&plan)
            .unwrap_err();
        assert!(matches!(inc.cause.root_cause(), ChshError::SamplerExecution(_)));
        assert!(inc.completed.len() < plan.total_runs());
    }

    #[test]
    fn test_progress_counts_every_run() {
        let sampler = BellPairSampler::new(Some(5));
        let registry = SettingRegistry::default();
        let plan = SweepPlan::new(vec![32, 64], 3).unwrap();
        let seen = AtomicUsize::new(0);
        SweepDriver::new(&sampler, &registry)
            .with_workers(2)
            .with_progress(|_, _, total| {
                assert_eq!(total, 6);
                seen.fetch_add(1, Ordering::SeqCst);
            })
            .run(&plan)
            .unwrap();
        assert_eq!(seen.load(Ordering::SeqCst), 6);
    }

    // -----------------------------------------------------------------------
    // Series
    // -----------------------------------------------------------------------

    #[test]
    fn test_series_grouping() {
        let series: SweepSeries = [(10, 1, 2.0), (20, 1, 2.5), (10, 2, 2.2)]
            .into_iter()
            .map(|(sample_size, trial, s)| SweepEntry {
                sample_size,
                trial,
                s,
            })
            .collect();
        assert_eq!(series.sample_sizes(), [10, 20]);
        assert_eq!(series.values_for(10), [2.0, 2.2]);
        assert_eq!(series.grouped()[1], (20, vec![2.5]));
    }

    #[test]
    fn test_incomplete_display() {
        let inc = IncompleteSweep {
            completed: SweepSeries::new(),
            planned: 4,
            failed_at: SweepJob {
                sample_size: 1024,
                trial: 1,
            },
            cause: ChshError::Cancelled,
        };
        let msg = inc.to_string();
        assert!(msg.contains("1024"));
        assert!(msg.contains("0 of 4"));
        assert!(msg.contains("cancelled"));
    }
}
