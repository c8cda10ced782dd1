//! Job-based backends behind the blocking [`Sampler`] contract.
//!
//! Remote executors accept a measurement, hand back a job id, and move it
//! through queued → running → done/failed. [`PolledSampler`] hides that
//! lifecycle: submit, poll at a fixed interval, give up after a caller
//! supplied timeout. [`LocalJobQueue`] is an in-process backend that runs
//! each job on its own thread, used for offline runs and tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use super::{Sampler, check_sample_size};
use crate::error::{ChshError, Result};
use crate::outcome::OutcomeDistribution;

pub type JobId = u64;

/// One measurement to execute on a backend.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MeasurementRequest {
    pub angle_a: f64,
    pub angle_b: f64,
    pub sample_size: Option<u64>,
    /// Draw stream key, when the caller asked for a keyed measurement.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stream: Option<u64>,
}

/// Lifecycle state reported by a backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobStatus {
    Queued,
    Running,
    Done,
    Failed(String),
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done | Self::Failed(_))
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Queued => write!(f, "QUEUED"),
            Self::Running => write!(f, "RUNNING"),
            Self::Done => write!(f, "DONE"),
            Self::Failed(reason) => write!(f, "ERROR ({reason})"),
        }
    }
}

/// Asynchronous execution backend.
pub trait JobBackend: Send + Sync {
    fn name(&self) -> &str;

    /// Queue a measurement. Fails with `SamplerUnavailable` when the backend
    /// cannot be reached.
    fn submit(&self, request: MeasurementRequest) -> Result<JobId>;

    fn status(&self, id: JobId) -> Result<JobStatus>;

    /// Result of a job in the `Done` state. Each result can be fetched once.
    fn fetch(&self, id: JobId) -> Result<OutcomeDistribution>;

    /// Forget a job whose result will never be fetched. A job still queued
    /// or running is dropped as soon as it finishes.
    fn discard(&self, id: JobId);

    /// Reserve `count` draw stream keys on the executing sampler.
    fn reserve_streams(&self, count: u64) -> u64 {
        let _ = count;
        0
    }
}

// ---------------------------------------------------------------------------
// Polled sampler
// ---------------------------------------------------------------------------

/// Default delay between status polls.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(50);
/// Default bound on the total wait for one job.
pub const DEFAULT_JOB_TIMEOUT: Duration = Duration::from_secs(30);

/// Blocking sampler over a [`JobBackend`].
pub struct PolledSampler<B> {
    backend: B,
    poll_interval: Duration,
    timeout: Duration,
}

impl<B: JobBackend> PolledSampler<B> {
    pub fn new(backend: B) -> Self {
        Self {
            backend,
            poll_interval: DEFAULT_POLL_INTERVAL,
            timeout: DEFAULT_JOB_TIMEOUT,
        }
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Poll `id` until it reaches a terminal state or the timeout elapses.
    /// Every path other than a successful fetch discards the job.
    fn wait(&self, id: JobId, started: Instant) -> Result<OutcomeDistribution> {
        let outcome = self.poll(id, started);
        if outcome.is_err() {
            self.backend.discard(id);
        }
        outcome
    }

    fn poll(&self, id: JobId, started: Instant) -> Result<OutcomeDistribution> {
        loop {
            let status = self.backend.status(id)?;
            log::trace!("job {id} on {}: {status}", self.backend.name());
            match status {
                JobStatus::Done => return self.backend.fetch(id),
                JobStatus::Failed(reason) => {
                    return Err(ChshError::SamplerExecution(format!(
                        "job {id} on {}: {reason}",
                        self.backend.name()
                    )));
                }
                JobStatus::Queued | JobStatus::Running => {}
            }

            let waited = started.elapsed();
            if waited >= self.timeout {
                log::warn!(
                    "job {id} on {} timed out after {waited:?}; discarding",
                    self.backend.name()
                );
                return Err(ChshError::SamplerTimeout { waited });
            }
            std::thread::sleep(self.poll_interval.min(self.timeout - waited));
        }
    }

    fn submit_and_wait(&self, request: MeasurementRequest) -> Result<OutcomeDistribution> {
        check_sample_size(request.sample_size)?;
        let started = Instant::now();
        let id = self.backend.submit(request)?;
        log::debug!("submitted job {id} to {}", self.backend.name());
        self.wait(id, started)
    }
}

impl<B: JobBackend> Sampler for PolledSampler<B> {
    fn name(&self) -> &str {
        self.backend.name()
    }

    fn measure(
        &self,
        angle_a: f64,
        angle_b: f64,
        sample_size: Option<u64>,
    ) -> Result<OutcomeDistribution> {
        self.submit_and_wait(MeasurementRequest {
            angle_a,
            angle_b,
            sample_size,
            stream: None,
        })
    }

    fn measure_stream(
        &self,
        angle_a: f64,
        angle_b: f64,
        sample_size: Option<u64>,
        stream: u64,
    ) -> Result<OutcomeDistribution> {
        self.submit_and_wait(MeasurementRequest {
            angle_a,
            angle_b,
            sample_size,
            stream: Some(stream),
        })
    }

    fn reserve_streams(&self, count: u64) -> u64 {
        self.backend.reserve_streams(count)
    }
}

// ---------------------------------------------------------------------------
// Local job queue
// ---------------------------------------------------------------------------

enum JobSlot {
    Queued,
    Running,
    Done(OutcomeDistribution),
    Failed(String),
    /// Discarded while in flight; removed when the job thread finishes.
    Abandoned,
}

type JobTable = Arc<Mutex<HashMap<JobId, JobSlot>>>;

/// In-process backend: every submitted job runs on its own thread against an
/// inner sampler, after an optional artificial latency.
pub struct LocalJobQueue<S> {
    name: String,
    inner: Arc<S>,
    latency: Duration,
    offline: AtomicBool,
    next_id: AtomicU64,
    jobs: JobTable,
}

impl<S: Sampler + 'static> LocalJobQueue<S> {
    pub fn new(inner: S) -> Self {
        Self {
            name: format!("local_queue({})", inner.name()),
            inner: Arc::new(inner),
            latency: Duration::ZERO,
            offline: AtomicBool::new(false),
            next_id: AtomicU64::new(1),
            jobs: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Delay every job by `latency` once it starts running.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Take the queue offline (submissions fail with `SamplerUnavailable`) or back online.
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    /// Jobs submitted and neither fetched nor discarded.
    pub fn pending(&self) -> usize {
        self.jobs
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .filter(|slot| !matches!(slot, JobSlot::Abandoned))
            .count()
    }

    /// Entries still held in the job table, discarded ones included.
    pub fn tracked(&self) -> usize {
        self.jobs.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// Record a state change from the job thread. A discarded job keeps its
    /// tombstone until it reaches a terminal state, then leaves the table.
    fn set_slot(jobs: &JobTable, id: JobId, slot: JobSlot) {
        let mut jobs = jobs.lock().unwrap_or_else(PoisonError::into_inner);
        match jobs.get(&id) {
            Some(JobSlot::Abandoned) => {
                if matches!(slot, JobSlot::Done(_) | JobSlot::Failed(_)) {
                    jobs.remove(&id);
                }
            }
            _ => {
                jobs.insert(id, slot);
            }
        }
    }
}

impl<S: Sampler + 'static> JobBackend for LocalJobQueue<S> {
    fn name(&self) -> &str {
        &self.name
    }

    fn submit(&self, request: MeasurementRequest) -> Result<JobId> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(ChshError::SamplerUnavailable(format!(
                "{} is offline",
                self.name
            )));
        }

        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        Self::set_slot(&self.jobs, id, JobSlot::Queued);

        let jobs = Arc::clone(&self.jobs);
        let inner = Arc::clone(&self.inner);
        let latency = self.latency;
        let spawned = std::thread::Builder::new()
            .name(format!("job-{id}"))
            .spawn(move || {
                Self::set_slot(&jobs, id, JobSlot::Running);
                if !latency.is_zero() {
                    std::thread::sleep(latency);
                }
                let (a, b, n) = (request.angle_a, request.angle_b, request.sample_size);
                let measured = match request.stream {
                    Some(stream) => inner.measure_stream(a, b, n, stream),
                    None => inner.measure(a, b, n),
                };
                let slot = match measured {
                    Ok(dist) => JobSlot::Done(dist),
                    Err(e) => JobSlot::Failed(e.to_string()),
                };
                Self::set_slot(&jobs, id, slot);
            });

        if let Err(e) = spawned {
            self.jobs
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .remove(&id);
            return Err(ChshError::SamplerUnavailable(format!(
                "cannot start job thread: {e}"
            )));
        }
        Ok(id)
    }

    fn status(&self, id: JobId) -> Result<JobStatus> {
        let jobs = self.jobs.lock().unwrap_or_else(PoisonError::into_inner);
        match jobs.get(&id) {
            Some(JobSlot::Queued) => Ok(JobStatus::Queued),
            Some(JobSlot::Running) => Ok(JobStatus::Running),
            Some(JobSlot::Done(_)) => Ok(JobStatus::Done),
            Some(JobSlot::Failed(reason)) => Ok(JobStatus::Failed(reason.clone())),
            Some(JobSlot::Abandoned) | None => {
                Err(ChshError::SamplerExecution(format!("unknown job {id}")))
            }
        }
    }

    fn fetch(&self, id: JobId) -> Result<OutcomeDistribution> {
        let mut jobs = self.jobs.lock().unwrap_or_else(PoisonError::into_inner);
        match jobs.remove(&id) {
            Some(JobSlot::Done(dist)) => Ok(dist),
            Some(JobSlot::Abandoned) => {
                jobs.insert(id, JobSlot::Abandoned);
                Err(ChshError::SamplerExecution(format!("unknown job {id}")))
            }
            Some(other) => {
                jobs.insert(id, other);
                Err(ChshError::SamplerExecution(format!(
                    "job {id} has no result yet"
                )))
            }
            None => Err(ChshError::SamplerExecution(format!("unknown job {id}"))),
        }
    }

    fn discard(&self, id: JobId) {
        let mut jobs = self.jobs.lock().unwrap_or_else(PoisonError::into_inner);
        match jobs.get(&id) {
            Some(JobSlot::Queued | JobSlot::Running) => {
                jobs.insert(id, JobSlot::Abandoned);
            }
            Some(_) => {
                jobs.remove(&id);
            }
            None => {}
        }
    }

    fn reserve_streams(&self, count: u64) -> u64 {
        self.inner.reserve_streams(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sampler::BellPairSampler;

    struct BrokenSampler;

    impl Sampler for BrokenSampler {
        fn name(&self) -> &str {
            "broken"
        }
        fn measure(&self, _: f64, _: f64, _: Option<u64>) -> Result<OutcomeDistribution> {
            Err(ChshError::SamplerExecution("calibration fault".into()))
        }
    }

    fn fast_poll<B: JobBackend>(backend: B) -> PolledSampler<B> {
        PolledSampler::new(backend).with_poll_interval(Duration::from_millis(2))
    }

    #[test]
    fn test_polled_sampler_returns_result() {
        let sampler = fast_poll(LocalJobQueue::new(BellPairSampler::new(Some(1))));
        let d = sampler.measure(0.0, 0.0, Some(1000)).unwrap();
        assert_eq!(d.trials(), Some(1000));
        assert_eq!(sampler.backend().pending(), 0, "result should be consumed");
    }

    #[test]
    fn test_polled_sampler_exact_mode() {
        let sampler = fast_poll(LocalJobQueue::new(BellPairSampler::new(Some(1))));
        let d = sampler.measure(0.3, 0.3, None).unwrap();
        assert!(!d.is_counts());
    }

    #[test]
    fn test_failed_job_is_execution_error() {
        let sampler = fast_poll(LocalJobQueue::new(BrokenSampler));
        let err = sampler.measure(0.0, 0.0, Some(10)).unwrap_err();
        match err {
            ChshError::SamplerExecution(msg) => assert!(msg.contains("calibration fault")),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_timeout() {
        let queue = LocalJobQueue::new(BellPairSampler::new(Some(1)))
            .with_latency(Duration::from_millis(500));
        let sampler = fast_poll(queue).with_timeout(Duration::from_millis(20));
        let err = sampler.measure(0.0, 0.0, Some(10)).unwrap_err();
        match err {
            ChshError::SamplerTimeout { waited } => {
                assert!(waited >= Duration::from_millis(20));
                assert!(waited < Duration::from_millis(500));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_timed_out_jobs_are_discarded() {
        let queue = LocalJobQueue::new(BellPairSampler::new(Some(1)))
            .with_latency(Duration::from_millis(30));
        let sampler = fast_poll(queue).with_timeout(Duration::from_millis(5));
        for _ in 0..10 {
            assert!(matches!(
                sampler.measure(0.0, 0.0, Some(10)),
                Err(ChshError::SamplerTimeout { .. })
            ));
        }
        assert_eq!(sampler.backend().pending(), 0);

        // Once the job threads finish, their tombstones leave the table.
        let deadline = Instant::now() + Duration::from_secs(5);
        while sampler.backend().tracked() > 0 && Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(10));
        }
        assert_eq!(sampler.backend().tracked(), 0);
    }

    #[test]
    fn test_failed_job_is_discarded() {
        let sampler = fast_poll(LocalJobQueue::new(BrokenSampler));
        assert!(sampler.measure(0.0, 0.0, Some(10)).is_err());
        assert_eq!(sampler.backend().tracked(), 0);
    }

    #[test]
    fn test_discard_finished_job() {
        let queue = LocalJobQueue::new(BellPairSampler::new(Some(1)));
        let id = queue
            .submit(MeasurementRequest {
                angle_a: 0.0,
                angle_b: 0.0,
                sample_size: Some(10),
                stream: None,
            })
            .unwrap();
        let deadline = Instant::now() + Duration::from_secs(5);
        while queue.status(id).unwrap() != JobStatus::Done && Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(2));
        }
        queue.discard(id);
        assert_eq!(queue.tracked(), 0);
        assert!(queue.fetch(id).is_err());
    }

    #[test]
    fn test_keyed_job_matches_direct_draw() {
        let sampler = fast_poll(LocalJobQueue::new(BellPairSampler::new(Some(6))));
        let direct = BellPairSampler::new(Some(6));
        assert_eq!(
            sampler.measure_stream(0.4, 1.2, Some(4096), 11).unwrap(),
            direct.measure_stream(0.4, 1.2, Some(4096), 11).unwrap()
        );
        assert_eq!(sampler.reserve_streams(4), 0);
        assert_eq!(sampler.reserve_streams(4), 4);
    }

    #[test]
    fn test_offline_queue_unavailable() {
        let queue = LocalJobQueue::new(BellPairSampler::new(Some(1)));
        queue.set_offline(true);
        let sampler = fast_poll(queue);
        assert!(matches!(
            sampler.measure(0.0, 0.0, Some(10)),
            Err(ChshError::SamplerUnavailable(_))
        ));
        sampler.backend().set_offline(false);
        assert!(sampler.measure(0.0, 0.0, Some(10)).is_ok());
    }

    #[test]
    fn test_unknown_job() {
        let queue = LocalJobQueue::new(BellPairSampler::new(Some(1)));
        assert!(queue.status(99).is_err());
        assert!(queue.fetch(99).is_err());
        queue.discard(99);
    }

    #[test]
    fn test_job_status_display() {
        assert_eq!(JobStatus::Done.to_string(), "DONE");
        assert!(JobStatus::Failed("x".into()).is_terminal());
        assert!(!JobStatus::Queued.is_terminal());
    }
}
