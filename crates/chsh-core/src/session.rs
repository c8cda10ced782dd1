//! Session recording for convergence sweeps.
//!
//! Each session is a directory containing:
//! - `series.csv`: one row per completed run, appended as runs finish
//!   (`index,sample_size,trial,s,tsirelson_gap`)
//! - `session.json`: metadata written when the sweep ends (timing, sampler,
//!   settings, plan, completion state, machine info, tags)
//!
//! With several sweep workers, rows are appended in completion order and
//! `index` counts completions.
//!
//! Directories are named `<timestamp>-<sampler>`; a session started in the
//! same second as an existing one gets a short id suffix instead of sharing
//! its directory.

use std::collections::HashMap;
use std::fs::{self, File};
use std::io::{BufWriter, ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{ChshError, Result};
use crate::settings::SettingRegistry;
use crate::sweep::{SweepEntry, SweepPlan, SweepSeries};

const SERIES_HEADER: &str = "index,sample_size,trial,s,tsirelson_gap";

// ---------------------------------------------------------------------------
// Machine info
// ---------------------------------------------------------------------------

/// Machine information captured at session start.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MachineInfo {
    pub os: String,
    pub arch: String,
    pub cpu: String,
    pub cores: usize,
}

/// Detect machine information (best-effort).
pub fn detect_machine_info() -> MachineInfo {
    let os = match os_version() {
        Some(v) => format!("{} {v}", std::env::consts::OS),
        None => std::env::consts::OS.to_string(),
    };
    MachineInfo {
        os,
        arch: std::env::consts::ARCH.to_string(),
        cpu: detect_cpu().unwrap_or_else(|| "unknown".to_string()),
        cores: std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1),
    }
}

#[cfg(target_os = "linux")]
fn os_version() -> Option<String> {
    let release = fs::read_to_string("/etc/os-release").ok()?;
    release
        .lines()
        .find_map(|l| l.strip_prefix("PRETTY_NAME="))
        .map(|v| v.trim_matches('"').to_string())
}

#[cfg(target_os = "macos")]
fn os_version() -> Option<String> {
    let output = std::process::Command::new("sw_vers")
        .arg("-productVersion")
        .output()
        .ok()?;
    Some(String::from_utf8_lossy(&output.stdout).trim().to_string())
}

#[cfg(not(any(target_os = "linux", target_os = "macos")))]
fn os_version() -> Option<String> {
    None
}

#[cfg(target_os = "linux")]
fn detect_cpu() -> Option<String> {
    let info = fs::read_to_string("/proc/cpuinfo").ok()?;
    info.lines()
        .find(|l| l.starts_with("model name"))
        .and_then(|l| l.split(':').nth(1))
        .map(|v| v.trim().to_string())
}

#[cfg(target_os = "macos")]
fn detect_cpu() -> Option<String> {
    let output = std::process::Command::new("sysctl")
        .args(["-n", "machdep.cpu.brand_string"])
        .output()
        .ok()?;
    let s = String::from_utf8_lossy(&output.stdout).trim().to_string();
    if s.is_empty() { None } else { Some(s) }
}

#[cfg(not(any(target_os = "linux", target_os = "macos")))]
fn detect_cpu() -> Option<String> {
    None
}

// ---------------------------------------------------------------------------
// Session metadata (session.json)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionMeta {
    pub version: u32,
    pub id: String,
    pub started_at: String,
    pub ended_at: String,
    pub duration_ms: u64,
    pub sampler: String,
    pub registry: SettingRegistry,
    pub plan: SweepPlan,
    pub completed_runs: usize,
    pub planned_runs: usize,
    /// Every planned run completed.
    pub finished: bool,
    /// Why the sweep stopped early, if it did.
    pub failure: Option<String>,
    pub machine: MachineInfo,
    pub tags: HashMap<String, String>,
    pub note: Option<String>,
    pub chsh_version: String,
}

// ---------------------------------------------------------------------------
// Session config
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub sampler: String,
    pub output_dir: PathBuf,
    pub tags: HashMap<String, String>,
    pub note: Option<String>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            sampler: "bell_pair".to_string(),
            output_dir: PathBuf::from("sessions"),
            tags: HashMap::new(),
            note: None,
        }
    }
}

// ---------------------------------------------------------------------------
// Session writer
// ---------------------------------------------------------------------------

/// Incremental file I/O for one recorded sweep.
pub struct SessionWriter {
    session_dir: PathBuf,
    csv_writer: BufWriter<File>,
    entries_written: usize,
    started_at: SystemTime,
    started_instant: Instant,
    session_id: String,
    config: SessionConfig,
    registry: SettingRegistry,
    plan: SweepPlan,
    machine: MachineInfo,
}

impl SessionWriter {
    /// Create `<output_dir>/<timestamp>-<sampler>/` and its `series.csv`.
    pub fn new(
        config: SessionConfig,
        registry: &SettingRegistry,
        plan: &SweepPlan,
    ) -> std::io::Result<Self> {
        let started_at = SystemTime::now();
        let ts = started_at.duration_since(UNIX_EPOCH).unwrap_or_default();
        let dir_name = format!("{}-{}", format_iso8601_compact(ts), slug(&config.sampler));
        let session_id = Uuid::new_v4();
        let session_dir = create_session_dir(&config.output_dir, &dir_name, &session_id)?;

        let mut csv_writer = BufWriter::new(File::create(session_dir.join("series.csv"))?);
        writeln!(csv_writer, "{SERIES_HEADER}")?;
        csv_writer.flush()?;

        log::info!("recording session in {}", session_dir.display());
        Ok(Self {
            session_dir,
            csv_writer,
            entries_written: 0,
            started_at,
            started_instant: Instant::now(),
            session_id: session_id.to_string(),
            config,
            registry: registry.clone(),
            plan: plan.clone(),
            machine: detect_machine_info(),
        })
    }

    /// Append one completed run.
    pub fn write_entry(&mut self, entry: &SweepEntry) -> std::io::Result<()> {
        writeln!(
            self.csv_writer,
            "{},{},{},{},{}",
            self.entries_written,
            entry.sample_size,
            entry.trial,
            entry.s,
            entry.tsirelson_gap()
        )?;
        self.csv_writer.flush()?;
        self.entries_written += 1;
        Ok(())
    }

    /// Write session.json. `failure` is the reason a sweep stopped early.
    pub fn finish(mut self, failure: Option<&str>) -> std::io::Result<PathBuf> {
        self.csv_writer.flush()?;

        let ended_at = SystemTime::now();
        let planned_runs = self.plan.total_runs();
        let meta = SessionMeta {
            version: 1,
            id: self.session_id,
            started_at: format_iso8601(
                self.started_at
                    .duration_since(UNIX_EPOCH)
                    .unwrap_or_default(),
            ),
            ended_at: format_iso8601(ended_at.duration_since(UNIX_EPOCH).unwrap_or_default()),
            duration_ms: self.started_instant.elapsed().as_millis() as u64,
            sampler: self.config.sampler,
            registry: self.registry,
            plan: self.plan,
            completed_runs: self.entries_written,
            planned_runs,
            finished: failure.is_none() && self.entries_written == planned_runs,
            failure: failure.map(str::to_string),
            machine: self.machine,
            tags: self.config.tags,
            note: self.config.note,
            chsh_version: crate::VERSION.to_string(),
        };

        let json = serde_json::to_string_pretty(&meta).map_err(std::io::Error::other)?;
        fs::write(self.session_dir.join("session.json"), json)?;
        Ok(self.session_dir)
    }

    pub fn session_dir(&self) -> &Path {
        &self.session_dir
    }

    pub fn entries_written(&self) -> usize {
        self.entries_written
    }

    pub fn elapsed(&self) -> Duration {
        self.started_instant.elapsed()
    }

    /// Read `series.csv` of a recorded session back into a series.
    pub fn load_series(session_dir: &Path) -> Result<SweepSeries> {
        let csv = fs::read_to_string(session_dir.join("series.csv"))?;
        let mut lines = csv.lines();
        if lines.next() != Some(SERIES_HEADER) {
            return Err(ChshError::InvalidConfig(format!(
                "{} has no series header",
                session_dir.display()
            )));
        }

        lines
            .enumerate()
            .filter(|(_, l)| !l.trim().is_empty())
            .map(|(i, line)| {
                parse_row(line).ok_or_else(|| {
                    ChshError::InvalidConfig(format!("series.csv line {}: '{line}'", i + 2))
                })
            })
            .collect()
    }
}

fn parse_row(line: &str) -> Option<SweepEntry> {
    let mut parts = line.split(',');
    let _index: usize = parts.next()?.parse().ok()?;
    let sample_size = parts.next()?.parse().ok()?;
    let trial = parts.next()?.parse().ok()?;
    let s = parts.next()?.parse().ok()?;
    Some(SweepEntry {
        sample_size,
        trial,
        s,
    })
}

/// Read a session's `session.json`.
pub fn read_meta(session_dir: &Path) -> Result<SessionMeta> {
    let text = fs::read_to_string(session_dir.join("session.json"))?;
    Ok(serde_json::from_str(&text)?)
}

/// Every session directory under `dir` with readable metadata, newest first.
pub fn list_sessions(dir: &Path) -> Result<Vec<(PathBuf, SessionMeta)>> {
    let mut sessions = Vec::new();
    for entry in fs::read_dir(dir)?.flatten() {
        let path = entry.path();
        if !path.join("session.json").is_file() {
            continue;
        }
        match read_meta(&path) {
            Ok(meta) => sessions.push((path, meta)),
            Err(e) => log::debug!("skipping {}: {e}", path.display()),
        }
    }
    sessions.sort_by(|a, b| b.1.started_at.cmp(&a.1.started_at));
    Ok(sessions)
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Create a fresh directory for one session under `root`, never reusing an
/// existing one.
fn create_session_dir(root: &Path, dir_name: &str, id: &Uuid) -> std::io::Result<PathBuf> {
    fs::create_dir_all(root)?;
    let plain = root.join(dir_name);
    match fs::create_dir(&plain) {
        Ok(()) => return Ok(plain),
        Err(e) if e.kind() == ErrorKind::AlreadyExists => {}
        Err(e) => return Err(e),
    }
    let short = id.simple().to_string();
    let suffixed = root.join(format!("{dir_name}-{}", &short[..8]));
    log::debug!(
        "{} already exists, using {}",
        plain.display(),
        suffixed.display()
    );
    fs::create_dir(&suffixed)?;
    Ok(suffixed)
}

/// Keep directory names portable: `local_queue(bell_pair)` → `local_queue-bell_pair`.
fn slug(name: &str) -> String {
    let s: String = name
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' { c } else { '-' })
        .collect();
    let trimmed = s.trim_matches('-');
    if trimmed.is_empty() {
        "session".to_string()
    } else {
        trimmed.to_string()
    }
}

/// Compact ISO-8601 timestamp for directory names, e.g. `2026-02-15T013000Z`.
fn format_iso8601_compact(since_epoch: Duration) -> String {
    let (year, month, day, hour, min, sec) = secs_to_utc(since_epoch.as_secs());
    format!("{year:04}-{month:02}-{day:02}T{hour:02}{min:02}{sec:02}Z")
}

/// Full ISO-8601 timestamp, e.g. `2026-02-15T01:30:00Z`.
fn format_iso8601(since_epoch: Duration) -> String {
    let (year, month, day, hour, min, sec) = secs_to_utc(since_epoch.as_secs());
    format!("{year:04}-{month:02}-{day:02}T{hour:02}:{min:02}:{sec:02}Z")
}

/// Seconds since the Unix epoch to UTC (year, month, day, hour, minute, second).
/// No leap seconds.
fn secs_to_utc(secs: u64) -> (u64, u64, u64, u64, u64, u64) {
    let sec = secs % 60;
    let min = (secs / 60) % 60;
    let hour = (secs / 3600) % 24;

    let mut days = secs / 86400;
    let mut year = 1970u64;
    loop {
        let len = if is_leap(year) { 366 } else { 365 };
        if days < len {
            break;
        }
        days -= len;
        year += 1;
    }

    let feb = if is_leap(year) { 29 } else { 28 };
    let month_lengths = [31, feb, 31, 30, 31, 30, 31, 31, 30, 31, 30, 31];
    let mut month = 1u64;
    for len in month_lengths {
        if days < len {
            break;
        }
        days -= len;
        month += 1;
    }

    (year, month, days + 1, hour, min, sec)
}

fn is_leap(year: u64) -> bool {
    (year % 4 == 0 && year % 100 != 0) || year % 400 == 0
}
