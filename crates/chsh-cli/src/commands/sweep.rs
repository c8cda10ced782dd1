//! `chsh sweep` — sample-size convergence sweep.

use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

use chsh_core::{
    CancelFlag, Chart, ExperimentConfig, SessionConfig, SessionWriter, SweepDriver, SweepEntry,
    SweepSeries, renderer_for,
};

pub struct SweepCommandConfig<'a> {
    pub tags: &'a [String],
    pub note: Option<&'a str>,
    pub record: bool,
    pub parallel_pairings: bool,
}

/// Run the sweep command.
#[allow(clippy::too_many_lines)]
pub fn run(config: &ExperimentConfig, opts: &SweepCommandConfig<'_>) {
    let (registry, sampler) = super::prepare(config);
    let plan = match config.sweep.plan() {
        Ok(p) => p,
        Err(e) => {
            eprintln!("Error: {e}");
            std::process::exit(1);
        }
    };

    let writer = if opts.record {
        let session = SessionConfig {
            sampler: sampler.name().to_string(),
            output_dir: config.output.sessions_dir.clone(),
            tags: super::parse_tags(opts.tags),
            note: opts.note.map(str::to_string),
        };
        match SessionWriter::new(session, &registry, &plan) {
            Ok(w) => Some(Mutex::new(w)),
            Err(e) => {
                eprintln!("Error creating session: {e}");
                std::process::exit(1);
            }
        }
    } else {
        None
    };

    // Set up Ctrl+C handler
    let cancel = CancelFlag::new();
    let c = cancel.clone();
    if let Err(e) = ctrlc::set_handler(move || c.cancel()) {
        eprintln!("Warning: could not install Ctrl+C handler: {e}");
    }

    let sizes = plan.sample_sizes();
    println!("Convergence sweep");
    println!("  Sampler:   {}", sampler.name());
    println!(
        "  Sizes:     {} .. {} ({} sizes)",
        sizes.first().copied().unwrap_or_default(),
        sizes.last().copied().unwrap_or_default(),
        sizes.len()
    );
    println!("  Trials:    {} per size", plan.trials());
    println!("  Workers:   {}", config.sweep.workers);
    if let Some(w) = &writer
        && let Ok(w) = w.lock()
    {
        println!("  Output:    {}", w.session_dir().display());
    }
    println!("  Stop:      Ctrl+C keeps completed runs");
    println!();

    let start = Instant::now();
    let write_failed = AtomicBool::new(false);

    let outcome = SweepDriver::new(sampler.as_ref(), &registry)
        .with_workers(config.sweep.workers)
        .with_parallel_pairings(opts.parallel_pairings)
        .with_cancel_flag(cancel)
        .with_progress(|entry, done, _total| {
            println!("{done}: S = {:.6}; shots = {}", entry.s, entry.sample_size);
            println!("S - 2√2: {:+.6}", entry.tsirelson_gap());
            let Some(w) = &writer else {
                return;
            };
            if write_failed.load(Ordering::SeqCst) {
                return;
            }
            if let Err(e) = record_entry(w, entry) {
                eprintln!("\nError writing entry: {e}");
                write_failed.store(true, Ordering::SeqCst);
            }
        })
        .run(&plan);

    let (series, failure) = match outcome {
        Ok(series) => (series, None),
        Err(inc) => {
            if inc.was_cancelled() {
                eprintln!("\nInterrupted: {inc}");
            } else {
                eprintln!("\nError: {inc}");
            }
            let cause = inc.cause.to_string();
            (inc.completed, Some(cause))
        }
    };
    let elapsed = start.elapsed();

    if let Some(w) = writer {
        match w.into_inner() {
            Ok(w) => match w.finish(failure.as_deref()) {
                Ok(dir) => println!("\nSession saved to {}", dir.display()),
                Err(e) => eprintln!("Error finishing session: {e}"),
            },
            Err(_) => eprintln!("Error finishing session: writer lock poisoned"),
        }
    }

    if series.is_empty() {
        eprintln!("No runs completed.");
        std::process::exit(1);
    }

    println!();
    super::print_convergence(&chsh_stats::analyze_convergence(&series));

    render_chart(config, &series);

    println!(
        "\nProgram took {:.3} minutes",
        elapsed.as_secs_f64() / 60.0
    );

    if failure.is_some() {
        std::process::exit(1);
    }
}

/// Append one entry to the session; a poisoned writer lock is a write error.
fn record_entry(writer: &Mutex<SessionWriter>, entry: &SweepEntry) -> std::io::Result<()> {
    match writer.lock() {
        Ok(mut w) => w.write_entry(entry),
        Err(_) => Err(std::io::Error::other("session writer lock poisoned")),
    }
}

fn render_chart(config: &ExperimentConfig, series: &SweepSeries) {
    let chart = Chart::convergence(series, "Calculated S values");
    let renderer = renderer_for(config.output.chart_format, config.output.plots_dir.clone());
    match renderer.render(&chart) {
        Ok(path) => println!("Chart data ({}) written to {}", renderer.name(), path.display()),
        Err(e) => eprintln!("Error rendering chart: {e}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use chsh_core::{SettingRegistry, SweepPlan};

    fn writer_in(dir: &std::path::Path) -> SessionWriter {
        let config = SessionConfig {
            sampler: "bell_pair".to_string(),
            output_dir: dir.to_path_buf(),
            ..Default::default()
        };
        let plan = SweepPlan::new(vec![16], 1).unwrap();
        SessionWriter::new(config, &SettingRegistry::default(), &plan).unwrap()
    }

    fn entry() -> SweepEntry {
        SweepEntry {
            sample_size: 16,
            trial: 1,
            s: 2.5,
        }
    }

    #[test]
    fn test_record_entry_writes() {
        let tmp = tempfile::tempdir().unwrap();
        let writer = Mutex::new(writer_in(tmp.path()));
        record_entry(&writer, &entry()).unwrap();
        assert_eq!(writer.lock().unwrap().entries_written(), 1);
    }

    #[test]
    fn test_record_entry_reports_poisoned_lock() {
        let tmp = tempfile::tempdir().unwrap();
        let writer = Mutex::new(writer_in(tmp.path()));
        let _ = std::thread::scope(|s| {
            s.spawn(|| {
                let _guard = writer.lock().unwrap();
                panic!("writer thread died");
            })
            .join()
        });
        assert!(writer.is_poisoned());
        let err = record_entry(&writer, &entry()).unwrap_err();
        assert!(err.to_string().contains("poisoned"));
    }
}
