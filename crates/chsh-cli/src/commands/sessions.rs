//! `chsh sessions` — list and inspect recorded sweeps.

use std::path::Path;

use chsh_core::{SessionMeta, SessionWriter, list_sessions, read_meta};

use super::{format_duration_ms, truncate};

/// Run the sessions command.
pub fn run(session_path: Option<&str>, dir: &Path) {
    if let Some(path) = session_path {
        let session_dir = Path::new(path);
        if !session_dir.join("session.json").exists() {
            eprintln!("Not a session directory: {path}");
            eprintln!("Expected session.json in that directory.");
            std::process::exit(1);
        }
        show_session(session_dir);
    } else {
        list(dir);
    }
}

fn list(dir: &Path) {
    if !dir.exists() {
        println!("No sessions directory found at {}", dir.display());
        println!("Record a session first: chsh sweep");
        return;
    }

    let sessions = match list_sessions(dir) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("Failed to read {}: {e}", dir.display());
            std::process::exit(1);
        }
    };

    if sessions.is_empty() {
        println!("No sessions found in {}/", dir.display());
        println!("Record a session first: chsh sweep");
        return;
    }

    println!(
        "{:<50} {:<22} {:>9} {:>10}",
        "Session", "Sampler", "Runs", "Duration"
    );
    println!("{}", "-".repeat(94));

    for (path, meta) in &sessions {
        let dir_name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        let runs = format!("{}/{}", meta.completed_runs, meta.planned_runs);
        let status = if meta.finished { "" } else { " [incomplete]" };

        println!(
            "{:<50} {:<22} {:>9} {:>10}{}",
            truncate(&dir_name, 50),
            truncate(&meta.sampler, 22),
            runs,
            format_duration_ms(meta.duration_ms),
            status,
        );
    }

    println!("\n{} session(s) in {}/", sessions.len(), dir.display());
    println!("Run: chsh sessions <path>  for the convergence summary");
}

fn show_session(session_dir: &Path) {
    let meta = match read_meta(session_dir) {
        Ok(m) => m,
        Err(e) => {
            eprintln!("Failed to read session metadata: {e}");
            std::process::exit(1);
        }
    };
    print_meta(session_dir, &meta);

    let series = match SessionWriter::load_series(session_dir) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("Failed to read series.csv: {e}");
            std::process::exit(1);
        }
    };
    if series.is_empty() {
        println!("\nNo completed runs recorded.");
        return;
    }

    println!();
    super::print_convergence(&chsh_stats::analyze_convergence(&series));
}

fn print_meta(session_dir: &Path, meta: &SessionMeta) {
    let sizes = meta.plan.sample_sizes();
    println!("Session: {}", session_dir.display());
    println!("  ID:        {}", meta.id);
    println!("  Started:   {}", meta.started_at);
    println!("  Ended:     {}", meta.ended_at);
    println!("  Duration:  {}", format_duration_ms(meta.duration_ms));
    println!("  Sampler:   {}", meta.sampler);
    println!(
        "  Sizes:     {} .. {} ({} sizes, {} trials each)",
        sizes.first().copied().unwrap_or_default(),
        sizes.last().copied().unwrap_or_default(),
        sizes.len(),
        meta.plan.trials()
    );
    println!("  Runs:      {}/{}", meta.completed_runs, meta.planned_runs);
    if let Some(failure) = &meta.failure {
        println!("  Stopped:   {failure}");
    }
    println!(
        "  Machine:   {} ({}, {}, {} cores)",
        meta.machine.cpu, meta.machine.arch, meta.machine.os, meta.machine.cores
    );
    for pairing in meta.registry.pairings() {
        let (a, b) = meta.registry.angles(pairing);
        println!(
            "  {}  [{}]   a = {a:.4}, b = {b:.4}",
            meta.registry.label(pairing),
            pairing.sign
        );
    }
    if !meta.tags.is_empty() {
        let mut tags: Vec<_> = meta.tags.iter().collect();
        tags.sort();
        let tags: Vec<String> = tags.iter().map(|(k, v)| format!("{k}:{v}")).collect();
        println!("  Tags:      {}", tags.join(", "));
    }
    if let Some(note) = &meta.note {
        println!("  Note:      {note}");
    }
    println!("  Version:   {}", meta.chsh_version);
}
