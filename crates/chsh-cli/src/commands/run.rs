//! `chsh run` — one CHSH measurement.

use chsh_core::{ChshReport, ExperimentConfig};

/// Run the run command.
pub fn run(config: &ExperimentConfig, shots: Option<u64>, parallel: bool, json: bool) {
    let (registry, sampler) = super::prepare(config);

    let result = if parallel {
        chsh_core::run_parallel(sampler.as_ref(), &registry, shots)
    } else {
        chsh_core::run(sampler.as_ref(), &registry, shots)
    };
    let result = match result {
        Ok(r) => r,
        Err(e) => {
            eprintln!("Error: {e}");
            std::process::exit(1);
        }
    };

    let report = ChshReport::new(sampler.name(), &result);
    if json {
        match serde_json::to_string_pretty(&report) {
            Ok(text) => println!("{text}"),
            Err(e) => {
                eprintln!("Error serializing report: {e}");
                std::process::exit(1);
            }
        }
        return;
    }

    println!("Sampler: {}", report.sampler);
    match shots {
        Some(n) => println!("Shots:   {n} per pairing"),
        None => println!("Shots:   exact probabilities"),
    }
    println!();
    for line in report.lines() {
        println!("  {line}");
    }
}
