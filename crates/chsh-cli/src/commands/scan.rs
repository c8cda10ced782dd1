//! `chsh scan` — S as a function of a rotation on Alice's qubit.

use std::f64::consts::TAU;

use chsh_core::{ExperimentConfig, linspace, phase_scan, violation_detected};

/// Run the scan command.
pub fn run(config: &ExperimentConfig, phases: usize, shots: Option<u64>) {
    if phases == 0 {
        eprintln!("Error: --phases must be at least 1");
        std::process::exit(1);
    }
    let (registry, sampler) = super::prepare(config);

    let thetas = linspace(0.0, TAU, phases);
    let points = match phase_scan(sampler.as_ref(), &registry, &thetas, shots) {
        Ok(p) => p,
        Err(e) => {
            eprintln!("Error: {e}");
            std::process::exit(1);
        }
    };

    println!("{:>10} {:>12}  {}", "θ (rad)", "S", "|S| > 2");
    println!("{}", "-".repeat(34));
    for p in &points {
        let mark = if p.s.abs() > chsh_core::CLASSICAL_BOUND {
            "*"
        } else {
            ""
        };
        println!("{:>10.4} {:>12.6}  {mark}", p.theta, p.s);
    }
    println!();

    if violation_detected(&points) {
        println!("Violation detected: |S| > 2 at some phase");
    } else {
        println!("No violation: |S| <= 2 at every phase");
    }
}
