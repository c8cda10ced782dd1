pub mod run;
pub mod scan;
pub mod sessions;
pub mod sweep;

use std::collections::HashMap;
use std::fmt::Display;
use std::str::FromStr;

use chsh_core::{ExperimentConfig, Sampler, SettingRegistry};
use chsh_stats::ConvergenceReport;
use clap::Args;

/// Sampler flags shared by `run`, `sweep` and `scan`.
#[derive(Args, Debug, Clone, Default)]
pub struct SamplerArgs {
    /// Sampler backend
    #[arg(long, value_parser = ["direct", "queued"])]
    pub backend: Option<String>,

    /// RNG seed for reproducible draws
    #[arg(long)]
    pub seed: Option<u64>,

    /// Bell-pair visibility in [0, 1]; 1 is a perfect pair
    #[arg(long)]
    pub visibility: Option<f64>,

    /// Take the job queue offline (queued backend only) to exercise the fallback
    #[arg(long)]
    pub offline: bool,
}

impl SamplerArgs {
    /// Overlay these flags onto a loaded config.
    pub fn apply(&self, config: &mut ExperimentConfig) {
        if let Some(b) = &self.backend {
            config.backend.kind = parse_or_exit(b);
        }
        if let Some(seed) = self.seed {
            config.sampler.seed = Some(seed);
        }
        if let Some(v) = self.visibility {
            config.sampler.visibility = v;
        }
        if self.offline {
            config.backend.offline = true;
        }
    }
}

/// Load `--config` if given, else the defaults.
pub fn load_config(path: Option<&str>) -> ExperimentConfig {
    match path {
        Some(p) => ExperimentConfig::load(p).unwrap_or_else(|e| {
            eprintln!("Error loading config {p}: {e}");
            std::process::exit(1);
        }),
        None => ExperimentConfig::default(),
    }
}

/// Parse a flag value, exiting with the parse error on failure.
pub fn parse_or_exit<T>(s: &str) -> T
where
    T: FromStr,
    T::Err: Display,
{
    s.parse().unwrap_or_else(|e| {
        eprintln!("Error: {e}");
        std::process::exit(1);
    })
}

/// Validate the final config and build the registry and sampler stack.
pub fn prepare(config: &ExperimentConfig) -> (SettingRegistry, Box<dyn Sampler>) {
    if let Err(e) = config.validate() {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
    let registry = config.registry().unwrap_or_else(|e| {
        eprintln!("Error: {e}");
        std::process::exit(1);
    });
    let sampler = config.build_sampler().unwrap_or_else(|e| {
        eprintln!("Error building sampler: {e}");
        std::process::exit(1);
    });
    (registry, sampler)
}

/// Parse `key:value` tags, warning about malformed ones.
pub fn parse_tags(tags: &[String]) -> HashMap<String, String> {
    let mut tag_map = HashMap::new();
    for tag in tags {
        if let Some((k, v)) = tag.split_once(':') {
            tag_map.insert(k.to_string(), v.to_string());
        } else {
            eprintln!("Warning: ignoring malformed tag '{tag}' (expected key:value)");
        }
    }
    tag_map
}

pub fn format_duration_ms(ms: u64) -> String {
    if ms < 1000 {
        format!("{ms}ms")
    } else if ms < 60_000 {
        format!("{:.1}s", ms as f64 / 1000.0)
    } else if ms < 3_600_000 {
        format!("{:.1}m", ms as f64 / 60_000.0)
    } else {
        format!("{:.1}h", ms as f64 / 3_600_000.0)
    }
}

pub fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let head: String = s.chars().take(max.saturating_sub(3)).collect();
        format!("{head}...")
    }
}

/// Per-size statistics table followed by the scaling verdict.
pub fn print_convergence(report: &ConvergenceReport) {
    println!(
        "{:>10} {:>7} {:>10} {:>10} {:>23} {:>11}",
        "Shots", "Trials", "Mean S", "Std dev", "95% CI", "S - 2√2"
    );
    println!("{}", "-".repeat(76));
    for s in &report.summaries {
        let sd = s
            .std_dev
            .map_or_else(|| "-".to_string(), |v| format!("{v:.6}"));
        let ci = s
            .ci95
            .map_or_else(|| "-".to_string(), |(lo, hi)| format!("[{lo:.4}, {hi:.4}]"));
        println!(
            "{:>10} {:>7} {:>10.6} {:>10} {:>23} {:>+11.6}",
            s.sample_size, s.trials, s.mean, sd, ci, s.mean_gap
        );
    }
    println!();
    match report.scaling_slope {
        Some(slope) => println!("Spread scaling: n^{slope:.3} (expected n^-0.5)"),
        None => println!("Spread scaling: not enough sizes with two or more trials"),
    }
    println!(
        "Spread non-increasing with sample size: {}",
        if report.spread_non_increasing { "yes" } else { "no" }
    );
    if let Some(gap) = report.final_gap {
        println!("Final S - 2√2: {gap:+.6}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chsh_core::BackendKind;

    // -----------------------------------------------------------------------
    // parse_tags
    // -----------------------------------------------------------------------

    #[test]
    fn test_parse_tags_key_value() {
        let tags = parse_tags(&["host:lab-2".to_string(), "run:a:b".to_string()]);
        assert_eq!(tags.get("host").map(String::as_str), Some("lab-2"));
        // Only the first colon splits.
        assert_eq!(tags.get("run").map(String::as_str), Some("a:b"));
    }

    #[test]
    fn test_parse_tags_skips_malformed() {
        let tags = parse_tags(&["nocolon".to_string(), "k:v".to_string()]);
        assert_eq!(tags.len(), 1);
    }

    // -----------------------------------------------------------------------
    // SamplerArgs
    // -----------------------------------------------------------------------

    #[test]
    fn test_sampler_args_override_config() {
        let mut config = ExperimentConfig::default();
        SamplerArgs {
            backend: Some("queued".to_string()),
            seed: Some(9),
            visibility: Some(0.8),
            offline: true,
        }
        .apply(&mut config);
        assert_eq!(config.backend.kind, BackendKind::Queued);
        assert_eq!(config.sampler.seed, Some(9));
        assert_eq!(config.sampler.visibility, 0.8);
        assert!(config.backend.offline);
    }

    #[test]
    fn test_sampler_args_empty_keeps_config() {
        let mut config = ExperimentConfig::default();
        config.sampler.seed = Some(3);
        SamplerArgs::default().apply(&mut config);
        assert_eq!(config, {
            let mut c = ExperimentConfig::default();
            c.sampler.seed = Some(3);
            c
        });
    }

    // -----------------------------------------------------------------------
    // formatting
    // -----------------------------------------------------------------------

    #[test]
    fn test_format_duration_ms() {
        assert_eq!(format_duration_ms(250), "250ms");
        assert_eq!(format_duration_ms(1500), "1.5s");
        assert_eq!(format_duration_ms(90_000), "1.5m");
        assert_eq!(format_duration_ms(5_400_000), "1.5h");
    }

    #[test]
    fn test_truncate() {
        assert_eq!(truncate("short", 10), "short");
        assert_eq!(truncate("a-much-longer-name", 10), "a-much-...");
        assert_eq!(truncate("ααααααα", 5), "αα...");
    }
}
