//! Convergence statistics for CHSH sample-size sweeps.
//!
//! Finite-sample S scatters around its expected value with a standard
//! deviation of √(Σ(1 − E²)/n) for n shots per pairing, so the spread across
//! trials should fall as 1/√n. These functions summarise a [`SweepSeries`]
//! per sample size and check that scaling.

use chsh_core::{CLASSICAL_BOUND, SweepSeries, TSIRELSON_BOUND};
use serde::Serialize;
use statrs::distribution::{ContinuousCDF, Normal, StudentsT};

/// Two-sided confidence level of [`SizeSummary::ci95`].
pub const CONFIDENCE: f64 = 0.95;

// ═══════════════════════════════════════════════════════════════════════════════
// Per-size summaries
// ═══════════════════════════════════════════════════════════════════════════════

/// Statistics of S over the trials at one sample size.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SizeSummary {
    pub sample_size: u64,
    pub trials: usize,
    pub mean: f64,
    /// Sample standard deviation; needs at least two trials.
    pub std_dev: Option<f64>,
    pub std_error: Option<f64>,
    /// Student-t interval for the mean.
    pub ci95: Option<(f64, f64)>,
    /// Mean S − 2√2.
    pub mean_gap: f64,
}

fn mean(values: &[f64]) -> f64 {
    values.iter().sum::<f64>() / values.len() as f64
}

fn sample_std(values: &[f64], mean: f64) -> Option<f64> {
    if values.len() < 2 {
        return None;
    }
    let ss: f64 = values.iter().map(|v| (v - mean).powi(2)).sum();
    Some((ss / (values.len() - 1) as f64).sqrt())
}

fn t_interval(mean: f64, std_error: f64, trials: usize) -> Option<(f64, f64)> {
    let dist = StudentsT::new(0.0, 1.0, (trials - 1) as f64).ok()?;
    let t = dist.inverse_cdf(0.5 + CONFIDENCE / 2.0);
    Some((mean - t * std_error, mean + t * std_error))
}

fn summarize_values(sample_size: u64, values: &[f64]) -> SizeSummary {
    let m = mean(values);
    let std_dev = sample_std(values, m);
    let std_error = std_dev.map(|sd| sd / (values.len() as f64).sqrt());
    SizeSummary {
        sample_size,
        trials: values.len(),
        mean: m,
        std_dev,
        std_error,
        ci95: std_error.and_then(|se| t_interval(m, se, values.len())),
        mean_gap: m - TSIRELSON_BOUND,
    }
}

/// One summary per sample size, in the order sizes first appear.
pub fn summarize(series: &SweepSeries) -> Vec<SizeSummary> {
    series
        .grouped()
        .into_iter()
        .map(|(n, values)| summarize_values(n, &values))
        .collect()
}

/// Expected standard deviation of S with `n` shots per pairing:
/// √(Σ(1 − E²)/n) over the four pairing correlations.
pub fn expected_spread(expectations: &[f64], n: u64) -> f64 {
    if n == 0 {
        return f64::INFINITY;
    }
    let var: f64 = expectations.iter().map(|e| 1.0 - e * e).sum();
    (var.max(0.0) / n as f64).sqrt()
}

// ═══════════════════════════════════════════════════════════════════════════════
// Convergence
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConvergenceReport {
    pub summaries: Vec<SizeSummary>,
    /// Spread never grows as the sample size increases.
    pub spread_non_increasing: bool,
    /// Least-squares slope of ln(std_dev) against ln(n); ≈ −0.5 expected.
    pub scaling_slope: Option<f64>,
    /// Mean S − 2√2 at the largest sample size.
    pub final_gap: Option<f64>,
}

/// Least-squares slope of ln(y) against ln(x). Points with a non-positive
/// coordinate are skipped; fewer than two usable points gives `None`.
pub fn log_log_slope(points: &[(f64, f64)]) -> Option<f64> {
    let logs: Vec<(f64, f64)> = points
        .iter()
        .filter(|(x, y)| *x > 0.0 && *y > 0.0)
        .map(|(x, y)| (x.ln(), y.ln()))
        .collect();
    if logs.len() < 2 {
        return None;
    }
    let n = logs.len() as f64;
    let mx = logs.iter().map(|p| p.0).sum::<f64>() / n;
    let my = logs.iter().map(|p| p.1).sum::<f64>() / n;
    let sxx: f64 = logs.iter().map(|p| (p.0 - mx).powi(2)).sum();
    if sxx == 0.0 {
        return None;
    }
    let sxy: f64 = logs.iter().map(|p| (p.0 - mx) * (p.1 - my)).sum();
    Some(sxy / sxx)
}

pub fn analyze_convergence(series: &SweepSeries) -> ConvergenceReport {
    let summaries = summarize(series);

    let mut by_size: Vec<&SizeSummary> = summaries.iter().collect();
    by_size.sort_by_key(|s| s.sample_size);

    let spreads: Vec<(f64, f64)> = by_size
        .iter()
        .filter_map(|s| s.std_dev.map(|sd| (s.sample_size as f64, sd)))
        .collect();
    let spread_non_increasing = spreads.windows(2).all(|w| w[1].1 <= w[0].1);
    let scaling_slope = log_log_slope(&spreads);
    let final_gap = by_size.last().map(|s| s.mean_gap);

    log::debug!(
        "convergence: {} sizes, slope {:?}, non-increasing {}",
        summaries.len(),
        scaling_slope,
        spread_non_increasing
    );
    ConvergenceReport {
        summaries,
        spread_non_increasing,
        scaling_slope,
        final_gap,
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Violation significance
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Significance {
    pub s: f64,
    pub std_error: f64,
    /// Standard errors by which |S| exceeds the classical bound.
    pub z: f64,
    /// One-sided p-value of |S| this far above 2 under a classical source.
    pub p_value: f64,
}

/// How far |S| sits above the classical bound, in standard errors.
/// `None` when `std_error` is not a positive finite number.
pub fn violation_significance(s: f64, std_error: f64) -> Option<Significance> {
    if !(std_error.is_finite() && std_error > 0.0) || !s.is_finite() {
        return None;
    }
    let z = (s.abs() - CLASSICAL_BOUND) / std_error;
    let p_value = Normal::standard().sf(z);
    Some(Significance {
        s,
        std_error,
        z,
        p_value,
    })
}
