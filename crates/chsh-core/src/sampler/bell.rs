//! Simulated entangled-pair source.
//!
//! A two-qubit, real-amplitude state vector: qubit 0 is Alice, qubit 1 is
//! Bob, basis index = alice_bit + 2 * bob_bit. The pair is prepared in
//! (|00⟩ + |11⟩)/√2 with H then CNOT, each side is rotated by RY(−angle) and
//! read in the Z basis, giving E = cos(angle_a − angle_b).

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::{Binomial, Distribution};

use super::{Sampler, check_sample_size};
use crate::error::{ChshError, Result};
use crate::outcome::{Outcome, OutcomeDistribution};

// ---------------------------------------------------------------------------
// State vector
// ---------------------------------------------------------------------------

/// Two-qubit state with real amplitudes (H, CNOT and RY keep it real).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TwoQubitState {
    amps: [f64; 4],
}

impl TwoQubitState {
    /// |00⟩.
    pub fn zero() -> Self {
        Self {
            amps: [1.0, 0.0, 0.0, 0.0],
        }
    }

    /// (|00⟩ + |11⟩)/√2.
    pub fn bell_pair() -> Self {
        Self::zero().hadamard(0).cnot(0, 1)
    }

    /// Apply a real 2×2 gate `[[m00, m01], [m10, m11]]` to `qubit`.
    fn apply(mut self, qubit: usize, m: [[f64; 2]; 2]) -> Self {
        let bit = 1usize << qubit;
        for i in 0..4 {
            if i & bit != 0 {
                continue;
            }
            let j = i | bit;
            let (a, b) = (self.amps[i], self.amps[j]);
            self.amps[i] = m[0][0] * a + m[0][1] * b;
            self.amps[j] = m[1][0] * a + m[1][1] * b;
        }
        self
    }

    pub fn hadamard(self, qubit: usize) -> Self {
        let h = std::f64::consts::FRAC_1_SQRT_2;
        self.apply(qubit, [[h, h], [h, -h]])
    }

    /// Rotation about the Y axis: [[cos θ/2, −sin θ/2], [sin θ/2, cos θ/2]].
    pub fn ry(self, qubit: usize, theta: f64) -> Self {
        let (s, c) = (theta / 2.0).sin_cos();
        self.apply(qubit, [[c, -s], [s, c]])
    }

    /// Flip `target` where `control` is 1.
    pub fn cnot(mut self, control: usize, target: usize) -> Self {
        let (cbit, tbit) = (1usize << control, 1usize << target);
        for i in 0..4 {
            if i & cbit != 0 && i & tbit == 0 {
                self.amps.swap(i, i | tbit);
            }
        }
        self
    }

    /// Basis probabilities indexed by [`Outcome::index`] (Alice bit first).
    pub fn outcome_probabilities(&self) -> [f64; 4] {
        Outcome::ALL.map(|o| {
            let (alice, bob) = match o {
                Outcome::ZeroZero => (0, 0),
                Outcome::ZeroOne => (0, 1),
                Outcome::OneZero => (1, 0),
                Outcome::OneOne => (1, 1),
            };
            let amp = self.amps[alice + 2 * bob];
            amp * amp
        })
    }
}

// ---------------------------------------------------------------------------
// Sampler
// ---------------------------------------------------------------------------

/// Simulated Bell-pair source with optional white-noise mixing.
///
/// Exact requests return the state-vector probabilities; counted requests
/// draw a multinomial sample from them. Plain [`measure`](Sampler::measure)
/// calls share one internal [`StdRng`], so two samplers built with the same
/// seed return the same sequence of tables. Keyed calls on a seeded sampler
/// draw from a generator derived from the seed and the stream key alone.
pub struct BellPairSampler {
    name: String,
    visibility: f64,
    seed: Option<u64>,
    rng: Mutex<StdRng>,
    next_stream: AtomicU64,
}

impl BellPairSampler {
    /// Seeded sampler; `None` seeds from the OS.
    pub fn new(seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(s) => StdRng::seed_from_u64(s),
            None => StdRng::from_os_rng(),
        };
        Self {
            name: "bell_pair".to_string(),
            visibility: 1.0,
            seed,
            rng: Mutex::new(rng),
            next_stream: AtomicU64::new(0),
        }
    }

    /// Mix the state with white noise: p' = v·p + (1 − v)/4.
    pub fn with_visibility(mut self, visibility: f64) -> Result<Self> {
        if !(0.0..=1.0).contains(&visibility) {
            return Err(ChshError::InvalidConfig(format!(
                "visibility {visibility} outside [0, 1]"
            )));
        }
        self.visibility = visibility;
        Ok(self)
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn visibility(&self) -> f64 {
        self.visibility
    }

    /// Outcome probabilities for one angle pair.
    pub fn exact_probabilities(&self, angle_a: f64, angle_b: f64) -> [f64; 4] {
        let pure = TwoQubitState::bell_pair()
            .ry(0, -angle_a)
            .ry(1, -angle_b)
            .outcome_probabilities();
        let v = self.visibility;
        pure.map(|p| v * p + (1.0 - v) / 4.0)
    }
}

impl Sampler for BellPairSampler {
    fn name(&self) -> &str {
        &self.name
    }

    fn measure(
        &self,
        angle_a: f64,
        angle_b: f64,
        sample_size: Option<u64>,
    ) -> Result<OutcomeDistribution> {
        check_sample_size(sample_size)?;
        let probs = self.exact_probabilities(angle_a, angle_b);
        match sample_size {
            None => Ok(OutcomeDistribution::Probability(probs)),
            Some(n) => {
                let mut rng = self.rng.lock().unwrap_or_else(PoisonError::into_inner);
                Ok(OutcomeDistribution::Counts(draw_counts(&mut *rng, &probs, n)))
            }
        }
    }

    fn measure_stream(
        &self,
        angle_a: f64,
        angle_b: f64,
        sample_size: Option<u64>,
        stream: u64,
    ) -> Result<OutcomeDistribution> {
        let (Some(seed), Some(n)) = (self.seed, sample_size) else {
            return self.measure(angle_a, angle_b, sample_size);
        };
        check_sample_size(sample_size)?;
        let probs = self.exact_probabilities(angle_a, angle_b);
        let mut rng = StdRng::seed_from_u64(stream_seed(seed, stream));
        Ok(OutcomeDistribution::Counts(draw_counts(&mut rng, &probs, n)))
    }

    fn reserve_streams(&self, count: u64) -> u64 {
        self.next_stream.fetch_add(count, Ordering::SeqCst)
    }
}

/// Mix a stream key into the sampler seed (SplitMix64 finalizer).
fn stream_seed(seed: u64, stream: u64) -> u64 {
    let mut z = stream.wrapping_add(0x9E37_79B9_7F4A_7C15);
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    seed ^ z ^ (z >> 31)
}

// ---------------------------------------------------------------------------
// Multinomial draws
// ---------------------------------------------------------------------------

/// Draw `n` trials over four outcomes as a chain of conditional binomials.
pub fn draw_counts<R: Rng>(rng: &mut R, probs: &[f64; 4], n: u64) -> [u64; 4] {
    let mut counts = [0u64; 4];
    let mut remaining = n;
    let mut mass: f64 = probs.iter().sum();

    for k in 0..3 {
        if remaining == 0 || mass <= 0.0 {
            break;
        }
        let p = (probs[k] / mass).clamp(0.0, 1.0);
        let c = binomial(rng, remaining, p);
        counts[k] = c;
        remaining -= c;
        mass -= probs[k];
    }
    counts[3] += remaining;
    counts
}

/// Binomial(n, p) draw; `p` is clamped to [0, 1].
pub fn binomial<R: Rng>(rng: &mut R, n: u64, p: f64) -> u64 {
    if n == 0 || p.is_nan() || p <= 0.0 {
        return 0;
    }
    match Binomial::new(n, p.min(1.0)) {
        Ok(dist) => dist.sample(rng),
        Err(_) => 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::estimator::estimate;
    use std::f64::consts::{FRAC_PI_2, FRAC_PI_4, PI};

    // -----------------------------------------------------------------------
    // State vector
    // -----------------------------------------------------------------------

    #[test]
    fn test_bell_pair_probabilities() {
        let p = TwoQubitState::bell_pair().outcome_probabilities();
        assert!((p[0] - 0.5).abs() < 1e-12);
        assert!(p[1].abs() < 1e-12);
        assert!(p[2].abs() < 1e-12);
        assert!((p[3] - 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_ry_pi_flips_qubit() {
        let p = TwoQubitState::zero().ry(0, PI).outcome_probabilities();
        // Alice (qubit 0) flipped to 1, Bob stays 0 -> label "10"
        assert!((p[Outcome::OneZero.index()] - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_label_order_alice_first() {
        // Only Bob flipped -> "01"
        let p = TwoQubitState::zero().ry(1, PI).outcome_probabilities();
        assert!((p[Outcome::ZeroOne.index()] - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_correlation_is_cosine_of_difference() {
        let s = BellPairSampler::new(Some(1));
        for (a, b) in [(0.0, 0.0), (FRAC_PI_2, FRAC_PI_4), (0.3, -1.1), (7.0, -3.0)] {
            let d = s.measure(a, b, None).unwrap();
            let e = estimate(&d).unwrap();
            assert!((e - (a - b).cos()).abs() < 1e-12, "a={a} b={b} E={e}");
        }
    }

    #[test]
    fn test_visibility_scales_correlation() {
        let s = BellPairSampler::new(Some(1)).with_visibility(0.5).unwrap();
        let e = estimate(&s.measure(0.0, 0.0, None).unwrap()).unwrap();
        assert!((e - 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_visibility_out_of_range() {
        assert!(BellPairSampler::new(None).with_visibility(1.5).is_err());
        assert!(BellPairSampler::new(None).with_visibility(-0.1).is_err());
    }

    // -----------------------------------------------------------------------
    // Counted draws
    // -----------------------------------------------------------------------

    #[test]
    fn test_counts_total_matches_sample_size() {
        let s = BellPairSampler::new(Some(5));
        for n in [1u64, 10, 1000, 1 << 20] {
            let d = s.measure(0.4, 1.3, Some(n)).unwrap();
            assert_eq!(d.trials(), Some(n));
        }
    }

    #[test]
    fn test_zero_sample_size_rejected() {
        let s = BellPairSampler::new(Some(5));
        assert!(matches!(
            s.measure(0.0, 0.0, Some(0)),
            Err(ChshError::InvalidSampleSize(0))
        ));
    }

    #[test]
    fn test_same_seed_same_sequence() {
        let a = BellPairSampler::new(Some(42));
        let b = BellPairSampler::new(Some(42));
        for _ in 0..5 {
            assert_eq!(
                a.measure(0.1, 0.9, Some(5000)).unwrap(),
                b.measure(0.1, 0.9, Some(5000)).unwrap()
            );
        }
    }

    #[test]
    fn test_stream_draws_ignore_call_order() {
        let a = BellPairSampler::new(Some(42));
        let b = BellPairSampler::new(Some(42));
        let forward: Vec<_> = (0..4)
            .map(|k| a.measure_stream(0.1, 0.9, Some(5000), k).unwrap())
            .collect();
        let backward: Vec<_> = (0..4)
            .rev()
            .map(|k| b.measure_stream(0.1, 0.9, Some(5000), k).unwrap())
            .collect();
        let backward: Vec<_> = backward.into_iter().rev().collect();
        assert_eq!(forward, backward);
        assert_ne!(forward[0], forward[1], "distinct keys should draw differently");
    }

    #[test]
    fn test_stream_draws_unaffected_by_plain_measure() {
        let a = BellPairSampler::new(Some(8));
        let b = BellPairSampler::new(Some(8));
        a.measure(0.0, 1.0, Some(100)).unwrap();
        assert_eq!(
            a.measure_stream(0.2, 0.4, Some(2048), 7).unwrap(),
            b.measure_stream(0.2, 0.4, Some(2048), 7).unwrap()
        );
    }

    #[test]
    fn test_stream_exact_mode_and_zero_size() {
        let s = BellPairSampler::new(Some(1));
        assert!(!s.measure_stream(0.3, 0.1, None, 3).unwrap().is_counts());
        assert!(matches!(
            s.measure_stream(0.0, 0.0, Some(0), 3),
            Err(ChshError::InvalidSampleSize(0))
        ));
    }

    #[test]
    fn test_reserve_streams_hands_out_disjoint_blocks() {
        let s = BellPairSampler::new(None);
        assert_eq!(s.reserve_streams(4), 0);
        assert_eq!(s.reserve_streams(12), 4);
        assert_eq!(s.reserve_streams(4), 16);
    }

    #[test]
    fn test_perfect_correlation_never_disagrees() {
        let s = BellPairSampler::new(Some(9));
        let d = s.measure(0.0, 0.0, Some(100_000)).unwrap();
        let OutcomeDistribution::Counts(c) = d else {
            panic!("expected counts");
        };
        assert_eq!(c[1] + c[2], 0);
    }

    #[test]
    fn test_binomial_mean_close() {
        let mut rng = StdRng::seed_from_u64(3);
        for (n, p) in [(50u64, 0.3), (10_000, 0.001), (1_000_000, 0.25), (1_000_000, 0.9)] {
            let reps = 200;
            let total: u64 = (0..reps).map(|_| binomial(&mut rng, n, p)).sum();
            let mean = total as f64 / reps as f64;
            let expected = n as f64 * p;
            let sd = (n as f64 * p * (1.0 - p)).sqrt();
            // 6 standard errors of the mean
            assert!(
                (mean - expected).abs() < 6.0 * sd / (reps as f64).sqrt() + 1e-9,
                "n={n} p={p} mean={mean} expected={expected}"
            );
        }
    }

    #[test]
    fn test_binomial_edges() {
        let mut rng = StdRng::seed_from_u64(3);
        assert_eq!(binomial(&mut rng, 0, 0.5), 0);
        assert_eq!(binomial(&mut rng, 100, 0.0), 0);
        assert_eq!(binomial(&mut rng, 100, 1.0), 100);
        assert_eq!(binomial(&mut rng, 100, f64::NAN), 0);
        assert_eq!(binomial(&mut rng, 100, 1.5), 100);
    }

    #[test]
    fn test_draw_counts_respects_zero_probabilities() {
        let mut rng = StdRng::seed_from_u64(11);
        let c = draw_counts(&mut rng, &[0.5, 0.0, 0.0, 0.5], 10_000);
        assert_eq!(c[1], 0);
        assert_eq!(c[2], 0);
        assert_eq!(c.iter().sum::<u64>(), 10_000);
    }
}
