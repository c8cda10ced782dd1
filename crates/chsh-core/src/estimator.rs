//! Correlation estimator: agreement minus disagreement over the total.

use crate::error::Result;
use crate::outcome::{Outcome, OutcomeDistribution};

/// Expectation value E = (w00 + w11 − w01 − w10) / total.
///
/// Validates the distribution first; a zero total or an unnormalised
/// probability vector fails with
/// [`ChshError::InvalidDistribution`](crate::ChshError::InvalidDistribution)
/// instead of being clamped. For a valid distribution the result lies in
/// [-1, 1].
pub fn estimate(distribution: &OutcomeDistribution) -> Result<f64> {
    distribution.validate()?;

    let (agree, disagree) = Outcome::ALL
        .iter()
        .fold((0.0f64, 0.0f64), |(a, d), &o| {
            let w = distribution.weight(o);
            if o.is_agreement() { (a + w, d) } else { (a, d + w) }
        });

    let total = agree + disagree;
    Ok((agree - disagree) / total)
}
