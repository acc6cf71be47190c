//! Phred and log10 conversions for genotype probabilities.

/// Highest probability a true event is allowed to have, capping Phred
/// scores near 100.
pub const MAX_CONFIDENCE: f64 = 1.0 - 1e-10;

pub fn perror_to_phred(perror: f64) -> f64 {
    -10.0 * perror.log10()
}

/// Phred-scaled error of a probability of truth, capped by `MAX_CONFIDENCE`.
/// Inputs are clamped to `[0, 1]`.
pub fn ptrue_to_bounded_phred(ptrue: f64) -> f64 {
    let ptrue = ptrue.clamp(0.0, 1.0);
    perror_to_phred(1.0 - ptrue.min(MAX_CONFIDENCE))
}

/// log10 of a probability, floored at `1 - MAX_CONFIDENCE`.
pub fn perror_to_bounded_log10_perror(perror: f64) -> f64 {
    perror.clamp(0.0, 1.0).max(1.0 - MAX_CONFIDENCE).log10()
}

/// Rounds to `decimals` places, ties to even.
pub fn round_to(value: f64, decimals: i32) -> f64 {
    let scale = 10f64.powi(decimals);
    (value * scale).round_ties_even() / scale
}
