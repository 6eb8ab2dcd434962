//! Genotype-likelihood post-processing.
//!
//! Model outputs are a probability vector over the three genotype classes
//! (hom-ref, het, hom-alt). Rounding keeps downstream serialization stable:
//! every element is rounded to a fixed number of decimal places and the
//! smallest element is re-derived so the vector still sums to one.

/// Number of genotype classes a prediction covers.
pub const NUM_GENOTYPES: usize = 3;

/// Decimal places genotype likelihoods are rounded to by default.
pub const GL_PRECISION: u32 = 10;

/// How far from 1.0 the probability sum may drift before the vector is
/// rejected as invalid.
const SUM_TOLERANCE: f32 = 1e-6;

#[derive(Debug, Clone, thiserror::Error)]
pub enum LikelihoodError {
    #[error("expected {NUM_GENOTYPES} genotype probabilities, got {0}")]
    WrongLength(usize),

    #[error("genotype probabilities sum to {sum}, not 1")]
    BadSum { sum: f32 },
}

/// Round genotype likelihoods to `precision` decimal places.
///
/// The smallest element absorbs the rounding error: it is recomputed as
/// `max(0, 1 - sum(others))` so the rounded vector sums to one.
/// `precision = None` validates without rounding.
pub fn round_gls(gls: &[f32], precision: Option<u32>) -> Result<Vec<f32>, LikelihoodError> {
    if gls.len() != NUM_GENOTYPES {
        return Err(LikelihoodError::WrongLength(gls.len()));
    }
    let sum: f32 = gls.iter().sum();
    if (sum - 1.0).abs() > SUM_TOLERANCE {
        return Err(LikelihoodError::BadSum { sum });
    }
    let Some(precision) = precision else {
        return Ok(gls.to_vec());
    };

    let mut min_ix = 0;
    for (ix, gl) in gls.iter().enumerate() {
        if *gl < gls[min_ix] {
            min_ix = ix;
        }
    }

    let factor = 10f64.powi(precision as i32);
    let round = |v: f64| (v * factor).round() / factor;

    let mut rounded: Vec<f32> = gls.iter().map(|gl| round(*gl as f64) as f32).collect();
    let others: f64 = rounded
        .iter()
        .enumerate()
        .filter(|(ix, _)| *ix != min_ix)
        .map(|(_, gl)| *gl as f64)
        .sum();
    rounded[min_ix] = round(1.0 - others).max(0.0) as f32;
    Ok(rounded)
}
