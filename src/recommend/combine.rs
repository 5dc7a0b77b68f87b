//! Weighted fusion of the overview and feature embeddings.
//!
//! `combined = alpha * normalize(overview) + beta * normalize(feature)`,
//! re-normalized to unit length. Inner-product search is only equivalent to
//! cosine similarity when both sides are unit vectors, so the re-normalize
//! step is part of the contract, not an optimization.
//!
//! This is the single place where vectors are normalized; backends hand
//! through raw embeddings.

/// Default relevance weight for the overview embedding.
pub const DEFAULT_ALPHA: f32 = 0.6;

/// Default relevance weight for the feature embedding.
pub const DEFAULT_BETA: f32 = 0.4;

#[derive(Debug, thiserror::Error)]
pub enum CombineError {
    #[error("embedding dimensions differ: overview {overview}, feature {feature}")]
    DimensionMismatch { overview: usize, feature: usize },

    #[error("cannot normalize a zero-norm vector")]
    ZeroNorm,
}

/// L2 norm of a vector.
pub fn l2_norm(v: &[f32]) -> f32 {
    v.iter().map(|x| x * x).sum::<f32>().sqrt()
}

/// Scale a vector to unit length.
pub fn normalized(v: &[f32]) -> Result<Vec<f32>, CombineError> {
    let norm = l2_norm(v);
    if norm < f32::EPSILON {
        return Err(CombineError::ZeroNorm);
    }
    Ok(v.iter().map(|x| x / norm).collect())
}

/// Fuse the two source embeddings into one unit vector.
///
/// Applied identically at catalog-build time and at query time; the weights
/// are relevance weights and need not sum to 1.
pub fn combine(
    overview: &[f32],
    feature: &[f32],
    alpha: f32,
    beta: f32,
) -> Result<Vec<f32>, CombineError> {
    if overview.len() != feature.len() {
        return Err(CombineError::DimensionMismatch {
            overview: overview.len(),
            feature: feature.len(),
        });
    }

    let overview = normalized(overview)?;
    let feature = normalized(feature)?;

    let weighted: Vec<f32> = overview
        .iter()
        .zip(feature.iter())
        .map(|(o, f)| alpha * o + beta * f)
        .collect();

    // alpha*u and beta*v can cancel exactly; that degenerate sum has no
    // direction and cannot be indexed.
    normalized(&weighted)
}

#[cfg(test)]
mod tests {
    use super::*;

    const TOLERANCE: f32 = 1e-5;

    #[test]
    fn test_combined_vector_is_unit_length() {
        let overview = vec![3.0, 4.0, 0.0];
        let feature = vec![0.0, 5.0, 12.0];

        let combined = combine(&overview, &feature, DEFAULT_ALPHA, DEFAULT_BETA).unwrap();
        assert!((l2_norm(&combined) - 1.0).abs() < TOLERANCE);
    }

    #[test]
    fn test_combine_hand_computed() {
        // Orthogonal unit inputs: combined = (0.6, 0.4) / sqrt(0.52)
        let overview = vec![1.0, 0.0];
        let feature = vec![0.0, 1.0];

        let combined = combine(&overview, &feature, 0.6, 0.4).unwrap();
        let norm = (0.52f32).sqrt();
        assert!((combined[0] - 0.6 / norm).abs() < TOLERANCE);
        assert!((combined[1] - 0.4 / norm).abs() < TOLERANCE);
    }

    #[test]
    fn test_combine_normalizes_sources_first() {
        // A scaled overview vector must produce the same result; only the
        // direction of each source matters.
        let feature = vec![0.0, 1.0];

        let a = combine(&[1.0, 0.0], &feature, 0.6, 0.4).unwrap();
        let b = combine(&[250.0, 0.0], &feature, 0.6, 0.4).unwrap();

        for (x, y) in a.iter().zip(b.iter()) {
            assert!((x - y).abs() < TOLERANCE);
        }
    }

    #[test]
    fn test_combine_dimension_mismatch() {
        let result = combine(&[1.0, 0.0], &[1.0, 0.0, 0.0], 0.6, 0.4);
        assert!(matches!(
            result,
            Err(CombineError::DimensionMismatch {
                overview: 2,
                feature: 3
            })
        ));
    }

    #[test]
    fn test_combine_zero_norm_input() {
        let result = combine(&[0.0, 0.0], &[1.0, 0.0], 0.6, 0.4);
        assert!(matches!(result, Err(CombineError::ZeroNorm)));
    }

    #[test]
    fn test_combine_cancelling_sum_is_error() {
        // Equal weights on exactly opposite directions cancel to zero.
        let result = combine(&[1.0, 0.0], &[-1.0, 0.0], 0.5, 0.5);
        assert!(matches!(result, Err(CombineError::ZeroNorm)));
    }

    #[test]
    fn test_weights_need_not_sum_to_one() {
        let combined = combine(&[1.0, 0.0], &[0.0, 1.0], 2.0, 1.0).unwrap();
        assert!((l2_norm(&combined) - 1.0).abs() < TOLERANCE);
        // Direction follows the weights: (2, 1) / sqrt(5)
        assert!((combined[0] - 2.0 / 5.0f32.sqrt()).abs() < TOLERANCE);
    }
}
