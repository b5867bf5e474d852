//! Embedding-based semantic drift against a subject's baseline.

/// Cosine similarity; `None` for empty, mismatched or zero-norm vectors.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> Option<f64> {
    if a.is_empty() || a.len() != b.len() {
        return None;
    }
    let (mut dot, mut norm_a, mut norm_b) = (0.0f64, 0.0f64, 0.0f64);
    for (&x, &y) in a.iter().zip(b) {
        let (x, y) = (x as f64, y as f64);
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }
    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom == 0.0 || !denom.is_finite() {
        return None;
    }
    let sim = dot / denom;
    sim.is_finite().then_some(sim)
}

/// `1 - cosine(current, baseline)`, or 0 when either side is missing or degenerate.
pub fn semantic_drift(current: Option<&[f32]>, baseline: Option<&[f32]>) -> f64 {
    match (current, baseline) {
        (Some(c), Some(b)) => match cosine_similarity(c, b) {
            Some(sim) => 1.0 - sim,
            None => {
                tracing::warn!(
                    current_dims = c.len(),
                    baseline_dims = b.len(),
                    "Degenerate embedding pair, semantic drift defaults to 0"
                );
                0.0
            }
        },
        _ => 0.0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identical_vectors_have_zero_drift() {
        let v = [0.3f32, 0.4, 0.5];
        let drift = semantic_drift(Some(&v), Some(&v));
        assert!(drift.abs() < 1e-9, "drift was {drift}");
    }

    #[test]
    fn test_orthogonal_vectors_have_unit_drift() {
        let a = [1.0f32, 0.0];
        let b = [0.0f32, 1.0];
        assert!((semantic_drift(Some(&a), Some(&b)) - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_opposite_vectors_have_drift_two() {
        let a = [1.0f32, 2.0];
        let b = [-1.0f32, -2.0];
        assert!((semantic_drift(Some(&a), Some(&b)) - 2.0).abs() < 1e-9);
    }

    #[test]
    fn test_missing_baseline_is_zero() {
        let a = [1.0f32, 0.0];
        assert_eq!(semantic_drift(Some(&a), None), 0.0);
        assert_eq!(semantic_drift(None, Some(&a)), 0.0);
    }

    #[test]
    fn test_zero_norm_or_mismatch_is_zero() {
        let zero = [0.0f32, 0.0];
        let a = [1.0f32, 0.0];
        let longer = [1.0f32, 0.0, 0.0];
        assert_eq!(semantic_drift(Some(&zero), Some(&a)), 0.0);
        assert_eq!(semantic_drift(Some(&a), Some(&longer)), 0.0);
        assert!(cosine_similarity(&[], &[]).is_none());
    }

    #[test]
    fn test_scale_invariance() {
        let a = [1.0f32, 2.0, 3.0];
        let b = [2.0f32, 4.0, 6.0];
        assert!((cosine_similarity(&a, &b).unwrap() - 1.0).abs() < 1e-12);
    }
}
