//! Similarity scoring for embedding vectors.
//!
//! Degenerate inputs (length mismatch, zero magnitude, empty vectors) score
//! 0.0 rather than erroring; ranking treats "no signal" and "orthogonal"
//! the same way.

/// Cosine similarity between two vectors, in [-1, 1].
///
/// Returns 0.0 when the vectors have different lengths or either has zero
/// magnitude.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a < f32::EPSILON || norm_b < f32::EPSILON {
        return 0.0;
    }

    dot / (norm_a * norm_b)
}
