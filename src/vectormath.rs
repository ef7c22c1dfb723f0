//! Small vector-math and hashing helpers shared by the embedding strategy.
//! Kept separate from `strategy_embedding` because both the link-embedding
//! cache key and the distance-matrix cache key are content hashes, and it
//! is easy to get the zero-norm edge case wrong in more than one place.

use sha2::{Digest, Sha256};

/// L2-normalize a vector in place is avoided; we return a new vector so
/// callers can keep the un-normalized original (e.g. for persistence).
/// Guards against a zero-norm vector with a `+1e-8` denominator, per the
/// numeric-arrays design note.
pub fn l2_normalize(v: &[f32]) -> Vec<f32> {
    let norm = (v.iter().map(|x| x * x).sum::<f32>()).sqrt();
    let denom = norm + 1e-8;
    v.iter().map(|x| x / denom).collect()
}

pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let an = l2_normalize(a);
    let bn = l2_normalize(b);
    an.iter().zip(bn.iter()).map(|(x, y)| x * y).sum()
}

pub fn cosine_distance(a: &[f32], b: &[f32]) -> f32 {
    1.0 - cosine_similarity(a, b)
}

/// Cosine similarity of `query` against every row of `matrix`, returning the
/// maximum. Returns `0.0` for an empty matrix (caller treats that as "no
/// coverage" rather than panicking).
pub fn max_cosine_similarity(query: &[f32], matrix: &[Vec<f32>]) -> f32 {
    if matrix.is_empty() {
        return 0.0;
    }
    matrix
        .iter()
        .map(|row| cosine_similarity(query, row))
        .fold(f32::MIN, f32::max)
}

/// Minimum cosine distance from `query` to any row of `matrix`. `1.0` if
/// `matrix` is empty (nothing in the KB to be close to).
pub fn min_cosine_distance(query: &[f32], matrix: &[Vec<f32>]) -> f32 {
    if matrix.is_empty() {
        return 1.0;
    }
    matrix
        .iter()
        .map(|row| cosine_distance(query, row))
        .fold(f32::MAX, f32::min)
}

/// SHA-256 content hash of a numeric matrix, used to invalidate the cached
/// query<->KB distance matrix only when `kb_embeddings` actually changes.
pub fn matrix_content_hash(matrix: &[Vec<f32>]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(matrix.len().to_le_bytes());
    for row in matrix {
        hasher.update(row.len().to_le_bytes());
        for v in row {
            hasher.update(v.to_le_bytes());
        }
    }
    hex::encode(hasher.finalize())
}

/// Cache key for the link-embedding cache: `hash(href + preview_text)`.
pub fn text_key_hash(href: &str, text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(href.as_bytes());
    hasher.update(text.as_bytes());
    hex::encode(hasher.finalize())
}
