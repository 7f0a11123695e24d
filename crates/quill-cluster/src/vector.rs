//! Pure vector math for the clustering engine.
//!
//! All functions are deterministic and stateless. Degenerate input (empty
//! vectors, mismatched lengths, zero norms) is treated as "no signal" and
//! yields a zero similarity rather than an error; embeddings from a healthy
//! provider never hit those branches, deleted notes sometimes do.

use quill_core::{Cluster, Embedding, Vector};
use uuid::Uuid;

/// Cosine similarity between two vectors, in `[-1, 1]`.
///
/// Returns 0.0 when either vector is empty, lengths mismatch, or either
/// norm is zero.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.is_empty() || b.is_empty() || a.len() != b.len() {
        return 0.0;
    }

    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;
    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a.sqrt() * norm_b.sqrt())
}

/// Component-wise mean of a set of vectors. Empty input yields an empty
/// vector; inputs whose length differs from the first vector are skipped.
pub fn centroid(vectors: &[&Vector]) -> Vector {
    let Some(first) = vectors.first() else {
        return Vec::new();
    };
    let dimension = first.len();

    let mut sum = vec![0.0f32; dimension];
    let mut count = 0usize;
    for vector in vectors {
        if vector.len() != dimension {
            continue;
        }
        for (acc, value) in sum.iter_mut().zip(vector.iter()) {
            *acc += value;
        }
        count += 1;
    }

    if count == 0 {
        return Vec::new();
    }
    for value in &mut sum {
        *value /= count as f32;
    }
    sum
}

/// The nearest cluster found by [`find_nearest_cluster`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NearestCluster {
    /// Index into the scanned cluster slice.
    pub index: usize,
    pub similarity: f32,
}

/// Linear scan for the cluster whose centroid is most similar to `vector`.
///
/// Strict `>` comparison, so the first maximum wins on ties. Clusters with
/// empty centroids are skipped. Returns `None` when no cluster qualifies.
pub fn find_nearest_cluster(vector: &[f32], clusters: &[Cluster]) -> Option<NearestCluster> {
    let mut best: Option<NearestCluster> = None;
    for (index, cluster) in clusters.iter().enumerate() {
        if cluster.centroid.is_empty() {
            continue;
        }
        let similarity = cosine_similarity(vector, &cluster.centroid);
        let beats = match best {
            Some(b) => similarity > b.similarity,
            None => true,
        };
        if beats {
            best = Some(NearestCluster { index, similarity });
        }
    }
    best
}

/// Rank embeddings by similarity to `vector`, descending, truncated to
/// `top_n`.
pub fn find_similar_notes(
    vector: &[f32],
    candidates: &[Embedding],
    top_n: usize,
) -> Vec<(Uuid, f32)> {
    let mut scored: Vec<(Uuid, f32)> = candidates
        .iter()
        .map(|e| (e.note_id, cosine_similarity(vector, &e.vector)))
        .collect();
    scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
    scored.truncate(top_n);
    scored
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn cluster_with_centroid(centroid: Vector) -> Cluster {
        Cluster::new("test", centroid, vec![Uuid::new_v4()])
    }

    fn embedding(note_id: Uuid, vector: Vector) -> Embedding {
        Embedding {
            id: Uuid::new_v4(),
            note_id,
            vector,
            model: "test".into(),
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_self_similarity_is_one() {
        let v = vec![0.3, -1.2, 4.5];
        assert!((cosine_similarity(&v, &v) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_zero_vector_has_no_signal() {
        let v = vec![1.0, 2.0];
        assert_eq!(cosine_similarity(&v, &[0.0, 0.0]), 0.0);
        assert_eq!(cosine_similarity(&[], &v), 0.0);
        assert_eq!(cosine_similarity(&v, &[1.0]), 0.0);
    }

    #[test]
    fn test_orthogonal_and_opposite() {
        assert_eq!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]), 0.0);
        assert!((cosine_similarity(&[1.0, 0.0], &[-1.0, 0.0]) + 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_centroid_identities() {
        let v = vec![1.0, 2.0, 3.0];
        assert_eq!(centroid(&[&v]), v);
        assert_eq!(centroid(&[&v, &v]), v);
        assert_eq!(centroid(&[]), Vec::<f32>::new());
    }

    #[test]
    fn test_centroid_is_mean() {
        let a = vec![0.0, 2.0];
        let b = vec![2.0, 0.0];
        assert_eq!(centroid(&[&a, &b]), vec![1.0, 1.0]);
    }

    #[test]
    fn test_centroid_skips_mismatched_dimension() {
        let a = vec![2.0, 4.0];
        let bad = vec![1.0];
        assert_eq!(centroid(&[&a, &bad]), vec![2.0, 4.0]);
    }

    #[test]
    fn test_find_nearest_empty_set() {
        assert!(find_nearest_cluster(&[1.0, 0.0], &[]).is_none());
    }

    #[test]
    fn test_find_nearest_first_max_wins_on_tie() {
        let clusters = vec![
            cluster_with_centroid(vec![1.0, 0.0]),
            cluster_with_centroid(vec![2.0, 0.0]), // same direction, same similarity
            cluster_with_centroid(vec![0.0, 1.0]),
        ];
        let nearest = find_nearest_cluster(&[1.0, 0.0], &clusters).unwrap();
        assert_eq!(nearest.index, 0);
        assert!((nearest.similarity - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_find_nearest_skips_empty_centroid() {
        let clusters = vec![
            cluster_with_centroid(vec![]),
            cluster_with_centroid(vec![0.0, 1.0]),
        ];
        let nearest = find_nearest_cluster(&[0.0, 1.0], &clusters).unwrap();
        assert_eq!(nearest.index, 1);
    }

    #[test]
    fn test_find_similar_notes_sorted_and_truncated() {
        let near = Uuid::new_v4();
        let mid = Uuid::new_v4();
        let far = Uuid::new_v4();
        let candidates = vec![
            embedding(far, vec![0.0, 1.0]),
            embedding(near, vec![1.0, 0.0]),
            embedding(mid, vec![1.0, 1.0]),
        ];

        let ranked = find_similar_notes(&[1.0, 0.0], &candidates, 2);
        assert_eq!(ranked.len(), 2);
        assert_eq!(ranked[0].0, near);
        assert_eq!(ranked[1].0, mid);
    }
}
