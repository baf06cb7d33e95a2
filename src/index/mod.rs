use crate::error::IndexError;
use crate::types::{Passage, PassageRef};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// Hard cap on `k` for any query, bounding downstream context size
pub const MAX_TOP_K: usize = 16;

/// Per-document vector index with exact cosine search
///
/// The index is tagged with the embedding model that produced its vectors;
/// inserting vectors from a different model or dimensionality is rejected
/// rather than silently mixed. Vectors are normalized at insert time so a
/// query reduces to a dot product. Insertion is incremental: re-ingesting
/// or extending a document appends entries without a rebuild.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VectorIndex {
    model_id: String,
    dimension: usize,
    entries: Vec<IndexEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct IndexEntry {
    passage: PassageRef,
    vector: Vec<f32>,
}

impl VectorIndex {
    pub fn new(model_id: impl Into<String>, dimension: usize) -> Self {
        Self {
            model_id: model_id.into(),
            dimension,
            entries: Vec::new(),
        }
    }

    /// Build an index from fully embedded passages
    pub fn build(
        model_id: impl Into<String>,
        dimension: usize,
        passages: &[Passage],
    ) -> Result<Self, IndexError> {
        let model_id = model_id.into();
        let mut index = Self::new(model_id.clone(), dimension);
        for passage in passages {
            index.insert(passage.passage_ref(), passage.embedding.clone(), &model_id)?;
        }
        Ok(index)
    }

    pub fn model_id(&self) -> &str {
        &self.model_id
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Insert one passage vector
    ///
    /// `model_id` is the identity of the model that produced `vector`;
    /// mismatched model or dimensionality is an invariant violation.
    pub fn insert(
        &mut self,
        passage: PassageRef,
        vector: Vec<f32>,
        model_id: &str,
    ) -> Result<(), IndexError> {
        if model_id != self.model_id || vector.len() != self.dimension {
            return Err(IndexError::ModelMismatch {
                index_model: self.model_id.clone(),
                index_dimension: self.dimension,
                vector_model: model_id.to_string(),
                vector_dimension: vector.len(),
            });
        }

        self.entries.push(IndexEntry {
            passage,
            vector: normalize(vector),
        });
        Ok(())
    }

    /// Top-`k` passages by cosine similarity, highest score first
    ///
    /// `k` is capped at [`MAX_TOP_K`]. Ties are broken by ascending
    /// `(page_number, passage_index)` so results are deterministic. An
    /// empty index returns an empty result set, never an error.
    pub fn query(&self, query_vector: &[f32], k: usize) -> Result<Vec<(PassageRef, f32)>, IndexError> {
        if self.entries.is_empty() {
            return Ok(Vec::new());
        }

        if query_vector.len() != self.dimension {
            return Err(IndexError::ModelMismatch {
                index_model: self.model_id.clone(),
                index_dimension: self.dimension,
                vector_model: self.model_id.clone(),
                vector_dimension: query_vector.len(),
            });
        }

        let query = normalize(query_vector.to_vec());
        let mut scored: Vec<(PassageRef, f32)> = self
            .entries
            .iter()
            .map(|entry| (entry.passage.clone(), dot(&entry.vector, &query)))
            .collect();

        scored.sort_by(|a, b| {
            b.1.partial_cmp(&a.1)
                .unwrap_or(Ordering::Equal)
                .then_with(|| {
                    (a.0.page_number, a.0.passage_index)
                        .cmp(&(b.0.page_number, b.0.passage_index))
                })
        });

        scored.truncate(k.min(MAX_TOP_K));
        Ok(scored)
    }

    /// Cosine similarity between a query vector and one indexed passage
    ///
    /// Returns `None` when the passage is not in the index (e.g. cited by
    /// an old turn of a document that was re-ingested).
    pub fn similarity(&self, query_vector: &[f32], passage: &PassageRef) -> Option<f32> {
        if query_vector.len() != self.dimension {
            return None;
        }
        let query = normalize(query_vector.to_vec());
        self.entries
            .iter()
            .find(|entry| entry.passage == *passage)
            .map(|entry| dot(&entry.vector, &query))
    }
}

fn dot(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b.iter()).map(|(x, y)| x * y).sum()
}

fn normalize(mut vector: Vec<f32>) -> Vec<f32> {
    let norm: f32 = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        for value in vector.iter_mut() {
            *value /= norm;
        }
    }
    vector
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::DocumentId;

    fn passage_ref(idx: usize, page: usize) -> PassageRef {
        PassageRef {
            document_id: DocumentId::from("doc-1"),
            passage_index: idx,
            page_number: page,
        }
    }

    fn index_with(vectors: Vec<(PassageRef, Vec<f32>)>) -> VectorIndex {
        let mut index = VectorIndex::new("test-model", 3);
        for (p, v) in vectors {
            index.insert(p, v, "test-model").unwrap();
        }
        index
    }

    #[test]
    fn test_empty_index_returns_empty() {
        let index = VectorIndex::new("test-model", 3);
        let results = index.query(&[1.0, 0.0, 0.0], 5).unwrap();
        assert!(results.is_empty());
    }

    #[test]
    fn test_self_query_returns_top_match() {
        let index = index_with(vec![
            (passage_ref(0, 1), vec![1.0, 0.0, 0.0]),
            (passage_ref(1, 1), vec![0.0, 1.0, 0.0]),
            (passage_ref(2, 2), vec![0.0, 0.0, 1.0]),
        ]);

        let results = index.query(&[0.0, 1.0, 0.0], 3).unwrap();
        assert_eq!(results[0].0.passage_index, 1);
        assert!((results[0].1 - 1.0).abs() < 1e-6);
        assert!(results[0].1 > results[1].1);
    }

    #[test]
    fn test_ties_broken_by_page_then_index() {
        // Identical vectors force a score tie
        let index = index_with(vec![
            (passage_ref(5, 3), vec![1.0, 0.0, 0.0]),
            (passage_ref(2, 3), vec![1.0, 0.0, 0.0]),
            (passage_ref(0, 1), vec![1.0, 0.0, 0.0]),
        ]);

        let results = index.query(&[1.0, 0.0, 0.0], 3).unwrap();
        let order: Vec<(usize, usize)> = results
            .iter()
            .map(|(p, _)| (p.page_number, p.passage_index))
            .collect();
        assert_eq!(order, vec![(1, 0), (3, 2), (3, 5)]);
    }

    #[test]
    fn test_k_is_capped() {
        let mut index = VectorIndex::new("test-model", 3);
        for i in 0..40 {
            index
                .insert(passage_ref(i, 1), vec![1.0, 0.0, 0.0], "test-model")
                .unwrap();
        }
        let results = index.query(&[1.0, 0.0, 0.0], 1000).unwrap();
        assert_eq!(results.len(), MAX_TOP_K);
    }

    #[test]
    fn test_dimension_mismatch_rejected_at_insert() {
        let mut index = VectorIndex::new("test-model", 3);
        let err = index
            .insert(passage_ref(0, 1), vec![1.0, 0.0], "test-model")
            .unwrap_err();
        assert!(matches!(err, IndexError::ModelMismatch { .. }));
    }

    #[test]
    fn test_model_mismatch_rejected_at_insert() {
        let mut index = VectorIndex::new("test-model", 3);
        let err = index
            .insert(passage_ref(0, 1), vec![1.0, 0.0, 0.0], "other-model")
            .unwrap_err();
        assert!(matches!(err, IndexError::ModelMismatch { .. }));
    }

    #[test]
    fn test_incremental_insert_after_query() {
        let mut index = index_with(vec![(passage_ref(0, 1), vec![1.0, 0.0, 0.0])]);
        assert_eq!(index.query(&[1.0, 0.0, 0.0], 5).unwrap().len(), 1);

        index
            .insert(passage_ref(1, 2), vec![0.9, 0.1, 0.0], "test-model")
            .unwrap();
        assert_eq!(index.query(&[1.0, 0.0, 0.0], 5).unwrap().len(), 2);
        assert_eq!(index.len(), 2);
    }

    #[test]
    fn test_similarity_lookup() {
        let index = index_with(vec![
            (passage_ref(0, 1), vec![1.0, 0.0, 0.0]),
            (passage_ref(1, 2), vec![0.0, 1.0, 0.0]),
        ]);

        let score = index.similarity(&[1.0, 0.0, 0.0], &passage_ref(0, 1)).unwrap();
        assert!((score - 1.0).abs() < 1e-6);
        assert!(index.similarity(&[1.0, 0.0, 0.0], &passage_ref(9, 9)).is_none());
    }

    #[test]
    fn test_zero_vector_scores_zero() {
        let index = index_with(vec![(passage_ref(0, 1), vec![0.0, 0.0, 0.0])]);
        let results = index.query(&[1.0, 0.0, 0.0], 1).unwrap();
        assert_eq!(results[0].1, 0.0);
    }

    #[test]
    fn test_serde_roundtrip() {
        let index = index_with(vec![(passage_ref(0, 1), vec![1.0, 2.0, 2.0])]);
        let json = serde_json::to_string(&index).unwrap();
        let back: VectorIndex = serde_json::from_str(&json).unwrap();
        assert_eq!(back.len(), 1);
        assert_eq!(back.model_id(), "test-model");
        // Normalization happened before serialization
        let results = back.query(&[1.0, 2.0, 2.0], 1).unwrap();
        assert!((results[0].1 - 1.0).abs() < 1e-5);
    }
}
