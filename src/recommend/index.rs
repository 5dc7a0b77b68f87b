//! Exact inner-product nearest-neighbor index over the catalog vectors.
//!
//! Vectors are stored in ordinal order: position i holds the combined
//! embedding of catalog item i, and that mapping never changes without a
//! full rebuild. With unit vectors on both sides, inner product equals
//! cosine similarity.

/// In-memory, ordinal-addressed vector store with exhaustive search.
pub struct SimilarityIndex {
    vectors: Vec<Vec<f32>>,
    dimensions: usize,
}

/// One search result: the catalog ordinal and its similarity score.
#[derive(Debug, Clone, PartialEq)]
pub struct Hit {
    pub ordinal: usize,
    pub score: f32,
}

/// Errors while building the index.
#[derive(Debug, thiserror::Error)]
pub enum IndexError {
    #[error("vector at position {position} has dimension {got}, expected {expected}")]
    DimensionMismatch {
        position: usize,
        expected: usize,
        got: usize,
    },
}

/// Errors at query time. Request-scoped; never a silent empty result.
#[derive(Debug, thiserror::Error)]
pub enum QueryError {
    #[error("similarity index is empty")]
    EmptyIndex,

    #[error("query vector has dimension {got}, expected {expected}")]
    DimensionMismatch { expected: usize, got: usize },
}

impl SimilarityIndex {
    /// Create an empty index for vectors of the given dimension.
    pub fn new(dimensions: usize) -> Self {
        Self {
            vectors: Vec::new(),
            dimensions,
        }
    }

    /// Build an index from vectors already in ordinal order.
    pub fn from_vectors(dimensions: usize, vectors: Vec<Vec<f32>>) -> Result<Self, IndexError> {
        let mut index = Self {
            vectors: Vec::with_capacity(vectors.len()),
            dimensions,
        };
        for vector in vectors {
            index.push(vector)?;
        }
        Ok(index)
    }

    /// Append the next catalog vector. The vector's ordinal is its position
    /// in insertion order.
    pub fn push(&mut self, vector: Vec<f32>) -> Result<(), IndexError> {
        if vector.len() != self.dimensions {
            return Err(IndexError::DimensionMismatch {
                position: self.vectors.len(),
                expected: self.dimensions,
                got: vector.len(),
            });
        }
        self.vectors.push(vector);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.vectors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vectors.is_empty()
    }

    pub fn dimensions(&self) -> usize {
        self.dimensions
    }

    /// The stored vector at an ordinal, if present.
    pub fn vector(&self, ordinal: usize) -> Option<&[f32]> {
        self.vectors.get(ordinal).map(Vec::as_slice)
    }

    /// Iterate vectors in ordinal order.
    pub fn iter(&self) -> impl Iterator<Item = &[f32]> {
        self.vectors.iter().map(Vec::as_slice)
    }

    /// Return the `top_k` ordinals with the highest inner product against
    /// `query`, scores non-increasing, ties broken by ascending ordinal.
    ///
    /// The exhaustive scan yields hits in storage order, so the contractual
    /// ordering is always imposed here.
    pub fn search(&self, query: &[f32], top_k: usize) -> Result<Vec<Hit>, QueryError> {
        if self.vectors.is_empty() {
            return Err(QueryError::EmptyIndex);
        }
        if query.len() != self.dimensions {
            return Err(QueryError::DimensionMismatch {
                expected: self.dimensions,
                got: query.len(),
            });
        }

        let mut hits: Vec<Hit> = self
            .vectors
            .iter()
            .enumerate()
            .map(|(ordinal, vector)| Hit {
                ordinal,
                score: dot(query, vector),
            })
            .collect();

        hits.sort_unstable_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(a.ordinal.cmp(&b.ordinal))
        });
        hits.truncate(top_k);

        Ok(hits)
    }
}

fn dot(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b.iter()).map(|(x, y)| x * y).sum()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unit_index() -> SimilarityIndex {
        SimilarityIndex::from_vectors(
            3,
            vec![
                vec![1.0, 0.0, 0.0],
                vec![0.0, 1.0, 0.0],
                vec![0.0, 0.0, 1.0],
            ],
        )
        .unwrap()
    }

    #[test]
    fn test_push_assigns_ordinals_in_order() {
        let mut index = SimilarityIndex::new(2);
        index.push(vec![1.0, 0.0]).unwrap();
        index.push(vec![0.0, 1.0]).unwrap();

        assert_eq!(index.len(), 2);
        assert_eq!(index.vector(0), Some([1.0, 0.0].as_slice()));
        assert_eq!(index.vector(1), Some([0.0, 1.0].as_slice()));
    }

    #[test]
    fn test_push_rejects_wrong_dimension() {
        let mut index = SimilarityIndex::new(3);
        index.push(vec![1.0, 0.0, 0.0]).unwrap();

        let result = index.push(vec![1.0, 0.0]);
        assert!(matches!(
            result,
            Err(IndexError::DimensionMismatch {
                position: 1,
                expected: 3,
                got: 2
            })
        ));
    }

    #[test]
    fn test_search_orders_by_score_descending() {
        let index = unit_index();
        let hits = index.search(&[0.9, 0.4, 0.1], 3).unwrap();

        assert_eq!(hits.len(), 3);
        assert_eq!(hits[0].ordinal, 0);
        assert_eq!(hits[1].ordinal, 1);
        assert_eq!(hits[2].ordinal, 2);
        assert!(hits[0].score >= hits[1].score && hits[1].score >= hits[2].score);
    }

    #[test]
    fn test_search_exact_match_scores_one() {
        let index = unit_index();
        let hits = index.search(&[0.0, 1.0, 0.0], 1).unwrap();

        assert_eq!(hits[0].ordinal, 1);
        assert!((hits[0].score - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_search_result_length_is_min_k_n() {
        let index = unit_index();

        assert_eq!(index.search(&[1.0, 0.0, 0.0], 2).unwrap().len(), 2);
        assert_eq!(index.search(&[1.0, 0.0, 0.0], 10).unwrap().len(), 3);
        assert_eq!(index.search(&[1.0, 0.0, 0.0], 0).unwrap().len(), 0);
    }

    #[test]
    fn test_search_ties_break_by_ascending_ordinal() {
        // Duplicate vectors produce identical scores; order must still be
        // deterministic.
        let index = SimilarityIndex::from_vectors(
            2,
            vec![
                vec![0.0, 1.0],
                vec![1.0, 0.0],
                vec![1.0, 0.0],
                vec![1.0, 0.0],
            ],
        )
        .unwrap();

        let hits = index.search(&[1.0, 0.0], 4).unwrap();
        let ordinals: Vec<usize> = hits.iter().map(|h| h.ordinal).collect();
        assert_eq!(ordinals, vec![1, 2, 3, 0]);
    }

    #[test]
    fn test_search_empty_index_is_error() {
        let index = SimilarityIndex::new(3);
        let result = index.search(&[1.0, 0.0, 0.0], 5);
        assert!(matches!(result, Err(QueryError::EmptyIndex)));
    }

    #[test]
    fn test_search_dimension_mismatch_is_error() {
        let index = unit_index();
        let result = index.search(&[1.0, 0.0], 5);
        assert!(matches!(
            result,
            Err(QueryError::DimensionMismatch {
                expected: 3,
                got: 2
            })
        ));
    }
}
