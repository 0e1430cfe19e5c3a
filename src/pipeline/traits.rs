use ndarray::Array2;

use crate::error::EvaluationError;
use crate::types::CacheKey;

/// A labeled training set. Each example also carries visual and textual
/// inputs; only its `(T_i, K)` 0/1 label sequence is read here.
pub trait LabeledDataset {
    /// Stable identity used in cache keys.
    fn name(&self) -> &str;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn label_sequence(&self, index: usize) -> Result<Array2<f32>, EvaluationError>;
}

/// Keyed persistence for the negative-fraction vector `w0`.
pub trait WeightCache: Send + Sync {
    fn get(&self, key: &CacheKey) -> Result<Option<Vec<f32>>, EvaluationError>;

    fn put(&self, key: &CacheKey, w0: &[f32]) -> Result<(), EvaluationError>;
}
