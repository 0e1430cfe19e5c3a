use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use ndarray::{Array1, Axis};
use parking_lot::Mutex;

use crate::error::EvaluationError;
use crate::pipeline::traits::{LabeledDataset, WeightCache};
use crate::types::{CacheKey, ClassWeights};

/// Memoized estimation of the BCE class weights `(w0, w1)`.
///
/// Callers sharing one estimator serialize per cache key, so a dataset is
/// scanned at most once per key while the cache holds the entry. A key's lock
/// lives only while some caller is estimating it.
pub struct ClassWeightEstimator {
    cache: Box<dyn WeightCache>,
    cancel: Option<Arc<AtomicBool>>,
    key_locks: Mutex<HashMap<CacheKey, Arc<Mutex<()>>>>,
}

pub(crate) struct ClassWeightEstimatorParts {
    pub cache: Box<dyn WeightCache>,
    pub cancel: Option<Arc<AtomicBool>>,
}

impl ClassWeightEstimator {
    pub(crate) fn from_parts(parts: ClassWeightEstimatorParts) -> Self {
        Self {
            cache: parts.cache,
            cancel: parts.cancel,
            key_locks: Mutex::new(HashMap::new()),
        }
    }

    /// Returns the cached weights for `key`, or scans `dataset` once and
    /// caches `w0` before returning.
    pub fn estimate<D: LabeledDataset + ?Sized>(
        &self,
        dataset: &D,
        key: &CacheKey,
    ) -> Result<ClassWeights, EvaluationError> {
        let key_lock = self
            .key_locks
            .lock()
            .entry(key.clone())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        let result = {
            let _guard = key_lock.lock();
            estimate_with_cache(dataset, key, self.cache.as_ref(), self.cancel.as_deref())
        };
        self.release_key_lock(key, key_lock);
        result
    }

    fn release_key_lock(&self, key: &CacheKey, key_lock: Arc<Mutex<()>>) {
        drop(key_lock);
        let mut locks = self.key_locks.lock();
        // waiters hold their own clone and will release it themselves
        if locks.get(key).is_some_and(|lock| Arc::strong_count(lock) == 1) {
            locks.remove(key);
        }
    }
}

/// One-off estimation against `cache`, without per-key serialization.
pub fn estimate_weights<D: LabeledDataset + ?Sized>(
    dataset: &D,
    key: &CacheKey,
    cache: &dyn WeightCache,
) -> Result<ClassWeights, EvaluationError> {
    estimate_with_cache(dataset, key, cache, None)
}

fn estimate_with_cache<D: LabeledDataset + ?Sized>(
    dataset: &D,
    key: &CacheKey,
    cache: &dyn WeightCache,
    cancel: Option<&AtomicBool>,
) -> Result<ClassWeights, EvaluationError> {
    if let Some(w0) = load_cached(cache, key)? {
        tracing::info!(cache_key = %key, "loaded cached class weights");
        return Ok(ClassWeights::from_negative_fractions(w0));
    }

    tracing::info!(
        cache_key = %key,
        dataset = dataset.name(),
        examples = dataset.len(),
        "computing class weights"
    );
    let w0 = negative_fractions(dataset, key.num_scales, cancel)?;
    cache.put(key, &w0.to_vec())?;
    tracing::info!(cache_key = %key, "cached class weights");
    Ok(ClassWeights::from_negative_fractions(w0))
}

fn load_cached(cache: &dyn WeightCache, key: &CacheKey) -> Result<Option<Array1<f32>>, EvaluationError> {
    let cached = match cache.get(key) {
        Ok(Some(w0)) => w0,
        Ok(None) => return Ok(None),
        Err(err @ EvaluationError::CacheCorruption { .. }) => {
            tracing::warn!(cache_key = %key, error = %err, "ignoring corrupt class-weight cache entry");
            return Ok(None);
        }
        Err(err) => return Err(err),
    };
    match check_cached(key, cached) {
        Ok(w0) => Ok(Some(w0)),
        Err(err) => {
            tracing::warn!(cache_key = %key, error = %err, "ignoring corrupt class-weight cache entry");
            Ok(None)
        }
    }
}

/// Average fraction of negative time-steps per class over every example.
///
/// Streams the dataset: one label sequence is held at a time. Partial sums
/// are dropped if `cancel` is raised mid-scan.
pub fn negative_fractions<D: LabeledDataset + ?Sized>(
    dataset: &D,
    num_scales: usize,
    cancel: Option<&AtomicBool>,
) -> Result<Array1<f32>, EvaluationError> {
    if num_scales == 0 {
        return Err(EvaluationError::precondition("number of scales K must be at least 1"));
    }
    if dataset.is_empty() {
        return Err(EvaluationError::precondition(format!(
            "dataset '{}' has no examples",
            dataset.name()
        )));
    }

    let mut negatives = vec![0.0f64; num_scales];
    let mut total_steps = 0u64;
    for index in 0..dataset.len() {
        if cancel.is_some_and(|flag| flag.load(Ordering::Relaxed)) {
            return Err(EvaluationError::Cancelled { processed: index });
        }

        let label = dataset.label_sequence(index)?;
        if label.ncols() != num_scales {
            return Err(EvaluationError::precondition(format!(
                "example {index} of '{}': label sequence has {} scales, expected {num_scales}",
                dataset.name(),
                label.ncols()
            )));
        }
        if let Some(bad) = label.iter().find(|&&value| value != 0.0 && value != 1.0) {
            return Err(EvaluationError::precondition(format!(
                "example {index} of '{}': label value {bad} is not 0 or 1",
                dataset.name()
            )));
        }

        let steps = label.nrows();
        total_steps += steps as u64;
        for (k, column) in label.axis_iter(Axis(1)).enumerate() {
            let positives: f64 = column.iter().map(|&value| value as f64).sum();
            negatives[k] += steps as f64 - positives;
        }
    }

    if total_steps == 0 {
        return Err(EvaluationError::degenerate(format!(
            "dataset '{}' has zero labeled time-steps",
            dataset.name()
        )));
    }
    let total = total_steps as f64;
    Ok(negatives
        .into_iter()
        .map(|count| (count / total) as f32)
        .collect())
}

fn check_cached(key: &CacheKey, cached: Vec<f32>) -> Result<Array1<f32>, EvaluationError> {
    if cached.len() != key.num_scales {
        return Err(EvaluationError::cache_corruption(
            key,
            format!("holds {} weights, expected {}", cached.len(), key.num_scales),
        ));
    }
    if let Some(bad) = cached
        .iter()
        .find(|value| !value.is_finite() || !(0.0..=1.0).contains(*value))
    {
        return Err(EvaluationError::cache_corruption(
            key,
            format!("weight {bad} is outside [0, 1]"),
        ));
    }
    Ok(Array1::from(cached))
}
