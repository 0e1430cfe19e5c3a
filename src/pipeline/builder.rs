use std::path::PathBuf;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use crate::error::EvaluationError;
use crate::pipeline::defaults::{InMemoryWeightCache, JsonFileWeightCache};
use crate::pipeline::traits::WeightCache;
use crate::training::class_weights::{ClassWeightEstimator, ClassWeightEstimatorParts};

pub struct ClassWeightEstimatorBuilder {
    cache: Option<Box<dyn WeightCache>>,
    cache_dir: Option<PathBuf>,
    cancel: Option<Arc<AtomicBool>>,
}

impl ClassWeightEstimatorBuilder {
    pub fn new() -> Self {
        Self {
            cache: None,
            cache_dir: None,
            cancel: None,
        }
    }

    pub fn with_cache(mut self, cache: Box<dyn WeightCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Persists weights as JSON files under `dir`. Ignored when an explicit
    /// cache is also given.
    pub fn with_cache_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cache_dir = Some(dir.into());
        self
    }

    pub fn with_cancel_flag(mut self, cancel: Arc<AtomicBool>) -> Self {
        self.cancel = Some(cancel);
        self
    }

    pub fn build(self) -> Result<ClassWeightEstimator, EvaluationError> {
        let cache: Box<dyn WeightCache> = match (self.cache, self.cache_dir) {
            (Some(cache), _) => cache,
            (None, Some(dir)) => Box::new(JsonFileWeightCache::new(dir)?),
            (None, None) => Box::new(InMemoryWeightCache::new()),
        };

        Ok(ClassWeightEstimator::from_parts(ClassWeightEstimatorParts {
            cache,
            cancel: self.cancel,
        }))
    }
}

impl Default for ClassWeightEstimatorBuilder {
    fn default() -> Self {
        Self::new()
    }
}
