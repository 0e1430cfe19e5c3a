use std::fmt;

use ndarray::Array1;
use serde::{Deserialize, Serialize};

use crate::error::EvaluationError;

/// A closed time interval `[start, end]` in seconds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Segment {
    pub start: f64,
    pub end: f64,
}

impl Segment {
    /// Builds a segment, rejecting non-finite endpoints and `start > end`.
    pub fn new(start: f64, end: f64) -> Result<Self, EvaluationError> {
        let segment = Self { start, end };
        segment.validate()?;
        Ok(segment)
    }

    pub fn validate(&self) -> Result<(), EvaluationError> {
        if !self.start.is_finite() || !self.end.is_finite() {
            return Err(EvaluationError::precondition(format!(
                "segment endpoints must be finite, got ({}, {})",
                self.start, self.end
            )));
        }
        if self.start > self.end {
            return Err(EvaluationError::precondition(format!(
                "segment start {} is after its end {}",
                self.start, self.end
            )));
        }
        Ok(())
    }

    pub fn duration(&self) -> f64 {
        self.end - self.start
    }
}

/// Identity of a memoized class-weight computation: class count `K`
/// together with the dataset it was computed over.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CacheKey {
    pub num_scales: usize,
    pub dataset: String,
}

impl CacheKey {
    pub fn new(num_scales: usize, dataset: impl Into<String>) -> Self {
        Self {
            num_scales,
            dataset: dataset.into(),
        }
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "w0_{}_{}", self.num_scales, self.dataset)
    }
}

/// Per-class loss weights. `w0[k]` is the fraction of negative time-steps
/// for class `k` over the whole dataset and `w1 = 1 - w0`.
#[derive(Debug, Clone, PartialEq)]
pub struct ClassWeights {
    pub w0: Array1<f32>,
    pub w1: Array1<f32>,
}

impl ClassWeights {
    /// Derives `w1` from `w0`; only `w0` is ever persisted.
    pub fn from_negative_fractions(w0: Array1<f32>) -> Self {
        let w1 = w0.mapv(|value| 1.0 - value);
        Self { w0, w1 }
    }

    pub fn num_scales(&self) -> usize {
        self.w0.len()
    }
}

/// Scoring detail for one example of a batch.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExampleOutcome {
    /// Largest overlap over the selected candidates, in seconds.
    pub best_overlap: f64,
    pub best_candidate: Segment,
    /// Position of `best_candidate` in the ranked top-n list (0 = highest score).
    pub best_rank: usize,
    pub hit: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BatchOutcome {
    pub hits: usize,
    pub examples: Vec<ExampleOutcome>,
}
