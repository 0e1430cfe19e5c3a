use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::EvaluationError;

/// Parameters of the Recall@N,IoU=θ metric. Every field is required.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecallConfig {
    /// Time-steps covered by one scale index ("delta").
    pub window_scale_unit: f64,
    /// A candidate must overlap the ground truth by strictly more than this.
    pub overlap_threshold: f64,
    /// Number of highest-scoring cells considered per example.
    pub top_n: usize,
}

impl RecallConfig {
    pub fn load(path: &Path) -> Result<Self, EvaluationError> {
        let data = std::fs::read_to_string(path)
            .map_err(|e| EvaluationError::io("read recall config", e))?;
        let config: Self = serde_json::from_str(&data)
            .map_err(|e| EvaluationError::json("parse recall config", e))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), EvaluationError> {
        if !self.window_scale_unit.is_finite() || self.window_scale_unit <= 0.0 {
            return Err(EvaluationError::precondition(format!(
                "window_scale_unit must be a positive finite number, got {}",
                self.window_scale_unit
            )));
        }
        if !self.overlap_threshold.is_finite() {
            return Err(EvaluationError::precondition(format!(
                "overlap_threshold must be finite, got {}",
                self.overlap_threshold
            )));
        }
        if self.top_n == 0 {
            return Err(EvaluationError::precondition("top_n must be at least 1"));
        }
        Ok(())
    }
}

/// Conversion from sampled time-step indices to seconds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TimeBase {
    /// Raw video frames per second.
    pub frame_rate: f64,
    /// Raw frames between consecutive sampled time-steps.
    pub sample_stride: usize,
}

impl TimeBase {
    pub fn new(frame_rate: f64, sample_stride: usize) -> Result<Self, EvaluationError> {
        let time_base = Self {
            frame_rate,
            sample_stride,
        };
        time_base.validate()?;
        Ok(time_base)
    }

    pub fn validate(&self) -> Result<(), EvaluationError> {
        if !self.frame_rate.is_finite() || self.frame_rate <= 0.0 {
            return Err(EvaluationError::precondition(format!(
                "frame_rate must be a positive finite number, got {}",
                self.frame_rate
            )));
        }
        if self.sample_stride == 0 {
            return Err(EvaluationError::precondition("sample_stride must be at least 1"));
        }
        Ok(())
    }

    /// Seconds elapsed at the end of time-step `time_index`.
    pub fn step_time(&self, time_index: usize) -> f64 {
        (time_index as f64 * self.sample_stride as f64) / self.frame_rate
    }

    /// Length in seconds of a window spanning `scale_count` scale units.
    pub fn window_length(&self, scale_count: usize, window_scale_unit: f64) -> f64 {
        (scale_count as f64 * window_scale_unit * self.sample_stride as f64) / self.frame_rate
    }
}
