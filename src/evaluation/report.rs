use std::cmp::Ordering;

use serde::Serialize;

use crate::config::{RecallConfig, TimeBase};
use crate::error::EvaluationError;
use crate::evaluation::retrieval::RecallAccumulator;
use crate::types::{ExampleOutcome, Segment};

pub const REPORT_SCHEMA_VERSION: u32 = 1;

#[derive(Debug, Clone, Serialize)]
pub struct EvaluationReport {
    pub schema_version: u32,
    pub meta: Meta,
    pub config: RecallConfig,
    pub time_base: TimeBase,
    pub examples: Vec<ExampleReport>,
    pub hits: usize,
    pub recall: f32,
}

#[derive(Debug, Clone, Serialize)]
pub struct Meta {
    pub generated_at: String,
    pub source: String,
    pub case_count: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct ExampleReport {
    pub id: String,
    pub gold: Segment,
    pub best_candidate: Segment,
    pub best_overlap: f32,
    pub best_rank: usize,
    pub hit: bool,
}

impl ExampleReport {
    pub fn new(
        id: impl Into<String>,
        gold: Segment,
        outcome: &ExampleOutcome,
    ) -> Result<Self, EvaluationError> {
        Ok(Self {
            id: id.into(),
            gold,
            best_candidate: outcome.best_candidate,
            best_overlap: checked_f32(outcome.best_overlap, "example.best_overlap")?,
            best_rank: outcome.best_rank,
            hit: outcome.hit,
        })
    }
}

pub fn build_evaluation_report(
    meta: Meta,
    config: RecallConfig,
    time_base: TimeBase,
    examples: Vec<ExampleReport>,
) -> Result<EvaluationReport, EvaluationError> {
    let mut accumulator = RecallAccumulator::new();
    let hits = examples.iter().filter(|example| example.hit).count();
    accumulator.add_hits(hits, examples.len())?;
    let recall = checked_f32(accumulator.recall()?, "recall")?;

    Ok(EvaluationReport {
        schema_version: REPORT_SCHEMA_VERSION,
        meta,
        config,
        time_base,
        examples,
        hits,
        recall,
    })
}

#[derive(Debug, Clone, Serialize)]
pub struct MetricDistribution {
    pub mean: f32,
    pub p50: f32,
    pub p90: f32,
    pub p95: f32,
    pub p99: f32,
}

/// Annotated segment lengths (end frame minus start frame), used to pick
/// the number of scales `K`.
#[derive(Debug, Clone, Serialize)]
pub struct SegmentLengthReport {
    pub count: usize,
    pub min: i64,
    pub max: i64,
    pub distribution: MetricDistribution,
    pub sorted_lengths: Vec<i64>,
}

impl SegmentLengthReport {
    pub fn from_lengths(lengths: &[i64]) -> Result<Self, EvaluationError> {
        if lengths.is_empty() {
            return Err(EvaluationError::precondition(
                "segment length report needs at least one annotated segment",
            ));
        }
        let mut sorted_lengths = lengths.to_vec();
        sorted_lengths.sort_unstable();
        let as_f64: Vec<f64> = sorted_lengths.iter().map(|&value| value as f64).collect();

        Ok(Self {
            count: sorted_lengths.len(),
            min: sorted_lengths[0],
            max: sorted_lengths[sorted_lengths.len() - 1],
            distribution: distribution(&as_f64)?,
            sorted_lengths,
        })
    }
}

/// Parses the start and end frame columns of a tab-separated annotation row.
pub fn parse_annotation_row(line: &str, line_number: usize) -> Result<(i64, i64), EvaluationError> {
    let mut columns = line.split('\t');
    let mut column = |name: &str| -> Result<i64, EvaluationError> {
        let raw = columns.next().ok_or_else(|| {
            EvaluationError::precondition(format!("line {line_number}: missing {name} column"))
        })?;
        raw.trim().parse::<i64>().map_err(|err| {
            EvaluationError::precondition(format!(
                "line {line_number}: {name} column '{raw}' is not an integer: {err}"
            ))
        })
    };
    let start = column("start frame")?;
    let end = column("end frame")?;
    Ok((start, end))
}

fn distribution(sorted: &[f64]) -> Result<MetricDistribution, EvaluationError> {
    Ok(MetricDistribution {
        mean: checked_f32(mean(sorted), "distribution.mean")?,
        p50: checked_f32(percentile_sorted(sorted, 0.5), "distribution.p50")?,
        p90: checked_f32(percentile_sorted(sorted, 0.9), "distribution.p90")?,
        p95: checked_f32(percentile_sorted(sorted, 0.95), "distribution.p95")?,
        p99: checked_f32(percentile_sorted(sorted, 0.99), "distribution.p99")?,
    })
}

fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        0.0
    } else {
        values.iter().sum::<f64>() / values.len() as f64
    }
}

fn percentile_sorted(sorted_values: &[f64], percentile: f64) -> f64 {
    if sorted_values.is_empty() {
        return 0.0;
    }
    if sorted_values.len() == 1 {
        return sorted_values[0];
    }

    let clamped = percentile.clamp(0.0, 1.0);
    let max_index = (sorted_values.len() - 1) as f64;
    let rank = clamped * max_index;
    let lower = rank.floor() as usize;
    let upper = rank.ceil() as usize;
    if lower == upper {
        sorted_values[lower]
    } else {
        let weight = rank - lower as f64;
        sorted_values[lower] * (1.0 - weight) + sorted_values[upper] * weight
    }
}

pub(crate) fn checked_f32(value: f64, metric_name: &str) -> Result<f32, EvaluationError> {
    if !value.is_finite() {
        return Err(EvaluationError::degenerate(format!(
            "metric '{metric_name}' produced non-finite value: {value}"
        )));
    }
    if value < f32::MIN as f64 || value > f32::MAX as f64 {
        return Err(EvaluationError::degenerate(format!(
            "metric '{metric_name}' out of f32 range: {value}"
        )));
    }
    Ok(value as f32)
}

/// Sorts report entries so misses come first, worst overlap first.
pub fn sort_worst_first(examples: &mut [ExampleReport]) {
    examples.sort_by(|a, b| {
        a.hit
            .cmp(&b.hit)
            .then_with(|| a.best_overlap.partial_cmp(&b.best_overlap).unwrap_or(Ordering::Equal))
            .then_with(|| a.id.cmp(&b.id))
    });
}
