use std::cmp::Ordering;

use ndarray::{ArrayView2, ArrayView3, Axis};

use crate::config::{RecallConfig, TimeBase};
use crate::error::EvaluationError;
use crate::types::{BatchOutcome, ExampleOutcome, Segment};

/// Number of examples in `predictions` whose best top-n candidate overlaps
/// the ground truth by strictly more than `config.overlap_threshold`.
///
/// `predictions` has shape `(N, T, K)`; cell `(n, t, k)` scores the segment
/// ending at step `t` and spanning `k + 1` scale units. Divide by `N` for
/// Recall@N,IoU=θ.
pub fn score_batch(
    predictions: ArrayView3<'_, f32>,
    gold: &[Segment],
    config: &RecallConfig,
    time_base: TimeBase,
) -> Result<usize, EvaluationError> {
    evaluate_batch(predictions, gold, config, time_base).map(|outcome| outcome.hits)
}

pub fn evaluate_batch(
    predictions: ArrayView3<'_, f32>,
    gold: &[Segment],
    config: &RecallConfig,
    time_base: TimeBase,
) -> Result<BatchOutcome, EvaluationError> {
    config.validate()?;
    time_base.validate()?;

    let (n_batch, t_len, num_scales) = predictions.dim();
    if n_batch != gold.len() {
        return Err(EvaluationError::precondition(format!(
            "score tensor holds {n_batch} examples but {} ground-truth segments were given",
            gold.len()
        )));
    }
    if t_len == 0 || num_scales == 0 {
        return Err(EvaluationError::precondition(format!(
            "score tensor needs at least one time-step and one scale, got shape ({n_batch}, {t_len}, {num_scales})"
        )));
    }
    let cells = t_len * num_scales;
    if config.top_n > cells {
        return Err(EvaluationError::precondition(format!(
            "top_n={} exceeds the {cells} cells of a ({t_len}, {num_scales}) score matrix",
            config.top_n
        )));
    }

    let mut hits = 0usize;
    let mut examples = Vec::with_capacity(n_batch);
    for (index, (scores, truth)) in predictions.axis_iter(Axis(0)).zip(gold).enumerate() {
        truth.validate().map_err(|err| {
            EvaluationError::precondition(format!("example {index}: ground truth: {err}"))
        })?;
        let ranked = top_n_indices(scores, config.top_n)
            .map_err(|err| EvaluationError::precondition(format!("example {index}: {err}")))?;

        let outcome = best_candidate(&ranked, truth, num_scales, config, time_base)?;
        tracing::debug!(
            example = index,
            best_overlap = outcome.best_overlap,
            best_start = outcome.best_candidate.start,
            best_end = outcome.best_candidate.end,
            best_rank = outcome.best_rank,
            hit = outcome.hit,
            "retrieval: best candidate"
        );
        if outcome.hit {
            hits += 1;
        }
        examples.push(outcome);
    }

    Ok(BatchOutcome { hits, examples })
}

/// Flat indices (`t * K + k`) of the `top_n` highest scores, best first.
///
/// Equal scores rank by ascending flat index, so the earliest cell wins a tie.
pub fn top_n_indices(scores: ArrayView2<'_, f32>, top_n: usize) -> Result<Vec<usize>, EvaluationError> {
    let num_scales = scores.ncols();
    let mut ranked: Vec<(usize, f32)> = Vec::with_capacity(scores.len());
    for (flat, &score) in scores.iter().enumerate() {
        if !score.is_finite() {
            return Err(EvaluationError::precondition(format!(
                "non-finite score {score} at (t={}, k={})",
                flat / num_scales.max(1),
                flat % num_scales.max(1)
            )));
        }
        ranked.push((flat, score));
    }
    if top_n > ranked.len() {
        return Err(EvaluationError::precondition(format!(
            "top_n={top_n} exceeds the {} available cells",
            ranked.len()
        )));
    }

    let order = |a: &(usize, f32), b: &(usize, f32)| -> Ordering {
        b.1.total_cmp(&a.1).then_with(|| a.0.cmp(&b.0))
    };
    if top_n > 0 && top_n < ranked.len() {
        ranked.select_nth_unstable_by(top_n - 1, order);
        ranked.truncate(top_n);
    }
    ranked.sort_unstable_by(order);
    ranked.truncate(top_n);
    Ok(ranked.into_iter().map(|(flat, _)| flat).collect())
}

/// Decodes a flat score-matrix index into the candidate segment it scores.
///
/// Times are `t * sample_stride / frame_rate` and
/// `end - (k + 1) * window_scale_unit * sample_stride / frame_rate`, each
/// product taken before the division. The start is not clamped: a window
/// longer than the elapsed time yields a negative start.
pub fn decode_candidate(
    flat_index: usize,
    num_scales: usize,
    window_scale_unit: f64,
    time_base: TimeBase,
) -> Result<Segment, EvaluationError> {
    if num_scales == 0 {
        return Err(EvaluationError::precondition("number of scales K must be at least 1"));
    }
    if !window_scale_unit.is_finite() || window_scale_unit <= 0.0 {
        return Err(EvaluationError::precondition(format!(
            "window_scale_unit must be a positive finite number, got {window_scale_unit}"
        )));
    }
    time_base.validate()?;

    let time_index = flat_index / num_scales;
    let scale_count = (flat_index % num_scales) + 1;
    let end = time_base.step_time(time_index);
    let start = end - time_base.window_length(scale_count, window_scale_unit);
    Ok(Segment { start, end })
}

fn best_candidate(
    ranked: &[usize],
    truth: &Segment,
    num_scales: usize,
    config: &RecallConfig,
    time_base: TimeBase,
) -> Result<ExampleOutcome, EvaluationError> {
    let mut best: Option<(usize, Segment, f64)> = None;
    for (rank, &flat) in ranked.iter().enumerate() {
        let candidate = decode_candidate(flat, num_scales, config.window_scale_unit, time_base)?;
        let overlap = candidate.overlap(truth)?;
        if best.map_or(true, |(_, _, current)| overlap > current) {
            best = Some((rank, candidate, overlap));
        }
    }

    let (best_rank, best_candidate, best_overlap) = best
        .ok_or_else(|| EvaluationError::precondition("no candidates selected for example"))?;
    Ok(ExampleOutcome {
        best_overlap,
        best_candidate,
        best_rank,
        hit: best_overlap > config.overlap_threshold,
    })
}

/// Running Recall@N,IoU=θ over many batches.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RecallAccumulator {
    hits: usize,
    examples: usize,
}

impl RecallAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_hits(&mut self, hits: usize, examples: usize) -> Result<(), EvaluationError> {
        if hits > examples {
            return Err(EvaluationError::precondition(format!(
                "{hits} hits reported for a batch of {examples} examples"
            )));
        }
        self.hits += hits;
        self.examples += examples;
        Ok(())
    }

    pub fn add_outcome(&mut self, outcome: &BatchOutcome) -> Result<(), EvaluationError> {
        self.add_hits(outcome.hits, outcome.examples.len())
    }

    pub fn hits(&self) -> usize {
        self.hits
    }

    pub fn examples(&self) -> usize {
        self.examples
    }

    pub fn recall(&self) -> Result<f64, EvaluationError> {
        if self.examples == 0 {
            return Err(EvaluationError::degenerate(
                "recall is undefined before any example is scored",
            ));
        }
        Ok(self.hits as f64 / self.examples as f64)
    }
}

#[cfg(test)]
mod tests {
    use ndarray::Array3;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    use super::*;

    fn unit_time_base() -> TimeBase {
        TimeBase {
            frame_rate: 1.0,
            sample_stride: 1,
        }
    }

    fn config(top_n: usize, overlap_threshold: f64) -> RecallConfig {
        RecallConfig {
            window_scale_unit: 1.0,
            overlap_threshold,
            top_n,
        }
    }

    fn single_peak(t_len: usize, num_scales: usize, t: usize, k: usize) -> Array3<f32> {
        let mut scores = Array3::<f32>::zeros((1, t_len, num_scales));
        scores[[0, t, k]] = 1.0;
        scores
    }

    #[test]
    fn single_peak_decodes_to_matching_segment() {
        let scores = single_peak(4, 2, 3, 0);
        let gold = [Segment::new(2.0, 3.0).unwrap()];
        let outcome =
            evaluate_batch(scores.view(), &gold, &config(1, 0.5), unit_time_base()).unwrap();

        assert_eq!(outcome.hits, 1);
        let example = &outcome.examples[0];
        assert_eq!(example.best_candidate, Segment { start: 2.0, end: 3.0 });
        assert_eq!(example.best_overlap, 1.0);
        assert_eq!(example.best_rank, 0);
    }

    #[test]
    fn overlap_equal_to_threshold_is_not_a_hit() {
        let scores = single_peak(4, 2, 3, 0);
        let gold = [Segment::new(2.0, 3.0).unwrap()];
        let hits = score_batch(scores.view(), &gold, &config(1, 1.0), unit_time_base()).unwrap();
        assert_eq!(hits, 0);
    }

    #[test]
    fn decode_uses_stride_and_frame_rate() {
        let time_base = TimeBase {
            frame_rate: 25.0,
            sample_stride: 125,
        };
        // flat 7 with K=3 -> t=2, k=1 -> end=10s, start=10 - 2*4*5 = -30s
        let candidate = decode_candidate(7, 3, 4.0, time_base).unwrap();
        assert!((candidate.end - 10.0).abs() < 1e-12);
        assert!((candidate.start + 30.0).abs() < 1e-12);
    }

    #[test]
    fn window_longer_than_elapsed_time_keeps_negative_start() {
        // t=1, k=1 -> end=1, start=-1; ground truth [0, 1] still overlaps by 1
        let scores = single_peak(3, 2, 1, 1);
        let gold = [Segment::new(0.0, 1.0).unwrap()];
        let outcome =
            evaluate_batch(scores.view(), &gold, &config(1, 0.9), unit_time_base()).unwrap();
        assert_eq!(outcome.examples[0].best_candidate, Segment { start: -1.0, end: 1.0 });
        assert_eq!(outcome.examples[0].best_overlap, 1.0);
        assert_eq!(outcome.hits, 1);
    }

    #[test]
    fn ties_break_toward_lower_flat_index() {
        let scores = ndarray::arr2(&[[0.5f32, 0.9], [0.9, 0.1], [0.9, 0.5]]);
        let ranked = top_n_indices(scores.view(), 4).unwrap();
        assert_eq!(ranked, vec![1, 2, 4, 0]);

        let flat_ties = ndarray::Array2::<f32>::zeros((3, 2));
        assert_eq!(top_n_indices(flat_ties.view(), 3).unwrap(), vec![0, 1, 2]);
    }

    #[test]
    fn top_n_over_cell_count_is_rejected() {
        let scores = single_peak(2, 2, 0, 0);
        let gold = [Segment::new(0.0, 1.0).unwrap()];
        let err = score_batch(scores.view(), &gold, &config(5, 0.5), unit_time_base()).unwrap_err();
        assert!(err.is_precondition_violation());
    }

    #[test]
    fn gold_count_must_match_batch() {
        let scores = Array3::<f32>::zeros((2, 3, 2));
        let gold = [Segment::new(0.0, 1.0).unwrap()];
        assert!(score_batch(scores.view(), &gold, &config(1, 0.5), unit_time_base()).is_err());
    }

    #[test]
    fn inverted_gold_names_the_example() {
        let scores = Array3::<f32>::zeros((2, 3, 2));
        let gold = [Segment { start: 0.0, end: 1.0 }, Segment { start: 5.0, end: 2.0 }];
        let err = score_batch(scores.view(), &gold, &config(1, 0.5), unit_time_base()).unwrap_err();
        assert!(err.to_string().contains("example 1"));
    }

    #[test]
    fn non_finite_scores_are_rejected() {
        let mut scores = Array3::<f32>::zeros((1, 3, 2));
        scores[[0, 2, 1]] = f32::NAN;
        let gold = [Segment::new(0.0, 1.0).unwrap()];
        let err = score_batch(scores.view(), &gold, &config(1, 0.5), unit_time_base()).unwrap_err();
        assert!(err.to_string().contains("t=2, k=1"));
    }

    #[test]
    fn counts_hits_across_batch() {
        let mut scores = Array3::<f32>::zeros((3, 5, 2));
        scores[[0, 4, 1]] = 1.0; // (2, 4)
        scores[[1, 1, 0]] = 1.0; // (0, 1)
        scores[[2, 3, 0]] = 1.0; // (2, 3)
        let gold = [
            Segment::new(2.0, 4.0).unwrap(),
            Segment::new(3.0, 5.0).unwrap(),
            Segment::new(2.5, 4.0).unwrap(),
        ];
        let outcome =
            evaluate_batch(scores.view(), &gold, &config(1, 0.4), unit_time_base()).unwrap();
        assert_eq!(outcome.hits, 2);
        assert_eq!(
            outcome.examples.iter().map(|e| e.hit).collect::<Vec<_>>(),
            vec![true, false, true]
        );
    }

    #[test]
    fn increasing_top_n_never_lowers_best_overlap() {
        let mut rng = StdRng::seed_from_u64(11);
        let (t_len, num_scales) = (8, 3);
        for _ in 0..50 {
            let scores =
                Array3::from_shape_fn((1, t_len, num_scales), |_| rng.gen_range(-1.0f32..1.0));
            let a: f64 = rng.gen_range(0.0..8.0);
            let b: f64 = rng.gen_range(0.0..8.0);
            let gold = [Segment::new(a.min(b), a.max(b)).unwrap()];

            let mut previous = f64::NEG_INFINITY;
            for top_n in 1..=t_len * num_scales {
                let outcome =
                    evaluate_batch(scores.view(), &gold, &config(top_n, 0.5), unit_time_base())
                        .unwrap();
                let best = outcome.examples[0].best_overlap;
                assert!(best >= previous);
                previous = best;
            }
        }
    }

    #[test]
    fn accumulator_tracks_recall() {
        let mut accumulator = RecallAccumulator::new();
        assert!(matches!(
            accumulator.recall(),
            Err(EvaluationError::NumericDegeneracy { .. })
        ));
        accumulator.add_hits(3, 4).unwrap();
        accumulator.add_hits(1, 4).unwrap();
        assert_eq!(accumulator.hits(), 4);
        assert_eq!(accumulator.examples(), 8);
        assert!((accumulator.recall().unwrap() - 0.5).abs() < 1e-12);
    }

    #[test]
    fn accumulator_rejects_more_hits_than_examples() {
        let mut accumulator = RecallAccumulator::new();
        accumulator.add_hits(2, 2).unwrap();
        let err = accumulator.add_hits(3, 2).unwrap_err();
        assert!(err.is_precondition_violation());
        assert_eq!(accumulator.hits(), 2);
        assert_eq!(accumulator.examples(), 2);
    }

    #[test]
    fn accumulator_adds_batch_outcomes() {
        let scores = single_peak(4, 2, 3, 0);
        let gold = [Segment::new(2.0, 3.0).unwrap()];
        let outcome =
            evaluate_batch(scores.view(), &gold, &config(1, 0.5), unit_time_base()).unwrap();
        let mut accumulator = RecallAccumulator::new();
        accumulator.add_outcome(&outcome).unwrap();
        accumulator.add_outcome(&outcome).unwrap();
        assert_eq!(accumulator.recall().unwrap(), 1.0);
    }

    #[test]
    fn decode_rejects_zero_scales_and_bad_window() {
        let err = decode_candidate(7, 0, 1.0, unit_time_base()).unwrap_err();
        assert!(err.is_precondition_violation());
        assert!(decode_candidate(7, 3, 0.0, unit_time_base()).is_err());
        assert!(decode_candidate(7, 3, f64::NAN, unit_time_base()).is_err());
        let stopped = TimeBase {
            frame_rate: 0.0,
            sample_stride: 1,
        };
        assert!(decode_candidate(7, 3, 1.0, stopped).is_err());
    }

    #[test]
    fn decode_divides_after_multiplying() {
        // 3 / 10 is the nearest double to 0.3; 3 * (1 / 10) rounds above it
        let time_base = TimeBase {
            frame_rate: 10.0,
            sample_stride: 1,
        };
        let candidate = decode_candidate(3, 1, 3.0, time_base).unwrap();
        assert_eq!(candidate, Segment { start: 0.0, end: 0.3 });
    }

    #[test]
    fn overlap_on_threshold_after_time_conversion_is_not_a_hit() {
        let scores = single_peak(4, 1, 3, 0);
        let gold = [Segment::new(0.0, 10.0).unwrap()];
        let config = RecallConfig {
            window_scale_unit: 3.0,
            overlap_threshold: 0.3,
            top_n: 1,
        };
        let time_base = TimeBase {
            frame_rate: 10.0,
            sample_stride: 1,
        };
        let outcome = evaluate_batch(scores.view(), &gold, &config, time_base).unwrap();
        assert_eq!(outcome.examples[0].best_overlap, 0.3);
        assert_eq!(outcome.hits, 0);
    }
}
