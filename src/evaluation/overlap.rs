use crate::error::EvaluationError;
use crate::types::Segment;

/// Length of the intersection of the closed intervals `[start_a, end_a]` and
/// `[start_b, end_b]`, or `0.0` when they are disjoint.
///
/// Both intervals must have finite endpoints with `start <= end`.
pub fn compute_overlap(
    start_a: f64,
    end_a: f64,
    start_b: f64,
    end_b: f64,
) -> Result<f64, EvaluationError> {
    let a = Segment::new(start_a, end_a)?;
    let b = Segment::new(start_b, end_b)?;
    Ok(intersection_length(&a, &b))
}

impl Segment {
    pub fn overlap(&self, other: &Segment) -> Result<f64, EvaluationError> {
        self.validate()?;
        other.validate()?;
        Ok(intersection_length(self, other))
    }
}

/// Unchecked intersection length. Inverted intervals intersect nothing.
pub(crate) fn intersection_length(a: &Segment, b: &Segment) -> f64 {
    let lo = a.start.max(b.start);
    let hi = a.end.min(b.end);
    (hi - lo).max(0.0)
}
