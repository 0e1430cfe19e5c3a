pub mod config;
pub mod error;
pub mod evaluation;
pub mod pipeline;
pub mod training;
pub mod types;

pub use config::{RecallConfig, TimeBase};
pub use error::EvaluationError;
pub use evaluation::overlap::compute_overlap;
pub use evaluation::report::{
    build_evaluation_report, parse_annotation_row, sort_worst_first, EvaluationReport,
    ExampleReport, Meta, MetricDistribution, SegmentLengthReport,
};
pub use evaluation::retrieval::{
    decode_candidate, evaluate_batch, score_batch, top_n_indices, RecallAccumulator,
};
pub use pipeline::builder::ClassWeightEstimatorBuilder;
pub use pipeline::defaults::{InMemoryWeightCache, JsonFileWeightCache};
pub use pipeline::traits::{LabeledDataset, WeightCache};
pub use training::class_weights::{estimate_weights, negative_fractions, ClassWeightEstimator};
pub use training::padding::{pad_labels, pad_tokens};
pub use types::{BatchOutcome, CacheKey, ClassWeights, ExampleOutcome, Segment};
