use std::fs;
use std::path::{Path, PathBuf};

use chrono::Utc;
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use ndarray::Array3;
use serde::{Deserialize, Serialize};
use temporal_grounding_rs::{
    build_evaluation_report, evaluate_batch, parse_annotation_row, sort_worst_first, CacheKey,
    ClassWeightEstimatorBuilder, EvaluationError, ExampleOutcome, ExampleReport, LabeledDataset,
    Meta, RecallConfig, Segment, SegmentLengthReport, TimeBase,
};
use tracing_subscriber::EnvFilter;

#[path = "grounding_report/json_report_formatter.rs"]
mod json_report_formatter;
#[path = "grounding_report/label_directory.rs"]
mod label_directory;

use label_directory::{rows_to_array, LabelDirectory};

#[derive(Debug, Parser)]
#[command(name = "grounding_report")]
#[command(about = "Evaluate temporal localization scores and prepare training statistics")]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Score predicted (T, K) matrices against ground-truth segments (Recall@N,IoU=θ).
    Evaluate(EvaluateArgs),
    /// Estimate and cache the BCE class weights w0/w1 of a label directory.
    ClassWeights(ClassWeightsArgs),
    /// Print annotated segment-length statistics used to choose K.
    #[command(name = "find-k")]
    FindK(FindKArgs),
}

#[derive(Debug, clap::Args)]
struct EvaluateArgs {
    #[arg(long, env = "TGR_CASES")]
    cases: PathBuf,
    /// JSON file holding window_scale_unit, overlap_threshold and top_n.
    #[arg(long, env = "TGR_CONFIG", conflicts_with_all = ["delta", "threshold", "top_n"])]
    config: Option<PathBuf>,
    #[arg(long, env = "TGR_DELTA")]
    delta: Option<f64>,
    #[arg(long, env = "TGR_THRESHOLD")]
    threshold: Option<f64>,
    #[arg(long = "top-n", env = "TGR_TOP_N")]
    top_n: Option<usize>,
    #[arg(long, env = "TGR_FRAME_RATE")]
    frame_rate: f64,
    #[arg(long, env = "TGR_SAMPLE_STRIDE")]
    sample_stride: usize,
    #[arg(long, env = "TGR_OUT")]
    out: Option<PathBuf>,
    /// List misses first, lowest overlap first.
    #[arg(long, default_value_t = false)]
    worst_first: bool,
}

#[derive(Debug, clap::Args)]
struct ClassWeightsArgs {
    #[arg(long, env = "TGR_LABELS_DIR")]
    labels_dir: PathBuf,
    #[arg(long, env = "TGR_NUM_SCALES")]
    num_scales: usize,
    #[arg(long, env = "TGR_CACHE_DIR", default_value = ".cache/class_weights")]
    cache_dir: PathBuf,
    #[arg(long, env = "TGR_DATASET_NAME")]
    dataset_name: Option<String>,
}

#[derive(Debug, clap::Args)]
struct FindKArgs {
    #[arg(long, env = "TGR_TEXTUAL_DATA_PATH")]
    textual_data_path: PathBuf,
}

#[derive(Debug, Deserialize)]
struct Case {
    id: String,
    /// `(T, K)` score matrix.
    scores: Vec<Vec<f32>>,
    gold_start: f64,
    gold_end: f64,
}

#[derive(Debug, Serialize)]
struct WeightsOutput {
    cache_key: String,
    w0: Vec<f32>,
    w1: Vec<f32>,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    if let Err(err) = run() {
        tracing::error!("{err}");
        std::process::exit(1);
    }
}

fn run() -> Result<(), String> {
    let args = Args::parse();
    match args.command {
        Command::Evaluate(args) => evaluate(args),
        Command::ClassWeights(args) => class_weights(args),
        Command::FindK(args) => find_k(args),
    }
}

fn evaluate(args: EvaluateArgs) -> Result<(), String> {
    let config = resolve_recall_config(&args)?;
    let time_base = TimeBase::new(args.frame_rate, args.sample_stride).map_err(|err| err.to_string())?;
    let cases = load_cases(&args.cases)?;
    if cases.is_empty() {
        return Err(format!("No cases found in '{}'.", args.cases.display()));
    }

    let progress = ProgressBar::new(cases.len() as u64);
    progress.set_style(
        ProgressStyle::with_template(
            "[{elapsed_precise}] [{wide_bar:.cyan/blue}] {pos}/{len} ({eta}) {msg}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("=>-"),
    );
    progress.set_message("starting...");

    let mut examples = Vec::with_capacity(cases.len());
    for case in &cases {
        progress.set_message(case.id.clone());
        let scores = rows_to_array(&case.scores, None).map_err(|err| format!("{}: scores: {err}", case.id))?;
        let (t_len, num_scales) = scores.dim();
        let batch = scores
            .into_shape((1, t_len, num_scales))
            .map_err(|err| format!("{}: {err}", case.id))?;
        let gold = Segment {
            start: case.gold_start,
            end: case.gold_end,
        };
        let outcome = evaluate_case(&batch, gold, &config, time_base)
            .map_err(|err| format!("{}: {err}", case.id))?;
        examples.push(ExampleReport::new(case.id.clone(), gold, &outcome).map_err(|err| err.to_string())?);
        progress.inc(1);
    }
    progress.finish_with_message("done");

    if args.worst_first {
        sort_worst_first(&mut examples);
    }
    let meta = Meta {
        generated_at: Utc::now().to_rfc3339(),
        source: args.cases.display().to_string(),
        case_count: cases.len(),
    };
    let report = build_evaluation_report(meta, config, time_base, examples).map_err(|err| err.to_string())?;
    tracing::info!(
        hits = report.hits,
        cases = report.meta.case_count,
        recall = report.recall,
        "evaluation finished"
    );

    match args.out.as_ref() {
        Some(path) => {
            json_report_formatter::write_report(path, &report)?;
            println!("{}", path.display());
            Ok(())
        }
        None => json_report_formatter::print_report(&report),
    }
}

fn evaluate_case(
    batch: &Array3<f32>,
    gold: Segment,
    config: &RecallConfig,
    time_base: TimeBase,
) -> Result<ExampleOutcome, EvaluationError> {
    let outcome = evaluate_batch(batch.view(), std::slice::from_ref(&gold), config, time_base)?;
    outcome
        .examples
        .into_iter()
        .next()
        .ok_or_else(|| EvaluationError::PreconditionViolation {
            message: "batch of one produced no outcome".to_string(),
        })
}

fn resolve_recall_config(args: &EvaluateArgs) -> Result<RecallConfig, String> {
    if let Some(path) = args.config.as_ref() {
        return RecallConfig::load(path).map_err(|err| err.to_string());
    }
    let (Some(window_scale_unit), Some(overlap_threshold), Some(top_n)) =
        (args.delta, args.threshold, args.top_n)
    else {
        return Err("Pass --config, or all of --delta, --threshold and --top-n.".to_string());
    };
    let config = RecallConfig {
        window_scale_unit,
        overlap_threshold,
        top_n,
    };
    config.validate().map_err(|err| err.to_string())?;
    Ok(config)
}

fn load_cases(path: &Path) -> Result<Vec<Case>, String> {
    let data = fs::read_to_string(path)
        .map_err(|err| format!("Failed to read cases file '{}': {err}", path.display()))?;
    serde_json::from_str(&data)
        .map_err(|err| format!("Failed to parse cases file '{}': {err}", path.display()))
}

fn class_weights(args: ClassWeightsArgs) -> Result<(), String> {
    let dataset = LabelDirectory::open(&args.labels_dir, args.dataset_name.clone(), args.num_scales)?;
    let key = CacheKey::new(args.num_scales, dataset.name());
    let estimator = ClassWeightEstimatorBuilder::new()
        .with_cache_dir(&args.cache_dir)
        .build()
        .map_err(|err| err.to_string())?;
    let weights = estimator.estimate(&dataset, &key).map_err(|err| err.to_string())?;

    json_report_formatter::print_report(&WeightsOutput {
        cache_key: key.to_string(),
        w0: weights.w0.to_vec(),
        w1: weights.w1.to_vec(),
    })
}

fn find_k(args: FindKArgs) -> Result<(), String> {
    let dir = &args.textual_data_path;
    let entries = fs::read_dir(dir)
        .map_err(|err| format!("Failed to read annotation directory '{}': {err}", dir.display()))?;
    let mut files = entries
        .filter_map(Result::ok)
        .map(|entry| entry.path())
        .filter(|path| path.is_file())
        .collect::<Vec<_>>();
    files.sort();

    let mut lengths = Vec::new();
    for file in &files {
        let data = fs::read_to_string(file)
            .map_err(|err| format!("Failed to read annotation file '{}': {err}", file.display()))?;
        for (line_index, line) in data.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            let (start_frame, end_frame) = parse_annotation_row(line, line_index + 1)
                .map_err(|err| format!("{}: {err}", file.display()))?;
            lengths.push(end_frame - start_frame);
        }
    }

    let report = SegmentLengthReport::from_lengths(&lengths).map_err(|err| err.to_string())?;
    tracing::info!(
        files = files.len(),
        segments = report.count,
        mean = report.distribution.mean,
        "segment lengths collected"
    );
    json_report_formatter::print_report(&report)
}
