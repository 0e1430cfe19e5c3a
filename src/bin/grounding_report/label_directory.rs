use std::fs;
use std::path::{Path, PathBuf};

use ndarray::Array2;
use temporal_grounding_rs::{EvaluationError, LabeledDataset};

/// Label sequences stored one JSON matrix (`[[0, 1, ...], ...]`, shape
/// `(T_i, K)`) per file, read lazily in file-name order. An empty file
/// matrix (`[]`) is a zero-length sequence of width `K`.
pub struct LabelDirectory {
    name: String,
    num_scales: usize,
    files: Vec<PathBuf>,
}

impl LabelDirectory {
    pub fn open(dir: &Path, name: Option<String>, num_scales: usize) -> Result<Self, String> {
        let entries = fs::read_dir(dir)
            .map_err(|err| format!("Failed to read label directory '{}': {err}", dir.display()))?;
        let mut files = entries
            .filter_map(Result::ok)
            .map(|entry| entry.path())
            .filter(|path| path.extension().is_some_and(|ext| ext == "json"))
            .collect::<Vec<_>>();
        files.sort();

        let name = name.unwrap_or_else(|| {
            dir.file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| "labels".to_string())
        });
        Ok(Self {
            name,
            num_scales,
            files,
        })
    }
}

impl LabeledDataset for LabelDirectory {
    fn name(&self) -> &str {
        &self.name
    }

    fn len(&self) -> usize {
        self.files.len()
    }

    fn label_sequence(&self, index: usize) -> Result<Array2<f32>, EvaluationError> {
        let path = self.files.get(index).ok_or_else(|| EvaluationError::PreconditionViolation {
            message: format!("example {index} is out of range for {} label files", self.files.len()),
        })?;
        let data = fs::read_to_string(path)
            .map_err(|source| EvaluationError::Io {
                context: "read label file",
                source,
            })?;
        let rows: Vec<Vec<f32>> = serde_json::from_str(&data).map_err(|source| EvaluationError::Json {
            context: "parse label file",
            source,
        })?;
        rows_to_array(&rows, Some(self.num_scales)).map_err(|message| EvaluationError::PreconditionViolation {
            message: format!("example {index} ('{}'): {message}", path.display()),
        })
    }
}

/// Builds a `(rows, width)` matrix; every row must have the same width.
/// Without an explicit `width` the first row sets it.
pub fn rows_to_array(rows: &[Vec<f32>], width: Option<usize>) -> Result<Array2<f32>, String> {
    let width = width.unwrap_or_else(|| rows.first().map(Vec::len).unwrap_or(0));
    if let Some((row, bad)) = rows.iter().enumerate().find(|(_, r)| r.len() != width) {
        return Err(format!(
            "row {row} has {} columns, expected {width}",
            bad.len()
        ));
    }
    let flat: Vec<f32> = rows.iter().flatten().copied().collect();
    Array2::from_shape_vec((rows.len(), width), flat).map_err(|err| err.to_string())
}
