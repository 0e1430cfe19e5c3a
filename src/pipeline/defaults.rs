use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::EvaluationError;
use crate::pipeline::traits::WeightCache;
use crate::types::CacheKey;

static TEMP_FILE_COUNTER: AtomicU64 = AtomicU64::new(0);

#[derive(Debug, Default)]
pub struct InMemoryWeightCache {
    entries: RwLock<HashMap<CacheKey, Vec<f32>>>,
}

impl InMemoryWeightCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

impl WeightCache for InMemoryWeightCache {
    fn get(&self, key: &CacheKey) -> Result<Option<Vec<f32>>, EvaluationError> {
        Ok(self.entries.read().get(key).cloned())
    }

    fn put(&self, key: &CacheKey, w0: &[f32]) -> Result<(), EvaluationError> {
        self.entries.write().insert(key.clone(), w0.to_vec());
        Ok(())
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct CachedWeights {
    num_scales: usize,
    dataset: String,
    w0: Vec<f32>,
}

/// One JSON file per key under a cache directory. Entries are written to a
/// temporary file and renamed into place, so readers never see a partial
/// entry.
#[derive(Debug, Clone)]
pub struct JsonFileWeightCache {
    dir: PathBuf,
}

impl JsonFileWeightCache {
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self, EvaluationError> {
        let dir = dir.into();
        fs::create_dir_all(&dir).map_err(|e| EvaluationError::io("create weight cache directory", e))?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn entry_path(&self, key: &CacheKey) -> PathBuf {
        self.dir.join(format!("{}.json", entry_stem(key)))
    }
}

impl WeightCache for JsonFileWeightCache {
    fn get(&self, key: &CacheKey) -> Result<Option<Vec<f32>>, EvaluationError> {
        let path = self.entry_path(key);
        if !path.exists() {
            return Ok(None);
        }
        let data = fs::read_to_string(&path).map_err(|e| EvaluationError::io("read weight cache entry", e))?;
        let entry: CachedWeights = serde_json::from_str(&data)
            .map_err(|e| EvaluationError::cache_corruption(key, format!("unparseable entry: {e}")))?;
        if entry.num_scales != key.num_scales || entry.dataset != key.dataset {
            return Err(EvaluationError::cache_corruption(
                key,
                format!(
                    "entry belongs to w0_{}_{}",
                    entry.num_scales, entry.dataset
                ),
            ));
        }
        Ok(Some(entry.w0))
    }

    fn put(&self, key: &CacheKey, w0: &[f32]) -> Result<(), EvaluationError> {
        let path = self.entry_path(key);
        let entry = CachedWeights {
            num_scales: key.num_scales,
            dataset: key.dataset.clone(),
            w0: w0.to_vec(),
        };
        let data = serde_json::to_string_pretty(&entry)
            .map_err(|e| EvaluationError::json("serialize weight cache entry", e))?;

        let temp_path = self.dir.join(format!(
            ".{}.{}.{}.tmp",
            entry_stem(key),
            std::process::id(),
            TEMP_FILE_COUNTER.fetch_add(1, Ordering::Relaxed)
        ));
        fs::write(&temp_path, data).map_err(|e| EvaluationError::io("write weight cache entry", e))?;
        fs::rename(&temp_path, &path).map_err(|e| {
            let _ = fs::remove_file(&temp_path);
            EvaluationError::io("commit weight cache entry", e)
        })
    }
}

/// `w0_{K}_{dataset}` made filesystem-safe. The digest suffix keeps names
/// that sanitize alike (`a/b`, `a_b`) in separate files.
fn entry_stem(key: &CacheKey) -> String {
    let dataset: String = key
        .dataset
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect();
    let digest = Sha256::digest(key.dataset.as_bytes());
    format!(
        "w0_{}_{dataset}_{:02x}{:02x}{:02x}{:02x}",
        key.num_scales, digest[0], digest[1], digest[2], digest[3]
    )
}
