use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::Path;

use serde::Serialize;

/// Pretty JSON followed by a newline.
fn emit<W: Write, T: Serialize>(mut out: W, report: &T, target: &str) -> Result<(), String> {
    serde_json::to_writer_pretty(&mut out, report)
        .map_err(|err| format!("Failed to serialize report JSON to {target}: {err}"))?;
    out.write_all(b"\n")
        .and_then(|()| out.flush())
        .map_err(|err| format!("Failed to finish writing report to {target}: {err}"))
}

pub fn write_report<T: Serialize>(path: &Path, report: &T) -> Result<(), String> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|err| {
            format!("Failed to create report directory '{}': {err}", parent.display())
        })?;
    }
    let file = File::create(path)
        .map_err(|err| format!("Failed to create report file '{}': {err}", path.display()))?;
    emit(BufWriter::new(file), report, &format!("'{}'", path.display()))
}

pub fn print_report<T: Serialize>(report: &T) -> Result<(), String> {
    emit(io::stdout().lock(), report, "stdout")
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use tempfile::TempDir;

    use super::*;

    #[test]
    fn written_report_is_pretty_json_with_trailing_newline() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("reports").join("recall.json");
        write_report(&path, &json!({ "hits": 3, "recall": 0.75 })).unwrap();

        let text = fs::read_to_string(&path).unwrap();
        assert!(text.ends_with("}\n"));
        let parsed: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert_eq!(parsed["hits"], 3);
    }
}
