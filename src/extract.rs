//! Data-directory extraction.
//!
//! Raw-file handling is deliberately kept out of the core crates: the
//! pipeline's input contract is fully decoded records. Files may hold a
//! JSON array or line-delimited objects; a file that fails to decode is
//! logged and skipped, never aborting the run.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde_json::Value;
use tracing::{info, warn};

use telemetry::metrics;

/// Decodes every `.json` file under `dir` into raw records.
pub fn extract_dir(dir: &Path) -> Result<Vec<Value>> {
    let entries = fs::read_dir(dir)
        .with_context(|| format!("reading data directory {}", dir.display()))?;

    let mut files: Vec<PathBuf> = entries
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| path.extension().is_some_and(|ext| ext == "json"))
        .collect();
    files.sort();

    if files.is_empty() {
        warn!(dir = %dir.display(), "no json files found");
    }

    let mut records = Vec::new();
    for path in files {
        match extract_file(&path) {
            Ok(mut decoded) => {
                info!(file = %path.display(), records = decoded.len(), "decoded file");
                metrics().records_decoded.inc_by(decoded.len() as u64);
                records.append(&mut decoded);
            }
            Err(e) => warn!(file = %path.display(), error = %e, "skipping file"),
        }
    }
    Ok(records)
}

/// Decodes one file, detecting array vs line-delimited format.
fn extract_file(path: &Path) -> Result<Vec<Value>> {
    let content =
        fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;

    if content.trim_start().starts_with('[') {
        let values: Vec<Value> = serde_json::from_str(&content)
            .with_context(|| format!("parsing {} as a JSON array", path.display()))?;
        Ok(values)
    } else {
        content
            .lines()
            .filter(|line| !line.trim().is_empty())
            .enumerate()
            .map(|(n, line)| {
                serde_json::from_str(line)
                    .with_context(|| format!("parsing {} line {}", path.display(), n + 1))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn array_and_line_delimited_files_both_decode() {
        let dir = std::env::temp_dir().join(format!("extract-test-{}", std::process::id()));
        fs::create_dir_all(&dir).unwrap();

        fs::write(
            dir.join("array.json"),
            r#"[{"user_id": "u1"}, {"user_id": "u2"}]"#,
        )
        .unwrap();
        fs::write(
            dir.join("lines.json"),
            "{\"user_id\": \"u3\"}\n\n{\"user_id\": \"u4\"}\n",
        )
        .unwrap();
        fs::write(dir.join("notes.txt"), "ignored").unwrap();

        let records = extract_dir(&dir).unwrap();
        assert_eq!(records.len(), 4);

        fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn malformed_files_are_skipped_not_fatal() {
        let dir = std::env::temp_dir().join(format!("extract-bad-{}", std::process::id()));
        fs::create_dir_all(&dir).unwrap();

        fs::write(dir.join("bad.json"), "[{ not json").unwrap();
        fs::write(dir.join("good.json"), r#"[{"user_id": "u1"}]"#).unwrap();

        let records = extract_dir(&dir).unwrap();
        assert_eq!(records.len(), 1);

        fs::remove_dir_all(&dir).unwrap();
    }
}
