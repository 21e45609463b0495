//! Saving received files into the download directory.
//!
//! Invariants:
//! - The peer-supplied name is reduced to a single safe path component.
//! - An existing file is never overwritten; `name (1).ext`, `name (2).ext`, ...
//!   are tried instead.
//! - Data goes to a hidden `.part` file first and is renamed into place, so a
//!   crash never leaves a truncated file under the final name.

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use tracing::error;

/// Reduce a peer-supplied file name to one safe component.
pub fn sanitize_file_name(name: &str) -> String {
    let normalized = name.replace('\\', "/");
    let last = normalized
        .split('/')
        .filter(|s| !s.is_empty() && !matches!(*s, "." | ".."))
        .next_back()
        .unwrap_or("");

    let safe: String = last
        .chars()
        .filter(|c| c.is_alphanumeric() || matches!(c, '.' | '-' | '_' | ' '))
        .collect();
    let safe = safe.trim_start_matches('.').trim();

    if safe.is_empty() {
        "file".to_string()
    } else {
        safe.to_string()
    }
}

/// First path in `dir` for `name` that does not exist yet.
fn unique_path(dir: &Path, name: &str) -> PathBuf {
    let candidate = dir.join(name);
    if !candidate.exists() {
        return candidate;
    }

    let (stem, ext) = match name.rfind('.') {
        Some(i) if i > 0 => (&name[..i], &name[i..]),
        _ => (name, ""),
    };
    (1u32..)
        .map(|n| dir.join(format!("{stem} ({n}){ext}")))
        .find(|p| !p.exists())
        .unwrap_or(candidate)
}

/// Write `data` as `name` into `dir` and return the final path.
pub async fn save_received(dir: &Path, name: &str, data: &[u8]) -> Result<PathBuf> {
    tokio::fs::create_dir_all(dir)
        .await
        .with_context(|| format!("creating {}", dir.display()))?;

    let name = sanitize_file_name(name);
    let path = unique_path(dir, &name);
    let tmp_path = dir.join(format!(".{name}.part"));

    tokio::fs::write(&tmp_path, data).await.map_err(|e| {
        error!(
            event = "save_write_failure",
            path = %tmp_path.display(),
            error = %e,
            "Failed to write temp file"
        );
        e
    })?;

    if let Err(e) = tokio::fs::rename(&tmp_path, &path).await {
        error!(
            event = "save_rename_failure",
            from = %tmp_path.display(),
            to = %path.display(),
            error = %e,
            "Failed to rename temp file"
        );
        let _ = tokio::fs::remove_file(&tmp_path).await;
        return Err(e.into());
    }

    Ok(path)
}
