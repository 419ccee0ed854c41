use anyhow::Context;
use chrono::NaiveDate;
use serde_json::json;
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use crate::clock;

const MANIFEST_NAME: &str = ".attendance-revisions.json";
const RECORDS_DIR: &str = "records";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PublishAction {
    Created,
    Updated,
    Unchanged,
}

impl PublishAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            PublishAction::Created => "created",
            PublishAction::Updated => "updated",
            PublishAction::Unchanged => "unchanged",
        }
    }
}

#[derive(Debug, Clone)]
pub struct PublishOutcome {
    pub action: PublishAction,
    /// Path relative to the host directory.
    pub path: String,
    /// sha-256 hex digest of the published content.
    pub revision: String,
}

fn sanitize_component(s: &str) -> String {
    s.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

pub fn snapshot_rel_path(class_name: &str, on_date: NaiveDate) -> String {
    format!(
        "{}/attendance_matrix_{}_{}.csv",
        RECORDS_DIR,
        sanitize_component(class_name),
        clock::compact_date(on_date)
    )
}

fn content_revision(content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    format!("{:x}", hasher.finalize())
}

fn manifest_path(host_dir: &Path) -> PathBuf {
    host_dir.join(MANIFEST_NAME)
}

fn read_manifest(host_dir: &Path) -> anyhow::Result<serde_json::Value> {
    let path = manifest_path(host_dir);
    if !path.is_file() {
        return Ok(json!({}));
    }
    let text = std::fs::read_to_string(&path)
        .with_context(|| format!("failed to read manifest {}", path.to_string_lossy()))?;
    serde_json::from_str(&text)
        .with_context(|| format!("manifest {} is invalid JSON", path.to_string_lossy()))
}

fn write_manifest(host_dir: &Path, manifest: &serde_json::Value) -> anyhow::Result<()> {
    let path = manifest_path(host_dir);
    let text =
        serde_json::to_string_pretty(manifest).context("failed to serialize revision manifest")?;
    std::fs::write(&path, text)
        .with_context(|| format!("failed to write manifest {}", path.to_string_lossy()))
}

/// Create-or-update one snapshot file under the host directory. The current
/// file content decides create vs update; the manifest carries the revision
/// marker for each published path.
pub fn publish_snapshot(
    host_dir: &Path,
    class_name: &str,
    on_date: NaiveDate,
    content: &str,
) -> anyhow::Result<PublishOutcome> {
    let rel = snapshot_rel_path(class_name, on_date);
    let abs = host_dir.join(&rel);
    let revision = content_revision(content);

    let action = match std::fs::read_to_string(&abs) {
        Ok(existing) if content_revision(&existing) == revision => PublishAction::Unchanged,
        Ok(_) => PublishAction::Updated,
        Err(_) => PublishAction::Created,
    };

    if action != PublishAction::Unchanged {
        if let Some(parent) = abs.parent() {
            std::fs::create_dir_all(parent).with_context(|| {
                format!("failed to create directory {}", parent.to_string_lossy())
            })?;
        }
        std::fs::write(&abs, content)
            .with_context(|| format!("failed to write snapshot {}", abs.to_string_lossy()))?;
    }

    let published_at = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs();
    let mut manifest = read_manifest(host_dir)?;
    if let Some(obj) = manifest.as_object_mut() {
        obj.insert(
            rel.clone(),
            json!({
                "revision": revision,
                "publishedAt": published_at,
            }),
        );
    }
    write_manifest(host_dir, &manifest)?;

    Ok(PublishOutcome {
        action,
        path: rel,
        revision,
    })
}
