//! Pending form submissions awaiting background sync.

use crate::codec::decode_hex_string;
use crate::codec::encode_hex;
use crate::disk::run_blocking;
use async_trait::async_trait;
use hb_core::WorkerError;
use hb_core::WorkerResult;
use serde::Deserialize;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::path::PathBuf;
use tokio::sync::Mutex;

/// A form submission queued while offline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingSubmission {
    pub id: String,
    /// Form fields in document order.
    pub fields: Vec<(String, String)>,
}

/// Durable queue of submissions, keyed by id.
#[async_trait]
pub trait PendingStore: Send + Sync {
    /// Submissions ordered by id.
    async fn list(&self) -> WorkerResult<Vec<PendingSubmission>>;

    /// Inserts or replaces the submission with the same id.
    async fn add(&self, submission: PendingSubmission) -> WorkerResult<()>;

    /// Returns whether a submission was removed.
    async fn remove(&self, id: &str) -> WorkerResult<bool>;
}

#[derive(Debug, Default)]
pub struct MemoryPendingStore {
    entries: Mutex<BTreeMap<String, PendingSubmission>>,
}

#[async_trait]
impl PendingStore for MemoryPendingStore {
    async fn list(&self) -> WorkerResult<Vec<PendingSubmission>> {
        Ok(self.entries.lock().await.values().cloned().collect())
    }

    async fn add(&self, submission: PendingSubmission) -> WorkerResult<()> {
        self.entries
            .lock()
            .await
            .insert(submission.id.clone(), submission);
        Ok(())
    }

    async fn remove(&self, id: &str) -> WorkerResult<bool> {
        Ok(self.entries.lock().await.remove(id).is_some())
    }
}

/// One `.kv` file per site partition under `<root>/pending/`.
///
/// Each line is `hex(id) \t hex(json fields)`.
#[derive(Debug)]
pub struct FilePendingStore {
    path: PathBuf,
    lock: Mutex<()>,
}

impl FilePendingStore {
    pub fn new(root: &Path, site: &str) -> Self {
        let partition = sanitize_partition_name(site);
        Self {
            path: root.join("pending").join(format!("{partition}.kv")),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl PendingStore for FilePendingStore {
    async fn list(&self) -> WorkerResult<Vec<PendingSubmission>> {
        let _guard = self.lock.lock().await;
        let path = self.path.clone();
        let map = run_blocking(move || read_partition_map(&path)).await?;
        Ok(map.into_values().collect())
    }

    async fn add(&self, submission: PendingSubmission) -> WorkerResult<()> {
        let _guard = self.lock.lock().await;
        let path = self.path.clone();
        run_blocking(move || {
            let mut map = read_partition_map(&path)?;
            map.insert(submission.id.clone(), submission);
            write_partition_map(&path, &map)
        })
        .await
    }

    async fn remove(&self, id: &str) -> WorkerResult<bool> {
        let _guard = self.lock.lock().await;
        let path = self.path.clone();
        let id = id.to_owned();
        run_blocking(move || remove_from_partition(&path, &id)).await
    }
}

fn remove_from_partition(path: &Path, id: &str) -> WorkerResult<bool> {
    let mut map = read_partition_map(path)?;
    if map.remove(id).is_none() {
        return Ok(false);
    }

    if map.is_empty() {
        fs::remove_file(path).map_err(|error| {
            WorkerError::new(
                "storage.partition_remove_failed",
                format!(
                    "failed removing empty partition file `{}`: {error}",
                    path.display()
                ),
            )
        })?;
        return Ok(true);
    }

    write_partition_map(path, &map)?;
    Ok(true)
}

fn sanitize_partition_name(input: &str) -> String {
    let mut out = String::new();
    for ch in input.trim().to_ascii_lowercase().chars() {
        if ch.is_ascii_alphanumeric() || ch == '.' || ch == '-' || ch == '_' {
            out.push(ch);
        } else {
            out.push('_');
        }
    }

    if out.is_empty() {
        "unknown".to_owned()
    } else {
        out
    }
}

fn read_partition_map(path: &Path) -> WorkerResult<BTreeMap<String, PendingSubmission>> {
    if !path.exists() {
        return Ok(BTreeMap::new());
    }

    let content = fs::read_to_string(path).map_err(|error| {
        WorkerError::new(
            "storage.partition_read_failed",
            format!(
                "failed to read partition file `{}`: {error}",
                path.display()
            ),
        )
    })?;

    let mut map = BTreeMap::new();
    for (index, line) in content.lines().enumerate() {
        if line.is_empty() {
            continue;
        }

        let (id_hex, fields_hex) = line.split_once('\t').ok_or_else(|| {
            WorkerError::new(
                "storage.partition_format_invalid",
                format!(
                    "invalid record format at `{}` line {}",
                    path.display(),
                    index + 1
                ),
            )
        })?;

        let id = decode_hex_string(id_hex)?;
        let fields: Vec<(String, String)> =
            serde_json::from_str(&decode_hex_string(fields_hex)?).map_err(|error| {
                WorkerError::new(
                    "storage.partition_format_invalid",
                    format!(
                        "invalid form fields at `{}` line {}: {error}",
                        path.display(),
                        index + 1
                    ),
                )
            })?;
        map.insert(id.clone(), PendingSubmission { id, fields });
    }

    Ok(map)
}

fn write_partition_map(path: &Path, map: &BTreeMap<String, PendingSubmission>) -> WorkerResult<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|error| {
            WorkerError::new(
                "storage.partition_dir_create_failed",
                format!(
                    "failed to create partition directory `{}`: {error}",
                    parent.display()
                ),
            )
        })?;
    }

    let mut encoded = String::new();
    for (id, submission) in map {
        let fields = serde_json::to_string(&submission.fields).map_err(|error| {
            WorkerError::new(
                "storage.partition_encode_failed",
                format!("failed to encode form fields for `{id}`: {error}"),
            )
        })?;
        encoded.push_str(&encode_hex(id.as_bytes()));
        encoded.push('\t');
        encoded.push_str(&encode_hex(fields.as_bytes()));
        encoded.push('\n');
    }

    fs::write(path, encoded).map_err(|error| {
        WorkerError::new(
            "storage.partition_write_failed",
            format!(
                "failed to write partition file `{}`: {error}",
                path.display()
            ),
        )
    })
}
