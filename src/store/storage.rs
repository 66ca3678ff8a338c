use std::path::{Path, PathBuf};

use anyhow::Context;
use tokio::fs as async_fs;
use tracing::warn;

/// Capacity model for the persisted document, matching the common
/// browser local-storage budget the tool was sized against.
pub const STORAGE_CAPACITY_BYTES: u64 = 5 * 1024 * 1024;
const USAGE_WARN_RATIO: f64 = 0.8;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveErrorKind {
    /// The backend ran out of space for the document.
    QuotaExceeded,
    /// Any other backend failure.
    StorageFailed,
}

#[derive(Debug)]
pub struct SaveError {
    pub kind: SaveErrorKind,
    source: anyhow::Error,
}

impl SaveError {
    pub fn quota_exceeded(source: anyhow::Error) -> Self {
        Self {
            kind: SaveErrorKind::QuotaExceeded,
            source,
        }
    }

    pub fn storage_failed(source: anyhow::Error) -> Self {
        Self {
            kind: SaveErrorKind::StorageFailed,
            source,
        }
    }
}

impl std::fmt::Display for SaveError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.kind {
            SaveErrorKind::QuotaExceeded => write!(f, "storage quota exceeded: {}", self.source),
            SaveErrorKind::StorageFailed => write!(f, "storage write failed: {}", self.source),
        }
    }
}

impl std::error::Error for SaveError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(self.source.as_ref())
    }
}

/// Size of a key/value pair as the original tool accounted it:
/// two bytes per UTF-16 code unit.
pub fn entry_size_bytes(key: &str, value: &str) -> u64 {
    ((key.encode_utf16().count() + value.encode_utf16().count()) * 2) as u64
}

/// Key-value persistence seam for the application document.
pub trait StorageBackend: Send + Sync + 'static {
    fn load(&self, key: &str) -> impl Future<Output = anyhow::Result<Option<String>>> + Send;
    fn save(&self, key: &str, value: &str) -> impl Future<Output = Result<(), SaveError>> + Send;
    fn remove(&self, key: &str) -> impl Future<Output = anyhow::Result<()>> + Send;
}

/// Stores each key as a JSON file under a data directory.
#[derive(Debug, Clone)]
pub struct FileBackend {
    data_dir: PathBuf,
}

impl FileBackend {
    pub fn new<P: AsRef<Path>>(data_dir: P) -> Self {
        Self {
            data_dir: data_dir.as_ref().to_path_buf(),
        }
    }

    fn entry_path(&self, key: &str) -> PathBuf {
        self.data_dir.join(format!("{key}.json"))
    }

    /// Sum the stored size of every key except the one about to be
    /// replaced. Unreadable entries are skipped.
    async fn stored_usage_excluding(&self, key: &str) -> u64 {
        let mut total = 0u64;
        let Ok(mut dir) = async_fs::read_dir(&self.data_dir).await else {
            return 0;
        };
        while let Ok(Some(entry)) = dir.next_entry().await {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            if stem == key {
                continue;
            }
            if let Ok(contents) = async_fs::read_to_string(&path).await {
                total += entry_size_bytes(stem, &contents);
            }
        }
        total
    }
}

fn is_out_of_space(err: &std::io::Error) -> bool {
    // ENOSPC / EDQUOT; ErrorKind::StorageFull covers the former on
    // platforms where it is mapped.
    err.kind() == std::io::ErrorKind::StorageFull
        || matches!(err.raw_os_error(), Some(28) | Some(122))
}

impl StorageBackend for FileBackend {
    async fn load(&self, key: &str) -> anyhow::Result<Option<String>> {
        let path = self.entry_path(key);
        match async_fs::read_to_string(&path).await {
            Ok(contents) => Ok(Some(contents)),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(err) => {
                Err(anyhow::Error::new(err).context(format!("Failed to read {:?}", path)))
            }
        }
    }

    async fn save(&self, key: &str, value: &str) -> Result<(), SaveError> {
        // Projected usage covers every stored key, with the pending
        // value standing in for its current entry.
        let projected = self.stored_usage_excluding(key).await + entry_size_bytes(key, value);
        if projected > STORAGE_CAPACITY_BYTES {
            return Err(SaveError::quota_exceeded(anyhow::anyhow!(
                "projected usage is {} bytes, capacity is {} bytes",
                projected,
                STORAGE_CAPACITY_BYTES
            )));
        }
        if projected as f64 > STORAGE_CAPACITY_BYTES as f64 * USAGE_WARN_RATIO {
            warn!(
                projected_bytes = projected,
                capacity_bytes = STORAGE_CAPACITY_BYTES,
                "storage usage above 80% of capacity"
            );
        }

        async_fs::create_dir_all(&self.data_dir)
            .await
            .map_err(|err| {
                SaveError::storage_failed(
                    anyhow::Error::new(err)
                        .context(format!("Failed to create data dir {:?}", self.data_dir)),
                )
            })?;

        let path = self.entry_path(key);
        // Write to a sibling temp file first so a failed write never
        // truncates the previous document.
        let tmp_path = self.data_dir.join(format!("{key}.json.tmp"));
        if let Err(err) = async_fs::write(&tmp_path, value).await {
            let _ = async_fs::remove_file(&tmp_path).await;
            let ctx = format!("Failed to write {:?}", tmp_path);
            return Err(if is_out_of_space(&err) {
                SaveError::quota_exceeded(anyhow::Error::new(err).context(ctx))
            } else {
                SaveError::storage_failed(anyhow::Error::new(err).context(ctx))
            });
        }
        async_fs::rename(&tmp_path, &path).await.map_err(|err| {
            SaveError::storage_failed(
                anyhow::Error::new(err)
                    .context(format!("Failed to move {:?} into place", tmp_path)),
            )
        })
    }

    async fn remove(&self, key: &str) -> anyhow::Result<()> {
        let path = self.entry_path(key);
        match async_fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(err) => {
                Err(anyhow::Error::new(err).context(format!("Failed to remove {:?}", path)))
            }
        }
    }
}

#[derive(Debug, Default)]
struct MemoryState {
    entries: std::sync::Mutex<std::collections::HashMap<String, String>>,
    write_count: std::sync::atomic::AtomicU64,
    capacity_bytes: Option<u64>,
}

/// In-memory backend. Cloning shares the underlying map, so tests can
/// keep a handle and count the writes the debounce lets through.
#[derive(Debug, Clone, Default)]
pub struct MemoryBackend {
    state: std::sync::Arc<MemoryState>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Backend that rejects any document larger than the given size.
    pub fn with_capacity(capacity_bytes: u64) -> Self {
        Self {
            state: std::sync::Arc::new(MemoryState {
                capacity_bytes: Some(capacity_bytes),
                ..MemoryState::default()
            }),
        }
    }

    pub fn write_count(&self) -> u64 {
        self.state
            .write_count
            .load(std::sync::atomic::Ordering::SeqCst)
    }

    pub fn get(&self, key: &str) -> Option<String> {
        self.state
            .entries
            .lock()
            .expect("storage entries mutex poisoned")
            .get(key)
            .cloned()
    }

    pub fn put(&self, key: &str, value: &str) {
        self.state
            .entries
            .lock()
            .expect("storage entries mutex poisoned")
            .insert(key.to_string(), value.to_string());
    }
}

impl StorageBackend for MemoryBackend {
    async fn load(&self, key: &str) -> anyhow::Result<Option<String>> {
        Ok(self.get(key))
    }

    async fn save(&self, key: &str, value: &str) -> Result<(), SaveError> {
        let limit = self.state.capacity_bytes.unwrap_or(STORAGE_CAPACITY_BYTES);
        let projected = {
            let entries = self
                .state
                .entries
                .lock()
                .expect("storage entries mutex poisoned");
            entries
                .iter()
                .filter(|(k, _)| k.as_str() != key)
                .map(|(k, v)| entry_size_bytes(k, v))
                .sum::<u64>()
        } + entry_size_bytes(key, value);
        if projected > limit {
            return Err(SaveError::quota_exceeded(anyhow::anyhow!(
                "projected usage is {} bytes, capacity is {} bytes",
                projected,
                limit
            )));
        }
        if projected as f64 > limit as f64 * USAGE_WARN_RATIO {
            warn!(
                projected_bytes = projected,
                capacity_bytes = limit,
                "storage usage above 80% of capacity"
            );
        }
        self.put(key, value);
        self.state
            .write_count
            .fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        Ok(())
    }

    async fn remove(&self, key: &str) -> anyhow::Result<()> {
        self.state
            .entries
            .lock()
            .expect("storage entries mutex poisoned")
            .remove(key);
        Ok(())
    }
}
