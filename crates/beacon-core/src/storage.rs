//! Storage backend abstraction with conditional writes.
//!
//! All Beacon persistence goes through this contract. The single
//! synchronization primitive in the pipeline is the conditional write:
//! `WritePrecondition::DoesNotExist` is the storage-level uniqueness
//! constraint that resolves concurrent duplicate delivery, with no
//! application-level locking.
//!
//! A precondition failure is a **normal result**, never an error: for the
//! idempotent writer it is the duplicate signal.

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

use crate::error::{Error, Result};

/// Precondition for conditional writes.
#[derive(Debug, Clone)]
pub enum WritePrecondition {
    /// Write only if the object does not exist.
    DoesNotExist,
    /// Write only if the object's version matches the given token.
    MatchesVersion(String),
    /// Write unconditionally.
    None,
}

/// Result of a conditional write.
#[derive(Debug, Clone)]
pub enum WriteResult {
    /// Write succeeded, returns the new version token.
    Success {
        /// The new version token after the write.
        version: String,
    },
    /// Precondition failed, returns the current version token.
    PreconditionFailed {
        /// The version that caused the precondition to fail.
        current_version: String,
    },
}

impl WriteResult {
    /// Returns true if the write was applied.
    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }
}

/// Metadata about a stored object.
#[derive(Debug, Clone)]
pub struct ObjectMeta {
    /// Object path (key).
    pub path: String,
    /// Object size in bytes.
    pub size: u64,
    /// Opaque version token for CAS operations.
    pub version: String,
    /// Last modification timestamp.
    pub last_modified: Option<DateTime<Utc>>,
}

/// Storage backend trait.
///
/// Backends are expected to provide read-after-write consistency for
/// single objects and atomic conditional writes. Listing order is
/// unspecified; callers requiring determinism must sort.
#[async_trait]
pub trait StorageBackend: Send + Sync + 'static {
    /// Reads an entire object.
    ///
    /// Returns `Error::NotFound` if the object doesn't exist.
    async fn get(&self, path: &str) -> Result<Bytes>;

    /// Reads an object together with its metadata, for CAS loops that
    /// need the version token observed at read time.
    ///
    /// Returns `Error::NotFound` if the object doesn't exist.
    async fn get_with_meta(&self, path: &str) -> Result<(Bytes, ObjectMeta)>;

    /// Writes with an optional precondition.
    ///
    /// Returns `WriteResult::PreconditionFailed` if the precondition is not
    /// met. Never returns an error for a precondition failure.
    async fn put(
        &self,
        path: &str,
        data: Bytes,
        precondition: WritePrecondition,
    ) -> Result<WriteResult>;

    /// Deletes an object. Idempotent: succeeds if the object is absent.
    async fn delete(&self, path: &str) -> Result<()>;

    /// Lists objects under a prefix. Empty vec if none match.
    async fn list(&self, prefix: &str) -> Result<Vec<ObjectMeta>>;

    /// Gets object metadata without reading content.
    ///
    /// Returns `None` if the object doesn't exist.
    async fn head(&self, path: &str) -> Result<Option<ObjectMeta>>;
}

// ============================================================================
// In-memory backend
// ============================================================================

/// In-memory storage backend for testing.
///
/// Thread-safe via `RwLock`. Uses numeric versions internally to simulate
/// object-store generation semantics.
#[derive(Debug, Default)]
pub struct MemoryBackend {
    objects: Arc<RwLock<HashMap<String, StoredObject>>>,
}

#[derive(Debug, Clone)]
struct StoredObject {
    data: Bytes,
    version: i64,
    last_modified: DateTime<Utc>,
}

impl MemoryBackend {
    /// Creates a new empty memory backend.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl StorageBackend for MemoryBackend {
    async fn get(&self, path: &str) -> Result<Bytes> {
        let objects = self.objects.read().map_err(|_| Error::Internal {
            message: "lock poisoned".into(),
        })?;

        objects
            .get(path)
            .map(|o| o.data.clone())
            .ok_or_else(|| Error::NotFound(format!("object not found: {path}")))
    }

    async fn get_with_meta(&self, path: &str) -> Result<(Bytes, ObjectMeta)> {
        let objects = self.objects.read().map_err(|_| Error::Internal {
            message: "lock poisoned".into(),
        })?;

        objects
            .get(path)
            .map(|obj| {
                (
                    obj.data.clone(),
                    ObjectMeta {
                        path: path.to_string(),
                        size: obj.data.len() as u64,
                        version: obj.version.to_string(),
                        last_modified: Some(obj.last_modified),
                    },
                )
            })
            .ok_or_else(|| Error::NotFound(format!("object not found: {path}")))
    }

    async fn put(
        &self,
        path: &str,
        data: Bytes,
        precondition: WritePrecondition,
    ) -> Result<WriteResult> {
        let mut objects = self.objects.write().map_err(|_| Error::Internal {
            message: "lock poisoned".into(),
        })?;

        let current = objects.get(path);

        match precondition {
            WritePrecondition::DoesNotExist => {
                if let Some(obj) = current {
                    return Ok(WriteResult::PreconditionFailed {
                        current_version: obj.version.to_string(),
                    });
                }
            }
            WritePrecondition::MatchesVersion(expected) => {
                let expected_num: i64 = expected.parse().unwrap_or(-1);
                match current {
                    Some(obj) if obj.version != expected_num => {
                        return Ok(WriteResult::PreconditionFailed {
                            current_version: obj.version.to_string(),
                        });
                    }
                    None => {
                        return Ok(WriteResult::PreconditionFailed {
                            current_version: "0".to_string(),
                        });
                    }
                    _ => {}
                }
            }
            WritePrecondition::None => {}
        }

        let new_version = current.map_or(1, |o| o.version + 1);
        objects.insert(
            path.to_string(),
            StoredObject {
                data,
                version: new_version,
                last_modified: Utc::now(),
            },
        );
        drop(objects);

        Ok(WriteResult::Success {
            version: new_version.to_string(),
        })
    }

    async fn delete(&self, path: &str) -> Result<()> {
        self.objects
            .write()
            .map_err(|_| Error::Internal {
                message: "lock poisoned".into(),
            })?
            .remove(path);
        Ok(())
    }

    async fn list(&self, prefix: &str) -> Result<Vec<ObjectMeta>> {
        let objects = self.objects.read().map_err(|_| Error::Internal {
            message: "lock poisoned".into(),
        })?;

        Ok(objects
            .iter()
            .filter(|(k, _)| k.starts_with(prefix))
            .map(|(path, obj)| ObjectMeta {
                path: path.clone(),
                size: obj.data.len() as u64,
                version: obj.version.to_string(),
                last_modified: Some(obj.last_modified),
            })
            .collect())
    }

    async fn head(&self, path: &str) -> Result<Option<ObjectMeta>> {
        let objects = self.objects.read().map_err(|_| Error::Internal {
            message: "lock poisoned".into(),
        })?;

        Ok(objects.get(path).map(|obj| ObjectMeta {
            path: path.to_string(),
            size: obj.data.len() as u64,
            version: obj.version.to_string(),
            last_modified: Some(obj.last_modified),
        }))
    }
}

// ============================================================================
// Local filesystem backend
// ============================================================================

/// Local filesystem backend rooted at a directory.
///
/// Suitable for the operator CLI and local development. Conditional writes
/// are serialized through an in-process mutex, so CAS semantics hold only
/// within a single process; batch jobs are non-concurrent-with-themselves
/// by contract, which is exactly this backend's consumer.
pub struct LocalFsBackend {
    root: PathBuf,
    write_lock: tokio::sync::Mutex<()>,
}

impl LocalFsBackend {
    /// Creates a backend rooted at `root`, creating the directory if needed.
    ///
    /// # Errors
    ///
    /// Returns a storage error if the root directory cannot be created.
    pub fn new(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        std::fs::create_dir_all(&root)
            .map_err(|e| Error::storage_with_source(format!("create {}", root.display()), e))?;
        Ok(Self {
            root,
            write_lock: tokio::sync::Mutex::new(()),
        })
    }

    fn resolve(&self, path: &str) -> Result<PathBuf> {
        if path.split('/').any(|segment| segment == "..") {
            return Err(Error::InvalidInput(format!(
                "path traversal rejected: {path}"
            )));
        }
        Ok(self.root.join(path))
    }

    fn version_of(meta: &std::fs::Metadata) -> String {
        let modified = meta
            .modified()
            .ok()
            .and_then(|t| t.duration_since(std::time::UNIX_EPOCH).ok())
            .map_or(0, |d| d.as_nanos());
        format!("{}-{}", modified, meta.len())
    }

    fn meta_for(path: &str, meta: &std::fs::Metadata) -> ObjectMeta {
        ObjectMeta {
            path: path.to_string(),
            size: meta.len(),
            version: Self::version_of(meta),
            last_modified: meta.modified().ok().map(DateTime::<Utc>::from),
        }
    }
}

#[async_trait]
impl StorageBackend for LocalFsBackend {
    async fn get(&self, path: &str) -> Result<Bytes> {
        let full = self.resolve(path)?;
        match tokio::fs::read(&full).await {
            Ok(data) => Ok(Bytes::from(data)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(Error::NotFound(format!("object not found: {path}")))
            }
            Err(e) => Err(Error::storage_with_source(format!("read {path}"), e)),
        }
    }

    async fn get_with_meta(&self, path: &str) -> Result<(Bytes, ObjectMeta)> {
        let full = self.resolve(path)?;
        let _guard = self.write_lock.lock().await;

        let meta = match tokio::fs::metadata(&full).await {
            Ok(meta) => meta,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(Error::NotFound(format!("object not found: {path}")));
            }
            Err(e) => return Err(Error::storage_with_source(format!("stat {path}"), e)),
        };
        let data = tokio::fs::read(&full)
            .await
            .map_err(|e| Error::storage_with_source(format!("read {path}"), e))?;

        Ok((Bytes::from(data), Self::meta_for(path, &meta)))
    }

    async fn put(
        &self,
        path: &str,
        data: Bytes,
        precondition: WritePrecondition,
    ) -> Result<WriteResult> {
        let full = self.resolve(path)?;
        let _guard = self.write_lock.lock().await;

        let existing = match tokio::fs::metadata(&full).await {
            Ok(meta) => Some(meta),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => None,
            Err(e) => return Err(Error::storage_with_source(format!("stat {path}"), e)),
        };

        match &precondition {
            WritePrecondition::DoesNotExist => {
                if let Some(meta) = &existing {
                    return Ok(WriteResult::PreconditionFailed {
                        current_version: Self::version_of(meta),
                    });
                }
            }
            WritePrecondition::MatchesVersion(expected) => match &existing {
                Some(meta) if Self::version_of(meta) != *expected => {
                    return Ok(WriteResult::PreconditionFailed {
                        current_version: Self::version_of(meta),
                    });
                }
                None => {
                    return Ok(WriteResult::PreconditionFailed {
                        current_version: "0".to_string(),
                    });
                }
                _ => {}
            },
            WritePrecondition::None => {}
        }

        if let Some(parent) = full.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| Error::storage_with_source(format!("mkdir for {path}"), e))?;
        }

        // Stage to a sibling temp file, then rename. The rename is atomic
        // on the same filesystem, so readers never observe a partial object.
        let mut tmp_name = full.clone().into_os_string();
        tmp_name.push(".tmp");
        let tmp = PathBuf::from(tmp_name);
        tokio::fs::write(&tmp, &data)
            .await
            .map_err(|e| Error::storage_with_source(format!("write {path}"), e))?;
        if let Err(e) = tokio::fs::rename(&tmp, &full).await {
            tokio::fs::remove_file(&tmp).await.ok();
            return Err(Error::storage_with_source(format!("commit {path}"), e));
        }

        let meta = tokio::fs::metadata(&full)
            .await
            .map_err(|e| Error::storage_with_source(format!("stat {path}"), e))?;
        Ok(WriteResult::Success {
            version: Self::version_of(&meta),
        })
    }

    async fn delete(&self, path: &str) -> Result<()> {
        let full = self.resolve(path)?;
        match tokio::fs::remove_file(&full).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(Error::storage_with_source(format!("delete {path}"), e)),
        }
    }

    async fn list(&self, prefix: &str) -> Result<Vec<ObjectMeta>> {
        // Walk from the deepest existing directory implied by the prefix.
        let (dir, _) = prefix.rsplit_once('/').unwrap_or(("", prefix));
        let start = self.resolve(dir)?;
        if tokio::fs::metadata(&start).await.is_err() {
            return Ok(Vec::new());
        }

        let mut results = Vec::new();
        let mut pending: Vec<PathBuf> = vec![start];
        while let Some(dir) = pending.pop() {
            let mut entries = tokio::fs::read_dir(&dir)
                .await
                .map_err(|e| Error::storage_with_source(format!("list {}", dir.display()), e))?;
            while let Some(entry) = entries
                .next_entry()
                .await
                .map_err(|e| Error::storage_with_source("list entry", e))?
            {
                let entry_path = entry.path();
                if entry_path.is_dir() {
                    pending.push(entry_path);
                    continue;
                }
                let key = relative_key(&self.root, &entry_path)?;
                if !key.starts_with(prefix) {
                    continue;
                }
                // Uncommitted staging files from an interrupted put.
                if key.ends_with(".tmp") {
                    continue;
                }
                let meta = entry
                    .metadata()
                    .await
                    .map_err(|e| Error::storage_with_source(format!("stat {key}"), e))?;
                results.push(Self::meta_for(&key, &meta));
            }
        }
        Ok(results)
    }

    async fn head(&self, path: &str) -> Result<Option<ObjectMeta>> {
        let full = self.resolve(path)?;
        match tokio::fs::metadata(&full).await {
            Ok(meta) => Ok(Some(Self::meta_for(path, &meta))),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(Error::storage_with_source(format!("stat {path}"), e)),
        }
    }
}

fn relative_key(root: &Path, full: &Path) -> Result<String> {
    let relative = full
        .strip_prefix(root)
        .map_err(|_| Error::internal(format!("path escapes root: {}", full.display())))?;
    Ok(relative.to_string_lossy().replace(std::path::MAIN_SEPARATOR, "/"))
}
