//! Disk-backed object store client.
//!
//! Object payloads live beneath `base_path/{shard}/{shard}/{id}`, sharded by
//! the leading bytes of the asset id so no directory grows unbounded. The
//! client only ever sees keys derived from asset ids; nothing here is built
//! from client-supplied strings.

use crate::errors::{AssetError, AssetResult};
use bytes::Bytes;
use futures::{Stream, StreamExt, pin_mut};
use md5::Context;
use std::{
    io::{self, ErrorKind},
    path::{Path, PathBuf},
};
use tokio::{
    fs::{self, File},
    io::{AsyncReadExt, AsyncWriteExt},
};
use tracing::debug;
use uuid::Uuid;

/// Result of a server-side read of a stored object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredObject {
    pub size: i64,
    /// md5 of the payload, lowercase hex.
    pub checksum: String,
}

/// Thin client over the on-disk object store.
#[derive(Clone)]
pub struct ObjectStore {
    pub base_path: PathBuf,
}

impl ObjectStore {
    pub fn new(base_path: impl Into<PathBuf>) -> Self {
        Self {
            base_path: base_path.into(),
        }
    }

    /// Derive the storage key for an asset id.
    ///
    /// Two-level shard from the leading hex of the id. Deterministic, unique
    /// per asset, and never derived from client input.
    pub fn storage_key_for(id: Uuid) -> String {
        let hex = id.simple().to_string();
        format!("assets/{}/{}/{}", &hex[0..2], &hex[2..4], hex)
    }

    /// Map a storage key to its on-disk path.
    fn object_path(&self, key: &str) -> PathBuf {
        let mut path = self.base_path.clone();
        for segment in key.split('/') {
            path.push(segment);
        }
        path
    }

    /// Stream a payload into the store at `key`.
    ///
    /// Writes incrementally to a temporary file, computing md5 and size along
    /// the way, fsyncs, then atomically renames into place. The temp file is
    /// removed on any error, including a mid-stream abort from the ingress
    /// guard.
    pub async fn put_stream<S>(&self, key: &str, stream: S) -> AssetResult<StoredObject>
    where
        S: Stream<Item = io::Result<Bytes>> + Send + 'static,
    {
        let file_path = self.object_path(key);
        let parent = file_path
            .parent()
            .map(Path::to_path_buf)
            .ok_or_else(|| AssetError::Io(io::Error::other("object path missing parent")))?;
        fs::create_dir_all(&parent).await?;
        let tmp_path = parent.join(format!(".tmp-{}", Uuid::new_v4()));
        let mut file = File::create(&tmp_path).await?;

        let mut size: i64 = 0;
        let mut digest = Context::new();
        pin_mut!(stream);
        while let Some(chunk_res) = stream.next().await {
            let chunk = match chunk_res {
                Ok(chunk) => chunk,
                Err(err) => {
                    let _ = fs::remove_file(&tmp_path).await;
                    return Err(AssetError::Io(err));
                }
            };
            size += chunk.len() as i64;
            digest.consume(&chunk);
            if let Err(err) = file.write_all(&chunk).await {
                let _ = fs::remove_file(&tmp_path).await;
                return Err(AssetError::Io(err));
            }
        }
        if let Err(err) = file.flush().await {
            let _ = fs::remove_file(&tmp_path).await;
            return Err(AssetError::Io(err));
        }
        if let Err(err) = file.sync_all().await {
            let _ = fs::remove_file(&tmp_path).await;
            return Err(AssetError::Io(err));
        }

        if let Err(err) = fs::rename(&tmp_path, &file_path).await {
            if err.kind() == ErrorKind::AlreadyExists {
                fs::remove_file(&file_path).await?;
                fs::rename(&tmp_path, &file_path).await?;
            } else {
                let _ = fs::remove_file(&tmp_path).await;
                return Err(AssetError::Io(err));
            }
        }

        Ok(StoredObject {
            size,
            checksum: format!("{:x}", digest.compute()),
        })
    }

    /// Server-side stat: read the object at `key`, returning its measured
    /// size and checksum, or `None` if no object exists there.
    ///
    /// Any other I/O fault is reported as `StoreUnavailable` so callers treat
    /// it as transient rather than as a verification verdict.
    pub async fn stat(&self, key: &str) -> AssetResult<Option<StoredObject>> {
        let file_path = self.object_path(key);
        let mut file = match File::open(&file_path).await {
            Ok(file) => file,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(AssetError::StoreUnavailable(err.to_string())),
        };

        let mut size: i64 = 0;
        let mut digest = Context::new();
        let mut buf = vec![0u8; 64 * 1024];
        loop {
            let read = file
                .read(&mut buf)
                .await
                .map_err(|err| AssetError::StoreUnavailable(err.to_string()))?;
            if read == 0 {
                break;
            }
            size += read as i64;
            digest.consume(&buf[..read]);
        }

        Ok(Some(StoredObject {
            size,
            checksum: format!("{:x}", digest.compute()),
        }))
    }

    /// Delete the object at `key`, pruning emptied shard directories.
    /// Returns whether an object was actually removed.
    pub async fn delete(&self, key: &str) -> AssetResult<bool> {
        let file_path = self.object_path(key);
        let removed = match fs::remove_file(&file_path).await {
            Ok(_) => true,
            Err(err) if err.kind() == ErrorKind::NotFound => false,
            Err(err) => return Err(AssetError::Io(err)),
        };

        if let Some(parent) = file_path.parent() {
            self.prune_empty_dirs(parent, &self.base_path).await;
        }
        Ok(removed)
    }

    /// Collect up to `limit` object keys, skipping temp files.
    ///
    /// Used by the reconciliation sweeper's orphan scan; the bound keeps one
    /// pass cheap even over a large store.
    pub async fn list_keys(&self, limit: usize) -> AssetResult<Vec<String>> {
        let mut keys = Vec::new();
        let mut pending = vec![(self.base_path.clone(), String::new())];

        while let Some((dir, prefix)) = pending.pop() {
            let mut entries = match fs::read_dir(&dir).await {
                Ok(entries) => entries,
                Err(err) if err.kind() == ErrorKind::NotFound => continue,
                Err(err) => return Err(AssetError::Io(err)),
            };
            while let Some(entry) = entries.next_entry().await? {
                let name = entry.file_name().to_string_lossy().into_owned();
                let child_prefix = if prefix.is_empty() {
                    name.clone()
                } else {
                    format!("{}/{}", prefix, name)
                };
                let file_type = entry.file_type().await?;
                if file_type.is_dir() {
                    pending.push((entry.path(), child_prefix));
                } else if !name.starts_with(".tmp-") {
                    keys.push(child_prefix);
                    if keys.len() >= limit {
                        return Ok(keys);
                    }
                }
            }
        }
        Ok(keys)
    }

    /// Recursively remove empty directories up to the store root.
    async fn prune_empty_dirs(&self, start: &Path, stop: &Path) {
        let mut current = start.to_path_buf();
        while current.starts_with(stop) && current != stop {
            match fs::remove_dir(&current).await {
                Ok(_) => {
                    if let Some(parent) = current.parent() {
                        current = parent.to_path_buf();
                    } else {
                        break;
                    }
                }
                Err(err) if err.kind() == ErrorKind::NotFound => break,
                Err(err) if err.kind() == ErrorKind::DirectoryNotEmpty => break,
                Err(err) => {
                    debug!("failed to prune directory {}: {}", current.display(), err);
                    break;
                }
            }
        }
    }
}
