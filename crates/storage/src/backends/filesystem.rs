//! Local filesystem storage backend.
//!
//! Layout: `{root}/{bucket}/{path}`.

use crate::error::{StorageError, StorageResult};
use crate::traits::{ObjectStore, normalize_folder, validate_bucket};
use async_trait::async_trait;
use bytes::Bytes;
use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::instrument;
use uuid::Uuid;

/// Local filesystem object store.
pub struct FilesystemBackend {
    root: PathBuf,
}

impl FilesystemBackend {
    /// Create a new filesystem backend, creating the root if needed.
    pub async fn new(root: impl AsRef<Path>) -> StorageResult<Self> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(&root).await?;
        Ok(Self { root })
    }

    /// Resolve `bucket/path` to a location under the root.
    ///
    /// Runs the symlink checks on the blocking pool since they stat and
    /// canonicalize.
    async fn object_path(&self, bucket: &str, path: &str) -> StorageResult<PathBuf> {
        validate_bucket(bucket)?;
        if path.is_empty() || path.starts_with('/') {
            return Err(StorageError::InvalidKey(format!("unsafe key: {path}")));
        }
        let root = self.root.clone();
        let key = format!("{bucket}/{path}");
        tokio::task::spawn_blocking(move || resolve_within_root(&root, &key))
            .await
            .map_err(|e| {
                StorageError::Io(std::io::Error::other(format!("spawn_blocking failed: {e}")))
            })?
    }

    async fn ensure_parent(&self, path: &Path) -> StorageResult<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }
        Ok(())
    }
}

fn not_found_or_io(e: std::io::Error, key: String) -> StorageError {
    if e.kind() == ErrorKind::NotFound {
        StorageError::NotFound(key)
    } else {
        StorageError::Io(e)
    }
}

/// Join `key` onto `root`, rejecting anything that could escape it.
///
/// Lexical checks reject absolute paths and `.`/`..` components. The longest
/// existing prefix of the joined path is then canonicalized and must stay
/// under the canonical root, which catches symlinked files and directories
/// (including ancestors of not-yet-created paths).
fn resolve_within_root(root: &Path, key: &str) -> StorageResult<PathBuf> {
    if key.is_empty() || key.starts_with('/') || key.starts_with('\\') || key.contains('\\') {
        return Err(StorageError::InvalidKey(format!("unsafe key: {key}")));
    }
    if !Path::new(key)
        .components()
        .all(|c| matches!(c, Component::Normal(_)))
    {
        return Err(StorageError::InvalidKey(format!(
            "contains unsafe path component: {key}"
        )));
    }

    let root_canonical = root.canonicalize().map_err(|e| {
        StorageError::Io(std::io::Error::new(
            e.kind(),
            format!("failed to canonicalize root: {e}"),
        ))
    })?;

    let joined = root.join(key);
    let mut probe: &Path = &joined;
    loop {
        match std::fs::symlink_metadata(probe) {
            Ok(meta) => {
                let canonical = probe.canonicalize().map_err(|e| {
                    if meta.file_type().is_symlink() {
                        StorageError::InvalidKey(format!("dangling symlink in key: {key}"))
                    } else {
                        StorageError::Io(e)
                    }
                })?;
                if !canonical.starts_with(&root_canonical) {
                    return Err(StorageError::InvalidKey(format!(
                        "resolved path escapes storage root: {key}"
                    )));
                }
                return Ok(joined);
            }
            Err(e) if e.kind() == ErrorKind::NotFound => match probe.parent() {
                Some(parent) if parent.starts_with(root) => probe = parent,
                _ => return Ok(joined),
            },
            Err(e) => return Err(StorageError::Io(e)),
        }
    }
}

#[async_trait]
impl ObjectStore for FilesystemBackend {
    #[instrument(skip(self), fields(backend = "filesystem"))]
    async fn get(&self, bucket: &str, path: &str) -> StorageResult<Bytes> {
        let file = self.object_path(bucket, path).await?;
        let data = fs::read(&file)
            .await
            .map_err(|e| not_found_or_io(e, format!("{bucket}/{path}")))?;
        Ok(Bytes::from(data))
    }

    #[instrument(skip(self, data), fields(backend = "filesystem", size = data.len()))]
    async fn put(&self, bucket: &str, path: &str, data: Bytes) -> StorageResult<()> {
        let file_path = self.object_path(bucket, path).await?;
        self.ensure_parent(&file_path).await?;

        // Unique temp name so concurrent writers to the same key never collide
        let temp_name = format!(".tmp.{}", Uuid::new_v4());
        let temp_path = file_path.with_file_name(
            file_path
                .file_name()
                .map(|n| format!("{}{}", n.to_string_lossy(), temp_name))
                .unwrap_or_else(|| temp_name.clone()),
        );
        {
            let mut file = fs::File::create(&temp_path).await?;
            file.write_all(&data).await?;
            file.sync_all().await?;
        }
        fs::rename(&temp_path, &file_path).await?;

        Ok(())
    }

    #[instrument(skip(self, paths), fields(backend = "filesystem", count = paths.len()))]
    async fn remove(&self, bucket: &str, paths: &[String]) -> StorageResult<()> {
        // Resolve the whole batch before touching anything, so an invalid key
        // rejects the batch without partial deletion.
        let mut files = Vec::with_capacity(paths.len());
        for path in paths {
            files.push(self.object_path(bucket, path).await?);
        }

        for (file, path) in files.iter().zip(paths) {
            match fs::remove_file(file).await {
                Ok(()) => {}
                Err(e) if e.kind() == ErrorKind::NotFound => {
                    tracing::debug!(bucket = %bucket, path = %path, "Object already absent");
                }
                Err(e) => {
                    return Err(StorageError::BulkDelete(format!(
                        "failed to remove {bucket}/{path}: {e}"
                    )));
                }
            }
        }
        Ok(())
    }

    #[instrument(skip(self), fields(backend = "filesystem"))]
    async fn list(&self, bucket: &str, folder: &str) -> StorageResult<Vec<String>> {
        validate_bucket(bucket)?;
        let folder = normalize_folder(folder);
        let dir = if folder.is_empty() {
            self.root.join(bucket)
        } else {
            self.object_path(bucket, folder).await?
        };

        let mut entries = match fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(StorageError::Io(e)),
        };

        let mut names = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            // file_type() does not follow symlinks, so links are skipped
            let file_type = entry.file_type().await?;
            if !file_type.is_file() {
                continue;
            }
            let name = entry.file_name().to_string_lossy().to_string();
            if name.contains(".tmp.") {
                continue;
            }
            names.push(name);
        }
        names.sort();
        Ok(names)
    }

    fn backend_name(&self) -> &'static str {
        "filesystem"
    }

    #[instrument(skip(self), fields(backend = "filesystem"))]
    async fn health_check(&self) -> StorageResult<()> {
        let metadata = fs::metadata(&self.root).await.map_err(|e| {
            StorageError::Io(std::io::Error::new(
                e.kind(),
                format!("storage root not accessible: {e}"),
            ))
        })?;

        if !metadata.is_dir() {
            return Err(StorageError::Io(std::io::Error::new(
                ErrorKind::NotADirectory,
                format!("storage root is not a directory: {:?}", self.root),
            )));
        }

        Ok(())
    }
}
