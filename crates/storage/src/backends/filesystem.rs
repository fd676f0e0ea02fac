//! Local filesystem blob backend.
//!
//! Blobs live at `<root>/blobs/<first two id chars>/<id>`. Every write goes to a
//! uniquely named temp file next to its target, is fsynced, and is then
//! published with a rename (replace) or a hard link (create), so a blob is
//! never observed half-written or missing mid-replace.

use crate::error::{StorageError, StorageResult};
use crate::traits::{BlobReader, BlobStore, BlobWriter};
use async_trait::async_trait;
use bytes::Bytes;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tracing::instrument;
use uuid::Uuid;

/// Directory under the root holding all blobs.
const BLOBS_DIR: &str = "blobs";

/// Marker embedded in temp file names; such files are never listed.
const TEMP_MARKER: &str = ".tmp.";

/// Maximum accepted id length.
const MAX_ID_LEN: usize = 128;

/// Local filesystem blob store.
pub struct FilesystemBackend {
    root: PathBuf,
}

impl FilesystemBackend {
    /// Create a new filesystem backend, creating the root if needed.
    pub async fn new(root: impl AsRef<Path>) -> StorageResult<Self> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(root.join(BLOBS_DIR)).await?;
        Ok(Self { root })
    }

    /// Get the on-disk path for a blob id.
    ///
    /// Ids are restricted to ASCII alphanumerics, `-` and `_`, which rules out
    /// separators, `..` and anything else that could escape the root.
    fn blob_path(&self, id: &str) -> StorageResult<PathBuf> {
        if id.len() < 2 || id.len() > MAX_ID_LEN {
            return Err(StorageError::InvalidKey(format!(
                "id length must be between 2 and {MAX_ID_LEN}: {id:?}"
            )));
        }
        if !id
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_')
        {
            return Err(StorageError::InvalidKey(format!(
                "id contains unsupported characters: {id:?}"
            )));
        }

        Ok(self.root.join(BLOBS_DIR).join(&id[..2]).join(id))
    }

    /// Unique temp path next to `path`.
    fn temp_path(path: &Path) -> PathBuf {
        // Use UUID to avoid conflicts between concurrent writers of the same id
        let temp_name = format!("{TEMP_MARKER}{}", Uuid::new_v4());
        path.with_file_name(
            path.file_name()
                .map(|n| format!("{}{}", n.to_string_lossy(), temp_name))
                .unwrap_or_else(|| temp_name.clone()),
        )
    }

    /// Ensure parent directory exists.
    async fn ensure_parent(&self, path: &Path) -> StorageResult<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }
        Ok(())
    }
}

fn not_found_or_io(id: &str, e: std::io::Error) -> StorageError {
    if e.kind() == std::io::ErrorKind::NotFound {
        StorageError::NotFound(id.to_string())
    } else {
        StorageError::Io(e)
    }
}

#[async_trait]
impl BlobStore for FilesystemBackend {
    #[instrument(skip(self), fields(backend = "filesystem"))]
    async fn create(&self, id: &str) -> StorageResult<Box<dyn BlobWriter>> {
        let path = self.blob_path(id)?;
        if fs::try_exists(&path).await? {
            return Err(StorageError::AlreadyExists(id.to_string()));
        }
        self.ensure_parent(&path).await?;

        let temp_path = Self::temp_path(&path);
        let file = fs::File::create(&temp_path).await?;

        Ok(Box::new(FilesystemWriter {
            id: id.to_string(),
            file,
            temp_path,
            final_path: path,
            bytes_written: 0,
        }))
    }

    #[instrument(skip(self), fields(backend = "filesystem"))]
    async fn open(&self, id: &str) -> StorageResult<Box<dyn BlobReader>> {
        let path = self.blob_path(id)?;
        let file = fs::File::open(&path)
            .await
            .map_err(|e| not_found_or_io(id, e))?;
        let size = file.metadata().await?.len();

        Ok(Box::new(FilesystemReader { file, size }))
    }

    #[instrument(skip(self, data), fields(backend = "filesystem", size = data.len()))]
    async fn replace(&self, id: &str, data: Bytes) -> StorageResult<()> {
        let path = self.blob_path(id)?;
        if !fs::try_exists(&path).await? {
            return Err(StorageError::NotFound(id.to_string()));
        }

        // Write to temp file, fsync, then rename over the old content
        let temp_path = Self::temp_path(&path);
        let written = async {
            let mut file = fs::File::create(&temp_path).await?;
            file.write_all(&data).await?;
            file.sync_all().await?;
            Ok::<_, std::io::Error>(())
        }
        .await;
        if let Err(e) = written {
            let _ = fs::remove_file(&temp_path).await;
            return Err(StorageError::Io(e));
        }

        if let Err(e) = fs::rename(&temp_path, &path).await {
            let _ = fs::remove_file(&temp_path).await;
            return Err(StorageError::Io(e));
        }
        Ok(())
    }

    #[instrument(skip(self), fields(backend = "filesystem"))]
    async fn remove(&self, id: &str) -> StorageResult<()> {
        let path = self.blob_path(id)?;
        fs::remove_file(&path)
            .await
            .map_err(|e| not_found_or_io(id, e))
    }

    #[instrument(skip(self), fields(backend = "filesystem"))]
    async fn exists(&self, id: &str) -> StorageResult<bool> {
        let path = self.blob_path(id)?;
        fs::try_exists(&path).await.map_err(StorageError::Io)
    }

    #[instrument(skip(self), fields(backend = "filesystem"))]
    async fn list(&self) -> StorageResult<Vec<String>> {
        let base = self.root.join(BLOBS_DIR);
        let mut results = Vec::new();

        let mut shards = match fs::read_dir(&base).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(results),
            Err(e) => return Err(StorageError::Io(e)),
        };

        while let Some(shard) = shards.next_entry().await? {
            // file_type() does not follow symlinks
            if !shard.file_type().await?.is_dir() {
                continue;
            }
            let mut entries = fs::read_dir(shard.path()).await?;
            while let Some(entry) = entries.next_entry().await? {
                let name = entry.file_name().to_string_lossy().to_string();
                if entry.file_type().await?.is_file() && !name.contains(TEMP_MARKER) {
                    results.push(name);
                }
            }
        }

        Ok(results)
    }

    fn backend_name(&self) -> &'static str {
        "filesystem"
    }

    async fn health_check(&self) -> StorageResult<()> {
        let meta = fs::metadata(self.root.join(BLOBS_DIR)).await?;
        if !meta.is_dir() {
            return Err(StorageError::Config(format!(
                "blob root is not a directory: {}",
                self.root.display()
            )));
        }
        Ok(())
    }
}

/// Pending blob written to a temp file until closed.
struct FilesystemWriter {
    id: String,
    file: fs::File,
    temp_path: PathBuf,
    final_path: PathBuf,
    bytes_written: u64,
}

#[async_trait]
impl BlobWriter for FilesystemWriter {
    async fn write(&mut self, data: Bytes) -> StorageResult<()> {
        self.file.write_all(&data).await?;
        self.bytes_written += data.len() as u64;
        Ok(())
    }

    async fn close(self: Box<Self>) -> StorageResult<u64> {
        let this = *self;
        // Ensure all data is flushed to disk before publishing
        this.file.sync_all().await?;
        drop(this.file);

        // hard_link refuses to clobber, so a blob created concurrently under the
        // same id surfaces as AlreadyExists instead of being overwritten.
        let linked = fs::hard_link(&this.temp_path, &this.final_path).await;
        let _ = fs::remove_file(&this.temp_path).await;
        match linked {
            Ok(()) => Ok(this.bytes_written),
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                Err(StorageError::AlreadyExists(this.id))
            }
            Err(e) => Err(StorageError::Io(e)),
        }
    }

    async fn abort(self: Box<Self>) -> StorageResult<()> {
        drop(self.file);
        let _ = fs::remove_file(&self.temp_path).await;
        Ok(())
    }
}

/// Open blob. The handle pins the content seen at open time.
struct FilesystemReader {
    file: fs::File,
    size: u64,
}

#[async_trait]
impl BlobReader for FilesystemReader {
    fn size(&self) -> u64 {
        self.size
    }

    async fn read_all(mut self: Box<Self>) -> StorageResult<Bytes> {
        if self.size == 0 {
            return Ok(Bytes::new());
        }
        let capacity = usize::try_from(self.size).unwrap_or(0);
        let mut buf = Vec::with_capacity(capacity);
        self.file.read_to_end(&mut buf).await?;
        Ok(Bytes::from(buf))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn backend() -> (tempfile::TempDir, FilesystemBackend) {
        let dir = tempfile::tempdir().unwrap();
        let backend = FilesystemBackend::new(dir.path()).await.unwrap();
        (dir, backend)
    }

    #[tokio::test]
    async fn test_create_then_open_empty() {
        let (_dir, backend) = backend().await;

        let writer = backend.create("blob-a").await.unwrap();
        assert_eq!(writer.close().await.unwrap(), 0);

        let reader = backend.open("blob-a").await.unwrap();
        assert_eq!(reader.size(), 0);
        assert!(reader.read_all().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_blob_invisible_until_closed() {
        let (_dir, backend) = backend().await;

        let mut writer = backend.create("pending").await.unwrap();
        writer.write(Bytes::from_static(b"abc")).await.unwrap();
        assert!(!backend.exists("pending").await.unwrap());

        assert_eq!(writer.close().await.unwrap(), 3);
        let data = backend.open("pending").await.unwrap().read_all().await;
        assert_eq!(data.unwrap(), Bytes::from_static(b"abc"));
    }

    #[tokio::test]
    async fn test_create_existing_fails() {
        let (_dir, backend) = backend().await;

        backend.create("dup").await.unwrap().close().await.unwrap();
        match backend.create("dup").await {
            Err(StorageError::AlreadyExists(id)) => assert_eq!(id, "dup"),
            Err(other) => panic!("unexpected error: {other:?}"),
            Ok(_) => panic!("expected AlreadyExists"),
        }
    }

    #[tokio::test]
    async fn test_racing_creates_do_not_clobber() {
        let (_dir, backend) = backend().await;

        let mut first = backend.create("race").await.unwrap();
        let mut second = backend.create("race").await.unwrap();
        first.write(Bytes::from_static(b"first")).await.unwrap();
        second.write(Bytes::from_static(b"second")).await.unwrap();

        first.close().await.unwrap();
        assert!(matches!(
            second.close().await,
            Err(StorageError::AlreadyExists(_))
        ));

        let data = backend.open("race").await.unwrap().read_all().await.unwrap();
        assert_eq!(data, Bytes::from_static(b"first"));
        assert_eq!(backend.list().await.unwrap(), vec!["race".to_string()]);
    }

    #[tokio::test]
    async fn test_abort_discards() {
        let (_dir, backend) = backend().await;

        let mut writer = backend.create("gone").await.unwrap();
        writer.write(Bytes::from_static(b"xyz")).await.unwrap();
        writer.abort().await.unwrap();

        assert!(!backend.exists("gone").await.unwrap());
        assert!(backend.list().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_replace_requires_existing() {
        let (_dir, backend) = backend().await;

        let result = backend.replace("missing", Bytes::from_static(b"x")).await;
        assert!(matches!(result, Err(StorageError::NotFound(_))));
        assert!(!backend.exists("missing").await.unwrap());
    }

    #[tokio::test]
    async fn test_replace_swaps_content() {
        let (_dir, backend) = backend().await;

        backend.create("swap").await.unwrap().close().await.unwrap();
        backend
            .replace("swap", Bytes::from_static(b"hello"))
            .await
            .unwrap();
        backend
            .replace("swap", Bytes::from_static(b"helloworld"))
            .await
            .unwrap();

        let reader = backend.open("swap").await.unwrap();
        assert_eq!(reader.size(), 10);
        assert_eq!(
            reader.read_all().await.unwrap(),
            Bytes::from_static(b"helloworld")
        );
        assert_eq!(backend.list().await.unwrap(), vec!["swap".to_string()]);
    }

    #[tokio::test]
    async fn test_open_reader_pins_old_content() {
        let (_dir, backend) = backend().await;

        backend.create("pin").await.unwrap().close().await.unwrap();
        backend
            .replace("pin", Bytes::from_static(b"old"))
            .await
            .unwrap();

        let reader = backend.open("pin").await.unwrap();
        backend
            .replace("pin", Bytes::from_static(b"newer"))
            .await
            .unwrap();

        assert_eq!(reader.read_all().await.unwrap(), Bytes::from_static(b"old"));
    }

    #[tokio::test]
    async fn test_remove() {
        let (_dir, backend) = backend().await;

        backend.create("doomed").await.unwrap().close().await.unwrap();
        backend.remove("doomed").await.unwrap();
        assert!(!backend.exists("doomed").await.unwrap());
        assert!(matches!(
            backend.remove("doomed").await,
            Err(StorageError::NotFound(_))
        ));
        assert!(matches!(
            backend.open("doomed").await,
            Err(StorageError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_rejects_unsafe_ids() {
        let (_dir, backend) = backend().await;

        for id in ["", "a", "../escape", "a/b", "dot.dot", "sp ace"] {
            assert!(
                matches!(backend.exists(id).await, Err(StorageError::InvalidKey(_))),
                "id {id:?} should be rejected"
            );
        }
    }

    #[tokio::test]
    async fn test_list_across_shards() {
        let (_dir, backend) = backend().await;

        for id in ["aa-1", "ab-2", "zz-3"] {
            backend.create(id).await.unwrap().close().await.unwrap();
        }

        let mut ids = backend.list().await.unwrap();
        ids.sort();
        assert_eq!(ids, vec!["aa-1", "ab-2", "zz-3"]);
    }

    #[tokio::test]
    async fn test_health_check() {
        let (_dir, backend) = backend().await;
        backend.health_check().await.unwrap();
    }
}
