use std::io;
use std::path::{Path, PathBuf};

use tokio::fs::{self, File};
use tokio::io::AsyncWriteExt;
use uuid::Uuid;

/// Longest single path component common filesystems accept, in bytes.
const MAX_NAME_BYTES: usize = 255;

/// Uploaded file bytes on the local filesystem, one file per upload.
#[derive(Debug, Clone)]
pub struct BlobStore {
    root: PathBuf,
}

impl BlobStore {
    /// Uses `root` as the upload directory, creating it if needed.
    pub async fn open(root: impl Into<PathBuf>) -> io::Result<Self> {
        let root = root.into();
        fs::create_dir_all(&root).await?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Starts a new blob for `file_id`. The id prefix keeps uploads that share
    /// a filename from overwriting each other.
    pub async fn create(&self, file_id: Uuid, filename: &str) -> io::Result<BlobWriter> {
        let path = self.root.join(blob_name(file_id, filename));
        let file = File::create(&path).await?;
        Ok(BlobWriter { path, file, written: 0 })
    }

    /// Deletes a finished blob whose record never made it into the store.
    pub async fn remove(&self, path: &Path) {
        if let Err(e) = fs::remove_file(path).await {
            tracing::warn!("failed to remove orphaned upload {}: {}", path.display(), e);
        }
    }

    /// Opens a stored blob for reading, returning it with its length.
    /// `Ok(None)` means the blob is gone.
    pub async fn open_blob(&self, storage_path: &str) -> io::Result<Option<(File, u64)>> {
        match File::open(storage_path).await {
            Ok(file) => {
                let len = file.metadata().await?.len();
                Ok(Some((file, len)))
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e),
        }
    }
}

pub struct BlobWriter {
    path: PathBuf,
    file: File,
    written: u64,
}

impl BlobWriter {
    pub async fn write(&mut self, chunk: &[u8]) -> io::Result<()> {
        self.file.write_all(chunk).await?;
        self.written += chunk.len() as u64;
        Ok(())
    }

    /// Flushes to disk and returns the final path and byte count.
    pub async fn finish(mut self) -> io::Result<(PathBuf, u64)> {
        self.file.flush().await?;
        self.file.sync_all().await?;
        Ok((self.path, self.written))
    }

    /// Drops a partially written blob.
    pub async fn discard(self) {
        drop(self.file);
        if let Err(e) = fs::remove_file(&self.path).await {
            tracing::warn!("failed to remove partial upload {}: {}", self.path.display(), e);
        }
    }
}

/// `{file_id}_{filename}`, with the filename's stem cut short when the whole
/// name would not fit in one path component. The extension is kept.
fn blob_name(file_id: Uuid, filename: &str) -> String {
    let prefix = format!("{file_id}_");
    let budget = MAX_NAME_BYTES - prefix.len();
    if filename.len() <= budget {
        return prefix + filename;
    }

    let (stem, ext) = match filename.rfind('.') {
        Some(dot) if filename.len() - dot < budget => filename.split_at(dot),
        _ => (filename, ""),
    };
    let mut end = budget - ext.len();
    while !stem.is_char_boundary(end) {
        end -= 1;
    }
    format!("{prefix}{}{ext}", &stem[..end])
}

/// Reduces a client-supplied name to its last path component. Returns `None`
/// when nothing usable is left.
pub fn sanitize_filename(name: &str) -> Option<String> {
    let last = name.rsplit(['/', '\\']).next()?.trim();
    if last.is_empty() || last == "." || last == ".." {
        return None;
    }
    Some(last.chars().filter(|c| !c.is_control()).collect())
}
