//! File-backed document store.

use async_trait::async_trait;
use getrandom::fill;
use serde::{Deserialize, Serialize};
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;
use tracing::debug;

use crate::error::StoreError;
use crate::store::{Collections, DocumentStore, FieldValue, Fields, OrderBy, Record};

/// Current on-disk format version.
pub const FILE_VERSION: u32 = 1;

#[derive(Serialize, Deserialize)]
struct StoreFile {
    version: u32,
    #[serde(flatten)]
    data: Collections,
}

/// A [`DocumentStore`] persisted as a single JSON file.
///
/// All documents are kept in memory. Each mutation is applied to a copy,
/// written to disk atomically, and only then becomes visible, so a failed
/// write leaves both the file and the in-memory view unchanged.
pub struct FileStore {
    path: PathBuf,
    data: Mutex<Collections>,
}

impl FileStore {
    /// Opens the store at `path`, starting empty if the file does not exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed, or
    /// was written by an unsupported version.
    pub fn open(path: PathBuf) -> Result<Self, StoreError> {
        let data = if path.exists() {
            let file: StoreFile = serde_json::from_slice(&fs::read(&path)?)?;
            if file.version != FILE_VERSION {
                return Err(StoreError::UnsupportedVersion(file.version));
            }
            file.data
        } else {
            Collections::default()
        };

        debug!(path = %path.display(), "opened document store");
        Ok(Self {
            path,
            data: Mutex::new(data),
        })
    }

    /// Returns the path to the storage file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns `true` if the storage file exists.
    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    /// The file write runs on the blocking pool while the lock is held.
    async fn mutate<T>(
        &self,
        op: impl FnOnce(&mut Collections) -> Result<T, StoreError>,
    ) -> Result<T, StoreError> {
        let mut guard = self.data.lock().await;
        let mut next = guard.clone();
        let out = op(&mut next)?;

        let file = StoreFile {
            version: FILE_VERSION,
            data: next,
        };
        let bytes = serde_json::to_vec_pretty(&file)?;
        let path = self.path.clone();
        tokio::task::spawn_blocking(move || save(&path, &bytes))
            .await
            .map_err(|e| StoreError::Io(std::io::Error::other(e)))??;
        *guard = file.data;
        Ok(out)
    }
}

/// Writes `data` to `path` atomically. Blocking.
///
/// Writes to a randomly named temporary file in the same directory,
/// syncs it, atomically replaces the old file and syncs the parent
/// directory. After a crash either the old or the new file is present.
///
/// Creates parent directories if they don't exist.
fn save(path: &Path, data: &[u8]) -> Result<(), StoreError> {
    let parent = path.parent().filter(|p| !p.as_os_str().is_empty());
    if let Some(parent) = parent {
        fs::create_dir_all(parent)?;
    }

    let tmp_path = random_tmp_path(path)?;

    // fail if a file with this name already exists
    let mut tmp_file = OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(&tmp_path)?;

    tmp_file.write_all(data)?;
    tmp_file.sync_all()?;
    drop(tmp_file);

    if let Err(e) = atomic_replace(path, &tmp_path) {
        let _ = fs::remove_file(&tmp_path);
        return Err(e);
    }

    if let Some(parent) = parent {
        // directories cannot be opened for sync on Windows
        #[cfg(not(target_os = "windows"))]
        File::open(parent)?.sync_all()?;
        #[cfg(target_os = "windows")]
        let _ = parent;
    }

    Ok(())
}

/// Temporary path next to the store: `<name>.tmp.<randomhex>`.
fn random_tmp_path(path: &Path) -> Result<PathBuf, StoreError> {
    let mut buf = [0u8; 8];
    fill(&mut buf).map_err(|_| StoreError::Random)?;

    let suffix: String = buf.iter().map(|b| format!("{b:02x}")).collect();
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "diarist".to_string());

    Ok(path.with_file_name(format!("{file_name}.tmp.{suffix}")))
}

/// Replaces the store file with `ReplaceFileW` and write-through, or
/// renames when the target does not exist yet.
#[cfg(target_os = "windows")]
fn atomic_replace(path: &Path, tmp_path: &Path) -> Result<(), StoreError> {
    use std::ffi::OsStr;
    use std::os::windows::ffi::OsStrExt;
    use windows_sys::Win32::Storage::FileSystem::{REPLACEFILE_WRITE_THROUGH, ReplaceFileW};

    if !path.exists() {
        fs::rename(tmp_path, path)?;
        return Ok(());
    }

    fn to_wide(s: &OsStr) -> Vec<u16> {
        s.encode_wide().chain(std::iter::once(0)).collect()
    }

    let target_w = to_wide(path.as_os_str());
    let tmp_w = to_wide(tmp_path.as_os_str());

    // SAFETY: both buffers are NUL-terminated UTF-16 that outlive the
    // call, and Windows does not retain the pointers.
    let result = unsafe {
        ReplaceFileW(
            target_w.as_ptr(),
            tmp_w.as_ptr(),
            std::ptr::null(),
            REPLACEFILE_WRITE_THROUGH,
            std::ptr::null(),
            std::ptr::null(),
        )
    };

    if result == 0 {
        return Err(std::io::Error::last_os_error().into());
    }

    Ok(())
}

/// `rename()` is atomic when both paths are on the same filesystem.
#[cfg(not(target_os = "windows"))]
fn atomic_replace(path: &Path, tmp_path: &Path) -> Result<(), StoreError> {
    fs::rename(tmp_path, path)?;
    Ok(())
}

#[async_trait]
impl DocumentStore for FileStore {
    async fn create(&self, collection: &str, fields: Fields) -> Result<String, StoreError> {
        self.mutate(|c| c.create(collection, fields)).await
    }

    async fn put(&self, collection: &str, id: &str, fields: Fields) -> Result<(), StoreError> {
        self.mutate(|c| {
            c.put(collection, id, fields);
            Ok(())
        })
        .await
    }

    async fn update(&self, collection: &str, id: &str, fields: Fields) -> Result<(), StoreError> {
        self.mutate(|c| c.update(collection, id, fields)).await
    }

    async fn delete(&self, collection: &str, id: &str) -> Result<(), StoreError> {
        self.mutate(|c| c.delete(collection, id)).await
    }

    async fn get_by_id(&self, collection: &str, id: &str) -> Result<Option<Record>, StoreError> {
        Ok(self.data.lock().await.get(collection, id))
    }

    async fn query_by_field(
        &self,
        collection: &str,
        field: &str,
        value: &FieldValue,
        order_by: Option<OrderBy>,
    ) -> Result<Vec<Record>, StoreError> {
        Ok(self
            .data
            .lock()
            .await
            .query(collection, field, value, order_by.as_ref()))
    }
}
