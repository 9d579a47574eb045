//! File persistence for `.song` and `.moves` files.
//!
//! Every mutation is a read-modify-write of the whole file, serialized per
//! path within the process and committed by renaming a temp file over the
//! original. A rejected mutation never touches the file. Nothing guards
//! against a second process writing the same file.

pub mod moves;
pub mod songs;

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, LazyLock, Mutex, PoisonError};

use thiserror::Error;

use crate::dsl::MoveFileError;
use crate::validate::ValidationError;

pub use moves::{MoveFilter, MoveStore};
pub use songs::{NewPart, PartUpdate, SongStore, sanitize_title};

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("IO error on {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("corrupt move file {}: {source}", .path.display())]
    Corrupt {
        path: PathBuf,
        #[source]
        source: MoveFileError,
    },
    #[error(transparent)]
    Invalid(#[from] ValidationError),
    #[error("{kind} {id} not found")]
    NotFound { kind: &'static str, id: String },
    #[error("{} already exists", .0.display())]
    AlreadyExists(PathBuf),
}

impl StoreError {
    fn io(path: &Path, source: std::io::Error) -> Self {
        Self::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

pub type Result<T> = std::result::Result<T, StoreError>;

/// One mutex per file path, shared by every store in the process.
static FILE_LOCKS: LazyLock<Mutex<HashMap<PathBuf, Arc<Mutex<()>>>>> =
    LazyLock::new(|| Mutex::new(HashMap::new()));

/// Run `f` while holding the writer lock for `path`.
pub(crate) fn with_file_lock<T>(path: &Path, f: impl FnOnce() -> T) -> T {
    let lock = {
        let mut table = FILE_LOCKS.lock().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(table.entry(path.to_path_buf()).or_default())
    };
    let _guard = lock.lock().unwrap_or_else(PoisonError::into_inner);
    f()
}

/// Read a file, mapping "not found" to `None`.
pub(crate) fn read_optional(path: &Path) -> Result<Option<String>> {
    match std::fs::read_to_string(path) {
        Ok(text) => Ok(Some(text)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(StoreError::io(path, e)),
    }
}

/// Write via `<name>.tmp` + rename so readers never see a half-written file.
pub(crate) fn write_atomic(path: &Path, contents: &str) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| StoreError::io(parent, e))?;
    }
    let mut tmp_name = path.file_name().unwrap_or_default().to_os_string();
    tmp_name.push(".tmp");
    let tmp = path.with_file_name(tmp_name);

    std::fs::write(&tmp, contents).map_err(|e| StoreError::io(&tmp, e))?;
    if let Err(e) = std::fs::rename(&tmp, path) {
        std::fs::remove_file(&tmp).ok();
        return Err(StoreError::io(path, e));
    }
    log::debug!("wrote {} ({} bytes)", path.display(), contents.len());
    Ok(())
}
