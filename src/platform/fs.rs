// EnrolSift - platform/fs.rs
//
// Filesystem helpers for JSON documents.
//
// Documents are saved atomically (write temp, rename final) so a crash
// during save never corrupts the previous good copy. Parent directories are
// created on first save; no user action required.

use crate::util::error::PersistenceError;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::io;
use std::path::Path;

/// Save `value` to `path` atomically (write temp, then rename).
pub fn write_json_atomic<T: Serialize + ?Sized>(
    path: &Path,
    value: &T,
) -> Result<(), PersistenceError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|e| PersistenceError::Io {
            path: parent.to_path_buf(),
            operation: "create directory",
            source: e,
        })?;
    }

    let json = serde_json::to_vec_pretty(value).map_err(|e| PersistenceError::Json {
        path: path.to_path_buf(),
        source: e,
    })?;

    // A crash between write and rename loses the new document but never
    // corrupts the previous one (rename is atomic on all supported platforms).
    let tmp = path.with_extension("json.tmp");
    std::fs::write(&tmp, &json).map_err(|e| PersistenceError::Io {
        path: tmp.clone(),
        operation: "write",
        source: e,
    })?;

    std::fs::rename(&tmp, path).map_err(|e| {
        let _ = std::fs::remove_file(&tmp);
        PersistenceError::Io {
            path: path.to_path_buf(),
            operation: "rename",
            source: e,
        }
    })?;

    tracing::debug!(path = %path.display(), bytes = json.len(), "Document saved");
    Ok(())
}

/// Load a JSON document. A missing file is `Ok(None)` (normal first run).
pub fn read_json<T: DeserializeOwned>(path: &Path) -> Result<Option<T>, PersistenceError> {
    let content = match std::fs::read(path) {
        Ok(c) => c,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(e) => {
            return Err(PersistenceError::Io {
                path: path.to_path_buf(),
                operation: "read",
                source: e,
            })
        }
    };

    serde_json::from_slice(&content)
        .map(Some)
        .map_err(|e| PersistenceError::Json {
            path: path.to_path_buf(),
            source: e,
        })
}
