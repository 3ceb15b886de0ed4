//! Persistence for the config document.
//!
//! Reads tolerate a missing file (empty document); writes are atomic:
//! temp file in the target directory, fsync, rename into place, then a
//! directory fsync. A crash never leaves a partial document visible.

use std::fs;
use std::io::Write as _;
use std::path::Path;

use serde_json::Value;
use tokio::task;

use crate::error::{Result, SidecarError};
use crate::models::ConfigDoc;

/// Loads the config document, treating an absent file as empty.
pub async fn load(path: &Path) -> Result<ConfigDoc> {
    let path = path.to_path_buf();
    task::spawn_blocking(move || load_sync(&path))
        .await
        .map_err(join_error)?
}

/// Writes the document atomically, returning the serialized bytes.
pub async fn write(path: &Path, doc: ConfigDoc) -> Result<Vec<u8>> {
    let path = path.to_path_buf();
    task::spawn_blocking(move || write_sync(&path, &doc))
        .await
        .map_err(join_error)?
}

fn load_sync(path: &Path) -> Result<ConfigDoc> {
    let data = match fs::read(path) {
        Ok(data) => data,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            let mut doc = ConfigDoc::default();
            doc.ensure_initialized();
            return Ok(doc);
        }
        Err(e) => {
            return Err(SidecarError::FileSystem {
                path: path.to_path_buf(),
                source: e,
            })
        }
    };

    let value: Value = serde_json::from_slice(&data).map_err(|e| SidecarError::Document {
        path: path.to_path_buf(),
        message: format!("parse: {e}"),
    })?;
    let Value::Object(top) = value else {
        return Err(SidecarError::Document {
            path: path.to_path_buf(),
            message: "top level is not a JSON object".to_string(),
        });
    };

    let mut doc = ConfigDoc::from_object(top).map_err(|e| SidecarError::Document {
        path: path.to_path_buf(),
        message: e.to_string(),
    })?;
    doc.ensure_initialized();
    Ok(doc)
}

fn write_sync(path: &Path, doc: &ConfigDoc) -> Result<Vec<u8>> {
    let top = doc.to_object()?;
    let mut data = serde_json::to_vec_pretty(&Value::Object(top))?;
    data.push(b'\n');
    atomic_write(path, &data)?;
    Ok(data)
}

fn atomic_write(path: &Path, data: &[u8]) -> Result<()> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    fs::create_dir_all(dir).map_err(|e| SidecarError::FileSystem {
        path: dir.to_path_buf(),
        source: e,
    })?;

    let owner = current_owner(path);

    let mut tmp = tempfile::Builder::new()
        .prefix(".tmp-")
        .suffix(".json")
        .tempfile_in(dir)
        .map_err(|e| SidecarError::FileSystem {
            path: dir.to_path_buf(),
            source: e,
        })?;
    tmp.write_all(data).map_err(|e| SidecarError::FileSystem {
        path: tmp.path().to_path_buf(),
        source: e,
    })?;
    tmp.as_file().sync_all().map_err(|e| SidecarError::FileSystem {
        path: tmp.path().to_path_buf(),
        source: e,
    })?;
    set_file_mode(tmp.path())?;
    if let Some((uid, gid)) = owner {
        restore_owner(tmp.path(), uid, gid)?;
    }
    tmp.persist(path).map_err(|e| SidecarError::FileSystem {
        path: path.to_path_buf(),
        source: e.error,
    })?;

    // fsync the directory so the rename itself is durable
    if let Ok(handle) = fs::File::open(dir) {
        let _ = handle.sync_all();
    }
    Ok(())
}

#[cfg(unix)]
fn set_file_mode(path: &Path) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(0o644)).map_err(|e| {
        SidecarError::FileSystem {
            path: path.to_path_buf(),
            source: e,
        }
    })
}

#[cfg(not(unix))]
fn set_file_mode(_path: &Path) -> Result<()> {
    Ok(())
}

/// Owner of the existing document, so a root-run sidecar does not flip
/// the file away from the user the operator provisioned it for.
#[cfg(unix)]
fn current_owner(path: &Path) -> Option<(u32, u32)> {
    use std::os::unix::fs::MetadataExt;
    fs::symlink_metadata(path).ok().map(|m| (m.uid(), m.gid()))
}

#[cfg(not(unix))]
fn current_owner(_path: &Path) -> Option<(u32, u32)> {
    None
}

#[cfg(unix)]
fn restore_owner(path: &Path, uid: u32, gid: u32) -> Result<()> {
    std::os::unix::fs::chown(path, Some(uid), Some(gid)).map_err(|e| SidecarError::FileSystem {
        path: path.to_path_buf(),
        source: e,
    })
}

#[cfg(not(unix))]
fn restore_owner(_path: &Path, _uid: u32, _gid: u32) -> Result<()> {
    Ok(())
}

fn join_error(err: task::JoinError) -> SidecarError {
    SidecarError::configuration(format!("task join error: {err}"))
}
