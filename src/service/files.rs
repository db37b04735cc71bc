//! Naming and placement of generated and uploaded audio files.

use std::path::{Component, Path, PathBuf};

use crate::error::{Error, Result};

/// Eight lowercase hex characters of a random UUID.
pub fn short_id() -> String {
    let mut id = uuid::Uuid::new_v4().simple().to_string();
    id.truncate(8);
    id
}

/// Final path component of a client-supplied file name.
pub fn upload_name(filename: &str) -> Option<&str> {
    let name = filename.rsplit(['/', '\\']).next()?.trim();
    match name {
        "" | "." | ".." => None,
        name => Some(name),
    }
}

/// Write an upload as `<dir>/<prefix>_<id>_<name>`.
pub fn store_upload(
    dir: &Path,
    prefix: &str,
    filename: &str,
    bytes: &[u8],
) -> Result<(String, PathBuf)> {
    let name = upload_name(filename)
        .ok_or_else(|| Error::InvalidInput(format!("invalid file name {filename:?}")))?;
    let id = short_id();
    let path = dir.join(format!("{prefix}_{id}_{name}"));
    std::fs::write(&path, bytes)?;
    log::debug!("Stored {} bytes at {}", bytes.len(), path.display());
    Ok((id, path))
}

/// Existing file `filename` directly inside `dir`.
///
/// Names that are not a single plain path component are refused.
pub fn resolve_in(dir: &Path, filename: &str) -> Option<PathBuf> {
    let mut components = Path::new(filename).components();
    let single = matches!(
        (components.next(), components.next()),
        (Some(Component::Normal(_)), None)
    );
    if !single || filename.contains('\\') {
        return None;
    }

    let path = dir.join(filename);
    path.is_file().then_some(path)
}

/// An uploaded file removed again when dropped.
#[derive(Debug)]
pub struct TempUpload {
    path: PathBuf,
}

impl TempUpload {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for TempUpload {
    fn drop(&mut self) {
        if let Err(e) = std::fs::remove_file(&self.path) {
            if e.kind() != std::io::ErrorKind::NotFound {
                log::warn!("Failed to remove {}: {e}", self.path.display());
            }
        }
    }
}
