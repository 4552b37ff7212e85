//! Crash-safe file replacement
//!
//! Contents are written to a temporary sibling, flushed and synced, then
//! renamed over the destination. Readers see either the old or the new
//! content, never a truncated file.

use std::io;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;

/// Replace `path` with `contents` atomically
///
/// Permissions of an existing destination are carried over to the new file.
/// A symlinked destination is resolved first, so the file it points to is
/// replaced and the link survives. The temporary file lives next to the
/// resolved file so the rename never crosses filesystems.
pub(crate) async fn write_atomic(path: &Path, contents: &[u8]) -> io::Result<()> {
    let resolved = match fs::canonicalize(path).await {
        Ok(resolved) => resolved,
        Err(e) if e.kind() == io::ErrorKind::NotFound => path.to_path_buf(),
        Err(e) => return Err(e),
    };
    let path = resolved.as_path();

    let permissions = match fs::metadata(path).await {
        Ok(metadata) => Some(metadata.permissions()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => None,
        Err(e) => return Err(e),
    };

    let temp_path = temp_path(path);
    let result: io::Result<()> = async {
        let mut file = fs::File::create(&temp_path).await?;
        file.write_all(contents).await?;
        file.flush().await?;
        file.sync_all().await?;
        drop(file);

        if let Some(permissions) = permissions {
            fs::set_permissions(&temp_path, permissions).await?;
        }

        fs::rename(&temp_path, path).await
    }
    .await;

    if result.is_err() {
        // Best effort: a stale temp file is harmless but untidy
        let _ = fs::remove_file(&temp_path).await;
    }

    result
}

/// Temporary sibling used while replacing `path`
fn temp_path(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    path.with_file_name(format!(".{}.{}.tmp", name, std::process::id()))
}
