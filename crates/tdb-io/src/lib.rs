//! Common filesystem utilities for tdb crates

use camino::{Utf8Path, Utf8PathBuf};
use futures_util::future::BoxFuture;

/// Create the parent directory of `path`, including all ancestors.
///
/// A path with no parent (e.g. `.`) is a no-op.
pub async fn create_parent_dirs(path: &Utf8Path) -> Result<(), std::io::Error> {
    if let Some(parent) = path.parent() {
        if !parent.as_str().is_empty() {
            tokio::fs::create_dir_all(parent).await?;
        }
    }
    Ok(())
}

/// Remove a file or directory tree, tolerating a missing path.
///
/// Directories are removed recursively. Returns `Ok(())` when the path
/// does not exist, so callers can use this to clean up artifacts that
/// may or may not have been produced.
pub async fn remove_all(path: &Utf8Path) -> Result<(), std::io::Error> {
    let metadata = match tokio::fs::symlink_metadata(path).await {
        Ok(m) => m,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
        Err(e) => return Err(e),
    };

    let result = if metadata.is_dir() {
        tokio::fs::remove_dir_all(path).await
    } else {
        tokio::fs::remove_file(path).await
    };

    match result {
        Ok(()) => Ok(()),
        // Lost a race with another remover
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e),
    }
}

/// Recursively copy `src` to `dst`.
///
/// Files are copied byte-for-byte, directories are created as needed.
/// `dst`'s parent directories are created first.
pub fn copy_recursive<'a>(
    src: &'a Utf8Path,
    dst: &'a Utf8Path,
) -> BoxFuture<'a, Result<(), std::io::Error>> {
    Box::pin(async move {
        let metadata = tokio::fs::metadata(src).await?;

        if metadata.is_dir() {
            tokio::fs::create_dir_all(dst).await?;
            let mut entries = tokio::fs::read_dir(src).await?;
            while let Some(entry) = entries.next_entry().await? {
                let name = entry.file_name();
                let name = name.to_str().ok_or_else(|| {
                    std::io::Error::other(format!("non-UTF-8 file name under {src}"))
                })?;
                copy_recursive(&src.join(name), &dst.join(name)).await?;
            }
        } else {
            create_parent_dirs(dst).await?;
            tokio::fs::copy(src, dst).await?;
        }

        Ok(())
    })
}

/// Refresh a directory's modification time.
///
/// Creates and immediately removes a placeholder file inside the
/// directory. Some filesystems do not update a directory's mtime when a
/// nested file changes, so this is the portable way to mark the
/// directory itself as fresh.
pub async fn touch_dir(path: &Utf8Path) -> Result<(), std::io::Error> {
    let placeholder = path.join(".tdb-touch");
    tokio::fs::write(&placeholder, b"").await?;
    tokio::fs::remove_file(&placeholder).await?;
    Ok(())
}

/// Convert a `std::path::Path` to a `Utf8PathBuf`, failing on non-UTF-8.
pub fn utf8_path(path: &std::path::Path) -> Result<Utf8PathBuf, std::io::Error> {
    Utf8PathBuf::from_path_buf(path.to_path_buf())
        .map_err(|p| std::io::Error::other(format!("non-UTF-8 path: {}", p.display())))
}
