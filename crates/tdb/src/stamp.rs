//! The freshness oracle: modification stamps and how to read them.
//!
//! A [`Stamp`] is the mtime lattice the whole engine compares against:
//! `Never` (the artifact does not exist), a finite timestamp, or `Always`
//! (phony success, newer than everything). The derived ordering gives
//! `Never < At(_) < Always`, with finite stamps ordered by time.

use camino::Utf8Path;
use futures_util::future::BoxFuture;
use jiff::Timestamp;

/// Effective modification time of a target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Stamp {
    /// The artifact does not exist / the target has never been built.
    Never,
    /// A finite modification time.
    At(Timestamp),
    /// Newer than everything; reported by phony targets on success.
    Always,
}

impl Stamp {
    /// Read a stamp from filesystem metadata.
    pub fn from_metadata(metadata: &std::fs::Metadata) -> std::io::Result<Stamp> {
        let modified = metadata.modified()?;
        let timestamp = Timestamp::try_from(modified).map_err(std::io::Error::other)?;
        Ok(Stamp::At(timestamp))
    }
}

impl std::fmt::Display for Stamp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Stamp::Never => write!(f, "never"),
            Stamp::At(timestamp) => write!(f, "{timestamp}"),
            Stamp::Always => write!(f, "always"),
        }
    }
}

/// Pluggable alternate timestamp source.
///
/// When configured on a builder, this is consulted before the filesystem
/// for every target. Returning `Ok(None)` falls through to the regular
/// filesystem oracle; returning a stamp replaces it entirely. This is the
/// hook for sidecar-timestamp schemes, or for tests that want to pretend
/// a file is older or newer than it really is.
pub trait StampSource: Send + Sync {
    fn probe<'a>(&'a self, path: &'a Utf8Path) -> BoxFuture<'a, std::io::Result<Option<Stamp>>>;
}

/// Compute the effective stamp of `path`, recursing into directories.
///
/// - Missing path: returns `on_absent` when given, otherwise the
///   not-found error propagates.
/// - Regular file or symlink: its own mtime.
/// - Directory: the max of its own mtime and every descendant's,
///   short-circuiting to [`Stamp::Always`] once the running max exceeds
///   `cutoff` (pass `Stamp::Always` to disable the short circuit).
pub async fn tree_stamp(
    path: &Utf8Path,
    on_absent: Option<Stamp>,
    cutoff: Stamp,
) -> std::io::Result<Stamp> {
    match walk(path, cutoff).await {
        Ok(stamp) => Ok(stamp),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => match on_absent {
            Some(stamp) => Ok(stamp),
            None => Err(e),
        },
        Err(e) => Err(e),
    }
}

fn walk<'a>(path: &'a Utf8Path, cutoff: Stamp) -> BoxFuture<'a, std::io::Result<Stamp>> {
    Box::pin(async move {
        let metadata = tokio::fs::symlink_metadata(path).await?;
        let own = Stamp::from_metadata(&metadata)?;

        if !metadata.is_dir() {
            return Ok(own);
        }

        let mut max = own;
        if max > cutoff {
            return Ok(Stamp::Always);
        }

        let mut entries = tokio::fs::read_dir(path).await?;
        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name();
            // read_dir should never yield these, but be defensive
            if name == "." || name == ".." {
                continue;
            }
            let name = name.to_str().ok_or_else(|| {
                std::io::Error::other(format!("non-UTF-8 file name under {path}"))
            })?;

            let child = walk(&path.join(name), cutoff).await?;
            max = max.max(child);
            if max > cutoff {
                return Ok(Stamp::Always);
            }
        }

        Ok(max)
    })
}
