//! Test harness for tdb integration tests
//!
//! Provides an isolated temp-directory environment with explicit mtime
//! control, a capturing logger, and a sidecar-file stamp source used to
//! exercise the pluggable freshness oracle.

#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use camino::{Utf8Path, Utf8PathBuf};
use futures_util::future::BoxFuture;
use tempfile::TempDir;
use tdb::{Logger, Stamp, StampSource};

/// An isolated build environment rooted in a temp directory.
///
/// Target names handed to the engine are absolute paths inside the
/// root, so tests never depend on the working directory.
pub struct TestEnv {
    _tmp: TempDir,
    pub root: Utf8PathBuf,
}

impl TestEnv {
    pub fn new() -> Self {
        let tmp = TempDir::new().expect("failed to create temp dir");
        let root = Utf8PathBuf::from_path_buf(tmp.path().to_path_buf())
            .expect("temp dir path should be UTF-8");
        Self { _tmp: tmp, root }
    }

    /// Absolute target name for a path inside the environment.
    pub fn target(&self, relative: &str) -> String {
        self.root.join(relative).into_string()
    }

    pub fn path(&self, relative: &str) -> Utf8PathBuf {
        self.root.join(relative)
    }

    pub fn write_file(&self, relative: &str, contents: &str) {
        let path = self.path(relative);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).expect("failed to create parent dirs");
        }
        std::fs::write(&path, contents).expect("failed to write file");
    }

    pub fn read_file(&self, relative: &str) -> String {
        std::fs::read_to_string(self.path(relative)).expect("failed to read file")
    }

    pub fn exists(&self, relative: &str) -> bool {
        self.path(relative).exists()
    }

    /// Pin a file's mtime to `millis` since the epoch.
    pub fn set_mtime(&self, relative: &str, millis: i64) {
        let file = std::fs::OpenOptions::new()
            .write(true)
            .open(self.path(relative))
            .expect("failed to open file for mtime update");
        let time = std::time::UNIX_EPOCH + std::time::Duration::from_millis(millis as u64);
        file.set_times(std::fs::FileTimes::new().set_modified(time))
            .expect("failed to set mtime");
    }

    /// Write the sidecar timestamp consulted by [`SidecarStamps`].
    pub fn set_sidecar(&self, relative: &str, millis: i64) {
        let path = self.path(relative);
        let name = path.file_name().expect("sidecar target needs a file name");
        let sidecar = path
            .parent()
            .expect("sidecar target needs a parent")
            .join(format!(".{name}.mtime"));
        std::fs::write(sidecar, millis.to_string()).expect("failed to write sidecar");
    }
}

/// Finite stamp at `millis` since the epoch.
pub fn at(millis: i64) -> Stamp {
    Stamp::At(jiff::Timestamp::from_millisecond(millis).expect("valid millisecond timestamp"))
}

/// Logger that records everything for later assertions.
#[derive(Default)]
pub struct CaptureLogger {
    lines: Mutex<Vec<String>>,
}

impl CaptureLogger {
    pub fn shared() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn lines(&self) -> Vec<String> {
        self.lines.lock().unwrap().clone()
    }

    pub fn contains(&self, needle: &str) -> bool {
        self.lines().iter().any(|line| line.contains(needle))
    }
}

impl Logger for CaptureLogger {
    fn error(&self, message: &str) {
        self.lines.lock().unwrap().push(format!("error: {message}"));
    }

    fn warn(&self, message: &str) {
        self.lines.lock().unwrap().push(format!("warn: {message}"));
    }

    fn log(&self, message: &str) {
        self.lines.lock().unwrap().push(format!("log: {message}"));
    }
}

/// Alternate stamp source reading `.{name}.mtime` sidecar files: the
/// sidecar holds milliseconds since the epoch. Targets without a
/// sidecar fall through to the filesystem oracle.
pub struct SidecarStamps;

impl StampSource for SidecarStamps {
    fn probe<'a>(&'a self, path: &'a Utf8Path) -> BoxFuture<'a, std::io::Result<Option<Stamp>>> {
        Box::pin(async move {
            let Some(name) = path.file_name() else {
                return Ok(None);
            };
            let Some(parent) = path.parent() else {
                return Ok(None);
            };
            let sidecar = parent.join(format!(".{name}.mtime"));

            let contents = match tokio::fs::read_to_string(&sidecar).await {
                Ok(contents) => contents,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
                Err(e) => return Err(e),
            };
            let millis: i64 = contents.trim().parse().map_err(std::io::Error::other)?;
            let timestamp =
                jiff::Timestamp::from_millisecond(millis).map_err(std::io::Error::other)?;
            Ok(Some(Stamp::At(timestamp)))
        })
    }
}

/// Route engine diagnostics to stderr when a test is run with
/// `RUST_LOG` set; safe to call from every test.
pub fn init_tracing() {
    use tracing_subscriber::EnvFilter;

    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}
