//! Per-session append-only audit log.
//!
//! One file per session transport instantiation, named by connection start
//! time: `<folder>/<YYYY-MM-DD_HH-MM-SS>.log`.  Lines are timestamped with
//! microsecond precision.  The file is opened append-only for every write
//! (no persistent handle held across writes), so the log can be shared
//! between the caller's thread and the transport worker without handing a
//! file handle across threads.
//!
//! The log is forensic: never truncated, never rewritten, not queryable.
//! Write failures are reported through tracing and otherwise swallowed;
//! a broken audit file must not take the session down.

use std::fmt::Display;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

pub struct SessionLog {
    path: PathBuf,
}

impl SessionLog {
    /// Create a log for a new session, creating `folder` if needed.
    ///
    /// The file itself is created lazily on first append.
    pub fn create(folder: &Path) -> std::io::Result<Self> {
        std::fs::create_dir_all(folder)?;
        let timestamp = chrono::Local::now().format("%Y-%m-%d_%H-%M-%S");
        let path = folder.join(format!("{timestamp}.log"));
        Ok(Self { path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one timestamped line: `<YYYY-MM-DD HH:MM:SS.ffffff> <msg>`.
    pub fn append(&self, msg: impl Display) {
        let timestamp = chrono::Local::now().format("%Y-%m-%d %H:%M:%S%.6f ");
        self.write_line(&format!("{timestamp}{msg}"));
    }

    fn write_line(&self, line: &str) {
        let result = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .and_then(|mut file| writeln!(file, "{line}"));
        if let Err(e) = result {
            tracing::warn!(error = %e, path = %self.path.display(), "audit log write failed");
        }
    }
}
