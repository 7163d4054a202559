use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use crate::call_id::CallId;

/// Append-only `<log_dir>/<call_id>.log`.
#[derive(Debug, Clone)]
pub struct CallLog {
    path: PathBuf,
}

impl CallLog {
    /// Creates (or truncates) the log file for a call.
    pub fn create(log_dir: &Path, call_id: &CallId) -> io::Result<Self> {
        fs::create_dir_all(log_dir)?;
        let path = log_dir.join(format!("{}.log", call_id));
        fs::File::create(&path)?;
        Ok(Self { path })
    }

    /// The log for a call whose file may already exist; nothing is truncated.
    pub fn open(log_dir: &Path, call_id: &CallId) -> io::Result<Self> {
        fs::create_dir_all(log_dir)?;
        Ok(Self {
            path: log_dir.join(format!("{}.log", call_id)),
        })
    }

    pub fn append(&self, msg: &str) -> io::Result<()> {
        let mut file = OpenOptions::new().append(true).create(true).open(&self.path)?;
        write!(file, "\n{}\n", msg)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}
