use std::{
    fs::{self, File, OpenOptions},
    io::Write,
    path::{Path, PathBuf},
};

use once_cell::sync::Lazy;

use crate::{abort, error::AuditError};

const LOG_DIR_NAME: &str = "ftp_checker";

static LOG_DIR: Lazy<PathBuf> = Lazy::new(|| {
    let dir = PathBuf::from(LOG_DIR_NAME);

    fs::create_dir_all(&dir)
        .unwrap_or_else(|e| abort(AuditError::LogDirFailed(LOG_DIR_NAME.into(), e)));

    log::debug!("Writing host logs under `{}`", dir.display());

    dir
});

fn file_name(host: &str) -> String {
    // Target strings come straight from operator input; keep them from
    // escaping the log directory.
    let safe: String = host
        .chars()
        .map(|c| if matches!(c, '/' | '\\') { '_' } else { c })
        .collect();

    format!("{}_ftp_checker.txt", safe)
}

/// Append-only log owned by exactly one host's scan. Every line is
/// flushed as it is written so partial results survive an interrupted
/// run, and per-host file ownership keeps logs from interleaving.
pub struct HostLog {
    file: File,
}

impl HostLog {
    pub fn create(host: &str) -> Result<Self, AuditError> {
        Self::create_in(&LOG_DIR, host)
    }

    pub(crate) fn create_in(dir: &Path, host: &str) -> Result<Self, AuditError> {
        let path = dir.join(file_name(host));
        let file = OpenOptions::new()
            .append(true)
            .create(true)
            .open(&path)
            .map_err(|e| AuditError::LogFileFailed(path.display().to_string(), e))?;

        Ok(Self { file })
    }

    /// Surfaces the message live on the console and durably in the log.
    pub fn record(&mut self, message: &str) {
        println!("{}", message);

        if let Err(e) = writeln!(self.file, "{}", message).and_then(|_| self.file.flush()) {
            log::debug!("Failed to append to host log: {}", e);
        }
    }
}
