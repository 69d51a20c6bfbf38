//! Raw output archive: every backend response is written to disk for audit.
//!
//! **Output structure**:
//! ```text
//! {archive_dir}/
//!   deepseek-chat_raw_output_20250114_093015_482113.txt
//!   claude-3-5-sonnet_raw_output_20250114_093122_007519.txt
//! ```
//!
//! Archiving is a side channel. Write failures are logged and swallowed;
//! they never change an analysis result.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::PathBuf;

use chrono::Local;

/// Sink for raw backend responses.
pub trait RawOutputSink: Send + Sync {
    /// Persist `raw` for `model`. Returns where it went, if anywhere.
    fn archive(&self, model: &str, raw: &str) -> Option<PathBuf>;
}

/// Writes one text file per response into a directory.
pub struct FileArchiver {
    dir: PathBuf,
}

/// Upper bound on same-timestamp collisions before giving up.
const MAX_COLLISION_SUFFIX: u32 = 100;

impl FileArchiver {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Archive into the configured directory (`COACHALIGN_ARCHIVE_DIR` or `./logs`).
    pub fn from_env() -> Self {
        Self::new(crate::config::archive_dir())
    }
}

/// Keep model identifiers like `qwen/qwen2:7b` usable as file name stems.
fn file_stem_for(model: &str) -> String {
    let stem: String = model
        .chars()
        .map(|c| {
            if c.is_alphanumeric() || matches!(c, '-' | '_' | '.') {
                c
            } else {
                '_'
            }
        })
        .collect();
    if stem.is_empty() {
        "unknown-model".to_string()
    } else {
        stem
    }
}

fn archive_file_name(model: &str, timestamp: &str, collision: u32) -> String {
    let stem = file_stem_for(model);
    if collision == 0 {
        format!("{stem}_raw_output_{timestamp}.txt")
    } else {
        format!("{stem}_raw_output_{timestamp}-{collision}.txt")
    }
}

impl RawOutputSink for FileArchiver {
    fn archive(&self, model: &str, raw: &str) -> Option<PathBuf> {
        if let Err(e) = std::fs::create_dir_all(&self.dir) {
            tracing::warn!(
                path = %self.dir.display(),
                error = %e,
                "Raw output archive: failed to create directory"
            );
            return None;
        }

        let timestamp = Local::now().format("%Y%m%d_%H%M%S_%6f").to_string();
        for collision in 0..MAX_COLLISION_SUFFIX {
            let path = self.dir.join(archive_file_name(model, &timestamp, collision));
            // create_new: never overwrite an earlier response.
            let file = OpenOptions::new().write(true).create_new(true).open(&path);
            match file {
                Ok(mut file) => {
                    return match file.write_all(raw.as_bytes()) {
                        Ok(()) => {
                            tracing::info!(path = %path.display(), "Raw output saved");
                            Some(path)
                        }
                        Err(e) => {
                            tracing::warn!(
                                path = %path.display(),
                                error = %e,
                                "Raw output archive: failed to write"
                            );
                            None
                        }
                    };
                }
                Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => continue,
                Err(e) => {
                    tracing::warn!(
                        path = %path.display(),
                        error = %e,
                        "Raw output archive: failed to create file"
                    );
                    return None;
                }
            }
        }

        tracing::warn!(model, "Raw output archive: too many files with the same timestamp");
        None
    }
}

/// Discards everything. For runs that must not touch the disk.
pub struct NullArchiver;

impl RawOutputSink for NullArchiver {
    fn archive(&self, _model: &str, _raw: &str) -> Option<PathBuf> {
        None
    }
}
