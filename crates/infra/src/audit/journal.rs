//! Append-only JSON Lines journal backing the audit ledger.

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use tracing::error;

use super::record::{AuditError, AuditEvent};

/// One JSON-encoded `AuditEvent` per line. Every append is flushed and
/// `fsync`ed before returning.
#[derive(Debug)]
pub struct Journal {
    path: PathBuf,
    file: Mutex<File>,
}

impl Journal {
    /// Open (creating if needed) and return the events already on disk.
    pub fn open(path: impl AsRef<Path>) -> Result<(Self, Vec<AuditEvent>), AuditError> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let existing = if path.exists() {
            read_events(&path)?
        } else {
            Vec::new()
        };

        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        Ok((
            Self {
                path,
                file: Mutex::new(file),
            },
            existing,
        ))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn append(&self, event: &AuditEvent) -> Result<(), AuditError> {
        let mut line = serde_json::to_vec(event)?;
        line.push(b'\n');

        let mut file = self
            .file
            .lock()
            .map_err(|_| AuditError::Storage("journal lock poisoned".to_string()))?;
        file.write_all(&line)?;
        file.flush()?;
        file.sync_data()?;
        Ok(())
    }
}

/// Reads every complete record. A final line without its newline is a write
/// torn by a crash: it was never acknowledged, so it is cut off the file.
fn read_events(path: &Path) -> Result<Vec<AuditEvent>, AuditError> {
    let raw = std::fs::read(path)?;
    let mut events = Vec::new();
    let mut offset = 0usize;
    for chunk in raw.split_inclusive(|b| *b == b'\n') {
        let complete = chunk.ends_with(b"\n");
        let line = chunk.trim_ascii();
        if !line.is_empty() {
            match serde_json::from_slice::<AuditEvent>(line) {
                Ok(event) => events.push(event),
                Err(err) if !complete => {
                    error!(
                        path = %path.display(),
                        offset,
                        bytes = chunk.len(),
                        error = %err,
                        "discarding torn final journal record"
                    );
                    let file = OpenOptions::new().write(true).open(path)?;
                    file.set_len(offset as u64)?;
                    file.sync_all()?;
                    break;
                }
                Err(err) => return Err(err.into()),
            }
        }
        offset += chunk.len();
    }
    Ok(events)
}
