//! Debug persistence of the last raw stream message

use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};
use tokio::sync::watch;

/// Write-only store for raw messages
pub trait MessageSink {
    fn store(&mut self, raw: &str);
}

/// Keeps the most recent message in a file, overwriting the previous one.
///
/// Writes happen on a background task. Messages that arrive while a write is
/// in progress collapse into the newest one.
pub struct LastMessageFile {
    latest: watch::Sender<String>,
}

impl LastMessageFile {
    /// Spawns the writer task, so this has to run inside the tokio runtime
    pub fn new(path: PathBuf) -> Self {
        let (latest, rx) = watch::channel(String::new());
        tokio::spawn(write_latest(path, rx));
        Self { latest }
    }

    /// Read back the persisted message, if there is one
    pub fn load(path: &Path) -> Result<Option<String>> {
        if !path.exists() {
            return Ok(None);
        }
        let raw = fs::read_to_string(path).context("Failed to read last message file")?;
        Ok(Some(raw))
    }
}

impl MessageSink for LastMessageFile {
    fn store(&mut self, raw: &str) {
        self.latest.send_replace(raw.to_string());
    }
}

/// Runs until the sink is dropped, flushing the final message first
async fn write_latest(path: PathBuf, mut latest: watch::Receiver<String>) {
    let mut warned = false;

    while latest.changed().await.is_ok() {
        let raw = latest.borrow_and_update().clone();
        if let Err(e) = tokio::fs::write(&path, raw).await {
            if !warned {
                tracing::warn!("Failed to persist last message to {:?}: {}", path, e);
                warned = true;
            }
        }
    }

    tracing::debug!("Last message writer stopped");
}
