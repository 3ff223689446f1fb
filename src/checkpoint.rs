use std::io;
use std::path::{Path, PathBuf};

use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};

/// Durable byte offset marking how far a candidate source has been tested.
///
/// Stored as a single decimal integer. Saves go to a sibling `.tmp` file
/// which is synced and then renamed over the record, so a power cut during
/// a save leaves the previous value intact.
#[derive(Debug, Clone)]
pub struct CheckpointStore {
    path: PathBuf,
}

impl CheckpointStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the saved offset, or `0` if there is none or it cannot be parsed.
    pub async fn load(&self) -> u64 {
        match fs::read_to_string(&self.path).await {
            Ok(content) => match parse_offset(&content) {
                Some(offset) => {
                    debug!(offset, path = %self.path.display(), "loaded checkpoint");
                    offset
                }
                None => {
                    warn!(path = %self.path.display(), "malformed checkpoint, starting from 0");
                    0
                }
            },
            Err(e) if e.kind() == io::ErrorKind::NotFound => 0,
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "unreadable checkpoint, starting from 0");
                0
            }
        }
    }

    /// Atomically replace the saved offset.
    pub async fn save(&self, offset: u64) -> io::Result<()> {
        let tmp = self.tmp_path();
        let mut file = fs::File::create(&tmp).await?;
        file.write_all(format!("{offset}\n").as_bytes()).await?;
        file.flush().await?;
        file.sync_all().await?;
        drop(file);
        fs::rename(&tmp, &self.path).await?;
        #[cfg(unix)]
        fs::File::open(self.record_dir()).await?.sync_all().await?;
        debug!(offset, path = %self.path.display(), "saved checkpoint");
        Ok(())
    }

    /// Directory holding the record, whose entry the rename replaced.
    fn record_dir(&self) -> &Path {
        match self.path.parent() {
            Some(dir) if !dir.as_os_str().is_empty() => dir,
            _ => Path::new("."),
        }
    }

    fn tmp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_else(|| "checkpoint".into());
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

/// Leading decimal integer of the record; trailing text is ignored.
fn parse_offset(content: &str) -> Option<u64> {
    let s = content.trim_start();
    let end = s
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(s.len());
    s[..end].parse().ok()
}
