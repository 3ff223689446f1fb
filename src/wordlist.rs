use std::io::SeekFrom;
use std::path::{Path, PathBuf};

use tokio::fs::File;
use tokio::io::{AsyncBufReadExt, AsyncSeekExt, BufReader};
use tracing::warn;

use crate::error::SearchError;

/// Lines longer than this are consumed but never tested.
pub const MAX_LINE_BYTES: usize = 4096;

/// One line pulled from the candidate source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    /// Read order, starting at 0 for the first line after the seek point.
    pub ticket: u64,
    /// Trimmed text; empty for blank or overlong lines.
    pub text: String,
    /// Bytes this line occupies in the file, terminator included.
    pub bytes: u64,
    /// File offset just past this line.
    pub end: u64,
}

impl Candidate {
    /// Blank and overlong lines are accounted for but skip the radio.
    pub fn is_testable(&self) -> bool {
        !self.text.is_empty()
    }
}

/// Sequential reader over a newline-delimited candidate file.
///
/// - Seeks once before iteration; every yielded line reports its exact byte
///   length so callers can map completed work back to a file offset.
/// - Reads through a fixed-size line buffer to keep memory bounded.
/// - End-of-source is `Ok(None)`; a failed read is `SourceUnavailable`.
#[derive(Debug)]
pub struct WordlistReader {
    path: PathBuf,
    inner: BufReader<File>,
    len: u64,
    offset: u64,
    issued: u64,
    line: Vec<u8>,
}

impl WordlistReader {
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, SearchError> {
        let path = path.as_ref().to_path_buf();
        let file = File::open(&path)
            .await
            .map_err(|e| SearchError::source_unavailable(&path, e))?;
        let len = file
            .metadata()
            .await
            .map_err(|e| SearchError::source_unavailable(&path, e))?
            .len();
        Ok(Self {
            path,
            inner: BufReader::new(file),
            len,
            offset: 0,
            issued: 0,
            line: Vec::with_capacity(128),
        })
    }

    /// Total size of the source in bytes, fixed when opened.
    pub fn len(&self) -> u64 {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Offset just past the last line handed out.
    pub fn offset(&self) -> u64 {
        self.offset
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Position the reader before the first `next_candidate` call.
    ///
    /// An offset beyond the end means the file was swapped for a shorter
    /// one, so the old position is meaningless and reading starts over.
    /// Returns the offset actually used.
    pub async fn seek(&mut self, offset: u64) -> Result<u64, SearchError> {
        let offset = if offset > self.len {
            warn!(
                offset,
                len = self.len,
                path = %self.path.display(),
                "checkpoint lies past end of wordlist; starting from the beginning"
            );
            0
        } else {
            offset
        };
        self.inner
            .seek(SeekFrom::Start(offset))
            .await
            .map_err(|e| SearchError::source_unavailable(&self.path, e))?;
        self.offset = offset;
        Ok(offset)
    }

    /// Pull the next line, or `None` at end-of-source.
    pub async fn next_candidate(&mut self) -> Result<Option<Candidate>, SearchError> {
        self.line.clear();
        let mut consumed = 0usize;
        let mut overlong = false;

        loop {
            let available = self
                .inner
                .fill_buf()
                .await
                .map_err(|e| SearchError::source_unavailable(&self.path, e))?;
            if available.is_empty() {
                break;
            }
            let (take, done) = match available.iter().position(|&b| b == b'\n') {
                Some(i) => (i + 1, true),
                None => (available.len(), false),
            };
            let room = MAX_LINE_BYTES + 1 - self.line.len();
            if take > room {
                overlong = true;
            }
            self.line.extend_from_slice(&available[..take.min(room)]);
            self.inner.consume(take);
            consumed += take;
            if done {
                break;
            }
        }

        if consumed == 0 {
            return Ok(None);
        }

        let content = self.line.strip_suffix(b"\n").unwrap_or(&self.line);
        let text = if overlong || content.len() > MAX_LINE_BYTES {
            String::new()
        } else {
            String::from_utf8_lossy(content).trim().to_string()
        };
        self.offset += consumed as u64;
        let ticket = self.issued;
        self.issued += 1;

        Ok(Some(Candidate {
            ticket,
            text,
            bytes: consumed as u64,
            end: self.offset,
        }))
    }
}
