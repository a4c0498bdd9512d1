//! Rotation-tolerant follower of a growing log file.
//!
//! Starts at end of file and yields complete lines as they are appended.
//! At EOF it sleeps until the parent directory reports a change or the poll
//! interval elapses, whichever comes first. Truncation (`copytruncate`) and
//! replacement (rename + recreate) both restart reading at offset zero of
//! the file now at the path.

use std::collections::VecDeque;
use std::io::{self, SeekFrom};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use notify::{RecommendedWatcher, RecursiveMode, Watcher};
use thiserror::Error;
use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tokio::sync::Notify;
use tokio::time::{Interval, MissedTickBehavior};
use tracing::{debug, info, warn};

const READ_CHUNK: usize = 8 * 1024;

#[derive(Debug, Error)]
pub enum TailError {
    #[error("cannot open log file {path}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("I/O error while following {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Device + inode pair; `None` where the platform has no such notion.
type FileId = Option<(u64, u64)>;

#[cfg(unix)]
fn file_id(meta: &std::fs::Metadata) -> FileId {
    use std::os::unix::fs::MetadataExt;
    Some((meta.dev(), meta.ino()))
}

#[cfg(not(unix))]
fn file_id(_meta: &std::fs::Metadata) -> FileId {
    None
}

pub struct TailSource {
    path: PathBuf,
    file: File,
    id: FileId,
    offset: u64,
    partial: Vec<u8>,
    ready: VecDeque<String>,
    wake: Arc<Notify>,
    poll: Interval,
    _watcher: Option<RecommendedWatcher>,
}

impl TailSource {
    /// Open `path` and position at its current end.
    ///
    /// Fails when the file cannot be opened. A filesystem watcher that
    /// cannot be installed only degrades the follower to polling.
    pub async fn open(path: impl AsRef<Path>, poll_interval: Duration) -> Result<Self, TailError> {
        let path = path.as_ref().to_path_buf();
        let open_err = |source| TailError::Open {
            path: path.clone(),
            source,
        };

        let mut file = File::open(&path).await.map_err(open_err)?;
        let meta = file.metadata().await.map_err(open_err)?;
        let offset = meta.len();
        file.seek(SeekFrom::Start(offset)).await.map_err(open_err)?;

        let wake = Arc::new(Notify::new());
        let watcher = match watch_parent(&path, Arc::clone(&wake)) {
            Ok(w) => Some(w),
            Err(e) => {
                warn!(
                    path = %path.display(),
                    error = %e,
                    "filesystem watcher unavailable, polling only"
                );
                None
            }
        };

        let mut poll = tokio::time::interval(poll_interval.max(Duration::from_millis(1)));
        poll.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!(path = %path.display(), offset, "following log file");

        Ok(Self {
            path,
            file,
            id: file_id(&meta),
            offset,
            partial: Vec::new(),
            ready: VecDeque::new(),
            wake,
            poll,
            _watcher: watcher,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Next complete, non-empty line. Waits as long as needed; cancel it by
    /// dropping the future (e.g. from a `tokio::select!` branch).
    pub async fn next_line(&mut self) -> Result<String, TailError> {
        loop {
            if let Some(line) = self.ready.pop_front() {
                return Ok(line);
            }
            if self.fill().await? > 0 {
                continue;
            }
            if self.check_replaced().await? {
                continue;
            }
            tokio::select! {
                _ = self.wake.notified() => {}
                _ = self.poll.tick() => {}
            }
        }
    }

    /// Read until at least one complete line is buffered or EOF. Returns
    /// the number of bytes read.
    ///
    /// At most one chunk of lines is buffered at a time, however far behind
    /// the writer the follower is.
    async fn fill(&mut self) -> Result<usize, TailError> {
        let mut buf = vec![0u8; READ_CHUNK];
        let mut total = 0;
        while self.ready.is_empty() {
            let n = self.file.read(&mut buf).await.map_err(|e| self.io_err(e))?;
            if n == 0 {
                break;
            }
            total += n;
            self.offset += n as u64;
            self.split_lines(&buf[..n]);
        }
        Ok(total)
    }

    fn split_lines(&mut self, chunk: &[u8]) {
        let mut rest = chunk;
        while let Some(pos) = rest.iter().position(|&b| b == b'\n') {
            self.partial.extend_from_slice(&rest[..pos]);
            self.push_partial();
            rest = &rest[pos + 1..];
        }
        self.partial.extend_from_slice(rest);
    }

    fn push_partial(&mut self) {
        let raw = std::mem::take(&mut self.partial);
        let line = String::from_utf8_lossy(&raw);
        let line = line.trim_end_matches('\r');
        if !line.trim().is_empty() {
            self.ready.push_back(line.to_string());
        }
    }

    /// Detect truncation or replacement of the file at `path` and reopen
    /// from the start. Returns true when the read position was reset.
    async fn check_replaced(&mut self) -> Result<bool, TailError> {
        let meta = match tokio::fs::metadata(&self.path).await {
            Ok(meta) => meta,
            // Moved away and not recreated yet: keep the old handle.
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(false),
            Err(e) => return Err(self.io_err(e)),
        };

        let id = file_id(&meta);
        if id != self.id {
            let file = match File::open(&self.path).await {
                Ok(f) => f,
                Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(false),
                Err(e) => return Err(self.io_err(e)),
            };
            // Lines the old writer appended after our last read.
            if self.fill().await? > 0 {
                return Ok(true);
            }
            if !self.partial.is_empty() {
                // The old writer is gone, so its unterminated tail is final.
                self.push_partial();
            }
            info!(path = %self.path.display(), "log file replaced, reading new file from start");
            self.file = file;
            self.id = id;
            self.offset = 0;
            return Ok(true);
        }

        if meta.len() < self.offset {
            info!(
                path = %self.path.display(),
                was = self.offset,
                now = meta.len(),
                "log file truncated, reading from start"
            );
            self.file
                .seek(SeekFrom::Start(0))
                .await
                .map_err(|e| self.io_err(e))?;
            self.offset = 0;
            self.partial.clear();
            return Ok(true);
        }

        Ok(false)
    }

    fn io_err(&self, source: io::Error) -> TailError {
        TailError::Io {
            path: self.path.clone(),
            source,
        }
    }
}

impl std::fmt::Debug for TailSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TailSource")
            .field("path", &self.path)
            .field("offset", &self.offset)
            .field("buffered", &self.ready.len())
            .finish()
    }
}

/// Watch the directory holding `path` so rotation (which replaces the
/// directory entry) is seen as well as appends.
fn watch_parent(path: &Path, wake: Arc<Notify>) -> notify::Result<RecommendedWatcher> {
    let dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    };
    let name = path.file_name().map(|n| n.to_os_string());

    let mut watcher =
        notify::recommended_watcher(move |res: notify::Result<notify::Event>| match res {
            Ok(event) => {
                let ours = event
                    .paths
                    .iter()
                    .any(|p| p.file_name().map(|n| n.to_os_string()) == name);
                if ours {
                    wake.notify_one();
                }
            }
            Err(e) => debug!(error = %e, "filesystem watcher error"),
        })?;
    watcher.watch(&dir, RecursiveMode::NonRecursive)?;
    Ok(watcher)
}
