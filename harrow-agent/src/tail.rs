//! Log tail streamer
//!
//! Follows a growing text file the way `tail -n 500 -f` does: the last
//! `backlog_lines` complete lines first, then every line appended afterwards,
//! in order and exactly once. A trailing line without its `\n` is held back
//! until it is complete. The file is polled; there is no end of stream other
//! than the subscriber dropping it.

use futures_util::Stream;
use futures_util::stream;
use std::collections::VecDeque;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::fs::File;
use tokio::io::AsyncReadExt;

use crate::config::Config;

#[derive(Debug, Clone, Copy)]
pub struct TailOptions {
    /// Maximum history lines emitted on attach
    pub backlog_lines: usize,
    /// Sleep between reads that found no new data
    pub poll_interval: Duration,
}

impl From<&Config> for TailOptions {
    fn from(config: &Config) -> Self {
        Self {
            backlog_lines: config.log_backlog_lines,
            poll_interval: config.log_poll_interval,
        }
    }
}

impl Default for TailOptions {
    fn default() -> Self {
        Self {
            backlog_lines: 500,
            poll_interval: Duration::from_millis(200),
        }
    }
}

/// An open log file being followed
pub struct LogTail {
    file: File,
    /// Bytes read past the last complete line
    partial: Vec<u8>,
    pending: VecDeque<String>,
    poll_interval: Duration,
}

impl LogTail {
    /// Opens the file and queues the backlog
    pub async fn open(path: &Path, options: TailOptions) -> io::Result<Self> {
        let mut file = File::open(path).await?;
        let mut partial = Vec::new();
        file.read_to_end(&mut partial).await?;

        let mut tail = Self {
            file,
            partial,
            pending: VecDeque::new(),
            poll_interval: options.poll_interval,
        };
        tail.split_lines();

        let excess = tail.pending.len().saturating_sub(options.backlog_lines);
        tail.pending.drain(..excess);

        Ok(tail)
    }

    /// Next line, waiting for it to be written if necessary
    pub async fn next_line(&mut self) -> io::Result<String> {
        let mut chunk = [0u8; 8192];
        loop {
            if let Some(line) = self.pending.pop_front() {
                return Ok(line);
            }

            let n = self.file.read(&mut chunk).await?;
            if n == 0 {
                tokio::time::sleep(self.poll_interval).await;
                continue;
            }
            self.partial.extend_from_slice(&chunk[..n]);
            self.split_lines();
        }
    }

    fn split_lines(&mut self) {
        while let Some(pos) = self.partial.iter().position(|&b| b == b'\n') {
            let raw: Vec<u8> = self.partial.drain(..=pos).collect();
            self.pending.push_back(clean_line(&raw));
        }
    }
}

fn clean_line(raw: &[u8]) -> String {
    String::from_utf8_lossy(raw)
        .trim_end_matches(['\n', '\r', ' ', '\t'])
        .to_string()
}

enum Cursor {
    Start(PathBuf, TailOptions),
    Open(Box<LogTail>),
    Closed,
}

/// Follows `path` as a stream of lines.
///
/// If the file cannot be opened or read the stream yields that error once
/// and ends.
pub fn follow(path: PathBuf, options: TailOptions) -> impl Stream<Item = io::Result<String>> + Send {
    stream::unfold(Cursor::Start(path, options), |cursor| async move {
        let mut tail = match cursor {
            Cursor::Start(path, options) => match LogTail::open(&path, options).await {
                Ok(tail) => Box::new(tail),
                Err(e) => return Some((Err(e), Cursor::Closed)),
            },
            Cursor::Open(tail) => tail,
            Cursor::Closed => return None,
        };

        match tail.next_line().await {
            Ok(line) => Some((Ok(line), Cursor::Open(tail))),
            Err(e) => Some((Err(e), Cursor::Closed)),
        }
    })
}
