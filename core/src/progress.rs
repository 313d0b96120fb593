//! Byte-count progress reporting for uploads and downloads.

use std::io::{self, Read};
use std::sync::Arc;

use serde::Serialize;

/// One progress report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Progress {
    /// Bytes moved since the previous report.
    pub bytes: u64,
    /// Bytes moved so far.
    pub total_bytes: u64,
    /// Declared size of the transfer, when known.
    pub total_expected: Option<u64>,
}

pub type ProgressCallback = Arc<dyn Fn(Progress) + Send + Sync>;

/// Wraps a reader and reports every non-empty read.
///
/// When the total is known the inner reader is limited to it, so
/// `total_bytes` never exceeds `total_expected`.
pub struct ProgressReader<R> {
    inner: io::Take<R>,
    total_bytes: u64,
    total_expected: Option<u64>,
    callback: Option<ProgressCallback>,
}

impl<R: Read> ProgressReader<R> {
    pub fn new(inner: R, total_expected: Option<u64>, callback: Option<ProgressCallback>) -> Self {
        Self {
            inner: inner.take(total_expected.unwrap_or(u64::MAX)),
            total_bytes: 0,
            total_expected,
            callback,
        }
    }

    pub fn total_bytes(&self) -> u64 {
        self.total_bytes
    }
}

impl<R: Read> Read for ProgressReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.inner.read(buf)?;
        if n > 0 {
            self.total_bytes += n as u64;
            if let Some(callback) = &self.callback {
                callback(Progress {
                    bytes: n as u64,
                    total_bytes: self.total_bytes,
                    total_expected: self.total_expected,
                });
            }
        }
        Ok(n)
    }
}
