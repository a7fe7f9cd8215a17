//! Source traits and the chunked transfer pump.

pub mod file;
#[cfg(feature = "http")]
pub mod http;
pub mod memory;

use std::io;
use std::path::PathBuf;

pub use file::FileSource;
#[cfg(feature = "http")]
pub use http::HttpSource;
pub use memory::{MemoryProvider, MemorySource};

/// Result of one chunked read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChunkRead {
    /// No bytes available yet; the caller should yield and retry.
    Pending,
    /// `n` bytes were written to the front of the buffer.
    Chunk(usize),
    /// The source is exhausted.
    Eof,
}

/// A pull-based byte stream with an opportunistic size hint.
///
/// Sources never block longer than one underlying read; CPU-bound callers
/// interleave `read_chunk` calls with budget checks so a large transfer
/// cannot stall the host loop.
pub trait ByteSource {
    /// Total size in bytes, if cheaply knowable (filesystem stat, a
    /// `Content-Length` header). `None` is normal and never an error.
    fn total_size(&mut self) -> Option<u64> {
        None
    }

    fn read_chunk(&mut self, buf: &mut [u8]) -> io::Result<ChunkRead>;
}

/// Byte-level progress of one transfer. `total` degrades to 0 when the
/// source cannot report a size; `received` is monotonically increasing.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TransferProgress {
    pub received: u64,
    pub total: u64,
}

const PUMP_CHUNK: usize = 64 * 1024;

/// Accumulates a [`ByteSource`] into memory one chunk at a time.
pub struct ChunkPump {
    source: Box<dyn ByteSource>,
    bytes: Vec<u8>,
    scratch: Vec<u8>,
    total: u64,
    eof: bool,
}

impl ChunkPump {
    pub fn new(mut source: Box<dyn ByteSource>) -> Self {
        let total = source.total_size().unwrap_or(0);
        Self {
            source,
            bytes: Vec::new(),
            scratch: vec![0; PUMP_CHUNK],
            total,
            eof: false,
        }
    }

    /// Pulls at most one chunk. Returns `true` once the source is drained.
    pub fn pump(&mut self) -> io::Result<bool> {
        if self.eof {
            return Ok(true);
        }
        match self.source.read_chunk(&mut self.scratch)? {
            ChunkRead::Pending => Ok(false),
            ChunkRead::Chunk(n) => {
                self.bytes.extend_from_slice(&self.scratch[..n]);
                Ok(false)
            }
            ChunkRead::Eof => {
                self.eof = true;
                Ok(true)
            }
        }
    }

    pub fn is_done(&self) -> bool {
        self.eof
    }

    pub fn progress(&self) -> TransferProgress {
        TransferProgress {
            received: self.bytes.len() as u64,
            total: self.total,
        }
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }
}

/// A fetchable location produced by URI resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Endpoint {
    Path(PathBuf),
    Url(String),
}

/// Opens concrete sources for endpoints. Implemented by the platform
/// defaults and by in-memory doubles in tests.
pub trait SourceProvider {
    fn open(&self, endpoint: &Endpoint) -> io::Result<Box<dyn ByteSource>>;
}

/// Platform provider: local files always; HTTP(S) URLs when the `http`
/// feature is enabled.
#[derive(Debug, Default)]
pub struct DefaultProvider;

impl SourceProvider for DefaultProvider {
    fn open(&self, endpoint: &Endpoint) -> io::Result<Box<dyn ByteSource>> {
        match endpoint {
            Endpoint::Path(path) => Ok(Box::new(FileSource::open(path)?)),
            #[cfg(feature = "http")]
            Endpoint::Url(url) => Ok(Box::new(HttpSource::get(url)?)),
            #[cfg(not(feature = "http"))]
            Endpoint::Url(url) => Err(io::Error::new(
                io::ErrorKind::Unsupported,
                format!("remote source {url} requires the `http` feature"),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pump_accumulates_and_reports_monotone_progress() {
        let source = MemorySource::new(vec![7u8; 100_000]);
        let mut pump = ChunkPump::new(Box::new(source));
        assert_eq!(pump.progress().total, 100_000);

        let mut last = 0;
        while !pump.pump().unwrap() {
            let progress = pump.progress();
            assert!(progress.received >= last);
            last = progress.received;
        }
        assert_eq!(pump.progress().received, 100_000);
        assert_eq!(pump.into_bytes().len(), 100_000);
    }

    #[test]
    fn unknown_total_degrades_to_zero() {
        struct Opaque(MemorySource);
        impl ByteSource for Opaque {
            fn read_chunk(&mut self, buf: &mut [u8]) -> io::Result<ChunkRead> {
                self.0.read_chunk(buf)
            }
        }
        let mut pump = ChunkPump::new(Box::new(Opaque(MemorySource::new(vec![1, 2, 3]))));
        assert_eq!(pump.progress().total, 0);
        while !pump.pump().unwrap() {}
        assert_eq!(pump.into_bytes(), [1, 2, 3]);
    }
}
