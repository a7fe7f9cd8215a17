//! In-memory sources, primarily intended for unit tests.

use std::collections::HashMap;
use std::io;

use crate::{ByteSource, ChunkRead, Endpoint, SourceProvider};

/// A [`ByteSource`] over an owned byte vector.
pub struct MemorySource {
    bytes: Vec<u8>,
    offset: usize,
}

impl MemorySource {
    pub fn new(bytes: Vec<u8>) -> Self {
        Self { bytes, offset: 0 }
    }
}

impl ByteSource for MemorySource {
    fn total_size(&mut self) -> Option<u64> {
        Some(self.bytes.len() as u64)
    }

    fn read_chunk(&mut self, buf: &mut [u8]) -> io::Result<ChunkRead> {
        let remaining = &self.bytes[self.offset..];
        if remaining.is_empty() {
            return Ok(ChunkRead::Eof);
        }
        let n = remaining.len().min(buf.len());
        buf[..n].copy_from_slice(&remaining[..n]);
        self.offset += n;
        Ok(ChunkRead::Chunk(n))
    }
}

/// A provider backed by a path/URL → bytes map, standing in for disk and
/// network in tests.
#[derive(Debug, Default)]
pub struct MemoryProvider {
    entries: HashMap<String, Vec<u8>>,
}

impl MemoryProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: impl Into<String>, bytes: Vec<u8>) {
        self.entries.insert(key.into(), bytes);
    }

    fn key(endpoint: &Endpoint) -> String {
        match endpoint {
            Endpoint::Path(path) => path.to_string_lossy().into_owned(),
            Endpoint::Url(url) => url.clone(),
        }
    }
}

impl SourceProvider for MemoryProvider {
    fn open(&self, endpoint: &Endpoint) -> io::Result<Box<dyn ByteSource>> {
        let key = Self::key(endpoint);
        self.entries
            .get(&key)
            .map(|bytes| Box::new(MemorySource::new(bytes.clone())) as Box<dyn ByteSource>)
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, key))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn provider_resolves_paths_and_urls() {
        let mut provider = MemoryProvider::new();
        provider.insert("/a/b/tex.png", vec![1]);
        provider.insert("http://x/y.png", vec![2]);

        assert!(
            provider
                .open(&Endpoint::Path(PathBuf::from("/a/b/tex.png")))
                .is_ok()
        );
        assert!(
            provider
                .open(&Endpoint::Url("http://x/y.png".to_string()))
                .is_ok()
        );
        let missing = provider.open(&Endpoint::Path(PathBuf::from("/nope")));
        assert_eq!(missing.err().unwrap().kind(), io::ErrorKind::NotFound);
    }
}
