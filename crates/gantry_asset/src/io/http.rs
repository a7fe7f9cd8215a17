//! Remote source over HTTP(S).
//!
//! Whole-file GET with chunked body streaming, plus a best-effort
//! HEAD-equivalent size probe. There is no byte-range protocol of our own;
//! any plain HTTP server works.

use std::io::{self, Read};

use tracing::debug;

use crate::{ByteSource, ChunkRead};

/// Streaming reader over an HTTP response body.
pub struct HttpSource {
    reader: Box<dyn Read>,
    total: Option<u64>,
}

impl HttpSource {
    /// Issues the GET and takes the size hint from `Content-Length` when
    /// the server sends one.
    pub fn get(url: &str) -> io::Result<Self> {
        let response = ureq::get(url)
            .call()
            .map_err(|e| io::Error::other(format!("GET {url}: {e}")))?;
        let total = content_length(response.headers());
        Ok(Self {
            reader: Box::new(response.into_body().into_reader()),
            total,
        })
    }

    /// Best-effort size probe for a URL whose transfer has not started.
    /// Failures are logged and reported as `None`, never as an error.
    pub fn probe_size(url: &str) -> Option<u64> {
        match ureq::head(url).call() {
            Ok(response) => content_length(response.headers()),
            Err(e) => {
                debug!("size probe for {url} failed: {e}");
                None
            }
        }
    }
}

fn content_length(headers: &ureq::http::HeaderMap) -> Option<u64> {
    headers
        .get("content-length")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse().ok())
}

impl ByteSource for HttpSource {
    fn total_size(&mut self) -> Option<u64> {
        self.total
    }

    fn read_chunk(&mut self, buf: &mut [u8]) -> io::Result<ChunkRead> {
        match self.reader.read(buf)? {
            0 => Ok(ChunkRead::Eof),
            n => Ok(ChunkRead::Chunk(n)),
        }
    }
}
