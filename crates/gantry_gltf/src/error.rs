use std::io;

use thiserror::Error;

use gantry_asset::DataUriError;

use crate::container::ContainerError;
use crate::document::DocumentError;
use crate::host::HostError;
use crate::uri::ResolveError;

/// Why one buffer payload could not be produced. Buffers are load-bearing
/// for every later stage, so any of these aborts the import.
#[derive(Error, Debug)]
pub enum BufferLoadError {
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error(transparent)]
    DataUri(#[from] DataUriError),
    #[error(transparent)]
    Archive(#[from] ContainerError),
    #[error("buffer has no URI and the container has no matching binary chunk")]
    MissingBinaryChunk,
}

/// A fatal import failure, delivered through the failure callback and (by
/// default) returned from `advance`. Per-entity soft failures never appear
/// here; they only mark cache slots.
#[derive(Error, Debug)]
pub enum ImportError {
    #[error(transparent)]
    Container(#[from] ContainerError),
    #[error(transparent)]
    Document(#[from] DocumentError),
    #[error(transparent)]
    Resolve(#[from] ResolveError),
    #[error("failed to read the input: {source}")]
    Input {
        #[source]
        source: io::Error,
    },
    #[error("buffer {index} failed to load: {source}")]
    Buffer {
        index: usize,
        #[source]
        source: BufferLoadError,
    },
    #[error(transparent)]
    Host(#[from] HostError),
    #[error("import step ran out of order: {0}")]
    Internal(&'static str),
}
