#![forbid(unsafe_code)]

//! Byte-source I/O for gantry importers.
//!
//! Importers consume bytes from wildly different places (local files, zip
//! entries, embedded chunks, `data:` URIs, remote URLs) but always the same
//! way: pull a chunk, report progress, yield, repeat. [`ByteSource`] is that
//! contract, [`ChunkPump`] is the accumulator that drives it, and
//! [`SourceProvider`] maps a resolved [`Endpoint`] to a concrete source.
//!
//! The [`io::memory`] module provides an in-memory provider, primarily
//! intended for unit tests.

mod data_uri;
pub mod io;

pub use data_uri::{DataUri, DataUriError};
pub use io::{
    ByteSource, ChunkPump, ChunkRead, DefaultProvider, Endpoint, FileSource, MemoryProvider,
    MemorySource, SourceProvider, TransferProgress,
};
