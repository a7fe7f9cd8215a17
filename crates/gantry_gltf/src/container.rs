//! Binary container detection and unwrap.
//!
//! Input bytes are one of three containers: a zip archive holding a
//! `.gltf`/`.glb` plus its resources, a binary glTF (`.glb`) with embedded
//! JSON and binary chunks, or loose glTF JSON. This stage is synchronous
//! CPU work; the bytes are already in memory by the time it runs.

use std::io::{Cursor, Read};

use thiserror::Error;
use zip::ZipArchive;

#[derive(Error, Debug)]
pub enum ContainerError {
    #[error("truncated binary glTF header")]
    TruncatedHeader,
    #[error("unsupported binary glTF version {0}")]
    UnsupportedVersion(u32),
    #[error("binary glTF chunk runs past the end of the file")]
    ChunkOverrun,
    #[error("binary glTF has no JSON chunk")]
    MissingJsonChunk,
    #[error("no glTF file found in archive")]
    NoGltfInArchive,
    #[error("archive entry {0} not found")]
    EntryNotFound(String),
    #[error("corrupt archive: {0}")]
    Zip(#[from] zip::result::ZipError),
    #[error("archive read failed: {0}")]
    Io(#[from] std::io::Error),
}

const GLB_MAGIC: u32 = 0x4654_6C67; // "glTF"
const GLB_VERSION: u32 = 2;
const CHUNK_JSON: u32 = 0x4E4F_534A; // "JSON"
const CHUNK_BIN: u32 = 0x004E_4942; // "BIN\0"
const ZIP_MAGIC: [u8; 4] = [0x50, 0x4B, 0x03, 0x04]; // "PK\x03\x04"

/// A zip archive known to contain the glTF payload, kept open for
/// relative-resource extraction.
pub struct GltfArchive {
    archive: ZipArchive<Cursor<Vec<u8>>>,
    /// Directory of the glTF entry inside the archive, without a trailing
    /// slash; relative URIs resolve against it.
    pub inner_dir: String,
    pub entry_name: String,
}

impl GltfArchive {
    pub fn extract(&mut self, entry: &str) -> Result<Vec<u8>, ContainerError> {
        let mut file = self
            .archive
            .by_name(entry)
            .map_err(|_| ContainerError::EntryNotFound(entry.to_string()))?;
        let mut bytes = Vec::with_capacity(file.size() as usize);
        file.read_to_end(&mut bytes)?;
        Ok(bytes)
    }
}

impl std::fmt::Debug for GltfArchive {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GltfArchive")
            .field("inner_dir", &self.inner_dir)
            .field("entry_name", &self.entry_name)
            .finish_non_exhaustive()
    }
}

/// The unwrapped input: JSON text, any embedded binary chunks, and the
/// archive context when the input was a zip.
#[derive(Debug)]
pub struct Container {
    pub json: Vec<u8>,
    binary_chunks: Vec<Vec<u8>>,
    pub archive: Option<GltfArchive>,
}

impl Container {
    /// Embedded binary-glTF chunk for the buffer at `index`.
    pub fn binary_chunk(&self, index: usize) -> Option<&[u8]> {
        self.binary_chunks.get(index).map(Vec::as_slice)
    }
}

pub fn is_zip(bytes: &[u8]) -> bool {
    bytes.starts_with(&ZIP_MAGIC)
}

pub fn is_binary_gltf(bytes: &[u8]) -> bool {
    bytes.len() >= 4 && u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]) == GLB_MAGIC
}

/// Detects and unwraps the input container.
pub fn read_container(bytes: Vec<u8>) -> Result<Container, ContainerError> {
    if is_zip(&bytes) {
        return read_archive(bytes);
    }
    if is_binary_gltf(&bytes) {
        let (json, binary_chunks) = read_binary_gltf(&bytes)?;
        return Ok(Container {
            json,
            binary_chunks,
            archive: None,
        });
    }
    Ok(Container {
        json: bytes,
        binary_chunks: Vec::new(),
        archive: None,
    })
}

fn read_archive(bytes: Vec<u8>) -> Result<Container, ContainerError> {
    let mut archive = ZipArchive::new(Cursor::new(bytes))?;

    // First directory entry with a glTF suffix wins.
    let mut entry_name = None;
    for index in 0..archive.len() {
        let file = archive.by_index(index)?;
        let name = file.name().to_string();
        let lower = name.to_ascii_lowercase();
        if lower.ends_with(".gltf") || lower.ends_with(".glb") {
            entry_name = Some(name);
            break;
        }
    }
    let entry_name = entry_name.ok_or(ContainerError::NoGltfInArchive)?;
    let inner_dir = match entry_name.rfind('/') {
        Some(slash) => entry_name[..slash].to_string(),
        None => String::new(),
    };

    let mut wrapper = GltfArchive {
        archive,
        inner_dir,
        entry_name: entry_name.clone(),
    };
    let payload = wrapper.extract(&entry_name)?;

    let (json, binary_chunks) = if is_binary_gltf(&payload) {
        read_binary_gltf(&payload)?
    } else {
        (payload, Vec::new())
    };
    Ok(Container {
        json,
        binary_chunks,
        archive: Some(wrapper),
    })
}

fn read_u32(bytes: &[u8], offset: usize) -> Result<u32, ContainerError> {
    let chunk = bytes
        .get(offset..offset + 4)
        .ok_or(ContainerError::TruncatedHeader)?;
    Ok(u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
}

/// Walks the binary-glTF chunk list per the glTF 2.0 container layout:
/// a 12-byte header, then length/type-prefixed chunks.
fn read_binary_gltf(bytes: &[u8]) -> Result<(Vec<u8>, Vec<Vec<u8>>), ContainerError> {
    let version = read_u32(bytes, 4)?;
    if version != GLB_VERSION {
        return Err(ContainerError::UnsupportedVersion(version));
    }
    let declared_length = read_u32(bytes, 8)? as usize;
    let end = declared_length.min(bytes.len());

    let mut json = None;
    let mut binary_chunks = Vec::new();
    let mut offset = 12;
    while offset + 8 <= end {
        let chunk_length = read_u32(bytes, offset)? as usize;
        let chunk_type = read_u32(bytes, offset + 4)?;
        let data_start = offset + 8;
        let data_end = data_start
            .checked_add(chunk_length)
            .ok_or(ContainerError::ChunkOverrun)?;
        if data_end > end {
            return Err(ContainerError::ChunkOverrun);
        }
        let data = &bytes[data_start..data_end];
        match chunk_type {
            CHUNK_JSON if json.is_none() => json = Some(data.to_vec()),
            CHUNK_BIN => binary_chunks.push(data.to_vec()),
            _ => {} // unknown chunk types are skipped
        }
        // Chunks are 4-byte aligned.
        offset = data_end + (4 - chunk_length % 4) % 4;
    }

    let json = json.ok_or(ContainerError::MissingJsonChunk)?;
    Ok((json, binary_chunks))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use zip::write::{SimpleFileOptions, ZipWriter};

    fn build_glb(json: &[u8], bin: Option<&[u8]>) -> Vec<u8> {
        fn padded(data: &[u8], pad: u8) -> Vec<u8> {
            let mut out = data.to_vec();
            while out.len() % 4 != 0 {
                out.push(pad);
            }
            out
        }
        let json = padded(json, b' ');
        let mut total = 12 + 8 + json.len();
        let bin = bin.map(|b| padded(b, 0));
        if let Some(bin) = &bin {
            total += 8 + bin.len();
        }
        let mut out = Vec::new();
        out.extend_from_slice(&GLB_MAGIC.to_le_bytes());
        out.extend_from_slice(&GLB_VERSION.to_le_bytes());
        out.extend_from_slice(&(total as u32).to_le_bytes());
        out.extend_from_slice(&(json.len() as u32).to_le_bytes());
        out.extend_from_slice(&CHUNK_JSON.to_le_bytes());
        out.extend_from_slice(&json);
        if let Some(bin) = &bin {
            out.extend_from_slice(&(bin.len() as u32).to_le_bytes());
            out.extend_from_slice(&CHUNK_BIN.to_le_bytes());
            out.extend_from_slice(bin);
        }
        out
    }

    fn build_zip(entries: &[(&str, &[u8])]) -> Vec<u8> {
        let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
        for (name, data) in entries {
            writer.start_file(*name, SimpleFileOptions::default()).unwrap();
            writer.write_all(data).unwrap();
        }
        writer.finish().unwrap().into_inner()
    }

    #[test]
    fn loose_json_passes_through() {
        let json = br#"{"asset":{"version":"2.0"}}"#;
        let container = read_container(json.to_vec()).unwrap();
        assert_eq!(container.json, json);
        assert!(container.binary_chunk(0).is_none());
        assert!(container.archive.is_none());
    }

    #[test]
    fn glb_chunks_are_extracted() {
        let json = br#"{"asset":{"version":"2.0"}}"#;
        let bin = [1u8, 2, 3, 4, 5];
        let container = read_container(build_glb(json, Some(&bin))).unwrap();
        assert_eq!(
            String::from_utf8(container.json.clone()).unwrap().trim_end(),
            String::from_utf8_lossy(json)
        );
        // Padding is part of the chunk; the buffer's byteLength trims it.
        assert_eq!(&container.binary_chunk(0).unwrap()[..5], &bin);
    }

    #[test]
    fn zip_extraction_matches_the_loose_file() {
        let json = br#"{"asset":{"version":"2.0"},"scenes":[{"nodes":[]}]}"#;
        let zipped = build_zip(&[
            ("readme.txt", b"hi".as_slice()),
            ("models/scene/model.gltf", json.as_slice()),
            ("models/scene/tex.png", b"png".as_slice()),
        ]);
        assert!(is_zip(&zipped));
        let container = read_container(zipped).unwrap();
        assert_eq!(container.json, json);
        let archive = container.archive.unwrap();
        assert_eq!(archive.inner_dir, "models/scene");
        assert_eq!(archive.entry_name, "models/scene/model.gltf");
    }

    #[test]
    fn non_archives_are_not_mistaken_for_zip() {
        assert!(!is_zip(br#"{"asset":{}}"#));
        assert!(!is_zip(&build_glb(b"{}", None)));
    }

    #[test]
    fn archive_without_gltf_is_terminal() {
        let zipped = build_zip(&[("readme.txt", b"hi".as_slice())]);
        let err = read_container(zipped).unwrap_err();
        assert!(matches!(err, ContainerError::NoGltfInArchive));
    }

    #[test]
    fn truncated_glb_is_terminal() {
        let mut glb = build_glb(b"{}", None);
        glb.truncate(10);
        let err = read_container(glb).unwrap_err();
        assert!(matches!(err, ContainerError::TruncatedHeader));
    }

    #[test]
    fn overrunning_chunk_is_terminal() {
        let json = br#"{"a":1}"#;
        let mut glb = build_glb(json, None);
        // Inflate the declared JSON chunk length past the file end.
        let bad_len = (glb.len() as u32).to_le_bytes();
        glb[12..16].copy_from_slice(&bad_len);
        let err = read_container(glb).unwrap_err();
        assert!(matches!(err, ContainerError::ChunkOverrun));
    }
}
