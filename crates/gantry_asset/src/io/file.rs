//! Local filesystem source.

use std::fs::File;
use std::io::{self, Read};
use std::path::Path;

use crate::{ByteSource, ChunkRead};

/// Chunked reader over a local file. The size hint comes from a filesystem
/// stat taken at open time.
pub struct FileSource {
    file: File,
    len: Option<u64>,
}

impl FileSource {
    pub fn open(path: &Path) -> io::Result<Self> {
        let file = File::open(path)?;
        let len = file.metadata().ok().map(|m| m.len());
        Ok(Self { file, len })
    }
}

impl ByteSource for FileSource {
    fn total_size(&mut self) -> Option<u64> {
        self.len
    }

    fn read_chunk(&mut self, buf: &mut [u8]) -> io::Result<ChunkRead> {
        match self.file.read(buf)? {
            0 => Ok(ChunkRead::Eof),
            n => Ok(ChunkRead::Chunk(n)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ChunkPump;

    #[test]
    fn reads_a_file_with_a_size_hint() {
        let path = std::env::temp_dir().join("gantry_asset_file_source_test.bin");
        std::fs::write(&path, [5u8; 1000]).unwrap();

        let source = FileSource::open(&path).unwrap();
        let mut pump = ChunkPump::new(Box::new(source));
        assert_eq!(pump.progress().total, 1000);
        while !pump.pump().unwrap() {}
        assert_eq!(pump.into_bytes(), vec![5u8; 1000]);

        std::fs::remove_file(&path).unwrap();
    }
}
