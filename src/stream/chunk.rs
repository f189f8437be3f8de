use std::borrow::Cow;

use byteorder::{ByteOrder, LittleEndian};

use crate::checksum::Checksum;
use crate::stream::reader::ReadError;

/// One run of a sparse map: `skip` bytes of implicit zeros in the
/// reconstructed file, then `len` bytes taken from the chunk payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SparseEntry {
    pub skip: u32,
    pub len: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChunkType {
    /// Plain file data.
    Payload,
    /// File data with a sparse map in front of it.
    Sparse,
    /// End of one logical file.
    Eof,
}

impl ChunkType {
    pub(crate) fn from_wire(tag: u8) -> Option<ChunkType> {
        match tag {
            b'P' => Some(ChunkType::Payload),
            b'S' => Some(ChunkType::Sparse),
            b'E' => Some(ChunkType::Eof),
            _ => None,
        }
    }

    pub(crate) fn to_wire(self) -> u8 {
        match self {
            ChunkType::Payload => b'P',
            ChunkType::Sparse => b'S',
            ChunkType::Eof => b'E',
        }
    }
}

/// One decoded chunk.
///
/// A single instance is meant to be fed to
/// [`StreamReader::next_chunk`](crate::stream::StreamReader::next_chunk)
/// over and over: the path, sparse-map, and payload buffers are reused
/// across calls, growing on demand and never shrinking.
#[derive(Debug)]
pub struct Chunk {
    pub flags: u8,
    pub chunk_type: ChunkType,
    /// Path bytes exactly as they appeared on the wire.
    pub path: Vec<u8>,
    /// Payload byte count.
    pub length: u64,
    /// Logical file offset this chunk starts at.
    pub offset: u64,
    /// CRC-32 stored in the chunk header.
    pub checksum: u32,
    pub sparse_map: Vec<SparseEntry>,
    pub data: Vec<u8>,
    /// Scratch for the raw sparse-map bytes while decoding.
    pub(crate) map_buf: Vec<u8>,
}

impl Chunk {
    pub fn new() -> Chunk {
        Chunk {
            flags: 0,
            chunk_type: ChunkType::Eof,
            path: Vec::new(),
            length: 0,
            offset: 0,
            checksum: 0,
            sparse_map: Vec::new(),
            data: Vec::new(),
            map_buf: Vec::new(),
        }
    }

    pub fn path_lossy(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.path)
    }

    /// Bytes of the reconstructed file this chunk covers: the payload
    /// plus every implicit zero run of the sparse map.
    pub fn expanded_len(&self) -> u64 {
        let skipped: u64 = self.sparse_map.iter().map(|s| u64::from(s.skip)).sum();
        skipped + self.length
    }

    /// Recompute the CRC-32 over the sparse-map bytes then the payload
    /// and compare it to the stored checksum. Pure: repeated calls give
    /// the same answer.
    pub fn validate_checksum(&self) -> Result<(), ReadError> {
        let mut crc = Checksum::new();
        let mut entry = [0u8; 8];
        for s in &self.sparse_map {
            LittleEndian::write_u32(&mut entry[..4], s.skip);
            LittleEndian::write_u32(&mut entry[4..], s.len);
            crc.update(&entry);
        }
        crc.update(&self.data);

        let computed = crc.finalize();
        if computed == self.checksum {
            Ok(())
        } else {
            Err(ReadError::ChecksumMismatch {
                stored: self.checksum,
                computed,
            })
        }
    }
}

impl Default for Chunk {
    fn default() -> Chunk {
        Chunk::new()
    }
}

/// Encode a sparse map into its wire form, one `(skip, len)` pair of
/// little-endian u32s per entry.
pub(crate) fn encode_sparse_map(map: &[SparseEntry], out: &mut Vec<u8>) {
    out.clear();
    out.reserve(map.len() * 8);

    let mut entry = [0u8; 8];
    for s in map {
        LittleEndian::write_u32(&mut entry[..4], s.skip);
        LittleEndian::write_u32(&mut entry[4..], s.len);
        out.extend_from_slice(&entry);
    }
}
