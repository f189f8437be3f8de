use std::io::{self, Read};

use byteorder::{ByteOrder, LittleEndian};
use thiserror::Error;

use crate::buf::read_full;
use crate::stream::chunk::{Chunk, ChunkType, SparseEntry};
use crate::stream::{
    CHUNK_HEADER_CONSTANT_LEN, CHUNK_MAGIC, CHUNK_TYPE_OFFSET, FLAG_IGNORABLE, FN_REFLEN,
    PATH_LENGTH_OFFSET,
};

#[derive(Error, Debug)]
pub enum ReadError {
    #[error(transparent)]
    Source(#[from] io::Error),
    #[error("source ran out mid-chunk")]
    ShortRead,
    #[error("bad chunk magic, expected \"XBSTCK01\"")]
    InvalidMagic,
    #[error("unknown chunk type {0:#04x} without the ignorable flag")]
    UnknownType(u8),
    #[error("chunk path length {0} exceeds the {FN_REFLEN}-byte limit")]
    PathTooLong(u32),
    #[error("chunk checksum mismatch: stored {stored:#010x}, computed {computed:#010x}")]
    ChecksumMismatch { stored: u32, computed: u32 },
    #[error("timed out waiting for a writer on the fifo")]
    Timeout,
}

/// Outcome of a successful [`StreamReader::next_chunk`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadStatus {
    /// The chunk container now holds the next decoded chunk.
    Chunk,
    /// The source is cleanly exhausted at a chunk boundary.
    EndOfStream,
}

enum Parsed {
    Chunk,
    End,
    /// An unknown-type chunk with the ignorable flag, fully consumed.
    Skipped,
}

/// Sequential reader over one archive stream.
///
/// The stream is not seekable, so chunks come out strictly in wire
/// order. `&mut self` on [`next_chunk`](Self::next_chunk) is the whole
/// concurrency story: a consumer that wants to demultiplex across
/// threads hands the reader around behind its own lock.
pub struct StreamReader<R: Read> {
    source: R,
    offset: u64,
}

impl StreamReader<io::Stdin> {
    /// Read the archive from the process's standard input.
    pub fn from_stdin() -> StreamReader<io::Stdin> {
        StreamReader::new(io::stdin())
    }
}

impl<R: Read> StreamReader<R> {
    pub fn new(source: R) -> StreamReader<R> {
        StreamReader { source, offset: 0 }
    }

    /// Total bytes consumed from the source so far.
    pub fn offset(&self) -> u64 {
        self.offset
    }

    pub fn into_inner(self) -> R {
        self.source
    }

    /// Decode the next chunk into `chunk`, reusing its buffers.
    ///
    /// Zero bytes available at a chunk boundary is a clean
    /// [`EndOfStream`](ReadStatus::EndOfStream); running dry anywhere
    /// inside a chunk is [`ShortRead`](ReadError::ShortRead). Unknown
    /// chunk types marked ignorable are consumed and skipped without
    /// surfacing here. The stored checksum is *not* verified on the way
    /// through; call [`Chunk::validate_checksum`] on the result.
    pub fn next_chunk(&mut self, chunk: &mut Chunk) -> Result<ReadStatus, ReadError> {
        loop {
            match self.read_one(chunk)? {
                Parsed::Chunk => return Ok(ReadStatus::Chunk),
                Parsed::End => return Ok(ReadStatus::EndOfStream),
                Parsed::Skipped => continue,
            }
        }
    }

    fn read_one(&mut self, chunk: &mut Chunk) -> Result<Parsed, ReadError> {
        let mut header = [0u8; CHUNK_HEADER_CONSTANT_LEN];
        let got = read_full(&mut self.source, &mut header)?;
        if got == 0 {
            return Ok(Parsed::End);
        }
        self.offset += got as u64;
        if got < header.len() {
            return Err(ReadError::ShortRead);
        }

        if &header[..CHUNK_MAGIC.len()] != CHUNK_MAGIC {
            return Err(ReadError::InvalidMagic);
        }

        chunk.flags = header[CHUNK_MAGIC.len()];
        let tag = header[CHUNK_TYPE_OFFSET];
        let known = ChunkType::from_wire(tag);
        if known.is_none() && chunk.flags & FLAG_IGNORABLE == 0 {
            return Err(ReadError::UnknownType(tag));
        }

        let path_len = LittleEndian::read_u32(&header[PATH_LENGTH_OFFSET..]);
        if path_len as usize > FN_REFLEN {
            return Err(ReadError::PathTooLong(path_len));
        }

        chunk.path.clear();
        chunk.path.resize(path_len as usize, 0);
        self.fill(&mut chunk.path)?;

        if known == Some(ChunkType::Eof) {
            chunk.chunk_type = ChunkType::Eof;
            chunk.length = 0;
            chunk.offset = 0;
            chunk.checksum = 0;
            chunk.sparse_map.clear();
            chunk.data.clear();
            return Ok(Parsed::Chunk);
        }

        // 'P', 'S', or a skippable unknown laid out like 'P'
        let map_entries = if known == Some(ChunkType::Sparse) {
            let mut word = [0u8; 4];
            self.fill(&mut word)?;
            LittleEndian::read_u32(&word) as usize
        } else {
            0
        };

        let mut meta = [0u8; 8 + 8 + 4];
        self.fill(&mut meta)?;
        chunk.length = LittleEndian::read_u64(&meta[..8]);
        chunk.offset = LittleEndian::read_u64(&meta[8..16]);
        chunk.checksum = LittleEndian::read_u32(&meta[16..]);

        chunk.map_buf.clear();
        chunk.map_buf.resize(map_entries * 8, 0);
        self.fill(&mut chunk.map_buf)?;

        chunk.sparse_map.clear();
        for pair in chunk.map_buf.chunks_exact(8) {
            chunk.sparse_map.push(SparseEntry {
                skip: LittleEndian::read_u32(&pair[..4]),
                len: LittleEndian::read_u32(&pair[4..]),
            });
        }

        chunk.data.clear();
        chunk.data.resize(chunk.length as usize, 0);
        self.fill(&mut chunk.data)?;

        match known {
            Some(t) => {
                chunk.chunk_type = t;
                Ok(Parsed::Chunk)
            }
            None => Ok(Parsed::Skipped),
        }
    }

    /// Read exactly `buf.len()` bytes mid-chunk.
    fn fill(&mut self, buf: &mut [u8]) -> Result<(), ReadError> {
        let got = read_full(&mut self.source, buf)?;
        self.offset += got as u64;
        if got < buf.len() {
            return Err(ReadError::ShortRead);
        }
        Ok(())
    }
}
