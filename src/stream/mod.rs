//! The multiplexed chunk stream format
//!
//! A stream is a flat sequence of chunks. Each chunk belongs to one
//! logical file, named by the path carried in its header, so any number
//! of files can interleave on a single pipe and be demultiplexed on the
//! far end. Chunks must be consumed in stream order; nothing here is
//! seekable. Unless otherwise noted everything is stored in Little
//! Endian format, independent of the host.
//!
//! # Chunk layout
//!
//! | Type     | Name         | Description |
//! | :------: | ------------ | ----------- |
//! | [u8; 8]  | magic        | `b"XBSTCK01"` |
//! | u8       | flags        | Bit 0: chunk may be skipped if its type is unknown |
//! | u8       | type         | `'P'` payload, `'S'` sparse, `'E'` end of file |
//! | u32      | path length  | `0..=FN_REFLEN` |
//! | [u8; N]  | path         | Not NUL-terminated on the wire |
//! | u32      | map entries  | Count of sparse-map pairs. **`'S'` only** |
//! | u64      | length       | Payload byte count. `'P'`/`'S'` only |
//! | u64      | offset       | Logical file offset of this chunk. `'P'`/`'S'` only |
//! | u32      | checksum     | CRC-32 of sparse-map bytes then payload. `'P'`/`'S'` only |
//! | [u8; 8k] | sparse map   | k `(skip: u32, len: u32)` pairs. `'S'` only |
//! | [u8; N]  | payload      | `length` bytes. `'P'`/`'S'` only |
//!
//! An `'E'` chunk ends at the path bytes: it marks the end of that
//! logical file and carries no payload fields at all.
//!
//! A sparse pair `(skip, len)` means "the reconstructed file continues
//! with `skip` bytes of zeros, then `len` bytes taken from the payload".
//! The zeros never travel on the wire.
//!
//! # Concurrency
//!
//! The write side multiplexes: every [`FileWriter`] opened on one
//! [`StreamWriter`] may live on its own thread, and the stream's mutex
//! keeps each chunk contiguous on the wire. The read side is strictly
//! sequential.

pub mod chunk;
pub mod reader;
pub mod writer;

pub use chunk::{Chunk, ChunkType, SparseEntry};
pub use reader::{ReadError, ReadStatus, StreamReader};
pub use writer::{FileWriter, StreamWriter, WriteError};

/// Magic bytes opening every chunk header.
pub const CHUNK_MAGIC: &[u8; 8] = b"XBSTCK01";

/// Chunk flag: the chunk may be skipped when its type is unknown.
pub const FLAG_IGNORABLE: u8 = 0x01;

/// Maximum length of a logical file path on the wire.
pub const FN_REFLEN: usize = 4096;

/// Writes smaller than this are grouped into a single chunk.
pub const MIN_CHUNK_SIZE: usize = 10 * 1024 * 1024;

/// Magic + flags + type + path length. The fixed-width prefix shared by
/// every chunk type; magic, flags, and type sit at offsets 0, 8, and 9
/// so foreign decoders can skip what they do not understand.
pub(crate) const CHUNK_HEADER_CONSTANT_LEN: usize = CHUNK_MAGIC.len() + 1 + 1 + 4;

pub(crate) const CHUNK_TYPE_OFFSET: usize = CHUNK_MAGIC.len() + 1;

pub(crate) const PATH_LENGTH_OFFSET: usize = CHUNK_MAGIC.len() + 1 + 1;

/// Worst-case encoded header: constant prefix, a full-length path, map
/// entry count, payload length, offset, checksum.
pub(crate) const CHUNK_HEADER_MAX_LEN: usize =
    CHUNK_HEADER_CONSTANT_LEN + FN_REFLEN + 4 + 8 + 8 + 4;
