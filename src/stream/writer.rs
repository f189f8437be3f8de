use std::io::{self, Write};
use std::mem;
use std::sync::Arc;

use byteorder::{ByteOrder, LittleEndian};
use log::warn;
use parking_lot::Mutex;
use thiserror::Error;

use crate::checksum::Checksum;
use crate::stream::chunk::{encode_sparse_map, ChunkType, SparseEntry};
use crate::stream::{
    CHUNK_HEADER_CONSTANT_LEN, CHUNK_HEADER_MAX_LEN, CHUNK_MAGIC, CHUNK_TYPE_OFFSET, FN_REFLEN,
    MIN_CHUNK_SIZE, PATH_LENGTH_OFFSET,
};

#[derive(Error, Debug)]
pub enum WriteError {
    #[error("file path is {0} bytes, the format allows at most {FN_REFLEN}")]
    PathTooLong(usize),
    #[error(transparent)]
    Sink(#[from] io::Error),
}

/// The shared write side of one archive stream.
///
/// Handles opened with [`open`](StreamWriter::open) may be moved to any
/// number of threads; the stream's mutex serializes chunk emissions, so
/// the header, sparse map, and payload of one chunk always land on the
/// wire contiguously, whatever the other producers are doing.
pub struct StreamWriter<W: Write> {
    sink: Arc<Mutex<W>>,
}

impl StreamWriter<io::Stdout> {
    /// Stream to the process's standard output.
    pub fn stdout() -> StreamWriter<io::Stdout> {
        StreamWriter::new(io::stdout())
    }
}

impl<W: Write> StreamWriter<W> {
    pub fn new(sink: W) -> StreamWriter<W> {
        StreamWriter {
            sink: Arc::new(Mutex::new(sink)),
        }
    }

    /// Open a logical file on the stream.
    ///
    /// The path length is validated here, once; writes never re-check it.
    /// The handle fronts a [`MIN_CHUNK_SIZE`] coalescing buffer, so small
    /// writes are grouped into full-size chunks.
    pub fn open(&self, path: &[u8]) -> Result<FileWriter<W>, WriteError> {
        if path.len() > FN_REFLEN {
            return Err(WriteError::PathTooLong(path.len()));
        }

        Ok(FileWriter {
            sink: Arc::clone(&self.sink),
            path: path.to_vec(),
            offset: 0,
            chunk: Vec::with_capacity(MIN_CHUNK_SIZE),
            map_buf: Vec::new(),
            closed: false,
        })
    }

    /// Tear the stream down and hand the sink back. Close every handle
    /// first: while one is still alive this returns `None` and the sink
    /// stays with the survivors.
    pub fn done(self) -> Option<W> {
        Arc::try_unwrap(self.sink).ok().map(Mutex::into_inner)
    }
}

/// One logical file open on a [`StreamWriter`].
///
/// Writes smaller than the free buffer space coalesce; anything bigger
/// flushes the buffer and goes out as its own chunk. [`close`](Self::close)
/// emits the end-of-file chunk: exactly one, strictly after all of the
/// handle's data chunks.
pub struct FileWriter<W: Write> {
    sink: Arc<Mutex<W>>,
    path: Vec<u8>,
    offset: u64,
    chunk: Vec<u8>,
    map_buf: Vec<u8>,
    closed: bool,
}

impl<W: Write> FileWriter<W> {
    pub fn path(&self) -> &[u8] {
        &self.path
    }

    /// Bytes of the logical file emitted so far, implicit sparse zeros
    /// included and buffered bytes excluded. Advances only after a chunk
    /// fully reaches the sink.
    pub fn offset(&self) -> u64 {
        self.offset
    }

    fn chunk_free(&self) -> usize {
        MIN_CHUNK_SIZE - self.chunk.len()
    }

    /// Append file data.
    ///
    /// Data strictly smaller than the free buffer space is coalesced and
    /// emitted later; anything else flushes the buffer and is emitted
    /// directly as one chunk, skipping the extra copy. A large write
    /// followed by a small one therefore produces separate chunks; that
    /// shape is part of the wire format and is kept bit-for-bit.
    pub fn write(&mut self, buf: &[u8]) -> Result<(), WriteError> {
        if buf.len() < self.chunk_free() {
            self.chunk.extend_from_slice(buf);
            return Ok(());
        }

        self.flush()?;
        self.write_chunk(buf, &[])
    }

    /// Emit `buf` together with its sparse map as one chunk.
    ///
    /// Sparse data never goes through the coalescing buffer (a chunk
    /// cannot mix sparse and plain content), so buffered bytes are
    /// flushed first. An empty map degrades to a plain payload chunk:
    /// the map size is the only thing that picks the wire type, so an
    /// empty-map sparse write is indistinguishable from [`write`](Self::write)
    /// once on the wire.
    pub fn write_sparse(&mut self, buf: &[u8], sparse_map: &[SparseEntry]) -> Result<(), WriteError> {
        self.flush()?;
        self.write_chunk(buf, sparse_map)
    }

    /// Flush any buffered bytes, emit the end-of-file chunk, and release
    /// the handle.
    pub fn close(mut self) -> Result<(), WriteError> {
        self.flush()?;
        self.write_eof()?;
        self.closed = true;
        Ok(())
    }

    fn flush(&mut self) -> Result<(), WriteError> {
        if self.chunk.is_empty() {
            return Ok(());
        }

        // write_chunk needs the handle and the buffer at once
        let buffered = mem::take(&mut self.chunk);
        let res = self.write_chunk(&buffered, &[]);
        self.chunk = buffered;
        if res.is_ok() {
            self.chunk.clear();
        }
        res
    }

    fn write_chunk(&mut self, buf: &[u8], sparse_map: &[SparseEntry]) -> Result<(), WriteError> {
        let mut header = [0u8; CHUNK_HEADER_MAX_LEN];

        header[..CHUNK_MAGIC.len()].copy_from_slice(CHUNK_MAGIC);
        header[CHUNK_MAGIC.len()] = 0; // flags
        let chunk_type = if sparse_map.is_empty() {
            ChunkType::Payload
        } else {
            ChunkType::Sparse
        };
        header[CHUNK_TYPE_OFFSET] = chunk_type.to_wire();
        LittleEndian::write_u32(&mut header[PATH_LENGTH_OFFSET..], self.path.len() as u32);

        let mut pos = CHUNK_HEADER_CONSTANT_LEN;
        header[pos..pos + self.path.len()].copy_from_slice(&self.path);
        pos += self.path.len();

        if !sparse_map.is_empty() {
            LittleEndian::write_u32(&mut header[pos..], sparse_map.len() as u32);
            pos += 4;
        }

        LittleEndian::write_u64(&mut header[pos..], buf.len() as u64);
        pos += 8;

        encode_sparse_map(sparse_map, &mut self.map_buf);

        let mut crc = Checksum::new();
        crc.update(&self.map_buf);
        crc.update(buf);
        let checksum = crc.finalize();

        let mut sink = self.sink.lock();

        // The offset goes into the header under the lock so it reflects
        // exactly the bytes emitted for this file so far.
        LittleEndian::write_u64(&mut header[pos..], self.offset);
        pos += 8;
        LittleEndian::write_u32(&mut header[pos..], checksum);
        pos += 4;

        sink.write_all(&header[..pos])?;
        sink.write_all(&self.map_buf)?;
        sink.write_all(buf)?;

        // Only now, with the whole chunk on the wire, does the file
        // offset move. A failed emission leaves it untouched.
        for entry in sparse_map {
            self.offset += u64::from(entry.skip);
        }
        self.offset += buf.len() as u64;

        Ok(())
    }

    fn write_eof(&mut self) -> Result<(), WriteError> {
        let mut header = [0u8; CHUNK_HEADER_CONSTANT_LEN + FN_REFLEN];

        header[..CHUNK_MAGIC.len()].copy_from_slice(CHUNK_MAGIC);
        header[CHUNK_MAGIC.len()] = 0; // flags
        header[CHUNK_TYPE_OFFSET] = ChunkType::Eof.to_wire();
        LittleEndian::write_u32(&mut header[PATH_LENGTH_OFFSET..], self.path.len() as u32);

        let mut pos = CHUNK_HEADER_CONSTANT_LEN;
        header[pos..pos + self.path.len()].copy_from_slice(&self.path);
        pos += self.path.len();

        let mut sink = self.sink.lock();
        sink.write_all(&header[..pos])?;

        Ok(())
    }
}

impl<W: Write> Drop for FileWriter<W> {
    fn drop(&mut self) {
        if !self.closed {
            warn!(
                "file {:?} dropped without close(), no end-of-file chunk was emitted",
                String::from_utf8_lossy(&self.path)
            );
        }
    }
}
