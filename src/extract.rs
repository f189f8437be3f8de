//! Consumer side of the command-line tool: demultiplex an archive
//! stream back into files.

use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::ffi::OsStr;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::os::unix::ffi::OsStrExt;
use std::path::{Component, Path, PathBuf};

use log::debug;
use thiserror::Error;

use crate::stream::chunk::{Chunk, ChunkType};
use crate::stream::reader::{ReadError, ReadStatus, StreamReader};

#[derive(Error, Debug)]
pub enum ExtractError {
    #[error(transparent)]
    Stream(#[from] ReadError),
    #[error("{0}: {1}")]
    Output(PathBuf, #[source] io::Error),
    #[error("archive path {0:?} escapes the destination directory")]
    UnsafePath(String),
    #[error("sparse map of chunk at offset {0} does not match its payload")]
    MalformedSparseMap(u64),
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ExtractStats {
    /// Logical files completed (one per end-of-file chunk).
    pub files: u64,
    /// Reconstructed bytes, implicit sparse zeros included.
    pub bytes: u64,
}

/// Demultiplex every chunk from `reader` into files under `dest`,
/// validating each chunk's checksum on the way through.
///
/// Sparse regions become holes: the skips are seeked over and the
/// zeros are never written. Archive member paths that are absolute or
/// step outside `dest` are rejected.
pub fn extract<R: Read>(
    reader: &mut StreamReader<R>,
    dest: &Path,
) -> Result<ExtractStats, ExtractError> {
    let mut chunk = Chunk::new();
    let mut open_files: HashMap<Vec<u8>, File> = HashMap::new();
    let mut stats = ExtractStats::default();

    while reader.next_chunk(&mut chunk)? == ReadStatus::Chunk {
        if chunk.chunk_type == ChunkType::Eof {
            if open_files.remove(&chunk.path).is_none() {
                // A file whose only chunk is the EOF marker is empty,
                // but it still has to exist after extraction
                create_member(dest, &chunk.path)?;
            }
            debug!("finished {}", chunk.path_lossy());
            stats.files += 1;
            continue;
        }

        chunk.validate_checksum()?;

        let file = match open_files.entry(chunk.path.clone()) {
            Entry::Occupied(e) => e.into_mut(),
            Entry::Vacant(e) => {
                let file = create_member(dest, e.key())?;
                e.insert(file)
            }
        };

        apply_chunk(file, &chunk).map_err(|e| match e {
            ApplyError::Io(err) => {
                ExtractError::Output(member_path(dest, &chunk.path).unwrap_or_default(), err)
            }
            ApplyError::BadMap => ExtractError::MalformedSparseMap(chunk.offset),
        })?;
        stats.bytes += chunk.expanded_len();
    }

    Ok(stats)
}

/// Resolve an archive member path under `dest`, rejecting anything that
/// could land outside it.
fn member_path(dest: &Path, raw: &[u8]) -> Result<PathBuf, ExtractError> {
    let rel = Path::new(OsStr::from_bytes(raw));
    let safe = !raw.is_empty()
        && !rel.is_absolute()
        && rel.components().all(|c| matches!(c, Component::Normal(_)));
    if !safe {
        return Err(ExtractError::UnsafePath(
            String::from_utf8_lossy(raw).into_owned(),
        ));
    }
    Ok(dest.join(rel))
}

fn create_member(dest: &Path, raw: &[u8]) -> Result<File, ExtractError> {
    let path = member_path(dest, raw)?;
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| ExtractError::Output(parent.to_path_buf(), e))?;
    }
    OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .open(&path)
        .map_err(|e| ExtractError::Output(path, e))
}

enum ApplyError {
    Io(io::Error),
    BadMap,
}

impl From<io::Error> for ApplyError {
    fn from(e: io::Error) -> ApplyError {
        ApplyError::Io(e)
    }
}

fn apply_chunk(file: &mut File, chunk: &Chunk) -> Result<(), ApplyError> {
    file.seek(SeekFrom::Start(chunk.offset))?;

    if chunk.sparse_map.is_empty() {
        file.write_all(&chunk.data)?;
        return Ok(());
    }

    let mut taken = 0usize;
    for entry in &chunk.sparse_map {
        if entry.skip > 0 {
            file.seek(SeekFrom::Current(i64::from(entry.skip)))?;
        }
        let next = taken + entry.len as usize;
        let run = chunk.data.get(taken..next).ok_or(ApplyError::BadMap)?;
        file.write_all(run)?;
        taken = next;
    }

    // A map ending in a bare skip leaves the hole dangling past the end
    // of the data; pin the file length so the hole survives
    let end = file.stream_position()?;
    if file.metadata()?.len() < end {
        file.set_len(end)?;
    }

    Ok(())
}
