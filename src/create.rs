//! Producer side of the command-line tool: stream named files into one
//! archive.

use std::fs::File;
use std::io::{self, ErrorKind, Read, Write};
use std::os::unix::ffi::OsStrExt;
use std::path::{Path, PathBuf};
use std::thread;

use log::debug;
use parking_lot::Mutex;
use thiserror::Error;

use crate::stream::writer::{StreamWriter, WriteError};

/// Read granularity for file payloads; the per-file coalescing buffer
/// groups these into full chunks.
const COPY_BUF_SIZE: usize = 1024 * 1024;

#[derive(Error, Debug)]
pub enum CreateError {
    #[error(transparent)]
    Stream(#[from] WriteError),
    #[error("{0}: {1}")]
    Input(PathBuf, #[source] io::Error),
}

/// Stream `files` into the archive, `parallel` producer threads sharing
/// the one sink. Archive member names are the file paths as given, so
/// relative paths make relocatable archives.
pub fn create<W: Write + Send>(
    stream: &StreamWriter<W>,
    files: &[PathBuf],
    parallel: usize,
) -> Result<(), CreateError> {
    if parallel <= 1 {
        for path in files {
            stream_file(stream, path)?;
        }
        return Ok(());
    }

    let worklist = Mutex::new(files.to_vec());
    thread::scope(|s| {
        let workers: Vec<_> = (0..parallel)
            .map(|_| {
                s.spawn(|| loop {
                    let path = match worklist.lock().pop() {
                        Some(path) => path,
                        None => return Ok(()),
                    };
                    stream_file(stream, &path)?;
                })
            })
            .collect();

        let mut result = Ok(());
        for worker in workers {
            match worker.join() {
                Ok(r) => result = result.and(r),
                Err(panic) => std::panic::resume_unwind(panic),
            }
        }
        result
    })
}

fn stream_file<W: Write>(stream: &StreamWriter<W>, path: &Path) -> Result<(), CreateError> {
    let mut input =
        File::open(path).map_err(|e| CreateError::Input(path.to_path_buf(), e))?;
    let mut file = stream.open(path.as_os_str().as_bytes())?;
    debug!("streaming {}", path.display());

    let mut buf = vec![0u8; COPY_BUF_SIZE];
    loop {
        let n = match input.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(CreateError::Input(path.to_path_buf(), e)),
        };
        file.write(&buf[..n])?;
    }

    file.close()?;
    Ok(())
}

#[cfg(test)]
mod test_create {
    use super::*;
    use crate::stream::chunk::{Chunk, ChunkType};
    use crate::stream::reader::{ReadStatus, StreamReader};
    use std::collections::HashMap;
    use std::io::Cursor;

    fn archive_contents(wire: Vec<u8>) -> HashMap<Vec<u8>, Vec<u8>> {
        let mut reader = StreamReader::new(Cursor::new(wire));
        let mut chunk = Chunk::new();
        let mut contents: HashMap<Vec<u8>, Vec<u8>> = HashMap::new();
        while reader.next_chunk(&mut chunk).unwrap() == ReadStatus::Chunk {
            if chunk.chunk_type == ChunkType::Eof {
                continue;
            }
            chunk.validate_checksum().unwrap();
            contents
                .entry(chunk.path.clone())
                .or_default()
                .extend_from_slice(&chunk.data);
        }
        contents
    }

    #[test]
    fn packs_named_files() {
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("a.txt");
        let b = dir.path().join("b.bin");
        std::fs::write(&a, b"alpha").unwrap();
        std::fs::write(&b, vec![0x5A; 2048]).unwrap();

        let stream = StreamWriter::new(Vec::new());
        create(&stream, &[a.clone(), b.clone()], 1).unwrap();

        let contents = archive_contents(stream.done().unwrap());
        assert_eq!(contents[a.as_os_str().as_bytes()], b"alpha");
        assert_eq!(contents[b.as_os_str().as_bytes()], vec![0x5A; 2048]);
    }

    #[test]
    fn parallel_producers_pack_everything() {
        let dir = tempfile::tempdir().unwrap();
        let mut files = Vec::new();
        for i in 0..8 {
            let path = dir.path().join(format!("file-{i}"));
            std::fs::write(&path, format!("contents of {i}")).unwrap();
            files.push(path);
        }

        let stream = StreamWriter::new(Vec::new());
        create(&stream, &files, 4).unwrap();

        let contents = archive_contents(stream.done().unwrap());
        assert_eq!(contents.len(), 8);
        for (i, path) in files.iter().enumerate() {
            assert_eq!(
                contents[path.as_os_str().as_bytes()],
                format!("contents of {i}").as_bytes()
            );
        }
    }

    #[test]
    fn missing_input_is_reported_with_its_path() {
        let dir = tempfile::tempdir().unwrap();
        let absent = dir.path().join("absent");

        let stream = StreamWriter::new(Vec::new());
        match create(&stream, &[absent.clone()], 1) {
            Err(CreateError::Input(path, _)) => assert_eq!(path, absent),
            other => panic!("expected Input error, got {:?}", other),
        }
    }
}
