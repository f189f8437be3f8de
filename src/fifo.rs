//! Source bindings for the read side: a FIFO opened with a bounded wait
//! for a writer to attach, or the process's standard input (see
//! [`StreamReader::from_stdin`]).

use std::fs::{File, OpenOptions};
use std::io;
use std::os::unix::fs::OpenOptionsExt;
use std::os::unix::io::{AsRawFd, RawFd};
use std::path::Path;
use std::thread;
use std::time::{Duration, Instant};

use crate::stream::reader::{ReadError, StreamReader};

/// Poll slice while waiting for a writer to attach.
const POLL_INTERVAL_MS: i32 = 100;

/// Open `path` as a FIFO, waiting up to `timeout_secs` for a writer to
/// attach. `timeout_secs <= 0` waits forever.
///
/// The open itself never blocks; the wait happens by polling the read
/// end until a writer shows up. The returned file is back in blocking
/// mode, ready for sequential chunk reads.
pub fn open_fifo(path: &Path, timeout_secs: i32) -> Result<File, ReadError> {
    let file = OpenOptions::new()
        .read(true)
        .custom_flags(libc::O_NONBLOCK)
        .open(path)
        .map_err(ReadError::Source)?;
    let fd = file.as_raw_fd();

    let deadline = if timeout_secs > 0 {
        Some(Instant::now() + Duration::from_secs(timeout_secs as u64))
    } else {
        None
    };

    loop {
        let mut pfd = libc::pollfd {
            fd,
            events: libc::POLLIN,
            revents: 0,
        };
        let rc = unsafe { libc::poll(&mut pfd, 1, POLL_INTERVAL_MS) };
        if rc < 0 {
            let err = io::Error::last_os_error();
            if err.kind() == io::ErrorKind::Interrupted {
                continue;
            }
            return Err(ReadError::Source(err));
        }

        // A FIFO with no writer reports POLLHUP immediately. Once a
        // writer attaches the poll either times out quietly (writer
        // idle) or reports POLLIN (data already waiting); both mean
        // the stream is live.
        let readable = pfd.revents & libc::POLLIN != 0;
        let hung_up = pfd.revents & libc::POLLHUP != 0;
        if rc == 0 || readable {
            break;
        }
        if !hung_up {
            // POLLERR and friends: let the first read report it
            break;
        }

        if let Some(deadline) = deadline {
            if Instant::now() >= deadline {
                return Err(ReadError::Timeout);
            }
        }
        thread::sleep(Duration::from_millis(POLL_INTERVAL_MS as u64));
    }

    set_blocking(fd)?;
    Ok(file)
}

fn set_blocking(fd: RawFd) -> Result<(), ReadError> {
    // fd stays open across both calls, it belongs to the File above
    unsafe {
        let flags = libc::fcntl(fd, libc::F_GETFL);
        if flags < 0 {
            return Err(ReadError::Source(io::Error::last_os_error()));
        }
        if libc::fcntl(fd, libc::F_SETFL, flags & !libc::O_NONBLOCK) < 0 {
            return Err(ReadError::Source(io::Error::last_os_error()));
        }
    }
    Ok(())
}

impl StreamReader<File> {
    /// Read the archive from a FIFO, waiting up to `timeout_secs` for
    /// the producer to attach.
    pub fn from_fifo(path: &Path, timeout_secs: i32) -> Result<StreamReader<File>, ReadError> {
        Ok(StreamReader::new(open_fifo(path, timeout_secs)?))
    }
}

#[cfg(test)]
mod test_fifo {
    use super::*;
    use crate::stream::chunk::{Chunk, ChunkType};
    use crate::stream::reader::ReadStatus;
    use crate::stream::writer::StreamWriter;
    use std::ffi::CString;
    use std::os::unix::ffi::OsStrExt;
    use std::path::PathBuf;

    fn mkfifo(path: &Path) {
        let c_path = CString::new(path.as_os_str().as_bytes()).unwrap();
        let rc = unsafe { libc::mkfifo(c_path.as_ptr(), 0o600) };
        assert_eq!(rc, 0, "mkfifo failed: {}", io::Error::last_os_error());
    }

    #[test]
    fn round_trip_through_fifo() {
        let dir = tempfile::tempdir().unwrap();
        let path: PathBuf = dir.path().join("stream.fifo");
        mkfifo(&path);

        let producer = {
            let path = path.clone();
            thread::spawn(move || {
                // Give the reader a head start so the attach wait is real
                thread::sleep(Duration::from_millis(200));
                let sink = OpenOptions::new().write(true).open(&path).unwrap();
                let stream = StreamWriter::new(sink);
                let mut file = stream.open(b"piped").unwrap();
                file.write(b"through the fifo").unwrap();
                file.close().unwrap();
            })
        };

        let mut reader = StreamReader::from_fifo(&path, 10).unwrap();
        let mut chunk = Chunk::new();

        assert_eq!(reader.next_chunk(&mut chunk).unwrap(), ReadStatus::Chunk);
        assert_eq!(chunk.chunk_type, ChunkType::Payload);
        assert_eq!(chunk.path, b"piped");
        assert_eq!(chunk.data, b"through the fifo");
        chunk.validate_checksum().unwrap();

        assert_eq!(reader.next_chunk(&mut chunk).unwrap(), ReadStatus::Chunk);
        assert_eq!(chunk.chunk_type, ChunkType::Eof);
        assert_eq!(reader.next_chunk(&mut chunk).unwrap(), ReadStatus::EndOfStream);

        producer.join().unwrap();
    }

    #[test]
    fn times_out_without_a_writer() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("lonely.fifo");
        mkfifo(&path);

        let started = Instant::now();
        match StreamReader::from_fifo(&path, 1) {
            Err(ReadError::Timeout) => {}
            other => panic!("expected Timeout, got {:?}", other.map(|_| ())),
        }
        assert!(started.elapsed() >= Duration::from_secs(1));
    }

    #[test]
    fn missing_fifo_is_a_source_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("absent.fifo");
        assert!(matches!(
            StreamReader::from_fifo(&path, 1),
            Err(ReadError::Source(_))
        ));
    }
}
