use std::io::{ErrorKind, Read};

/// Read until `buf` is full or the source runs dry. Returns how many
/// bytes landed; anything short of `buf.len()` means end of input.
///
/// `read` is retried on EINTR, which matters when the source is a FIFO.
pub(crate) fn read_full<R: Read>(src: &mut R, buf: &mut [u8]) -> std::io::Result<usize> {
    let mut total = 0;

    while total < buf.len() {
        match src.read(&mut buf[total..]) {
            Ok(0) => break,
            Ok(n) => total += n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(total)
}
