//! Block producer: fills pool buffers from the current file position.

use std::io::{ErrorKind, Read};

/// Fill `buf` from `reader`, accumulating short reads until the buffer is
/// full or the stream ends. Returns the number of valid bytes; zero signals
/// end of file.
pub fn read_block<R: Read>(reader: &mut R, buf: &mut [u8]) -> std::io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}
