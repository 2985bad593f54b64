//! The persisted store image: exactly `capacity * block_size` raw bytes, no
//! header, no magic and no embedded bitmap.

use crate::error::{BlockStoreError, Result};
use log::warn;
use std::fs::{File, OpenOptions};
use std::io::{ErrorKind, Read, Write};
use std::path::Path;

/// Creates or truncates the image file at `path`. New files are readable and
/// writable by the owner only.
pub(crate) fn create_image_file<P: AsRef<Path>>(path: P) -> std::io::Result<File> {
    let mut opts = OpenOptions::new();
    opts.write(true).create(true).truncate(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        opts.mode(0o600);
    }
    opts.open(path)
}

/// Opens an existing image read only. Return error if the file does not
/// exist rather than create one.
pub(crate) fn open_image_file<P: AsRef<Path>>(path: P) -> std::io::Result<File> {
    OpenOptions::new().read(true).open(path)
}

/// Writes all of `bytes` to `dest`. A sink that stops accepting bytes part way
/// through is a failure of the whole write.
pub(crate) fn write_image<W: Write>(dest: &mut W, bytes: &[u8]) -> Result<usize> {
    let mut written = 0;
    while written < bytes.len() {
        match dest.write(&bytes[written..]) {
            Ok(0) => {
                warn!("image write stopped after {} of {} bytes", written, bytes.len());
                return Err(BlockStoreError::ShortWrite {
                    expected: bytes.len(),
                    actual: written,
                });
            }
            Ok(n) => written += n,
            Err(ref e) if e.kind() == ErrorKind::Interrupted => {}
            Err(e) => return Err(e.into()),
        }
    }
    dest.flush()?;
    Ok(written)
}

/// Fills `buf` from `src`. Running out of input before `buf` is full is a
/// failure, any bytes past `buf.len()` are left unread.
pub(crate) fn read_image<R: Read>(src: &mut R, buf: &mut [u8]) -> Result<()> {
    let mut filled = 0;
    while filled < buf.len() {
        match src.read(&mut buf[filled..]) {
            Ok(0) => {
                warn!("image ended after {} of {} bytes", filled, buf.len());
                return Err(BlockStoreError::ShortRead {
                    expected: buf.len(),
                    actual: filled,
                });
            }
            Ok(n) => filled += n,
            Err(ref e) if e.kind() == ErrorKind::Interrupted => {}
            Err(e) => return Err(e.into()),
        }
    }
    Ok(())
}
