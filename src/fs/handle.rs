//! Positioned byte-stream view over a descriptor.

use crate::error::DescriptorError;
use crate::fs::descriptor::Descriptor;
use crate::fs::types::{OpenMode, OpenOptions, SeekFrom};
use crate::path::FsPath;
use crate::util::errno;

/// Read chunk used when draining a file of unknown size.
const READ_ALL_CHUNK: usize = 64 * 1024;

/// A descriptor plus the kernel-maintained file position.
///
/// Not internally synchronised: two threads sharing a handle must coordinate
/// externally, same as they would for a raw fd.
#[derive(Debug)]
pub struct Handle {
    desc: Descriptor,
}

impl Handle {
    /// Opens `path` and wraps the descriptor in a positioned handle.
    #[inline]
    pub fn open(
        path: &FsPath,
        mode: OpenMode,
        options: OpenOptions,
    ) -> Result<Self, DescriptorError> {
        Descriptor::open(path, mode, options).map(Self::from_descriptor)
    }

    /// Takes over an already-open descriptor (and its close obligation).
    #[inline]
    #[must_use]
    pub const fn from_descriptor(desc: Descriptor) -> Self {
        Self { desc }
    }

    /// The underlying descriptor.
    #[inline]
    #[must_use]
    pub const fn descriptor(&self) -> &Descriptor {
        &self.desc
    }

    /// Reads up to `count` bytes from the current position.
    ///
    /// The returned buffer is only shorter than `count` when end-of-file was
    /// reached; transient short reads and `EINTR` are retried internally.
    pub fn read(&mut self, count: usize) -> Result<Vec<u8>, DescriptorError> {
        let mut buf = vec![0_u8; count];
        let mut filled = 0_usize;
        while filled < count {
            // SAFETY: buf has count bytes of valid writable memory past filled
            let n = unsafe {
                libc::read(
                    self.desc.fd,
                    buf[filled..].as_mut_ptr().cast(),
                    count - filled,
                )
            };
            match n {
                0 => break, // end of file
                n if n > 0 => filled += n as usize,
                _ => {
                    let err = errno();
                    if err == libc::EINTR {
                        continue;
                    }
                    return Err(DescriptorError::ReadFailed { errno: err });
                }
            }
        }
        buf.truncate(filled);
        Ok(buf)
    }

    /// Writes all of `bytes`, retrying short writes and `EINTR` until done.
    pub fn write(&mut self, bytes: &[u8]) -> Result<(), DescriptorError> {
        write_full(&self.desc, bytes).map_err(|(written, err)| DescriptorError::WriteFailed {
            written,
            expected: bytes.len(),
            errno: err,
        })
    }

    /// Moves the file position; returns the resulting absolute offset.
    pub fn seek(&mut self, pos: SeekFrom) -> Result<u64, DescriptorError> {
        let (whence, offset) = pos.to_whence_offset();
        // SAFETY: plain lseek on an owned fd
        let at = unsafe { libc::lseek(self.desc.fd, offset as libc::off_t, whence) };
        if at < 0 {
            return Err(DescriptorError::SeekFailed { errno: errno() });
        }
        Ok(at as u64)
    }

    /// Back to offset 0. Always returns 0 on success.
    #[inline]
    pub fn rewind(&mut self) -> Result<u64, DescriptorError> {
        self.seek(SeekFrom::Start(0))
    }

    /// To the end of the file; returns the file size at this instant.
    #[inline]
    pub fn seek_to_end(&mut self) -> Result<u64, DescriptorError> {
        self.seek(SeekFrom::End(0))
    }

    /// Closes the underlying descriptor (idempotent).
    #[inline]
    pub fn close(&mut self) -> Result<(), DescriptorError> {
        self.desc.close()
    }
}

/// The full-write loop shared with the atomic-write protocol: loops over
/// `write(2)` until every byte is out, retrying `EINTR`. On failure returns
/// how far it got plus the errno, so callers can report both.
pub(crate) fn write_full(desc: &Descriptor, bytes: &[u8]) -> Result<(), (usize, i32)> {
    let mut written = 0_usize;
    while written < bytes.len() {
        // SAFETY: the range is in bounds and the fd is owned by desc
        let n = unsafe {
            libc::write(
                desc.fd,
                bytes[written..].as_ptr().cast(),
                bytes.len() - written,
            )
        };
        if n < 0 {
            let err = errno();
            if err == libc::EINTR {
                continue;
            }
            return Err((written, err));
        }
        written += n as usize;
    }
    Ok(())
}

/// Reads an entire file into memory.
pub fn read_all(path: &FsPath) -> Result<Vec<u8>, DescriptorError> {
    Descriptor::with_open(path, OpenMode::Read, OpenOptions::new(), |desc| {
        let mut handle = ChunkReader { fd: desc.fd };
        let mut out = Vec::new();
        loop {
            let n = handle.read_into(&mut out)?;
            if n == 0 {
                return Ok(out);
            }
        }
    })
}

/// Replaces the contents of `path` with `bytes` (create + truncate). Not
/// crash-safe; use the atomic writer when that matters.
pub fn write_all(path: &FsPath, bytes: &[u8]) -> Result<(), DescriptorError> {
    let opts = OpenOptions::new().create(true).truncate(true);
    Descriptor::with_open(path, OpenMode::Write, opts, |desc| {
        write_full(desc, bytes).map_err(|(written, err)| DescriptorError::WriteFailed {
            written,
            expected: bytes.len(),
            errno: err,
        })
    })
}

/// Borrowed-fd chunked reader for [`read_all`]; avoids moving a `Handle`
/// into the scoped closure just to loop over `read(2)`.
struct ChunkReader {
    fd: i32,
}

impl ChunkReader {
    fn read_into(&mut self, out: &mut Vec<u8>) -> Result<usize, DescriptorError> {
        let start = out.len();
        out.resize(start + READ_ALL_CHUNK, 0);
        loop {
            // SAFETY: the freshly resized tail is valid writable memory
            let n = unsafe { libc::read(self.fd, out[start..].as_mut_ptr().cast(), READ_ALL_CHUNK) };
            if n >= 0 {
                out.truncate(start + n as usize);
                return Ok(n as usize);
            }
            let err = errno();
            if err != libc::EINTR {
                out.truncate(start);
                return Err(DescriptorError::ReadFailed { errno: err });
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scratch(name: &str) -> FsPath {
        let dir = tempfile::tempdir().unwrap().keep();
        FsPath::try_from(dir.join(name).as_path()).unwrap()
    }

    #[test]
    fn write_then_read_back() {
        let path = scratch("rw.bin");
        let mut h = Handle::open(
            &path,
            OpenMode::ReadWrite,
            OpenOptions::new().create(true),
        )
        .unwrap();
        h.write(b"hello world").unwrap();
        assert_eq!(h.rewind().unwrap(), 0);
        let back = h.read(1024).unwrap();
        assert_eq!(back, b"hello world");
        h.close().unwrap();
    }

    #[test]
    fn seek_semantics() {
        let path = scratch("seek.bin");
        let mut h = Handle::open(
            &path,
            OpenMode::ReadWrite,
            OpenOptions::new().create(true),
        )
        .unwrap();
        h.write(&[0_u8; 100]).unwrap();
        assert_eq!(h.seek(SeekFrom::Start(10)).unwrap(), 10);
        assert_eq!(h.seek(SeekFrom::Current(5)).unwrap(), 15);
        assert_eq!(h.seek(SeekFrom::End(-20)).unwrap(), 80);
        assert_eq!(h.seek_to_end().unwrap(), 100);
        assert_eq!(h.rewind().unwrap(), 0);
        h.close().unwrap();
    }

    #[test]
    fn short_read_at_eof() {
        let path = scratch("short.bin");
        write_all(&path, b"abc").unwrap();
        let mut h = Handle::open(&path, OpenMode::Read, OpenOptions::new()).unwrap();
        let got = h.read(1024).unwrap();
        assert_eq!(got, b"abc");
        // at EOF a read returns an empty buffer, not an error
        assert!(h.read(16).unwrap().is_empty());
        h.close().unwrap();
    }

    #[test]
    fn read_all_round_trip() {
        let path = scratch("all.bin");
        let payload: Vec<u8> = (0..=255).cycle().take(3 * READ_ALL_CHUNK / 2).map(|b| b as u8).collect();
        write_all(&path, &payload).unwrap();
        assert_eq!(read_all(&path).unwrap(), payload);
    }
}
