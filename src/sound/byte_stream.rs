//! Byte stream adapter for codec I/O
//!
//! The codec reads its input through four operations: read, seek, tell and
//! close. `ByteStream` provides them over any caller supplied
//! `SeekableReadStream`. Close is a no-op; releasing the underlying stream is
//! decided by the `DisposeAfterUse` flag when the adapter is dropped.

use std::fs::File;
use std::io::{self, BufReader, Cursor, Read, Seek, SeekFrom};

/// Whether an adapter releases the stream it was given when it is dropped
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DisposeAfterUse {
    /// The caller keeps responsibility for the stream
    #[default]
    No,
    /// The adapter calls `SeekableReadStream::dispose` on teardown
    Yes,
}

impl From<bool> for DisposeAfterUse {
    fn from(dispose: bool) -> Self {
        if dispose {
            DisposeAfterUse::Yes
        } else {
            DisposeAfterUse::No
        }
    }
}

/// Origin for `ByteStream::seek`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum Whence {
    Set = 0,
    Cur = 1,
    End = 2,
}

impl Whence {
    /// Map a C `SEEK_*` constant
    pub fn from_i32(whence: i32) -> Option<Self> {
        match whence {
            0 => Some(Whence::Set),
            1 => Some(Whence::Cur),
            2 => Some(Whence::End),
            _ => None,
        }
    }
}

/// A readable, seekable byte source that can be explicitly released
pub trait SeekableReadStream: Read + Seek {
    /// Release whatever the stream holds. Called at most once, and only when
    /// the owning adapter was created with `DisposeAfterUse::Yes`.
    fn dispose(&mut self) {}
}

impl SeekableReadStream for File {}

impl<T: AsRef<[u8]>> SeekableReadStream for Cursor<T> {}

impl<R: Read + Seek> SeekableReadStream for BufReader<R> {}

impl<S: SeekableReadStream + ?Sized> SeekableReadStream for &mut S {
    fn dispose(&mut self) {
        (**self).dispose()
    }
}

impl<S: SeekableReadStream + ?Sized> SeekableReadStream for Box<S> {
    fn dispose(&mut self) {
        (**self).dispose()
    }
}

/// Adapter exposing the codec I/O contract over a `SeekableReadStream`
pub struct ByteStream<S: SeekableReadStream> {
    inner: S,
    dispose: DisposeAfterUse,
    disposed: bool,
}

impl<S: SeekableReadStream> ByteStream<S> {
    pub fn new(inner: S, dispose: DisposeAfterUse) -> Self {
        Self {
            inner,
            dispose,
            disposed: false,
        }
    }

    pub fn dispose_after_use(&self) -> DisposeAfterUse {
        self.dispose
    }

    pub fn get_ref(&self) -> &S {
        &self.inner
    }

    /// Read up to `buf.len()` bytes
    ///
    /// Performs a single underlying read, so short reads are passed through
    /// as-is. Returns 0 at end of stream or on I/O error.
    pub fn read_bytes(&mut self, buf: &mut [u8]) -> usize {
        loop {
            match self.inner.read(buf) {
                Ok(n) => return n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    log::debug!("byte stream read failed: {}", e);
                    return 0;
                }
            }
        }
    }

    /// Reposition the stream
    ///
    /// End-relative seeks only accept offsets `<= 0`; a positive offset would
    /// land past the end of the data and is rejected. On failure the
    /// position is left unchanged.
    pub fn seek(&mut self, offset: i64, whence: Whence) -> bool {
        let target = match whence {
            Whence::Set => {
                if offset < 0 {
                    return false;
                }
                SeekFrom::Start(offset as u64)
            }
            Whence::Cur => SeekFrom::Current(offset),
            Whence::End => {
                if offset > 0 {
                    return false;
                }
                SeekFrom::End(offset)
            }
        };

        let previous = self.tell();
        match self.inner.seek(target) {
            Ok(_) => true,
            Err(e) => {
                log::debug!("byte stream seek failed: {}", e);
                if let Some(pos) = previous {
                    if let Err(e) = self.inner.seek(SeekFrom::Start(pos)) {
                        log::debug!("byte stream position restore to {} failed: {}", pos, e);
                    }
                }
                false
            }
        }
    }

    /// Absolute position, or `None` if the stream cannot report it
    pub fn tell(&mut self) -> Option<u64> {
        self.inner.stream_position().ok()
    }

    /// Codec-side close; the stream itself stays open
    pub fn close(&mut self) -> i32 {
        0
    }
}

impl<S: SeekableReadStream> Read for ByteStream<S> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.inner.read(buf)
    }
}

impl<S: SeekableReadStream> Seek for ByteStream<S> {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        let (offset, whence) = match pos {
            SeekFrom::Start(off) => (
                i64::try_from(off).map_err(|_| invalid_seek())?,
                Whence::Set,
            ),
            SeekFrom::Current(off) => (off, Whence::Cur),
            SeekFrom::End(off) => (off, Whence::End),
        };

        if !ByteStream::seek(self, offset, whence) {
            return Err(invalid_seek());
        }
        self.tell().ok_or_else(invalid_seek)
    }
}

fn invalid_seek() -> io::Error {
    io::Error::new(io::ErrorKind::InvalidInput, "invalid seek")
}

impl<S: SeekableReadStream> Drop for ByteStream<S> {
    fn drop(&mut self) {
        if self.dispose == DisposeAfterUse::Yes && !self.disposed {
            self.disposed = true;
            self.inner.dispose();
        }
    }
}
