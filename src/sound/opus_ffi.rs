//! C FFI bindings for the Rust Opus stream
//!
//! C code supplies the compressed data through an `OpusStreamCallbacks`
//! table and an opaque handle, then pulls PCM through the exported
//! `rust_opus_*` functions. Streams are returned as opaque pointers and must
//! be released with `rust_opus_free`.

use std::ffi::{c_int, c_void};
use std::io::{self, Read, Seek, SeekFrom};
use std::ptr;
use std::slice;

use super::audio_stream::{AudioStream, SeekableAudioStream};
use super::byte_stream::{DisposeAfterUse, SeekableReadStream};
use super::opus::{make_opus_stream, OpusStream};
use super::opus_file::OggOpusFile;
use super::timestamp::Timestamp;

/// Byte source callbacks supplied by C
///
/// `read` returns the number of bytes stored (0 at end of stream, negative
/// on error). `seek` takes a `SEEK_SET`/`SEEK_CUR`/`SEEK_END` origin and
/// returns 0 on success. `tell` returns the absolute position or a negative
/// value. `close` is optional and only called when the stream was handed over
/// with a non-zero `dispose` flag.
#[repr(C)]
#[derive(Clone, Copy)]
pub struct OpusStreamCallbacks {
    pub read: Option<unsafe extern "C" fn(handle: *mut c_void, buf: *mut u8, nbytes: c_int) -> c_int>,
    pub seek: Option<unsafe extern "C" fn(handle: *mut c_void, offset: i64, whence: c_int) -> c_int>,
    pub tell: Option<unsafe extern "C" fn(handle: *mut c_void) -> i64>,
    pub close: Option<unsafe extern "C" fn(handle: *mut c_void) -> c_int>,
}

/// A C byte source driven through its callback table
pub struct CallbackStream {
    handle: *mut c_void,
    callbacks: OpusStreamCallbacks,
}

fn callback_error(what: &str) -> io::Error {
    io::Error::new(io::ErrorKind::Other, format!("{} callback failed", what))
}

impl Read for CallbackStream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let read = self
            .callbacks
            .read
            .ok_or_else(|| io::Error::from(io::ErrorKind::Unsupported))?;
        let len = buf.len().min(c_int::MAX as usize);
        let result = unsafe { read(self.handle, buf.as_mut_ptr(), len as c_int) };
        if result < 0 {
            return Err(callback_error("read"));
        }
        Ok((result as usize).min(len))
    }
}

impl Seek for CallbackStream {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        let seek = self
            .callbacks
            .seek
            .ok_or_else(|| io::Error::from(io::ErrorKind::Unsupported))?;
        let (offset, whence) = match pos {
            SeekFrom::Start(off) => (
                i64::try_from(off).map_err(|_| io::Error::from(io::ErrorKind::InvalidInput))?,
                0,
            ),
            SeekFrom::Current(off) => (off, 1),
            SeekFrom::End(off) => (off, 2),
        };

        if unsafe { seek(self.handle, offset, whence) } != 0 {
            return Err(callback_error("seek"));
        }
        self.stream_position()
    }

    fn stream_position(&mut self) -> io::Result<u64> {
        let tell = self
            .callbacks
            .tell
            .ok_or_else(|| io::Error::from(io::ErrorKind::Unsupported))?;
        let pos = unsafe { tell(self.handle) };
        u64::try_from(pos).map_err(|_| callback_error("tell"))
    }
}

impl SeekableReadStream for CallbackStream {
    fn dispose(&mut self) {
        if let Some(close) = self.callbacks.close {
            unsafe {
                close(self.handle);
            }
        }
    }
}

/// Stream type behind the opaque pointers handed to C
pub type RustOpusStream = OpusStream<OggOpusFile<CallbackStream>>;

unsafe fn stream_ref<'a>(stream: *mut c_void) -> Option<&'a mut RustOpusStream> {
    (stream as *mut RustOpusStream).as_mut()
}

/// Open an Ogg Opus stream over C callbacks
///
/// Returns null if the data is not a playable Opus stream. When `dispose` is
/// non-zero the `close` callback runs once the stream is freed, or
/// immediately if opening fails.
///
/// # Safety
/// `callbacks` must point to a valid table, and `handle` must remain valid
/// for the callbacks until the stream is freed.
#[no_mangle]
pub unsafe extern "C" fn rust_opus_make_stream(
    handle: *mut c_void,
    callbacks: *const OpusStreamCallbacks,
    dispose: c_int,
) -> *mut c_void {
    if callbacks.is_null() {
        log::warn!("rust_opus_make_stream: null callback table");
        return ptr::null_mut();
    }

    let callbacks = *callbacks;
    if callbacks.read.is_none() || callbacks.seek.is_none() || callbacks.tell.is_none() {
        log::warn!("rust_opus_make_stream: read, seek and tell callbacks are required");
        return ptr::null_mut();
    }

    let source = CallbackStream { handle, callbacks };
    match make_opus_stream(source, DisposeAfterUse::from(dispose != 0)) {
        Some(stream) => Box::into_raw(Box::new(stream)) as *mut c_void,
        None => ptr::null_mut(),
    }
}

/// Decode up to `num_samples` interleaved samples into `buffer`
///
/// # Safety
/// `stream` must come from `rust_opus_make_stream`; `buffer` must hold
/// `num_samples` values.
#[no_mangle]
pub unsafe extern "C" fn rust_opus_read_buffer(
    stream: *mut c_void,
    buffer: *mut i16,
    num_samples: c_int,
) -> c_int {
    if buffer.is_null() || num_samples <= 0 {
        return 0;
    }
    let Some(stream) = stream_ref(stream) else {
        return 0;
    };

    let out = slice::from_raw_parts_mut(buffer, num_samples as usize);
    stream.read_buffer(out) as c_int
}

/// Seek to `msecs` milliseconds; returns 1 on success
///
/// # Safety
/// `stream` must come from `rust_opus_make_stream`.
#[no_mangle]
pub unsafe extern "C" fn rust_opus_seek(stream: *mut c_void, msecs: u32) -> c_int {
    match stream_ref(stream) {
        Some(stream) => stream.seek(Timestamp::new(msecs as i64, 1000)) as c_int,
        None => 0,
    }
}

/// # Safety
/// `stream` must come from `rust_opus_make_stream`.
#[no_mangle]
pub unsafe extern "C" fn rust_opus_end_of_data(stream: *mut c_void) -> c_int {
    match stream_ref(stream) {
        Some(stream) => stream.end_of_data() as c_int,
        None => 1,
    }
}

/// # Safety
/// `stream` must come from `rust_opus_make_stream`.
#[no_mangle]
pub unsafe extern "C" fn rust_opus_is_stereo(stream: *mut c_void) -> c_int {
    stream_ref(stream).map_or(0, |s| s.is_stereo() as c_int)
}

/// # Safety
/// `stream` must come from `rust_opus_make_stream`.
#[no_mangle]
pub unsafe extern "C" fn rust_opus_get_rate(stream: *mut c_void) -> c_int {
    stream_ref(stream).map_or(0, |s| s.rate() as c_int)
}

/// Stream length in milliseconds, 0 if unknown
///
/// # Safety
/// `stream` must come from `rust_opus_make_stream`.
#[no_mangle]
pub unsafe extern "C" fn rust_opus_get_length_ms(stream: *mut c_void) -> i64 {
    stream_ref(stream).map_or(0, |s| s.length().msecs())
}

/// Release a stream, running the `close` callback if it owns the source
///
/// # Safety
/// `stream` must come from `rust_opus_make_stream` and not be used again.
#[no_mangle]
pub unsafe extern "C" fn rust_opus_free(stream: *mut c_void) {
    if stream.is_null() {
        return;
    }
    drop(Box::from_raw(stream as *mut RustOpusStream));
}
