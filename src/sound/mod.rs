//! Streaming Opus decoding
//!
//! Exposes Ogg Opus data as a pull-based PCM source. Compressed bytes come
//! from any seekable reader; samples come out as interleaved signed 16-bit
//! values at 48 kHz.
//!
//! # Architecture
//!
//! - `byte_stream` adapts a readable/seekable source to the codec's I/O needs
//! - `opus_file` parses the Ogg container and drives the Opus codec
//! - `opus` buffers decoded frames and implements `SeekableAudioStream`
//! - `opus_error` maps codec status codes to messages
//! - `opus_ffi` exposes streams to C through a callback table
//! - `rodio_source` hands a stream to rodio for playback
//! - `wav_writer` stores decoded PCM as a WAVE file

pub mod audio_stream;
pub mod byte_stream;
pub mod opus;
pub mod opus_error;
pub mod opus_ffi;
pub mod opus_file;
pub mod rodio_source;
pub mod timestamp;
pub mod wav_writer;

pub use audio_stream::{convert_time_to_stream_pos, AudioStream, SeekableAudioStream};
pub use byte_stream::{ByteStream, DisposeAfterUse, SeekableReadStream, Whence};
pub use opus::{
    make_opus_stream, make_opus_stream_from_decoder, OpusStream, StreamState, OPUS_BUFFER_SIZE,
};
pub use opus_error::{opus_error, OpusStatus};
pub use opus_file::{OggOpusFile, OpusDecode, OpusHead, OpusTags, OPUS_RATE};
pub use rodio_source::RodioSource;
pub use timestamp::Timestamp;
pub use wav_writer::{WavWriteError, WavWriter};

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_module_exports() {
        // Garbage input must not produce a stream
        let stream = make_opus_stream(Cursor::new(vec![0u8; 64]), DisposeAfterUse::No);
        assert!(stream.is_none());
        assert_eq!(opus_error(OpusStatus::NoSeek.code()), "Non-seekable stream");
        assert_eq!(Timestamp::zero(OPUS_RATE).msecs(), 0);
    }
}
