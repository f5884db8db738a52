//! Ogg Opus audio stream
//!
//! Turns an `OpusDecode` codec into a seekable PCM source. Decoded audio is
//! staged in a fixed-size buffer that is refilled a batch at a time, so the
//! amount of work done by one `read_buffer` call is bounded.
//!
//! Decoding failures never escape as errors. They are logged, and the caller
//! sees short reads, `end_of_data() == true`, or a failed seek.

use super::audio_stream::{convert_time_to_stream_pos, AudioStream, SeekableAudioStream};
use super::byte_stream::{DisposeAfterUse, SeekableReadStream};
use super::opus_error::OpusStatus;
use super::opus_file::{OggOpusFile, OpusDecode, OPUS_RATE};
use super::timestamp::Timestamp;

/// Sample buffer capacity: 120 ms of 48 kHz stereo audio
pub const OPUS_BUFFER_SIZE: usize = 120 * 48 * 2;

/// Where the refill state machine currently stands
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamState {
    /// The buffer holds decoded samples
    Ready,
    /// The codec reported end of stream
    Exhausted,
    /// A decode or seek failed; only a successful seek recovers
    Failed,
}

/// Seekable PCM stream backed by an Opus codec
pub struct OpusStream<D: OpusDecode> {
    file: D,
    channels: u8,
    rate: u32,
    length: Timestamp,
    buffer: Box<[i16]>,
    /// Next unread sample
    pos: usize,
    /// End of the decoded samples
    end: usize,
    state: StreamState,
}

impl<D: OpusDecode> OpusStream<D> {
    /// Wrap an opened codec and decode the first batch of audio
    ///
    /// Check `end_of_data()` afterwards: a stream that produced nothing is
    /// unusable. `make_opus_stream_from_decoder` does that check.
    pub fn new(file: D) -> Self {
        let mut stream = Self {
            channels: file.channel_count(),
            file,
            // Opus is always decoded at 48 kHz, whatever the input rate was
            rate: OPUS_RATE,
            length: Timestamp::zero(1000),
            buffer: vec![0i16; OPUS_BUFFER_SIZE].into_boxed_slice(),
            pos: 0,
            end: 0,
            state: StreamState::Ready,
        };

        if !stream.fill_buffer() {
            return stream;
        }

        match stream.file.pcm_total() {
            Ok(total) => stream.length = Timestamp::from_frames(total, stream.rate),
            Err(status) => {
                log::warn!("Could not determine length of Opus stream: {}", status);
            }
        }

        stream
    }

    pub fn state(&self) -> StreamState {
        self.state
    }

    pub fn channel_count(&self) -> u8 {
        self.channels
    }

    /// Access the underlying codec
    pub fn decoder(&self) -> &D {
        &self.file
    }

    /// Decoded samples not yet handed out
    pub fn buffered(&self) -> usize {
        self.end - self.pos
    }

    /// Put the cursor at the end of the valid range so reads report no data
    fn stall(&mut self) {
        self.pos = self.end;
        self.state = StreamState::Failed;
    }

    /// Refill the sample buffer from the codec
    ///
    /// Decodes until the buffer is full or the codec reports end of stream.
    /// Holes in the data are logged and skipped. Any other failure discards
    /// the batch, stalls the stream and returns false.
    fn fill_buffer(&mut self) -> bool {
        let channels = self.channels.max(1) as usize;
        let capacity = self.buffer.len();
        let mut samples_read = 0;

        while samples_read < capacity {
            // The codec produces interleaved samples in native byte order
            match self.file.read(&mut self.buffer[samples_read..]) {
                Ok(0) => break,
                Ok(frames) => {
                    // Counts come back per channel
                    samples_read += frames * channels;
                }
                Err(status) => {
                    log::warn!("Error reading from Opus stream: {}", status);
                    if !status.is_recoverable() {
                        self.stall();
                        return false;
                    }
                }
            }
        }

        self.pos = 0;
        self.end = samples_read;
        self.state = if samples_read == 0 {
            StreamState::Exhausted
        } else {
            StreamState::Ready
        };
        log::debug!("Opus stream buffered {} samples", samples_read);

        true
    }
}

impl<D: OpusDecode> AudioStream for OpusStream<D> {
    fn read_buffer(&mut self, buffer: &mut [i16]) -> usize {
        let requested = buffer.len();
        let mut samples = 0;

        while samples < requested && self.pos < self.end {
            let len = (requested - samples).min(self.end - self.pos);
            buffer[samples..samples + len].copy_from_slice(&self.buffer[self.pos..self.pos + len]);
            self.pos += len;
            samples += len;

            if self.pos >= self.end && !self.fill_buffer() {
                break;
            }
        }

        samples
    }

    fn is_stereo(&self) -> bool {
        self.channels >= 2
    }

    fn rate(&self) -> u32 {
        self.rate
    }

    fn end_of_data(&self) -> bool {
        self.pos >= self.end
    }
}

impl<D: OpusDecode> SeekableAudioStream for OpusStream<D> {
    fn seek(&mut self, target: Timestamp) -> bool {
        // The codec addresses positions per channel
        let pos = convert_time_to_stream_pos(target, self.rate, false).total_frames();

        if let Err(status) = self.file.pcm_seek(pos) {
            log::warn!("Error seeking in Opus stream: {}", status);
            self.stall();
            return false;
        }

        self.fill_buffer()
    }

    fn length(&self) -> Timestamp {
        self.length
    }
}

/// Build a stream around an opened codec
///
/// Returns `None` if the codec produced no audio, so callers never get a
/// handle that silently plays nothing.
pub fn make_opus_stream_from_decoder<D: OpusDecode>(file: D) -> Option<OpusStream<D>> {
    let stream = OpusStream::new(file);
    if stream.end_of_data() {
        None
    } else {
        Some(stream)
    }
}

/// Open an Ogg Opus stream
///
/// With `DisposeAfterUse::Yes` the stream is disposed when the returned
/// handle is dropped, or right away if opening fails.
pub fn make_opus_stream<S: SeekableReadStream>(
    stream: S,
    dispose: DisposeAfterUse,
) -> Option<OpusStream<OggOpusFile<S>>> {
    match OggOpusFile::open(stream, dispose) {
        Ok(file) => make_opus_stream_from_decoder(file),
        Err(status) => {
            log::warn!("Could not create Opus stream: {}", status);
            None
        }
    }
}
