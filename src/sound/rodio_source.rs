//! rodio playback adapter
//!
//! Wraps a `SeekableAudioStream` as a `rodio::Source` so it can be appended
//! to a `Sink`. Samples are pulled through `read_buffer` in fixed-size
//! chunks.

use std::time::Duration;

use rodio::Source;

use super::audio_stream::{AudioStream, SeekableAudioStream};

/// Default number of interleaved samples pulled per refill
pub const DEFAULT_CHUNK_SAMPLES: usize = 4096;

pub struct RodioSource<A: SeekableAudioStream> {
    stream: A,
    chunk: Vec<i16>,
    pos: usize,
    len: usize,
    channels: u16,
    rate: u32,
    duration: Option<Duration>,
}

impl<A: SeekableAudioStream> RodioSource<A> {
    pub fn new(stream: A) -> Self {
        Self::with_chunk_size(stream, DEFAULT_CHUNK_SAMPLES)
    }

    /// `chunk_samples` is rounded up to a whole number of frames
    pub fn with_chunk_size(stream: A, chunk_samples: usize) -> Self {
        let channels = stream.channels();
        let frame = channels as usize;
        let chunk_samples = chunk_samples.max(frame).div_ceil(frame) * frame;

        let length_ms = stream.length().msecs();
        let duration = if length_ms > 0 {
            Some(Duration::from_millis(length_ms as u64))
        } else {
            None
        };

        Self {
            rate: stream.rate(),
            stream,
            chunk: vec![0; chunk_samples],
            pos: 0,
            len: 0,
            channels,
            duration,
        }
    }

    pub fn inner(&self) -> &A {
        &self.stream
    }

    pub fn into_inner(self) -> A {
        self.stream
    }
}

impl<A: SeekableAudioStream> Iterator for RodioSource<A> {
    type Item = i16;

    fn next(&mut self) -> Option<i16> {
        if self.pos >= self.len {
            self.len = self.stream.read_buffer(&mut self.chunk);
            self.pos = 0;
            if self.len == 0 {
                return None;
            }
        }

        let sample = self.chunk[self.pos];
        self.pos += 1;
        Some(sample)
    }
}

impl<A: SeekableAudioStream> Source for RodioSource<A> {
    fn current_frame_len(&self) -> Option<usize> {
        None
    }

    fn channels(&self) -> u16 {
        self.channels
    }

    fn sample_rate(&self) -> u32 {
        self.rate
    }

    fn total_duration(&self) -> Option<Duration> {
        self.duration
    }
}
