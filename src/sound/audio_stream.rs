//! Pull-based PCM source traits
//!
//! These are the interfaces the mixer side consumes. Decoders hand out
//! interleaved signed 16-bit samples in native byte order and report their
//! format through the accessor methods.

use super::timestamp::Timestamp;

/// A source of interleaved 16-bit PCM samples
pub trait AudioStream {
    /// Fill `buffer` with up to `buffer.len()` interleaved samples
    ///
    /// # Returns
    /// The number of samples written. Fewer than requested (including zero)
    /// means the stream ran out of data or hit a decode failure.
    fn read_buffer(&mut self, buffer: &mut [i16]) -> usize;

    /// Returns true if samples are interleaved left/right pairs
    fn is_stereo(&self) -> bool;

    /// Sample rate in Hz
    fn rate(&self) -> u32;

    /// Returns true once every decoded sample has been consumed
    ///
    /// Does not trigger any decoding.
    fn end_of_data(&self) -> bool;

    /// Returns true when no more data will ever be produced
    ///
    /// For non-looping streams this is the same as `end_of_data`.
    fn end_of_stream(&self) -> bool {
        self.end_of_data()
    }

    /// Number of interleaved channels
    fn channels(&self) -> u16 {
        if self.is_stereo() {
            2
        } else {
            1
        }
    }
}

/// An `AudioStream` that supports random access
pub trait SeekableAudioStream: AudioStream {
    /// Reposition to `target`
    ///
    /// # Returns
    /// `false` if the position could not be reached. The stream then reports
    /// end of data until a later seek succeeds.
    fn seek(&mut self, target: Timestamp) -> bool;

    /// Total length of the stream
    fn length(&self) -> Timestamp;

    /// Seek back to the beginning
    fn rewind(&mut self) -> bool {
        let rate = self.rate();
        self.seek(Timestamp::zero(rate))
    }
}

impl<T: AudioStream + ?Sized> AudioStream for Box<T> {
    fn read_buffer(&mut self, buffer: &mut [i16]) -> usize {
        (**self).read_buffer(buffer)
    }

    fn is_stereo(&self) -> bool {
        (**self).is_stereo()
    }

    fn rate(&self) -> u32 {
        (**self).rate()
    }

    fn end_of_data(&self) -> bool {
        (**self).end_of_data()
    }

    fn end_of_stream(&self) -> bool {
        (**self).end_of_stream()
    }
}

impl<T: SeekableAudioStream + ?Sized> SeekableAudioStream for Box<T> {
    fn seek(&mut self, target: Timestamp) -> bool {
        (**self).seek(target)
    }

    fn length(&self) -> Timestamp {
        (**self).length()
    }
}

/// Convert a timestamp into a sample position of a stream running at `rate`
///
/// For stereo streams the position counts interleaved samples, so the rate is
/// doubled and the result is rounded down to a whole frame pair. Decoders
/// that address positions per channel pass `is_stereo = false`.
pub fn convert_time_to_stream_pos(target: Timestamp, rate: u32, is_stereo: bool) -> Timestamp {
    let factor = if is_stereo { 2 } else { 1 };
    let result = target.convert_to_framerate(rate.saturating_mul(factor));

    if is_stereo && result.total_frames() % 2 != 0 {
        result.add_frames(-1)
    } else {
        result
    }
}
