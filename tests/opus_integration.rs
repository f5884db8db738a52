//! Ogg Opus stream integration tests
//!
//! Streams are encoded in memory so no audio files are needed.

mod common;

use std::cell::Cell;
use std::io::{self, Cursor, Read, Seek, SeekFrom};
use std::rc::Rc;

use common::{
    build_headers_only, build_opus, build_opus_grouped, expected_frames,
    expected_trimmed_frames, page_offsets,
};
use opus_stream::sound::{
    make_opus_stream, AudioStream, DisposeAfterUse, RodioSource, SeekableAudioStream,
    SeekableReadStream, StreamState, Timestamp, OPUS_BUFFER_SIZE,
};
use rodio::Source;

fn drain<A: AudioStream>(stream: &mut A, chunk: usize) -> Vec<i16> {
    let mut out = Vec::new();
    let mut buffer = vec![0i16; chunk];
    loop {
        let n = stream.read_buffer(&mut buffer);
        if n == 0 {
            break;
        }
        out.extend_from_slice(&buffer[..n]);
    }
    out
}

/// Cursor that counts how often it was disposed
struct Tracked {
    inner: Cursor<Vec<u8>>,
    disposed: Rc<Cell<u32>>,
}

impl Read for Tracked {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.inner.read(buf)
    }
}

impl Seek for Tracked {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        self.inner.seek(pos)
    }
}

impl SeekableReadStream for Tracked {
    fn dispose(&mut self) {
        self.disposed.set(self.disposed.get() + 1);
    }
}

fn tracked(data: Vec<u8>) -> (Tracked, Rc<Cell<u32>>) {
    let disposed = Rc::new(Cell::new(0));
    (
        Tracked {
            inner: Cursor::new(data),
            disposed: disposed.clone(),
        },
        disposed,
    )
}

#[test]
fn test_open_mono() {
    let stream = make_opus_stream(Cursor::new(build_opus(1, 50)), DisposeAfterUse::No).unwrap();
    assert!(!stream.is_stereo());
    assert_eq!(stream.rate(), 48000);
    assert_eq!(stream.channels(), 1);
    assert!(!stream.end_of_data());
    assert_eq!(stream.state(), StreamState::Ready);
    assert_eq!(stream.length().total_frames(), expected_frames(50) as i64);
    assert_eq!(stream.decoder().tags().vendor, "fixture");
    assert_eq!(stream.decoder().tags().get("title"), Some("Tone"));
}

#[test]
fn test_open_stereo() {
    let stream = make_opus_stream(Cursor::new(build_opus(2, 10)), DisposeAfterUse::No).unwrap();
    assert!(stream.is_stereo());
    assert_eq!(stream.channels(), 2);
    assert_eq!(stream.length().total_frames(), expected_frames(10) as i64);
}

#[test]
fn test_first_fill_is_bounded() {
    let stream = make_opus_stream(Cursor::new(build_opus(1, 50)), DisposeAfterUse::No).unwrap();
    assert_eq!(stream.buffered(), OPUS_BUFFER_SIZE);
}

#[test]
fn test_drain_mono() {
    let mut stream =
        make_opus_stream(Cursor::new(build_opus(1, 50)), DisposeAfterUse::No).unwrap();
    let samples = drain(&mut stream, 1000);
    assert_eq!(samples.len(), expected_frames(50));
    assert!(samples.iter().any(|s| s.unsigned_abs() > 1000));
    assert!(stream.end_of_data());
    assert_eq!(stream.state(), StreamState::Exhausted);

    let mut buffer = [0i16; 16];
    assert_eq!(stream.read_buffer(&mut buffer), 0);
}

#[test]
fn test_drain_stereo_odd_chunks() {
    let mut stream =
        make_opus_stream(Cursor::new(build_opus(2, 30)), DisposeAfterUse::No).unwrap();
    let samples = drain(&mut stream, 777);
    assert_eq!(samples.len(), expected_frames(30) * 2);
}

#[test]
fn test_seek_mid_stream() {
    let mut stream =
        make_opus_stream(Cursor::new(build_opus(1, 50)), DisposeAfterUse::No).unwrap();
    assert!(stream.seek(Timestamp::new(500, 1000)));
    assert_eq!(stream.state(), StreamState::Ready);

    let samples = drain(&mut stream, 4096);
    assert_eq!(samples.len(), expected_frames(50) - 24000);
}

#[test]
fn test_seek_backwards_matches_fresh_decode() {
    let data = build_opus(1, 40);
    let mut reference = make_opus_stream(Cursor::new(data.clone()), DisposeAfterUse::No).unwrap();
    let expected = drain(&mut reference, 4096);

    let mut stream = make_opus_stream(Cursor::new(data), DisposeAfterUse::No).unwrap();
    drain(&mut stream, 4096);
    assert!(stream.end_of_data());

    assert!(stream.rewind());
    let replay = drain(&mut stream, 4096);
    assert_eq!(replay, expected);
}

#[test]
fn test_seek_stereo_uses_per_channel_position() {
    let mut stream =
        make_opus_stream(Cursor::new(build_opus(2, 50)), DisposeAfterUse::No).unwrap();
    assert!(stream.seek(Timestamp::new(250, 1000)));
    let samples = drain(&mut stream, 4096);
    assert_eq!(samples.len(), (expected_frames(50) - 12000) * 2);
}

#[test]
fn test_seek_past_end_fails_then_recovers() {
    let mut stream =
        make_opus_stream(Cursor::new(build_opus(1, 20)), DisposeAfterUse::No).unwrap();
    let beyond = stream.length().add_msecs(1000);
    assert!(!stream.seek(beyond));
    assert!(stream.end_of_data());
    assert_eq!(stream.state(), StreamState::Failed);

    let mut buffer = [0i16; 64];
    assert_eq!(stream.read_buffer(&mut buffer), 0);

    assert!(stream.seek(Timestamp::zero(1000)));
    assert!(!stream.end_of_data());
    assert_eq!(drain(&mut stream, 512).len(), expected_frames(20));
}

#[test]
fn test_seek_to_end() {
    let mut stream =
        make_opus_stream(Cursor::new(build_opus(1, 20)), DisposeAfterUse::No).unwrap();
    let length = stream.length();
    assert!(stream.seek(length));
    assert!(stream.end_of_data());
    assert_eq!(stream.state(), StreamState::Exhausted);
}

#[test]
fn test_garbage_input_rejected() {
    let junk: Vec<u8> = (0..8192u32).map(|i| (i * 31 % 251) as u8).collect();
    assert!(make_opus_stream(Cursor::new(junk), DisposeAfterUse::No).is_none());
    assert!(make_opus_stream(Cursor::new(Vec::new()), DisposeAfterUse::No).is_none());
}

#[test]
fn test_headers_only_rejected() {
    assert!(make_opus_stream(Cursor::new(build_headers_only()), DisposeAfterUse::No).is_none());
}

#[test]
fn test_truncated_stream_still_plays() {
    let mut data = build_opus(1, 30);
    let pages = page_offsets(&data);
    // Cut the final page in half
    let last = pages[pages.len() - 1];
    data.truncate(last + (data.len() - last) / 2);

    let mut stream = make_opus_stream(Cursor::new(data), DisposeAfterUse::No).unwrap();
    let samples = drain(&mut stream, 1024);
    assert!(!samples.is_empty());
    assert!(samples.len() < expected_frames(30));
    assert!(stream.end_of_data());
}

#[test]
fn test_corrupt_page_is_skipped() {
    let mut data = build_opus(1, 30);
    let pages = page_offsets(&data);
    // Flip the last payload byte of the fourth audio page
    let victim = pages[6] - 1;
    data[victim] ^= 0xFF;

    let mut stream = make_opus_stream(Cursor::new(data), DisposeAfterUse::No).unwrap();
    let samples = drain(&mut stream, 1024);
    assert!(!samples.is_empty());
    assert!(samples.len() < expected_frames(30));
}

#[test]
fn test_dispose_after_use() {
    let (source, disposed) = tracked(build_opus(1, 10));
    let stream = make_opus_stream(source, DisposeAfterUse::Yes).unwrap();
    assert_eq!(disposed.get(), 0);
    drop(stream);
    assert_eq!(disposed.get(), 1);

    let (source, disposed) = tracked(build_opus(1, 10));
    drop(make_opus_stream(source, DisposeAfterUse::No));
    assert_eq!(disposed.get(), 0);
}

#[test]
fn test_dispose_on_failed_open() {
    let (source, disposed) = tracked(vec![0u8; 256]);
    assert!(make_opus_stream(source, DisposeAfterUse::Yes).is_none());
    assert_eq!(disposed.get(), 1);

    let (source, disposed) = tracked(build_headers_only());
    assert!(make_opus_stream(source, DisposeAfterUse::Yes).is_none());
    assert_eq!(disposed.get(), 1);
}

#[test]
fn test_rodio_source_plays_whole_stream() {
    let stream = make_opus_stream(Cursor::new(build_opus(2, 25)), DisposeAfterUse::No).unwrap();
    let source = RodioSource::new(stream);
    assert_eq!(source.channels(), 2);
    assert_eq!(source.sample_rate(), 48000);
    let expected_ms = (expected_frames(25) * 1000 / 48000) as u64;
    assert_eq!(
        source.total_duration().map(|d| d.as_millis() as u64),
        Some(expected_ms)
    );
    assert_eq!(source.count(), expected_frames(25) * 2);
}

#[test]
fn test_grouped_pages_drain_exact_length() {
    for trim in [500, 2000] {
        let data = build_opus_grouped(1, 60, 20, trim);
        let mut stream = make_opus_stream(Cursor::new(data), DisposeAfterUse::No).unwrap();
        assert_eq!(
            stream.length().total_frames(),
            expected_trimmed_frames(60, trim) as i64
        );
        assert_eq!(drain(&mut stream, 1000).len(), expected_trimmed_frames(60, trim));
        assert!(stream.end_of_data());
    }
}

#[test]
fn test_grouped_pages_stereo_drain() {
    let data = build_opus_grouped(2, 45, 7, 700);
    let mut stream = make_opus_stream(Cursor::new(data), DisposeAfterUse::No).unwrap();
    assert_eq!(drain(&mut stream, 333).len(), expected_trimmed_frames(45, 700) * 2);
}

#[test]
fn test_grouped_pages_early_seek_matches_fresh_decode() {
    let data = build_opus_grouped(1, 60, 20, 500);
    let mut reference = make_opus_stream(Cursor::new(data.clone()), DisposeAfterUse::No).unwrap();
    let expected = drain(&mut reference, 4096);

    let mut stream = make_opus_stream(Cursor::new(data), DisposeAfterUse::No).unwrap();
    drain(&mut stream, 4096);

    // 40 ms and 100 ms both restart from the first audio page
    assert!(stream.seek(Timestamp::new(40, 1000)));
    assert_eq!(drain(&mut stream, 4096), expected[1920..]);

    drain(&mut stream, 4096);
    assert!(stream.seek(Timestamp::new(100, 1000)));
    assert_eq!(drain(&mut stream, 4096), expected[4800..]);
}

#[test]
fn test_grouped_pages_late_seek_exact_count() {
    let data = build_opus_grouped(2, 500, 20, 500);
    let mut stream = make_opus_stream(Cursor::new(data), DisposeAfterUse::No).unwrap();
    assert!(stream.seek(Timestamp::new(9000, 1000)));
    let samples = drain(&mut stream, 4096);
    assert_eq!(samples.len(), (expected_trimmed_frames(500, 500) - 432000) * 2);
}

#[test]
fn test_repeated_seek_is_deterministic() {
    let data = build_opus_grouped(1, 200, 10, 0);
    let mut stream = make_opus_stream(Cursor::new(data), DisposeAfterUse::No).unwrap();

    assert!(stream.seek(Timestamp::new(2500, 1000)));
    let first = drain(&mut stream, 2048);
    assert!(stream.seek(Timestamp::new(2500, 1000)));
    let second = drain(&mut stream, 2048);

    assert_eq!(first.len(), expected_frames(200) - 120000);
    assert_eq!(first, second);
}

#[test]
fn test_late_seek_decode_work_is_bounded() {
    let data = build_opus_grouped(1, 500, 20, 0);
    let mut stream = make_opus_stream(Cursor::new(data), DisposeAfterUse::No).unwrap();
    drain(&mut stream, 4096);

    let before = stream.decoder().packets_decoded();
    assert!(stream.seek(Timestamp::new(9000, 1000)));
    let spent = stream.decoder().packets_decoded() - before;
    // Preroll pages plus one buffer refill, independent of the target
    assert!(spent <= 60, "seek decoded {} packets", spent);

    assert_eq!(drain(&mut stream, 4096).len(), expected_frames(500) - 432000);
}
