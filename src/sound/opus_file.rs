//! Ogg Opus codec layer
//!
//! `OggOpusFile` demultiplexes an Ogg Opus stream with the `ogg` crate and
//! decodes packets with libopus through the `opus` crate. Everything is
//! decoded at 48 kHz into interleaved 16-bit samples.
//!
//! The buffering state machine in `super::opus` only talks to the codec
//! through the `OpusDecode` trait.
//!
//! Seeking bisects the file by page granule position, restarts the decoder
//! on a page boundary 80 ms ahead of the target and decodes forward from
//! there, so the work per seek does not grow with the stream length.

use std::io::SeekFrom;

use ogg::{OggReadError, Packet, PacketReader};

use super::byte_stream::{ByteStream, DisposeAfterUse, SeekableReadStream, Whence};
use super::opus_error::OpusStatus;

/// Opus always decodes at this rate
pub const OPUS_RATE: u32 = 48000;

/// Largest packet duration (120 ms) in samples per channel
const MAX_FRAME_SIZE: usize = 120 * 48;

/// How far back from the end of the stream to look for the last page
const DURATION_SEARCH_WINDOW: u64 = 65536;

/// Minimum size of an Ogg page header
const OGG_PAGE_HEADER_LEN: usize = 27;

/// Audio decoded and discarded before a seek target (80 ms)
const OPUS_PREROLL: i64 = 3840;

/// Byte range below which the page search walks pages instead of bisecting
const SEEK_LINEAR_WINDOW: u64 = 16 * 1024;

/// Read size used when hunting for a capture pattern
const SCAN_CHUNK: usize = 4096;

/// The narrow codec contract the stream adapter drives
pub trait OpusDecode {
    /// Number of interleaved channels produced by `read`
    fn channel_count(&self) -> u8;

    /// Decode into `pcm` as interleaved samples
    ///
    /// # Returns
    /// The number of samples written *per channel*. `Ok(0)` means end of
    /// stream. `Err(OpusStatus::Hole)` reports skipped data; reading may
    /// continue afterwards.
    fn read(&mut self, pcm: &mut [i16]) -> Result<usize, OpusStatus>;

    /// Total number of samples per channel in the stream
    fn pcm_total(&self) -> Result<i64, OpusStatus>;

    /// Reposition so that the next `read` starts at `pcm_offset`
    fn pcm_seek(&mut self, pcm_offset: i64) -> Result<(), OpusStatus>;
}

/// Identification header (`OpusHead`)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OpusHead {
    pub version: u8,
    pub channel_count: u8,
    /// Samples per channel to discard at the start of decoding
    pub pre_skip: u16,
    /// Sample rate of the original input; informational only
    pub input_sample_rate: u32,
    /// Q7.8 dB gain; not applied
    pub output_gain: i16,
    pub mapping_family: u8,
}

impl OpusHead {
    pub const MAGIC: &'static [u8; 8] = b"OpusHead";
    const MIN_LEN: usize = 19;

    pub fn parse(data: &[u8]) -> Result<Self, OpusStatus> {
        if data.len() < Self::MAGIC.len() || &data[..8] != Self::MAGIC {
            return Err(OpusStatus::NotFormat);
        }
        if data.len() < 9 {
            return Err(OpusStatus::BadHeader);
        }

        let version = data[8];
        // Only the major version (upper nibble) affects compatibility
        if version >> 4 != 0 {
            return Err(OpusStatus::Version);
        }
        if data.len() < Self::MIN_LEN {
            return Err(OpusStatus::BadHeader);
        }

        let head = OpusHead {
            version,
            channel_count: data[9],
            pre_skip: u16::from_le_bytes([data[10], data[11]]),
            input_sample_rate: u32::from_le_bytes([data[12], data[13], data[14], data[15]]),
            output_gain: i16::from_le_bytes([data[16], data[17]]),
            mapping_family: data[18],
        };

        if head.channel_count == 0 {
            return Err(OpusStatus::BadHeader);
        }
        match head.mapping_family {
            0 if head.channel_count > 2 => Err(OpusStatus::BadHeader),
            0 => Ok(head),
            _ => Err(OpusStatus::Impl),
        }
    }
}

/// Comment header (`OpusTags`)
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OpusTags {
    pub vendor: String,
    pub comments: Vec<String>,
}

impl OpusTags {
    pub const MAGIC: &'static [u8; 8] = b"OpusTags";

    pub fn parse(data: &[u8]) -> Result<Self, OpusStatus> {
        if data.len() < Self::MAGIC.len() || &data[..8] != Self::MAGIC {
            return Err(OpusStatus::BadHeader);
        }

        let mut cursor = &data[8..];
        let vendor = read_tag_string(&mut cursor)?;
        let count = read_u32_le(&mut cursor)? as usize;

        // Each comment needs at least its 4-byte length
        if count > cursor.len() / 4 {
            return Err(OpusStatus::BadHeader);
        }
        let mut comments = Vec::with_capacity(count);
        for _ in 0..count {
            comments.push(read_tag_string(&mut cursor)?);
        }

        Ok(OpusTags { vendor, comments })
    }

    /// Value of the first `KEY=value` comment matching `key`, ignoring case
    pub fn get(&self, key: &str) -> Option<&str> {
        self.comments.iter().find_map(|c| {
            let (k, v) = c.split_once('=')?;
            k.eq_ignore_ascii_case(key).then_some(v)
        })
    }
}

fn read_u32_le(cursor: &mut &[u8]) -> Result<u32, OpusStatus> {
    if cursor.len() < 4 {
        return Err(OpusStatus::BadHeader);
    }
    let value = u32::from_le_bytes([cursor[0], cursor[1], cursor[2], cursor[3]]);
    *cursor = &cursor[4..];
    Ok(value)
}

fn read_tag_string(cursor: &mut &[u8]) -> Result<String, OpusStatus> {
    let len = read_u32_le(cursor)? as usize;
    if cursor.len() < len {
        return Err(OpusStatus::BadHeader);
    }
    let value = String::from_utf8_lossy(&cursor[..len]).into_owned();
    *cursor = &cursor[len..];
    Ok(value)
}

fn open_error(err: OggReadError) -> OpusStatus {
    match err {
        OggReadError::ReadError(e) => {
            log::debug!("Ogg read failed while opening: {}", e);
            OpusStatus::Read
        }
        OggReadError::HashMismatch(..) => OpusStatus::BadHeader,
        _ => OpusStatus::NotFormat,
    }
}

/// Read until `buf` is full or the stream ends
fn read_full<S: SeekableReadStream>(stream: &mut ByteStream<S>, buf: &mut [u8]) -> usize {
    let mut filled = 0;
    while filled < buf.len() {
        let n = stream.read_bytes(&mut buf[filled..]);
        if n == 0 {
            break;
        }
        filled += n;
    }
    filled
}

/// Find the granule position of the last page of `serial`
///
/// Scans the final 64 KiB of the stream backwards for an Ogg capture
/// pattern. The stream position afterwards is unspecified.
fn find_last_granule<S: SeekableReadStream>(
    stream: &mut ByteStream<S>,
    serial: u32,
) -> Result<u64, OpusStatus> {
    if !stream.seek(0, Whence::End) {
        return Err(OpusStatus::NoSeek);
    }
    let size = stream.tell().ok_or(OpusStatus::NoSeek)?;

    let search_size = DURATION_SEARCH_WINDOW.min(size);
    if !stream.seek((size - search_size) as i64, Whence::Set) {
        return Err(OpusStatus::NoSeek);
    }

    let mut buffer = vec![0u8; search_size as usize];
    let filled = read_full(stream, &mut buffer);
    buffer.truncate(filled);

    if buffer.len() < OGG_PAGE_HEADER_LEN {
        return Err(OpusStatus::BadTimestamp);
    }

    for i in (0..=buffer.len() - OGG_PAGE_HEADER_LEN).rev() {
        let page = &buffer[i..];
        if !page.starts_with(b"OggS") || page[4] != 0 {
            continue;
        }
        let page_serial = u32::from_le_bytes([page[14], page[15], page[16], page[17]]);
        if page_serial != serial {
            continue;
        }
        let mut granule = [0u8; 8];
        granule.copy_from_slice(&page[6..14]);
        let granule = u64::from_le_bytes(granule);
        // -1 marks a page on which no packet completes
        if granule != u64::MAX {
            return Ok(granule);
        }
    }

    Err(OpusStatus::BadTimestamp)
}

/// Header fields of one Ogg page
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct PageInfo {
    offset: u64,
    len: u64,
    serial: u32,
    /// `None` when no packet completes on the page
    granule: Option<i64>,
    /// The page starts with the tail of a packet from the previous page
    continued: bool,
}

impl PageInfo {
    fn end(&self) -> u64 {
        self.offset + self.len
    }
}

/// Parse the page header starting exactly at `offset`
fn page_at<S: SeekableReadStream>(stream: &mut ByteStream<S>, offset: u64) -> Option<PageInfo> {
    if !stream.seek(i64::try_from(offset).ok()?, Whence::Set) {
        return None;
    }
    let mut header = [0u8; OGG_PAGE_HEADER_LEN];
    if read_full(stream, &mut header) < header.len() {
        return None;
    }
    if &header[..4] != b"OggS" || header[4] != 0 {
        return None;
    }

    let segments = header[26] as usize;
    let mut lacing = [0u8; 255];
    if read_full(stream, &mut lacing[..segments]) < segments {
        return None;
    }
    let body: u64 = lacing[..segments].iter().map(|&l| l as u64).sum();
    let granule = u64::from_le_bytes(header[6..14].try_into().ok()?);

    Some(PageInfo {
        offset,
        len: (OGG_PAGE_HEADER_LEN + segments) as u64 + body,
        serial: u32::from_le_bytes(header[14..18].try_into().ok()?),
        granule: i64::try_from(granule).ok(),
        continued: header[5] & 0x01 != 0,
    })
}

/// First page of `serial` with a granule position that starts in
/// `[from, limit)`
///
/// A capture pattern only counts if another page or the end of the stream
/// follows the page it introduces.
fn find_page<S: SeekableReadStream>(
    stream: &mut ByteStream<S>,
    from: u64,
    limit: u64,
    size: u64,
    serial: u32,
) -> Option<PageInfo> {
    let mut chunk = vec![0u8; SCAN_CHUNK];
    let mut offset = from;

    while offset < limit {
        if !stream.seek(i64::try_from(offset).ok()?, Whence::Set) {
            return None;
        }
        let want = ((limit - offset) as usize).saturating_add(3).min(SCAN_CHUNK);
        let filled = read_full(stream, &mut chunk[..want]);
        if filled < 4 {
            return None;
        }

        for i in 0..=filled - 4 {
            let candidate = offset + i as u64;
            if candidate >= limit {
                return None;
            }
            if &chunk[i..i + 4] != b"OggS" {
                continue;
            }
            let Some(page) = page_at(stream, candidate) else {
                continue;
            };
            if page.serial != serial || page.granule.is_none() || page.end() > size {
                continue;
            }
            let followed = page.end() == size || page_at(stream, page.end()).is_some();
            if followed {
                return Some(page);
            }
        }

        offset += (filled - 3) as u64;
    }

    None
}

/// Pick a page to restart decoding from so that `target_gp` is reached
///
/// Returns the byte offset of a page that does not open with a continued
/// packet, and the granule position at its start, which is at or before
/// `target_gp`. Only page headers are read; nothing is decoded.
fn find_restart_point<S: SeekableReadStream>(
    stream: &mut ByteStream<S>,
    data_start: u64,
    serial: u32,
    target_gp: i64,
) -> Result<(u64, i64), OpusStatus> {
    if !stream.seek(0, Whence::End) {
        return Err(OpusStatus::NoSeek);
    }
    let size = stream.tell().ok_or(OpusStatus::NoSeek)?;

    let mut best = (data_start, 0i64);
    let mut lo = data_start;
    let mut hi = size;

    while lo < hi && hi - lo > SEEK_LINEAR_WINDOW {
        let mid = lo + (hi - lo) / 2;
        match find_page(stream, mid, hi, size, serial) {
            Some(page) if page.granule.is_some_and(|g| g <= target_gp) => {
                lo = page.end();
                best = restart_after(stream, &page).unwrap_or(best);
            }
            _ => hi = mid,
        }
    }

    let mut offset = lo;
    while let Some(page) = find_page(stream, offset, size, size, serial) {
        if page.granule.map_or(true, |g| g > target_gp) {
            break;
        }
        offset = page.end();
        best = restart_after(stream, &page).unwrap_or(best);
    }

    Ok(best)
}

/// Restart point just past `page`, unless the next page opens mid-packet
fn restart_after<S: SeekableReadStream>(
    stream: &mut ByteStream<S>,
    page: &PageInfo,
) -> Option<(u64, i64)> {
    let next = page_at(stream, page.end())?;
    if next.continued {
        return None;
    }
    Some((page.end(), page.granule?))
}

/// Ogg Opus decoder over a caller supplied byte stream
pub struct OggOpusFile<S: SeekableReadStream> {
    /// Only `None` transiently while searching for a seek target
    reader: Option<PacketReader<ByteStream<S>>>,
    decoder: opus::Decoder,
    head: OpusHead,
    tags: OpusTags,
    serial: u32,
    /// Byte offset of the first audio page
    data_start: u64,
    total: Result<i64, OpusStatus>,
    /// Granule position of the last page; decoded audio past it is dropped
    end_granule: Option<i64>,
    /// Granule position at the end of the last decoded packet
    granule: i64,
    /// Decoded samples not yet handed out (interleaved)
    pending: Vec<i16>,
    pending_pos: usize,
    /// PCM offset of `pending[0]`
    pending_start: i64,
    scratch: Vec<i16>,
    eos: bool,
    packets_decoded: u64,
}

impl<S: SeekableReadStream> OggOpusFile<S> {
    /// Parse the stream headers and prepare for decoding
    ///
    /// On failure the byte stream is dropped, which disposes it if
    /// `dispose` is `Yes`.
    pub fn open(stream: S, dispose: DisposeAfterUse) -> Result<Self, OpusStatus> {
        let mut reader = PacketReader::new(ByteStream::new(stream, dispose));

        let head_packet = match reader.read_packet() {
            Ok(Some(p)) => p,
            Ok(None) => return Err(OpusStatus::NotFormat),
            Err(e) => return Err(open_error(e)),
        };
        let head = OpusHead::parse(&head_packet.data)?;
        let serial = head_packet.stream_serial();

        let tags_packet = loop {
            match reader.read_packet() {
                Ok(Some(p)) if p.stream_serial() == serial => break p,
                Ok(Some(_)) => continue,
                Ok(None) => return Err(OpusStatus::BadHeader),
                Err(e) => return Err(open_error(e)),
            }
        };
        let tags = OpusTags::parse(&tags_packet.data)?;

        // The comment header always ends its page, so the reader has not
        // buffered any audio data yet.
        let mut stream = reader.into_inner();
        let data_start = stream.tell().ok_or(OpusStatus::Read)?;
        let end_granule = find_last_granule(&mut stream, serial)
            .and_then(|granule| i64::try_from(granule).map_err(|_| OpusStatus::BadTimestamp));
        let total = end_granule.map(|granule| (granule - head.pre_skip as i64).max(0));

        let mut reader = PacketReader::new(stream);
        if let Err(e) = reader.seek_bytes(SeekFrom::Start(data_start)) {
            log::debug!("Failed to return to the first audio page: {}", e);
            return Err(OpusStatus::Read);
        }

        let channels = if head.channel_count == 1 {
            opus::Channels::Mono
        } else {
            opus::Channels::Stereo
        };
        let decoder = opus::Decoder::new(OPUS_RATE, channels).map_err(|e| {
            log::debug!("Failed to create Opus decoder: {}", e);
            OpusStatus::Fault
        })?;

        log::debug!(
            "Opened Ogg Opus stream: serial={:08x} channels={} pre_skip={} input_rate={} vendor={:?}",
            serial,
            head.channel_count,
            head.pre_skip,
            head.input_sample_rate,
            tags.vendor
        );

        Ok(Self {
            reader: Some(reader),
            decoder,
            head,
            tags,
            serial,
            data_start,
            total,
            end_granule: end_granule.ok(),
            granule: 0,
            pending: Vec::with_capacity(MAX_FRAME_SIZE * head.channel_count as usize),
            pending_pos: 0,
            pending_start: 0,
            scratch: vec![0; MAX_FRAME_SIZE * head.channel_count as usize],
            eos: false,
            packets_decoded: 0,
        })
    }

    pub fn head(&self) -> &OpusHead {
        &self.head
    }

    pub fn tags(&self) -> &OpusTags {
        &self.tags
    }

    pub fn serial(&self) -> u32 {
        self.serial
    }

    /// Number of audio packets run through the decoder so far
    pub fn packets_decoded(&self) -> u64 {
        self.packets_decoded
    }

    fn channels(&self) -> usize {
        self.head.channel_count as usize
    }

    /// PCM offset of the next sample `read` will return
    fn position(&self) -> i64 {
        if self.pending_pos < self.pending.len() {
            self.pending_start + (self.pending_pos / self.channels()) as i64
        } else {
            (self.granule - self.head.pre_skip as i64).max(0)
        }
    }

    fn next_packet(&mut self) -> Result<Option<Packet>, OpusStatus> {
        let reader = self.reader.as_mut().ok_or(OpusStatus::Fault)?;
        loop {
            match reader.read_packet() {
                Ok(Some(p)) if p.stream_serial() == self.serial => return Ok(Some(p)),
                Ok(Some(_)) => continue,
                Ok(None) => return Ok(None),
                Err(OggReadError::HashMismatch(expected, actual)) => {
                    log::debug!(
                        "Ogg page checksum mismatch: expected {:08x}, got {:08x}",
                        expected,
                        actual
                    );
                    return Err(OpusStatus::Hole);
                }
                Err(OggReadError::ReadError(e)) => {
                    log::debug!("Ogg read failed: {}", e);
                    return Err(OpusStatus::Read);
                }
                Err(e) => {
                    log::debug!("Ogg stream error: {:?}", e);
                    return Err(OpusStatus::BadLink);
                }
            }
        }
    }

    /// Decode one packet into `pending`, trimming pre-skip and end padding
    fn decode_packet(&mut self) -> Result<(), OpusStatus> {
        self.pending.clear();
        self.pending_pos = 0;

        let packet = match self.next_packet()? {
            Some(p) => p,
            None => {
                self.eos = true;
                return Ok(());
            }
        };

        let samples = self
            .decoder
            .decode(&packet.data, &mut self.scratch, false)
            .map_err(|e| {
                log::debug!("Opus packet decode failed: {}", e);
                OpusStatus::BadPacket
            })?;
        let n = samples as i64;

        let natural_end = self.granule + n;
        let absgp = packet.absgp_page();
        let page_granule = if packet.last_in_page() && absgp <= i64::MAX as u64 {
            Some(absgp as i64)
        } else {
            None
        };

        let (start, mut end) = match page_granule {
            // Final page may end early: drop the padding
            Some(gp) if packet.last_in_stream() && gp < natural_end => {
                (self.granule, gp.max(self.granule))
            }
            // Resynchronise to the page's position
            Some(gp) => (gp - n, gp),
            None => (self.granule, natural_end),
        };
        // End trimming may span several packets of the final page
        if let Some(last) = self.end_granule {
            if end > last {
                end = last.max(start);
            }
        }
        self.packets_decoded += 1;

        self.granule = end;
        if packet.last_in_stream() {
            self.eos = true;
        }

        let channels = self.channels();
        let visible_start = start.max(self.head.pre_skip as i64);
        if visible_start < end {
            let skip = (visible_start - start) as usize;
            let keep = (end - visible_start) as usize;
            self.pending
                .extend_from_slice(&self.scratch[skip * channels..(skip + keep) * channels]);
            self.pending_start = visible_start - self.head.pre_skip as i64;
        }

        Ok(())
    }

    /// Continue decoding from the page at `offset` with a fresh decoder
    /// state; `granule` is the position at the start of that page
    fn restart_at(&mut self, offset: u64, granule: i64) -> Result<(), OpusStatus> {
        let reader = self.reader.as_mut().ok_or(OpusStatus::Fault)?;
        if let Err(e) = reader.seek_bytes(SeekFrom::Start(offset)) {
            log::debug!("Failed to seek to page at {}: {}", offset, e);
            return Err(OpusStatus::Read);
        }

        self.decoder.reset_state().map_err(|_| OpusStatus::Fault)?;
        self.granule = granule;
        self.pending.clear();
        self.pending_pos = 0;
        self.pending_start = 0;
        self.eos = false;
        Ok(())
    }

    /// Locate the page to restart from for a seek to `pcm_offset`
    fn seek_target(&mut self, pcm_offset: i64) -> (u64, i64) {
        let target_gp = pcm_offset + self.head.pre_skip as i64 - OPUS_PREROLL;
        if target_gp <= 0 {
            return (self.data_start, 0);
        }
        let Some(reader) = self.reader.take() else {
            return (self.data_start, 0);
        };

        let mut stream = reader.into_inner();
        let found = find_restart_point(&mut stream, self.data_start, self.serial, target_gp);
        self.reader = Some(PacketReader::new(stream));

        match found {
            Ok(point) => point,
            Err(e) => {
                log::debug!("Page search failed ({:?}), decoding from the start", e);
                (self.data_start, 0)
            }
        }
    }

    /// Decode and discard until `target`
    fn skip_to(&mut self, target: i64) -> Result<(), OpusStatus> {
        let channels = self.channels();
        loop {
            let pos = self.position();
            if pos >= target {
                return Ok(());
            }

            if self.pending_pos < self.pending.len() {
                let available = ((self.pending.len() - self.pending_pos) / channels) as i64;
                let skip = available.min(target - pos) as usize;
                self.pending_pos += skip * channels;
                continue;
            }

            if self.eos {
                return Err(OpusStatus::Inval);
            }
            match self.decode_packet() {
                Ok(()) | Err(OpusStatus::Hole) => {}
                Err(e) => return Err(e),
            }
        }
    }
}

impl<S: SeekableReadStream> OpusDecode for OggOpusFile<S> {
    fn channel_count(&self) -> u8 {
        self.head.channel_count
    }

    fn read(&mut self, pcm: &mut [i16]) -> Result<usize, OpusStatus> {
        let channels = self.channels();
        if pcm.len() < channels {
            return Err(OpusStatus::Inval);
        }

        while self.pending_pos >= self.pending.len() {
            if self.eos {
                return Ok(0);
            }
            self.decode_packet()?;
        }

        let available = (self.pending.len() - self.pending_pos) / channels;
        let frames = available.min(pcm.len() / channels);
        let count = frames * channels;
        pcm[..count].copy_from_slice(&self.pending[self.pending_pos..self.pending_pos + count]);
        self.pending_pos += count;

        Ok(frames)
    }

    fn pcm_total(&self) -> Result<i64, OpusStatus> {
        self.total
    }

    fn pcm_seek(&mut self, pcm_offset: i64) -> Result<(), OpusStatus> {
        if pcm_offset < 0 {
            return Err(OpusStatus::Inval);
        }
        if let Ok(total) = self.total {
            if pcm_offset > total {
                return Err(OpusStatus::Inval);
            }
        }

        let pos = self.position();
        if pcm_offset >= pos && pcm_offset - pos <= OPUS_PREROLL {
            return self.skip_to(pcm_offset);
        }

        let (offset, granule) = self.seek_target(pcm_offset);
        log::debug!(
            "Seeking to {}: restarting at byte {} (granule {})",
            pcm_offset,
            offset,
            granule
        );
        self.restart_at(offset, granule)?;
        self.skip_to(pcm_offset)
    }
}
