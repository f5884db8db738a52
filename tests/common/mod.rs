//! In-memory Ogg Opus fixtures

#![allow(dead_code)]

use ogg::{PacketWriteEndInfo, PacketWriter};
use opus::{Application, Channels, Encoder};

pub const FRAME_SIZE: usize = 960;
pub const PRE_SKIP: u16 = 312;
pub const SERIAL: u32 = 0x5eed;

pub fn opus_head(channels: u8, pre_skip: u16) -> Vec<u8> {
    let mut data = b"OpusHead".to_vec();
    data.push(1);
    data.push(channels);
    data.extend_from_slice(&pre_skip.to_le_bytes());
    data.extend_from_slice(&48000u32.to_le_bytes());
    data.extend_from_slice(&0i16.to_le_bytes());
    data.push(0);
    data
}

pub fn opus_tags(vendor: &str, comments: &[&str]) -> Vec<u8> {
    let mut data = b"OpusTags".to_vec();
    data.extend_from_slice(&(vendor.len() as u32).to_le_bytes());
    data.extend_from_slice(vendor.as_bytes());
    data.extend_from_slice(&(comments.len() as u32).to_le_bytes());
    for c in comments {
        data.extend_from_slice(&(c.len() as u32).to_le_bytes());
        data.extend_from_slice(c.as_bytes());
    }
    data
}

/// Encode `packets` 20 ms frames of a 440 Hz tone, one packet per page
pub fn build_opus(channels: u8, packets: usize) -> Vec<u8> {
    build_opus_grouped(channels, packets, 1, 0)
}

/// Encode `packets` 20 ms frames of a 440 Hz tone, `per_page` packets per
/// page, with the final granule position `final_trim` samples short of the
/// decoded length
pub fn build_opus_grouped(
    channels: u8,
    packets: usize,
    per_page: usize,
    final_trim: usize,
) -> Vec<u8> {
    let mode = if channels == 1 {
        Channels::Mono
    } else {
        Channels::Stereo
    };
    let mut encoder = Encoder::new(48000, mode, Application::Audio).unwrap();

    let mut out = Vec::new();
    {
        let mut writer = PacketWriter::new(&mut out);
        writer
            .write_packet(opus_head(channels, PRE_SKIP), SERIAL, PacketWriteEndInfo::EndPage, 0)
            .unwrap();
        writer
            .write_packet(
                opus_tags("fixture", &["TITLE=Tone"]),
                SERIAL,
                PacketWriteEndInfo::EndPage,
                0,
            )
            .unwrap();

        let mut pcm = vec![0i16; FRAME_SIZE * channels as usize];
        let mut packet = vec![0u8; 4000];
        for i in 0..packets {
            for frame in 0..FRAME_SIZE {
                let t = (i * FRAME_SIZE + frame) as f32 / 48000.0;
                let value = ((t * 440.0 * std::f32::consts::TAU).sin() * 8000.0) as i16;
                for ch in 0..channels as usize {
                    pcm[frame * channels as usize + ch] = value;
                }
            }
            let len = encoder.encode(&pcm, &mut packet).unwrap();

            let (end, granule) = if i + 1 == packets {
                (PacketWriteEndInfo::EndStream, packets * FRAME_SIZE - final_trim)
            } else if (i + 1) % per_page == 0 {
                (PacketWriteEndInfo::EndPage, (i + 1) * FRAME_SIZE)
            } else {
                (PacketWriteEndInfo::NormalPacket, (i + 1) * FRAME_SIZE)
            };
            writer
                .write_packet(packet[..len].to_vec(), SERIAL, end, granule as u64)
                .unwrap();
        }
    }
    out
}

/// Stream with only the two header packets
pub fn build_headers_only() -> Vec<u8> {
    let mut out = Vec::new();
    {
        let mut writer = PacketWriter::new(&mut out);
        writer
            .write_packet(opus_head(1, PRE_SKIP), SERIAL, PacketWriteEndInfo::EndPage, 0)
            .unwrap();
        writer
            .write_packet(
                opus_tags("fixture", &[]),
                SERIAL,
                PacketWriteEndInfo::EndStream,
                0,
            )
            .unwrap();
    }
    out
}

/// Samples per channel a decoder should produce for `packets` packets
pub fn expected_frames(packets: usize) -> usize {
    packets * FRAME_SIZE - PRE_SKIP as usize
}

/// Same as `expected_frames` for a stream whose end is trimmed
pub fn expected_trimmed_frames(packets: usize, final_trim: usize) -> usize {
    expected_frames(packets) - final_trim
}

/// Byte offsets of every Ogg page in `data`
pub fn page_offsets(data: &[u8]) -> Vec<usize> {
    data.windows(4)
        .enumerate()
        .filter(|(_, w)| *w == b"OggS")
        .map(|(i, _)| i)
        .collect()
}
