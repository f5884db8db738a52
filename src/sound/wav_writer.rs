//! Minimal RIFF/WAVE writer for decoded PCM
//!
//! Writes 16-bit little-endian PCM. The header is written up front with
//! zero sizes and patched by `finish`.

use std::io::{self, Seek, SeekFrom, Write};

/// Size of the RIFF + fmt + data chunk headers
const HEADER_LEN: u32 = 44;

#[derive(Debug, thiserror::Error)]
pub enum WavWriteError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("PCM data too large for a RIFF container ({0} bytes)")]
    TooLarge(u64),

    #[error("Unsupported format: {channels} channels at {rate} Hz")]
    UnsupportedFormat { channels: u16, rate: u32 },
}

pub struct WavWriter<W: Write + Seek> {
    out: W,
    data_bytes: u64,
    channels: u16,
}

impl<W: Write + Seek> WavWriter<W> {
    pub fn new(mut out: W, channels: u16, rate: u32) -> Result<Self, WavWriteError> {
        if channels == 0 || rate == 0 {
            return Err(WavWriteError::UnsupportedFormat { channels, rate });
        }

        let block_align = channels * 2;
        let byte_rate = rate * block_align as u32;

        let mut header = Vec::with_capacity(HEADER_LEN as usize);
        header.extend_from_slice(b"RIFF");
        header.extend_from_slice(&0u32.to_le_bytes());
        header.extend_from_slice(b"WAVE");
        header.extend_from_slice(b"fmt ");
        header.extend_from_slice(&16u32.to_le_bytes());
        header.extend_from_slice(&1u16.to_le_bytes()); // PCM
        header.extend_from_slice(&channels.to_le_bytes());
        header.extend_from_slice(&rate.to_le_bytes());
        header.extend_from_slice(&byte_rate.to_le_bytes());
        header.extend_from_slice(&block_align.to_le_bytes());
        header.extend_from_slice(&16u16.to_le_bytes());
        header.extend_from_slice(b"data");
        header.extend_from_slice(&0u32.to_le_bytes());
        out.write_all(&header)?;

        Ok(Self {
            out,
            data_bytes: 0,
            channels,
        })
    }

    pub fn channels(&self) -> u16 {
        self.channels
    }

    pub fn write_samples(&mut self, samples: &[i16]) -> Result<(), WavWriteError> {
        let total = self.data_bytes + samples.len() as u64 * 2;
        if total > (u32::MAX - HEADER_LEN) as u64 {
            return Err(WavWriteError::TooLarge(total));
        }
        self.out.write_all(&pcm_le_bytes(samples))?;
        self.data_bytes = total;
        Ok(())
    }

    /// Patch the chunk sizes and hand back the writer
    pub fn finish(mut self) -> Result<W, WavWriteError> {
        let data_len = self.data_bytes as u32;
        self.out.seek(SeekFrom::Start(4))?;
        self.out.write_all(&(HEADER_LEN - 8 + data_len).to_le_bytes())?;
        self.out.seek(SeekFrom::Start(40))?;
        self.out.write_all(&data_len.to_le_bytes())?;
        self.out.seek(SeekFrom::End(0))?;
        self.out.flush()?;
        Ok(self.out)
    }
}

/// Serialize samples as little-endian bytes
pub fn pcm_le_bytes(samples: &[i16]) -> Vec<u8> {
    samples.iter().flat_map(|s| s.to_le_bytes()).collect()
}

/// Serialize samples in native byte order
pub fn pcm_ne_bytes(samples: &[i16]) -> Vec<u8> {
    samples.iter().flat_map(|s| s.to_ne_bytes()).collect()
}
