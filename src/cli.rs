use crate::config::{parse_output_format, parse_position, parse_volume};
use crate::config::{Options, OutputFormat};
use crate::logging::LogLevel;
use anyhow::{Context, Result};
use clap::Parser;

/// Decode, inspect and play Ogg Opus files
#[derive(Parser, Debug, Default)]
#[command(name = "opus-stream")]
#[command(version)]
#[command(about = "Streaming Ogg Opus decoder", long_about = None)]
pub struct Cli {
    /// Ogg Opus file to open
    #[arg(value_name = "FILE")]
    pub file: String,

    /// Print channel count, sample rate and duration
    #[arg(short, long)]
    pub info: bool,

    /// Decode to this file (WAV unless --raw or --format says otherwise)
    #[arg(short, long, value_name = "PATH")]
    pub output: Option<String>,

    /// Write headerless native-endian PCM
    #[arg(short, long)]
    pub raw: bool,

    /// Output format (wav, raw)
    #[arg(long, value_name = "FORMAT")]
    pub format: Option<String>,

    /// Start position (ms, s.mmm or m:ss[.mmm])
    #[arg(short, long, value_name = "POS")]
    pub start: Option<String>,

    /// Play through the default output device
    #[arg(short, long)]
    pub play: bool,

    /// Playback volume (0-100)
    #[arg(short, long, value_name = "VOLUME")]
    pub volume: Option<String>,

    /// Samples pulled per read
    #[arg(long, value_name = "SAMPLES")]
    pub chunk: Option<usize>,

    /// Configuration file path
    #[arg(short, long, value_name = "CONFIG")]
    pub config: Option<String>,

    /// Log verbosity (nothing, user, error, warning, info, debug, all or 0-6)
    #[arg(long, value_name = "LEVEL")]
    pub loglevel: Option<String>,

    /// Log file path
    #[arg(short, long, value_name = "FILE")]
    pub logfile: Option<String>,
}

impl Cli {
    /// Merge CLI arguments into the options struct
    pub fn merge_into_options(&self, mut opts: Options) -> Result<Options> {
        opts.input = Some(self.file.clone());

        if self.info {
            opts.info = true;
        }
        if self.play {
            opts.play = true;
        }

        if let Some(ref output) = self.output {
            opts.output = Some(output.clone());
        }

        if let Some(ref format) = self.format {
            opts.output_format = parse_output_format(format)?;
        }
        if self.raw {
            opts.output_format = OutputFormat::Raw;
        }

        if let Some(ref start) = self.start {
            opts.start = Some(parse_position(start).context("Invalid start position")?);
        }

        if let Some(ref vol) = self.volume {
            let int_vol: i32 = vol.parse().context("Invalid volume")?;
            opts.volume = parse_volume(int_vol);
        }

        if let Some(chunk) = self.chunk {
            if chunk == 0 {
                anyhow::bail!("Chunk size must be positive");
            }
            opts.chunk_samples = chunk;
        }

        if let Some(ref level) = self.loglevel {
            opts.log_level = level.parse::<LogLevel>()?;
        }

        if let Some(ref log_file) = self.logfile {
            opts.log_file = Some(log_file.clone());
        }

        Ok(opts)
    }
}
