use std::fs;
use std::str::FromStr;

use anyhow::{Context, Result};

use crate::logging::LogLevel;
use crate::sound::rodio_source::DEFAULT_CHUNK_SAMPLES;
use crate::sound::timestamp::Timestamp;

/// Options that can be set via CLI or config file
#[derive(Debug, Clone, PartialEq)]
pub struct Options {
    // Commandline-only options
    pub input: Option<String>,
    pub output: Option<String>,
    pub info: bool,
    pub play: bool,

    // Commandline and config file options
    pub output_format: OutputFormat,
    pub start: Option<Timestamp>,
    pub volume: f32,
    pub chunk_samples: usize,
    pub log_level: LogLevel,
    pub log_file: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputFormat {
    #[default]
    Wav,
    /// Headerless PCM in native byte order
    Raw,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            input: None,
            output: None,
            info: false,
            play: false,
            output_format: OutputFormat::Wav,
            start: None,
            volume: 1.0,
            chunk_samples: DEFAULT_CHUNK_SAMPLES,
            log_level: LogLevel::default(),
            log_file: None,
        }
    }
}

/// Load options from a `key = value` config file
///
/// A missing path yields the defaults. Unknown keys are warned about and
/// skipped; malformed values are errors.
pub fn load_config(path: &Option<String>) -> Result<Options> {
    let mut opts = Options::default();
    let Some(path) = path else {
        return Ok(opts);
    };

    let data =
        fs::read_to_string(path).with_context(|| format!("Failed to read config file {}", path))?;

    let mut entries = Vec::new();
    parse_properties(&data, &mut |key, value| {
        entries.push((key.to_string(), value.to_string()))
    });

    for (key, value) in entries {
        apply_setting(&mut opts, &key, &value)
            .with_context(|| format!("Bad value for '{}' in {}", key, path))?;
    }

    Ok(opts)
}

fn apply_setting(opts: &mut Options, key: &str, value: &str) -> Result<()> {
    match key.to_lowercase().as_str() {
        "output" => opts.output = Some(value.to_string()),
        "format" => opts.output_format = parse_output_format(value)?,
        "start" => opts.start = Some(parse_position(value)?),
        "volume" => {
            let vol: i32 = value.parse().context("Invalid volume")?;
            opts.volume = parse_volume(vol);
        }
        "chunk" => {
            let chunk: usize = value.parse().context("Invalid chunk size")?;
            if chunk == 0 {
                anyhow::bail!("Chunk size must be positive");
            }
            opts.chunk_samples = chunk;
        }
        "loglevel" => opts.log_level = LogLevel::from_str(value)?,
        "logfile" => opts.log_file = Some(value.to_string()),
        _ => log::warn!("Ignoring unknown config key '{}'", key),
    }
    Ok(())
}

/// Parse `key = value` lines, invoking `handler` for each pair
///
/// `#` starts a comment anywhere on a line. Keys keep their case and both
/// sides are trimmed. Lines without `=` are warned about and skipped.
pub fn parse_properties(data: &str, handler: &mut dyn FnMut(&str, &str)) {
    for line in data.lines() {
        let line = match line.find('#') {
            Some(idx) => &line[..idx],
            None => line,
        };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let Some((key, value)) = line.split_once('=') else {
            log::warn!("Key without value: {}", line);
            continue;
        };

        let key = key.trim();
        if key.is_empty() {
            log::warn!("Value without key: {}", line);
            continue;
        }
        handler(key, value.trim());
    }
}

/// Parse a volume value (0-100) to a float (0.0-1.0)
pub fn parse_volume(vol: i32) -> f32 {
    if vol < 0 {
        return 0.0;
    }
    if vol > 100 {
        return 1.0;
    }
    vol as f32 / 100.0
}

/// Parse a playback position
///
/// Accepts plain milliseconds (`1500`), seconds with a fraction (`1.5`) or
/// minutes and seconds (`2:03`, `2:03.250`).
pub fn parse_position(s: &str) -> Result<Timestamp> {
    let s = s.trim();
    let (minutes, rest) = match s.split_once(':') {
        Some((m, rest)) => (m.parse::<u64>().context("Invalid minutes")?, Some(rest)),
        None => (0, None),
    };

    let msecs = match rest {
        None if !s.contains('.') => s.parse::<u64>().context("Invalid milliseconds")?,
        None => parse_seconds(s)?,
        Some(secs) => {
            let ms = parse_seconds(secs)?;
            if ms >= 60_000 {
                anyhow::bail!("Seconds out of range in {}", s);
            }
            minutes
                .checked_mul(60_000)
                .and_then(|m| m.checked_add(ms))
                .with_context(|| format!("Position out of range: {}", s))?
        }
    };
    let msecs = i64::try_from(msecs).with_context(|| format!("Position out of range: {}", s))?;

    Ok(Timestamp::new(msecs, 1000))
}

/// `ss[.mmm]` to milliseconds; extra fraction digits are truncated
fn parse_seconds(s: &str) -> Result<u64> {
    let (whole, frac) = s.split_once('.').unwrap_or((s, ""));
    let secs: u64 = whole.parse().context("Invalid seconds")?;

    if !frac.chars().all(|c| c.is_ascii_digit()) {
        anyhow::bail!("Invalid fraction: {}", frac);
    }
    let mut ms = 0;
    let mut scale = 100;
    for c in frac.chars().take(3) {
        ms += (c as u64 - '0' as u64) * scale;
        scale /= 10;
    }

    secs.checked_mul(1000)
        .and_then(|whole| whole.checked_add(ms))
        .with_context(|| format!("Seconds out of range: {}", s))
}

pub fn parse_output_format(s: &str) -> Result<OutputFormat> {
    match s.to_lowercase().as_str() {
        "wav" => Ok(OutputFormat::Wav),
        "raw" | "pcm" => Ok(OutputFormat::Raw),
        _ => anyhow::bail!("Invalid output format: {}. Valid options: wav, raw", s),
    }
}
