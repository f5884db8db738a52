use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

use anyhow::{Context, Result};
use clap::Parser;

use opus_stream::cli::Cli;
use opus_stream::config::{self, Options, OutputFormat};
use opus_stream::logging;
use opus_stream::sound::wav_writer::pcm_ne_bytes;
use opus_stream::sound::{
    make_opus_stream, AudioStream, DisposeAfterUse, OggOpusFile, OpusStream, RodioSource,
    SeekableAudioStream, Timestamp, WavWriter,
};

type FileStream = OpusStream<OggOpusFile<BufReader<File>>>;

fn main() -> Result<()> {
    let cli = Cli::parse();

    let options = config::load_config(&cli.config)?;
    let options = cli.merge_into_options(options)?;

    logging::init_logging(options.log_level, options.log_file.as_deref())?;

    let input = options
        .input
        .as_deref()
        .context("No input file given")?;
    let mut stream = open_stream(input)?;

    if options.info || (options.output.is_none() && !options.play) {
        print_info(input, &stream);
    }

    if let Some(start) = options.start {
        if !stream.seek(start) {
            anyhow::bail!("Failed to seek to {}", start);
        }
        log::info!("Starting at {}", start);
    }

    if let Some(ref output) = options.output {
        let samples = decode_to_file(&mut stream, Path::new(output), &options)?;
        log::info!("Wrote {} samples to {}", samples, output);
    }

    if options.play {
        if options.output.is_some() {
            let start = options.start.unwrap_or(Timestamp::zero(1000));
            if !stream.seek(start) {
                anyhow::bail!("Failed to rewind for playback");
            }
        }
        play(stream, &options)?;
    }

    Ok(())
}

fn open_stream(path: &str) -> Result<FileStream> {
    let file = File::open(path).with_context(|| format!("Failed to open {}", path))?;
    make_opus_stream(BufReader::new(file), DisposeAfterUse::Yes)
        .with_context(|| format!("{} is not a playable Ogg Opus file", path))
}

fn print_info(path: &str, stream: &FileStream) {
    let file = stream.decoder();
    println!("File:      {}", path);
    println!("Vendor:    {}", file.tags().vendor);
    if let Some(title) = file.tags().get("TITLE") {
        println!("Title:     {}", title);
    }
    println!(
        "Channels:  {} ({})",
        stream.channel_count(),
        if stream.is_stereo() { "stereo" } else { "mono" }
    );
    println!("Rate:      {} Hz", stream.rate());
    let length = stream.length();
    if length.total_frames() > 0 {
        println!("Duration:  {}", length);
    } else {
        println!("Duration:  unknown");
    }
}

fn decode_to_file(stream: &mut FileStream, path: &Path, options: &Options) -> Result<u64> {
    let file =
        File::create(path).with_context(|| format!("Failed to create {}", path.display()))?;
    let mut buffer = vec![0i16; options.chunk_samples];
    let mut total = 0u64;

    match options.output_format {
        OutputFormat::Wav => {
            let mut writer = WavWriter::new(BufWriter::new(file), stream.channels(), stream.rate())?;
            loop {
                let n = stream.read_buffer(&mut buffer);
                if n == 0 {
                    break;
                }
                writer.write_samples(&buffer[..n])?;
                total += n as u64;
            }
            writer.finish()?;
        }
        OutputFormat::Raw => {
            let mut out = BufWriter::new(file);
            loop {
                let n = stream.read_buffer(&mut buffer);
                if n == 0 {
                    break;
                }
                out.write_all(&pcm_ne_bytes(&buffer[..n]))?;
                total += n as u64;
            }
            out.flush()?;
        }
    }

    Ok(total)
}

fn play(stream: FileStream, options: &Options) -> Result<()> {
    let (_output, handle) =
        rodio::OutputStream::try_default().context("No audio output device available")?;
    let sink = rodio::Sink::try_new(&handle).context("Failed to create audio sink")?;

    sink.set_volume(options.volume);
    sink.append(RodioSource::with_chunk_size(stream, options.chunk_samples));
    sink.sleep_until_end();
    Ok(())
}
