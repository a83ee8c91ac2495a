use clap::{Parser, Subcommand};
use log::info;
use std::fs::File;
use std::path::PathBuf;

use sensewave_core::{
    packet, Authenticator, CipherBackend, CipherKey, MagnitudeMode, MelFilterBank, PacketDecoder,
    PipelineError, SpectrogramEngine, DEFAULT_MEL_VECTOR_LENGTH, DEFAULT_SAMPLES_PER_VECTOR,
};

#[derive(Parser)]
#[command(name = "sensewave")]
#[command(about = "Host-side tooling for the sensewave sensor node")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Extract Mel feature vectors from a WAV capture, as the node would
    Features {
        /// Input WAV file (mono, 16-bit)
        #[arg(value_name = "INPUT.WAV")]
        input: PathBuf,

        /// Samples per feature vector (FFT length)
        #[arg(long, default_value_t = DEFAULT_SAMPLES_PER_VECTOR)]
        samples: usize,

        /// Mel coefficients per vector
        #[arg(long, default_value_t = DEFAULT_MEL_VECTOR_LENGTH)]
        mels: usize,

        /// Magnitude estimation: exact, abs-max, abs-sum, pure-max, pure-sum
        #[arg(long, default_value = "exact")]
        magnitude: String,
    },

    /// Decode a hex-encoded packet and verify its CBC-MAC tag
    Decode {
        /// Packet as a hex string, or @FILE to read the hex from a file
        #[arg(value_name = "HEX")]
        packet: String,

        /// AES-128 key as 32 hex digits (default: all-zero key)
        #[arg(long)]
        key: Option<String>,
    },
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();
    let cli = Cli::parse();

    match cli.command {
        Commands::Features {
            input,
            samples,
            mels,
            magnitude,
        } => features_command(&input, samples, mels, &magnitude)?,
        Commands::Decode { packet, key } => decode_command(&packet, key.as_deref())?,
    }

    Ok(())
}

fn parse_magnitude(name: &str) -> Result<MagnitudeMode, PipelineError> {
    match name {
        "exact" => Ok(MagnitudeMode::Exact),
        "abs-max" => Ok(MagnitudeMode::AbsMax),
        "abs-sum" => Ok(MagnitudeMode::AbsSum),
        "pure-max" => Ok(MagnitudeMode::PureMax),
        "pure-sum" => Ok(MagnitudeMode::PureSum),
        other => Err(PipelineError::InvalidConfig(format!(
            "unknown magnitude mode '{other}'"
        ))),
    }
}

fn features_command(
    input: &PathBuf,
    samples: usize,
    mels: usize,
    magnitude: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let file = File::open(input)?;
    let mut reader = hound::WavReader::new(file)?;
    let spec = reader.spec();
    info!(
        "{}: {} Hz, {} channels, {} bits",
        input.display(),
        spec.sample_rate,
        spec.channels,
        spec.bits_per_sample
    );

    // First channel only; fold 16-bit PCM down to the node's 12-bit ADC range.
    let step = spec.channels as usize;
    let pcm: Vec<i16> = reader
        .samples::<i16>()
        .step_by(step)
        .collect::<Result<_, _>>()?;
    let blocks: Vec<&[i16]> = pcm.chunks_exact(samples).collect();
    if blocks.is_empty() {
        return Err(format!("{} holds fewer than {samples} samples", input.display()).into());
    }

    let bank = MelFilterBank::mel(mels, samples, spec.sample_rate)?;
    let mut engine = SpectrogramEngine::new(samples, parse_magnitude(magnitude)?, bank)?;

    let mut vector = vec![0i16; mels];
    for (n, block) in blocks.iter().enumerate() {
        let mut adc: Vec<i16> = block
            .iter()
            .map(|&s| ((s as i32 + 32_768) >> 4) as i16)
            .collect();
        engine.format(&mut adc);
        engine.compute(&adc, &mut vector);
        let row: Vec<String> = vector.iter().map(|c| c.to_string()).collect();
        println!("{n},{}", row.join(","));
    }
    Ok(())
}

fn parse_key(text: Option<&str>) -> Result<CipherKey, Box<dyn std::error::Error>> {
    let mut key = [0u8; 16];
    if let Some(text) = text {
        let bytes = packet::hex_decode(text)?;
        if bytes.len() != key.len() {
            return Err(format!("key must be {} hex bytes, got {}", key.len(), bytes.len()).into());
        }
        key.copy_from_slice(&bytes);
    }
    Ok(key)
}

fn decode_command(packet_arg: &str, key: Option<&str>) -> Result<(), Box<dyn std::error::Error>> {
    let hex = match packet_arg.strip_prefix('@') {
        Some(path) => std::fs::read_to_string(path)?,
        None => packet_arg.to_string(),
    };
    let bytes = packet::hex_decode(&hex)?;
    let key = parse_key(key)?;

    let mut auth = Authenticator::new(CipherBackend::Software, key, bytes.len())?;
    let (parsed, verified) = match PacketDecoder::verify(&bytes, &mut auth) {
        Ok(parsed) => (parsed, true),
        Err(PipelineError::TagMismatch) => (PacketDecoder::decode(&bytes)?, false),
        Err(e) => return Err(e.into()),
    };

    println!("sender_id: {:#04x}", parsed.sender_id);
    println!("serial: {}", parsed.serial);
    println!("payload_length: {}", parsed.payload_length);
    let row: Vec<String> = parsed.coefficients.iter().map(|c| c.to_string()).collect();
    println!("coefficients: {}", row.join(","));
    println!("tag: {}", if verified { "OK" } else { "MISMATCH" });

    if !verified {
        return Err(PipelineError::TagMismatch.into());
    }
    Ok(())
}
