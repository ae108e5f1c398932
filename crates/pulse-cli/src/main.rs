use clap::{Parser, Subcommand};
use ndarray::Array1;
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

use pulse_core::{Engine, PulseConfig};
use pulse_signals::dsp::Conditioner;
use pulse_signals::peaks::PeakExtractor;
use pulse_signals::reference::ReferenceWaveform;

#[derive(Parser)]
#[command(name = "pulse-cli", about = "Pulse waveform denoising and beat forecasting")]
struct Cli {
    #[command(subcommand)]
    cmd: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the streaming pipeline over a recorded intensity trace and print
    /// one JSON record per chunk
    Process {
        /// Intensity trace: one sample per line, or comma separated
        input: PathBuf,
        /// Sample rate of the recording (video frames per second)
        #[arg(long)]
        fps: f32,
        /// Reference beat waveform file
        #[arg(long)]
        reference: PathBuf,
        /// Chunk duration fed per pipeline invocation
        #[arg(long, default_value_t = 5.0)]
        chunk_seconds: f32,
        /// Optional TOML config (PULSE_* env vars override)
        #[arg(long)]
        config: Option<PathBuf>,
    },
    /// Build a reference beat template from a clean recording
    Reference {
        /// Intensity trace of a clean, steady recording
        input: PathBuf,
        /// Sample rate of the recording
        #[arg(long)]
        fps: f32,
        /// Output file, one sample per line
        #[arg(long)]
        output: PathBuf,
    },
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    fmt().with_env_filter(EnvFilter::from_default_env()).init();

    let cli = Cli::parse();
    match cli.cmd {
        Commands::Process {
            input,
            fps,
            reference,
            chunk_seconds,
            config,
        } => {
            let config = match config {
                Some(path) => PulseConfig::from_file_with_env(path)?,
                None => PulseConfig::default(),
            };
            let reference = ReferenceWaveform::from_file(reference)?;
            let engine = Engine::new(config, reference)?;
            let mut session = engine.create_session(fps);

            let samples = read_samples(&input)?;
            let chunk_len = (chunk_seconds * fps) as usize;
            if chunk_len == 0 {
                return Err("chunk_seconds * fps must be at least one sample".into());
            }
            info!(
                total = samples.len(),
                chunk_len, "processing recorded trace"
            );

            for chunk in samples.chunks(chunk_len) {
                if chunk.len() < chunk_len {
                    break; // trailing fragment shorter than one invocation
                }
                let output = engine.process_chunk(&mut session, chunk, fps)?;
                println!("{}", serde_json::to_string(&output)?);
                if output.not_reading {
                    info!("signal unreadable, session restarted");
                }
            }
        }
        Commands::Reference { input, fps, output } => {
            let samples = read_samples(&input)?;
            let template = build_reference(&samples, fps)?;
            let lines: Vec<String> = template.iter().map(|v| v.to_string()).collect();
            std::fs::write(&output, lines.join("\n"))?;
            info!(len = template.len(), path = %output.display(), "reference written");
        }
    }
    Ok(())
}

fn read_samples(path: &PathBuf) -> Result<Vec<f32>, Box<dyn std::error::Error>> {
    let content = std::fs::read_to_string(path)?;
    let mut samples = Vec::new();
    for token in content.split(|c: char| c == ',' || c.is_whitespace()) {
        let token = token.trim();
        if token.is_empty() {
            continue;
        }
        samples.push(token.parse::<f32>()?);
    }
    Ok(samples)
}

/// Condition a clean recording and average its beat-to-beat segments into a
/// single template.
fn build_reference(samples: &[f32], fps: f32) -> Result<Vec<f32>, Box<dyn std::error::Error>> {
    let conditioned = Conditioner::new().condition(&Array1::from(samples.to_vec()), fps)?;
    let peaks = PeakExtractor::new().detect_peaks(&conditioned, fps, None);
    if peaks.len() < 3 {
        return Err("recording too short or too noisy: fewer than 3 beats detected".into());
    }

    let lengths: Vec<usize> = peaks.windows(2).map(|w| w[1] - w[0]).collect();
    let mut sorted = lengths.clone();
    sorted.sort_unstable();
    let beat_len = sorted[sorted.len() / 2].max(4);

    let conditioned = conditioned.to_vec();
    let mut template = vec![0.0f32; beat_len];
    for pair in peaks.windows(2) {
        let segment = &conditioned[pair[0]..pair[1]];
        for (i, slot) in template.iter_mut().enumerate() {
            *slot += lerp(segment, i as f32 * (segment.len() - 1) as f32 / (beat_len - 1) as f32);
        }
    }
    let count = (peaks.len() - 1) as f32;
    for v in &mut template {
        *v /= count;
    }
    Ok(template)
}

fn lerp(segment: &[f32], pos: f32) -> f32 {
    let lo = pos.floor() as usize;
    let hi = (lo + 1).min(segment.len() - 1);
    let frac = pos - lo as f32;
    segment[lo] * (1.0 - frac) + segment[hi] * frac
}
