//! `daqfab` — command-line interface for daqfab converter carriers.
//!
//! ```text
//! USAGE:
//!   daqfab run [--device /dev/daqfab0] [--constellation 0x0090]
//!                                        Run the verify-then-capture cycle
//!   daqfab synth --kind saw --samples 1024 --period 64
//!                                        Synthesize a waveform to artifacts
//!   daqfab check adc0.bin                Verify the ramp in a capture file
//! ```

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use tracing_subscriber::EnvFilter;

use daqfab_core::{
    archive_pair, load_binary, run_sessions, sessions_for, synthesize, verify_ramp,
    CharDeviceTransport, FabricTopology, FabricTransport, LoopbackTransport, SequencerConfig,
    WaveformKind, WaveformSpec, DEFAULT_AMPLITUDE, DEFAULT_TIMEOUT_MS,
};
use daqfab_fabric::profile_for;

#[derive(Parser)]
#[command(name = "daqfab", about = "daqfab converter carrier CLI", version)]
struct Cli {
    #[command(subcommand)]
    command: Cmd,
}

#[derive(Subcommand)]
enum Cmd {
    /// Run the full verify-then-capture cycle on every card of a carrier.
    Run {
        /// Carrier device file; omit to run against the loopback emulation.
        #[arg(long)]
        device: Option<PathBuf>,
        /// Constellation id of the carrier (e.g. 0x0090).
        #[arg(long, default_value = "0x0090", value_parser = parse_constellation)]
        constellation: u16,
        /// Directory receiving the waveform and capture artifacts.
        #[arg(long, default_value = ".")]
        output_dir: PathBuf,
        /// DMA timeout in milliseconds.
        #[arg(long, default_value_t = DEFAULT_TIMEOUT_MS)]
        timeout_ms: u64,
    },
    /// Synthesize a waveform into `<stem>.txt` / `<stem>.bin`.
    Synth {
        /// Waveform shape.
        #[arg(long, value_enum, default_value_t = KindArg::Sine)]
        kind: KindArg,
        /// Buffer length in samples (even).
        #[arg(long, default_value_t = 16 * 1024)]
        samples: u32,
        /// Signal period in samples (saw/pulse/square).
        #[arg(long, default_value_t = 16)]
        period: u32,
        /// Peak-to-peak amplitude in counts.
        #[arg(long, default_value_t = DEFAULT_AMPLITUDE)]
        amplitude: u32,
        /// Tone frequency hint in Hz (sine).
        #[arg(long, default_value_t = 100e6)]
        frequency: f64,
        /// Artifact stem.
        #[arg(long, default_value = "waveform")]
        stem: String,
        /// Directory receiving the artifacts.
        #[arg(long, default_value = ".")]
        output_dir: PathBuf,
    },
    /// Verify the ramp pattern in a binary capture artifact.
    Check {
        /// Binary artifact to check (raw little-endian i16).
        file: PathBuf,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum KindArg {
    Sine,
    Saw,
    Dc,
    Pulse,
    Square,
}

impl From<KindArg> for WaveformKind {
    fn from(kind: KindArg) -> Self {
        match kind {
            KindArg::Sine => Self::Sine,
            KindArg::Saw => Self::Saw,
            KindArg::Dc => Self::Dc,
            KindArg::Pulse => Self::Pulse,
            KindArg::Square => Self::Square,
        }
    }
}

fn parse_constellation(s: &str) -> Result<u16, String> {
    let parsed = if let Some(hex) = s.strip_prefix("0x") {
        u16::from_str_radix(hex, 16)
    } else {
        s.parse()
    };
    parsed.map_err(|e| format!("invalid constellation id '{s}': {e}"))
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "warn".into()))
        .init();

    let cli = Cli::parse();

    match cli.command {
        Cmd::Run {
            device,
            constellation,
            output_dir,
            timeout_ms,
        } => cmd_run(device.as_deref(), constellation, &output_dir, timeout_ms),
        Cmd::Synth {
            kind,
            samples,
            period,
            amplitude,
            frequency,
            stem,
            output_dir,
        } => cmd_synth(kind, samples, period, amplitude, frequency, &stem, &output_dir),
        Cmd::Check { file } => cmd_check(&file),
    }
}

fn cmd_run(
    device: Option<&std::path::Path>,
    constellation: u16,
    output_dir: &std::path::Path,
    timeout_ms: u64,
) -> Result<()> {
    let profile = profile_for(constellation)
        .with_context(|| format!("no calibration profile for constellation {constellation:#06x}"))?;
    println!(
        "Carrier  : {} ({} card(s), {} sample bursts)",
        profile.name, profile.card_count, profile.burst_size
    );

    let topology = FabricTopology::standard();
    let sessions = sessions_for(&topology, profile)?;

    let mut transport: Box<dyn FabricTransport> = match device {
        Some(path) => Box::new(CharDeviceTransport::open_with_timeout(
            path,
            Duration::from_millis(timeout_ms),
        )?),
        None => {
            println!("Transport: loopback emulation (no hardware)");
            Box::new(LoopbackTransport::new())
        }
    };

    let config = SequencerConfig::with_dir(output_dir);
    let outcomes = run_sessions(transport.as_mut(), sessions, &config);

    let mut failed = 0;
    for outcome in &outcomes {
        match &outcome.result {
            Ok(report) => {
                println!(
                    "card {}: done — {} verify reads, {} captures, {} artifacts",
                    outcome.card,
                    report.verify_reads,
                    report.capture_reads,
                    report.artifacts.len()
                );
            }
            Err(e) => {
                failed += 1;
                println!("card {}: FAILED — {e}", outcome.card);
            }
        }
    }

    if failed > 0 {
        bail!("{failed} card session(s) failed");
    }
    Ok(())
}

fn cmd_synth(
    kind: KindArg,
    samples: u32,
    period: u32,
    amplitude: u32,
    frequency: f64,
    stem: &str,
    output_dir: &std::path::Path,
) -> Result<()> {
    let spec = WaveformSpec {
        kind: kind.into(),
        sample_count: samples,
        period,
        amplitude,
        frequency_hz: frequency,
    };
    let buffer = synthesize(&spec)?;
    let (ascii, binary) = archive_pair(buffer.as_slice(), output_dir, stem)?;
    println!("{} samples -> {} / {}", buffer.len(), ascii.display(), binary.display());
    Ok(())
}

fn cmd_check(file: &std::path::Path) -> Result<()> {
    let samples = load_binary(file)?;
    let report = verify_ramp(&samples);
    if report.ok {
        println!("{}: ramp continuous over {} samples", file.display(), samples.len());
        Ok(())
    } else {
        bail!(
            "{}: {} of {} samples broke the ramp",
            file.display(),
            report.mismatches,
            samples.len()
        )
    }
}
