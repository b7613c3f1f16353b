//! Acquisition sequencing and signal-integrity verification engine for
//! daqfab converter cards.
//!
//! A converter card pairs two 16-bit capture channels with two 16-bit
//! playback channels behind a memory-mapped peripheral fabric. This crate
//! drives the full acquisition cycle per card:
//!
//! ```text
//! Idle ──────────── synthesize + archive + upload both playback channels
//!   └─> PlaybackLoaded
//!         └─> Verifying ── ramp pattern check on both capture inputs
//!               └─> Capturing ── archive one real burst per input
//!                     └─> Done            (Failed on any collaborator error)
//! ```
//!
//! Link verification gates the captures: no real burst is archived before
//! both inputs have shown a continuous 14-bit ramp.
//!
//! # Quick start
//!
//! ```no_run
//! use daqfab_core::prelude::*;
//! use daqfab_fabric::profile_for;
//!
//! # fn main() -> std::result::Result<(), Box<dyn std::error::Error>> {
//! let profile = profile_for(0x0090).ok_or("unknown carrier")?;
//! let topology = FabricTopology::standard();
//! let sessions = sessions_for(&topology, profile)?;
//!
//! let mut transport = LoopbackTransport::new();
//! for outcome in run_sessions(&mut transport, sessions, &SequencerConfig::default()) {
//!     let report = outcome.result?;
//!     println!("card {}: {} artifacts", outcome.card, report.artifacts.len());
//! }
//! # Ok(())
//! # }
//! ```
//!
//! The engine is single-threaded, synchronous and blocking: every
//! transport operation runs to completion (or bounded timeout) before the
//! next begins. Parallelizing across cards would need mutual exclusion
//! around the shared routing fabric, which is why multi-card runs are
//! strictly sequential.

#![warn(missing_docs)]
#![warn(clippy::all, clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]

pub mod archive;
pub mod backends;
mod control;
mod error;
pub mod pattern;
mod router;
mod sequencer;
mod session;
mod transport;
pub mod waveform;

pub use archive::{archive, archive_pair, load_binary, Encoding};
pub use backends::{CharDeviceTransport, LoopbackTransport};
pub use control::{AdcFrontEnd, AdcPhy, ConverterControl, DacPhy, PlaybackChannel};
pub use error::{DaqError, Result};
pub use pattern::{verify_ramp, VerifyReport};
pub use router::CrossbarRouter;
pub use session::{sessions_for, AcquisitionPhase, CardSession, FabricTopology, SessionState};
pub use sequencer::{
    run_sessions, AcquisitionSequencer, CardOutcome, SequencerConfig, SessionReport,
    DEFAULT_AMPLITUDE, DEFAULT_PERIOD, DEFAULT_TONE_HINT_HZ,
};
pub use transport::{FabricTransport, DEFAULT_TIMEOUT_MS};
pub use waveform::{
    snapped_frequency, synthesize, SampleBuffer, WaveformKind, WaveformSpec, SAMPLE_CLOCK_HZ,
};

/// Commonly used types.
pub mod prelude {
    pub use crate::{
        run_sessions, sessions_for, synthesize, verify_ramp, AcquisitionSequencer, CardSession,
        DaqError, Encoding, FabricTopology, FabricTransport, LoopbackTransport, Result,
        SampleBuffer, SequencerConfig, SessionReport, SessionState, WaveformKind, WaveformSpec,
    };
}
