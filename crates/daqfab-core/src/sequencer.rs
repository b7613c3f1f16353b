//! Acquisition sequencing.
//!
//! Drives the full cycle for one converter card: load both playback
//! memories, prove link integrity with ramp pattern checks against both
//! capture inputs, then archive one real burst from each input. Link
//! verification is a precondition gating the archived captures, not
//! advisory — no real data is persisted before both inputs have shown a
//! continuous ramp.
//!
//! Everything is synchronous and single-threaded: each state transition
//! runs to completion before the next begins, and sample buffers are
//! exclusively owned by the stage holding them. Any collaborator failure
//! is fatal to the current card session; retries are the caller's
//! business, by re-running the whole session.

use std::path::PathBuf;

use daqfab_fabric::routing;
use tracing::{debug, info, warn};

use crate::archive;
use crate::control::{AdcFrontEnd, AdcPhy, ConverterControl, DacPhy, PlaybackChannel};
use crate::error::{DaqError, Result};
use crate::pattern;
use crate::router::CrossbarRouter;
use crate::session::{AcquisitionPhase, CardSession, SessionState};
use crate::transport::FabricTransport;
use crate::waveform::{synthesize, SampleBuffer, WaveformKind, WaveformSpec};

/// Default playback amplitude, just under full scale (`2^15.8`).
pub const DEFAULT_AMPLITUDE: u32 = 57_052;
/// Default tone frequency hint for playback channel 0, in Hz.
pub const DEFAULT_TONE_HINT_HZ: f64 = 100e6;
/// Default playback signal period, in samples.
pub const DEFAULT_PERIOD: u32 = 16;

/// Tunables for one acquisition session.
#[derive(Debug, Clone)]
pub struct SequencerConfig {
    /// Directory receiving the waveform and capture artifacts.
    pub archive_dir: PathBuf,
    /// Tone frequency hint for playback channel 0.
    pub tone_hint_hz: f64,
    /// Signal period for the channel-1 square wave, in samples.
    pub period: u32,
    /// Peak-to-peak playback amplitude in counts.
    pub amplitude: u32,
}

impl Default for SequencerConfig {
    fn default() -> Self {
        Self {
            archive_dir: PathBuf::from("."),
            tone_hint_hz: DEFAULT_TONE_HINT_HZ,
            period: DEFAULT_PERIOD,
            amplitude: DEFAULT_AMPLITUDE,
        }
    }
}

impl SequencerConfig {
    /// Default configuration archiving into `dir`.
    #[must_use]
    pub fn with_dir(dir: impl Into<PathBuf>) -> Self {
        Self {
            archive_dir: dir.into(),
            ..Self::default()
        }
    }
}

/// What one finished session did.
#[derive(Debug, Clone)]
pub struct SessionReport {
    /// Card slot the session drove.
    pub card: u8,
    /// Burst reads spent on ramp verification (two on a clean run).
    pub verify_reads: u32,
    /// Burst reads archived as real captures (two on a clean run).
    pub capture_reads: u32,
    /// Ramp mismatches observed per capture input.
    pub mismatches: [u32; 2],
    /// Every artifact written, in creation order.
    pub artifacts: Vec<PathBuf>,
}

impl SessionReport {
    fn new(card: u8) -> Self {
        Self {
            card,
            verify_reads: 0,
            capture_reads: 0,
            mismatches: [0; 2],
            artifacts: Vec::new(),
        }
    }
}

/// Outcome of one card in a multi-card run.
#[derive(Debug)]
pub struct CardOutcome {
    /// Card slot.
    pub card: u8,
    /// The session's report, or the error that failed it.
    pub result: Result<SessionReport>,
}

/// State machine driving one [`CardSession`].
#[derive(Debug)]
pub struct AcquisitionSequencer {
    session: CardSession,
    config: SequencerConfig,
    state: SessionState,
}

impl AcquisitionSequencer {
    /// Sequencer for one card session.
    #[must_use]
    pub fn new(session: CardSession, config: SequencerConfig) -> Self {
        Self {
            session,
            config,
            state: SessionState::Idle,
        }
    }

    /// Current session state.
    #[must_use]
    pub const fn state(&self) -> SessionState {
        self.state
    }

    /// The session being driven.
    #[must_use]
    pub const fn session(&self) -> &CardSession {
        &self.session
    }

    /// Run the full verify-then-capture cycle.
    ///
    /// On success the session ends in [`SessionState::Done`] after exactly
    /// two verification reads and two capture reads. On any error the
    /// session ends in [`SessionState::Failed`] with the originating
    /// error; buffers are released on every exit path and no partial
    /// artifact is left behind (archiving only happens after a complete
    /// burst read).
    ///
    /// # Errors
    ///
    /// Propagates the first collaborator error, or
    /// [`DaqError::VerificationFailed`] when the ramp checks mismatched.
    pub fn run(&mut self, transport: &mut dyn FabricTransport) -> Result<SessionReport> {
        let result = self.drive(transport);
        match &result {
            Ok(report) => {
                self.state = SessionState::Done;
                info!(
                    "card {}: session done ({} artifacts)",
                    report.card,
                    report.artifacts.len()
                );
            }
            Err(e) => {
                self.state = SessionState::Failed;
                warn!("card {}: session failed: {e}", self.session.card);
            }
        }
        result
    }

    fn drive(&mut self, transport: &mut dyn FabricTransport) -> Result<SessionReport> {
        let mut report = SessionReport::new(self.session.card);
        let control = ConverterControl::new(self.session.control_base);
        let playback_router = CrossbarRouter::new(self.session.playback_router_base);
        let capture_router = CrossbarRouter::new(self.session.capture_router_base);
        let front_end = AdcFrontEnd::new(self.session.adc_spi_base);

        // Known-safe routing before anything streams, then lane alignment
        // and burst geometry.
        playback_router.configure(transport, routing::IDLE)?;
        capture_router.configure(transport, routing::IDLE)?;
        AdcPhy::new(self.session.adc_phy_base).apply_taps(
            transport,
            self.session.tap_clock,
            self.session.tap_data,
        )?;
        DacPhy::new(self.session.dac_phy_base)
            .set_output_delay(transport, self.session.output_delay_tap)?;
        control.configure_burst(transport, true, self.session.burst_size)?;

        self.load_playback(transport, &control, &playback_router, &mut report)?;
        self.state = SessionState::PlaybackLoaded;

        self.state = SessionState::Verifying;
        self.run_pass(
            transport,
            &control,
            &capture_router,
            &front_end,
            AcquisitionPhase::VerifyPattern,
            &mut report,
        )?;

        self.state = SessionState::Capturing;
        self.run_pass(
            transport,
            &control,
            &capture_router,
            &front_end,
            AcquisitionPhase::CaptureReal,
            &mut report,
        )?;

        Ok(report)
    }

    /// Synthesize, archive and upload both playback channels.
    ///
    /// The two channels get deliberately distinct shapes (tone vs square)
    /// so crosstalk between them is visible in the captures.
    fn load_playback(
        &self,
        transport: &mut dyn FabricTransport,
        control: &ConverterControl,
        playback_router: &CrossbarRouter,
        report: &mut SessionReport,
    ) -> Result<()> {
        for (channel, kind) in [
            (PlaybackChannel::Dac0, WaveformKind::Sine),
            (PlaybackChannel::Dac1, WaveformKind::Square),
        ] {
            let spec = WaveformSpec {
                kind,
                sample_count: self.session.burst_size,
                period: self.config.period,
                amplitude: self.config.amplitude,
                frequency_hz: self.config.tone_hint_hz,
            };
            let buffer = synthesize(&spec)?;

            let stem = self.session.artifact_stem("dac", channel.index());
            let (ascii, binary) =
                archive::archive_pair(buffer.as_slice(), &self.config.archive_dir, &stem)?;
            report.artifacts.extend([ascii, binary]);

            playback_router.configure(
                transport,
                routing::playback_sink(self.session.card, channel.index()),
            )?;
            control.prepare_waveform_load(transport, channel)?;
            transport.write_burst(&buffer.to_le_bytes())?;
            info!(
                "card {}: dac{} loaded with {:?} ({} samples)",
                self.session.card,
                channel.index(),
                kind,
                buffer.len()
            );
        }
        Ok(())
    }

    /// One pass of the two-step capture loop, against both inputs.
    ///
    /// `VerifyPattern` proves ramp continuity: a mismatch on the first
    /// input does not abort, since one bad lane is not yet a systemic
    /// link failure — the second input is still checked before giving up.
    /// Only a collaborator error aborts immediately. `CaptureReal` runs
    /// the identical route → enable → arm → trigger → read steps but
    /// archives each burst instead of verifying it.
    fn run_pass(
        &self,
        transport: &mut dyn FabricTransport,
        control: &ConverterControl,
        capture_router: &CrossbarRouter,
        front_end: &AdcFrontEnd,
        phase: AcquisitionPhase,
        report: &mut SessionReport,
    ) -> Result<()> {
        let pattern_check = phase == AcquisitionPhase::VerifyPattern;
        front_end.set_pattern_check(transport, pattern_check)?;

        let mut total = 0u32;
        for input in 0..2u8 {
            let burst = self.acquire(transport, control, capture_router, input)?;
            match phase {
                AcquisitionPhase::VerifyPattern => {
                    report.verify_reads += 1;
                    let verdict = pattern::verify_ramp(burst.as_slice());
                    report.mismatches[input as usize] = verdict.mismatches;
                    total += verdict.mismatches;
                    if !verdict.ok {
                        warn!(
                            "card {}: capture input {input} broke the ramp ({} mismatches)",
                            self.session.card, verdict.mismatches
                        );
                    }
                }
                AcquisitionPhase::CaptureReal => {
                    report.capture_reads += 1;
                    let stem = self.session.artifact_stem("adc", input);
                    let (ascii, binary) = archive::archive_pair(
                        burst.as_slice(),
                        &self.config.archive_dir,
                        &stem,
                    )?;
                    report.artifacts.extend([ascii, binary]);
                    info!(
                        "card {}: archived {} samples from adc{input}",
                        self.session.card,
                        burst.len()
                    );
                }
            }
        }

        if total != 0 {
            return Err(DaqError::VerificationFailed { mismatches: total });
        }
        if pattern_check {
            info!("card {}: link verified", self.session.card);
        }
        Ok(())
    }

    /// One route → enable → arm → trigger → read step against `input`.
    fn acquire(
        &self,
        transport: &mut dyn FabricTransport,
        control: &ConverterControl,
        capture_router: &CrossbarRouter,
        input: u8,
    ) -> Result<SampleBuffer> {
        debug!("card {}: acquiring from adc{input}", self.session.card);
        capture_router.configure(
            transport,
            routing::capture_source(self.session.card, input),
        )?;
        control.enable_channels(transport, input == 0, input == 1, true, true)?;
        control.arm_dac(transport)?;
        control.software_trigger(transport)?;

        let mut raw = vec![0u8; self.session.burst_bytes()];
        transport.read_burst(&mut raw)?;
        SampleBuffer::from_le_bytes(&raw)
    }
}

/// Run every session strictly sequentially on one transport.
///
/// The routing fabric is a global resource shared by all cards in one
/// device, so card N+1 begins only after card N reached `Done` or
/// `Failed`. One card's failure does not cancel the others; each outcome
/// is reported separately.
pub fn run_sessions(
    transport: &mut dyn FabricTransport,
    sessions: Vec<CardSession>,
    config: &SequencerConfig,
) -> Vec<CardOutcome> {
    sessions
        .into_iter()
        .map(|session| {
            let card = session.card;
            let mut sequencer = AcquisitionSequencer::new(session, config.clone());
            let result = sequencer.run(transport);
            CardOutcome { card, result }
        })
        .collect()
}
