//! Card sessions and acquisition state.
//!
//! A [`CardSession`] bundles everything the sequencer needs to drive one
//! physical converter card: the resolved base addresses of its register
//! sub-blocks, the router bases, the burst geometry and the artifact
//! naming. Sessions are produced from a [`FabricTopology`] (the output of
//! the carrier's address-resolution layer, queried once and cached) plus a
//! [`BoardProfile`]; the engine itself never performs address discovery
//! and never branches on carrier identity.

use daqfab_fabric::{regs, BoardProfile};

use crate::error::{DaqError, Result};

/// Resolved base addresses of the fabric peripherals one session uses.
///
/// Produced by the topology/address-resolution collaborator before the
/// engine runs; read-only afterwards.
#[derive(Debug, Clone)]
pub struct FabricTopology {
    /// Base of the 1-to-N router in front of the playback memories.
    pub playback_router_base: u32,
    /// Base of the N-to-1 router behind the capture FIFOs.
    pub capture_router_base: u32,
    /// Base of each converter card's register window, card 0 first.
    pub card_bases: Vec<u32>,
}

impl FabricTopology {
    /// The fixed layout used by the loopback backend and single-device
    /// carriers with the stock firmware image.
    #[must_use]
    pub fn standard() -> Self {
        Self {
            playback_router_base: 0x0100,
            capture_router_base: 0x0200,
            card_bases: vec![0x2000, 0x2800],
        }
    }
}

/// Session state, advancing monotonically per card.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Nothing done yet.
    Idle,
    /// Both playback memories are loaded and archived.
    PlaybackLoaded,
    /// Link verification in progress (ramp pattern checks).
    Verifying,
    /// Real captures in progress.
    Capturing,
    /// Both capture inputs archived; session finished cleanly.
    Done,
    /// A collaborator error or failed verification ended the session.
    Failed,
}

/// Which of the two acquisition passes is running.
///
/// Advances `VerifyPattern` → `CaptureReal` once per session, never
/// reverts: link verification gates every archived capture.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AcquisitionPhase {
    /// Ramp pattern checks against both capture inputs.
    VerifyPattern,
    /// Archived captures from both inputs.
    CaptureReal,
}

/// Everything needed to drive one converter card. Read-only to the engine.
#[derive(Debug, Clone)]
pub struct CardSession {
    /// Card slot on the carrier (0 or 1).
    pub card: u8,
    /// Control sub-block base.
    pub control_base: u32,
    /// Capture chip SPI sub-block base.
    pub adc_spi_base: u32,
    /// Playback chip SPI sub-block base.
    pub dac_spi_base: u32,
    /// Capture PHY sub-block base.
    pub adc_phy_base: u32,
    /// Playback PHY sub-block base.
    pub dac_phy_base: u32,
    /// Playback router base.
    pub playback_router_base: u32,
    /// Capture router base.
    pub capture_router_base: u32,
    /// Burst size in samples (from the board profile).
    pub burst_size: u32,
    /// Capture PHY clock tap delay (from the board profile).
    pub tap_clock: u8,
    /// Capture PHY data tap delay (from the board profile).
    pub tap_data: u8,
    /// Playback PHY output delay tap. Only the secondary slot implements
    /// an ODELAY chain; zero on every other card.
    pub output_delay_tap: u8,
    /// Suffix appended to artifact stems (`_primary`/`_secondary` on
    /// dual-slot carriers, empty otherwise).
    pub artifact_suffix: &'static str,
}

impl CardSession {
    /// Build the session for one card slot.
    ///
    /// # Errors
    ///
    /// Returns a protocol error if the profile or topology does not carry
    /// the requested slot.
    pub fn new(card: u8, topology: &FabricTopology, profile: &BoardProfile) -> Result<Self> {
        if card >= profile.card_count {
            return Err(DaqError::protocol(format!(
                "carrier '{}' has {} card(s), no slot {card}",
                profile.name, profile.card_count
            )));
        }
        let base = *topology.card_bases.get(card as usize).ok_or_else(|| {
            DaqError::protocol(format!("topology resolves no base for card slot {card}"))
        })?;

        let artifact_suffix = if profile.card_count == 2 {
            if card == 0 {
                "_primary"
            } else {
                "_secondary"
            }
        } else {
            ""
        };

        Ok(Self {
            card,
            control_base: base + regs::CTRL,
            adc_spi_base: base + regs::ADC_SPI,
            dac_spi_base: base + regs::DAC_SPI,
            adc_phy_base: base + regs::ADC_PHY,
            dac_phy_base: base + regs::DAC_PHY,
            playback_router_base: topology.playback_router_base,
            capture_router_base: topology.capture_router_base,
            burst_size: profile.burst_size,
            tap_clock: profile.tap_clock,
            tap_data: profile.tap_data,
            output_delay_tap: if card == 1 { profile.output_delay_tap } else { 0 },
            artifact_suffix,
        })
    }

    /// Artifact stem for a playback or capture channel, suffix included.
    #[must_use]
    pub fn artifact_stem(&self, prefix: &str, channel: u8) -> String {
        format!("{prefix}{channel}{}", self.artifact_suffix)
    }

    /// Burst length in bytes on the DMA channel.
    #[must_use]
    pub fn burst_bytes(&self) -> usize {
        self.burst_size as usize * 2
    }
}

/// Build the sessions for every card the profile carries, in slot order.
///
/// # Errors
///
/// Returns a protocol error if the topology resolves fewer card windows
/// than the profile expects.
pub fn sessions_for(topology: &FabricTopology, profile: &BoardProfile) -> Result<Vec<CardSession>> {
    (0..profile.card_count)
        .map(|card| CardSession::new(card, topology, profile))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use daqfab_fabric::profile_for;

    #[test]
    fn sub_blocks_follow_card_base() {
        let topology = FabricTopology::standard();
        let profile = profile_for(0x0090).unwrap();
        let session = CardSession::new(0, &topology, profile).unwrap();
        assert_eq!(session.control_base, 0x2000);
        assert_eq!(session.adc_spi_base, 0x2100);
        assert_eq!(session.dac_spi_base, 0x2300);
        assert_eq!(session.burst_bytes(), 32 * 1024);
    }

    #[test]
    fn single_card_has_no_suffix() {
        let topology = FabricTopology::standard();
        let profile = profile_for(0x0090).unwrap();
        let session = CardSession::new(0, &topology, profile).unwrap();
        assert_eq!(session.artifact_stem("adc", 1), "adc1");
    }

    #[test]
    fn dual_slot_suffixes() {
        let topology = FabricTopology::standard();
        let profile = profile_for(0x0091).unwrap();
        let sessions = sessions_for(&topology, profile).unwrap();
        assert_eq!(sessions.len(), 2);
        assert_eq!(sessions[0].artifact_stem("dac", 0), "dac0_primary");
        assert_eq!(sessions[1].artifact_stem("dac", 0), "dac0_secondary");
    }

    #[test]
    fn taps_come_from_the_profile() {
        let topology = FabricTopology::standard();
        let profile = profile_for(0x0091).unwrap();
        let sessions = sessions_for(&topology, profile).unwrap();
        assert_eq!(sessions[0].tap_clock, profile.tap_clock);
        // Only the secondary slot implements an ODELAY chain.
        assert_eq!(sessions[0].output_delay_tap, 0);
        assert_eq!(sessions[1].output_delay_tap, profile.output_delay_tap);
    }

    #[test]
    fn slot_out_of_range_rejected() {
        let topology = FabricTopology::standard();
        let profile = profile_for(0x0090).unwrap();
        assert!(CardSession::new(1, &topology, profile).is_err());
    }
}
