//! Per-carrier calibration profiles.
//!
//! The topology layer identifies the carrier by its constellation id and
//! hands the matching profile to session construction. The acquisition
//! engine itself never branches on carrier identity — it only consumes the
//! resolved constants (burst geometry, PHY tap delays, card count).

/// Calibration bundle for one supported carrier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BoardProfile {
    /// Constellation id reported by the carrier firmware.
    pub constellation_id: u16,
    /// Human-readable carrier name.
    pub name: &'static str,
    /// Burst size in samples, shared by capture and playback.
    pub burst_size: u32,
    /// Capture PHY clock tap delay.
    pub tap_clock: u8,
    /// Capture PHY data tap delay.
    pub tap_data: u8,
    /// Playback PHY output tap delay (dual-slot carriers only).
    pub output_delay_tap: u8,
    /// Number of converter cards on the carrier (1 or 2).
    pub card_count: u8,
}

/// All carriers this driver is calibrated for.
pub const PROFILES: &[BoardProfile] = &[
    BoardProfile {
        constellation_id: 0x0041,
        name: "DF104 compact",
        burst_size: 1024,
        tap_clock: 0,
        tap_data: 0,
        output_delay_tap: 0,
        card_count: 1,
    },
    BoardProfile {
        constellation_id: 0x0072,
        name: "DF308 mid-range",
        burst_size: 4 * 1024,
        tap_clock: 16,
        tap_data: 0,
        output_delay_tap: 0,
        card_count: 1,
    },
    BoardProfile {
        constellation_id: 0x0090,
        name: "DF612 full",
        burst_size: 16 * 1024,
        tap_clock: 10,
        tap_data: 0,
        output_delay_tap: 0,
        card_count: 1,
    },
    BoardProfile {
        constellation_id: 0x0091,
        name: "DF612 dual-slot",
        burst_size: 16 * 1024,
        tap_clock: 12,
        tap_data: 0,
        output_delay_tap: 5,
        card_count: 2,
    },
];

/// Look up the profile for a constellation id.
#[must_use]
pub fn profile_for(constellation_id: u16) -> Option<&'static BoardProfile> {
    PROFILES.iter().find(|p| p.constellation_id == constellation_id)
}
