//! Converter-card register map.
//!
//! One card occupies a contiguous window in the fabric address space. The
//! window is split into fixed sub-blocks; every sub-block offset below is
//! relative to the card's base address as resolved by the topology layer.
//!
//! ```text
//! base + 0x000: CTRL      — burst setup, channel enables, arm, trigger
//! base + 0x010: ADC PHY   — capture lane alignment (tap delays)
//! base + 0x020: DAC PHY   — playback lane alignment
//! base + 0x100: ADC SPI   — capture chip configuration
//! base + 0x300: DAC SPI   — playback chip configuration
//! base + 0x400: CLK SPI   — clock-tree configuration
//! base + 0x600: FREQ CNT  — frequency counters
//! base + 0x700: MONITOR   — voltage/temperature monitor
//! ```

// ── Sub-block offsets inside one card window ─────────────────────────────────

/// Control block (burst, enables, arm, trigger).
pub const CTRL: u32 = 0x000;
/// ADC PHY block (capture lane alignment).
pub const ADC_PHY: u32 = 0x010;
/// DAC PHY block (playback lane alignment).
pub const DAC_PHY: u32 = 0x020;
/// ADC SPI block (capture chip configuration).
pub const ADC_SPI: u32 = 0x100;
/// DAC SPI block (playback chip configuration).
pub const DAC_SPI: u32 = 0x300;
/// Clock SPI block.
pub const CLK_SPI: u32 = 0x400;
/// Frequency-counter block.
pub const FREQ_CNT: u32 = 0x600;
/// Monitor block (voltages, temperature).
pub const MONITOR: u32 = 0x700;

// ── CTRL block registers (relative to `CTRL`) ────────────────────────────────

pub mod ctrl {
    //! Control-block register offsets and field values.

    /// Burst size in samples (shared by capture and playback paths).
    pub const BURST_SIZE: u32 = 0x00;
    /// Burst enable — write 1 to apply the configured size.
    pub const BURST_ENABLE: u32 = 0x01;
    /// Channel enable mask, see [`channel`].
    pub const CHANNEL_EN: u32 = 0x02;
    /// DAC arm — write 1 to latch the loaded waveforms.
    pub const DAC_ARM: u32 = 0x03;
    /// Software trigger — write 1 to start one burst.
    pub const SW_TRIGGER: u32 = 0x04;
    /// Waveform-load target, see [`wfm_target`]. Writing this register puts
    /// the card into load mode; the next burst write fills that memory.
    pub const WFM_LOAD: u32 = 0x05;

    /// Bits of the [`CHANNEL_EN`] mask.
    pub mod channel {
        /// Capture channel 0.
        pub const ADC0: u32 = 1 << 0;
        /// Capture channel 1.
        pub const ADC1: u32 = 1 << 1;
        /// Playback channel 0.
        pub const DAC0: u32 = 1 << 2;
        /// Playback channel 1.
        pub const DAC1: u32 = 1 << 3;
    }

    /// Values of the [`WFM_LOAD`] register.
    pub mod wfm_target {
        /// Playback memory of channel 0.
        pub const DAC0: u32 = 0;
        /// Playback memory of channel 1.
        pub const DAC1: u32 = 1;
    }
}

// ── PHY registers (relative to `ADC_PHY` / `DAC_PHY`) ────────────────────────

pub mod adc_phy {
    //! Capture-PHY register offsets (lane alignment).

    /// IODELAY tap count on the capture clock lane.
    pub const TAP_CLOCK: u32 = 0x00;
    /// IODELAY tap count on the capture data lanes.
    pub const TAP_DATA: u32 = 0x01;
}

pub mod dac_phy {
    //! Playback-PHY register offsets (lane alignment).

    /// ODELAY tap count on the playback output lanes.
    pub const OUTPUT_DELAY: u32 = 0x00;
}

// ── ADC SPI registers (relative to `ADC_SPI`) ────────────────────────────────

pub mod adc_spi {
    //! Capture-chip SPI register offsets.

    /// Test-pattern control: write [`PATTERN_RAMP`] to replace the sampled
    /// signal with the 14-bit ramp counter, [`PATTERN_OFF`] for real data.
    pub const TEST_PATTERN: u32 = 0x3C;

    /// Ramp counter enabled.
    pub const PATTERN_RAMP: u32 = 0x01;
    /// Normal capture path.
    pub const PATTERN_OFF: u32 = 0x00;
}

// ── Ramp pattern geometry ────────────────────────────────────────────────────

/// The capture chips count with 14-bit resolution; the payload sits in the
/// top 14 bits of each 16-bit sample.
pub const RAMP_MASK: u16 = 0x3FFF;
/// Bits below the ramp payload (overrange flags, ignored by verification).
pub const RAMP_SHIFT: u16 = 2;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sub_blocks_non_overlapping() {
        assert!(CTRL < ADC_PHY);
        assert!(ADC_PHY < DAC_PHY);
        assert!(DAC_PHY < ADC_SPI);
        assert!(ADC_SPI < DAC_SPI);
        assert!(DAC_SPI < CLK_SPI);
        assert!(CLK_SPI < FREQ_CNT);
        assert!(FREQ_CNT < MONITOR);
    }

    #[test]
    fn channel_bits_disjoint() {
        let all = ctrl::channel::ADC0 | ctrl::channel::ADC1 | ctrl::channel::DAC0 | ctrl::channel::DAC1;
        assert_eq!(all.count_ones(), 4);
    }

    #[test]
    fn ramp_geometry() {
        assert_eq!(RAMP_MASK, (1 << 14) - 1);
        assert_eq!(u16::MAX >> RAMP_SHIFT, RAMP_MASK);
    }
}
