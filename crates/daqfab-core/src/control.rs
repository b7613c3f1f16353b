//! Converter-card control registers.
//!
//! Thin drivers over the CTRL, PHY and ADC SPI sub-blocks. Each call is
//! one or two register writes through the transport; any failure
//! propagates as a transport error and ends the session (there is no
//! retry at this level).

use daqfab_fabric::regs::{adc_phy, adc_spi, ctrl, dac_phy};
use tracing::debug;

use crate::error::Result;
use crate::transport::FabricTransport;

/// Playback channel selector for waveform loads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackChannel {
    /// Playback channel 0.
    Dac0,
    /// Playback channel 1.
    Dac1,
}

impl PlaybackChannel {
    /// Channel number (0 or 1).
    #[must_use]
    pub const fn index(self) -> u8 {
        match self {
            Self::Dac0 => 0,
            Self::Dac1 => 1,
        }
    }

    const fn load_target(self) -> u32 {
        match self {
            Self::Dac0 => ctrl::wfm_target::DAC0,
            Self::Dac1 => ctrl::wfm_target::DAC1,
        }
    }
}

/// Driver for one card's CTRL sub-block.
#[derive(Debug, Clone, Copy)]
pub struct ConverterControl {
    base: u32,
}

impl ConverterControl {
    /// Driver for the CTRL block at `base`.
    #[must_use]
    pub const fn new(base: u32) -> Self {
        Self { base }
    }

    /// Configure the burst size shared by capture and playback.
    ///
    /// # Errors
    ///
    /// Returns a transport error if a register write fails.
    pub fn configure_burst(
        &self,
        transport: &mut dyn FabricTransport,
        enable: bool,
        size: u32,
    ) -> Result<()> {
        debug!("ctrl {:#06x}: burst size {size}, enable {enable}", self.base);
        transport.write_reg(self.base + ctrl::BURST_SIZE, size)?;
        transport.write_reg(self.base + ctrl::BURST_ENABLE, u32::from(enable))?;
        Ok(())
    }

    /// Enable or disable the four converter channels.
    ///
    /// # Errors
    ///
    /// Returns a transport error if the register write fails.
    pub fn enable_channels(
        &self,
        transport: &mut dyn FabricTransport,
        adc0: bool,
        adc1: bool,
        dac0: bool,
        dac1: bool,
    ) -> Result<()> {
        let mask = u32::from(adc0) * ctrl::channel::ADC0
            + u32::from(adc1) * ctrl::channel::ADC1
            + u32::from(dac0) * ctrl::channel::DAC0
            + u32::from(dac1) * ctrl::channel::DAC1;
        debug!("ctrl {:#06x}: channel mask {mask:#06b}", self.base);
        transport.write_reg(self.base + ctrl::CHANNEL_EN, mask)
    }

    /// Latch the loaded waveforms into the playback path.
    ///
    /// # Errors
    ///
    /// Returns a transport error if the register write fails.
    pub fn arm_dac(&self, transport: &mut dyn FabricTransport) -> Result<()> {
        transport.write_reg(self.base + ctrl::DAC_ARM, 1)
    }

    /// Start one burst.
    ///
    /// # Errors
    ///
    /// Returns a transport error if the register write fails.
    pub fn software_trigger(&self, transport: &mut dyn FabricTransport) -> Result<()> {
        transport.write_reg(self.base + ctrl::SW_TRIGGER, 1)
    }

    /// Put the card into waveform-load mode: the next burst write on the
    /// streaming channel fills `channel`'s playback memory.
    ///
    /// # Errors
    ///
    /// Returns a transport error if the register write fails.
    pub fn prepare_waveform_load(
        &self,
        transport: &mut dyn FabricTransport,
        channel: PlaybackChannel,
    ) -> Result<()> {
        debug!("ctrl {:#06x}: waveform load -> dac{}", self.base, channel.index());
        transport.write_reg(self.base + ctrl::WFM_LOAD, channel.load_target())
    }
}

/// Driver for one card's capture front end (ADC SPI sub-block).
#[derive(Debug, Clone, Copy)]
pub struct AdcFrontEnd {
    spi_base: u32,
}

impl AdcFrontEnd {
    /// Driver for the ADC SPI block at `spi_base`.
    #[must_use]
    pub const fn new(spi_base: u32) -> Self {
        Self { spi_base }
    }

    /// Switch the capture chips between the 14-bit ramp counter and the
    /// real sampled signal.
    ///
    /// # Errors
    ///
    /// Returns a transport error if the register write fails.
    pub fn set_pattern_check(
        &self,
        transport: &mut dyn FabricTransport,
        enabled: bool,
    ) -> Result<()> {
        let value = if enabled {
            adc_spi::PATTERN_RAMP
        } else {
            adc_spi::PATTERN_OFF
        };
        debug!("adc spi {:#06x}: pattern check {enabled}", self.spi_base);
        transport.write_reg(self.spi_base + adc_spi::TEST_PATTERN, value)
    }
}

/// Driver for one card's capture PHY (lane alignment).
#[derive(Debug, Clone, Copy)]
pub struct AdcPhy {
    base: u32,
}

impl AdcPhy {
    /// Driver for the capture PHY at `base`.
    #[must_use]
    pub const fn new(base: u32) -> Self {
        Self { base }
    }

    /// Program the IODELAY taps that center the capture eye.
    ///
    /// The tap counts come from the carrier's calibration profile; they
    /// are applied before any burst streams.
    ///
    /// # Errors
    ///
    /// Returns a transport error if a register write fails.
    pub fn apply_taps(
        &self,
        transport: &mut dyn FabricTransport,
        clock: u8,
        data: u8,
    ) -> Result<()> {
        debug!("adc phy {:#06x}: taps clk {clock}, data {data}", self.base);
        transport.write_reg(self.base + adc_phy::TAP_CLOCK, u32::from(clock))?;
        transport.write_reg(self.base + adc_phy::TAP_DATA, u32::from(data))?;
        Ok(())
    }
}

/// Driver for one card's playback PHY (lane alignment).
#[derive(Debug, Clone, Copy)]
pub struct DacPhy {
    base: u32,
}

impl DacPhy {
    /// Driver for the playback PHY at `base`.
    #[must_use]
    pub const fn new(base: u32) -> Self {
        Self { base }
    }

    /// Program the ODELAY tap on the playback output lanes.
    ///
    /// # Errors
    ///
    /// Returns a transport error if the register write fails.
    pub fn set_output_delay(&self, transport: &mut dyn FabricTransport, tap: u8) -> Result<()> {
        debug!("dac phy {:#06x}: output delay tap {tap}", self.base);
        transport.write_reg(self.base + dac_phy::OUTPUT_DELAY, u32::from(tap))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::LoopbackTransport;
    use daqfab_fabric::regs;

    #[test]
    fn channel_mask_composition() {
        let mut transport = LoopbackTransport::new();
        let control = ConverterControl::new(0x2000 + regs::CTRL);
        control
            .enable_channels(&mut transport, true, false, true, true)
            .unwrap();
        let (_, mask) = *transport.reg_log().last().unwrap();
        assert_eq!(
            mask,
            ctrl::channel::ADC0 | ctrl::channel::DAC0 | ctrl::channel::DAC1
        );
    }

    #[test]
    fn phy_taps_land_in_order() {
        let mut transport = LoopbackTransport::new();
        let phy = AdcPhy::new(0x2000 + regs::ADC_PHY);
        phy.apply_taps(&mut transport, 12, 3).unwrap();
        assert_eq!(
            transport.reg_log(),
            &[
                (0x2000 + regs::ADC_PHY + adc_phy::TAP_CLOCK, 12),
                (0x2000 + regs::ADC_PHY + adc_phy::TAP_DATA, 3),
            ]
        );
    }

    #[test]
    fn pattern_check_toggles() {
        let mut transport = LoopbackTransport::new();
        let adc = AdcFrontEnd::new(0x2000 + regs::ADC_SPI);
        adc.set_pattern_check(&mut transport, true).unwrap();
        assert!(transport.pattern_check(0));
        adc.set_pattern_check(&mut transport, false).unwrap();
        assert!(!transport.pattern_check(0));
    }
}
