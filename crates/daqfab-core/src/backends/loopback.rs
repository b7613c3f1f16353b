// SPDX-License-Identifier: AGPL-3.0-only

//! Loopback (virtual card) transport.
//!
//! Emulates a carrier with one or two converter cards entirely in
//! software, behind the same [`FabricTransport`] trait the char-device
//! backend implements. This enables:
//!
//! 1. **CI without hardware**: the full verify-then-capture cycle runs
//!    against the emulation; every sequencer test passes without a carrier
//!    attached.
//! 2. **Sequencing validation**: the emulation enforces the card's
//!    ordering rules (load doorbell before upload, arm before trigger,
//!    trigger before read), so a sequencer bug surfaces as a protocol
//!    error instead of silently passing.
//! 3. **Fault rehearsal**: transport failures and ramp glitches can be
//!    injected at precise points to exercise the abort paths.
//!
//! The emulated card mirrors the real data path: with pattern check
//! enabled a capture read returns the 14-bit ramp counter; with it
//! disabled the read loops back the matching playback memory (capture
//! channel N observes playback channel N), mid-scale where nothing is
//! loaded.

use std::collections::BTreeMap;
use std::time::Duration;

use daqfab_fabric::regs::{self, adc_spi, ctrl, RAMP_MASK, RAMP_SHIFT};
use tracing::{debug, trace};

use crate::error::{DaqError, Result};
use crate::session::FabricTopology;
use crate::transport::{FabricTransport, DEFAULT_TIMEOUT_MS};

/// Size of one card's register window.
const CARD_WINDOW: u32 = 0x800;

/// Little-endian mid-scale sample, the idle level of an unloaded memory.
const MID_SCALE: [u8; 2] = 0x8000u16.to_le_bytes();

#[derive(Debug, Clone, Default)]
struct CardModel {
    pattern_check: bool,
    channel_mask: u32,
    armed: bool,
    triggered: bool,
    wfm_target: Option<u32>,
    dac_memory: [Vec<u8>; 2],
}

/// Software emulation of a carrier, implementing [`FabricTransport`].
#[derive(Debug)]
pub struct LoopbackTransport {
    topology: FabricTopology,
    cards: Vec<CardModel>,
    regs: BTreeMap<u32, u32>,
    reg_log: Vec<(u32, u32)>,
    playback_selector: u64,
    capture_selector: u64,
    ramp_seed: u16,
    burst_reads: u32,
    burst_writes: u32,
    read_attempts: u32,
    write_attempts: u32,
    fail_read_burst_at: Option<u32>,
    fail_write_burst_at: Option<u32>,
    fail_write_reg_addr: Option<u32>,
    glitch_next_ramp_at: Option<usize>,
}

impl Default for LoopbackTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl LoopbackTransport {
    /// Emulate the standard fabric layout.
    #[must_use]
    pub fn new() -> Self {
        Self::with_topology(FabricTopology::standard())
    }

    /// Emulate a specific fabric layout.
    #[must_use]
    pub fn with_topology(topology: FabricTopology) -> Self {
        let cards = vec![CardModel::default(); topology.card_bases.len()];
        Self {
            topology,
            cards,
            regs: BTreeMap::new(),
            reg_log: Vec::new(),
            playback_selector: daqfab_fabric::routing::IDLE,
            capture_selector: daqfab_fabric::routing::IDLE,
            ramp_seed: 0x0100,
            burst_reads: 0,
            burst_writes: 0,
            read_attempts: 0,
            write_attempts: 0,
            fail_read_burst_at: None,
            fail_write_burst_at: None,
            fail_write_reg_addr: None,
            glitch_next_ramp_at: None,
        }
    }

    /// Fail the `n`th burst read (1-based) with a transport error.
    #[must_use]
    pub fn fail_read_burst_at(mut self, n: u32) -> Self {
        self.fail_read_burst_at = Some(n);
        self
    }

    /// Fail the `n`th burst write (1-based) with a transport error.
    #[must_use]
    pub fn fail_write_burst_at(mut self, n: u32) -> Self {
        self.fail_write_burst_at = Some(n);
        self
    }

    /// Fail any register write to `addr` with a transport error.
    #[must_use]
    pub fn fail_write_reg(mut self, addr: u32) -> Self {
        self.fail_write_reg_addr = Some(addr);
        self
    }

    /// Glitch the ramp counter at sample `index` of the next patterned
    /// read: the counter jumps and keeps counting from the wrong value,
    /// the way real burst corruption presents.
    #[must_use]
    pub fn glitch_next_ramp_at(mut self, index: usize) -> Self {
        self.glitch_next_ramp_at = Some(index);
        self
    }

    /// Number of burst reads served so far.
    #[must_use]
    pub fn burst_reads(&self) -> u32 {
        self.burst_reads
    }

    /// Number of burst writes accepted so far.
    #[must_use]
    pub fn burst_writes(&self) -> u32 {
        self.burst_writes
    }

    /// Chronological register write log.
    #[must_use]
    pub fn reg_log(&self) -> &[(u32, u32)] {
        &self.reg_log
    }

    /// Pattern-check state of one card.
    #[must_use]
    pub fn pattern_check(&self, card: usize) -> bool {
        self.cards[card].pattern_check
    }

    /// Playback memory contents of one channel.
    #[must_use]
    pub fn dac_memory(&self, card: usize, channel: usize) -> &[u8] {
        &self.cards[card].dac_memory[channel]
    }

    fn decode_card(&self, addr: u32) -> Option<(usize, u32)> {
        self.topology
            .card_bases
            .iter()
            .position(|&base| addr >= base && addr < base + CARD_WINDOW)
            .map(|i| (i, addr - self.topology.card_bases[i]))
    }

    fn apply_card_write(&mut self, card: usize, offset: u32, value: u32) -> Result<()> {
        let model = &mut self.cards[card];
        match offset {
            o if o == regs::CTRL + ctrl::BURST_SIZE => {}
            o if o == regs::CTRL + ctrl::BURST_ENABLE => {}
            o if o == regs::CTRL + ctrl::CHANNEL_EN => model.channel_mask = value,
            o if o == regs::CTRL + ctrl::DAC_ARM => model.armed = true,
            o if o == regs::CTRL + ctrl::SW_TRIGGER => {
                if !model.armed {
                    return Err(DaqError::protocol(format!(
                        "card {card}: software trigger before DAC arm"
                    )));
                }
                model.triggered = true;
            }
            o if o == regs::CTRL + ctrl::WFM_LOAD => {
                if value > 1 {
                    return Err(DaqError::protocol(format!(
                        "card {card}: waveform-load target {value} out of range"
                    )));
                }
                model.wfm_target = Some(value);
            }
            o if o == regs::ADC_SPI + adc_spi::TEST_PATTERN => {
                model.pattern_check = value == adc_spi::PATTERN_RAMP;
            }
            _ => trace!("card {card}: unmodeled register {offset:#05x} <- {value:#x}"),
        }
        Ok(())
    }

    /// Selector decode: the single unmasked byte picks card and channel.
    fn playback_sink(&self) -> Result<(usize, usize)> {
        let bytes = self.playback_selector.to_le_bytes();
        let port = bytes
            .iter()
            .position(|&b| b != 0xFF)
            .ok_or_else(|| DaqError::transport("no playback sink routed"))?;
        if port >= self.cards.len() * 2 {
            return Err(DaqError::transport(format!(
                "playback sink port {port} beyond carrier"
            )));
        }
        Ok((port / 2, port % 2))
    }

    fn capture_source(&self) -> Result<(usize, usize)> {
        let port = (self.capture_selector & 0xFF) as usize;
        if port == 0xFF {
            return Err(DaqError::transport("capture router fully masked"));
        }
        if port >= self.cards.len() * 2 {
            return Err(DaqError::transport(format!(
                "capture source port {port} beyond carrier"
            )));
        }
        Ok((port / 2, port % 2))
    }

    fn fill_ramp(&mut self, buffer: &mut [u8]) {
        let glitch = self.glitch_next_ramp_at.take();
        let seed = self.ramp_seed;
        for (j, pair) in buffer.chunks_exact_mut(2).enumerate() {
            #[allow(clippy::cast_possible_truncation)]
            let mut counter = seed.wrapping_add(j as u16);
            if let Some(k) = glitch {
                if j >= k {
                    counter = counter.wrapping_add(0x1000);
                }
            }
            let sample = (counter & RAMP_MASK) << RAMP_SHIFT;
            pair.copy_from_slice(&sample.to_le_bytes());
        }
        #[allow(clippy::cast_possible_truncation)]
        let advance = (buffer.len() / 2) as u16;
        self.ramp_seed = self.ramp_seed.wrapping_add(advance) & RAMP_MASK;
    }
}

impl FabricTransport for LoopbackTransport {
    fn write_burst(&mut self, data: &[u8]) -> Result<()> {
        self.write_attempts += 1;
        if self.fail_write_burst_at == Some(self.write_attempts) {
            return Err(DaqError::transport("injected burst-write fault"));
        }
        let (card, channel) = self.playback_sink()?;
        if self.cards[card].wfm_target != Some(channel as u32) {
            return Err(DaqError::protocol(format!(
                "card {card}: burst write without waveform-load doorbell for channel {channel}"
            )));
        }
        debug!("loopback: {} bytes into card {card} dac{channel}", data.len());
        self.cards[card].dac_memory[channel] = data.to_vec();
        self.cards[card].wfm_target = None;
        self.burst_writes += 1;
        Ok(())
    }

    fn read_burst(&mut self, buffer: &mut [u8]) -> Result<()> {
        self.read_attempts += 1;
        if self.fail_read_burst_at == Some(self.read_attempts) {
            return Err(DaqError::transport("injected burst-read fault"));
        }
        let (card, adc) = self.capture_source()?;
        let adc_bit = ctrl::channel::ADC0 << adc;
        if self.cards[card].channel_mask & adc_bit == 0 {
            return Err(DaqError::protocol(format!(
                "card {card}: capture read with adc{adc} disabled"
            )));
        }
        if !self.cards[card].triggered {
            return Err(DaqError::protocol(format!(
                "card {card}: capture read without software trigger"
            )));
        }

        if self.cards[card].pattern_check {
            self.fill_ramp(buffer);
        } else {
            let source = &self.cards[card].dac_memory[adc];
            for (i, byte) in buffer.iter_mut().enumerate() {
                *byte = source.get(i).copied().unwrap_or(MID_SCALE[i % 2]);
            }
        }

        // One burst per trigger.
        let model = &mut self.cards[card];
        model.triggered = false;
        model.armed = false;
        self.burst_reads += 1;
        Ok(())
    }

    fn write_reg(&mut self, addr: u32, value: u32) -> Result<()> {
        if self.fail_write_reg_addr == Some(addr) {
            return Err(DaqError::transport(format!(
                "injected register fault at {addr:#06x}"
            )));
        }
        self.reg_log.push((addr, value));
        self.regs.insert(addr, value);

        let pb = self.topology.playback_router_base;
        let cap = self.topology.capture_router_base;
        if addr == pb {
            self.playback_selector =
                (self.playback_selector & !0xFFFF_FFFF) | u64::from(value);
        } else if addr == pb + 1 {
            self.playback_selector =
                (self.playback_selector & 0xFFFF_FFFF) | (u64::from(value) << 32);
        } else if addr == cap {
            self.capture_selector = (self.capture_selector & !0xFFFF_FFFF) | u64::from(value);
        } else if addr == cap + 1 {
            self.capture_selector =
                (self.capture_selector & 0xFFFF_FFFF) | (u64::from(value) << 32);
        } else if let Some((card, offset)) = self.decode_card(addr) {
            self.apply_card_write(card, offset, value)?;
        } else {
            trace!("loopback: unmodeled fabric register {addr:#06x} <- {value:#x}");
        }
        Ok(())
    }

    fn read_reg(&mut self, addr: u32) -> Result<u32> {
        Ok(self.regs.get(&addr).copied().unwrap_or(0))
    }

    fn timeout(&self) -> Duration {
        Duration::from_millis(DEFAULT_TIMEOUT_MS)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pattern::verify_ramp;
    use crate::waveform::SampleBuffer;
    use daqfab_fabric::routing;

    #[allow(clippy::cast_possible_truncation)]
    fn route64(t: &mut LoopbackTransport, base: u32, word: u64) {
        t.write_reg(base, word as u32).unwrap();
        t.write_reg(base + 1, (word >> 32) as u32).unwrap();
    }

    fn arm_and_trigger(t: &mut LoopbackTransport, base: u32, mask: u32) {
        t.write_reg(base + regs::CTRL + ctrl::CHANNEL_EN, mask).unwrap();
        t.write_reg(base + regs::CTRL + ctrl::DAC_ARM, 1).unwrap();
        t.write_reg(base + regs::CTRL + ctrl::SW_TRIGGER, 1).unwrap();
    }

    #[test]
    fn patterned_read_serves_a_clean_ramp() {
        let mut t = LoopbackTransport::new();
        let base = 0x2000;
        t.write_reg(base + regs::ADC_SPI + adc_spi::TEST_PATTERN, adc_spi::PATTERN_RAMP)
            .unwrap();
        route64(&mut t, 0x0200, routing::capture_source(0, 0));
        arm_and_trigger(&mut t, base, ctrl::channel::ADC0);

        let mut raw = vec![0u8; 2048];
        t.read_burst(&mut raw).unwrap();
        let burst = SampleBuffer::from_le_bytes(&raw).unwrap();
        assert!(verify_ramp(burst.as_slice()).ok);
    }

    #[test]
    fn glitched_ramp_fails_verification() {
        let mut t = LoopbackTransport::new().glitch_next_ramp_at(100);
        let base = 0x2000;
        t.write_reg(base + regs::ADC_SPI + adc_spi::TEST_PATTERN, adc_spi::PATTERN_RAMP)
            .unwrap();
        route64(&mut t, 0x0200, routing::capture_source(0, 0));
        arm_and_trigger(&mut t, base, ctrl::channel::ADC0);

        let mut raw = vec![0u8; 1024];
        t.read_burst(&mut raw).unwrap();
        let burst = SampleBuffer::from_le_bytes(&raw).unwrap();
        let report = verify_ramp(burst.as_slice());
        assert_eq!(report.mismatches, 512 - 100);
    }

    #[test]
    fn upload_requires_load_doorbell() {
        let mut t = LoopbackTransport::new();
        route64(&mut t, 0x0100, routing::playback_sink(0, 0));
        let err = t.write_burst(&[0u8; 16]).unwrap_err();
        assert!(matches!(err, DaqError::Protocol { .. }));
    }

    #[test]
    fn capture_loops_back_playback_memory() {
        let mut t = LoopbackTransport::new();
        let base = 0x2000;

        route64(&mut t, 0x0100, routing::playback_sink(0, 1));
        t.write_reg(base + regs::CTRL + ctrl::WFM_LOAD, ctrl::wfm_target::DAC1)
            .unwrap();
        let payload: Vec<u8> = (0..64u8).collect();
        t.write_burst(&payload).unwrap();
        assert_eq!(t.dac_memory(0, 1), payload.as_slice());

        route64(&mut t, 0x0200, routing::capture_source(0, 1));
        arm_and_trigger(&mut t, base, ctrl::channel::ADC1 | ctrl::channel::DAC1);
        let mut raw = vec![0u8; 64];
        t.read_burst(&mut raw).unwrap();
        assert_eq!(raw, payload);
    }

    #[test]
    fn trigger_without_arm_is_a_protocol_error() {
        let mut t = LoopbackTransport::new();
        let err = t
            .write_reg(0x2000 + regs::CTRL + ctrl::SW_TRIGGER, 1)
            .unwrap_err();
        assert!(matches!(err, DaqError::Protocol { .. }));
    }
}
