//! Transport abstraction over the peripheral fabric.
//!
//! Everything the engine does reaches the hardware through this trait:
//! single register reads/writes and burst transfers on the streaming DMA
//! channel. All operations block the calling thread until completion or a
//! transport-level timeout; there is no cancellation mid-burst — once a
//! transfer is issued the only outcomes are success or a timeout reported
//! as a failure.

use std::fmt::Debug;
use std::time::Duration;

use crate::error::Result;

/// Default bounded timeout for DMA transfers.
pub const DEFAULT_TIMEOUT_MS: u64 = 2000;

/// Blocking register and DMA access to one device.
pub trait FabricTransport: Debug {
    /// Write one burst of bytes to the streaming channel.
    ///
    /// A short write is a transport error — the control interface has no
    /// mechanism to resume a truncated burst.
    ///
    /// # Errors
    ///
    /// Returns a transport error or timeout if the transfer fails.
    fn write_burst(&mut self, data: &[u8]) -> Result<()>;

    /// Read one burst of bytes from the streaming channel, filling
    /// `buffer` completely.
    ///
    /// # Errors
    ///
    /// Returns a transport error or timeout if the transfer fails.
    fn read_burst(&mut self, buffer: &mut [u8]) -> Result<()>;

    /// Write a single fabric register.
    ///
    /// # Errors
    ///
    /// Returns a transport error if the write fails.
    fn write_reg(&mut self, addr: u32, value: u32) -> Result<()>;

    /// Read a single fabric register.
    ///
    /// # Errors
    ///
    /// Returns a transport error if the read fails.
    fn read_reg(&mut self, addr: u32) -> Result<u32>;

    /// The bounded timeout applied to burst transfers.
    fn timeout(&self) -> Duration;
}
