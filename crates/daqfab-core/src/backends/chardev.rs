//! Character-device transport.
//!
//! Talks to a carrier exposed as a device file (`/dev/daqfab0` style).
//! Burst transfers are plain reads/writes on the streaming side of the
//! device; register access goes through an 8-byte doorbell message on the
//! same descriptor (`[addr: u32 LE][value: u32 LE]`, a read posts the
//! address with the read flag set and fetches a 4-byte reply).
//!
//! The descriptor is opened nonblocking; every operation polls against a
//! fixed deadline so a wedged DMA engine surfaces as a timeout instead of
//! hanging the session.

use std::fs::{File, OpenOptions};
use std::os::unix::fs::OpenOptionsExt;
use std::os::unix::io::AsFd;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use rustix::fs::OFlags;
use rustix::io::{read, write, Errno};
use tracing::{debug, info};

use crate::error::{DaqError, Result};
use crate::transport::{FabricTransport, DEFAULT_TIMEOUT_MS};

/// Register doorbell flag marking a read request.
const DOORBELL_READ: u32 = 1 << 31;

/// Transport over a device file.
#[derive(Debug)]
pub struct CharDeviceTransport {
    path: PathBuf,
    file: File,
    timeout: Duration,
}

impl CharDeviceTransport {
    /// Open a device file with the default timeout.
    ///
    /// # Errors
    ///
    /// Returns a transport error if the device cannot be opened.
    pub fn open(path: &Path) -> Result<Self> {
        Self::open_with_timeout(path, Duration::from_millis(DEFAULT_TIMEOUT_MS))
    }

    /// Open a device file with an explicit burst timeout.
    ///
    /// # Errors
    ///
    /// Returns a transport error if the device cannot be opened.
    pub fn open_with_timeout(path: &Path, timeout: Duration) -> Result<Self> {
        #[allow(clippy::cast_possible_wrap)]
        let nonblock_flag = OFlags::NONBLOCK.bits() as i32;

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .custom_flags(nonblock_flag)
            .open(path)
            .map_err(|e| DaqError::transport(format!("cannot open {}: {e}", path.display())))?;

        info!("opened device {} (timeout {timeout:?})", path.display());
        Ok(Self {
            path: path.to_path_buf(),
            file,
            timeout,
        })
    }

    /// Device path this transport talks to.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn deadline(&self) -> Instant {
        Instant::now() + self.timeout
    }

    fn timeout_error(&self) -> DaqError {
        DaqError::Timeout {
            duration_ms: u64::try_from(self.timeout.as_millis()).unwrap_or(u64::MAX),
        }
    }

    fn write_all(&self, mut data: &[u8]) -> Result<()> {
        let deadline = self.deadline();
        while !data.is_empty() {
            match write(self.file.as_fd(), data) {
                Ok(0) => {
                    return Err(DaqError::transport(format!(
                        "device {} closed mid-write",
                        self.path.display()
                    )))
                }
                Ok(n) => data = &data[n..],
                Err(e) if e == Errno::AGAIN || e == Errno::INTR => {
                    if Instant::now() >= deadline {
                        return Err(self.timeout_error());
                    }
                    std::thread::sleep(Duration::from_millis(1));
                }
                Err(e) => {
                    return Err(DaqError::transport(format!(
                        "write to {} failed: {e}",
                        self.path.display()
                    )))
                }
            }
        }
        Ok(())
    }

    fn read_all(&self, mut buffer: &mut [u8]) -> Result<()> {
        let deadline = self.deadline();
        while !buffer.is_empty() {
            match read(self.file.as_fd(), buffer) {
                Ok(0) => {
                    return Err(DaqError::transport(format!(
                        "device {} closed mid-read",
                        self.path.display()
                    )))
                }
                Ok(n) => buffer = &mut buffer[n..],
                Err(e) if e == Errno::AGAIN || e == Errno::INTR => {
                    if Instant::now() >= deadline {
                        return Err(self.timeout_error());
                    }
                    std::thread::sleep(Duration::from_millis(1));
                }
                Err(e) => {
                    return Err(DaqError::transport(format!(
                        "read from {} failed: {e}",
                        self.path.display()
                    )))
                }
            }
        }
        Ok(())
    }

    fn doorbell(addr: u32, value: u32) -> [u8; 8] {
        let mut msg = [0u8; 8];
        msg[..4].copy_from_slice(&addr.to_le_bytes());
        msg[4..].copy_from_slice(&value.to_le_bytes());
        msg
    }
}

impl FabricTransport for CharDeviceTransport {
    fn write_burst(&mut self, data: &[u8]) -> Result<()> {
        debug!("burst write: {} bytes", data.len());
        self.write_all(data)
    }

    fn read_burst(&mut self, buffer: &mut [u8]) -> Result<()> {
        debug!("burst read: {} bytes", buffer.len());
        self.read_all(buffer)
    }

    fn write_reg(&mut self, addr: u32, value: u32) -> Result<()> {
        self.write_all(&Self::doorbell(addr, value))
    }

    fn read_reg(&mut self, addr: u32) -> Result<u32> {
        self.write_all(&Self::doorbell(addr | DOORBELL_READ, 0))?;
        let mut reply = [0u8; 4];
        self.read_all(&mut reply)?;
        Ok(u32::from_le_bytes(reply))
    }

    fn timeout(&self) -> Duration {
        self.timeout
    }
}

impl Drop for CharDeviceTransport {
    fn drop(&mut self) {
        info!("closing device {}", self.path.display());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_device_is_a_transport_error() {
        let err = CharDeviceTransport::open(Path::new("/dev/daqfab-does-not-exist")).unwrap_err();
        assert!(matches!(err, DaqError::Transport { .. }));
    }

    #[test]
    fn doorbell_layout() {
        let msg = CharDeviceTransport::doorbell(0x2000, 0x0000_0001);
        assert_eq!(&msg[..4], &0x2000u32.to_le_bytes());
        assert_eq!(&msg[4..], &1u32.to_le_bytes());
    }
}
