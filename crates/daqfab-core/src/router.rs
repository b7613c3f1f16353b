//! Crossbar programming.

use tracing::debug;

use crate::error::Result;
use crate::transport::FabricTransport;

/// Driver for one crossbar router.
///
/// The selector word is 64 bits wide; the fabric exposes it as two 32-bit
/// registers at the router base (low word first).
#[derive(Debug, Clone, Copy)]
pub struct CrossbarRouter {
    base: u32,
}

impl CrossbarRouter {
    /// Driver for the router at `base`.
    #[must_use]
    pub const fn new(base: u32) -> Self {
        Self { base }
    }

    /// Program the selector word.
    ///
    /// # Errors
    ///
    /// Returns a transport error if either register write fails.
    #[allow(clippy::cast_possible_truncation)]
    pub fn configure(&self, transport: &mut dyn FabricTransport, selector: u64) -> Result<()> {
        debug!("router {:#06x}: selector {selector:#018x}", self.base);
        transport.write_reg(self.base, selector as u32)?;
        transport.write_reg(self.base + 1, (selector >> 32) as u32)?;
        Ok(())
    }
}
