//! Transport backends.
//!
//! `chardev` talks to a real device file; `loopback` emulates one or two
//! converter cards in software so the whole engine runs (and is tested)
//! without hardware.

pub mod chardev;
pub mod loopback;

pub use chardev::CharDeviceTransport;
pub use loopback::LoopbackTransport;
