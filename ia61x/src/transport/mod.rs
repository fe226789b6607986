//! # Transport Abstractions
//!
//! The IA61x boot loader auto-detects which host interface it is talking to.
//! The protocol engine is written once against the [`Transport`] trait and
//! the three physical links implement it:
//!
//! - [`Stream`]: UART byte stream over `embedded_io`
//! - [`Addressed`]: I2C packets to a fixed 7-bit address over `embedded_hal`
//! - [`Framed`]: SPI full-duplex frames over `embedded_hal::spi::SpiDevice`
//!
//! ## Design Rationale
//!
//! Everything that differs between the links in protocol terms (sync marker
//! width, settle delays, whether a mismatched echo is retried, byte order of
//! read-back blocks) is a property of [`TransportKind`], so the engines stay
//! transport-agnostic and can be driven by a scripted fake in tests.

mod addressed;
mod framed;
mod stream;

pub use addressed::{Addressed, DEFAULT_ADDRESS, DEFAULT_RETRY_LIMIT};
pub use framed::{swap_words, Framed};
pub use stream::{BaudRate, Stream};

use crate::error::Result;

/// The physical link used to reach the device
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum TransportKind {
    /// UART byte stream
    Stream,
    /// I2C addressed packets
    Addressed,
    /// SPI framed transfers
    Framed,
}

impl TransportKind {
    /// Sync marker bytes sent and expected during auto-detect
    pub const fn sync_marker(&self) -> &'static [u8] {
        match self {
            TransportKind::Framed => &[0xB7, 0xB7, 0xB7, 0xB7],
            TransportKind::Stream | TransportKind::Addressed => &[0xB7],
        }
    }

    /// Whether a single mismatched echo ends a command exchange
    pub const fn mismatch_aborts(&self) -> bool {
        matches!(self, TransportKind::Stream)
    }

    /// Whether read-back blocks arrive with each 32-bit word byte-reversed
    pub const fn swaps_read_words(&self) -> bool {
        matches!(self, TransportKind::Framed)
    }

    /// Whether a spurious interrupt can stall the route and needs a re-arm
    pub const fn rearms_on_spurious_event(&self) -> bool {
        !matches!(self, TransportKind::Stream)
    }

    /// Whether the boot loader reports a status byte after an image upload
    pub const fn reports_image_status(&self) -> bool {
        matches!(self, TransportKind::Stream)
    }
}

/// Raw byte movement between host and device
///
/// Implementations block until the whole buffer was moved or the link gave
/// up. A link that can tell a timeout apart from other failures reports it
/// as [`Error::Timeout`](crate::Error::Timeout).
pub trait Transport {
    /// Which physical link this is
    fn kind(&self) -> TransportKind;

    /// Write all of `data` to the device
    fn put(&mut self, data: &[u8]) -> Result<()>;

    /// Fill `buf` with bytes from the device
    fn get(&mut self, buf: &mut [u8]) -> Result<()>;

    /// Write one download block made of several parts
    ///
    /// Links with chip-select framing keep the select asserted across all
    /// parts. The default writes each part with [`put`](Transport::put).
    fn put_block(&mut self, parts: &[&[u8]]) -> Result<()> {
        for part in parts {
            self.put(part)?;
        }
        Ok(())
    }

    /// Reconfigure the host side of the link to a new baud rate
    ///
    /// Only meaningful on the UART link; other links accept and ignore it.
    fn set_baud_rate(&mut self, _baud: u32) -> Result<()> {
        Ok(())
    }
}

impl<T: Transport + ?Sized> Transport for &mut T {
    fn kind(&self) -> TransportKind {
        (**self).kind()
    }

    fn put(&mut self, data: &[u8]) -> Result<()> {
        (**self).put(data)
    }

    fn get(&mut self, buf: &mut [u8]) -> Result<()> {
        (**self).get(buf)
    }

    fn put_block(&mut self, parts: &[&[u8]]) -> Result<()> {
        (**self).put_block(parts)
    }

    fn set_baud_rate(&mut self, baud: u32) -> Result<()> {
        (**self).set_baud_rate(baud)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sync_marker_width() {
        assert_eq!(TransportKind::Stream.sync_marker(), &[0xB7]);
        assert_eq!(TransportKind::Addressed.sync_marker(), &[0xB7]);
        assert_eq!(TransportKind::Framed.sync_marker().len(), 4);
    }

    #[test]
    fn test_policy_split() {
        assert!(TransportKind::Stream.mismatch_aborts());
        assert!(!TransportKind::Addressed.mismatch_aborts());
        assert!(TransportKind::Framed.swaps_read_words());
        assert!(!TransportKind::Addressed.swaps_read_words());
        assert!(!TransportKind::Stream.rearms_on_spurious_event());
        assert!(TransportKind::Framed.rearms_on_spurious_event());
    }
}
