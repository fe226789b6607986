//! # Error Taxonomy
//!
//! Every engine in this crate reports failures through [`Error`]. The
//! application-facing capability set still speaks in integer status codes
//! (0 = success, negative = failure), so each variant maps to a fixed code
//! through [`Error::code`].

use thiserror::Error;

/// Errors reported by the IA61x protocol engine
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Error {
    /// The transport gave up waiting for bytes from the device
    #[error("transport timed out")]
    Timeout,
    /// The echoed command word differs from the one that was sent
    #[error("command 0x{expected:04x} echoed as 0x{received:04x}")]
    Mismatch {
        /// Command word written to the device
        expected: u16,
        /// First word of the last response frame
        received: u16,
    },
    /// The device rejected a request or returned an unexpected status
    #[error("command failed")]
    Failed,
    /// Auto-detect handshake or baud renegotiation did not complete
    #[error("boot handshake failed")]
    BootFailed,
    /// The underlying bus reported a write or read error
    #[error("bus error")]
    Bus,
    /// A block read overflowed with a remainder that is not word aligned
    #[error("device reported {reported} bytes for a {capacity} byte buffer, remainder not word aligned")]
    ReadInconsistent {
        /// Length announced by the device
        reported: u16,
        /// Caller buffer capacity
        capacity: usize,
    },
    /// A keyword model is too short or not made of whole 16-bit words
    #[error("invalid keyword model blob")]
    InvalidModel,
    /// Firmware answered SYNC with something other than the normal response
    #[error("firmware not running, sync answered 0x{response:04x}")]
    FirmwareNotRunning {
        /// Response word of the SYNC command
        response: u16,
    },
    /// One or more voice-wake configuration steps failed
    #[error("voice wake setup failed in {errors} step(s)")]
    WakeFailed {
        /// Number of failed steps in the last attempt
        errors: u32,
    },
    /// The device handle has not completed a boot
    #[error("device not booted")]
    NotReady,
}

/// Result type alias for device operations
pub type Result<T> = core::result::Result<T, Error>;

/// Status code for a successful operation
pub const STATUS_SUCCESS: i32 = 0;

impl Error {
    /// Integer status code used by the capability table
    pub const fn code(&self) -> i32 {
        match self {
            Error::Timeout => -1,
            Error::Mismatch { .. } | Error::Failed => -2,
            Error::BootFailed => -3,
            Error::Bus => -4,
            Error::ReadInconsistent { .. } => -5,
            Error::InvalidModel => -6,
            Error::FirmwareNotRunning { .. } => -7,
            Error::WakeFailed { .. } => -8,
            Error::NotReady => -9,
        }
    }
}

/// Collapse an operation result into its integer status code
pub fn status<T>(result: &Result<T>) -> i32 {
    match result {
        Ok(_) => STATUS_SUCCESS,
        Err(e) => e.code(),
    }
}
