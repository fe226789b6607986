//! UART link over `embedded_io`.

use embedded_io::{ErrorKind, ErrorType, Read, ReadExactError, Write};

use super::{Transport, TransportKind};
use crate::error::{Error, Result};

/// Host side baud rate control for a UART peripheral
pub trait BaudRate: ErrorType {
    /// Reprogram the peripheral clock divider for `baud`
    fn set_baud_rate(&mut self, baud: u32) -> core::result::Result<(), Self::Error>;
}

/// Byte-stream transport on a UART
///
/// The peripheral's read must give up after its own receive timeout and
/// report it as [`ErrorKind::TimedOut`]; the boot sequencer and the event
/// monitor both drain the line until that happens.
pub struct Stream<U> {
    uart: U,
}

impl<U> Stream<U>
where
    U: Read + Write + BaudRate,
{
    /// Wrap a UART peripheral
    pub fn new(uart: U) -> Self {
        Self { uart }
    }

    /// Give back the peripheral
    pub fn release(self) -> U {
        self.uart
    }
}

fn map_err<E: embedded_io::Error>(e: E) -> Error {
    match e.kind() {
        ErrorKind::TimedOut => Error::Timeout,
        kind => {
            log::debug!("uart error: {:?}", kind);
            Error::Bus
        }
    }
}

impl<U> Transport for Stream<U>
where
    U: Read + Write + BaudRate,
{
    fn kind(&self) -> TransportKind {
        TransportKind::Stream
    }

    fn put(&mut self, data: &[u8]) -> Result<()> {
        self.uart.write_all(data).map_err(map_err)?;
        self.uart.flush().map_err(map_err)
    }

    fn get(&mut self, buf: &mut [u8]) -> Result<()> {
        self.uart.read_exact(buf).map_err(|e| match e {
            ReadExactError::UnexpectedEof => Error::Timeout,
            ReadExactError::Other(e) => map_err(e),
        })
    }

    fn set_baud_rate(&mut self, baud: u32) -> Result<()> {
        log::debug!("uart baud -> {}", baud);
        BaudRate::set_baud_rate(&mut self.uart, baud).map_err(map_err)
    }
}
