//! SPI link over `embedded_hal::spi::SpiDevice`.

use embedded_hal::spi::{Operation, SpiDevice};

use super::{Transport, TransportKind};
use crate::error::{Error, Result};

/// Full-duplex framed transport on an SPI bus
///
/// Every `put`/`get` is one chip-select assertion. A download block is
/// sent as a single transaction so the select stays low for all 512 bytes.
pub struct Framed<S> {
    spi: S,
}

impl<S: SpiDevice> Framed<S> {
    /// Wrap an SPI device (bus plus chip select)
    pub fn new(spi: S) -> Self {
        Self { spi }
    }

    /// Give back the device
    pub fn release(self) -> S {
        self.spi
    }
}

fn map_err<E: embedded_hal::spi::Error>(e: E) -> Error {
    log::debug!("spi error: {:?}", e.kind());
    Error::Bus
}

impl<S: SpiDevice> Transport for Framed<S> {
    fn kind(&self) -> TransportKind {
        TransportKind::Framed
    }

    fn put(&mut self, data: &[u8]) -> Result<()> {
        self.spi.write(data).map_err(map_err)
    }

    fn get(&mut self, buf: &mut [u8]) -> Result<()> {
        self.spi.read(buf).map_err(map_err)
    }

    fn put_block(&mut self, parts: &[&[u8]]) -> Result<()> {
        // header, sequence, payload, padding
        let mut ops: heapless::Vec<Operation<'_, u8>, 4> = heapless::Vec::new();
        for &part in parts.iter().filter(|p| !p.is_empty()) {
            if ops.push(Operation::Write(part)).is_err() {
                // more parts than one transaction holds, fall back to one per part
                return parts.iter().try_for_each(|p| self.put(p));
            }
        }
        self.spi.transaction(&mut ops).map_err(map_err)
    }
}

/// Reverse the byte order of every complete 32-bit word in `buf`
///
/// Trailing bytes that do not fill a word are left untouched. Applying the
/// swap twice restores the original buffer.
pub fn swap_words(buf: &mut [u8]) {
    for word in buf.chunks_exact_mut(4) {
        word.reverse();
    }
}
