//! # Block Download (WDB)
//!
//! Keyword models are streamed to the device in fixed 512-byte blocks after
//! a single announcement of the total size.
//!
//! ```text
//! model:  [reserved:2][model id:2][payload ............................]
//!
//! block:  [reserved:2][slot | idx << 8 :2][payload ≤508][zero pad]
//!          idx = 0, 1, ... , 0xFF on the last block
//! ```
//!
//! Every completed download advances the handle's download counter, which
//! moves the slot id of the next model by 16.

use embedded_hal::delay::DelayNs;

use crate::command::Engine;
use crate::error::{Error, Result};
use crate::frame::{block_count, cmd, sequence_header, WDB_SIZE_NO_HEADER};
use crate::transport::Transport;

/// Pause between two download blocks, in microseconds
const BLOCK_PACING_US: u32 = 100;

/// Time the device needs to acknowledge the last block, in milliseconds
const TRAILER_SETTLE_MS: u32 = 5;

const HEADER_LEN: usize = 4;

/// A validated keyword model blob
///
/// Bytes are in device order: the reserved word, the little-endian model id,
/// then the payload.
#[derive(Debug, Clone, Copy)]
pub struct ModelBlob<'a> {
    bytes: &'a [u8],
}

impl<'a> ModelBlob<'a> {
    /// Check that `bytes` holds a header and whole 16-bit words
    ///
    /// The WDB announce carries the size in one word, so a model can be at
    /// most `u16::MAX` bytes long.
    pub fn new(bytes: &'a [u8]) -> Result<Self> {
        let len = bytes.len();
        if len < HEADER_LEN || len % 2 != 0 || len > usize::from(u16::MAX) {
            return Err(Error::InvalidModel);
        }
        Ok(Self { bytes })
    }

    /// Model identifier carried in the second word
    pub fn model_id(&self) -> u16 {
        u16::from_le_bytes([self.bytes[2], self.bytes[3]])
    }

    /// Reserved first word, copied verbatim into every block
    pub fn reserved(&self) -> &'a [u8] {
        &self.bytes[..2]
    }

    /// Model data after the header
    pub fn payload(&self) -> &'a [u8] {
        &self.bytes[HEADER_LEN..]
    }

    /// Number of 512-byte blocks this model needs
    pub fn block_count(&self) -> usize {
        block_count(self.payload().len())
    }

    /// Total size in bytes
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    /// True for a header-only model
    pub fn is_empty(&self) -> bool {
        self.payload().is_empty()
    }
}

/// Download bookkeeping owned by the device handle
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct DownloadState {
    /// Completed model downloads since the last boot
    pub counter: u8,
    /// The voice-ID reference model has been downloaded
    pub reference_seen: bool,
}

impl DownloadState {
    /// Forget all downloads, as after a boot
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

impl<T: Transport, D: DelayNs> Engine<T, D> {
    /// Download one keyword model; returns the device's status byte
    pub fn download_block(&mut self, model: ModelBlob<'_>, state: &mut DownloadState) -> Result<u8> {
        let reference = self.config.voice_id_enrollment && state.counter == 1 && !state.reference_seen;
        let slot = if reference {
            model.model_id()
        } else {
            model
                .model_id()
                .wrapping_add(u16::from(state.counter) << 4)
        };
        let count = model.block_count();
        log::debug!(
            "wdb: model {:04x} slot {:04x}, {} bytes in {} block(s)",
            model.model_id(),
            slot,
            model.len(),
            count
        );

        // ModelBlob::new caps the length at u16::MAX
        let size = model.len() as u16;
        match self.execute(cmd::WDB, size, self.config.announce_retries) {
            Ok(_) => {}
            Err(Error::Bus) => return Err(Error::Bus),
            Err(e) => log::warn!("wdb: announce not acknowledged ({}), sending anyway", e),
        }
        if self.config.announce_settle_us > 0 {
            self.delay.delay_us(self.config.announce_settle_us);
        }

        let padding = [0u8; WDB_SIZE_NO_HEADER];
        for (index, chunk) in model.payload().chunks(WDB_SIZE_NO_HEADER).enumerate() {
            let header = sequence_header(slot, index, count).to_le_bytes();
            let parts: [&[u8]; 4] = [
                model.reserved(),
                &header,
                chunk,
                &padding[..WDB_SIZE_NO_HEADER - chunk.len()],
            ];
            self.transport.put_block(&parts)?;
            self.delay.delay_us(BLOCK_PACING_US);
        }

        self.delay.delay_ms(TRAILER_SETTLE_MS);
        let mut trailer = [0u8; 4];
        self.transport.get(&mut trailer)?;

        if reference {
            state.reference_seen = true;
        } else {
            state.counter = state.counter.wrapping_add(1);
        }
        log::debug!("wdb: status {:02x}, counter {}", trailer[3], state.counter);
        Ok(trailer[3])
    }
}
