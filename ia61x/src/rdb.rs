//! # Block Read (RDB)
//!
//! The device announces the block length in the RDB response word and then
//! streams exactly that many bytes. The host keeps what fits in its buffer
//! and drains the rest so the next command starts on a frame boundary.

use embedded_hal::delay::DelayNs;

use crate::command::Engine;
use crate::error::{Error, Result};
use crate::frame::cmd;
use crate::transport::{swap_words, Transport};

const DRAIN_UNIT: usize = 4;

/// Outcome of a block read
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ReadBlock {
    /// Capacity of the caller's buffer
    pub capacity: usize,
    /// Length reported by the device
    pub reported: u16,
    /// Bytes stored at the start of the caller's buffer
    pub retained: usize,
}

impl ReadBlock {
    /// True if part of the block did not fit and was discarded
    pub fn truncated(&self) -> bool {
        usize::from(self.reported) > self.retained
    }
}

impl<T: Transport, D: DelayNs> Engine<T, D> {
    /// Read block `block_type` of model `model_id` into `buf`
    pub fn read_block(&mut self, model_id: u8, block_type: u8, buf: &mut [u8]) -> Result<ReadBlock> {
        let request = (u16::from(model_id) << 8) | u16::from(block_type);
        let reported = self.execute(cmd::RDB, request, 1)?;
        let capacity = buf.len();
        let length = usize::from(reported);

        if length == 0 {
            log::debug!("rdb: model {} type {} is empty", model_id, block_type);
            return Ok(ReadBlock {
                capacity,
                reported,
                retained: 0,
            });
        }

        let retained = length.min(capacity);
        if retained > 0 {
            self.transport.get(&mut buf[..retained])?;
            if self.kind().swaps_read_words() {
                swap_words(&mut buf[..retained]);
            }
        }

        let remainder = length - retained;
        if remainder > 0 {
            log::warn!(
                "rdb: {} bytes reported, {} byte buffer, draining {}",
                length,
                capacity,
                remainder
            );
            let mut scratch = [0u8; DRAIN_UNIT];
            for _ in 0..remainder / DRAIN_UNIT {
                self.transport.get(&mut scratch)?;
            }
            let tail = remainder % DRAIN_UNIT;
            if tail != 0 {
                self.transport.get(&mut scratch[..tail])?;
                return Err(Error::ReadInconsistent { reported, capacity });
            }
        }

        Ok(ReadBlock {
            capacity,
            reported,
            retained,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::tests::engine;
    use crate::transport::TransportKind;

    #[test]
    fn test_request_word_packs_model_and_type() {
        let mut e = engine(TransportKind::Stream);
        e.transport.queue_frame(cmd::RDB, 0);
        let mut buf = [0u8; 8];
        let block = e.read_block(0x12, 0x03, &mut buf).unwrap();
        assert_eq!(e.transport.writes[0], [0x80, 0x2E, 0x12, 0x03]);
        assert_eq!(block.retained, 0);
        assert_eq!(e.transport.reads, 1);
    }

    #[test]
    fn test_fitting_block_is_read_exactly() {
        let mut e = engine(TransportKind::Addressed);
        e.transport.queue_frame(cmd::RDB, 6).queue(&[1, 2, 3, 4, 5, 6]);
        let mut buf = [0u8; 16];
        let block = e.read_block(1, 0, &mut buf).unwrap();
        assert_eq!(block.retained, 6);
        assert!(!block.truncated());
        assert_eq!(&buf[..6], &[1, 2, 3, 4, 5, 6]);
        assert!(e.transport.rx.is_empty());
    }

    #[test]
    fn test_overflow_is_drained_in_words() {
        let mut e = engine(TransportKind::Stream);
        e.transport.queue_frame(cmd::RDB, 16);
        e.transport.queue(&(0u8..16).collect::<std::vec::Vec<_>>());
        e.transport.queue_frame(cmd::SYNC, 0);
        let mut buf = [0u8; 8];

        let block = e.read_block(1, 0, &mut buf).unwrap();
        assert!(block.truncated());
        assert_eq!(buf, [0, 1, 2, 3, 4, 5, 6, 7]);
        assert_eq!(e.transport.bytes_read, 4 + 16);
        // next command starts on the following frame
        assert_eq!(e.sync().unwrap(), 0);
    }

    #[test]
    fn test_framed_swaps_retained_words() {
        let mut e = engine(TransportKind::Framed);
        e.transport.queue_frame(cmd::RDB, 8).queue(&[1, 2, 3, 4, 5, 6, 7, 8]);
        let mut buf = [0u8; 8];
        e.read_block(1, 0, &mut buf).unwrap();
        assert_eq!(buf, [4, 3, 2, 1, 8, 7, 6, 5]);
    }

    #[test]
    fn test_unaligned_remainder_is_drained_and_reported() {
        let mut e = engine(TransportKind::Addressed);
        e.transport.queue_frame(cmd::RDB, 11).queue(&[9; 11]);
        let mut buf = [0u8; 4];
        let err = e.read_block(1, 0, &mut buf).unwrap_err();
        assert_eq!(err, Error::ReadInconsistent { reported: 11, capacity: 4 });
        assert_eq!(buf, [9; 4]);
        assert!(e.transport.rx.is_empty());
    }

    #[test]
    fn test_command_failure_propagates() {
        let mut e = engine(TransportKind::Stream);
        e.transport.queue_frame(cmd::SYNC, 4);
        let mut buf = [0u8; 4];
        assert!(matches!(e.read_block(1, 0, &mut buf), Err(Error::Mismatch { .. })));
    }
}
