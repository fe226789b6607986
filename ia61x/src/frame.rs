//! # Command Frame Definitions
//!
//! Every exchange with the IA61x firmware starts with a 4-byte command frame:
//! a 16-bit command word followed by a 16-bit data word, each big-endian.
//! The firmware answers with a frame of the same layout whose first word
//! echoes the command.
//!
//! ## Frame Format
//!
//! ```text
//! ┌──────────┬──────────┬──────────┬──────────┐
//! │  cmd Hi  │  cmd Lo  │ data Hi  │ data Lo  │   request
//! ├──────────┼──────────┼──────────┼──────────┤
//! │  echo Hi │  echo Lo │ resp Hi  │ resp Lo  │   response
//! └──────────┴──────────┴──────────┴──────────┘
//! ```

/// Size of a command or response frame on the wire
pub const FRAME_SIZE: usize = 4;

/// Commands whose word matches this pattern are never answered
pub const CMD_NO_RESP_MASK: u16 = 0x9000;

/// Auto-detect sync marker understood by the boot loader
pub const SYNC_MARKER: u8 = 0xB7;

/// Boot loader "load image" request byte
pub const BOOT_BYTE: u8 = 0x01;

/// UART auto-baud preamble sent right after power-up
pub const AUTOBAUD_PREAMBLE: [u8; 2] = [0x00, 0x00];

/// UART rate change request to 460800 baud, echoed back once the rate switched
pub const SET_RATE_460800: [u8; 4] = [0x80, 0x19, 0x12, 0x00];

/// Boot loader status after a firmware image was accepted (UART only)
pub const FW_DOWNLOAD_SUCCESS: u8 = 0x02;

/// Download block size including the 4-byte header
pub const WDB_SIZE: usize = 512;

/// Payload capacity of one download block
pub const WDB_SIZE_NO_HEADER: usize = 508;

/// Sequence index marking the final block of a model download
pub const LAST_BLOCK_SENTINEL: u16 = 0xFF;

/// Command word catalogue
pub mod cmd {
    pub const SYNC: u16 = 0x8000;
    pub const GET_ALGO_PARAM: u16 = 0x8016;
    pub const SET_ALGO_PARAM_ID: u16 = 0x8017;
    pub const SET_ALGO_PARAM: u16 = 0x8018;
    pub const SET_DIGITAL_GAIN: u16 = 0x8015;
    pub const SET_EVENT_RESP: u16 = 0x801A;
    pub const GET_DIGITAL_GAIN: u16 = 0x801D;
    pub const BUILD_STRING_FIRST: u16 = 0x8020;
    pub const BUILD_STRING_NEXT: u16 = 0x8021;
    pub const RDB: u16 = 0x802E;
    pub const WDB: u16 = 0x802F;
    pub const SAMPLE_RATE: u16 = 0x8030;
    pub const SET_PRESET: u16 = 0x8031;
    pub const SELECT_ROUTE: u16 = 0x8032;
    pub const STOP_ROUTE: u16 = 0x8033;
    pub const BUFF_DATA_FMT: u16 = 0x8034;
    pub const FRAME_SIZE: u16 = 0x8035;
    pub const GET_EVENT_ID: u16 = 0x806D;
    pub const LOW_POWER_MODE: u16 = 0x9010;
}

/// Well-known data words
pub mod data {
    pub const EMPTY: u16 = 0x0000;
    /// SYNC answer from running firmware
    pub const SYNC_RESP_NORMAL: u16 = 0x0000;
    /// SYNC answer while the secondary boot loader is still active
    pub const SYNC_RESP_SBL: u16 = 0xFFFF;
    pub const SAMPLE_RATE_16K: u16 = 0x0001;
    pub const FRAME_SIZE_16MS: u16 = 0x0010;
    pub const ROUTE_6: u16 = 0x0006;
    /// Endpoint 12: route 6, stream manager 0
    pub const ROUTE_6_ENDPOINT: u16 = 0x0C00;
    /// 20 dB gain on [`ROUTE_6_ENDPOINT`]
    pub const DIGITAL_GAIN_20: u16 = ROUTE_6_ENDPOINT | 0x14;
    pub const OEM_SENSITIVITY_PARAM: u16 = 0x5008;
    pub const UTK_SENSITIVITY_PARAM: u16 = 0x5009;
    pub const VID_SENSITIVITY_PARAM: u16 = 0x500D;
    pub const VS_PROCESSING_MODE_PARAM: u16 = 0x5003;
    pub const VS_PROCESSING_MODE_KW: u16 = 0x0000;
}

/// Returns true when the firmware never answers `command`
#[inline]
pub const fn is_fire_and_forget(command: u16) -> bool {
    command & CMD_NO_RESP_MASK == CMD_NO_RESP_MASK
}

/// A single command or response frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct CommandFrame {
    /// Command word (or echoed command word in a response)
    pub command: u16,
    /// Data word (or response word in a response)
    pub data: u16,
}

impl CommandFrame {
    /// Create a new frame
    pub const fn new(command: u16, data: u16) -> Self {
        Self { command, data }
    }

    /// Wire representation: command then data, each big-endian
    pub const fn to_bytes(&self) -> [u8; FRAME_SIZE] {
        let c = self.command.to_be_bytes();
        let d = self.data.to_be_bytes();
        [c[0], c[1], d[0], d[1]]
    }

    /// Parse a frame from its wire representation
    pub const fn from_bytes(bytes: [u8; FRAME_SIZE]) -> Self {
        Self {
            command: u16::from_be_bytes([bytes[0], bytes[1]]),
            data: u16::from_be_bytes([bytes[2], bytes[3]]),
        }
    }
}

/// Number of download blocks needed for `payload_len` bytes of model payload
#[inline]
pub const fn block_count(payload_len: usize) -> usize {
    payload_len.div_ceil(WDB_SIZE_NO_HEADER)
}

/// Sequence header for block `index` of `count`, written after the reserved word
///
/// The slot id keeps whatever bits the model id and download counter
/// produced; the block index is OR-ed into the high byte.
#[inline]
pub const fn sequence_header(slot: u16, index: usize, count: usize) -> u16 {
    let idx = if index + 1 == count {
        LAST_BLOCK_SENTINEL
    } else {
        index as u16
    };
    slot | (idx << 8)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_is_big_endian_per_word() {
        let frame = CommandFrame::new(cmd::WDB, 0x0258);
        assert_eq!(frame.to_bytes(), [0x80, 0x2F, 0x02, 0x58]);
    }

    #[test]
    fn test_frame_parse() {
        let frame = CommandFrame::from_bytes([0x80, 0x6D, 0x00, 0x03]);
        assert_eq!(frame.command, cmd::GET_EVENT_ID);
        assert_eq!(frame.data, 3);
    }

    #[test]
    fn test_fire_and_forget_pattern() {
        assert!(is_fire_and_forget(cmd::LOW_POWER_MODE));
        assert!(is_fire_and_forget(cmd::SET_PRESET | CMD_NO_RESP_MASK));
        assert!(!is_fire_and_forget(cmd::SYNC));
        assert!(!is_fire_and_forget(cmd::GET_EVENT_ID));
    }

    #[test]
    fn test_rate_literal_is_a_command_frame() {
        let frame = CommandFrame::from_bytes(SET_RATE_460800);
        assert_eq!(frame.command, 0x8019);
        assert_eq!(frame.data, 0x1200);
    }

    #[test]
    fn test_block_count_edges() {
        assert_eq!(block_count(0), 0);
        assert_eq!(block_count(1), 1);
        assert_eq!(block_count(508), 1);
        assert_eq!(block_count(509), 2);
        assert_eq!(block_count(596), 2);
    }

    #[test]
    fn test_sequence_header_single_block_is_last() {
        assert_eq!(sequence_header(0x0003, 0, 1), 0xFF03);
    }

    #[test]
    fn test_sequence_header_keeps_overflowed_slot_bits() {
        // model id 0x20 plus counter 1 lands in bit 5, index stays in the high byte
        assert_eq!(sequence_header(0x0030, 1, 3), 0x0130);
    }

    mod props {
        use super::super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn exactly_one_sentinel_and_it_is_last(len in 1usize..8192, slot in 0u16..0x100) {
                let count = block_count(len);
                let headers: std::vec::Vec<u16> =
                    (0..count).map(|i| sequence_header(slot, i, count)).collect();
                let sentinels = headers.iter().filter(|h| *h >> 8 == LAST_BLOCK_SENTINEL).count();
                prop_assert_eq!(sentinels, 1);
                prop_assert_eq!(headers[count - 1] >> 8, LAST_BLOCK_SENTINEL);
                prop_assert!(count * WDB_SIZE_NO_HEADER >= len);
                prop_assert!((count - 1) * WDB_SIZE_NO_HEADER < len);
            }
        }
    }
}
