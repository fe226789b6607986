//! # Event Monitor
//!
//! ```text
//! Idle ──(HOST_IRQ seen)──► Pending ──(GET_EVENT_ID)──► Idle
//!   ▲  poll, sleep delay_ms                               │
//!   └──────────────────────────────────────────────────────┘
//! ```
//!
//! The device signals keyword, command and timeout events on HOST_IRQ. On
//! the UART link it also pushes bytes on the line, which must be consumed
//! before the event id can be queried.

use embedded_hal::delay::DelayNs;

use crate::command::Engine;
use crate::frame::cmd;
use crate::irq::EventLine;
use crate::transport::{Transport, TransportKind};

/// Event code reported when nothing was detected
pub const NO_EVENT: u8 = 0;

impl<T: Transport, D: DelayNs> Engine<T, D> {
    /// Block until the event line fires, then return the event code
    ///
    /// Returns [`NO_EVENT`] for a spurious interrupt. Links that can stall on
    /// a spurious interrupt re-arm the route before returning.
    pub fn wait_event<E: EventLine>(&mut self, line: &mut E, delay_ms: u32) -> u8 {
        while !line.take_pending() {
            self.delay.delay_ms(delay_ms);
        }
        log::trace!("event: interrupt seen");

        if self.kind() == TransportKind::Stream && !self.flush_event_bytes(delay_ms) {
            log::debug!("event: nothing on the line");
            return NO_EVENT;
        }

        let code = match self.execute(cmd::GET_EVENT_ID, 0, self.config.event_retries) {
            Ok(word) => (word & 0x00FF) as u8,
            Err(e) => {
                log::debug!("event: id query failed: {}", e);
                NO_EVENT
            }
        };
        if code != NO_EVENT {
            log::debug!("event: code {}", code);
            return code;
        }

        if self.kind().rearms_on_spurious_event() {
            log::debug!("event: spurious interrupt, re-arming route");
            if let Err(e) = self.start_voice_wake() {
                log::warn!("event: re-arm failed: {}", e);
            }
        }
        NO_EVENT
    }

    /// Consume what the device pushed on the UART; false if it pushed nothing
    fn flush_event_bytes(&mut self, delay_ms: u32) -> bool {
        let mut buf = [0u8; 4];
        if delay_ms == 0 {
            if self.transport.get(&mut buf[..1]).is_err() {
                return false;
            }
            let _ = self.transport.get(&mut buf[1..]);
        } else {
            while self.transport.get(&mut buf).is_ok() {}
        }
        true
    }
}
