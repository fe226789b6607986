//! Scripted fakes shared by the unit tests.

use std::collections::VecDeque;
use std::vec::Vec;

use embedded_hal::delay::DelayNs;
use embedded_hal::digital::{ErrorType, OutputPin};

use crate::error::{Error, Result};
use crate::frame::CommandFrame;
use crate::irq::EventLine;
use crate::transport::{Transport, TransportKind};

/// Transport that records every write and serves reads from a queue
///
/// Running out of bytes, or reaching a gap, reads as [`Error::Timeout`].
pub struct ScriptedTransport {
    pub kind: TransportKind,
    pub writes: Vec<Vec<u8>>,
    pub blocks: Vec<Vec<u8>>,
    pub rx: VecDeque<Option<u8>>,
    pub reads: usize,
    pub bytes_read: usize,
    pub bauds: Vec<u32>,
    pub fail_writes_after: Option<usize>,
}

impl ScriptedTransport {
    pub fn new(kind: TransportKind) -> Self {
        Self {
            kind,
            writes: Vec::new(),
            blocks: Vec::new(),
            rx: VecDeque::new(),
            reads: 0,
            bytes_read: 0,
            bauds: Vec::new(),
            fail_writes_after: None,
        }
    }

    pub fn queue(&mut self, bytes: &[u8]) -> &mut Self {
        self.rx.extend(bytes.iter().copied().map(Some));
        self
    }

    /// Make the read that reaches this point time out
    pub fn queue_gap(&mut self) -> &mut Self {
        self.rx.push_back(None);
        self
    }

    pub fn queue_frame(&mut self, command: u16, data: u16) -> &mut Self {
        self.queue(&CommandFrame::new(command, data).to_bytes())
    }

    /// All bytes written, in order
    pub fn written(&self) -> Vec<u8> {
        self.writes.concat()
    }
}

impl Transport for ScriptedTransport {
    fn kind(&self) -> TransportKind {
        self.kind
    }

    fn put(&mut self, data: &[u8]) -> Result<()> {
        if let Some(limit) = self.fail_writes_after {
            if self.writes.len() >= limit {
                return Err(Error::Bus);
            }
        }
        self.writes.push(data.to_vec());
        Ok(())
    }

    fn get(&mut self, buf: &mut [u8]) -> Result<()> {
        self.reads += 1;
        for b in buf.iter_mut() {
            match self.rx.pop_front() {
                Some(Some(byte)) => *b = byte,
                _ => return Err(Error::Timeout),
            }
        }
        self.bytes_read += buf.len();
        Ok(())
    }

    fn put_block(&mut self, parts: &[&[u8]]) -> Result<()> {
        for part in parts {
            self.put(part)?;
        }
        self.blocks.push(parts.concat());
        Ok(())
    }

    fn set_baud_rate(&mut self, baud: u32) -> Result<()> {
        self.bauds.push(baud);
        Ok(())
    }
}

/// Delay that only accounts for the requested time
#[derive(Default)]
pub struct FakeDelay {
    pub elapsed_ns: u64,
    pub calls: usize,
}

impl DelayNs for FakeDelay {
    fn delay_ns(&mut self, ns: u32) {
        self.elapsed_ns += u64::from(ns);
        self.calls += 1;
    }
}

/// Power line that remembers its level history
#[derive(Default)]
pub struct FakePin {
    pub levels: Vec<bool>,
}

impl ErrorType for FakePin {
    type Error = core::convert::Infallible;
}

impl OutputPin for FakePin {
    fn set_low(&mut self) -> core::result::Result<(), Self::Error> {
        self.levels.push(false);
        Ok(())
    }

    fn set_high(&mut self) -> core::result::Result<(), Self::Error> {
        self.levels.push(true);
        Ok(())
    }
}

/// Event line that reports pending after a number of polls
pub struct CountdownLine {
    pub polls_left: usize,
    pub polls: usize,
}

impl CountdownLine {
    pub fn after(polls: usize) -> Self {
        Self {
            polls_left: polls,
            polls: 0,
        }
    }
}

impl EventLine for CountdownLine {
    fn take_pending(&mut self) -> bool {
        self.polls += 1;
        if self.polls_left == 0 {
            self.polls_left = usize::MAX;
            true
        } else {
            self.polls_left = self.polls_left.saturating_sub(1);
            false
        }
    }

    fn clear(&mut self) {}
}
