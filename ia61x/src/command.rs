//! # Command/Response Engine
//!
//! Writes one 4-byte command frame and collects the echoed response. All
//! other engines (block download, block read, voice wake, event monitor) are
//! built on [`Engine::execute`].
//!
//! ## Retry Policy
//!
//! ```text
//! write frame ──► fire-and-forget? ──yes──► return data word
//!                      │ no
//!                      ▼
//!          ┌──► settle delay ──► read 4 bytes ──► echo == cmd? ──yes──► return resp word
//!          │                                          │ no
//!          │                               UART: fail now
//!          └──── budget left? ◄───────── I2C/SPI: retry
//! ```

use embedded_hal::delay::DelayNs;
use heapless::String;

use crate::config::DeviceConfig;
use crate::error::{Error, Result};
use crate::frame::{cmd, is_fire_and_forget, CommandFrame, FRAME_SIZE};
use crate::transport::{Transport, TransportKind};

/// Protocol engine bound to one transport and one delay source
pub struct Engine<T, D> {
    pub(crate) transport: T,
    pub(crate) delay: D,
    pub(crate) config: DeviceConfig,
}

impl<T: Transport, D: DelayNs> Engine<T, D> {
    /// Bind a transport, a delay source and a session configuration
    pub fn new(transport: T, delay: D, config: DeviceConfig) -> Self {
        Self {
            transport,
            delay,
            config,
        }
    }

    /// Which physical link this engine drives
    #[inline]
    pub fn kind(&self) -> TransportKind {
        self.transport.kind()
    }

    /// Session configuration
    #[inline]
    pub fn config(&self) -> &DeviceConfig {
        &self.config
    }

    /// Split back into parts
    pub fn into_parts(self) -> (T, D, DeviceConfig) {
        (self.transport, self.delay, self.config)
    }

    /// Send a command word and data word, return the device's response word
    ///
    /// `retries` is the number of response reads attempted; 0 means no
    /// response is expected. Commands carrying the no-response bit pattern
    /// are never read back either. In both cases `data` is returned as the
    /// assumed echo.
    pub fn execute(&mut self, command: u16, data: u16, retries: u32) -> Result<u16> {
        let frame = CommandFrame::new(command, data);
        log::trace!("cmd -> {:04x} {:04x}", command, data);
        self.transport.put(&frame.to_bytes())?;

        if is_fire_and_forget(command) || retries == 0 {
            return Ok(data);
        }

        let mut outcome = Err(Error::Failed);
        for _ in 0..retries {
            if self.config.settle_ms > 0 {
                self.delay.delay_ms(self.config.settle_ms);
            }

            let mut buf = [0u8; FRAME_SIZE];
            self.transport.get(&mut buf)?;
            let response = CommandFrame::from_bytes(buf);

            if response.command == command {
                log::trace!("cmd <- {:04x} {:04x}", response.command, response.data);
                return Ok(response.data);
            }

            log::debug!(
                "cmd {:04x}: echo mismatch, got {:04x} {:04x}",
                command,
                response.command,
                response.data
            );
            outcome = Err(Error::Mismatch {
                expected: command,
                received: response.command,
            });
            if self.kind().mismatch_aborts() {
                break;
            }
        }
        outcome
    }

    /// Send `command` and require the response word to echo `data`
    pub(crate) fn expect_echo(&mut self, command: u16, data: u16, retries: u32) -> Result<()> {
        let response = self.execute(command, data, retries)?;
        if response != data {
            log::debug!(
                "cmd {:04x}: expected {:04x}, device answered {:04x}",
                command,
                data,
                response
            );
            return Err(Error::Failed);
        }
        Ok(())
    }

    /// Ping the firmware; returns the SYNC response word
    pub fn sync(&mut self) -> Result<u16> {
        self.execute(cmd::SYNC, 0, 1)
    }

    /// Select algorithm parameter `id` and store `value` in it
    pub fn set_algo_param(&mut self, id: u16, value: u16) -> Result<()> {
        self.expect_echo(cmd::SET_ALGO_PARAM_ID, id, 1)?;
        self.expect_echo(cmd::SET_ALGO_PARAM, value, 1)
    }

    /// Read back algorithm parameter `id`
    pub fn algo_param(&mut self, id: u16) -> Result<u16> {
        self.execute(cmd::GET_ALGO_PARAM, id, 1)
    }

    /// Read the digital gain word of `endpoint`
    ///
    /// The endpoint id sits in the high byte, see [`crate::frame::data::ROUTE_6_ENDPOINT`].
    pub fn digital_gain(&mut self, endpoint: u16) -> Result<u16> {
        self.execute(cmd::GET_DIGITAL_GAIN, endpoint, 1)
    }

    /// Read the build string of the firmware (`algo_id` 0) or of an algorithm
    ///
    /// The device hands out one character per command until it answers 0.
    /// The string is cut at `N` bytes.
    pub fn version_string<const N: usize>(&mut self, algo_id: u16) -> Result<String<N>> {
        let mut version = String::new();
        let mut ch = self.execute(cmd::BUILD_STRING_FIRST, algo_id, 1)?;
        while ch != 0 {
            if version.push(char::from(ch as u8)).is_err() {
                break;
            }
            ch = self.execute(cmd::BUILD_STRING_NEXT, 0, 1)?;
        }
        Ok(version)
    }

    /// Write raw bytes to the device
    pub fn put(&mut self, data: &[u8]) -> Result<()> {
        self.transport.put(data)
    }

    /// Read raw bytes from the device
    pub fn get(&mut self, buf: &mut [u8]) -> Result<()> {
        self.transport.get(buf)
    }
}
