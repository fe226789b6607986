//! # Boot Sequencer
//!
//! Power-cycles the device into its boot loader, lets the boot loader detect
//! the host interface and, on UART, moves the link to the run baud rate.
//! Configuration and firmware images are then uploaded through the boot
//! loader's load command.
//!
//! ```text
//! Host                                               IA61x
//!  │──────────── power off / on, 20 ms ─────────────►│
//!  │──────────── 00 00 (UART auto-baud) ────────────►│
//!  │──────────── B7 (SPI: B7 B7 B7 B7) ─────────────►│
//!  │◄─────────── B7 ─────────────────────────────────│
//!  │──────────── 80 19 12 00 (UART only) ───────────►│
//!  │     host UART switched to 460800                │
//!  │──────────── 00 00 00 00 ───────────────────────►│
//!  │◄─────────── 80 19 12 00 ────────────────────────│
//!  │──────────── B7 ────────────────────────────────►│
//!  │◄─────────── B7 ─────────────────────────────────│
//! ```

use embedded_hal::delay::DelayNs;
use embedded_hal::digital::OutputPin;

use crate::command::Engine;
use crate::error::{Error, Result};
use crate::frame::{
    cmd, data, AUTOBAUD_PREAMBLE, BOOT_BYTE, FW_DOWNLOAD_SUCCESS, SET_RATE_460800, SYNC_MARKER,
};
use crate::transport::{Transport, TransportKind};

const POWER_OFF_MS: u32 = 1;
const POWER_ON_MS: u32 = 20;
const STEP_MS: u32 = 1;
const READY_MS: u32 = 10;
const IMAGE_STATUS_DELAY_US: u32 = 100;
const FIRMWARE_START_MS: u32 = 35;

/// Largest write the boot loader accepts in one piece
const MAX_IMAGE_CHUNK: usize = 0xFFFF;

/// Lifecycle of a device handle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum BootState {
    /// Not booted, or the last boot failed
    Unbooted,
    /// Boot handshake completed
    Ready,
}

/// Image uploaded through the boot loader
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ImageKind {
    /// System configuration, answered with status 0x00
    Config,
    /// Firmware binary, answered with status 0x02 and started afterwards
    Program,
}

impl ImageKind {
    const fn expected_status(&self) -> u8 {
        match self {
            ImageKind::Config => 0x00,
            ImageKind::Program => FW_DOWNLOAD_SUCCESS,
        }
    }
}

impl<T: Transport, D: DelayNs> Engine<T, D> {
    /// Power-cycle the device and complete the interface auto-detect
    pub fn boot_handshake<P: OutputPin>(&mut self, power: &mut P) -> Result<()> {
        power.set_low().map_err(|_| Error::BootFailed)?;
        self.delay.delay_ms(POWER_OFF_MS);
        power.set_high().map_err(|_| Error::BootFailed)?;
        self.delay.delay_ms(POWER_ON_MS);

        match self.kind() {
            TransportKind::Stream => {
                self.transport.set_baud_rate(self.config.boot_baud)?;
                self.delay.delay_ms(STEP_MS);
                self.transport.put(&AUTOBAUD_PREAMBLE)?;
                self.stream_sync()?;
                self.negotiate_baud()?;
                self.stream_sync()?;
            }
            TransportKind::Addressed | TransportKind::Framed => {
                self.delay.delay_ms(STEP_MS);
                self.packet_sync()?;
            }
        }

        self.delay.delay_ms(READY_MS);
        log::info!("boot: interface detected, device ready");
        Ok(())
    }

    /// Send the sync byte and judge the last byte the UART delivers
    fn stream_sync(&mut self) -> Result<()> {
        self.delay.delay_ms(STEP_MS);
        self.transport.put(&[SYNC_MARKER])?;
        self.delay.delay_ms(STEP_MS);

        let mut last = None;
        let mut byte = [0u8; 1];
        while self.transport.get(&mut byte).is_ok() {
            last = Some(byte[0]);
        }
        match last {
            Some(SYNC_MARKER) => Ok(()),
            other => {
                log::warn!("boot: sync answered {:02x?}", other);
                Err(Error::BootFailed)
            }
        }
    }

    fn negotiate_baud(&mut self) -> Result<()> {
        self.transport.put(&SET_RATE_460800)?;
        self.delay.delay_ms(STEP_MS);
        self.transport.set_baud_rate(self.config.run_baud)?;
        self.delay.delay_ms(STEP_MS);

        self.transport.put(&[0u8; 4])?;
        self.delay.delay_ms(STEP_MS);
        let mut ack = [0u8; 4];
        self.transport.get(&mut ack).map_err(|_| Error::BootFailed)?;
        if ack != SET_RATE_460800 {
            log::warn!("boot: rate change answered {:02x?}", ack);
            return Err(Error::BootFailed);
        }
        log::debug!("boot: link at {} baud", self.config.run_baud);
        Ok(())
    }

    /// Send the sync marker and wait for the boot loader to echo it
    fn packet_sync(&mut self) -> Result<()> {
        let marker = self.kind().sync_marker();
        self.transport.put(marker)?;
        self.delay.delay_ms(STEP_MS);

        let mut echo = [0u8; 4];
        let echo = &mut echo[..marker.len()];
        while self.transport.get(echo).is_err() {}
        if echo != marker {
            log::warn!("boot: sync answered {:02x?}", echo);
            return Err(Error::BootFailed);
        }
        Ok(())
    }

    /// Upload a configuration or firmware image through the boot loader
    pub fn download_image(&mut self, image: &[u8], kind: ImageKind) -> Result<()> {
        self.send_load_command()?;

        for chunk in image.chunks(MAX_IMAGE_CHUNK) {
            self.transport.put(chunk)?;
        }
        log::debug!("boot: {:?} image of {} bytes sent", kind, image.len());

        if self.kind().reports_image_status() {
            self.delay.delay_us(IMAGE_STATUS_DELAY_US);
            let mut status = [0u8; 1];
            // A silent boot loader counts as status 0.
            if self.transport.get(&mut status).is_err() {
                status[0] = 0;
            }
            if status[0] != kind.expected_status() {
                log::warn!("boot: {:?} image rejected with status {:02x}", kind, status[0]);
                return Err(Error::Failed);
            }
        }

        if kind == ImageKind::Program {
            self.start_firmware()?;
        }
        Ok(())
    }

    fn send_load_command(&mut self) -> Result<()> {
        let accepted = if self.kind() == TransportKind::Framed {
            self.transport.put(&[0, 0, 0, BOOT_BYTE])?;
            let mut answer = [0u8; 4];
            self.transport.get(&mut answer)?;
            answer[3] == BOOT_BYTE
        } else {
            self.transport.put(&[BOOT_BYTE])?;
            let mut answer = [0u8; 1];
            self.transport.get(&mut answer)?;
            answer[0] == BOOT_BYTE
        };
        if !accepted {
            log::warn!("boot: load command refused");
            return Err(Error::Failed);
        }
        Ok(())
    }

    fn start_firmware(&mut self) -> Result<()> {
        self.delay.delay_ms(FIRMWARE_START_MS);
        if self.kind() == TransportKind::Framed {
            let mut dummy = [0u8; 4];
            self.transport.get(&mut dummy)?;
        }

        let response = self.sync()?;
        if response != data::SYNC_RESP_NORMAL {
            log::warn!("boot: firmware sync answered {:04x}", response);
            return Err(Error::FirmwareNotRunning { response });
        }

        let edge = self.config.irq_edge as u16;
        self.expect_echo(cmd::SET_EVENT_RESP, edge, 1)?;
        log::info!("boot: firmware running, host irq armed");
        Ok(())
    }
}
