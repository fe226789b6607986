//! # Simulated IA61x
//!
//! A host-side model of the IA61x boot loader and firmware command set,
//! used to exercise the `ia61x` crate end to end without hardware.
//!
//! ## Peripheral Handles
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────┐
//! │                     Ia61xSim (Arc<Mutex>)                  │
//! │                                                            │
//! │   SimUart ──┐                                              │
//! │   SimI2c  ──┼──► SimState::receive ──► boot loader /       │
//! │   SimSpi  ──┘         ▲                 firmware model     │
//! │                       │                        │           │
//! │   SimPower ───────────┘ (power cycle)          ▼           │
//! │   SimDelay ──► virtual clock ──► scheduled events ──► irq  │
//! │   SimIrq   ◄──────────────────────────────────────────┘    │
//! └────────────────────────────────────────────────────────────┘
//! ```
//!
//! Each handle implements the trait the `ia61x` transports expect:
//! `embedded-io` for the UART, `embedded-hal` 1.0 for I2C, SPI, GPIO and
//! delay. Waiting advances a virtual clock instead of sleeping.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};

use embedded_hal::i2c::{self, NoAcknowledgeSource, Operation as I2cOperation};
use embedded_hal::spi::{self, Operation as SpiOperation};
use log::{debug, info, trace, warn};
use thiserror::Error;

use ia61x::frame::{
    cmd, data, BOOT_BYTE, CMD_NO_RESP_MASK, FW_DOWNLOAD_SUCCESS, SET_RATE_460800, SYNC_MARKER,
    WDB_SIZE, WDB_SIZE_NO_HEADER,
};
use ia61x::transport::{swap_words, BaudRate, DEFAULT_ADDRESS};
use ia61x::{CommandFrame, EventLine, TransportKind};

/// Build string reported through the build-string commands
pub const SIM_BUILD_STRING: &str = "IA61x-SIM 1.0";

/// Errors reported by the simulated peripherals
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum SimError {
    #[error("no data from device")]
    Timeout,
    #[error("device did not acknowledge")]
    NoAcknowledge,
}

impl embedded_io::Error for SimError {
    fn kind(&self) -> embedded_io::ErrorKind {
        match self {
            SimError::Timeout => embedded_io::ErrorKind::TimedOut,
            SimError::NoAcknowledge => embedded_io::ErrorKind::Other,
        }
    }
}

impl i2c::Error for SimError {
    fn kind(&self) -> i2c::ErrorKind {
        i2c::ErrorKind::NoAcknowledge(NoAcknowledgeSource::Data)
    }
}

impl spi::Error for SimError {
    fn kind(&self) -> spi::ErrorKind {
        spi::ErrorKind::Other
    }
}

/// Where the simulated device is in its life cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Held in reset
    Off,
    /// Boot loader waiting for the sync marker
    AutoDetect,
    /// Boot loader accepting rate changes and load commands
    BootLoader,
    /// Boot loader receiving an image
    Loading,
    /// Firmware running
    Firmware,
}

/// Sizes of the images the boot loader expects, in upload order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageSizes {
    pub config: usize,
    pub firmware: usize,
}

/// One received download block, split into its fields
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReceivedBlock {
    pub reserved: [u8; 2],
    pub slot: u8,
    pub index: u8,
    pub payload: Vec<u8>,
}

struct SimState {
    link: TransportKind,
    images: ImageSizes,
    phase: Phase,
    power_cycles: u32,

    // UART line rates
    host_baud: u32,
    device_baud: Option<u32>,
    rate_change_pending: bool,

    /// Bytes the device has queued for the host
    tx: VecDeque<u8>,
    /// Partial frame received from the host
    rx: Vec<u8>,

    configs_loaded: u32,
    loading_firmware: bool,
    load_remaining: usize,
    firmware_stuck: bool,

    wdb_remaining: usize,
    wdb_current: Vec<u8>,
    blocks: Vec<ReceivedBlock>,
    wdb_status: u8,

    read_blocks: HashMap<(u8, u8), Vec<u8>>,
    algo_params: HashMap<u16, u16>,
    /// Gain words by endpoint (high byte)
    gains: HashMap<u16, u16>,
    selected_param: u16,
    build_string: VecDeque<u8>,
    irq_edge: Option<u16>,
    preset: Option<u16>,
    route_armed: bool,
    arm_count: u32,
    commands: Vec<CommandFrame>,

    clock_ns: u64,
    scheduled: Vec<(u64, u8)>,
    irq_pending: bool,
    event_code: u8,
}

impl SimState {
    fn new(link: TransportKind, images: ImageSizes) -> Self {
        Self {
            link,
            images,
            phase: Phase::Off,
            power_cycles: 0,
            host_baud: 0,
            device_baud: None,
            rate_change_pending: false,
            tx: VecDeque::new(),
            rx: Vec::new(),
            configs_loaded: 0,
            loading_firmware: false,
            load_remaining: 0,
            firmware_stuck: false,
            wdb_remaining: 0,
            wdb_current: Vec::new(),
            blocks: Vec::new(),
            wdb_status: 0,
            read_blocks: HashMap::new(),
            algo_params: HashMap::new(),
            gains: HashMap::new(),
            selected_param: 0,
            build_string: VecDeque::new(),
            irq_edge: None,
            preset: None,
            route_armed: false,
            arm_count: 0,
            commands: Vec::new(),
            clock_ns: 0,
            scheduled: Vec::new(),
            irq_pending: false,
            event_code: 0,
        }
    }

    fn power(&mut self, on: bool) {
        if !on {
            if self.phase != Phase::Off {
                debug!("sim: held in reset");
            }
            self.phase = Phase::Off;
            return;
        }
        if self.phase != Phase::Off {
            return;
        }
        self.power_cycles += 1;
        self.phase = Phase::AutoDetect;
        self.device_baud = None;
        self.rate_change_pending = false;
        self.tx.clear();
        self.rx.clear();
        self.configs_loaded = 0;
        self.wdb_remaining = 0;
        self.wdb_current.clear();
        self.blocks.clear();
        self.preset = None;
        self.route_armed = false;
        self.gains.clear();
        self.irq_edge = None;
        self.irq_pending = false;
        info!("sim: powered on ({} cycle(s))", self.power_cycles);
    }

    /// False while the UART rates of host and device disagree
    fn line_in_sync(&self) -> bool {
        self.link != TransportKind::Stream
            || self.device_baud.map_or(true, |baud| baud == self.host_baud)
    }

    fn send(&mut self, bytes: &[u8]) {
        self.tx.extend(bytes.iter().copied());
    }

    fn send_frame(&mut self, command: u16, data: u16) {
        self.send(&CommandFrame::new(command, data).to_bytes());
    }

    fn receive(&mut self, bytes: &[u8]) {
        if self.phase == Phase::Off {
            return;
        }
        if !self.line_in_sync() {
            warn!("sim: {} byte(s) garbled by baud mismatch", bytes.len());
            return;
        }
        for &byte in bytes {
            self.receive_byte(byte);
        }
    }

    fn receive_byte(&mut self, byte: u8) {
        match self.phase {
            Phase::Off => {}
            Phase::AutoDetect => self.auto_detect(byte),
            Phase::BootLoader => self.boot_loader(byte),
            Phase::Loading => self.load(byte),
            Phase::Firmware if self.wdb_remaining > 0 => self.wdb_byte(byte),
            Phase::Firmware => {
                self.rx.push(byte);
                if self.rx.len() == 4 {
                    let word = std::mem::take(&mut self.rx);
                    let frame = CommandFrame::from_bytes([word[0], word[1], word[2], word[3]]);
                    self.command(frame);
                }
            }
        }
    }

    fn auto_detect(&mut self, byte: u8) {
        if self.link == TransportKind::Stream && byte == 0x00 && self.device_baud.is_none() {
            self.device_baud = Some(self.host_baud);
            debug!("sim: auto-baud at {}", self.host_baud);
            return;
        }
        if byte != SYNC_MARKER {
            return;
        }
        self.rx.push(byte);
        let marker_len = self.link.sync_marker().len();
        if self.rx.len() == marker_len {
            self.rx.clear();
            let marker = self.link.sync_marker().to_vec();
            self.send(&marker);
            self.phase = Phase::BootLoader;
            debug!("sim: host interface {:?} detected", self.link);
        }
    }

    fn boot_loader(&mut self, byte: u8) {
        self.rx.push(byte);
        match self.link {
            TransportKind::Stream => {
                if self.rx == [SYNC_MARKER] {
                    self.rx.clear();
                    self.send(&[SYNC_MARKER]);
                } else if self.rx == [BOOT_BYTE] {
                    self.rx.clear();
                    self.start_load();
                } else if self.rx.len() == 4 {
                    let word = std::mem::take(&mut self.rx);
                    if word == SET_RATE_460800 {
                        self.device_baud = Some(460_800);
                        self.rate_change_pending = true;
                        debug!("sim: rate change to 460800");
                    } else if word == [0; 4] && self.rate_change_pending {
                        self.rate_change_pending = false;
                        self.send(&SET_RATE_460800);
                    }
                } else if !(self.rx[0] == SET_RATE_460800[0] || self.rx[0] == 0x00) {
                    self.rx.clear();
                }
            }
            TransportKind::Addressed => {
                if self.rx == [BOOT_BYTE] {
                    self.start_load();
                }
                self.rx.clear();
            }
            TransportKind::Framed => {
                if self.rx.len() == 4 {
                    if self.rx == [0, 0, 0, BOOT_BYTE] {
                        self.start_load();
                    }
                    self.rx.clear();
                }
            }
        }
    }

    fn start_load(&mut self) {
        self.rx.clear();
        if self.link == TransportKind::Framed {
            self.send(&[0, 0, 0, BOOT_BYTE]);
        } else {
            self.send(&[BOOT_BYTE]);
        }
        self.loading_firmware = self.configs_loaded > 0;
        self.load_remaining = if self.loading_firmware {
            self.images.firmware
        } else {
            self.images.config
        };
        self.phase = Phase::Loading;
        if self.load_remaining == 0 {
            self.finish_load();
        }
    }

    fn load(&mut self, _byte: u8) {
        self.load_remaining -= 1;
        if self.load_remaining == 0 {
            self.finish_load();
        }
    }

    fn finish_load(&mut self) {
        if self.loading_firmware {
            info!("sim: firmware loaded");
            if self.link == TransportKind::Stream {
                self.send(&[FW_DOWNLOAD_SUCCESS]);
            }
            self.phase = Phase::Firmware;
        } else {
            info!("sim: configuration loaded");
            self.configs_loaded += 1;
            if self.link == TransportKind::Stream {
                self.send(&[0x00]);
            }
            self.phase = Phase::BootLoader;
        }
    }

    fn command(&mut self, frame: CommandFrame) {
        trace!("sim: cmd {:04x} {:04x}", frame.command, frame.data);
        self.commands.push(frame);
        let CommandFrame { command, data } = frame;

        match command {
            cmd::SYNC if self.firmware_stuck => self.send_frame(cmd::SYNC, data::SYNC_RESP_SBL),
            cmd::SYNC => self.send_frame(cmd::SYNC, data::SYNC_RESP_NORMAL),
            cmd::SET_EVENT_RESP => {
                self.irq_edge = Some(data);
                self.send_frame(command, data);
            }
            cmd::SET_PRESET => {
                self.arm_preset(data);
                self.send_frame(command, data);
            }
            c if c == cmd::SET_PRESET | CMD_NO_RESP_MASK => self.arm_preset(data),
            cmd::STOP_ROUTE => {
                self.route_armed = false;
                self.send_frame(command, data::EMPTY);
            }
            cmd::SELECT_ROUTE => {
                self.route_armed = true;
                self.arm_count += 1;
                self.send_frame(command, data);
            }
            cmd::SET_DIGITAL_GAIN => {
                self.gains.insert(data & 0xFF00, data);
                self.send_frame(command, data);
            }
            cmd::GET_DIGITAL_GAIN => {
                let gain = self.gains.get(&(data & 0xFF00)).copied().unwrap_or(data & 0xFF00);
                self.send_frame(command, gain);
            }
            cmd::SAMPLE_RATE | cmd::FRAME_SIZE | cmd::BUFF_DATA_FMT => self.send_frame(command, data),
            cmd::SET_ALGO_PARAM_ID => {
                self.selected_param = data;
                self.send_frame(command, data);
            }
            cmd::SET_ALGO_PARAM => {
                self.algo_params.insert(self.selected_param, data);
                self.send_frame(command, data);
            }
            cmd::GET_ALGO_PARAM => {
                let value = self.algo_params.get(&data).copied().unwrap_or(0);
                self.send_frame(command, value);
            }
            cmd::BUILD_STRING_FIRST => {
                self.build_string = SIM_BUILD_STRING.bytes().collect();
                let ch = self.build_string.pop_front().unwrap_or(0);
                self.send_frame(command, u16::from(ch));
            }
            cmd::BUILD_STRING_NEXT => {
                let ch = self.build_string.pop_front().unwrap_or(0);
                self.send_frame(command, u16::from(ch));
            }
            cmd::WDB => self.start_wdb(data),
            cmd::RDB => self.read_block(data),
            cmd::GET_EVENT_ID => {
                let code = std::mem::take(&mut self.event_code);
                self.send_frame(command, u16::from(code));
            }
            cmd::LOW_POWER_MODE => debug!("sim: low power mode {:04x}", data),
            _ => {
                warn!("sim: unknown command {:04x}", command);
                self.send_frame(0xFFFF, 0xFFFF);
            }
        }
    }

    fn arm_preset(&mut self, preset: u16) {
        self.preset = Some(preset);
        self.route_armed = true;
        self.arm_count += 1;
    }

    fn start_wdb(&mut self, size: u16) {
        let payload = usize::from(size).saturating_sub(4);
        let blocks = payload.div_ceil(WDB_SIZE_NO_HEADER);
        self.wdb_remaining = blocks * WDB_SIZE;
        self.wdb_current.clear();
        debug!("sim: expecting {} download block(s)", blocks);
        // The SPI host never reads the announcement back.
        if self.link != TransportKind::Framed {
            self.send_frame(cmd::WDB, size);
        }
    }

    fn wdb_byte(&mut self, byte: u8) {
        self.wdb_current.push(byte);
        self.wdb_remaining -= 1;
        if self.wdb_current.len() == WDB_SIZE {
            let block = std::mem::take(&mut self.wdb_current);
            self.blocks.push(ReceivedBlock {
                reserved: [block[0], block[1]],
                slot: block[2],
                index: block[3],
                payload: block[4..].to_vec(),
            });
        }
        if self.wdb_remaining == 0 {
            let status = self.wdb_status;
            self.send(&[0, 0, 0, status]);
        }
    }

    fn read_block(&mut self, request: u16) {
        let key = ((request >> 8) as u8, (request & 0xFF) as u8);
        let mut block = self.read_blocks.get(&key).cloned().unwrap_or_default();
        self.send_frame(cmd::RDB, block.len() as u16);
        if self.link == TransportKind::Framed {
            swap_words(&mut block);
        }
        self.send(&block);
    }

    fn raise(&mut self, code: u8) {
        self.event_code = code;
        self.irq_pending = true;
        if self.link == TransportKind::Stream && code != 0 {
            self.send(&[0x80, 0x6D, 0x00, code]);
        }
        debug!("sim: interrupt raised, event {}", code);
    }

    fn advance(&mut self, ns: u64) {
        self.clock_ns += ns;
        let now = self.clock_ns;
        let (due, pending): (Vec<_>, Vec<_>) = self.scheduled.drain(..).partition(|&(at, _)| at <= now);
        self.scheduled = pending;
        for (_, code) in due {
            self.raise(code);
        }
    }
}

/// Simulated IA61x shared by all peripheral handles
#[derive(Clone)]
pub struct Ia61xSim {
    state: Arc<Mutex<SimState>>,
}

impl Ia61xSim {
    /// A powered-off device attached to `link`
    pub fn new(link: TransportKind, images: ImageSizes) -> Self {
        Self {
            state: Arc::new(Mutex::new(SimState::new(link, images))),
        }
    }

    fn state(&self) -> MutexGuard<'_, SimState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn uart(&self) -> SimUart {
        SimUart { sim: self.clone() }
    }

    pub fn i2c(&self) -> SimI2c {
        SimI2c {
            sim: self.clone(),
            address: DEFAULT_ADDRESS,
        }
    }

    pub fn spi(&self) -> SimSpi {
        SimSpi { sim: self.clone() }
    }

    pub fn power_pin(&self) -> SimPower {
        SimPower { sim: self.clone() }
    }

    pub fn delay(&self) -> SimDelay {
        SimDelay { sim: self.clone() }
    }

    pub fn irq(&self) -> SimIrq {
        SimIrq { sim: self.clone() }
    }

    pub fn phase(&self) -> Phase {
        self.state().phase
    }

    pub fn power_cycles(&self) -> u32 {
        self.state().power_cycles
    }

    /// Download blocks received since power-on
    pub fn blocks(&self) -> Vec<ReceivedBlock> {
        self.state().blocks.clone()
    }

    /// Every command frame the firmware has received
    pub fn commands(&self) -> Vec<CommandFrame> {
        self.state().commands.clone()
    }

    /// Number of times the detection route was armed
    pub fn arm_count(&self) -> u32 {
        self.state().arm_count
    }

    pub fn route_armed(&self) -> bool {
        self.state().route_armed
    }

    pub fn preset(&self) -> Option<u16> {
        self.state().preset
    }

    pub fn irq_edge(&self) -> Option<u16> {
        self.state().irq_edge
    }

    pub fn algo_param(&self, id: u16) -> Option<u16> {
        self.state().algo_params.get(&id).copied()
    }

    /// Virtual time elapsed through [`SimDelay`], in nanoseconds
    pub fn elapsed_ns(&self) -> u64 {
        self.state().clock_ns
    }

    /// Status byte returned after the last download block
    pub fn set_wdb_status(&self, status: u8) {
        self.state().wdb_status = status;
    }

    /// Content served for a block read of `model_id` / `block_type`
    pub fn set_read_block(&self, model_id: u8, block_type: u8, block: &[u8]) {
        self.state().read_blocks.insert((model_id, block_type), block.to_vec());
    }

    /// Answer SYNC from the secondary boot loader after the firmware upload
    pub fn set_firmware_stuck(&self, stuck: bool) {
        self.state().firmware_stuck = stuck;
    }

    /// Detect a keyword now
    pub fn trigger_event(&self, code: u8) {
        self.state().raise(code);
    }

    /// Pulse HOST_IRQ without an event behind it
    pub fn raise_spurious_irq(&self) {
        self.state().raise(0);
    }

    /// Detect a keyword once the virtual clock has advanced by `after_ms`
    pub fn schedule_event(&self, after_ms: u32, code: u8) {
        let mut state = self.state();
        let at = state.clock_ns + u64::from(after_ms) * 1_000_000;
        state.scheduled.push((at, code));
    }

    /// Bytes queued for the host and not read yet
    pub fn pending_tx(&self) -> usize {
        self.state().tx.len()
    }
}

/// UART side of the simulator
pub struct SimUart {
    sim: Ia61xSim,
}

impl embedded_io::ErrorType for SimUart {
    type Error = SimError;
}

impl embedded_io::Read for SimUart {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, Self::Error> {
        if buf.is_empty() {
            return Ok(0);
        }
        let mut state = self.sim.state();
        if !state.line_in_sync() || state.tx.is_empty() {
            return Err(SimError::Timeout);
        }
        let n = buf.len().min(state.tx.len());
        for (slot, byte) in buf.iter_mut().zip(state.tx.drain(..n)) {
            *slot = byte;
        }
        Ok(n)
    }
}

impl embedded_io::Write for SimUart {
    fn write(&mut self, buf: &[u8]) -> Result<usize, Self::Error> {
        self.sim.state().receive(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> Result<(), Self::Error> {
        Ok(())
    }
}

impl BaudRate for SimUart {
    fn set_baud_rate(&mut self, baud: u32) -> Result<(), Self::Error> {
        self.sim.state().host_baud = baud;
        Ok(())
    }
}

/// I2C side of the simulator
pub struct SimI2c {
    sim: Ia61xSim,
    address: u8,
}

impl i2c::ErrorType for SimI2c {
    type Error = SimError;
}

impl i2c::I2c for SimI2c {
    fn transaction(
        &mut self,
        address: u8,
        operations: &mut [I2cOperation<'_>],
    ) -> Result<(), Self::Error> {
        let mut state = self.sim.state();
        if address != self.address || state.phase == Phase::Off {
            return Err(SimError::NoAcknowledge);
        }
        for op in operations {
            match op {
                I2cOperation::Write(bytes) => state.receive(bytes),
                I2cOperation::Read(buf) => {
                    if state.tx.len() < buf.len() {
                        return Err(SimError::NoAcknowledge);
                    }
                    let n = buf.len();
                    for (slot, byte) in buf.iter_mut().zip(state.tx.drain(..n)) {
                        *slot = byte;
                    }
                }
            }
        }
        Ok(())
    }
}

/// SPI side of the simulator
///
/// MISO idles low, so reading with nothing queued yields zeros.
pub struct SimSpi {
    sim: Ia61xSim,
}

impl spi::ErrorType for SimSpi {
    type Error = SimError;
}

fn clock_out(state: &mut SimState, buf: &mut [u8]) {
    for slot in buf.iter_mut() {
        *slot = state.tx.pop_front().unwrap_or(0);
    }
}

impl spi::SpiDevice for SimSpi {
    fn transaction(&mut self, operations: &mut [SpiOperation<'_, u8>]) -> Result<(), Self::Error> {
        let mut state = self.sim.state();
        if state.phase == Phase::Off {
            return Err(SimError::NoAcknowledge);
        }
        for op in operations {
            match op {
                SpiOperation::Write(bytes) => state.receive(bytes),
                SpiOperation::Read(buf) => clock_out(&mut state, buf),
                SpiOperation::Transfer(read, write) => {
                    clock_out(&mut state, read);
                    state.receive(write);
                }
                SpiOperation::TransferInPlace(buf) => {
                    let sent = buf.to_vec();
                    clock_out(&mut state, buf);
                    state.receive(&sent);
                }
                SpiOperation::DelayNs(ns) => state.advance(u64::from(*ns)),
            }
        }
        Ok(())
    }
}

/// LDO enable line of the simulator
pub struct SimPower {
    sim: Ia61xSim,
}

impl embedded_hal::digital::ErrorType for SimPower {
    type Error = core::convert::Infallible;
}

impl embedded_hal::digital::OutputPin for SimPower {
    fn set_low(&mut self) -> Result<(), Self::Error> {
        self.sim.state().power(false);
        Ok(())
    }

    fn set_high(&mut self) -> Result<(), Self::Error> {
        self.sim.state().power(true);
        Ok(())
    }
}

/// Delay source driving the simulator's virtual clock
pub struct SimDelay {
    sim: Ia61xSim,
}

impl embedded_hal::delay::DelayNs for SimDelay {
    fn delay_ns(&mut self, ns: u32) {
        self.sim.state().advance(u64::from(ns));
    }
}

/// HOST_IRQ line of the simulator
pub struct SimIrq {
    sim: Ia61xSim,
}

impl EventLine for SimIrq {
    fn take_pending(&mut self) -> bool {
        std::mem::take(&mut self.sim.state().irq_pending)
    }
}
