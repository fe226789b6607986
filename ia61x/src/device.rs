//! # Device Handle
//!
//! Owns everything one IA61x session needs: the transport, the power line,
//! the delay source, the interrupt line and the download bookkeeping. The
//! application talks to the device only through this handle.
//!
//! ## Example
//!
//! ```ignore
//! static IRQ: IrqFlag = IrqFlag::new();
//!
//! let transport = Addressed::new(i2c);
//! let config = DeviceConfig::for_transport(TransportKind::Addressed);
//! let mut ia61x = Device::new(transport, ldo_enable, delay, &IRQ, config);
//!
//! ia61x.boot()?;
//! ia61x.download_config(SYSCONFIG)?;
//! ia61x.download_program(FIRMWARE)?;
//! ia61x.download_keyword(MODEL)?;
//! ia61x.start_voice_wake()?;
//! let event = ia61x.wait_keyword(10)?;
//! ```

use embedded_hal::delay::DelayNs;
use embedded_hal::digital::OutputPin;
use heapless::String;

use crate::boot::{BootState, ImageKind};
use crate::command::Engine;
use crate::config::DeviceConfig;
use crate::error::{Error, Result};
use crate::irq::EventLine;
use crate::rdb::ReadBlock;
use crate::transport::{Transport, TransportKind};
use crate::wdb::{DownloadState, ModelBlob};

/// Handle to one IA61x device
pub struct Device<T, P, D, E> {
    engine: Engine<T, D>,
    power: P,
    irq: E,
    downloads: DownloadState,
    state: BootState,
}

impl<T, P, D, E> Device<T, P, D, E>
where
    T: Transport,
    P: OutputPin,
    D: DelayNs,
    E: EventLine,
{
    /// Create an unbooted handle
    pub fn new(transport: T, power: P, delay: D, irq: E, config: DeviceConfig) -> Self {
        Self {
            engine: Engine::new(transport, delay, config),
            power,
            irq,
            downloads: DownloadState::default(),
            state: BootState::Unbooted,
        }
    }

    /// Power-cycle the device and run the interface handshake
    ///
    /// Can be repeated on the same handle; every successful boot starts a
    /// fresh download session.
    pub fn boot(&mut self) -> Result<()> {
        self.state = BootState::Unbooted;
        log::info!("boot: {:?} link", self.engine.kind());
        self.engine.boot_handshake(&mut self.power)?;
        self.downloads.reset();
        self.irq.clear();
        self.state = BootState::Ready;
        Ok(())
    }

    /// Current lifecycle state
    pub fn state(&self) -> BootState {
        self.state
    }

    /// Transport the handle was built with
    pub fn kind(&self) -> TransportKind {
        self.engine.kind()
    }

    /// Session configuration
    pub fn config(&self) -> &DeviceConfig {
        self.engine.config()
    }

    /// Completed keyword model downloads since the last boot
    pub fn download_counter(&self) -> u8 {
        self.downloads.counter
    }

    fn engine(&mut self) -> Result<&mut Engine<T, D>> {
        match self.state {
            BootState::Ready => Ok(&mut self.engine),
            BootState::Unbooted => Err(Error::NotReady),
        }
    }

    /// Upload the system configuration image
    pub fn download_config(&mut self, image: &[u8]) -> Result<()> {
        self.engine()?.download_image(image, ImageKind::Config)
    }

    /// Upload the firmware image, start it and arm the host interrupt
    pub fn download_program(&mut self, image: &[u8]) -> Result<()> {
        self.engine()?.download_image(image, ImageKind::Program)
    }

    /// Download a keyword model; returns the device's status byte
    pub fn download_keyword(&mut self, model: &[u8]) -> Result<u8> {
        let model = ModelBlob::new(model)?;
        let mut downloads = self.downloads;
        let status = self.engine()?.download_block(model, &mut downloads)?;
        self.downloads = downloads;
        Ok(status)
    }

    /// Arm the keyword detection route
    pub fn start_voice_wake(&mut self) -> Result<()> {
        self.engine()?.start_voice_wake()
    }

    /// Sleep until the device reports an event and return its code
    ///
    /// 0 means the interrupt carried no event.
    pub fn wait_keyword(&mut self, delay_ms: u32) -> Result<u8> {
        if self.state != BootState::Ready {
            return Err(Error::NotReady);
        }
        Ok(self.engine.wait_event(&mut self.irq, delay_ms))
    }

    /// Read a block of model `model_id` into `buf`
    pub fn read_block(&mut self, model_id: u8, block_type: u8, buf: &mut [u8]) -> Result<ReadBlock> {
        self.engine()?.read_block(model_id, block_type, buf)
    }

    /// Send an arbitrary command; see [`Engine::execute`]
    pub fn raw_command(&mut self, command: u16, data: u16, retries: u32) -> Result<u16> {
        self.engine()?.execute(command, data, retries)
    }

    /// Read raw bytes from the device
    pub fn raw_get(&mut self, buf: &mut [u8]) -> Result<()> {
        self.engine()?.get(buf)
    }

    /// Write raw bytes to the device
    pub fn raw_put(&mut self, bytes: &[u8]) -> Result<()> {
        self.engine()?.put(bytes)
    }

    /// Ping the firmware; 0 means it is running
    pub fn sync(&mut self) -> Result<u16> {
        self.engine()?.sync()
    }

    /// Store `value` in algorithm parameter `id`
    pub fn set_algo_param(&mut self, id: u16, value: u16) -> Result<()> {
        self.engine()?.set_algo_param(id, value)
    }

    /// Read back algorithm parameter `id`
    pub fn algo_param(&mut self, id: u16) -> Result<u16> {
        self.engine()?.algo_param(id)
    }

    /// Digital gain word of `endpoint`
    pub fn digital_gain(&mut self, endpoint: u16) -> Result<u16> {
        self.engine()?.digital_gain(endpoint)
    }

    /// Build string of the firmware (`algo_id` 0) or of an algorithm
    pub fn version_string<const N: usize>(&mut self, algo_id: u16) -> Result<String<N>> {
        self.engine()?.version_string(algo_id)
    }

    /// End the session; the device keeps running
    pub fn close(&mut self) -> Result<()> {
        self.engine()?;
        log::debug!("device closed");
        Ok(())
    }

    /// Hold the device in reset and give back the peripherals
    pub fn release(mut self) -> (T, P, D, E) {
        if self.power.set_low().is_err() {
            log::warn!("release: power line could not be driven low");
        }
        let (transport, delay, _) = self.engine.into_parts();
        (transport, self.power, delay, self.irq)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::{cmd, CommandFrame, SET_RATE_460800, SYNC_MARKER};
    use crate::status;
    use crate::testing::{CountdownLine, FakeDelay, FakePin, ScriptedTransport};

    type TestDevice = Device<ScriptedTransport, FakePin, FakeDelay, CountdownLine>;

    fn device(kind: TransportKind) -> TestDevice {
        Device::new(
            ScriptedTransport::new(kind),
            FakePin::default(),
            FakeDelay::default(),
            CountdownLine::after(0),
            DeviceConfig::for_transport(kind),
        )
    }

    fn booted(kind: TransportKind) -> TestDevice {
        let mut dev = device(kind);
        dev.engine.transport.queue(kind.sync_marker());
        if kind == TransportKind::Stream {
            dev.engine
                .transport
                .queue_gap()
                .queue(&SET_RATE_460800)
                .queue(&[SYNC_MARKER]);
        }
        dev.boot().unwrap();
        dev
    }

    #[test]
    fn test_operations_need_boot() {
        let mut dev = device(TransportKind::Addressed);
        assert_eq!(dev.state(), BootState::Unbooted);
        assert_eq!(dev.raw_command(cmd::SYNC, 0, 1), Err(Error::NotReady));
        assert_eq!(dev.download_keyword(&[0; 8]), Err(Error::NotReady));
        assert_eq!(dev.wait_keyword(0), Err(Error::NotReady));
        assert_eq!(status(&dev.close()), -9);
        assert!(dev.engine.transport.writes.is_empty());
    }

    #[test]
    fn test_boot_twice_resets_counter() {
        let mut dev = booted(TransportKind::Framed);
        dev.engine.transport.queue(&[0, 0, 0, 0]);
        dev.download_keyword(&[0, 0, 1, 0, 9, 9]).unwrap();
        assert_eq!(dev.download_counter(), 1);

        dev.engine.transport.queue(&[SYNC_MARKER; 4]);
        dev.boot().unwrap();
        assert_eq!(dev.state(), BootState::Ready);
        assert_eq!(dev.download_counter(), 0);
    }

    #[test]
    fn test_failed_boot_leaves_handle_unbooted() {
        let mut dev = booted(TransportKind::Addressed);
        dev.engine.transport.queue(&[0x00]);
        assert_eq!(dev.boot(), Err(Error::BootFailed));
        assert_eq!(dev.state(), BootState::Unbooted);
    }

    #[test]
    fn test_invalid_model_is_rejected_before_io() {
        let mut dev = booted(TransportKind::Addressed);
        let writes = dev.engine.transport.writes.len();
        assert_eq!(dev.download_keyword(&[1, 2, 3]), Err(Error::InvalidModel));
        assert_eq!(dev.engine.transport.writes.len(), writes);
    }

    #[test]
    fn test_wait_keyword_returns_event_code() {
        let mut dev = booted(TransportKind::Framed);
        dev.engine.transport.queue_frame(cmd::GET_EVENT_ID, 0x0004);
        assert_eq!(dev.wait_keyword(5), Ok(4));
    }

    #[test]
    fn test_raw_command_frames() {
        let mut dev = booted(TransportKind::Stream);
        assert_eq!(dev.raw_command(cmd::LOW_POWER_MODE, 1, 1), Ok(1));
        assert_eq!(
            dev.engine.transport.writes.last().unwrap(),
            &CommandFrame::new(cmd::LOW_POWER_MODE, 1).to_bytes()
        );
    }

    #[test]
    fn test_release_holds_device_in_reset() {
        let dev = booted(TransportKind::Addressed);
        let (_, pin, _, _) = dev.release();
        assert_eq!(pin.levels, [false, true, false]);
    }
}
