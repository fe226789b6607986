//! I2C link over `embedded_hal::i2c`.

use embedded_hal::i2c::{Error as _, ErrorKind, I2c};

use super::{Transport, TransportKind};
use crate::config::DeviceConfig;
use crate::error::{Error, Result};

/// Slave address with ADD0 = ADD1 = 0
pub const DEFAULT_ADDRESS: u8 = 0x3E;

/// Attempts per packet before a transfer is reported as timed out
pub const DEFAULT_RETRY_LIMIT: u16 = 1000;

/// Addressed-packet transport on an I2C bus
///
/// The device NAKs while it is busy, so a NAKed packet is retried up to
/// `retry_limit` times before the transfer counts as a timeout. Any other
/// bus error fails the transfer at once.
pub struct Addressed<I> {
    i2c: I,
    address: u8,
    retry_limit: u16,
}

impl<I: I2c> Addressed<I> {
    /// Talk to the device at [`DEFAULT_ADDRESS`]
    pub fn new(i2c: I) -> Self {
        Self::with_address(i2c, DEFAULT_ADDRESS, DEFAULT_RETRY_LIMIT)
    }

    /// Talk to the device at a strapped address with a custom retry limit
    pub fn with_address(i2c: I, address: u8, retry_limit: u16) -> Self {
        Self {
            i2c,
            address,
            retry_limit,
        }
    }

    /// Use the address and retry limit of a device configuration
    pub fn from_config(i2c: I, config: &DeviceConfig) -> Self {
        Self::with_address(i2c, config.i2c_address, config.i2c_retry_limit)
    }

    /// Give back the bus
    pub fn release(self) -> I {
        self.i2c
    }
}

/// What to do with a failed transfer
enum Fault {
    /// Device busy, try again
    Busy,
    /// Retry limit reached while the device kept NAKing
    GaveUp,
    /// Bus level failure
    Bus,
}

impl<I: I2c> Addressed<I> {
    fn classify(&self, e: &I::Error, attempt: u16) -> Fault {
        match e.kind() {
            ErrorKind::NoAcknowledge(_) if attempt >= self.retry_limit => Fault::GaveUp,
            ErrorKind::NoAcknowledge(_) => Fault::Busy,
            kind => {
                log::debug!("i2c bus error: {:?}", kind);
                Fault::Bus
            }
        }
    }
}

impl<I: I2c> Transport for Addressed<I> {
    fn kind(&self) -> TransportKind {
        TransportKind::Addressed
    }

    fn put(&mut self, data: &[u8]) -> Result<()> {
        let mut attempt = 0;
        loop {
            let e = match self.i2c.write(self.address, data) {
                Ok(()) => return Ok(()),
                Err(e) => e,
            };
            match self.classify(&e, attempt) {
                Fault::Busy => attempt += 1,
                Fault::GaveUp => {
                    log::debug!("i2c write gave up after {} attempts", attempt + 1);
                    return Err(Error::Timeout);
                }
                Fault::Bus => return Err(Error::Bus),
            }
        }
    }

    fn get(&mut self, buf: &mut [u8]) -> Result<()> {
        let mut attempt = 0;
        loop {
            let e = match self.i2c.read(self.address, buf) {
                Ok(()) => return Ok(()),
                Err(e) => e,
            };
            match self.classify(&e, attempt) {
                Fault::Busy => attempt += 1,
                Fault::GaveUp => {
                    log::debug!("i2c read gave up after {} attempts", attempt + 1);
                    return Err(Error::Timeout);
                }
                Fault::Bus => return Err(Error::Bus),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::Engine;
    use crate::testing::FakeDelay;
    use crate::wdb::{DownloadState, ModelBlob};
    use embedded_hal::i2c::{ErrorType, NoAcknowledgeSource, Operation};
    use std::vec::Vec;

    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    struct BusError(ErrorKind);

    impl embedded_hal::i2c::Error for BusError {
        fn kind(&self) -> ErrorKind {
            self.0
        }
    }

    /// Bus that fails with a fixed error kind after `ok_ops` operations
    ///
    /// Reads that go through return zeros.
    struct FaultyBus {
        fault: ErrorKind,
        ok_ops: usize,
        transfers: usize,
        written: Vec<Vec<u8>>,
    }

    impl FaultyBus {
        fn new(fault: ErrorKind, ok_ops: usize) -> Self {
            Self {
                fault,
                ok_ops,
                transfers: 0,
                written: Vec::new(),
            }
        }
    }

    impl ErrorType for FaultyBus {
        type Error = BusError;
    }

    impl I2c for FaultyBus {
        fn transaction(
            &mut self,
            _address: u8,
            operations: &mut [Operation<'_>],
        ) -> core::result::Result<(), Self::Error> {
            self.transfers += 1;
            for op in operations {
                if self.ok_ops == 0 {
                    return Err(BusError(self.fault));
                }
                self.ok_ops -= 1;
                match op {
                    Operation::Write(bytes) => self.written.push(bytes.to_vec()),
                    Operation::Read(buf) => buf.fill(0),
                }
            }
            Ok(())
        }
    }

    fn nack() -> ErrorKind {
        ErrorKind::NoAcknowledge(NoAcknowledgeSource::Address)
    }

    #[test]
    fn test_nack_is_retried_until_timeout() {
        let mut link = Addressed::with_address(FaultyBus::new(nack(), 0), DEFAULT_ADDRESS, 3);
        assert_eq!(link.put(&[0xB7]), Err(Error::Timeout));
        assert_eq!(link.release().transfers, 4);
    }

    #[test]
    fn test_bus_fault_is_not_a_timeout() {
        let mut link = Addressed::with_address(FaultyBus::new(ErrorKind::Bus, 0), DEFAULT_ADDRESS, 3);
        assert_eq!(link.put(&[0xB7]), Err(Error::Bus));

        let mut buf = [0u8; 4];
        assert_eq!(link.get(&mut buf), Err(Error::Bus));
        assert_eq!(link.release().transfers, 2);
    }

    #[test]
    fn test_arbitration_loss_is_a_bus_error() {
        let mut link = Addressed::new(FaultyBus::new(ErrorKind::ArbitrationLoss, 0));
        let mut buf = [0u8; 1];
        assert_eq!(link.get(&mut buf), Err(Error::Bus));
    }

    #[test]
    fn test_write_fault_aborts_keyword_download() {
        let config = DeviceConfig::for_transport(TransportKind::Addressed);
        // announce write, unanswered announce read, then the four parts of block 0
        let link = Addressed::from_config(FaultyBus::new(ErrorKind::Bus, 6), &config);
        let mut engine = Engine::new(link, FakeDelay::default(), config);

        let mut model = std::vec![0x00, 0x00, 0x05, 0x00];
        model.resize(1200, 0x11);
        let mut state = DownloadState::default();
        let err = engine
            .download_block(ModelBlob::new(&model).unwrap(), &mut state)
            .unwrap_err();
        assert_eq!(err, Error::Bus);
        assert_eq!(crate::status(&Err::<(), _>(err)), -4);
        assert_eq!(state.counter, 0);

        let (link, _, _) = engine.into_parts();
        assert_eq!(link.release().written.len(), 5);
    }

    #[test]
    fn test_bus_fault_during_announce_aborts() {
        let config = DeviceConfig::for_transport(TransportKind::Addressed);
        let link = Addressed::from_config(FaultyBus::new(ErrorKind::Bus, 0), &config);
        let mut engine = Engine::new(link, FakeDelay::default(), config);

        let model = [0x00, 0x00, 0x05, 0x00, 0x11, 0x22];
        let mut state = DownloadState::default();
        assert_eq!(
            engine.download_block(ModelBlob::new(&model).unwrap(), &mut state),
            Err(Error::Bus)
        );
    }
}
