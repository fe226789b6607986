//! # Device Configuration
//!
//! Tunables for one IA61x session. The defaults reproduce the timing and
//! retry policy each host interface has always used with this device; an
//! application only overrides what its board needs (for example the wake
//! profile or the voice-ID enrollment mode).
//!
//! The configuration is serde-serializable and can be persisted in flash
//! with [`DeviceConfig::to_slice`] / [`DeviceConfig::from_bytes`].

use heapless::Vec;
use serde::{Deserialize, Serialize};

use crate::frame::data;
use crate::transport::{TransportKind, DEFAULT_ADDRESS, DEFAULT_RETRY_LIMIT};

/// Maximum number of algorithm parameters applied by a route setup
pub const MAX_ALGO_PARAMS: usize = 4;

/// Signal generated on HOST_IRQ after an event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u16)]
pub enum IrqEdge {
    LowLevel = 0x0001,
    FallingEdge = 0x0003,
    RisingEdge = 0x0004,
}

/// One algorithm parameter assignment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct AlgoParam {
    /// Parameter id
    pub id: u16,
    /// Value to store
    pub value: u16,
}

/// Explicit route configuration, step by step
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct RouteSetup {
    /// Digital gain word (gain in dB in the low byte, endpoint in the high byte)
    pub digital_gain: u16,
    /// Sample rate selector
    pub sample_rate: u16,
    /// Frame size in milliseconds
    pub frame_size: u16,
    /// Route number
    pub route: u16,
    /// Algorithm parameters applied after the route is selected
    pub algo_params: Vec<AlgoParam, MAX_ALGO_PARAMS>,
}

/// Parameters a default route setup applies
pub const DEFAULT_ALGO_PARAMS: [AlgoParam; 2] = [
    AlgoParam {
        id: data::OEM_SENSITIVITY_PARAM,
        value: 0x0005,
    },
    AlgoParam {
        id: data::VS_PROCESSING_MODE_PARAM,
        value: data::VS_PROCESSING_MODE_KW,
    },
];

impl Default for RouteSetup {
    fn default() -> Self {
        let algo_params = Vec::from_slice(&DEFAULT_ALGO_PARAMS).unwrap_or_default();
        Self {
            digital_gain: data::DIGITAL_GAIN_20,
            sample_rate: data::SAMPLE_RATE_16K,
            frame_size: data::FRAME_SIZE_16MS,
            route: data::ROUTE_6,
            algo_params,
        }
    }
}

/// How the detection route is (re)armed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum WakeProfile {
    /// Load a firmware preset in one command
    Preset(u16),
    /// Stop the route and configure it step by step
    Route(RouteSetup),
}

/// Configuration for one device session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct DeviceConfig {
    /// UART rate used for auto-detect
    pub boot_baud: u32,
    /// UART rate negotiated after auto-detect
    pub run_baud: u32,
    /// Delay before each response read, in milliseconds
    pub settle_ms: u32,
    /// Response reads for the WDB announcement (0 = do not read)
    pub announce_retries: u32,
    /// Delay after the WDB announcement, in microseconds
    pub announce_settle_us: u32,
    /// Response reads for the event id query
    pub event_retries: u32,
    /// Signal the device drives on HOST_IRQ
    pub irq_edge: IrqEdge,
    /// Route arming used by voice wake and after spurious events
    pub wake: WakeProfile,
    /// Voice-wake attempts; link is recycled between attempts
    pub wake_attempts: u8,
    /// Second model download is the voice-ID reference model
    pub voice_id_enrollment: bool,
    /// I2C slave address
    pub i2c_address: u8,
    /// I2C attempts per packet
    pub i2c_retry_limit: u16,
}

impl DeviceConfig {
    /// Defaults for a given host interface
    pub fn for_transport(kind: TransportKind) -> Self {
        let base = Self {
            boot_baud: 115_200,
            run_baud: 460_800,
            settle_ms: 5,
            announce_retries: 1,
            announce_settle_us: 100,
            event_retries: 1,
            irq_edge: IrqEdge::RisingEdge,
            wake: WakeProfile::Preset(2),
            wake_attempts: 1,
            voice_id_enrollment: false,
            i2c_address: DEFAULT_ADDRESS,
            i2c_retry_limit: DEFAULT_RETRY_LIMIT,
        };
        match kind {
            TransportKind::Stream => Self {
                settle_ms: 0,
                announce_settle_us: 0,
                wake_attempts: 2,
                ..base
            },
            TransportKind::Addressed => Self {
                event_retries: 2,
                wake: WakeProfile::Route(RouteSetup::default()),
                ..base
            },
            TransportKind::Framed => Self {
                announce_retries: 0,
                announce_settle_us: 5_000,
                ..base
            },
        }
    }

    /// Serialize with postcard into `buf`
    pub fn to_slice<'a>(&self, buf: &'a mut [u8]) -> Result<&'a mut [u8], postcard::Error> {
        postcard::to_slice(self, buf)
    }

    /// Deserialize a configuration previously written with [`to_slice`](Self::to_slice)
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, postcard::Error> {
        postcard::from_bytes(bytes)
    }
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self::for_transport(TransportKind::Stream)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stream_defaults() {
        let config = DeviceConfig::default();
        assert_eq!(config.settle_ms, 0);
        assert_eq!(config.wake_attempts, 2);
        assert_eq!(config.wake, WakeProfile::Preset(2));
    }

    #[test]
    fn test_addressed_defaults_use_route_setup() {
        let config = DeviceConfig::for_transport(TransportKind::Addressed);
        assert_eq!(config.event_retries, 2);
        match config.wake {
            WakeProfile::Route(route) => {
                assert_eq!(route.route, data::ROUTE_6);
                assert_eq!(route.algo_params.as_slice(), &DEFAULT_ALGO_PARAMS);
            }
            other => panic!("unexpected wake profile {:?}", other),
        }
    }

    #[test]
    fn test_framed_announce_is_not_answered() {
        let config = DeviceConfig::for_transport(TransportKind::Framed);
        assert_eq!(config.announce_retries, 0);
        assert_eq!(config.announce_settle_us, 5_000);
    }

    #[test]
    fn test_config_persists_through_postcard() {
        let mut config = DeviceConfig::for_transport(TransportKind::Addressed);
        config.voice_id_enrollment = true;
        config.irq_edge = IrqEdge::FallingEdge;

        let mut buf = [0u8; 128];
        let used = config.to_slice(&mut buf).unwrap().len();
        let restored = DeviceConfig::from_bytes(&buf[..used]).unwrap();
        assert_eq!(restored, config);
    }
}
