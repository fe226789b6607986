//! # IA61x Host Control Library
//!
//! Host side driver for the IA61x voice keyword coprocessor:
//!
//! - **Command/Response Engine**: 4-byte command frames with echo checking
//! - **Boot Sequencer**: power cycle, interface auto-detect, image upload
//! - **Block Download / Read**: keyword models in, result blocks out
//! - **Event Monitor**: interrupt driven keyword detection
//!
//! ## Architecture
//!
//! ```text
//!                      Device<T, P, D, E>
//!                             │
//!         ┌────────┬──────────┼──────────┬──────────┐
//!       boot      wdb        rdb       event      wake
//!         └────────┴──────────┼──────────┴──────────┘
//!                     Engine::execute
//!                             │
//!               Transport (TransportKind policy)
//!            ┌────────────────┼────────────────┐
//!          Stream          Addressed         Framed
//!     embedded-io UART    embedded-hal I2C  embedded-hal SPI
//! ```
//!
//! All waiting goes through an injected `DelayNs`, and the interrupt flag is
//! an [`IrqFlag`] owned by the caller, so one binary can drive several
//! devices over different links.

#![cfg_attr(not(any(feature = "std", test)), no_std)]

pub mod boot;
pub mod command;
pub mod config;
pub mod device;
pub mod error;
pub mod event;
pub mod frame;
pub mod irq;
pub mod rdb;
pub mod transport;
pub mod wake;
pub mod wdb;

#[cfg(test)]
mod testing;

// Re-export main types for convenience
pub use boot::{BootState, ImageKind};
pub use command::Engine;
pub use config::{AlgoParam, DeviceConfig, IrqEdge, RouteSetup, WakeProfile};
pub use device::Device;
pub use error::{status, Error, Result, STATUS_SUCCESS};
pub use event::NO_EVENT;
pub use frame::{cmd, CommandFrame};
pub use irq::{EventLine, IrqFlag};
pub use rdb::ReadBlock;
pub use transport::{Addressed, BaudRate, Framed, Stream, Transport, TransportKind};
pub use wdb::{DownloadState, ModelBlob};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
