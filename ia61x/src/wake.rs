//! # Voice Wake
//!
//! (Re)arms the keyword detection route. Two profiles exist: a firmware
//! preset loaded with one command, or an explicit route set up step by step.
//! Each failed step is counted; any count makes the attempt fail.

use embedded_hal::delay::DelayNs;

use crate::command::Engine;
use crate::config::{RouteSetup, WakeProfile};
use crate::error::{Error, Result};
use crate::frame::{cmd, data, CMD_NO_RESP_MASK};
use crate::transport::{Transport, TransportKind};

const STEP_DELAY_MS: u32 = 1;
const STOP_ROUTE_RETRIES: u32 = 5;
const SET_PRESET_RETRIES: u32 = 5;

/// Settle time before the UART link is reused after a failed attempt
const LINK_RECYCLE_MS: u32 = 1_000;

impl<T: Transport, D: DelayNs> Engine<T, D> {
    /// Arm the detection route with the configured wake profile
    pub fn start_voice_wake(&mut self) -> Result<()> {
        let attempts = self.config.wake_attempts.max(1);
        let mut errors = 0;

        for attempt in 0..attempts {
            if attempt > 0 {
                log::debug!("wake: attempt {} failed with {} error(s), recycling link", attempt, errors);
                self.recycle_link()?;
            }

            errors = match self.config.wake.clone() {
                WakeProfile::Preset(preset) => self.wake_preset(preset),
                WakeProfile::Route(route) => self.wake_route(&route),
            };
            if errors == 0 {
                log::debug!("wake: route armed");
                return Ok(());
            }
        }

        log::warn!("wake: {} step(s) failed", errors);
        Err(Error::WakeFailed { errors })
    }

    fn recycle_link(&mut self) -> Result<()> {
        self.delay.delay_ms(LINK_RECYCLE_MS);
        self.transport.set_baud_rate(self.config.run_baud)?;
        self.delay.delay_ms(STEP_DELAY_MS);
        Ok(())
    }

    fn wake_preset(&mut self, preset: u16) -> u32 {
        let stream = self.kind() == TransportKind::Stream;

        // The UART link must answer SYNC; elsewhere it only wakes the device.
        if self.sync().is_err() && stream {
            return 1;
        }
        self.delay.delay_ms(STEP_DELAY_MS);

        let result = if stream {
            self.expect_echo(cmd::SET_PRESET | CMD_NO_RESP_MASK, preset, 1)
        } else {
            self.expect_echo(cmd::SET_PRESET, preset, SET_PRESET_RETRIES)
        };
        if result.is_err() {
            return 1;
        }
        self.delay.delay_ms(STEP_DELAY_MS);
        0
    }

    fn wake_route(&mut self, route: &RouteSetup) -> u32 {
        let _ = self.sync();
        self.delay.delay_ms(STEP_DELAY_MS);

        let steps = [
            (cmd::STOP_ROUTE, data::EMPTY, STOP_ROUTE_RETRIES),
            (cmd::SET_DIGITAL_GAIN, route.digital_gain, 1),
            (cmd::SAMPLE_RATE, route.sample_rate, 1),
            (cmd::FRAME_SIZE, route.frame_size, 1),
            (cmd::SELECT_ROUTE, route.route, 1),
        ];

        let mut errors = 0;
        for (command, value, retries) in steps {
            if let Err(e) = self.expect_echo(command, value, retries) {
                log::debug!("wake: step {:04x} failed: {}", command, e);
                errors += 1;
            }
            self.delay.delay_ms(STEP_DELAY_MS);
        }
        for param in &route.algo_params {
            if let Err(e) = self.set_algo_param(param.id, param.value) {
                log::debug!("wake: algo param {:04x} failed: {}", param.id, e);
                errors += 1;
            }
            self.delay.delay_ms(STEP_DELAY_MS);
        }
        errors
    }
}
