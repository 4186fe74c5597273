//! Board bindings for the controller HAL traits.
//!
//! Lamp drivers are push-pull outputs in catalog order; detectors are
//! pulled-up inputs that read low while a vehicle is present.

use core::future::Future;
use core::time::Duration;

use embassy_stm32::gpio::{Input, Output};
use embassy_time::{Instant, Timer};
use signal_core::hal::{Clock, HalError, InputBank, Level, OutputBank};
use signal_core::intersection::{InputChannel, OUTPUT_CHANNEL_COUNT, OutputChannel, SENSOR_COUNT};

pub struct GpioOutputs {
    pins: [Output<'static>; OUTPUT_CHANNEL_COUNT],
}

impl GpioOutputs {
    pub fn new(pins: [Output<'static>; OUTPUT_CHANNEL_COUNT]) -> Self {
        Self { pins }
    }
}

impl OutputBank for GpioOutputs {
    fn set_output(&mut self, channel: OutputChannel, level: Level) -> Result<(), HalError> {
        let pin = self
            .pins
            .get_mut(channel.as_index())
            .ok_or(HalError::OutputWrite(channel))?;
        match level {
            Level::High => pin.set_high(),
            Level::Low => pin.set_low(),
        }
        Ok(())
    }
}

pub struct GpioInputs {
    pins: [Input<'static>; SENSOR_COUNT],
}

impl GpioInputs {
    pub fn new(pins: [Input<'static>; SENSOR_COUNT]) -> Self {
        Self { pins }
    }
}

impl InputBank for GpioInputs {
    fn read_input(&self, channel: InputChannel) -> Result<Level, HalError> {
        self.pins
            .get(channel.as_index())
            .map(|pin| Level::from_high(pin.is_high()))
            .ok_or(HalError::InputRead(channel))
    }
}

/// Monotonic time from the embassy time driver.
pub struct EmbassyClock;

impl Clock for EmbassyClock {
    fn now(&self) -> Duration {
        Duration::from_micros(Instant::now().as_micros())
    }

    fn sleep(&self, duration: Duration) -> impl Future<Output = ()> {
        let micros = u64::try_from(duration.as_micros()).unwrap_or(u64::MAX);
        Timer::after(embassy_time::Duration::from_micros(micros))
    }
}
