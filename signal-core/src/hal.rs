//! Hardware access seams consumed by the sequencing core.
//!
//! Firmware binds these traits to Embassy GPIO and timers; the emulator and the
//! integration tests bind them to the virtual-time bench in [`crate::sim`].

use core::{fmt, future::Future, time::Duration};

use crate::intersection::{InputChannel, OutputChannel};

/// Electrical level of a digital line.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Level {
    Low,
    High,
}

impl Level {
    pub const fn from_high(high: bool) -> Self {
        if high { Level::High } else { Level::Low }
    }

    pub const fn is_low(self) -> bool {
        matches!(self, Level::Low)
    }

    pub const fn is_high(self) -> bool {
        matches!(self, Level::High)
    }
}

/// I/O failures surfaced by a bank. Any of these is a safety fault.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum HalError {
    OutputWrite(OutputChannel),
    InputRead(InputChannel),
}

impl fmt::Display for HalError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HalError::OutputWrite(channel) => write!(f, "failed to drive output {channel}"),
            HalError::InputRead(channel) => write!(f, "failed to sample input {channel}"),
        }
    }
}

impl core::error::Error for HalError {}

/// Lamp outputs. Owned by [`crate::signal::SignalHeads`], which serialises
/// access.
pub trait OutputBank {
    fn set_output(&mut self, channel: OutputChannel, level: Level) -> Result<(), HalError>;
}

/// Detector inputs.
pub trait InputBank {
    fn read_input(&self, channel: InputChannel) -> Result<Level, HalError>;
}

/// Monotonic time source.
pub trait Clock {
    /// Time elapsed since an arbitrary fixed origin (typically boot).
    fn now(&self) -> Duration;

    /// Suspends the caller for at least `duration`.
    fn sleep(&self, duration: Duration) -> impl Future<Output = ()>;
}

impl<T: OutputBank + ?Sized> OutputBank for &mut T {
    fn set_output(&mut self, channel: OutputChannel, level: Level) -> Result<(), HalError> {
        (**self).set_output(channel, level)
    }
}

/// Output bank that accepts every write; useful for dry runs.
#[derive(Default)]
pub struct NoopOutputBank;

impl NoopOutputBank {
    pub const fn new() -> Self {
        Self
    }
}

impl OutputBank for NoopOutputBank {
    fn set_output(&mut self, _channel: OutputChannel, _level: Level) -> Result<(), HalError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn level_helpers_agree() {
        assert!(Level::from_high(false).is_low());
        assert!(Level::from_high(true).is_high());
        assert!(!Level::Low.is_high());
    }

    #[test]
    fn errors_name_the_channel() {
        let mut text: heapless::String<48> = heapless::String::new();
        core::fmt::write(&mut text, format_args!("{}", HalError::InputRead(InputChannel(4))))
            .expect("fits");
        assert_eq!(text.as_str(), "failed to sample input in4");
    }
}
