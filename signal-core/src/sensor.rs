//! Detector debouncing.
//!
//! Loops chatter as vehicles roll across them; only an occupancy held for the
//! whole debounce window counts as demand.

use core::time::Duration;

use crate::hal::{Clock, HalError, InputBank, Level};
use crate::intersection::InputChannel;

/// Returns `true` once `channel` has read active (low) on every sample for
/// `window`, or `false` as soon as a sample reads inactive.
pub async fn sustained_low<I, C>(
    inputs: &I,
    clock: &C,
    channel: InputChannel,
    window: Duration,
    poll: Duration,
) -> Result<bool, HalError>
where
    I: InputBank + ?Sized,
    C: Clock + ?Sized,
{
    let started = clock.now();
    loop {
        if inputs.read_input(channel)?.is_high() {
            return Ok(false);
        }
        if clock.now().saturating_sub(started) >= window {
            return Ok(true);
        }
        clock.sleep(poll).await;
    }
}

/// Suspends until `channel` reads `level`, sampling every `poll`.
pub async fn wait_for_level<I, C>(
    inputs: &I,
    clock: &C,
    channel: InputChannel,
    level: Level,
    poll: Duration,
) -> Result<(), HalError>
where
    I: InputBank + ?Sized,
    C: Clock + ?Sized,
{
    while inputs.read_input(channel)? != level {
        clock.sleep(poll).await;
    }
    Ok(())
}

/// Sample-driven debouncer for loops that poll several things at once.
///
/// Feed it one observation per poll; it reports active once the input has
/// been seen active continuously for the window.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct Debouncer {
    window: Duration,
    active_since: Option<Duration>,
}

impl Debouncer {
    pub const fn new(window: Duration) -> Self {
        Self {
            window,
            active_since: None,
        }
    }

    pub fn observe(&mut self, now: Duration, active: bool) -> bool {
        if !active {
            self.active_since = None;
            return false;
        }
        let since = *self.active_since.get_or_insert(now);
        now.saturating_sub(since) >= self.window
    }

    /// Forgets any partially accumulated occupancy.
    pub fn reset(&mut self) {
        self.active_since = None;
    }

    /// How long the input has been continuously active, if it is.
    pub fn held_for(&self, now: Duration) -> Option<Duration> {
        self.active_since.map(|since| now.saturating_sub(since))
    }
}
