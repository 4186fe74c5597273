//! Virtual-time bench for running the controller off hardware.
//!
//! Futures are polled with a no-op waker and virtual time advances in fixed
//! quanta between poll rounds, so a whole cycle of the intersection runs in
//! microseconds and every run is reproducible. The emulator and the
//! integration tests both drive the controller through [`advance`].

use core::{
    cell::{Cell, RefCell},
    future::Future,
    pin::{Pin, pin},
    task::{Context, Poll, Waker},
    time::Duration,
};

use crate::hal::{Clock, HalError, InputBank, Level, OutputBank};
use crate::intersection::{
    InputChannel, OUTPUT_CHANNEL_COUNT, OutputChannel, SENSOR_COUNT, SensorId,
};

/// Virtual time step between poll rounds.
pub const QUANTUM: Duration = Duration::from_millis(10);

#[derive(Default)]
pub struct SimClock {
    now: Cell<Duration>,
}

impl SimClock {
    pub const fn new() -> Self {
        Self {
            now: Cell::new(Duration::ZERO),
        }
    }

    pub fn advance_by(&self, span: Duration) {
        self.now.set(self.now.get() + span);
    }
}

impl Clock for SimClock {
    fn now(&self) -> Duration {
        self.now.get()
    }

    fn sleep(&self, duration: Duration) -> impl Future<Output = ()> {
        SimSleep {
            clock: self,
            deadline: self.now.get() + duration,
        }
    }
}

/// Completes once virtual time reaches its deadline.
pub struct SimSleep<'a> {
    clock: &'a SimClock,
    deadline: Duration,
}

impl Future for SimSleep<'_> {
    type Output = ();

    fn poll(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<()> {
        if self.clock.now.get() >= self.deadline {
            Poll::Ready(())
        } else {
            Poll::Pending
        }
    }
}

/// Output bank that remembers every level and can be told to fail.
pub struct SimOutputs {
    levels: RefCell<[Level; OUTPUT_CHANNEL_COUNT]>,
    writes: Cell<usize>,
    failing: Cell<Option<OutputChannel>>,
}

impl SimOutputs {
    pub const fn new() -> Self {
        Self {
            levels: RefCell::new([Level::Low; OUTPUT_CHANNEL_COUNT]),
            writes: Cell::new(0),
            failing: Cell::new(None),
        }
    }

    pub fn level(&self, channel: OutputChannel) -> Level {
        self.levels
            .borrow()
            .get(channel.as_index())
            .copied()
            .unwrap_or(Level::Low)
    }

    /// Number of successful writes so far.
    pub fn writes(&self) -> usize {
        self.writes.get()
    }

    /// Makes every write to `channel` fail; `None` heals the bank.
    pub fn fail_channel(&self, channel: Option<OutputChannel>) {
        self.failing.set(channel);
    }
}

impl Default for SimOutputs {
    fn default() -> Self {
        Self::new()
    }
}

impl OutputBank for &SimOutputs {
    fn set_output(&mut self, channel: OutputChannel, level: Level) -> Result<(), HalError> {
        if self.failing.get() == Some(channel) {
            return Err(HalError::OutputWrite(channel));
        }
        let mut levels = self.levels.borrow_mut();
        let slot = levels
            .get_mut(channel.as_index())
            .ok_or(HalError::OutputWrite(channel))?;
        *slot = level;
        self.writes.set(self.writes.get() + 1);
        Ok(())
    }
}

/// Detector inputs; every sensor idles high (unoccupied).
pub struct SimInputs {
    levels: RefCell<[Level; SENSOR_COUNT]>,
    failing: Cell<bool>,
}

impl SimInputs {
    pub const fn new() -> Self {
        Self {
            levels: RefCell::new([Level::High; SENSOR_COUNT]),
            failing: Cell::new(false),
        }
    }

    /// Occupies (`true`) or clears a detector.
    pub fn set_active(&self, sensor: SensorId, active: bool) {
        self.levels.borrow_mut()[sensor.as_index()] = Level::from_high(!active);
    }

    pub fn is_active(&self, sensor: SensorId) -> bool {
        self.levels.borrow()[sensor.as_index()].is_low()
    }

    /// Makes every read fail.
    pub fn fail_reads(&self, failing: bool) {
        self.failing.set(failing);
    }
}

impl Default for SimInputs {
    fn default() -> Self {
        Self::new()
    }
}

impl InputBank for SimInputs {
    fn read_input(&self, channel: InputChannel) -> Result<Level, HalError> {
        if self.failing.get() {
            return Err(HalError::InputRead(channel));
        }
        self.levels
            .borrow()
            .get(channel.as_index())
            .copied()
            .ok_or(HalError::InputRead(channel))
    }
}

/// Polls `future` and advances virtual time until it completes or `span` has
/// elapsed. `observe` runs after every poll round with the current time, which
/// makes it the place to assert invariants over every reachable state.
pub fn advance<F>(
    clock: &SimClock,
    mut future: Pin<&mut F>,
    span: Duration,
    mut observe: impl FnMut(Duration),
) -> Poll<F::Output>
where
    F: Future + ?Sized,
{
    let mut cx = Context::from_waker(Waker::noop());
    let end = clock.now() + span;
    loop {
        if let Poll::Ready(output) = future.as_mut().poll(&mut cx) {
            return Poll::Ready(output);
        }
        observe(clock.now());
        if clock.now() >= end {
            return Poll::Pending;
        }
        clock.advance_by(QUANTUM);
    }
}

/// Runs `future` to completion unless `limit` of virtual time passes first.
pub fn run_until<F: Future>(clock: &SimClock, future: F, limit: Duration) -> Option<F::Output> {
    let future = pin!(future);
    match advance(clock, future, limit, |_| {}) {
        Poll::Ready(output) => Some(output),
        Poll::Pending => None,
    }
}
