//! Caution flash for turn lanes.
//!
//! Each lane owns one long-lived worker future parked on a start signal.
//! [`FlashSupervisor`] tracks whether that worker is flashing, so a lane never
//! has two flashers, and gives the turn handler a stop-and-join handshake:
//! the lane is back at solid red by the time `stop_flasher` returns.

use core::{convert::Infallible, fmt};

use embassy_futures::select::{Either, select};
use embassy_sync::{blocking_mutex::raw::RawMutex, signal::Signal};
use portable_atomic::{AtomicBool, Ordering};

use crate::controller::{Controller, ControllerError};
use crate::hal::{Clock, HalError, InputBank, OutputBank};
use crate::intersection::{MovementId, TURN_LANE_COUNT, TurnLaneId, lanes_shadowing, turn_lane_by_id};
use crate::signal::Aspect;
use crate::telemetry::{EventSink, TelemetryEventKind};

/// Why a flasher returned its lane to solid red.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum FlashExit {
    /// The flashing flag was cleared.
    Stopped,
    /// The shadowed movement is no longer green.
    ShadowLeftGreen,
}

impl fmt::Display for FlashExit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            FlashExit::Stopped => "stopped",
            FlashExit::ShadowLeftGreen => "shadowed movement left green",
        })
    }
}

struct FlashSlot<M: RawMutex> {
    alive: AtomicBool,
    start: Signal<M, ()>,
    stop: Signal<M, ()>,
    exited: Signal<M, ()>,
}

impl<M: RawMutex> FlashSlot<M> {
    const fn new() -> Self {
        Self {
            alive: AtomicBool::new(false),
            start: Signal::new(),
            stop: Signal::new(),
            exited: Signal::new(),
        }
    }
}

/// At most one live flasher per lane.
pub struct FlashSupervisor<M: RawMutex> {
    slots: [FlashSlot<M>; TURN_LANE_COUNT],
}

impl<M: RawMutex> FlashSupervisor<M> {
    pub fn new() -> Self {
        Self {
            slots: core::array::from_fn(|_| FlashSlot::new()),
        }
    }

    /// True from spawn until the worker has left the lane at solid red.
    pub fn is_alive(&self, lane: TurnLaneId) -> bool {
        self.slot(lane).alive.load(Ordering::Acquire)
    }

    fn slot(&self, lane: TurnLaneId) -> &FlashSlot<M> {
        &self.slots[lane.as_index()]
    }
}

impl<M: RawMutex> Default for FlashSupervisor<M> {
    fn default() -> Self {
        Self::new()
    }
}

impl<M, O, I, C, E> Controller<'_, M, O, I, C, E>
where
    M: RawMutex,
    O: OutputBank,
    I: InputBank,
    C: Clock,
    E: EventSink,
{
    /// Starts flashing `lane`. Does nothing and returns `false` while a flasher
    /// for the lane is still alive.
    pub fn spawn_flasher(&self, lane: TurnLaneId) -> bool {
        let slot = self.flashers.slot(lane);
        if slot.alive.swap(true, Ordering::AcqRel) {
            return false;
        }
        slot.stop.reset();
        slot.exited.reset();
        self.coordination.set_flashing_active(lane, true);
        slot.start.signal(());
        self.emit(TelemetryEventKind::FlashingStarted(lane));
        true
    }

    /// Asks the lane's flasher to wind down without waiting for it.
    pub fn request_flasher_stop(&self, lane: TurnLaneId) {
        self.coordination.set_flashing_active(lane, false);
        self.flashers.slot(lane).stop.signal(());
    }

    /// Stops the lane's flasher and waits until it has left the lane at solid
    /// red.
    pub async fn stop_flasher(&self, lane: TurnLaneId) {
        let slot = self.flashers.slot(lane);
        if !slot.alive.load(Ordering::Acquire) {
            return;
        }
        self.request_flasher_stop(lane);
        slot.exited.wait().await;
    }

    pub(crate) fn spawn_flashers_for(&self, movement: MovementId) {
        for lane in lanes_shadowing(movement) {
            self.spawn_flasher(lane.id);
        }
    }

    pub(crate) async fn retire_flashers_for(&self, movement: MovementId) {
        for lane in lanes_shadowing(movement) {
            self.stop_flasher(lane.id).await;
        }
    }

    /// Body of the lane's flasher task. Only returns on a lamp fault.
    pub(crate) async fn flasher_worker(
        &self,
        lane: TurnLaneId,
    ) -> Result<Infallible, ControllerError> {
        let slot = self.flashers.slot(lane);
        let head = turn_lane_by_id(lane).head;
        loop {
            slot.start.wait().await;
            let exit = self.flash(lane).await?;
            self.heads.set_aspect(head, Aspect::Red)?;
            self.coordination.set_flashing_active(lane, false);
            slot.alive.store(false, Ordering::Release);
            slot.exited.signal(());
            self.emit(TelemetryEventKind::FlashingStopped { lane, exit });
        }
    }

    async fn flash(&self, lane: TurnLaneId) -> Result<FlashExit, HalError> {
        let slot = self.flashers.slot(lane);
        let lane = turn_lane_by_id(lane);
        let half_period = self.config.timing.flash_half_period;
        let mut lit = false;
        loop {
            if !self.coordination.flashing_active(lane.id) {
                return Ok(FlashExit::Stopped);
            }
            if self.heads.movement_aspect(lane.shadows) != Aspect::Green {
                return Ok(FlashExit::ShadowLeftGreen);
            }
            lit = !lit;
            let aspect = if lit { Aspect::Yellow } else { Aspect::Dark };
            self.heads.set_aspect(lane.head, aspect)?;
            if let Either::Second(()) = select(self.clock.sleep(half_period), slot.stop.wait()).await
            {
                return Ok(FlashExit::Stopped);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use core::pin::pin;
    use core::time::Duration;

    use embassy_sync::blocking_mutex::raw::NoopRawMutex;

    use super::*;
    use crate::intersection::SignalGroupId;
    use crate::sim::{self, SimClock, SimInputs, SimOutputs};
    use crate::telemetry::NoopEventSink;
    use crate::timing::IntersectionConfig;

    #[test]
    fn spawn_is_ignored_while_alive() {
        let clock = SimClock::new();
        let outputs = SimOutputs::new();
        let inputs = SimInputs::new();
        let controller: Controller<'_, NoopRawMutex, _, _, _, _> = Controller::new(
            IntersectionConfig::default(),
            &outputs,
            &inputs,
            &clock,
            &NoopEventSink,
        )
        .expect("valid config");

        assert!(controller.spawn_flasher(TurnLaneId::TechTurn));
        assert!(!controller.spawn_flasher(TurnLaneId::TechTurn));
        assert!(controller.flashers.is_alive(TurnLaneId::TechTurn));
        assert!(controller.coordination.flashing_active(TurnLaneId::TechTurn));
    }

    #[test]
    fn flasher_toggles_yellow_and_stops_on_request() {
        let clock = SimClock::new();
        let outputs = SimOutputs::new();
        let inputs = SimInputs::new();
        let controller: Controller<'_, NoopRawMutex, _, _, _, _> = Controller::new(
            IntersectionConfig::default(),
            &outputs,
            &inputs,
            &clock,
            &NoopEventSink,
        )
        .expect("valid config");
        controller
            .heads
            .set_movement(MovementId::CrossStreet, Aspect::Green)
            .expect("write");
        controller.spawn_flasher(TurnLaneId::MartinTurn);

        let mut worker = pin!(controller.flasher_worker(TurnLaneId::MartinTurn));
        let mut yellow = 0;
        let mut dark = 0;
        let poll = sim::advance(&clock, worker.as_mut(), Duration::from_secs(2), |_| {
            match controller.heads.aspect(SignalGroupId::MartinTurn) {
                Aspect::Yellow => yellow += 1,
                Aspect::Dark => dark += 1,
                other => panic!("unexpected aspect {other} while flashing"),
            }
        });
        assert!(poll.is_pending());
        assert!(yellow > 0 && dark > 0, "lane should blink");

        controller.request_flasher_stop(TurnLaneId::MartinTurn);
        let _ = sim::advance(&clock, worker.as_mut(), Duration::ZERO, |_| {});
        assert_eq!(controller.heads.aspect(SignalGroupId::MartinTurn), Aspect::Red);
        assert!(!controller.flashers.is_alive(TurnLaneId::MartinTurn));
        assert!(!controller.coordination.flashing_active(TurnLaneId::MartinTurn));
    }

    #[test]
    fn flasher_exits_when_shadow_leaves_green() {
        let clock = SimClock::new();
        let outputs = SimOutputs::new();
        let inputs = SimInputs::new();
        let controller: Controller<'_, NoopRawMutex, _, _, _, _> = Controller::new(
            IntersectionConfig::default(),
            &outputs,
            &inputs,
            &clock,
            &NoopEventSink,
        )
        .expect("valid config");
        controller
            .heads
            .set_movement(MovementId::Artery, Aspect::Green)
            .expect("write");
        controller.spawn_flasher(TurnLaneId::Westbound120Turn);

        let mut worker = pin!(controller.flasher_worker(TurnLaneId::Westbound120Turn));
        let _ = sim::advance(&clock, worker.as_mut(), Duration::from_secs(1), |_| {});
        controller
            .heads
            .set_movement(MovementId::Artery, Aspect::Yellow)
            .expect("write");
        let _ = sim::advance(&clock, worker.as_mut(), Duration::from_secs(1), |_| {});

        assert_eq!(
            controller.heads.aspect(SignalGroupId::Westbound120Turn),
            Aspect::Red
        );
        assert!(!controller.flashers.is_alive(TurnLaneId::Westbound120Turn));
        assert!(controller.spawn_flasher(TurnLaneId::Westbound120Turn), "slot is free again");
    }
}
