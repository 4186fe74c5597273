//! Main cycle: green, clearance, next movement, forever.
//!
//! A green ends at the first of three things:
//! - a stop-bar call from the next movement debounces,
//! - the queue grace runs out after the next movement's queue loops have been
//!   held for the debounce window,
//! - the movement's max green elapses.
//!
//! While a turn grant runs, the wait clock, both debouncers and any pending
//! queue cut are dropped, so the grant neither eats into the green nor
//! triggers an early hand-off.

use core::{convert::Infallible, fmt, time::Duration};

use embassy_sync::blocking_mutex::raw::RawMutex;

use crate::controller::{Controller, ControllerError};
use crate::hal::{Clock, HalError, InputBank, OutputBank};
use crate::intersection::{MovementId, SensorId, movement_by_id, sensor_by_id};
use crate::sensor::Debouncer;
use crate::signal::Aspect;
use crate::telemetry::{EventSink, TelemetryEventKind};

/// Why a green phase ended.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum PhaseExit {
    /// A stop-bar call from the next movement debounced.
    Demand,
    /// The queue grace after a standing queue on the next movement ran out.
    QueueCut,
    /// Max green elapsed.
    MaxGreen,
}

impl fmt::Display for PhaseExit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            PhaseExit::Demand => "demand",
            PhaseExit::QueueCut => "queue",
            PhaseExit::MaxGreen => "max green",
        })
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
    pub(crate) async fn run_cycle(&self) -> Result<Infallible, ControllerError> {
        let mut movement = self.config.initial_movement;
        loop {
            let exit = self.hold_green(movement).await?;
            self.emit(TelemetryEventKind::PhaseEnded { movement, exit });

            let next = movement.next();
            {
                let _authority = self.authority.lock().await;
                self.clear_movement(movement).await?;
                self.grant_movement(next)?;
            }
            movement = next;
        }
    }

    /// Waits out the green of `movement`.
    pub async fn hold_green(&self, movement: MovementId) -> Result<PhaseExit, HalError> {
        let timing = self.config.timing;
        let max_green = timing.movement(movement).max_green;
        let next = movement.next();
        let mut call = Debouncer::new(timing.debounce_window);
        let mut queue = Debouncer::new(timing.debounce_window);
        let mut queue_cut: Option<Duration> = None;
        let mut started = self.clock.now();
        let mut held = false;

        loop {
            self.clock.sleep(timing.poll_interval).await;
            let now = self.clock.now();

            if self.coordination.turn_in_progress() {
                if !held {
                    self.emit(TelemetryEventKind::WaitClockHeld(movement));
                    held = true;
                }
                started = now;
                call.reset();
                queue.reset();
                queue_cut = None;
                continue;
            }
            held = false;

            if now.saturating_sub(started) >= max_green {
                return Ok(PhaseExit::MaxGreen);
            }
            if call.observe(now, self.demand_present(next)?) {
                return Ok(PhaseExit::Demand);
            }
            match queue_cut {
                Some(deadline) if now >= deadline => return Ok(PhaseExit::QueueCut),
                Some(_) => {}
                None => {
                    if queue.observe(now, self.queue_present(next)?) {
                        let grace = timing.queue_grace(movement);
                        queue_cut = Some(now + grace);
                        self.emit(TelemetryEventKind::QueueCutScheduled {
                            movement,
                            queued: next,
                            grace,
                        });
                    }
                }
            }
        }
    }

    /// True if any stop-bar detector of `movement` is occupied.
    pub fn demand_present(&self, movement: MovementId) -> Result<bool, HalError> {
        self.any_occupied(movement_by_id(movement).stop_sensors)
    }

    /// True if any queue detector of `movement` is occupied.
    pub fn queue_present(&self, movement: MovementId) -> Result<bool, HalError> {
        self.any_occupied(movement_by_id(movement).queue_sensors)
    }

    fn any_occupied(&self, sensors: &[SensorId]) -> Result<bool, HalError> {
        for sensor in sensors {
            if self.inputs.read_input(sensor_by_id(*sensor).channel)?.is_low() {
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// Takes `movement` from green to red: retire the flashers that shadow it,
    /// yellow, then red for the all-red clearance. Caller holds the authority
    /// lock.
    pub(crate) async fn clear_movement(&self, movement: MovementId) -> Result<(), HalError> {
        let timing = self.config.timing.movement(movement);
        self.retire_flashers_for(movement).await;

        self.heads.set_movement(movement, Aspect::Yellow)?;
        self.emit(TelemetryEventKind::ClearanceYellow(movement));
        self.clock.sleep(timing.yellow).await;

        self.heads.set_movement(movement, Aspect::Red)?;
        self.emit(TelemetryEventKind::ClearanceAllRed(movement));
        self.clock.sleep(timing.all_red).await;
        Ok(())
    }

    /// Gives `movement` green and starts the flashers that shadow it. Caller
    /// holds the authority lock.
    pub(crate) fn grant_movement(&self, movement: MovementId) -> Result<(), HalError> {
        self.heads.set_movement(movement, Aspect::Green)?;
        self.emit(TelemetryEventKind::PhaseGreen(movement));
        self.spawn_flashers_for(movement);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use embassy_sync::blocking_mutex::raw::NoopRawMutex;

    use super::*;
    use crate::sim::{self, SimClock, SimInputs, SimOutputs};
    use crate::telemetry::NoopEventSink;
    use crate::timing::IntersectionConfig;

    #[test]
    fn stop_bars_call_and_queue_loops_report_queues() {
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

        assert_eq!(controller.demand_present(MovementId::CrossStreet), Ok(false));
        inputs.set_active(SensorId::TechQueue, true);
        assert_eq!(controller.demand_present(MovementId::CrossStreet), Ok(false));
        assert_eq!(controller.queue_present(MovementId::CrossStreet), Ok(true));

        inputs.set_active(SensorId::TechStop, true);
        assert_eq!(controller.demand_present(MovementId::CrossStreet), Ok(true));
        assert_eq!(controller.demand_present(MovementId::Artery), Ok(false));
        assert_eq!(controller.queue_present(MovementId::Artery), Ok(false));
    }

    #[test]
    fn green_times_out_without_demand() {
        let clock = SimClock::new();
        let outputs = SimOutputs::new();
        let inputs = SimInputs::new();
        let mut config = IntersectionConfig::default();
        config.timing.movement_mut(MovementId::Artery).max_green = Duration::from_secs(10);
        let controller: Controller<'_, NoopRawMutex, _, _, _, _> =
            Controller::new(config, &outputs, &inputs, &clock, &NoopEventSink)
                .expect("valid config");

        let exit = sim::run_until(
            &clock,
            controller.hold_green(MovementId::Artery),
            Duration::from_secs(20),
        );
        assert_eq!(exit, Some(Ok(PhaseExit::MaxGreen)));
        assert_eq!(clock.now(), Duration::from_secs(10));
    }

    #[test]
    fn brief_demand_does_not_end_green() {
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

        let mut green = core::pin::pin!(controller.hold_green(MovementId::Artery));
        inputs.set_active(SensorId::MartinStop, true);
        assert!(sim::advance(&clock, green.as_mut(), Duration::from_secs(3), |_| {}).is_pending());
        inputs.set_active(SensorId::MartinStop, false);
        assert!(sim::advance(&clock, green.as_mut(), Duration::from_secs(10), |_| {}).is_pending());

        inputs.set_active(SensorId::MartinStop, true);
        let exit = sim::advance(&clock, green.as_mut(), Duration::from_secs(10), |_| {});
        assert_eq!(exit, core::task::Poll::Ready(Ok(PhaseExit::Demand)));
    }

    #[test]
    fn standing_queue_ends_green_after_its_grace() {
        let clock = SimClock::new();
        let outputs = SimOutputs::new();
        let inputs = SimInputs::new();
        let mut config = IntersectionConfig::default();
        config.timing.movement_mut(MovementId::Artery).max_green = Duration::from_secs(40);
        let controller: Controller<'_, NoopRawMutex, _, _, _, _> =
            Controller::new(config, &outputs, &inputs, &clock, &NoopEventSink)
                .expect("valid config");

        // Confirmed at 5.1 s, then 10 s of grace (a quarter of 40 s).
        inputs.set_active(SensorId::MartinQueue, true);
        let mut green = core::pin::pin!(controller.hold_green(MovementId::Artery));
        assert!(sim::advance(&clock, green.as_mut(), Duration::from_secs(15), |_| {}).is_pending());

        // The cut is committed once scheduled.
        inputs.set_active(SensorId::MartinQueue, false);
        let exit = sim::advance(&clock, green.as_mut(), Duration::from_secs(2), |_| {});
        assert_eq!(exit, core::task::Poll::Ready(Ok(PhaseExit::QueueCut)));
        assert_eq!(clock.now(), Duration::from_millis(15_100));
    }

    #[test]
    fn stop_bar_call_beats_a_pending_queue_cut() {
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

        inputs.set_active(SensorId::Westbound120Queue, true);
        let mut green = core::pin::pin!(controller.hold_green(MovementId::CrossStreet));
        assert!(sim::advance(&clock, green.as_mut(), Duration::from_secs(6), |_| {}).is_pending());

        inputs.set_active(SensorId::Eastbound120Stop, true);
        let exit = sim::advance(&clock, green.as_mut(), Duration::from_secs(6), |_| {});
        assert_eq!(exit, core::task::Poll::Ready(Ok(PhaseExit::Demand)));
    }
}
