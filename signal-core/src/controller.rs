//! The intersection controller: owns the heads, the shared flags and the
//! flasher slots, and runs every task of the intersection as one future.

use core::{convert::Infallible, fmt, time::Duration};

use embassy_futures::select::{Either4, select_array, select4};
use embassy_sync::{blocking_mutex::raw::RawMutex, mutex::Mutex, signal::Signal};

use crate::coordination::Coordination;
use crate::flashing::FlashSupervisor;
use crate::hal::{Clock, HalError, InputBank, Level, OutputBank};
use crate::intersection::{MovementId, TurnLaneId, sensor_by_id, turn_lane_by_id};
use crate::sensor::{sustained_low, wait_for_level};
use crate::signal::{Aspect, SignalHeads};
use crate::telemetry::{EventSink, NoopEventSink, TelemetryEventKind};
use crate::timing::{ConfigError, IntersectionConfig};
use crate::turn::TurnOutcome;

/// Failure that forces the fail-safe.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum ControllerError {
    Hal(HalError),
}

impl From<HalError> for ControllerError {
    fn from(error: HalError) -> Self {
        Self::Hal(error)
    }
}

impl fmt::Display for ControllerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ControllerError::Hal(error) => write!(f, "hardware fault: {error}"),
        }
    }
}

impl core::error::Error for ControllerError {}

/// How [`Controller::run`] ended. Either way every head is red.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum ShutdownCause {
    Requested,
    Fault(ControllerError),
}

pub struct Controller<'a, M, O, I, C, E = NoopEventSink>
where
    M: RawMutex,
{
    pub(crate) config: IntersectionConfig,
    pub(crate) heads: SignalHeads<M, O>,
    pub(crate) inputs: &'a I,
    pub(crate) clock: &'a C,
    pub(crate) events: &'a E,
    pub(crate) coordination: Coordination,
    pub(crate) flashers: FlashSupervisor<M>,
    /// Right-of-way over the through movements. Held by the scheduler across a
    /// transition and by a turn handler across its whole grant.
    pub(crate) authority: Mutex<M, ()>,
    /// Queues turn handlers behind one another.
    pub(crate) turn_gate: Mutex<M, ()>,
}

impl<'a, M, O, I, C, E> Controller<'a, M, O, I, C, E>
where
    M: RawMutex,
    O: OutputBank,
    I: InputBank,
    C: Clock,
    E: EventSink,
{
    pub fn new(
        config: IntersectionConfig,
        outputs: O,
        inputs: &'a I,
        clock: &'a C,
        events: &'a E,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            config,
            heads: SignalHeads::new(outputs),
            inputs,
            clock,
            events,
            coordination: Coordination::new(),
            flashers: FlashSupervisor::new(),
            authority: Mutex::new(()),
            turn_gate: Mutex::new(()),
        })
    }

    pub fn config(&self) -> &IntersectionConfig {
        &self.config
    }

    pub fn heads(&self) -> &SignalHeads<M, O> {
        &self.heads
    }

    pub fn coordination(&self) -> &Coordination {
        &self.coordination
    }

    pub fn flashers(&self) -> &FlashSupervisor<M> {
        &self.flashers
    }

    pub fn now(&self) -> Duration {
        self.clock.now()
    }

    pub(crate) fn emit(&self, event: TelemetryEventKind) {
        self.events.record(self.clock.now(), event);
    }

    /// Drives every output low, then the initial movement green, the other
    /// movement and every turn lane red, and starts the flashers that shadow
    /// the initial movement.
    pub fn startup(&self) -> Result<(), HalError> {
        self.heads.darken_all()?;
        let initial = self.config.initial_movement;
        for movement in MovementId::ALL {
            if movement != initial {
                self.heads.set_movement(movement, Aspect::Red)?;
            }
        }
        for lane in TurnLaneId::ALL {
            self.heads.set_aspect(turn_lane_by_id(lane).head, Aspect::Red)?;
        }
        self.emit(TelemetryEventKind::Startup);
        self.grant_movement(initial)
    }

    /// Runs the intersection until `shutdown` is signalled or a fault occurs,
    /// then leaves every head red.
    pub async fn run(&self, shutdown: &Signal<M, ()>) -> ShutdownCause {
        let cause = match self.startup() {
            Err(error) => ShutdownCause::Fault(error.into()),
            Ok(()) => {
                let monitors = select_array(TurnLaneId::ALL.map(|lane| self.monitor_turn_lane(lane)));
                let flashers = select_array(TurnLaneId::ALL.map(|lane| self.flasher_worker(lane)));
                match select4(self.run_cycle(), monitors, flashers, shutdown.wait()).await {
                    Either4::First(result) | Either4::Second((result, _)) | Either4::Third((result, _)) => {
                        ShutdownCause::Fault(into_fault(result))
                    }
                    Either4::Fourth(()) => ShutdownCause::Requested,
                }
            }
        };

        if let ShutdownCause::Fault(error) = cause {
            self.emit(TelemetryEventKind::Fault(error));
        }
        match self.fail_safe() {
            Err(error) if cause == ShutdownCause::Requested => ShutdownCause::Fault(error.into()),
            _ => cause,
        }
    }

    /// Clears every flag and drives every head red. Safe to call from any state.
    pub fn fail_safe(&self) -> Result<(), HalError> {
        self.coordination.clear();
        let result = self.heads.fail_safe();
        self.emit(TelemetryEventKind::FailSafe);
        result
    }

    /// Watches one turn-bay detector and runs a grant each time it debounces.
    /// After a completed grant the detector must clear before it can ask again.
    async fn monitor_turn_lane(&self, lane: TurnLaneId) -> Result<Infallible, ControllerError> {
        let channel = sensor_by_id(turn_lane_by_id(lane).sensor).channel;
        let timing = self.config.timing;
        loop {
            wait_for_level(self.inputs, self.clock, channel, Level::Low, timing.poll_interval)
                .await?;
            if !sustained_low(
                self.inputs,
                self.clock,
                channel,
                timing.debounce_window,
                timing.poll_interval,
            )
            .await?
            {
                continue;
            }

            self.emit(TelemetryEventKind::TurnRequested(lane));
            match self.handle_turn_request(lane).await? {
                TurnOutcome::Completed { .. } => {
                    wait_for_level(self.inputs, self.clock, channel, Level::High, timing.poll_interval)
                        .await?;
                }
                TurnOutcome::Rejected(_) => self.clock.sleep(timing.poll_interval).await,
            }
        }
    }
}

fn into_fault(result: Result<Infallible, ControllerError>) -> ControllerError {
    match result {
        Ok(never) => match never {},
        Err(error) => error,
    }
}
