//! Protected turn grants.
//!
//! A debounced turn-bay detector asks for a grant. Handlers queue on a gate so
//! only one runs at a time. The running handler takes the right-of-way lock
//! first and the turn permit second, so `turn_in_progress` is only ever set
//! while the scheduler is locked out of its transitions.
//!
//! A solid turn green needs both through movements the lane touches at red:
//! the one it shadows and the one it crosses. A green on either is cleared
//! only if the lane is configured to preempt that movement.

use core::fmt;

use embassy_sync::blocking_mutex::raw::RawMutex;

use crate::controller::{Controller, ControllerError};
use crate::hal::{Clock, InputBank, OutputBank};
use crate::intersection::{MovementId, TurnLaneId, turn_lane_by_id};
use crate::signal::Aspect;
use crate::telemetry::{EventSink, TelemetryEventKind};

/// Why a turn request was not granted.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum TurnRejection {
    /// The turn flag was already claimed through
    /// [`Coordination::try_begin_turn`](crate::coordination::Coordination::try_begin_turn).
    TurnInProgress,
    /// The shadowed movement is green and the lane is not configured to
    /// preempt it.
    ShadowGreen(MovementId),
    /// The shadowed movement is mid-clearance.
    ShadowClearing(MovementId),
    /// The crossed movement is green and the lane is not configured to
    /// preempt it.
    OpposingGreen(MovementId),
    /// The crossed movement is mid-clearance.
    OpposingClearing(MovementId),
}

impl fmt::Display for TurnRejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TurnRejection::TurnInProgress => f.write_str("another turn is in progress"),
            TurnRejection::ShadowGreen(movement) => {
                write!(f, "{movement} is green and may not be preempted")
            }
            TurnRejection::ShadowClearing(movement) => write!(f, "{movement} is clearing"),
            TurnRejection::OpposingGreen(movement) => {
                write!(f, "crossed movement {movement} is green and may not be preempted")
            }
            TurnRejection::OpposingClearing(movement) => {
                write!(f, "crossed movement {movement} is clearing")
            }
        }
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum TurnOutcome {
    Completed {
        /// Movement cleared for the turn and restored afterwards.
        preempted: Option<MovementId>,
    },
    Rejected(TurnRejection),
}

impl<M, O, I, C, E> Controller<'_, M, O, I, C, E>
where
    M: RawMutex,
    O: OutputBank,
    I: InputBank,
    C: Clock,
    E: EventSink,
{
    /// Decides whether `lane` may be granted now, and which green movement, if
    /// any, must be cleared first.
    pub fn evaluate_turn(&self, lane: TurnLaneId) -> Result<Option<MovementId>, TurnRejection> {
        let geometry = turn_lane_by_id(lane);
        let preemptable = self.config.lane(lane).opposing;
        let mut preempt = None;

        for movement in [geometry.shadows, geometry.crosses] {
            let shadowed = movement == geometry.shadows;
            match self.heads.movement_aspect(movement) {
                Aspect::Red => {}
                Aspect::Green if preemptable == Some(movement) => preempt = Some(movement),
                Aspect::Green if shadowed => return Err(TurnRejection::ShadowGreen(movement)),
                Aspect::Green => return Err(TurnRejection::OpposingGreen(movement)),
                _ if shadowed => return Err(TurnRejection::ShadowClearing(movement)),
                _ => return Err(TurnRejection::OpposingClearing(movement)),
            }
        }
        Ok(preempt)
    }

    /// Runs the full grant for `lane`: stop its flasher, clear any conflicting
    /// green, hold the turn green, clear the turn, restore the preempted
    /// movement and resume flashing.
    ///
    /// Requests arriving while another grant runs wait for it to finish and are
    /// then evaluated against the restored state.
    pub async fn handle_turn_request(
        &self,
        lane: TurnLaneId,
    ) -> Result<TurnOutcome, ControllerError> {
        let _queue = self.turn_gate.lock().await;
        let authority = self.authority.lock().await;
        let Some(permit) = self.coordination.try_begin_turn(lane) else {
            return Ok(self.reject(lane, TurnRejection::TurnInProgress));
        };

        let preempt = match self.evaluate_turn(lane) {
            Ok(preempt) => preempt,
            Err(reason) => return Ok(self.reject(lane, reason)),
        };
        self.emit(TelemetryEventKind::TurnStarted(lane));

        self.stop_flasher(lane).await;

        if let Some(movement) = preempt {
            self.emit(TelemetryEventKind::MovementPreempted { lane, movement });
            self.clear_movement(movement).await?;
        }

        let timing = self.config.timing;
        let head = turn_lane_by_id(lane).head;
        self.heads.set_aspect(head, Aspect::Green)?;
        self.emit(TelemetryEventKind::TurnGreen(lane));
        self.clock.sleep(timing.turn_green).await;

        self.heads.set_aspect(head, Aspect::Yellow)?;
        self.clock.sleep(timing.turn_yellow).await;
        self.heads.set_aspect(head, Aspect::Red)?;
        self.emit(TelemetryEventKind::TurnCleared(lane));
        self.clock.sleep(timing.turn_all_red).await;

        if let Some(movement) = preempt {
            self.grant_movement(movement)?;
            self.emit(TelemetryEventKind::MovementRestored(movement));
        }
        self.spawn_flasher(lane);

        drop(authority);
        drop(permit);
        self.emit(TelemetryEventKind::TurnCompleted(lane));
        Ok(TurnOutcome::Completed { preempted: preempt })
    }

    fn reject(&self, lane: TurnLaneId, reason: TurnRejection) -> TurnOutcome {
        self.emit(TelemetryEventKind::TurnRejected { lane, reason });
        TurnOutcome::Rejected(reason)
    }
}
