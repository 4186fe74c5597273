//! State-change event stream shared by firmware and host targets.
//!
//! The controller reports every right-of-way decision through an
//! [`EventSink`]. Sinks never influence control flow; firmware forwards events
//! to defmt, the emulator keeps the most recent ones in a [`TelemetryRing`].

use core::{cell::RefCell, fmt, time::Duration};

use embassy_sync::blocking_mutex::{Mutex, raw::RawMutex};
use heapless::{HistoryBuf, Vec};

use crate::controller::ControllerError;
use crate::flashing::FlashExit;
use crate::intersection::{MovementId, TurnLaneId};
use crate::scheduler::PhaseExit;
use crate::turn::TurnRejection;

/// Identifier used when tracking emitted telemetry events.
pub type EventId = u32;

/// Events recorded by default ring buffers.
pub const TELEMETRY_RING_CAPACITY: usize = 64;

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum TelemetryEventKind {
    Startup,
    PhaseGreen(MovementId),
    PhaseEnded {
        movement: MovementId,
        exit: PhaseExit,
    },
    /// A turn grant paused the wait clock of the green movement.
    WaitClockHeld(MovementId),
    /// A standing queue on `queued` will end the green of `movement` once
    /// `grace` has passed.
    QueueCutScheduled {
        movement: MovementId,
        queued: MovementId,
        grace: Duration,
    },
    ClearanceYellow(MovementId),
    ClearanceAllRed(MovementId),
    TurnRequested(TurnLaneId),
    TurnRejected {
        lane: TurnLaneId,
        reason: TurnRejection,
    },
    TurnStarted(TurnLaneId),
    MovementPreempted {
        lane: TurnLaneId,
        movement: MovementId,
    },
    TurnGreen(TurnLaneId),
    TurnCleared(TurnLaneId),
    MovementRestored(MovementId),
    TurnCompleted(TurnLaneId),
    FlashingStarted(TurnLaneId),
    FlashingStopped {
        lane: TurnLaneId,
        exit: FlashExit,
    },
    Fault(ControllerError),
    FailSafe,
}

impl fmt::Display for TelemetryEventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TelemetryEventKind::Startup => f.write_str("controller started"),
            TelemetryEventKind::PhaseGreen(movement) => write!(f, "{movement} green"),
            TelemetryEventKind::PhaseEnded { movement, exit } => {
                write!(f, "{movement} green ended ({exit})")
            }
            TelemetryEventKind::WaitClockHeld(movement) => {
                write!(f, "{movement} wait clock held for turn")
            }
            TelemetryEventKind::QueueCutScheduled {
                movement,
                queued,
                grace,
            } => {
                let millis = grace.as_millis();
                write!(
                    f,
                    "{queued} queue standing; {movement} green ends in {}.{:03}s",
                    millis / 1000,
                    millis % 1000
                )
            }
            TelemetryEventKind::ClearanceYellow(movement) => write!(f, "{movement} yellow"),
            TelemetryEventKind::ClearanceAllRed(movement) => {
                write!(f, "{movement} red, all-red clearance")
            }
            TelemetryEventKind::TurnRequested(lane) => write!(f, "{lane} requested"),
            TelemetryEventKind::TurnRejected { lane, reason } => {
                write!(f, "{lane} request rejected: {reason}")
            }
            TelemetryEventKind::TurnStarted(lane) => write!(f, "{lane} sequence started"),
            TelemetryEventKind::MovementPreempted { lane, movement } => {
                write!(f, "{movement} preempted for {lane}")
            }
            TelemetryEventKind::TurnGreen(lane) => write!(f, "{lane} green"),
            TelemetryEventKind::TurnCleared(lane) => write!(f, "{lane} cleared"),
            TelemetryEventKind::MovementRestored(movement) => write!(f, "{movement} restored"),
            TelemetryEventKind::TurnCompleted(lane) => write!(f, "{lane} sequence complete"),
            TelemetryEventKind::FlashingStarted(lane) => write!(f, "{lane} flashing"),
            TelemetryEventKind::FlashingStopped { lane, exit } => {
                write!(f, "{lane} solid red ({exit})")
            }
            TelemetryEventKind::Fault(error) => write!(f, "fault: {error}"),
            TelemetryEventKind::FailSafe => f.write_str("fail-safe: all red"),
        }
    }
}

/// Telemetry record stored in ring buffers.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct TelemetryRecord {
    pub id: EventId,
    pub at: Duration,
    pub event: TelemetryEventKind,
}

impl fmt::Display for TelemetryRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let millis = self.at.as_millis();
        write!(
            f,
            "#{:<4} {:>6}.{:03}s {}",
            self.id,
            millis / 1000,
            millis % 1000,
            self.event
        )
    }
}

/// Consumer of controller events.
pub trait EventSink {
    fn record(&self, at: Duration, event: TelemetryEventKind);
}

impl<T: EventSink + ?Sized> EventSink for &T {
    fn record(&self, at: Duration, event: TelemetryEventKind) {
        (**self).record(at, event);
    }
}

/// Discards every event.
#[derive(Default)]
pub struct NoopEventSink;

impl EventSink for NoopEventSink {
    fn record(&self, _at: Duration, _event: TelemetryEventKind) {}
}

struct RingState<const N: usize> {
    ring: HistoryBuf<TelemetryRecord, N>,
    next_event_id: EventId,
}

/// Keeps the last `N` events in memory.
pub struct TelemetryRing<M: RawMutex, const N: usize = TELEMETRY_RING_CAPACITY> {
    state: Mutex<M, RefCell<RingState<N>>>,
}

impl<M: RawMutex, const N: usize> TelemetryRing<M, N> {
    pub const fn new() -> Self {
        Self {
            state: Mutex::new(RefCell::new(RingState {
                ring: HistoryBuf::new(),
                next_event_id: 0,
            })),
        }
    }

    pub fn len(&self) -> usize {
        self.state.lock(|state| state.borrow().ring.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns the most recent telemetry record, if available.
    pub fn latest(&self) -> Option<TelemetryRecord> {
        self.state.lock(|state| state.borrow().ring.recent().copied())
    }

    /// Copies out retained records with ids at or above `from`, oldest first.
    pub fn since(&self, from: EventId) -> Vec<TelemetryRecord, N> {
        self.state.lock(|state| {
            state
                .borrow()
                .ring
                .oldest_ordered()
                .filter(|record| record.id >= from)
                .copied()
                .collect()
        })
    }

    /// Id the next recorded event will receive.
    pub fn next_id(&self) -> EventId {
        self.state.lock(|state| state.borrow().next_event_id)
    }
}

impl<M: RawMutex, const N: usize> Default for TelemetryRing<M, N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<M: RawMutex, const N: usize> EventSink for TelemetryRing<M, N> {
    fn record(&self, at: Duration, event: TelemetryEventKind) {
        self.state.lock(|state| {
            let mut state = state.borrow_mut();
            let id = state.next_event_id;
            state.next_event_id = id.wrapping_add(1);
            state.ring.write(TelemetryRecord { id, at, event });
        });
    }
}
