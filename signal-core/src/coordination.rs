//! Flags shared between the cycle scheduler, the turn handler and flashers.
//!
//! Stores use `Release` and loads use `Acquire`, so a task that observes a flag
//! change also observes every lamp write made before it.

use portable_atomic::{AtomicBool, Ordering};

use crate::intersection::{TURN_LANE_COUNT, TurnLaneId};

pub struct Coordination {
    turn_in_progress: AtomicBool,
    flashing_active: [AtomicBool; TURN_LANE_COUNT],
}

impl Coordination {
    pub const fn new() -> Self {
        Self {
            turn_in_progress: AtomicBool::new(false),
            flashing_active: [const { AtomicBool::new(false) }; TURN_LANE_COUNT],
        }
    }

    /// True while a turn handler holds right-of-way.
    pub fn turn_in_progress(&self) -> bool {
        self.turn_in_progress.load(Ordering::Acquire)
    }

    /// Claims the turn flag. Fails if another handler already holds it.
    pub fn try_begin_turn(&self, lane: TurnLaneId) -> Option<TurnPermit<'_>> {
        self.turn_in_progress
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| TurnPermit {
                flag: &self.turn_in_progress,
                lane,
            })
    }

    /// True while the lane's flasher should keep flashing.
    pub fn flashing_active(&self, lane: TurnLaneId) -> bool {
        self.flashing_active[lane.as_index()].load(Ordering::Acquire)
    }

    pub(crate) fn set_flashing_active(&self, lane: TurnLaneId, active: bool) {
        self.flashing_active[lane.as_index()].store(active, Ordering::Release);
    }

    /// Drops every flag; used on the way into the fail-safe state.
    pub(crate) fn clear(&self) {
        for flag in &self.flashing_active {
            flag.store(false, Ordering::Release);
        }
        self.turn_in_progress.store(false, Ordering::Release);
    }

    pub fn snapshot(&self) -> CoordinationSnapshot {
        CoordinationSnapshot {
            turn_in_progress: self.turn_in_progress(),
            flashing_active: TurnLaneId::ALL.map(|lane| self.flashing_active(lane)),
        }
    }
}

impl Default for Coordination {
    fn default() -> Self {
        Self::new()
    }
}

/// Exclusive claim on `turn_in_progress`; releases the flag on drop.
#[must_use = "dropping the permit ends the turn"]
pub struct TurnPermit<'a> {
    flag: &'a AtomicBool,
    lane: TurnLaneId,
}

impl TurnPermit<'_> {
    pub fn lane(&self) -> TurnLaneId {
        self.lane
    }
}

impl Drop for TurnPermit<'_> {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::Release);
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct CoordinationSnapshot {
    pub turn_in_progress: bool,
    pub flashing_active: [bool; TURN_LANE_COUNT],
}
