//! Timing plan and per-lane configuration.
//!
//! Defaults match the deployed intersection; every value is a tunable so bench
//! setups and tests can compress the cycle.

use core::{fmt, time::Duration};

use crate::intersection::{MOVEMENT_COUNT, MovementId, TURN_LANE_COUNT, TurnLaneId};

/// Longest green a through movement may hold before it must yield.
pub const DEFAULT_MAX_GREEN: Duration = Duration::from_secs(45);
pub const ARTERY_YELLOW: Duration = Duration::from_secs(3);
pub const ARTERY_ALL_RED: Duration = Duration::from_secs(2);
pub const CROSS_STREET_YELLOW: Duration = Duration::from_secs(4);
pub const CROSS_STREET_ALL_RED: Duration = Duration::from_secs(5);
/// Shortest time a standing cross-street queue lets the artery keep its green.
pub const ARTERY_QUEUE_GRACE: Duration = Duration::from_secs(5);
/// Shortest time a standing artery queue lets the cross street keep its green.
pub const CROSS_STREET_QUEUE_GRACE: Duration = Duration::from_secs(3);
/// Queue grace as a share of the held movement's max green, in percent.
pub const QUEUE_GRACE_PERCENT: u32 = 25;
/// Length of a protected turn grant.
pub const TURN_GREEN: Duration = Duration::from_secs(15);
pub const TURN_YELLOW: Duration = Duration::from_secs(3);
pub const TURN_ALL_RED: Duration = Duration::from_secs(2);
/// A detector must stay occupied this long before it counts as demand.
pub const DEBOUNCE_WINDOW: Duration = Duration::from_secs(5);
/// Caution flash on-time (and off-time).
pub const FLASH_HALF_PERIOD: Duration = Duration::from_millis(400);
/// Sampling interval for detectors and the scheduler's wait loop.
pub const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Green limit and clearance intervals for one through movement.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct MovementTiming {
    pub max_green: Duration,
    pub yellow: Duration,
    pub all_red: Duration,
    /// Lower bound on how long this green runs on once the next movement's
    /// queue has been confirmed.
    pub queue_grace_floor: Duration,
}

impl MovementTiming {
    pub const fn new(
        max_green: Duration,
        yellow: Duration,
        all_red: Duration,
        queue_grace_floor: Duration,
    ) -> Self {
        Self {
            max_green,
            yellow,
            all_red,
            queue_grace_floor,
        }
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct TimingPlan {
    /// Indexed by [`MovementId::as_index`].
    pub movements: [MovementTiming; MOVEMENT_COUNT],
    pub turn_green: Duration,
    pub turn_yellow: Duration,
    pub turn_all_red: Duration,
    pub debounce_window: Duration,
    pub flash_half_period: Duration,
    pub poll_interval: Duration,
    pub queue_grace_percent: u32,
}

impl TimingPlan {
    pub const fn new() -> Self {
        Self {
            movements: [
                MovementTiming::new(
                    DEFAULT_MAX_GREEN,
                    ARTERY_YELLOW,
                    ARTERY_ALL_RED,
                    ARTERY_QUEUE_GRACE,
                ),
                MovementTiming::new(
                    DEFAULT_MAX_GREEN,
                    CROSS_STREET_YELLOW,
                    CROSS_STREET_ALL_RED,
                    CROSS_STREET_QUEUE_GRACE,
                ),
            ],
            turn_green: TURN_GREEN,
            turn_yellow: TURN_YELLOW,
            turn_all_red: TURN_ALL_RED,
            debounce_window: DEBOUNCE_WINDOW,
            flash_half_period: FLASH_HALF_PERIOD,
            poll_interval: POLL_INTERVAL,
            queue_grace_percent: QUEUE_GRACE_PERCENT,
        }
    }

    pub const fn movement(&self, id: MovementId) -> MovementTiming {
        self.movements[id.as_index()]
    }

    /// How much longer `id` keeps green once the next movement's queue is
    /// confirmed: the larger of its floor and its share of max green.
    pub fn queue_grace(&self, id: MovementId) -> Duration {
        let timing = self.movement(id);
        let share = timing.max_green * self.queue_grace_percent / 100;
        share.max(timing.queue_grace_floor)
    }

    pub fn movement_mut(&mut self, id: MovementId) -> &mut MovementTiming {
        &mut self.movements[id.as_index()]
    }
}

impl Default for TimingPlan {
    fn default() -> Self {
        Self::new()
    }
}

/// Geometry decision for a turn lane.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct TurnLaneConfig {
    /// Movement the turn may preempt. A green on it is cleared before the turn
    /// is granted and restored afterwards. With `None` the turn never clears a
    /// green, so it is only granted when both movements it touches are
    /// already red.
    pub opposing: Option<MovementId>,
}

impl TurnLaneConfig {
    pub const fn unprotected() -> Self {
        Self { opposing: None }
    }

    pub const fn preempting(movement: MovementId) -> Self {
        Self {
            opposing: Some(movement),
        }
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct IntersectionConfig {
    pub timing: TimingPlan,
    /// Indexed by [`TurnLaneId::as_index`].
    pub lanes: [TurnLaneConfig; TURN_LANE_COUNT],
    /// Movement that holds green after startup.
    pub initial_movement: MovementId,
}

impl IntersectionConfig {
    pub const fn new() -> Self {
        Self {
            timing: TimingPlan::new(),
            lanes: [
                TurnLaneConfig::preempting(MovementId::Artery),
                TurnLaneConfig::preempting(MovementId::Artery),
                TurnLaneConfig::preempting(MovementId::CrossStreet),
            ],
            initial_movement: MovementId::Artery,
        }
    }

    pub const fn lane(&self, id: TurnLaneId) -> TurnLaneConfig {
        self.lanes[id.as_index()]
    }

    pub fn lane_mut(&mut self, id: TurnLaneId) -> &mut TurnLaneConfig {
        &mut self.lanes[id.as_index()]
    }

    /// Rejects plans the scheduler cannot run safely.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let timing = &self.timing;
        if timing.poll_interval.is_zero() {
            return Err(ConfigError::ZeroPollInterval);
        }
        if timing.flash_half_period.is_zero() {
            return Err(ConfigError::ZeroFlashPeriod);
        }
        if timing.turn_green.is_zero() {
            return Err(ConfigError::ZeroTurnGreen);
        }
        if timing.poll_interval > timing.debounce_window {
            return Err(ConfigError::PollExceedsDebounce);
        }
        if timing.queue_grace_percent > 100 {
            return Err(ConfigError::QueueGracePercent(timing.queue_grace_percent));
        }
        for id in MovementId::ALL {
            if timing.movement(id).max_green.is_zero() {
                return Err(ConfigError::ZeroMaxGreen(id));
            }
        }
        Ok(())
    }
}

impl Default for IntersectionConfig {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum ConfigError {
    ZeroPollInterval,
    ZeroFlashPeriod,
    ZeroTurnGreen,
    ZeroMaxGreen(MovementId),
    PollExceedsDebounce,
    QueueGracePercent(u32),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::ZeroPollInterval => f.write_str("poll interval must be non-zero"),
            ConfigError::ZeroFlashPeriod => f.write_str("flash half-period must be non-zero"),
            ConfigError::ZeroTurnGreen => f.write_str("turn green must be non-zero"),
            ConfigError::ZeroMaxGreen(movement) => {
                write!(f, "max green for {movement} must be non-zero")
            }
            ConfigError::PollExceedsDebounce => {
                f.write_str("poll interval must not exceed the debounce window")
            }
            ConfigError::QueueGracePercent(percent) => {
                write!(f, "queue grace of {percent}% exceeds max green")
            }
        }
    }
}

impl core::error::Error for ConfigError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_deployed_intersection() {
        let config = IntersectionConfig::default();
        let artery = config.timing.movement(MovementId::Artery);
        let cross = config.timing.movement(MovementId::CrossStreet);

        assert_eq!(artery.max_green, Duration::from_secs(45));
        assert_eq!((artery.yellow, artery.all_red), (ARTERY_YELLOW, ARTERY_ALL_RED));
        assert_eq!(
            (cross.yellow, cross.all_red),
            (Duration::from_secs(4), Duration::from_secs(5))
        );
        assert_eq!(config.timing.flash_half_period, Duration::from_millis(400));
        assert_eq!(config.validate(), Ok(()));
    }

    #[test]
    fn turns_preempt_the_movement_they_cross() {
        let config = IntersectionConfig::default();
        for lane in crate::intersection::ALL_TURN_LANES {
            assert_eq!(config.lane(lane.id).opposing, Some(lane.crosses), "{}", lane.name);
        }
    }

    #[test]
    fn queue_grace_is_a_share_of_max_green_with_a_floor() {
        let mut timing = TimingPlan::default();
        assert_eq!(timing.queue_grace(MovementId::Artery), Duration::from_millis(11_250));
        assert_eq!(
            timing.queue_grace(MovementId::CrossStreet),
            Duration::from_millis(11_250)
        );

        timing.movement_mut(MovementId::CrossStreet).max_green = Duration::from_secs(8);
        assert_eq!(timing.queue_grace(MovementId::CrossStreet), CROSS_STREET_QUEUE_GRACE);
        timing.movement_mut(MovementId::Artery).max_green = Duration::from_secs(8);
        assert_eq!(timing.queue_grace(MovementId::Artery), ARTERY_QUEUE_GRACE);
    }

    #[test]
    fn validation_rejects_degenerate_plans() {
        let mut config = IntersectionConfig::default();
        config.timing.poll_interval = Duration::ZERO;
        assert_eq!(config.validate(), Err(ConfigError::ZeroPollInterval));

        let mut config = IntersectionConfig::default();
        config.timing.movement_mut(MovementId::CrossStreet).max_green = Duration::ZERO;
        assert_eq!(
            config.validate(),
            Err(ConfigError::ZeroMaxGreen(MovementId::CrossStreet))
        );

        let mut config = IntersectionConfig::default();
        config.timing.poll_interval = Duration::from_secs(6);
        assert_eq!(config.validate(), Err(ConfigError::PollExceedsDebounce));

        let mut config = IntersectionConfig::default();
        config.timing.queue_grace_percent = 150;
        assert_eq!(config.validate(), Err(ConfigError::QueueGracePercent(150)));
    }
}
