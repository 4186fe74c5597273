//! Intersection geometry shared by firmware and host targets.
//!
//! The controller drives a fixed layout: the US-120 artery (eastbound and
//! westbound heads), the Martin Street / Tech Parkway cross street, and three
//! protected turn lanes. Every identifier maps onto an entry in a compile-time
//! catalog so the STM32 firmware and the host emulator share the same tables.

use core::fmt;

/// Number of three-aspect signal heads wired to the controller.
pub const SIGNAL_GROUP_COUNT: usize = 7;
/// Number of through movements served by the main cycle.
pub const MOVEMENT_COUNT: usize = 2;
/// Number of protected turn lanes.
pub const TURN_LANE_COUNT: usize = 3;
/// Number of detector inputs.
pub const SENSOR_COUNT: usize = 11;
/// Every head consumes one output per lamp.
pub const OUTPUT_CHANNEL_COUNT: usize = SIGNAL_GROUP_COUNT * 3;

/// Logical output line driving a single lamp.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct OutputChannel(pub u8);

impl OutputChannel {
    /// Position of the channel inside an output bank.
    pub const fn as_index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for OutputChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "out{}", self.0)
    }
}

/// Logical input line sampling a detector.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct InputChannel(pub u8);

impl InputChannel {
    /// Position of the channel inside an input bank.
    pub const fn as_index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for InputChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "in{}", self.0)
    }
}

/// Identifier for every three-aspect head.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum SignalGroupId {
    Eastbound120,
    Westbound120,
    Martin,
    TechParkway,
    TechTurn,
    MartinTurn,
    Westbound120Turn,
}

impl SignalGroupId {
    pub const ALL: [SignalGroupId; SIGNAL_GROUP_COUNT] = [
        SignalGroupId::Eastbound120,
        SignalGroupId::Westbound120,
        SignalGroupId::Martin,
        SignalGroupId::TechParkway,
        SignalGroupId::TechTurn,
        SignalGroupId::MartinTurn,
        SignalGroupId::Westbound120Turn,
    ];

    /// Deterministic index for lookups into [`ALL_SIGNAL_HEADS`].
    pub const fn as_index(self) -> usize {
        match self {
            SignalGroupId::Eastbound120 => 0,
            SignalGroupId::Westbound120 => 1,
            SignalGroupId::Martin => 2,
            SignalGroupId::TechParkway => 3,
            SignalGroupId::TechTurn => 4,
            SignalGroupId::MartinTurn => 5,
            SignalGroupId::Westbound120Turn => 6,
        }
    }

    /// Attempts to construct a [`SignalGroupId`] from a raw index.
    pub const fn from_index(index: usize) -> Option<Self> {
        if index < SIGNAL_GROUP_COUNT {
            Some(Self::ALL[index])
        } else {
            None
        }
    }
}

impl fmt::Display for SignalGroupId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(signal_head_by_id(*self).name)
    }
}

/// Through movements in cycle order.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum MovementId {
    /// Eastbound and westbound US-120.
    Artery,
    /// Martin Street and Tech Parkway.
    CrossStreet,
}

impl MovementId {
    pub const ALL: [MovementId; MOVEMENT_COUNT] = [MovementId::Artery, MovementId::CrossStreet];

    pub const fn as_index(self) -> usize {
        match self {
            MovementId::Artery => 0,
            MovementId::CrossStreet => 1,
        }
    }

    pub const fn from_index(index: usize) -> Option<Self> {
        match index {
            0 => Some(MovementId::Artery),
            1 => Some(MovementId::CrossStreet),
            _ => None,
        }
    }

    /// Movement that receives right-of-way after this one.
    #[must_use]
    pub const fn next(self) -> Self {
        match self {
            MovementId::Artery => MovementId::CrossStreet,
            MovementId::CrossStreet => MovementId::Artery,
        }
    }
}

impl fmt::Display for MovementId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(movement_by_id(*self).name)
    }
}

/// Protected turn lanes.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum TurnLaneId {
    TechTurn,
    MartinTurn,
    Westbound120Turn,
}

impl TurnLaneId {
    pub const ALL: [TurnLaneId; TURN_LANE_COUNT] = [
        TurnLaneId::TechTurn,
        TurnLaneId::MartinTurn,
        TurnLaneId::Westbound120Turn,
    ];

    pub const fn as_index(self) -> usize {
        match self {
            TurnLaneId::TechTurn => 0,
            TurnLaneId::MartinTurn => 1,
            TurnLaneId::Westbound120Turn => 2,
        }
    }

    pub const fn from_index(index: usize) -> Option<Self> {
        if index < TURN_LANE_COUNT {
            Some(Self::ALL[index])
        } else {
            None
        }
    }
}

impl fmt::Display for TurnLaneId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(turn_lane_by_id(*self).name)
    }
}

/// Detector identifiers. Stop-bar loops sit at the line, queue loops further
/// back where a standing queue first covers them.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum SensorId {
    MartinStop,
    MartinQueue,
    TechStop,
    TechQueue,
    Eastbound120Stop,
    Eastbound120Queue,
    Westbound120Stop,
    Westbound120Queue,
    TechTurn,
    MartinTurn,
    Westbound120Turn,
}

impl SensorId {
    pub const ALL: [SensorId; SENSOR_COUNT] = [
        SensorId::MartinStop,
        SensorId::MartinQueue,
        SensorId::TechStop,
        SensorId::TechQueue,
        SensorId::Eastbound120Stop,
        SensorId::Eastbound120Queue,
        SensorId::Westbound120Stop,
        SensorId::Westbound120Queue,
        SensorId::TechTurn,
        SensorId::MartinTurn,
        SensorId::Westbound120Turn,
    ];

    pub const fn as_index(self) -> usize {
        match self {
            SensorId::MartinStop => 0,
            SensorId::MartinQueue => 1,
            SensorId::TechStop => 2,
            SensorId::TechQueue => 3,
            SensorId::Eastbound120Stop => 4,
            SensorId::Eastbound120Queue => 5,
            SensorId::Westbound120Stop => 6,
            SensorId::Westbound120Queue => 7,
            SensorId::TechTurn => 8,
            SensorId::MartinTurn => 9,
            SensorId::Westbound120Turn => 10,
        }
    }

    pub const fn from_index(index: usize) -> Option<Self> {
        if index < SENSOR_COUNT {
            Some(Self::ALL[index])
        } else {
            None
        }
    }

    /// Resolves an operator-facing tag such as `martin-stop` (case-insensitive).
    pub fn from_tag(tag: &str) -> Option<Self> {
        ALL_SENSORS
            .iter()
            .find(|sensor| sensor.tag.eq_ignore_ascii_case(tag))
            .map(|sensor| sensor.id)
    }
}

impl fmt::Display for SensorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(sensor_by_id(*self).tag)
    }
}

/// Metadata describing how a head is wired.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct SignalHead {
    pub id: SignalGroupId,
    pub name: &'static str,
    pub red: OutputChannel,
    pub yellow: OutputChannel,
    pub green: OutputChannel,
}

impl SignalHead {
    const fn wired(id: SignalGroupId, name: &'static str) -> Self {
        // Lamps of one head occupy three consecutive channels: red, yellow, green.
        let base = (id.as_index() * 3) as u8;
        Self {
            id,
            name,
            red: OutputChannel(base),
            yellow: OutputChannel(base + 1),
            green: OutputChannel(base + 2),
        }
    }
}

/// Compile-time catalog of every head.
pub const ALL_SIGNAL_HEADS: [SignalHead; SIGNAL_GROUP_COUNT] = [
    SignalHead::wired(SignalGroupId::Eastbound120, "120 EB"),
    SignalHead::wired(SignalGroupId::Westbound120, "120 WB"),
    SignalHead::wired(SignalGroupId::Martin, "Martin"),
    SignalHead::wired(SignalGroupId::TechParkway, "Tech Pkwy"),
    SignalHead::wired(SignalGroupId::TechTurn, "Tech turn"),
    SignalHead::wired(SignalGroupId::MartinTurn, "Martin turn"),
    SignalHead::wired(SignalGroupId::Westbound120Turn, "120 WB turn"),
];

/// Retrieve head metadata by identifier.
pub const fn signal_head_by_id(id: SignalGroupId) -> SignalHead {
    ALL_SIGNAL_HEADS[id.as_index()]
}

/// A through movement: heads that always show the same aspect plus the
/// detectors watching its approaches.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct Movement {
    pub id: MovementId,
    pub name: &'static str,
    pub heads: &'static [SignalGroupId],
    /// Stop-bar loops. A held occupancy places a call for green.
    pub stop_sensors: &'static [SensorId],
    /// Queue loops set back from the line. A held occupancy means a standing
    /// queue and shortens the conflicting green.
    pub queue_sensors: &'static [SensorId],
}

pub const ALL_MOVEMENTS: [Movement; MOVEMENT_COUNT] = [
    Movement {
        id: MovementId::Artery,
        name: "US-120",
        heads: &[SignalGroupId::Eastbound120, SignalGroupId::Westbound120],
        stop_sensors: &[SensorId::Eastbound120Stop, SensorId::Westbound120Stop],
        queue_sensors: &[SensorId::Eastbound120Queue, SensorId::Westbound120Queue],
    },
    Movement {
        id: MovementId::CrossStreet,
        name: "Martin/Tech",
        heads: &[SignalGroupId::Martin, SignalGroupId::TechParkway],
        stop_sensors: &[SensorId::MartinStop, SensorId::TechStop],
        queue_sensors: &[SensorId::MartinQueue, SensorId::TechQueue],
    },
];

pub const fn movement_by_id(id: MovementId) -> Movement {
    ALL_MOVEMENTS[id.as_index()]
}

/// A protected turn lane, the movement whose green it normally shadows with a
/// flashing caution, and the through movement its turning path crosses.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct TurnLane {
    pub id: TurnLaneId,
    pub name: &'static str,
    pub head: SignalGroupId,
    pub shadows: MovementId,
    /// Must show red for the whole of a solid green on this lane.
    pub crosses: MovementId,
    pub sensor: SensorId,
}

pub const ALL_TURN_LANES: [TurnLane; TURN_LANE_COUNT] = [
    TurnLane {
        id: TurnLaneId::TechTurn,
        name: "Tech turn",
        head: SignalGroupId::TechTurn,
        shadows: MovementId::CrossStreet,
        crosses: MovementId::Artery,
        sensor: SensorId::TechTurn,
    },
    TurnLane {
        id: TurnLaneId::MartinTurn,
        name: "Martin turn",
        head: SignalGroupId::MartinTurn,
        shadows: MovementId::CrossStreet,
        crosses: MovementId::Artery,
        sensor: SensorId::MartinTurn,
    },
    TurnLane {
        id: TurnLaneId::Westbound120Turn,
        name: "120 WB turn",
        head: SignalGroupId::Westbound120Turn,
        shadows: MovementId::Artery,
        crosses: MovementId::CrossStreet,
        sensor: SensorId::Westbound120Turn,
    },
];

pub const fn turn_lane_by_id(id: TurnLaneId) -> TurnLane {
    ALL_TURN_LANES[id.as_index()]
}

/// Iterates the turn lanes whose caution flash follows `movement`.
pub fn lanes_shadowing(movement: MovementId) -> impl Iterator<Item = TurnLane> {
    ALL_TURN_LANES
        .into_iter()
        .filter(move |lane| lane.shadows == movement)
}

/// Detector metadata. All detectors pull their input low while occupied.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct Sensor {
    pub id: SensorId,
    pub tag: &'static str,
    pub channel: InputChannel,
}

impl Sensor {
    const fn wired(id: SensorId, tag: &'static str) -> Self {
        Self {
            id,
            tag,
            channel: InputChannel(id.as_index() as u8),
        }
    }
}

pub const ALL_SENSORS: [Sensor; SENSOR_COUNT] = [
    Sensor::wired(SensorId::MartinStop, "martin-stop"),
    Sensor::wired(SensorId::MartinQueue, "martin-queue"),
    Sensor::wired(SensorId::TechStop, "tech-stop"),
    Sensor::wired(SensorId::TechQueue, "tech-queue"),
    Sensor::wired(SensorId::Eastbound120Stop, "e120-stop"),
    Sensor::wired(SensorId::Eastbound120Queue, "e120-queue"),
    Sensor::wired(SensorId::Westbound120Stop, "w120-stop"),
    Sensor::wired(SensorId::Westbound120Queue, "w120-queue"),
    Sensor::wired(SensorId::TechTurn, "tech-turn"),
    Sensor::wired(SensorId::MartinTurn, "martin-turn"),
    Sensor::wired(SensorId::Westbound120Turn, "w120-turn"),
];

pub const fn sensor_by_id(id: SensorId) -> Sensor {
    ALL_SENSORS[id.as_index()]
}
