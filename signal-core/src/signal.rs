//! Three-aspect signal heads.
//!
//! [`SignalHeads`] owns the output bank behind a blocking mutex and caches the
//! lamp state of every head, so readers (flashers, the turn guard, status
//! reporting) never touch the hardware to learn what a head is showing.

use core::{cell::RefCell, fmt};

use embassy_sync::blocking_mutex::{Mutex, raw::RawMutex};

use crate::hal::{HalError, Level, OutputBank};
use crate::intersection::{
    MovementId, OutputChannel, SIGNAL_GROUP_COUNT, SignalGroupId, movement_by_id,
    signal_head_by_id,
};

/// Raw lamp drive for one head.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct Lamps {
    pub red: bool,
    pub yellow: bool,
    pub green: bool,
}

impl Lamps {
    pub const DARK: Lamps = Lamps::new(false, false, false);
    pub const RED: Lamps = Lamps::new(true, false, false);
    pub const YELLOW: Lamps = Lamps::new(false, true, false);
    pub const GREEN: Lamps = Lamps::new(false, false, true);

    pub const fn new(red: bool, yellow: bool, green: bool) -> Self {
        Self { red, yellow, green }
    }

    pub const fn aspect(self) -> Aspect {
        match (self.red, self.yellow, self.green) {
            (false, false, false) => Aspect::Dark,
            (true, false, false) => Aspect::Red,
            (false, true, false) => Aspect::Yellow,
            (false, false, true) => Aspect::Green,
            _ => Aspect::Conflicting,
        }
    }
}

/// Interpreted head state. `Dark` is the off half of a caution flash.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Aspect {
    Red,
    Yellow,
    Green,
    Dark,
    /// More than one lamp lit; only reachable through a failed write.
    Conflicting,
}

impl Aspect {
    pub const fn lamps(self) -> Lamps {
        match self {
            Aspect::Red => Lamps::RED,
            Aspect::Yellow => Lamps::YELLOW,
            Aspect::Green => Lamps::GREEN,
            Aspect::Dark | Aspect::Conflicting => Lamps::DARK,
        }
    }

    /// Green may only be left through yellow.
    pub const fn may_follow(self, previous: Aspect) -> bool {
        !matches!(previous, Aspect::Green) || matches!(self, Aspect::Green | Aspect::Yellow)
    }
}

impl fmt::Display for Aspect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Aspect::Red => "RED",
            Aspect::Yellow => "YELLOW",
            Aspect::Green => "GREEN",
            Aspect::Dark => "dark",
            Aspect::Conflicting => "CONFLICT",
        })
    }
}

struct HeadBank<O> {
    outputs: O,
    lamps: [Lamps; SIGNAL_GROUP_COUNT],
}

impl<O: OutputBank> HeadBank<O> {
    fn drive(&mut self, group: SignalGroupId, lamp: Lamp, on: bool) -> Result<(), HalError> {
        let head = signal_head_by_id(group);
        let channel = lamp.channel(head.red, head.yellow, head.green);
        self.outputs.set_output(channel, Level::from_high(on))?;
        lamp.store(&mut self.lamps[group.as_index()], on);
        Ok(())
    }

    /// Switches lamps off before switching the new ones on, so a change never
    /// lights two lamps at once. Stops at the first failed write.
    fn apply(&mut self, group: SignalGroupId, target: Lamps) -> Result<(), HalError> {
        let current = self.lamps[group.as_index()];
        for lamp in Lamp::ALL {
            if lamp.load(current) && !lamp.load(target) {
                self.drive(group, lamp, false)?;
            }
        }
        for lamp in Lamp::ALL {
            if lamp.load(target) {
                self.drive(group, lamp, true)?;
            }
        }
        Ok(())
    }

    /// Writes every channel of `group` regardless of the cache, carrying on past
    /// failures.
    fn force(&mut self, group: SignalGroupId, target: Lamps) -> Result<(), HalError> {
        let mut first_error = None;
        for lamp in Lamp::ALL {
            if let Err(error) = self.drive(group, lamp, lamp.load(target)) {
                first_error.get_or_insert(error);
            }
        }
        first_error.map_or(Ok(()), Err)
    }
}

#[derive(Copy, Clone)]
enum Lamp {
    Green,
    Yellow,
    Red,
}

impl Lamp {
    // Green first: the fail-safe darkens green before lighting red.
    const ALL: [Lamp; 3] = [Lamp::Green, Lamp::Yellow, Lamp::Red];

    const fn channel(
        self,
        red: OutputChannel,
        yellow: OutputChannel,
        green: OutputChannel,
    ) -> OutputChannel {
        match self {
            Lamp::Red => red,
            Lamp::Yellow => yellow,
            Lamp::Green => green,
        }
    }

    const fn load(self, lamps: Lamps) -> bool {
        match self {
            Lamp::Red => lamps.red,
            Lamp::Yellow => lamps.yellow,
            Lamp::Green => lamps.green,
        }
    }

    fn store(self, lamps: &mut Lamps, on: bool) {
        match self {
            Lamp::Red => lamps.red = on,
            Lamp::Yellow => lamps.yellow = on,
            Lamp::Green => lamps.green = on,
        }
    }
}

/// Every head of the intersection behind one lock.
pub struct SignalHeads<M: RawMutex, O> {
    bank: Mutex<M, RefCell<HeadBank<O>>>,
}

impl<M: RawMutex, O: OutputBank> SignalHeads<M, O> {
    /// Takes ownership of the output bank. The cache starts dark; callers are
    /// expected to drive every head before relying on it.
    pub const fn new(outputs: O) -> Self {
        Self {
            bank: Mutex::new(RefCell::new(HeadBank {
                outputs,
                lamps: [Lamps::DARK; SIGNAL_GROUP_COUNT],
            })),
        }
    }

    /// Drives exactly the given lamps of `group`.
    pub fn set_lamps(&self, group: SignalGroupId, lamps: Lamps) -> Result<(), HalError> {
        self.bank
            .lock(|bank| bank.borrow_mut().apply(group, lamps))
    }

    pub fn set_aspect(&self, group: SignalGroupId, aspect: Aspect) -> Result<(), HalError> {
        debug_assert!(
            aspect.may_follow(self.aspect(group)),
            "{group} may not go from {} to {aspect}",
            self.aspect(group)
        );
        self.set_lamps(group, aspect.lamps())
    }

    /// Drives every head of a through movement.
    pub fn set_movement(&self, movement: MovementId, aspect: Aspect) -> Result<(), HalError> {
        for group in movement_by_id(movement).heads {
            self.set_aspect(*group, aspect)?;
        }
        Ok(())
    }

    pub fn lamps(&self, group: SignalGroupId) -> Lamps {
        self.bank.lock(|bank| bank.borrow().lamps[group.as_index()])
    }

    pub fn aspect(&self, group: SignalGroupId) -> Aspect {
        self.lamps(group).aspect()
    }

    /// Aspect shown by a movement. Its heads are only ever driven together, so
    /// the first head speaks for all of them.
    pub fn movement_aspect(&self, movement: MovementId) -> Aspect {
        movement_by_id(movement)
            .heads
            .first()
            .map_or(Aspect::Dark, |group| self.aspect(*group))
    }

    pub fn snapshot(&self) -> [Lamps; SIGNAL_GROUP_COUNT] {
        self.bank.lock(|bank| bank.borrow().lamps)
    }

    /// Writes every output low.
    pub fn darken_all(&self) -> Result<(), HalError> {
        self.bank.lock(|bank| {
            let mut bank = bank.borrow_mut();
            for group in SignalGroupId::ALL {
                bank.force(group, Lamps::DARK)?;
            }
            Ok(())
        })
    }

    /// Drives every head to solid red, attempting every channel even after a
    /// failure. Returns the first failure.
    pub fn fail_safe(&self) -> Result<(), HalError> {
        self.bank.lock(|bank| {
            let mut bank = bank.borrow_mut();
            let mut first_error = None;
            for group in SignalGroupId::ALL {
                if let Err(error) = bank.force(group, Lamps::RED) {
                    first_error.get_or_insert(error);
                }
            }
            first_error.map_or(Ok(()), Err)
        })
    }
}
