#![allow(dead_code)]

use std::cell::RefCell;
use std::future::Future;
use std::pin::Pin;
use std::task::Poll;
use std::time::Duration;

use embassy_sync::blocking_mutex::raw::NoopRawMutex;
use embassy_sync::signal::Signal;
use signal_core::intersection::{
    ALL_TURN_LANES, MovementId, SIGNAL_GROUP_COUNT, SignalGroupId,
};
use signal_core::signal::Aspect;
use signal_core::sim::{self, SimClock, SimInputs, SimOutputs};
use signal_core::telemetry::{EventSink, TelemetryEventKind};
use signal_core::{Controller, IntersectionConfig};

pub type TestController<'a> =
    Controller<'a, NoopRawMutex, &'a SimOutputs, SimInputs, SimClock, RecordingSink>;

pub fn ms(value: u64) -> Duration {
    Duration::from_millis(value)
}

pub fn secs(value: u64) -> Duration {
    Duration::from_secs(value)
}

/// Keeps every event with its timestamp.
#[derive(Default)]
pub struct RecordingSink {
    events: RefCell<Vec<(Duration, TelemetryEventKind)>>,
}

impl RecordingSink {
    pub fn events(&self) -> Vec<(Duration, TelemetryEventKind)> {
        self.events.borrow().clone()
    }

    pub fn first(&self, event: TelemetryEventKind) -> Option<Duration> {
        self.events
            .borrow()
            .iter()
            .find(|(_, recorded)| *recorded == event)
            .map(|(at, _)| *at)
    }

    pub fn count(&self, matches: impl Fn(&TelemetryEventKind) -> bool) -> usize {
        self.events
            .borrow()
            .iter()
            .filter(|(_, event)| matches(event))
            .count()
    }
}

impl EventSink for RecordingSink {
    fn record(&self, at: Duration, event: TelemetryEventKind) {
        self.events.borrow_mut().push((at, event));
    }
}

/// Simulated hardware plus the shutdown signal for one controller.
pub struct Bench {
    pub clock: SimClock,
    pub outputs: SimOutputs,
    pub inputs: SimInputs,
    pub events: RecordingSink,
    pub shutdown: Signal<NoopRawMutex, ()>,
}

impl Bench {
    pub fn new() -> Self {
        Self {
            clock: SimClock::new(),
            outputs: SimOutputs::new(),
            inputs: SimInputs::new(),
            events: RecordingSink::default(),
            shutdown: Signal::new(),
        }
    }

    pub fn controller(&self) -> TestController<'_> {
        self.controller_with(IntersectionConfig::default())
    }

    pub fn controller_with(&self, config: IntersectionConfig) -> TestController<'_> {
        Controller::new(config, &self.outputs, &self.inputs, &self.clock, &self.events)
            .expect("valid config")
    }
}

/// Records every aspect change and asserts the safety invariants after every
/// poll round.
pub struct Observer {
    changes: Vec<(Duration, SignalGroupId, Aspect)>,
    last: [Option<Aspect>; SIGNAL_GROUP_COUNT],
    turn_flag: Vec<(Duration, bool)>,
    last_turn_flag: bool,
}

impl Observer {
    pub fn new() -> Self {
        Self {
            changes: Vec::new(),
            last: [None; SIGNAL_GROUP_COUNT],
            turn_flag: Vec::new(),
            last_turn_flag: false,
        }
    }

    pub fn observe(&mut self, now: Duration, controller: &TestController<'_>) {
        assert_safe(now, controller);

        for group in SignalGroupId::ALL {
            let aspect = controller.heads().aspect(group);
            let last = &mut self.last[group.as_index()];
            if *last != Some(aspect) {
                *last = Some(aspect);
                self.changes.push((now, group, aspect));
            }
        }

        let flag = controller.coordination().turn_in_progress();
        if flag != self.last_turn_flag {
            self.last_turn_flag = flag;
            self.turn_flag.push((now, flag));
        }
    }

    /// First time `group` was seen showing `aspect`.
    pub fn first(&self, group: SignalGroupId, aspect: Aspect) -> Option<Duration> {
        self.first_after(group, aspect, Duration::ZERO)
    }

    pub fn first_after(
        &self,
        group: SignalGroupId,
        aspect: Aspect,
        after: Duration,
    ) -> Option<Duration> {
        self.changes
            .iter()
            .find(|(at, changed, shown)| *at >= after && *changed == group && *shown == aspect)
            .map(|(at, _, _)| *at)
    }

    /// Aspect `group` showed at the end of the poll round at `at`.
    pub fn aspect_at(&self, group: SignalGroupId, at: Duration) -> Option<Aspect> {
        self.changes
            .iter()
            .filter(|(when, changed, _)| *when <= at && *changed == group)
            .last()
            .map(|(_, _, aspect)| *aspect)
    }

    pub fn turn_flag_changes(&self) -> &[(Duration, bool)] {
        &self.turn_flag
    }
}

/// Advances `run` by `span`, observing every poll round.
pub fn drive<F>(
    bench: &Bench,
    controller: &TestController<'_>,
    run: Pin<&mut F>,
    span: Duration,
    observer: &mut Observer,
) -> Poll<F::Output>
where
    F: Future + ?Sized,
{
    sim::advance(&bench.clock, run, span, |now| observer.observe(now, controller))
}

pub fn assert_safe(now: Duration, controller: &TestController<'_>) {
    let heads = controller.heads();
    let artery = heads.movement_aspect(MovementId::Artery);
    let cross = heads.movement_aspect(MovementId::CrossStreet);
    assert!(
        !(artery == Aspect::Green && cross == Aspect::Green),
        "both through movements green at {now:?}"
    );

    for group in SignalGroupId::ALL {
        assert_ne!(
            heads.aspect(group),
            Aspect::Conflicting,
            "{group} shows two lamps at {now:?}"
        );
    }

    let mut green_turns = 0;
    for lane in ALL_TURN_LANES {
        let head = heads.aspect(lane.head);
        let alive = controller.flashers().is_alive(lane.id);
        let flashing = controller.coordination().flashing_active(lane.id);
        let shadow = heads.movement_aspect(lane.shadows);

        if head == Aspect::Green {
            green_turns += 1;
            assert!(
                !alive && !flashing,
                "{} green while its flasher is live at {now:?}",
                lane.name
            );
            assert_eq!(
                shadow,
                Aspect::Red,
                "{} green while its shadowed movement is not red at {now:?}",
                lane.name
            );
            assert_eq!(
                heads.movement_aspect(lane.crosses),
                Aspect::Red,
                "{} green while {} is not red at {now:?}",
                lane.name,
                lane.crosses
            );
        }

        if alive {
            assert!(
                shadow == Aspect::Green || head == Aspect::Red,
                "{} flashing after {} left green at {now:?}",
                lane.name,
                lane.shadows
            );
        }
    }
    assert!(green_turns <= 1, "{green_turns} turn lanes green at {now:?}");
}
