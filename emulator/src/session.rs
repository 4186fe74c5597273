use std::fs::{self, OpenOptions};
use std::future::Future;
use std::io::{self, BufWriter, Write};
use std::path::Path;
use std::pin::Pin;
use std::task::Poll;
use std::time::Duration;

use embassy_sync::blocking_mutex::raw::NoopRawMutex;
use embassy_sync::signal::Signal;
use signal_core::console::{self, ConsoleCommand, ConsoleError, HELP_TOPICS};
use signal_core::intersection::{ALL_SENSORS, ALL_SIGNAL_HEADS, ALL_TURN_LANES, sensor_by_id};
use signal_core::sim::{self, SimClock, SimInputs, SimOutputs};
use signal_core::telemetry::{EventId, TelemetryRing};
use signal_core::{Controller, IntersectionConfig, ShutdownCause};

type EventRing = TelemetryRing<NoopRawMutex>;
type SimController =
    Controller<'static, NoopRawMutex, &'static SimOutputs, SimInputs, SimClock, EventRing>;
type RunFuture = Pin<Box<dyn Future<Output = ShutdownCause>>>;

/// Simulated hardware the controller runs against for the whole process.
struct Bench {
    clock: SimClock,
    outputs: SimOutputs,
    inputs: SimInputs,
    events: EventRing,
    shutdown: Signal<NoopRawMutex, ()>,
}

pub struct Session {
    bench: &'static Bench,
    controller: &'static SimController,
    run: Option<RunFuture>,
    outcome: Option<ShutdownCause>,
    next_event: EventId,
    transcript: Option<TranscriptLogger>,
}

impl Session {
    pub fn new(transcript: Option<&Path>) -> io::Result<Self> {
        let transcript = transcript.map(TranscriptLogger::new).transpose()?;

        // The controller borrows the bench and the run future borrows the
        // controller; both live until the process exits.
        let bench: &'static Bench = Box::leak(Box::new(Bench {
            clock: SimClock::new(),
            outputs: SimOutputs::new(),
            inputs: SimInputs::new(),
            events: TelemetryRing::new(),
            shutdown: Signal::new(),
        }));
        let controller = Controller::new(
            IntersectionConfig::default(),
            &bench.outputs,
            &bench.inputs,
            &bench.clock,
            &bench.events,
        )
        .map_err(io::Error::other)?;
        let controller: &'static SimController = Box::leak(Box::new(controller));

        let run: RunFuture = Box::pin(controller.run(&bench.shutdown));
        let mut session = Self {
            bench,
            controller,
            run: Some(run),
            outcome: None,
            next_event: 0,
            transcript,
        };
        session.advance(Duration::ZERO);
        Ok(session)
    }

    /// Lines printed once at startup: the event backlog from controller start.
    pub fn banner(&mut self) -> Vec<String> {
        self.drain_events()
    }

    /// Simulated clock, marked once the controller has stopped.
    pub fn clock_label(&self) -> String {
        let now = format_time(self.controller.now());
        if self.outcome.is_some() {
            format!("[t={now} halted]")
        } else {
            format!("[t={now}]")
        }
    }

    pub fn prompt(&self) -> String {
        format!("{} signal> ", self.clock_label())
    }

    pub fn handle_command(&mut self, line: &str) -> io::Result<Vec<String>> {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            return Ok(Vec::new());
        }

        let at = self.controller.now();
        self.log(at, TranscriptRole::Host, trimmed)?;

        let lines = match console::parse(trimmed) {
            Ok(command) => self.execute(command),
            Err(ConsoleError::Empty) => Vec::new(),
            Err(error) => vec![format!("ERR {error}")],
        };

        let at = self.controller.now();
        for line in &lines {
            self.log(at, TranscriptRole::Emulator, line)?;
        }
        Ok(lines)
    }

    fn execute(&mut self, command: ConsoleCommand<'_>) -> Vec<String> {
        match command {
            ConsoleCommand::Sensor { sensor, active } => {
                self.bench.inputs.set_active(sensor, active);
                vec![format!(
                    "OK {} {}",
                    sensor_by_id(sensor).tag,
                    if active { "occupied" } else { "clear" }
                )]
            }
            ConsoleCommand::Advance(span) => {
                let mut lines = match self.outcome {
                    Some(cause) => vec![format!("ERR controller stopped: {}", describe(cause))],
                    None => {
                        self.advance(span);
                        vec![format!("OK t={}", format_time(self.controller.now()))]
                    }
                };
                lines.extend(self.drain_events());
                lines
            }
            ConsoleCommand::Status => self.status(),
            ConsoleCommand::Events => {
                let lines = self.drain_events();
                if lines.is_empty() {
                    vec!["no new events".to_string()]
                } else {
                    lines
                }
            }
            ConsoleCommand::Shutdown => {
                self.bench.shutdown.signal(());
                self.advance(Duration::ZERO);
                let mut lines = match self.outcome {
                    Some(cause) => vec![format!("OK {}", describe(cause))],
                    None => vec!["ERR controller did not stop".to_string()],
                };
                lines.extend(self.drain_events());
                lines
            }
            ConsoleCommand::Help(topic) => help(topic),
        }
    }

    fn advance(&mut self, span: Duration) {
        let Some(run) = self.run.as_mut() else {
            return;
        };
        if let Poll::Ready(cause) = sim::advance(&self.bench.clock, run.as_mut(), span, |_| {}) {
            self.run = None;
            self.outcome = Some(cause);
        }
    }

    fn status(&self) -> Vec<String> {
        let controller = self.controller;
        let mut lines = vec![format!(
            "t={} state={}",
            format_time(self.controller.now()),
            self.outcome.map_or_else(|| "running".to_string(), describe)
        )];

        for head in ALL_SIGNAL_HEADS {
            lines.push(format!(
                "  {:<12} {}",
                head.name,
                controller.heads().aspect(head.id)
            ));
        }

        let flags = controller.coordination().snapshot();
        lines.push(format!(
            "  turn in progress: {}",
            yes_no(flags.turn_in_progress)
        ));
        for lane in ALL_TURN_LANES {
            lines.push(format!(
                "  {:<12} flashing={} flasher={}",
                lane.name,
                yes_no(flags.flashing_active[lane.id.as_index()]),
                if controller.flashers().is_alive(lane.id) {
                    "alive"
                } else {
                    "idle"
                }
            ));
        }

        let occupied: Vec<&str> = ALL_SENSORS
            .iter()
            .filter(|sensor| self.bench.inputs.is_active(sensor.id))
            .map(|sensor| sensor.tag)
            .collect();
        lines.push(if occupied.is_empty() {
            "  detectors: all clear".to_string()
        } else {
            format!("  detectors: {}", occupied.join(", "))
        });
        lines
    }

    /// Renders events recorded since the previous call.
    fn drain_events(&mut self) -> Vec<String> {
        let events = &self.bench.events;
        let newest = events.next_id();
        let fresh = events.since(self.next_event);

        let mut lines = Vec::new();
        let missed = newest
            .wrapping_sub(self.next_event)
            .saturating_sub(u32::try_from(fresh.len()).unwrap_or(u32::MAX));
        if missed > 0 {
            lines.push(format!("({missed} older events dropped)"));
        }
        lines.extend(fresh.iter().map(ToString::to_string));
        self.next_event = newest;
        lines
    }

    fn log(&mut self, at: Duration, role: TranscriptRole, line: &str) -> io::Result<()> {
        match self.transcript.as_mut() {
            Some(transcript) => transcript.append_line(at, role, line),
            None => Ok(()),
        }
    }
}

fn help(topic: Option<&str>) -> Vec<String> {
    let mut lines = Vec::new();
    match topic {
        Some(target) => {
            if let Some(detail) = console::help_for(target) {
                lines.push(detail.to_string());
            } else {
                lines.push(format!("No help available for `{target}`."));
                lines.push(format!("Available topics: {}", help_topic_list()));
            }
        }
        None => {
            lines.push("Available commands:".to_string());
            for (_, detail) in HELP_TOPICS {
                lines.push(format!("  {detail}"));
            }
            lines.push("Type `help <topic>` for a specific command.".to_string());
        }
    }
    lines
}

fn help_topic_list() -> String {
    HELP_TOPICS
        .iter()
        .map(|(name, _)| *name)
        .collect::<Vec<_>>()
        .join(", ")
}

fn describe(cause: ShutdownCause) -> String {
    match cause {
        ShutdownCause::Requested => "stopped on request, all red".to_string(),
        ShutdownCause::Fault(error) => format!("stopped on fault ({error}), all red"),
    }
}

fn yes_no(value: bool) -> &'static str {
    if value { "yes" } else { "no" }
}

fn format_time(at: Duration) -> String {
    format!("{}.{:03}s", at.as_secs(), at.subsec_millis())
}

struct TranscriptLogger {
    writer: BufWriter<std::fs::File>,
}

impl TranscriptLogger {
    fn new(path: &Path) -> io::Result<Self> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(path)?;

        let mut logger = Self {
            writer: BufWriter::new(file),
        };
        logger.write_header()?;
        Ok(logger)
    }

    fn write_header(&mut self) -> io::Result<()> {
        writeln!(self.writer, "# Intersection emulator transcript")?;
        writeln!(self.writer, "# Timestamps are virtual milliseconds since controller start")?;
        writeln!(self.writer)?;
        self.writer.flush()
    }

    fn append_line(
        &mut self,
        at: Duration,
        role: TranscriptRole,
        line: &str,
    ) -> io::Result<()> {
        writeln!(
            self.writer,
            "[+{:>8} ms] {} {}",
            at.as_millis(),
            role.prefix(),
            line
        )?;
        self.writer.flush()
    }
}

#[derive(Clone, Copy)]
enum TranscriptRole {
    Host,
    Emulator,
}

impl TranscriptRole {
    fn prefix(self) -> &'static str {
        match self {
            TranscriptRole::Host => "HOST>",
            TranscriptRole::Emulator => "EMU <",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn startup_banner_reports_initial_green() {
        let mut session = Session::new(None).expect("session");
        let banner = session.banner();
        assert!(banner.iter().any(|line| line.contains("controller started")));
        assert!(banner.iter().any(|line| line.contains("US-120 green")));
    }

    #[test]
    fn prompt_follows_the_clock_until_shutdown() {
        let mut session = Session::new(None).expect("session");
        assert!(session.prompt().starts_with("[t=0.000"), "{}", session.prompt());

        session.handle_command("advance 2s").expect("advance");
        assert!(session.prompt().starts_with("[t=2.0"), "{}", session.prompt());

        session.handle_command("shutdown").expect("shutdown");
        assert!(session.prompt().ends_with("halted] signal> "), "{}", session.prompt());
    }

    #[test]
    fn demand_moves_the_intersection_to_the_cross_street() {
        let mut session = Session::new(None).expect("session");
        session.handle_command("sensor martin-stop on").expect("sensor");
        session.handle_command("advance 12s").expect("advance");

        let status = session.handle_command("status").expect("status");
        assert!(
            status
                .iter()
                .any(|line| line.contains("Martin") && line.ends_with("GREEN")),
            "{status:?}"
        );
    }

    #[test]
    fn shutdown_stops_the_controller() {
        let mut session = Session::new(None).expect("session");
        let lines = session.handle_command("shutdown").expect("shutdown");
        assert!(lines[0].starts_with("OK stopped on request"));

        let lines = session.handle_command("advance 1s").expect("advance");
        assert!(lines[0].starts_with("ERR controller stopped"));
    }

    #[test]
    fn syntax_errors_are_reported() {
        let mut session = Session::new(None).expect("session");
        let lines = session.handle_command("advance soon").expect("command");
        assert_eq!(lines, vec!["ERR unrecognised command; try `help`".to_string()]);
    }
}
