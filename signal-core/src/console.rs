//! Operator console grammar.
//!
//! Lines are parsed with `winnow` into a [`ConsoleCommand`]. The grammar is
//! small enough to stay allocation-free so it compiles for every target.

use core::{fmt, time::Duration};

use winnow::ascii::{digit1, space0, space1};
use winnow::combinator::{alt, opt, preceded, terminated};
use winnow::prelude::*;
use winnow::token::take_while;

use crate::intersection::SensorId;

/// Help text for each command, in display order.
pub const HELP_TOPICS: &[(&str, &str)] = &[
    ("sensor", "sensor <tag> on|off        - occupy or clear a detector"),
    ("advance", "advance <n>ms|<n>s         - run the intersection forward"),
    ("status", "status                     - show heads and coordination flags"),
    ("events", "events                     - show events since the last call"),
    ("shutdown", "shutdown                   - request fail-safe shutdown"),
    ("help", "help [topic]               - show help for a command"),
];

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum ConsoleCommand<'a> {
    Sensor { sensor: SensorId, active: bool },
    Advance(Duration),
    Status,
    Events,
    Shutdown,
    Help(Option<&'a str>),
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum ConsoleError {
    Empty,
    Syntax,
}

impl fmt::Display for ConsoleError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConsoleError::Empty => f.write_str("empty command"),
            ConsoleError::Syntax => f.write_str("unrecognised command; try `help`"),
        }
    }
}

/// Parses one console line.
pub fn parse(line: &str) -> Result<ConsoleCommand<'_>, ConsoleError> {
    let line = line.trim();
    if line.is_empty() {
        return Err(ConsoleError::Empty);
    }
    command.parse(line).map_err(|_| ConsoleError::Syntax)
}

fn command<'a>(input: &mut &'a str) -> ModalResult<ConsoleCommand<'a>> {
    terminated(
        alt((
            sensor,
            advance,
            "status".value(ConsoleCommand::Status),
            "events".value(ConsoleCommand::Events),
            "shutdown".value(ConsoleCommand::Shutdown),
            help,
        )),
        space0,
    )
    .parse_next(input)
}

fn sensor<'a>(input: &mut &'a str) -> ModalResult<ConsoleCommand<'a>> {
    (
        preceded(("sensor", space1), sensor_tag),
        preceded(space1, alt(("on".value(true), "off".value(false)))),
    )
        .map(|(sensor, active)| ConsoleCommand::Sensor { sensor, active })
        .parse_next(input)
}

fn sensor_tag(input: &mut &str) -> ModalResult<SensorId> {
    take_while(1.., |c: char| c.is_ascii_alphanumeric() || c == '-')
        .verify_map(SensorId::from_tag)
        .parse_next(input)
}

fn advance<'a>(input: &mut &'a str) -> ModalResult<ConsoleCommand<'a>> {
    preceded(("advance", space1), duration)
        .map(ConsoleCommand::Advance)
        .parse_next(input)
}

fn duration(input: &mut &str) -> ModalResult<Duration> {
    type Unit = fn(u64) -> Duration;
    (
        digit1.parse_to::<u64>(),
        alt((
            "ms".value(Duration::from_millis as Unit),
            "s".value(Duration::from_secs as Unit),
        )),
    )
        .map(|(value, unit)| unit(value))
        .parse_next(input)
}

fn help<'a>(input: &mut &'a str) -> ModalResult<ConsoleCommand<'a>> {
    preceded(
        "help",
        opt(preceded(
            space1,
            take_while(1.., |c: char| c.is_ascii_alphabetic()),
        )),
    )
    .map(ConsoleCommand::Help)
    .parse_next(input)
}

/// Looks up the help line for `topic`.
pub fn help_for(topic: &str) -> Option<&'static str> {
    HELP_TOPICS
        .iter()
        .find(|(name, _)| name.eq_ignore_ascii_case(topic))
        .map(|(_, text)| *text)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_sensor_toggles() {
        assert_eq!(
            parse("sensor martin-stop on"),
            Ok(ConsoleCommand::Sensor {
                sensor: SensorId::MartinStop,
                active: true
            })
        );
        assert_eq!(
            parse("  sensor W120-Turn off "),
            Ok(ConsoleCommand::Sensor {
                sensor: SensorId::Westbound120Turn,
                active: false
            })
        );
    }

    #[test]
    fn parses_durations_in_both_units() {
        assert_eq!(
            parse("advance 250ms"),
            Ok(ConsoleCommand::Advance(Duration::from_millis(250)))
        );
        assert_eq!(
            parse("advance 45s"),
            Ok(ConsoleCommand::Advance(Duration::from_secs(45)))
        );
    }

    #[test]
    fn parses_bare_keywords_and_help_topics() {
        assert_eq!(parse("status"), Ok(ConsoleCommand::Status));
        assert_eq!(parse("events"), Ok(ConsoleCommand::Events));
        assert_eq!(parse("shutdown"), Ok(ConsoleCommand::Shutdown));
        assert_eq!(parse("help"), Ok(ConsoleCommand::Help(None)));
        assert_eq!(parse("help sensor"), Ok(ConsoleCommand::Help(Some("sensor"))));
    }

    #[test]
    fn rejects_malformed_lines() {
        assert_eq!(parse(""), Err(ConsoleError::Empty));
        assert_eq!(parse("sensor elm-stop on"), Err(ConsoleError::Syntax));
        assert_eq!(parse("advance 10 minutes"), Err(ConsoleError::Syntax));
        assert_eq!(parse("status please"), Err(ConsoleError::Syntax));
    }

    #[test]
    fn help_topics_resolve() {
        assert!(help_for("ADVANCE").is_some_and(|text| text.starts_with("advance")));
        assert_eq!(help_for("reboot"), None);
    }
}
