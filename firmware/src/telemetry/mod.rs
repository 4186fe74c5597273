//! Controller event stream for the firmware target.
//!
//! The controller records into a [`ChannelSink`] without ever blocking: when
//! the queue is full the event is counted and dropped. A low-priority task
//! drains the queue into defmt (stdout on host builds).

#![cfg_attr(not(target_os = "none"), allow(dead_code))]

use core::time::Duration;

use embassy_sync::blocking_mutex::raw::RawMutex;
use embassy_sync::channel::Channel;
use portable_atomic::{AtomicU32, Ordering};
use signal_core::telemetry::{EventId, EventSink, TelemetryEventKind, TelemetryRecord};

/// Events buffered between the controller and the logging task.
pub const EVENT_QUEUE_DEPTH: usize = 32;

pub type EventChannel<M> = Channel<M, TelemetryRecord, EVENT_QUEUE_DEPTH>;

pub struct ChannelSink<'a, M: RawMutex> {
    channel: &'a EventChannel<M>,
    next_event_id: AtomicU32,
    dropped: AtomicU32,
}

impl<'a, M: RawMutex> ChannelSink<'a, M> {
    pub const fn new(channel: &'a EventChannel<M>) -> Self {
        Self {
            channel,
            next_event_id: AtomicU32::new(0),
            dropped: AtomicU32::new(0),
        }
    }

    /// Events discarded because the queue was full.
    pub fn dropped(&self) -> u32 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Logs queued events forever, reporting any gap before the next record.
    pub async fn drain(&self) -> ! {
        let mut reported = 0;
        loop {
            let record = self.channel.receive().await;
            let dropped = self.dropped();
            if dropped != reported {
                log_dropped(dropped.wrapping_sub(reported));
                reported = dropped;
            }
            log_record(&record);
        }
    }
}

impl<M: RawMutex> EventSink for ChannelSink<'_, M> {
    fn record(&self, at: Duration, event: TelemetryEventKind) {
        let id: EventId = self.next_event_id.fetch_add(1, Ordering::Relaxed);
        if self
            .channel
            .try_send(TelemetryRecord { id, at, event })
            .is_err()
        {
            self.dropped.fetch_add(1, Ordering::Relaxed);
        }
    }
}

#[cfg(target_os = "none")]
fn log_record(record: &TelemetryRecord) {
    match record.event {
        TelemetryEventKind::Fault(_) | TelemetryEventKind::FailSafe => {
            defmt::error!("telemetry {}", defmt::Display2Format(record));
        }
        _ => defmt::info!("telemetry {}", defmt::Display2Format(record)),
    }
}

#[cfg(not(target_os = "none"))]
fn log_record(record: &TelemetryRecord) {
    println!("telemetry {record}");
}

#[cfg(target_os = "none")]
fn log_dropped(count: u32) {
    defmt::warn!("telemetry: {} events dropped (queue full)", count);
}

#[cfg(not(target_os = "none"))]
fn log_dropped(count: u32) {
    println!("telemetry: {count} events dropped (queue full)");
}

#[cfg(test)]
mod tests {
    use embassy_sync::blocking_mutex::raw::NoopRawMutex;
    use signal_core::intersection::{MovementId, TurnLaneId};

    use super::*;

    #[test]
    fn records_carry_sequential_ids() {
        let channel: EventChannel<NoopRawMutex> = Channel::new();
        let sink = ChannelSink::new(&channel);

        sink.record(Duration::from_secs(1), TelemetryEventKind::Startup);
        sink.record(
            Duration::from_secs(2),
            TelemetryEventKind::PhaseGreen(MovementId::Artery),
        );

        let first = channel.try_receive().expect("first record");
        let second = channel.try_receive().expect("second record");
        assert_eq!((first.id, first.event), (0, TelemetryEventKind::Startup));
        assert_eq!(second.id, 1);
        assert_eq!(second.at, Duration::from_secs(2));
        assert_eq!(sink.dropped(), 0);
    }

    #[test]
    fn full_queue_drops_and_counts() {
        let channel: EventChannel<NoopRawMutex> = Channel::new();
        let sink = ChannelSink::new(&channel);

        for _ in 0..EVENT_QUEUE_DEPTH + 3 {
            sink.record(
                Duration::ZERO,
                TelemetryEventKind::TurnRequested(TurnLaneId::TechTurn),
            );
        }

        assert_eq!(sink.dropped(), 3);
        assert_eq!(channel.len(), EVENT_QUEUE_DEPTH);
    }
}
