//! Event fanout to subscriber sinks
//!
//! Each subscriber owns a bounded mpsc channel, which preserves per-sink
//! FIFO order. A sink whose delivery fails (closed, or full because the
//! consumer is slow) is dropped from the set rather than allowed to stall
//! the broadcast.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use tokio::sync::mpsc;
use tracing::{debug, info};

use nubi_model::Event;

/// Default per-sink buffer; deep enough for bursts of immediate emissions
/// between consumer polls.
pub const SINK_BUFFER: usize = 64;

/// Opaque subscriber handle
pub type SinkId = u64;

/// Registry of subscriber sinks
#[derive(Default)]
pub struct Fanout {
    sinks: Mutex<HashMap<SinkId, mpsc::Sender<Event>>>,
    next_id: AtomicU64,
}

impl Fanout {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a sink and return its id plus the receiving end.
    pub fn subscribe(&self) -> (SinkId, mpsc::Receiver<Event>) {
        let (tx, rx) = mpsc::channel(SINK_BUFFER);
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let total = {
            let mut sinks = self.sinks.lock().unwrap();
            sinks.insert(id, tx);
            sinks.len()
        };
        info!(sink_id = id, total, "subscriber connected");
        (id, rx)
    }

    /// Remove a sink explicitly (consumer went away cleanly).
    pub fn unsubscribe(&self, id: SinkId) {
        let total = {
            let mut sinks = self.sinks.lock().unwrap();
            sinks.remove(&id);
            sinks.len()
        };
        info!(sink_id = id, total, "subscriber disconnected");
    }

    /// Deliver an event to every sink, dropping the ones that fail.
    pub fn broadcast(&self, event: Event) {
        let mut dropped = Vec::new();
        {
            let mut sinks = self.sinks.lock().unwrap();
            sinks.retain(|id, tx| {
                if tx.try_send(event.clone()).is_ok() {
                    true
                } else {
                    dropped.push(*id);
                    false
                }
            });
        }
        for id in dropped {
            debug!(sink_id = id, "dropped unresponsive subscriber sink");
        }
    }

    /// Deliver a batch of events to one specific sink.
    pub fn send_to(&self, id: SinkId, events: Vec<Event>) {
        let sinks = self.sinks.lock().unwrap();
        if let Some(tx) = sinks.get(&id) {
            for event in events {
                if tx.try_send(event).is_err() {
                    break;
                }
            }
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.sinks.lock().unwrap().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nubi_model::{MaintenancePayload, NginxStatusPayload};

    fn status_event(running: bool) -> Event {
        Event::NginxStatus(NginxStatusPayload {
            running,
            config_valid: true,
            version: None,
        })
    }

    #[tokio::test]
    async fn broadcast_reaches_every_sink_in_order() {
        let fanout = Fanout::new();
        let (_a, mut rx_a) = fanout.subscribe();
        let (_b, mut rx_b) = fanout.subscribe();

        fanout.broadcast(status_event(true));
        fanout.broadcast(Event::MaintenanceMode(MaintenancePayload {
            enabled: true,
            message: None,
        }));

        for rx in [&mut rx_a, &mut rx_b] {
            assert!(matches!(rx.recv().await.unwrap(), Event::NginxStatus(_)));
            assert!(matches!(rx.recv().await.unwrap(), Event::MaintenanceMode(_)));
        }
    }

    #[tokio::test]
    async fn closed_sink_is_dropped_on_next_broadcast() {
        let fanout = Fanout::new();
        let (_a, rx_a) = fanout.subscribe();
        let (_b, _rx_b) = fanout.subscribe();
        assert_eq!(fanout.subscriber_count(), 2);

        drop(rx_a);
        fanout.broadcast(status_event(true));
        assert_eq!(fanout.subscriber_count(), 1);
    }

    #[tokio::test]
    async fn slow_sink_is_dropped_instead_of_blocking() {
        let fanout = Fanout::new();
        let (_id, _rx) = fanout.subscribe();

        // Fill the buffer without consuming; the next broadcast must drop
        // the sink rather than wait.
        for _ in 0..=SINK_BUFFER {
            fanout.broadcast(status_event(false));
        }
        assert_eq!(fanout.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn send_to_targets_one_sink() {
        let fanout = Fanout::new();
        let (id_a, mut rx_a) = fanout.subscribe();
        let (_b, mut rx_b) = fanout.subscribe();

        fanout.send_to(id_a, vec![status_event(true)]);
        assert!(rx_a.recv().await.is_some());
        assert!(rx_b.try_recv().is_err());
    }

    #[tokio::test]
    async fn unsubscribe_removes_sink() {
        let fanout = Fanout::new();
        let (id, _rx) = fanout.subscribe();
        fanout.unsubscribe(id);
        assert_eq!(fanout.subscriber_count(), 0);
    }
}
