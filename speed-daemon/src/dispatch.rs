//! Routes tickets to whichever dispatcher currently claims their
//! road, queueing them until one shows up (§4.6, §4.7).
//!
//! At most one dispatcher is registered per road at a time; a new
//! registration for a road replaces whatever was there before.

use std::collections::{HashMap, VecDeque};

use tokio::sync::mpsc::UnboundedSender;

use crate::wire::{ServerMessage, Ticket};

#[derive(Debug, Default)]
pub struct DispatcherRouter {
    dispatchers: HashMap<u16, (u64, UnboundedSender<ServerMessage>)>,
    claimed_by: HashMap<u64, Vec<u16>>,
    pending: HashMap<u16, VecDeque<Ticket>>,
}

impl DispatcherRouter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `conn_id`'s sender as the dispatcher for `roads`,
    /// replacing any prior dispatcher for each, then immediately
    /// flushes any tickets that were waiting.
    pub fn register(&mut self, conn_id: u64, roads: &[u16], sender: UnboundedSender<ServerMessage>) {
        for &road in roads {
            self.dispatchers.insert(road, (conn_id, sender.clone()));
            self.flush_road(road);
        }
        self.claimed_by.entry(conn_id).or_default().extend_from_slice(roads);
    }

    /// Drops `conn_id`'s claim on every road it registered for,
    /// provided it is still the current dispatcher there (a later
    /// registration by another connection may have already replaced
    /// it).
    pub fn unregister(&mut self, conn_id: u64) {
        let Some(roads) = self.claimed_by.remove(&conn_id) else { return };
        for road in roads {
            if matches!(self.dispatchers.get(&road), Some((id, _)) if *id == conn_id) {
                self.dispatchers.remove(&road);
            }
        }
    }

    /// Queues `ticket` for delivery, sending it immediately if a
    /// dispatcher for its road is already registered.
    pub fn enqueue(&mut self, ticket: Ticket) {
        self.pending.entry(ticket.road).or_default().push_back(ticket);
        self.flush_road(ticket.road);
    }

    /// Sends every pending ticket on `road` to its current dispatcher.
    /// A send failure (the dispatcher disconnected) leaves the ticket
    /// queued for whichever dispatcher registers next.
    fn flush_road(&mut self, road: u16) {
        let Some((_, sender)) = self.dispatchers.get(&road) else { return };

        let Some(pending) = self.pending.get_mut(&road) else { return };
        while let Some(ticket) = pending.pop_front() {
            if sender.send(ServerMessage::Ticket(ticket.clone())).is_err() {
                pending.push_front(ticket);
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ticket(road: u16) -> Ticket {
        Ticket {
            plate: b"UN1X".to_vec(),
            road,
            mile1: 0,
            timestamp1: 0,
            mile2: 100,
            timestamp2: 3600,
            speed_hundredths: 10000,
        }
    }

    #[tokio::test]
    async fn queues_until_a_dispatcher_registers() {
        let mut router = DispatcherRouter::new();
        router.enqueue(ticket(66));

        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        router.register(1, &[66], tx);

        let msg = rx.recv().await.unwrap();
        assert!(matches!(msg, ServerMessage::Ticket(t) if t.road == 66));
    }

    #[tokio::test]
    async fn delivers_immediately_when_dispatcher_already_present() {
        let mut router = DispatcherRouter::new();
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        router.register(1, &[66], tx);

        router.enqueue(ticket(66));

        let msg = rx.recv().await.unwrap();
        assert!(matches!(msg, ServerMessage::Ticket(t) if t.road == 66));
    }

    #[tokio::test]
    async fn unregistering_stops_future_deliveries() {
        let mut router = DispatcherRouter::new();
        let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
        router.register(1, &[66], tx);
        router.unregister(1);
        drop(rx);

        router.enqueue(ticket(66));
        assert!(router.pending.get(&66).is_some_and(|q| !q.is_empty()));
    }

    #[tokio::test]
    async fn later_registration_replaces_the_earlier_dispatcher() {
        let mut router = DispatcherRouter::new();
        let (tx1, rx1) = tokio::sync::mpsc::unbounded_channel();
        let (tx2, mut rx2) = tokio::sync::mpsc::unbounded_channel();

        router.register(1, &[66], tx1);
        router.register(2, &[66], tx2);
        drop(rx1);

        router.enqueue(ticket(66));
        let msg = rx2.recv().await.unwrap();
        assert!(matches!(msg, ServerMessage::Ticket(t) if t.road == 66));
    }

    #[tokio::test]
    async fn unregister_does_not_evict_a_replacement_dispatcher() {
        let mut router = DispatcherRouter::new();
        let (tx1, _rx1) = tokio::sync::mpsc::unbounded_channel();
        let (tx2, mut rx2) = tokio::sync::mpsc::unbounded_channel();

        router.register(1, &[66], tx1);
        router.register(2, &[66], tx2);
        router.unregister(1);

        router.enqueue(ticket(66));
        let msg = rx2.recv().await.unwrap();
        assert!(matches!(msg, ServerMessage::Ticket(t) if t.road == 66));
    }
}
