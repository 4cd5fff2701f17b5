//! Turns sighting history into tickets, enforcing the one-ticket-per-car-per-day law (§4.5, §4.6).

use std::collections::HashMap;

use crate::store::Sighting;
use crate::wire::Ticket;

const SECONDS_PER_DAY: u32 = 86400;

/// Seconds-per-hour, used to convert mile/second deltas into mph.
const SECONDS_PER_HOUR: f64 = 3600.0;

/// A ticket is issued when the observed average speed exceeds the
/// posted limit by more than this many mph.
const TOLERANCE_MPH: f64 = 0.3;

fn day(timestamp: u32) -> u32 {
    timestamp / SECONDS_PER_DAY
}

/// Computes every candidate ticket arising from consecutive pairs of
/// sightings in `history`, in timestamp order. A plate seen out of
/// order still produces the same candidates once `history` has been
/// re-sorted by the caller, since every adjacent pair is re-examined
/// on each new observation rather than only the newest one.
pub fn candidate_tickets(plate: &[u8], road: u16, limit: u16, history: &[Sighting]) -> Vec<Ticket> {
    history
        .windows(2)
        .filter_map(|pair| {
            let (ts1, mile1) = pair[0];
            let (ts2, mile2) = pair[1];
            speed_mph(mile1, ts1, mile2, ts2).map(|mph| (mph, ts1, mile1, ts2, mile2))
        })
        .filter(|&(mph, ..)| mph > f64::from(limit) + TOLERANCE_MPH)
        .map(|(mph, ts1, mile1, ts2, mile2)| Ticket {
            plate: plate.to_vec(),
            road,
            mile1,
            timestamp1: ts1,
            mile2,
            timestamp2: ts2,
            speed_hundredths: speed_hundredths_floor(mph),
        })
        .collect()
}

/// Average speed in mph between two sightings, as an unrounded double,
/// or `None` if the two timestamps coincide (no elapsed time to average
/// over). The tolerance comparison against the posted limit must be
/// done on this raw value, not on a pre-rounded wire quantity.
fn speed_mph(mile1: u16, ts1: u32, mile2: u16, ts2: u32) -> Option<f64> {
    if ts1 == ts2 {
        return None;
    }

    let (early_mile, early_ts, late_mile, late_ts) = if ts1 < ts2 {
        (mile1, ts1, mile2, ts2)
    } else {
        (mile2, ts2, mile1, ts1)
    };

    let miles = f64::from(late_mile) - f64::from(early_mile);
    let hours = f64::from(late_ts - early_ts) / SECONDS_PER_HOUR;
    Some((miles / hours).abs())
}

/// Converts a raw mph speed into the wire `speed_hundredths` field:
/// `floor(speed * 100)`, clamped to the field's `u16` range.
fn speed_hundredths_floor(mph: f64) -> u16 {
    let hundredths = (mph * 100.0).floor();
    hundredths.min(f64::from(u16::MAX)) as u16
}

/// Tracks, per plate, which UTC days already have a ticket issued so
/// the one-ticket-per-car-per-day law can be enforced before a
/// candidate ticket is committed.
#[derive(Debug, Default)]
pub struct TicketDays {
    ticketed: HashMap<Vec<u8>, Vec<u32>>,
}

impl TicketDays {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether issuing `ticket` would overlap a day already ticketed
    /// for its plate.
    pub fn would_overlap(&self, ticket: &Ticket) -> bool {
        let Some(days) = self.ticketed.get(&ticket.plate) else { return false };
        let (start, end) = ticket_day_range(ticket);
        days.iter().any(|&d| d >= start && d <= end)
    }

    /// Marks every day `ticket` spans as ticketed for its plate.
    pub fn record(&mut self, ticket: &Ticket) {
        let (start, end) = ticket_day_range(ticket);
        let days = self.ticketed.entry(ticket.plate.clone()).or_default();
        days.extend(start..=end);
    }
}

fn ticket_day_range(ticket: &Ticket) -> (u32, u32) {
    let d1 = day(ticket.timestamp1);
    let d2 = day(ticket.timestamp2);
    (d1.min(d2), d1.max(d2))
}

/// Combines observation history with the per-day ticketing law to
/// decide which, if any, new tickets a fresh sighting produces.
#[derive(Debug, Default)]
pub struct TicketEngine {
    days: TicketDays,
}

impl TicketEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Re-evaluates every adjacent pair in `history` against the
    /// one-ticket-per-day law and returns the tickets that are newly
    /// eligible to be sent, marking their days as spent.
    pub fn evaluate(&mut self, plate: &[u8], road: u16, limit: u16, history: &[Sighting]) -> Vec<Ticket> {
        candidate_tickets(plate, road, limit, history)
            .into_iter()
            .filter(|ticket| !self.days.would_overlap(ticket))
            .inspect(|ticket| self.days.record(ticket))
            .collect()
    }
}
