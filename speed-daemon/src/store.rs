//! Per-road, per-plate sighting history (§4.5).

use std::collections::HashMap;

/// A single camera sighting: `(timestamp, mile)`.
pub type Sighting = (u32, u16);

#[derive(Debug, Default)]
pub struct ObservationStore {
    sightings: HashMap<(Vec<u8>, u16), Vec<Sighting>>,
}

impl ObservationStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a sighting of `plate` on `road`, keeping the road's
    /// history sorted by timestamp. Cameras can arrive out of order
    /// relative to each other, so this re-sorts on every insert rather
    /// than assuming append-only order.
    pub fn record(&mut self, plate: &[u8], road: u16, mile: u16, timestamp: u32) {
        let history = self.sightings.entry((plate.to_vec(), road)).or_default();
        history.push((timestamp, mile));
        history.sort_by_key(|&(ts, _)| ts);
    }

    pub fn history(&self, plate: &[u8], road: u16) -> &[Sighting] {
        self.sightings
            .get(&(plate.to_vec(), road))
            .map_or(&[], Vec::as_slice)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keeps_history_sorted_despite_out_of_order_arrival() {
        let mut store = ObservationStore::new();
        store.record(b"UN1X", 66, 100, 5000);
        store.record(b"UN1X", 66, 110, 4000);

        assert_eq!(store.history(b"UN1X", 66), &[(4000, 110), (5000, 100)]);
    }

    #[test]
    fn separates_by_plate_and_road() {
        let mut store = ObservationStore::new();
        store.record(b"UN1X", 66, 100, 1000);
        store.record(b"UN1X", 77, 100, 1000);
        store.record(b"RE05BOY", 66, 100, 1000);

        assert_eq!(store.history(b"UN1X", 66).len(), 1);
        assert_eq!(store.history(b"UN1X", 77).len(), 1);
        assert_eq!(store.history(b"RE05BOY", 66).len(), 1);
    }
}
