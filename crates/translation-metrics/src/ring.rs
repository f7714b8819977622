use chrono::{DateTime, Utc};

use crate::types::MetricEvent;

/// Fixed-capacity circular buffer of the most recent events.
///
/// Slots are allocated once; `push` overwrites the oldest slot when full.
#[derive(Debug)]
pub struct RecentEvents {
    slots: Vec<Option<MetricEvent>>,
    next: usize,
    len: usize,
}

impl RecentEvents {
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            slots: (0..capacity).map(|_| None).collect(),
            next: 0,
            len: 0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Returns the evicted event, if any.
    pub fn push(&mut self, event: MetricEvent) -> Option<MetricEvent> {
        let evicted = self.slots[self.next].replace(event);
        self.next = (self.next + 1) % self.capacity();
        if self.len < self.capacity() {
            self.len += 1;
        }
        evicted
    }

    /// Newest first.
    pub fn iter_newest(&self) -> impl Iterator<Item = &MetricEvent> + '_ {
        let capacity = self.capacity();
        (1..=self.len).filter_map(move |offset| {
            let slot = (self.next + capacity - offset) % capacity;
            self.slots[slot].as_ref()
        })
    }

    pub fn recent(&self, limit: usize) -> Vec<MetricEvent> {
        self.iter_newest().take(limit).cloned().collect()
    }

    /// Events at or after `cutoff`, newest first. Insertion order is assumed
    /// to follow timestamps closely, so the scan stops at the first older event.
    pub fn since(&self, cutoff: DateTime<Utc>) -> Vec<MetricEvent> {
        self.iter_newest()
            .take_while(|event| event.timestamp >= cutoff)
            .cloned()
            .collect()
    }

    pub fn service_since(&self, service: &str, cutoff: DateTime<Utc>) -> Vec<MetricEvent> {
        self.iter_newest()
            .take_while(|event| event.timestamp >= cutoff)
            .filter(|event| event.service_name == service)
            .cloned()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, TimeZone, Utc};

    use super::RecentEvents;
    use crate::types::MetricEvent;

    fn event(service: &str, minute: i64) -> MetricEvent {
        let base = Utc
            .with_ymd_and_hms(2026, 3, 1, 12, 0, 0)
            .single()
            .expect("valid datetime");
        MetricEvent::new(service, "translate", true, 1.0).at(base + Duration::minutes(minute))
    }

    #[test]
    fn ring_drops_the_oldest_event_when_full() {
        let mut ring = RecentEvents::with_capacity(3);
        assert!(ring.push(event("a", 0)).is_none());
        ring.push(event("a", 1));
        ring.push(event("a", 2));
        let evicted = ring.push(event("a", 3)).expect("evicted");

        assert_eq!(evicted.timestamp, event("a", 0).timestamp);
        assert_eq!(ring.len(), 3);
        let minutes: Vec<_> = ring
            .iter_newest()
            .map(|event| event.timestamp.format("%M").to_string())
            .collect();
        assert_eq!(minutes, vec!["03", "02", "01"]);
    }

    #[test]
    fn ring_filters_recent_window_by_service() {
        let mut ring = RecentEvents::with_capacity(10);
        for minute in 0..6 {
            let service = if minute % 2 == 0 { "a" } else { "b" };
            ring.push(event(service, minute));
        }

        let cutoff = event("a", 2).timestamp;
        assert_eq!(ring.since(cutoff).len(), 4);
        assert_eq!(ring.service_since("a", cutoff).len(), 2);
        assert_eq!(ring.recent(2).len(), 2);
    }

    #[test]
    fn zero_capacity_is_rounded_up() {
        let mut ring = RecentEvents::with_capacity(0);
        ring.push(event("a", 0));
        ring.push(event("a", 1));
        assert_eq!(ring.capacity(), 1);
        assert_eq!(ring.len(), 1);
    }
}
