//! Per-update sampled event buffer and snapshot ranges.

use serde::{Deserialize, Serialize};

use crate::ids::StringId;
use crate::index::NodeIndex;

/// `[start, end)` slice of the sampled event buffer, valid only within the update that
/// produced it.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SampledEventRange {
    pub start: usize,
    pub end: usize,
}

impl SampledEventRange {
    pub fn new(start: usize, end: usize) -> Self {
        debug_assert!(start <= end, "event range start {start} is past end {end}");
        SampledEventRange { start, end }
    }

    /// Zero-length range anchored at `offset`.
    pub fn empty(offset: usize) -> Self {
        SampledEventRange {
            start: offset,
            end: offset,
        }
    }

    pub fn len(&self) -> usize {
        self.end.saturating_sub(self.start)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Smallest range covering both. Empty ranges do not widen the other side.
    pub fn combine(self, other: SampledEventRange) -> SampledEventRange {
        if self.is_empty() {
            return other;
        }
        if other.is_empty() {
            return self;
        }
        SampledEventRange {
            start: self.start.min(other.start),
            end: self.end.max(other.end),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SampledEvent {
    pub source_node: NodeIndex,
    pub event_id: StringId,
    pub weight: f32,
    pub is_from_active_branch: bool,
}

/// Append-only log of events sampled during one update.
#[derive(Clone, Debug, Default)]
pub struct SampledEventsBuffer {
    events: Vec<SampledEvent>,
}

impl SampledEventsBuffer {
    pub fn with_capacity(capacity: usize) -> Self {
        SampledEventsBuffer {
            events: Vec::with_capacity(capacity),
        }
    }

    pub fn num_sampled_events(&self) -> usize {
        self.events.len()
    }

    pub fn emplace_graph_event(
        &mut self,
        source_node: NodeIndex,
        event_id: StringId,
        is_from_active_branch: bool,
    ) -> &mut SampledEvent {
        let index = self.events.len();
        self.events.push(SampledEvent {
            source_node,
            event_id,
            weight: 1.0,
            is_from_active_branch,
        });
        &mut self.events[index]
    }

    /// Events sampled since `start`.
    pub fn range_since(&self, start: usize) -> SampledEventRange {
        SampledEventRange::new(start.min(self.events.len()), self.events.len())
    }

    /// Events inside `range`. A range that runs past the buffer (e.g. one kept from a
    /// previous update) is truncated.
    pub fn events(&self, range: SampledEventRange) -> &[SampledEvent] {
        debug_assert!(
            range.end <= self.events.len(),
            "event range {range:?} is stale for a buffer of {} events",
            self.events.len()
        );
        let end = range.end.min(self.events.len());
        let start = range.start.min(end);
        &self.events[start..end]
    }

    pub fn all(&self) -> &[SampledEvent] {
        &self.events
    }

    /// Multiply the weight of every event in `range` by `factor`.
    pub fn update_weights(&mut self, range: SampledEventRange, factor: f32) {
        let end = range.end.min(self.events.len());
        for event in &mut self.events[range.start.min(end)..end] {
            event.weight *= factor;
        }
    }

    pub fn mark_from_inactive_branch(&mut self, range: SampledEventRange) {
        let end = range.end.min(self.events.len());
        for event in &mut self.events[range.start.min(end)..end] {
            event.is_from_active_branch = false;
        }
    }

    pub fn clear(&mut self) {
        self.events.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node(raw: i16) -> NodeIndex {
        NodeIndex::new(raw).unwrap()
    }

    #[test]
    fn ranges_track_events_since_snapshot() {
        let mut buffer = SampledEventsBuffer::with_capacity(4);
        buffer.emplace_graph_event(node(0), "footstep".into(), true);
        let start = buffer.num_sampled_events();
        buffer.emplace_graph_event(node(1), "land".into(), true);
        buffer.emplace_graph_event(node(1), "jump".into(), true);

        let range = buffer.range_since(start);
        assert_eq!(range, SampledEventRange::new(1, 3));
        let ids: Vec<_> = buffer.events(range).iter().map(|e| e.event_id.as_str()).collect();
        assert_eq!(ids, ["land", "jump"]);
    }

    #[test]
    fn weights_and_branch_flags_apply_to_range_only() {
        let mut buffer = SampledEventsBuffer::default();
        buffer.emplace_graph_event(node(0), "a".into(), true);
        buffer.emplace_graph_event(node(0), "b".into(), true);
        let tail = SampledEventRange::new(1, 2);
        buffer.update_weights(tail, 0.25);
        buffer.mark_from_inactive_branch(tail);

        assert_eq!(buffer.all()[0].weight, 1.0);
        assert!(buffer.all()[0].is_from_active_branch);
        assert_eq!(buffer.all()[1].weight, 0.25);
        assert!(!buffer.all()[1].is_from_active_branch);
    }

    #[test]
    fn combine_ignores_empty_side() {
        let a = SampledEventRange::new(2, 4);
        assert_eq!(a.combine(SampledEventRange::empty(9)), a);
        assert_eq!(SampledEventRange::empty(0).combine(a), a);
        assert_eq!(a.combine(SampledEventRange::new(4, 6)), SampledEventRange::new(2, 6));
    }
}
