//! Order-maintenance over live timestamps.

use std::collections::BTreeSet;
use std::ops::Bound;

use crate::error::AdaptiveError;
use crate::timestamp::Timestamp;

/// Default distance between consecutive timestamps appended at the tail.
pub const DEFAULT_TAIL_STRIDE: u32 = 1 << 16;

/// Configuration of timestamp allocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimelineConfig {
    /// Increment of the leading digit when allocating past the greatest timestamp.
    ///
    /// Smaller strides leave more room for later tail insertions at the same depth; a
    /// zero stride is treated as 1.
    pub tail_stride: u32,
}

impl Default for TimelineConfig {
    fn default() -> Self {
        Self {
            tail_stride: DEFAULT_TAIL_STRIDE,
        }
    }
}

/// The totally ordered set of live timestamps.
///
/// Starts with exactly one timestamp, the origin.
#[derive(Debug, Clone)]
pub struct Timeline {
    live: BTreeSet<Timestamp>,
    config: TimelineConfig,
}

impl Default for Timeline {
    fn default() -> Self {
        Self::new(TimelineConfig::default())
    }
}

impl Timeline {
    /// Create a timeline holding only the origin.
    pub fn new(config: TimelineConfig) -> Self {
        let mut live = BTreeSet::new();
        live.insert(Timestamp::origin());
        Self { live, config }
    }

    /// The first timestamp of every timeline.
    pub fn origin(&self) -> Timestamp {
        Timestamp::origin()
    }

    /// Allocate a timestamp immediately after `after`, before its current successor.
    pub fn insert_after(&mut self, after: &Timestamp) -> Result<Timestamp, AdaptiveError> {
        if !self.live.contains(after) {
            return Err(AdaptiveError::UnknownTimestamp(after.clone()));
        }
        let next = self
            .live
            .range((Bound::Excluded(after), Bound::Unbounded))
            .next();
        let fresh = match next {
            Some(next) => after
                .between(next, self.config.tail_stride)
                .ok_or_else(|| AdaptiveError::UnknownTimestamp(after.clone()))?,
            None => after.successor(self.config.tail_stride),
        };
        self.live.insert(fresh.clone());
        Ok(fresh)
    }

    /// Remove every timestamp strictly between `from` and `to`, returning how many went.
    pub fn delete_range(&mut self, from: &Timestamp, to: &Timestamp) -> Result<usize, AdaptiveError> {
        if from > to {
            return Err(AdaptiveError::InvalidRange {
                from: from.clone(),
                to: to.clone(),
            });
        }
        if from == to {
            return Ok(0);
        }
        let doomed: Vec<Timestamp> = self
            .live
            .range((Bound::Excluded(from), Bound::Excluded(to)))
            .cloned()
            .collect();
        for timestamp in &doomed {
            self.live.remove(timestamp);
        }
        Ok(doomed.len())
    }

    /// Returns true if `timestamp` is live.
    pub fn contains(&self, timestamp: &Timestamp) -> bool {
        self.live.contains(timestamp)
    }

    /// Number of live timestamps, the origin included.
    pub fn len(&self) -> usize {
        self.live.len()
    }

    /// Always false: the origin is never deleted.
    pub fn is_empty(&self) -> bool {
        self.live.is_empty()
    }

    /// The greatest live timestamp.
    pub fn last(&self) -> Timestamp {
        self.live.last().cloned().unwrap_or_default()
    }

    /// Iterate over live timestamps in order.
    pub fn iter(&self) -> impl Iterator<Item = &Timestamp> + '_ {
        self.live.iter()
    }
}
