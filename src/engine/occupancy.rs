use dashmap::DashMap;

use crate::model::ResourceId;

/// Latest occupant count per room. Readings are plain last-write-wins
/// scalars and need no room lock.
pub struct OccupancyTracker {
    counts: DashMap<ResourceId, u32>,
    threshold: u32,
}

impl OccupancyTracker {
    pub fn new(threshold: u32) -> Self {
        Self {
            counts: DashMap::new(),
            threshold,
        }
    }

    pub fn record(&self, id: ResourceId, count: u32) {
        self.counts.insert(id, count);
    }

    /// Rooms never reported are empty.
    pub fn get(&self, id: ResourceId) -> u32 {
        self.counts.get(&id).map_or(0, |c| *c)
    }

    pub fn threshold(&self) -> u32 {
        self.threshold
    }

    pub fn is_occupied(&self, count: u32) -> bool {
        count >= self.threshold
    }
}
