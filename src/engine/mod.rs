mod conflict;
mod error;
mod mutations;
mod occupancy;
mod queries;
mod store;

pub use error::EngineError;
pub use occupancy::OccupancyTracker;
pub use store::{ReservationStore, SharedRoom};

use std::sync::{Arc, Weak};
use std::time::Duration;

use tokio::runtime::Handle;
use tracing::{info, warn};

use crate::config::Settings;
use crate::model::ResourceId;
use crate::notify::NotifyHub;
use crate::registry::{RegistryError, ResourceRegistry};
use crate::release::ReleaseScheduler;

/// Entry point for everything that touches reservations.
///
/// Locking: every read-modify-write of a room's reservation list (booking,
/// cancellation, occupancy disarm, release firing) holds that room's mutex
/// for its whole critical section. No call ever holds two room locks, so
/// rooms never wait on each other.
pub struct ReservationManager {
    /// Handed to release tasks so they can call back without keeping the manager alive.
    me: Weak<ReservationManager>,
    registry: Arc<dyn ResourceRegistry>,
    pub(super) store: ReservationStore,
    pub(super) occupancy: OccupancyTracker,
    pub(super) releases: ReleaseScheduler,
    pub notify: Arc<NotifyHub>,
    start_tolerance: Duration,
}

impl ReservationManager {
    /// `runtime` is the worker pool deferred releases run on.
    pub fn new(registry: Arc<dyn ResourceRegistry>, settings: &Settings, runtime: Handle) -> Arc<Self> {
        let manager = Arc::new_cyclic(|me| Self {
            me: me.clone(),
            registry,
            store: ReservationStore::new(),
            occupancy: OccupancyTracker::new(settings.occupancy_threshold),
            releases: ReleaseScheduler::new(runtime, settings.grace_period),
            notify: Arc::new(NotifyHub::new()),
            start_tolerance: settings.start_tolerance,
        });
        info!(
            "reservation manager started: grace period {:?}, occupancy threshold {}",
            settings.grace_period, settings.occupancy_threshold
        );
        manager
    }

    pub fn grace_period(&self) -> Duration {
        self.releases.grace_period()
    }

    pub fn occupancy_threshold(&self) -> u32 {
        self.occupancy.threshold()
    }

    /// Number of rooms the registry currently knows.
    pub fn total_resources(&self) -> Result<u32, EngineError> {
        self.registry.total_resources().map_err(|e| match e {
            RegistryError::NotConfigured => EngineError::NotConfigured,
            other => EngineError::Registry(other.to_string()),
        })
    }

    /// Registry failures other than "not configured" count as an unknown room.
    pub(super) fn validate_resource(&self, id: ResourceId) -> Result<(), EngineError> {
        match self.registry.is_valid_resource(id) {
            Ok(true) => Ok(()),
            Ok(false) => Err(EngineError::InvalidResource(id)),
            Err(RegistryError::NotConfigured) => Err(EngineError::NotConfigured),
            Err(e) => {
                warn!("registry lookup for room {id} failed: {e}");
                Err(EngineError::InvalidResource(id))
            }
        }
    }
}
