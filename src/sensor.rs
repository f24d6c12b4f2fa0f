use std::sync::{Arc, RwLock};

use dashmap::DashMap;
use tracing::info;

use crate::engine::{EngineError, ReservationManager};
use crate::model::ResourceId;

/// Building subsystem that reacts to occupancy. Observers only watch; they
/// cannot influence reservations.
pub trait OccupancyObserver: Send + Sync {
    fn on_occupancy_changed(&self, resource_id: ResourceId, count: u32);
}

/// Forwards raw sensor counts to the reservation manager, then fans the same
/// reading out to every registered observer in registration order.
pub struct OccupancySensor {
    manager: Arc<ReservationManager>,
    observers: RwLock<Vec<Arc<dyn OccupancyObserver>>>,
}

impl OccupancySensor {
    pub fn new(manager: Arc<ReservationManager>) -> Self {
        Self {
            manager,
            observers: RwLock::new(Vec::new()),
        }
    }

    pub fn register(&self, observer: Arc<dyn OccupancyObserver>) {
        self.observers
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .push(observer);
    }

    /// Remove a previously registered observer, matched by identity.
    /// `false` if it was not registered.
    pub fn unregister(&self, observer: &Arc<dyn OccupancyObserver>) -> bool {
        let mut observers = self.observers.write().unwrap_or_else(|e| e.into_inner());
        let before = observers.len();
        observers.retain(|o| !Arc::ptr_eq(o, observer));
        observers.len() != before
    }

    pub fn observer_count(&self) -> usize {
        self.observers.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    /// Observers are only told about readings the manager accepted. They run
    /// after the manager call returns, outside every room lock.
    pub fn set_occupancy(&self, resource_id: ResourceId, count: i64) -> Result<(), EngineError> {
        info!("sensor detected occupancy in room {resource_id}: {count}");
        self.manager.update_occupancy(resource_id, count)?;
        // Accepted, so it fits.
        let count = count as u32;

        let observers = self
            .observers
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone();
        for observer in observers {
            observer.on_occupancy_changed(resource_id, count);
        }
        Ok(())
    }
}

/// Per-room on/off switch driven by the occupancy threshold.
struct Switchboard {
    threshold: u32,
    state: DashMap<ResourceId, bool>,
}

impl Switchboard {
    fn new(threshold: u32) -> Self {
        Self {
            threshold,
            state: DashMap::new(),
        }
    }

    fn apply(&self, resource_id: ResourceId, count: u32) -> bool {
        let on = count >= self.threshold;
        self.state.insert(resource_id, on);
        on
    }

    fn is_on(&self, resource_id: ResourceId) -> bool {
        self.state.get(&resource_id).is_some_and(|on| *on)
    }
}

pub struct LightingSystem {
    switches: Switchboard,
}

impl LightingSystem {
    pub fn new(threshold: u32) -> Self {
        Self {
            switches: Switchboard::new(threshold),
        }
    }

    pub fn is_on(&self, resource_id: ResourceId) -> bool {
        self.switches.is_on(resource_id)
    }
}

impl OccupancyObserver for LightingSystem {
    fn on_occupancy_changed(&self, resource_id: ResourceId, count: u32) {
        if self.switches.apply(resource_id, count) {
            info!("room {resource_id}: lights ON ({count} present)");
        } else {
            info!("room {resource_id}: lights OFF");
        }
    }
}

pub struct ClimateControl {
    switches: Switchboard,
}

impl ClimateControl {
    pub fn new(threshold: u32) -> Self {
        Self {
            switches: Switchboard::new(threshold),
        }
    }

    pub fn is_on(&self, resource_id: ResourceId) -> bool {
        self.switches.is_on(resource_id)
    }
}

impl OccupancyObserver for ClimateControl {
    fn on_occupancy_changed(&self, resource_id: ResourceId, count: u32) {
        if self.switches.apply(resource_id, count) {
            info!("room {resource_id}: climate control ON ({count} present)");
        } else {
            info!("room {resource_id}: climate control OFF");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    use tokio::runtime::Handle;

    use crate::config::Settings;
    use crate::registry::OfficeConfig;

    struct Recorder {
        name: &'static str,
        log: Arc<Mutex<Vec<(&'static str, ResourceId, u32)>>>,
    }

    impl OccupancyObserver for Recorder {
        fn on_occupancy_changed(&self, resource_id: ResourceId, count: u32) {
            self.log.lock().unwrap().push((self.name, resource_id, count));
        }
    }

    fn sensor() -> OccupancySensor {
        let office = Arc::new(OfficeConfig::new(3, 4).unwrap());
        let manager = ReservationManager::new(office, &Settings::default(), Handle::current());
        OccupancySensor::new(manager)
    }

    #[tokio::test]
    async fn observers_called_in_registration_order() {
        let sensor = sensor();
        let log = Arc::new(Mutex::new(Vec::new()));
        for name in ["first", "second", "third"] {
            sensor.register(Arc::new(Recorder { name, log: log.clone() }));
        }
        assert_eq!(sensor.observer_count(), 3);

        sensor.set_occupancy(2, 5).unwrap();
        assert_eq!(
            *log.lock().unwrap(),
            vec![("first", 2, 5), ("second", 2, 5), ("third", 2, 5)]
        );
    }

    #[tokio::test]
    async fn unregistered_observer_stops_hearing_readings() {
        let sensor = sensor();
        let log = Arc::new(Mutex::new(Vec::new()));
        let first: Arc<dyn OccupancyObserver> = Arc::new(Recorder { name: "first", log: log.clone() });
        let second: Arc<dyn OccupancyObserver> = Arc::new(Recorder { name: "second", log: log.clone() });
        sensor.register(first.clone());
        sensor.register(second.clone());

        assert!(sensor.unregister(&first));
        assert!(!sensor.unregister(&first));
        assert_eq!(sensor.observer_count(), 1);

        sensor.set_occupancy(1, 3).unwrap();
        assert_eq!(*log.lock().unwrap(), vec![("second", 1, 3)]);
    }

    #[tokio::test]
    async fn rejected_reading_reaches_no_observer() {
        let sensor = sensor();
        let log = Arc::new(Mutex::new(Vec::new()));
        sensor.register(Arc::new(Recorder { name: "only", log: log.clone() }));

        assert_eq!(sensor.set_occupancy(9, 2), Err(EngineError::InvalidResource(9)));
        assert!(matches!(sensor.set_occupancy(1, -1), Err(EngineError::Validation(_))));
        assert!(log.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn building_systems_follow_threshold() {
        let sensor = sensor();
        let lights = Arc::new(LightingSystem::new(2));
        let climate = Arc::new(ClimateControl::new(2));
        sensor.register(lights.clone());
        sensor.register(climate.clone());

        sensor.set_occupancy(1, 2).unwrap();
        assert!(lights.is_on(1));
        assert!(climate.is_on(1));
        assert!(!lights.is_on(2));

        sensor.set_occupancy(1, 1).unwrap();
        assert!(!lights.is_on(1));
        assert!(!climate.is_on(1));
    }
}
