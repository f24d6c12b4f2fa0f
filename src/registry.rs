use std::sync::RwLock;

use serde::Serialize;
use tracing::info;

use crate::limits::MAX_ROOMS;
use crate::model::ResourceId;

/// Owner of the room set and its capacities. The reservation engine only asks
/// it whether a room id exists.
pub trait ResourceRegistry: Send + Sync {
    fn is_valid_resource(&self, id: ResourceId) -> Result<bool, RegistryError>;
    fn total_resources(&self) -> Result<u32, RegistryError>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    /// The office has not been set up yet.
    NotConfigured,
    Unavailable(String),
    InvalidRoom(ResourceId),
    InvalidValue(&'static str),
}

impl std::fmt::Display for RegistryError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RegistryError::NotConfigured => write!(f, "office not configured"),
            RegistryError::Unavailable(e) => write!(f, "registry unavailable: {e}"),
            RegistryError::InvalidRoom(id) => write!(f, "invalid room id: {id}"),
            RegistryError::InvalidValue(msg) => write!(f, "invalid value: {msg}"),
        }
    }
}

impl std::error::Error for RegistryError {}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Room {
    pub id: ResourceId,
    pub capacity: u32,
}

/// Office layout: how many rooms there are and how many people each holds.
/// Built explicitly and shared by reference; there is no global instance.
#[derive(Debug)]
pub struct OfficeConfig {
    /// `capacities[i]` is the capacity of room `i + 1`.
    capacities: RwLock<Vec<u32>>,
}

impl OfficeConfig {
    pub fn new(total_rooms: u32, default_capacity: u32) -> Result<Self, RegistryError> {
        validate_room_count(total_rooms)?;
        if default_capacity == 0 {
            return Err(RegistryError::InvalidValue("default capacity must be > 0"));
        }
        info!("office configured: {total_rooms} rooms, default capacity {default_capacity}");
        Ok(Self {
            capacities: RwLock::new(vec![default_capacity; total_rooms as usize]),
        })
    }

    /// Shrinking drops the removed rooms; growing adds rooms with room 1's capacity.
    pub fn set_total_rooms(&self, total_rooms: u32) -> Result<(), RegistryError> {
        validate_room_count(total_rooms)?;
        let mut caps = self.write();
        let fill = caps.first().copied().unwrap_or(1);
        caps.resize(total_rooms as usize, fill);
        info!("total rooms updated to {total_rooms}");
        Ok(())
    }

    pub fn set_room_capacity(&self, id: ResourceId, capacity: u32) -> Result<(), RegistryError> {
        if capacity == 0 {
            return Err(RegistryError::InvalidValue("capacity must be > 0"));
        }
        let mut caps = self.write();
        let slot = index(id, caps.len())
            .and_then(|i| caps.get_mut(i))
            .ok_or(RegistryError::InvalidRoom(id))?;
        *slot = capacity;
        info!("room {id} capacity set to {capacity}");
        Ok(())
    }

    pub fn room_capacity(&self, id: ResourceId) -> Result<u32, RegistryError> {
        let caps = self.read();
        index(id, caps.len())
            .and_then(|i| caps.get(i).copied())
            .ok_or(RegistryError::InvalidRoom(id))
    }

    pub fn rooms(&self) -> Vec<Room> {
        self.read()
            .iter()
            .zip(1..)
            .map(|(&capacity, id)| Room { id, capacity })
            .collect()
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, Vec<u32>> {
        self.capacities.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, Vec<u32>> {
        self.capacities.write().unwrap_or_else(|e| e.into_inner())
    }
}

impl ResourceRegistry for OfficeConfig {
    fn is_valid_resource(&self, id: ResourceId) -> Result<bool, RegistryError> {
        Ok(index(id, self.read().len()).is_some())
    }

    fn total_resources(&self) -> Result<u32, RegistryError> {
        Ok(self.read().len() as u32)
    }
}

fn validate_room_count(total_rooms: u32) -> Result<(), RegistryError> {
    if total_rooms == 0 {
        return Err(RegistryError::InvalidValue("total rooms must be > 0"));
    }
    if total_rooms > MAX_ROOMS {
        return Err(RegistryError::InvalidValue("too many rooms"));
    }
    Ok(())
}

/// 1-based room id → vector index.
fn index(id: ResourceId, len: usize) -> Option<usize> {
    let i = (id as usize).checked_sub(1)?;
    (i < len).then_some(i)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rooms_are_one_based() {
        let office = OfficeConfig::new(3, 4).unwrap();
        assert_eq!(office.total_resources().unwrap(), 3);
        assert!(!office.is_valid_resource(0).unwrap());
        assert!(office.is_valid_resource(1).unwrap());
        assert!(office.is_valid_resource(3).unwrap());
        assert!(!office.is_valid_resource(4).unwrap());
    }

    #[test]
    fn rejects_empty_office() {
        assert_eq!(
            OfficeConfig::new(0, 4).unwrap_err(),
            RegistryError::InvalidValue("total rooms must be > 0")
        );
        assert!(OfficeConfig::new(2, 0).is_err());
        assert!(OfficeConfig::new(MAX_ROOMS + 1, 1).is_err());
    }

    #[test]
    fn set_capacity() {
        let office = OfficeConfig::new(2, 4).unwrap();
        office.set_room_capacity(2, 10).unwrap();
        assert_eq!(office.room_capacity(1).unwrap(), 4);
        assert_eq!(office.room_capacity(2).unwrap(), 10);
        assert_eq!(office.set_room_capacity(3, 1), Err(RegistryError::InvalidRoom(3)));
        assert!(office.set_room_capacity(1, 0).is_err());
    }

    #[test]
    fn resize_office() {
        let office = OfficeConfig::new(2, 6).unwrap();
        office.set_room_capacity(2, 12).unwrap();

        office.set_total_rooms(4).unwrap();
        assert_eq!(
            office.rooms(),
            vec![
                Room { id: 1, capacity: 6 },
                Room { id: 2, capacity: 12 },
                Room { id: 3, capacity: 6 },
                Room { id: 4, capacity: 6 },
            ]
        );

        office.set_total_rooms(1).unwrap();
        assert_eq!(office.total_resources().unwrap(), 1);
        assert!(!office.is_valid_resource(2).unwrap());
        assert!(office.set_total_rooms(0).is_err());
    }
}
