use dashmap::DashMap;
use tokio::sync::broadcast;

use crate::model::{ReservationEvent, ResourceId};

const CHANNEL_CAPACITY: usize = 256;

/// Broadcast hub for reservation events, one channel per room.
/// Delivery is best-effort: lagging receivers lose events.
pub struct NotifyHub {
    channels: DashMap<ResourceId, broadcast::Sender<ReservationEvent>>,
}

impl Default for NotifyHub {
    fn default() -> Self {
        Self::new()
    }
}

impl NotifyHub {
    pub fn new() -> Self {
        Self {
            channels: DashMap::new(),
        }
    }

    /// Subscribe to events for a room. Creates the channel if needed.
    pub fn subscribe(&self, resource_id: ResourceId) -> broadcast::Receiver<ReservationEvent> {
        let sender = self
            .channels
            .entry(resource_id)
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0);
        sender.subscribe()
    }

    /// Send an event. No-op if nobody is listening.
    pub fn send(&self, resource_id: ResourceId, event: ReservationEvent) {
        if let Some(sender) = self.channels.get(&resource_id) {
            let _ = sender.send(event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ulid::Ulid;

    #[tokio::test]
    async fn subscribe_and_receive() {
        let hub = NotifyHub::new();
        let mut rx = hub.subscribe(3);

        let event = ReservationEvent::Cancelled {
            id: Ulid::new(),
            resource_id: 3,
        };
        hub.send(3, event.clone());

        assert_eq!(rx.recv().await.unwrap(), event);
    }

    #[tokio::test]
    async fn rooms_are_isolated() {
        let hub = NotifyHub::new();
        let mut rx = hub.subscribe(1);
        hub.send(
            2,
            ReservationEvent::OccupancyChanged {
                resource_id: 2,
                count: 4,
            },
        );
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn send_without_subscribers_is_noop() {
        let hub = NotifyHub::new();
        hub.send(
            1,
            ReservationEvent::OccupancyChanged {
                resource_id: 1,
                count: 0,
            },
        );
    }
}
