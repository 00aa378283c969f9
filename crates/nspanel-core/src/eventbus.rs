//! Event bus for connector events.
//!
//! Producers (the device loader, inbound message consumers) publish
//! [`ConnectorEvent`]s; writers that talk to the panel subscribe.

use crate::config::ConnectorConfig;
use crate::event::{ConnectorEvent, EventMetadata};
use tokio::sync::broadcast;

/// Default channel capacity for the event bus.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 1000;

/// Why [`EventBus::try_publish`] refused an event.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PublishError {
    #[error("Event bus '{0}' has no subscribers")]
    NoSubscribers(String),

    #[error("Event bus '{name}' is full ({capacity} unread events)")]
    Full { name: String, capacity: usize },
}

/// Broadcast event bus.
///
/// Cloning the bus yields another handle to the same channel.
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<(ConnectorEvent, EventMetadata)>,
    name: String,
    capacity: usize,
}

impl EventBus {
    /// Create a new event bus with default capacity.
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CHANNEL_CAPACITY)
    }

    /// Create a new event bus with the specified capacity.
    ///
    /// The capacity determines how many events are buffered for slow subscribers.
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let (tx, _) = broadcast::channel(capacity);
        Self {
            tx,
            name: "default".to_string(),
            capacity,
        }
    }

    /// Create a new event bus with a name.
    pub fn with_name(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::new()
        }
    }

    /// Create the connector bus, sized by `state_channel_capacity`.
    pub fn from_config(config: &ConnectorConfig) -> Self {
        Self {
            name: config.connector.to_string(),
            ..Self::with_capacity(config.state_channel_capacity)
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Events not yet read by every subscriber.
    pub fn queued(&self) -> usize {
        self.tx.len()
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    /// Publish an event with default metadata.
    ///
    /// Returns `true` if there was at least one subscriber. Without
    /// subscribers the event is discarded.
    pub fn publish(&self, event: ConnectorEvent) -> bool {
        self.publish_with_source(event, "connector")
    }

    /// Publish an event with a custom source.
    pub fn publish_with_source(&self, event: ConnectorEvent, source: impl Into<String>) -> bool {
        let metadata = EventMetadata::new(source);
        self.tx.send((event, metadata)).is_ok()
    }

    /// Publish an event only if no subscriber can miss it.
    ///
    /// A broadcast channel evicts its oldest event when full, so this
    /// refuses to publish instead of overwriting an unread event.
    pub fn try_publish(
        &self,
        event: ConnectorEvent,
        source: impl Into<String>,
    ) -> Result<(), PublishError> {
        if self.tx.receiver_count() == 0 {
            return Err(PublishError::NoSubscribers(self.name.clone()));
        }
        if self.tx.len() >= self.capacity {
            return Err(PublishError::Full {
                name: self.name.clone(),
                capacity: self.capacity,
            });
        }
        self.tx
            .send((event, EventMetadata::new(source)))
            .map(|_| ())
            .map_err(|_| PublishError::NoSubscribers(self.name.clone()))
    }

    /// Subscribe to all events.
    pub fn subscribe(&self) -> EventBusReceiver {
        EventBusReceiver {
            rx: self.tx.subscribe(),
        }
    }

    /// Subscribe to events matching a filter.
    pub fn subscribe_filtered<F>(&self, filter: F) -> FilteredReceiver<F>
    where
        F: Fn(&ConnectorEvent) -> bool + Send + 'static,
    {
        FilteredReceiver {
            rx: self.tx.subscribe(),
            filter,
        }
    }

    /// Subscribe to device state notifications only.
    pub fn device_states(&self) -> FilteredReceiver<fn(&ConnectorEvent) -> bool> {
        self.subscribe_filtered(ConnectorEvent::is_device_state as fn(&ConnectorEvent) -> bool)
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

/// Receiver for all events from the event bus.
pub struct EventBusReceiver {
    rx: broadcast::Receiver<(ConnectorEvent, EventMetadata)>,
}

impl EventBusReceiver {
    /// Receive the next event.
    ///
    /// Returns `None` once the bus is closed. Lagged events are skipped.
    pub async fn recv(&mut self) -> Option<(ConnectorEvent, EventMetadata)> {
        loop {
            match self.rx.recv().await {
                Ok(event) => return Some(event),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "Event receiver lagged behind");
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    /// Try to receive an event without blocking.
    pub fn try_recv(&mut self) -> Option<(ConnectorEvent, EventMetadata)> {
        self.rx.try_recv().ok()
    }
}

/// Receiver for filtered events from the event bus.
pub struct FilteredReceiver<F>
where
    F: Fn(&ConnectorEvent) -> bool + Send,
{
    rx: broadcast::Receiver<(ConnectorEvent, EventMetadata)>,
    filter: F,
}

impl<F> FilteredReceiver<F>
where
    F: Fn(&ConnectorEvent) -> bool + Send,
{
    /// Receive the next event matching the filter.
    pub async fn recv(&mut self) -> Option<(ConnectorEvent, EventMetadata)> {
        loop {
            match self.rx.recv().await {
                Ok((event, meta)) => {
                    if (self.filter)(&event) {
                        return Some((event, meta));
                    }
                }
                Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    /// Try to receive a matching event without blocking.
    pub fn try_recv(&mut self) -> Option<(ConnectorEvent, EventMetadata)> {
        while let Ok((event, meta)) = self.rx.try_recv() {
            if (self.filter)(&event) {
                return Some((event, meta));
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn loaded(devices: usize) -> ConnectorEvent {
        ConnectorEvent::DevicesLoaded {
            connector: Uuid::nil(),
            devices,
            skipped: 0,
        }
    }

    #[tokio::test]
    async fn test_publish_without_subscribers() {
        let bus = EventBus::new();
        assert!(!bus.publish(loaded(1)));
    }

    #[tokio::test]
    async fn test_publish_subscribe() {
        let bus = EventBus::with_name("test");
        let mut rx = bus.subscribe();
        assert_eq!(bus.subscriber_count(), 1);

        assert!(bus.publish(loaded(2)));

        let (event, meta) = rx.recv().await.unwrap();
        assert_eq!(event, loaded(2));
        assert_eq!(meta.source, "connector");
        assert_eq!(bus.name(), "test");
    }

    #[tokio::test]
    async fn test_try_publish_refuses_to_overwrite() {
        let bus = EventBus::with_capacity(2);
        assert_eq!(
            bus.try_publish(loaded(0), "test"),
            Err(PublishError::NoSubscribers("default".to_string()))
        );

        let mut rx = bus.subscribe();
        bus.try_publish(loaded(1), "test").unwrap();
        bus.try_publish(loaded(2), "test").unwrap();
        assert!(matches!(
            bus.try_publish(loaded(3), "test"),
            Err(PublishError::Full { capacity: 2, .. })
        ));
        assert_eq!(bus.queued(), 2);

        assert_eq!(rx.recv().await.unwrap().0, loaded(1));
        bus.try_publish(loaded(3), "test").unwrap();
        assert_eq!(rx.recv().await.unwrap().0, loaded(2));
        assert_eq!(rx.recv().await.unwrap().0, loaded(3));
    }

    #[tokio::test]
    async fn test_device_state_filter() {
        let bus = EventBus::new();
        let mut rx = bus.device_states();

        bus.publish(loaded(1));
        assert!(rx.try_recv().is_none());

        bus.publish(ConnectorEvent::StoreDeviceState(crate::event::StoreDeviceState {
            connector: Uuid::nil(),
            gateway: Uuid::nil(),
            device: Uuid::nil(),
            state: Vec::new(),
        }));
        let (event, _) = rx.recv().await.unwrap();
        assert!(event.is_device_state());
    }
}
