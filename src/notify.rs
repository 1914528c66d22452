use dashmap::DashMap;
use tokio::sync::broadcast;
use ulid::Ulid;

use crate::model::Event;

const CHANNEL_CAPACITY: usize = 256;

/// In-process broadcast hub: every applied event is published under its
/// premises id. The embedding API layer subscribes for live views; nothing
/// here leaves the process.
pub struct NotifyHub {
    channels: DashMap<Ulid, broadcast::Sender<Event>>,
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

    /// Subscribe to notifications for a premises. Creates the channel if needed.
    pub fn subscribe(&self, premises_id: Ulid) -> broadcast::Receiver<Event> {
        let sender = self
            .channels
            .entry(premises_id)
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0);
        sender.subscribe()
    }

    /// Send a notification. No-op if nobody is listening.
    pub fn send(&self, premises_id: Ulid, event: &Event) {
        if let Some(sender) = self.channels.get(&premises_id) {
            let _ = sender.send(event.clone());
        }
    }

    /// Remove a channel (e.g. when a premises is decommissioned).
    pub fn remove(&self, premises_id: &Ulid) {
        self.channels.remove(premises_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn subscribe_and_receive() {
        let hub = NotifyHub::new();
        let premises_id = Ulid::new();
        let mut rx = hub.subscribe(premises_id);

        let event = Event::PremisesCreated {
            id: premises_id,
            name: "Oak House".into(),
            address_line: "12 The Avenue".into(),
            postcode: "SW1A 1AA".into(),
            ap_area: None,
            characteristics: Vec::new(),
        };
        hub.send(premises_id, &event);

        let received = rx.recv().await.unwrap();
        assert_eq!(received, event);
    }

    #[tokio::test]
    async fn send_without_subscribers_is_noop() {
        let hub = NotifyHub::new();
        let premises_id = Ulid::new();
        // No subscriber — should not panic
        hub.send(
            premises_id,
            &Event::OutOfServiceCancelled { id: Ulid::new(), premises_id },
        );
    }
}
