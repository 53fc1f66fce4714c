//! Map notifications.
//!
//! Tools announce that map state changed by handing a [`MapEvent`] to a
//! [`MapNotifier`]. Notification never blocks and never fails the caller:
//! a separate task (in the gateway) drains the queue, re-reads the store, and
//! fans the result out to subscribers.

use crate::message::ConversationId;
use crate::region::Listing;
use tokio::sync::mpsc;

#[derive(Debug, Clone, PartialEq)]
pub enum MapEvent {
    /// Regions or points of interest changed; push a fresh snapshot.
    Refresh { conversation_id: ConversationId },

    /// Listings were filtered for a region; push them as-is.
    Listings {
        conversation_id: ConversationId,
        region_id: i64,
        listings: Vec<Listing>,
    },
}

impl MapEvent {
    pub fn conversation_id(&self) -> &ConversationId {
        match self {
            Self::Refresh { conversation_id } | Self::Listings { conversation_id, .. } => {
                conversation_id
            }
        }
    }
}

/// Fire-and-forget sink for map events.
pub trait MapNotifier: Send + Sync {
    fn notify(&self, event: MapEvent);
}

/// Places events on an unbounded queue for a consumer task.
#[derive(Clone)]
pub struct QueuedNotifier {
    sender: mpsc::UnboundedSender<MapEvent>,
}

impl QueuedNotifier {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<MapEvent>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self { sender }, receiver)
    }
}

impl MapNotifier for QueuedNotifier {
    fn notify(&self, event: MapEvent) {
        if let Err(e) = self.sender.send(event) {
            tracing::warn!(
                conversation_id = %e.0.conversation_id(),
                "Map notifier queue closed, dropping event"
            );
        }
    }
}

/// Discards every event. Used by the CLI chat command, which has no viewers.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopNotifier;

impl MapNotifier for NoopNotifier {
    fn notify(&self, _event: MapEvent) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn queued_notifier_delivers_in_order() {
        let (notifier, mut rx) = QueuedNotifier::new();
        let conv = ConversationId::from("c1");
        notifier.notify(MapEvent::Refresh {
            conversation_id: conv.clone(),
        });
        notifier.notify(MapEvent::Listings {
            conversation_id: conv.clone(),
            region_id: 7,
            listings: vec![],
        });

        assert!(matches!(rx.recv().await, Some(MapEvent::Refresh { .. })));
        match rx.recv().await {
            Some(MapEvent::Listings { region_id, .. }) => assert_eq!(region_id, 7),
            other => panic!("Expected Listings event, got {other:?}"),
        }
    }

    #[test]
    fn closed_queue_does_not_panic() {
        let (notifier, rx) = QueuedNotifier::new();
        drop(rx);
        notifier.notify(MapEvent::Refresh {
            conversation_id: ConversationId::from("c1"),
        });
    }
}
