//! Map state fan-out.
//!
//! Tools report changes as [`MapEvent`]s on a queue. [`MapHub::run`] drains
//! that queue, rebuilds the affected conversation's snapshot from the store,
//! and publishes it on a broadcast channel that every WebSocket viewer
//! subscribes to. Snapshots are always complete; there is no delta protocol.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use settlr_core::error::StoreError;
use settlr_core::geo::Ring;
use settlr_core::message::ConversationId;
use settlr_core::notify::MapEvent;
use settlr_core::region::{Listing, PointOfInterest, Region};
use settlr_core::store::GeoStore;
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, info, warn};

/// Payloads sent to map viewers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MapPayload {
    /// Every region of a conversation with its points of interest.
    MapData {
        conversation_id: ConversationId,
        regions: Vec<RegionView>,
        timestamp: DateTime<Utc>,
    },

    /// Listings matched inside one region.
    Listings {
        conversation_id: ConversationId,
        region_id: i64,
        listings: Vec<Listing>,
        timestamp: DateTime<Utc>,
    },
}

impl MapPayload {
    pub fn conversation_id(&self) -> &ConversationId {
        match self {
            Self::MapData { conversation_id, .. } | Self::Listings { conversation_id, .. } => {
                conversation_id
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegionView {
    pub region_id: i64,
    pub region_name: String,
    pub coordinates: Ring,
    pub points_of_interest: Vec<InterestView>,
}

/// The points found for one interest label.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InterestView {
    pub interest: String,
    pub points: Vec<PointOfInterest>,
}

/// Builds snapshots from the store and publishes them to subscribers.
#[derive(Clone)]
pub struct MapHub {
    store: Arc<dyn GeoStore>,
    sender: broadcast::Sender<MapPayload>,
}

impl MapHub {
    pub fn new(store: Arc<dyn GeoStore>, capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { store, sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<MapPayload> {
        self.sender.subscribe()
    }

    /// One region with its point-of-interest sets, oldest set first.
    pub async fn region_view(&self, region: &Region) -> Result<RegionView, StoreError> {
        let points_of_interest = self
            .store
            .poi_sets(region.id)
            .await?
            .into_iter()
            .map(|set| InterestView {
                interest: set.interest,
                points: set.points,
            })
            .collect();
        Ok(RegionView {
            region_id: region.id,
            region_name: region.name.clone(),
            coordinates: region.ring.clone(),
            points_of_interest,
        })
    }

    /// The current map state of a conversation.
    pub async fn snapshot(&self, conversation_id: &ConversationId) -> Result<MapPayload, StoreError> {
        let mut regions = Vec::new();
        for region in self.store.regions(conversation_id).await? {
            regions.push(self.region_view(&region).await?);
        }
        Ok(MapPayload::MapData {
            conversation_id: conversation_id.clone(),
            regions,
            timestamp: Utc::now(),
        })
    }

    /// Send a payload to every subscriber. Returns how many received it.
    pub fn publish(&self, payload: MapPayload) -> usize {
        match self.sender.send(payload) {
            Ok(receivers) => receivers,
            Err(_) => {
                debug!("No map viewers connected");
                0
            }
        }
    }

    /// Rebuild a conversation's snapshot, publish it, and return it.
    pub async fn refresh(&self, conversation_id: &ConversationId) -> Result<MapPayload, StoreError> {
        let payload = self.snapshot(conversation_id).await?;
        let viewers = self.publish(payload.clone());
        info!(conversation_id = %conversation_id, viewers, "Map snapshot published");
        Ok(payload)
    }

    /// Handle one tool notification. Failures are logged, never returned.
    pub async fn handle(&self, event: MapEvent) {
        match event {
            MapEvent::Refresh { conversation_id } => {
                if let Err(e) = self.refresh(&conversation_id).await {
                    warn!(conversation_id = %conversation_id, error = %e, "Map refresh failed");
                }
            }
            MapEvent::Listings {
                conversation_id,
                region_id,
                listings,
            } => {
                let count = listings.len();
                let viewers = self.publish(MapPayload::Listings {
                    conversation_id: conversation_id.clone(),
                    region_id,
                    listings,
                    timestamp: Utc::now(),
                });
                info!(conversation_id = %conversation_id, region_id, count, viewers, "Listings published");
            }
        }
    }

    /// Drain the notification queue until every sender is gone.
    pub async fn run(self, mut events: mpsc::UnboundedReceiver<MapEvent>) {
        while let Some(event) = events.recv().await {
            self.handle(event).await;
        }
        debug!("Map notification queue closed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use settlr_core::geo::Coordinate;
    use settlr_core::notify::{MapNotifier, QueuedNotifier};
    use settlr_core::store::HistoryStore;
    use settlr_store::InMemoryStore;

    fn square() -> Ring {
        Ring::new(vec![
            Coordinate::new(-0.08, 51.52),
            Coordinate::new(-0.07, 51.52),
            Coordinate::new(-0.07, 51.53),
            Coordinate::new(-0.08, 51.53),
        ])
        .unwrap()
    }

    fn pub_named(name: &str) -> PointOfInterest {
        PointOfInterest {
            name: name.into(),
            latitude: 51.525,
            longitude: -0.075,
            address: None,
            rating: Some(4.5),
            review_count: Some(120),
            categories: vec!["pub".into()],
            website: None,
            gmaps_link: None,
        }
    }

    async fn seeded() -> (MapHub, Arc<InMemoryStore>, ConversationId) {
        let store = Arc::new(InMemoryStore::new());
        let conv = ConversationId::from("c1");
        store.create_conversation(&conv, "Shoreditch please").await.unwrap();
        let region = store.insert_region(&conv, "Shoreditch", &square()).await.unwrap();
        store
            .insert_poi_sets(&region, &[("pubs".to_string(), vec![pub_named("The Owl")])])
            .await
            .unwrap();
        (MapHub::new(store.clone(), 16), store, conv)
    }

    fn without_timestamp(payload: MapPayload) -> serde_json::Value {
        let mut value = serde_json::to_value(payload).unwrap();
        value.as_object_mut().unwrap().remove("timestamp");
        value
    }

    #[tokio::test]
    async fn snapshot_shape() {
        let (hub, _store, conv) = seeded().await;
        let value = serde_json::to_value(hub.snapshot(&conv).await.unwrap()).unwrap();
        assert_eq!(value["type"], "map_data");
        assert_eq!(value["conversation_id"], "c1");
        let region = &value["regions"][0];
        assert_eq!(region["region_name"], "Shoreditch");
        assert_eq!(region["coordinates"].as_array().unwrap().len(), 5);
        assert_eq!(region["points_of_interest"][0]["interest"], "pubs");
        assert_eq!(region["points_of_interest"][0]["points"][0]["name"], "The Owl");
        assert!(value["timestamp"].is_string());
    }

    #[tokio::test]
    async fn repeated_snapshots_match() {
        let (hub, _store, conv) = seeded().await;
        let first = hub.refresh(&conv).await.unwrap();
        let second = hub.refresh(&conv).await.unwrap();
        assert_eq!(without_timestamp(first), without_timestamp(second));
    }

    #[tokio::test]
    async fn unknown_conversation_has_empty_snapshot() {
        let (hub, _store, _conv) = seeded().await;
        match hub.snapshot(&ConversationId::from("nobody")).await.unwrap() {
            MapPayload::MapData { regions, .. } => assert!(regions.is_empty()),
            other => panic!("unexpected payload: {other:?}"),
        }
    }

    #[tokio::test]
    async fn publish_without_viewers_is_harmless() {
        let (hub, _store, conv) = seeded().await;
        hub.refresh(&conv).await.unwrap();
        let payload = hub.snapshot(&conv).await.unwrap();
        assert_eq!(hub.publish(payload), 0);
    }

    #[tokio::test]
    async fn queued_events_reach_subscribers() {
        let (hub, _store, conv) = seeded().await;
        let mut viewer = hub.subscribe();
        let (notifier, events) = QueuedNotifier::new();
        let task = tokio::spawn(hub.clone().run(events));

        notifier.notify(MapEvent::Refresh {
            conversation_id: conv.clone(),
        });
        notifier.notify(MapEvent::Listings {
            conversation_id: conv.clone(),
            region_id: 1,
            listings: vec![],
        });
        drop(notifier);

        match viewer.recv().await.unwrap() {
            MapPayload::MapData { regions, .. } => assert_eq!(regions.len(), 1),
            other => panic!("expected map data, got {other:?}"),
        }
        match viewer.recv().await.unwrap() {
            MapPayload::Listings { region_id, .. } => assert_eq!(region_id, 1),
            other => panic!("expected listings, got {other:?}"),
        }
        task.await.unwrap();
    }
}
