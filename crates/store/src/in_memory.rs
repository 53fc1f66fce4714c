//! In-memory store for tests and throwaway sessions.
//!
//! Mirrors the SQLite backend's ownership rules: messages and regions need an
//! existing conversation, POI sets need an existing region.

use async_trait::async_trait;
use chrono::Utc;
use settlr_core::error::StoreError;
use settlr_core::geo::Ring;
use settlr_core::message::{Conversation, ConversationId, Message};
use settlr_core::region::{AreaBoundary, Listing, PointOfInterest, PointOfInterestSet, Region};
use settlr_core::store::{GeoStore, HistoryStore, StoreResult};
use std::collections::{BTreeMap, HashMap};
use tokio::sync::RwLock;

#[derive(Default)]
struct State {
    conversations: HashMap<ConversationId, Conversation>,
    messages: HashMap<ConversationId, Vec<Message>>,
    regions: BTreeMap<i64, Region>,
    poi_sets: BTreeMap<i64, PointOfInterestSet>,
    boundaries: BTreeMap<String, AreaBoundary>,
    listings: Vec<Listing>,
    next_region_id: i64,
    next_poi_set_id: i64,
}

#[derive(Default)]
pub struct InMemoryStore {
    state: RwLock<State>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl HistoryStore for InMemoryStore {
    async fn create_conversation(
        &self,
        id: &ConversationId,
        first_message: &str,
    ) -> StoreResult<Conversation> {
        let mut state = self.state.write().await;
        if state.conversations.contains_key(id) {
            return Err(StoreError::Storage(format!("conversation {id} already exists")));
        }
        let conversation = Conversation::new(id.clone(), first_message);
        state.conversations.insert(id.clone(), conversation.clone());
        state
            .messages
            .insert(id.clone(), vec![Message::user(first_message)]);
        Ok(conversation)
    }

    async fn get_conversation(&self, id: &ConversationId) -> StoreResult<Option<Conversation>> {
        Ok(self.state.read().await.conversations.get(id).cloned())
    }

    async fn append_message(&self, id: &ConversationId, message: &Message) -> StoreResult<()> {
        let mut state = self.state.write().await;
        let conversation = state
            .conversations
            .get_mut(id)
            .ok_or_else(|| StoreError::NotFound(format!("conversation {id}")))?;
        conversation.updated_at = message.timestamp;
        state
            .messages
            .entry(id.clone())
            .or_default()
            .push(message.clone());
        Ok(())
    }

    async fn messages(&self, id: &ConversationId) -> StoreResult<Vec<Message>> {
        let mut messages = self
            .state
            .read()
            .await
            .messages
            .get(id)
            .cloned()
            .unwrap_or_default();
        // Stable sort keeps insertion order for equal timestamps.
        messages.sort_by_key(|m| m.timestamp);
        Ok(messages)
    }
}

#[async_trait]
impl GeoStore for InMemoryStore {
    async fn insert_region(
        &self,
        conversation_id: &ConversationId,
        name: &str,
        ring: &Ring,
    ) -> StoreResult<Region> {
        let mut state = self.state.write().await;
        if !state.conversations.contains_key(conversation_id) {
            return Err(StoreError::NotFound(format!("conversation {conversation_id}")));
        }
        state.next_region_id += 1;
        let region = Region {
            id: state.next_region_id,
            conversation_id: conversation_id.clone(),
            name: name.to_string(),
            ring: ring.clone(),
            created_at: Utc::now(),
        };
        state.regions.insert(region.id, region.clone());
        Ok(region)
    }

    async fn get_region(&self, region_id: i64) -> StoreResult<Option<Region>> {
        Ok(self.state.read().await.regions.get(&region_id).cloned())
    }

    async fn regions(&self, conversation_id: &ConversationId) -> StoreResult<Vec<Region>> {
        Ok(self
            .state
            .read()
            .await
            .regions
            .values()
            .filter(|r| &r.conversation_id == conversation_id)
            .cloned()
            .collect())
    }

    async fn insert_poi_sets(
        &self,
        region: &Region,
        sets: &[(String, Vec<PointOfInterest>)],
    ) -> StoreResult<Vec<PointOfInterestSet>> {
        let mut state = self.state.write().await;
        if !state.regions.contains_key(&region.id) {
            return Err(StoreError::NotFound(format!("region {}", region.id)));
        }
        let created_at = Utc::now();
        let mut stored = Vec::with_capacity(sets.len());
        for (interest, points) in sets {
            state.next_poi_set_id += 1;
            let set = PointOfInterestSet {
                id: state.next_poi_set_id,
                region_id: region.id,
                conversation_id: region.conversation_id.clone(),
                interest: interest.clone(),
                points: points.clone(),
                created_at,
            };
            state.poi_sets.insert(set.id, set.clone());
            stored.push(set);
        }
        Ok(stored)
    }

    async fn poi_sets(&self, region_id: i64) -> StoreResult<Vec<PointOfInterestSet>> {
        Ok(self
            .state
            .read()
            .await
            .poi_sets
            .values()
            .filter(|s| s.region_id == region_id)
            .cloned()
            .collect())
    }

    async fn upsert_boundary(&self, boundary: &AreaBoundary) -> StoreResult<()> {
        self.state
            .write()
            .await
            .boundaries
            .insert(boundary.name.clone(), boundary.clone());
        Ok(())
    }

    async fn boundaries(&self) -> StoreResult<Vec<AreaBoundary>> {
        Ok(self.state.read().await.boundaries.values().cloned().collect())
    }

    async fn insert_listing(&self, listing: &Listing) -> StoreResult<i64> {
        let mut state = self.state.write().await;
        let id = state.listings.len() as i64 + 1;
        let mut stored = listing.clone();
        stored.id = id;
        state.listings.push(stored);
        Ok(id)
    }

    async fn listings(&self) -> StoreResult<Vec<Listing>> {
        Ok(self.state.read().await.listings.clone())
    }
}
