//! Persistence seams.
//!
//! [`HistoryStore`] holds conversations and their messages; [`GeoStore`]
//! holds regions, point-of-interest sets, area boundaries, and listings.
//! Implementations live in `settlr-store`.

use crate::error::StoreError;
use crate::geo::Ring;
use crate::message::{Conversation, ConversationId, Message};
use crate::region::{AreaBoundary, Listing, PointOfInterest, PointOfInterestSet, Region};
use async_trait::async_trait;

pub type StoreResult<T> = std::result::Result<T, StoreError>;

#[async_trait]
pub trait HistoryStore: Send + Sync {
    /// Create a conversation with the given ID, titled after `first_message`,
    /// and store `first_message` as its first user message.
    async fn create_conversation(
        &self,
        id: &ConversationId,
        first_message: &str,
    ) -> StoreResult<Conversation>;

    async fn get_conversation(&self, id: &ConversationId) -> StoreResult<Option<Conversation>>;

    /// Append a message and bump the conversation's `updated_at`.
    ///
    /// Fails with [`StoreError::NotFound`] if the conversation does not exist.
    async fn append_message(&self, id: &ConversationId, message: &Message) -> StoreResult<()>;

    /// All messages of a conversation, oldest first. Ties on timestamp are
    /// broken by insertion order.
    async fn messages(&self, id: &ConversationId) -> StoreResult<Vec<Message>>;

    /// Record an inbound user message, creating the conversation on first contact.
    async fn record_user_message(&self, id: &ConversationId, text: &str) -> StoreResult<()> {
        match self.get_conversation(id).await? {
            Some(_) => self.append_message(id, &Message::user(text)).await,
            None => self.create_conversation(id, text).await.map(|_| ()),
        }
    }
}

#[async_trait]
pub trait GeoStore: Send + Sync {
    async fn insert_region(
        &self,
        conversation_id: &ConversationId,
        name: &str,
        ring: &Ring,
    ) -> StoreResult<Region>;

    async fn get_region(&self, region_id: i64) -> StoreResult<Option<Region>>;

    /// Regions of a conversation in creation order.
    async fn regions(&self, conversation_id: &ConversationId) -> StoreResult<Vec<Region>>;

    /// Store one set per `(interest, points)` pair. Either every set is
    /// stored or none is.
    async fn insert_poi_sets(
        &self,
        region: &Region,
        sets: &[(String, Vec<PointOfInterest>)],
    ) -> StoreResult<Vec<PointOfInterestSet>>;

    /// Point-of-interest sets of a region in creation order.
    async fn poi_sets(&self, region_id: i64) -> StoreResult<Vec<PointOfInterestSet>>;

    /// Insert or replace a boundary keyed by its name.
    async fn upsert_boundary(&self, boundary: &AreaBoundary) -> StoreResult<()>;

    async fn boundaries(&self) -> StoreResult<Vec<AreaBoundary>>;

    /// Store a listing and return its assigned ID.
    async fn insert_listing(&self, listing: &Listing) -> StoreResult<i64>;

    async fn listings(&self) -> StoreResult<Vec<Listing>>;
}
