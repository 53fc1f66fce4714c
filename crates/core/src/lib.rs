//! # Settlr Core
//!
//! Domain types, traits, and error definitions for the Settlr neighborhood
//! assistant. This crate has **no framework dependencies**: it defines the
//! model that the provider, store, tool, agent, and gateway crates implement
//! against.
//!
//! ## Layout
//!
//! - [`turn`] carries the per-request [`TurnContext`] and the [`Phase`] that
//!   selects which tools the model may call.
//! - [`tool`] defines the [`Tool`] trait, the phase-scoped [`ToolRegistry`],
//!   and the [`ToolSet`] it is built from.
//! - [`store`] defines the persistence seams the agent loop and tools use.
//! - [`notify`] is the fire-and-forget map notification seam.
//! - [`geo`] holds coordinates, polygon rings, and containment.

pub mod error;
pub mod geo;
pub mod message;
pub mod notify;
pub mod provider;
pub mod region;
pub mod store;
pub mod tool;
pub mod turn;

// Re-export key types at crate root for ergonomics
pub use error::{Error, ProviderError, Result, StoreError, ToolError};
pub use geo::{Coordinate, GeoEnvelope, Ring, RingError};
pub use message::{Conversation, ConversationId, Message, Role, ToolCallRecord};
pub use notify::{MapEvent, MapNotifier, NoopNotifier, QueuedNotifier};
pub use provider::{
    Provider, ProviderRequest, ProviderResponse, StreamChunk, ToolChoice, ToolDefinition,
};
pub use region::{AreaBoundary, Listing, PointOfInterest, PointOfInterestSet, Region};
pub use store::{GeoStore, HistoryStore};
pub use tool::{Tool, ToolName, ToolOutput, ToolRegistry, ToolSet};
pub use turn::{Phase, TurnContext};
