//! LLM provider implementations for Settlr.
//!
//! [`AnthropicProvider`] talks to the Messages API; [`RetryProvider`] wraps
//! any provider with bounded retries for transient failures. The router
//! builds the wrapped stack from configuration.

pub mod anthropic;
pub mod retry;
pub mod router;

pub use anthropic::AnthropicProvider;
pub use retry::{RetryPolicy, RetryProvider};
pub use router::build_from_config;
