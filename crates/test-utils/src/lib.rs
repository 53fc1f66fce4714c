//! Test doubles shared across Settlr crates.

pub mod provider;

pub use provider::{ScriptedProvider, Step};
