//! # aide_chat - conversation sessions for the aide assistant
//!
//! This crate keeps one short-lived conversation per contact:
//! - Sessions are created on first contact and seeded with the contact's tags
//! - Messages arriving close together are answered with a single reply
//! - An operator can take over a conversation at any time
//! - Idle sessions are summarized into memory and tags, then discarded
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────┐     ┌─────────────────┐     ┌─────────────────┐
//! │     Router      │────▶│   ChatManager   │────▶│      Chat       │
//! └─────────────────┘     └────────┬────────┘     └────────┬────────┘
//!                                  │ spawns                │ drains
//!                                  ▼                       ▼
//!                         ┌─────────────────┐     ┌─────────────────┐
//!                         │ Lifecycle task  │────▶│    Analyzers    │
//!                         └────────┬────────┘     └─────────────────┘
//!                                  ▼
//!                         ┌─────────────────┐
//!                         │ UserStore +     │
//!                         │ TeardownNotifier│
//!                         └─────────────────┘
//! ```
//!
//! Language models, profile storage and the chat platform are reached through
//! the traits in [`traits`]. [`llm`] and [`analysis`] provide LLM-backed
//! implementations; [`store`] an in-memory profile store.

pub mod types;
pub mod error;
pub mod config;
pub mod traits;
pub mod session;
pub mod manager;
pub mod lifecycle;
pub mod store;
pub mod llm;
pub mod analysis;
pub mod router;

#[cfg(test)]
mod test_support;

pub use types::*;
pub use error::*;
pub use config::*;
pub use traits::*;
pub use session::*;
pub use manager::*;
pub use lifecycle::*;
pub use store::*;
pub use llm::*;
pub use analysis::*;
pub use router::*;
