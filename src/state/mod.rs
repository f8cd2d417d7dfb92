//! Shared mutable service state.
//!
//! # Data Flow
//! ```text
//! startup (config.message.initial)
//!     → SharedConfig::new (trim + validate)
//!     → cloned into AppState for every handler
//!
//! GET  /message       → SharedConfig::read     (lock-free load)
//! PUT  /configuration → SharedConfig::replace  (serialized store)
//! ```
//!
//! # Design Decisions
//! - Value is an `Arc<String>` behind an atomic pointer swap
//! - Readers never block; writers serialize on a mutex
//! - Injected through state, never a process global

pub mod shared_config;

pub use shared_config::{InvalidMessage, SharedConfig};
