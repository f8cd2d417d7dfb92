//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (main.rs):
//!     Load config → Init logging → Seed SharedConfig → Bind listener
//!
//! Shutdown (shutdown.rs):
//!     Signal received → Stop accepting → Finish in-flight requests
//!     → Drain detached side effects (tasks.rs) → Exit
//!
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → Trigger graceful shutdown
//! ```
//!
//! # Design Decisions
//! - Shutdown has a deadline: pending log/trace work is abandoned after
//!   `listener.shutdown_grace_secs`

pub mod shutdown;
pub mod signals;
pub mod tasks;

pub use shutdown::Shutdown;
pub use tasks::SideEffectTracker;
