//! Request middleware.
//!
//! # Layer order (outermost first)
//! ```text
//! SetRequestId → PropagateRequestId
//!     → observe (metrics → trace → access log)
//!     → CatchPanic → handler
//! ```
//!
//! `observe` sits outside the panic layer so the status it records is the
//! one the client actually receives.

pub mod observe;

pub use observe::{observe, Observation, Outcome, Pipeline};
