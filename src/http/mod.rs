//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection (axum::serve)
//!     → request id assigned (x-request-id)
//!     → middleware/observe.rs (RequestContext, timer, span)
//!     → handlers.rs (method check, SharedConfig read/replace)
//!     → response.rs (envelope, payload captured for observability)
//!     → middleware/observe.rs (metrics → trace → access log)
//!     → Send to client
//! ```

pub mod error;
pub mod handlers;
pub mod middleware;
pub mod request;
pub mod response;
pub mod server;

pub use error::ApiError;
pub use request::{RequestContext, Stage, X_REQUEST_ID};
pub use response::Envelope;
pub use server::{build_router, AppState, HttpServer, ServerError};
