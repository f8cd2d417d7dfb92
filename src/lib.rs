//! Message API service library.

pub mod config;
pub mod http;
pub mod lifecycle;
pub mod observability;
pub mod state;

pub use config::schema::ServiceConfig;
pub use http::HttpServer;
pub use lifecycle::Shutdown;
pub use state::SharedConfig;
