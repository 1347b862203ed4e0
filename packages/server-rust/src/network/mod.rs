//! HTTP/WebSocket front: scope hub, handlers, middleware and shutdown.

pub mod config;
pub mod connection;
pub mod handlers;
pub mod middleware;
pub mod module;
pub mod shutdown;

pub use config::*;
pub use connection::*;
pub use handlers::AppState;
pub use module::{NetworkError, NetworkModule};
pub use shutdown::*;
