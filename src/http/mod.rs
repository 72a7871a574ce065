//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum setup, connect info)
//!     → request.rs (assign or keep X-Request-Id)
//!     → routing (current snapshot) → forwarder
//!     → response.rs (map failures to status codes)
//!     → Send to client
//! ```

pub mod request;
pub mod response;
pub mod server;

pub use request::{request_id, UuidRequestId, X_REQUEST_ID};
pub use response::ProxyError;
pub use server::{AppState, HttpServer};
