//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum setup, middleware)
//!     → request.rs (request ID)
//!     → proxy::handler (POST /api/stream)
//!     → files.rs (list/upload/delete/download over the blob store)
//!     → response.rs (JSON bodies)
//!     → Send to client
//! ```

pub mod files;
pub mod request;
pub mod response;
pub mod server;

pub use request::{UuidRequestId, X_REQUEST_ID};
pub use server::{HttpServer, ServerError};
