//! File relay service library.
//!
//! Stores and serves uploaded PDF files and proxies arbitrary remote files,
//! streaming them back to the caller with an inferred filename and size.

pub mod config;
pub mod http;
pub mod lifecycle;
pub mod observability;
pub mod proxy;
pub mod resilience;
pub mod storage;

pub use config::RelayConfig;
pub use http::HttpServer;
pub use lifecycle::Shutdown;
