//! Resilience subsystem.
//!
//! # Data Flow
//! ```text
//! Outbound fetch:
//!     → connect attempt fails before any response byte
//!     → retries.rs (attempt budget, retryable classification, delay)
//! ```
//!
//! # Design Decisions
//! - Only the connect stage is retried; a body that has started flowing is never replayed
//! - Upstream failure statuses are answers, not transport faults, and are not retried
//! - Bounded attempts with a capped delay

pub mod retries;

pub use retries::RetryPolicy;
