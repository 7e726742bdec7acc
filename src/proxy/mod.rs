//! Remote-file streaming proxy.
//!
//! # Data Flow
//! ```text
//! POST /api/stream {fileUrl}
//!     → handler.rs (validate, orchestrate, commit headers)
//!     → fetcher.rs (outbound GET, retries, status check)
//!     → filename.rs (name from Content-Disposition or URL)
//!     → relay.rs (chunk copy into the response body)
//! ```
//!
//! # Design Decisions
//! - Byte-transparent: no decompression, no buffering of the whole payload
//! - Every entity is request-scoped; only the immutable config is shared
//! - Failures after the header commit abort the connection instead of
//!   appending an error payload

pub mod error;
pub mod fetcher;
pub mod filename;
pub mod handler;
pub mod relay;

pub use error::{FetchError, ProxyError, RelayError, ValidationError};
pub use fetcher::{UpstreamFetcher, UpstreamResponse};
pub use filename::{resolve_filename, FilenameSource, ResolvedFilename};
pub use handler::{stream_handler, ProxyRequest, ProxyState};
pub use relay::{FailureStage, RelayOutcome, StreamingRelay};
