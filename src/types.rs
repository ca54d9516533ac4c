//! Shared configuration, request/response shapes, and the error taxonomy
//! (spec section 7), which `server.rs` maps exhaustively to HTTP status
//! codes.

use std::path::PathBuf;
use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::metadata::StreamDescriptor;
use crate::segment::Message;

/// Maximum length of a single frame's payload (spec section 6 recommends
/// 64 MiB). A POST that would produce a larger frame fails with 413.
pub const MAX_FRAME_PAYLOAD_LEN: usize = 64 * 1024 * 1024;

/// Cap on a request body buffered in memory for JSON validation (spec
/// section 9, design notes). Above this, reject rather than buffer further.
pub const MAX_REQUEST_BODY_BYTES: usize = 16 * 1024 * 1024;

/// Normalize a content type by stripping charset and parameters.
pub fn normalize_content_type(content_type: &str) -> &str {
    content_type
        .split(';')
        .next()
        .unwrap_or(content_type)
        .trim()
}

/// Configuration for creating a stream.
#[derive(Debug, Clone, Default)]
pub struct StreamConfig {
    pub content_type: Option<String>,
    pub ttl_seconds: Option<u64>,
    pub expires_at: Option<DateTime<Utc>>,
    pub initial_data: Option<Vec<u8>>,
}

/// Server configuration options (spec section 6).
#[derive(Debug, Clone)]
pub struct ServerOptions {
    /// Port to listen on (0 for auto-assign)
    pub port: u16,
    /// Host to bind to
    pub host: String,
    /// Root directory for `meta/` and `streams/`. Required.
    pub data_dir: PathBuf,
    /// Bound on concurrently open append handles.
    pub max_file_handles: usize,
    /// How long a long-poll GET blocks waiting for new data.
    pub long_poll_timeout: Duration,
    /// How long an SSE connection stays open before the server closes it so
    /// the client reconnects with a fresh offset.
    pub sse_reconnect_interval: Duration,
    /// Cursor quantization interval.
    pub cursor_interval: Duration,
    /// Cursor epoch.
    pub cursor_epoch: DateTime<Utc>,
    /// Cadence of the background expired-stream sweep.
    pub cleanup_interval: Duration,
    /// Enable gzip/deflate response compression.
    pub compression: bool,
}

impl Default for ServerOptions {
    fn default() -> Self {
        Self {
            port: 4437,
            host: "127.0.0.1".to_string(),
            data_dir: PathBuf::from("./data"),
            max_file_handles: 100,
            long_poll_timeout: Duration::from_secs(30),
            sse_reconnect_interval: Duration::from_secs(60),
            cursor_interval: Duration::from_secs(20),
            cursor_epoch: DateTime::parse_from_rfc3339("2025-12-19T00:00:00Z")
                .unwrap()
                .with_timezone(&Utc),
            cleanup_interval: Duration::from_secs(60),
            compression: true,
        }
    }
}

/// Error taxonomy (spec section 7). `OffsetGone` and `RateLimited` are
/// reserved for retention and rate-limiting policy that this server does
/// not implement (spec section 9, open questions); they're kept here and
/// matched exhaustively in `server.rs` so wiring either up later doesn't
/// require touching every call site, but nothing constructs them today.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Stream not found: {0}")]
    NotFound(String),

    #[error("Stream already exists with different configuration")]
    ConfigMismatch,

    #[error("Content-type mismatch: expected {expected}, got {actual}")]
    ContentTypeMismatch { expected: String, actual: String },

    #[error("Sequence conflict: {0}")]
    SeqConflict(String),

    #[error("Empty arrays are not allowed on append")]
    EmptyArrayNotAllowed,

    #[error("Frame exceeds the maximum allowed length")]
    FrameTooLarge,

    #[error("Offset is before the retention floor")]
    OffsetGone,

    #[error("Rate limited")]
    RateLimited,

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<std::io::Error> for StoreError {
    fn from(err: std::io::Error) -> Self {
        StoreError::Internal(err.to_string())
    }
}

impl From<heed::Error> for StoreError {
    fn from(err: heed::Error) -> Self {
        StoreError::Internal(err.to_string())
    }
}

/// Outcome of `Store::create`: distinguishes a brand new stream from an
/// idempotent match against an identical existing one, so the handler can
/// choose 201 vs 200.
#[derive(Debug, Clone)]
pub enum CreateOutcome {
    Created(StreamDescriptor),
    AlreadyExists(StreamDescriptor),
}

impl CreateOutcome {
    pub fn descriptor(&self) -> &StreamDescriptor {
        match self {
            CreateOutcome::Created(d) | CreateOutcome::AlreadyExists(d) => d,
        }
    }
}

/// Result of a `Store::read`.
#[derive(Debug, Clone)]
pub struct ReadResult {
    pub messages: Vec<Message>,
    pub next_offset: crate::offset::Offset,
    pub up_to_date: bool,
}

/// Outcome of `Store::wait_for_messages`.
#[derive(Debug)]
pub enum WaitOutcome {
    Data(ReadResult),
    TimedOut { next_offset: crate::offset::Offset },
    /// The stream was deleted while we were waiting; callers should treat
    /// this like a fresh 404.
    Deleted,
}
