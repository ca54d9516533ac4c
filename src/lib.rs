//! Durable Streams Server
//!
//! An HTTP-native append-only log service: clients create named streams,
//! append opaque bytes or JSON items, and read from any byte/sequence
//! offset with optional live tailing. Every stream is backed by a single
//! framed segment file on disk; a persistent index and a crash-recovery
//! pass make the store's state survive a process restart.
//!
//! # Features
//!
//! - **Append-only streams**: Create streams and append data with guaranteed ordering
//! - **Durable on disk**: every stream is a framed segment file under `data_dir`, fsynced on write
//! - **Replay support**: Read from any offset to catch up on missed messages
//! - **Long-polling**: Wait for new messages with configurable timeout
//! - **Server-Sent Events (SSE)**: Continuous streaming of new messages
//! - **Crash recovery**: the segment file is the source of truth at startup
//! - **TTL/Expiration**: Automatic stream cleanup based on time
//! - **JSON mode**: Special handling for JSON content with array flattening
//! - **Writer coordination**: Sequence numbers to prevent duplicate writes
//! - **Cache-friendly cursors**: interval-quantized tokens so CDNs can collapse concurrent live reads
//!
//! # Example
//!
//! ```rust,no_run
//! use durable_stream::{server, types::ServerOptions};
//!
//! #[tokio::main]
//! async fn main() {
//!     let options = ServerOptions {
//!         port: 4437,
//!         host: "127.0.0.1".to_string(),
//!         data_dir: "./data".into(),
//!         ..Default::default()
//!     };
//!
//!     server::start_server(options).await.unwrap();
//! }
//! ```
//!
//! # Protocol
//!
//! ## Creating a stream
//!
//! ```text
//! PUT /v1/stream/my-events HTTP/1.1
//! Content-Type: application/json
//! Stream-TTL: 3600
//!
//! Response: 201 Created
//! Stream-Next-Offset: 0000000000000000_0000000000000000
//! ```
//!
//! ## Appending data
//!
//! ```text
//! POST /v1/stream/my-events HTTP/1.1
//! Content-Type: application/json
//!
//! {"event": "user_created", "id": 123}
//!
//! Response: 200 OK
//! Stream-Next-Offset: 0000000000000000_0000000000000042
//! ```
//!
//! ## Reading data
//!
//! ```text
//! GET /v1/stream/my-events?offset=-1 HTTP/1.1
//!
//! Response: 200 OK
//! Stream-Next-Offset: 0000000000000000_0000000000000042
//! Content-Type: application/json
//!
//! [{"event": "user_created", "id": 123}]
//! ```
//!
//! ## Long-polling
//!
//! ```text
//! GET /v1/stream/my-events?offset=0000000000000000_0000000000000042&live=long-poll HTTP/1.1
//!
//! (waits up to 30 seconds for new data)
//!
//! Response: 204 No Content (if no new data)
//! Stream-Up-To-Date: true
//! ```
//!
//! ## Server-Sent Events
//!
//! ```text
//! GET /v1/stream/my-events?offset=-1&live=sse HTTP/1.1
//! Accept: text/event-stream
//!
//! event: data
//! data: {"event": "user_created", "id": 123}
//!
//! event: control
//! data: {"streamNextOffset": "0000000000000000_0000000000000042", "streamCursor": "12345", "upToDate": true}
//! ```

pub mod cursor;
pub mod framing;
pub mod handle_pool;
pub mod metadata;
pub mod offset;
pub mod path_encoding;
pub mod recovery;
pub mod segment;
pub mod server;
pub mod store;
pub mod types;
pub mod waiter;

// Re-export commonly used items
pub use metadata::StreamDescriptor;
pub use offset::Offset;
pub use server::{create_router, start_server, AppState};
pub use store::Store;
pub use types::{CreateOutcome, ReadResult, ServerOptions, StoreError, StreamConfig, WaitOutcome};
