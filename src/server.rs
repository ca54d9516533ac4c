//! HTTP surface implementing the durable streams protocol (spec 4.I).

use std::{sync::Arc, time::Duration};

use axum::{
    body::Body,
    extract::{Path, Query, State},
    http::{header, HeaderMap, Method, StatusCode},
    response::{sse::Event, IntoResponse, Response, Sse},
    routing::{delete, get, head, post, put},
    Router,
};
use chrono::{DateTime, Utc};
use futures::stream::Stream;
use serde::Deserialize;
use tower_http::compression::CompressionLayer;
use tower_http::cors::{Any, CorsLayer};
use tracing::{info, warn};

use crate::cursor::{generate_response_cursor, parse_cursor, CursorOptions};
use crate::offset::Offset;
use crate::store::Store;
use crate::types::{CreateOutcome, ServerOptions, StoreError, StreamConfig, WaitOutcome, MAX_REQUEST_BODY_BYTES};

/// Application state shared across handlers (spec section 9, design
/// notes: an explicit context struct, not process-wide singletons).
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<Store>,
    pub options: ServerOptions,
}

#[derive(Debug, Deserialize)]
pub struct ReadQuery {
    pub offset: Option<String>,
    pub live: Option<String>,
    pub cursor: Option<String>,
}

pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::HEAD,
            Method::OPTIONS,
        ])
        .allow_headers(Any)
        .expose_headers(Any);

    let compression = state.options.compression;

    let router = Router::new()
        .route("/v1/stream/{*path}", put(handle_create))
        .route("/v1/stream/{*path}", head(handle_head))
        .route("/v1/stream/{*path}", get(handle_read))
        .route("/v1/stream/{*path}", post(handle_append))
        .route("/v1/stream/{*path}", delete(handle_delete))
        .layer(cors)
        .with_state(state);

    if compression {
        router.layer(CompressionLayer::new())
    } else {
        router
    }
}

fn cursor_options(options: &ServerOptions) -> CursorOptions {
    CursorOptions {
        interval_seconds: options.cursor_interval.as_secs().max(1),
        epoch: options.cursor_epoch,
    }
}

async fn handle_create(
    State(state): State<AppState>,
    Path(path): Path<String>,
    headers: HeaderMap,
    body: Body,
) -> Response {
    let path = format!("/{path}");

    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(String::from);

    let ttl_seconds = match parse_ttl_header(&headers) {
        Ok(v) => v,
        Err(msg) => return bad_request(&msg),
    };
    let expires_at = match parse_expires_at_header(&headers) {
        Ok(v) => v,
        Err(msg) => return bad_request(&msg),
    };
    if ttl_seconds.is_some() && expires_at.is_some() {
        return bad_request("cannot specify both Stream-TTL and Stream-Expires-At");
    }

    let body_bytes = match axum::body::to_bytes(body, MAX_REQUEST_BODY_BYTES).await {
        Ok(bytes) => bytes.to_vec(),
        Err(_) => return (StatusCode::PAYLOAD_TOO_LARGE, "request body too large").into_response(),
    };
    let initial_data = (!body_bytes.is_empty()).then_some(body_bytes);

    let config = StreamConfig {
        content_type: content_type.clone(),
        ttl_seconds,
        expires_at,
        initial_data,
    };

    match state.store.create(&path, config).await {
        Ok(outcome) => {
            let status = match &outcome {
                CreateOutcome::Created(_) => StatusCode::CREATED,
                CreateOutcome::AlreadyExists(_) => StatusCode::OK,
            };
            let descriptor = outcome.descriptor();

            let mut response = Response::builder()
                .status(status)
                .header("Stream-Next-Offset", descriptor.current_offset().to_string());
            if status == StatusCode::CREATED {
                response = response.header(header::LOCATION, &path);
            }

            if !descriptor.content_type.is_empty() {
                response = response.header(header::CONTENT_TYPE, &descriptor.content_type);
            }

            response.body(Body::empty()).unwrap()
        }
        Err(err) => store_error_response(err),
    }
}

async fn handle_head(
    State(state): State<AppState>,
    Path(path): Path<String>,
) -> Response {
    let path = format!("/{path}");

    let descriptor = match state.store.get(&path) {
        Some(d) => d,
        None => return StatusCode::NOT_FOUND.into_response(),
    };

    let mut response = Response::builder()
        .status(StatusCode::OK)
        .header("Stream-Next-Offset", descriptor.current_offset().to_string())
        .header(header::CACHE_CONTROL, "no-store");

    if !descriptor.content_type.is_empty() {
        response = response.header(header::CONTENT_TYPE, &descriptor.content_type);
    }
    if let Some(ttl) = descriptor.ttl_seconds {
        response = response.header("Stream-TTL", ttl.to_string());
    }
    if let Some(expires_at) = descriptor.expires_at {
        response = response.header("Stream-Expires-At", expires_at.to_rfc3339());
    }

    response.body(Body::empty()).unwrap()
}

async fn handle_read(
    State(state): State<AppState>,
    Path(path): Path<String>,
    Query(query): Query<ReadQuery>,
    headers: HeaderMap,
) -> Response {
    let path = format!("/{path}");

    if !state.store.has(&path) {
        return StatusCode::NOT_FOUND.into_response();
    }

    let live = query.live.as_deref();
    let offset = match parse_offset_query(query.offset.as_deref(), live.is_some()) {
        Ok(offset) => offset,
        Err(msg) => return bad_request(&msg),
    };

    let options = cursor_options(&state.options);
    let client_cursor = query.cursor.as_deref().and_then(parse_cursor);
    let response_cursor = generate_response_cursor(client_cursor, &options);

    match live {
        None => handle_catch_up(state, path, offset, response_cursor, headers),
        Some("long-poll") => handle_long_poll(state, path, offset, response_cursor).await,
        Some("sse") => handle_sse(state, path, offset, response_cursor).await,
        Some("auto") => {
            if state
                .store
                .get(&path)
                .map(|d| is_streamable_content_type(&d.content_type))
                .unwrap_or(false)
            {
                handle_sse(state, path, offset, response_cursor).await
            } else {
                handle_long_poll(state, path, offset, response_cursor).await
            }
        }
        Some(other) => bad_request(&format!("unknown live mode: {other}")),
    }
}

fn is_streamable_content_type(content_type: &str) -> bool {
    let ct = crate::types::normalize_content_type(content_type);
    ct.starts_with("text/") || ct == "application/json"
}

fn handle_catch_up(state: AppState, path: String, offset: Offset, cursor: u64, headers: HeaderMap) -> Response {
    let result = match state.store.read(&path, offset) {
        Ok(r) => r,
        Err(err) => return store_error_response(err),
    };

    let etag = generate_etag(&path, &offset.to_string(), &result.next_offset.to_string());
    if let Some(if_none_match) = headers.get(header::IF_NONE_MATCH).and_then(|v| v.to_str().ok()) {
        if if_none_match == etag {
            return Response::builder()
                .status(StatusCode::NOT_MODIFIED)
                .header(header::ETAG, etag)
                .body(Body::empty())
                .unwrap();
        }
    }

    let descriptor = state.store.get(&path);
    let content_type = descriptor.as_ref().map(|d| d.content_type.as_str()).unwrap_or("");
    let payloads: Vec<Vec<u8>> = result.messages.iter().map(|m| m.data.clone()).collect();
    let body = crate::framing::format_response(content_type, &payloads);

    let mut response = Response::builder()
        .status(StatusCode::OK)
        .header("Stream-Next-Offset", result.next_offset.to_string())
        .header("Stream-Cursor", cursor.to_string())
        .header(header::ETAG, etag)
        .header(
            header::CACHE_CONTROL,
            "public, max-age=60, stale-while-revalidate=300",
        );

    if result.up_to_date {
        response = response.header("Stream-Up-To-Date", "true");
    }
    if !content_type.is_empty() {
        response = response.header(header::CONTENT_TYPE, content_type);
    }

    response.body(Body::from(body)).unwrap()
}

async fn handle_long_poll(state: AppState, path: String, offset: Offset, cursor: u64) -> Response {
    let result = match state.store.read(&path, offset) {
        Ok(r) => r,
        Err(err) => return store_error_response(err),
    };

    if !result.messages.is_empty() {
        return respond_with_messages(&state, &path, &result.messages, result.next_offset, result.up_to_date, cursor);
    }

    match state
        .store
        .wait_for_messages(&path, offset, state.options.long_poll_timeout)
        .await
    {
        Ok(WaitOutcome::Data(result)) => {
            respond_with_messages(&state, &path, &result.messages, result.next_offset, result.up_to_date, cursor)
        }
        Ok(WaitOutcome::Deleted) => StatusCode::NOT_FOUND.into_response(),
        Ok(WaitOutcome::TimedOut { next_offset }) => Response::builder()
            .status(StatusCode::NO_CONTENT)
            .header("Stream-Next-Offset", next_offset.to_string())
            .header("Stream-Cursor", cursor.to_string())
            .header("Stream-Up-To-Date", "true")
            .header(header::CACHE_CONTROL, "no-store")
            .body(Body::empty())
            .unwrap(),
        Err(err) => store_error_response(err),
    }
}

fn respond_with_messages(
    state: &AppState,
    path: &str,
    messages: &[crate::segment::Message],
    next_offset: Offset,
    up_to_date: bool,
    cursor: u64,
) -> Response {
    let descriptor = state.store.get(path);
    let content_type = descriptor.as_ref().map(|d| d.content_type.as_str()).unwrap_or("");
    let payloads: Vec<Vec<u8>> = messages.iter().map(|m| m.data.clone()).collect();
    let body = crate::framing::format_response(content_type, &payloads);

    let mut response = Response::builder()
        .status(StatusCode::OK)
        .header("Stream-Next-Offset", next_offset.to_string())
        .header("Stream-Cursor", cursor.to_string())
        .header(header::CACHE_CONTROL, "no-store");

    if up_to_date {
        response = response.header("Stream-Up-To-Date", "true");
    }

    if !content_type.is_empty() {
        response = response.header(header::CONTENT_TYPE, content_type);
    }

    response.body(Body::from(body)).unwrap()
}

async fn handle_sse(state: AppState, path: String, offset: Offset, cursor: u64) -> Response {
    let descriptor = match state.store.get(&path) {
        Some(d) => d,
        None => return StatusCode::NOT_FOUND.into_response(),
    };
    if !is_streamable_content_type(&descriptor.content_type) {
        return bad_request("live=sse requires a textual or JSON stream content type");
    }

    let stream = create_sse_stream(state, path, offset, cursor);

    Sse::new(stream)
        .keep_alive(
            axum::response::sse::KeepAlive::new()
                .interval(Duration::from_secs(15))
                .text("keepalive"),
        )
        .into_response()
}

fn control_event(next_offset: Offset, cursor: u64, up_to_date: bool) -> Event {
    let payload = serde_json::json!({
        "streamNextOffset": next_offset.to_string(),
        "streamCursor": cursor.to_string(),
        "upToDate": up_to_date,
    });
    Event::default().event("control").data(payload.to_string())
}

fn create_sse_stream(
    state: AppState,
    path: String,
    mut offset: Offset,
    mut cursor: u64,
) -> impl Stream<Item = Result<Event, std::convert::Infallible>> {
    async_stream::stream! {
        let options = cursor_options(&state.options);
        let deadline = tokio::time::Instant::now() + state.options.sse_reconnect_interval;

        if let Ok(result) = state.store.read(&path, offset) {
            for message in &result.messages {
                yield Ok(Event::default().event("data").data(String::from_utf8_lossy(&message.data)));
            }
            offset = result.next_offset;
            cursor = generate_response_cursor(Some(cursor), &options);
            yield Ok(control_event(offset, cursor, result.up_to_date));
        }

        loop {
            let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
            if remaining.is_zero() {
                break;
            }
            // Cap each wait at the long-poll timeout (not the whole reconnect
            // window) so a quiet stream still gets a periodic `control`
            // heartbeat rather than just one right before the connection
            // closes for reconnect.
            let tick = remaining.min(state.options.long_poll_timeout);

            match state.store.wait_for_messages(&path, offset, tick).await {
                Ok(WaitOutcome::Data(result)) => {
                    for message in &result.messages {
                        yield Ok(Event::default().event("data").data(String::from_utf8_lossy(&message.data)));
                    }
                    offset = result.next_offset;
                    cursor = generate_response_cursor(Some(cursor), &options);
                    yield Ok(control_event(offset, cursor, result.up_to_date));
                }
                Ok(WaitOutcome::Deleted) => break,
                Ok(WaitOutcome::TimedOut { next_offset }) => {
                    offset = next_offset;
                    cursor = generate_response_cursor(Some(cursor), &options);
                    yield Ok(control_event(offset, cursor, true));
                }
                Err(_) => break,
            }
        }
    }
}

async fn handle_append(
    State(state): State<AppState>,
    Path(path): Path<String>,
    headers: HeaderMap,
    body: Body,
) -> Response {
    let path = format!("/{path}");

    let content_type = headers.get(header::CONTENT_TYPE).and_then(|v| v.to_str().ok());
    let seq = headers.get("Stream-Seq").and_then(|v| v.to_str().ok());

    let body_bytes = match axum::body::to_bytes(body, MAX_REQUEST_BODY_BYTES).await {
        Ok(bytes) => bytes.to_vec(),
        Err(_) => return (StatusCode::PAYLOAD_TOO_LARGE, "request body too large").into_response(),
    };

    match state.store.append(&path, body_bytes, content_type, seq).await {
        Ok(descriptor) => Response::builder()
            .status(StatusCode::OK)
            .header("Stream-Next-Offset", descriptor.current_offset().to_string())
            .body(Body::empty())
            .unwrap(),
        Err(err) => store_error_response(err),
    }
}

async fn handle_delete(State(state): State<AppState>, Path(path): Path<String>) -> Response {
    let path = format!("/{path}");
    match state.store.delete(&path).await {
        Ok(true) => StatusCode::NO_CONTENT.into_response(),
        Ok(false) => StatusCode::NOT_FOUND.into_response(),
        Err(err) => store_error_response(err),
    }
}

fn parse_offset_query(raw: Option<&str>, live_requested: bool) -> Result<Offset, String> {
    match raw {
        Some(s) if s.is_empty() => Err("empty offset parameter".to_string()),
        Some(s) => Offset::parse(s).ok_or_else(|| format!("invalid offset: {s}")),
        None if live_requested => Err("offset is required for live reads".to_string()),
        None => Ok(Offset::ZERO),
    }
}

fn store_error_response(err: StoreError) -> Response {
    let status = match &err {
        StoreError::InvalidArgument(_) => StatusCode::BAD_REQUEST,
        StoreError::NotFound(_) => StatusCode::NOT_FOUND,
        StoreError::ConfigMismatch => StatusCode::CONFLICT,
        StoreError::ContentTypeMismatch { .. } => StatusCode::CONFLICT,
        StoreError::SeqConflict(_) => StatusCode::CONFLICT,
        StoreError::EmptyArrayNotAllowed => StatusCode::BAD_REQUEST,
        StoreError::FrameTooLarge => StatusCode::PAYLOAD_TOO_LARGE,
        StoreError::OffsetGone => StatusCode::GONE,
        StoreError::RateLimited => StatusCode::TOO_MANY_REQUESTS,
        StoreError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };
    if status == StatusCode::INTERNAL_SERVER_ERROR {
        warn!(error = %err, "internal store error");
        return (status, "internal error").into_response();
    }
    (status, err.to_string()).into_response()
}

fn bad_request(message: &str) -> Response {
    (StatusCode::BAD_REQUEST, message.to_string()).into_response()
}

fn generate_etag(path: &str, start_offset: &str, end_offset: &str) -> String {
    use base64::Engine;
    let path_b64 = base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(path);
    format!("\"{path_b64}:{start_offset}:{end_offset}\"")
}

fn parse_ttl_header(headers: &HeaderMap) -> Result<Option<u64>, String> {
    let Some(raw) = headers.get("Stream-TTL").and_then(|v| v.to_str().ok()) else {
        return Ok(None);
    };
    if raw.is_empty() || !raw.bytes().all(|b| b.is_ascii_digit()) {
        return Err("Stream-TTL must be a positive decimal integer".to_string());
    }
    if raw.len() > 1 && raw.starts_with('0') {
        return Err("Stream-TTL must not have a leading zero".to_string());
    }
    let ttl: u64 = raw.parse().map_err(|_| "Stream-TTL out of range".to_string())?;
    if ttl == 0 {
        return Err("Stream-TTL must be greater than zero".to_string());
    }
    Ok(Some(ttl))
}

fn parse_expires_at_header(headers: &HeaderMap) -> Result<Option<DateTime<Utc>>, String> {
    let Some(raw) = headers.get("Stream-Expires-At").and_then(|v| v.to_str().ok()) else {
        return Ok(None);
    };
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| Some(dt.with_timezone(&Utc)))
        .map_err(|_| "Stream-Expires-At must be an RFC3339 instant".to_string())
}

/// Start the server, opening (and recovering) the store from
/// `options.data_dir` first.
pub async fn start_server(options: ServerOptions) -> std::io::Result<()> {
    let store = Store::open(&options)
        .map_err(|err| std::io::Error::other(err.to_string()))?;

    crate::store::spawn_cleanup_task(Arc::clone(&store), options.cleanup_interval);
    // Kept alive for the remainder of this function: dropping a
    // `RecommendedWatcher` stops it from watching.
    let _file_watcher = match crate::store::spawn_file_watch_bridge(Arc::clone(&store)) {
        Ok(watcher) => Some(watcher),
        Err(err) => {
            warn!(error = %err, "file-watch bridge unavailable, continuing without it");
            None
        }
    };

    let state = AppState {
        store,
        options: options.clone(),
    };
    let router = create_router(state);

    let addr = format!("{}:{}", options.host, options.port);
    info!(%addr, "starting durable streams server");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, router).await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{body::Body, http::Request};
    use tempfile::TempDir;
    use tower::ServiceExt;

    fn test_state(dir: &TempDir) -> AppState {
        let options = ServerOptions {
            data_dir: dir.path().to_path_buf(),
            ..Default::default()
        };
        AppState {
            store: Store::open(&options).unwrap(),
            options,
        }
    }

    #[tokio::test]
    async fn create_returns_201_with_next_offset() {
        let dir = TempDir::new().unwrap();
        let app = create_router(test_state(&dir));

        let response = app
            .oneshot(
                Request::builder()
                    .method("PUT")
                    .uri("/v1/stream/test/stream")
                    .header("Content-Type", "text/plain")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::CREATED);
        assert!(response.headers().contains_key("stream-next-offset"));
    }

    #[tokio::test]
    async fn create_is_idempotent() {
        let dir = TempDir::new().unwrap();
        let app = create_router(test_state(&dir));

        let req = || {
            Request::builder()
                .method("PUT")
                .uri("/v1/stream/test/stream")
                .header("Content-Type", "text/plain")
                .body(Body::empty())
                .unwrap()
        };

        let first = app.clone().oneshot(req()).await.unwrap();
        assert_eq!(first.status(), StatusCode::CREATED);
        let second = app.oneshot(req()).await.unwrap();
        assert_eq!(second.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn create_conflict_on_mismatched_config() {
        let dir = TempDir::new().unwrap();
        let app = create_router(test_state(&dir));

        app.clone()
            .oneshot(
                Request::builder()
                    .method("PUT")
                    .uri("/v1/stream/s")
                    .header("Content-Type", "text/plain")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        let response = app
            .oneshot(
                Request::builder()
                    .method("PUT")
                    .uri("/v1/stream/s")
                    .header("Content-Type", "application/json")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn append_then_catch_up_read_round_trips() {
        let dir = TempDir::new().unwrap();
        let app = create_router(test_state(&dir));

        app.clone()
            .oneshot(
                Request::builder()
                    .method("PUT")
                    .uri("/v1/stream/s")
                    .header("Content-Type", "text/plain")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        let append = app
            .clone()
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/v1/stream/s")
                    .header("Content-Type", "text/plain")
                    .body(Body::from("hello world"))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(append.status(), StatusCode::OK);

        let read = app
            .oneshot(
                Request::builder()
                    .method("GET")
                    .uri("/v1/stream/s")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(read.status(), StatusCode::OK);
        assert_eq!(read.headers().get("stream-up-to-date").unwrap(), "true");

        let body = axum::body::to_bytes(read.into_body(), usize::MAX).await.unwrap();
        assert_eq!(&body[..], b"hello world");
    }

    #[tokio::test]
    async fn json_mode_wraps_flattened_array_in_brackets() {
        let dir = TempDir::new().unwrap();
        let app = create_router(test_state(&dir));

        app.clone()
            .oneshot(
                Request::builder()
                    .method("PUT")
                    .uri("/v1/stream/s")
                    .header("Content-Type", "application/json")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        app.clone()
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/v1/stream/s")
                    .header("Content-Type", "application/json")
                    .body(Body::from("[1,2,3]"))
                    .unwrap(),
            )
            .await
            .unwrap();

        let read = app
            .oneshot(
                Request::builder()
                    .method("GET")
                    .uri("/v1/stream/s")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        let body = axum::body::to_bytes(read.into_body(), usize::MAX).await.unwrap();
        assert_eq!(&body[..], b"[1,2,3]");
    }

    #[tokio::test]
    async fn empty_json_array_append_is_rejected() {
        let dir = TempDir::new().unwrap();
        let app = create_router(test_state(&dir));

        app.clone()
            .oneshot(
                Request::builder()
                    .method("PUT")
                    .uri("/v1/stream/s")
                    .header("Content-Type", "application/json")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/v1/stream/s")
                    .header("Content-Type", "application/json")
                    .body(Body::from("[]"))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn delete_then_read_is_404() {
        let dir = TempDir::new().unwrap();
        let app = create_router(test_state(&dir));

        app.clone()
            .oneshot(
                Request::builder()
                    .method("PUT")
                    .uri("/v1/stream/s")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        let delete = app
            .clone()
            .oneshot(
                Request::builder()
                    .method("DELETE")
                    .uri("/v1/stream/s")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(delete.status(), StatusCode::NO_CONTENT);

        let read = app
            .oneshot(
                Request::builder()
                    .method("GET")
                    .uri("/v1/stream/s")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(read.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn long_poll_times_out_with_204() {
        let dir = TempDir::new().unwrap();
        let mut state = test_state(&dir);
        state.options.long_poll_timeout = Duration::from_millis(30);
        let app = create_router(state);

        app.clone()
            .oneshot(
                Request::builder()
                    .method("PUT")
                    .uri("/v1/stream/s")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        let response = app
            .oneshot(
                Request::builder()
                    .method("GET")
                    .uri("/v1/stream/s?live=long-poll")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NO_CONTENT);
    }

    #[tokio::test]
    async fn head_reports_metadata_without_body() {
        let dir = TempDir::new().unwrap();
        let app = create_router(test_state(&dir));

        app.clone()
            .oneshot(
                Request::builder()
                    .method("PUT")
                    .uri("/v1/stream/s")
                    .header("Content-Type", "text/plain")
                    .header("Stream-TTL", "60")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        let response = app
            .oneshot(
                Request::builder()
                    .method("HEAD")
                    .uri("/v1/stream/s")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers().get("stream-ttl").unwrap(), "60");
        assert_eq!(response.headers().get(header::CACHE_CONTROL).unwrap(), "no-store");
    }

    #[tokio::test]
    async fn conditional_read_returns_304_on_matching_etag() {
        let dir = TempDir::new().unwrap();
        let app = create_router(test_state(&dir));

        app.clone()
            .oneshot(
                Request::builder()
                    .method("PUT")
                    .uri("/v1/stream/s")
                    .header("Content-Type", "text/plain")
                    .body(Body::from("hi"))
                    .unwrap(),
            )
            .await
            .unwrap();

        let first = app
            .clone()
            .oneshot(
                Request::builder()
                    .method("GET")
                    .uri("/v1/stream/s")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        let etag = first.headers().get(header::ETAG).unwrap().to_str().unwrap().to_string();

        let second = app
            .oneshot(
                Request::builder()
                    .method("GET")
                    .uri("/v1/stream/s")
                    .header(header::IF_NONE_MATCH, etag)
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(second.status(), StatusCode::NOT_MODIFIED);
    }
}
