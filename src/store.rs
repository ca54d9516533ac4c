//! Central store facade (spec section 4.E).
//!
//! Composes the segment/handle-pool/metadata-index/waiter-registry layers
//! into the operations the HTTP handlers call: `create`, `append`, `read`,
//! `wait_for_messages`, `delete`. Per-path writes serialize through an
//! async mutex keyed by path; reads never take it.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use parking_lot::Mutex as SyncMutex;
use tokio::sync::Mutex as AsyncMutex;
use tracing::{debug, info, warn};

use crate::framing;
use crate::handle_pool::HandlePool;
use crate::metadata::{MetadataIndex, StreamDescriptor};
use crate::offset::Offset;
use crate::path_encoding::generate_stream_dir_name;
use crate::recovery;
use crate::segment;
use crate::types::{
    normalize_content_type, CreateOutcome, ReadResult, ServerOptions, StoreError, StreamConfig,
    WaitOutcome, MAX_FRAME_PAYLOAD_LEN,
};
use crate::waiter::WaiterRegistry;

/// Durable, file-backed stream store.
pub struct Store {
    data_dir: PathBuf,
    streams_dir: PathBuf,
    meta: MetadataIndex,
    handles: HandlePool,
    waiters: WaiterRegistry,
    locks: SyncMutex<HashMap<String, Arc<AsyncMutex<()>>>>,
}

impl Store {
    /// Open (creating if absent) the store rooted at `options.data_dir`,
    /// running startup recovery before returning.
    pub fn open(options: &ServerOptions) -> Result<Arc<Self>, StoreError> {
        let data_dir = options.data_dir.clone();
        let streams_dir = data_dir.join("streams");
        let meta_dir = data_dir.join("meta");
        std::fs::create_dir_all(&streams_dir)?;

        let meta = MetadataIndex::open(&meta_dir)?;
        let summary = recovery::reconcile(&meta, &streams_dir)?;
        info!(
            recovered = summary.recovered,
            reconciled = summary.reconciled,
            dropped = summary.dropped,
            orphans_removed = summary.orphans_removed,
            "store opened"
        );

        Ok(Arc::new(Self {
            data_dir,
            streams_dir,
            meta,
            handles: HandlePool::new(options.max_file_handles),
            waiters: WaiterRegistry::new(),
            locks: SyncMutex::new(HashMap::new()),
        }))
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    fn dir_for(&self, dir_name: &str) -> PathBuf {
        self.streams_dir.join(dir_name)
    }

    fn lock_for(&self, path: &str) -> Arc<AsyncMutex<()>> {
        self.locks
            .lock()
            .entry(path.to_string())
            .or_insert_with(|| Arc::new(AsyncMutex::new(())))
            .clone()
    }

    /// Index lookup that also evicts (and reports absent for) an expired
    /// descriptor, per invariant 7.
    fn get_active(&self, path: &str) -> Result<StreamDescriptor, StoreError> {
        match self.meta.get(path)? {
            Some(descriptor) if !descriptor.is_expired(Utc::now()) => Ok(descriptor),
            Some(expired) => {
                self.remove_descriptor(&expired)?;
                Err(StoreError::NotFound(path.to_string()))
            }
            None => Err(StoreError::NotFound(path.to_string())),
        }
    }

    pub fn has(&self, path: &str) -> bool {
        self.get_active(path).is_ok()
    }

    pub fn get(&self, path: &str) -> Option<StreamDescriptor> {
        self.get_active(path).ok()
    }

    /// Create a stream, or confirm idempotency against an identical one
    /// (spec 4.E Create).
    pub async fn create(
        &self,
        path: &str,
        config: StreamConfig,
    ) -> Result<CreateOutcome, StoreError> {
        if config.ttl_seconds.is_some() && config.expires_at.is_some() {
            return Err(StoreError::InvalidArgument(
                "cannot specify both Stream-TTL and Stream-Expires-At".to_string(),
            ));
        }

        let lock = self.lock_for(path);
        let _guard = lock.lock().await;

        if let Some(existing) = self.meta.get(path)? {
            if !existing.is_expired(Utc::now()) {
                let existing_ct = normalize_content_type(&existing.content_type);
                let new_ct = config
                    .content_type
                    .as_deref()
                    .map(normalize_content_type)
                    .unwrap_or("");
                if existing_ct != new_ct
                    || existing.ttl_seconds != config.ttl_seconds
                    || existing.expires_at != config.expires_at
                {
                    return Err(StoreError::ConfigMismatch);
                }
                return Ok(CreateOutcome::AlreadyExists(existing));
            }
            self.remove_descriptor(&existing)?;
        }

        let content_type = config.content_type.clone().unwrap_or_default();
        let dir_name = generate_stream_dir_name(path);
        let dir = self.dir_for(&dir_name);
        std::fs::create_dir_all(&dir)?;
        segment::create(&dir)?;

        let mut descriptor = StreamDescriptor {
            path: path.to_string(),
            content_type: content_type.clone(),
            current_offset_seq: 0,
            current_offset_bytes: 0,
            last_seq: None,
            ttl_seconds: config.ttl_seconds,
            expires_at: config.expires_at,
            created_at_ms: Utc::now().timestamp_millis(),
            dir_name: dir_name.clone(),
        };

        if let Some(data) = config.initial_data.filter(|d| !d.is_empty()) {
            let frames = framing::payload_to_frames(&content_type, &data)?;
            let (messages, bytes) = self.write_frames(&dir, &frames)?;
            descriptor.set_current_offset(descriptor.current_offset().advance(messages, bytes));
        }

        self.meta.put(&descriptor)?;
        info!(path = %path, dir = %dir_name, "created stream");
        Ok(CreateOutcome::Created(descriptor))
    }

    /// Append `data` to `path`, honoring an optional writer-coordination
    /// sequence and the stream's content type (spec 4.E Append).
    pub async fn append(
        &self,
        path: &str,
        data: Vec<u8>,
        content_type: Option<&str>,
        seq: Option<&str>,
    ) -> Result<StreamDescriptor, StoreError> {
        if data.is_empty() {
            return Err(StoreError::InvalidArgument("empty body".to_string()));
        }

        let lock = self.lock_for(path);
        let _guard = lock.lock().await;

        let mut descriptor = self.get_active(path)?;

        if let Some(ct) = content_type {
            if normalize_content_type(ct) != normalize_content_type(&descriptor.content_type) {
                return Err(StoreError::ContentTypeMismatch {
                    expected: descriptor.content_type.clone(),
                    actual: ct.to_string(),
                });
            }
        }

        if let Some(s) = seq {
            if let Some(last) = &descriptor.last_seq {
                if s <= last.as_str() {
                    return Err(StoreError::SeqConflict(format!(
                        "{s} <= last accepted sequence {last}"
                    )));
                }
            }
        }

        let frames = framing::payload_to_frames(&descriptor.content_type, &data)?;
        if frames.iter().any(|f| f.len() > MAX_FRAME_PAYLOAD_LEN) {
            return Err(StoreError::FrameTooLarge);
        }

        let dir = self.dir_for(&descriptor.dir_name);
        let (messages, bytes) = self.write_frames(&dir, &frames)?;
        descriptor.set_current_offset(descriptor.current_offset().advance(messages, bytes));
        if let Some(s) = seq {
            descriptor.last_seq = Some(s.to_string());
        }

        self.meta.put(&descriptor)?;
        debug!(path = %path, offset = %descriptor.current_offset(), "appended to stream");
        self.waiters.notify(path);

        Ok(descriptor)
    }

    fn write_frames(&self, dir: &Path, frames: &[Vec<u8>]) -> Result<(u64, u64), StoreError> {
        let segment_path = segment::path_in(dir);
        let mut total_bytes = 0u64;
        self.handles.with_write(&segment_path, |handle| {
            for frame in frames {
                total_bytes += segment::append_frame(handle, frame)?;
            }
            Ok(())
        })?;
        Ok((frames.len() as u64, total_bytes))
    }

    /// Read every complete frame after `from` (spec 4.E Read).
    pub fn read(&self, path: &str, from: Offset) -> Result<ReadResult, StoreError> {
        let descriptor = self.get_active(path)?;
        let dir = self.dir_for(&descriptor.dir_name);
        let (messages, reached) = segment::read_from(&segment::path_in(&dir), from)?;
        let up_to_date = reached >= descriptor.current_offset();
        Ok(ReadResult {
            messages,
            next_offset: reached,
            up_to_date,
        })
    }

    /// Block until new data after `from` arrives, the stream is deleted, or
    /// `timeout` elapses (spec 4.E WaitForMessages).
    ///
    /// The `Notified` future for each loop iteration is created and
    /// `enable()`d — which registers it on `Notify`'s waiter list — *before*
    /// re-checking stream state, so a concurrent `append`'s `notify_waiters`
    /// can never land in the gap between the check and the await. Without
    /// the explicit `enable()`, a `Notified` only joins the waiter list on
    /// its first `poll`, which happens inside `tokio::time::timeout(...)`
    /// *after* the read below — a wake in that window would otherwise be
    /// lost and the waiter would block out the full timeout.
    pub async fn wait_for_messages(
        &self,
        path: &str,
        from: Offset,
        timeout: Duration,
    ) -> Result<WaitOutcome, StoreError> {
        let notify = self.waiters.register(path);
        let deadline = tokio::time::Instant::now() + timeout;

        loop {
            let notified = notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            match self.read(path, from) {
                Ok(result) if !result.messages.is_empty() => return Ok(WaitOutcome::Data(result)),
                Ok(_) => {}
                Err(StoreError::NotFound(_)) => return Ok(WaitOutcome::Deleted),
                Err(e) => return Err(e),
            }

            let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
            if remaining.is_zero() {
                let next_offset = self.get(path).map(|d| d.current_offset()).unwrap_or(from);
                return Ok(WaitOutcome::TimedOut { next_offset });
            }

            if tokio::time::timeout(remaining, notified).await.is_err() {
                let next_offset = self.get(path).map(|d| d.current_offset()).unwrap_or(from);
                return Ok(WaitOutcome::TimedOut { next_offset });
            }
        }
    }

    /// Delete a stream. Returns `false` if it was already absent.
    pub async fn delete(&self, path: &str) -> Result<bool, StoreError> {
        let lock = self.lock_for(path);
        let _guard = lock.lock().await;

        match self.meta.get(path)? {
            Some(descriptor) => {
                self.remove_descriptor(&descriptor)?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Remove a descriptor from the index, evict its handle, rename its
    /// directory to a tombstone, and wake waiters with a terminal signal.
    /// Shared by explicit `delete` and lazy expiry eviction.
    fn remove_descriptor(&self, descriptor: &StreamDescriptor) -> Result<(), StoreError> {
        self.meta.delete(&descriptor.path)?;
        let dir = self.dir_for(&descriptor.dir_name);
        let segment_path = segment::path_in(&dir);
        self.handles.evict(&segment_path);

        if dir.is_dir() {
            let tombstone = self
                .streams_dir
                .join(format!("{}.deleted~{}", descriptor.dir_name, Utc::now().timestamp_millis()));
            if let Err(err) = std::fs::rename(&dir, &tombstone) {
                warn!(dir = %dir.display(), error = %err, "failed to tombstone stream directory, removing directly");
                let _ = std::fs::remove_dir_all(&dir);
            } else {
                let path_for_log = tombstone.clone();
                tokio::spawn(async move {
                    if let Err(err) = tokio::fs::remove_dir_all(&path_for_log).await {
                        warn!(dir = %path_for_log.display(), error = %err, "failed to unlink tombstoned stream directory");
                    }
                });
            }
        }

        self.waiters.notify(&descriptor.path);
        self.waiters.remove(&descriptor.path);
        Ok(())
    }

    /// Evict every expired stream. Run periodically by
    /// [`spawn_cleanup_task`].
    pub fn sweep_expired(&self) -> Result<usize, StoreError> {
        let now = Utc::now();
        let mut swept = 0;
        for descriptor in self.meta.list()? {
            if descriptor.is_expired(now) {
                self.remove_descriptor(&descriptor)?;
                swept += 1;
            }
        }
        if swept > 0 {
            info!(count = swept, "swept expired streams");
        }
        Ok(swept)
    }
}

/// Spawn the background expired-stream sweep (spec section 3, Lifecycle).
pub fn spawn_cleanup_task(store: Arc<Store>, interval: Duration) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        loop {
            ticker.tick().await;
            if let Err(err) = store.sweep_expired() {
                warn!(error = %err, "expired-stream sweep failed");
            }
        }
    })
}

/// Bridge filesystem change events under the store's `streams/` directory
/// into waiter wakes, for deployments where another process writes
/// segments this instance serves (spec section 9: file-watch is a
/// belt-and-braces supplement; the in-process `Notify` wake from `append`
/// remains authoritative). A spurious wake just costs the waiter a re-read
/// that finds nothing new, which callers already tolerate.
pub fn spawn_file_watch_bridge(
    store: Arc<Store>,
) -> notify::Result<notify::RecommendedWatcher> {
    use notify::{Event, RecursiveMode, Watcher};

    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel::<notify::Result<Event>>();

    let mut watcher = notify::recommended_watcher(move |res: notify::Result<Event>| {
        let _ = tx.send(res);
    })?;
    watcher.watch(store.streams_dir.as_path(), RecursiveMode::Recursive)?;

    tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            match event {
                Ok(_) => match store.meta.list() {
                    Ok(descriptors) => {
                        for descriptor in descriptors {
                            store.waiters.notify(&descriptor.path);
                        }
                    }
                    Err(err) => warn!(error = %err, "file-watch bridge failed to list streams"),
                },
                Err(err) => warn!(error = %err, "file-watch bridge error"),
            }
        }
    });

    Ok(watcher)
}
