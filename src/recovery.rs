//! Startup crash-recovery reconciliation.
//!
//! The segment file is always the source of truth. At startup we scan every
//! indexed stream's segment, compare its true `(readSeq, byteOffset)`
//! against what the metadata index believes, and overwrite the index where
//! they differ. Directories with no matching index entry (a crash between
//! `mkdir` and the index write, or a half-finished delete) are removed.

use std::collections::HashSet;
use std::fs;
use std::path::Path;

use tracing::{info, warn};

use crate::metadata::MetadataIndex;
use crate::segment;
use crate::types::StoreError;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RecoverySummary {
    pub recovered: usize,
    pub reconciled: usize,
    pub dropped: usize,
    pub orphans_removed: usize,
}

/// Reconcile `index` against the segments under `streams_dir`. Must run
/// once, before the store accepts any traffic.
pub fn reconcile(index: &MetadataIndex, streams_dir: &Path) -> Result<RecoverySummary, StoreError> {
    let mut summary = RecoverySummary::default();
    let mut live_dirs = HashSet::new();

    for descriptor in index.list()? {
        let dir = streams_dir.join(&descriptor.dir_name);
        let segment_path = segment::path_in(&dir);

        if !segment_path.is_file() {
            index.delete(&descriptor.path)?;
            summary.dropped += 1;
            continue;
        }

        match segment::scan_true_offset(&segment_path) {
            Ok(true_offset) => {
                live_dirs.insert(descriptor.dir_name.clone());
                summary.recovered += 1;

                let on_disk_len = fs::metadata(&segment_path)?.len();
                if on_disk_len > true_offset.byte_offset {
                    segment::truncate_torn_tail(&segment_path, true_offset.byte_offset)?;
                    warn!(path = %descriptor.path, torn_bytes = on_disk_len - true_offset.byte_offset, "truncated torn trailing frame during recovery");
                }

                if true_offset != descriptor.current_offset() {
                    let mut fixed = descriptor.clone();
                    fixed.set_current_offset(true_offset);
                    index.put(&fixed)?;
                    summary.reconciled += 1;
                }
            }
            Err(err) => {
                warn!(path = %descriptor.path, error = %err, "failed to scan segment during recovery, dropping index entry");
                index.delete(&descriptor.path)?;
                summary.dropped += 1;
            }
        }
    }

    if streams_dir.is_dir() {
        for entry in fs::read_dir(streams_dir)? {
            let entry = entry?;
            let name = entry.file_name().to_string_lossy().into_owned();
            let is_deleted_tombstone = name.contains(".deleted~");
            if is_deleted_tombstone || !live_dirs.contains(&name) {
                match fs::remove_dir_all(entry.path()) {
                    Ok(()) => summary.orphans_removed += 1,
                    Err(err) => {
                        warn!(dir = %name, error = %err, "failed to remove orphan stream directory")
                    }
                }
            }
        }
    }

    info!(
        recovered = summary.recovered,
        reconciled = summary.reconciled,
        dropped = summary.dropped,
        orphans_removed = summary.orphans_removed,
        "stream store recovery complete"
    );

    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::StreamDescriptor;
    use crate::offset::Offset;
    use std::fs::OpenOptions;
    use std::io::Write as _;
    use tempfile::TempDir;

    fn descriptor(path: &str, dir_name: &str, seq: u64, bytes: u64) -> StreamDescriptor {
        StreamDescriptor {
            path: path.to_string(),
            content_type: "text/plain".to_string(),
            current_offset_seq: seq,
            current_offset_bytes: bytes,
            last_seq: None,
            ttl_seconds: None,
            expires_at: None,
            created_at_ms: 0,
            dir_name: dir_name.to_string(),
        }
    }

    #[test]
    fn drops_index_entries_with_no_segment() {
        let root = TempDir::new().unwrap();
        let streams_dir = root.path().join("streams");
        fs::create_dir_all(&streams_dir).unwrap();
        let index = MetadataIndex::open(&root.path().join("meta")).unwrap();
        index.put(&descriptor("/gone", "gone~1~1", 0, 0)).unwrap();

        let summary = reconcile(&index, &streams_dir).unwrap();
        assert_eq!(summary.dropped, 1);
        assert!(index.get("/gone").unwrap().is_none());
    }

    #[test]
    fn reconciles_stale_offset_to_match_the_segment() {
        let root = TempDir::new().unwrap();
        let streams_dir = root.path().join("streams");
        let dir = streams_dir.join("s~1~1");
        fs::create_dir_all(&dir).unwrap();
        segment::create(&dir).unwrap();
        {
            let mut handle = OpenOptions::new()
                .append(true)
                .open(segment::path_in(&dir))
                .unwrap();
            let mut frame = Vec::new();
            frame.extend_from_slice(&5u32.to_be_bytes());
            frame.extend_from_slice(b"hello");
            frame.push(b'\n');
            handle.write_all(&frame).unwrap();
            handle.sync_all().unwrap();
        }

        let index = MetadataIndex::open(&root.path().join("meta")).unwrap();
        // Stale: index still thinks the stream is empty.
        index.put(&descriptor("/s", "s~1~1", 0, 0)).unwrap();

        let summary = reconcile(&index, &streams_dir).unwrap();
        assert_eq!(summary.recovered, 1);
        assert_eq!(summary.reconciled, 1);
        assert_eq!(
            index.get("/s").unwrap().unwrap().current_offset(),
            Offset::new(1, 10)
        );
    }

    #[test]
    fn removes_orphan_directories_with_no_index_entry() {
        let root = TempDir::new().unwrap();
        let streams_dir = root.path().join("streams");
        let orphan = streams_dir.join("orphan~1~1");
        fs::create_dir_all(&orphan).unwrap();
        segment::create(&orphan).unwrap();

        let index = MetadataIndex::open(&root.path().join("meta")).unwrap();
        let summary = reconcile(&index, &streams_dir).unwrap();
        assert_eq!(summary.orphans_removed, 1);
        assert!(!orphan.exists());
    }

    #[test]
    fn truncates_torn_tail_so_a_post_recovery_append_is_readable() {
        let root = TempDir::new().unwrap();
        let streams_dir = root.path().join("streams");
        let dir = streams_dir.join("s~1~1");
        fs::create_dir_all(&dir).unwrap();
        segment::create(&dir).unwrap();
        let segment_path = segment::path_in(&dir);

        let mut handle = OpenOptions::new().append(true).open(&segment_path).unwrap();
        let written = segment::append_frame(&mut handle, b"good").unwrap();

        // Simulate a crash mid-write of the *next* frame: header + partial
        // payload, no trailing newline. The index was never updated past the
        // complete "good" frame, so scan and index already agree — the
        // `reconciled == 0` case the torn bytes must still be cleaned up in.
        handle.write_all(&(100u32).to_be_bytes()).unwrap();
        handle.write_all(b"short").unwrap();
        handle.sync_all().unwrap();
        drop(handle);

        let on_disk_before = fs::metadata(&segment_path).unwrap().len();
        assert!(on_disk_before > written);

        let index = MetadataIndex::open(&root.path().join("meta")).unwrap();
        index.put(&descriptor("/s", "s~1~1", 1, written)).unwrap();

        let summary = reconcile(&index, &streams_dir).unwrap();
        assert_eq!(summary.reconciled, 0);
        assert_eq!(fs::metadata(&segment_path).unwrap().len(), written);

        // A post-recovery append must land right after the last good frame,
        // and a read from the start must see both frames intact.
        let mut handle = OpenOptions::new().append(true).open(&segment_path).unwrap();
        segment::append_frame(&mut handle, b"new").unwrap();

        let (messages, _) = segment::read_from(&segment_path, Offset::ZERO).unwrap();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].data, b"good");
        assert_eq!(messages[1].data, b"new");
    }
}
