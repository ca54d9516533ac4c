//! Persistent `path -> stream descriptor` index.
//!
//! Backed by an embedded LMDB environment via `heed`. LMDB's single-writer,
//! multi-reader transaction model gives the crash-safe atomic single-key
//! writes that recovery (spec 4.G) depends on: a write transaction either
//! commits in full or not at all, so the index is never observed half
//! updated even if the process dies mid-append.

use std::path::Path;

use chrono::{DateTime, Utc};
use heed::types::{SerdeJson, Str};
use heed::{Database, Env, EnvOpenOptions};
use serde::{Deserialize, Serialize};

use crate::offset::Offset;

const DB_STREAMS: &str = "streams";
// Virtual address space LMDB reserves up front; not actual disk usage.
const MAP_SIZE: usize = 1 << 30;

/// On-disk stream descriptor (spec section 3, "Stream descriptor").
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamDescriptor {
    pub path: String,
    pub content_type: String,
    pub current_offset_seq: u64,
    pub current_offset_bytes: u64,
    pub last_seq: Option<String>,
    pub ttl_seconds: Option<u64>,
    pub expires_at: Option<DateTime<Utc>>,
    pub created_at_ms: i64,
    /// `<url-safe-encoded-path>~<creation-millis>~<random-suffix>`
    pub dir_name: String,
}

impl StreamDescriptor {
    pub fn current_offset(&self) -> Offset {
        Offset::new(self.current_offset_seq, self.current_offset_bytes)
    }

    pub fn set_current_offset(&mut self, offset: Offset) {
        self.current_offset_seq = offset.read_seq;
        self.current_offset_bytes = offset.byte_offset;
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        if let Some(expires_at) = self.expires_at {
            return now >= expires_at;
        }
        if let Some(ttl) = self.ttl_seconds {
            let expiry_ms = self.created_at_ms + (ttl as i64 * 1000);
            return now.timestamp_millis() >= expiry_ms;
        }
        false
    }
}

pub struct MetadataIndex {
    env: Env,
    db: Database<Str, SerdeJson<StreamDescriptor>>,
}

impl MetadataIndex {
    pub fn open(meta_dir: &Path) -> heed::Result<Self> {
        std::fs::create_dir_all(meta_dir)?;
        let env = unsafe {
            EnvOpenOptions::new()
                .map_size(MAP_SIZE)
                .max_dbs(4)
                .open(meta_dir)?
        };
        let mut wtxn = env.write_txn()?;
        let db: Database<Str, SerdeJson<StreamDescriptor>> =
            env.create_database(&mut wtxn, Some(DB_STREAMS))?;
        wtxn.commit()?;
        Ok(Self { env, db })
    }

    /// Atomic single-key upsert.
    pub fn put(&self, descriptor: &StreamDescriptor) -> heed::Result<()> {
        let mut wtxn = self.env.write_txn()?;
        self.db.put(&mut wtxn, &descriptor.path, descriptor)?;
        wtxn.commit()
    }

    pub fn get(&self, path: &str) -> heed::Result<Option<StreamDescriptor>> {
        let rtxn = self.env.read_txn()?;
        self.db.get(&rtxn, path)
    }

    pub fn delete(&self, path: &str) -> heed::Result<bool> {
        let mut wtxn = self.env.write_txn()?;
        let existed = self.db.delete(&mut wtxn, path)?;
        wtxn.commit()?;
        Ok(existed)
    }

    pub fn list(&self) -> heed::Result<Vec<StreamDescriptor>> {
        let rtxn = self.env.read_txn()?;
        let mut out = Vec::new();
        for entry in self.db.iter(&rtxn)? {
            let (_, descriptor) = entry?;
            out.push(descriptor);
        }
        Ok(out)
    }
}
