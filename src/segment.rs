//! Append-only framed segment file.
//!
//! Each stream has exactly one segment file, `000000.log`. Every message is
//! stored as one frame: a 4-byte big-endian length, the payload, and a
//! trailing newline. The newline is framing redundancy only — it lets
//! recovery tell a torn write (crash mid-`write`) from a complete one
//! without needing a separate checksum.

use std::fs::{File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use crate::offset::Offset;

pub const SEGMENT_FILE_NAME: &str = "000000.log";

const FRAME_HEADER_LEN: usize = 4;
const FRAME_TRAILER_LEN: usize = 1;

/// One decoded record and the offset immediately following it.
#[derive(Debug, Clone)]
pub struct Message {
    pub data: Vec<u8>,
    pub offset: Offset,
}

pub fn path_in(stream_dir: &Path) -> PathBuf {
    stream_dir.join(SEGMENT_FILE_NAME)
}

/// Create a new, empty segment file. Fails if one already exists.
pub fn create(stream_dir: &Path) -> io::Result<()> {
    OpenOptions::new()
        .create_new(true)
        .write(true)
        .open(path_in(stream_dir))?;
    Ok(())
}

/// Encode one frame: `[u32 BE len][payload][0x0A]`.
fn encode_frame(data: &[u8]) -> Vec<u8> {
    let mut buf = Vec::with_capacity(FRAME_HEADER_LEN + data.len() + FRAME_TRAILER_LEN);
    buf.extend_from_slice(&(data.len() as u32).to_be_bytes());
    buf.extend_from_slice(data);
    buf.push(b'\n');
    buf
}

/// Append one frame to an already-open append-mode handle and fsync it.
///
/// The caller holds the stream's write lock and the pooled handle for the
/// duration of this call. Returns the number of bytes the frame occupied on
/// disk, so the caller can advance its offset bookkeeping.
pub fn append_frame(handle: &mut File, data: &[u8]) -> io::Result<u64> {
    let frame = encode_frame(data);
    handle.write_all(&frame)?;
    handle.sync_all()?;
    Ok(frame.len() as u64)
}

/// Read every complete frame starting at `from.byte_offset`, continuing
/// `read_seq` from `from.read_seq`. Returns the decoded messages and the
/// offset reached (which may be short of true EOF if the tail frame is
/// torn).
///
/// A partial trailing frame — EOF before the declared length, or a missing
/// newline marker — is not an error. It is simply not returned; this is
/// what makes a crash between `write` and `fsync` recoverable (spec 4.B,
/// property 2).
pub fn read_from(path: &Path, from: Offset) -> io::Result<(Vec<Message>, Offset)> {
    let mut file = File::open(path)?;
    file.seek(SeekFrom::Start(from.byte_offset))?;
    let mut buf = Vec::new();
    file.read_to_end(&mut buf)?;

    let mut messages = Vec::new();
    let mut cursor = 0usize;
    let mut offset = from;

    while cursor + FRAME_HEADER_LEN <= buf.len() {
        let len =
            u32::from_be_bytes(buf[cursor..cursor + FRAME_HEADER_LEN].try_into().unwrap()) as usize;
        let frame_total = FRAME_HEADER_LEN + len + FRAME_TRAILER_LEN;
        if cursor + frame_total > buf.len() {
            break;
        }
        if buf[cursor + FRAME_HEADER_LEN + len] != b'\n' {
            break;
        }

        let payload = buf[cursor + FRAME_HEADER_LEN..cursor + FRAME_HEADER_LEN + len].to_vec();
        offset = offset.advance(1, frame_total as u64);
        messages.push(Message {
            data: payload,
            offset,
        });
        cursor += frame_total;
    }

    Ok((messages, offset))
}

/// Scan the whole segment from its start to derive the ground-truth offset.
/// Used only by recovery: the file is always the source of truth.
pub fn scan_true_offset(path: &Path) -> io::Result<Offset> {
    let (_, offset) = read_from(path, Offset::ZERO)?;
    Ok(offset)
}

/// Drop any bytes on disk past `true_len` — a torn trailing frame left by a
/// crash mid-`write`. Handles are opened append-only, so without this the
/// next append would land after the stale bytes instead of at `true_len`,
/// and a read seeking to `true_len` would hit the torn length prefix and
/// never reach the new frame. Used only by recovery.
pub fn truncate_torn_tail(path: &Path, true_len: u64) -> io::Result<()> {
    let file = OpenOptions::new().write(true).open(path)?;
    file.set_len(true_len)
}
