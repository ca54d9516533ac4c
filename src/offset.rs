//! Canonical stream offsets.
//!
//! An offset is the pair `(readSeq, byteOffset)`: `readSeq` counts visible
//! messages, `byteOffset` is the post-write byte position in the segment
//! file. The canonical textual form is two zero-padded 16-digit decimals
//! joined by `_`, which sorts lexicographically in the same order as the
//! pair itself — this is what lets a CDN or client compare offsets as
//! opaque strings.

use std::cmp::Ordering;
use std::fmt;

/// A position token for a stream. Total order matches `(read_seq, byte_offset)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Offset {
    pub read_seq: u64,
    pub byte_offset: u64,
}

impl Offset {
    pub const ZERO: Offset = Offset {
        read_seq: 0,
        byte_offset: 0,
    };

    pub fn new(read_seq: u64, byte_offset: u64) -> Self {
        Self {
            read_seq,
            byte_offset,
        }
    }

    pub fn is_zero(&self) -> bool {
        *self == Offset::ZERO
    }

    /// The offset after `messages` more messages totalling `bytes` more bytes.
    pub fn advance(&self, messages: u64, bytes: u64) -> Self {
        Self {
            read_seq: self.read_seq + messages,
            byte_offset: self.byte_offset + bytes,
        }
    }

    /// Parse the canonical `<16 digits>_<16 digits>` form, or the literal
    /// `-1` sentinel ("before start"), which parses to [`Offset::ZERO`].
    ///
    /// Rejects anything else: signs, non-padded forms, scientific notation,
    /// wrong digit counts. This is deliberately strict — the format is a
    /// fixed-width wire contract, not a general integer parser.
    pub fn parse(s: &str) -> Option<Offset> {
        if s == "-1" {
            return Some(Offset::ZERO);
        }
        let (seq_part, byte_part) = s.split_once('_')?;
        Some(Offset {
            read_seq: parse_padded_u64(seq_part)?,
            byte_offset: parse_padded_u64(byte_part)?,
        })
    }
}

fn parse_padded_u64(s: &str) -> Option<u64> {
    if s.len() != 16 || !s.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    s.parse().ok()
}

impl fmt::Display for Offset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016}_{:016}", self.read_seq, self.byte_offset)
    }
}

impl PartialEq<&str> for Offset {
    fn eq(&self, other: &&str) -> bool {
        self.to_string() == *other
    }
}

/// Compare two canonical offset strings without parsing — lexicographic
/// order on the canonical form is equivalent to numeric order on the pair.
pub fn compare_offset_strings(a: &str, b: &str) -> Ordering {
    a.cmp(b)
}
