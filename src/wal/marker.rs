//! Bookkeeping markers
//!
//! The ring writes a header marker at the start of each logfile and a
//! footer marker when it seals one. Data records are opaque to the ring;
//! only their kind matters for the committed data tick.
//!
//! ## Frame Format
//! ```text
//! ┌───────────┬──────────┬──────────────┬──────────┬─────────┬─────────┐
//! │ Magic (4) │ Kind (4) │ Logfile (8)  │ Tick (8) │ CRC (4) │ Pad (4) │
//! └───────────┴──────────┴──────────────┴──────────┴─────────┴─────────┘
//! ```

use serde::{Deserialize, Serialize};

use crate::error::{Result, SlotError};
use crate::logfile::LogfileId;

use super::Tick;

/// Size of an encoded header/footer frame
pub const MARKER_SIZE: u32 = 32;

/// Magic number opening every marker frame ("SLOT")
pub const MARKER_MAGIC: u32 = 0x534C_4F54;

/// Serialized length of the fields covered by the checksum
const BODY_SIZE: usize = 24;

/// Logical kind of the record stored in a slot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MarkerKind {
    /// First record of a logfile
    Header,

    /// Last record of a sealed logfile
    Footer,

    /// Caller payload
    Data,
}

#[derive(Serialize, Deserialize)]
struct MarkerBody {
    magic: u32,
    kind: MarkerKind,
    logfile_id: LogfileId,
    tick: Tick,
}

/// A header or footer marker
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Marker {
    pub kind: MarkerKind,
    pub logfile_id: LogfileId,
    pub tick: Tick,
}

impl Marker {
    pub fn header(logfile_id: LogfileId, tick: Tick) -> Self {
        Self { kind: MarkerKind::Header, logfile_id, tick }
    }

    pub fn footer(logfile_id: LogfileId, tick: Tick) -> Self {
        Self { kind: MarkerKind::Footer, logfile_id, tick }
    }

    /// Encode into a frame of exactly `MARKER_SIZE` bytes
    pub fn encode(&self) -> Result<Vec<u8>> {
        if self.kind == MarkerKind::Data {
            return Err(SlotError::InvalidState(
                "data records are not encoded as markers".to_string(),
            ));
        }

        let body = MarkerBody {
            magic: MARKER_MAGIC,
            kind: self.kind,
            logfile_id: self.logfile_id,
            tick: self.tick,
        };
        let mut frame = bincode::serialize(&body)?;
        debug_assert_eq!(frame.len(), BODY_SIZE);

        let crc = crc32fast::hash(&frame);
        frame.extend_from_slice(&crc.to_le_bytes());
        frame.resize(MARKER_SIZE as usize, 0);
        Ok(frame)
    }

    /// Decode a frame, validating magic and checksum
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < BODY_SIZE + 4 {
            return Err(SlotError::Corruption(format!(
                "marker frame too short: {} bytes",
                bytes.len()
            )));
        }

        let (body_bytes, rest) = bytes.split_at(BODY_SIZE);
        let stored_crc = u32::from_le_bytes([rest[0], rest[1], rest[2], rest[3]]);
        let computed_crc = crc32fast::hash(body_bytes);
        if stored_crc != computed_crc {
            return Err(SlotError::Corruption(format!(
                "CRC mismatch: stored {:#010x}, computed {:#010x}",
                stored_crc, computed_crc
            )));
        }

        let body: MarkerBody = bincode::deserialize(body_bytes)?;
        if body.magic != MARKER_MAGIC {
            return Err(SlotError::Corruption(format!("bad magic {:#010x}", body.magic)));
        }
        if body.kind == MarkerKind::Data {
            return Err(SlotError::Corruption("data kind in marker frame".to_string()));
        }

        Ok(Self {
            kind: body.kind,
            logfile_id: body.logfile_id,
            tick: body.tick,
        })
    }
}
