//! Raw HID touch report decoding.
//!
//! A report arrives as an opaque byte buffer tagged with the surface it came
//! from. `parser` decodes the precision-touchpad slot layout into a reusable
//! [`Frame`]; `profile` then normalizes contact ids and coordinates for the
//! device's decoder profile before anything downstream sees them.

pub mod parser;
pub mod profile;

pub use parser::parse_report;
pub use profile::{DecoderProfile, DeviceTraits, ProfileHint};

use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

/// Which physical surface a report belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Side {
    Left,
    Right,
    Unknown,
}

impl std::fmt::Display for Side {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Left => write!(f, "left"),
            Self::Right => write!(f, "right"),
            Self::Unknown => write!(f, "unknown"),
        }
    }
}

/// Maximum contacts a frame can carry. Current devices report 5 slots; the
/// inline capacity leaves headroom so steady-state parsing never allocates.
pub const MAX_CONTACTS: usize = 10;

/// One decoded touch point within a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TouchContact {
    /// Contact id as assigned by the decoder profile (slot index for
    /// normalized profiles, raw firmware id otherwise).
    pub id: u32,
    pub x: u16,
    pub y: u16,
    /// Tip switch: the finger is on the surface.
    pub tip: bool,
    /// Firmware confidence bit (false usually means palm).
    pub confidence: bool,
    pub phase: u8,
    pub pressure: u8,
}

/// One decoded report: all contacts sharing an arrival timestamp.
///
/// Reused across reports; `parse_report` clears and refills it without
/// touching the heap.
#[derive(Debug, Clone, Default)]
pub struct Frame {
    /// Monotonic arrival time in microseconds.
    pub timestamp_us: u64,
    pub side: Side,
    pub contacts: SmallVec<[TouchContact; MAX_CONTACTS]>,
}

impl Default for Side {
    fn default() -> Self {
        Self::Unknown
    }
}

impl Frame {
    #[must_use]
    pub fn new(side: Side) -> Self {
        Self {
            timestamp_us: 0,
            side,
            contacts: SmallVec::new(),
        }
    }

    /// Contacts with the tip switch down, i.e. the ones that exist for
    /// session tracking.
    pub fn touching(&self) -> impl Iterator<Item = &TouchContact> {
        self.contacts.iter().filter(|c| c.tip)
    }
}

/// Report-level decode failures. Frame-dropping, never fatal.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ReportError {
    #[error("report buffer too short: {len} bytes, need {need}")]
    ShortBuffer { len: usize, need: usize },
    #[error("unrecognized report id {0:#04x}")]
    UnknownReportId(u8),
}
