//! Decoder profile selection and contact normalization.
//!
//! Two generations of firmware report through the same slot layout but with
//! different conventions. The official profile (vendor usage page 0xFF00)
//! reports full-range 16-bit coordinates and garbage contact ids; the legacy
//! profile is a plain precision touchpad. The profile is chosen once per
//! device and rewrites each parsed frame into one contract: device-unit
//! coordinates, slot-stable assigned ids, tip-true contacts only.

use super::{Frame, TouchContact};

/// Official-profile logical coordinate range. Raw 16-bit samples are
/// rescaled into these maxima, which downstream treats as device units.
pub const OFFICIAL_MAX_X: u32 = 14_720;
pub const OFFICIAL_MAX_Y: u32 = 10_240;

/// Vendor-defined usage page announcing the official firmware.
pub const OFFICIAL_USAGE_PAGE: u16 = 0xFF00;

/// Operator-supplied decoder choice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProfileHint {
    #[default]
    Auto,
    Official,
    Legacy,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecoderProfile {
    Official,
    Legacy,
}

impl DecoderProfile {
    /// Choose the profile for a device, once, from the config hint and the
    /// usage page the device enumerated with.
    #[must_use]
    pub fn select(hint: ProfileHint, usage_page: u16) -> Self {
        match hint {
            ProfileHint::Official => Self::Official,
            ProfileHint::Legacy => Self::Legacy,
            ProfileHint::Auto => {
                if usage_page == OFFICIAL_USAGE_PAGE {
                    Self::Official
                } else {
                    Self::Legacy
                }
            }
        }
    }
}

/// Per-device geometry, used to convert millimeter thresholds into device
/// units and to sanity-check legacy coordinates.
#[derive(Debug, Clone, Copy)]
pub struct DeviceTraits {
    pub max_x: u32,
    pub max_y: u32,
    pub width_mm: f32,
    pub height_mm: f32,
}

impl DeviceTraits {
    /// Geometry of the official-profile surface (110 x 76 mm active area).
    #[must_use]
    pub const fn official() -> Self {
        Self {
            max_x: OFFICIAL_MAX_X,
            max_y: OFFICIAL_MAX_Y,
            width_mm: 110.0,
            height_mm: 76.0,
        }
    }

    /// Average device units per millimeter across both axes.
    #[must_use]
    pub fn units_per_mm(&self) -> f32 {
        let ux = self.max_x as f32 / self.width_mm;
        let uy = self.max_y as f32 / self.height_mm;
        (ux + uy) / 2.0
    }
}

/// Rewrite a parsed frame according to `profile`, dropping contacts that are
/// not real touches. Returns the number of contacts dropped as malformed
/// (legacy coordinates outside the device range); the caller counts these.
pub fn normalize(profile: DecoderProfile, traits: &DeviceTraits, frame: &mut Frame) -> u32 {
    match profile {
        DecoderProfile::Official => normalize_official(frame),
        DecoderProfile::Legacy => normalize_legacy(traits, frame),
    }
}

fn normalize_official(frame: &mut Frame) -> u32 {
    let mut out = 0;
    for slot in 0..frame.contacts.len() {
        let c = frame.contacts[slot];
        // The official firmware zeroes vacated slots rather than clearing
        // the tip bit, so occupancy is judged by payload.
        if !populated(&c) {
            continue;
        }
        frame.contacts[out] = TouchContact {
            id: slot as u32,
            x: rescale(c.x, OFFICIAL_MAX_X),
            y: rescale(c.y, OFFICIAL_MAX_Y),
            tip: true,
            confidence: true,
            ..c
        };
        out += 1;
    }
    frame.contacts.truncate(out);
    0
}

fn normalize_legacy(traits: &DeviceTraits, frame: &mut Frame) -> u32 {
    // Ids that exceed a byte or are not strictly increasing across the
    // frame's slots are packed fields, not identities; fall back to
    // slot-index assignment.
    let mut prev: Option<u32> = None;
    let mut suspicious = false;
    for c in frame.touching() {
        if c.id > 0xFF || prev.is_some_and(|p| c.id <= p) {
            suspicious = true;
            break;
        }
        prev = Some(c.id);
    }

    let mut faults = 0;
    let mut out = 0;
    for slot in 0..frame.contacts.len() {
        let c = frame.contacts[slot];
        if !c.tip {
            continue;
        }
        if u32::from(c.x) > traits.max_x || u32::from(c.y) > traits.max_y {
            faults += 1;
            continue;
        }
        frame.contacts[out] = TouchContact {
            id: if suspicious { slot as u32 } else { c.id },
            ..c
        };
        out += 1;
    }
    frame.contacts.truncate(out);
    faults
}

fn populated(c: &TouchContact) -> bool {
    c.tip || c.x != 0 || c.y != 0 || c.pressure != 0
}

fn rescale(raw: u16, max: u32) -> u16 {
    ((u32::from(raw) * max) >> 16) as u16
}
