//! Pressure capability probe.
//!
//! Some surfaces report a real pressure curve in the low 6 bits of the
//! pressure byte; others report garbage that flips wildly between frames.
//! The probe watches early samples and settles on Supported or Unsupported
//! within a bounded window. Nothing in the touch lifecycle depends on the
//! outcome; it only controls whether pressure is surfaced to observers.

/// Probe outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PressureSupport {
    #[default]
    Unknown,
    Supported,
    Unsupported,
}

/// Consecutive same-session samples differing by at least this much count
/// as a large jump.
const LARGE_JUMP: u8 = 12;

const EARLY_SAMPLES: u32 = 16;
const NORMAL_SAMPLES: u32 = 40;
const MAX_SAMPLES: u32 = 120;

pub struct PressureProbe {
    state: PressureSupport,
    samples: u32,
    non_zero: u32,
    comparable: u32,
    jumps: u32,
    last: Option<(u64, u8)>,
}

impl PressureProbe {
    /// `force_unsupported` is the per-device hint that skips probing.
    #[must_use]
    pub fn new(force_unsupported: bool) -> Self {
        Self {
            state: if force_unsupported {
                PressureSupport::Unsupported
            } else {
                PressureSupport::Unknown
            },
            samples: 0,
            non_zero: 0,
            comparable: 0,
            jumps: 0,
            last: None,
        }
    }

    #[must_use]
    pub const fn state(&self) -> PressureSupport {
        self.state
    }

    /// Feed one pressure byte for a session. Only the low 6 bits carry
    /// signal. A pair of samples is comparable when both came from the same
    /// session back to back.
    pub fn observe(&mut self, stable_id: u64, pressure: u8) {
        if self.state != PressureSupport::Unknown {
            return;
        }

        let value = pressure & 0x3F;
        self.samples += 1;
        if value != 0 {
            self.non_zero += 1;
        }
        if let Some((prev_id, prev)) = self.last {
            if prev_id == stable_id {
                self.comparable += 1;
                if value.abs_diff(prev) >= LARGE_JUMP {
                    self.jumps += 1;
                }
            }
        }
        self.last = Some((stable_id, value));

        self.state = self.decide();
    }

    fn decide(&self) -> PressureSupport {
        let ratio = if self.comparable == 0 {
            0.0
        } else {
            self.jumps as f32 / self.comparable as f32
        };

        if self.samples >= MAX_SAMPLES {
            return if ratio <= 0.45 {
                PressureSupport::Supported
            } else {
                PressureSupport::Unsupported
            };
        }

        if self.samples >= NORMAL_SAMPLES {
            if self.non_zero == 0 {
                return PressureSupport::Unsupported;
            }
            if self.comparable >= 20 {
                if ratio >= 0.70 {
                    return PressureSupport::Unsupported;
                }
                if ratio <= 0.50 && self.non_zero >= 10 {
                    return PressureSupport::Supported;
                }
            }
            return PressureSupport::Unknown;
        }

        if self.samples >= EARLY_SAMPLES && self.comparable >= 12 && self.non_zero >= 8 {
            if ratio <= 0.35 {
                return PressureSupport::Supported;
            }
            if ratio >= 0.85 {
                return PressureSupport::Unsupported;
            }
        }

        PressureSupport::Unknown
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hint_forces_unsupported_immediately() {
        let mut p = PressureProbe::new(true);
        assert_eq!(p.state(), PressureSupport::Unsupported);
        p.observe(1, 30);
        assert_eq!(p.state(), PressureSupport::Unsupported);
    }

    #[test]
    fn smooth_curve_decides_supported_early() {
        let mut p = PressureProbe::new(false);
        // One finger pressing down smoothly: small deltas, non-zero.
        for i in 0..16u8 {
            p.observe(1, 10 + i);
        }
        assert_eq!(p.state(), PressureSupport::Supported);
    }

    #[test]
    fn wild_samples_decide_unsupported_early() {
        let mut p = PressureProbe::new(false);
        for i in 0..16u32 {
            p.observe(1, if i % 2 == 0 { 0x3F } else { 1 });
        }
        assert_eq!(p.state(), PressureSupport::Unsupported);
    }

    #[test]
    fn all_zero_decides_unsupported_at_normal_window() {
        let mut p = PressureProbe::new(false);
        for _ in 0..NORMAL_SAMPLES {
            p.observe(1, 0);
        }
        assert_eq!(p.state(), PressureSupport::Unsupported);
    }

    #[test]
    fn session_churn_defers_to_max_window() {
        let mut p = PressureProbe::new(false);
        // Every sample from a different session: nothing is comparable, so
        // no early or normal decision fires.
        for i in 0..(MAX_SAMPLES - 1) {
            p.observe(u64::from(i), 20);
        }
        assert_eq!(p.state(), PressureSupport::Unknown);
        p.observe(u64::from(MAX_SAMPLES), 20);
        assert_eq!(p.state(), PressureSupport::Supported);
    }

    #[test]
    fn only_low_six_bits_are_compared() {
        let mut p = PressureProbe::new(false);
        // High bits flap, low bits steady: must read as smooth.
        for i in 0..16u8 {
            let high = if i % 2 == 0 { 0xC0 } else { 0x40 };
            p.observe(1, high | 20);
        }
        assert_eq!(p.state(), PressureSupport::Supported);
    }
}
