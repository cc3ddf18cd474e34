//! Contact session tracking.
//!
//! Raw contact ids are not stable identity: firmware reuses slots, reorders
//! them between frames, and occasionally drops a contact for a frame. The
//! tracker maps each frame's contacts onto pool-resident sessions so that a
//! single physical touch keeps one `stable_id` for its whole lifetime. All
//! matching runs on a pool allocated at construction; the per-frame work is
//! O(pool * contacts) with both bounded at 10.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use smallvec::SmallVec;
use tracing::warn;

use crate::report::{Frame, MAX_CONTACTS};

/// Default sessions per side: device max contacts (5) plus headroom.
pub const DEFAULT_POOL_SIZE: usize = 10;

/// One pool slot. Inactive slots are reused; `stable_id` never is.
#[derive(Debug, Clone, Copy, Default)]
pub struct ContactSession {
    pub active: bool,
    pub stable_id: u64,
    pub raw_id_last: u32,
    pub x: u16,
    pub y: u16,
    pub last_seen_frame: u64,
    pub last_seen_us: u64,
    pub first_seen_us: u64,
}

/// Hands out process-monotonic stable ids. Shared by both side trackers so
/// an id is never reused anywhere in the process.
#[derive(Debug, Clone, Default)]
pub struct StableIdSource(Arc<AtomicU64>);

impl StableIdSource {
    fn next(&self) -> u64 {
        self.0.fetch_add(1, Ordering::Relaxed) + 1
    }
}

/// What happened to a session this frame. Consumed by the intent engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEvent {
    Opened { stable_id: u64, x: u16, y: u16, pressure: u8 },
    Moved { stable_id: u64, x: u16, y: u16, pressure: u8 },
    Closed { stable_id: u64 },
}

impl SessionEvent {
    #[must_use]
    pub const fn stable_id(&self) -> u64 {
        match self {
            Self::Opened { stable_id, .. }
            | Self::Moved { stable_id, .. }
            | Self::Closed { stable_id } => *stable_id,
        }
    }
}

/// Scratch buffer for one frame's session events. Inline capacity covers a
/// full pool opening and closing in the same frame.
pub type SessionEvents = SmallVec<[SessionEvent; MAX_CONTACTS * 2]>;

pub struct SessionTracker {
    pool: Vec<ContactSession>,
    ids: StableIdSource,
    /// Nearest-position match threshold, squared, in device units.
    threshold_sq: u64,
    /// Sessions unseen for longer than this are force-closed.
    stale_us: u64,
    frame_counter: u64,
    /// Pool-exhaustion faults since construction.
    pub pool_faults: u64,
}

impl SessionTracker {
    #[must_use]
    pub fn new(pool_size: usize, threshold_units: u32, stale_us: u64, ids: StableIdSource) -> Self {
        Self {
            pool: vec![ContactSession::default(); pool_size.max(1)],
            ids,
            threshold_sq: u64::from(threshold_units) * u64::from(threshold_units),
            stale_us,
            frame_counter: 0,
            pool_faults: 0,
        }
    }

    /// Advance the tracker by one frame. Matching happens in four passes:
    /// raw-id exact match, nearest-position match under the threshold, open
    /// for the still-unbound, release for the still-unmatched. Events are
    /// appended to `events` in pass order: stale closes first, then matches,
    /// opens, and finally the releases of this frame.
    pub fn advance(&mut self, frame: &Frame, events: &mut SessionEvents) {
        self.frame_counter += 1;
        let now = frame.timestamp_us;

        // Stale force-close happens before matching: a session the device
        // silently abandoned must not capture this frame's contacts.
        self.sweep_stale(now, events);

        // Contacts bound so far this frame, by contact index.
        let mut bound = [false; MAX_CONTACTS];
        let contacts: SmallVec<[_; MAX_CONTACTS]> = frame.touching().copied().collect();

        // Pass 1: raw-id exact match.
        for (ci, c) in contacts.iter().enumerate() {
            for s in &mut self.pool {
                if s.active && s.last_seen_frame != self.frame_counter && s.raw_id_last == c.id {
                    s.raw_id_last = c.id;
                    s.x = c.x;
                    s.y = c.y;
                    s.last_seen_frame = self.frame_counter;
                    s.last_seen_us = now;
                    bound[ci] = true;
                    events.push(SessionEvent::Moved {
                        stable_id: s.stable_id,
                        x: c.x,
                        y: c.y,
                        pressure: c.pressure,
                    });
                    break;
                }
            }
        }

        // Pass 2: nearest-position match. Ties resolve to the lowest slot
        // index because the strict `<` keeps the first minimum found.
        for (ci, c) in contacts.iter().enumerate() {
            if bound[ci] {
                continue;
            }
            let mut best: Option<(usize, u64)> = None;
            for (si, s) in self.pool.iter().enumerate() {
                if !s.active || s.last_seen_frame == self.frame_counter {
                    continue;
                }
                let d = dist_sq(s.x, s.y, c.x, c.y);
                if d <= self.threshold_sq && best.is_none_or(|(_, bd)| d < bd) {
                    best = Some((si, d));
                }
            }
            if let Some((si, _)) = best {
                let s = &mut self.pool[si];
                s.raw_id_last = c.id;
                s.x = c.x;
                s.y = c.y;
                s.last_seen_frame = self.frame_counter;
                s.last_seen_us = now;
                bound[ci] = true;
                events.push(SessionEvent::Moved {
                    stable_id: s.stable_id,
                    x: c.x,
                    y: c.y,
                    pressure: c.pressure,
                });
            }
        }

        // Pass 3: open new sessions for whatever is left.
        for (ci, c) in contacts.iter().enumerate() {
            if bound[ci] {
                continue;
            }
            let slot = match self.pool.iter().position(|s| !s.active) {
                Some(slot) => slot,
                None => {
                    // Cannot happen while the pool holds device-max plus
                    // headroom; recover by evicting the oldest touch.
                    self.pool_faults += 1;
                    let oldest = self
                        .pool
                        .iter()
                        .enumerate()
                        .min_by_key(|(_, s)| s.first_seen_us)
                        .map(|(i, _)| i)
                        .unwrap_or(0);
                    warn!(
                        side = %frame.side,
                        stable_id = self.pool[oldest].stable_id,
                        "session pool exhausted, evicting oldest session"
                    );
                    events.push(SessionEvent::Closed {
                        stable_id: self.pool[oldest].stable_id,
                    });
                    oldest
                }
            };
            let stable_id = self.ids.next();
            self.pool[slot] = ContactSession {
                active: true,
                stable_id,
                raw_id_last: c.id,
                x: c.x,
                y: c.y,
                last_seen_frame: self.frame_counter,
                last_seen_us: now,
                first_seen_us: now,
            };
            events.push(SessionEvent::Opened {
                stable_id,
                x: c.x,
                y: c.y,
                pressure: c.pressure,
            });
        }

        // Pass 4: release sessions this frame left behind.
        for s in &mut self.pool {
            if s.active && s.last_seen_frame != self.frame_counter {
                s.active = false;
                events.push(SessionEvent::Closed { stable_id: s.stable_id });
            }
        }
    }

    /// Close sessions unseen for longer than Tstale. Runs at frame start,
    /// and from the pump's idle tick so a silent device cannot pin a
    /// session (and its key) open forever.
    pub fn sweep_stale(&mut self, now_us: u64, events: &mut SessionEvents) {
        for s in &mut self.pool {
            if s.active && now_us.saturating_sub(s.last_seen_us) > self.stale_us {
                s.active = false;
                events.push(SessionEvent::Closed { stable_id: s.stable_id });
            }
        }
    }

    /// Force-close every active session, emitting Closed events. Used when a
    /// device goes away or the runtime shuts down.
    pub fn close_all(&mut self, events: &mut SessionEvents) {
        for s in &mut self.pool {
            if s.active {
                s.active = false;
                events.push(SessionEvent::Closed { stable_id: s.stable_id });
            }
        }
    }

    #[must_use]
    pub fn active_count(&self) -> usize {
        self.pool.iter().filter(|s| s.active).count()
    }

    pub fn active_sessions(&self) -> impl Iterator<Item = &ContactSession> {
        self.pool.iter().filter(|s| s.active)
    }
}

fn dist_sq(ax: u16, ay: u16, bx: u16, by: u16) -> u64 {
    let dx = i64::from(ax) - i64::from(bx);
    let dy = i64::from(ay) - i64::from(by);
    (dx * dx + dy * dy) as u64
}
