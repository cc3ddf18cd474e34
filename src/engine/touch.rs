//! Per-touch intent state.

use crate::keymap::KeyBinding;

/// Where a touch is in the intent state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TouchPhase {
    /// Just opened; nothing decided yet.
    Nascent,
    /// Early motion or a second finger made this pointer territory.
    MouseCandidate,
    /// Moving the pointer; deltas stream out each frame.
    MouseActive,
    /// Committed to a key binding; hold timer running.
    KeyActive,
}

/// Engine record for one open touch, keyed by the session's stable id.
#[derive(Debug, Clone)]
pub struct TouchRecord {
    pub phase: TouchPhase,
    pub opened_us: u64,
    pub origin_x: u16,
    pub origin_y: u16,
    pub x: u16,
    pub y: u16,
    pub pressure: u8,
    /// Pointer position at the last emitted MouseMove; deltas are carried
    /// here so integer division never loses motion.
    pub emit_x: i32,
    pub emit_y: i32,
    /// Peak squared displacement from origin, device units.
    pub max_disp_sq: u64,
    /// Layer stack as it was when the touch opened; key commits resolve
    /// against this, not the live stack.
    pub layer_snapshot: Vec<u8>,
    pub committed: Option<KeyBinding>,
    /// Whether the committed binding's press actually reached the queue.
    /// Releases only emit when it did, so mode gating cannot orphan a lift.
    pub down_sent: bool,
    pub hold_fired: bool,
    /// Entered MouseCandidate because of a second finger, not motion.
    /// Such touches never commit a tap-click on quick release.
    pub became_multi: bool,
}

impl TouchRecord {
    #[must_use]
    pub fn open(now_us: u64, x: u16, y: u16, pressure: u8, layer_snapshot: Vec<u8>) -> Self {
        Self {
            phase: TouchPhase::Nascent,
            opened_us: now_us,
            origin_x: x,
            origin_y: y,
            x,
            y,
            pressure,
            emit_x: i32::from(x),
            emit_y: i32::from(y),
            max_disp_sq: 0,
            layer_snapshot,
            committed: None,
            down_sent: false,
            hold_fired: false,
            became_multi: false,
        }
    }

    pub fn update_position(&mut self, x: u16, y: u16, pressure: u8) {
        self.x = x;
        self.y = y;
        self.pressure = pressure;
        let dx = i64::from(x) - i64::from(self.origin_x);
        let dy = i64::from(y) - i64::from(self.origin_y);
        self.max_disp_sq = self.max_disp_sq.max((dx * dx + dy * dy) as u64);
    }

    #[must_use]
    pub const fn age_us(&self, now_us: u64) -> u64 {
        now_us.saturating_sub(self.opened_us)
    }

    /// Whether this touch still counts toward the multi-finger pointer
    /// rule. Committed touches (held keys, momentary layers) stay out of
    /// it so a second finger can keep typing.
    #[must_use]
    pub const fn uncommitted(&self) -> bool {
        matches!(
            self.phase,
            TouchPhase::Nascent | TouchPhase::MouseCandidate | TouchPhase::MouseActive
        )
    }
}
