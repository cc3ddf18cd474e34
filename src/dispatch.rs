//! Outbound dispatch queue.
//!
//! Single producer (the pump thread) and single consumer (the OS-input
//! adapter). Ordering is absolute: every accepted event gets a strictly
//! increasing sequence number and the consumer drains in that order. Under
//! backpressure, pointer motion is expendable and key transitions are not:
//! a full queue first drops its oldest MouseMove, then coalesces, and a
//! KeyUp that still cannot be accepted blocks briefly before being forced
//! in past capacity.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Condvar, Mutex};
use tracing::{error, warn};

use crate::keycode::KeyCode;
use crate::keymap::MouseButton;
use crate::report::Side;

/// Payload of a key transition: what the sink should press or release.
#[derive(Debug, Clone, PartialEq)]
pub enum KeyOutput {
    Char(char),
    Code(KeyCode),
    Modifier(u8),
}

#[derive(Debug, Clone, PartialEq)]
pub enum DispatchKind {
    KeyDown(KeyOutput),
    KeyUp(KeyOutput),
    MouseDown(MouseButton),
    MouseUp(MouseButton),
    MouseMove { dx: i32, dy: i32 },
    Chord(Vec<KeyCode>),
}

impl DispatchKind {
    #[must_use]
    pub const fn is_mouse_move(&self) -> bool {
        matches!(self, Self::MouseMove { .. })
    }
}

/// Event flag bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct EventFlags(pub u8);

impl EventFlags {
    pub const HAPTIC: Self = Self(1 << 0);

    #[must_use]
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    #[must_use]
    pub const fn with(self, other: Self) -> Self {
        Self(self.0 | other.0)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DispatchEvent {
    pub kind: DispatchKind,
    pub side: Side,
    pub flags: EventFlags,
    pub seq: u64,
}

/// How long a KeyUp waits for the adapter before being forced past
/// capacity.
const KEYUP_WAIT: Duration = Duration::from_millis(50);

struct QueueState {
    events: VecDeque<DispatchEvent>,
    next_seq: u64,
    closed: bool,
    /// MouseMoves dropped or merged under backpressure.
    motion_dropped: u64,
    /// KeyUps forced in past capacity because the adapter was wedged.
    forced_keyups: u64,
}

struct Shared {
    state: Mutex<QueueState>,
    /// Signaled when events are available or the queue closes.
    readable: Condvar,
    /// Signaled when the consumer frees space.
    writable: Condvar,
    capacity: usize,
}

/// Producer half. Created together with [`DispatchReceiver`] by [`queue`].
pub struct DispatchQueue {
    shared: Arc<Shared>,
}

/// Consumer half, owned by the adapter thread.
pub struct DispatchReceiver {
    shared: Arc<Shared>,
}

/// Build a bounded dispatch queue pair.
#[must_use]
pub fn queue(capacity: usize) -> (DispatchQueue, DispatchReceiver) {
    let shared = Arc::new(Shared {
        state: Mutex::new(QueueState {
            events: VecDeque::with_capacity(capacity),
            next_seq: 0,
            closed: false,
            motion_dropped: 0,
            forced_keyups: 0,
        }),
        readable: Condvar::new(),
        writable: Condvar::new(),
        capacity: capacity.max(2),
    });
    (
        DispatchQueue { shared: shared.clone() },
        DispatchReceiver { shared },
    )
}

impl DispatchQueue {
    /// Enqueue an event, applying the backpressure policy. Never fails;
    /// KeyDown/KeyUp are never dropped.
    pub fn push(&self, kind: DispatchKind, side: Side, flags: EventFlags) {
        let shared = &*self.shared;
        let mut state = shared.state.lock();

        if state.events.len() >= shared.capacity {
            // Oldest MouseMove goes first.
            if let Some(pos) = state.events.iter().position(|e| e.kind.is_mouse_move()) {
                state.events.remove(pos);
                state.motion_dropped += 1;
            }
        }

        if state.events.len() >= shared.capacity && kind.is_mouse_move() {
            // No motion to shed and the newcomer is motion: merge it into
            // the most recent MouseMove if one sits at the tail, else drop.
            state.motion_dropped += 1;
            if let Some(DispatchEvent { kind: DispatchKind::MouseMove { dx, dy }, .. }) =
                state.events.back_mut()
            {
                if let DispatchKind::MouseMove { dx: ndx, dy: ndy } = kind {
                    *dx += ndx;
                    *dy += ndy;
                }
            }
            return;
        }

        if state.events.len() >= shared.capacity {
            match kind {
                DispatchKind::KeyUp(_) => {
                    // The adapter must drain; give it a bounded window.
                    let deadline = shared.writable.wait_for(&mut state, KEYUP_WAIT);
                    if deadline.timed_out() && state.events.len() >= shared.capacity {
                        state.forced_keyups += 1;
                        error!("dispatch queue wedged, forcing KeyUp past capacity");
                    }
                }
                _ => {
                    // KeyDown and buttons also must not be lost; capacity is
                    // sized so this only happens when the adapter is wedged.
                    warn!("dispatch queue full, enqueueing past capacity");
                }
            }
        }

        state.next_seq += 1;
        let seq = state.next_seq;
        state.events.push_back(DispatchEvent { kind, side, flags, seq });
        shared.readable.notify_one();
    }

    /// Close the queue; the receiver drains what is left and then sees None.
    pub fn close(&self) {
        let mut state = self.shared.state.lock();
        state.closed = true;
        self.shared.readable.notify_all();
    }

    #[must_use]
    pub fn motion_dropped(&self) -> u64 {
        self.shared.state.lock().motion_dropped
    }

    #[must_use]
    pub fn forced_keyups(&self) -> u64 {
        self.shared.state.lock().forced_keyups
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.shared.state.lock().events.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl DispatchReceiver {
    /// Blocking pop in sequence order. None once the queue is closed and
    /// drained.
    pub fn recv(&self) -> Option<DispatchEvent> {
        let shared = &*self.shared;
        let mut state = shared.state.lock();
        loop {
            if let Some(ev) = state.events.pop_front() {
                shared.writable.notify_one();
                return Some(ev);
            }
            if state.closed {
                return None;
            }
            shared.readable.wait(&mut state);
        }
    }

    /// Non-blocking pop for tests and drain loops.
    pub fn try_recv(&self) -> Option<DispatchEvent> {
        let mut state = self.shared.state.lock();
        let ev = state.events.pop_front();
        if ev.is_some() {
            self.shared.writable.notify_one();
        }
        ev
    }
}
