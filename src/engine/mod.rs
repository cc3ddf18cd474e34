//! Intent classification.
//!
//! The engine turns the session tracker's open/move/close stream into
//! dispatch events. Each touch runs a small state machine (see
//! [`touch::TouchPhase`]); gestures are detected per side over the set of
//! open touches; the runtime mode gates what actually reaches the dispatch
//! queue. All timing uses the monotonic timestamps carried on frames, so
//! replayed captures classify identically.

pub mod gesture;
pub mod touch;

pub use gesture::{Gesture, GestureDetector, GestureParams, SwipeDirection};
pub use touch::{TouchPhase, TouchRecord};

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::dispatch::{DispatchKind, DispatchQueue, EventFlags, KeyOutput};
use crate::keycode::KeyCode;
use crate::keymap::{KeyBinding, Keymap, LayerStack, MouseButton, TouchKey};
use crate::report::Side;
use crate::session::SessionEvent;

/// What the daemon is allowed to synthesize.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RuntimeMode {
    MouseOnly,
    #[default]
    Mixed,
    KeyboardOnly,
}

/// Engine timing and distance knobs, already converted to frame-timestamp
/// microseconds and device units for one surface.
#[derive(Debug, Clone, Copy)]
pub struct EngineParams {
    /// Candidate-buffer window before a still touch becomes a key (Tstart).
    pub start_us: u64,
    /// Brief-tap lifetime bound (Ttap).
    pub tap_us: u64,
    /// Hold re-resolution threshold (Thold).
    pub hold_us: u64,
    /// Motion threshold in device units (Dmove).
    pub move_units: u32,
    /// Pointer motion divisor: device units per emitted count.
    pub pointer_divisor: i32,
    /// Device logical extents, for normalizing keymap lookups.
    pub max_x: u32,
    pub max_y: u32,
}

impl EngineParams {
    const fn move_sq(&self) -> u64 {
        let m = self.move_units as u64;
        m * m
    }

    const fn move_half_sq(&self) -> u64 {
        let m = (self.move_units / 2) as u64;
        m * m
    }

    fn normalize(&self, x: u16, y: u16) -> (f32, f32) {
        (
            f32::from(x) / self.max_x as f32,
            f32::from(y) / self.max_y as f32,
        )
    }
}

/// Gesture-to-action table, from config.
#[derive(Debug, Clone, Default)]
pub struct GestureActions {
    pub two_finger_tap: Option<MouseButton>,
    pub three_finger_tap: Option<MouseButton>,
    pub swipes: HashMap<(u8, SwipeDirection), Vec<KeyCode>>,
}

impl GestureActions {
    #[must_use]
    pub fn standard() -> Self {
        Self {
            two_finger_tap: Some(MouseButton::Right),
            three_finger_tap: Some(MouseButton::Middle),
            swipes: HashMap::new(),
        }
    }
}

/// Rate limiter for the haptic tag on KeyDown events.
#[derive(Debug, Clone, Copy)]
pub struct HapticGate {
    pub enabled: bool,
    pub min_interval_us: u64,
    last_us: Option<u64>,
}

impl HapticGate {
    #[must_use]
    pub const fn new(enabled: bool, min_interval_us: u64) -> Self {
        Self { enabled, min_interval_us, last_us: None }
    }

    fn key_flags(&mut self, now_us: u64) -> EventFlags {
        if !self.enabled {
            return EventFlags::default();
        }
        let due = self
            .last_us
            .is_none_or(|last| now_us.saturating_sub(last) >= self.min_interval_us);
        if due {
            self.last_us = Some(now_us);
            EventFlags::HAPTIC
        } else {
            EventFlags::default()
        }
    }
}

/// Everything a frame step needs from the runtime. The layer stack is
/// shared between both side engines; the rest is per-frame context.
pub struct EngineCtx<'a> {
    pub stack: &'a mut LayerStack,
    pub keymap: &'a Keymap,
    pub queue: &'a DispatchQueue,
    pub mode: RuntimeMode,
    pub haptics: &'a mut HapticGate,
}

/// Intent state machine for one side.
pub struct IntentProcessor {
    side: Side,
    params: EngineParams,
    actions: GestureActions,
    touches: HashMap<u64, TouchRecord>,
    gestures: GestureDetector,
}

impl IntentProcessor {
    #[must_use]
    pub fn new(
        side: Side,
        params: EngineParams,
        gesture_params: GestureParams,
        actions: GestureActions,
    ) -> Self {
        Self {
            side,
            params,
            actions,
            touches: HashMap::new(),
            gestures: GestureDetector::new(gesture_params),
        }
    }

    /// Process one frame's session events, in order.
    pub fn step(&mut self, events: &[SessionEvent], now_us: u64, ctx: &mut EngineCtx<'_>) {
        for ev in events {
            match *ev {
                SessionEvent::Opened { stable_id, x, y, pressure } => {
                    self.gestures.on_open(stable_id, now_us, x, y);
                    let rec = TouchRecord::open(now_us, x, y, pressure, ctx.stack.snapshot());
                    self.touches.insert(stable_id, rec);
                    self.advance(stable_id, now_us, ctx);
                }
                SessionEvent::Moved { stable_id, x, y, pressure } => {
                    self.gestures.on_move(stable_id, x, y);
                    if let Some(rec) = self.touches.get_mut(&stable_id) {
                        rec.update_position(x, y, pressure);
                    }
                    self.advance(stable_id, now_us, ctx);
                }
                SessionEvent::Closed { stable_id } => {
                    let was_claimed = self.gestures.claims(stable_id);
                    if let Some(g) = self.gestures.on_close(stable_id, now_us) {
                        self.emit_gesture(g, now_us, ctx);
                    }
                    self.close_touch(stable_id, was_claimed, now_us, ctx);
                }
            }
        }
    }

    /// Open touches on this side, for observer snapshots.
    pub fn touches(&self) -> impl Iterator<Item = (&u64, &TouchRecord)> {
        self.touches.iter()
    }

    fn uncommitted_count(&self) -> usize {
        self.touches.values().filter(|t| t.uncommitted()).count()
    }

    fn advance(&mut self, stable_id: u64, now_us: u64, ctx: &mut EngineCtx<'_>) {
        let uncommitted = self.uncommitted_count();
        let claimed = self.gestures.claims(stable_id);
        let Some(mut rec) = self.touches.remove(&stable_id) else {
            return;
        };

        match rec.phase {
            TouchPhase::Nascent => {
                if rec.max_disp_sq > self.params.move_half_sq() || uncommitted >= 2 {
                    rec.became_multi = rec.max_disp_sq <= self.params.move_half_sq();
                    rec.phase = TouchPhase::MouseCandidate;
                } else if rec.age_us(now_us) >= self.params.start_us {
                    self.commit_key(&mut rec, stable_id, now_us, ctx);
                }
            }
            TouchPhase::MouseCandidate => {
                if rec.max_disp_sq > self.params.move_sq() {
                    rec.phase = TouchPhase::MouseActive;
                    self.gestures.on_drag_started(stable_id);
                    self.pointer_delta(&mut rec, claimed, ctx);
                }
            }
            TouchPhase::MouseActive => self.pointer_delta(&mut rec, claimed, ctx),
            TouchPhase::KeyActive => self.check_hold(&mut rec, now_us, ctx),
        }

        self.touches.insert(stable_id, rec);
    }

    /// Resolve the keymap for a touch and commit the result. Resolution
    /// uses the layer snapshot taken when the touch opened, so a layer
    /// pushed afterwards cannot retroactively change this key.
    fn commit_key(
        &mut self,
        rec: &mut TouchRecord,
        stable_id: u64,
        now_us: u64,
        ctx: &mut EngineCtx<'_>,
    ) {
        let (nx, ny) = self.params.normalize(rec.x, rec.y);
        let binding = ctx
            .keymap
            .resolve_snapshot(self.side, nx, ny, &rec.layer_snapshot);
        debug!(side = %self.side, stable_id, ?binding, "key commit");

        self.gestures.mark_committed(stable_id);
        let owner = TouchKey { side: self.side, stable_id };
        match &binding {
            KeyBinding::MomentaryLayer(layer) => ctx.stack.push_momentary(owner, *layer),
            KeyBinding::ToggleLayer(_) | KeyBinding::NoOp => {}
            KeyBinding::Mouse(btn) => {
                rec.down_sent = self.emit(ctx, DispatchKind::MouseDown(*btn), EventFlags::default());
            }
            KeyBinding::Chord(seq) => {
                rec.down_sent = self.emit(ctx, DispatchKind::Chord(seq.clone()), EventFlags::default());
            }
            other => {
                if let Some(out) = key_output(other) {
                    let flags = ctx.haptics.key_flags(now_us);
                    rec.down_sent = self.emit(ctx, DispatchKind::KeyDown(out), flags);
                }
            }
        }
        rec.committed = Some(binding);
        rec.phase = TouchPhase::KeyActive;
    }

    /// Past Thold, look the position up once more under the live stack: a
    /// layer pushed by another finger since the commit replaces the
    /// committed key.
    fn check_hold(&mut self, rec: &mut TouchRecord, now_us: u64, ctx: &mut EngineCtx<'_>) {
        if rec.hold_fired || rec.age_us(now_us) < self.params.hold_us {
            return;
        }
        rec.hold_fired = true;

        let Some(old) = rec.committed.clone() else { return };
        let (nx, ny) = self.params.normalize(rec.x, rec.y);
        let new = ctx.keymap.resolve(self.side, nx, ny, ctx.stack);
        if new == old {
            return;
        }
        let (Some(old_out), Some(new_out)) = (key_output(&old), key_output(&new)) else {
            return;
        };
        debug!(side = %self.side, ?old, ?new, "hold re-resolution");
        if rec.down_sent {
            ctx.queue.push(DispatchKind::KeyUp(old_out), self.side, EventFlags::default());
        }
        let flags = ctx.haptics.key_flags(now_us);
        rec.down_sent = self.emit(ctx, DispatchKind::KeyDown(new_out), flags);
        rec.committed = Some(new);
    }

    fn pointer_delta(&mut self, rec: &mut TouchRecord, claimed: bool, ctx: &mut EngineCtx<'_>) {
        let div = self.params.pointer_divisor.max(1);
        let dx = (i32::from(rec.x) - rec.emit_x) / div;
        let dy = (i32::from(rec.y) - rec.emit_y) / div;
        if dx == 0 && dy == 0 {
            return;
        }
        rec.emit_x += dx * div;
        rec.emit_y += dy * div;
        if !claimed {
            self.emit(ctx, DispatchKind::MouseMove { dx, dy }, EventFlags::default());
        }
    }

    fn close_touch(
        &mut self,
        stable_id: u64,
        was_claimed: bool,
        now_us: u64,
        ctx: &mut EngineCtx<'_>,
    ) {
        let Some(mut rec) = self.touches.remove(&stable_id) else {
            return;
        };
        let owner = TouchKey { side: self.side, stable_id };

        match rec.phase {
            TouchPhase::KeyActive => self.release_committed(&rec, owner, ctx),
            TouchPhase::MouseActive => {
                if !was_claimed {
                    self.emit(ctx, DispatchKind::MouseUp(MouseButton::Left), EventFlags::default());
                }
            }
            TouchPhase::Nascent => {
                let quick = rec.age_us(now_us) < self.params.tap_us
                    && rec.max_disp_sq <= self.params.move_half_sq();
                if !was_claimed && quick {
                    self.commit_key(&mut rec, stable_id, now_us, ctx);
                    self.release_committed(&rec, owner, ctx);
                }
            }
            TouchPhase::MouseCandidate => {
                let quick = rec.age_us(now_us) < self.params.tap_us
                    && rec.max_disp_sq <= self.params.move_sq();
                if !was_claimed && !rec.became_multi && quick {
                    // Tap-click: quick touch with slight motion.
                    if self.emit(ctx, DispatchKind::MouseDown(MouseButton::Left), EventFlags::default())
                    {
                        ctx.queue.push(
                            DispatchKind::MouseUp(MouseButton::Left),
                            self.side,
                            EventFlags::default(),
                        );
                    }
                }
            }
        }
    }

    /// Undo a committed binding on release. Lifts matching an emitted press
    /// bypass mode gating so a mid-hold mode switch cannot wedge a key.
    fn release_committed(&mut self, rec: &TouchRecord, owner: TouchKey, ctx: &mut EngineCtx<'_>) {
        match &rec.committed {
            Some(KeyBinding::MomentaryLayer(_)) => ctx.stack.pop_momentary(owner),
            Some(KeyBinding::ToggleLayer(layer)) => ctx.stack.toggle_to(*layer),
            Some(KeyBinding::Mouse(btn)) => {
                if rec.down_sent {
                    ctx.queue.push(DispatchKind::MouseUp(*btn), self.side, EventFlags::default());
                }
            }
            Some(binding) => {
                if rec.down_sent {
                    if let Some(out) = key_output(binding) {
                        ctx.queue.push(DispatchKind::KeyUp(out), self.side, EventFlags::default());
                    }
                }
            }
            None => {}
        }
    }

    fn emit_gesture(&mut self, gesture: Gesture, now_us: u64, ctx: &mut EngineCtx<'_>) {
        debug!(side = %self.side, ?gesture, "gesture");
        match gesture {
            Gesture::Tap(count) => {
                let button = match count {
                    2 => self.actions.two_finger_tap,
                    3 => self.actions.three_finger_tap,
                    _ => None,
                };
                if let Some(btn) = button {
                    if self.emit(ctx, DispatchKind::MouseDown(btn), EventFlags::default()) {
                        ctx.queue.push(DispatchKind::MouseUp(btn), self.side, EventFlags::default());
                    }
                }
            }
            Gesture::Swipe(count, dir) => {
                if let Some(seq) = self.actions.swipes.get(&(count, dir)).cloned() {
                    let flags = ctx.haptics.key_flags(now_us);
                    self.emit(ctx, DispatchKind::Chord(seq), flags);
                }
            }
        }
    }

    /// Push an event if the runtime mode allows it. Momentary-layer holds
    /// bypass the mode restriction entirely.
    fn emit(&self, ctx: &mut EngineCtx<'_>, kind: DispatchKind, flags: EventFlags) -> bool {
        let allowed = ctx.stack.momentary_held()
            || match ctx.mode {
                RuntimeMode::Mixed => true,
                RuntimeMode::KeyboardOnly => !matches!(
                    kind,
                    DispatchKind::MouseDown(_)
                        | DispatchKind::MouseUp(_)
                        | DispatchKind::MouseMove { .. }
                ),
                RuntimeMode::MouseOnly => !matches!(
                    kind,
                    DispatchKind::KeyDown(_) | DispatchKind::KeyUp(_) | DispatchKind::Chord(_)
                ),
            };
        if allowed {
            ctx.queue.push(kind, self.side, flags);
        }
        allowed
    }
}

fn key_output(binding: &KeyBinding) -> Option<KeyOutput> {
    match binding {
        KeyBinding::Char(c) => Some(KeyOutput::Char(*c)),
        KeyBinding::Key(kc) => Some(KeyOutput::Code(*kc)),
        KeyBinding::Modifier(mask) => Some(KeyOutput::Modifier(*mask)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch::{queue, DispatchReceiver};
    use crate::report::Side;

    const MS: u64 = 1_000;

    fn params() -> EngineParams {
        EngineParams {
            start_us: 20 * MS,
            tap_us: 180 * MS,
            hold_us: 250 * MS,
            move_units: 400,
            pointer_divisor: 8,
            max_x: 14_720,
            max_y: 10_240,
        }
    }

    fn gesture_params() -> GestureParams {
        GestureParams {
            window_us: 30 * MS,
            tap_us: 180 * MS,
            move_sq: 400 * 400,
            swipe_units: 2400,
            cancel_on_drag: true,
        }
    }

    struct Rig {
        engine: IntentProcessor,
        stack: LayerStack,
        keymap: Keymap,
        tx: DispatchQueue,
        rx: DispatchReceiver,
        haptics: HapticGate,
        mode: RuntimeMode,
    }

    impl Rig {
        fn new(keymap: Keymap) -> Self {
            let (tx, rx) = queue(64);
            Self {
                engine: IntentProcessor::new(
                    Side::Right,
                    params(),
                    gesture_params(),
                    GestureActions::standard(),
                ),
                stack: LayerStack::new(),
                keymap,
                tx,
                rx,
                haptics: HapticGate::new(false, 0),
                mode: RuntimeMode::Mixed,
            }
        }

        fn step(&mut self, events: &[SessionEvent], now_us: u64) {
            let mut ctx = EngineCtx {
                stack: &mut self.stack,
                keymap: &self.keymap,
                queue: &self.tx,
                mode: self.mode,
                haptics: &mut self.haptics,
            };
            self.engine.step(events, now_us, &mut ctx);
        }

        fn drain(&self) -> Vec<DispatchKind> {
            std::iter::from_fn(|| self.rx.try_recv()).map(|e| e.kind).collect()
        }
    }

    fn single_key_map() -> Keymap {
        let mut km = Keymap::new("t");
        for row in 0..3 {
            for col in 0..6 {
                km.insert(Side::Right, 0, row, col, KeyBinding::NoOp);
            }
        }
        km.insert(Side::Right, 0, 1, 2, KeyBinding::Char('k'));
        km
    }

    fn opened(id: u64, x: u16, y: u16) -> SessionEvent {
        SessionEvent::Opened { stable_id: id, x, y, pressure: 0 }
    }

    fn moved(id: u64, x: u16, y: u16) -> SessionEvent {
        SessionEvent::Moved { stable_id: id, x, y, pressure: 0 }
    }

    fn closed(id: u64) -> SessionEvent {
        SessionEvent::Closed { stable_id: id }
    }

    // Center of grid cell (1, 2) on a 6x3 grid over the official extents.
    const KX: u16 = 6133; // (2.5 / 6) * 14720
    const KY: u16 = 5120; // (1.5 / 3) * 10240

    #[test]
    fn still_touch_commits_key_after_start_window() {
        let mut rig = Rig::new(single_key_map());
        rig.step(&[opened(1, KX, KY)], 0);
        assert!(rig.drain().is_empty(), "nothing before Tstart");
        rig.step(&[moved(1, KX, KY)], 25 * MS);
        assert_eq!(rig.drain(), vec![DispatchKind::KeyDown(KeyOutput::Char('k'))]);
        rig.step(&[closed(1)], 80 * MS);
        assert_eq!(rig.drain(), vec![DispatchKind::KeyUp(KeyOutput::Char('k'))]);
    }

    #[test]
    fn brief_tap_commits_down_and_up_together() {
        let mut rig = Rig::new(single_key_map());
        rig.step(&[opened(1, KX, KY)], 0);
        rig.step(&[closed(1)], 10 * MS);
        assert_eq!(
            rig.drain(),
            vec![
                DispatchKind::KeyDown(KeyOutput::Char('k')),
                DispatchKind::KeyUp(KeyOutput::Char('k')),
            ]
        );
    }

    #[test]
    fn drag_emits_motion_then_mouse_up() {
        let mut rig = Rig::new(single_key_map());
        rig.step(&[opened(1, 2000, 2000)], 0);
        rig.step(&[moved(1, 2300, 2000)], 8 * MS); // > Dmove/2: candidate
        rig.step(&[moved(1, 2600, 2000)], 16 * MS); // > Dmove: active
        rig.step(&[moved(1, 3400, 2400)], 24 * MS);
        rig.step(&[closed(1)], 32 * MS);
        let kinds = rig.drain();
        assert!(matches!(kinds[0], DispatchKind::MouseMove { .. }));
        assert!(kinds.iter().all(|k| !matches!(k, DispatchKind::KeyDown(_))));
        assert_eq!(*kinds.last().unwrap(), DispatchKind::MouseUp(MouseButton::Left));
    }

    #[test]
    fn momentary_layer_gates_second_finger_key() {
        let mut km = single_key_map();
        km.insert(Side::Right, 0, 0, 0, KeyBinding::MomentaryLayer(1));
        km.insert(Side::Right, 1, 1, 2, KeyBinding::Char('2'));
        let mut rig = Rig::new(km);

        // First finger commits the momentary layer.
        rig.step(&[opened(1, 100, 100)], 0);
        rig.step(&[moved(1, 100, 100)], 25 * MS);
        assert!(rig.stack.momentary_held());
        assert!(rig.drain().is_empty());

        // Second finger lands on the same cell, now resolved on layer 1.
        rig.step(&[moved(1, 100, 100), opened(2, KX, KY)], 100 * MS);
        rig.step(&[moved(1, 100, 100), moved(2, KX, KY)], 125 * MS);
        assert_eq!(rig.drain(), vec![DispatchKind::KeyDown(KeyOutput::Char('2'))]);

        rig.step(&[moved(1, 100, 100), closed(2)], 150 * MS);
        assert_eq!(rig.drain(), vec![DispatchKind::KeyUp(KeyOutput::Char('2'))]);

        rig.step(&[closed(1)], 200 * MS);
        assert!(rig.drain().is_empty());
        assert!(!rig.stack.momentary_held());
        assert_eq!(rig.stack.current(), 0);
    }

    #[test]
    fn toggle_layer_swaps_stack_on_release() {
        let mut km = single_key_map();
        km.insert(Side::Right, 0, 0, 0, KeyBinding::ToggleLayer(2));
        let mut rig = Rig::new(km);
        rig.step(&[opened(1, 100, 100)], 0);
        rig.step(&[moved(1, 100, 100)], 25 * MS);
        assert_eq!(rig.stack.current(), 0, "toggle waits for release");
        rig.step(&[closed(1)], 60 * MS);
        assert_eq!(rig.stack.current(), 2);
        assert!(rig.drain().is_empty());
    }

    #[test]
    fn two_finger_tap_suppresses_keys_and_right_clicks() {
        let mut rig = Rig::new(single_key_map());
        rig.step(&[opened(1, KX, KY)], 0);
        rig.step(&[opened(2, KX + 2000, KY)], 10 * MS);
        rig.step(&[moved(1, KX, KY), moved(2, KX + 2000, KY)], 40 * MS);
        rig.step(&[closed(1), closed(2)], 90 * MS);
        assert_eq!(
            rig.drain(),
            vec![
                DispatchKind::MouseDown(MouseButton::Right),
                DispatchKind::MouseUp(MouseButton::Right),
            ]
        );
    }

    #[test]
    fn keyboard_only_mode_blocks_pointer_stream() {
        let mut rig = Rig::new(single_key_map());
        rig.mode = RuntimeMode::KeyboardOnly;
        rig.step(&[opened(1, 2000, 2000)], 0);
        rig.step(&[moved(1, 2600, 2000)], 8 * MS);
        rig.step(&[moved(1, 3400, 2000)], 16 * MS);
        rig.step(&[closed(1)], 24 * MS);
        assert!(rig.drain().is_empty());
    }

    #[test]
    fn mouse_only_mode_blocks_keys_but_momentary_bypasses() {
        let mut km = single_key_map();
        km.insert(Side::Right, 0, 0, 0, KeyBinding::MomentaryLayer(1));
        km.insert(Side::Right, 1, 1, 2, KeyBinding::Char('2'));
        let mut rig = Rig::new(km);
        rig.mode = RuntimeMode::MouseOnly;

        // A bare key press is suppressed entirely.
        rig.step(&[opened(1, KX, KY)], 0);
        rig.step(&[moved(1, KX, KY)], 25 * MS);
        rig.step(&[closed(1)], 60 * MS);
        assert!(rig.drain().is_empty());

        // With the momentary layer held, keys pass.
        rig.step(&[opened(2, 100, 100)], 100 * MS);
        rig.step(&[moved(2, 100, 100)], 125 * MS);
        rig.step(&[moved(2, 100, 100), opened(3, KX, KY)], 200 * MS);
        rig.step(&[moved(2, 100, 100), moved(3, KX, KY)], 225 * MS);
        assert_eq!(rig.drain(), vec![DispatchKind::KeyDown(KeyOutput::Char('2'))]);
    }

    #[test]
    fn hold_re_resolves_under_new_layer() {
        let mut km = single_key_map();
        km.insert(Side::Right, 1, 1, 2, KeyBinding::Char('2'));
        let mut rig = Rig::new(km);

        rig.step(&[opened(1, KX, KY)], 0);
        rig.step(&[moved(1, KX, KY)], 25 * MS);
        assert_eq!(rig.drain(), vec![DispatchKind::KeyDown(KeyOutput::Char('k'))]);

        // Another hand pushes layer 1 while the key is held.
        rig.stack.push_momentary(TouchKey { side: Side::Left, stable_id: 99 }, 1);
        rig.step(&[moved(1, KX, KY)], 300 * MS);
        assert_eq!(
            rig.drain(),
            vec![
                DispatchKind::KeyUp(KeyOutput::Char('k')),
                DispatchKind::KeyDown(KeyOutput::Char('2')),
            ]
        );
        rig.step(&[closed(1)], 350 * MS);
        assert_eq!(rig.drain(), vec![DispatchKind::KeyUp(KeyOutput::Char('2'))]);
    }

    #[test]
    fn haptic_tag_rate_limited() {
        let mut rig = Rig::new(single_key_map());
        rig.haptics = HapticGate::new(true, 100 * MS);
        rig.step(&[opened(1, KX, KY)], 0);
        rig.step(&[closed(1)], 10 * MS);
        rig.step(&[opened(2, KX, KY)], 50 * MS);
        rig.step(&[closed(2)], 60 * MS);
        let events: Vec<_> = std::iter::from_fn(|| rig.rx.try_recv()).collect();
        let tagged: Vec<bool> = events
            .iter()
            .filter(|e| matches!(e.kind, DispatchKind::KeyDown(_)))
            .map(|e| e.flags.contains(EventFlags::HAPTIC))
            .collect();
        assert_eq!(tagged, vec![true, false]);
    }
}
