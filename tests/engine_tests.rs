//! End-to-end pipeline scenarios: raw report bytes in, dispatch events out.

use glasstokey::dispatch::{queue, DispatchKind, DispatchQueue, DispatchReceiver, KeyOutput};
use glasstokey::engine::{
    EngineCtx, EngineParams, GestureActions, GestureParams, HapticGate, IntentProcessor,
    RuntimeMode,
};
use glasstokey::keymap::{KeyBinding, Keymap, LayerStack, MouseButton};
use glasstokey::report::{parse_report, profile, DecoderProfile, DeviceTraits, Frame, Side};
use glasstokey::session::{SessionEvents, SessionTracker, StableIdSource};

const MS: u64 = 1_000;
const MAX_X: u32 = 14_720;
const MAX_Y: u32 = 10_240;

/// Build a touch report in the standard precision-touchpad layout.
fn report(contacts: &[(u8, u16, u16)]) -> Vec<u8> {
    let mut buf = vec![0x05u8];
    for i in 0..5 {
        if let Some(&(id, x, y)) = contacts.get(i) {
            let xb = x.to_le_bytes();
            let yb = y.to_le_bytes();
            buf.extend_from_slice(&[0b101, id, xb[0], xb[1], yb[0], yb[1], 0, 0, 0]);
        } else {
            buf.extend_from_slice(&[0; 9]);
        }
    }
    buf
}

/// Position in device units for a normalized point.
fn units(x: f32, y: f32) -> (u16, u16) {
    ((x * MAX_X as f32) as u16, (y * MAX_Y as f32) as u16)
}

struct Pipeline {
    traits: DeviceTraits,
    frame: Frame,
    tracker: SessionTracker,
    engine: IntentProcessor,
    stack: LayerStack,
    keymap: Keymap,
    haptics: HapticGate,
    mode: RuntimeMode,
    tx: DispatchQueue,
    rx: DispatchReceiver,
}

impl Pipeline {
    fn new(keymap: Keymap) -> Self {
        let traits = DeviceTraits::official();
        let upm = traits.units_per_mm();
        let move_units = (3.0 * upm) as u32;
        let params = EngineParams {
            start_us: 20 * MS,
            tap_us: 180 * MS,
            hold_us: 250 * MS,
            move_units,
            pointer_divisor: 8,
            max_x: MAX_X,
            max_y: MAX_Y,
        };
        let gestures = GestureParams {
            window_us: 30 * MS,
            tap_us: 180 * MS,
            move_sq: u64::from(move_units) * u64::from(move_units),
            swipe_units: (18.0 * upm) as u64,
            cancel_on_drag: true,
        };
        let (tx, rx) = queue(256);
        Self {
            traits,
            frame: Frame::new(Side::Right),
            tracker: SessionTracker::new(
                10,
                (12.0 * upm) as u32,
                170 * MS,
                StableIdSource::default(),
            ),
            engine: IntentProcessor::new(
                Side::Right,
                params,
                gestures,
                GestureActions::standard(),
            ),
            stack: LayerStack::new(),
            keymap,
            haptics: HapticGate::new(false, 0),
            mode: RuntimeMode::Mixed,
            tx,
            rx,
        }
    }

    /// One report through parse -> profile -> sessions -> intent.
    fn feed(&mut self, ts_us: u64, contacts: &[(u8, u16, u16)]) {
        let buf = report(contacts);
        parse_report(&buf, &mut self.frame).unwrap();
        self.frame.timestamp_us = ts_us;
        self.frame.side = Side::Right;
        profile::normalize(DecoderProfile::Legacy, &self.traits, &mut self.frame);

        let mut events = SessionEvents::new();
        self.tracker.advance(&self.frame, &mut events);
        let mut ctx = EngineCtx {
            stack: &mut self.stack,
            keymap: &self.keymap,
            queue: &self.tx,
            mode: self.mode,
            haptics: &mut self.haptics,
        };
        self.engine.step(&events, ts_us, &mut ctx);
    }

    /// Idle tick: only the stale sweep runs, as in the pump's timeout path.
    fn tick(&mut self, ts_us: u64) {
        let mut events = SessionEvents::new();
        self.tracker.sweep_stale(ts_us, &mut events);
        let mut ctx = EngineCtx {
            stack: &mut self.stack,
            keymap: &self.keymap,
            queue: &self.tx,
            mode: self.mode,
            haptics: &mut self.haptics,
        };
        self.engine.step(&events, ts_us, &mut ctx);
    }

    fn drain(&self) -> Vec<DispatchKind> {
        std::iter::from_fn(|| self.rx.try_recv()).map(|e| e.kind).collect()
    }
}

/// 6x3 grid on the right side: every cell NoOp except the named ones.
fn layout_6x3() -> Keymap {
    let mut km = Keymap::new("test");
    for row in 0..3 {
        for col in 0..6 {
            km.insert(Side::Right, 0, row, col, KeyBinding::NoOp);
        }
    }
    // (0.5, 0.5) lands in cell (1, 2).
    km.insert(Side::Right, 0, 1, 2, KeyBinding::Char('k'));
    km
}

#[test]
fn simple_tap_emits_keydown_then_keyup() {
    let mut p = Pipeline::new(layout_6x3());
    let (x, y) = units(0.5, 0.5);

    p.feed(0, &[(0, x, y)]);
    p.feed(8 * MS, &[(0, x, y)]);
    p.feed(16 * MS, &[(0, x, y)]);
    p.feed(24 * MS, &[]);

    assert_eq!(
        p.drain(),
        vec![
            DispatchKind::KeyDown(KeyOutput::Char('k')),
            DispatchKind::KeyUp(KeyOutput::Char('k')),
        ]
    );
}

#[test]
fn momentary_hold_with_second_finger_key() {
    let mut km = layout_6x3();
    km.insert(Side::Right, 0, 0, 0, KeyBinding::MomentaryLayer(1));
    km.insert(Side::Right, 1, 1, 2, KeyBinding::Char('2'));
    let mut p = Pipeline::new(km);

    let (mx, my) = units(0.05, 0.1); // cell (0, 0): the momentary key
    let (kx, ky) = units(0.5, 0.5); // cell (1, 2): '2' on layer 1

    // Frame A opens the momentary finger; frames continue past Tstart.
    p.feed(0, &[(0, mx, my)]);
    for i in 1..8u64 {
        p.feed(i * 8 * MS, &[(0, mx, my)]);
    }
    assert!(p.stack.momentary_held());
    assert!(p.drain().is_empty());

    // Frame L opens the second finger on the layer-1 cell.
    p.feed(64 * MS, &[(0, mx, my), (1, kx, ky)]);
    p.feed(72 * MS, &[(0, mx, my), (1, kx, ky)]);
    p.feed(80 * MS, &[(0, mx, my), (1, kx, ky)]);
    p.feed(88 * MS, &[(0, mx, my), (1, kx, ky)]);
    assert_eq!(p.drain(), vec![DispatchKind::KeyDown(KeyOutput::Char('2'))]);

    // Raw ids swap between frames while both touches are held; the
    // decoder normalizes the scrambled frame and nothing changes.
    p.feed(96 * MS, &[(1, mx, my), (0, kx, ky)]);
    p.feed(104 * MS, &[(0, mx, my), (1, kx, ky)]);
    assert!(p.drain().is_empty(), "id churn must not produce events");

    // Frame M closes the second contact.
    p.feed(112 * MS, &[(0, mx, my)]);
    assert_eq!(p.drain(), vec![DispatchKind::KeyUp(KeyOutput::Char('2'))]);

    // Frame N closes the momentary finger: layer pops, nothing dispatched.
    p.feed(120 * MS, &[]);
    assert!(p.drain().is_empty());
    assert!(!p.stack.momentary_held());
    assert_eq!(p.stack.current(), 0);
}

#[test]
fn slot_reorder_does_not_phantom_release() {
    let mut km = layout_6x3();
    km.insert(Side::Right, 0, 0, 0, KeyBinding::MomentaryLayer(1));
    km.insert(Side::Right, 1, 1, 2, KeyBinding::Char('2'));
    let mut p = Pipeline::new(km);

    let (ax, ay) = units(0.05, 0.1);
    let (bx, by) = units(0.5, 0.5);

    p.feed(0, &[(0, ax, ay)]);
    for i in 1..6u64 {
        p.feed(i * 8 * MS, &[(0, ax, ay)]);
    }
    p.feed(48 * MS, &[(0, ax, ay), (1, bx, by)]);
    p.feed(56 * MS, &[(0, ax, ay), (1, bx, by)]);
    p.feed(64 * MS, &[(0, ax, ay), (1, bx, by)]);
    p.feed(72 * MS, &[(0, ax, ay), (1, bx, by)]);
    let down = p.drain();
    assert_eq!(down, vec![DispatchKind::KeyDown(KeyOutput::Char('2'))]);

    // Slots swap for a while; positions constant. No extra events at all.
    for i in 0..10u64 {
        let t = (80 + i * 8) * MS;
        if i % 2 == 0 {
            p.feed(t, &[(1, bx, by), (0, ax, ay)]);
        } else {
            p.feed(t, &[(0, ax, ay), (1, bx, by)]);
        }
    }
    assert!(p.drain().is_empty(), "slot churn must not produce events");

    p.feed(160 * MS, &[(0, ax, ay)]);
    assert_eq!(p.drain(), vec![DispatchKind::KeyUp(KeyOutput::Char('2'))]);
}

#[test]
fn drag_streams_motion_and_never_types() {
    let mut p = Pipeline::new(layout_6x3());
    let (mut x, mut y) = units(0.2, 0.2);
    p.feed(0, &[(0, x, y)]);
    for i in 1..=5u64 {
        x += 1200;
        y += 800;
        p.feed(i * 8 * MS, &[(0, x, y)]);
    }
    p.feed(48 * MS, &[]);

    let kinds = p.drain();
    let moves = kinds
        .iter()
        .filter(|k| matches!(k, DispatchKind::MouseMove { .. }))
        .count();
    assert!(moves >= 3, "expected a stream of MouseMove, got {kinds:?}");
    assert!(kinds.iter().all(|k| !matches!(k, DispatchKind::KeyDown(_))));
    assert_eq!(*kinds.last().unwrap(), DispatchKind::MouseUp(MouseButton::Left));
}

#[test]
fn two_finger_tap_is_a_gesture_not_two_keys() {
    let mut p = Pipeline::new(layout_6x3());
    let (ax, ay) = units(0.4, 0.5);
    let (bx, by) = units(0.6, 0.5);

    p.feed(0, &[(0, ax, ay)]);
    p.feed(10 * MS, &[(0, ax, ay), (1, bx, by)]);
    p.feed(40 * MS, &[(0, ax, ay), (1, bx, by)]);
    p.feed(80 * MS, &[]);

    assert_eq!(
        p.drain(),
        vec![
            DispatchKind::MouseDown(MouseButton::Right),
            DispatchKind::MouseUp(MouseButton::Right),
        ]
    );
}

#[test]
fn stale_timeout_releases_held_key() {
    let mut p = Pipeline::new(layout_6x3());
    let (x, y) = units(0.5, 0.5);

    p.feed(0, &[(0, x, y)]);
    p.feed(25 * MS, &[(0, x, y)]);
    assert_eq!(p.drain(), vec![DispatchKind::KeyDown(KeyOutput::Char('k'))]);

    // Device goes silent; the idle sweep force-closes the session.
    p.tick(100 * MS);
    assert!(p.drain().is_empty(), "not stale yet");
    p.tick(300 * MS);
    assert_eq!(p.drain(), vec![DispatchKind::KeyUp(KeyOutput::Char('k'))]);
}

#[test]
fn sequence_numbers_increase_across_a_session() {
    let mut p = Pipeline::new(layout_6x3());
    let (x, y) = units(0.5, 0.5);
    p.feed(0, &[(0, x, y)]);
    p.feed(25 * MS, &[(0, x, y)]);
    p.feed(40 * MS, &[]);
    p.feed(50 * MS, &[(0, x, y)]);
    p.feed(80 * MS, &[(0, x, y)]);
    p.feed(90 * MS, &[]);

    let mut last = 0;
    while let Some(ev) = p.rx.try_recv() {
        assert!(ev.seq > last, "seq {} after {}", ev.seq, last);
        last = ev.seq;
    }
    assert_eq!(last, 4, "two taps, four key events");
}

#[test]
fn keyboard_only_mode_suppresses_all_pointer_output() {
    let mut p = Pipeline::new(layout_6x3());
    p.mode = RuntimeMode::KeyboardOnly;

    // A drag...
    let (mut x, y) = units(0.2, 0.2);
    p.feed(0, &[(0, x, y)]);
    for i in 1..=4u64 {
        x += 1500;
        p.feed(i * 8 * MS, &[(0, x, y)]);
    }
    p.feed(40 * MS, &[]);
    // ...and a two-finger tap.
    let (ax, ay) = units(0.4, 0.5);
    let (bx, by) = units(0.6, 0.5);
    p.feed(60 * MS, &[(0, ax, ay), (1, bx, by)]);
    p.feed(100 * MS, &[]);

    assert!(p.drain().is_empty());

    // Keys still work.
    let (kx, ky) = units(0.5, 0.5);
    p.feed(300 * MS, &[(0, kx, ky)]);
    p.feed(325 * MS, &[(0, kx, ky)]);
    p.feed(340 * MS, &[]);
    assert_eq!(
        p.drain(),
        vec![
            DispatchKind::KeyDown(KeyOutput::Char('k')),
            DispatchKind::KeyUp(KeyOutput::Char('k')),
        ]
    );
}

#[test]
fn equal_timestamps_are_processed_not_deduped() {
    let mut p = Pipeline::new(layout_6x3());
    let (x, y) = units(0.5, 0.5);
    p.feed(0, &[(0, x, y)]);
    p.feed(25 * MS, &[(0, x, y)]);
    // Same timestamp twice: second frame still advances the pipeline.
    p.feed(25 * MS, &[]);
    assert_eq!(
        p.drain(),
        vec![
            DispatchKind::KeyDown(KeyOutput::Char('k')),
            DispatchKind::KeyUp(KeyOutput::Char('k')),
        ]
    );
}
