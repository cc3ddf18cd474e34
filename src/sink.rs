//! OS input synthesis.
//!
//! The adapter thread drains the dispatch queue in sequence order into a
//! [`DispatchSink`]. The default sink is a uinput keyboard+mouse; it tracks
//! which keys and buttons it is holding so shutdown can release everything
//! and an unpaired MouseUp is a no-op.

use std::collections::HashSet;
use std::thread::{self, JoinHandle};

use anyhow::Result;
use evdev::uinput::{VirtualDevice, VirtualDeviceBuilder};
use evdev::{AttributeSet, EventType, InputEvent, Key, RelativeAxisType};
use smallvec::SmallVec;
use tracing::{error, info, warn};

use crate::dispatch::{DispatchEvent, DispatchKind, DispatchReceiver, KeyOutput};
use crate::keycode::{modmask, KeyCode};
use crate::keymap::MouseButton;

const SYN_REPORT: i32 = 0;
const SYN_CODE: u16 = 0;

/// Consumer of the ordered dispatch stream.
pub trait DispatchSink: Send {
    fn dispatch(&mut self, event: &DispatchEvent) -> Result<()>;

    /// Release anything still held; called on shutdown.
    fn release_all(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Drain `rx` into `sink` until the queue closes.
pub fn start_adapter(rx: DispatchReceiver, mut sink: Box<dyn DispatchSink>) -> JoinHandle<()> {
    thread::spawn(move || {
        while let Some(event) = rx.recv() {
            if let Err(e) = sink.dispatch(&event) {
                error!("dispatch failed (seq {}): {}", event.seq, e);
            }
        }
        if let Err(e) = sink.release_all() {
            warn!("release on shutdown failed: {}", e);
        }
        info!("adapter thread exiting");
    })
}

/// uinput-backed keyboard and mouse.
pub struct UinputSink {
    device: VirtualDevice,
    held_keys: HashSet<u16>,
    held_buttons: HashSet<MouseButton>,
}

impl UinputSink {
    pub fn new() -> Result<Self> {
        let mut keys = AttributeSet::<Key>::new();
        for code in 0..256u16 {
            keys.insert(Key::new(code));
        }
        for button in [Key::BTN_LEFT, Key::BTN_RIGHT, Key::BTN_MIDDLE] {
            keys.insert(button);
        }

        let mut axes = AttributeSet::<RelativeAxisType>::new();
        axes.insert(RelativeAxisType::REL_X);
        axes.insert(RelativeAxisType::REL_Y);

        let device = VirtualDeviceBuilder::new()?
            .name("GlassToKey Virtual Input")
            .with_keys(&keys)?
            .with_relative_axes(&axes)?
            .build()?;

        // Give udev time to recognize the device.
        thread::sleep(std::time::Duration::from_millis(200));

        let mut sink = Self {
            device,
            held_keys: HashSet::new(),
            held_buttons: HashSet::new(),
        };
        // A previous incarnation (crash, hotplug) may have left keys
        // latched; sweep everything up before the first dispatch.
        sink.release_everything_on_startup()?;
        Ok(sink)
    }

    /// Release every key and button this device can press. Startup-only:
    /// nothing is tracked yet, so the sweep covers the full range.
    fn release_everything_on_startup(&mut self) -> Result<()> {
        let mut events = Vec::with_capacity(260);
        for code in 0..256u16 {
            events.push(InputEvent::new(EventType::KEY, code, 0));
        }
        for button in [Key::BTN_LEFT, Key::BTN_RIGHT, Key::BTN_MIDDLE] {
            events.push(InputEvent::new(EventType::KEY, button.code(), 0));
        }
        events.push(InputEvent::new(EventType::SYNCHRONIZATION, SYN_CODE, SYN_REPORT));
        self.emit_batch(&events)
    }

    fn emit_batch(&mut self, events: &[InputEvent]) -> Result<()> {
        self.device.emit(events)?;
        Ok(())
    }

    fn key_event(code: u16, pressed: bool) -> [InputEvent; 2] {
        [
            InputEvent::new(EventType::KEY, code, i32::from(pressed)),
            InputEvent::new(EventType::SYNCHRONIZATION, SYN_CODE, SYN_REPORT),
        ]
    }

    fn set_key(&mut self, code: u16, pressed: bool, batch: &mut SmallVec<[InputEvent; 16]>) {
        batch.push(InputEvent::new(EventType::KEY, code, i32::from(pressed)));
        batch.push(InputEvent::new(EventType::SYNCHRONIZATION, SYN_CODE, SYN_REPORT));
        if pressed {
            self.held_keys.insert(code);
        } else {
            self.held_keys.remove(&code);
        }
    }

    /// Expand a key output into the codes involved, shift included, in
    /// press order.
    fn output_codes(output: &KeyOutput) -> SmallVec<[u16; 4]> {
        let mut codes = SmallVec::new();
        match output {
            KeyOutput::Code(kc) => codes.push(kc.code()),
            KeyOutput::Char(c) => {
                if let Some((kc, shift)) = KeyCode::from_char(*c) {
                    if shift {
                        codes.push(KeyCode::KC_LSFT.code());
                    }
                    codes.push(kc.code());
                } else {
                    warn!("no key for character {c:?}");
                }
            }
            KeyOutput::Modifier(mask) => {
                codes.extend(modmask::keycodes(*mask).map(KeyCode::code));
            }
        }
        codes
    }

    fn press_output(&mut self, output: &KeyOutput) -> Result<()> {
        let mut batch = SmallVec::<[InputEvent; 16]>::new();
        for code in Self::output_codes(output) {
            self.set_key(code, true, &mut batch);
        }
        self.emit_batch(&batch)
    }

    fn release_output(&mut self, output: &KeyOutput) -> Result<()> {
        let mut batch = SmallVec::<[InputEvent; 16]>::new();
        for code in Self::output_codes(output).iter().rev() {
            self.set_key(*code, false, &mut batch);
        }
        self.emit_batch(&batch)
    }

    const fn button_key(button: MouseButton) -> Key {
        match button {
            MouseButton::Left => Key::BTN_LEFT,
            MouseButton::Right => Key::BTN_RIGHT,
            MouseButton::Middle => Key::BTN_MIDDLE,
        }
    }
}

impl DispatchSink for UinputSink {
    fn dispatch(&mut self, event: &DispatchEvent) -> Result<()> {
        match &event.kind {
            DispatchKind::KeyDown(output) => self.press_output(output),
            DispatchKind::KeyUp(output) => self.release_output(output),
            DispatchKind::MouseDown(button) => {
                self.held_buttons.insert(*button);
                self.emit_batch(&Self::key_event(Self::button_key(*button).code(), true))
            }
            DispatchKind::MouseUp(button) => {
                // Mode gating upstream can orphan a lift; ignore it here.
                if self.held_buttons.remove(button) {
                    self.emit_batch(&Self::key_event(Self::button_key(*button).code(), false))
                } else {
                    Ok(())
                }
            }
            DispatchKind::MouseMove { dx, dy } => {
                let events = [
                    InputEvent::new(EventType::RELATIVE, RelativeAxisType::REL_X.0, *dx),
                    InputEvent::new(EventType::RELATIVE, RelativeAxisType::REL_Y.0, *dy),
                    InputEvent::new(EventType::SYNCHRONIZATION, SYN_CODE, SYN_REPORT),
                ];
                self.emit_batch(&events)
            }
            DispatchKind::Chord(seq) => {
                let mut batch = SmallVec::<[InputEvent; 16]>::new();
                for kc in seq {
                    batch.extend(Self::key_event(kc.code(), true));
                }
                for kc in seq.iter().rev() {
                    batch.extend(Self::key_event(kc.code(), false));
                }
                self.emit_batch(&batch)
            }
        }
    }

    fn release_all(&mut self) -> Result<()> {
        let mut batch = SmallVec::<[InputEvent; 16]>::new();
        let held: Vec<u16> = self.held_keys.drain().collect();
        if !held.is_empty() {
            info!("releasing {} held key(s) on shutdown", held.len());
        }
        for code in held {
            batch.push(InputEvent::new(EventType::KEY, code, 0));
            batch.push(InputEvent::new(EventType::SYNCHRONIZATION, SYN_CODE, SYN_REPORT));
        }
        // Modifiers again as a safety net against stuck chords.
        for kc in modmask::keycodes(0xFF) {
            batch.push(InputEvent::new(EventType::KEY, kc.code(), 0));
            batch.push(InputEvent::new(EventType::SYNCHRONIZATION, SYN_CODE, SYN_REPORT));
        }
        for button in self.held_buttons.drain().collect::<Vec<_>>() {
            batch.push(InputEvent::new(EventType::KEY, Self::button_key(button).code(), 0));
            batch.push(InputEvent::new(EventType::SYNCHRONIZATION, SYN_CODE, SYN_REPORT));
        }
        self.emit_batch(&batch)
    }
}

/// Sink that only logs, for dry runs and environments without uinput.
#[derive(Debug, Default)]
pub struct LogSink;

impl DispatchSink for LogSink {
    fn dispatch(&mut self, event: &DispatchEvent) -> Result<()> {
        tracing::info!(seq = event.seq, side = %event.side, kind = ?event.kind, "dispatch");
        Ok(())
    }
}
