//! Runtime host.
//!
//! Owns every pipeline component and the threads that drive them:
//!
//! - reader threads (one per surface) push raw buffers onto the ring;
//! - the pump thread runs parse -> profile -> sessions -> probe -> intent
//!   -> dispatch for each buffer, in arrival order, and is the only thread
//!   touching core state;
//! - the adapter thread drains the dispatch queue into the sink.
//!
//! Keymap and mode handles are read at frame start, so reloads swap in
//! between frames and never mid-pipeline.

pub mod observer;

pub use observer::{CounterView, ObserverHub, RuntimeSnapshot, SideView, TouchView};

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use anyhow::Result;
use parking_lot::RwLock;
use tracing::{error, info, warn};

use crate::config::{Config, ConfigManager, DeviceConfig};
use crate::dispatch::{queue, DispatchQueue};
use crate::engine::{
    EngineCtx, EngineParams, GestureActions, GestureParams, HapticGate, IntentProcessor,
    RuntimeMode, TouchPhase,
};
use crate::hidraw::{MonotonicClock, RawReader, RawReport, ReportRing};
use crate::keycode::KeyCode;
use crate::keymap::LayerStack;
use crate::pressure::PressureProbe;
use crate::report::{parse_report, profile, DecoderProfile, DeviceTraits, Frame, ReportError, Side};
use crate::session::{SessionEvent, SessionEvents, SessionTracker, StableIdSource};
use crate::sink::{start_adapter, DispatchSink};

/// Dispatch queue depth. Sized for bursts; the shed policy handles the
/// pathological rest.
const DISPATCH_CAPACITY: usize = 256;

/// Report ring depth shared by both readers.
const RING_CAPACITY: usize = 64;

/// Pump idle tick, drives stale sweeps when devices go quiet.
const IDLE_TICK: Duration = Duration::from_millis(25);

/// Recoverable-fault counters, observable through snapshots and status.
#[derive(Debug, Default)]
pub struct Counters {
    pub frames: AtomicU64,
    pub short_buffers: AtomicU64,
    pub decoder_faults: AtomicU64,
    pub pool_faults: AtomicU64,
}

impl Counters {
    fn view(&self, ring: &ReportRing, queue: &DispatchQueue) -> CounterView {
        CounterView {
            frames: self.frames.load(Ordering::Relaxed),
            short_buffers: self.short_buffers.load(Ordering::Relaxed),
            decoder_faults: self.decoder_faults.load(Ordering::Relaxed),
            pool_faults: self.pool_faults.load(Ordering::Relaxed),
            ingest_dropped: ring.dropped(),
            motion_dropped: queue.motion_dropped(),
            forced_keyups: queue.forced_keyups(),
        }
    }
}

/// Sliding fault window: too many recoverable faults in a short span pause
/// ingestion for a cool-down instead of spinning on a broken device.
struct FaultWindow {
    times: VecDeque<u64>,
    limit: usize,
    window_us: u64,
    cooldown_us: u64,
    paused_until: u64,
}

impl FaultWindow {
    fn new(limit: usize, window: Duration, cooldown: Duration) -> Self {
        Self {
            times: VecDeque::new(),
            limit,
            window_us: window.as_micros() as u64,
            cooldown_us: cooldown.as_micros() as u64,
            paused_until: 0,
        }
    }

    fn record(&mut self, now_us: u64, context: &str) {
        self.times.push_back(now_us);
        while let Some(&front) = self.times.front() {
            if now_us.saturating_sub(front) > self.window_us {
                self.times.pop_front();
            } else {
                break;
            }
        }
        if self.times.len() >= self.limit {
            self.paused_until = now_us + self.cooldown_us;
            self.times.clear();
            warn!("repeated faults ({context}), pausing ingestion for cool-down");
        }
    }

    fn is_paused(&self, now_us: u64) -> bool {
        now_us < self.paused_until
    }
}

/// Shared control surface between the pump, the daemon shell and the
/// status command.
pub struct Control {
    pub mode: RwLock<RuntimeMode>,
    pub manager: Arc<ConfigManager>,
    pub counters: Counters,
    pub observers: ObserverHub,
    stop: AtomicBool,
}

/// Everything the pump needs for one surface.
struct SideState {
    side: Side,
    profile: DecoderProfile,
    traits: DeviceTraits,
    frame: Frame,
    tracker: SessionTracker,
    probe: PressureProbe,
    engine: IntentProcessor,
    events: SessionEvents,
}

impl SideState {
    fn new(config: &Config, device: &DeviceConfig, ids: StableIdSource) -> Self {
        let traits = DeviceTraits {
            max_x: device.max_x,
            max_y: device.max_y,
            width_mm: device.width_mm,
            height_mm: device.height_mm,
        };
        let upm = traits.units_per_mm();
        let move_units = (config.distance.move_mm * upm) as u32;
        let swipe_units = (config.distance.swipe_mm * upm) as u64;

        let params = EngineParams {
            start_us: config.timing.start_ms * 1000,
            tap_us: config.timing.tap_ms * 1000,
            hold_us: config.timing.hold_ms * 1000,
            move_units,
            pointer_divisor: config.distance.pointer_divisor,
            max_x: device.max_x,
            max_y: device.max_y,
        };
        let gestures = GestureParams {
            window_us: config.timing.gesture_ms * 1000,
            tap_us: config.timing.tap_ms * 1000,
            move_sq: u64::from(move_units) * u64::from(move_units),
            swipe_units,
            cancel_on_drag: config.gestures.cancel_on_drag,
        };

        Self {
            side: device.side,
            profile: DecoderProfile::select(device.profile, device.usage_page),
            traits,
            frame: Frame::new(device.side),
            tracker: SessionTracker::new(
                config.session.pool_size,
                config.match_threshold_units(upm),
                config.timing.stale_ms * 1000,
                ids,
            ),
            probe: PressureProbe::new(device.pressure_unsupported),
            engine: IntentProcessor::new(device.side, params, gestures, gesture_actions(config)),
            events: SessionEvents::new(),
        }
    }
}

fn gesture_actions(config: &Config) -> GestureActions {
    let mut actions = GestureActions {
        two_finger_tap: config.gestures.two_finger_tap,
        three_finger_tap: config.gestures.three_finger_tap,
        swipes: Default::default(),
    };
    for swipe in &config.gestures.swipes {
        let keys: Vec<KeyCode> = swipe
            .chord
            .iter()
            .filter_map(|name| KeyCode::from_name(name))
            .collect();
        if keys.len() == swipe.chord.len() {
            actions.swipes.insert((swipe.fingers, swipe.direction), keys);
        } else {
            warn!("swipe binding with unknown key names ignored: {:?}", swipe.chord);
        }
    }
    actions
}

/// Running pipeline. Stops and joins all threads on shutdown (or drop).
pub struct Runtime {
    control: Arc<Control>,
    ring: Arc<ReportRing>,
    readers: Vec<RawReader>,
    pump: Option<JoinHandle<()>>,
    adapter: Option<JoinHandle<()>>,
}

impl Runtime {
    /// Build the pipeline from the current config and start all threads.
    pub fn start(manager: Arc<ConfigManager>, sink: Box<dyn DispatchSink>) -> Result<Self> {
        let config = manager.config();
        let clock = MonotonicClock::default();
        let ring = Arc::new(ReportRing::new(RING_CAPACITY));
        let (tx, rx) = queue(DISPATCH_CAPACITY);

        let control = Arc::new(Control {
            mode: RwLock::new(config.mode),
            manager,
            counters: Counters::default(),
            observers: ObserverHub::default(),
            stop: AtomicBool::new(false),
        });

        let ids = StableIdSource::default();
        let sides: Vec<SideState> = config
            .devices
            .iter()
            .map(|dev| SideState::new(&config, dev, ids.clone()))
            .collect();
        if sides.is_empty() {
            warn!("no devices configured; pipeline will idle");
        }

        let mut readers = Vec::new();
        for device in &config.devices {
            match RawReader::spawn(&device.path, device.side, ring.clone(), clock) {
                Ok(reader) => readers.push(reader),
                Err(e) => error!("skipping {}: {e:#}", device.path.display()),
            }
        }

        let adapter = start_adapter(rx, sink);
        let pump = {
            let control = control.clone();
            let ring = ring.clone();
            thread::Builder::new()
                .name("g2k-pump".into())
                .spawn(move || pump_loop(sides, &control, &ring, &tx, clock))?
        };

        Ok(Self {
            control,
            ring,
            readers,
            pump: Some(pump),
            adapter: Some(adapter),
        })
    }

    #[must_use]
    pub fn control(&self) -> Arc<Control> {
        self.control.clone()
    }

    pub fn set_mode(&self, mode: RuntimeMode) {
        *self.control.mode.write() = mode;
        info!("runtime mode set to {mode:?}");
    }

    #[must_use]
    pub fn snapshot(&self) -> Arc<RuntimeSnapshot> {
        self.control.observers.latest()
    }

    /// Stop readers, let the pump close open sessions, drain the adapter.
    pub fn shutdown(&mut self) {
        self.control.stop.store(true, Ordering::Relaxed);
        for reader in &mut self.readers {
            reader.stop();
        }
        self.ring.close();
        if let Some(handle) = self.pump.take() {
            let _ = handle.join();
        }
        if let Some(handle) = self.adapter.take() {
            let _ = handle.join();
        }
        info!("runtime stopped");
    }
}

impl Drop for Runtime {
    fn drop(&mut self) {
        if self.pump.is_some() {
            self.shutdown();
        }
    }
}

fn pump_loop(
    mut sides: Vec<SideState>,
    control: &Control,
    ring: &ReportRing,
    tx: &DispatchQueue,
    clock: MonotonicClock,
) {
    let mut stack = LayerStack::new();
    let mut haptics = {
        let config = control.manager.config();
        HapticGate::new(config.haptics.on_keytap, config.haptics.min_interval_ms * 1000)
    };
    let mut faults = FaultWindow::new(32, Duration::from_secs(5), Duration::from_secs(2));

    loop {
        if control.stop.load(Ordering::Relaxed) {
            break;
        }
        match ring.pop_timeout(IDLE_TICK) {
            Some(report) => {
                let now = report.timestamp_us;
                if faults.is_paused(now) {
                    continue;
                }
                process_report(&report, &mut sides, control, &mut stack, &mut haptics, tx, &mut faults);
                publish(control, &sides, &stack, ring, tx);
            }
            None => {
                if ring.is_closed() {
                    break;
                }
                // Idle: force-close sessions from devices that went silent.
                let now = clock.now_us();
                let mut swept = false;
                for side in &mut sides {
                    side.events.clear();
                    side.tracker.sweep_stale(now, &mut side.events);
                    if side.events.is_empty() {
                        continue;
                    }
                    swept = true;
                    step_engine(side, now, control, &mut stack, &mut haptics, tx);
                }
                if swept {
                    publish(control, &sides, &stack, ring, tx);
                }
            }
        }
    }

    // Close whatever is still open so no key outlives the pipeline.
    let now = clock.now_us();
    for side in &mut sides {
        side.events.clear();
        side.tracker.close_all(&mut side.events);
        if !side.events.is_empty() {
            step_engine(side, now, control, &mut stack, &mut haptics, tx);
        }
    }
    tx.close();
    info!("pump thread exiting");
}

#[allow(clippy::too_many_arguments)]
fn process_report(
    report: &RawReport,
    sides: &mut [SideState],
    control: &Control,
    stack: &mut LayerStack,
    haptics: &mut HapticGate,
    tx: &DispatchQueue,
    faults: &mut FaultWindow,
) {
    let Some(side) = sides.iter_mut().find(|s| s.side == report.side) else {
        return;
    };
    control.counters.frames.fetch_add(1, Ordering::Relaxed);

    match parse_report(&report.data, &mut side.frame) {
        Ok(()) => {}
        Err(ReportError::ShortBuffer { .. }) => {
            control.counters.short_buffers.fetch_add(1, Ordering::Relaxed);
            faults.record(report.timestamp_us, "short buffer");
            return;
        }
        // Other report types share the node; not a fault.
        Err(ReportError::UnknownReportId(_)) => return,
    }
    side.frame.timestamp_us = report.timestamp_us;
    side.frame.side = report.side;

    let dropped = profile::normalize(side.profile, &side.traits, &mut side.frame);
    if dropped > 0 {
        control
            .counters
            .decoder_faults
            .fetch_add(u64::from(dropped), Ordering::Relaxed);
        faults.record(report.timestamp_us, "malformed slot");
    }

    side.events.clear();
    let pool_faults_before = side.tracker.pool_faults;
    side.tracker.advance(&side.frame, &mut side.events);
    let new_pool_faults = side.tracker.pool_faults - pool_faults_before;
    if new_pool_faults > 0 {
        control.counters.pool_faults.fetch_add(new_pool_faults, Ordering::Relaxed);
        faults.record(report.timestamp_us, "session pool exhausted");
    }

    for ev in &side.events {
        match *ev {
            SessionEvent::Opened { stable_id, pressure, .. }
            | SessionEvent::Moved { stable_id, pressure, .. } => {
                side.probe.observe(stable_id, pressure);
            }
            SessionEvent::Closed { .. } => {}
        }
    }

    let now = report.timestamp_us;
    step_engine(side, now, control, stack, haptics, tx);
}

fn step_engine(
    side: &mut SideState,
    now_us: u64,
    control: &Control,
    stack: &mut LayerStack,
    haptics: &mut HapticGate,
    tx: &DispatchQueue,
) {
    let keymap = control.manager.keymap();
    let mode = *control.mode.read();
    let mut ctx = EngineCtx {
        stack,
        keymap: keymap.as_ref(),
        queue: tx,
        mode,
        haptics,
    };
    let events = std::mem::take(&mut side.events);
    side.engine.step(&events, now_us, &mut ctx);
    side.events = events;
}

fn publish(
    control: &Control,
    sides: &[SideState],
    stack: &LayerStack,
    ring: &ReportRing,
    tx: &DispatchQueue,
) {
    let views = sides
        .iter()
        .map(|s| SideView {
            side: s.side,
            pressure: s.probe.state(),
            touches: s
                .engine
                .touches()
                .map(|(id, rec)| TouchView {
                    stable_id: *id,
                    x_norm: f32::from(rec.x) / s.traits.max_x as f32,
                    y_norm: f32::from(rec.y) / s.traits.max_y as f32,
                    phase: phase_name(rec.phase),
                })
                .collect(),
        })
        .collect();

    control.observers.publish(RuntimeSnapshot {
        mode: *control.mode.read(),
        layers: stack.snapshot(),
        sides: views,
        counters: control.counters.view(ring, tx),
    });
}

const fn phase_name(phase: TouchPhase) -> &'static str {
    match phase {
        TouchPhase::Nascent => "nascent",
        TouchPhase::MouseCandidate => "mouse-candidate",
        TouchPhase::MouseActive => "mouse-active",
        TouchPhase::KeyActive => "key-active",
    }
}
