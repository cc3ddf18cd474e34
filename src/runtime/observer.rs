//! Snapshot publication for UI observers.
//!
//! The pump publishes an immutable snapshot after each frame; the
//! visualizer, tray, and status command read the latest complete one on
//! their own threads. Readers clone an `Arc` under a read lock, so the
//! pump is never blocked for longer than the pointer swap.

use std::sync::Arc;

use parking_lot::RwLock;
use serde::Serialize;

use crate::engine::RuntimeMode;
use crate::pressure::PressureSupport;
use crate::report::Side;

/// One open touch as observers see it.
#[derive(Debug, Clone, Serialize)]
pub struct TouchView {
    pub stable_id: u64,
    pub x_norm: f32,
    pub y_norm: f32,
    pub phase: &'static str,
}

#[derive(Debug, Clone, Serialize)]
pub struct SideView {
    pub side: Side,
    pub touches: Vec<TouchView>,
    pub pressure: PressureSupport,
}

/// Counter totals carried on every snapshot.
#[derive(Debug, Clone, Copy, Default, Serialize, serde::Deserialize)]
pub struct CounterView {
    pub frames: u64,
    pub short_buffers: u64,
    pub decoder_faults: u64,
    pub pool_faults: u64,
    pub ingest_dropped: u64,
    pub motion_dropped: u64,
    pub forced_keyups: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct RuntimeSnapshot {
    pub mode: RuntimeMode,
    /// Active layer stack, base first.
    pub layers: Vec<u8>,
    pub sides: Vec<SideView>,
    pub counters: CounterView,
}

impl Default for RuntimeSnapshot {
    fn default() -> Self {
        Self {
            mode: RuntimeMode::Mixed,
            layers: vec![0],
            sides: Vec::new(),
            counters: CounterView::default(),
        }
    }
}

/// Single-writer, multi-reader snapshot cell.
pub struct ObserverHub {
    latest: RwLock<Arc<RuntimeSnapshot>>,
}

impl Default for ObserverHub {
    fn default() -> Self {
        Self {
            latest: RwLock::new(Arc::new(RuntimeSnapshot::default())),
        }
    }
}

impl ObserverHub {
    pub fn publish(&self, snapshot: RuntimeSnapshot) {
        *self.latest.write() = Arc::new(snapshot);
    }

    #[must_use]
    pub fn latest(&self) -> Arc<RuntimeSnapshot> {
        self.latest.read().clone()
    }
}
