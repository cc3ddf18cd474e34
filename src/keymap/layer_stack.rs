//! Active layer bookkeeping.
//!
//! The stack is a small ordered set of layer indices. Base (0) is always
//! present. Momentary layers are pushed while their source touch is held
//! and popped on its release; a toggle replaces everything above base on
//! release of its source touch.

use crate::report::Side;

/// Lifecycle identity of one touch: the side it lives on and the session's
/// stable id. Raw contact ids never appear here.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TouchKey {
    pub side: Side,
    pub stable_id: u64,
}

#[derive(Debug, Clone)]
pub struct LayerStack {
    layers: Vec<u8>,
    /// Momentary holds: (owner, layer). At most one per owner.
    momentary: Vec<(TouchKey, u8)>,
}

impl Default for LayerStack {
    fn default() -> Self {
        Self::new()
    }
}

impl LayerStack {
    #[must_use]
    pub fn new() -> Self {
        Self {
            layers: vec![0],
            momentary: Vec::new(),
        }
    }

    /// Layers from top of stack to base, the resolution order.
    pub fn top_down(&self) -> impl Iterator<Item = u8> + '_ {
        self.layers.iter().rev().copied()
    }

    #[must_use]
    pub fn current(&self) -> u8 {
        *self.layers.last().unwrap_or(&0)
    }

    /// Snapshot for observers and per-touch commit records.
    #[must_use]
    pub fn snapshot(&self) -> Vec<u8> {
        self.layers.clone()
    }

    /// Push a momentary layer owned by `owner`. A second momentary from the
    /// same owner is ignored.
    pub fn push_momentary(&mut self, owner: TouchKey, layer: u8) {
        if self.momentary.iter().any(|(o, _)| *o == owner) {
            return;
        }
        self.momentary.push((owner, layer));
        if !self.layers.contains(&layer) {
            self.layers.push(layer);
        }
    }

    /// Pop the momentary layer owned by `owner`, if any. The layer leaves
    /// the stack only when no other owner still holds it.
    pub fn pop_momentary(&mut self, owner: TouchKey) {
        let Some(pos) = self.momentary.iter().position(|(o, _)| *o == owner) else {
            return;
        };
        let (_, layer) = self.momentary.remove(pos);
        if layer != 0 && !self.momentary.iter().any(|(_, l)| *l == layer) {
            self.layers.retain(|l| *l != layer);
        }
    }

    /// Replace everything above base with a single target layer.
    pub fn toggle_to(&mut self, layer: u8) {
        self.layers.clear();
        self.layers.push(0);
        if layer != 0 {
            self.layers.push(layer);
        }
        self.momentary.clear();
    }

    /// Whether any momentary layer is currently held. Momentary holds
    /// bypass the runtime mode restrictions.
    #[must_use]
    pub fn momentary_held(&self) -> bool {
        !self.momentary.is_empty()
    }

    #[must_use]
    pub fn owns_momentary(&self, owner: TouchKey) -> bool {
        self.momentary.iter().any(|(o, _)| *o == owner)
    }
}
