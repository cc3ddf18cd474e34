//! Layered keymap and point resolution.
//!
//! Both physical surfaces mirror into one logical keymap. A binding lives at
//! (side, layer, row, col) on a uniform grid, or in a free-form custom
//! region checked before the grid. Resolution walks the active layer stack
//! top-down and returns the first hit; a miss is `NoOp`, never an error.
//! The whole structure is immutable once built and swapped wholesale.

pub mod layer_stack;
pub mod layout;

pub use layer_stack::{LayerStack, TouchKey};
pub use layout::{GridDims, NormalizedRect};

use std::collections::HashMap;

use crate::keycode::KeyCode;
use crate::report::Side;

/// What a key position does when committed.
#[derive(Debug, Clone, PartialEq)]
pub enum KeyBinding {
    /// Type a character (shift synthesized by the sink when needed).
    Char(char),
    /// Press/release a keycode directly.
    Key(KeyCode),
    /// Hold a modifier mask for the duration of the touch.
    Modifier(u8),
    /// Momentary layer: active while the source touch is held.
    MomentaryLayer(u8),
    /// Toggle layer: replaces the stack on source touch release.
    ToggleLayer(u8),
    /// Press/release a mouse button.
    Mouse(MouseButton),
    /// Tap out a key sequence.
    Chord(Vec<KeyCode>),
    NoOp,
}

impl KeyBinding {
    /// Bindings that produce dispatch events when committed, as opposed to
    /// the layer operations handled inside the engine.
    #[must_use]
    pub const fn dispatches(&self) -> bool {
        !matches!(
            self,
            Self::MomentaryLayer(_) | Self::ToggleLayer(_) | Self::NoOp
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MouseButton {
    Left,
    Right,
    Middle,
}

/// Free-form button on top of the grid.
#[derive(Debug, Clone, PartialEq)]
pub struct CustomButton {
    pub id: String,
    pub rect: NormalizedRect,
    pub binding: KeyBinding,
}

/// One (side, layer) page: grid extents, grid bindings, custom buttons in
/// declared order.
#[derive(Debug, Clone, Default)]
struct Page {
    dims: Option<GridDims>,
    grid: HashMap<(u8, u8), KeyBinding>,
    custom: Vec<CustomButton>,
}

/// Immutable layered keymap for one layout.
#[derive(Debug, Clone, Default)]
pub struct Keymap {
    pub layout_name: String,
    pages: HashMap<(Side, u8), Page>,
}

impl Keymap {
    #[must_use]
    pub fn new(layout_name: impl Into<String>) -> Self {
        Self {
            layout_name: layout_name.into(),
            pages: HashMap::new(),
        }
    }

    /// Insert a grid binding, growing the page's grid extents to cover it.
    pub fn insert(&mut self, side: Side, layer: u8, row: u8, col: u8, binding: KeyBinding) {
        let page = self.pages.entry((side, layer)).or_default();
        let dims = page.dims.get_or_insert(GridDims { rows: 0, cols: 0 });
        dims.rows = dims.rows.max(row.saturating_add(1));
        dims.cols = dims.cols.max(col.saturating_add(1));
        page.grid.insert((row, col), binding);
    }

    /// Append a custom button; declared order is resolution order.
    pub fn insert_custom(&mut self, side: Side, layer: u8, button: CustomButton) {
        self.pages.entry((side, layer)).or_default().custom.push(button);
    }

    /// Resolve a normalized point under the given layer stack. Custom
    /// buttons are checked before the grid on each layer; the stack is
    /// walked top-down; the first binding wins; absence is NoOp.
    #[must_use]
    pub fn resolve(&self, side: Side, x: f32, y: f32, stack: &LayerStack) -> KeyBinding {
        for layer in stack.top_down() {
            if let Some(binding) = self.resolve_on_layer(side, x, y, layer) {
                return binding;
            }
        }
        KeyBinding::NoOp
    }

    /// Resolve against a saved stack snapshot instead of the live stack.
    #[must_use]
    pub fn resolve_snapshot(&self, side: Side, x: f32, y: f32, snapshot: &[u8]) -> KeyBinding {
        for layer in snapshot.iter().rev() {
            if let Some(binding) = self.resolve_on_layer(side, x, y, *layer) {
                return binding;
            }
        }
        KeyBinding::NoOp
    }

    fn resolve_on_layer(&self, side: Side, x: f32, y: f32, layer: u8) -> Option<KeyBinding> {
        let page = self.pages.get(&(side, layer))?;
        for button in &page.custom {
            if button.rect.contains(x, y) {
                return Some(button.binding.clone());
            }
        }
        let (row, col) = page.dims?.hit(x, y)?;
        page.grid.get(&(row, col)).cloned()
    }

    /// Grid extents of a page, if it has grid bindings.
    #[must_use]
    pub fn dims(&self, side: Side, layer: u8) -> Option<GridDims> {
        self.pages.get(&(side, layer)).and_then(|p| p.dims)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.pages.is_empty()
    }
}
