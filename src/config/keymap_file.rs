//! Keymap text-format loader.
//!
//! One binding per line, whitespace-separated fields:
//!
//! ```text
//! # layout  side   layer  row  col  binding
//! default   right  0      1    3    CHAR:k
//! default   right  0      0    0    MO:1
//! default   right  1      1    3    CHAR:2
//! default   left   0      2    5    CUSTOM:thumb:0.4:0.8:0.2:0.2:KC:spc
//! ```
//!
//! Binding specs: `CHAR:x`, `KC:name`, `MOD:spec` (decimal mask or
//! `+`-joined modifier names), `MO:n`, `TO:n`, `MOUSE:btn`, `CHORD:seq`
//! (`+`-joined key names), `NOOP`. `CUSTOM:id:x:y:w:h:spec` wraps any of
//! them in a free-form rectangle; its row/col fields are ignored.

use std::path::Path;

use crate::keycode::{modmask, KeyCode};
use crate::keymap::{CustomButton, KeyBinding, Keymap, MouseButton, NormalizedRect};
use crate::report::Side;

#[derive(Debug, thiserror::Error)]
pub enum KeymapFileError {
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
    #[error("line {line}: expected 6 fields, got {got}")]
    FieldCount { line: usize, got: usize },
    #[error("line {line}: unknown side {side:?}")]
    BadSide { line: usize, side: String },
    #[error("line {line}: bad number in {field}")]
    BadNumber { line: usize, field: &'static str },
    #[error("line {line}: unknown key name {name:?}")]
    BadKeyName { line: usize, name: String },
    #[error("line {line}: bad binding spec {spec:?}")]
    BadBinding { line: usize, spec: String },
    #[error("no bindings for layout {0:?}")]
    EmptyLayout(String),
}

/// Load one layout from a keymap file. Lines for other layouts are
/// skipped; `#` starts a comment.
pub fn load_keymap(path: &Path, layout: &str) -> Result<Keymap, KeymapFileError> {
    let content = std::fs::read_to_string(path)?;
    parse_keymap(&content, layout)
}

pub fn parse_keymap(content: &str, layout: &str) -> Result<Keymap, KeymapFileError> {
    let mut keymap = Keymap::new(layout);

    for (idx, raw) in content.lines().enumerate() {
        let line = idx + 1;
        let text = raw.split('#').next().unwrap_or("").trim();
        if text.is_empty() {
            continue;
        }
        let fields: Vec<&str> = text.split_whitespace().collect();
        if fields.len() != 6 {
            return Err(KeymapFileError::FieldCount { line, got: fields.len() });
        }
        if fields[0] != layout {
            continue;
        }

        let side = parse_side(fields[1])
            .ok_or_else(|| KeymapFileError::BadSide { line, side: fields[1].to_string() })?;
        let layer = parse_u8(fields[2], line, "layer")?;

        if let Some(rest) = fields[5].strip_prefix("CUSTOM:") {
            let button = parse_custom(rest, line)?;
            keymap.insert_custom(side, layer, button);
        } else {
            let row = parse_u8(fields[3], line, "row")?;
            let col = parse_u8(fields[4], line, "col")?;
            let binding = parse_binding(fields[5], line)?;
            keymap.insert(side, layer, row, col, binding);
        }
    }

    if keymap.is_empty() {
        return Err(KeymapFileError::EmptyLayout(layout.to_string()));
    }
    Ok(keymap)
}

fn parse_side(s: &str) -> Option<Side> {
    match s.to_ascii_lowercase().as_str() {
        "left" => Some(Side::Left),
        "right" => Some(Side::Right),
        _ => None,
    }
}

fn parse_u8(s: &str, line: usize, field: &'static str) -> Result<u8, KeymapFileError> {
    s.parse().map_err(|_| KeymapFileError::BadNumber { line, field })
}

fn parse_f32(s: &str, line: usize, field: &'static str) -> Result<f32, KeymapFileError> {
    s.parse().map_err(|_| KeymapFileError::BadNumber { line, field })
}

fn parse_custom(rest: &str, line: usize) -> Result<CustomButton, KeymapFileError> {
    // id : x : y : w : h : binding-spec (the spec itself may contain ':').
    let parts: Vec<&str> = rest.splitn(6, ':').collect();
    if parts.len() != 6 {
        return Err(KeymapFileError::BadBinding { line, spec: format!("CUSTOM:{rest}") });
    }
    Ok(CustomButton {
        id: parts[0].to_string(),
        rect: NormalizedRect {
            x: parse_f32(parts[1], line, "custom x")?,
            y: parse_f32(parts[2], line, "custom y")?,
            w: parse_f32(parts[3], line, "custom w")?,
            h: parse_f32(parts[4], line, "custom h")?,
        },
        binding: parse_binding(parts[5], line)?,
    })
}

fn parse_binding(spec: &str, line: usize) -> Result<KeyBinding, KeymapFileError> {
    if spec == "NOOP" {
        return Ok(KeyBinding::NoOp);
    }
    let (tag, arg) = spec
        .split_once(':')
        .ok_or_else(|| KeymapFileError::BadBinding { line, spec: spec.to_string() })?;
    match tag {
        "CHAR" => {
            let mut chars = arg.chars();
            match (chars.next(), chars.next()) {
                (Some(c), None) => Ok(KeyBinding::Char(c)),
                _ => Err(KeymapFileError::BadBinding { line, spec: spec.to_string() }),
            }
        }
        "KC" => KeyCode::from_name(arg)
            .map(KeyBinding::Key)
            .ok_or_else(|| KeymapFileError::BadKeyName { line, name: arg.to_string() }),
        "MOD" => parse_modmask(arg, line).map(KeyBinding::Modifier),
        "MO" => Ok(KeyBinding::MomentaryLayer(parse_u8(arg, line, "MO layer")?)),
        "TO" => Ok(KeyBinding::ToggleLayer(parse_u8(arg, line, "TO layer")?)),
        "MOUSE" => match arg.to_ascii_lowercase().as_str() {
            "left" => Ok(KeyBinding::Mouse(MouseButton::Left)),
            "right" => Ok(KeyBinding::Mouse(MouseButton::Right)),
            "middle" => Ok(KeyBinding::Mouse(MouseButton::Middle)),
            _ => Err(KeymapFileError::BadBinding { line, spec: spec.to_string() }),
        },
        "CHORD" => {
            let keys = arg
                .split('+')
                .map(|name| {
                    KeyCode::from_name(name)
                        .ok_or_else(|| KeymapFileError::BadKeyName { line, name: name.to_string() })
                })
                .collect::<Result<Vec<_>, _>>()?;
            if keys.is_empty() {
                return Err(KeymapFileError::BadBinding { line, spec: spec.to_string() });
            }
            Ok(KeyBinding::Chord(keys))
        }
        _ => Err(KeymapFileError::BadBinding { line, spec: spec.to_string() }),
    }
}

fn parse_modmask(arg: &str, line: usize) -> Result<u8, KeymapFileError> {
    if let Ok(mask) = arg.parse::<u8>() {
        return Ok(mask);
    }
    let mut mask = 0u8;
    for name in arg.split('+') {
        mask |= match name.to_ascii_uppercase().as_str() {
            "LCTL" => modmask::LCTL,
            "LSFT" => modmask::LSFT,
            "LALT" => modmask::LALT,
            "LGUI" => modmask::LGUI,
            "RCTL" => modmask::RCTL,
            "RSFT" => modmask::RSFT,
            "RALT" => modmask::RALT,
            "RGUI" => modmask::RGUI,
            _ => {
                return Err(KeymapFileError::BadKeyName { line, name: name.to_string() });
            }
        };
    }
    Ok(mask)
}
