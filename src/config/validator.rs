//! Config and keymap validation for the `validate` subcommand.

use std::path::Path;

use anyhow::{bail, Context, Result};

use super::config::Config;
use super::keymap_file::load_keymap;
use crate::report::Side;

/// Validate a config file (and the keymap it references). Returns the list
/// of non-fatal warnings.
pub fn validate_config(path: Option<&Path>) -> Result<Vec<String>> {
    let config_path = match path {
        Some(p) => p.to_path_buf(),
        None => Config::default_path()?,
    };
    let config = Config::load(&config_path)
        .with_context(|| format!("config {} failed to load", config_path.display()))?;

    let mut warnings = Vec::new();

    if config.timing.start_ms == 0 || config.timing.start_ms > 200 {
        bail!("timing.start_ms must be in 1..=200");
    }
    if config.timing.tap_ms <= config.timing.start_ms {
        bail!("timing.tap_ms must exceed timing.start_ms");
    }
    if config.timing.hold_ms < config.timing.tap_ms {
        warnings.push("timing.hold_ms below timing.tap_ms: holds resolve before taps end".into());
    }
    if config.timing.stale_ms < config.timing.tap_ms {
        warnings.push("timing.stale_ms below timing.tap_ms: long taps may be force-closed".into());
    }
    if !(0.5..=20.0).contains(&config.distance.move_mm) {
        bail!("distance.move_mm must be in 0.5..=20");
    }
    if config.distance.swipe_mm <= config.distance.move_mm {
        bail!("distance.swipe_mm must exceed distance.move_mm");
    }
    if config.distance.pointer_divisor < 1 {
        bail!("distance.pointer_divisor must be at least 1");
    }
    if config.session.pool_size < 6 {
        bail!("session.pool_size must be at least 6 (device max contacts plus headroom)");
    }

    if config.devices.is_empty() {
        warnings.push("no [[device]] entries: the daemon will idle".into());
    }
    for side in [Side::Left, Side::Right] {
        let count = config.devices.iter().filter(|d| d.side == side).count();
        if count > 1 {
            bail!("more than one device configured for side {side}");
        }
    }
    for dev in &config.devices {
        if dev.max_x == 0 || dev.max_y == 0 {
            bail!("device {}: max_x/max_y must be non-zero", dev.path.display());
        }
        if dev.width_mm <= 0.0 || dev.height_mm <= 0.0 {
            bail!("device {}: physical dimensions must be positive", dev.path.display());
        }
    }

    for swipe in &config.gestures.swipes {
        if !(2..=5).contains(&swipe.fingers) {
            bail!("gesture swipe: fingers must be in 2..=5");
        }
        for name in &swipe.chord {
            if crate::keycode::KeyCode::from_name(name).is_none() {
                bail!("gesture swipe: unknown key name {name:?}");
            }
        }
    }

    let keymap_path = config.keymap_path(&config_path);
    if keymap_path.exists() {
        load_keymap(&keymap_path, &config.layout)
            .with_context(|| format!("keymap {} failed to load", keymap_path.display()))?;
    } else {
        warnings.push(format!("keymap file {} does not exist", keymap_path.display()));
    }

    Ok(warnings)
}
