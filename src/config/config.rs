use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::engine::{RuntimeMode, SwipeDirection};
use crate::report::{ProfileHint, Side};

/// Classification timing knobs, milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimingConfig {
    /// Candidate-buffer window before a still touch commits as a key.
    pub start_ms: u64,
    /// Brief-tap lifetime bound.
    pub tap_ms: u64,
    /// Hold re-resolution threshold.
    pub hold_ms: u64,
    /// Window within which gesture fingers must all land.
    pub gesture_ms: u64,
    /// Sessions unseen longer than this are force-closed.
    pub stale_ms: u64,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            start_ms: 20,
            tap_ms: 180,
            hold_ms: 250,
            gesture_ms: 30,
            stale_ms: 170,
        }
    }
}

/// Distance knobs. Millimeters are converted to device units per device.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DistanceConfig {
    pub move_mm: f32,
    pub swipe_mm: f32,
    /// Nearest-position match threshold in device units; 0 derives it from
    /// `move_mm` (4x, roughly 12 mm on current surfaces).
    pub match_threshold_units: u32,
    /// Device units per emitted pointer count.
    pub pointer_divisor: i32,
}

impl Default for DistanceConfig {
    fn default() -> Self {
        Self {
            move_mm: 3.0,
            swipe_mm: 18.0,
            match_threshold_units: 0,
            pointer_divisor: 8,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Session pool size per side.
    pub pool_size: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self { pool_size: 10 }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HapticsConfig {
    /// Tag KeyDown events for the actuator.
    pub on_keytap: bool,
    pub min_interval_ms: u64,
}

impl Default for HapticsConfig {
    fn default() -> Self {
        Self { on_keytap: true, min_interval_ms: 50 }
    }
}

/// One swipe gesture binding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SwipeBinding {
    pub fingers: u8,
    pub direction: SwipeDirection,
    /// Key names tapped as a chord, e.g. ["KC_LALT", "KC_LEFT"].
    pub chord: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GestureConfig {
    /// Mouse button for a two-finger tap ("left" | "right" | "middle"),
    /// empty disables.
    pub two_finger_tap: Option<crate::keymap::MouseButton>,
    pub three_finger_tap: Option<crate::keymap::MouseButton>,
    pub cancel_on_drag: bool,
    #[serde(rename = "swipe")]
    pub swipes: Vec<SwipeBinding>,
}

impl Default for GestureConfig {
    fn default() -> Self {
        Self {
            two_finger_tap: Some(crate::keymap::MouseButton::Right),
            three_finger_tap: Some(crate::keymap::MouseButton::Middle),
            cancel_on_drag: true,
            swipes: Vec::new(),
        }
    }
}

/// One physical surface.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceConfig {
    /// hidraw node, e.g. /dev/hidraw3.
    pub path: PathBuf,
    pub side: Side,
    #[serde(default)]
    pub profile: ProfileHint,
    /// HID usage page the device enumerated with; used by profile Auto.
    #[serde(default)]
    pub usage_page: u16,
    #[serde(default)]
    pub pressure_unsupported: bool,
    #[serde(default = "default_width_mm")]
    pub width_mm: f32,
    #[serde(default = "default_height_mm")]
    pub height_mm: f32,
    #[serde(default = "default_max_x")]
    pub max_x: u32,
    #[serde(default = "default_max_y")]
    pub max_y: u32,
}

fn default_width_mm() -> f32 {
    110.0
}
fn default_height_mm() -> f32 {
    76.0
}
fn default_max_x() -> u32 {
    crate::report::profile::OFFICIAL_MAX_X
}
fn default_max_y() -> u32 {
    crate::report::profile::OFFICIAL_MAX_Y
}

/// Main configuration structure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub mode: RuntimeMode,
    /// Keymap file, relative to the config directory unless absolute.
    pub keymap_file: PathBuf,
    /// Layout name selected from the keymap file.
    pub layout: String,
    pub hot_reload: bool,
    pub timing: TimingConfig,
    pub distance: DistanceConfig,
    pub session: SessionConfig,
    pub haptics: HapticsConfig,
    pub gestures: GestureConfig,
    #[serde(rename = "device")]
    pub devices: Vec<DeviceConfig>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            mode: RuntimeMode::Mixed,
            keymap_file: PathBuf::from("keymap.txt"),
            layout: "default".to_string(),
            hot_reload: true,
            timing: TimingConfig::default(),
            distance: DistanceConfig::default(),
            session: SessionConfig::default(),
            haptics: HapticsConfig::default(),
            gestures: GestureConfig::default(),
            devices: Vec::new(),
        }
    }
}

impl Config {
    /// Load config from a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config {}", path.display()))?;
        let config: Self = toml::from_str(&content)
            .with_context(|| format!("failed to parse config {}", path.display()))?;
        Ok(config)
    }

    /// Save config to a TOML file.
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self)?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Default config path under the user config directory.
    pub fn default_path() -> Result<PathBuf> {
        let config_dir =
            dirs::config_dir().ok_or_else(|| anyhow::anyhow!("no config directory"))?;
        Ok(config_dir.join("glasstokey").join("glasstokey.toml"))
    }

    /// Load from `path` or the default location, falling back to defaults
    /// when no file exists yet.
    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        let path = match path {
            Some(p) => p.to_path_buf(),
            None => Self::default_path()?,
        };
        if path.exists() {
            Self::load(&path)
        } else {
            Ok(Self::default())
        }
    }

    /// Resolve the keymap file path against the config directory.
    pub fn keymap_path(&self, config_path: &Path) -> PathBuf {
        if self.keymap_file.is_absolute() {
            self.keymap_file.clone()
        } else {
            config_path
                .parent()
                .unwrap_or_else(|| Path::new("."))
                .join(&self.keymap_file)
        }
    }

    /// Nearest-position threshold in device units for a device: explicit
    /// override, or 4x the motion threshold.
    #[must_use]
    pub fn match_threshold_units(&self, units_per_mm: f32) -> u32 {
        if self.distance.match_threshold_units > 0 {
            self.distance.match_threshold_units
        } else {
            (self.distance.move_mm * 4.0 * units_per_mm) as u32
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let c = Config::default();
        assert_eq!(c.timing.start_ms, 20);
        assert_eq!(c.timing.tap_ms, 180);
        assert_eq!(c.timing.hold_ms, 250);
        assert_eq!(c.timing.stale_ms, 170);
        assert_eq!(c.session.pool_size, 10);
        assert_eq!(c.mode, RuntimeMode::Mixed);
    }

    #[test]
    fn toml_round_trip() {
        let mut c = Config::default();
        c.devices.push(DeviceConfig {
            path: PathBuf::from("/dev/hidraw3"),
            side: Side::Left,
            profile: ProfileHint::Official,
            usage_page: 0xFF00,
            pressure_unsupported: true,
            width_mm: 110.0,
            height_mm: 76.0,
            max_x: 14_720,
            max_y: 10_240,
        });
        let text = toml::to_string_pretty(&c).unwrap();
        let back: Config = toml::from_str(&text).unwrap();
        assert_eq!(back, c);
    }

    #[test]
    fn partial_toml_fills_defaults() {
        let c: Config = toml::from_str("mode = \"keyboard-only\"\n").unwrap();
        assert_eq!(c.mode, RuntimeMode::KeyboardOnly);
        assert_eq!(c.timing.tap_ms, 180);
    }

    #[test]
    fn threshold_derivation() {
        let c = Config::default();
        // 3 mm * 4 at ~134 units/mm.
        let t = c.match_threshold_units(134.0);
        assert!((1500..1750).contains(&t), "got {t}");

        let mut c = Config::default();
        c.distance.match_threshold_units = 999;
        assert_eq!(c.match_threshold_units(134.0), 999);
    }
}
