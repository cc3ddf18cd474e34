pub mod config;
pub mod config_manager;
pub mod keymap_file;
pub mod validator;

pub use config::{
    Config, DeviceConfig, DistanceConfig, GestureConfig, HapticsConfig, SessionConfig,
    SwipeBinding, TimingConfig,
};
pub use config_manager::ConfigManager;
pub use keymap_file::{load_keymap, parse_keymap, KeymapFileError};
pub use validator::validate_config;
