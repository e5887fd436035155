//! Configuration management.
//!
//! This module provides:
//! - TOML-based configuration with logical sections
//! - Atomic file writes (write to temp, then rename)
//! - Section-level updates (only changed section is modified)
//! - Automatic defaults for missing fields
//!
//! # Example
//!
//! ```no_run
//! use kmp_core::config::{ConfigManager, ConfigSection};
//! use kmp_core::models::DevicePreference;
//!
//! let mut config = ConfigManager::new(".config/kmp.toml");
//! config.load_or_create().unwrap();
//!
//! println!("Output folder: {}", config.settings().paths.output_folder);
//!
//! config.settings_mut().processing.device = DevicePreference::General;
//! config.update_section(ConfigSection::Processing).unwrap();
//! ```

mod manager;
mod settings;

pub use manager::{ConfigError, ConfigManager, ConfigResult};
pub use settings::{
    ConfigSection, DownloadSettings, LoggingSettings, PathSettings, ProcessingSettings, Settings,
    SubtitleSettings, ToolSettings,
};
