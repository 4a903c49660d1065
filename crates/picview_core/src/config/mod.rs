//! Configuration management for picview.
//!
//! Settings live in one TOML file split into tables (`ui`, `lockdown`,
//! `slideshow`, `queue`, `paths`, `logging`). Missing keys fall back to
//! defaults; a window picks up edits through
//! [`WindowController::reload_settings`](crate::window::WindowController::reload_settings).
//!
//! # Example
//!
//! ```no_run
//! use picview_core::config::{ConfigManager, ConfigSection};
//!
//! let mut config = ConfigManager::new(".config/picview.toml");
//! config.load_or_create().unwrap();
//!
//! // Lock down saving and persist just that section
//! config.settings_mut().lockdown.disable_save = true;
//! config.update_section(ConfigSection::Lockdown).unwrap();
//! ```

mod manager;
mod settings;

pub use manager::{ConfigError, ConfigManager, ConfigResult};
pub use settings::{
    ConfigSection, LockdownSettings, LoggingSettings, PathSettings, QueueSettings, Settings,
    SlideshowSettings, UiSettings,
};
