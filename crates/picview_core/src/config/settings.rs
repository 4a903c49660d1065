//! Settings struct with TOML-based sections.
//!
//! Settings are organized into logical sections that map to TOML tables.
//! Each section can be updated independently for atomic section-level updates.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::logging::LogLevel;

/// Root settings structure containing all configuration sections.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    /// Window/UI preferences.
    #[serde(default)]
    pub ui: UiSettings,

    /// Administrator lockdown flags.
    #[serde(default)]
    pub lockdown: LockdownSettings,

    /// Slideshow behaviour.
    #[serde(default)]
    pub slideshow: SlideshowSettings,

    /// Background job handling.
    #[serde(default)]
    pub queue: QueueSettings,

    /// Path-related settings.
    #[serde(default)]
    pub paths: PathSettings,

    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingSettings,
}

/// Window/UI preferences.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UiSettings {
    /// Show the image gallery when more than one image is open.
    #[serde(default = "default_true")]
    pub image_gallery: bool,

    /// Skip the "unsaved changes" confirmation when closing.
    #[serde(default)]
    pub disable_close_confirmation: bool,

    /// Ask before moving images to the trash.
    #[serde(default = "default_true")]
    pub confirm_trash: bool,
}

fn default_true() -> bool {
    true
}

impl Default for UiSettings {
    fn default() -> Self {
        Self {
            image_gallery: true,
            disable_close_confirmation: false,
            confirm_trash: true,
        }
    }
}

/// Lockdown policy. Set by an administrator; overrides derived UI state.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LockdownSettings {
    /// Disable Save and Save As.
    #[serde(default)]
    pub disable_save: bool,

    /// Disable printing.
    #[serde(default)]
    pub disable_print: bool,
}

/// Slideshow configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SlideshowSettings {
    /// Start over from the first image after the last one.
    #[serde(default = "default_true")]
    pub loop_images: bool,

    /// Seconds between image switches. Zero disables automatic switching.
    #[serde(default = "default_switch_seconds")]
    pub switch_seconds: u32,
}

fn default_switch_seconds() -> u32 {
    5
}

impl Default for SlideshowSettings {
    fn default() -> Self {
        Self {
            loop_images: true,
            switch_seconds: default_switch_seconds(),
        }
    }
}

impl SlideshowSettings {
    /// Interval between switches, if automatic switching is enabled.
    pub fn switch_interval(&self) -> Option<Duration> {
        (self.switch_seconds > 0).then(|| Duration::from_secs(u64::from(self.switch_seconds)))
    }
}

/// Background job settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueSettings {
    /// Upper bound for waiting on an in-flight save when the window closes.
    #[serde(default = "default_teardown_timeout")]
    pub teardown_timeout_secs: u64,
}

fn default_teardown_timeout() -> u64 {
    30
}

impl Default for QueueSettings {
    fn default() -> Self {
        Self {
            teardown_timeout_secs: default_teardown_timeout(),
        }
    }
}

impl QueueSettings {
    pub fn teardown_timeout(&self) -> Duration {
        Duration::from_secs(self.teardown_timeout_secs)
    }
}

/// Path configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PathSettings {
    /// Folder that receives local copies of wallpapers.
    /// Empty means the platform data directory.
    #[serde(default)]
    pub wallpaper_folder: String,

    /// Last folder used by Save As.
    #[serde(default)]
    pub last_save_as_folder: String,
}

impl PathSettings {
    /// Resolve the wallpaper folder, falling back to the user data directory.
    pub fn wallpaper_dir(&self) -> PathBuf {
        if !self.wallpaper_folder.is_empty() {
            return PathBuf::from(&self.wallpaper_folder);
        }
        directories::BaseDirs::new()
            .map(|dirs| dirs.data_dir().join("picview"))
            .unwrap_or_else(|| PathBuf::from(".picview"))
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LoggingSettings {
    /// Default level when RUST_LOG is not set.
    #[serde(default)]
    pub level: LogLevel,
}

impl Settings {
    /// Sections whose values differ between `self` and `other`.
    pub fn changed_sections(&self, other: &Settings) -> Vec<ConfigSection> {
        ConfigSection::ALL
            .into_iter()
            .filter(|section| match section {
                ConfigSection::Ui => self.ui != other.ui,
                ConfigSection::Lockdown => self.lockdown != other.lockdown,
                ConfigSection::Slideshow => self.slideshow != other.slideshow,
                ConfigSection::Queue => self.queue != other.queue,
                ConfigSection::Paths => self.paths != other.paths,
                ConfigSection::Logging => self.logging != other.logging,
            })
            .collect()
    }
}

/// Names of config sections for targeted updates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConfigSection {
    Ui,
    Lockdown,
    Slideshow,
    Queue,
    Paths,
    Logging,
}

impl ConfigSection {
    /// All sections, in file order.
    pub const ALL: [ConfigSection; 6] = [
        ConfigSection::Ui,
        ConfigSection::Lockdown,
        ConfigSection::Slideshow,
        ConfigSection::Queue,
        ConfigSection::Paths,
        ConfigSection::Logging,
    ];

    /// Get the TOML table name for this section.
    pub fn table_name(&self) -> &'static str {
        match self {
            ConfigSection::Ui => "ui",
            ConfigSection::Lockdown => "lockdown",
            ConfigSection::Slideshow => "slideshow",
            ConfigSection::Queue => "queue",
            ConfigSection::Paths => "paths",
            ConfigSection::Logging => "logging",
        }
    }

    /// Comment written above the section in a freshly generated file.
    pub fn comment(&self) -> &'static str {
        match self {
            ConfigSection::Ui => "# Window behaviour",
            ConfigSection::Lockdown => "# Lockdown policy (overrides window state)",
            ConfigSection::Slideshow => "# Slideshow",
            ConfigSection::Queue => "# Background jobs",
            ConfigSection::Paths => "# Folders",
            ConfigSection::Logging => "# Logging",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_settings_serializes() {
        let settings = Settings::default();
        let toml = toml::to_string_pretty(&settings).unwrap();
        assert!(toml.contains("[ui]"));
        assert!(toml.contains("[lockdown]"));
        assert!(toml.contains("teardown_timeout_secs"));
    }

    #[test]
    fn missing_fields_use_defaults() {
        let minimal = "[lockdown]\ndisable_save = true";
        let parsed: Settings = toml::from_str(minimal).unwrap();
        assert!(parsed.lockdown.disable_save);
        assert!(!parsed.lockdown.disable_print);
        assert!(parsed.ui.image_gallery);
        assert_eq!(parsed.slideshow.switch_seconds, 5);
        assert_eq!(parsed.queue.teardown_timeout(), Duration::from_secs(30));
    }

    #[test]
    fn zero_seconds_disables_switching() {
        let slideshow = SlideshowSettings {
            loop_images: false,
            switch_seconds: 0,
        };
        assert_eq!(slideshow.switch_interval(), None);
    }

    #[test]
    fn changed_sections_lists_only_differences() {
        let base = Settings::default();
        let mut edited = base.clone();
        edited.lockdown.disable_save = true;
        edited.paths.last_save_as_folder = "/exports".to_string();

        assert_eq!(
            base.changed_sections(&edited),
            vec![ConfigSection::Lockdown, ConfigSection::Paths]
        );
        assert!(base.changed_sections(&base).is_empty());
    }

    #[test]
    fn explicit_wallpaper_folder_wins() {
        let paths = PathSettings {
            wallpaper_folder: "/srv/walls".to_string(),
            last_save_as_folder: String::new(),
        };
        assert_eq!(paths.wallpaper_dir(), PathBuf::from("/srv/walls"));
    }
}
