//! Error types for window commands and job completion.

use thiserror::Error;

use crate::config::ConfigError;
use crate::jobs::JobSlot;

/// Errors surfaced by the window.
///
/// Job failures are also shown as a banner; command refusals are only
/// returned to the caller.
#[derive(Error, Debug)]
pub enum WindowError {
    /// The image could not be loaded.
    #[error("Could not load image '{caption}': {message}")]
    Load { caption: String, message: String },

    /// One or more images in a save batch failed.
    #[error("Couldn't save image '{caption}': {message}")]
    Save {
        caption: String,
        message: String,
        failed: usize,
    },

    #[error("Couldn't transform image: {message}")]
    Transform { message: String },

    #[error("Couldn't copy image: {message}")]
    Copy { message: String },

    #[error("Couldn't move '{caption}' to the trash: {message}")]
    Trash { caption: String, message: String },

    #[error("Couldn't set '{caption}' as wallpaper: {message}")]
    Wallpaper { caption: String, message: String },

    /// Blocked by lockdown settings.
    #[error("{action} is disabled by lockdown policy")]
    Policy { action: &'static str },

    /// A job of this kind is already running.
    #[error("A {0} job is already in progress")]
    Busy(JobSlot),

    #[error("No image selected")]
    NoSelection,

    /// The window has been torn down.
    #[error("Window is closed")]
    Closed,

    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl WindowError {
    pub fn load(caption: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Load {
            caption: caption.into(),
            message: message.into(),
        }
    }

    pub fn trash(caption: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Trash {
            caption: caption.into(),
            message: message.into(),
        }
    }

    pub fn wallpaper(caption: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Wallpaper {
            caption: caption.into(),
            message: message.into(),
        }
    }

    /// True for refusals that leave window state untouched.
    pub fn is_refusal(&self) -> bool {
        matches!(
            self,
            Self::Policy { .. } | Self::Busy(_) | Self::NoSelection | Self::Closed
        )
    }
}

/// Result type for window operations.
pub type WindowResult<T> = Result<T, WindowError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_name_the_image() {
        let err = WindowError::load("a.png", "bad header");
        assert_eq!(err.to_string(), "Could not load image 'a.png': bad header");

        let err = WindowError::Busy(JobSlot::Save);
        assert_eq!(err.to_string(), "A save job is already in progress");
    }

    #[test]
    fn refusals_are_classified() {
        assert!(WindowError::Policy { action: "Save" }.is_refusal());
        assert!(WindowError::NoSelection.is_refusal());
        assert!(!WindowError::trash("a.png", "denied").is_refusal());
    }
}
