//! Widget toolkit seam.

use std::path::{Path, PathBuf};

use super::errors::WindowError;
use super::reconcile::{Action, UiSnapshot};
use super::state::Banner;
use super::trash::TrashMode;
use crate::images::{ImageId, ImageRef};
use crate::jobs::SaveAsTarget;
use crate::logging::MessagePrefix;

/// Surface the window drives. Implementations render; they never call
/// back into the controller.
pub trait Toolkit: Send {
    /// Bring widgets in line with `snapshot`.
    fn apply(&mut self, snapshot: &UiSnapshot);

    fn set_progress(&mut self, progress: f32);

    fn set_title(&mut self, title: &str);

    /// Window icon from the image's thumbnail, or the default icon.
    fn set_icon(&mut self, image: Option<ImageId>);

    fn show_banner(&mut self, banner: &Banner);

    fn clear_banner(&mut self);

    /// Block or unblock input to the whole window.
    fn set_sensitive(&mut self, sensitive: bool);

    fn report_error(&mut self, error: &WindowError);

    fn set_wallpaper(&mut self, path: &Path) -> Result<(), String>;

    /// Ask where to save. `None` means the user cancelled.
    fn choose_save_as_target(
        &mut self,
        _images: &[ImageRef],
        _last_folder: Option<&Path>,
    ) -> Option<SaveAsTarget> {
        None
    }

    /// Ask before trashing or deleting.
    fn confirm_trash(&mut self, _images: &[ImageRef], _mode: TrashMode) -> bool {
        true
    }

    /// The first image resolved; the window may be shown.
    fn prepared(&mut self);

    fn destroy(&mut self);
}

/// Toolkit that renders every change as a `tracing` event.
#[derive(Debug, Default)]
pub struct LogToolkit {
    last: Option<UiSnapshot>,
    save_as_folder: Option<PathBuf>,
    assume_yes: bool,
    wallpaper: Option<PathBuf>,
}

impl LogToolkit {
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer Save As prompts with this folder.
    pub fn with_save_as_folder(mut self, folder: impl Into<PathBuf>) -> Self {
        self.save_as_folder = Some(folder.into());
        self
    }

    /// Answer confirmations with yes.
    pub fn assume_yes(mut self, yes: bool) -> Self {
        self.assume_yes = yes;
        self
    }

    pub fn wallpaper(&self) -> Option<&Path> {
        self.wallpaper.as_deref()
    }

    fn changed_actions(&self, snapshot: &UiSnapshot) -> Vec<(Action, bool)> {
        snapshot
            .actions
            .iter()
            .filter(|(action, enabled)| {
                self.last
                    .as_ref()
                    .map_or(true, |last| last.is_enabled(**action) != **enabled)
            })
            .map(|(action, enabled)| (*action, *enabled))
            .collect()
    }
}

impl Toolkit for LogToolkit {
    fn apply(&mut self, snapshot: &UiSnapshot) {
        if self.last.as_ref() == Some(snapshot) {
            return;
        }
        let changed = self.changed_actions(snapshot);
        if !changed.is_empty() {
            tracing::debug!(target: "picview::ui", "actions changed: {:?}", changed);
        }
        let status_changed = self
            .last
            .as_ref()
            .map_or(true, |last| last.status_text != snapshot.status_text);
        if status_changed && !snapshot.status_text.is_empty() {
            tracing::info!(target: "picview::ui", "{}", snapshot.status_text);
        }
        if tracing::enabled!(target: "picview::ui", tracing::Level::TRACE) {
            match serde_json::to_string(snapshot) {
                Ok(json) => tracing::trace!(target: "picview::ui", snapshot = %json),
                Err(e) => tracing::trace!(target: "picview::ui", "snapshot not serializable: {}", e),
            }
        }
        self.last = Some(snapshot.clone());
    }

    fn set_progress(&mut self, progress: f32) {
        tracing::trace!(target: "picview::ui", "progress {:.0}%", progress * 100.0);
    }

    fn set_title(&mut self, title: &str) {
        tracing::debug!(target: "picview::ui", "title: {}", title);
    }

    fn set_icon(&mut self, image: Option<ImageId>) {
        tracing::trace!(target: "picview::ui", "icon: {:?}", image);
    }

    fn show_banner(&mut self, banner: &Banner) {
        let prefix = match banner.remedy {
            Some(_) => MessagePrefix::Warning,
            None => MessagePrefix::Error,
        };
        tracing::warn!(target: "picview::ui", "{}", prefix.format(&banner.message));
    }

    fn clear_banner(&mut self) {
        tracing::trace!(target: "picview::ui", "banner cleared");
    }

    fn set_sensitive(&mut self, sensitive: bool) {
        tracing::debug!(target: "picview::ui", "window sensitive: {}", sensitive);
    }

    fn report_error(&mut self, error: &WindowError) {
        tracing::error!(target: "picview::ui", "{}", MessagePrefix::Error.format(&error.to_string()));
    }

    fn set_wallpaper(&mut self, path: &Path) -> Result<(), String> {
        tracing::info!(
            target: "picview::ui",
            "{}",
            MessagePrefix::Success.format(&format!("Wallpaper set to {}", path.display()))
        );
        self.wallpaper = Some(path.to_path_buf());
        Ok(())
    }

    fn choose_save_as_target(
        &mut self,
        images: &[ImageRef],
        _last_folder: Option<&Path>,
    ) -> Option<SaveAsTarget> {
        let folder = self.save_as_folder.clone()?;
        tracing::info!(target: "picview::ui", "Saving {} image(s) into {}", images.len(), folder.display());
        Some(SaveAsTarget::Folder {
            dir: folder,
            extension: None,
        })
    }

    fn confirm_trash(&mut self, images: &[ImageRef], mode: TrashMode) -> bool {
        if !self.assume_yes {
            tracing::warn!(
                target: "picview::ui",
                "Not {} {} image(s) without confirmation",
                mode.verb(),
                images.len()
            );
        }
        self.assume_yes
    }

    fn prepared(&mut self) {
        tracing::debug!(target: "picview::ui", "window prepared");
    }

    fn destroy(&mut self) {
        tracing::debug!(target: "picview::ui", "window destroyed");
    }
}
