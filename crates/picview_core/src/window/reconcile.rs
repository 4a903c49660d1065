//! UI reconciliation: pure derivation of widget state from window state.
//!
//! [`reconcile`] is re-run after every transition. It never mutates
//! anything; the controller hands the result to the toolkit.

use std::collections::BTreeMap;

use serde::Serialize;

use super::gallery::Gallery;
use super::state::{Banner, BannerKind, WindowMode, WindowState, WindowStatus};
use crate::config::Settings;
use crate::jobs::JobSlot;

/// Title shown when no image is open.
pub const APP_NAME: &str = "Image Viewer";

/// Command-line switches that shape the window for its lifetime.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StartupFlags {
    pub disable_gallery: bool,
    pub fullscreen: bool,
    pub slideshow: bool,
}

/// Settings-derived flags that override derived UI state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Policy {
    pub save_disabled: bool,
    pub print_disabled: bool,
    pub show_gallery: bool,
    pub confirm_close: bool,
    pub confirm_trash: bool,
    pub loop_slideshow: bool,
}

impl Policy {
    pub fn from_settings(settings: &Settings, startup: &StartupFlags) -> Self {
        Self {
            save_disabled: settings.lockdown.disable_save,
            print_disabled: settings.lockdown.disable_print,
            show_gallery: settings.ui.image_gallery && !startup.disable_gallery,
            confirm_close: !settings.ui.disable_close_confirmation
                && !settings.lockdown.disable_save,
            confirm_trash: settings.ui.confirm_trash,
            loop_slideshow: settings.slideshow.loop_images,
        }
    }
}

impl Default for Policy {
    fn default() -> Self {
        Self::from_settings(&Settings::default(), &StartupFlags::default())
    }
}

/// Action groups. An action is enabled only if its group is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionGroup {
    /// Always available.
    Window,
    /// Needs at least one image.
    Image,
    /// Needs at least two images.
    Gallery,
}

/// User-invocable actions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Action {
    Open,
    Close,
    Preferences,
    ToggleGallery,
    PauseSlideshow,
    Save,
    SaveAs,
    Print,
    Properties,
    Undo,
    FlipHorizontal,
    FlipVertical,
    Rotate90,
    Rotate270,
    SetAsWallpaper,
    MoveToTrash,
    Delete,
    Reload,
    Fullscreen,
    GoPrevious,
    GoNext,
    GoFirst,
    GoLast,
    Slideshow,
}

impl Action {
    pub const ALL: [Action; 24] = [
        Action::Open,
        Action::Close,
        Action::Preferences,
        Action::ToggleGallery,
        Action::PauseSlideshow,
        Action::Save,
        Action::SaveAs,
        Action::Print,
        Action::Properties,
        Action::Undo,
        Action::FlipHorizontal,
        Action::FlipVertical,
        Action::Rotate90,
        Action::Rotate270,
        Action::SetAsWallpaper,
        Action::MoveToTrash,
        Action::Delete,
        Action::Reload,
        Action::Fullscreen,
        Action::GoPrevious,
        Action::GoNext,
        Action::GoFirst,
        Action::GoLast,
        Action::Slideshow,
    ];

    pub fn group(&self) -> ActionGroup {
        match self {
            Action::Open
            | Action::Close
            | Action::Preferences
            | Action::ToggleGallery
            | Action::PauseSlideshow => ActionGroup::Window,
            Action::GoPrevious
            | Action::GoNext
            | Action::GoFirst
            | Action::GoLast
            | Action::Slideshow => ActionGroup::Gallery,
            _ => ActionGroup::Image,
        }
    }
}

/// Desired widget state.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UiSnapshot {
    pub mode: WindowMode,
    pub status: WindowStatus,
    pub title: String,
    /// Image view and sidebar.
    pub layout_visible: bool,
    pub gallery_visible: bool,
    pub fullscreen_active: bool,
    pub actions: BTreeMap<Action, bool>,
    pub status_text: String,
    /// `pos / total` of the displayed image.
    pub image_position: Option<String>,
    pub progress: f32,
    pub banner: Option<Banner>,
    pub busy: Vec<JobSlot>,
}

impl UiSnapshot {
    pub fn is_enabled(&self, action: Action) -> bool {
        self.actions.get(&action).copied().unwrap_or(false)
    }
}

/// Derive widget state from window state.
pub fn reconcile(state: &WindowState, gallery: &Gallery, policy: &Policy) -> UiSnapshot {
    let n_images = gallery.len();
    let n_selected = gallery.n_selected();
    let image_group = n_images > 0 && state.image_actions_enabled;
    let gallery_group = n_images > 1;
    let modified = state
        .displayed_image()
        .is_some_and(|image| image.is_modified());
    // A failed save keeps Save available for a retry.
    let save_failed = state
        .banner
        .as_ref()
        .is_some_and(|banner| banner.kind == BannerKind::SaveError);

    let actions = Action::ALL
        .iter()
        .map(|&action| {
            let group_enabled = match action.group() {
                ActionGroup::Window => true,
                ActionGroup::Image => image_group,
                ActionGroup::Gallery => gallery_group,
            };
            let enabled = match action {
                Action::Save => !policy.save_disabled && (modified || save_failed),
                Action::SaveAs => !policy.save_disabled,
                Action::Undo => modified,
                Action::Print => !policy.print_disabled,
                Action::SetAsWallpaper => n_selected == 1 && !state.is_busy(JobSlot::Copy),
                Action::MoveToTrash | Action::Delete => n_selected > 0,
                Action::ToggleGallery => n_images > 1,
                Action::PauseSlideshow => state.mode == WindowMode::Slideshow,
                _ => true,
            };
            (action, group_enabled && enabled)
        })
        .collect();

    let title = if n_images == 0 || state.title.is_empty() {
        APP_NAME.to_string()
    } else {
        state.title.clone()
    };

    let image_position = state
        .displayed_id()
        .and_then(|id| gallery.position_of(id))
        .map(|pos| format!("{} / {}", pos + 1, n_images));

    UiSnapshot {
        mode: state.mode,
        status: state.status,
        title,
        layout_visible: n_images > 0,
        gallery_visible: n_images > 1
            && policy.show_gallery
            && state.mode != WindowMode::Slideshow,
        fullscreen_active: state.mode == WindowMode::Fullscreen,
        actions,
        status_text: status_text(state),
        image_position,
        progress: state.progress,
        banner: state.banner.clone(),
        busy: state.slots.occupied(),
    }
}

/// Top status message, else a summary of the displayed image.
pub fn status_text(state: &WindowState) -> String {
    if let Some(top) = state.status_stack.top() {
        return top.to_string();
    }
    state
        .displayed_image()
        .and_then(|image| {
            image
                .dimensions()
                .map(|(w, h)| image_info(w, h, image.byte_size(), state.zoom))
        })
        .unwrap_or_default()
}

/// `W × H pixels  SIZE    ZOOM%`.
pub fn image_info(width: u32, height: u32, bytes: u64, zoom: f64) -> String {
    let pixels = if height == 1 { "pixel" } else { "pixels" };
    let zoom_percent = (100.0 * zoom + 0.5).floor() as i64;
    format!(
        "{} × {} {}  {}    {}%",
        width,
        height,
        pixels,
        format_size(bytes),
        zoom_percent
    )
}

/// Human readable size with decimal (SI) units.
pub fn format_size(bytes: u64) -> String {
    const UNITS: [&str; 5] = ["kB", "MB", "GB", "TB", "PB"];
    if bytes < 1000 {
        return if bytes == 1 {
            "1 byte".to_string()
        } else {
            format!("{bytes} bytes")
        };
    }
    let mut value = bytes as f64 / 1000.0;
    let mut unit = 0;
    while value >= 1000.0 && unit < UNITS.len() - 1 {
        value /= 1000.0;
        unit += 1;
    }
    format!("{:.1} {}", value, UNITS[unit])
}
