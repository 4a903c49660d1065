//! User commands on a window.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use super::controller::WindowController;
use super::errors::{WindowError, WindowResult};
use super::events::Command;
use super::reconcile::Policy;
use super::state::{Banner, BannerKind, BannerResponse, Remedy, StatusContext, WindowMode};
use super::trash::{remove_image_file, TrashMode, TrashReport};
use crate::config::{ConfigManager, ConfigSection, Settings};
use crate::images::{ImageRef, Transform};
use crate::jobs::{Job, JobSlot, SaveAsTarget};

/// File stem used when copying a wallpaper into the data directory.
const WALLPAPER_STEM: &str = "picview-wallpaper";

const MIN_ZOOM: f64 = 0.02;
const MAX_ZOOM: f64 = 20.0;

impl WindowController {
    /// Select the image at `index`.
    pub fn select(&mut self, index: usize) -> WindowResult<()> {
        self.ensure_open()?;
        if index >= self.gallery.len() {
            return Err(WindowError::NoSelection);
        }
        self.gallery.select_single(index);
        self.handle_selection_changed();
        Ok(())
    }

    /// Select several images. The first one is displayed.
    pub fn select_many(&mut self, positions: Vec<usize>) -> WindowResult<()> {
        self.ensure_open()?;
        self.gallery.set_selection(positions);
        self.handle_selection_changed();
        Ok(())
    }

    pub fn go_next(&mut self) -> WindowResult<()> {
        self.ensure_open()?;
        match self.gallery.next_position(self.wraps()) {
            Some(position) => self.select(position),
            None => Ok(()),
        }
    }

    pub fn go_previous(&mut self) -> WindowResult<()> {
        self.ensure_open()?;
        match self.gallery.previous_position(self.wraps()) {
            Some(position) => self.select(position),
            None => Ok(()),
        }
    }

    pub fn go_first(&mut self) -> WindowResult<()> {
        self.ensure_open()?;
        if self.gallery.is_empty() {
            return Ok(());
        }
        self.select(0)
    }

    pub fn go_last(&mut self) -> WindowResult<()> {
        self.ensure_open()?;
        match self.gallery.len() {
            0 => Ok(()),
            n => self.select(n - 1),
        }
    }

    fn wraps(&self) -> bool {
        self.state.mode == WindowMode::Slideshow && self.policy.loop_slideshow
    }

    /// React to a selection change: display the first selected image,
    /// loading it first if needed.
    pub(super) fn handle_selection_changed(&mut self) {
        let Some(image) = self.gallery.first_selected().cloned() else {
            self.cancel_load_slot();
            self.release_displayed();
            self.clear_banner();
            self.state.icon = None;
            self.toolkit.set_icon(None);
            self.reset_title();
            self.sync_ui();
            return;
        };

        if self.state.displayed_id() == Some(image.id()) {
            self.sync_ui();
            return;
        }

        self.cancel_load_slot();
        self.clear_banner();

        if image.is_loaded() {
            self.display_image(image);
            self.resolve_initial();
            self.sync_ui();
            return;
        }

        self.start_load(image);
    }

    fn cancel_load_slot(&mut self) {
        if self.state.is_busy(JobSlot::Load) {
            self.cancel(crate::jobs::JobCategory::Load);
        }
    }

    /// Submit a load for `image` with an "Opening" status message.
    fn start_load(&mut self, image: ImageRef) {
        let text = format!("Opening image \"{}\"", image.uri_for_display());
        self.submit_job(Job::load(image), Some((StatusContext::ImageInfo, text)));
    }

    /// Save the selected images in place.
    pub fn save(&mut self) -> WindowResult<()> {
        self.check_can_save("Save")?;
        let images = self.selected_or_err()?;
        tracing::info!("Saving {} image(s)", images.len());
        self.submit(Job::save(images));
        Ok(())
    }

    /// Save the selected images to `target`.
    ///
    /// A single-file target with several images is treated as the folder
    /// containing it, keeping the file's extension.
    pub fn save_as(&mut self, target: SaveAsTarget) -> WindowResult<()> {
        self.check_can_save("Save As")?;
        let images = self.selected_or_err()?;

        let target = match target {
            SaveAsTarget::File(path) if images.len() > 1 => SaveAsTarget::Folder {
                dir: path.parent().map(PathBuf::from).unwrap_or_default(),
                extension: path
                    .extension()
                    .map(|ext| ext.to_string_lossy().into_owned()),
            },
            target => target,
        };

        tracing::info!("Saving {} image(s) as {:?}", images.len(), target);
        self.submit(Job::save_as(images, target));
        Ok(())
    }

    /// Ask the toolkit for a destination, then save. Returns false if
    /// the user cancelled.
    pub fn save_as_interactive(&mut self) -> WindowResult<bool> {
        self.check_can_save("Save As")?;
        let images = self.selected_or_err()?;

        let last_folder = &self.settings.paths.last_save_as_folder;
        let last_folder = (!last_folder.is_empty()).then(|| PathBuf::from(last_folder));
        match self
            .toolkit
            .choose_save_as_target(&images, last_folder.as_deref())
        {
            Some(target) => self.save_as(target).map(|()| true),
            None => {
                tracing::debug!("Save As cancelled");
                Ok(false)
            }
        }
    }

    fn check_can_save(&self, action: &'static str) -> WindowResult<()> {
        self.ensure_open()?;
        if self.policy.save_disabled {
            return Err(WindowError::Policy { action });
        }
        if self.state.is_busy(JobSlot::Save) {
            return Err(WindowError::Busy(JobSlot::Save));
        }
        Ok(())
    }

    fn selected_or_err(&self) -> WindowResult<Vec<ImageRef>> {
        let images = self.gallery.selected_images();
        if images.is_empty() {
            return Err(WindowError::NoSelection);
        }
        Ok(images)
    }

    pub fn rotate_90(&mut self) -> WindowResult<()> {
        self.apply_transform(Some(Transform::Rotate90))
    }

    pub fn rotate_270(&mut self) -> WindowResult<()> {
        self.apply_transform(Some(Transform::Rotate270))
    }

    pub fn flip_horizontal(&mut self) -> WindowResult<()> {
        self.apply_transform(Some(Transform::FlipHorizontal))
    }

    pub fn flip_vertical(&mut self) -> WindowResult<()> {
        self.apply_transform(Some(Transform::FlipVertical))
    }

    /// Revert the last transform of the selected images.
    pub fn undo(&mut self) -> WindowResult<()> {
        self.apply_transform(None)
    }

    fn apply_transform(&mut self, transform: Option<Transform>) -> WindowResult<()> {
        self.ensure_open()?;
        let images = self.selected_or_err()?;
        match transform {
            Some(op) => tracing::debug!("{} on {} image(s)", op.name(), images.len()),
            None => tracing::debug!("Undo on {} image(s)", images.len()),
        }
        self.submit(Job::transform(images, transform));
        Ok(())
    }

    /// Load the displayed (or first selected) image again from disk.
    pub fn reload_image(&mut self) -> WindowResult<()> {
        self.ensure_open()?;
        let image = self
            .state
            .displayed_image()
            .cloned()
            .or_else(|| self.gallery.first_selected().cloned())
            .ok_or(WindowError::NoSelection)?;

        tracing::info!("Reloading {}", image.caption());
        self.cancel_load_slot();
        self.clear_banner();
        self.release_displayed();
        self.state.needs_reload_confirmation = true;
        self.start_load(image);
        Ok(())
    }

    /// The displayed file changed on disk.
    pub(super) fn on_file_changed(&mut self) {
        let Some(image) = self.state.displayed_image().cloned() else {
            return;
        };
        if !image.is_modified() {
            if let Err(error) = self.reload_image() {
                tracing::warn!("Reload after file change failed: {}", error);
            }
            return;
        }
        if !self.state.needs_reload_confirmation {
            return;
        }

        self.state.needs_reload_confirmation = false;
        let caption = image.caption();
        self.show_banner(Banner {
            kind: BannerKind::FileChanged,
            image: Some(image.id()),
            message: format!(
                "The image \u{201c}{}\u{201d} has been modified by an external application. \
                 Would you like to reload it?",
                caption
            ),
            caption,
            remedy: Some(Remedy::Reload),
        });
        self.sync_ui();
    }

    /// Answer the current banner.
    pub fn banner_response(&mut self, response: BannerResponse) -> WindowResult<()> {
        self.ensure_open()?;
        let Some(banner) = self.state.banner.take() else {
            return Ok(());
        };
        self.toolkit.clear_banner();
        if banner.kind == BannerKind::FileChanged {
            self.state.needs_reload_confirmation = true;
        }

        match response {
            BannerResponse::Reload => self.reload_image(),
            BannerResponse::SaveAs => {
                if let Some(position) = banner.image.and_then(|id| self.gallery.position_of(id)) {
                    if self.gallery.first_selected_position() != Some(position) {
                        self.gallery.select_single(position);
                        self.handle_selection_changed();
                    }
                }
                self.save_as_interactive().map(|_| ())
            }
            BannerResponse::Dismiss => {
                self.sync_ui();
                Ok(())
            }
        }
    }

    /// Set the selected image as desktop wallpaper.
    ///
    /// Files under the temporary directory are first copied into the
    /// wallpaper folder so the background survives their removal.
    pub fn set_as_wallpaper(&mut self) -> WindowResult<()> {
        self.ensure_open()?;
        if self.state.is_busy(JobSlot::Copy) {
            return Err(WindowError::Busy(JobSlot::Copy));
        }
        if self.gallery.n_selected() != 1 {
            return Err(WindowError::NoSelection);
        }
        let image = self.selected_or_err()?.remove(0);
        let caption = image.caption();
        let path = image
            .path()
            .ok_or_else(|| WindowError::wallpaper(&caption, "image has no local file"))?;

        if path.starts_with(std::env::temp_dir()) {
            let dest_dir = self.settings.paths.wallpaper_dir();
            tracing::info!("Copying {} to {} for wallpaper", path.display(), dest_dir.display());
            let job = Job::copy(vec![path], dest_dir, Some(WALLPAPER_STEM.to_string()));
            self.submit_job(
                job,
                Some((StatusContext::CopyFile, "Saving image locally\u{2026}".to_string())),
            );
            return Ok(());
        }

        self.toolkit
            .set_wallpaper(&path)
            .map_err(|message| WindowError::wallpaper(caption, message))
    }

    /// Trash or delete the selected images.
    ///
    /// Each file is handled independently; failures are collected in the
    /// report and the rest of the batch continues.
    pub fn move_to_trash(&mut self, mode: TrashMode) -> WindowResult<TrashReport> {
        self.ensure_open()?;
        let images = self.selected_or_err()?;
        let mut report = TrashReport::default();

        let ask = mode == TrashMode::Delete || self.policy.confirm_trash;
        if ask && !self.toolkit.confirm_trash(&images, mode) {
            tracing::debug!("User declined {}", mode.verb());
            report.declined = true;
            return Ok(report);
        }

        let start = self.gallery.first_selected_position().unwrap_or(0);
        for image in &images {
            match remove_image_file(image.as_ref(), mode) {
                Ok(()) => {
                    if self.state.displayed_id() == Some(image.id()) {
                        self.release_displayed();
                    }
                    self.gallery.remove(image.id());
                    report.removed += 1;
                }
                Err(error) => {
                    tracing::warn!("{}", error);
                    self.toolkit.report_error(&error);
                    report.failures.push(error);
                }
            }
        }

        if report.removed > 0 {
            if self.gallery.is_empty() {
                self.gallery.clear_selection();
            } else {
                let position = start.saturating_sub(1).min(self.gallery.len() - 1);
                self.gallery.select_single(position);
            }
            self.handle_selection_changed();
        }
        Ok(report)
    }

    pub(super) fn run_fullscreen(&mut self, slideshow: bool) {
        self.state.mode = if slideshow {
            WindowMode::Slideshow
        } else {
            WindowMode::Fullscreen
        };
        tracing::debug!("Mode is now {:?}", self.state.mode);
    }

    pub fn toggle_fullscreen(&mut self) -> WindowResult<()> {
        self.ensure_open()?;
        match self.state.mode {
            WindowMode::Normal if !self.gallery.is_empty() => self.run_fullscreen(false),
            WindowMode::Normal => return Ok(()),
            WindowMode::Fullscreen | WindowMode::Slideshow => self.state.mode = WindowMode::Normal,
        }
        self.sync_ui();
        Ok(())
    }

    /// Enter slideshow mode. Needs at least two images.
    pub fn start_slideshow(&mut self) -> WindowResult<()> {
        self.ensure_open()?;
        if self.gallery.len() < 2 {
            tracing::debug!("Slideshow needs at least two images");
            return Ok(());
        }
        self.run_fullscreen(true);
        self.sync_ui();
        Ok(())
    }

    /// Toggle between slideshow and plain fullscreen.
    pub fn pause_slideshow(&mut self) -> WindowResult<()> {
        self.ensure_open()?;
        match self.state.mode {
            WindowMode::Slideshow => self.run_fullscreen(false),
            WindowMode::Fullscreen if self.gallery.len() > 1 => self.run_fullscreen(true),
            _ => return Ok(()),
        }
        self.sync_ui();
        Ok(())
    }

    pub fn stop_fullscreen(&mut self) -> WindowResult<()> {
        self.ensure_open()?;
        if self.state.mode != WindowMode::Normal {
            self.state.mode = WindowMode::Normal;
            self.sync_ui();
        }
        Ok(())
    }

    /// Advance the slideshow. Returns false when the slideshow is not
    /// running or has just stopped at the last image.
    pub fn slideshow_tick(&mut self) -> bool {
        if self.state.closed || self.state.mode != WindowMode::Slideshow {
            return false;
        }
        match self.gallery.next_position(self.policy.loop_slideshow) {
            Some(position) => self.select(position).is_ok(),
            None => {
                tracing::debug!("Slideshow reached the last image");
                let _ = self.stop_fullscreen();
                false
            }
        }
    }

    /// Delay between slideshow advances while the slideshow runs.
    pub fn slideshow_interval(&self) -> Option<Duration> {
        if self.state.mode == WindowMode::Slideshow {
            self.settings.slideshow.switch_interval()
        } else {
            None
        }
    }

    pub fn toggle_gallery(&mut self) -> WindowResult<()> {
        self.ensure_open()?;
        if self.gallery.len() < 2 {
            return Ok(());
        }
        self.settings.ui.image_gallery = !self.settings.ui.image_gallery;
        self.policy = Policy::from_settings(&self.settings, &self.startup);
        self.sync_ui();
        Ok(())
    }

    pub fn set_zoom(&mut self, zoom: f64) -> WindowResult<()> {
        self.ensure_open()?;
        if !zoom.is_finite() {
            return Ok(());
        }
        self.state.zoom = zoom.clamp(MIN_ZOOM, MAX_ZOOM);
        self.sync_ui();
        Ok(())
    }

    /// Replace the settings and re-derive policy.
    pub fn apply_settings(&mut self, settings: Settings) {
        self.settings = settings;
        self.policy = Policy::from_settings(&self.settings, &self.startup);
        tracing::debug!("Settings applied: {:?}", self.policy);
        self.sync_ui();
    }

    /// Re-read the settings file and apply it if anything changed.
    pub fn reload_settings(
        &mut self,
        config: &mut ConfigManager,
    ) -> WindowResult<Vec<ConfigSection>> {
        let changed = config.reload()?;
        if !changed.is_empty() {
            self.apply_settings(config.settings().clone());
        }
        Ok(changed)
    }

    /// Run a posted command.
    pub fn execute(&mut self, command: Command) -> WindowResult<()> {
        tracing::trace!("Command {:?}", command);
        match command {
            Command::Select(index) => self.select(index),
            Command::GoNext => self.go_next(),
            Command::GoPrevious => self.go_previous(),
            Command::GoFirst => self.go_first(),
            Command::GoLast => self.go_last(),
            Command::Save => self.save(),
            Command::SaveAs => self.save_as_interactive().map(|_| ()),
            Command::Rotate90 => self.rotate_90(),
            Command::Rotate270 => self.rotate_270(),
            Command::FlipHorizontal => self.flip_horizontal(),
            Command::FlipVertical => self.flip_vertical(),
            Command::Undo => self.undo(),
            Command::Reload => self.reload_image(),
            Command::SetAsWallpaper => self.set_as_wallpaper(),
            Command::MoveToTrash => self.move_to_trash(TrashMode::Trash).map(|_| ()),
            Command::Delete => self.move_to_trash(TrashMode::Delete).map(|_| ()),
            Command::ToggleFullscreen => self.toggle_fullscreen(),
            Command::StartSlideshow => self.start_slideshow(),
            Command::PauseSlideshow => self.pause_slideshow(),
            Command::StopFullscreen => self.stop_fullscreen(),
            Command::SlideshowTick => {
                self.slideshow_tick();
                Ok(())
            }
            Command::ToggleGallery => self.toggle_gallery(),
            Command::SetZoom(zoom) => self.set_zoom(zoom),
        }
    }

    /// Images in the gallery with unsaved changes.
    pub fn modified_images(&self) -> Vec<ImageRef> {
        self.gallery
            .images()
            .iter()
            .filter(|image| image.is_modified())
            .map(Arc::clone)
            .collect()
    }
}
