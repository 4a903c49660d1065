//! Job lifecycle controller.
//!
//! The controller owns a window's state and is driven from one task.
//! Jobs run elsewhere; their signals arrive through the window's event
//! channel and are applied by [`WindowController::handle_event`], so all
//! mutation happens on the window loop.
//!
//! Each job category maps to a single-flight slot. Submitting into an
//! occupied slot detaches and cancels the previous job before the new
//! one is installed, and a `finished` event is honoured only while its
//! job still holds the slot.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};

use super::errors::{WindowError, WindowResult};
use super::events::WindowEvent;
use super::gallery::Gallery;
use super::plugins::{PluginRegistry, WindowActivatable, WindowHandle};
use super::reconcile::{reconcile, Policy, StartupFlags, UiSnapshot, APP_NAME};
use super::state::{
    ActiveJob, Banner, BannerKind, Displayed, Remedy, StatusContext, WindowState, WindowStatus,
};
use super::toolkit::Toolkit;
use crate::config::Settings;
use crate::images::{ImageEvent, ImageId, ImageRef};
use crate::jobs::{
    Job, JobCategory, JobFailure, JobId, JobKind, JobOutcome, JobQueue, JobSignal, JobSlot,
};

/// How a `finished` delivery was handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    /// The job no longer holds a slot; nothing changed.
    Stale,
    Completed(JobCategory),
    Cancelled(JobCategory),
}

/// Result of asking a window to close.
#[derive(Debug)]
pub enum CloseOutcome {
    /// The window was torn down. `forced_cancel` is set when a pending
    /// save had to be cancelled after the teardown timeout.
    Closed { forced_cancel: bool },
    /// Modified images remain; answer with
    /// [`WindowController::close_response`].
    ConfirmUnsaved(Vec<ImageRef>),
    AlreadyClosed,
}

/// Answer to the unsaved-changes confirmation.
#[derive(Debug)]
pub enum CloseResponse {
    /// Save these images, then close if the save succeeds.
    Save(Vec<ImageRef>),
    Discard,
    Cancel,
}

/// Main window controller.
pub struct WindowController {
    pub(super) state: WindowState,
    pub(super) gallery: Gallery,
    pub(super) settings: Settings,
    pub(super) startup: StartupFlags,
    pub(super) policy: Policy,
    queue: Arc<dyn JobQueue>,
    pub(super) toolkit: Box<dyn Toolkit>,
    plugins: PluginRegistry,
    handle: WindowHandle,
    events_tx: UnboundedSender<WindowEvent>,
    events_rx: UnboundedReceiver<WindowEvent>,
    last_snapshot: Option<UiSnapshot>,
}

impl WindowController {
    /// Create a window and activate its plugins.
    pub fn new(
        settings: Settings,
        queue: Arc<dyn JobQueue>,
        toolkit: Box<dyn Toolkit>,
        plugins: PluginRegistry,
    ) -> Self {
        Self::with_startup(settings, StartupFlags::default(), queue, toolkit, plugins)
    }

    pub fn with_startup(
        settings: Settings,
        startup: StartupFlags,
        queue: Arc<dyn JobQueue>,
        toolkit: Box<dyn Toolkit>,
        plugins: PluginRegistry,
    ) -> Self {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let handle = WindowHandle::new(events_tx.clone());
        let policy = Policy::from_settings(&settings, &startup);

        let mut window = Self {
            state: WindowState::default(),
            gallery: Gallery::default(),
            settings,
            startup,
            policy,
            queue,
            toolkit,
            plugins,
            handle,
            events_tx,
            events_rx,
            last_snapshot: None,
        };
        window.plugins.activate_all(&window.handle);
        window
    }

    /// Replace the gallery and display the first image.
    pub fn open(&mut self, images: Vec<ImageRef>) {
        for slot in JobSlot::ALL {
            self.release_slot(slot);
        }
        self.gallery = Gallery::new(images);
        tracing::info!("Opened {} image(s)", self.gallery.len());

        if self.gallery.is_empty() {
            self.resolve_initial();
            self.handle_selection_changed();
            return;
        }

        if self.startup.slideshow {
            self.run_fullscreen(true);
        } else if self.startup.fullscreen {
            self.run_fullscreen(false);
        }
        self.gallery.select_single(0);
        self.handle_selection_changed();
    }

    pub fn state(&self) -> &WindowState {
        &self.state
    }

    pub fn gallery(&self) -> &Gallery {
        &self.gallery
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn policy(&self) -> &Policy {
        &self.policy
    }

    pub fn handle(&self) -> WindowHandle {
        self.handle.clone()
    }

    pub fn is_closed(&self) -> bool {
        self.state.closed
    }

    /// Current derived UI state.
    pub fn snapshot(&self) -> UiSnapshot {
        reconcile(&self.state, &self.gallery, &self.policy)
    }

    /// Attach a plugin at runtime.
    pub fn add_plugin(&mut self, plugin: Box<dyn WindowActivatable>) {
        self.plugins.add(plugin, &self.handle);
    }

    pub fn remove_plugin(&mut self, name: &str) -> bool {
        self.plugins.remove(name, &self.handle)
    }

    /// Install `job` in its category's slot and enqueue it, cancelling
    /// whatever held the slot.
    pub fn submit(&mut self, job: Arc<Job>) {
        self.submit_job(job, None);
    }

    pub(super) fn submit_job(&mut self, job: Arc<Job>, status: Option<(StatusContext, String)>) {
        let category = job.category();
        let slot = category.slot();
        if self.release_slot(slot) {
            tracing::debug!("Superseded running {} job", slot);
        }

        let job_id = job.id();
        let tx = self.events_tx.clone();
        let subscription = job.subscribe(move |signal| {
            let _ = tx.send(WindowEvent::Job {
                job_id,
                signal: *signal,
            });
        });

        let context = status.map(|(context, text)| {
            self.state.status_stack.push(context, text);
            context
        });

        let active = ActiveJob {
            job: Arc::clone(&job),
            subscription,
            reported_item: None,
            status: context,
        };
        if let Err(active) = self.state.slots.install(slot, active) {
            tracing::error!("{} slot still occupied; dropping job {}", slot, job_id);
            active.job.unsubscribe(active.subscription);
            return;
        }

        tracing::debug!("Submitted {} job {}", category.name(), job_id);
        self.queue.enqueue(job);
        self.sync_ui();
    }

    /// Cancel the job holding `category`'s slot.
    pub fn cancel(&mut self, category: JobCategory) -> bool {
        let released = self.release_slot(category.slot());
        if released {
            self.sync_ui();
        }
        released
    }

    /// Detach, cancel if unfinished, and clear a slot.
    fn release_slot(&mut self, slot: JobSlot) -> bool {
        let Some(active) = self.state.slots.take(slot) else {
            return false;
        };
        let ActiveJob {
            job,
            subscription,
            status,
            ..
        } = active;

        job.unsubscribe(subscription);
        if !job.is_finished() {
            tracing::debug!("Cancelling {} job {}", slot, job.id());
            self.queue.remove(&job);
            if let JobKind::Load { image } = job.kind() {
                image.cancel_load();
            }
        }

        if let Some(context) = status {
            self.state.status_stack.pop(context);
        }
        if self.state.close_after_save == Some(job.id()) {
            self.state.close_after_save = None;
        }
        if slot == JobSlot::Load {
            self.state.progress = 0.0;
        }
        true
    }

    /// Apply a progress report. Returns false for stale jobs.
    pub fn on_progress(&mut self, job_id: JobId, value: f32) -> bool {
        let Some(slot) = self.state.slots.find(job_id) else {
            tracing::trace!("Ignoring progress from stale job {}", job_id);
            return false;
        };

        let value = value.clamp(0.0, 1.0);
        self.state.progress = value;
        self.toolkit.set_progress(value);
        if slot == JobSlot::Save {
            self.update_save_status();
        }
        self.sync_ui();
        true
    }

    /// Show which image a save job is writing.
    fn update_save_status(&mut self) {
        let Some(active) = self.state.slots.get_mut(JobSlot::Save) else {
            return;
        };
        let index = active.job.current_index();
        if active.reported_item == Some(index) {
            return;
        }
        let images = active.job.kind().images();
        let Some(image) = images.get(index) else {
            return;
        };
        let text = format!(
            "Saving image \"{}\" ({}/{})",
            image.uri_for_display(),
            index + 1,
            images.len()
        );
        active.status = Some(StatusContext::Saving);
        active.reported_item = Some(index);

        self.state.status_stack.remove_all(StatusContext::Saving);
        self.state.status_stack.push(StatusContext::Saving, text);
    }

    /// Apply a job's terminal outcome.
    ///
    /// Deliveries for jobs that no longer hold their slot return
    /// [`Resolution::Stale`], which also makes a repeated delivery a no-op.
    pub fn on_finished(&mut self, job_id: JobId) -> WindowResult<Resolution> {
        let Some(slot) = self.state.slots.find(job_id) else {
            tracing::debug!("Ignoring finished from stale job {}", job_id);
            return Ok(Resolution::Stale);
        };
        let Some(job) = self.state.slots.get(slot).map(|a| Arc::clone(&a.job)) else {
            return Ok(Resolution::Stale);
        };
        let Some(outcome) = job.outcome() else {
            tracing::warn!("Job {} reported finished without an outcome", job_id);
            return Ok(Resolution::Stale);
        };

        let closes_window = self.state.close_after_save == Some(job_id);
        self.release_slot(slot);
        self.state.progress = 0.0;
        self.toolkit.set_progress(0.0);

        let category = job.category();
        if matches!(category, JobCategory::Save | JobCategory::SaveAs) {
            self.mark_saved_items(&job);
        }

        let result = match outcome {
            JobOutcome::Cancelled => {
                tracing::debug!("{} job {} was cancelled", category.name(), job_id);
                Ok(Resolution::Cancelled(category))
            }
            JobOutcome::Success => {
                self.complete(&job, closes_window);
                Ok(Resolution::Completed(category))
            }
            JobOutcome::Failure(failure) => Err(self.fail(&job, failure, closes_window)),
        };

        if category == JobCategory::Load && !matches!(result, Ok(Resolution::Cancelled(_))) {
            self.resolve_initial();
        }
        if let Err(error) = &result {
            tracing::warn!("{}", error);
            self.toolkit.report_error(error);
        }
        self.sync_ui();
        result
    }

    fn mark_saved_items(&mut self, job: &Job) {
        let images = job.kind().images();
        for item in job.items().iter().filter(|item| item.succeeded()) {
            if let Some(image) = images.iter().find(|image| Some(image.id()) == item.image) {
                image.mark_saved();
            }
        }
    }

    fn complete(&mut self, job: &Job, closes_window: bool) {
        match job.kind() {
            JobKind::Load { image } => {
                tracing::info!("Loaded {}", image.caption());
                self.display_image(Arc::clone(image));
            }
            JobKind::Transform { images, transform } => {
                tracing::debug!("Transformed {} image(s) with {:?}", images.len(), transform);
            }
            JobKind::Save { images } | JobKind::SaveAs { images, .. } => {
                tracing::info!("Saved {} image(s)", images.len());
                if let JobKind::SaveAs { target, .. } = job.kind() {
                    if let Some(folder) = target.folder() {
                        self.settings.paths.last_save_as_folder = folder.display().to_string();
                    }
                }
                if let Some(caption) = self.state.displayed_image().map(|image| image.caption()) {
                    self.set_title(caption);
                }
                if closes_window {
                    self.teardown();
                }
            }
            JobKind::Copy { .. } => match job.output() {
                Some(path) => {
                    if let Err(message) = self.toolkit.set_wallpaper(&path) {
                        let error = WindowError::wallpaper(path.display().to_string(), message);
                        tracing::warn!("{}", error);
                        self.toolkit.report_error(&error);
                    }
                }
                None => tracing::warn!("Copy job {} produced no file", job.id()),
            },
        }
    }

    fn fail(&mut self, job: &Job, failure: JobFailure, closes_window: bool) -> WindowError {
        let caption = failure.caption.clone().unwrap_or_default();
        match job.kind() {
            JobKind::Load { image } => {
                self.release_displayed();
                self.state.icon = None;
                self.toolkit.set_icon(None);
                self.set_title(image.caption());
                self.state.image_actions_enabled = false;
                self.show_banner(Banner {
                    kind: BannerKind::LoadError,
                    image: Some(image.id()),
                    caption: image.caption(),
                    message: format!("Could not load image \u{201c}{}\u{201d}.", image.caption()),
                    remedy: Some(Remedy::Reload),
                });
                WindowError::load(image.caption(), failure.message)
            }
            JobKind::Transform { .. } => {
                self.show_banner(Banner {
                    kind: BannerKind::TransformError,
                    image: failure.image,
                    caption,
                    message: format!("Could not transform image: {}", failure.message),
                    remedy: None,
                });
                WindowError::Transform {
                    message: failure.message,
                }
            }
            JobKind::Save { .. } | JobKind::SaveAs { .. } => {
                let failed = job.items().iter().filter(|i| !i.succeeded()).count().max(1);
                if closes_window {
                    self.select_image(failure.image);
                }
                self.show_banner(Banner {
                    kind: BannerKind::SaveError,
                    image: failure.image,
                    caption: caption.clone(),
                    message: format!("Couldn't save image \u{201c}{}\u{201d}.", caption),
                    remedy: Some(Remedy::SaveAs),
                });
                WindowError::Save {
                    caption,
                    message: failure.message,
                    failed,
                }
            }
            JobKind::Copy { .. } => {
                self.show_banner(Banner {
                    kind: BannerKind::CopyError,
                    image: None,
                    caption,
                    message: format!("Couldn't copy image: {}", failure.message),
                    remedy: None,
                });
                WindowError::Copy {
                    message: failure.message,
                }
            }
        }
    }

    /// The first resolved load moves the window out of `Init` and
    /// announces "prepared", once.
    pub(super) fn resolve_initial(&mut self) {
        if self.state.status == WindowStatus::Init {
            self.state.status = WindowStatus::Normal;
        }
        if !self.state.prepared {
            self.state.prepared = true;
            self.toolkit.prepared();
        }
    }

    fn select_image(&mut self, image: Option<ImageId>) {
        if let Some(position) = image.and_then(|id| self.gallery.position_of(id)) {
            self.gallery.select_single(position);
            self.handle_selection_changed();
        }
    }

    /// Make `image` the displayed image and follow its notifications.
    pub(super) fn display_image(&mut self, image: ImageRef) {
        self.release_displayed();

        let image_id = image.id();
        let tx = self.events_tx.clone();
        let subscription = image.subscribe(Box::new(move |event| {
            let _ = tx.send(WindowEvent::Image {
                image_id,
                event: *event,
            });
        }));

        self.state.needs_reload_confirmation = true;
        self.state.image_actions_enabled = true;
        self.state.icon = image.has_thumbnail().then_some(image_id);
        self.toolkit.set_icon(self.state.icon);
        self.set_title(image.caption());
        self.state.displayed = Some(Displayed {
            image,
            subscription,
        });
    }

    pub(super) fn release_displayed(&mut self) {
        if let Some(displayed) = self.state.displayed.take() {
            displayed.image.unsubscribe(displayed.subscription);
        }
    }

    pub(super) fn set_title(&mut self, title: String) {
        if self.state.title != title {
            self.toolkit.set_title(&title);
            self.state.title = title;
        }
    }

    pub(super) fn show_banner(&mut self, banner: Banner) {
        self.toolkit.show_banner(&banner);
        self.state.banner = Some(banner);
    }

    pub(super) fn clear_banner(&mut self) {
        if self.state.banner.take().is_some() {
            self.toolkit.clear_banner();
        }
    }

    /// Reconcile and push the result to the toolkit if it changed.
    pub(super) fn sync_ui(&mut self) {
        if self.state.closed {
            return;
        }
        let snapshot = reconcile(&self.state, &self.gallery, &self.policy);
        if self.last_snapshot.as_ref() == Some(&snapshot) {
            return;
        }
        self.toolkit.apply(&snapshot);
        self.plugins.update_state(&self.handle, &snapshot);
        self.last_snapshot = Some(snapshot);
    }

    /// Notifications from the displayed image.
    fn on_image_event(&mut self, image_id: ImageId, event: ImageEvent) {
        if self.state.displayed_id() != Some(image_id) {
            tracing::trace!("Ignoring {:?} from image {} not on screen", event, image_id);
            return;
        }
        match event {
            ImageEvent::ThumbnailChanged => {
                let has_thumbnail = self
                    .state
                    .displayed_image()
                    .is_some_and(|image| image.has_thumbnail());
                let icon = has_thumbnail.then_some(image_id);
                if icon != self.state.icon {
                    self.state.icon = icon;
                    self.toolkit.set_icon(icon);
                }
            }
            ImageEvent::FileChanged => self.on_file_changed(),
        }
    }

    /// Route one event.
    pub fn handle_event(&mut self, event: WindowEvent) -> WindowResult<()> {
        if self.state.closed {
            return Ok(());
        }
        match event {
            WindowEvent::Job {
                job_id,
                signal: JobSignal::Progress(value),
            } => {
                self.on_progress(job_id, value);
                Ok(())
            }
            WindowEvent::Job {
                job_id,
                signal: JobSignal::Finished,
            } => self.on_finished(job_id).map(|_| ()),
            WindowEvent::Image { image_id, event } => {
                self.on_image_event(image_id, event);
                Ok(())
            }
            WindowEvent::Command(command) => {
                let result = self.execute(command);
                match &result {
                    Err(error) if error.is_refusal() => {
                        tracing::debug!("Posted command refused: {}", error)
                    }
                    Err(error) => self.toolkit.report_error(error),
                    Ok(()) => {}
                }
                result
            }
        }
    }

    /// Handle every event already queued. Returns how many were handled.
    pub fn process_pending(&mut self) -> usize {
        let mut handled = 0;
        while let Ok(event) = self.events_rx.try_recv() {
            handled += 1;
            if let Err(error) = self.handle_event(event) {
                tracing::debug!("Event failed: {}", error);
            }
        }
        handled
    }

    /// Wait for and handle the next event.
    pub async fn next_event(&mut self) -> Option<WindowResult<()>> {
        let event = self.events_rx.recv().await?;
        Some(self.handle_event(event))
    }

    /// Handle events until no job slot is occupied.
    pub async fn wait_idle(&mut self) {
        while !self.state.slots.is_empty() && !self.state.closed {
            if self.next_event().await.is_none() {
                break;
            }
        }
    }

    /// Close the window.
    ///
    /// A pending save is waited for, up to the configured teardown
    /// timeout, then force-cancelled. Modified images then trigger a
    /// confirmation unless policy skips it.
    pub async fn close(&mut self) -> CloseOutcome {
        if self.state.closed {
            return CloseOutcome::AlreadyClosed;
        }

        let mut forced_cancel = false;
        if self.state.is_busy(JobSlot::Save) {
            self.toolkit.set_sensitive(false);
            forced_cancel = !self.drain_save(self.settings.queue.teardown_timeout()).await;
            self.toolkit.set_sensitive(true);
        }
        if self.state.closed {
            return CloseOutcome::Closed { forced_cancel };
        }

        if self.policy.confirm_close {
            let unsaved = self.modified_images();
            if !unsaved.is_empty() {
                tracing::info!("{} image(s) have unsaved changes", unsaved.len());
                return CloseOutcome::ConfirmUnsaved(unsaved);
            }
        }

        self.teardown();
        CloseOutcome::Closed { forced_cancel }
    }

    /// Handle events until the save slot clears. Returns false if the
    /// deadline passed and the save was cancelled.
    async fn drain_save(&mut self, timeout: Duration) -> bool {
        let deadline = tokio::time::Instant::now() + timeout;
        tracing::info!("Waiting up to {:?} for the pending save", timeout);
        while self.state.is_busy(JobSlot::Save) {
            match tokio::time::timeout_at(deadline, self.events_rx.recv()).await {
                Ok(Some(event)) => {
                    if let Err(error) = self.handle_event(event) {
                        tracing::debug!("Event failed during close: {}", error);
                    }
                }
                Ok(None) => break,
                Err(_) => {
                    tracing::warn!("Save did not finish within {:?}; cancelling it", timeout);
                    self.cancel(JobCategory::Save);
                    return false;
                }
            }
        }
        true
    }

    /// Answer a [`CloseOutcome::ConfirmUnsaved`].
    pub fn close_response(&mut self, response: CloseResponse) -> WindowResult<()> {
        self.ensure_open()?;
        match response {
            CloseResponse::Save(images) => {
                if self.policy.save_disabled {
                    return Err(WindowError::Policy { action: "Save" });
                }
                if self.state.is_busy(JobSlot::Save) {
                    return Err(WindowError::Busy(JobSlot::Save));
                }
                if images.is_empty() {
                    self.teardown();
                    return Ok(());
                }
                let job = Job::save(images);
                let job_id = job.id();
                self.submit(job);
                self.state.close_after_save = Some(job_id);
            }
            CloseResponse::Discard => self.teardown(),
            CloseResponse::Cancel => tracing::debug!("Close cancelled"),
        }
        Ok(())
    }

    /// Cancel every job, detach everything and destroy the window.
    pub fn teardown(&mut self) {
        if self.state.closed {
            return;
        }
        for slot in JobSlot::ALL {
            self.release_slot(slot);
        }
        self.release_displayed();
        self.plugins.deactivate_all(&self.handle);
        self.state.banner = None;
        self.state.closed = true;
        self.toolkit.destroy();
        tracing::info!("Window closed");
    }

    pub(super) fn ensure_open(&self) -> WindowResult<()> {
        if self.state.closed {
            Err(WindowError::Closed)
        } else {
            Ok(())
        }
    }

    /// Title used when no image is shown.
    pub(super) fn reset_title(&mut self) {
        self.set_title(APP_NAME.to_string());
    }
}

impl Drop for WindowController {
    fn drop(&mut self) {
        self.teardown();
    }
}
