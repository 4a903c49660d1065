//! Window state mutated by the controller.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::Serialize;

use crate::images::{ImageId, ImageRef};
use crate::jobs::{Job, JobId, JobSlot};
use crate::signals::Subscription;

/// Presentation mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WindowMode {
    #[default]
    Normal,
    Fullscreen,
    Slideshow,
}

/// Startup status. Leaves `Init` on the first resolved load.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WindowStatus {
    #[default]
    Init,
    Normal,
}

/// Owner of a status bar message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StatusContext {
    ImageInfo,
    Saving,
    CopyFile,
}

/// Status bar messages, newest last. Each context pops only its own.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StatusStack {
    entries: Vec<(StatusContext, String)>,
}

impl StatusStack {
    pub fn push(&mut self, context: StatusContext, text: impl Into<String>) {
        self.entries.push((context, text.into()));
    }

    /// Remove the newest message of `context`.
    pub fn pop(&mut self, context: StatusContext) -> Option<String> {
        let index = self.entries.iter().rposition(|(c, _)| *c == context)?;
        Some(self.entries.remove(index).1)
    }

    /// Drop every message of `context`.
    pub fn remove_all(&mut self, context: StatusContext) {
        self.entries.retain(|(c, _)| *c != context);
    }

    pub fn top(&self) -> Option<&str> {
        self.entries.last().map(|(_, text)| text.as_str())
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// What a banner is about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BannerKind {
    LoadError,
    SaveError,
    TransformError,
    CopyError,
    FileChanged,
}

/// Action a banner offers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Remedy {
    Reload,
    SaveAs,
}

/// User answer to a banner.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BannerResponse {
    Reload,
    SaveAs,
    Dismiss,
}

/// Dismissible message scoped to one image.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Banner {
    pub kind: BannerKind,
    pub image: Option<ImageId>,
    pub caption: String,
    pub message: String,
    pub remedy: Option<Remedy>,
}

/// Job occupying a slot, with the token forwarding its signals.
#[derive(Debug)]
pub struct ActiveJob {
    pub job: Arc<Job>,
    pub subscription: Subscription,
    /// Last item index shown in the status bar.
    pub reported_item: Option<usize>,
    /// Status message this job pushed, popped on release.
    pub status: Option<StatusContext>,
}

/// Single-flight job slots.
#[derive(Debug, Default)]
pub struct JobSlots {
    slots: BTreeMap<JobSlot, ActiveJob>,
}

impl JobSlots {
    pub fn get(&self, slot: JobSlot) -> Option<&ActiveJob> {
        self.slots.get(&slot)
    }

    pub fn get_mut(&mut self, slot: JobSlot) -> Option<&mut ActiveJob> {
        self.slots.get_mut(&slot)
    }

    pub fn is_occupied(&self, slot: JobSlot) -> bool {
        self.slots.contains_key(&slot)
    }

    /// Slot holding `job_id`, if any.
    pub fn find(&self, job_id: JobId) -> Option<JobSlot> {
        self.slots
            .iter()
            .find(|(_, active)| active.job.id() == job_id)
            .map(|(slot, _)| *slot)
    }

    /// Whether `job_id` currently occupies `slot`.
    pub fn holds(&self, slot: JobSlot, job_id: JobId) -> bool {
        self.get(slot).is_some_and(|active| active.job.id() == job_id)
    }

    /// Install into an empty slot. Returns the job back if occupied.
    pub fn install(&mut self, slot: JobSlot, active: ActiveJob) -> Result<(), ActiveJob> {
        if self.is_occupied(slot) {
            return Err(active);
        }
        self.slots.insert(slot, active);
        Ok(())
    }

    pub fn take(&mut self, slot: JobSlot) -> Option<ActiveJob> {
        self.slots.remove(&slot)
    }

    pub fn occupied(&self) -> Vec<JobSlot> {
        self.slots.keys().copied().collect()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}

/// Image on screen, with the token for its notifications.
#[derive(Debug)]
pub struct Displayed {
    pub image: ImageRef,
    pub subscription: Subscription,
}

/// Mutable state of one window.
#[derive(Debug)]
pub struct WindowState {
    pub mode: WindowMode,
    pub status: WindowStatus,
    pub displayed: Option<Displayed>,
    /// Cleared while a file-changed banner waits for an answer.
    pub needs_reload_confirmation: bool,
    /// False after a failed load until the next successful display.
    pub image_actions_enabled: bool,
    pub slots: JobSlots,
    pub banner: Option<Banner>,
    pub progress: f32,
    pub status_stack: StatusStack,
    pub title: String,
    pub icon: Option<ImageId>,
    /// "prepared" has been announced.
    pub prepared: bool,
    pub zoom: f64,
    pub closed: bool,
    /// Save job whose success closes the window.
    pub close_after_save: Option<JobId>,
}

impl Default for WindowState {
    fn default() -> Self {
        Self {
            mode: WindowMode::Normal,
            status: WindowStatus::Init,
            displayed: None,
            needs_reload_confirmation: true,
            image_actions_enabled: true,
            slots: JobSlots::default(),
            banner: None,
            progress: 0.0,
            status_stack: StatusStack::default(),
            title: String::new(),
            icon: None,
            prepared: false,
            zoom: 1.0,
            closed: false,
            close_after_save: None,
        }
    }
}

impl WindowState {
    pub fn displayed_image(&self) -> Option<&ImageRef> {
        self.displayed.as_ref().map(|d| &d.image)
    }

    pub fn displayed_id(&self) -> Option<ImageId> {
        self.displayed_image().map(|image| image.id())
    }

    pub fn is_busy(&self, slot: JobSlot) -> bool {
        self.slots.is_occupied(slot)
    }
}
