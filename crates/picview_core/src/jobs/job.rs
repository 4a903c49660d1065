//! Job handle: one outstanding asynchronous operation.

use std::fmt;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::images::{ImageId, ImageRef, Transform};
use crate::signals::{SignalHub, Subscription};

/// Unique job identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct JobId(Uuid);

impl JobId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// What kind of work a job does.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobCategory {
    Load,
    Transform,
    Save,
    SaveAs,
    Copy,
}

impl JobCategory {
    /// The window slot this category occupies. Save and SaveAs share one.
    pub fn slot(self) -> JobSlot {
        match self {
            JobCategory::Load => JobSlot::Load,
            JobCategory::Transform => JobSlot::Transform,
            JobCategory::Save | JobCategory::SaveAs => JobSlot::Save,
            JobCategory::Copy => JobSlot::Copy,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            JobCategory::Load => "load",
            JobCategory::Transform => "transform",
            JobCategory::Save => "save",
            JobCategory::SaveAs => "save-as",
            JobCategory::Copy => "copy",
        }
    }
}

/// Single-flight slot in a window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobSlot {
    Load,
    Transform,
    Save,
    Copy,
}

impl JobSlot {
    pub const ALL: [JobSlot; 4] = [JobSlot::Load, JobSlot::Transform, JobSlot::Save, JobSlot::Copy];

    pub fn name(&self) -> &'static str {
        match self {
            JobSlot::Load => "load",
            JobSlot::Transform => "transform",
            JobSlot::Save => "save",
            JobSlot::Copy => "copy",
        }
    }
}

impl fmt::Display for JobSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Where Save As writes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SaveAsTarget {
    /// A single image to an explicit file.
    File(PathBuf),
    /// Every image into a folder, keeping file stems. `extension`
    /// converts to another format.
    Folder {
        dir: PathBuf,
        extension: Option<String>,
    },
}

impl SaveAsTarget {
    /// Folder the target writes into.
    pub fn folder(&self) -> Option<PathBuf> {
        match self {
            SaveAsTarget::File(path) => path.parent().map(PathBuf::from),
            SaveAsTarget::Folder { dir, .. } => Some(dir.clone()),
        }
    }
}

/// Job payload.
#[derive(Debug)]
pub enum JobKind {
    Load {
        image: ImageRef,
    },
    /// `None` reverts the last transform.
    Transform {
        images: Vec<ImageRef>,
        transform: Option<Transform>,
    },
    Save {
        images: Vec<ImageRef>,
    },
    SaveAs {
        images: Vec<ImageRef>,
        target: SaveAsTarget,
    },
    /// Copy files into `dest_dir`. With `stem`, each copy is named
    /// `<stem>.<original extension>`.
    Copy {
        files: Vec<PathBuf>,
        dest_dir: PathBuf,
        stem: Option<String>,
    },
}

impl JobKind {
    pub fn category(&self) -> JobCategory {
        match self {
            JobKind::Load { .. } => JobCategory::Load,
            JobKind::Transform { .. } => JobCategory::Transform,
            JobKind::Save { .. } => JobCategory::Save,
            JobKind::SaveAs { .. } => JobCategory::SaveAs,
            JobKind::Copy { .. } => JobCategory::Copy,
        }
    }

    /// Images the job works on. Empty for copies.
    pub fn images(&self) -> &[ImageRef] {
        match self {
            JobKind::Load { image } => std::slice::from_ref(image),
            JobKind::Transform { images, .. }
            | JobKind::Save { images }
            | JobKind::SaveAs { images, .. } => images,
            JobKind::Copy { .. } => &[],
        }
    }

    /// Number of work items.
    pub fn len(&self) -> usize {
        match self {
            JobKind::Copy { files, .. } => files.len(),
            other => other.images().len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Signal emitted by a job.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum JobSignal {
    Progress(f32),
    Finished,
}

/// Why a job failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobFailure {
    pub message: String,
    /// First image that failed, for batch jobs.
    pub image: Option<ImageId>,
    pub caption: Option<String>,
}

impl JobFailure {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            image: None,
            caption: None,
        }
    }

    pub fn for_image(image: &ImageRef, message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            image: Some(image.id()),
            caption: Some(image.caption()),
        }
    }
}

/// Terminal state of a job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobOutcome {
    Success,
    Failure(JobFailure),
    Cancelled,
}

impl JobOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, JobOutcome::Success)
    }
}

/// Result of one item in a batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemResult {
    pub index: usize,
    pub image: Option<ImageId>,
    pub error: Option<String>,
}

impl ItemResult {
    pub fn succeeded(&self) -> bool {
        self.error.is_none()
    }
}

#[derive(Debug, Default)]
struct JobProgress {
    progress: f32,
    current: usize,
    items: Vec<ItemResult>,
    output: Option<PathBuf>,
    outcome: Option<JobOutcome>,
}

/// A unit of asynchronous work.
///
/// Created by the window, executed by a [`JobQueue`](super::JobQueue).
/// The executor reports with [`emit_progress`](Job::emit_progress) and
/// ends with exactly one [`finish`](Job::finish).
pub struct Job {
    id: JobId,
    kind: JobKind,
    cancelled: AtomicBool,
    finished: AtomicBool,
    progress: Mutex<JobProgress>,
    signals: SignalHub<JobSignal>,
}

impl Job {
    pub fn new(kind: JobKind) -> Arc<Self> {
        Arc::new(Self {
            id: JobId::new(),
            kind,
            cancelled: AtomicBool::new(false),
            finished: AtomicBool::new(false),
            progress: Mutex::new(JobProgress::default()),
            signals: SignalHub::new(),
        })
    }

    pub fn load(image: ImageRef) -> Arc<Self> {
        Self::new(JobKind::Load { image })
    }

    pub fn transform(images: Vec<ImageRef>, transform: Option<Transform>) -> Arc<Self> {
        Self::new(JobKind::Transform { images, transform })
    }

    pub fn save(images: Vec<ImageRef>) -> Arc<Self> {
        Self::new(JobKind::Save { images })
    }

    pub fn save_as(images: Vec<ImageRef>, target: SaveAsTarget) -> Arc<Self> {
        Self::new(JobKind::SaveAs { images, target })
    }

    pub fn copy(files: Vec<PathBuf>, dest_dir: PathBuf, stem: Option<String>) -> Arc<Self> {
        Self::new(JobKind::Copy {
            files,
            dest_dir,
            stem,
        })
    }

    pub fn id(&self) -> JobId {
        self.id
    }

    pub fn kind(&self) -> &JobKind {
        &self.kind
    }

    pub fn category(&self) -> JobCategory {
        self.kind.category()
    }

    /// Ask the executor to stop at the next item boundary.
    pub fn request_cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    pub fn is_finished(&self) -> bool {
        self.finished.load(Ordering::SeqCst)
    }

    pub fn progress(&self) -> f32 {
        self.progress.lock().progress
    }

    /// Index of the item being worked on.
    pub fn current_index(&self) -> usize {
        self.progress.lock().current
    }

    pub fn set_current(&self, index: usize) {
        self.progress.lock().current = index;
    }

    /// Store progress (clamped to `[0, 1]`) and notify listeners.
    pub fn emit_progress(&self, value: f32) {
        if self.is_finished() {
            return;
        }
        let value = value.clamp(0.0, 1.0);
        self.progress.lock().progress = value;
        self.signals.emit(&JobSignal::Progress(value));
    }

    pub fn record_item(&self, index: usize, image: Option<ImageId>, error: Option<String>) {
        self.progress.lock().items.push(ItemResult {
            index,
            image,
            error,
        });
    }

    pub fn items(&self) -> Vec<ItemResult> {
        self.progress.lock().items.clone()
    }

    /// File produced by the job, for copies.
    pub fn output(&self) -> Option<PathBuf> {
        self.progress.lock().output.clone()
    }

    pub fn set_output(&self, path: PathBuf) {
        self.progress.lock().output = Some(path);
    }

    pub fn outcome(&self) -> Option<JobOutcome> {
        self.progress.lock().outcome.clone()
    }

    /// Outcome derived from recorded items: success unless an item
    /// failed, in which case the first failure is reported.
    pub fn outcome_from_items(&self) -> JobOutcome {
        let progress = self.progress.lock();
        match progress.items.iter().find(|item| !item.succeeded()) {
            None => JobOutcome::Success,
            Some(failed) => {
                let image = self
                    .kind
                    .images()
                    .iter()
                    .find(|img| Some(img.id()) == failed.image);
                JobFailure {
                    message: failed.error.clone().unwrap_or_default(),
                    image: failed.image,
                    caption: image.map(|img| img.caption()),
                }
                .into()
            }
        }
    }

    /// Record the terminal outcome and emit `Finished`.
    ///
    /// Only the first call has any effect; returns false for later calls.
    pub fn finish(&self, outcome: JobOutcome) -> bool {
        if self.finished.swap(true, Ordering::SeqCst) {
            tracing::warn!("Job {} finished twice; ignoring", self.id);
            return false;
        }
        {
            let mut progress = self.progress.lock();
            if outcome.is_success() {
                progress.progress = 1.0;
            }
            progress.outcome = Some(outcome);
        }
        self.signals.emit(&JobSignal::Finished);
        true
    }

    pub fn subscribe<F>(&self, listener: F) -> Subscription
    where
        F: Fn(&JobSignal) + Send + Sync + 'static,
    {
        self.signals.subscribe(listener)
    }

    pub fn unsubscribe(&self, subscription: Subscription) -> bool {
        self.signals.unsubscribe(subscription)
    }

    pub fn listener_count(&self) -> usize {
        self.signals.len()
    }
}

impl From<JobFailure> for JobOutcome {
    fn from(failure: JobFailure) -> Self {
        JobOutcome::Failure(failure)
    }
}

impl fmt::Debug for Job {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Job")
            .field("id", &self.id)
            .field("category", &self.category())
            .field("items", &self.kind.len())
            .field("finished", &self.is_finished())
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::images::testing::FakeImage;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn save_and_save_as_share_a_slot() {
        assert_eq!(JobCategory::Save.slot(), JobSlot::Save);
        assert_eq!(JobCategory::SaveAs.slot(), JobSlot::Save);
        assert_ne!(JobCategory::Load.slot(), JobCategory::Transform.slot());
    }

    #[test]
    fn finish_fires_once() {
        let job = Job::copy(vec![PathBuf::from("a.png")], PathBuf::from("/tmp"), None);
        let finished = Arc::new(AtomicUsize::new(0));
        let f = Arc::clone(&finished);
        let _sub = job.subscribe(move |signal| {
            if *signal == JobSignal::Finished {
                f.fetch_add(1, Ordering::SeqCst);
            }
        });

        assert!(job.finish(JobOutcome::Success));
        assert!(!job.finish(JobOutcome::Cancelled));
        assert_eq!(finished.load(Ordering::SeqCst), 1);
        assert_eq!(job.outcome(), Some(JobOutcome::Success));
        assert_eq!(job.progress(), 1.0);
    }

    #[test]
    fn progress_is_clamped_and_stops_after_finish() {
        let job = Job::load(FakeImage::new("a.png"));
        job.emit_progress(1.5);
        assert_eq!(job.progress(), 1.0);
        job.emit_progress(-1.0);
        assert_eq!(job.progress(), 0.0);

        job.finish(JobOutcome::Cancelled);
        job.emit_progress(0.5);
        assert_eq!(job.progress(), 0.0);
    }

    #[test]
    fn outcome_from_items_reports_first_failure() {
        let a: ImageRef = FakeImage::new("a.png");
        let b: ImageRef = FakeImage::new("b.png");
        let job = Job::save(vec![a.clone(), b.clone()]);

        job.record_item(0, Some(a.id()), None);
        assert_eq!(job.outcome_from_items(), JobOutcome::Success);

        job.record_item(1, Some(b.id()), Some("disk full".to_string()));
        match job.outcome_from_items() {
            JobOutcome::Failure(failure) => {
                assert_eq!(failure.image, Some(b.id()));
                assert_eq!(failure.caption.as_deref(), Some("b.png"));
                assert_eq!(failure.message, "disk full");
            }
            other => panic!("expected failure, got {other:?}"),
        }
    }

    #[test]
    fn save_as_target_folder() {
        let file = SaveAsTarget::File(PathBuf::from("/out/x.png"));
        assert_eq!(file.folder(), Some(PathBuf::from("/out")));
        let folder = SaveAsTarget::Folder {
            dir: PathBuf::from("/out"),
            extension: Some("jpg".into()),
        };
        assert_eq!(folder.folder(), Some(PathBuf::from("/out")));
    }
}
