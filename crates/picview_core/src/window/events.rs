//! Events delivered to the window loop.

use crate::images::{ImageEvent, ImageId};
use crate::jobs::{JobId, JobSignal};

/// Commands plugins and front ends can post to a window.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Command {
    Select(usize),
    GoNext,
    GoPrevious,
    GoFirst,
    GoLast,
    Save,
    SaveAs,
    Rotate90,
    Rotate270,
    FlipHorizontal,
    FlipVertical,
    Undo,
    Reload,
    SetAsWallpaper,
    MoveToTrash,
    Delete,
    ToggleFullscreen,
    StartSlideshow,
    PauseSlideshow,
    StopFullscreen,
    SlideshowTick,
    ToggleGallery,
    SetZoom(f64),
}

/// One unit of work for the window loop.
#[derive(Debug, Clone)]
pub enum WindowEvent {
    /// Forwarded from a job subscription.
    Job { job_id: JobId, signal: JobSignal },
    /// Forwarded from the displayed image's subscription.
    Image { image_id: ImageId, event: ImageEvent },
    Command(Command),
}
