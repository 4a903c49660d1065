//! Image resources shown by the window.
//!
//! The window never decodes pixels itself. It talks to images through the
//! [`ImageResource`] trait: read accessors for the UI, notifications for
//! thumbnail and on-disk changes, and the worker-side operations a job
//! runner calls. [`Picture`] is the file-backed implementation.

mod picture;

pub use picture::{collect_pictures, Picture};

use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::signals::Subscription;

/// Shared handle to an image resource.
pub type ImageRef = Arc<dyn ImageResource>;

/// Listener for image notifications.
pub type ImageListener = Box<dyn Fn(&ImageEvent) + Send + Sync>;

/// Unique image identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ImageId(Uuid);

impl ImageId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ImageId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ImageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Notifications an image emits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageEvent {
    /// A thumbnail became available or changed.
    ThumbnailChanged,
    /// The backing file changed on disk.
    FileChanged,
}

/// Geometric transform applied to image pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Transform {
    Rotate90,
    Rotate270,
    FlipHorizontal,
    FlipVertical,
}

impl Transform {
    /// The transform that undoes this one.
    pub fn inverse(self) -> Self {
        match self {
            Transform::Rotate90 => Transform::Rotate270,
            Transform::Rotate270 => Transform::Rotate90,
            Transform::FlipHorizontal => Transform::FlipHorizontal,
            Transform::FlipVertical => Transform::FlipVertical,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Transform::Rotate90 => "rotate-90",
            Transform::Rotate270 => "rotate-270",
            Transform::FlipHorizontal => "flip-horizontal",
            Transform::FlipVertical => "flip-vertical",
        }
    }
}

/// Errors from worker-side image operations.
#[derive(Error, Debug)]
pub enum PictureError {
    #[error("Failed to access '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Failed to decode '{path}': {source}")]
    Decode {
        path: PathBuf,
        #[source]
        source: ::image::ImageError,
    },

    #[error("Failed to encode '{path}': {source}")]
    Encode {
        path: PathBuf,
        #[source]
        source: ::image::ImageError,
    },

    #[error("Unsupported image format for '{0}'")]
    UnsupportedFormat(PathBuf),

    #[error("Nothing to undo")]
    NothingToUndo,

    #[error("Image has no local file")]
    NoFile,

    #[error("Loading was cancelled")]
    Cancelled,
}

impl PictureError {
    pub fn io(path: impl AsRef<Path>, source: io::Error) -> Self {
        Self::Io {
            path: path.as_ref().to_path_buf(),
            source,
        }
    }
}

/// An image the window can display, transform and save.
///
/// Accessors are called from the window loop; `load`, `transform` and
/// `save` are called from job workers.
pub trait ImageResource: Send + Sync {
    fn id(&self) -> ImageId;

    /// Short human readable name, usually the file name.
    fn caption(&self) -> String;

    /// Location suitable for messages.
    fn uri_for_display(&self) -> String;

    /// Local file backing the image, if any.
    fn path(&self) -> Option<PathBuf>;

    /// True when pixels differ from what is on disk.
    fn is_modified(&self) -> bool;

    /// True when pixels are decoded and ready to display.
    fn is_loaded(&self) -> bool;

    fn dimensions(&self) -> Option<(u32, u32)>;

    /// Size of the backing file in bytes.
    fn byte_size(&self) -> u64;

    fn has_thumbnail(&self) -> bool;

    /// Abandon an in-flight decode. Results of a load that started before
    /// this call are discarded.
    fn cancel_load(&self);

    /// Clear the modified flag after a successful save.
    fn mark_saved(&self);

    fn subscribe(&self, listener: ImageListener) -> Subscription;

    fn unsubscribe(&self, subscription: Subscription) -> bool;

    /// Decode pixels from the backing file.
    fn load(&self) -> Result<(), PictureError>;

    /// Apply `op`, or revert the last transform when `op` is `None`.
    fn transform(&self, op: Option<Transform>) -> Result<(), PictureError>;

    /// Write pixels to `destination`, or back to the backing file.
    fn save(&self, destination: Option<&Path>) -> Result<(), PictureError>;
}

impl fmt::Debug for dyn ImageResource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ImageResource")
            .field("id", &self.id())
            .field("caption", &self.caption())
            .finish()
    }
}

#[cfg(test)]
pub(crate) mod testing {
    //! In-memory image used by controller tests.

    use super::*;
    use crate::signals::SignalHub;
    use parking_lot::Mutex;

    #[derive(Debug, Default)]
    struct FakeState {
        modified: bool,
        loaded: bool,
        load_cancels: usize,
        saves: usize,
        fail_save: bool,
        fail_load: bool,
        thumbnail: bool,
    }

    pub struct FakeImage {
        id: ImageId,
        caption: String,
        path: Option<PathBuf>,
        state: Mutex<FakeState>,
        signals: SignalHub<ImageEvent>,
    }

    impl FakeImage {
        pub fn new(caption: &str) -> Arc<Self> {
            Arc::new(Self {
                id: ImageId::new(),
                caption: caption.to_string(),
                path: Some(PathBuf::from(format!("/pictures/{caption}"))),
                state: Mutex::new(FakeState::default()),
                signals: SignalHub::new(),
            })
        }

        /// Image backed by `path`, for tests that touch real files.
        pub fn with_path(caption: &str, path: impl Into<PathBuf>) -> Arc<Self> {
            Arc::new(Self {
                id: ImageId::new(),
                caption: caption.to_string(),
                path: Some(path.into()),
                state: Mutex::new(FakeState::default()),
                signals: SignalHub::new(),
            })
        }

        pub fn loaded(caption: &str) -> Arc<Self> {
            let image = Self::new(caption);
            image.state.lock().loaded = true;
            image
        }

        pub fn set_modified(&self, modified: bool) {
            self.state.lock().modified = modified;
        }

        pub fn set_loaded(&self, loaded: bool) {
            self.state.lock().loaded = loaded;
        }

        pub fn fail_save(&self) {
            self.state.lock().fail_save = true;
        }

        pub fn fail_load(&self) {
            self.state.lock().fail_load = true;
        }

        pub fn load_cancels(&self) -> usize {
            self.state.lock().load_cancels
        }

        pub fn saves(&self) -> usize {
            self.state.lock().saves
        }

        pub fn listeners(&self) -> usize {
            self.signals.len()
        }

        pub fn emit(&self, event: ImageEvent) {
            self.signals.emit(&event);
        }
    }

    impl ImageResource for FakeImage {
        fn id(&self) -> ImageId {
            self.id
        }

        fn caption(&self) -> String {
            self.caption.clone()
        }

        fn uri_for_display(&self) -> String {
            format!("file:///pictures/{}", self.caption)
        }

        fn path(&self) -> Option<PathBuf> {
            self.path.clone()
        }

        fn is_modified(&self) -> bool {
            self.state.lock().modified
        }

        fn is_loaded(&self) -> bool {
            self.state.lock().loaded
        }

        fn dimensions(&self) -> Option<(u32, u32)> {
            self.is_loaded().then_some((640, 480))
        }

        fn byte_size(&self) -> u64 {
            2048
        }

        fn has_thumbnail(&self) -> bool {
            self.state.lock().thumbnail
        }

        fn cancel_load(&self) {
            self.state.lock().load_cancels += 1;
        }

        fn mark_saved(&self) {
            self.state.lock().modified = false;
        }

        fn subscribe(&self, listener: ImageListener) -> Subscription {
            self.signals.subscribe(listener)
        }

        fn unsubscribe(&self, subscription: Subscription) -> bool {
            self.signals.unsubscribe(subscription)
        }

        fn load(&self) -> Result<(), PictureError> {
            let mut state = self.state.lock();
            if state.fail_load {
                return Err(PictureError::UnsupportedFormat(PathBuf::from(&self.caption)));
            }
            state.loaded = true;
            state.thumbnail = true;
            Ok(())
        }

        fn transform(&self, op: Option<Transform>) -> Result<(), PictureError> {
            let mut state = self.state.lock();
            match op {
                Some(_) => state.modified = true,
                None if state.modified => state.modified = false,
                None => return Err(PictureError::NothingToUndo),
            }
            Ok(())
        }

        fn save(&self, _destination: Option<&Path>) -> Result<(), PictureError> {
            let mut state = self.state.lock();
            if state.fail_save {
                return Err(PictureError::io(
                    &self.caption,
                    io::Error::new(io::ErrorKind::PermissionDenied, "read-only"),
                ));
            }
            state.saves += 1;
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transform_inverse_round_trips() {
        for t in [
            Transform::Rotate90,
            Transform::Rotate270,
            Transform::FlipHorizontal,
            Transform::FlipVertical,
        ] {
            assert_eq!(t.inverse().inverse(), t);
        }
        assert_eq!(Transform::Rotate90.inverse(), Transform::Rotate270);
    }

    #[test]
    fn image_ids_are_unique() {
        assert_ne!(ImageId::new(), ImageId::new());
    }
}
