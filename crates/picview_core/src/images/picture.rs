//! File-backed image resource.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::SystemTime;

use ::image::{DynamicImage, ImageFormat};
use parking_lot::Mutex;

use super::{ImageEvent, ImageId, ImageListener, ImageResource, PictureError, Transform};
use crate::signals::{SignalHub, Subscription};

const THUMBNAIL_SIZE: u32 = 128;

#[derive(Default)]
struct PictureState {
    path: PathBuf,
    pixels: Option<Arc<DynamicImage>>,
    thumbnail: Option<DynamicImage>,
    modified: bool,
    undo: Vec<Transform>,
    /// Undo depth matching the file on disk; `None` once that state can
    /// no longer be reached by undoing.
    saved_depth: Option<usize>,
    /// Undo depth of the last successful write, committed by `mark_saved`.
    written_depth: Option<usize>,
    byte_size: u64,
    mtime: Option<SystemTime>,
}

/// An image stored in a local file and decoded with the `image` crate.
pub struct Picture {
    id: ImageId,
    /// Bumped by `cancel_load`; a load that sees a different value on
    /// completion drops its result.
    generation: AtomicU64,
    state: Mutex<PictureState>,
    signals: SignalHub<ImageEvent>,
}

impl Picture {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let meta = fs::metadata(&path).ok();
        Self {
            id: ImageId::new(),
            generation: AtomicU64::new(0),
            state: Mutex::new(PictureState {
                byte_size: meta.as_ref().map(|m| m.len()).unwrap_or(0),
                mtime: meta.and_then(|m| m.modified().ok()),
                path,
                ..Default::default()
            }),
            signals: SignalHub::new(),
        }
    }

    /// Whether the `image` crate can decode files with this extension.
    pub fn is_supported(path: &Path) -> bool {
        ImageFormat::from_path(path)
            .map(|format| format.reading_enabled())
            .unwrap_or(false)
    }

    /// Compare the file's modification time with the last one seen and
    /// emit `FileChanged` when it moved. Returns true if it changed.
    pub fn check_for_changes(&self) -> bool {
        let changed = {
            let mut state = self.state.lock();
            let current = fs::metadata(&state.path)
                .and_then(|m| m.modified())
                .ok();
            if current.is_some() && current != state.mtime {
                state.mtime = current;
                true
            } else {
                false
            }
        };
        if changed {
            tracing::debug!("{} changed on disk", self.caption());
            self.signals.emit(&ImageEvent::FileChanged);
        }
        changed
    }

    /// Pixels to work on, decoding first if needed. The lock is not held
    /// while the caller encodes or transforms them.
    fn pixels(&self) -> Result<Arc<DynamicImage>, PictureError> {
        self.ensure_pixels()?;
        self.state
            .lock()
            .pixels
            .clone()
            .ok_or(PictureError::Cancelled)
    }

    fn ensure_pixels(&self) -> Result<(), PictureError> {
        if self.is_loaded() {
            Ok(())
        } else {
            self.load()
        }
    }
}

fn apply(pixels: &DynamicImage, op: Transform) -> DynamicImage {
    match op {
        Transform::Rotate90 => pixels.rotate90(),
        Transform::Rotate270 => pixels.rotate270(),
        Transform::FlipHorizontal => pixels.fliph(),
        Transform::FlipVertical => pixels.flipv(),
    }
}

/// Encode to a sibling temp file, then rename over the target.
fn write_atomically(pixels: &DynamicImage, target: &Path) -> Result<(), PictureError> {
    let format = ImageFormat::from_path(target)
        .map_err(|_| PictureError::UnsupportedFormat(target.to_path_buf()))?;
    if !format.writing_enabled() {
        return Err(PictureError::UnsupportedFormat(target.to_path_buf()));
    }

    let file_name = target
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let temp_path = target.with_file_name(format!(".{file_name}.picview-tmp"));

    // JPEG has no alpha channel.
    let result = if format == ImageFormat::Jpeg && pixels.color().has_alpha() {
        DynamicImage::ImageRgb8(pixels.to_rgb8()).save_with_format(&temp_path, format)
    } else {
        pixels.save_with_format(&temp_path, format)
    };
    if let Err(source) = result {
        let _ = fs::remove_file(&temp_path);
        return Err(PictureError::Encode {
            path: target.to_path_buf(),
            source,
        });
    }

    fs::rename(&temp_path, target).map_err(|e| PictureError::io(target, e))
}

impl ImageResource for Picture {
    fn id(&self) -> ImageId {
        self.id
    }

    fn caption(&self) -> String {
        let state = self.state.lock();
        state
            .path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| state.path.display().to_string())
    }

    fn uri_for_display(&self) -> String {
        self.state.lock().path.display().to_string()
    }

    fn path(&self) -> Option<PathBuf> {
        Some(self.state.lock().path.clone())
    }

    fn is_modified(&self) -> bool {
        self.state.lock().modified
    }

    fn is_loaded(&self) -> bool {
        self.state.lock().pixels.is_some()
    }

    fn dimensions(&self) -> Option<(u32, u32)> {
        self.state
            .lock()
            .pixels
            .as_ref()
            .map(|p| (p.width(), p.height()))
    }

    fn byte_size(&self) -> u64 {
        self.state.lock().byte_size
    }

    fn has_thumbnail(&self) -> bool {
        self.state.lock().thumbnail.is_some()
    }

    fn cancel_load(&self) {
        self.generation.fetch_add(1, Ordering::SeqCst);
    }

    fn mark_saved(&self) {
        let mut state = self.state.lock();
        state.saved_depth = state.written_depth.take().or(Some(state.undo.len()));
        state.modified = state.saved_depth != Some(state.undo.len());
    }

    fn subscribe(&self, listener: ImageListener) -> Subscription {
        self.signals.subscribe(listener)
    }

    fn unsubscribe(&self, subscription: Subscription) -> bool {
        self.signals.unsubscribe(subscription)
    }

    fn load(&self) -> Result<(), PictureError> {
        let generation = self.generation.load(Ordering::SeqCst);
        let path = self.state.lock().path.clone();

        let pixels = ::image::open(&path).map_err(|source| PictureError::Decode {
            path: path.clone(),
            source,
        })?;
        let thumbnail = pixels.thumbnail(THUMBNAIL_SIZE, THUMBNAIL_SIZE);
        let meta = fs::metadata(&path).map_err(|e| PictureError::io(&path, e))?;

        {
            let mut state = self.state.lock();
            if generation != self.generation.load(Ordering::SeqCst) {
                tracing::debug!("Discarding cancelled load of {}", path.display());
                return Err(PictureError::Cancelled);
            }
            state.pixels = Some(Arc::new(pixels));
            state.thumbnail = Some(thumbnail);
            state.modified = false;
            state.undo.clear();
            state.saved_depth = Some(0);
            state.written_depth = None;
            state.byte_size = meta.len();
            state.mtime = meta.modified().ok();
        }

        self.signals.emit(&ImageEvent::ThumbnailChanged);
        Ok(())
    }

    fn transform(&self, op: Option<Transform>) -> Result<(), PictureError> {
        let pixels = self.pixels()?;
        let step = match op {
            Some(op) => op,
            None => self
                .state
                .lock()
                .undo
                .last()
                .copied()
                .ok_or(PictureError::NothingToUndo)?
                .inverse(),
        };

        let transformed = apply(&pixels, step);
        let thumbnail = transformed.thumbnail(THUMBNAIL_SIZE, THUMBNAIL_SIZE);

        {
            let mut state = self.state.lock();
            if !state
                .pixels
                .as_ref()
                .is_some_and(|current| Arc::ptr_eq(current, &pixels))
            {
                tracing::debug!("{} changed during transform", state.path.display());
                return Err(PictureError::Cancelled);
            }
            state.pixels = Some(Arc::new(transformed));
            state.thumbnail = Some(thumbnail);

            match op {
                Some(op) => {
                    if state.saved_depth.is_some_and(|depth| depth > state.undo.len()) {
                        state.saved_depth = None;
                    }
                    state.undo.push(op);
                }
                None => {
                    state.undo.pop();
                }
            }
            state.modified = state.saved_depth != Some(state.undo.len());
        }
        self.signals.emit(&ImageEvent::ThumbnailChanged);
        Ok(())
    }

    fn save(&self, destination: Option<&Path>) -> Result<(), PictureError> {
        if destination.is_none() && !self.is_modified() {
            return Ok(());
        }
        let pixels = self.pixels()?;
        let (target, depth) = {
            let state = self.state.lock();
            let target = destination
                .map(Path::to_path_buf)
                .unwrap_or_else(|| state.path.clone());
            (target, state.undo.len())
        };

        write_atomically(&pixels, &target)?;
        let meta = fs::metadata(&target).map_err(|e| PictureError::io(&target, e))?;

        let mut state = self.state.lock();
        state.byte_size = meta.len();
        state.mtime = meta.modified().ok();
        state.written_depth = Some(depth);
        if destination.is_some() {
            state.path = target;
        }
        Ok(())
    }
}

/// Expand files and directories into pictures, in path order.
///
/// Directories contribute every supported file directly inside them;
/// unsupported files given explicitly are skipped.
pub fn collect_pictures(paths: &[PathBuf]) -> Result<Vec<Arc<Picture>>, PictureError> {
    let mut files = Vec::new();
    for path in paths {
        if path.is_dir() {
            let mut entries: Vec<PathBuf> = fs::read_dir(path)
                .map_err(|e| PictureError::io(path, e))?
                .filter_map(|entry| entry.ok().map(|e| e.path()))
                .filter(|p| p.is_file() && Picture::is_supported(p))
                .collect();
            entries.sort();
            files.extend(entries);
        } else if Picture::is_supported(path) {
            files.push(path.clone());
        } else {
            tracing::warn!("Skipping unsupported file {}", path.display());
        }
    }
    Ok(files.into_iter().map(|p| Arc::new(Picture::new(p))).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use ::image::RgbImage;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;
    use tempfile::tempdir;

    fn write_png(path: &Path, width: u32, height: u32) {
        RgbImage::new(width, height).save(path).unwrap();
    }

    #[test]
    fn load_reads_dimensions_and_thumbnail() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("a.png");
        write_png(&path, 4, 2);

        let picture = Picture::new(&path);
        assert!(!picture.is_loaded());

        let thumbs = Arc::new(AtomicUsize::new(0));
        let t = Arc::clone(&thumbs);
        let _sub = picture.subscribe(Box::new(move |event| {
            if *event == ImageEvent::ThumbnailChanged {
                t.fetch_add(1, Ordering::SeqCst);
            }
        }));

        picture.load().unwrap();
        assert_eq!(picture.dimensions(), Some((4, 2)));
        assert!(picture.has_thumbnail());
        assert!(picture.byte_size() > 0);
        assert_eq!(thumbs.load(Ordering::SeqCst), 1);
        assert_eq!(picture.caption(), "a.png");
    }

    #[test]
    fn load_of_garbage_fails() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("broken.png");
        fs::write(&path, b"not a png").unwrap();

        let picture = Picture::new(&path);
        assert!(matches!(picture.load(), Err(PictureError::Decode { .. })));
        assert!(!picture.is_loaded());
    }

    #[test]
    fn transform_and_undo_track_modification() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("a.png");
        write_png(&path, 4, 2);
        let picture = Picture::new(&path);

        picture.transform(Some(Transform::Rotate90)).unwrap();
        assert!(picture.is_modified());
        assert_eq!(picture.dimensions(), Some((2, 4)));

        picture.transform(None).unwrap();
        assert!(!picture.is_modified());
        assert_eq!(picture.dimensions(), Some((4, 2)));

        assert!(matches!(
            picture.transform(None),
            Err(PictureError::NothingToUndo)
        ));
    }

    #[test]
    fn save_writes_back_without_clearing_flag() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("a.png");
        write_png(&path, 4, 2);
        let picture = Picture::new(&path);

        picture.transform(Some(Transform::Rotate270)).unwrap();
        picture.save(None).unwrap();
        assert!(picture.is_modified());
        picture.mark_saved();
        assert!(!picture.is_modified());

        let reread = Picture::new(&path);
        reread.load().unwrap();
        assert_eq!(reread.dimensions(), Some((2, 4)));
        assert!(!dir.path().join(".a.png.picview-tmp").exists());
    }

    #[test]
    fn undo_past_a_save_is_a_modification() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("a.png");
        write_png(&path, 4, 2);
        let picture = Picture::new(&path);

        picture.transform(Some(Transform::Rotate90)).unwrap();
        picture.save(None).unwrap();
        picture.mark_saved();
        assert!(!picture.is_modified());

        picture.transform(None).unwrap();
        assert_eq!(picture.dimensions(), Some((4, 2)));
        assert!(picture.is_modified());

        // A different edit from here can never get back to the saved state.
        picture.transform(Some(Transform::FlipHorizontal)).unwrap();
        assert!(picture.is_modified());

        picture.transform(None).unwrap();
        assert!(picture.is_modified());
    }

    #[test]
    fn redoing_the_saved_edit_is_clean_again() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("a.png");
        write_png(&path, 4, 2);
        let picture = Picture::new(&path);

        picture.transform(Some(Transform::Rotate90)).unwrap();
        picture.save(None).unwrap();
        picture.mark_saved();
        picture.transform(Some(Transform::FlipVertical)).unwrap();
        assert!(picture.is_modified());
        picture.transform(None).unwrap();
        assert!(!picture.is_modified());
    }

    #[test]
    fn state_stays_readable_while_saving() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("big.png");
        write_png(&path, 3000, 3000);
        let picture = Arc::new(Picture::new(&path));
        picture.transform(Some(Transform::Rotate90)).unwrap();

        let saver = Arc::clone(&picture);
        let worker = std::thread::spawn(move || saver.save(None));

        let mut longest = Duration::ZERO;
        while !worker.is_finished() {
            let started = std::time::Instant::now();
            assert!(picture.is_modified());
            let _ = picture.dimensions();
            longest = longest.max(started.elapsed());
        }
        worker.join().unwrap().unwrap();
        assert!(
            longest < Duration::from_millis(250),
            "reader blocked for {longest:?}"
        );
    }

    #[test]
    fn save_to_destination_rebinds_path() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("a.png");
        write_png(&path, 3, 3);
        let picture = Picture::new(&path);
        picture.load().unwrap();

        let target = dir.path().join("copy.jpg");
        picture.save(Some(&target)).unwrap();
        assert!(target.exists());
        assert_eq!(picture.path(), Some(target));
        assert_eq!(picture.caption(), "copy.jpg");
    }

    #[test]
    fn external_change_is_reported_once() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("a.png");
        write_png(&path, 2, 2);
        let picture = Picture::new(&path);
        picture.load().unwrap();

        let changes = Arc::new(AtomicUsize::new(0));
        let c = Arc::clone(&changes);
        let _sub = picture.subscribe(Box::new(move |event| {
            if *event == ImageEvent::FileChanged {
                c.fetch_add(1, Ordering::SeqCst);
            }
        }));

        assert!(!picture.check_for_changes());

        let file = fs::OpenOptions::new().write(true).open(&path).unwrap();
        file.set_modified(SystemTime::now() + Duration::from_secs(60))
            .unwrap();
        drop(file);

        assert!(picture.check_for_changes());
        assert!(!picture.check_for_changes());
        assert_eq!(changes.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn collect_filters_and_sorts_directory() {
        let dir = tempdir().unwrap();
        write_png(&dir.path().join("b.png"), 1, 1);
        write_png(&dir.path().join("a.png"), 1, 1);
        fs::write(dir.path().join("notes.txt"), "hi").unwrap();

        let pictures = collect_pictures(&[dir.path().to_path_buf()]).unwrap();
        let captions: Vec<String> = pictures.iter().map(|p| p.caption()).collect();
        assert_eq!(captions, vec!["a.png", "b.png"]);
    }
}
