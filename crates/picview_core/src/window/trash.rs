//! Removing image files.

use std::fs;

use super::errors::WindowError;
use crate::images::ImageResource;

/// How an image leaves the gallery.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrashMode {
    /// Move to the desktop trash.
    Trash,
    /// Delete permanently.
    Delete,
}

impl TrashMode {
    pub fn verb(&self) -> &'static str {
        match self {
            TrashMode::Trash => "trashing",
            TrashMode::Delete => "deleting",
        }
    }
}

/// Outcome of a trash batch.
#[derive(Debug, Default)]
pub struct TrashReport {
    pub removed: usize,
    pub failures: Vec<WindowError>,
    /// The user declined the confirmation.
    pub declined: bool,
}

/// Trash or delete the file behind `image`.
pub fn remove_image_file(image: &dyn ImageResource, mode: TrashMode) -> Result<(), WindowError> {
    let caption = image.caption();
    let path = image
        .path()
        .ok_or_else(|| WindowError::trash(&caption, "image has no local file"))?;

    match mode {
        TrashMode::Trash => trash::delete(&path)
            .map_err(|e| WindowError::trash(&caption, format!("Couldn't access trash: {e}"))),
        TrashMode::Delete => fs::remove_file(&path)
            .map_err(|e| WindowError::trash(&caption, format!("Couldn't delete file: {e}"))),
    }?;

    tracing::info!("{} {}", mode.verb(), path.display());
    Ok(())
}
