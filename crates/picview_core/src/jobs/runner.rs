//! Job execution.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;

use super::job::{Job, JobFailure, JobKind, JobOutcome, SaveAsTarget};
use crate::images::{ImageRef, PictureError};

/// Errors from executing one work item.
#[derive(Error, Debug)]
pub enum RunnerError {
    #[error(transparent)]
    Picture(#[from] PictureError),

    #[error("Failed to copy '{from}' to '{to}': {source}")]
    Copy {
        from: PathBuf,
        to: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Cannot create folder '{path}': {source}")]
    CreateDir {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("'{0}' has no file name")]
    NoFileName(PathBuf),
}

/// Executes a job to completion on the calling thread.
///
/// Implementations must end every job with exactly one
/// [`Job::finish`].
pub trait JobRunner: Send + Sync {
    fn run(&self, job: &Job);
}

/// Runs jobs against local files.
#[derive(Debug, Default, Clone, Copy)]
pub struct FsJobRunner;

impl FsJobRunner {
    pub fn new() -> Self {
        Self
    }
}

impl JobRunner for FsJobRunner {
    fn run(&self, job: &Job) {
        let outcome = match job.kind() {
            JobKind::Load { image } => run_load(job, image),
            JobKind::Transform { images, transform } => {
                run_batch(job, images, |image| Ok(image.transform(*transform)?))
            }
            JobKind::Save { images } => run_batch(job, images, |image| Ok(image.save(None)?)),
            JobKind::SaveAs { images, target } => run_batch(job, images, |image| {
                let destination = save_as_destination(image, target)?;
                Ok(image.save(Some(&destination))?)
            }),
            JobKind::Copy {
                files,
                dest_dir,
                stem,
            } => run_copy(job, files, dest_dir, stem.as_deref()),
        };
        tracing::debug!("{} job {} ended: {:?}", job.category().name(), job.id(), outcome);
        job.finish(outcome);
    }
}

fn run_load(job: &Job, image: &ImageRef) -> JobOutcome {
    if job.is_cancelled() {
        return JobOutcome::Cancelled;
    }
    job.emit_progress(0.0);
    match image.load() {
        Ok(()) if job.is_cancelled() => JobOutcome::Cancelled,
        Ok(()) => JobOutcome::Success,
        Err(PictureError::Cancelled) => JobOutcome::Cancelled,
        Err(e) => JobFailure::for_image(image, e.to_string()).into(),
    }
}

/// Run `op` on each image, recording every result. The batch continues
/// after failures and stops only when cancelled.
fn run_batch<F>(job: &Job, images: &[ImageRef], op: F) -> JobOutcome
where
    F: Fn(&ImageRef) -> Result<(), RunnerError>,
{
    let total = images.len().max(1) as f32;
    for (index, image) in images.iter().enumerate() {
        if job.is_cancelled() {
            return JobOutcome::Cancelled;
        }
        job.set_current(index);
        job.emit_progress(index as f32 / total);

        let error = match op(image) {
            Ok(()) => None,
            Err(e) => {
                tracing::warn!("{}: {}", image.caption(), e);
                Some(e.to_string())
            }
        };
        job.record_item(index, Some(image.id()), error);
    }
    job.outcome_from_items()
}

fn save_as_destination(image: &ImageRef, target: &SaveAsTarget) -> Result<PathBuf, RunnerError> {
    match target {
        SaveAsTarget::File(path) => Ok(path.clone()),
        SaveAsTarget::Folder { dir, extension } => {
            let source = image.path().ok_or(PictureError::NoFile)?;
            let stem = source
                .file_stem()
                .ok_or_else(|| RunnerError::NoFileName(source.clone()))?;
            let mut destination = dir.join(stem);
            match extension {
                Some(ext) => {
                    destination.set_extension(ext);
                }
                None => {
                    if let Some(ext) = source.extension() {
                        destination.set_extension(ext);
                    }
                }
            }
            Ok(destination)
        }
    }
}

fn copy_destination(file: &Path, dest_dir: &Path, stem: Option<&str>) -> Result<PathBuf, RunnerError> {
    let name = file
        .file_name()
        .ok_or_else(|| RunnerError::NoFileName(file.to_path_buf()))?;
    let mut destination = dest_dir.join(name);
    if let Some(stem) = stem {
        destination = dest_dir.join(stem);
        if let Some(ext) = file.extension() {
            destination.set_extension(ext);
        }
    }
    Ok(destination)
}

fn run_copy(job: &Job, files: &[PathBuf], dest_dir: &Path, stem: Option<&str>) -> JobOutcome {
    if let Err(source) = fs::create_dir_all(dest_dir) {
        let error = RunnerError::CreateDir {
            path: dest_dir.to_path_buf(),
            source,
        };
        return JobFailure::new(error.to_string()).into();
    }

    let total = files.len().max(1) as f32;
    for (index, file) in files.iter().enumerate() {
        if job.is_cancelled() {
            return JobOutcome::Cancelled;
        }
        job.set_current(index);
        job.emit_progress(index as f32 / total);

        let copied = copy_destination(file, dest_dir, stem).and_then(|to| {
            fs::copy(file, &to)
                .map(|_| to.clone())
                .map_err(|source| RunnerError::Copy {
                    from: file.clone(),
                    to,
                    source,
                })
        });
        match copied {
            Ok(to) => {
                job.record_item(index, None, None);
                job.set_output(to);
            }
            Err(e) => {
                tracing::warn!("{}", e);
                job.record_item(index, None, Some(e.to_string()));
                return JobFailure::new(e.to_string()).into();
            }
        }
    }
    JobOutcome::Success
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::images::testing::FakeImage;
    use crate::images::{ImageResource, Picture, Transform};
    use ::image::RgbImage;
    use std::sync::Arc;
    use tempfile::tempdir;

    #[test]
    fn load_success_and_failure() {
        let dir = tempdir().unwrap();
        let good = dir.path().join("good.png");
        RgbImage::new(2, 2).save(&good).unwrap();
        let bad = dir.path().join("bad.png");
        fs::write(&bad, b"nope").unwrap();

        let job = Job::load(Arc::new(Picture::new(&good)));
        FsJobRunner.run(&job);
        assert_eq!(job.outcome(), Some(JobOutcome::Success));

        let job = Job::load(Arc::new(Picture::new(&bad)));
        FsJobRunner.run(&job);
        match job.outcome() {
            Some(JobOutcome::Failure(failure)) => {
                assert_eq!(failure.caption.as_deref(), Some("bad.png"));
            }
            other => panic!("expected failure, got {other:?}"),
        }
    }

    #[test]
    fn cancelled_job_does_no_work() {
        let image = FakeImage::new("a.png");
        let job = Job::save(vec![image.clone() as ImageRef]);
        job.request_cancel();
        FsJobRunner.run(&job);
        assert_eq!(job.outcome(), Some(JobOutcome::Cancelled));
        assert_eq!(image.saves(), 0);
    }

    #[test]
    fn save_batch_continues_after_failure() {
        let a = FakeImage::new("a.png");
        let b = FakeImage::new("b.png");
        let c = FakeImage::new("c.png");
        b.fail_save();

        let job = Job::save(vec![a.clone() as ImageRef, b.clone(), c.clone()]);
        FsJobRunner.run(&job);

        assert_eq!(a.saves(), 1);
        assert_eq!(c.saves(), 1);
        let items = job.items();
        assert_eq!(items.len(), 3);
        assert!(items[0].succeeded());
        assert!(!items[1].succeeded());
        match job.outcome() {
            Some(JobOutcome::Failure(failure)) => assert_eq!(failure.image, Some(b.id())),
            other => panic!("expected failure, got {other:?}"),
        }
    }

    #[test]
    fn save_as_folder_converts_extension() {
        let dir = tempdir().unwrap();
        let source = dir.path().join("photo.png");
        RgbImage::new(2, 2).save(&source).unwrap();
        let out = dir.path().join("out");
        fs::create_dir(&out).unwrap();

        let picture: ImageRef = Arc::new(Picture::new(&source));
        let job = Job::save_as(
            vec![picture.clone()],
            SaveAsTarget::Folder {
                dir: out.clone(),
                extension: Some("bmp".to_string()),
            },
        );
        FsJobRunner.run(&job);

        assert_eq!(job.outcome(), Some(JobOutcome::Success));
        assert!(out.join("photo.bmp").exists());
        assert_eq!(picture.path(), Some(out.join("photo.bmp")));
    }

    #[test]
    fn transform_batch_applies_to_every_image() {
        let a = FakeImage::new("a.png");
        let b = FakeImage::new("b.png");
        let job = Job::transform(
            vec![a.clone() as ImageRef, b.clone()],
            Some(Transform::FlipVertical),
        );
        FsJobRunner.run(&job);
        assert_eq!(job.outcome(), Some(JobOutcome::Success));
        assert!(a.is_modified() && b.is_modified());
    }

    #[test]
    fn copy_renames_with_stem() {
        let dir = tempdir().unwrap();
        let source = dir.path().join("sunset.jpg");
        fs::write(&source, b"jpeg bytes").unwrap();
        let dest = dir.path().join("data");

        let job = Job::copy(vec![source], dest.clone(), Some("picview-wallpaper".into()));
        FsJobRunner.run(&job);

        assert_eq!(job.outcome(), Some(JobOutcome::Success));
        let output = job.output().unwrap();
        assert_eq!(output, dest.join("picview-wallpaper.jpg"));
        assert_eq!(fs::read(output).unwrap(), b"jpeg bytes");
    }

    #[test]
    fn copy_of_missing_file_fails() {
        let dir = tempdir().unwrap();
        let job = Job::copy(
            vec![dir.path().join("missing.png")],
            dir.path().join("data"),
            None,
        );
        FsJobRunner.run(&job);
        assert!(matches!(job.outcome(), Some(JobOutcome::Failure(_))));
    }
}
