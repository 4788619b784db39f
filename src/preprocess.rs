//! Cropping of a whole training dataset, one subject at a time.
//!
//! A dataset is a directory of subjects, each holding one file per channel:
//!
//! ```text
//! <source_root>/<subject>/peaks.nii.gz
//! <source_root>/<subject>/nodif_brain_mask.nii.gz
//! <source_root>/<subject>/bundle_masks_AR.nii.gz
//! ```
//!
//! For every subject the first data channel is the reference. Its nonzero
//! bounding box is applied to every other data and segmentation channel, and
//! the cropped volumes are written under the same names to
//! `<target_root>/<subject>/`. Subjects run in parallel on a fixed-size pool
//! and a failing subject never stops the others.

use std::any::Any;
use std::collections::HashSet;
use std::panic::{self, AssertUnwindSafe};
use std::path::{Component, Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};

use rayon::prelude::*;
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::config::SystemConfig;
use crate::error::{Error, Result};
use crate::nifti;
use crate::transforms::{apply_bbox, compute_bbox, ensure_same_grid, sanitize_non_finite, BoundingBox};

/// Worker threads used when none are requested.
pub const DEFAULT_JOBS: usize = 12;

/// Channel files expected in every subject directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelLayout {
    /// Data channels; the first one is the crop reference.
    pub data: Vec<String>,
    /// Segmentation channels, cropped with the reference box.
    pub segmentation: Vec<String>,
    /// File extension without the leading dot, e.g. `nii.gz`.
    pub extension: String,
}

impl Default for ChannelLayout {
    fn default() -> Self {
        Self {
            data: vec!["peaks".into(), "nodif_brain_mask".into()],
            segmentation: vec!["bundle_masks_AR".into()],
            extension: "nii.gz".into(),
        }
    }
}

impl ChannelLayout {
    /// Check that there is a reference channel and that channel names are
    /// non-empty and distinct.
    pub fn validate(&self) -> Result<()> {
        if self.data.is_empty() {
            return Err(Error::Configuration(
                "at least one data channel is required as crop reference".into(),
            ));
        }
        if self.extension.trim_start_matches('.').is_empty() {
            return Err(Error::Configuration("channel file extension is empty".into()));
        }
        let mut seen = HashSet::new();
        for name in self.channels() {
            if name.is_empty() {
                return Err(Error::Configuration("channel name is empty".into()));
            }
            if !seen.insert(name) {
                return Err(Error::Configuration(format!("channel '{name}' listed twice")));
            }
        }
        Ok(())
    }

    /// The reference channel.
    pub fn reference(&self) -> Option<&str> {
        self.data.first().map(String::as_str)
    }

    /// All channels: data first, then segmentation.
    pub fn channels(&self) -> impl Iterator<Item = &str> {
        self.data
            .iter()
            .chain(&self.segmentation)
            .map(String::as_str)
    }

    /// File name of a channel.
    pub fn file_name(&self, channel: &str) -> String {
        format!("{channel}.{}", self.extension.trim_start_matches('.'))
    }
}

/// Where to read, where to write, what to crop and how many workers to use.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreprocessConfig {
    /// Directory holding one subdirectory per subject.
    pub source_root: PathBuf,
    /// Directory receiving the cropped subjects.
    pub target_root: PathBuf,
    /// Channel files per subject.
    pub layout: ChannelLayout,
    /// Number of worker threads.
    pub jobs: usize,
}

impl PreprocessConfig {
    /// Default layout and worker count for the given roots.
    pub fn new(source_root: impl Into<PathBuf>, target_root: impl Into<PathBuf>) -> Self {
        Self {
            source_root: source_root.into(),
            target_root: target_root.into(),
            layout: ChannelLayout::default(),
            jobs: DEFAULT_JOBS,
        }
    }

    /// Roots derived from the system layout: the raw dataset lives on the
    /// network drive, the cropped copy under the data path.
    pub fn from_system(
        system: &SystemConfig,
        dataset_folder: &str,
        preproc_folder: &str,
    ) -> Result<Self> {
        let drive = system.network_drive.as_ref().ok_or_else(|| {
            Error::Configuration(
                "no network_dir configured; set it in the settings file or pass a source directory"
                    .into(),
            )
        })?;
        Ok(Self::new(
            drive.join(dataset_folder),
            system.data_path.join(preproc_folder),
        ))
    }
}

fn display_path(path: &Option<PathBuf>) -> String {
    path.as_ref()
        .map(|p| format!(" ({})", p.display()))
        .unwrap_or_default()
}

/// A subject that could not be processed.
#[derive(Debug, Error)]
#[error("subject {subject}{}: {source}", display_path(.path))]
pub struct SubjectError {
    /// Subject identifier.
    pub subject: String,
    /// File being handled when the failure happened.
    pub path: Option<PathBuf>,
    /// What went wrong.
    pub source: Error,
}

/// Outcome of a dataset run.
#[derive(Debug, Default)]
pub struct PreprocessReport {
    /// Cropped subjects with their boxes, sorted by subject.
    pub succeeded: Vec<(String, BoundingBox)>,
    /// Failed subjects, sorted by subject.
    pub failed: Vec<SubjectError>,
}

impl PreprocessReport {
    /// True when no subject failed.
    pub fn is_success(&self) -> bool {
        self.failed.is_empty()
    }

    /// Number of subjects attempted.
    pub fn total(&self) -> usize {
        self.succeeded.len() + self.failed.len()
    }
}

/// Subject identifiers under `source_root`: every subdirectory name, sorted.
pub fn discover_subjects(source_root: &Path) -> Result<Vec<String>> {
    let entries = std::fs::read_dir(source_root).map_err(|e| {
        Error::Configuration(format!(
            "cannot list subjects in {}: {e}",
            source_root.display()
        ))
    })?;

    let mut subjects = Vec::new();
    for entry in entries {
        let entry = entry?;
        if !entry.file_type()?.is_dir() {
            continue;
        }
        match entry.file_name().into_string() {
            Ok(name) => subjects.push(name),
            Err(name) => warn!(name = ?name, "skipping subject directory with non UTF-8 name"),
        }
    }
    subjects.sort();
    Ok(subjects)
}

/// A subject id must name exactly one directory below the roots.
fn check_subject_id(subject: &str) -> Result<()> {
    let mut components = Path::new(subject).components();
    match (components.next(), components.next()) {
        (Some(Component::Normal(_)), None) => Ok(()),
        _ => Err(Error::Configuration(format!(
            "subject id '{subject}' is not a plain directory name"
        ))),
    }
}

/// Crop one subject and write its channels to the target directory.
///
/// Every channel is loaded, checked and cropped before anything is created,
/// so a subject that fails leaves no output behind. Returns the box taken
/// from the reference channel.
pub fn preprocess_subject(
    config: &PreprocessConfig,
    subject: &str,
) -> std::result::Result<BoundingBox, SubjectError> {
    let fail = |path: Option<&Path>, source: Error| SubjectError {
        subject: subject.to_string(),
        path: path.map(Path::to_path_buf),
        source,
    };

    config.layout.validate().map_err(|e| fail(None, e))?;
    check_subject_id(subject).map_err(|e| fail(None, e))?;
    let source_dir = config.source_root.join(subject);
    let target_dir = config.target_root.join(subject);

    let files: Vec<String> = config
        .layout
        .channels()
        .map(|channel| config.layout.file_name(channel))
        .collect();
    for name in &files {
        let path = source_dir.join(name);
        if !path.is_file() {
            return Err(fail(Some(path.as_path()), Error::MissingInput { path: path.clone() }));
        }
    }

    let (reference_name, others) = files
        .split_first()
        .ok_or_else(|| fail(None, Error::Configuration("no channels configured".into())))?;

    let reference_path = source_dir.join(reference_name);
    let reference = nifti::load(&reference_path).map_err(|e| fail(Some(reference_path.as_path()), e))?;
    let (reference, replaced) = sanitize_non_finite(&reference);
    if replaced > 0 {
        debug!(subject, replaced, path = %reference_path.display(), "replaced non-finite voxels");
    }
    let grid = reference
        .spatial_shape()
        .map_err(|e| fail(Some(reference_path.as_path()), e))?;
    let bbox = compute_bbox(&reference).map_err(|e| fail(Some(reference_path.as_path()), e))?;
    if bbox.is_full(grid) {
        debug!(subject, "reference has no zero margin, keeping full extent");
    }

    let mut cropped = Vec::with_capacity(files.len());
    cropped.push((
        reference_name,
        apply_bbox(&reference, &bbox).map_err(|e| fail(Some(reference_path.as_path()), e))?,
    ));
    for name in others {
        let path = source_dir.join(name);
        let image = nifti::load(&path).map_err(|e| fail(Some(path.as_path()), e))?;
        ensure_same_grid(grid, &image).map_err(|e| fail(Some(path.as_path()), e))?;
        let (image, replaced) = sanitize_non_finite(&image);
        if replaced > 0 {
            debug!(subject, replaced, path = %path.display(), "replaced non-finite voxels");
        }
        let image = apply_bbox(&image, &bbox).map_err(|e| fail(Some(path.as_path()), e))?;
        cropped.push((name, image));
    }

    std::fs::create_dir_all(&target_dir).map_err(|e| fail(Some(target_dir.as_path()), e.into()))?;
    let mut written: Vec<PathBuf> = Vec::with_capacity(cropped.len());
    for (name, image) in &cropped {
        let out = target_dir.join(name);
        if let Err(e) = nifti::save(image, &out) {
            for path in written.iter().chain([&out]) {
                let _ = std::fs::remove_file(path);
            }
            return Err(fail(Some(out.as_path()), e));
        }
        written.push(out);
    }

    info!(subject, %bbox, shape = ?bbox.shape(), "cropped subject");
    Ok(bbox)
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Crop `subjects` on a pool of `config.jobs` threads.
///
/// Failures are collected in the report; only an invalid configuration
/// aborts the run before any subject starts.
pub fn run(config: &PreprocessConfig, subjects: &[String]) -> Result<PreprocessReport> {
    config.layout.validate()?;
    if config.jobs == 0 {
        return Err(Error::Configuration("at least one worker is required".into()));
    }

    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(config.jobs)
        .thread_name(|i| format!("tractcrop-worker-{i}"))
        .build()
        .map_err(|e| Error::Configuration(format!("failed to build thread pool: {e}")))?;

    info!(
        subjects = subjects.len(),
        jobs = config.jobs,
        source = %config.source_root.display(),
        target = %config.target_root.display(),
        "starting preprocessing"
    );

    let done = AtomicUsize::new(0);
    let outcomes: Vec<_> = pool.install(|| {
        subjects
            .par_iter()
            .map(|subject| {
                let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
                    preprocess_subject(config, subject)
                }))
                .unwrap_or_else(|payload| {
                    Err(SubjectError {
                        subject: subject.clone(),
                        path: None,
                        source: Error::Panicked(panic_message(payload.as_ref())),
                    })
                });
                let finished = done.fetch_add(1, Ordering::Relaxed) + 1;
                debug!(subject = %subject, finished, total = subjects.len(), "subject finished");
                (subject.clone(), outcome)
            })
            .collect()
    });

    let mut report = PreprocessReport::default();
    for (subject, outcome) in outcomes {
        match outcome {
            Ok(bbox) => report.succeeded.push((subject, bbox)),
            Err(e) => {
                error!(subject = %e.subject, error = %e.source, "subject failed");
                report.failed.push(e);
            }
        }
    }
    report.succeeded.sort_by(|a, b| a.0.cmp(&b.0));
    report.failed.sort_by(|a, b| a.subject.cmp(&b.subject));

    info!(
        succeeded = report.succeeded.len(),
        failed = report.failed.len(),
        "preprocessing finished"
    );
    Ok(report)
}
