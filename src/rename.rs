use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Instant;
use walkdir::WalkDir;

use crate::decoder::{BarcodeDecoder, DecodeHints};
use crate::error::{PipelineError, Result};
use crate::format::BarcodeFormat;
use crate::policy::{
    resolve_duplicate, resolve_missing, resolve_multiple, DuplicateBarcodeOption,
    DuplicateDecision, MissingBarcodeOption, MissingDecision, MultipleBarcodeOption,
};
use crate::progress::{NoOpProgressReporter, ProgressReporter};
use crate::stats::RenameStats;
use crate::utils::{file_extension, is_image_file, sanitize_file_name};
use crate::RenameReport;

const RENAME_PHASE: &str = "Renaming images";

/// Options for a bulk rename run
#[derive(Debug, Clone)]
pub struct RenameOptions {
    pub source_dir: PathBuf,
    pub target_dir: PathBuf,
    pub restrict_to: Option<BarcodeFormat>,
    pub try_hard: bool,
    pub missing: MissingBarcodeOption,
    pub duplicate: DuplicateBarcodeOption,
    pub multiple: MultipleBarcodeOption,
}

impl RenameOptions {
    /// Create new rename options with the default policies
    pub fn new(source_dir: impl Into<PathBuf>, target_dir: impl Into<PathBuf>) -> Self {
        Self {
            source_dir: source_dir.into(),
            target_dir: target_dir.into(),
            restrict_to: None,
            try_hard: false,
            missing: MissingBarcodeOption::default(),
            duplicate: DuplicateBarcodeOption::default(),
            multiple: MultipleBarcodeOption::default(),
        }
    }

    /// Builder pattern for restricting decoding to one symbology
    pub fn with_restriction(mut self, restrict_to: Option<BarcodeFormat>) -> Self {
        self.restrict_to = restrict_to;
        self
    }

    /// Builder pattern for the exhaustive decode mode
    pub fn with_try_hard(mut self, try_hard: bool) -> Self {
        self.try_hard = try_hard;
        self
    }

    /// Builder pattern for the missing barcode policy
    pub fn with_missing(mut self, missing: MissingBarcodeOption) -> Self {
        self.missing = missing;
        self
    }

    /// Builder pattern for the duplicate target policy
    pub fn with_duplicate(mut self, duplicate: DuplicateBarcodeOption) -> Self {
        self.duplicate = duplicate;
        self
    }

    /// Builder pattern for the multiple barcodes policy
    pub fn with_multiple(mut self, multiple: MultipleBarcodeOption) -> Self {
        self.multiple = multiple;
        self
    }

    pub fn decode_hints(&self) -> DecodeHints {
        DecodeHints {
            restrict_to: self.restrict_to,
            try_harder: self.try_hard,
        }
    }

    /// Check both folders exist and are directories
    pub fn validate(&self) -> Result<()> {
        validate_folder("source", &self.source_dir)?;
        validate_folder("target", &self.target_dir)
    }
}

fn validate_folder(role: &'static str, path: &Path) -> Result<()> {
    let reason = if !path.exists() {
        "does not exist"
    } else if !path.is_dir() {
        "is not a directory"
    } else {
        return Ok(());
    };

    Err(PipelineError::InvalidFolder {
        role,
        path: path.to_path_buf(),
        reason,
    })
}

/// Supplies a barcode value for an image the decoder could not read
///
/// Called on the pipeline thread, which waits for the answer. `None` skips
/// the image.
pub trait BarcodePrompt: Send + Sync {
    fn request_barcode(&self, image: &Path) -> Option<String>;
}

/// What happened to one source image
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "decision", rename_all = "kebab-case")]
pub enum RenameDecision {
    /// Copied under a name derived from its barcode
    Renamed { target: PathBuf },
    /// Copied over an existing file of the same name
    Overwritten { target: PathBuf },
    /// No barcode; copied under its original name
    CopiedOriginal { target: PathBuf },
    SkippedMissing,
    SkippedDuplicate,
    /// Copying failed; the run carried on
    Failed { error: String },
}

impl RenameDecision {
    pub fn target(&self) -> Option<&Path> {
        match self {
            RenameDecision::Renamed { target }
            | RenameDecision::Overwritten { target }
            | RenameDecision::CopiedOriginal { target } => Some(target),
            _ => None,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            RenameDecision::Renamed { .. } => "renamed",
            RenameDecision::Overwritten { .. } => "overwritten",
            RenameDecision::CopiedOriginal { .. } => "copied-original",
            RenameDecision::SkippedMissing => "skipped-missing",
            RenameDecision::SkippedDuplicate => "skipped-duplicate",
            RenameDecision::Failed { .. } => "failed",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RenameOutcome {
    pub source: PathBuf,
    /// Value read from the image, `None` if no barcode was found
    pub decoded_value: Option<String>,
    #[serde(flatten)]
    pub decision: RenameDecision,
}

/// Bulk rename engine: decode every image in a folder and copy it to the
/// target folder under its barcode value
pub struct RenamePipeline {
    options: RenameOptions,
    decoder: Box<dyn BarcodeDecoder>,
    prompt: Option<Box<dyn BarcodePrompt>>,
    stats: RenameStats,
}

impl RenamePipeline {
    pub fn new(options: RenameOptions, decoder: impl BarcodeDecoder + 'static) -> Self {
        Self {
            options,
            decoder: Box::new(decoder),
            prompt: None,
            stats: RenameStats::new(),
        }
    }

    /// Answer for images without a barcode when the missing policy is `prompt`
    pub fn with_prompt(mut self, prompt: impl BarcodePrompt + 'static) -> Self {
        self.prompt = Some(Box::new(prompt));
        self
    }

    pub fn options(&self) -> &RenameOptions {
        &self.options
    }

    /// Live statistics, shared with every clone
    pub fn stats(&self) -> &RenameStats {
        &self.stats
    }

    pub fn run(&self) -> Result<RenameReport> {
        self.run_with_progress(&NoOpProgressReporter::new())
    }

    /// Run the rename on the calling thread
    pub fn run_with_progress(&self, reporter: &dyn ProgressReporter) -> Result<RenameReport> {
        self.options.validate()?;
        self.stats.reset();

        let start_time = Instant::now();
        let start_time_utc = Utc::now();

        let files = self.scan_source_files()?;
        log::info!(
            "Renaming {} images from {} into {}",
            files.len(),
            self.options.source_dir.display(),
            self.options.target_dir.display()
        );

        reporter.begin_task(RENAME_PHASE, Some(files.len()));

        let mut outcomes = Vec::with_capacity(files.len());
        let mut cancelled = false;

        for (index, file) in files.iter().enumerate() {
            if reporter.is_cancelled() {
                log::info!("Rename cancelled after {index} of {} images", files.len());
                cancelled = true;
                break;
            }

            reporter.sub_task(&format!("Renaming image {}", index + 1));
            let outcome = self.process_single_file(file);
            log::debug!("{} -> {}", file.display(), outcome.decision.label());
            outcomes.push(outcome);
            reporter.worked(index + 1);
        }

        reporter.done();

        Ok(RenameReport {
            start_time: start_time_utc,
            end_time: Utc::now(),
            duration: start_time.elapsed(),
            source_dir: self.options.source_dir.clone(),
            target_dir: self.options.target_dir.clone(),
            total_files: files.len() as u64,
            cancelled,
            missing_option: self.options.missing,
            duplicate_option: self.options.duplicate,
            multiple_option: self.options.multiple,
            counts: self.stats.snapshot(),
            outcomes,
        })
    }

    /// Validate the folders and start the rename on a worker thread
    pub fn spawn(self, reporter: Arc<dyn ProgressReporter>) -> Result<RenameHandle> {
        self.options.validate()?;

        let stats = self.stats.clone();
        let worker = thread::spawn(move || self.run_with_progress(reporter.as_ref()));

        Ok(RenameHandle { stats, worker })
    }

    /// Image files directly inside the source folder, sorted by name
    fn scan_source_files(&self) -> Result<Vec<PathBuf>> {
        let mut files = Vec::new();

        for entry in WalkDir::new(&self.options.source_dir)
            .min_depth(1)
            .max_depth(1)
            .follow_links(false)
            .sort_by_file_name()
        {
            let entry = entry.map_err(|e| {
                let path = e
                    .path()
                    .unwrap_or(self.options.source_dir.as_path())
                    .to_path_buf();
                PipelineError::io(path, std::io::Error::other(e))
            })?;

            if entry.file_type().is_file() && is_image_file(entry.path()) {
                files.push(entry.into_path());
            }
        }

        Ok(files)
    }

    fn process_single_file(&self, file: &Path) -> RenameOutcome {
        self.stats.record_visit();

        let barcodes = match self.decoder.decode(file, &self.options.decode_hints()) {
            Ok(barcodes) => barcodes,
            Err(e) => {
                log::warn!("{e}");
                Vec::new()
            }
        };
        let values: Vec<&str> = barcodes.iter().map(|b| b.text.as_str()).collect();
        let decoded_value = resolve_multiple(self.options.multiple, &values);

        let decision = match &decoded_value {
            Some(value) => self.place(file, &sanitize_file_name(value), Placement::Renamed),
            None => self.handle_missing(file),
        };

        self.record(&decision);

        RenameOutcome {
            source: file.to_path_buf(),
            decoded_value,
            decision,
        }
    }

    fn handle_missing(&self, file: &Path) -> RenameDecision {
        log::warn!("No barcode found in {}", file.display());

        match resolve_missing(self.options.missing) {
            MissingDecision::Skip => RenameDecision::SkippedMissing,
            MissingDecision::CopyOriginal => {
                let stem = file
                    .file_stem()
                    .map(|stem| stem.to_string_lossy().into_owned())
                    .unwrap_or_default();
                self.place(file, &stem, Placement::Original)
            }
            MissingDecision::Prompt => {
                let Some(prompt) = &self.prompt else {
                    log::warn!("No prompt available, skipping {}", file.display());
                    return RenameDecision::SkippedMissing;
                };

                match prompt.request_barcode(file) {
                    Some(value) if !value.trim().is_empty() => {
                        self.place(file, &sanitize_file_name(value.trim()), Placement::Renamed)
                    }
                    _ => RenameDecision::SkippedMissing,
                }
            }
        }
    }

    /// Copy `file` into the target folder as `stem` plus its own extension
    fn place(&self, file: &Path, stem: &str, placement: Placement) -> RenameDecision {
        let decision = resolve_duplicate(
            self.options.duplicate,
            &self.options.target_dir,
            stem,
            file_extension(file),
            |path| path.exists(),
        );

        let (target, overwrite) = match decision {
            DuplicateDecision::Write(target) => (target, false),
            DuplicateDecision::Overwrite(target) => (target, true),
            DuplicateDecision::Skip => return RenameDecision::SkippedDuplicate,
        };

        match std::fs::copy(file, &target) {
            Ok(_) if overwrite => RenameDecision::Overwritten { target },
            Ok(_) => match placement {
                Placement::Renamed => RenameDecision::Renamed { target },
                Placement::Original => RenameDecision::CopiedOriginal { target },
            },
            Err(e) => {
                log::error!(
                    "Failed to copy {} to {}: {}",
                    file.display(),
                    target.display(),
                    e
                );
                RenameDecision::Failed {
                    error: e.to_string(),
                }
            }
        }
    }

    fn record(&self, decision: &RenameDecision) {
        let bytes = || {
            decision
                .target()
                .and_then(|target| std::fs::metadata(target).ok())
                .map(|metadata| metadata.len())
                .unwrap_or(0)
        };

        match decision {
            RenameDecision::Renamed { .. } => self.stats.record_renamed(bytes()),
            RenameDecision::Overwritten { .. } => self.stats.record_overwritten(bytes()),
            RenameDecision::CopiedOriginal { .. } => self.stats.record_copied_original(bytes()),
            RenameDecision::SkippedMissing => self.stats.record_skipped_missing(),
            RenameDecision::SkippedDuplicate => self.stats.record_skipped_duplicate(),
            RenameDecision::Failed { .. } => self.stats.record_failure(),
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum Placement {
    Renamed,
    Original,
}

/// A rename running on a worker thread
pub struct RenameHandle {
    stats: RenameStats,
    worker: JoinHandle<Result<RenameReport>>,
}

impl RenameHandle {
    pub fn stats(&self) -> &RenameStats {
        &self.stats
    }

    pub fn is_finished(&self) -> bool {
        self.worker.is_finished()
    }

    /// Wait for the worker and return its report
    pub fn join(self) -> Result<RenameReport> {
        self.worker
            .join()
            .map_err(|_| PipelineError::WorkerPanicked)?
    }
}
