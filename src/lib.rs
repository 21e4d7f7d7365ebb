//! # Humbug Library
//!
//! Core pipelines behind the Humbug barcode label sheet tool.
//!
//! This library imports barcode values from pasted text, text files and saved
//! sheets, exports the sheet as an XML barcode collection or a printable PDF,
//! and bulk renames a folder of images after the barcodes decoded from them.
//! Every pipeline runs sequentially, reports progress through
//! [`ProgressReporter`] and can be cancelled between units of work.

pub mod collection;
pub mod config;
pub mod decoder;
pub mod error;
pub mod export;
pub mod format;
pub mod import;
pub mod policy;
pub mod progress;
pub mod rename;
pub mod row;
pub mod sheet;
pub mod stats;
pub mod utils;

// Re-export commonly used types
pub use collection::{BarcodeCollection, BarcodeItem};
pub use config::Settings;
pub use decoder::{BarcodeDecoder, DecodeHints, DecodedBarcode, RxingDecoder};
pub use error::PipelineError;
pub use export::{ExportHandle, ExportPipeline, ExportSummary};
pub use format::BarcodeFormat;
pub use import::{ImportHandle, ImportOptions, ImportPipeline, ImportSource, ImportSummary};
pub use policy::{DuplicateBarcodeOption, MissingBarcodeOption, MultipleBarcodeOption};
pub use progress::{CancelFlag, NoOpProgressReporter, ProgressReporter};
pub use rename::{
    BarcodePrompt, RenameDecision, RenameHandle, RenameOptions, RenameOutcome, RenamePipeline,
};
pub use row::{ModelObserver, Row, RowModel};
pub use sheet::{SheetOptions, SheetPipeline, SheetSummary};
pub use stats::{RenameCounts, RenameStats};
pub use utils::format_duration;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Summary of a bulk rename run
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct RenameReport {
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub duration: Duration,
    pub source_dir: PathBuf,
    pub target_dir: PathBuf,
    pub total_files: u64,
    pub cancelled: bool,
    pub missing_option: MissingBarcodeOption,
    pub duplicate_option: DuplicateBarcodeOption,
    pub multiple_option: MultipleBarcodeOption,
    pub counts: RenameCounts,
    pub outcomes: Vec<RenameOutcome>,
}

impl RenameReport {
    /// Source images in which no barcode was found
    pub fn no_barcode_found(&self) -> Vec<&Path> {
        self.outcomes
            .iter()
            .filter(|outcome| outcome.decoded_value.is_none())
            .map(|outcome| outcome.source.as_path())
            .collect()
    }
}

/// Report output formats
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportFormat {
    Json,
    Csv,
}

/// Write a rename report into `dir` and return the file written
pub fn generate_report(report: &RenameReport, format: ReportFormat, dir: &Path) -> Result<PathBuf> {
    match format {
        ReportFormat::Json => generate_json_report(report, &dir.join("humbug_rename_report.json")),
        ReportFormat::Csv => generate_csv_report(report, &dir.join("humbug_rename_report.csv")),
    }
}

fn generate_json_report(report: &RenameReport, report_path: &Path) -> Result<PathBuf> {
    let json = serde_json::to_string_pretty(report)?;
    std::fs::write(report_path, json)
        .with_context(|| format!("Failed to write report: {}", report_path.display()))?;
    Ok(report_path.to_path_buf())
}

/// One line per processed image
fn generate_csv_report(report: &RenameReport, report_path: &Path) -> Result<PathBuf> {
    let mut writer = csv::Writer::from_path(report_path)
        .with_context(|| format!("Failed to create report: {}", report_path.display()))?;

    writer.write_record(["source", "decoded_value", "decision", "target", "error"])?;
    for outcome in &report.outcomes {
        let target = outcome
            .decision
            .target()
            .map(|target| target.display().to_string())
            .unwrap_or_default();
        let error = match &outcome.decision {
            RenameDecision::Failed { error } => error.as_str(),
            _ => "",
        };

        writer.write_record([
            outcome.source.display().to_string().as_str(),
            outcome.decoded_value.as_deref().unwrap_or(""),
            outcome.decision.label(),
            target.as_str(),
            error,
        ])?;
    }
    writer.flush()?;

    Ok(report_path.to_path_buf())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_report(dir: &Path) -> RenameReport {
        RenameReport {
            start_time: Utc::now(),
            end_time: Utc::now(),
            duration: Duration::from_millis(1500),
            source_dir: dir.join("in"),
            target_dir: dir.join("out"),
            total_files: 2,
            cancelled: false,
            missing_option: MissingBarcodeOption::Skip,
            duplicate_option: DuplicateBarcodeOption::AppendSuffix,
            multiple_option: MultipleBarcodeOption::Concatenate,
            counts: RenameCounts {
                visited: 2,
                renamed: 1,
                skipped_missing: 1,
                ..Default::default()
            },
            outcomes: vec![
                RenameOutcome {
                    source: dir.join("in/a.png"),
                    decoded_value: Some("A, 1".to_string()),
                    decision: RenameDecision::Renamed {
                        target: dir.join("out/A, 1.png"),
                    },
                },
                RenameOutcome {
                    source: dir.join("in/b.png"),
                    decoded_value: None,
                    decision: RenameDecision::SkippedMissing,
                },
            ],
        }
    }

    #[test]
    fn test_no_barcode_found_lists_undecoded_sources() {
        let report = sample_report(Path::new("/x"));
        assert_eq!(report.no_barcode_found(), [Path::new("/x/in/b.png")]);
    }

    #[test]
    fn test_json_report_reloads() {
        let dir = tempfile::tempdir().unwrap();
        let report = sample_report(dir.path());

        let path = generate_report(&report, ReportFormat::Json, dir.path()).unwrap();
        let reloaded: RenameReport =
            serde_json::from_str(&std::fs::read_to_string(path).unwrap()).unwrap();

        assert_eq!(reloaded.outcomes, report.outcomes);
        assert_eq!(reloaded.counts, report.counts);
    }

    #[test]
    fn test_csv_report_quotes_values() {
        let dir = tempfile::tempdir().unwrap();
        let report = sample_report(dir.path());

        let path = generate_report(&report, ReportFormat::Csv, dir.path()).unwrap();
        let csv = std::fs::read_to_string(path).unwrap();
        let lines: Vec<&str> = csv.lines().collect();

        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0], "source,decoded_value,decision,target,error");
        assert!(lines[1].contains("\"A, 1\""));
        assert!(lines[2].contains("skipped-missing"));
    }
}
