use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crate::collection::BarcodeCollection;
use crate::error::{PipelineError, Result};
use crate::progress::ProgressReporter;
use crate::row::Row;

const EXPORT_PHASE: &str = "Exporting barcodes";

/// Confirmation of a successful export
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportSummary {
    pub destination: PathBuf,
    pub exported: usize,
}

/// Writes the row model as a barcode collection document
pub struct ExportPipeline {
    destination: PathBuf,
}

impl ExportPipeline {
    pub fn new(destination: impl Into<PathBuf>) -> Self {
        Self {
            destination: destination.into(),
        }
    }

    pub fn destination(&self) -> &Path {
        &self.destination
    }

    /// Serialize `rows` in order and write them to the destination
    ///
    /// The write is not atomic: after a failure the destination may hold a
    /// partial document.
    pub fn run(&self, rows: &[Row], reporter: &dyn ProgressReporter) -> Result<ExportSummary> {
        reporter.begin_task(EXPORT_PHASE, None);
        reporter.sub_task(&self.destination.display().to_string());

        let result = self.write(rows);
        reporter.done();

        match result {
            Ok(()) => {
                log::info!(
                    "Saved {} barcodes to {}",
                    rows.len(),
                    self.destination.display()
                );
                Ok(ExportSummary {
                    destination: self.destination.clone(),
                    exported: rows.len(),
                })
            }
            Err(e) => {
                log::error!("{e}");
                Err(e)
            }
        }
    }

    /// Start the export on a worker thread with its own copy of the rows
    pub fn spawn(self, rows: Vec<Row>, reporter: Arc<dyn ProgressReporter>) -> ExportHandle {
        ExportHandle::spawn(move || self.run(&rows, reporter.as_ref()))
    }

    fn write(&self, rows: &[Row]) -> Result<()> {
        let xml = BarcodeCollection::from_rows(rows)
            .to_xml()
            .map_err(|e| self.export_error(e))?;

        if let Some(parent) = self.destination.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| self.export_error(e))?;
        }
        std::fs::write(&self.destination, xml).map_err(|e| self.export_error(e))
    }

    fn export_error(&self, error: impl std::fmt::Display) -> PipelineError {
        PipelineError::Export {
            path: self.destination.clone(),
            message: error.to_string(),
        }
    }
}

/// An export running on a worker thread
pub struct ExportHandle<S = ExportSummary> {
    worker: JoinHandle<Result<S>>,
}

impl<S: Send + 'static> ExportHandle<S> {
    pub(crate) fn spawn<F>(task: F) -> Self
    where
        F: FnOnce() -> Result<S> + Send + 'static,
    {
        Self {
            worker: thread::spawn(task),
        }
    }

    pub fn is_finished(&self) -> bool {
        self.worker.is_finished()
    }

    /// Wait for the worker and return its summary
    pub fn join(self) -> Result<S> {
        self.worker
            .join()
            .map_err(|_| PipelineError::WorkerPanicked)?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::BarcodeFormat;
    use crate::progress::NoOpProgressReporter;

    #[test]
    fn test_export_writes_every_row() {
        let dir = tempfile::tempdir().unwrap();
        let destination = dir.path().join("nested").join("sheet.xml");
        let rows = vec![
            Row::new("A", BarcodeFormat::Code128),
            Row::new("", BarcodeFormat::QrCode),
        ];

        let summary = ExportPipeline::new(&destination)
            .run(&rows, &NoOpProgressReporter::new())
            .unwrap();

        assert_eq!(summary.exported, 2);
        assert_eq!(summary.destination, destination);
        let xml = std::fs::read_to_string(&destination).unwrap();
        assert_eq!(xml.matches("<item>").count(), 2);
    }

    #[test]
    fn test_spawned_export_writes_in_background() {
        let dir = tempfile::tempdir().unwrap();
        let destination = dir.path().join("sheet.xml");
        let rows = vec![
            Row::new("B-1", BarcodeFormat::Ean8),
            Row::new("B-2", BarcodeFormat::Ean8),
        ];

        let summary = ExportPipeline::new(&destination)
            .spawn(rows, Arc::new(NoOpProgressReporter::new()))
            .join()
            .unwrap();

        assert_eq!(summary.exported, 2);
        let xml = std::fs::read_to_string(&destination).unwrap();
        assert!(xml.find("B-1").unwrap() < xml.find("B-2").unwrap());
    }

    #[test]
    fn test_spawned_export_reports_failure_on_join() {
        let dir = tempfile::tempdir().unwrap();

        let result = ExportPipeline::new(dir.path())
            .spawn(vec![Row::new("A", BarcodeFormat::Code128)], Arc::new(NoOpProgressReporter::new()))
            .join();

        assert!(matches!(result, Err(PipelineError::Export { .. })));
    }

    #[test]
    fn test_export_to_a_directory_fails() {
        let dir = tempfile::tempdir().unwrap();
        let rows = vec![Row::new("A", BarcodeFormat::Code128)];

        let err = ExportPipeline::new(dir.path())
            .run(&rows, &NoOpProgressReporter::new())
            .unwrap_err();

        assert!(matches!(err, PipelineError::Export { .. }));
    }
}
