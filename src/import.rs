//! Populating the row model from pasted text, `.txt` files and `.xml` documents.
//!
//! The pipeline runs off the thread that owns the [`RowModel`]. Rows travel
//! back through a channel one at a time and the owner fires a single refresh
//! notification when the import ends, however many rows arrived.

use crossbeam_channel::{Receiver, Sender};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crate::collection::BarcodeCollection;
use crate::error::{PipelineError, Result};
use crate::format::BarcodeFormat;
use crate::progress::ProgressReporter;
use crate::row::{ModelObserver, Row, RowModel};

const IMPORT_PHASE: &str = "Importing barcodes";

/// Where imported rows come from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImportSource {
    /// Pasted text, one barcode value per line
    Clipboard(String),
    /// Plain text file, one barcode value per line
    TextFile(PathBuf),
    /// A previously exported barcode collection
    XmlFile(PathBuf),
}

impl ImportSource {
    /// Pick the source kind from the file extension (`.xml` or anything else as text)
    pub fn from_path(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let is_xml = path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case("xml"));

        if is_xml {
            ImportSource::XmlFile(path)
        } else {
            ImportSource::TextFile(path)
        }
    }

    pub fn describe(&self) -> String {
        match self {
            ImportSource::Clipboard(_) => "clipboard".to_string(),
            ImportSource::TextFile(path) | ImportSource::XmlFile(path) => {
                path.display().to_string()
            }
        }
    }
}

/// Options for an import run
#[derive(Debug, Clone, Default)]
pub struct ImportOptions {
    /// Symbology given to rows from clipboard and text sources
    pub format: BarcodeFormat,
}

impl ImportOptions {
    pub fn new(format: BarcodeFormat) -> Self {
        Self { format }
    }
}

/// Result of an import that was not aborted by an error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImportSummary {
    pub imported: usize,
    pub cancelled: bool,
}

/// Messages from the import worker to the model owner
#[derive(Debug)]
pub enum ImportMessage {
    Row(Row),
    Finished(ImportSummary),
    Failed(PipelineError),
}

/// Split pasted text into barcode values
///
/// Any run of `\r` and `\n` separates two values. Trailing empty segments are
/// dropped, a leading one (text starting with a line break) is kept.
pub fn split_lines(text: &str) -> Vec<&str> {
    let mut segments = text.split(['\r', '\n']);
    let mut lines: Vec<&str> = segments.next().into_iter().collect();
    // Inside a run of line breaks `split` yields empty segments; a run counts once
    lines.extend(segments.filter(|segment| !segment.is_empty()));

    while lines.last().is_some_and(|line| line.is_empty()) {
        lines.pop();
    }
    lines
}

pub struct ImportPipeline {
    source: ImportSource,
    options: ImportOptions,
}

impl ImportPipeline {
    pub fn new(source: ImportSource, options: ImportOptions) -> Self {
        Self { source, options }
    }

    pub fn source(&self) -> &ImportSource {
        &self.source
    }

    /// Run the import on the calling thread, handing every row to `emit`
    ///
    /// Files are read and XML documents parsed completely before the first
    /// row is emitted, so a broken document never yields partial rows.
    pub fn run<F>(&self, reporter: &dyn ProgressReporter, emit: F) -> Result<ImportSummary>
    where
        F: FnMut(Row) -> Result<()>,
    {
        let rows = match &self.source {
            ImportSource::Clipboard(text) => self.rows_from_text(text),
            ImportSource::TextFile(path) => {
                let text = std::fs::read_to_string(path)
                    .map_err(|e| PipelineError::io(path, e))?;
                self.rows_from_text(&text)
            }
            ImportSource::XmlFile(path) => read_collection(path)?
                .items
                .iter()
                .map(|item| item.to_row())
                .collect(),
        };

        log::info!(
            "Importing {} rows from {}",
            rows.len(),
            self.source.describe()
        );

        let summary = feed_rows(rows, reporter, emit);
        reporter.done();
        summary
    }

    /// Start the import on a worker thread
    pub fn spawn(self, reporter: Arc<dyn ProgressReporter>) -> ImportHandle {
        let (sender, receiver) = crossbeam_channel::unbounded();

        let worker = thread::spawn(move || {
            let result = self.run(reporter.as_ref(), |row| send(&sender, ImportMessage::Row(row)));
            let message = match result {
                Ok(summary) => ImportMessage::Finished(summary),
                Err(e) => ImportMessage::Failed(e),
            };
            // The owner may already be gone; nothing left to tell it then
            let _ = sender.send(message);
        });

        ImportHandle { receiver, worker }
    }

    fn rows_from_text(&self, text: &str) -> Vec<Row> {
        split_lines(text)
            .into_iter()
            .map(|line| Row::new(line, self.options.format))
            .collect()
    }
}

fn send(sender: &Sender<ImportMessage>, message: ImportMessage) -> Result<()> {
    sender.send(message).map_err(|_| PipelineError::Channel)
}

fn read_collection(path: &Path) -> Result<BarcodeCollection> {
    let xml = std::fs::read_to_string(path).map_err(|e| PipelineError::io(path, e))?;
    BarcodeCollection::from_xml(&xml).map_err(|e| PipelineError::MalformedXml {
        path: path.to_path_buf(),
        message: e.to_string(),
    })
}

fn feed_rows<F>(rows: Vec<Row>, reporter: &dyn ProgressReporter, mut emit: F) -> Result<ImportSummary>
where
    F: FnMut(Row) -> Result<()>,
{
    reporter.begin_task(IMPORT_PHASE, Some(rows.len()));

    let mut imported = 0;
    for row in rows {
        if reporter.is_cancelled() {
            log::info!("Import cancelled after {imported} rows");
            return Ok(ImportSummary {
                imported,
                cancelled: true,
            });
        }

        reporter.sub_task(&format!("Importing row {}", imported + 1));
        log::debug!("Importing row {}: {}", imported + 1, row.barcode);
        emit(row)?;
        imported += 1;
        reporter.worked(imported);
    }

    Ok(ImportSummary {
        imported,
        cancelled: false,
    })
}

/// Owner side of a running import
pub struct ImportHandle {
    receiver: Receiver<ImportMessage>,
    worker: JoinHandle<()>,
}

impl ImportHandle {
    /// Apply incoming rows to `model` until the worker finishes
    ///
    /// `observer` is notified exactly once, after the last row, whether the
    /// import finished, was cancelled or failed.
    pub fn drain_into(
        self,
        model: &mut RowModel,
        observer: &mut dyn ModelObserver,
    ) -> Result<ImportSummary> {
        let outcome = loop {
            match self.receiver.recv() {
                Ok(ImportMessage::Row(row)) => model.push(row),
                Ok(ImportMessage::Finished(summary)) => break Ok(summary),
                Ok(ImportMessage::Failed(e)) => break Err(e),
                Err(_) => break Err(PipelineError::Channel),
            }
        };

        observer.model_changed(model);

        if self.worker.join().is_err() {
            return Err(PipelineError::WorkerPanicked);
        }
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_collapses_runs_of_line_breaks() {
        assert_eq!(split_lines("a\r\nb\n\n\nc"), ["a", "b", "c"]);
        assert_eq!(split_lines("a\rb\r"), ["a", "b"]);
    }

    #[test]
    fn test_split_drops_trailing_but_keeps_leading_empty() {
        assert_eq!(split_lines("\nfirst\nsecond\n\n"), ["", "first", "second"]);
    }

    #[test]
    fn test_split_empty_input() {
        assert!(split_lines("").is_empty());
        assert!(split_lines("\r\n\r\n").is_empty());
    }

    #[test]
    fn test_split_keeps_values_verbatim() {
        assert_eq!(split_lines("  A 1 \n\tB"), ["  A 1 ", "\tB"]);
    }

    #[test]
    fn test_source_kind_from_extension() {
        assert!(matches!(ImportSource::from_path("list.XML"), ImportSource::XmlFile(_)));
        assert!(matches!(ImportSource::from_path("list.txt"), ImportSource::TextFile(_)));
        assert!(matches!(ImportSource::from_path("list"), ImportSource::TextFile(_)));
    }
}
