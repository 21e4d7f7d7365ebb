//! Integration tests for the humbug pipelines
//!
//! Every test works in its own temporary folder. Renames use a decoder that
//! answers from a table keyed by file name, so no real images are needed.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use humbug::decoder::DecodeError;
use humbug::{
    BarcodeDecoder, BarcodeFormat, DecodeHints, DecodedBarcode, DuplicateBarcodeOption,
    ExportPipeline, ImportOptions, ImportPipeline, ImportSource, MissingBarcodeOption,
    NoOpProgressReporter, PipelineError, ProgressReporter, RenameDecision, RenameOptions,
    RenamePipeline, Row, RowModel,
};

/// Decoder answering from a table keyed by file name
struct StubDecoder(HashMap<String, String>);

impl StubDecoder {
    fn new(entries: &[(&str, &str)]) -> Self {
        Self(
            entries
                .iter()
                .map(|(name, value)| (name.to_string(), value.to_string()))
                .collect(),
        )
    }
}

impl BarcodeDecoder for StubDecoder {
    fn decode(&self, image: &Path, _hints: &DecodeHints) -> Result<Vec<DecodedBarcode>, DecodeError> {
        let name = image.file_name().unwrap().to_string_lossy().into_owned();
        Ok(self
            .0
            .get(&name)
            .map(|value| vec![DecodedBarcode::new(value.as_str(), Some(BarcodeFormat::Code128))])
            .unwrap_or_default())
    }
}

/// Reporter that asks to stop once `limit` units are done
struct CancelAfter {
    limit: usize,
    completed: AtomicUsize,
}

impl CancelAfter {
    fn new(limit: usize) -> Self {
        Self {
            limit,
            completed: AtomicUsize::new(0),
        }
    }
}

impl ProgressReporter for CancelAfter {
    fn begin_task(&self, _phase: &str, _total: Option<usize>) {}

    fn worked(&self, completed: usize) {
        self.completed.store(completed, Ordering::SeqCst);
    }

    fn is_cancelled(&self) -> bool {
        self.completed.load(Ordering::SeqCst) >= self.limit
    }
}

/// Helper function to run an import through the worker and channel
fn import(source: ImportSource, reporter: Arc<dyn ProgressReporter>) -> (RowModel, usize, humbug::error::Result<humbug::ImportSummary>) {
    let mut model = RowModel::new();
    let mut notifications = 0;
    let result = ImportPipeline::new(source, ImportOptions::new(BarcodeFormat::Ean13))
        .spawn(reporter)
        .drain_into(&mut model, &mut |_: &RowModel| notifications += 1);
    (model, notifications, result)
}

/// Helper function to create source and target folders
fn setup_folders() -> (tempfile::TempDir, PathBuf, PathBuf) {
    let dir = tempfile::tempdir().unwrap();
    let source = dir.path().join("photos");
    let target = dir.path().join("renamed");
    fs::create_dir(&source).unwrap();
    fs::create_dir(&target).unwrap();
    (dir, source, target)
}

fn target_listing(target: &Path) -> Vec<String> {
    let mut names: Vec<String> = fs::read_dir(target)
        .unwrap()
        .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    names
}

#[test]
fn test_clipboard_import_preserves_order_and_format() {
    let text = "4006381333931\r\n5901234123457\n\n9780201379624\n";
    let (model, notifications, result) =
        import(ImportSource::Clipboard(text.to_string()), Arc::new(NoOpProgressReporter::new()));

    let summary = result.unwrap();
    assert_eq!(summary.imported, 3);
    assert!(!summary.cancelled);
    assert_eq!(notifications, 1);

    let values: Vec<&str> = model.iter().map(|row| row.barcode.as_str()).collect();
    assert_eq!(values, ["4006381333931", "5901234123457", "9780201379624"]);
    assert!(model.iter().all(|row| row.format == BarcodeFormat::Ean13 && row.image.is_none()));
}

#[test]
fn test_text_file_import() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("labels.txt");
    fs::write(&path, "A-1\nA-2\r\nA-3").unwrap();

    let (model, notifications, result) =
        import(ImportSource::from_path(&path), Arc::new(NoOpProgressReporter::new()));

    assert_eq!(result.unwrap().imported, 3);
    assert_eq!(notifications, 1);
    assert_eq!(model.rows()[2].barcode, "A-3");
}

#[test]
fn test_export_then_import_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let sheet = dir.path().join("sheet.xml");

    let rows: RowModel = vec![
        Row::new("PLOT-001", BarcodeFormat::Code128).with_image("/photos/plot 1.jpg"),
        Row::new("https://example.org/p/2", BarcodeFormat::QrCode),
        Row::new("5901234123457", BarcodeFormat::Ean13).with_image("/photos/3.png"),
    ]
    .into_iter()
    .collect();

    let summary = ExportPipeline::new(&sheet)
        .run(rows.rows(), &NoOpProgressReporter::new())
        .unwrap();
    assert_eq!(summary.exported, 3);

    let (model, notifications, result) =
        import(ImportSource::from_path(&sheet), Arc::new(NoOpProgressReporter::new()));

    assert_eq!(result.unwrap().imported, 3);
    assert_eq!(notifications, 1);
    assert_eq!(model.rows(), rows.rows());
}

#[test]
fn test_round_trip_keeps_surrounding_whitespace() {
    let dir = tempfile::tempdir().unwrap();
    let sheet = dir.path().join("sheet.xml");

    let (pasted, _, result) =
        import(ImportSource::Clipboard("ABC \n".to_string()), Arc::new(NoOpProgressReporter::new()));
    assert_eq!(result.unwrap().imported, 1);

    let mut rows = vec![
        Row::new("  A 1 ", BarcodeFormat::Code128),
        Row::new("\tB", BarcodeFormat::QrCode),
    ];
    rows.extend(pasted.iter().cloned());

    let summary = ExportPipeline::new(&sheet)
        .spawn(rows.clone(), Arc::new(NoOpProgressReporter::new()))
        .join()
        .unwrap();
    assert_eq!(summary.exported, 3);

    let (model, _, result) =
        import(ImportSource::from_path(&sheet), Arc::new(NoOpProgressReporter::new()));

    assert_eq!(result.unwrap().imported, 3);
    assert_eq!(model.rows(), rows.as_slice());
    assert_eq!(model.rows()[2].barcode, "ABC ");
}

#[test]
fn test_malformed_xml_fails_without_rows() {
    let dir = tempfile::tempdir().unwrap();
    let sheet = dir.path().join("broken.xml");
    fs::write(&sheet, "<barcode-list><item><name>A</name><format>CODE_128").unwrap();

    let (model, notifications, result) =
        import(ImportSource::from_path(&sheet), Arc::new(NoOpProgressReporter::new()));

    assert!(matches!(result, Err(PipelineError::MalformedXml { .. })));
    assert!(model.is_empty());
    assert_eq!(notifications, 1);
}

#[test]
fn test_missing_text_file_is_an_io_error() {
    let dir = tempfile::tempdir().unwrap();
    let (model, _, result) = import(
        ImportSource::from_path(dir.path().join("absent.txt")),
        Arc::new(NoOpProgressReporter::new()),
    );

    assert!(matches!(result, Err(PipelineError::Io { .. })));
    assert!(model.is_empty());
}

#[test]
fn test_cancelled_import_keeps_committed_rows() {
    let text = (1..=10).map(|i| format!("V{i}")).collect::<Vec<_>>().join("\n");
    let (model, notifications, result) =
        import(ImportSource::Clipboard(text), Arc::new(CancelAfter::new(4)));

    let summary = result.unwrap();
    assert!(summary.cancelled);
    assert_eq!(summary.imported, 4);
    assert_eq!(model.len(), 4);
    assert_eq!(model.rows()[3].barcode, "V4");
    assert_eq!(notifications, 1);
}

#[test]
fn test_rename_is_deterministic_across_runs() {
    let (_dir, source, target) = setup_folders();
    for name in ["a.jpg", "b.jpg", "c.png", "d.png"] {
        fs::write(source.join(name), name.as_bytes()).unwrap();
    }
    let decoder = || StubDecoder::new(&[("a.jpg", "X"), ("b.jpg", "X"), ("c.png", "Y")]);
    let options = RenameOptions::new(&source, &target)
        .with_missing(MissingBarcodeOption::Copy)
        .with_duplicate(DuplicateBarcodeOption::AppendSuffix);

    let first = RenamePipeline::new(options.clone(), decoder()).run().unwrap();
    let first_listing = target_listing(&target);

    fs::remove_dir_all(&target).unwrap();
    fs::create_dir(&target).unwrap();

    let second = RenamePipeline::new(options, decoder()).run().unwrap();

    assert_eq!(first.outcomes, second.outcomes);
    assert_eq!(first_listing, target_listing(&target));
    assert_eq!(first_listing, ["X-1.jpg", "X.jpg", "Y.png", "d.png"]);
}

#[test]
fn test_duplicate_skip_keeps_one_file() {
    let (_dir, source, target) = setup_folders();
    fs::write(source.join("first.jpg"), b"first").unwrap();
    fs::write(source.join("second.jpg"), b"second").unwrap();
    let decoder = StubDecoder::new(&[("first.jpg", "SAME"), ("second.jpg", "SAME")]);

    let options = RenameOptions::new(&source, &target).with_duplicate(DuplicateBarcodeOption::Skip);
    let report = RenamePipeline::new(options, decoder).run().unwrap();

    assert_eq!(target_listing(&target), ["SAME.jpg"]);
    assert_eq!(fs::read(target.join("SAME.jpg")).unwrap(), b"first");
    assert_eq!(report.outcomes[1].decision, RenameDecision::SkippedDuplicate);
    assert_eq!(report.counts.skipped_duplicate, 1);
}

#[test]
fn test_duplicate_append_suffix_keeps_both_files() {
    let (_dir, source, target) = setup_folders();
    fs::write(source.join("first.jpg"), b"first").unwrap();
    fs::write(source.join("second.jpg"), b"second").unwrap();
    let decoder = StubDecoder::new(&[("first.jpg", "SAME"), ("second.jpg", "SAME")]);

    let options =
        RenameOptions::new(&source, &target).with_duplicate(DuplicateBarcodeOption::AppendSuffix);
    RenamePipeline::new(options, decoder).run().unwrap();

    assert_eq!(target_listing(&target), ["SAME-1.jpg", "SAME.jpg"]);
    assert_eq!(fs::read(target.join("SAME-1.jpg")).unwrap(), b"second");
}

#[test]
fn test_missing_skip_writes_nothing() {
    let (_dir, source, target) = setup_folders();
    fs::write(source.join("blank.png"), b"nothing here").unwrap();

    let options = RenameOptions::new(&source, &target).with_missing(MissingBarcodeOption::Skip);
    let report = RenamePipeline::new(options, StubDecoder::new(&[])).run().unwrap();

    assert!(target_listing(&target).is_empty());
    assert_eq!(report.outcomes[0].decision, RenameDecision::SkippedMissing);
    assert_eq!(report.no_barcode_found(), [source.join("blank.png").as_path()]);
}

#[test]
fn test_missing_copy_keeps_original_name_and_content() {
    let (_dir, source, target) = setup_folders();
    fs::write(source.join("blank.png"), b"nothing here").unwrap();

    let options = RenameOptions::new(&source, &target).with_missing(MissingBarcodeOption::Copy);
    let report = RenamePipeline::new(options, StubDecoder::new(&[])).run().unwrap();

    assert_eq!(fs::read(target.join("blank.png")).unwrap(), b"nothing here");
    assert_eq!(
        report.outcomes[0].decision,
        RenameDecision::CopiedOriginal {
            target: target.join("blank.png")
        }
    );
}

#[test]
fn test_invalid_folders_are_rejected_before_any_work() {
    let (dir, source, target) = setup_folders();
    fs::write(source.join("a.jpg"), b"a").unwrap();
    let decoder = || StubDecoder::new(&[("a.jpg", "A")]);

    let missing_source = RenameOptions::new(dir.path().join("nope"), &target);
    let err = RenamePipeline::new(missing_source, decoder()).run().unwrap_err();
    assert!(matches!(err, PipelineError::InvalidFolder { role: "source", .. }));

    let missing_target = RenameOptions::new(&source, dir.path().join("nope"));
    let err = RenamePipeline::new(missing_target, decoder())
        .spawn(Arc::new(NoOpProgressReporter::new()))
        .err()
        .unwrap();
    assert!(matches!(err, PipelineError::InvalidFolder { role: "target", .. }));

    assert!(target_listing(&target).is_empty());
    assert!(!dir.path().join("nope").exists());
}

#[test]
fn test_cancelled_rename_keeps_processed_files() {
    let (_dir, source, target) = setup_folders();
    for name in ["1.jpg", "2.jpg", "3.jpg"] {
        fs::write(source.join(name), name.as_bytes()).unwrap();
    }
    let decoder = StubDecoder::new(&[("1.jpg", "ONE"), ("2.jpg", "TWO"), ("3.jpg", "THREE")]);

    let report = RenamePipeline::new(RenameOptions::new(&source, &target), decoder)
        .run_with_progress(&CancelAfter::new(2))
        .unwrap();

    assert!(report.cancelled);
    assert_eq!(report.outcomes.len(), 2);
    assert_eq!(target_listing(&target), ["ONE.jpg", "TWO.jpg"]);
}
