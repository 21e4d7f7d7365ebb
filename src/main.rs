use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::Arc;

// Use the library
use humbug::{
    generate_report,
    progress::ConsoleProgressReporter,
    utils::create_unique_folder,
    BarcodeFormat, BarcodePrompt, CancelFlag, DuplicateBarcodeOption, ExportPipeline,
    ImportPipeline, ImportSource, MissingBarcodeOption, MultipleBarcodeOption,
    NoOpProgressReporter, ProgressReporter, RenamePipeline, RenameReport, ReportFormat, RowModel,
    RxingDecoder, Settings, SheetPipeline,
};

/// humbug - Barcode label sheet import/export and bulk image renaming
#[derive(Parser)]
#[command(name = "humbug")]
#[command(about = "humbug - Barcode label sheets and bulk image renaming")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(long_about = r#"
humbug builds barcode label sheets and renames photographed labels.

Features:
• Import barcode values from the clipboard, text files or saved sheets
• Save sheets as XML barcode collections
• Print label sheets as PDF, laid out with the configured page settings
• Rename a folder of images after the barcode found in each image
• Configurable handling of unreadable images and name clashes
"#)]
pub struct Cli {
    /// Settings file path (defaults to the user config directory)
    #[arg(short, long, value_name = "FILE", global = true)]
    pub config: Option<PathBuf>,

    /// Verbose output mode
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Quiet mode (results only)
    #[arg(long, conflicts_with = "verbose", global = true)]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Import barcode values into a sheet and save or print it
    Import(ImportArgs),
    /// Copy images into a folder, named after the barcode in each image
    Rename(RenameArgs),
    /// Show the effective settings
    Settings(SettingsArgs),
}

#[derive(Args)]
pub struct ImportArgs {
    /// Text (one value per line) or XML files to import, in order
    #[arg(value_name = "FILE")]
    pub files: Vec<PathBuf>,

    /// Import the text currently on the system clipboard
    #[arg(long)]
    pub clipboard: bool,

    /// Import text piped on standard input
    #[arg(long)]
    pub stdin: bool,

    /// Symbology for values from text sources (defaults to the configured one)
    #[arg(short, long, value_name = "FORMAT")]
    pub format: Option<BarcodeFormat>,

    /// Save the sheet as an XML barcode collection
    #[arg(short, long, value_name = "FILE")]
    pub output: Option<PathBuf>,

    /// Render the sheet as a printable PDF
    #[arg(long, value_name = "FILE")]
    pub pdf: Option<PathBuf>,
}

#[derive(Args)]
pub struct RenameArgs {
    /// Folder holding the images
    #[arg(short, long, value_name = "DIR")]
    pub source: PathBuf,

    /// Folder receiving the renamed copies (defaults to a new source_dir/renamed)
    #[arg(short, long, value_name = "DIR")]
    pub target: Option<PathBuf>,

    /// Only look for this symbology
    #[arg(long, value_name = "FORMAT")]
    pub restrict: Option<BarcodeFormat>,

    /// Slower, more thorough decoding for poor images
    #[arg(long)]
    pub try_hard: bool,

    /// What to do with images without a readable barcode
    #[arg(long, value_enum)]
    pub missing: Option<MissingArg>,

    /// What to do when the target name is already taken
    #[arg(long, value_enum)]
    pub duplicate: Option<DuplicateArg>,

    /// How to name images holding several barcodes
    #[arg(long, value_enum)]
    pub multiple: Option<MultipleArg>,

    /// Generate rename report
    #[arg(long)]
    pub report: bool,

    /// Report output format
    #[arg(long, default_value = "json", value_enum)]
    pub report_format: ReportFormatArg,
}

#[derive(Args)]
pub struct SettingsArgs {
    /// Write the effective settings to the settings file
    #[arg(long)]
    pub init: bool,
}

#[derive(Debug, Clone, ValueEnum)]
pub enum MissingArg {
    /// Leave the image out
    Skip,
    /// Copy the image under its original name
    Copy,
    /// Ask for the value
    Prompt,
}

impl From<MissingArg> for MissingBarcodeOption {
    fn from(option: MissingArg) -> Self {
        match option {
            MissingArg::Skip => MissingBarcodeOption::Skip,
            MissingArg::Copy => MissingBarcodeOption::Copy,
            MissingArg::Prompt => MissingBarcodeOption::Prompt,
        }
    }
}

#[derive(Debug, Clone, ValueEnum)]
pub enum DuplicateArg {
    /// Keep the existing file and skip the image
    Skip,
    /// Replace the existing file
    Overwrite,
    /// Add -1, -2, ... to the name
    AppendSuffix,
}

impl From<DuplicateArg> for DuplicateBarcodeOption {
    fn from(option: DuplicateArg) -> Self {
        match option {
            DuplicateArg::Skip => DuplicateBarcodeOption::Skip,
            DuplicateArg::Overwrite => DuplicateBarcodeOption::Overwrite,
            DuplicateArg::AppendSuffix => DuplicateBarcodeOption::AppendSuffix,
        }
    }
}

#[derive(Debug, Clone, ValueEnum)]
pub enum MultipleArg {
    /// Join all values with '-'
    Concatenate,
    /// Use the first value
    PickFirst,
}

impl From<MultipleArg> for MultipleBarcodeOption {
    fn from(option: MultipleArg) -> Self {
        match option {
            MultipleArg::Concatenate => MultipleBarcodeOption::Concatenate,
            MultipleArg::PickFirst => MultipleBarcodeOption::PickFirst,
        }
    }
}

#[derive(Debug, Clone, ValueEnum)]
pub enum ReportFormatArg {
    Json,
    Csv,
}

impl From<ReportFormatArg> for ReportFormat {
    fn from(format: ReportFormatArg) -> Self {
        match format {
            ReportFormatArg::Json => ReportFormat::Json,
            ReportFormatArg::Csv => ReportFormat::Csv,
        }
    }
}

/// Asks on the terminal for the value of an unreadable barcode
struct TerminalPrompt {
    progress: Option<Arc<ConsoleProgressReporter>>,
}

impl BarcodePrompt for TerminalPrompt {
    fn request_barcode(&self, image: &Path) -> Option<String> {
        let ask = || {
            dialoguer::Input::<String>::with_theme(&dialoguer::theme::ColorfulTheme::default())
                .with_prompt(format!("Barcode for {} (empty to skip)", image.display()))
                .allow_empty(true)
                .interact_text()
                .map_err(|e| log::warn!("Prompt failed: {e}"))
                .ok()
        };

        match &self.progress {
            Some(progress) => progress.suspend(ask),
            None => ask(),
        }
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    if cli.verbose {
        env_logger::Builder::from_default_env()
            .filter_level(log::LevelFilter::Debug)
            .init();
    } else if !cli.quiet {
        env_logger::Builder::from_default_env()
            .filter_level(log::LevelFilter::Info)
            .init();
    }

    let settings_path = match &cli.config {
        Some(path) => path.clone(),
        None => Settings::default_path().context("No user config directory available")?,
    };
    let settings = Settings::load(&settings_path)?;

    // Ctrl-C asks the running pipeline to stop after its current unit
    let cancel = CancelFlag::new();
    let handler_flag = cancel.clone();
    ctrlc::set_handler(move || handler_flag.cancel())
        .context("Failed to install Ctrl-C handler")?;

    let progress = Progress {
        quiet: cli.quiet,
        cancel,
    };

    match cli.command {
        Command::Import(args) => run_import(args, &settings, &progress),
        Command::Rename(args) => run_rename(args, &settings, &progress),
        Command::Settings(args) => run_settings(args, &settings, &settings_path),
    }
}

/// Builds one progress reporter per pipeline, all sharing the Ctrl-C flag
struct Progress {
    quiet: bool,
    cancel: CancelFlag,
}

impl Progress {
    fn console(&self) -> Option<Arc<ConsoleProgressReporter>> {
        (!self.quiet).then(|| Arc::new(ConsoleProgressReporter::new(self.cancel.clone())))
    }

    fn reporter(&self, console: &Option<Arc<ConsoleProgressReporter>>) -> Arc<dyn ProgressReporter> {
        match console {
            Some(console) => console.clone() as Arc<dyn ProgressReporter>,
            None => Arc::new(NoOpProgressReporter::with_cancel_flag(self.cancel.clone())),
        }
    }

    fn new_reporter(&self) -> Arc<dyn ProgressReporter> {
        self.reporter(&self.console())
    }
}

fn run_import(args: ImportArgs, settings: &Settings, progress: &Progress) -> Result<()> {
    let quiet = progress.quiet;
    let mut sources = Vec::new();

    if args.clipboard {
        let text = arboard::Clipboard::new()
            .and_then(|mut clipboard| clipboard.get_text())
            .context("Failed to read the clipboard")?;
        sources.push(ImportSource::Clipboard(text));
    }
    if args.stdin {
        let mut text = String::new();
        std::io::stdin()
            .read_to_string(&mut text)
            .context("Failed to read standard input")?;
        sources.push(ImportSource::Clipboard(text));
    }
    sources.extend(args.files.into_iter().map(ImportSource::from_path));

    if sources.is_empty() {
        bail!("Nothing to import: pass files, --clipboard or --stdin");
    }

    let mut options = settings.import_options();
    if let Some(format) = args.format {
        options.format = format;
    }

    let mut model = RowModel::new();
    let mut refresh = |model: &RowModel| log::debug!("Sheet now holds {} rows", model.len());

    for source in sources {
        let description = source.describe();
        let summary = ImportPipeline::new(source, options.clone())
            .spawn(progress.new_reporter())
            .drain_into(&mut model, &mut refresh)
            .with_context(|| format!("Import from {description} failed"))?;

        if summary.cancelled {
            log::info!("Import from {description} cancelled after {} rows", summary.imported);
            break;
        }
    }

    if args.output.is_none() && args.pdf.is_none() {
        for row in model.iter() {
            let image = row
                .image()
                .map(|image| image.display().to_string())
                .unwrap_or_default();
            println!("{}\t{}\t{}", row.barcode, row.format, image);
        }
        return Ok(());
    }

    if let Some(output) = args.output {
        let summary = ExportPipeline::new(output)
            .spawn(model.rows().to_vec(), progress.new_reporter())
            .join()?;
        if !quiet {
            println!(
                "💾 Saved {} barcodes to {}",
                summary.exported,
                summary.destination.display()
            );
        }
    }

    if let Some(pdf) = args.pdf {
        let summary = SheetPipeline::new(pdf, settings.sheet_options())
            .spawn(model.rows().to_vec(), progress.new_reporter())
            .join()?;
        if summary.cancelled {
            println!("⏹️ Label sheet cancelled, nothing written");
        } else if !quiet {
            println!(
                "🖨️ Saved label sheet with {} barcodes on {} pages to {}",
                summary.rows,
                summary.pages,
                summary.destination.display()
            );
            for value in &summary.unrendered {
                println!("  ⚠️ Printed as text only: {value:?}");
            }
        }
    }

    Ok(())
}

fn run_rename(args: RenameArgs, settings: &Settings, progress: &Progress) -> Result<()> {
    let quiet = progress.quiet;
    let target = match args.target {
        Some(target) => target,
        // Only create the default target next to a source that can be processed
        None if args.source.is_dir() => create_unique_folder(&args.source, "renamed")
            .context("Failed to create target directory")?,
        None => args.source.join("renamed"),
    };

    let mut options = settings
        .rename_options(&args.source, target)
        .with_restriction(args.restrict)
        .with_try_hard(args.try_hard || settings.try_hard);
    if let Some(missing) = args.missing {
        options = options.with_missing(missing.into());
    }
    if let Some(duplicate) = args.duplicate {
        options = options.with_duplicate(duplicate.into());
    }
    if let Some(multiple) = args.multiple {
        options = options.with_multiple(multiple.into());
    }

    let console = progress.console();
    let mut pipeline = RenamePipeline::new(options, RxingDecoder::new());
    if pipeline.options().missing == MissingBarcodeOption::Prompt {
        pipeline = pipeline.with_prompt(TerminalPrompt {
            progress: console.clone(),
        });
    }

    let report = pipeline.spawn(progress.reporter(&console))?.join()?;

    if args.report {
        let path = generate_report(&report, args.report_format.into(), Path::new("."))?;
        println!("Report saved to: {}", path.display());
    }

    if !quiet {
        print_results_summary(&report);
    }

    Ok(())
}

fn run_settings(args: SettingsArgs, settings: &Settings, path: &Path) -> Result<()> {
    if args.init {
        settings.save(path)?;
        println!("Settings saved to: {}", path.display());
    } else {
        println!("# {}", path.display());
        print!("{}", settings.to_toml()?);
    }
    Ok(())
}

fn print_results_summary(report: &RenameReport) {
    use humansize::{format_size, DECIMAL};

    let counts = &report.counts;

    if report.cancelled {
        println!("\n⏹️ Rename cancelled after {} of {} images", counts.visited, report.total_files);
    } else {
        println!("\n🎉 Rename completed!");
    }
    println!("📊 Results Summary:");
    println!("  ✅ Renamed: {} files", counts.renamed);
    if counts.overwritten > 0 {
        println!("  ♻️ Overwritten: {} files", counts.overwritten);
    }
    if counts.copied_original > 0 {
        println!("  📄 Copied under original name: {} files", counts.copied_original);
    }
    if counts.skipped_missing > 0 {
        println!("  ⏭️ Skipped (no barcode): {} files", counts.skipped_missing);
    }
    if counts.skipped_duplicate > 0 {
        println!("  ⏭️ Skipped (name taken): {} files", counts.skipped_duplicate);
    }
    if counts.failed > 0 {
        println!("  ❌ Failed: {} files", counts.failed);
    }
    println!("  💾 Written: {}", format_size(counts.bytes_written, DECIMAL));
    println!("  🕐 Duration: {}", humbug::format_duration(report.duration));

    let missing = report.no_barcode_found();
    if !missing.is_empty() && missing.len() <= 10 {
        println!("\n🔍 No barcode found in:");
        for file in &missing {
            println!("  • {}", file.display());
        }
    } else if missing.len() > 10 {
        println!("\n🔍 No barcode found in {} files (use --report for full details)", missing.len());
    }
}
