//! Printable label sheet: every row's barcode, its value and its image laid
//! out top to bottom on A4 pages.
//!
//! All layout values are in millimetres and converted to PDF points only
//! when an operation is emitted.

use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Dictionary, Document, Object, ObjectId, Stream};
use rxing::Writer;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::config::{Margins, Settings};
use crate::decoder::to_rxing;
use crate::error::{PipelineError, Result};
use crate::export::ExportHandle;
use crate::format::BarcodeFormat;
use crate::progress::ProgressReporter;
use crate::row::Row;

const SHEET_PHASE: &str = "Writing label sheet";

const PAGE_WIDTH_MM: f32 = 210.0;
const PAGE_HEIGHT_MM: f32 = 297.0;
const MM_PER_INCH: f32 = 25.4;
const POINTS_PER_INCH: f32 = 72.0;

const LINEAR_HEIGHT_MM: f32 = 15.0;
const MODULE_WIDTH_MM: f32 = 0.33;
const MATRIX_SIZE_MM: f32 = 25.0;
const CAPTION_HEIGHT_MM: f32 = 4.0;
const CAPTION_SIZE_PT: f32 = 8.0;
const PHOTO_DPI: f32 = 200.0;

/// Page geometry taken from the settings
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SheetOptions {
    pub margins: Margins,
    /// Space between rows and between a barcode and its image
    pub barcode_padding: u32,
    /// Height of each row's image; 0 leaves images out
    pub image_height: u32,
}

impl Default for SheetOptions {
    fn default() -> Self {
        Settings::default().sheet_options()
    }
}

/// Result of a sheet export that was not aborted by an error
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SheetSummary {
    pub destination: PathBuf,
    pub rows: usize,
    pub pages: usize,
    /// Values that could not be encoded in their symbology; only their text is printed
    pub unrendered: Vec<String>,
    /// Cancelled before the file was written
    pub cancelled: bool,
}

/// Renders the row model into a PDF label sheet
pub struct SheetPipeline {
    destination: PathBuf,
    options: SheetOptions,
}

impl SheetPipeline {
    pub fn new(destination: impl Into<PathBuf>, options: SheetOptions) -> Self {
        Self {
            destination: destination.into(),
            options,
        }
    }

    pub fn destination(&self) -> &Path {
        &self.destination
    }

    /// Lay out `rows` in order and write the PDF
    ///
    /// Cancellation is checked before every row; a cancelled run writes nothing.
    pub fn run(&self, rows: &[Row], reporter: &dyn ProgressReporter) -> Result<SheetSummary> {
        let layout = Layout::new(&self.options).map_err(|e| self.export_error(e))?;

        reporter.begin_task(SHEET_PHASE, Some(rows.len()));

        let mut writer = SheetWriter::new();
        let mut cursor = layout.top;
        let mut unrendered = Vec::new();

        for (index, row) in rows.iter().enumerate() {
            if reporter.is_cancelled() {
                log::info!("Label sheet cancelled after {index} of {} rows", rows.len());
                reporter.done();
                return Ok(SheetSummary {
                    destination: self.destination.clone(),
                    rows: index,
                    pages: 0,
                    unrendered,
                    cancelled: true,
                });
            }

            reporter.sub_task(&format!("Rendering barcode {}", index + 1));

            let barcode = match encode_barcode(row) {
                Ok(image) => Some(image),
                Err(e) => {
                    log::warn!("Cannot render {:?} as {}: {}", row.barcode, row.format, e);
                    unrendered.push(row.barcode.clone());
                    None
                }
            };
            let photo = row
                .image()
                .filter(|_| layout.image_height > 0.0)
                .and_then(|path| match load_photo(path, layout.image_height) {
                    Ok(image) => Some(image),
                    Err(e) => {
                        log::warn!("Skipping image {}: {}", path.display(), e);
                        None
                    }
                });

            let cell = layout.measure(row.format, barcode.as_ref(), photo.as_ref());
            if cursor + cell.height > layout.bottom && writer.page_has_content() {
                writer.finish_page().map_err(|e| self.export_error(e))?;
                cursor = layout.top;
            }

            writer.place_row(&layout, &cell, cursor, &row.barcode, barcode, photo);
            cursor += cell.height + layout.padding;
            reporter.worked(index + 1);
        }

        let result = self.save(writer);
        reporter.done();

        match result {
            Ok(pages) => {
                log::info!(
                    "Saved label sheet with {} rows on {} pages to {}",
                    rows.len(),
                    pages,
                    self.destination.display()
                );
                Ok(SheetSummary {
                    destination: self.destination.clone(),
                    rows: rows.len(),
                    pages,
                    unrendered,
                    cancelled: false,
                })
            }
            Err(e) => {
                log::error!("{e}");
                Err(e)
            }
        }
    }

    /// Start the sheet export on a worker thread with its own copy of the rows
    pub fn spawn(
        self,
        rows: Vec<Row>,
        reporter: Arc<dyn ProgressReporter>,
    ) -> ExportHandle<SheetSummary> {
        ExportHandle::spawn(move || self.run(&rows, reporter.as_ref()))
    }

    fn save(&self, writer: SheetWriter) -> Result<usize> {
        if let Some(parent) = self.destination.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| self.export_error(e))?;
        }
        writer
            .save(&self.destination)
            .map_err(|e| self.export_error(e))
    }

    fn export_error(&self, error: impl std::fmt::Display) -> PipelineError {
        PipelineError::Export {
            path: self.destination.clone(),
            message: error.to_string(),
        }
    }
}

/// Raw 8 bit image data for an image XObject
struct PdfImage {
    width: u32,
    height: u32,
    color_space: &'static str,
    data: Vec<u8>,
}

fn encode_barcode(row: &Row) -> std::result::Result<PdfImage, String> {
    if row.barcode.is_empty() {
        return Err("empty value".to_string());
    }

    let matrix = rxing::MultiFormatWriter
        .encode(&row.barcode, &to_rxing(row.format), 0, 0)
        .map_err(|e| e.to_string())?;

    let (width, height) = (matrix.getWidth(), matrix.getHeight());
    let mut data = Vec::with_capacity(width as usize * height as usize);
    for y in 0..height {
        for x in 0..width {
            data.push(if matrix.get(x, y) { 0 } else { 255 });
        }
    }

    Ok(PdfImage {
        width,
        height,
        color_space: "DeviceGray",
        data,
    })
}

/// Load an image scaled down to what prints sharply at `height_mm`
fn load_photo(path: &Path, height_mm: f32) -> std::result::Result<PdfImage, String> {
    let image = image::open(path).map_err(|e| e.to_string())?;

    let max_height = ((height_mm / MM_PER_INCH) * PHOTO_DPI).ceil().max(1.0) as u32;
    let rgb = image.thumbnail(max_height.saturating_mul(4), max_height).to_rgb8();
    let (width, height) = rgb.dimensions();

    Ok(PdfImage {
        width,
        height,
        color_space: "DeviceRGB",
        data: rgb.into_raw(),
    })
}

fn is_matrix(format: BarcodeFormat) -> bool {
    matches!(
        format,
        BarcodeFormat::Aztec
            | BarcodeFormat::DataMatrix
            | BarcodeFormat::MaxiCode
            | BarcodeFormat::Pdf417
            | BarcodeFormat::QrCode
    )
}

fn points(mm: f32) -> f32 {
    mm / MM_PER_INCH * POINTS_PER_INCH
}

/// Drawn sizes of one row, in millimetres
#[derive(Debug, Clone, Copy, PartialEq)]
struct Cell {
    barcode: (f32, f32),
    photo: (f32, f32),
    height: f32,
}

#[derive(Debug, Clone, Copy)]
struct Layout {
    left: f32,
    top: f32,
    bottom: f32,
    content_width: f32,
    padding: f32,
    image_height: f32,
}

impl Layout {
    fn new(options: &SheetOptions) -> std::result::Result<Self, String> {
        let margins = options.margins;
        let content_width = PAGE_WIDTH_MM - (margins.left + margins.right) as f32;
        let content_height = PAGE_HEIGHT_MM - (margins.top + margins.bottom) as f32;

        if content_width <= 0.0 || content_height <= 0.0 {
            return Err(format!(
                "margins {}/{}/{}/{} mm leave no printable area",
                margins.left, margins.top, margins.right, margins.bottom
            ));
        }

        Ok(Self {
            left: margins.left as f32,
            top: margins.top as f32,
            bottom: PAGE_HEIGHT_MM - margins.bottom as f32,
            content_width,
            padding: options.barcode_padding as f32,
            image_height: options.image_height as f32,
        })
    }

    /// Width available to the barcode; half the line when an image shares it
    fn barcode_column(&self, with_photo: bool) -> f32 {
        if with_photo {
            ((self.content_width - self.padding) / 2.0).max(self.content_width / 4.0)
        } else {
            self.content_width
        }
    }

    fn photo_left(&self, with_photo: bool) -> f32 {
        self.left + self.barcode_column(with_photo) + self.padding
    }

    fn measure(&self, format: BarcodeFormat, barcode: Option<&PdfImage>, photo: Option<&PdfImage>) -> Cell {
        let column = self.barcode_column(photo.is_some());

        let barcode = match barcode {
            Some(image) if is_matrix(format) => {
                let width = MATRIX_SIZE_MM.min(column);
                (width, width * image.height as f32 / image.width as f32)
            }
            Some(image) => ((image.width as f32 * MODULE_WIDTH_MM).min(column), LINEAR_HEIGHT_MM),
            None => (0.0, 0.0),
        };

        let photo = match photo {
            Some(image) => {
                let room = (self.content_width - column - self.padding).max(0.0);
                let mut height = self.image_height;
                let mut width = height * image.width as f32 / image.height as f32;
                if width > room {
                    height *= room / width;
                    width = room;
                }
                (width, height)
            }
            None => (0.0, 0.0),
        };

        Cell {
            barcode,
            photo,
            height: (barcode.1 + CAPTION_HEIGHT_MM).max(photo.1),
        }
    }
}

/// Builds the PDF page by page
struct SheetWriter {
    doc: Document,
    pages_id: ObjectId,
    font_id: ObjectId,
    pages: Vec<ObjectId>,
    operations: Vec<Operation>,
    xobjects: Dictionary,
    image_count: usize,
}

impl SheetWriter {
    fn new() -> Self {
        let mut doc = Document::with_version("1.5");
        let pages_id = doc.new_object_id();
        let font_id = doc.add_object(dictionary! {
            "Type" => "Font",
            "Subtype" => "Type1",
            "BaseFont" => "Helvetica",
            "Encoding" => "WinAnsiEncoding",
        });

        Self {
            doc,
            pages_id,
            font_id,
            pages: Vec::new(),
            operations: Vec::new(),
            xobjects: Dictionary::new(),
            image_count: 0,
        }
    }

    fn page_has_content(&self) -> bool {
        !self.operations.is_empty()
    }

    /// Draw one row whose top edge is `top` mm below the page's top edge
    fn place_row(
        &mut self,
        layout: &Layout,
        cell: &Cell,
        top: f32,
        value: &str,
        barcode: Option<PdfImage>,
        photo: Option<PdfImage>,
    ) {
        let with_photo = photo.is_some();

        if let Some(image) = barcode {
            let (width, height) = cell.barcode;
            self.draw_image(image, layout.left, top + height, width, height);
        }

        let baseline = top + cell.barcode.1 + CAPTION_HEIGHT_MM - 1.0;
        self.draw_text(value, layout.left, baseline);

        if let Some(image) = photo {
            let (width, height) = cell.photo;
            self.draw_image(image, layout.photo_left(with_photo), top + height, width, height);
        }
    }

    /// Place `image` with its lower left corner `bottom` mm below the top edge
    fn draw_image(&mut self, image: PdfImage, left: f32, bottom: f32, width: f32, height: f32) {
        self.image_count += 1;
        let name = format!("Im{}", self.image_count);

        let image_id = self.doc.add_object(Stream::new(
            dictionary! {
                "Type" => "XObject",
                "Subtype" => "Image",
                "Width" => image.width as i64,
                "Height" => image.height as i64,
                "ColorSpace" => image.color_space,
                "BitsPerComponent" => 8,
            },
            image.data,
        ));
        self.xobjects.set(name.as_bytes(), image_id);

        self.operations.push(Operation::new("q", vec![]));
        self.operations.push(Operation::new(
            "cm",
            vec![
                points(width).into(),
                0.into(),
                0.into(),
                points(height).into(),
                points(left).into(),
                points(PAGE_HEIGHT_MM - bottom).into(),
            ],
        ));
        self.operations
            .push(Operation::new("Do", vec![Object::Name(name.into_bytes())]));
        self.operations.push(Operation::new("Q", vec![]));
    }

    fn draw_text(&mut self, text: &str, left: f32, baseline: f32) {
        // Helvetica's WinAnsi encoding covers Latin-1; anything else prints as '?'
        let bytes: Vec<u8> = text
            .chars()
            .map(|c| u8::try_from(u32::from(c)).unwrap_or(b'?'))
            .collect();

        self.operations.extend([
            Operation::new("BT", vec![]),
            Operation::new("Tf", vec![Object::Name(b"F1".to_vec()), CAPTION_SIZE_PT.into()]),
            Operation::new(
                "Td",
                vec![points(left).into(), points(PAGE_HEIGHT_MM - baseline).into()],
            ),
            Operation::new("Tj", vec![Object::string_literal(bytes)]),
            Operation::new("ET", vec![]),
        ]);
    }

    fn finish_page(&mut self) -> std::result::Result<(), String> {
        let content = Content {
            operations: std::mem::take(&mut self.operations),
        };
        let content_id = self.doc.add_object(Stream::new(
            dictionary! {},
            content.encode().map_err(|e| e.to_string())?,
        ));

        let resources = dictionary! {
            "Font" => dictionary! {
                "F1" => self.font_id,
            },
            "XObject" => std::mem::take(&mut self.xobjects),
        };
        let page_id = self.doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => self.pages_id,
            "Contents" => content_id,
            "Resources" => resources,
        });
        self.pages.push(page_id);
        Ok(())
    }

    /// Close the last page and write the document; returns the page count
    fn save(mut self, path: &Path) -> std::result::Result<usize, String> {
        if self.page_has_content() || self.pages.is_empty() {
            self.finish_page()?;
        }

        let kids: Vec<Object> = self.pages.iter().map(|id| Object::Reference(*id)).collect();
        let media_box: Vec<Object> = vec![
            0.into(),
            0.into(),
            points(PAGE_WIDTH_MM).into(),
            points(PAGE_HEIGHT_MM).into(),
        ];
        let pages = dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => self.pages.len() as i64,
            "MediaBox" => media_box,
        };
        self.doc.objects.insert(self.pages_id, Object::Dictionary(pages));

        let catalog_id = self.doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => self.pages_id,
        });
        self.doc.trailer.set("Root", catalog_id);
        self.doc.compress();

        self.doc.save(path).map_err(|e| e.to_string())?;
        Ok(self.pages.len())
    }
}
