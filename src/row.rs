use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::format::BarcodeFormat;

/// One entry of the label sheet
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Row {
    /// Barcode value, empty but never absent
    pub barcode: String,
    pub format: BarcodeFormat,
    pub image: Option<PathBuf>,
}

impl Row {
    pub fn new(barcode: impl Into<String>, format: BarcodeFormat) -> Self {
        Self {
            barcode: barcode.into(),
            format,
            image: None,
        }
    }

    /// Builder pattern for attaching an image
    pub fn with_image(mut self, image: impl Into<PathBuf>) -> Self {
        self.image = Some(image.into());
        self
    }

    pub fn image(&self) -> Option<&Path> {
        self.image.as_deref()
    }
}

/// Ordered collection of rows owned by a single thread
///
/// Pipelines never touch the model directly; they hand rows to the owner,
/// which appends them and notifies its observer once per batch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RowModel {
    rows: Vec<Row>,
}

impl RowModel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, row: Row) {
        self.rows.push(row);
    }

    /// Remove the row at `index`, keeping the order of the rest
    pub fn remove(&mut self, index: usize) -> Option<Row> {
        (index < self.rows.len()).then(|| self.rows.remove(index))
    }

    pub fn clear(&mut self) {
        self.rows.clear();
    }

    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Row> {
        self.rows.iter()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

impl FromIterator<Row> for RowModel {
    fn from_iter<I: IntoIterator<Item = Row>>(iter: I) -> Self {
        Self {
            rows: iter.into_iter().collect(),
        }
    }
}

impl<'a> IntoIterator for &'a RowModel {
    type Item = &'a Row;
    type IntoIter = std::slice::Iter<'a, Row>;

    fn into_iter(self) -> Self::IntoIter {
        self.rows.iter()
    }
}

/// Receives the single refresh notification fired after a batch of changes
pub trait ModelObserver {
    fn model_changed(&mut self, model: &RowModel);
}

impl<F> ModelObserver for F
where
    F: FnMut(&RowModel),
{
    fn model_changed(&mut self, model: &RowModel) {
        self(model)
    }
}
