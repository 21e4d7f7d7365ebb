//! XML envelope used to save and reload a label sheet.
//!
//! ```xml
//! <?xml version="1.0" encoding="UTF-8"?>
//! <barcode-list>
//!   <item><name>A-001</name><image>/photos/a.png</image><format>CODE_128</format></item>
//! </barcode-list>
//! ```

use percent_encoding::percent_decode_str;
use quick_xml::events::Event;
use quick_xml::Reader;
use serde::Serialize;
use std::path::PathBuf;
use std::str::FromStr;

use crate::format::BarcodeFormat;
use crate::row::Row;

const XML_DECLARATION: &str = r#"<?xml version="1.0" encoding="UTF-8"?>"#;
const ROOT: &str = "barcode-list";
const ITEM: &str = "item";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename = "barcode-list")]
pub struct BarcodeCollection {
    #[serde(rename = "item")]
    pub items: Vec<BarcodeItem>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BarcodeItem {
    /// The barcode value
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    /// Reference to a rendered barcode image, kept for older documents
    #[serde(skip_serializing_if = "Option::is_none")]
    pub barcode: Option<String>,
    pub format: BarcodeFormat,
}

/// A document that is not a well-formed barcode collection
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{0}")]
pub struct CollectionError(String);

impl BarcodeItem {
    /// Associated image as a path; accepts plain paths and `file:` URIs
    pub fn image_path(&self) -> Option<PathBuf> {
        self.image
            .as_deref()
            .filter(|image| !image.trim().is_empty())
            .map(reference_to_path)
    }

    pub fn to_row(&self) -> Row {
        Row {
            barcode: self.name.clone(),
            format: self.format,
            image: self.image_path(),
        }
    }
}

impl From<&Row> for BarcodeItem {
    fn from(row: &Row) -> Self {
        Self {
            name: row.barcode.clone(),
            image: row.image.as_ref().map(|path| path.to_string_lossy().into_owned()),
            barcode: None,
            format: row.format,
        }
    }
}

impl BarcodeCollection {
    pub fn from_rows<'a>(rows: impl IntoIterator<Item = &'a Row>) -> Self {
        Self {
            items: rows.into_iter().map(BarcodeItem::from).collect(),
        }
    }

    /// Parse a document; element text is kept exactly as written
    pub fn from_xml(xml: &str) -> Result<Self, CollectionError> {
        let mut reader = Reader::from_str(xml);
        reader.config_mut().trim_text(false);

        // Names of the currently open elements, root first
        let mut open: Vec<String> = Vec::new();
        let mut items = Vec::new();
        let mut fields = ItemFields::default();
        let mut text = String::new();
        let mut seen_root = false;

        loop {
            let event = reader.read_event().map_err(|e| {
                CollectionError(format!("{e} at byte {}", reader.buffer_position()))
            })?;

            match event {
                Event::Start(e) => {
                    let name = String::from_utf8_lossy(e.local_name().as_ref()).into_owned();
                    match open.len() {
                        0 => check_root(&name, &mut seen_root)?,
                        1 if name == ITEM => fields = ItemFields::default(),
                        2 => text.clear(),
                        _ => {}
                    }
                    open.push(name);
                }
                Event::Empty(e) => {
                    let name = String::from_utf8_lossy(e.local_name().as_ref()).into_owned();
                    match open.len() {
                        0 => check_root(&name, &mut seen_root)?,
                        1 if name == ITEM => {
                            items.push(std::mem::take(&mut fields).finish(items.len() + 1)?)
                        }
                        2 if open[1] == ITEM => fields.set(&name, String::new()),
                        _ => {}
                    }
                }
                Event::Text(e) if open.len() == 3 => {
                    let value = e.unescape().map_err(|e| CollectionError(e.to_string()))?;
                    text.push_str(&value);
                }
                Event::CData(e) if open.len() == 3 => {
                    text.push_str(&String::from_utf8_lossy(&e.into_inner()));
                }
                Event::End(_) => {
                    let name = open.pop().unwrap_or_default();
                    match open.len() {
                        2 if open[1] == ITEM => fields.set(&name, std::mem::take(&mut text)),
                        1 if name == ITEM => {
                            items.push(std::mem::take(&mut fields).finish(items.len() + 1)?)
                        }
                        _ => {}
                    }
                }
                Event::Eof => break,
                _ => {}
            }
        }

        if let Some(name) = open.last() {
            return Err(CollectionError(format!("document ends inside <{name}>")));
        }
        if !seen_root {
            return Err(CollectionError(format!("document has no <{ROOT}> element")));
        }

        Ok(Self { items })
    }

    pub fn to_xml(&self) -> Result<String, quick_xml::SeError> {
        let mut body = String::new();
        let mut serializer = quick_xml::se::Serializer::new(&mut body);
        serializer.indent(' ', 2);
        self.serialize(serializer)?;
        Ok(format!("{XML_DECLARATION}\n{body}\n"))
    }
}

fn check_root(name: &str, seen_root: &mut bool) -> Result<(), CollectionError> {
    if name != ROOT {
        return Err(CollectionError(format!(
            "expected <{ROOT}> as root element, found <{name}>"
        )));
    }
    *seen_root = true;
    Ok(())
}

/// Child values of one `<item>` collected while reading
#[derive(Debug, Default)]
struct ItemFields {
    name: Option<String>,
    image: Option<String>,
    barcode: Option<String>,
    format: Option<String>,
}

impl ItemFields {
    fn set(&mut self, field: &str, value: String) {
        match field {
            "name" => self.name = Some(value),
            "image" => self.image = Some(value),
            "barcode" => self.barcode = Some(value),
            "format" => self.format = Some(value),
            _ => log::debug!("Ignoring unknown item element <{field}>"),
        }
    }

    fn finish(self, index: usize) -> Result<BarcodeItem, CollectionError> {
        let name = self
            .name
            .ok_or_else(|| CollectionError(format!("item {index} has no <name>")))?;
        let format = self
            .format
            .ok_or_else(|| CollectionError(format!("item {index} has no <format>")))?;
        let format = BarcodeFormat::from_str(format.trim())
            .map_err(|e| CollectionError(format!("item {index}: {e}")))?;

        Ok(BarcodeItem {
            name,
            image: self.image,
            barcode: self.barcode,
            format,
        })
    }
}

/// Convert a stored image reference into a path
///
/// Older documents store `file:/dir/a%20b.png` style URIs.
fn reference_to_path(reference: &str) -> PathBuf {
    let Some(rest) = reference.strip_prefix("file:") else {
        return PathBuf::from(reference);
    };
    // file:///x, file://localhost/x and file:/x all name /x
    let rest = rest
        .strip_prefix("//localhost")
        .or_else(|| rest.strip_prefix("//"))
        .unwrap_or(rest);
    let decoded = percent_decode_str(rest).decode_utf8_lossy().into_owned();
    // file:/C:/dir on Windows
    #[cfg(windows)]
    let decoded = match decoded.strip_prefix('/') {
        Some(drive) if drive.as_bytes().get(1) == Some(&b':') => drive.to_string(),
        _ => decoded,
    };
    PathBuf::from(decoded)
}
