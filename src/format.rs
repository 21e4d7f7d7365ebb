use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Barcode symbology
///
/// The canonical names are the ones written to barcode collection documents
/// and settings files (`CODE_128`, `QR_CODE`, ...).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum BarcodeFormat {
    #[serde(rename = "AZTEC")]
    Aztec,
    #[serde(rename = "CODABAR")]
    Codabar,
    #[serde(rename = "CODE_39")]
    Code39,
    #[serde(rename = "CODE_93")]
    Code93,
    #[default]
    #[serde(rename = "CODE_128")]
    Code128,
    #[serde(rename = "DATA_MATRIX")]
    DataMatrix,
    #[serde(rename = "EAN_8")]
    Ean8,
    #[serde(rename = "EAN_13")]
    Ean13,
    #[serde(rename = "ITF")]
    Itf,
    #[serde(rename = "MAXICODE")]
    MaxiCode,
    #[serde(rename = "PDF_417")]
    Pdf417,
    #[serde(rename = "QR_CODE")]
    QrCode,
    #[serde(rename = "RSS_14")]
    Rss14,
    #[serde(rename = "RSS_EXPANDED")]
    RssExpanded,
    #[serde(rename = "UPC_A")]
    UpcA,
    #[serde(rename = "UPC_E")]
    UpcE,
    #[serde(rename = "UPC_EAN_EXTENSION")]
    UpcEanExtension,
}

impl BarcodeFormat {
    pub const ALL: [BarcodeFormat; 17] = [
        BarcodeFormat::Aztec,
        BarcodeFormat::Codabar,
        BarcodeFormat::Code39,
        BarcodeFormat::Code93,
        BarcodeFormat::Code128,
        BarcodeFormat::DataMatrix,
        BarcodeFormat::Ean8,
        BarcodeFormat::Ean13,
        BarcodeFormat::Itf,
        BarcodeFormat::MaxiCode,
        BarcodeFormat::Pdf417,
        BarcodeFormat::QrCode,
        BarcodeFormat::Rss14,
        BarcodeFormat::RssExpanded,
        BarcodeFormat::UpcA,
        BarcodeFormat::UpcE,
        BarcodeFormat::UpcEanExtension,
    ];

    /// Canonical name as stored in documents and settings
    pub fn as_str(&self) -> &'static str {
        match self {
            BarcodeFormat::Aztec => "AZTEC",
            BarcodeFormat::Codabar => "CODABAR",
            BarcodeFormat::Code39 => "CODE_39",
            BarcodeFormat::Code93 => "CODE_93",
            BarcodeFormat::Code128 => "CODE_128",
            BarcodeFormat::DataMatrix => "DATA_MATRIX",
            BarcodeFormat::Ean8 => "EAN_8",
            BarcodeFormat::Ean13 => "EAN_13",
            BarcodeFormat::Itf => "ITF",
            BarcodeFormat::MaxiCode => "MAXICODE",
            BarcodeFormat::Pdf417 => "PDF_417",
            BarcodeFormat::QrCode => "QR_CODE",
            BarcodeFormat::Rss14 => "RSS_14",
            BarcodeFormat::RssExpanded => "RSS_EXPANDED",
            BarcodeFormat::UpcA => "UPC_A",
            BarcodeFormat::UpcE => "UPC_E",
            BarcodeFormat::UpcEanExtension => "UPC_EAN_EXTENSION",
        }
    }
}

impl fmt::Display for BarcodeFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when a symbology name is not recognised
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Unknown barcode format: {0}")]
pub struct UnknownFormat(pub String);

impl FromStr for BarcodeFormat {
    type Err = UnknownFormat;

    /// Accepts the canonical name in any case, with `-` in place of `_`
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_uppercase().replace('-', "_");
        BarcodeFormat::ALL
            .iter()
            .copied()
            .find(|format| format.as_str() == normalized)
            .ok_or_else(|| UnknownFormat(s.to_string()))
    }
}
