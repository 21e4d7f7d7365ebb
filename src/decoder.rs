use rxing::{DecodeHintType, DecodeHintValue, DecodingHintDictionary};
use std::collections::{HashMap, HashSet};
use std::path::Path;

use crate::format::BarcodeFormat;

/// What to look for when decoding an image
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DecodeHints {
    /// Only accept this symbology; `None` tries all supported ones
    pub restrict_to: Option<BarcodeFormat>,
    /// Slower, more exhaustive search for low quality images
    pub try_harder: bool,
}

/// A barcode found in an image
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedBarcode {
    pub text: String,
    /// `None` when the decoder reports a symbology outside [`BarcodeFormat`]
    pub format: Option<BarcodeFormat>,
}

impl DecodedBarcode {
    pub fn new(text: impl Into<String>, format: Option<BarcodeFormat>) -> Self {
        Self {
            text: text.into(),
            format,
        }
    }
}

/// Failure to read an image at all (as opposed to finding no barcode in it)
#[derive(Debug, thiserror::Error)]
#[error("Failed to read image {path}: {message}")]
pub struct DecodeError {
    pub path: String,
    pub message: String,
}

/// Extracts barcode values from image files
pub trait BarcodeDecoder: Send + Sync {
    /// All barcodes found in the image, in detection order; empty if none
    fn decode(&self, image: &Path, hints: &DecodeHints) -> Result<Vec<DecodedBarcode>, DecodeError>;
}

/// Decoder backed by `rxing`, the Rust port of ZXing
#[derive(Debug, Clone, Copy, Default)]
pub struct RxingDecoder;

impl RxingDecoder {
    pub fn new() -> Self {
        Self
    }

    fn build_hints(hints: &DecodeHints) -> DecodingHintDictionary {
        let mut dictionary: DecodingHintDictionary = HashMap::new();

        if hints.try_harder {
            dictionary.insert(DecodeHintType::TRY_HARDER, DecodeHintValue::TryHarder(true));
        }

        if let Some(format) = hints.restrict_to {
            dictionary.insert(
                DecodeHintType::POSSIBLE_FORMATS,
                DecodeHintValue::PossibleFormats(HashSet::from([to_rxing(format)])),
            );
        }

        dictionary
    }
}

impl BarcodeDecoder for RxingDecoder {
    fn decode(&self, image: &Path, hints: &DecodeHints) -> Result<Vec<DecodedBarcode>, DecodeError> {
        let img = image::open(image).map_err(|e| DecodeError {
            path: image.display().to_string(),
            message: e.to_string(),
        })?;

        let luma = img.to_luma8();
        let (width, height) = luma.dimensions();
        let mut dictionary = Self::build_hints(hints);

        match rxing::helpers::detect_multiple_in_luma_with_hints(
            luma.into_raw(),
            width,
            height,
            &mut dictionary,
        ) {
            Ok(results) => Ok(results
                .iter()
                .map(|result| {
                    DecodedBarcode::new(result.getText(), from_rxing(result.getBarcodeFormat()))
                })
                .collect()),
            Err(e) => {
                // rxing signals "nothing found" through its error type
                log::debug!("No barcode detected in {}: {}", image.display(), e);
                Ok(Vec::new())
            }
        }
    }
}

pub(crate) fn to_rxing(format: BarcodeFormat) -> rxing::BarcodeFormat {
    match format {
        BarcodeFormat::Aztec => rxing::BarcodeFormat::AZTEC,
        BarcodeFormat::Codabar => rxing::BarcodeFormat::CODABAR,
        BarcodeFormat::Code39 => rxing::BarcodeFormat::CODE_39,
        BarcodeFormat::Code93 => rxing::BarcodeFormat::CODE_93,
        BarcodeFormat::Code128 => rxing::BarcodeFormat::CODE_128,
        BarcodeFormat::DataMatrix => rxing::BarcodeFormat::DATA_MATRIX,
        BarcodeFormat::Ean8 => rxing::BarcodeFormat::EAN_8,
        BarcodeFormat::Ean13 => rxing::BarcodeFormat::EAN_13,
        BarcodeFormat::Itf => rxing::BarcodeFormat::ITF,
        BarcodeFormat::MaxiCode => rxing::BarcodeFormat::MAXICODE,
        BarcodeFormat::Pdf417 => rxing::BarcodeFormat::PDF_417,
        BarcodeFormat::QrCode => rxing::BarcodeFormat::QR_CODE,
        BarcodeFormat::Rss14 => rxing::BarcodeFormat::RSS_14,
        BarcodeFormat::RssExpanded => rxing::BarcodeFormat::RSS_EXPANDED,
        BarcodeFormat::UpcA => rxing::BarcodeFormat::UPC_A,
        BarcodeFormat::UpcE => rxing::BarcodeFormat::UPC_E,
        BarcodeFormat::UpcEanExtension => rxing::BarcodeFormat::UPC_EAN_EXTENSION,
    }
}

fn from_rxing(format: &rxing::BarcodeFormat) -> Option<BarcodeFormat> {
    BarcodeFormat::ALL
        .into_iter()
        .find(|candidate| to_rxing(*candidate) == *format)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hints_only_set_what_was_asked() {
        let dictionary = RxingDecoder::build_hints(&DecodeHints::default());
        assert!(dictionary.is_empty());

        let dictionary = RxingDecoder::build_hints(&DecodeHints {
            restrict_to: Some(BarcodeFormat::QrCode),
            try_harder: true,
        });
        assert!(dictionary.contains_key(&DecodeHintType::TRY_HARDER));
        assert!(dictionary.contains_key(&DecodeHintType::POSSIBLE_FORMATS));
    }

    #[test]
    fn test_format_mapping_is_bijective() {
        for format in BarcodeFormat::ALL {
            assert_eq!(from_rxing(&to_rxing(format)), Some(format));
        }
    }

    #[test]
    fn test_unreadable_image_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.png");
        std::fs::write(&path, b"not a png").unwrap();

        let result = RxingDecoder::new().decode(&path, &DecodeHints::default());
        assert!(result.is_err());
    }
}
