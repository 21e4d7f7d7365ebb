//! Rules for the ambiguous cases of a bulk rename.
//!
//! Every rule is a closed set of options resolved by a pure function, so the
//! same inputs always produce the same decision.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::utils::unique_file_name;

/// What to do with an image in which no barcode was found
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MissingBarcodeOption {
    /// Leave the image out of the target folder
    Skip,
    /// Copy the image to the target folder under its original name
    #[default]
    Copy,
    /// Ask the user for the value and continue with it
    Prompt,
}

/// What to do when the target name is already taken in the target folder
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DuplicateBarcodeOption {
    /// Leave the existing file alone and skip this image
    Skip,
    /// Replace the existing file
    Overwrite,
    /// Use the first free `name-N.ext`
    #[default]
    AppendSuffix,
}

/// How to name an image that holds more than one barcode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MultipleBarcodeOption {
    /// Join every value with `-`, in detection order
    #[default]
    Concatenate,
    /// Use the first value only
    PickFirst,
}

/// Outcome of applying [`MissingBarcodeOption`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MissingDecision {
    Skip,
    CopyOriginal,
    Prompt,
}

/// Outcome of applying [`DuplicateBarcodeOption`] to a candidate target
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DuplicateDecision {
    /// The path is free (possibly after adding a suffix)
    Write(PathBuf),
    /// The path exists and will be replaced
    Overwrite(PathBuf),
    /// The path exists and the image is skipped
    Skip,
}

pub fn resolve_missing(option: MissingBarcodeOption) -> MissingDecision {
    match option {
        MissingBarcodeOption::Skip => MissingDecision::Skip,
        MissingBarcodeOption::Copy => MissingDecision::CopyOriginal,
        MissingBarcodeOption::Prompt => MissingDecision::Prompt,
    }
}

/// Decide where `stem.extension` goes inside `folder`
///
/// `exists` reports whether a path is already taken; it is the only view of
/// the folder the rule gets.
pub fn resolve_duplicate<F>(
    option: DuplicateBarcodeOption,
    folder: &Path,
    stem: &str,
    extension: Option<&str>,
    exists: F,
) -> DuplicateDecision
where
    F: Fn(&Path) -> bool,
{
    let candidate = folder.join(file_name(stem, extension));
    if !exists(&candidate) {
        return DuplicateDecision::Write(candidate);
    }

    match option {
        DuplicateBarcodeOption::Skip => DuplicateDecision::Skip,
        DuplicateBarcodeOption::Overwrite => DuplicateDecision::Overwrite(candidate),
        DuplicateBarcodeOption::AppendSuffix => {
            DuplicateDecision::Write(folder.join(unique_file_name(stem, extension, |name| {
                exists(&folder.join(name))
            })))
        }
    }
}

/// Combine the values found in one image into a single name
///
/// Returns `None` when there is nothing usable to name the file after.
pub fn resolve_multiple(option: MultipleBarcodeOption, values: &[&str]) -> Option<String> {
    let values: Vec<&str> = values.iter().copied().filter(|v| !v.is_empty()).collect();
    if values.is_empty() {
        return None;
    }

    match option {
        MultipleBarcodeOption::PickFirst => Some(values[0].to_string()),
        MultipleBarcodeOption::Concatenate => Some(values.join("-")),
    }
}

fn file_name(stem: &str, extension: Option<&str>) -> String {
    match extension {
        Some(ext) => format!("{stem}.{ext}"),
        None => stem.to_string(),
    }
}

/// Error returned when an option name is not recognised
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Unknown option '{value}', expected one of: {expected}")]
pub struct UnknownOption {
    pub value: String,
    pub expected: &'static str,
}

macro_rules! option_names {
    ($ty:ty, $expected:literal, { $($variant:path => $name:literal),+ $(,)? }) => {
        impl $ty {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $($variant => $name,)+
                }
            }
        }

        impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $ty {
            type Err = UnknownOption;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s.trim().to_lowercase().replace('_', "-").as_str() {
                    $($name => Ok($variant),)+
                    _ => Err(UnknownOption {
                        value: s.to_string(),
                        expected: $expected,
                    }),
                }
            }
        }
    };
}

option_names!(MissingBarcodeOption, "skip, copy, prompt", {
    MissingBarcodeOption::Skip => "skip",
    MissingBarcodeOption::Copy => "copy",
    MissingBarcodeOption::Prompt => "prompt",
});

option_names!(DuplicateBarcodeOption, "skip, overwrite, append-suffix", {
    DuplicateBarcodeOption::Skip => "skip",
    DuplicateBarcodeOption::Overwrite => "overwrite",
    DuplicateBarcodeOption::AppendSuffix => "append-suffix",
});

option_names!(MultipleBarcodeOption, "concatenate, pick-first", {
    MultipleBarcodeOption::Concatenate => "concatenate",
    MultipleBarcodeOption::PickFirst => "pick-first",
});
