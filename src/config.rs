use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::format::BarcodeFormat;
use crate::import::ImportOptions;
use crate::policy::{DuplicateBarcodeOption, MissingBarcodeOption, MultipleBarcodeOption};
use crate::rename::RenameOptions;
use crate::sheet::SheetOptions;

/// Configuration file as written on disk
///
/// Every value is optional and kept raw so that one bad entry falls back to
/// its default instead of failing the whole file.
#[derive(Debug, Default, Deserialize)]
pub struct Config {
    pub general: Option<GeneralConfig>,
    pub page: Option<PageConfig>,
    pub barcode: Option<BarcodeConfig>,
    pub rename: Option<RenameConfig>,
}

/// General application settings
#[derive(Debug, Default, Deserialize)]
pub struct GeneralConfig {
    pub locale: Option<String>,
    pub update_interval: Option<String>,
    pub user_id: Option<String>,
}

/// Label sheet layout, in millimetres
#[derive(Debug, Default, Deserialize)]
pub struct PageConfig {
    pub margin_left: Option<i64>,
    pub margin_top: Option<i64>,
    pub margin_right: Option<i64>,
    pub margin_bottom: Option<i64>,
    pub barcode_padding: Option<i64>,
    pub image_height: Option<i64>,
}

#[derive(Debug, Default, Deserialize)]
pub struct BarcodeConfig {
    pub format: Option<String>,
}

/// Bulk rename defaults
#[derive(Debug, Default, Deserialize)]
pub struct RenameConfig {
    pub missing_option: Option<String>,
    pub duplicate_option: Option<String>,
    pub multiple_option: Option<String>,
    pub try_hard: Option<bool>,
}

/// How often to look for a new release
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UpdateInterval {
    Never,
    #[default]
    Startup,
    Daily,
    Weekly,
    Monthly,
}

impl UpdateInterval {
    pub fn as_str(&self) -> &'static str {
        match self {
            UpdateInterval::Never => "never",
            UpdateInterval::Startup => "startup",
            UpdateInterval::Daily => "daily",
            UpdateInterval::Weekly => "weekly",
            UpdateInterval::Monthly => "monthly",
        }
    }
}

impl fmt::Display for UpdateInterval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for UpdateInterval {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "never" => Ok(UpdateInterval::Never),
            "startup" => Ok(UpdateInterval::Startup),
            "daily" => Ok(UpdateInterval::Daily),
            "weekly" => Ok(UpdateInterval::Weekly),
            "monthly" => Ok(UpdateInterval::Monthly),
            other => Err(format!("Unknown update interval: {other}")),
        }
    }
}

/// Page margins in millimetres
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Margins {
    pub left: u32,
    pub top: u32,
    pub right: u32,
    pub bottom: u32,
}

impl Default for Margins {
    fn default() -> Self {
        Self {
            left: 5,
            top: 5,
            right: 5,
            bottom: 5,
        }
    }
}

/// Effective settings, every value resolved
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub locale: String,
    pub update_interval: UpdateInterval,
    pub user_id: Option<String>,
    pub margins: Margins,
    pub barcode_padding: u32,
    pub image_height: u32,
    pub barcode_format: BarcodeFormat,
    pub missing_option: MissingBarcodeOption,
    pub duplicate_option: DuplicateBarcodeOption,
    pub multiple_option: MultipleBarcodeOption,
    pub try_hard: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            locale: "en".to_string(),
            update_interval: UpdateInterval::default(),
            user_id: None,
            margins: Margins::default(),
            barcode_padding: 10,
            image_height: 10,
            barcode_format: BarcodeFormat::default(),
            missing_option: MissingBarcodeOption::default(),
            duplicate_option: DuplicateBarcodeOption::default(),
            multiple_option: MultipleBarcodeOption::default(),
            try_hard: false,
        }
    }
}

impl Settings {
    /// `<config dir>/humbug/humbug.toml`
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("humbug").join("humbug.toml"))
    }

    /// Load settings from `path`; a missing file yields the defaults
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            log::debug!("No settings file at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read settings: {}", path.display()))?;
        Self::from_toml(&content)
            .with_context(|| format!("Failed to parse settings: {}", path.display()))
    }

    /// Resolve settings from TOML text, falling back per value
    pub fn from_toml(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content)?;
        Ok(Self::from_config(config))
    }

    pub fn from_config(config: Config) -> Self {
        let defaults = Self::default();
        let general = config.general.unwrap_or_default();
        let page = config.page.unwrap_or_default();
        let barcode = config.barcode.unwrap_or_default();
        let rename = config.rename.unwrap_or_default();

        Self {
            locale: general
                .locale
                .filter(|locale| !locale.trim().is_empty())
                .unwrap_or(defaults.locale),
            update_interval: parse_or("general.update_interval", general.update_interval, defaults.update_interval),
            user_id: general.user_id.filter(|id| !id.trim().is_empty()),
            margins: Margins {
                left: size_or("page.margin_left", page.margin_left, defaults.margins.left),
                top: size_or("page.margin_top", page.margin_top, defaults.margins.top),
                right: size_or("page.margin_right", page.margin_right, defaults.margins.right),
                bottom: size_or("page.margin_bottom", page.margin_bottom, defaults.margins.bottom),
            },
            barcode_padding: size_or("page.barcode_padding", page.barcode_padding, defaults.barcode_padding),
            image_height: size_or("page.image_height", page.image_height, defaults.image_height),
            barcode_format: parse_or("barcode.format", barcode.format, defaults.barcode_format),
            missing_option: parse_or("rename.missing_option", rename.missing_option, defaults.missing_option),
            duplicate_option: parse_or("rename.duplicate_option", rename.duplicate_option, defaults.duplicate_option),
            multiple_option: parse_or("rename.multiple_option", rename.multiple_option, defaults.multiple_option),
            try_hard: rename.try_hard.unwrap_or(defaults.try_hard),
        }
    }

    /// Write the effective settings to `path`, creating parent folders
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
        }
        std::fs::write(path, self.to_toml()?)
            .with_context(|| format!("Failed to write settings: {}", path.display()))
    }

    pub fn to_toml(&self) -> Result<String> {
        let file = SettingsFile {
            general: GeneralSection {
                locale: &self.locale,
                update_interval: self.update_interval.as_str(),
                user_id: self.user_id.as_deref(),
            },
            page: PageSection {
                margin_left: self.margins.left,
                margin_top: self.margins.top,
                margin_right: self.margins.right,
                margin_bottom: self.margins.bottom,
                barcode_padding: self.barcode_padding,
                image_height: self.image_height,
            },
            barcode: BarcodeSection {
                format: self.barcode_format.as_str(),
            },
            rename: RenameSection {
                missing_option: self.missing_option.as_str(),
                duplicate_option: self.duplicate_option.as_str(),
                multiple_option: self.multiple_option.as_str(),
                try_hard: self.try_hard,
            },
        };
        Ok(toml::to_string_pretty(&file)?)
    }

    pub fn import_options(&self) -> ImportOptions {
        ImportOptions::new(self.barcode_format)
    }

    /// Page geometry for the label sheet
    pub fn sheet_options(&self) -> SheetOptions {
        SheetOptions {
            margins: self.margins,
            barcode_padding: self.barcode_padding,
            image_height: self.image_height,
        }
    }

    /// Rename options seeded with the stored policies
    pub fn rename_options(&self, source_dir: impl Into<PathBuf>, target_dir: impl Into<PathBuf>) -> RenameOptions {
        RenameOptions::new(source_dir, target_dir)
            .with_missing(self.missing_option)
            .with_duplicate(self.duplicate_option)
            .with_multiple(self.multiple_option)
            .with_try_hard(self.try_hard)
    }
}

fn parse_or<T>(key: &str, raw: Option<String>, default: T) -> T
where
    T: FromStr,
    T::Err: fmt::Display,
{
    match raw {
        None => default,
        Some(raw) => raw.parse().unwrap_or_else(|e| {
            log::warn!("Invalid value for {key}: {e}; using default");
            default
        }),
    }
}

fn size_or(key: &str, raw: Option<i64>, default: u32) -> u32 {
    match raw.map(u32::try_from) {
        None => default,
        Some(Ok(value)) => value,
        Some(Err(_)) => {
            log::warn!("Invalid value for {key}: must be between 0 and {}; using default", u32::MAX);
            default
        }
    }
}

#[derive(Serialize)]
struct SettingsFile<'a> {
    general: GeneralSection<'a>,
    page: PageSection,
    barcode: BarcodeSection<'a>,
    rename: RenameSection<'a>,
}

#[derive(Serialize)]
struct GeneralSection<'a> {
    locale: &'a str,
    update_interval: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    user_id: Option<&'a str>,
}

#[derive(Serialize)]
struct PageSection {
    margin_left: u32,
    margin_top: u32,
    margin_right: u32,
    margin_bottom: u32,
    barcode_padding: u32,
    image_height: u32,
}

#[derive(Serialize)]
struct BarcodeSection<'a> {
    format: &'a str,
}

#[derive(Serialize)]
struct RenameSection<'a> {
    missing_option: &'a str,
    duplicate_option: &'a str,
    multiple_option: &'a str,
    try_hard: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_file_gives_defaults() {
        assert_eq!(Settings::from_toml("").unwrap(), Settings::default());
    }

    #[test]
    fn test_bad_values_fall_back_individually() {
        let settings = Settings::from_toml(
            r#"
            [page]
            margin_left = -3
            margin_top = 12

            [barcode]
            format = "CODE_4096"

            [rename]
            missing_option = "skip"
            duplicate_option = "sometimes"
            "#,
        )
        .unwrap();

        assert_eq!(settings.margins.left, 5);
        assert_eq!(settings.margins.top, 12);
        assert_eq!(settings.barcode_format, BarcodeFormat::Code128);
        assert_eq!(settings.missing_option, MissingBarcodeOption::Skip);
        assert_eq!(settings.duplicate_option, DuplicateBarcodeOption::AppendSuffix);
    }

    #[test]
    fn test_broken_toml_is_an_error() {
        assert!(Settings::from_toml("[page\nmargin_left = 1").is_err());
    }

    #[test]
    fn test_save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cfg").join("humbug.toml");

        let settings = Settings {
            locale: "de".to_string(),
            user_id: Some("abc".to_string()),
            barcode_format: BarcodeFormat::QrCode,
            missing_option: MissingBarcodeOption::Prompt,
            try_hard: true,
            ..Settings::default()
        };
        settings.save(&path).unwrap();

        assert_eq!(Settings::load(&path).unwrap(), settings);
    }

    #[test]
    fn test_missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let settings = Settings::load(&dir.path().join("absent.toml")).unwrap();
        assert_eq!(settings, Settings::default());
    }

    #[test]
    fn test_rename_options_carry_policies() {
        let settings = Settings {
            duplicate_option: DuplicateBarcodeOption::Skip,
            try_hard: true,
            ..Settings::default()
        };
        let options = settings.rename_options("/in", "/out");
        assert_eq!(options.duplicate, DuplicateBarcodeOption::Skip);
        assert!(options.try_hard);
        assert_eq!(options.restrict_to, None);
    }

    #[test]
    fn test_sheet_options_use_page_settings() {
        let settings = Settings::from_toml(
            r#"
            [page]
            margin_bottom = 20
            barcode_padding = 3
            image_height = 30
            "#,
        )
        .unwrap();

        let options = settings.sheet_options();
        assert_eq!(options.margins.bottom, 20);
        assert_eq!(options.margins.left, 5);
        assert_eq!(options.barcode_padding, 3);
        assert_eq!(options.image_height, 30);
    }
}
