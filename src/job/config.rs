/// Preview job configuration
///
/// `PreviewOptions` is the loose, persistable shape of the form fields.
/// `PreviewConfig` is the validated, immutable record attached to a job.
use crate::error::{PreviewError, Result};
use crate::raw::loader::DevelopSettings;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

/// Edge length of square previews
pub const PREVIEW_EDGE: u32 = 224;
/// Short edge target before the centre crop in `SizeMode::ShortEdgeCenterCrop`
pub const SHORT_EDGE: u32 = 256;

pub const MIN_QUALITY: u8 = 60;
pub const MAX_QUALITY: u8 = 95;
pub const DEFAULT_QUALITY: u8 = 88;

pub const MIN_WORKERS: usize = 1;
pub const MAX_WORKERS: usize = 16;
pub const DEFAULT_WORKERS: usize = 4;

/// How a decoded RAW image is sized before encoding
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SizeMode {
    /// Keep the developed size
    #[serde(rename = "none")]
    None,
    /// Squash to PREVIEW_EDGE x PREVIEW_EDGE
    #[default]
    #[serde(rename = "exact_224")]
    Exact,
    /// Scale the short edge to SHORT_EDGE, then crop the centre PREVIEW_EDGE square
    #[serde(rename = "short256_center224")]
    ShortEdgeCenterCrop,
}

impl SizeMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            SizeMode::None => "none",
            SizeMode::Exact => "exact_224",
            SizeMode::ShortEdgeCenterCrop => "short256_center224",
        }
    }
}

impl fmt::Display for SizeMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SizeMode {
    type Err = PreviewError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "none" => Ok(SizeMode::None),
            "exact_224" | "exact" => Ok(SizeMode::Exact),
            "short256_center224" | "center_crop" => Ok(SizeMode::ShortEdgeCenterCrop),
            other => Err(PreviewError::InvalidConfig(format!(
                "unknown size mode '{other}' (expected none, exact_224 or short256_center224)"
            ))),
        }
    }
}

/// Container format of written previews
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Jpeg,
    Webp,
}

impl OutputFormat {
    /// File extension used for every preview of this format
    pub fn extension(&self) -> &'static str {
        match self {
            OutputFormat::Jpeg => "jpg",
            OutputFormat::Webp => "webp",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            OutputFormat::Jpeg => "jpeg",
            OutputFormat::Webp => "webp",
        }
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OutputFormat {
    type Err = PreviewError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "jpeg" | "jpg" => Ok(OutputFormat::Jpeg),
            "webp" => Ok(OutputFormat::Webp),
            other => Err(PreviewError::InvalidConfig(format!(
                "unknown output format '{other}' (expected jpeg or webp)"
            ))),
        }
    }
}

/// Form-shaped options, as persisted between sessions
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct PreviewOptions {
    pub size_mode: SizeMode,
    pub format: OutputFormat,
    pub quality: u8,
    pub recursive: bool,
    pub overwrite: bool,
    pub workers: usize,
    /// 0 means no limit
    pub limit: usize,
    pub develop: DevelopSettings,
}

impl Default for PreviewOptions {
    fn default() -> Self {
        Self {
            size_mode: SizeMode::default(),
            format: OutputFormat::default(),
            quality: DEFAULT_QUALITY,
            recursive: true,
            overwrite: false,
            workers: DEFAULT_WORKERS,
            limit: 0,
            develop: DevelopSettings::default(),
        }
    }
}

impl PreviewOptions {
    /// Check ranges and freeze the options into a job configuration.
    pub fn validate(self, include_stems: Option<BTreeSet<String>>) -> Result<PreviewConfig> {
        if !(MIN_QUALITY..=MAX_QUALITY).contains(&self.quality) {
            return Err(PreviewError::InvalidConfig(format!(
                "quality must be within {MIN_QUALITY}..={MAX_QUALITY}, got {}",
                self.quality
            )));
        }
        if !(MIN_WORKERS..=MAX_WORKERS).contains(&self.workers) {
            return Err(PreviewError::InvalidConfig(format!(
                "workers must be within {MIN_WORKERS}..={MAX_WORKERS}, got {}",
                self.workers
            )));
        }
        if !self.develop.bright.is_finite() || self.develop.bright <= 0.0 {
            return Err(PreviewError::InvalidConfig(format!(
                "exposure multiplier must be a positive number, got {}",
                self.develop.bright
            )));
        }

        Ok(PreviewConfig {
            size_mode: self.size_mode,
            format: self.format,
            quality: self.quality,
            recursive: self.recursive,
            overwrite: self.overwrite,
            workers: self.workers,
            limit: (self.limit > 0).then_some(self.limit),
            include_stems,
            develop: self.develop,
        })
    }
}

/// Immutable configuration of one preview job
#[derive(Debug, Clone, PartialEq)]
pub struct PreviewConfig {
    size_mode: SizeMode,
    format: OutputFormat,
    quality: u8,
    recursive: bool,
    overwrite: bool,
    workers: usize,
    limit: Option<usize>,
    include_stems: Option<BTreeSet<String>>,
    develop: DevelopSettings,
}

impl Default for PreviewConfig {
    fn default() -> Self {
        Self {
            size_mode: SizeMode::default(),
            format: OutputFormat::default(),
            quality: DEFAULT_QUALITY,
            recursive: true,
            overwrite: false,
            workers: DEFAULT_WORKERS,
            limit: None,
            include_stems: None,
            develop: DevelopSettings::default(),
        }
    }
}

impl PreviewConfig {
    pub fn size_mode(&self) -> SizeMode {
        self.size_mode
    }

    pub fn format(&self) -> OutputFormat {
        self.format
    }

    pub fn quality(&self) -> u8 {
        self.quality
    }

    pub fn recursive(&self) -> bool {
        self.recursive
    }

    pub fn overwrite(&self) -> bool {
        self.overwrite
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    pub fn limit(&self) -> Option<usize> {
        self.limit
    }

    pub fn include_stems(&self) -> Option<&BTreeSet<String>> {
        self.include_stems.as_ref()
    }

    pub fn develop(&self) -> DevelopSettings {
        self.develop
    }

    /// Back to the persistable shape (the allow-list is not persisted)
    pub fn to_options(&self) -> PreviewOptions {
        PreviewOptions {
            size_mode: self.size_mode,
            format: self.format,
            quality: self.quality,
            recursive: self.recursive,
            overwrite: self.overwrite,
            workers: self.workers,
            limit: self.limit.unwrap_or(0),
            develop: self.develop,
        }
    }
}
