use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::core::error::{Error, Result};

/// Output format for extracted frames and assembled documents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ImageFormat {
    Png,
    Jpg,
    Jpeg,
    Pdf,
}

impl ImageFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            ImageFormat::Png => "png",
            ImageFormat::Jpg => "jpg",
            ImageFormat::Jpeg => "jpeg",
            ImageFormat::Pdf => "pdf",
        }
    }

    /// Extension used for the intermediate frame files ffmpeg writes.
    /// The image2 muxer cannot emit PDFs, so a PDF target samples as PNG.
    pub fn frame_extension(&self) -> &'static str {
        match self {
            ImageFormat::Pdf => "png",
            other => other.extension(),
        }
    }
}

impl FromStr for ImageFormat {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "png" => Ok(ImageFormat::Png),
            "jpg" => Ok(ImageFormat::Jpg),
            "jpeg" => Ok(ImageFormat::Jpeg),
            "pdf" => Ok(ImageFormat::Pdf),
            other => Err(Error::InvalidArgument(format!(
                "image format must be png, jpg, jpeg, or pdf, got '{other}'"
            ))),
        }
    }
}

impl std::fmt::Display for ImageFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.extension())
    }
}

/// Frame extraction parameters. Immutable once constructed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractionSettings {
    interval: f64,
    output_directory: PathBuf,
    format: ImageFormat,
    quality: u8,
}

impl ExtractionSettings {
    pub fn new(
        interval: f64,
        output_directory: PathBuf,
        format: ImageFormat,
        quality: u8,
    ) -> Result<Self> {
        if !interval.is_finite() || interval <= 0.0 {
            return Err(Error::InvalidArgument(format!(
                "extraction interval must be positive, got {interval}"
            )));
        }
        if quality < 1 || quality > 100 {
            return Err(Error::InvalidArgument(format!(
                "image quality must be between 1 and 100, got {quality}"
            )));
        }

        Ok(ExtractionSettings {
            interval,
            output_directory,
            format,
            quality,
        })
    }

    pub fn interval(&self) -> f64 {
        self.interval
    }

    pub fn output_directory(&self) -> &Path {
        &self.output_directory
    }

    pub fn format(&self) -> ImageFormat {
        self.format
    }

    pub fn quality(&self) -> u8 {
        self.quality
    }
}

/// Grid shape for sheet pages. Page dimensions come from the quality preset.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SheetOptions {
    pub columns: u32,
    pub page_margin: u32,
    pub cell_spacing: u32,
}

impl SheetOptions {
    pub fn new(columns: u32, page_margin: u32, cell_spacing: u32) -> Result<Self> {
        if columns == 0 {
            return Err(Error::InvalidArgument(
                "sheet must have at least one column".to_string(),
            ));
        }
        Ok(SheetOptions {
            columns,
            page_margin,
            cell_spacing,
        })
    }
}

impl Default for SheetOptions {
    fn default() -> Self {
        SheetOptions {
            columns: 3,
            page_margin: 40,
            cell_spacing: 16,
        }
    }
}

/// Output resolution/compression tier, indexed 0 (highest) to 3 (lowest).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QualityPreset {
    pub label: &'static str,
    pub page_width: u32,
    pub page_height: u32,
    pub dpi: u32,
    pub jpeg_quality: u8,
}

/// A4 portrait pages at descending DPI.
static PRESETS: [QualityPreset; 4] = [
    QualityPreset {
        label: "best",
        page_width: 2480,
        page_height: 3508,
        dpi: 300,
        jpeg_quality: 95,
    },
    QualityPreset {
        label: "high",
        page_width: 1654,
        page_height: 2339,
        dpi: 200,
        jpeg_quality: 90,
    },
    QualityPreset {
        label: "medium",
        page_width: 1240,
        page_height: 1754,
        dpi: 150,
        jpeg_quality: 85,
    },
    QualityPreset {
        label: "low",
        page_width: 827,
        page_height: 1169,
        dpi: 100,
        jpeg_quality: 75,
    },
];

impl QualityPreset {
    pub const COUNT: usize = 4;

    pub fn all() -> &'static [QualityPreset; 4] {
        &PRESETS
    }

    pub fn tier(index: usize) -> Result<&'static QualityPreset> {
        PRESETS.get(index).ok_or_else(|| {
            Error::InvalidArgument(format!(
                "quality preset must be 0..{}, got {index}",
                Self::COUNT
            ))
        })
    }
}
