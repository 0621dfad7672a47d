//! Icon handling
//!
//! This module provides:
//! - [`AppIcon`]: the icon file shipped with a package (user supplied or the
//!   generated default)
//! - [`IconConverter`]: the PNG to platform-icon seam
//! - [`IcnsConverter`]: multi-resolution Apple ICNS generation
//!
//! ICNS sizes: 16, 32, 64, 128, 256, 512 (PNG-compressed members)

use crate::error::{PackError, PackResult};
use image::{DynamicImage, ImageFormat, Rgba, RgbaImage};
use std::io::Cursor;
use std::path::Path;

/// ICNS member types carrying PNG data, with their edge length
const ICNS_MEMBERS: &[(&[u8; 4], u32)] = &[
    (b"icp4", 16),
    (b"icp5", 32),
    (b"icp6", 64),
    (b"ic07", 128),
    (b"ic08", 256),
    (b"ic09", 512),
];

/// Edge length of the generated default icon
const DEFAULT_ICON_SIZE: u32 = 256;

/// File name used when the icon has none
pub const DEFAULT_ICON_NAME: &str = "icon.png";

/// Supported source icon formats
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IconFormat {
    Png,
    Jpeg,
}

impl IconFormat {
    /// Detect format from file extension
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_lowercase().as_str() {
            "png" => Some(Self::Png),
            "jpg" | "jpeg" => Some(Self::Jpeg),
            _ => None,
        }
    }

    /// Detect format from magic bytes
    pub fn from_bytes(data: &[u8]) -> Option<Self> {
        if data.starts_with(&[0x89, 0x50, 0x4E, 0x47]) {
            return Some(Self::Png);
        }
        if data.starts_with(&[0xFF, 0xD8, 0xFF]) {
            return Some(Self::Jpeg);
        }
        None
    }

    fn image_format(self) -> ImageFormat {
        match self {
            Self::Png => ImageFormat::Png,
            Self::Jpeg => ImageFormat::Jpeg,
        }
    }
}

/// Icon file placed into packages
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppIcon {
    /// File name inside the package
    pub name: String,
    /// Raw image bytes
    pub data: Vec<u8>,
}

impl AppIcon {
    pub fn new(name: impl Into<String>, data: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            data,
        }
    }

    /// Read an icon from disk, keeping its file name
    pub fn load(path: &Path) -> PackResult<Self> {
        let data = std::fs::read(path).map_err(|e| {
            PackError::Icon(format!("Failed to read icon file {}: {}", path.display(), e))
        })?;

        let format = path
            .extension()
            .and_then(|e| e.to_str())
            .and_then(IconFormat::from_extension)
            .or_else(|| IconFormat::from_bytes(&data));
        if format.is_none() {
            return Err(PackError::Icon(format!(
                "Unknown icon format for {}: supported formats are PNG, JPG",
                path.display()
            )));
        }

        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .filter(|n| !n.is_empty())
            .unwrap_or(DEFAULT_ICON_NAME);
        Ok(Self::new(name, data))
    }

    /// Generated placeholder icon
    pub fn default_icon() -> PackResult<Self> {
        let img = RgbaImage::from_fn(DEFAULT_ICON_SIZE, DEFAULT_ICON_SIZE, |x, y| {
            let margin = DEFAULT_ICON_SIZE / 8;
            let inside = (margin..DEFAULT_ICON_SIZE - margin).contains(&x)
                && (margin..DEFAULT_ICON_SIZE - margin).contains(&y);
            if inside {
                Rgba([0xff, 0x4c, 0x4c, 0xff])
            } else {
                Rgba([0, 0, 0, 0])
            }
        });
        let data = encode_png(&DynamicImage::ImageRgba8(img))?;
        Ok(Self::new(DEFAULT_ICON_NAME, data))
    }
}

/// Converts a PNG (or JPEG) image into a platform icon container
pub trait IconConverter: Send + Sync {
    fn convert(&self, image: &[u8]) -> PackResult<Vec<u8>>;
}

/// Apple ICNS converter
#[derive(Debug, Default, Clone, Copy)]
pub struct IcnsConverter;

impl IconConverter for IcnsConverter {
    fn convert(&self, image: &[u8]) -> PackResult<Vec<u8>> {
        let img = load_image(image)?;

        let mut members = Vec::with_capacity(ICNS_MEMBERS.len());
        for &(kind, size) in ICNS_MEMBERS {
            let resized = img.resize_exact(size, size, image::imageops::FilterType::Lanczos3);
            members.push((kind, encode_png(&resized)?));
        }

        let total: usize = 8 + members.iter().map(|(_, png)| 8 + png.len()).sum::<usize>();
        let mut out = Vec::with_capacity(total);
        out.extend_from_slice(b"icns");
        out.extend_from_slice(&container_len(total)?.to_be_bytes());
        for (kind, png) in &members {
            out.extend_from_slice(*kind);
            out.extend_from_slice(&container_len(8 + png.len())?.to_be_bytes());
            out.extend_from_slice(png);
        }

        tracing::info!(
            target: "stagepack::icon",
            "Created ICNS with {} members ({} bytes)",
            members.len(),
            out.len()
        );
        Ok(out)
    }
}

fn container_len(len: usize) -> PackResult<u32> {
    u32::try_from(len).map_err(|_| PackError::Icon("ICNS data too large".to_string()))
}

fn load_image(data: &[u8]) -> PackResult<DynamicImage> {
    let format = IconFormat::from_bytes(data)
        .ok_or_else(|| PackError::Icon("Icon must be a PNG or JPEG image".to_string()))?;
    image::load_from_memory_with_format(data, format.image_format())
        .map_err(|e| PackError::Icon(format!("Failed to load image: {}", e)))
}

fn encode_png(img: &DynamicImage) -> PackResult<Vec<u8>> {
    let mut buffer = Vec::new();
    img.write_to(&mut Cursor::new(&mut buffer), ImageFormat::Png)
        .map_err(|e| PackError::Icon(format!("Failed to encode PNG: {}", e)))?;
    Ok(buffer)
}
