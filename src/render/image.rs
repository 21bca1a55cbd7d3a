//! Host-side linear RGBA images and export to EXR / HDR

use std::path::Path;

use glam::Vec3;

use crate::core::error::Error;
use crate::core::types::Result;

/// Linear float RGBA image, rows top to bottom
#[derive(Clone, Debug, PartialEq)]
pub struct CpuImage {
    width: u32,
    height: u32,
    pixels: Vec<[f32; 4]>,
}

impl CpuImage {
    /// Transparent black image
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            pixels: vec![[0.0; 4]; width as usize * height as usize],
        }
    }

    pub fn from_pixels(width: u32, height: u32, pixels: Vec<[f32; 4]>) -> Result<Self> {
        if pixels.len() != width as usize * height as usize {
            return Err(Error::Export(format!(
                "{} pixels for a {width}x{height} image",
                pixels.len()
            )));
        }
        Ok(Self { width, height, pixels })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn pixels(&self) -> &[[f32; 4]] {
        &self.pixels
    }

    pub fn pixels_mut(&mut self) -> &mut [[f32; 4]] {
        &mut self.pixels
    }

    pub fn pixel(&self, x: u32, y: u32) -> Option<[f32; 4]> {
        if x >= self.width || y >= self.height {
            return None;
        }
        self.pixels.get((y * self.width + x) as usize).copied()
    }

    /// True if every pixel's color is zero
    pub fn is_blank(&self) -> bool {
        self.pixels.iter().all(|p| p[0] == 0.0 && p[1] == 0.0 && p[2] == 0.0)
    }

    pub fn mean_color(&self) -> Vec3 {
        if self.pixels.is_empty() {
            return Vec3::ZERO;
        }
        let sum: Vec3 = self.pixels.iter().map(|p| Vec3::new(p[0], p[1], p[2])).sum();
        sum / self.pixels.len() as f32
    }

    /// Write as OpenEXR (`.exr`) or Radiance HDR (`.hdr`), chosen by extension
    pub fn save(&self, path: &Path) -> Result<()> {
        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase());
        let flat: Vec<f32> = self.pixels.iter().flatten().copied().collect();
        let buffer = image::Rgba32FImage::from_raw(self.width, self.height, flat)
            .ok_or_else(|| Error::Export("pixel buffer size mismatch".into()))?;
        let image = image::DynamicImage::ImageRgba32F(buffer);

        let result = match extension.as_deref() {
            Some("exr") => image.save_with_format(path, image::ImageFormat::OpenExr),
            Some("hdr") => image::DynamicImage::ImageRgb32F(image.to_rgb32f())
                .save_with_format(path, image::ImageFormat::Hdr),
            _ => {
                return Err(Error::Export(format!(
                    "unsupported image format: {}",
                    path.display()
                )));
            }
        };
        result.map_err(|e| Error::Export(format!("{}: {e}", path.display())))?;
        log::info!("Exported {}x{} image to {}", self.width, self.height, path.display());
        Ok(())
    }
}
