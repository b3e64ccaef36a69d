//! Raster image re-encoding.
//!
//! Reads the original pictures from the source tree and writes re-encoded
//! copies over the ones `pictures` placed in the distribution tree. PNGs are
//! re-encoded with maximum compression and JPEGs at the configured quality.
//! A copy is replaced only when the new encoding is smaller than the source.
//! Encoding always starts from the source, so repeated runs write the same
//! bytes instead of compounding JPEG loss.

use super::{write_output, Transform, TransformContext, TransformError};
use image::codecs::jpeg::JpegEncoder;
use image::codecs::png::{CompressionType, FilterType, PngEncoder};
use image::{ColorType, DynamicImage, ImageEncoder};
use rayon::prelude::*;
use std::path::{Path, PathBuf};

/// Image optimisation transform.
#[derive(Debug, Clone)]
pub struct Optimize {
    jpeg_quality: u8,
}

impl Optimize {
    pub fn new(jpeg_quality: u8) -> Self {
        Self { jpeg_quality: jpeg_quality.clamp(1, 100) }
    }

    fn optimize_file(&self, source: &Path, output: &Path) -> Result<Option<PathBuf>, TransformError> {
        let ext = source.extension().map(|e| e.to_string_lossy().to_ascii_lowercase()).unwrap_or_default();
        let original = std::fs::metadata(source).map_err(|e| TransformError::io(source, e))?.len();

        let encoded = match ext.as_str() {
            "png" => encode_png(&open(source)?).map_err(|e| TransformError::rejected(source, e))?,
            "jpg" | "jpeg" => {
                encode_jpeg(&open(source)?, self.jpeg_quality).map_err(|e| TransformError::rejected(source, e))?
            }
            _ => return Ok(None),
        };

        if (encoded.len() as u64) < original {
            tracing::debug!(path = %output.display(), before = original, after = encoded.len(), "re-encoded image");
            write_output(output, encoded)?;
            Ok(Some(output.to_path_buf()))
        } else {
            Ok(None)
        }
    }
}

fn open(path: &Path) -> Result<DynamicImage, TransformError> {
    image::open(path).map_err(|e| TransformError::rejected(path, e))
}

fn encode_png(img: &DynamicImage) -> image::ImageResult<Vec<u8>> {
    let mut buf = Vec::new();
    let encoder = PngEncoder::new_with_quality(&mut buf, CompressionType::Best, FilterType::Adaptive);
    match img.color() {
        color @ (ColorType::L8 | ColorType::La8 | ColorType::Rgb8 | ColorType::Rgba8) => {
            encoder.write_image(img.as_bytes(), img.width(), img.height(), color)?;
        }
        _ => {
            let rgba = img.to_rgba8();
            encoder.write_image(rgba.as_raw(), rgba.width(), rgba.height(), ColorType::Rgba8)?;
        }
    }
    Ok(buf)
}

fn encode_jpeg(img: &DynamicImage, quality: u8) -> image::ImageResult<Vec<u8>> {
    let mut buf = Vec::new();
    let rgb = img.to_rgb8();
    JpegEncoder::new_with_quality(&mut buf, quality).write_image(
        rgb.as_raw(),
        rgb.width(),
        rgb.height(),
        ColorType::Rgb8,
    )?;
    Ok(buf)
}

impl Transform for Optimize {
    fn describe(&self) -> String {
        format!("optimize (jpeg quality {})", self.jpeg_quality)
    }

    fn apply(&self, ctx: &TransformContext<'_>) -> Result<Vec<PathBuf>, TransformError> {
        let rewritten = ctx
            .files
            .par_iter()
            .map(|file| self.optimize_file(&file.path, &ctx.output_for(file)))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(rewritten.into_iter().flatten().collect())
    }
}
