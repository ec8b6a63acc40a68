use image::{DynamicImage, GrayImage};

use crate::config::AssessmentConfig;
use crate::error::{PipelineError, Result};
use crate::pipeline::checksum::checksum_bytes;

/// Quality fingerprint of a single document.
#[derive(Debug, Clone, PartialEq)]
pub struct Assessment {
    pub checksum: String,
    /// Normalized sharpness in [0, 1].
    pub quality_score: f64,
    pub has_blur: bool,
    /// Raw Laplacian variance the score and blur flag were derived from.
    pub sharpness: f64,
    pub width: u32,
    pub height: u32,
    pub dpi: Option<u32>,
}

/// Trait for implementing document quality assessment
pub trait QualityAssessor {
    /// Assess raw document bytes. `source` only labels errors.
    fn assess(&self, source: &str, bytes: &[u8]) -> Result<Assessment>;
}

/// Sharpness-based assessor: variance of the Laplacian edge response over the
/// grayscale image.
#[derive(Debug, Clone, Default)]
pub struct LaplacianAssessor {
    pub config: AssessmentConfig,
}

impl LaplacianAssessor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: AssessmentConfig) -> Self {
        Self { config }
    }

    /// Score rule: variance over the reference constant, clamped to [0, 1].
    pub fn quality_score(&self, sharpness: f64) -> f64 {
        if !sharpness.is_finite() {
            return 0.0;
        }
        (sharpness / self.config.sharpness_reference).clamp(0.0, 1.0)
    }

    /// Blur rule: raw variance below the absolute threshold. Independent of
    /// the score clamp.
    pub fn is_blurred(&self, sharpness: f64) -> bool {
        !sharpness.is_finite() || sharpness < self.config.blur_variance_threshold
    }
}

impl QualityAssessor for LaplacianAssessor {
    fn assess(&self, source: &str, bytes: &[u8]) -> Result<Assessment> {
        if bytes.is_empty() {
            return Err(PipelineError::QualityAssessment {
                path: source.to_string(),
                reason: "document is empty".to_string(),
            });
        }

        let image = image::load_from_memory(bytes).map_err(|e| PipelineError::QualityAssessment {
            path: source.to_string(),
            reason: e.to_string(),
        })?;
        let gray = grayscale(&image);
        let (width, height) = gray.dimensions();
        if width == 0 || height == 0 {
            return Err(PipelineError::QualityAssessment {
                path: source.to_string(),
                reason: "image has no pixels".to_string(),
            });
        }

        let sharpness = laplacian_variance(&gray);
        Ok(Assessment {
            checksum: checksum_bytes(bytes),
            quality_score: self.quality_score(sharpness),
            has_blur: self.is_blurred(sharpness),
            sharpness,
            width,
            height,
            dpi: detect_dpi(bytes),
        })
    }
}

/// BT.601 luma (0.299 R + 0.587 G + 0.114 B), the usual scanner grayscale.
pub fn grayscale(image: &DynamicImage) -> GrayImage {
    if let DynamicImage::ImageLuma8(gray) = image {
        return gray.clone();
    }
    let rgb = image.to_rgb8();
    GrayImage::from_fn(rgb.width(), rgb.height(), |x, y| {
        let [r, g, b] = rgb.get_pixel(x, y).0;
        let luma = 0.299 * f64::from(r) + 0.587 * f64::from(g) + 0.114 * f64::from(b);
        image::Luma([luma.round().clamp(0.0, 255.0) as u8])
    })
}

/// Population variance of the 4-neighbour Laplacian response with
/// reflect-101 borders.
pub fn laplacian_variance(gray: &GrayImage) -> f64 {
    let (w, h) = (gray.width() as usize, gray.height() as usize);
    if w == 0 || h == 0 {
        return 0.0;
    }
    let px = gray.as_raw();
    let at = |x: usize, y: usize| f64::from(px[y * w + x]);

    let mut responses = Vec::with_capacity(w * h);
    for y in 0..h {
        let up = reflect101(y as isize - 1, h);
        let down = reflect101(y as isize + 1, h);
        for x in 0..w {
            let left = reflect101(x as isize - 1, w);
            let right = reflect101(x as isize + 1, w);
            let response =
                at(x, up) + at(x, down) + at(left, y) + at(right, y) - 4.0 * at(x, y);
            responses.push(response);
        }
    }

    let n = responses.len() as f64;
    let mean = responses.iter().sum::<f64>() / n;
    responses.iter().map(|r| (r - mean).powi(2)).sum::<f64>() / n
}

fn reflect101(i: isize, n: usize) -> usize {
    if n == 1 {
        return 0;
    }
    let n = n as isize;
    let reflected = if i < 0 {
        -i
    } else if i >= n {
        2 * n - 2 - i
    } else {
        i
    };
    reflected as usize
}

/// Horizontal resolution from a JPEG JFIF header or a PNG `pHYs` chunk.
pub fn detect_dpi(bytes: &[u8]) -> Option<u32> {
    if bytes.starts_with(&[0xFF, 0xD8]) {
        jfif_dpi(bytes)
    } else if bytes.starts_with(&[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A]) {
        png_dpi(bytes)
    } else {
        None
    }
}

fn jfif_dpi(bytes: &[u8]) -> Option<u32> {
    // SOI, APP0 marker, length, "JFIF\0", version, units, Xdensity
    if bytes.len() < 18 || bytes[2..4] != [0xFF, 0xE0] || &bytes[6..11] != b"JFIF\0" {
        return None;
    }
    let density = u32::from(u16::from_be_bytes([bytes[14], bytes[15]]));
    let dpi = match bytes[13] {
        1 => density,
        2 => (f64::from(density) * 2.54).round() as u32,
        _ => return None,
    };
    (dpi > 0).then_some(dpi)
}

fn png_dpi(bytes: &[u8]) -> Option<u32> {
    let mut offset = 8;
    while offset + 8 <= bytes.len() {
        let len = u32::from_be_bytes(bytes[offset..offset + 4].try_into().ok()?) as usize;
        let kind = &bytes[offset + 4..offset + 8];
        let data_start = offset + 8;
        let data_end = data_start.checked_add(len)?;
        if data_end > bytes.len() {
            return None;
        }
        match kind {
            b"pHYs" if len >= 9 => {
                let data = &bytes[data_start..data_end];
                let ppu_x = u32::from_be_bytes(data[0..4].try_into().ok()?);
                if data[8] != 1 {
                    return None;
                }
                let dpi = (f64::from(ppu_x) * 0.0254).round() as u32;
                return (dpi > 0).then_some(dpi);
            }
            b"IDAT" | b"IEND" => return None,
            _ => {}
        }
        // data + CRC
        offset = data_end + 4;
    }
    None
}
