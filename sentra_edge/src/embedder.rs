//! Sentra Edge - Face Signature Extraction
//!
//! The extraction algorithm is a pluggable capability: bytes in, signature
//! vector out, or nothing when no face is present. Production deployments
//! plug a real face model in behind [`FaceEmbedder`]; the built-in
//! [`PerceptualEmbedder`] derives a deterministic luminance signature so the
//! pipeline runs end to end without one.

use image::imageops::FilterType;

use crate::error::EdgeResult;

/// Signature extraction seam.
///
/// `Ok(None)` means the input decoded fine but contains no usable face -
/// a valid outcome, not an error. Undecodable input is an error.
pub trait FaceEmbedder {
    fn embed(&self, image_bytes: &[u8]) -> EdgeResult<Option<Vec<f32>>>;
}

/// Signature grid edge; vectors are GRID*GRID floats
const GRID: u32 = 16;

/// Frames smaller than this on either side cannot hold a usable face
const MIN_DIMENSION: u32 = 64;

/// Luminance-grid embedder.
///
/// Downsamples the frame to a fixed grid, removes the mean and scales to
/// unit length, so the dot product of two signatures is their cosine
/// similarity. Flat frames (no structure at all) produce no signature.
#[derive(Debug, Default, Clone)]
pub struct PerceptualEmbedder;

impl FaceEmbedder for PerceptualEmbedder {
    fn embed(&self, image_bytes: &[u8]) -> EdgeResult<Option<Vec<f32>>> {
        let img = image::load_from_memory(image_bytes)?;

        let (width, height) = (img.width(), img.height());
        if width < MIN_DIMENSION || height < MIN_DIMENSION {
            log::debug!("frame {width}x{height} below face threshold");
            return Ok(None);
        }

        let gray = img
            .resize_exact(GRID, GRID, FilterType::Triangle)
            .to_luma8();
        let mut vector: Vec<f32> = gray.pixels().map(|p| p.0[0] as f32 / 255.0).collect();

        let mean = vector.iter().sum::<f32>() / vector.len() as f32;
        for v in vector.iter_mut() {
            *v -= mean;
        }

        let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm < f32::EPSILON {
            // Structureless frame: nothing to sign
            return Ok(None);
        }
        for v in vector.iter_mut() {
            *v /= norm;
        }

        Ok(Some(vector))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{DynamicImage, Rgb, RgbImage};
    use std::io::Cursor;

    fn png_bytes(img: RgbImage) -> Vec<u8> {
        let mut buffer = Vec::new();
        DynamicImage::ImageRgb8(img)
            .write_to(&mut Cursor::new(&mut buffer), image::ImageFormat::Png)
            .unwrap();
        buffer
    }

    fn gradient(width: u32, height: u32) -> RgbImage {
        RgbImage::from_fn(width, height, |x, y| {
            Rgb([(x % 256) as u8, (y % 256) as u8, ((x + y) % 256) as u8])
        })
    }

    #[test]
    fn test_unit_norm_signature() {
        let embedder = PerceptualEmbedder;
        let vector = embedder
            .embed(&png_bytes(gradient(128, 128)))
            .unwrap()
            .expect("structured frame should produce a signature");

        assert_eq!(vector.len(), (GRID * GRID) as usize);
        let norm: f32 = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-4);
    }

    #[test]
    fn test_deterministic() {
        let embedder = PerceptualEmbedder;
        let bytes = png_bytes(gradient(200, 160));
        assert_eq!(
            embedder.embed(&bytes).unwrap(),
            embedder.embed(&bytes).unwrap()
        );
    }

    #[test]
    fn test_small_frame_has_no_face() {
        let embedder = PerceptualEmbedder;
        let result = embedder.embed(&png_bytes(gradient(32, 32))).unwrap();
        assert!(result.is_none());
    }

    #[test]
    fn test_flat_frame_has_no_face() {
        let embedder = PerceptualEmbedder;
        let flat = RgbImage::from_pixel(128, 128, Rgb([90, 90, 90]));
        let result = embedder.embed(&png_bytes(flat)).unwrap();
        assert!(result.is_none());
    }

    #[test]
    fn test_garbage_input_is_an_error() {
        let embedder = PerceptualEmbedder;
        assert!(embedder.embed(b"not an image").is_err());
    }
}
