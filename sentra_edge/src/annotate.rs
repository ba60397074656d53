//! Sentra Edge - Probe Annotation
//!
//! Renders the recognition verdict back onto the probe image: a green frame
//! for a match, red for no match. JPEG output.

use std::io::Cursor;

use image::{DynamicImage, Rgb};

use crate::error::EdgeResult;

/// Border thickness relative to the short image edge
const BORDER_DIVISOR: u32 = 40;

/// Minimum border thickness in pixels
const MIN_BORDER: u32 = 4;

/// Draw the verdict border and re-encode as JPEG.
pub fn render_verdict(image_bytes: &[u8], matched: bool) -> EdgeResult<Vec<u8>> {
    let mut img = image::load_from_memory(image_bytes)?.to_rgb8();
    let (width, height) = img.dimensions();

    let color = if matched {
        Rgb([0u8, 200, 0])
    } else {
        Rgb([220u8, 0, 0])
    };
    let border = (width.min(height) / BORDER_DIVISOR).max(MIN_BORDER);

    for y in 0..height {
        for x in 0..width {
            if x < border || y < border || x >= width - border || y >= height - border {
                img.put_pixel(x, y, color);
            }
        }
    }

    let mut output = Vec::new();
    DynamicImage::ImageRgb8(img)
        .write_to(&mut Cursor::new(&mut output), image::ImageFormat::Jpeg)?;
    Ok(output)
}
