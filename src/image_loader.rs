// Image loading module
// Decodes the image file into a premultiplied BGRA bitmap for the overlay

use crate::error::OverlayError;
use image::{DynamicImage, ImageResult, RgbaImage};
use std::fs;
use std::io::Cursor;
use std::path::Path;

/// Decoded image ready for display
#[derive(Debug, Clone)]
pub struct ImageData {
    /// Image width in pixels
    pub width: u32,
    /// Image height in pixels
    pub height: u32,
    /// Premultiplied BGRA pixels, 4 bytes per pixel, rows top to bottom
    pub bgra_data: Vec<u8>,
}

impl ImageData {
    /// Premultiplied RGBA copy of the pixels, for GPU texture upload
    pub fn premultiplied_rgba(&self) -> Vec<u8> {
        let mut rgba = self.bgra_data.clone();
        for pixel in rgba.chunks_exact_mut(4) {
            pixel.swap(0, 2);
        }
        rgba
    }
}

/// Load and decode the image at `path`
pub fn load_image(path: &Path) -> Result<ImageData, OverlayError> {
    let img = fs::read(path)
        .map_err(image::ImageError::IoError)
        .and_then(|data| load_from_bytes(&data))
        .map_err(|source| OverlayError::Load {
            path: path.to_path_buf(),
            source,
        })?;

    Ok(from_rgba(img.to_rgba8()))
}

/// Load an image from raw bytes, auto-detecting the format
fn load_from_bytes(data: &[u8]) -> ImageResult<DynamicImage> {
    let format = image::guess_format(data)?;
    image::load(Cursor::new(data), format)
}

/// Convert RGBA to premultiplied BGRA (wl_shm Argb8888 in little-endian)
fn from_rgba(rgba: RgbaImage) -> ImageData {
    let (width, height) = rgba.dimensions();

    let mut bgra_data = rgba.into_raw();
    for pixel in bgra_data.chunks_exact_mut(4) {
        pixel.swap(0, 2);
        premultiply(pixel);
    }

    ImageData {
        width,
        height,
        bgra_data,
    }
}

fn premultiply(pixel: &mut [u8]) {
    let alpha = pixel[3] as u32;
    if alpha == 255 {
        return;
    }
    for channel in &mut pixel[..3] {
        *channel = ((*channel as u32 * alpha + 127) / 255) as u8;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert2::{assert, let_assert};
    use image::{ImageFormat, Rgba};

    fn encode_png(img: &RgbaImage) -> Vec<u8> {
        let mut bytes = Vec::new();
        img.write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
            .unwrap();
        bytes
    }

    #[test]
    fn decoded_size_matches_intrinsic_dimensions() {
        let png = encode_png(&RgbaImage::new(400, 300));
        let img = load_from_bytes(&png).unwrap();
        let data = from_rgba(img.to_rgba8());
        assert!(data.width == 400);
        assert!(data.height == 300);
        assert!(data.bgra_data.len() == 400 * 300 * 4);
    }

    #[test]
    fn channels_are_swapped_to_bgra() {
        let img = RgbaImage::from_pixel(1, 1, Rgba([10, 20, 30, 255]));
        let data = from_rgba(img);
        assert!(data.bgra_data == [30, 20, 10, 255]);
    }

    #[test]
    fn translucent_pixels_are_premultiplied() {
        let img = RgbaImage::from_pixel(1, 1, Rgba([255, 128, 0, 128]));
        let data = from_rgba(img);
        assert!(data.bgra_data == [0, 64, 128, 128]);
    }

    #[test]
    fn fully_transparent_pixels_become_zero() {
        let img = RgbaImage::from_pixel(1, 1, Rgba([200, 100, 50, 0]));
        let data = from_rgba(img);
        assert!(data.bgra_data == [0, 0, 0, 0]);
    }

    #[test]
    fn gpu_upload_keeps_premultiplied_channels_in_rgba_order() {
        let img = RgbaImage::from_pixel(2, 1, Rgba([255, 128, 0, 128]));
        let data = from_rgba(img);
        assert!(data.premultiplied_rgba() == [128, 64, 0, 128, 128, 64, 0, 128]);
    }

    #[test]
    fn garbage_bytes_fail_to_decode() {
        let_assert!(Err(_) = load_from_bytes(b"this is not an image"));
    }

    #[test]
    fn load_error_names_the_path() {
        let path = Path::new("no/such/dir/photo.png");
        let_assert!(Err(err) = load_image(path));
        let_assert!(OverlayError::Load { .. } = &err);
        assert!(err.to_string() == "Failed to load image: no/such/dir/photo.png");
    }
}
