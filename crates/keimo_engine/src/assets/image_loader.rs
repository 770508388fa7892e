//! Image loading utilities for texture data
//!
//! Decodes image files into tightly packed RGBA8 buffers for upload. A file
//! that cannot be decoded, or that decodes to zero pixels, is an error; a
//! texture is never created from an empty buffer.

use std::path::Path;

use crate::assets::AssetError;

/// Decoded image data ready for GPU upload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageData {
    data: Vec<u8>,
    width: u32,
    height: u32,
}

impl ImageData {
    /// Bytes per pixel of every `ImageData`
    pub const CHANNELS: usize = 4;

    /// Wrap row-major RGBA8 pixels.
    ///
    /// Both dimensions must be non-zero and `data` must hold exactly
    /// `width * height * 4` bytes.
    pub fn new(width: u32, height: u32, data: Vec<u8>, source: &str) -> Result<Self, AssetError> {
        if width == 0 || height == 0 {
            return Err(AssetError::EmptyImage { path: source.to_string() });
        }
        let expected = width as usize * height as usize * Self::CHANNELS;
        if data.len() != expected {
            return Err(AssetError::LoadFailed(format!(
                "{}: {}x{} RGBA8 needs {} bytes, got {}",
                source,
                width,
                height,
                expected,
                data.len()
            )));
        }
        Ok(Self { data, width, height })
    }

    /// Load an image from a file path
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, AssetError> {
        let path_ref = path.as_ref();
        log::debug!("Loading image from: {:?}", path_ref);

        let img = image::open(path_ref)
            .map_err(|e| AssetError::LoadFailed(format!("{}: {}", path_ref.display(), e)))?;

        let image = Self::from_rgba8(img.to_rgba8(), &path_ref.display().to_string())?;
        log::info!("Loaded image {}x{} from {:?}", image.width, image.height, path_ref);
        Ok(image)
    }

    /// Load image from memory (embedded resources, tests)
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, AssetError> {
        let img = image::load_from_memory(bytes)
            .map_err(|e| AssetError::LoadFailed(format!("in-memory image: {}", e)))?;
        Self::from_rgba8(img.to_rgba8(), "<memory>")
    }

    fn from_rgba8(rgba: image::RgbaImage, source: &str) -> Result<Self, AssetError> {
        let (width, height) = rgba.dimensions();
        Self::new(width, height, rgba.into_raw(), source)
    }

    /// Create a solid color image
    pub fn solid_color(width: u32, height: u32, color: [u8; 4]) -> Result<Self, AssetError> {
        let pixel_count = width as usize * height as usize;
        Self::new(width, height, color.repeat(pixel_count), "<solid color>")
    }

    /// Two-color checkerboard with square cells of `cell` pixels
    pub fn checkerboard(size: u32, cell: u32, a: [u8; 4], b: [u8; 4]) -> Result<Self, AssetError> {
        let cell = cell.max(1);
        let mut data = Vec::with_capacity(size as usize * size as usize * Self::CHANNELS);
        for y in 0..size {
            for x in 0..size {
                let even = ((x / cell) + (y / cell)) % 2 == 0;
                data.extend_from_slice(if even { &a } else { &b });
            }
        }
        Self::new(size, size, data, "<checkerboard>")
    }

    /// Width in pixels, never zero
    pub fn width(&self) -> u32 {
        self.width
    }

    /// Height in pixels, never zero
    pub fn height(&self) -> u32 {
        self.height
    }

    /// Row-major RGBA8 bytes
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Get the size of the image data in bytes
    pub fn size_bytes(&self) -> usize {
        self.data.len()
    }

    /// Pixel at `(x, y)`
    pub fn pixel(&self, x: u32, y: u32) -> Option<[u8; 4]> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let offset = (y as usize * self.width as usize + x as usize) * Self::CHANNELS;
        let bytes = self.data.get(offset..offset + Self::CHANNELS)?;
        Some([bytes[0], bytes[1], bytes[2], bytes[3]])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_solid_color_image() {
        let img = ImageData::solid_color(4, 4, [255, 0, 0, 255]).expect("image");
        assert_eq!(img.width(), 4);
        assert_eq!(img.height(), 4);
        assert_eq!(img.size_bytes(), 4 * 4 * 4);
        assert_eq!(img.pixel(3, 3), Some([255, 0, 0, 255]));
    }

    #[test]
    fn test_checkerboard_alternates() {
        let black = [0, 0, 0, 255];
        let white = [255, 255, 255, 255];
        let img = ImageData::checkerboard(8, 4, white, black).expect("image");
        assert_eq!(img.pixel(0, 0), Some(white));
        assert_eq!(img.pixel(4, 0), Some(black));
        assert_eq!(img.pixel(4, 4), Some(white));
        assert_eq!(img.pixel(8, 0), None);
    }

    #[test]
    fn test_png_from_bytes() {
        let mut source = image::RgbaImage::new(2, 2);
        source.put_pixel(0, 0, image::Rgba([255, 0, 0, 255]));
        source.put_pixel(1, 0, image::Rgba([0, 255, 0, 255]));
        source.put_pixel(0, 1, image::Rgba([0, 0, 255, 255]));
        source.put_pixel(1, 1, image::Rgba([255, 255, 255, 255]));

        let mut png = std::io::Cursor::new(Vec::new());
        source.write_to(&mut png, image::ImageFormat::Png).expect("encode png");

        let img = ImageData::from_bytes(png.get_ref()).expect("decode png");
        assert_eq!((img.width(), img.height()), (2, 2));
        assert_eq!(img.pixel(1, 0), Some([0, 255, 0, 255]));
        assert_eq!(img.pixel(0, 1), Some([0, 0, 255, 255]));
    }

    #[test]
    fn test_corrupt_bytes_are_an_error() {
        let result = ImageData::from_bytes(b"definitely not a png");
        assert!(matches!(result, Err(AssetError::LoadFailed(_))));
    }

    #[test]
    fn test_zero_sized_images_are_rejected() {
        let red = [255, 0, 0, 255];
        assert!(matches!(ImageData::solid_color(0, 0, red), Err(AssetError::EmptyImage { .. })));
        assert!(matches!(ImageData::solid_color(4, 0, red), Err(AssetError::EmptyImage { .. })));
        assert!(matches!(
            ImageData::checkerboard(0, 4, red, red),
            Err(AssetError::EmptyImage { .. })
        ));
    }

    #[test]
    fn test_pixel_buffer_must_match_dimensions() {
        let short = vec![0u8; 2 * 2 * 4 - 1];
        assert!(matches!(ImageData::new(2, 2, short, "short"), Err(AssetError::LoadFailed(_))));

        let long = vec![0u8; 2 * 2 * 4 + 4];
        assert!(ImageData::new(2, 2, long, "long").is_err());

        let exact = ImageData::new(2, 2, vec![7u8; 16], "exact").expect("image");
        assert_eq!(exact.pixel(1, 1), Some([7, 7, 7, 7]));
    }

    #[test]
    fn test_missing_file_is_an_error() {
        assert!(ImageData::from_file("no/such/texture.png").is_err());
    }
}
