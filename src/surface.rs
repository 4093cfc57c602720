//! Pixel surfaces: the raster a page renders into and the form a reference
//! image takes once it has been read back from the store.
//!
//! A surface is an RGBA8, row-major buffer. It can be exported to a lossless
//! PNG data URI for storage and imported from one again.

use crate::{Error, Result};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use image::{codecs::png::PngEncoder, ExtendedColorType, ImageEncoder, ImageFormat, RgbaImage};

/// Number of channels per pixel (RGBA)
pub const CHANNELS: usize = 4;

const DATA_URI_PREFIX: &str = "data:image/png;base64,";

/// An RGBA pixel value
pub type Rgba = [u8; 4];

/// In-memory pixel raster
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Surface {
    image: RgbaImage,
    origin_clean: bool,
}

impl Surface {
    /// Create a blank (fully transparent) surface.
    ///
    /// Zero dimensions are clamped to 1 so the surface invariant holds.
    pub fn new(width: u32, height: u32) -> Self {
        Self::filled(width, height, [0, 0, 0, 0])
    }

    /// Create a surface where every pixel has the given colour
    pub fn filled(width: u32, height: u32, rgba: Rgba) -> Self {
        Self::wrap(RgbaImage::from_pixel(
            width.max(1),
            height.max(1),
            image::Rgba(rgba),
        ))
    }

    /// Wrap an existing RGBA buffer, validating it against the dimensions
    pub fn from_rgba(width: u32, height: u32, pixels: Vec<u8>) -> Result<Self> {
        let expected = width as usize * height as usize * CHANNELS;
        // from_raw accepts oversized buffers
        if pixels.len() != expected {
            return Err(Error::InvalidSurface(format!(
                "expected {} bytes for {}x{}, got {}",
                expected,
                width,
                height,
                pixels.len()
            )));
        }
        let image = RgbaImage::from_raw(width, height, pixels).ok_or_else(|| {
            Error::InvalidSurface(format!("buffer does not fit {}x{}", width, height))
        })?;
        Self::from_image(image)
    }

    /// Wrap a decoded image; empty images are rejected
    pub fn from_image(image: RgbaImage) -> Result<Self> {
        let (width, height) = image.dimensions();
        if width == 0 || height == 0 {
            return Err(Error::InvalidSurface(format!(
                "dimensions must be positive, got {}x{}",
                width, height
            )));
        }
        Ok(Self::wrap(image))
    }

    /// Wrap an image the caller already knows to be non-empty
    pub(crate) fn wrap(image: RgbaImage) -> Self {
        Self {
            image,
            origin_clean: true,
        }
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    pub fn dimensions(&self) -> (u32, u32) {
        self.image.dimensions()
    }

    /// Raw RGBA bytes, row-major
    pub fn as_rgba(&self) -> &[u8] {
        self.image.as_raw()
    }

    pub fn as_image(&self) -> &RgbaImage {
        &self.image
    }

    /// Pixel at `(x, y)`, or `None` when out of bounds
    pub fn pixel(&self, x: u32, y: u32) -> Option<Rgba> {
        self.image.get_pixel_checked(x, y).map(|p| p.0)
    }

    /// Set the pixel at `(x, y)`; out-of-bounds writes are clipped
    pub fn put_pixel(&mut self, x: u32, y: u32, rgba: Rgba) {
        if let Some(p) = self.image.get_pixel_mut_checked(x, y) {
            *p = image::Rgba(rgba);
        }
    }

    /// Fill an axis-aligned rectangle, clipped to the surface
    pub fn fill_rect(&mut self, x: i32, y: i32, width: u32, height: u32, rgba: Rgba) {
        let x0 = x.max(0) as u32;
        let y0 = y.max(0) as u32;
        let x1 = (x as i64 + width as i64).clamp(0, self.width() as i64) as u32;
        let y1 = (y as i64 + height as i64).clamp(0, self.height() as i64) as u32;
        for py in y0..y1 {
            for px in x0..x1 {
                self.put_pixel(px, py, rgba);
            }
        }
    }

    /// Whether the pixels may be read back (cross-origin content taints a surface)
    pub fn is_origin_clean(&self) -> bool {
        self.origin_clean
    }

    /// Mark the surface as containing cross-origin content
    pub fn taint(&mut self) {
        self.origin_clean = false;
    }

    /// Export to a PNG data URI.
    ///
    /// Fails for tainted surfaces. Callers must not persist anything when
    /// this fails.
    pub fn encode(&self) -> Result<String> {
        let png = self.to_png()?;
        Ok(format!("{}{}", DATA_URI_PREFIX, STANDARD.encode(&png)))
    }

    /// Raw PNG bytes
    pub fn to_png(&self) -> Result<Vec<u8>> {
        if !self.origin_clean {
            return Err(Error::Encode(
                "surface contains cross-origin content and cannot be read".into(),
            ));
        }
        let mut png = Vec::new();
        PngEncoder::new(&mut png)
            .write_image(
                self.image.as_raw(),
                self.width(),
                self.height(),
                ExtendedColorType::Rgba8,
            )
            .map_err(|e| Error::Encode(e.to_string()))?;
        Ok(png)
    }

    /// Import from a PNG data URI (a bare base64 PNG is accepted too)
    pub fn decode(encoded: &str) -> Result<Self> {
        let payload = encoded.trim();
        let payload = payload.strip_prefix(DATA_URI_PREFIX).unwrap_or(payload);
        let png = STANDARD
            .decode(payload)
            .map_err(|e| Error::Decode(format!("invalid base64: {}", e)))?;
        let img = image::load_from_memory_with_format(&png, ImageFormat::Png)
            .map_err(|e| Error::Decode(e.to_string()))?
            .to_rgba8();
        Self::from_image(img).map_err(|e| Error::Decode(e.to_string()))
    }

    /// Re-draw the surface through an encode/decode round trip.
    ///
    /// Some backends composite transparency slightly differently the first
    /// time a freshly rendered surface is drawn; after one round trip the
    /// representation is stable.
    pub fn normalize(&self) -> Result<Self> {
        let encoded = self.encode()?;
        Self::decode(&encoded)
    }
}
