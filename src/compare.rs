//! Pixel-exact comparison of surfaces

use crate::surface::{Rgba, Surface};
use crate::{Error, Result};
use image::RgbaImage;

const EMPTY: Rgba = [0, 0, 0, 0];

/// True iff both surfaces share dimensions and every channel of every pixel matches
pub fn equal(a: &Surface, b: &Surface) -> bool {
    a.dimensions() == b.dimensions() && a.as_rgba() == b.as_rgba()
}

/// Per-pixel difference of two same-sized surfaces.
///
/// Colour channels hold the absolute difference; alpha is `255 - |a - b|`,
/// so identical regions come out as opaque black.
pub fn diff(a: &Surface, b: &Surface) -> Result<Surface> {
    if a.dimensions() != b.dimensions() {
        return Err(Error::DimensionMismatch {
            actual_width: a.width(),
            actual_height: a.height(),
            expected_width: b.width(),
            expected_height: b.height(),
        });
    }
    let (ia, ib) = (a.as_image(), b.as_image());
    let image = RgbaImage::from_fn(a.width(), a.height(), |x, y| {
        image::Rgba(diff_pixel(ia.get_pixel(x, y).0, ib.get_pixel(x, y).0))
    });
    Ok(Surface::wrap(image))
}

/// Difference over the union of both surfaces, aligned at the top-left corner.
///
/// Pixels that fall outside one of the surfaces compare against transparent
/// black. Used when dimensions differ and a difference image is still wanted.
pub fn diff_aligned(a: &Surface, b: &Surface) -> Surface {
    let width = a.width().max(b.width());
    let height = a.height().max(b.height());
    let image = RgbaImage::from_fn(width, height, |x, y| {
        let pa = a.pixel(x, y).unwrap_or(EMPTY);
        let pb = b.pixel(x, y).unwrap_or(EMPTY);
        image::Rgba(diff_pixel(pa, pb))
    });
    Surface::wrap(image)
}

/// Number of pixels that differ in at least one channel; pixels outside the
/// overlapping area always count as different
pub fn count_differing_pixels(a: &Surface, b: &Surface) -> usize {
    let (ia, ib) = (a.as_image(), b.as_image());
    let overlap_w = a.width().min(b.width());
    let overlap_h = a.height().min(b.height());
    let union = a.width().max(b.width()) as usize * a.height().max(b.height()) as usize;
    let overlap = overlap_w as usize * overlap_h as usize;

    let mut count = union - overlap;
    for y in 0..overlap_h {
        for x in 0..overlap_w {
            if ia.get_pixel(x, y) != ib.get_pixel(x, y) {
                count += 1;
            }
        }
    }
    count
}

fn diff_pixel(a: Rgba, b: Rgba) -> Rgba {
    [
        a[0].abs_diff(b[0]),
        a[1].abs_diff(b[1]),
        a[2].abs_diff(b[2]),
        255 - a[3].abs_diff(b[3]),
    ]
}
