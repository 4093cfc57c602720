//! Rasterizer: executes a display list onto a `Surface`.
//!
//! Glyphs are drawn as solid blocks on the character grid, which keeps the
//! output deterministic across platforms.

use super::layout::{CHAR_WIDTH, LINE_HEIGHT};
use super::paint::PaintCommand;
use crate::surface::Surface;

/// Size of a glyph block inside its cell, at scale 1
const GLYPH_WIDTH: u32 = 6;
const GLYPH_HEIGHT: u32 = 7;

pub fn rasterize(width: u32, height: u32, commands: &[PaintCommand]) -> Surface {
    let mut surface = Surface::new(width, height);
    for cmd in commands {
        match cmd {
            PaintCommand::SolidRect { x, y, width, height, rgba } => {
                surface.fill_rect(*x, *y, *width, *height, *rgba);
            }
            PaintCommand::Text { x, y, width, text, scale, rgba } => {
                let scale = (*scale).max(1);
                let max_cols = (*width / (CHAR_WIDTH * scale)) as usize;
                for (row, line) in text.lines().enumerate() {
                    let ly = *y + (row as u32 * LINE_HEIGHT * scale) as i32;
                    for (col, ch) in line.chars().take(max_cols).enumerate() {
                        if ch.is_whitespace() {
                            continue;
                        }
                        let lx = *x + (col as u32 * CHAR_WIDTH * scale) as i32;
                        surface.fill_rect(lx, ly, GLYPH_WIDTH * scale, GLYPH_HEIGHT * scale, *rgba);
                    }
                }
            }
        }
    }
    surface
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rasterize_sizes_surface_to_request() {
        let s = rasterize(128, 64, &[]);
        assert_eq!(s.dimensions(), (128, 64));
    }

    #[test]
    fn test_text_draws_glyph_blocks_and_skips_spaces() {
        let cmds = vec![
            PaintCommand::SolidRect {
                x: 0,
                y: 0,
                width: 40,
                height: 10,
                rgba: [255, 255, 255, 255],
            },
            PaintCommand::Text {
                x: 0,
                y: 0,
                width: 40,
                text: "a b".into(),
                scale: 1,
                rgba: [0, 0, 0, 255],
            },
        ];
        let s = rasterize(40, 10, &cmds);
        assert_eq!(s.pixel(0, 0), Some([0, 0, 0, 255]));
        assert_eq!(s.pixel(8, 0), Some([255, 255, 255, 255]));
        assert_eq!(s.pixel(16, 0), Some([0, 0, 0, 255]));
        assert_eq!(s.pixel(6, 0), Some([255, 255, 255, 255]));
    }

    #[test]
    fn test_rasterize_is_deterministic() {
        let cmds = vec![PaintCommand::Text {
            x: 2,
            y: 2,
            width: 60,
            text: "hello\nworld".into(),
            scale: 2,
            rgba: [0, 0, 0, 255],
        }];
        assert_eq!(rasterize(64, 48, &cmds), rasterize(64, 48, &cmds));
    }
}
