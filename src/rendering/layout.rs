//! Block layout for the built-in renderer.
//!
//! Headings and paragraphs are stacked vertically with fixed margins and
//! padding; text is wrapped on an 8px character grid.

use crate::Viewport;
use scraper::{Html, Selector};

/// Width of one character cell at scale 1
pub const CHAR_WIDTH: u32 = 8;
/// Height of one text line at scale 1
pub const LINE_HEIGHT: u32 = 8;

#[derive(Debug, Clone, PartialEq)]
pub struct Rect {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BoxModel {
    pub margin: u32,
    pub border: u32,
    pub padding: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LayoutBox {
    pub rect: Rect,
    pub box_model: BoxModel,
}

impl LayoutBox {
    pub fn content_width(&self) -> u32 {
        let total = self.box_model.margin + self.box_model.border + self.box_model.padding;
        self.rect.width.saturating_sub(total)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ElementType {
    Heading,
    Paragraph,
    Image,
}

/// A positioned block with its (already wrapped) text
#[derive(Debug, Clone, PartialEq)]
pub struct LayoutNode {
    pub lb: LayoutBox,
    pub text: String,
    pub elem_type: ElementType,
    pub scale: u32,
}

fn selector(css: &str) -> Option<Selector> {
    Selector::parse(css).ok()
}

/// Wrap `text` into lines of at most `chars_per_line` characters
pub fn wrap_text(text: &str, chars_per_line: usize) -> Vec<String> {
    let mut lines = Vec::new();
    let mut cur = String::new();
    for word in text.split_whitespace() {
        if !cur.is_empty() && cur.chars().count() + word.chars().count() + 1 > chars_per_line {
            lines.push(std::mem::take(&mut cur));
        }
        if !cur.is_empty() {
            cur.push(' ');
        }
        cur.push_str(word);
    }
    if !cur.is_empty() {
        lines.push(cur);
    }
    lines
}

/// Lay out the headings, paragraphs and images of `document` in document
/// order. Layout stops once the viewport height is exhausted.
pub fn layout_document(document: &Html, viewport: Viewport) -> Vec<LayoutNode> {
    let Some(block_sel) = selector("h1, h2, h3, p, img") else {
        return Vec::new();
    };

    let mut y = 8u32;
    let block_width = viewport.width.saturating_sub(16);
    let mut nodes = Vec::new();

    for element in document.select(&block_sel) {
        if y >= viewport.height {
            break;
        }
        let tag = element.value().name();
        let (elem_type, scale, padding, margin) = match tag {
            "h1" => (ElementType::Heading, 2, 8, 8),
            "h2" | "h3" => (ElementType::Heading, 1, 6, 8),
            "img" => (ElementType::Image, 1, 0, 6),
            _ => (ElementType::Paragraph, 1, 6, 6),
        };

        if elem_type == ElementType::Image {
            let attr = |name: &str| {
                element
                    .value()
                    .attr(name)
                    .and_then(|v| v.trim_end_matches("px").parse::<u32>().ok())
            };
            let h = attr("height").unwrap_or(16).min(viewport.height);
            let w = attr("width").unwrap_or(16).min(block_width);
            nodes.push(LayoutNode {
                lb: LayoutBox {
                    rect: Rect { x: 8, y: y as i32, width: w, height: h },
                    box_model: BoxModel { margin, border: 0, padding },
                },
                text: String::new(),
                elem_type,
                scale,
            });
            y = y.saturating_add(h).saturating_add(margin);
            continue;
        }

        let raw = element.text().collect::<String>();
        if raw.trim().is_empty() {
            continue;
        }
        let content_w = block_width.saturating_sub(padding * 2);
        let chars_per_line = ((content_w / (CHAR_WIDTH * scale)) as usize).max(1);
        let lines = wrap_text(&raw, chars_per_line);
        let line_count = (lines.len() as u32).max(1);
        let text = lines.join("\n");
        let box_h = line_count
            .saturating_mul(LINE_HEIGHT * scale)
            .saturating_add(padding * 2);

        nodes.push(LayoutNode {
            lb: LayoutBox {
                rect: Rect {
                    x: 8,
                    y: y as i32,
                    width: block_width,
                    height: box_h,
                },
                box_model: BoxModel { margin, border: 0, padding },
            },
            text,
            elem_type,
            scale,
        });
        y = y.saturating_add(box_h).saturating_add(margin);
    }

    nodes
}
