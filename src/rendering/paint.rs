//! Display list built from layout nodes

use super::layout::{ElementType, LayoutNode};
use crate::surface::Rgba;

pub const TEXT_COLOR: Rgba = [0, 0, 0, 255];
/// Placeholder fill for images
pub const IMAGE_COLOR: Rgba = [192, 192, 192, 255];

#[derive(Debug, Clone, PartialEq)]
pub enum PaintCommand {
    SolidRect {
        x: i32,
        y: i32,
        width: u32,
        height: u32,
        rgba: Rgba,
    },
    Text {
        x: i32,
        y: i32,
        /// Maximum width before glyphs are clipped
        width: u32,
        text: String,
        scale: u32,
        rgba: Rgba,
    },
}

/// Build the display list for a page: background first, then blocks in
/// layout order
pub fn build_display_list(
    width: u32,
    height: u32,
    background: Rgba,
    nodes: &[LayoutNode],
) -> Vec<PaintCommand> {
    let mut commands = vec![PaintCommand::SolidRect {
        x: 0,
        y: 0,
        width,
        height,
        rgba: background,
    }];

    for node in nodes {
        let rect = &node.lb.rect;
        match node.elem_type {
            ElementType::Image => commands.push(PaintCommand::SolidRect {
                x: rect.x,
                y: rect.y,
                width: rect.width,
                height: rect.height,
                rgba: IMAGE_COLOR,
            }),
            ElementType::Heading | ElementType::Paragraph => {
                let padding = node.lb.box_model.padding as i32;
                commands.push(PaintCommand::Text {
                    x: rect.x + padding,
                    y: rect.y + padding,
                    width: node.lb.content_width(),
                    text: node.text.clone(),
                    scale: node.scale,
                    rgba: TEXT_COLOR,
                });
            }
        }
    }

    commands
}

#[cfg(test)]
mod tests {
    use super::super::layout::{BoxModel, LayoutBox, Rect};
    use super::*;

    #[test]
    fn test_display_list_starts_with_background() {
        let node = LayoutNode {
            lb: LayoutBox {
                rect: Rect { x: 8, y: 8, width: 100, height: 20 },
                box_model: BoxModel { margin: 6, border: 0, padding: 6 },
            },
            text: "hi".into(),
            elem_type: ElementType::Paragraph,
            scale: 1,
        };
        let cmds = build_display_list(120, 40, [255, 255, 255, 255], &[node]);
        assert_eq!(cmds.len(), 2);
        match &cmds[0] {
            PaintCommand::SolidRect { width, height, .. } => {
                assert_eq!((*width, *height), (120, 40))
            }
            other => panic!("unexpected: {:?}", other),
        }
        match &cmds[1] {
            PaintCommand::Text { x, y, text, .. } => {
                assert_eq!((*x, *y), (14, 14));
                assert_eq!(text, "hi");
            }
            other => panic!("unexpected: {:?}", other),
        }
    }
}
