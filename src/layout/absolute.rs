//! # Absolutely Positioned Boxes
//!
//! Absolute and fixed boxes leave a placeholder in the flow. The placeholder
//! records the static position; once the containing block is laid out (the
//! nearest relatively positioned ancestor, or the page), the box is sized and
//! positioned following CSS 2.1 §10.3.7 and §10.6.4, laid out, and swapped
//! into the placeholder.

use log::warn;

use crate::boxes::{BoxId, BoxKind, LayoutBox};
use crate::error::{LayoutError, LayoutResult};
use crate::style::Direction;

use super::block::block_container_layout;
use super::float::{finish_formatting_context, strategy_kind};
use super::percentages::{
    replaced_width_height, resolve_percentages, resolve_position_percentages, with_min_max_width,
};
use super::preferred::shrink_to_fit;
use super::resume::ResumeStack;
use super::{BrokenBox, ContainingBlock, LayoutContext};

/// Lay out the pending placeholders `ids` found in `tree`, against `cb`.
///
/// Placeholders that are not in `tree` any more (dropped by a page break)
/// are skipped.
pub fn absolute_layout(
    ctx: &mut LayoutContext,
    tree: &mut LayoutBox,
    ids: &[BoxId],
    cb: &ContainingBlock,
    fixed_boxes: &mut Vec<BoxId>,
    bottom_space: f64,
) -> LayoutResult<()> {
    for &id in ids {
        lay_out_placeholder(ctx, tree, id, cb, fixed_boxes, bottom_space)?;
    }
    Ok(())
}

/// Lay out one placeholder of `tree`. Returns whether it was found.
pub(crate) fn lay_out_placeholder(
    ctx: &mut LayoutContext,
    tree: &mut LayoutBox,
    id: BoxId,
    cb: &ContainingBlock,
    fixed_boxes: &mut Vec<BoxId>,
    bottom_space: f64,
) -> LayoutResult<bool> {
    let is_target = |b: &LayoutBox| b.id == id && b.is_placeholder();
    let Some(path) = tree.find_path(&is_target) else {
        return Ok(false);
    };
    let Some(placeholder) = tree.at_path_mut(&path) else {
        return Ok(false);
    };
    let BoxKind::Placeholder(state) = &placeholder.kind else {
        return Ok(false);
    };
    if state.is_done() {
        return Err(LayoutError::PlaceholderAlreadyResolved(id));
    }
    let source = state.boxed().clone();

    let (laid_out, resume_at) = absolute_box_layout(ctx, source.clone(), cb, fixed_boxes, bottom_space, None)?;

    let Some(placeholder) = tree.at_path_mut(&path) else {
        return Ok(false);
    };
    if let BoxKind::Placeholder(state) = &mut placeholder.kind {
        state.set_laid_out(laid_out)?;
    }
    if let Some(resume_at) = resume_at {
        ctx.broken_out_of_flow.insert(
            id,
            BrokenBox {
                source,
                containing_block: *cb,
                resume_at,
            },
        );
    }
    Ok(true)
}

/// Size, position and lay out an absolutely positioned box against `cb`
/// (the padding box of the containing block, or the page content box).
pub fn absolute_box_layout(
    ctx: &mut LayoutContext,
    mut bx: LayoutBox,
    cb: &ContainingBlock,
    fixed_boxes: &mut Vec<BoxId>,
    bottom_space: f64,
    skip_stack: Option<&ResumeStack>,
) -> LayoutResult<(LayoutBox, Option<ResumeStack>)> {
    let cb_height = cb.height.unwrap_or(0.0);
    resolve_percentages(&mut bx, cb.width, Some(cb_height));
    resolve_position_percentages(&mut bx, cb.width, cb_height);

    if matches!(bx.kind, BoxKind::Replaced(_)) {
        absolute_replaced(&mut bx, cb);
        return Ok((bx, None));
    }
    absolute_driver(ctx, bx, cb, fixed_boxes, bottom_space, skip_stack)
}

fn absolute_driver(
    ctx: &mut LayoutContext,
    mut bx: LayoutBox,
    cb: &ContainingBlock,
    fixed_boxes: &mut Vec<BoxId>,
    mut bottom_space: f64,
    skip_stack: Option<&ResumeStack>,
) -> LayoutResult<(LayoutBox, Option<ResumeStack>)> {
    let measuring: &LayoutContext = ctx;
    let (translate_box_width, mut translate_x) = with_min_max_width(&mut bx, |b| absolute_width(measuring, b, cb));
    let (translate_box_height, mut translate_y) = if skip_stack.is_none() {
        absolute_height(&mut bx, cb)
    } else {
        (false, 0.0)
    };

    if translate_box_height {
        bottom_space -= bx.position_y;
    } else {
        bottom_space += translate_y;
    }

    // This box is the containing block of its absolute descendants.
    let mut absolute_boxes = Vec::new();
    let (mut new_box, resume_at) = if bx.is_block_container() {
        let source = bx.clone();
        let (laid_out, result) = block_container_layout(
            ctx,
            bx,
            bottom_space,
            skip_stack,
            true,
            &mut absolute_boxes,
            fixed_boxes,
            &mut Vec::new(),
            false,
        )?;
        let laid_out = laid_out.unwrap_or_else(|| {
            warn!("absolute box {:?} produced no fragment, keeping it empty", source.id);
            let mut empty = source.copy_with_children(Vec::new());
            empty.height = Some(0.0);
            empty
        });
        (laid_out, result.resume_at)
    } else if let Some(strategy) = strategy_kind(&bx).and_then(|kind| ctx.strategy(kind)) {
        ctx.shapes.push_context();
        let (laid_out, result) = strategy.layout(
            ctx,
            bx.clone(),
            bottom_space,
            skip_stack,
            cb,
            true,
            &mut absolute_boxes,
            fixed_boxes,
        )?;
        let mut laid_out = laid_out.unwrap_or(bx);
        finish_formatting_context(ctx, &mut laid_out);
        (laid_out, result.resume_at)
    } else {
        return Err(LayoutError::UnexpectedBox {
            kind: bx.kind.name(),
            operation: "absolute layout",
        });
    };

    let own_cb = ContainingBlock::padding_of(&new_box);
    absolute_layout(ctx, &mut new_box, &absolute_boxes, &own_cb, fixed_boxes, bottom_space)?;

    if translate_box_width {
        translate_x -= new_box.content_width();
    }
    if translate_box_height {
        translate_y -= new_box.content_height();
    }
    new_box.translate(translate_x, translate_y, false);
    Ok((new_box, resume_at))
}

/// Horizontal part of §10.3.7. Returns whether the final width must be
/// subtracted from the returned translation, and the translation.
fn absolute_width(ctx: &LayoutContext, bx: &mut LayoutBox, cb: &ContainingBlock) -> (bool, f64) {
    let ltr = cb.direction == Direction::Ltr;
    let paddings_borders = bx.padding.left + bx.padding.right + bx.border.left + bx.border.right;
    let (margin_left, margin_right) = (bx.margin.left, bx.margin.right);
    let (left, right, width) = (bx.offsets.left, bx.offsets.right, bx.width);

    let default_translate_x = cb.x - bx.position_x;
    let mut translate_x = 0.0;
    let mut translate_box_width = false;

    match (left, right, width) {
        (None, None, None) => {
            bx.margin.left.get_or_insert(0.0);
            bx.margin.right.get_or_insert(0.0);
            let available = cb.width - (paddings_borders + bx.margin_left() + bx.margin_right());
            bx.width = Some(shrink_to_fit(ctx, bx, available));
            if !ltr {
                translate_box_width = true;
                translate_x = default_translate_x + available;
            }
        }
        (Some(left), Some(right), Some(width)) => {
            let width_for_margins = cb.width - (right + left + width + paddings_borders);
            match (margin_left, margin_right) {
                (None, None) => {
                    if width + paddings_borders + right + left <= cb.width {
                        bx.margin.left = Some(width_for_margins / 2.0);
                        bx.margin.right = Some(width_for_margins / 2.0);
                    } else if ltr {
                        bx.margin.left = Some(0.0);
                        bx.margin.right = Some(width_for_margins);
                    } else {
                        bx.margin.left = Some(width_for_margins);
                        bx.margin.right = Some(0.0);
                    }
                }
                (None, Some(_)) => bx.margin.left = Some(width_for_margins),
                (Some(_), None) => bx.margin.right = Some(width_for_margins),
                (Some(_), Some(_)) => {
                    if ltr {
                        bx.margin.right = Some(width_for_margins);
                    } else {
                        bx.margin.left = Some(width_for_margins);
                    }
                }
            }
            translate_x = left + default_translate_x;
        }
        _ => {
            bx.margin.left.get_or_insert(0.0);
            bx.margin.right.get_or_insert(0.0);
            let spacing = paddings_borders + bx.margin_left() + bx.margin_right();
            match (left, right, width) {
                (None, Some(right), None) => {
                    bx.width = Some(shrink_to_fit(ctx, bx, cb.width - spacing - right));
                    translate_x = cb.width - right - spacing + default_translate_x;
                    translate_box_width = true;
                }
                (None, None, Some(_)) => {
                    if !ltr {
                        let available = cb.width - spacing;
                        translate_box_width = true;
                        translate_x = default_translate_x + available;
                    }
                }
                (Some(left), None, None) => {
                    bx.width = Some(shrink_to_fit(ctx, bx, cb.width - spacing - left));
                    translate_x = left + default_translate_x;
                }
                (None, Some(right), Some(width)) => {
                    translate_x = cb.width + default_translate_x - right - spacing - width;
                }
                (Some(left), Some(right), None) => {
                    bx.width = Some(cb.width - right - left - spacing);
                    translate_x = left + default_translate_x;
                }
                (Some(left), None, Some(_)) => {
                    translate_x = left + default_translate_x;
                }
                _ => {}
            }
        }
    }
    (translate_box_width, translate_x)
}

/// Vertical part of §10.6.4, same return convention as [`absolute_width`].
fn absolute_height(bx: &mut LayoutBox, cb: &ContainingBlock) -> (bool, f64) {
    let paddings_borders = bx.padding.top + bx.padding.bottom + bx.border.top + bx.border.bottom;
    let (margin_top, margin_bottom) = (bx.margin.top, bx.margin.bottom);
    let (top, bottom, height) = (bx.offsets.top, bx.offsets.bottom, bx.height);
    let cb_height = cb.height.unwrap_or(0.0);

    let default_translate_y = cb.y - bx.position_y;
    let mut translate_y = 0.0;
    let mut translate_box_height = false;

    match (top, bottom, height) {
        (None, None, None) => {
            // Static position.
            bx.margin.top.get_or_insert(0.0);
            bx.margin.bottom.get_or_insert(0.0);
        }
        (Some(top), Some(bottom), Some(height)) => {
            let height_for_margins = cb_height - (top + bottom + height + paddings_borders);
            match (margin_top, margin_bottom) {
                (None, None) => {
                    bx.margin.top = Some(height_for_margins / 2.0);
                    bx.margin.bottom = Some(height_for_margins / 2.0);
                }
                (None, Some(_)) => bx.margin.top = Some(height_for_margins),
                _ => bx.margin.bottom = Some(height_for_margins),
            }
            translate_y = top + default_translate_y;
        }
        _ => {
            bx.margin.top.get_or_insert(0.0);
            bx.margin.bottom.get_or_insert(0.0);
            let spacing = paddings_borders + bx.margin_top() + bx.margin_bottom();
            match (top, bottom, height) {
                (None, Some(bottom), None) => {
                    translate_y = cb_height - bottom - spacing + default_translate_y;
                    translate_box_height = true;
                }
                (None, None, Some(_)) => {}
                (Some(top), None, None) => translate_y = top + default_translate_y,
                (None, Some(bottom), Some(height)) => {
                    translate_y = cb_height + default_translate_y - bottom - spacing - height;
                }
                (Some(top), Some(bottom), None) => {
                    bx.height = Some(cb_height - bottom - top - spacing);
                    translate_y = top + default_translate_y;
                }
                (Some(top), None, Some(_)) => translate_y = top + default_translate_y,
                _ => {}
            }
        }
    }
    (translate_box_height, translate_y)
}

/// §10.3.8 and §10.6.5: absolutely positioned replaced boxes.
fn absolute_replaced(bx: &mut LayoutBox, cb: &ContainingBlock) {
    replaced_width_height(bx);
    let ltr = cb.direction == Direction::Ltr;
    let cb_height = cb.height.unwrap_or(0.0);

    let (mut left, mut right) = (bx.offsets.left, bx.offsets.right);
    if left.is_none() && right.is_none() {
        if ltr {
            left = Some(bx.position_x - cb.x);
        } else {
            right = Some(cb.x + cb.width - bx.position_x);
        }
    }
    match (left, right) {
        (Some(l), Some(r)) => match (bx.margin.left, bx.margin.right) {
            (None, None) => {
                let remaining = cb.width - (bx.border_width() + l + r);
                if remaining >= 0.0 {
                    bx.margin.left = Some(remaining / 2.0);
                    bx.margin.right = Some(remaining / 2.0);
                } else if ltr {
                    bx.margin.left = Some(0.0);
                    bx.margin.right = Some(remaining);
                } else {
                    bx.margin.left = Some(remaining);
                    bx.margin.right = Some(0.0);
                }
            }
            (None, Some(_)) => bx.margin.left = Some(cb.width - (bx.border_width() + l + r) - bx.margin_right()),
            (Some(_), None) => bx.margin.right = Some(cb.width - (bx.border_width() + l + r) - bx.margin_left()),
            (Some(_), Some(_)) => {
                // Over-constrained.
                if ltr {
                    right = Some(cb.width - (bx.margin_width() + l));
                } else {
                    left = Some(cb.width - (bx.margin_width() + r));
                }
            }
        },
        _ => {
            bx.margin.left.get_or_insert(0.0);
            bx.margin.right.get_or_insert(0.0);
            let remaining = cb.width - bx.margin_width();
            match (left, right) {
                (None, Some(r)) => left = Some(remaining - r),
                (Some(l), None) => right = Some(remaining - l),
                _ => {}
            }
        }
    }

    let (mut top, mut bottom) = (bx.offsets.top, bx.offsets.bottom);
    if top.is_none() && bottom.is_none() {
        top = Some(bx.position_y - cb.y);
    }
    match (top, bottom) {
        (Some(t), Some(b)) => match (bx.margin.top, bx.margin.bottom) {
            (None, None) => {
                let remaining = cb_height - (bx.border_height() + t + b);
                bx.margin.top = Some(remaining / 2.0);
                bx.margin.bottom = Some(remaining / 2.0);
            }
            (None, Some(_)) => bx.margin.top = Some(cb_height - (bx.border_height() + t + b) - bx.margin_bottom()),
            (Some(_), None) => bx.margin.bottom = Some(cb_height - (bx.border_height() + t + b) - bx.margin_top()),
            (Some(_), Some(_)) => bottom = Some(cb_height - (bx.margin_height() + t)),
        },
        _ => {
            bx.margin.top.get_or_insert(0.0);
            bx.margin.bottom.get_or_insert(0.0);
            let remaining = cb_height - bx.margin_height();
            match (top, bottom) {
                (None, Some(b)) => top = Some(remaining - b),
                (Some(t), None) => bottom = Some(remaining - t),
                _ => {}
            }
        }
    }

    bx.offsets.left = left;
    bx.offsets.right = right;
    bx.offsets.top = top;
    bx.offsets.bottom = bottom;
    bx.position_x = cb.x + left.unwrap_or(0.0);
    bx.position_y = cb.y + top.unwrap_or(0.0);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::boxes::ReplacedData;
    use crate::layout::tests::{context, id, line, text};
    use crate::style::{Dimension, Position, Style};
    use std::rc::Rc;

    fn cb() -> ContainingBlock {
        ContainingBlock {
            x: 10.0,
            y: 20.0,
            width: 200.0,
            height: Some(300.0),
            direction: Direction::Ltr,
            is_for_root_element: false,
        }
    }

    fn absolute(style: Style, content: &str) -> LayoutBox {
        let style = Style {
            position: Some(Position::Absolute),
            ..style
        };
        LayoutBox::new(id(), BoxKind::Block, Rc::new(style.resolve(None)))
            .with_children(vec![line(vec![text(content)])])
    }

    #[test]
    fn offsets_place_the_box_in_the_containing_block() {
        let mut ctx = context(1000.0);
        let bx = absolute(
            Style {
                top: Some(Dimension::Pt(5.0)),
                left: Some(Dimension::Pt(7.0)),
                ..Default::default()
            },
            "abc",
        );
        let mut fixed = Vec::new();
        let (laid_out, resume) = absolute_box_layout(&mut ctx, bx, &cb(), &mut fixed, 0.0, None).unwrap();
        assert!(resume.is_none());
        assert_eq!((laid_out.position_x, laid_out.position_y), (17.0, 25.0));
        // Shrink-to-fit: "abc" is 18pt wide.
        assert_eq!(laid_out.width, Some(18.0));
    }

    #[test]
    fn right_and_bottom_offsets_anchor_the_far_edges() {
        let mut ctx = context(1000.0);
        let bx = absolute(
            Style {
                right: Some(Dimension::Pt(10.0)),
                bottom: Some(Dimension::Pt(10.0)),
                height: Some(Dimension::Pt(30.0)),
                ..Default::default()
            },
            "abcd",
        );
        let mut fixed = Vec::new();
        let (laid_out, _) = absolute_box_layout(&mut ctx, bx, &cb(), &mut fixed, 0.0, None).unwrap();
        // 10 + 200 - 10 - 24
        assert_eq!(laid_out.position_x, 176.0);
        // 20 + 300 - 10 - 30
        assert_eq!(laid_out.position_y, 280.0);
    }

    #[test]
    fn static_position_is_kept_without_offsets() {
        let mut ctx = context(1000.0);
        let mut bx = absolute(Style::default(), "ab");
        bx.position_x = 40.0;
        bx.position_y = 60.0;
        let mut fixed = Vec::new();
        let (laid_out, _) = absolute_box_layout(&mut ctx, bx, &cb(), &mut fixed, 0.0, None).unwrap();
        assert_eq!((laid_out.position_x, laid_out.position_y), (40.0, 60.0));
    }

    #[test]
    fn replaced_boxes_use_their_intrinsic_size() {
        let mut ctx = context(1000.0);
        let style = Style {
            position: Some(Position::Absolute),
            left: Some(Dimension::Pt(5.0)),
            top: Some(Dimension::Pt(5.0)),
            ..Default::default()
        };
        let image = LayoutBox::new(
            id(),
            BoxKind::Replaced(ReplacedData {
                intrinsic_width: 40.0,
                intrinsic_height: 20.0,
            }),
            Rc::new(style.resolve(None)),
        );
        let mut fixed = Vec::new();
        let (laid_out, _) = absolute_box_layout(&mut ctx, image, &cb(), &mut fixed, 0.0, None).unwrap();
        assert_eq!((laid_out.width, laid_out.height), (Some(40.0), Some(20.0)));
        assert_eq!((laid_out.position_x, laid_out.position_y), (15.0, 25.0));
    }

    #[test]
    fn placeholders_are_resolved_in_place() {
        let mut ctx = context(1000.0);
        let bx = absolute(
            Style {
                top: Some(Dimension::Pt(0.0)),
                left: Some(Dimension::Pt(0.0)),
                ..Default::default()
            },
            "x",
        );
        let target = bx.id;
        let mut tree = LayoutBox::new(id(), BoxKind::Block, Rc::new(Default::default()))
            .with_children(vec![LayoutBox::placeholder(bx)]);
        let mut fixed = Vec::new();
        absolute_layout(&mut ctx, &mut tree, &[target], &cb(), &mut fixed, 0.0).unwrap();
        match &tree.children[0].kind {
            BoxKind::Placeholder(state) => {
                assert!(state.is_done());
                assert_eq!(state.boxed().position_x, 10.0);
            }
            other => panic!("expected a placeholder, got {}", other.name()),
        }
        // A second resolution is an invariant violation.
        let err = lay_out_placeholder(&mut ctx, &mut tree, target, &cb(), &mut fixed, 0.0).unwrap_err();
        assert_eq!(err, LayoutError::PlaceholderAlreadyResolved(target));
    }
}
