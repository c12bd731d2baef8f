//! # Used Values
//!
//! Resolves the computed box-model values of a box (which may be percentages
//! or `auto`) against its containing block, and the width equations shared by
//! block-level boxes.

use crate::boxes::{BoxKind, LayoutBox};
use crate::style::{Direction, Position};

use super::ContainingBlock;

/// Set the used margins, padding, borders and sizes of `bx`.
///
/// `cb_height` is `None` when the containing block height depends on its
/// content: percentage heights then behave as `auto`.
pub fn resolve_percentages(bx: &mut LayoutBox, cb_width: f64, cb_height: Option<f64>) {
    let style = bx.style.clone();
    // Vertical margins and padding refer to the width, except on pages.
    let vertical_ref = if matches!(bx.kind, BoxKind::Page) {
        cb_height.unwrap_or(0.0)
    } else {
        cb_width
    };

    bx.margin.left = style.margin.left.resolve(cb_width);
    bx.margin.right = style.margin.right.resolve(cb_width);
    bx.margin.top = style.margin.top.resolve(vertical_ref);
    bx.margin.bottom = style.margin.bottom.resolve(vertical_ref);
    bx.padding.left = style.padding.left.resolve(cb_width).unwrap_or(0.0);
    bx.padding.right = style.padding.right.resolve(cb_width).unwrap_or(0.0);
    bx.padding.top = style.padding.top.resolve(vertical_ref).unwrap_or(0.0);
    bx.padding.bottom = style.padding.bottom.resolve(vertical_ref).unwrap_or(0.0);
    bx.border = style.border_width;

    bx.width = style.width.resolve(cb_width);
    bx.min_width = style.min_width.resolve(cb_width).unwrap_or(0.0);
    bx.max_width = style.max_width.resolve(cb_width).unwrap_or(f64::INFINITY);

    match cb_height {
        None => {
            bx.height = style.height.fixed();
            bx.min_height = style.min_height.fixed().unwrap_or(0.0);
            bx.max_height = style.max_height.fixed().unwrap_or(f64::INFINITY);
        }
        Some(cb_height) => {
            bx.height = style.height.resolve(cb_height);
            bx.min_height = style.min_height.resolve(cb_height).unwrap_or(0.0);
            bx.max_height = style.max_height.resolve(cb_height).unwrap_or(f64::INFINITY);
        }
    }
}

/// Resolve `top`, `right`, `bottom` and `left`.
pub fn resolve_position_percentages(bx: &mut LayoutBox, cb_width: f64, cb_height: f64) {
    let style = bx.style.clone();
    bx.offsets.left = style.left.resolve(cb_width);
    bx.offsets.right = style.right.resolve(cb_width);
    bx.offsets.top = style.top.resolve(cb_height);
    bx.offsets.bottom = style.bottom.resolve(cb_height);
}

/// Run a width computation, then run it again clamped to `max-width` and
/// `min-width` when the result violates them.
pub fn with_min_max_width<T>(bx: &mut LayoutBox, mut compute: impl FnMut(&mut LayoutBox) -> T) -> T {
    let (margin_left, margin_right) = (bx.margin.left, bx.margin.right);
    let mut result = compute(bx);
    if bx.content_width() > bx.max_width {
        bx.width = Some(bx.max_width);
        bx.margin.left = margin_left;
        bx.margin.right = margin_right;
        result = compute(bx);
    }
    if bx.content_width() < bx.min_width {
        bx.width = Some(bx.min_width);
        bx.margin.left = margin_left;
        bx.margin.right = margin_right;
        result = compute(bx);
    }
    result
}

/// The block-level width equation of CSS 2.1 §10.3.3, honouring min and max
/// widths.
pub fn block_level_width(bx: &mut LayoutBox, cb: &ContainingBlock) {
    with_min_max_width(bx, |bx| block_level_width_unclamped(bx, cb.width, cb.direction));
}

fn block_level_width_unclamped(bx: &mut LayoutBox, cb_width: f64, direction: Direction) {
    let mut margin_left = bx.margin.left;
    let mut margin_right = bx.margin.right;
    let paddings_plus_borders = bx.padding.left + bx.padding.right + bx.border.left + bx.border.right;

    if let Some(width) = bx.width {
        let total = paddings_plus_borders + width + margin_left.unwrap_or(0.0) + margin_right.unwrap_or(0.0);
        if total > cb_width {
            margin_left = margin_left.or(Some(0.0));
            margin_right = margin_right.or(Some(0.0));
        }
        if let (Some(left), Some(right)) = (margin_left, margin_right) {
            // Over-constrained: the end margin gives way.
            if direction == Direction::Rtl {
                bx.position_x += cb_width - paddings_plus_borders - width - right - left;
            }
        }
    }
    let width = match bx.width {
        Some(width) => width,
        None => {
            margin_left = margin_left.or(Some(0.0));
            margin_right = margin_right.or(Some(0.0));
            let width = cb_width
                - (paddings_plus_borders + margin_left.unwrap_or(0.0) + margin_right.unwrap_or(0.0));
            bx.width = Some(width);
            width
        }
    };
    let margin_sum = cb_width - paddings_plus_borders - width;
    match (margin_left, margin_right) {
        (None, None) => {
            margin_left = Some(margin_sum / 2.0);
            margin_right = Some(margin_sum / 2.0);
        }
        (None, Some(right)) => margin_left = Some(margin_sum - right),
        (Some(left), None) => margin_right = Some(margin_sum - left),
        _ => {}
    }
    bx.margin.left = margin_left;
    bx.margin.right = margin_right;
}

/// Used width and height of a replaced box: the intrinsic size, scaled to
/// keep the intrinsic ratio when only one dimension is given, then clamped
/// by the min and max constraints.
pub fn replaced_width_height(bx: &mut LayoutBox) {
    let BoxKind::Replaced(data) = &bx.kind else {
        return;
    };
    let (intrinsic_width, intrinsic_height) = (data.intrinsic_width, data.intrinsic_height);
    let ratio = (intrinsic_height > 0.0).then(|| intrinsic_width / intrinsic_height);

    let (width, height) = match (bx.width, bx.height) {
        (Some(width), Some(height)) => (width, height),
        (Some(width), None) => (width, ratio.map_or(intrinsic_height, |r| width / r)),
        (None, Some(height)) => (ratio.map_or(intrinsic_width, |r| height * r), height),
        (None, None) => (intrinsic_width, intrinsic_height),
    };
    let clamp_width = |w: f64| w.min(bx.max_width).max(bx.min_width);
    let clamp_height = |h: f64| h.min(bx.max_height).max(bx.min_height);
    let mut used_width = clamp_width(width);
    let mut used_height = clamp_height(height);
    if let (Some(ratio), true) = (ratio, bx.style.width.is_auto() && bx.style.height.is_auto()) {
        // Keep the ratio when only one side hit a constraint.
        if used_width != width && used_height == height {
            used_height = clamp_height(used_width / ratio);
        } else if used_height != height && used_width == width {
            used_width = clamp_width(used_height * ratio);
        }
    }
    bx.width = Some(used_width);
    bx.height = Some(used_height);
}

/// Translate a relatively positioned box by its offsets. Inline content of
/// line boxes is handled recursively.
pub fn relative_positioning(bx: &mut LayoutBox, cb_width: f64, cb_height: f64) {
    if bx.style.position == Position::Relative {
        resolve_position_percentages(bx, cb_width, cb_height);
        let dx = match (bx.offsets.left, bx.offsets.right) {
            (Some(left), Some(right)) => {
                if bx.style.direction == Direction::Ltr {
                    left
                } else {
                    -right
                }
            }
            (Some(left), None) => left,
            (None, Some(right)) => -right,
            (None, None) => 0.0,
        };
        let dy = match (bx.offsets.top, bx.offsets.bottom) {
            (Some(top), _) => top,
            (None, Some(bottom)) => -bottom,
            (None, None) => 0.0,
        };
        bx.translate(dx, dy, false);
    }
    if bx.is_line() && !bx.children.is_empty() {
        for child in std::rc::Rc::make_mut(&mut bx.children).iter_mut() {
            relative_positioning(child, cb_width, cb_height);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::boxes::BoxId;
    use crate::style::{Dimension, EdgeValues, Style};
    use std::rc::Rc;

    fn make(style: Style) -> LayoutBox {
        LayoutBox::new(BoxId(0), BoxKind::Block, Rc::new(style.resolve(None)))
    }

    fn cb(width: f64) -> ContainingBlock {
        ContainingBlock {
            x: 0.0,
            y: 0.0,
            width,
            height: None,
            direction: Direction::Ltr,
            is_for_root_element: false,
        }
    }

    #[test]
    fn percentages_refer_to_the_containing_block_width() {
        let mut bx = make(Style {
            width: Some(Dimension::Percent(50.0)),
            height: Some(Dimension::Percent(50.0)),
            margin: Some(EdgeValues::uniform(Dimension::Percent(10.0))),
            ..Default::default()
        });
        resolve_percentages(&mut bx, 200.0, None);
        assert_eq!(bx.width, Some(100.0));
        assert_eq!(bx.margin.top, Some(20.0));
        // unknown containing block height: percentage height is auto
        assert_eq!(bx.height, None);

        resolve_percentages(&mut bx, 200.0, Some(400.0));
        assert_eq!(bx.height, Some(200.0));
    }

    #[test]
    fn auto_width_fills_the_containing_block() {
        let mut bx = make(Style {
            padding: Some(EdgeValues::uniform(Dimension::Pt(5.0))),
            ..Default::default()
        });
        resolve_percentages(&mut bx, 300.0, None);
        block_level_width(&mut bx, &cb(300.0));
        assert_eq!(bx.width, Some(290.0));
    }

    #[test]
    fn auto_margins_center_a_fixed_width() {
        let mut bx = make(Style {
            width: Some(Dimension::Pt(100.0)),
            margin: Some(EdgeValues {
                top: Dimension::Pt(0.0),
                right: Dimension::Auto,
                bottom: Dimension::Pt(0.0),
                left: Dimension::Auto,
            }),
            ..Default::default()
        });
        resolve_percentages(&mut bx, 300.0, None);
        block_level_width(&mut bx, &cb(300.0));
        assert_eq!(bx.margin.left, Some(100.0));
        assert_eq!(bx.margin.right, Some(100.0));
    }

    #[test]
    fn max_width_clamps_and_recomputes() {
        let mut bx = make(Style {
            max_width: Some(Dimension::Pt(120.0)),
            ..Default::default()
        });
        resolve_percentages(&mut bx, 300.0, None);
        block_level_width(&mut bx, &cb(300.0));
        assert_eq!(bx.width, Some(120.0));
        assert_eq!(bx.margin.left, Some(0.0));
    }

    #[test]
    fn replaced_boxes_keep_their_ratio() {
        let style = Style {
            width: Some(Dimension::Pt(50.0)),
            ..Default::default()
        };
        let kind = BoxKind::Replaced(crate::boxes::ReplacedData {
            intrinsic_width: 200.0,
            intrinsic_height: 100.0,
        });
        let mut bx = LayoutBox::new(BoxId(0), kind.clone(), Rc::new(style.resolve(None)));
        resolve_percentages(&mut bx, 300.0, None);
        replaced_width_height(&mut bx);
        assert_eq!((bx.width, bx.height), (Some(50.0), Some(25.0)));

        let capped = Style {
            max_width: Some(Dimension::Pt(100.0)),
            ..Default::default()
        };
        let mut bx = LayoutBox::new(BoxId(0), kind, Rc::new(capped.resolve(None)));
        resolve_percentages(&mut bx, 300.0, None);
        replaced_width_height(&mut bx);
        assert_eq!((bx.width, bx.height), (Some(100.0), Some(50.0)));
    }

    #[test]
    fn relative_offsets_translate_the_box() {
        let mut bx = make(Style {
            position: Some(Position::Relative),
            top: Some(Dimension::Pt(5.0)),
            left: Some(Dimension::Percent(10.0)),
            ..Default::default()
        });
        relative_positioning(&mut bx, 200.0, 100.0);
        assert_eq!((bx.position_x, bx.position_y), (20.0, 5.0));
    }
}
