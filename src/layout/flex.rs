//! # Flex Rows
//!
//! [`FlexRowStrategy`] lays a flex container out as a single row. Items get
//! their flex basis (the `width`, or the max-content width when it is
//! `auto`), then share the free space according to `flex-grow`, or give up
//! the missing space according to `flex-shrink`. Items with an auto height
//! are stretched to the height of the row.
//!
//! The row is monolithic: it is never split between pages. When it does not
//! fit and the page already holds content, the whole row moves to the next
//! page.

use std::rc::Rc;

use log::{debug, warn};

use crate::boxes::{BoxId, BoxKind, LayoutBox};
use crate::error::LayoutResult;
use crate::style::{ComputedStyle, Dimension, Direction, Position};

use super::absolute::absolute_layout;
use super::block::block_level_layout;
use super::float::{finish_formatting_context, horizontal_decoration};
use super::percentages::{block_level_width, resolve_percentages};
use super::preferred::max_content_width;
use super::resume::ResumeStack;
use super::strategy::LayoutStrategy;
use super::{BlockLayout, ContainingBlock, LayoutContext, PageBreak};

/// Distribute remaining space among items based on flex-grow factors.
pub fn distribute_grow(items: &mut [(f64, f64)], remaining: f64) {
    // items: [(current_width, flex_grow)]
    let total_grow: f64 = items.iter().map(|(_, g)| g).sum();
    if total_grow <= 0.0 || remaining <= 0.0 {
        return;
    }
    for (width, grow) in items.iter_mut() {
        *width += remaining * (*grow / total_grow);
    }
}

/// Shrink items to fit within available space based on flex-shrink factors.
pub fn distribute_shrink(items: &mut [(f64, f64)], overflow: f64) {
    // items: [(current_width, flex_shrink)]
    let total_shrink_weighted: f64 = items.iter().map(|(w, s)| w * s).sum();
    if total_shrink_weighted <= 0.0 || overflow >= 0.0 {
        return;
    }
    let overflow = overflow.abs();
    for (width, shrink) in items.iter_mut() {
        let factor = (*width * *shrink) / total_shrink_weighted;
        *width -= overflow * factor;
        *width = width.max(0.0);
    }
}

/// Single-line, monolithic flex row layout.
#[derive(Debug, Clone, Copy, Default)]
pub struct FlexRowStrategy;

/// A flex item and its sizes along the row.
struct FlexItem {
    bx: LayoutBox,
    /// Horizontal margins, borders and padding.
    decoration: f64,
    main_size: f64,
}

impl LayoutStrategy for FlexRowStrategy {
    fn layout(
        &self,
        ctx: &mut LayoutContext,
        mut bx: LayoutBox,
        bottom_space: f64,
        skip_stack: Option<&ResumeStack>,
        cb: &ContainingBlock,
        page_is_empty: bool,
        absolute_boxes: &mut Vec<BoxId>,
        fixed_boxes: &mut Vec<BoxId>,
    ) -> LayoutResult<(Option<LayoutBox>, BlockLayout)> {
        if let Some(skip_stack) = skip_stack {
            warn!("flex row {:?} cannot resume at {}, laying it out whole", bx.id, skip_stack);
        }
        if bx.width.is_none() || bx.margin.left.is_none() || bx.margin.right.is_none() {
            block_level_width(&mut bx, cb);
        }
        let checkpoint = ctx.checkpoint();
        ctx.shapes.push_context();

        let row = ContainingBlock::content_of(&bx);
        let gap = bx.style.column_gap;

        // Out-of-flow boxes are registered with the row's result only.
        let mut absolutes = Vec::new();
        let mut fixed = Vec::new();
        let mut placeholders: Vec<(usize, LayoutBox)> = Vec::new();
        let mut items: Vec<(usize, FlexItem)> = Vec::new();

        for (index, source) in bx.children.iter().enumerate() {
            let mut child = source.clone();
            child.index = index;
            child.position_x = row.x;
            child.position_y = row.y;

            if child.is_absolutely_positioned() {
                if child.style.position == Position::Fixed {
                    fixed.push(child.id);
                } else {
                    absolutes.push(child.id);
                }
                placeholders.push((index, LayoutBox::placeholder(child)));
                continue;
            }
            if child.is_running() {
                ctx.add_running(child);
                continue;
            }
            if !child.is_block_level() {
                warn!("{} box {:?} cannot be a flex item, dropping it", child.kind.name(), child.id);
                continue;
            }
            if child.is_floated() {
                // Floats do not apply to flex items.
                child.style = Rc::new(child.style.in_flow());
            }

            let mut measured = child.clone();
            resolve_percentages(&mut measured, row.width, row.height);
            let basis = match (measured.width, &measured.kind) {
                (Some(width), _) => width,
                (None, BoxKind::Replaced(data)) => data.intrinsic_width,
                (None, _) => max_content_width(ctx, &child, false),
            };
            let main_size = basis.min(measured.max_width).max(measured.min_width);
            items.push((
                index,
                FlexItem {
                    bx: child,
                    decoration: horizontal_decoration(&measured),
                    main_size,
                },
            ));
        }

        let gaps = gap * items.len().saturating_sub(1) as f64;
        let used: f64 = items.iter().map(|(_, item)| item.main_size + item.decoration).sum();
        let free_space = row.width - used - gaps;
        let mut sizes: Vec<(f64, f64)> = if free_space > 0.0 {
            items
                .iter()
                .map(|(_, item)| (item.main_size, item.bx.style.flex_grow))
                .collect()
        } else {
            items
                .iter()
                .map(|(_, item)| (item.main_size, item.bx.style.flex_shrink))
                .collect()
        };
        if free_space > 0.0 {
            distribute_grow(&mut sizes, free_space);
        } else {
            distribute_shrink(&mut sizes, free_space);
        }
        debug!(
            "flex row {:?}: {} items, free space {:.2}",
            bx.id,
            items.len(),
            free_space
        );

        let rtl = bx.style.direction == Direction::Rtl;
        // Items are placed explicitly, the width equation must not move them.
        let item_cb = ContainingBlock {
            direction: Direction::Ltr,
            ..row
        };
        let mut cursor = if rtl { row.x + row.width } else { row.x };
        let mut laid_out_items: Vec<(usize, LayoutBox)> = Vec::with_capacity(items.len());
        for ((index, item), (main_size, _)) in items.into_iter().zip(sizes) {
            let mut child = item.bx;
            let style = ComputedStyle {
                width: Dimension::Pt(main_size),
                ..(*child.style).clone()
            };
            child.style = Rc::new(style);
            child.is_flex_item = true;
            child.position_x = if rtl {
                cursor - main_size - item.decoration
            } else {
                cursor
            };
            child.position_y = row.y;

            // Items are monolithic: nothing inside them breaks.
            let (laid_out, _) = block_level_layout(
                ctx,
                &child,
                f64::NEG_INFINITY,
                None,
                &item_cb,
                true,
                &mut absolutes,
                &mut fixed,
                &mut Vec::new(),
                false,
            )?;
            let Some(laid_out) = laid_out else {
                continue;
            };
            if rtl {
                cursor -= laid_out.margin_width() + gap;
            } else {
                cursor += laid_out.margin_width() + gap;
            }
            laid_out_items.push((index, laid_out));
        }

        let line_cross_size = laid_out_items
            .iter()
            .map(|(_, item)| item.margin_height())
            .fold(0.0, f64::max);
        let cross_size = bx.height.unwrap_or(line_cross_size);
        for (_, item) in laid_out_items.iter_mut() {
            let stretches = item.style.height.is_auto() && !matches!(item.kind, BoxKind::Replaced(_));
            if stretches {
                let decoration = item.margin_height() - item.content_height();
                item.height = Some((cross_size - decoration).max(item.content_height()));
            }
        }

        let mut children: Vec<(usize, LayoutBox)> = laid_out_items;
        children.extend(placeholders);
        children.sort_by_key(|(index, _)| *index);
        bx = bx.copy_with_children(children.into_iter().map(|(_, child)| child).collect());
        bx.height = Some(cross_size.min(bx.max_height).max(bx.min_height));

        finish_formatting_context(ctx, &mut bx);

        if !page_is_empty && ctx.overflows_page(bottom_space, bx.position_y + bx.margin_height()) {
            debug!("flex row {:?} does not fit, moving it to the next page", bx.id);
            ctx.rollback(checkpoint);
            return Ok((None, BlockLayout::finished(PageBreak::any())));
        }

        if bx.style.position == Position::Relative {
            let padding_box = ContainingBlock::padding_of(&bx);
            absolute_layout(ctx, &mut bx, &absolutes, &padding_box, &mut fixed, bottom_space)?;
        } else {
            absolute_boxes.extend(absolutes);
        }
        fixed_boxes.extend(fixed);
        Ok((Some(bx), BlockLayout::finished(PageBreak::any())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout::tests::{context, id};
    use crate::style::{EdgeValues, Style};

    #[test]
    fn test_grow_distribution() {
        let mut items = vec![(100.0, 1.0), (100.0, 2.0)];
        distribute_grow(&mut items, 90.0);
        assert!((items[0].0 - 130.0).abs() < 0.01);
        assert!((items[1].0 - 160.0).abs() < 0.01);
    }

    #[test]
    fn test_shrink_distribution() {
        let mut items = vec![(200.0, 1.0), (100.0, 1.0)];
        distribute_shrink(&mut items, -60.0);
        // 200 gets shrunk more because it's wider
        assert!(items[0].0 < 200.0);
        assert!(items[1].0 < 100.0);
        assert!((items[0].0 + items[1].0 - 240.0).abs() < 0.01);
    }

    fn item(width: f64, height: Option<f64>, grow: f64) -> LayoutBox {
        let style = Style {
            width: Some(Dimension::Pt(width)),
            height: height.map(Dimension::Pt),
            flex_grow: Some(grow),
            ..Default::default()
        }
        .resolve(None);
        LayoutBox::new(id(), BoxKind::Block, Rc::new(style))
    }

    fn row(style: Style, children: Vec<LayoutBox>) -> LayoutBox {
        LayoutBox::new(id(), BoxKind::Flex, Rc::new(style.resolve(None))).with_children(children)
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

    fn lay_out(ctx: &mut LayoutContext, bx: LayoutBox, page_is_empty: bool) -> Option<LayoutBox> {
        FlexRowStrategy
            .layout(ctx, bx, 0.0, None, &cb(300.0), page_is_empty, &mut Vec::new(), &mut Vec::new())
            .unwrap()
            .0
    }

    #[test]
    fn items_grow_into_the_free_space() {
        let mut ctx = context(500.0);
        let flex = row(
            Style {
                column_gap: Some(20.0),
                ..Default::default()
            },
            vec![item(50.0, Some(10.0), 1.0), item(50.0, Some(40.0), 0.0), item(50.0, Some(20.0), 3.0)],
        );
        let laid_out = lay_out(&mut ctx, flex, true).unwrap();
        // 300 - 150 - 2 * 20 = 110 free: 27.5 and 82.5.
        let widths: Vec<f64> = laid_out.children.iter().map(LayoutBox::content_width).collect();
        assert_eq!(widths, vec![77.5, 50.0, 132.5]);
        let xs: Vec<f64> = laid_out.children.iter().map(|c| c.position_x).collect();
        assert_eq!(xs, vec![0.0, 97.5, 167.5]);
        assert_eq!(laid_out.content_height(), 40.0);
    }

    #[test]
    fn items_shrink_when_the_row_overflows() {
        let mut ctx = context(500.0);
        let flex = row(Style::default(), vec![item(200.0, None, 0.0), item(200.0, None, 0.0)]);
        let laid_out = lay_out(&mut ctx, flex, true).unwrap();
        let total: f64 = laid_out.children.iter().map(LayoutBox::content_width).sum();
        assert!((total - 300.0).abs() < 1e-9);
    }

    #[test]
    fn auto_heights_stretch_to_the_row() {
        let mut ctx = context(500.0);
        let flex = row(Style::default(), vec![item(50.0, Some(60.0), 0.0), item(50.0, None, 0.0)]);
        let laid_out = lay_out(&mut ctx, flex, true).unwrap();
        assert_eq!(laid_out.children[1].content_height(), 60.0);
    }

    #[test]
    fn rows_that_do_not_fit_move_whole() {
        let mut ctx = context(50.0);
        let flex = row(
            Style {
                margin: Some(EdgeValues::uniform(Dimension::Pt(0.0))),
                ..Default::default()
            },
            vec![item(50.0, Some(80.0), 0.0)],
        );
        assert!(lay_out(&mut ctx, flex.clone(), false).is_none());
        // At the top of a page the row overflows instead.
        let laid_out = lay_out(&mut ctx, flex, true).unwrap();
        assert_eq!(laid_out.content_height(), 80.0);
    }
}
