//! # Floats and Clearance
//!
//! Each block formatting context keeps the margin boxes of the floats placed
//! in it so far (the *excluded shapes*). Later content consults them: line
//! boxes and other boxes that cannot overlap floats are moved sideways or
//! down by [`ExclusionStore::avoid_collisions`], and boxes with `clear` get
//! pushed below them by [`ExclusionStore::clearance`].
//!
//! Shapes are copies of the float geometry keyed by box id. When an already
//! placed subtree moves, the caller moves the shapes of its floats with
//! [`ExclusionStore::translate_floats_in`].

use log::warn;

use crate::boxes::{BoxId, BoxKind, LayoutBox};
use crate::error::LayoutResult;
use crate::style::{Clear, Direction, Display, Float, Overflow};

use super::block::block_container_layout;
use super::percentages::{
    replaced_width_height, resolve_percentages, resolve_position_percentages, with_min_max_width,
};
use super::preferred::shrink_to_fit;
use super::resume::ResumeStack;
use super::strategy::StrategyKind;
use super::{ContainingBlock, LayoutContext};

/// The margin box of a placed float.
#[derive(Debug, Clone, PartialEq)]
pub struct ExcludedShape {
    pub id: BoxId,
    pub position_x: f64,
    pub position_y: f64,
    pub margin_width: f64,
    pub margin_height: f64,
    pub side: Float,
}

impl ExcludedShape {
    pub fn of(bx: &LayoutBox) -> Self {
        Self {
            id: bx.id,
            position_x: bx.position_x,
            position_y: bx.position_y,
            margin_width: bx.margin_width(),
            margin_height: bx.margin_height(),
            side: bx.style.float,
        }
    }

    pub fn bottom(&self) -> f64 {
        self.position_y + self.margin_height
    }
}

/// Excluded shapes of the nested block formatting contexts, innermost last.
#[derive(Debug, Clone, Default)]
pub struct ExclusionStore {
    contexts: Vec<Vec<ExcludedShape>>,
}

impl ExclusionStore {
    pub fn push_context(&mut self) {
        self.contexts.push(Vec::new());
    }

    pub fn pop_context(&mut self) -> Vec<ExcludedShape> {
        self.contexts.pop().unwrap_or_default()
    }

    /// Shapes of the current formatting context.
    pub fn shapes(&self) -> &[ExcludedShape] {
        self.contexts.last().map_or(&[], Vec::as_slice)
    }

    pub fn add(&mut self, shape: ExcludedShape) {
        match self.contexts.last_mut() {
            Some(shapes) => shapes.push(shape),
            None => self.contexts.push(vec![shape]),
        }
    }

    pub fn len(&self) -> usize {
        self.shapes().len()
    }

    pub fn is_empty(&self) -> bool {
        self.shapes().is_empty()
    }

    pub fn last(&self) -> Option<&ExcludedShape> {
        self.shapes().last()
    }

    /// Forget the shapes added to the current context after the first `len`.
    pub fn truncate(&mut self, len: usize) {
        if let Some(shapes) = self.contexts.last_mut() {
            shapes.truncate(len);
        }
    }

    /// Move the shape of `id`, wherever it is.
    pub fn translate(&mut self, id: BoxId, dx: f64, dy: f64) {
        for shape in self.contexts.iter_mut().flatten().filter(|s| s.id == id) {
            shape.position_x += dx;
            shape.position_y += dy;
        }
    }

    /// Move the shapes of the floats inside `bx` (and of `bx` itself) after
    /// `bx` was translated by `(dx, dy)`.
    pub fn translate_floats_in(&mut self, bx: &LayoutBox, dx: f64, dy: f64, ignore_floats: bool) {
        if self.contexts.iter().all(Vec::is_empty) || (dx == 0.0 && dy == 0.0) {
            return;
        }
        if bx.is_floated() {
            self.translate(bx.id, dx, dy);
        }
        self.translate_descendants(bx, dx, dy, ignore_floats);
    }

    fn translate_descendants(&mut self, bx: &LayoutBox, dx: f64, dy: f64, ignore_floats: bool) {
        for child in bx.traversal_children() {
            if child.is_floated() {
                if ignore_floats {
                    continue;
                }
                self.translate(child.id, dx, dy);
            }
            self.translate_descendants(child, dx, dy, ignore_floats);
        }
    }

    /// Clearance needed to put the top border edge of `bx` below the floats
    /// it clears, given the margins collapsing above it. `None` when the box
    /// has no clearance.
    pub fn clearance(&self, bx: &LayoutBox, collapsed_margin: f64) -> Option<f64> {
        let hypothetical_position = bx.position_y + collapsed_margin;
        let mut clearance: Option<f64> = None;
        for shape in self.shapes() {
            let clears = match bx.style.clear {
                Clear::None => false,
                Clear::Both => true,
                Clear::Left => shape.side == Float::Left,
                Clear::Right => shape.side == Float::Right,
            };
            if clears && hypothetical_position < shape.bottom() {
                let needed = shape.bottom() - hypothetical_position;
                clearance = Some(clearance.map_or(needed, |c| c.max(needed)));
            }
        }
        clearance
    }

    /// Find where `bx` fits without overlapping the floats of the current
    /// context. Returns `(position_x, position_y, available_width)`.
    ///
    /// With `outer` the margin box is placed, otherwise the border box (and
    /// the returned position is still the margin box corner).
    pub fn avoid_collisions(&self, bx: &LayoutBox, cb: &ContainingBlock, outer: bool) -> (f64, f64, f64) {
        let (mut position_y, box_width, box_height) = if outer {
            (bx.position_y, bx.margin_width(), bx.margin_height())
        } else {
            (bx.border_box_y(), bx.border_width(), bx.border_height())
        };

        // Empty floats take no room and are left where they are.
        if bx.border_height() == 0.0 && bx.is_floated() {
            return (0.0, 0.0, cb.width);
        }

        let (mut max_left_bound, mut max_right_bound);
        loop {
            let colliding: Vec<&ExcludedShape> = self
                .shapes()
                .iter()
                .filter(|shape| {
                    let top = shape.position_y;
                    let bottom = shape.bottom();
                    (top < position_y && position_y < bottom)
                        || (top < position_y + box_height && position_y + box_height < bottom)
                        || (top >= position_y && bottom <= position_y + box_height)
                })
                .collect();

            max_left_bound = cb.x;
            max_right_bound = cb.x + cb.width;
            if !outer {
                max_left_bound += bx.margin_left();
                max_right_bound -= bx.margin_right();
            }

            let left_bounds = colliding
                .iter()
                .filter(|s| s.side == Float::Left)
                .map(|s| s.position_x + s.margin_width);
            let right_bounds = colliding
                .iter()
                .filter(|s| s.side == Float::Right)
                .map(|s| s.position_x);
            max_left_bound = left_bounds.fold(max_left_bound, f64::max);
            max_right_bound = right_bounds.fold(max_right_bound, f64::min);

            if !colliding.is_empty() && box_width > max_right_bound - max_left_bound {
                let lowest = colliding
                    .iter()
                    .map(|s| s.bottom())
                    .fold(f64::INFINITY, f64::min);
                if lowest > position_y {
                    position_y = lowest;
                    continue;
                }
                // No room anywhere below: stay here and overflow.
            }
            break;
        }

        let mut position_x = max_left_bound;
        if bx.style.float == Float::None && cb.direction == Direction::Rtl {
            position_x = if bx.is_line_box() {
                // Lines start at the cursor, on the right bound.
                max_right_bound
            } else {
                max_right_bound - box_width
            };
        }

        let available_width = max_right_bound - max_left_bound;
        if !outer {
            position_x -= bx.margin_left();
            position_y -= bx.margin_top();
        }
        (position_x, position_y, available_width)
    }
}

/// Whether `bx` establishes a new block formatting context.
pub fn establishes_formatting_context(bx: &LayoutBox) -> bool {
    bx.is_floated()
        || bx.is_absolutely_positioned()
        || (bx.is_block_container() && !matches!(bx.kind, BoxKind::Block))
        || matches!(bx.kind, BoxKind::Flex | BoxKind::Grid | BoxKind::TableWrapper)
        || (matches!(bx.kind, BoxKind::Block) && bx.style.overflow != Overflow::Visible)
        || bx.style.display == Display::FlowRoot
}

/// Close the formatting context established by `bx`. A box with an auto
/// height grows to contain its floats.
pub fn finish_formatting_context(ctx: &mut LayoutContext, bx: &mut LayoutBox) {
    if bx.style.height.is_auto() {
        let lowest = ctx
            .shapes
            .shapes()
            .iter()
            .map(ExcludedShape::bottom)
            .fold(f64::NEG_INFINITY, f64::max);
        if lowest.is_finite() {
            let box_bottom = bx.content_box_y() + bx.content_height();
            if lowest > box_bottom {
                bx.height = Some(bx.content_height() + lowest - box_bottom);
            }
        }
    }
    ctx.shapes.pop_context();
}

/// Set the width and position of a floated box, and lay out its contents.
///
/// The returned resume stack is set when the float itself was cut by the
/// page end.
#[allow(clippy::too_many_arguments)]
pub fn float_layout(
    ctx: &mut LayoutContext,
    mut bx: LayoutBox,
    cb: &ContainingBlock,
    absolute_boxes: &mut Vec<BoxId>,
    fixed_boxes: &mut Vec<BoxId>,
    bottom_space: f64,
    skip_stack: Option<&ResumeStack>,
) -> LayoutResult<(LayoutBox, Option<ResumeStack>)> {
    resolve_percentages(&mut bx, cb.width, cb.height);
    resolve_position_percentages(&mut bx, cb.width, cb.height.unwrap_or(0.0));
    for margin in [
        &mut bx.margin.top,
        &mut bx.margin.right,
        &mut bx.margin.bottom,
        &mut bx.margin.left,
    ] {
        margin.get_or_insert(0.0);
    }

    if let Some(clearance) = ctx.shapes.clearance(&bx, 0.0) {
        bx.position_y += clearance;
    }

    if matches!(bx.kind, BoxKind::Replaced(_)) {
        replaced_width_height(&mut bx);
    } else if bx.width.is_none() {
        let measuring: &LayoutContext = ctx;
        let available = cb.width - horizontal_decoration(&bx);
        with_min_max_width(&mut bx, |b| {
            if b.width.is_none() {
                b.width = Some(shrink_to_fit(measuring, b, available));
            }
        });
    }

    let mut resume_at = None;
    if bx.is_block_container() {
        let source = bx.clone();
        let mut adjoining = Vec::new();
        let (laid_out, result) = block_container_layout(
            ctx,
            bx,
            bottom_space,
            skip_stack,
            true,
            absolute_boxes,
            fixed_boxes,
            &mut adjoining,
            false,
        )?;
        bx = match laid_out {
            Some(laid_out) => laid_out,
            None => {
                warn!("float {:?} produced no fragment, keeping it empty", source.id);
                let mut empty = source.copy_with_children(Vec::new());
                empty.height = Some(0.0);
                empty
            }
        };
        resume_at = result.resume_at;
    } else if let Some(kind) = strategy_kind(&bx) {
        if let Some(strategy) = ctx.strategy(kind) {
            let (laid_out, result) = strategy.layout(
                ctx,
                bx.clone(),
                bottom_space,
                skip_stack,
                cb,
                true,
                absolute_boxes,
                fixed_boxes,
            )?;
            if let Some(laid_out) = laid_out {
                bx = laid_out;
            }
            resume_at = result.resume_at;
        }
    }

    find_float_position(ctx, &mut bx, cb);
    ctx.shapes.add(ExcludedShape::of(&bx));
    Ok((bx, resume_at))
}

/// Horizontal margins, borders and padding of a box.
pub(crate) fn horizontal_decoration(bx: &LayoutBox) -> f64 {
    bx.margin_left() + bx.margin_right() + bx.border.left + bx.border.right + bx.padding.left + bx.padding.right
}

pub(crate) fn strategy_kind(bx: &LayoutBox) -> Option<StrategyKind> {
    match bx.kind {
        BoxKind::Flex => Some(StrategyKind::Flex),
        BoxKind::Grid => Some(StrategyKind::Grid),
        BoxKind::TableWrapper => Some(StrategyKind::Table),
        _ => None,
    }
}

/// Move a laid-out float to its final position.
fn find_float_position(ctx: &LayoutContext, bx: &mut LayoutBox, cb: &ContainingBlock) {
    // A float is never placed higher than an earlier float.
    if let Some(last) = ctx.shapes.last() {
        if bx.position_y < last.position_y {
            let dy = last.position_y - bx.position_y;
            bx.translate(0.0, dy, false);
        }
    }

    let (mut position_x, position_y, available_width) = ctx.shapes.avoid_collisions(bx, cb, true);
    if bx.style.float == Float::Right {
        position_x += available_width - bx.margin_width();
    }
    let (dx, dy) = (position_x - bx.position_x, position_y - bx.position_y);
    bx.translate(dx, dy, false);
}
