//! # Block Fragmentation
//!
//! The block container loop. Children are laid out from top to bottom, each
//! one told how much room is left above the page bottom, until one of them
//! does not fit. The loop then stops and reports where to resume:
//!
//! - out-of-flow children leave placeholders (absolute and fixed boxes),
//!   take their place beside the flow (floats) or are remembered for margin
//!   boxes (running elements)
//! - line boxes are cut into lines, honouring `orphans` and `widows`, and
//!   pull the footnotes they call into the footnote area
//! - in-flow block-level children recurse, collapsing their margins with
//!   their siblings and with this box
//!
//! A child that cannot be placed either *stops* the loop (the page ends
//! before it) or *aborts* the whole container (nothing of it goes on this
//! page), as `break-*`, `orphans` and `widows` demand.

use std::rc::Rc;

use log::{debug, warn};

use crate::boxes::{BoxId, BoxKind, LayoutBox, LineData};
use crate::error::{LayoutError, LayoutResult};
use crate::style::{BoxDecorationBreak, BreakValue, FootnotePolicy, MarginBreak, Overflow, Position};

use super::absolute::absolute_layout;
use super::float::{
    establishes_formatting_context, finish_formatting_context, float_layout, strategy_kind, ExcludedShape,
};
use super::footnotes::{layout_footnote, report_footnote, unlayout_footnote};
use super::inline::LineIterator;
use super::margins::collapse_margins;
use super::page_break::{
    block_level_page_break, block_level_page_name_changes, find_earlier_page_break, remove_placeholders,
};
use super::percentages::{block_level_width, relative_positioning, replaced_width_height, resolve_percentages};
use super::resume::ResumeStack;
use super::strategy::{BlockFlowStrategy, LayoutStrategy};
use super::{BlockLayout, BrokenBox, ContainingBlock, LayoutContext, PageBreak};

/// Lay out a block-level box and the part of its content that fits.
///
/// `adjoining_margins` holds the margins collapsing above the box; block
/// containers whose top margin collapses with their first child push onto
/// it. Returns `None` when nothing of the box fits on this page.
#[allow(clippy::too_many_arguments)]
pub fn block_level_layout(
    ctx: &mut LayoutContext,
    bx: &LayoutBox,
    bottom_space: f64,
    skip_stack: Option<&ResumeStack>,
    cb: &ContainingBlock,
    page_is_empty: bool,
    absolute_boxes: &mut Vec<BoxId>,
    fixed_boxes: &mut Vec<BoxId>,
    adjoining_margins: &mut Vec<f64>,
    discard: bool,
) -> LayoutResult<(Option<LayoutBox>, BlockLayout)> {
    let mut bx = bx.clone();
    resolve_percentages(&mut bx, cb.width, cb.height);
    bx.margin.top.get_or_insert(0.0);
    bx.margin.bottom.get_or_insert(0.0);

    // Margins adjoining an unforced break are truncated.
    if ctx.current_page > 1 && page_is_empty && (cb.is_for_root_element || !adjoining_margins.is_empty()) {
        let truncate = match bx.style.margin_break {
            MarginBreak::Discard => true,
            MarginBreak::Auto => !ctx.forced_break,
            MarginBreak::Keep => false,
        };
        if truncate {
            bx.margin.top = Some(0.0);
        }
    }

    let mut margins = adjoining_margins.clone();
    margins.push(bx.margin_top());
    let collapsed = collapse_margins(&margins);
    bx.clearance = ctx.shapes.clearance(&bx, collapsed);
    let mut fresh = Vec::new();
    let adjoining_margins = match bx.clearance {
        Some(clearance) => {
            let top_border_edge = bx.position_y + collapsed + clearance;
            bx.position_y = top_border_edge - bx.margin_top();
            &mut fresh
        }
        None => adjoining_margins,
    };

    if bx.is_block_container() {
        block_level_width(&mut bx, cb);
        return block_container_layout(
            ctx,
            bx,
            bottom_space,
            skip_stack,
            page_is_empty,
            absolute_boxes,
            fixed_boxes,
            adjoining_margins,
            discard,
        );
    }

    if let BoxKind::Replaced(_) = bx.kind {
        replaced_width_height(&mut bx);
        block_level_width(&mut bx, cb);
        return Ok((Some(bx), BlockLayout::finished(PageBreak::any())));
    }

    let Some(kind) = strategy_kind(&bx) else {
        return Err(LayoutError::UnexpectedBox {
            kind: bx.kind.name(),
            operation: "block-level layout",
        });
    };
    let strategy: Rc<dyn LayoutStrategy> = match ctx.strategy(kind) {
        Some(strategy) => strategy,
        None => {
            warn!("no layout strategy for {:?}, laying it out as a block", kind);
            Rc::new(BlockFlowStrategy)
        }
    };
    let (laid_out, result) = strategy.layout(
        ctx,
        bx,
        bottom_space,
        skip_stack,
        cb,
        page_is_empty,
        absolute_boxes,
        fixed_boxes,
    )?;
    let laid_out = laid_out.map(|mut new_box| {
        // Formatting context roots do not overlap floats.
        if !ctx.shapes.is_empty() {
            let (position_x, position_y, _) = ctx.shapes.avoid_collisions(&new_box, cb, false);
            let (dx, dy) = (position_x - new_box.position_x, position_y - new_box.position_y);
            translate_child(ctx, &mut new_box, dx, dy);
        }
        new_box
    });
    Ok((laid_out, result))
}

/// Move a laid-out box together with the excluded shapes of its floats.
pub(crate) fn translate_child(ctx: &mut LayoutContext, child: &mut LayoutBox, dx: f64, dy: f64) {
    child.translate(dx, dy, false);
    ctx.shapes.translate_floats_in(child, dx, dy, false);
}

/// What a child reports back to the container loop.
#[derive(Debug, Default)]
struct ChildStep {
    /// Nothing of the container may stay on this page.
    abort: bool,
    /// The page ends here.
    stop: bool,
    resume_at: Option<ResumeStack>,
}

impl ChildStep {
    fn abort() -> Self {
        Self {
            abort: true,
            ..Default::default()
        }
    }

    fn stop(resume_at: ResumeStack) -> Self {
        Self {
            abort: false,
            stop: true,
            resume_at: Some(resume_at),
        }
    }
}

/// Lay out the children of a block container, starting at `skip_stack`.
#[allow(clippy::too_many_arguments)]
pub fn block_container_layout(
    ctx: &mut LayoutContext,
    mut bx: LayoutBox,
    mut bottom_space: f64,
    skip_stack: Option<&ResumeStack>,
    page_is_empty: bool,
    absolute_boxes: &mut Vec<BoxId>,
    fixed_boxes: &mut Vec<BoxId>,
    adjoining_margins: &mut Vec<f64>,
    discard: bool,
) -> LayoutResult<(Option<LayoutBox>, BlockLayout)> {
    let establishes = establishes_formatting_context(&bx);
    if establishes {
        ctx.shapes.push_context();
    }

    let is_start = skip_stack.is_none();
    bx.remove_decoration(!is_start, false);

    let mut draw_bottom_decoration = discard || bx.style.box_decoration_break == BoxDecorationBreak::Clone;
    if draw_bottom_decoration {
        bottom_space += bx.padding.bottom + bx.border.bottom + bx.margin_bottom();
    }

    adjoining_margins.push(bx.margin_top());
    let collapsing_with_children = !(bx.border.top != 0.0
        || bx.padding.top != 0.0
        || bx.is_flex_item
        || establishes
        || bx.is_for_root_element);

    // Until the first in-flow child, margins collapse with the ones above
    // this box; `own_margins` takes over after that.
    let mut shared = collapsing_with_children;
    let mut own_margins: Vec<f64> = Vec::new();
    let mut top_resolved = false;
    let mut position_y = if collapsing_with_children {
        bx.position_y
    } else {
        bx.position_y += collapse_margins(adjoining_margins) - bx.margin_top();
        bx.content_box_y()
    };

    let relative = bx.style.position == Position::Relative;
    let mut relative_absolutes = Vec::new();
    let absolute_boxes: &mut Vec<BoxId> = if relative {
        &mut relative_absolutes
    } else {
        absolute_boxes
    };

    let (skip, first_skip_stack) = match skip_stack {
        Some(stack) => stack.unpack(),
        None => (0, None),
    };

    let source_children = Rc::clone(&bx.children);
    let mut new_children: Vec<LayoutBox> = Vec::new();
    let mut new_footnotes: Vec<BoxId> = Vec::new();
    let mut broken: Vec<(BoxId, BrokenBox)> = Vec::new();
    let mut next_page = PageBreak::any();
    let mut resume_at: Option<ResumeStack> = None;
    let mut finished = true;

    for (index, source) in source_children.iter().enumerate().skip(skip) {
        let child_skip_stack = if index == skip { first_skip_stack } else { None };
        let mut child = source.clone();
        child.position_x = bx.content_box_x();
        child.position_y = position_y;
        let current: &mut Vec<f64> = if shared {
            &mut *adjoining_margins
        } else {
            &mut own_margins
        };

        if !child.is_in_normal_flow() {
            let step = out_of_flow_layout(
                ctx,
                &bx,
                index,
                child,
                &mut new_children,
                page_is_empty,
                absolute_boxes,
                fixed_boxes,
                current,
                bottom_space,
                &mut broken,
            )?;
            if step.stop {
                resume_at = step.resume_at;
                finished = false;
                break;
            }
            continue;
        }

        let step = if child.is_line_box() {
            if source_children.len() != 1 {
                return Err(LayoutError::LineBoxWithSiblings(child.id));
            }
            let margins = current.clone();
            let step = line_box_layout(
                ctx,
                &mut bx,
                index,
                &child,
                &mut new_children,
                page_is_empty,
                absolute_boxes,
                fixed_boxes,
                &margins,
                bottom_space,
                &mut position_y,
                child_skip_stack,
                &mut new_footnotes,
            )?;
            draw_bottom_decoration |= step.resume_at.is_none();
            shared = false;
            own_margins = Vec::new();
            step
        } else {
            let step = in_flow_layout(
                ctx,
                &mut bx,
                index,
                child,
                &mut new_children,
                page_is_empty,
                absolute_boxes,
                fixed_boxes,
                current,
                bottom_space,
                &mut position_y,
                child_skip_stack,
                collapsing_with_children && !top_resolved,
                discard,
            )?;
            top_resolved |= step.top_resolved;
            next_page = step.next_page;
            shared = false;
            own_margins = step.adjoining_margins;
            step.step
        };

        if step.abort {
            let (page, _) = source.page_values();
            let page = page.map(str::to_string);
            remove_placeholders(ctx, &source_children[skip..], absolute_boxes, fixed_boxes)?;
            for footnote in new_footnotes {
                unlayout_footnote(ctx, footnote)?;
            }
            if establishes {
                ctx.shapes.pop_context();
            }
            debug!("{:?} aborted at child {}", bx.id, index);
            return Ok((
                None,
                BlockLayout::finished(PageBreak {
                    value: BreakValue::Auto,
                    page,
                }),
            ));
        }
        if step.stop {
            resume_at = step.resume_at;
            finished = false;
            break;
        }
    }

    if finished {
        resume_at = None;
    }
    let fragmented = resume_at.is_some();

    if fragmented && bx.style.break_inside.avoids_page_break() && !page_is_empty {
        remove_placeholders(ctx, &new_children, absolute_boxes, fixed_boxes)?;
        for footnote in new_footnotes {
            unlayout_footnote(ctx, footnote)?;
        }
        if establishes {
            ctx.shapes.pop_context();
        }
        return Ok((None, BlockLayout::finished(PageBreak::any())));
    }

    ctx.broken_out_of_flow.extend(broken);

    if collapsing_with_children && !top_resolved {
        bx.position_y += collapse_margins(adjoining_margins) - bx.margin_top();
    }

    let mut margins = if shared {
        adjoining_margins.clone()
    } else {
        own_margins
    };
    let has_in_flow_child = new_children.iter().any(LayoutBox::is_in_normal_flow);
    let mut collapsing_through = false;
    if !has_in_flow_child {
        let collapsed = collapse_margins(&margins);
        let no_height = bx.height.map_or(true, |h| h == 0.0);
        if no_height
            && ctx.shapes.clearance(&bx, collapsed).is_none()
            && bx.min_height == 0.0
            && bx.border.top == 0.0
            && bx.padding.top == 0.0
            && bx.border.bottom == 0.0
            && bx.padding.bottom == 0.0
        {
            collapsing_through = true;
        } else {
            position_y += collapsed;
            margins.clear();
        }
    } else if bx.height.is_some() {
        // A fixed height separates the bottom margins of the children.
        margins.clear();
    }

    if bx.border.bottom != 0.0
        || bx.padding.bottom != 0.0
        || establishes
        || bx.is_for_root_element
        || matches!(bx.kind, BoxKind::TableWrapper)
    {
        position_y += collapse_margins(&margins);
        margins.clear();
    }

    let mut new_box = bx.copy_with_children(new_children);
    new_box.remove_decoration(false, fragmented && !discard);

    if new_box.height.is_none() {
        if !ctx.shapes.is_empty() && new_box.style.overflow != Overflow::Visible {
            let lowest = ctx
                .shapes
                .shapes()
                .iter()
                .map(ExcludedShape::bottom)
                .fold(position_y, f64::max);
            position_y = lowest;
        }
        new_box.height = Some(position_y - new_box.content_box_y());
    }

    if relative {
        let ids = absolute_boxes.clone();
        let cb = ContainingBlock::padding_of(&new_box);
        absolute_layout(ctx, &mut new_box, &ids, &cb, fixed_boxes, bottom_space)?;
    }

    if new_box.children.iter().any(|c| c.style.position == Position::Relative || c.is_line()) {
        let (width, height) = (new_box.content_width(), new_box.content_height());
        for child in Rc::make_mut(&mut new_box.children).iter_mut() {
            relative_positioning(child, width, height);
        }
    }

    if establishes {
        finish_formatting_context(ctx, &mut new_box);
    }

    if discard || !fragmented {
        let height = new_box.content_height().min(new_box.max_height).max(new_box.min_height);
        new_box.height = Some(height);
    } else if bottom_space > f64::NEG_INFINITY {
        // Fill the page down to its bottom.
        let decoration = new_box.margin_height() - new_box.content_height();
        let mut height = ctx.page_bottom - bottom_space - new_box.position_y - decoration;
        if height > new_box.content_height() {
            if draw_bottom_decoration {
                height += bx.padding.bottom + bx.border.bottom + bx.margin_bottom();
            }
            new_box.height = Some(height);
        }
    }

    if next_page.page.is_none() {
        next_page.page = new_box.page_values().1.map(str::to_string);
    }

    Ok((
        Some(new_box),
        BlockLayout {
            resume_at,
            next_page,
            adjoining_margins: margins,
            collapsing_through,
        },
    ))
}

/// Place an out-of-flow child: placeholders for absolute and fixed boxes,
/// floats beside the flow, running elements aside.
#[allow(clippy::too_many_arguments)]
fn out_of_flow_layout(
    ctx: &mut LayoutContext,
    parent: &LayoutBox,
    index: usize,
    mut child: LayoutBox,
    new_children: &mut Vec<LayoutBox>,
    page_is_empty: bool,
    absolute_boxes: &mut Vec<BoxId>,
    fixed_boxes: &mut Vec<BoxId>,
    adjoining_margins: &[f64],
    bottom_space: f64,
    broken: &mut Vec<(BoxId, BrokenBox)>,
) -> LayoutResult<ChildStep> {
    child.position_y += collapse_margins(adjoining_margins);

    if child.is_absolutely_positioned() {
        let id = child.id;
        let is_fixed = child.style.position == Position::Fixed;
        child.index = index;
        new_children.push(LayoutBox::placeholder(child));
        if is_fixed {
            fixed_boxes.push(id);
        } else {
            absolute_boxes.push(id);
        }
        return Ok(ChildStep::default());
    }

    if child.is_floated() {
        let cb = ContainingBlock::content_of(parent);
        let source = child.clone();
        let shapes_before = ctx.shapes.len();
        let (mut new_child, float_resume_at) =
            float_layout(ctx, child, &cb, absolute_boxes, fixed_boxes, bottom_space, None)?;
        let fits = !ctx.overflows_page(bottom_space, new_child.position_y + new_child.content_height());
        if (page_is_empty && new_children.is_empty()) || fits {
            new_child.index = index;
            if let Some(resume_at) = float_resume_at {
                broken.push((
                    new_child.id,
                    BrokenBox {
                        source,
                        containing_block: cb,
                        resume_at,
                    },
                ));
            }
            new_children.push(new_child);
            return Ok(ChildStep::default());
        }

        // The float goes to the next page, and so does what follows it.
        ctx.shapes.truncate(shapes_before);
        remove_placeholders(ctx, std::slice::from_ref(&new_child), absolute_boxes, fixed_boxes)?;
        let mut resume_at = ResumeStack::at(index);
        let last_in_flow = new_children.iter().rev().find(|c| c.is_in_normal_flow());
        let page_break = block_level_page_break(last_in_flow, Some(&source));
        if !new_children.is_empty() && page_break.avoids_page_break() {
            if let Some((kept, earlier)) = find_earlier_page_break(ctx, new_children, absolute_boxes, fixed_boxes)? {
                *new_children = kept;
                resume_at = earlier;
            }
        }
        return Ok(ChildStep::stop(resume_at));
    }

    if child.is_running() {
        ctx.add_running(child);
    }
    Ok(ChildStep::default())
}

/// Cut a line box into lines until the page is full.
#[allow(clippy::too_many_arguments)]
fn line_box_layout(
    ctx: &mut LayoutContext,
    parent: &mut LayoutBox,
    index: usize,
    line_box: &LayoutBox,
    new_children: &mut Vec<LayoutBox>,
    page_is_empty: bool,
    absolute_boxes: &mut Vec<BoxId>,
    fixed_boxes: &mut Vec<BoxId>,
    adjoining_margins: &[f64],
    bottom_space: f64,
    position_y: &mut f64,
    skip_stack: Option<&ResumeStack>,
    new_footnotes: &mut Vec<BoxId>,
) -> LayoutResult<ChildStep> {
    if !adjoining_margins.is_empty() {
        *position_y += collapse_margins(adjoining_margins);
    }
    let cb = ContainingBlock::content_of(parent);
    let mut lines = LineIterator::new(line_box, *position_y, bottom_space, skip_stack, cb);
    let mut skip_stack = skip_stack.cloned();
    let mut step = ChildStep::default();

    while let Some((mut line, line_resume_at)) = lines.next_line(ctx, absolute_boxes, fixed_boxes)? {
        step.resume_at = line_resume_at.clone();
        line.kind = BoxKind::Line(LineData {
            resume_at: line_resume_at.clone(),
        });

        let mut new_position_y = line.position_y + line.content_height();
        // The bottom decoration of the container must fit below its last line.
        let offset_y = if line_resume_at.is_none() || parent.style.box_decoration_break == BoxDecorationBreak::Clone {
            parent.border.bottom + parent.padding.bottom
        } else {
            0.0
        };

        let overflow = (!new_children.is_empty() || !page_is_empty)
            && ctx.overflows_page(bottom_space, new_position_y + offset_y);
        if overflow {
            step = break_line(
                ctx,
                parent,
                &line,
                new_children,
                &mut lines,
                page_is_empty,
                index,
                skip_stack.as_ref(),
                absolute_boxes,
                fixed_boxes,
            )?;
            break;
        }
        if page_is_empty && ctx.overflows_page(bottom_space, new_position_y) {
            // The first line does not fit even at the top of the page:
            // the top margin at least can go.
            let margin_top = parent.margin_top();
            new_position_y -= margin_top;
            translate_child(ctx, &mut line, 0.0, -margin_top);
            parent.margin.top = Some(0.0);
        }

        if ctx.footnotes.has_waiting() {
            let calls: Vec<BoxId> = line
                .descendants()
                .filter_map(|d| d.footnote)
                .filter(|&footnote| ctx.footnotes.is_waiting(footnote))
                .collect();
            let mut break_here = false;
            for footnote in calls {
                let mut overflow = layout_footnote(ctx, footnote)?;
                new_footnotes.push(footnote);
                overflow = overflow
                    || ctx.footnotes.has_reported()
                    || ctx.overflows_page(bottom_space, new_position_y + offset_y);
                if overflow {
                    report_footnote(ctx, footnote)?;
                    // A footnote never pushes the first line of a page away.
                    if !new_children.is_empty() || !page_is_empty {
                        match ctx.footnotes.policy(footnote) {
                            FootnotePolicy::Line => {
                                step = break_line(
                                    ctx,
                                    parent,
                                    &line,
                                    new_children,
                                    &mut lines,
                                    page_is_empty,
                                    index,
                                    skip_stack.as_ref(),
                                    absolute_boxes,
                                    fixed_boxes,
                                )?;
                                break_here = true;
                            }
                            FootnotePolicy::Block => {
                                step = ChildStep::abort();
                                break_here = true;
                            }
                            FootnotePolicy::Auto => {}
                        }
                    }
                    break;
                }
            }
            if break_here {
                break;
            }
        }

        new_children.push(line);
        *position_y = new_position_y;
        skip_stack = line_resume_at;
    }

    if let Some(last) = new_children.last() {
        step.resume_at = Some(ResumeStack::nested(index, last.line_resume_at().cloned()));
    }
    Ok(step)
}

/// End the page inside a line box, before `line`.
///
/// Keeps at least `orphans` lines on this page and `widows` lines for the
/// next one, or aborts the container when both cannot be met.
#[allow(clippy::too_many_arguments)]
fn break_line(
    ctx: &mut LayoutContext,
    parent: &LayoutBox,
    line: &LayoutBox,
    new_children: &mut Vec<LayoutBox>,
    lines: &mut LineIterator,
    page_is_empty: bool,
    index: usize,
    skip_stack: Option<&ResumeStack>,
    absolute_boxes: &mut Vec<BoxId>,
    fixed_boxes: &mut Vec<BoxId>,
) -> LayoutResult<ChildStep> {
    let over_orphans = new_children.len() as i64 - i64::from(parent.style.orphans);
    if over_orphans < 0 && !page_is_empty {
        return Ok(ChildStep::abort());
    }

    // Lines still to come after this one, counted without keeping the side
    // effects of their layout.
    let mut needed = i64::from(parent.style.widows) - 1;
    if needed > 0 {
        let checkpoint = ctx.checkpoint();
        let (absolutes, fixed) = (absolute_boxes.len(), fixed_boxes.len());
        while needed > 0 {
            if lines.next_line(ctx, absolute_boxes, fixed_boxes)?.is_none() {
                break;
            }
            needed -= 1;
        }
        ctx.rollback(checkpoint);
        absolute_boxes.truncate(absolutes);
        fixed_boxes.truncate(fixed);
    }

    if needed > over_orphans && !page_is_empty {
        return Ok(ChildStep::abort());
    }
    if needed != 0 && needed <= over_orphans {
        // Give lines to the next page so that it gets enough of them.
        let cut = new_children.len() - needed as usize;
        for dropped in &new_children[cut..] {
            remove_placeholders(ctx, dropped.traversal_children(), absolute_boxes, fixed_boxes)?;
        }
        new_children.truncate(cut);
    }
    remove_placeholders(ctx, line.traversal_children(), absolute_boxes, fixed_boxes)?;
    Ok(ChildStep::stop(ResumeStack::nested(index, skip_stack.cloned())))
}

/// Outcome of an in-flow child.
struct InFlowStep {
    step: ChildStep,
    next_page: PageBreak,
    /// Margins collapsing below the child.
    adjoining_margins: Vec<f64>,
    /// The top margin of the container was resolved by clearance.
    top_resolved: bool,
}

/// Lay out an in-flow block-level child.
#[allow(clippy::too_many_arguments)]
fn in_flow_layout(
    ctx: &mut LayoutContext,
    parent: &mut LayoutBox,
    index: usize,
    mut child: LayoutBox,
    new_children: &mut Vec<LayoutBox>,
    page_is_empty: bool,
    absolute_boxes: &mut Vec<BoxId>,
    fixed_boxes: &mut Vec<BoxId>,
    adjoining_margins: &mut Vec<f64>,
    mut bottom_space: f64,
    position_y: &mut f64,
    skip_stack: Option<&ResumeStack>,
    first_collapses_with_parent: bool,
    discard: bool,
) -> LayoutResult<InFlowStep> {
    let mut outcome = InFlowStep {
        step: ChildStep::default(),
        next_page: PageBreak::any(),
        adjoining_margins: Vec::new(),
        top_resolved: false,
    };

    let mut page_break = BreakValue::Auto;
    let has_in_flow_sibling = match new_children.iter().rev().find(|c| c.is_in_normal_flow()) {
        Some(last_in_flow) => {
            page_break = block_level_page_break(Some(last_in_flow), Some(&child));
            if page_break.forces_page_break() || block_level_page_name_changes(last_in_flow, &child) {
                outcome.next_page = PageBreak {
                    value: page_break,
                    page: child.page_values().0.map(str::to_string),
                };
                outcome.adjoining_margins = adjoining_margins.clone();
                outcome.step = ChildStep::stop(ResumeStack::at(index));
                return Ok(outcome);
            }
            true
        }
        None => false,
    };

    let mut fresh = Vec::new();
    let mut adjoining_margins: &mut Vec<f64> = adjoining_margins;
    if !matches!(parent.kind, BoxKind::TableWrapper) {
        resolve_percentages(&mut child, parent.content_width(), parent.height);
        if !has_in_flow_sibling && first_collapses_with_parent {
            // The first in-flow child collapses its top margin through the
            // container: floats and placeholders already placed move along.
            let old_collapsed = collapse_margins(adjoining_margins);
            let mut child_margin_top = child.margin.top.unwrap_or(0.0);
            if child.margin.top.is_some() && ctx.current_page > 1 && page_is_empty {
                let truncate = match parent.style.margin_break {
                    MarginBreak::Discard => true,
                    MarginBreak::Auto => !ctx.forced_break,
                    MarginBreak::Keep => false,
                };
                if truncate {
                    child_margin_top = 0.0;
                }
            }
            let mut margins = adjoining_margins.clone();
            margins.push(child_margin_top);
            let new_collapsed = collapse_margins(&margins);
            let difference = new_collapsed - old_collapsed;
            for previous in new_children.iter_mut() {
                translate_child(ctx, previous, 0.0, difference);
            }

            if ctx.shapes.clearance(&child, new_collapsed).is_some() {
                for previous in new_children.iter_mut() {
                    translate_child(ctx, previous, 0.0, -difference);
                }
                let collapsed = collapse_margins(adjoining_margins);
                parent.position_y += collapsed - parent.margin_top();
                outcome.top_resolved = true;
                adjoining_margins = &mut fresh;
                *position_y = parent.content_box_y();
            }
        }
    }

    if !adjoining_margins.is_empty() && matches!(parent.kind, BoxKind::TableWrapper) {
        let collapsed = collapse_margins(adjoining_margins);
        child.position_y += collapsed;
        *position_y += collapsed;
        adjoining_margins.clear();
    }

    let page_is_empty_with_no_children = page_is_empty && new_children.iter().all(LayoutBox::is_placeholder);
    let cb = ContainingBlock::content_of(parent);
    let saved_margins = adjoining_margins.clone();
    let checkpoint = ctx.checkpoint();

    let (mut new_child, mut result) = block_level_layout(
        ctx,
        &child,
        bottom_space,
        skip_stack,
        &cb,
        page_is_empty_with_no_children,
        absolute_boxes,
        fixed_boxes,
        adjoining_margins,
        discard,
    )?;
    if let Some(laid_out) = new_child.as_mut() {
        collapse_atomic_top_margin(ctx, laid_out, adjoining_margins);
    }

    if let Some(laid_out) = new_child.clone() {
        if !result.collapsing_through {
            let content_bottom = laid_out.content_box_y() + laid_out.content_height();
            let border_bottom = laid_out.border_box_y() + laid_out.border_height();
            if ctx.overflows_page(bottom_space, content_bottom) && !page_is_empty_with_no_children {
                // Even the content does not fit: the child goes to the next page.
                remove_placeholders(ctx, std::slice::from_ref(&laid_out), absolute_boxes, fixed_boxes)?;
                ctx.rollback(checkpoint);
                new_child = None;
            } else if ctx.overflows_page(bottom_space, border_bottom) && !page_is_empty_with_no_children {
                // The content fits but the bottom decoration does not: lay
                // the child out again, keeping room for its decoration.
                remove_placeholders(ctx, std::slice::from_ref(&laid_out), absolute_boxes, fixed_boxes)?;
                ctx.rollback(checkpoint);
                bottom_space += laid_out.padding.bottom + laid_out.border.bottom;
                *adjoining_margins = saved_margins;
                (new_child, result) = block_level_layout(
                    ctx,
                    &child,
                    bottom_space,
                    skip_stack,
                    &cb,
                    page_is_empty_with_no_children,
                    absolute_boxes,
                    fixed_boxes,
                    adjoining_margins,
                    discard,
                )?;
                if let Some(laid_out) = new_child.as_mut() {
                    collapse_atomic_top_margin(ctx, laid_out, adjoining_margins);
                    *position_y = laid_out.border_box_y() + laid_out.border_height();
                }
            } else {
                *position_y = border_bottom;
            }
        }
    }

    outcome.adjoining_margins = match &new_child {
        Some(laid_out) => {
            let mut margins = std::mem::take(&mut result.adjoining_margins);
            margins.push(laid_out.margin_bottom());
            if laid_out.clearance.is_some() {
                *position_y = laid_out.border_box_y() + laid_out.border_height();
            }
            margins
        }
        None => adjoining_margins.clone(),
    };
    outcome.next_page = result.next_page;

    let Some(mut laid_out) = new_child else {
        if page_break.avoids_page_break() {
            if let Some((kept, resume_at)) = find_earlier_page_break(ctx, new_children, absolute_boxes, fixed_boxes)? {
                *new_children = kept;
                outcome.step = ChildStep::stop(resume_at);
                return Ok(outcome);
            }
            if !page_is_empty {
                outcome.step = ChildStep::abort();
                return Ok(outcome);
            }
        }
        if new_children.iter().all(LayoutBox::is_absolutely_positioned) {
            // Only placeholders so far: they follow the child to the next page.
            remove_placeholders(ctx, new_children, absolute_boxes, fixed_boxes)?;
            new_children.clear();
        }
        outcome.step = if new_children.is_empty() {
            ChildStep::abort()
        } else {
            ChildStep::stop(ResumeStack::at(index))
        };
        return Ok(outcome);
    };

    laid_out.index = index;
    new_children.push(laid_out);
    if let Some(resume_at) = result.resume_at {
        outcome.step = ChildStep::stop(ResumeStack::nested(index, Some(resume_at)));
    }
    Ok(outcome)
}

/// Boxes laid out by strategies and replaced boxes do not collapse their
/// top margin themselves.
fn collapse_atomic_top_margin(ctx: &mut LayoutContext, laid_out: &mut LayoutBox, adjoining_margins: &mut Vec<f64>) {
    if laid_out.is_block_container() {
        return;
    }
    adjoining_margins.push(laid_out.margin_top());
    let offset_y = collapse_margins(adjoining_margins) - laid_out.margin_top();
    translate_child(ctx, laid_out, 0.0, offset_y);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout::tests::{context, id, line, text};
    use crate::style::{Clear, ComputedStyle, Dimension, EdgeValues, Float, Style};

    fn page_cb(width: f64) -> ContainingBlock {
        ContainingBlock {
            x: 0.0,
            y: 0.0,
            width,
            height: None,
            direction: crate::style::Direction::Ltr,
            is_for_root_element: false,
        }
    }

    fn block(style: Style, children: Vec<LayoutBox>) -> LayoutBox {
        let children = children
            .into_iter()
            .enumerate()
            .map(|(i, mut c)| {
                c.index = i;
                c
            })
            .collect();
        LayoutBox::new(id(), BoxKind::Block, Rc::new(style.resolve(None))).with_children(children)
    }

    fn sized(height: f64) -> LayoutBox {
        block(
            Style {
                height: Some(Dimension::Pt(height)),
                ..Default::default()
            },
            vec![],
        )
    }

    fn root(children: Vec<LayoutBox>) -> LayoutBox {
        let mut root = block(Style::default(), children);
        root.is_for_root_element = true;
        root
    }

    fn lay_out(
        ctx: &mut LayoutContext,
        bx: &LayoutBox,
        skip_stack: Option<&ResumeStack>,
        page_is_empty: bool,
    ) -> (Option<LayoutBox>, BlockLayout) {
        let (mut abs, mut fixed, mut margins) = (Vec::new(), Vec::new(), Vec::new());
        ctx.shapes.push_context();
        block_level_layout(
            ctx,
            bx,
            0.0,
            skip_stack,
            &page_cb(200.0),
            page_is_empty,
            &mut abs,
            &mut fixed,
            &mut margins,
            false,
        )
        .unwrap()
    }

    fn paragraph(words: usize, style: Style) -> LayoutBox {
        // 12pt text at 6pt per character: "word " is 30pt, so a 200pt line
        // holds six words and each line is 14.4pt high.
        let content = "word ".repeat(words);
        let text = LayoutBox::new(
            id(),
            BoxKind::Text(crate::boxes::TextData::new(content.trim_end())),
            Rc::new(ComputedStyle::default()),
        );
        block(style, vec![line(vec![text])])
    }

    #[test]
    fn children_that_do_not_fit_resume_on_the_next_page() {
        let mut ctx = context(250.0);
        let tree = root(vec![sized(100.0), sized(100.0), sized(100.0)]);
        let (laid_out, result) = lay_out(&mut ctx, &tree, None, true);
        let laid_out = laid_out.unwrap();
        assert_eq!(laid_out.children.len(), 2);
        assert_eq!(result.resume_at, Some(ResumeStack::at(2)));
        // A fragmented box fills the page down to its bottom.
        assert_eq!(laid_out.content_height(), 250.0);

        let mut ctx = context(250.0);
        let (rest, result) = lay_out(&mut ctx, &tree, Some(&ResumeStack::at(2)), true);
        let rest = rest.unwrap();
        assert_eq!(rest.children.len(), 1);
        assert_eq!(rest.children[0].index, 2);
        assert!(result.resume_at.is_none());
    }

    #[test]
    fn margins_of_empty_boxes_collapse_through() {
        let mut ctx = context(1000.0);
        let margin = |v: f64| {
            Some(EdgeValues {
                top: Dimension::Pt(v),
                right: Dimension::Pt(0.0),
                bottom: Dimension::Pt(v),
                left: Dimension::Pt(0.0),
            })
        };
        let empty = block(
            Style {
                margin: margin(20.0),
                ..Default::default()
            },
            vec![],
        );
        let next = block(
            Style {
                margin: margin(10.0),
                height: Some(Dimension::Pt(50.0)),
                ..Default::default()
            },
            vec![],
        );
        let tree = root(vec![empty, next]);
        let (laid_out, _) = lay_out(&mut ctx, &tree, None, true);
        let laid_out = laid_out.unwrap();
        // 20, 20 and 10 collapse into a single 20pt margin.
        assert_eq!(laid_out.children[1].border_box_y(), 20.0);
        assert_eq!(laid_out.children[0].content_height(), 0.0);
    }

    #[test]
    fn first_child_margin_collapses_with_its_parent() {
        let mut ctx = context(1000.0);
        let child = block(
            Style {
                margin: Some(EdgeValues {
                    top: Dimension::Pt(20.0),
                    right: Dimension::Pt(0.0),
                    bottom: Dimension::Pt(0.0),
                    left: Dimension::Pt(0.0),
                }),
                height: Some(Dimension::Pt(50.0)),
                ..Default::default()
            },
            vec![],
        );
        let parent = block(
            Style {
                margin: Some(EdgeValues {
                    top: Dimension::Pt(10.0),
                    right: Dimension::Pt(0.0),
                    bottom: Dimension::Pt(0.0),
                    left: Dimension::Pt(0.0),
                }),
                ..Default::default()
            },
            vec![child],
        );
        let tree = root(vec![parent]);
        let (laid_out, _) = lay_out(&mut ctx, &tree, None, true);
        let parent = &laid_out.unwrap().children[0];
        assert_eq!(parent.border_box_y(), 20.0);
        assert_eq!(parent.children[0].border_box_y(), 20.0);
        assert_eq!(parent.content_height(), 50.0);
    }

    #[test]
    fn clearance_moves_a_block_below_a_float() {
        let mut ctx = context(1000.0);
        let float = block(
            Style {
                float: Some(Float::Left),
                width: Some(Dimension::Pt(50.0)),
                height: Some(Dimension::Pt(50.0)),
                ..Default::default()
            },
            vec![],
        );
        let cleared = block(
            Style {
                clear: Some(Clear::Both),
                margin: Some(EdgeValues {
                    top: Dimension::Pt(10.0),
                    right: Dimension::Pt(0.0),
                    bottom: Dimension::Pt(0.0),
                    left: Dimension::Pt(0.0),
                }),
                height: Some(Dimension::Pt(20.0)),
                ..Default::default()
            },
            vec![],
        );
        let tree = root(vec![float, cleared]);
        let (laid_out, _) = lay_out(&mut ctx, &tree, None, true);
        let laid_out = laid_out.unwrap();
        let cleared = &laid_out.children[1];
        assert_eq!(cleared.border_box_y(), 50.0);
        assert_eq!(cleared.clearance, Some(40.0));
    }

    #[test]
    fn lines_break_at_the_page_bottom() {
        // Three lines of 14.4pt, room for two.
        let mut ctx = context(30.0);
        let tree = root(vec![paragraph(
            18,
            Style {
                orphans: Some(1),
                widows: Some(1),
                ..Default::default()
            },
        )]);
        let (laid_out, result) = lay_out(&mut ctx, &tree, None, true);
        let paragraph = &laid_out.unwrap().children[0];
        assert_eq!(paragraph.children.len(), 2);
        let resume_at = result.resume_at.unwrap();
        assert_eq!(resume_at.index(), 0);
        assert_eq!(resume_at.child().map(ResumeStack::index), Some(0));
    }

    #[test]
    fn orphans_abort_a_paragraph_that_would_leave_too_few_lines() {
        let mut ctx = context(50.0);
        let tree = root(vec![
            sized(30.0),
            paragraph(
                18,
                Style {
                    orphans: Some(3),
                    widows: Some(1),
                    ..Default::default()
                },
            ),
        ]);
        let (laid_out, result) = lay_out(&mut ctx, &tree, None, true);
        // One line would fit under the first block, three are needed.
        let laid_out = laid_out.unwrap();
        assert_eq!(laid_out.children.len(), 1);
        assert_eq!(result.resume_at, Some(ResumeStack::at(1)));
    }

    #[test]
    fn widows_pull_lines_to_the_next_page() {
        // Four lines, room for three, two widows wanted.
        let mut ctx = context(45.0);
        let tree = root(vec![paragraph(
            24,
            Style {
                orphans: Some(1),
                widows: Some(2),
                ..Default::default()
            },
        )]);
        let (laid_out, _) = lay_out(&mut ctx, &tree, None, true);
        let paragraph = &laid_out.unwrap().children[0];
        assert_eq!(paragraph.children.len(), 2);
    }

    #[test]
    fn forced_breaks_stop_between_siblings() {
        let mut ctx = context(1000.0);
        let second = block(
            Style {
                break_before: Some(BreakValue::Page),
                height: Some(Dimension::Pt(10.0)),
                ..Default::default()
            },
            vec![],
        );
        let tree = root(vec![sized(10.0), second]);
        let (laid_out, result) = lay_out(&mut ctx, &tree, None, true);
        assert_eq!(laid_out.unwrap().children.len(), 1);
        assert_eq!(result.resume_at, Some(ResumeStack::at(1)));
        assert_eq!(result.next_page.value, BreakValue::Page);
    }

    #[test]
    fn absolute_children_leave_placeholders() {
        let mut ctx = context(1000.0);
        let absolute = block(
            Style {
                position: Some(Position::Absolute),
                ..Default::default()
            },
            vec![],
        );
        let absolute_id = absolute.id;
        let tree = root(vec![absolute, sized(10.0)]);
        let (mut abs, mut fixed, mut margins) = (Vec::new(), Vec::new(), Vec::new());
        ctx.shapes.push_context();
        let (laid_out, _) = block_level_layout(
            &mut ctx,
            &tree,
            0.0,
            None,
            &page_cb(200.0),
            true,
            &mut abs,
            &mut fixed,
            &mut margins,
            false,
        )
        .unwrap();
        assert_eq!(abs, vec![absolute_id]);
        assert!(laid_out.unwrap().children[0].is_placeholder());
    }

    #[test]
    fn text_boxes_are_not_block_level() {
        let mut ctx = context(1000.0);
        let (mut abs, mut fixed, mut margins) = (Vec::new(), Vec::new(), Vec::new());
        let result = block_level_layout(
            &mut ctx,
            &text("loose"),
            0.0,
            None,
            &page_cb(200.0),
            true,
            &mut abs,
            &mut fixed,
            &mut margins,
            false,
        );
        assert!(matches!(result, Err(LayoutError::UnexpectedBox { .. })));
    }
}
