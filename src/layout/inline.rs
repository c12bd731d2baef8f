//! # Line Fragmentation
//!
//! Cuts the content of a line box into lines. Each call to
//! [`LineIterator::next_line`] fills one line as wide as the floats allow,
//! splitting text at the last break opportunity that fits, then aligns it
//! horizontally (`text-align`) and vertically (`vertical-align`). The
//! returned resume stack addresses the start of the next line, down to a
//! byte offset in a text box.

use std::rc::Rc;

use log::warn;

use crate::boxes::{BoxId, BoxKind, LayoutBox, TextData};
use crate::error::{LayoutError, LayoutResult};
use crate::style::{BoxDecorationBreak, Dimension, Direction, Display, Float, Position, TextAlign, VerticalAlign, WhiteSpace};

use super::absolute::absolute_layout;
use super::block::translate_child;
use super::float::{float_layout, horizontal_decoration};
use super::percentages::{replaced_width_height, resolve_percentages};
use super::preferred::{min_content_width, shrink_to_fit, trailing_whitespace_width};
use super::resume::ResumeStack;
use super::{BrokenBox, Checkpoint, ContainingBlock, LayoutContext};

/// Yields the lines of a line box, one at a time.
pub struct LineIterator {
    source: LayoutBox,
    position_y: f64,
    bottom_space: f64,
    skip_stack: Option<ResumeStack>,
    cb: ContainingBlock,
    /// Only the first line of the box is indented.
    text_indent: f64,
    done: bool,
}

impl LineIterator {
    pub fn new(
        line_box: &LayoutBox,
        position_y: f64,
        bottom_space: f64,
        skip_stack: Option<&ResumeStack>,
        cb: ContainingBlock,
    ) -> Self {
        let mut source = line_box.clone();
        resolve_percentages(&mut source, cb.width, cb.height);
        let text_indent = match skip_stack {
            None => source.style.text_indent.resolve(cb.width).unwrap_or(0.0),
            Some(_) => 0.0,
        };
        Self {
            source,
            position_y,
            bottom_space,
            skip_stack: skip_stack.cloned(),
            cb,
            text_indent,
            done: false,
        }
    }

    /// The next line and where the line after it starts, or `None` when the
    /// content is exhausted.
    pub fn next_line(
        &mut self,
        ctx: &mut LayoutContext,
        absolute_boxes: &mut Vec<BoxId>,
        fixed_boxes: &mut Vec<BoxId>,
    ) -> LayoutResult<Option<(LayoutBox, Option<ResumeStack>)>> {
        if self.done {
            return Ok(None);
        }
        let next = next_line_box(
            ctx,
            &self.source,
            self.position_y,
            self.bottom_space,
            self.skip_stack.as_ref(),
            &self.cb,
            self.text_indent,
            absolute_boxes,
            fixed_boxes,
        )?;
        let Some((line, resume_at)) = next else {
            self.done = true;
            return Ok(None);
        };
        self.position_y = line.position_y + line.content_height();
        self.text_indent = 0.0;
        self.done = resume_at.is_none();
        self.skip_stack = resume_at.clone();
        Ok(Some((line, resume_at)))
    }
}

/// Side effects of the boxes placed on the line being built.
#[derive(Default)]
struct LineState {
    /// Absolute and fixed boxes whose static position depends on the line.
    placeholders: Vec<BoxId>,
    absolutes: Vec<BoxId>,
    fixed: Vec<BoxId>,
    /// Floats too wide for the rest of the line, placed below it.
    waiting_floats: Vec<LayoutBox>,
    /// Something in the flow is already on the line.
    line_started: bool,
}

struct LineMark {
    placeholders: usize,
    absolutes: usize,
    fixed: usize,
    waiting_floats: usize,
    line_started: bool,
    checkpoint: Checkpoint,
}

impl LineState {
    fn mark(&self, ctx: &LayoutContext) -> LineMark {
        LineMark {
            placeholders: self.placeholders.len(),
            absolutes: self.absolutes.len(),
            fixed: self.fixed.len(),
            waiting_floats: self.waiting_floats.len(),
            line_started: self.line_started,
            checkpoint: ctx.checkpoint(),
        }
    }

    /// Forget what was registered since `mark`.
    fn restore(&mut self, ctx: &mut LayoutContext, mark: LineMark) {
        self.placeholders.truncate(mark.placeholders);
        self.absolutes.truncate(mark.absolutes);
        self.fixed.truncate(mark.fixed);
        self.waiting_floats.truncate(mark.waiting_floats);
        self.line_started = mark.line_started;
        ctx.rollback(mark.checkpoint);
    }

    /// Forget the placeholders inside a box dropped from the line.
    fn forget(&mut self, bx: &LayoutBox) {
        for placeholder in bx.descendants().filter(|d| d.is_placeholder()) {
            let id = placeholder.id;
            self.placeholders.retain(|&p| p != id);
            self.absolutes.retain(|&p| p != id);
            self.fixed.retain(|&p| p != id);
        }
    }
}

#[derive(Debug, Default, Clone, Copy)]
struct FloatWidths {
    left: f64,
    right: f64,
}

/// Result of fitting an inline-level box on the current line.
#[derive(Default)]
struct SplitInline {
    /// `None` when nothing of the box is on the line (an exhausted text).
    new_box: Option<LayoutBox>,
    resume_at: Option<ResumeStack>,
    preserved_line_break: bool,
    first_letter: Option<char>,
    last_letter: Option<char>,
    float_widths: FloatWidths,
}

/// A child placed on the line, with its index among the source children.
struct Placed {
    index: usize,
    bx: LayoutBox,
}

/// Atomic inlines break like ideographs.
const ATOMIC_LETTER: char = '\u{2e80}';

#[allow(clippy::too_many_arguments)]
fn next_line_box(
    ctx: &mut LayoutContext,
    source: &LayoutBox,
    position_y: f64,
    bottom_space: f64,
    skip_stack: Option<&ResumeStack>,
    cb: &ContainingBlock,
    text_indent: f64,
    absolute_boxes: &mut Vec<BoxId>,
    fixed_boxes: &mut Vec<BoxId>,
) -> LayoutResult<Option<(LayoutBox, Option<ResumeStack>)>> {
    let Some(skip_stack) = skip_first_whitespace(ctx, source, skip_stack)? else {
        return Ok(None);
    };

    let mut line_box = source.clone();
    line_box.position_y = position_y;
    if ctx.shapes.is_empty() {
        line_box.width = Some(0.0);
        line_box.height = Some(0.0);
    } else {
        // Floats are avoided with a line at least as wide as its widest word.
        line_box.width = Some(min_content_width(ctx, source, true));
        line_box.height = Some(ctx.shaper().strut(&source.style).0);
    }
    let (mut position_x, mut position_y, mut available_width) = ctx.shapes.avoid_collisions(&line_box, cb, false);
    let mut candidate_height = line_box.content_height();
    let checkpoint = ctx.checkpoint();

    let (line, resume_at, state) = loop {
        line_box.position_x = position_x;
        line_box.position_y = position_y;
        let (original_x, original_y, original_width) = (position_x, position_y, line_box.content_width());
        let max_x = position_x + available_width;

        let mut state = LineState::default();
        let split = split_inline_box(
            ctx,
            &line_box,
            position_x + text_indent,
            max_x,
            bottom_space,
            skip_stack.as_ref(),
            cb,
            &mut state,
        )?;
        let resume_at = split.resume_at;
        let Some(mut line) = split.new_box else {
            return Err(LayoutError::UnexpectedBox {
                kind: source.kind.name(),
                operation: "line splitting",
            });
        };
        line_box.width = line.width;
        line_box.height = line.height;

        if is_phantom_line_box(&line) && !split.preserved_line_break {
            line.height = Some(0.0);
            break (line, resume_at, state);
        }

        remove_last_whitespace(ctx, &mut line);

        let (new_position_x, _, new_available_width) = ctx.shapes.avoid_collisions(&line_box, cb, false);
        let alignment_width = new_available_width - split.float_widths.right + new_position_x - line_box.position_x;
        let mut offset_x = text_align(&mut line, alignment_width, resume_at.is_none() || split.preserved_line_break);
        if cb.direction == Direction::Rtl {
            offset_x = -offset_x - line.content_width();
        }

        let (bottom, top) = line_box_verticality(ctx, &mut line);
        line.baseline = Some(-top);
        line.position_y = top;
        line.height = Some(bottom - top);
        line.margin.top = Some(0.0);
        line.margin.bottom = Some(0.0);
        // Floats keep their horizontal position but follow the line down.
        line.translate(offset_x, 0.0, true);
        translate_child(ctx, &mut line, 0.0, position_y - top);
        line.position_y = position_y;

        if line.content_height() <= candidate_height {
            break (line, resume_at, state);
        }
        candidate_height = line.content_height();

        // The line grew: check that it still avoids the floats that were
        // there before it.
        let mut before = ctx.shapes.clone();
        before.truncate(checkpoint.shapes_len());
        let (x, y, width) = before.avoid_collisions(&line, cb, false);
        let unchanged = if cb.direction == Direction::Ltr {
            x == original_x && y == original_y
        } else {
            x + line.content_width() == original_x + original_width && y == original_y
        };
        if unchanged {
            break (line, resume_at, state);
        }
        ctx.rollback(checkpoint.clone());
        (position_x, position_y, available_width) = (x, y, width);
    };

    let mut line = line;
    for id in state.absolutes {
        if !absolute_boxes.contains(&id) {
            absolute_boxes.push(id);
        }
    }
    for id in state.fixed {
        if !fixed_boxes.contains(&id) {
            fixed_boxes.push(id);
        }
    }

    for id in state.placeholders {
        let is_target = |b: &LayoutBox| b.id == id && b.is_placeholder();
        let Some(path) = line.find_path(&is_target) else {
            continue;
        };
        let (line_x, line_bottom) = (line.position_x, position_y + line.content_height());
        if let Some(placeholder) = line.at_path_mut(&path) {
            if placeholder.style.display == Display::Inline {
                let dy = position_y - placeholder.position_y;
                placeholder.translate(0.0, dy, false);
            } else {
                // Block-level static position: the start of the next line.
                let (dx, dy) = (line_x - placeholder.position_x, line_bottom - placeholder.position_y);
                placeholder.translate(dx, dy, false);
            }
        }
    }

    let waiting_floats_y = line.position_y + line.content_height();
    let mut float_children = Vec::with_capacity(state.waiting_floats.len());
    for mut waiting in state.waiting_floats {
        waiting.position_y = waiting_floats_y;
        let source = waiting.clone();
        let (new_float, float_resume_at) =
            float_layout(ctx, waiting, cb, absolute_boxes, fixed_boxes, bottom_space, None)?;
        if let Some(resume_at) = float_resume_at {
            ctx.broken_out_of_flow.insert(
                new_float.id,
                BrokenBox {
                    source,
                    containing_block: *cb,
                    resume_at,
                },
            );
        }
        float_children.push(new_float);
    }
    if !float_children.is_empty() {
        Rc::make_mut(&mut line.children).extend(float_children);
    }

    Ok(Some((line, resume_at)))
}

/// The skip stack starting just after the collapsible spaces opening a line.
///
/// The outer `None` means there is nothing left to lay out.
fn skip_first_whitespace(
    ctx: &LayoutContext,
    bx: &LayoutBox,
    skip_stack: Option<&ResumeStack>,
) -> LayoutResult<Option<Option<ResumeStack>>> {
    let (mut index, next_skip_stack) = skip_stack.map_or((0, None), ResumeStack::unpack);

    if let BoxKind::Text(_) = bx.kind {
        if let Some(next) = next_skip_stack {
            return Err(LayoutError::UnexpectedResume {
                kind: bx.kind.name(),
                resume: next.to_string(),
            });
        }
        let text = ctx.text_of(bx);
        if index == text.len() {
            return Ok(None);
        }
        if bx.style.white_space.collapses_spaces() {
            let bytes = text.as_bytes();
            while index < bytes.len() && bytes[index] == b' ' {
                index += 1;
            }
        }
        return Ok(Some((index != 0).then(|| ResumeStack::at(index))));
    }

    if bx.is_line() {
        if index == 0 && bx.children.is_empty() {
            return Ok(Some(None));
        }
        let Some(child) = bx.children.get(index) else {
            return Ok(None);
        };
        let result = match skip_first_whitespace(ctx, child, next_skip_stack)? {
            Some(result) => result,
            None => {
                index += 1;
                let Some(next_child) = bx.children.get(index) else {
                    return Ok(None);
                };
                skip_first_whitespace(ctx, next_child, None)?.flatten()
            }
        };
        if index != 0 || result.is_some() {
            return Ok(Some(Some(ResumeStack::nested(index, result))));
        }
        return Ok(Some(None));
    }

    if let Some(stack) = skip_stack {
        return Err(LayoutError::UnexpectedResume {
            kind: bx.kind.name(),
            resume: stack.to_string(),
        });
    }
    Ok(Some(None))
}

/// Fit an inline-level box between `position_x` and `max_x`.
#[allow(clippy::too_many_arguments)]
fn split_inline_level(
    ctx: &mut LayoutContext,
    bx: &LayoutBox,
    position_x: f64,
    max_x: f64,
    bottom_space: f64,
    skip_stack: Option<&ResumeStack>,
    cb: &ContainingBlock,
    state: &mut LineState,
) -> LayoutResult<SplitInline> {
    let mut bx = bx.clone();
    resolve_percentages(&mut bx, cb.width, cb.height);

    match &bx.kind {
        BoxKind::Text(_) => {
            bx.position_x = position_x;
            let skip = match skip_stack {
                None => 0,
                Some(stack) => {
                    if let Some(child) = stack.child() {
                        return Err(LayoutError::UnexpectedResume {
                            kind: bx.kind.name(),
                            resume: child.to_string(),
                        });
                    }
                    stack.index()
                }
            };
            let text = ctx.text_of(&bx);
            let is_line_start = !state.line_started;
            let (new_box, resume, preserved_line_break) =
                split_text_box(ctx, &bx, &text, max_x - position_x, skip, is_line_start);
            let placed = &text[skip.min(text.len())..resume.unwrap_or(text.len())];
            Ok(SplitInline {
                new_box,
                resume_at: resume.map(ResumeStack::at),
                preserved_line_break,
                first_letter: placed.chars().next(),
                last_letter: placed.chars().last(),
                float_widths: FloatWidths::default(),
            })
        }
        BoxKind::Inline => {
            bx.margin.left.get_or_insert(0.0);
            bx.margin.right.get_or_insert(0.0);
            split_inline_box(ctx, &bx, position_x, max_x, bottom_space, skip_stack, cb, state)
        }
        BoxKind::Replaced(_) => {
            for margin in [
                &mut bx.margin.top,
                &mut bx.margin.right,
                &mut bx.margin.bottom,
                &mut bx.margin.left,
            ] {
                margin.get_or_insert(0.0);
            }
            replaced_width_height(&mut bx);
            bx.position_x = position_x;
            // The bottom margin edge of an image sits on the baseline.
            bx.baseline = Some(bx.margin_height());
            Ok(SplitInline {
                new_box: Some(bx),
                first_letter: Some(ATOMIC_LETTER),
                last_letter: Some(ATOMIC_LETTER),
                ..Default::default()
            })
        }
        other => {
            warn!("{} boxes cannot be laid out inside lines, dropping {:?}", other.name(), bx.id);
            Ok(SplitInline::default())
        }
    }
}

/// Fit the children of a line or inline box on the current line.
#[allow(clippy::too_many_arguments)]
fn split_inline_box(
    ctx: &mut LayoutContext,
    bx: &LayoutBox,
    position_x: f64,
    max_x: f64,
    bottom_space: f64,
    skip_stack: Option<&ResumeStack>,
    cb: &ContainingBlock,
    state: &mut LineState,
) -> LayoutResult<SplitInline> {
    let is_line = bx.is_line_box();
    let is_start = skip_stack.is_none();
    let (skip, mut child_skip_stack) = skip_stack.map_or((0, None), ResumeStack::unpack);
    let rtl = bx.style.direction == Direction::Rtl;

    // Shrink-to-fit widths come back with rounding errors: a tiny bit of
    // slack avoids breaking lines that were measured to fit.
    let mut max_x = max_x * (1.0 + 1e-6);
    let initial_position_x = position_x;
    let mut position_x = position_x;
    let left_spacing = bx.padding.left + bx.margin_left() + bx.border.left;
    let right_spacing = bx.padding.right + bx.margin_right() + bx.border.right;
    let content_box_left = position_x;

    let relative = bx.style.position == Position::Relative;
    let outer_absolutes = relative.then(|| std::mem::take(&mut state.absolutes));

    let source_children = Rc::clone(&bx.children);
    let mut children: Vec<Placed> = Vec::new();
    let mut waiting: Vec<Placed> = Vec::new();
    let mut resume_at: Option<ResumeStack> = None;
    let mut completed = true;
    let mut first_letter: Option<char> = None;
    let mut last_letter: Option<char> = None;
    let mut preserved_line_break = false;
    let mut float_widths = FloatWidths::default();

    for (index, source) in source_children.iter().enumerate().skip(skip) {
        let mut child = source.clone();
        child.position_y = bx.position_y;
        if !child.is_in_normal_flow() {
            inline_out_of_flow_layout(
                ctx,
                bx,
                cb,
                index,
                child,
                &mut children,
                &mut waiting,
                state,
                &mut float_widths,
                &mut max_x,
                &mut position_x,
                bottom_space,
            )?;
            continue;
        }

        let last_child = index + 1 == source_children.len();
        let available_max_x = max_x;
        let skip_here = child_skip_stack.take();
        let mark = state.mark(ctx);
        let mut split = split_inline_level(ctx, &child, position_x, available_max_x, bottom_space, skip_here, cb, state)?;

        let end_spacing = if rtl { left_spacing } else { right_spacing };
        if rtl {
            max_x -= split.float_widths.left;
        } else {
            max_x -= split.float_widths.right;
        }
        if last_child && end_spacing != 0.0 && split.resume_at.is_none() {
            // The end decoration of this box must fit after its last child.
            state.restore(ctx, mark);
            split = split_inline_level(
                ctx,
                &child,
                position_x,
                available_max_x - end_spacing,
                bottom_space,
                skip_here,
                cb,
                state,
            )?;
        }

        preserved_line_break |= split.preserved_line_break;

        let can_break = match (last_letter, split.first_letter) {
            _ if matches!(bx.style.white_space, WhiteSpace::Pre | WhiteSpace::Nowrap) => false,
            (Some(last), Some(first)) => ctx.shaper().can_break_between(last, first),
            _ => false,
        };
        if can_break {
            children.append(&mut waiting);
        }
        if first_letter.is_none() {
            first_letter = split.first_letter;
        }
        last_letter = split.last_letter;

        if let Some(mut new_child) = split.new_box {
            new_child.index = index;
            state.line_started = true;
            let trailing_whitespace = new_child
                .text()
                .and_then(|text| text.chars().last())
                .is_some_and(char::is_whitespace);
            let new_position_x = new_child.position_x + new_child.margin_width();
            if new_position_x > max_x && !trailing_whitespace {
                let previous = break_waiting_children(
                    ctx,
                    bx,
                    bottom_space,
                    skip_stack,
                    cb,
                    state,
                    &mut children,
                    &mut waiting,
                )?;
                if let Some(previous) = previous {
                    state.forget(&new_child);
                    resume_at = Some(previous);
                    completed = false;
                    break;
                }
            }
            position_x = new_position_x;
            waiting.push(Placed { index, bx: new_child });
        }

        if let Some(child_resume_at) = split.resume_at {
            children.append(&mut waiting);
            resume_at = Some(ResumeStack::nested(index, Some(child_resume_at)));
            completed = false;
            break;
        }
    }
    if completed {
        children.append(&mut waiting);
        resume_at = None;
    }

    if rtl && children.len() > 1 {
        let in_flow: Vec<usize> = (0..children.len())
            .filter(|&i| children[i].bx.is_in_normal_flow())
            .collect();
        if let Some(&first) = in_flow.first() {
            let mut cursor = children[first].bx.position_x;
            for &i in in_flow.iter().rev() {
                let dx = cursor - children[i].bx.position_x;
                children[i].bx.translate(dx, 0.0, true);
                cursor += children[i].bx.margin_width();
            }
        }
    }

    let is_end = resume_at.is_none();
    let mut new_box = bx.copy_with_children(children.into_iter().map(|placed| placed.bx).collect());
    new_box.remove_decoration(!is_start, !is_end);

    if is_line {
        let last_in_flow = if rtl {
            new_box.children.iter().find(|c| c.is_in_normal_flow())
        } else {
            new_box.children.iter().rev().find(|c| c.is_in_normal_flow())
        };
        let width = last_in_flow.map_or(0.0, |c| c.position_x + c.margin_width() - new_box.position_x);
        new_box.width = Some(width);
    } else {
        new_box.position_x = initial_position_x;
        let translation_needed = match bx.style.box_decoration_break {
            BoxDecorationBreak::Clone => true,
            BoxDecorationBreak::Slice => {
                if rtl {
                    is_end
                } else {
                    is_start
                }
            }
        };
        if translation_needed && !new_box.children.is_empty() {
            for child in Rc::make_mut(&mut new_box.children).iter_mut() {
                child.translate(left_spacing, 0.0, true);
            }
        }
        new_box.width = Some(position_x - content_box_left);
        new_box.translate(float_widths.left, 0.0, true);
    }

    let (line_height, baseline) = ctx.shaper().strut(&bx.style);
    new_box.baseline = Some(baseline);
    new_box.height = Some(bx.style.font_size);
    let half_leading = (line_height - bx.style.font_size) / 2.0;
    // Margins absorb the leading so that the margin height is the line height.
    new_box.margin.top = Some(half_leading - new_box.border.top - new_box.padding.top);
    new_box.margin.bottom = Some(half_leading - new_box.border.bottom - new_box.padding.bottom);

    if let Some(outer) = outer_absolutes {
        let ids = std::mem::replace(&mut state.absolutes, outer);
        state.placeholders.retain(|id| !ids.contains(id));
        let padding_box = ContainingBlock::padding_of(&new_box);
        absolute_layout(ctx, &mut new_box, &ids, &padding_box, &mut state.fixed, bottom_space)?;
    }

    Ok(SplitInline {
        new_box: Some(new_box),
        resume_at,
        preserved_line_break,
        first_letter,
        last_letter,
        float_widths,
    })
}

/// The line is too full: try to break inside the children waiting for a
/// break opportunity, from the last one back.
///
/// Returns where the next line starts. When nothing breaks, the waiting
/// children move to the next line whole, unless nothing else is on this
/// line: `waiting` is then left untouched and `None` returned.
#[allow(clippy::too_many_arguments)]
fn break_waiting_children(
    ctx: &mut LayoutContext,
    parent: &LayoutBox,
    bottom_space: f64,
    initial_skip_stack: Option<&ResumeStack>,
    cb: &ContainingBlock,
    state: &mut LineState,
    children: &mut Vec<Placed>,
    waiting: &mut Vec<Placed>,
) -> LayoutResult<Option<ResumeStack>> {
    for i in (0..waiting.len()).rev() {
        if waiting[i].bx.is_floated() {
            // A placed float stays on this line, with what precedes it.
            for gone in waiting.split_off(i + 1) {
                state.forget(&gone.bx);
            }
            children.append(waiting);
            break;
        }
        if !waiting[i].bx.is_in_normal_flow() || !can_break_inside(ctx, &waiting[i].bx) {
            continue;
        }
        let index = waiting[i].index;
        let Some(source) = parent.children.get(index) else {
            continue;
        };
        let child_skip_stack = ResumeStack::child_for(initial_skip_stack, index);
        let start_x = waiting[i].bx.position_x;
        // Fit the child in one point less each time, until it breaks.
        let mut max_x = start_x + waiting[i].bx.margin_width() - 1.0;
        let mut broken = None;
        while max_x > start_x {
            let mark = state.mark(ctx);
            let split = split_inline_level(ctx, source, start_x, max_x, bottom_space, child_skip_stack, cb, state)?;
            if let Some(resume_at) = split.resume_at {
                broken = Some((split.new_box, resume_at));
                break;
            }
            state.restore(ctx, mark);
            max_x -= 1.0;
        }
        let Some((new_child, resume_at)) = broken else {
            continue;
        };

        for gone in waiting.split_off(i) {
            state.forget(&gone.bx);
        }
        children.append(waiting);
        if let Some(mut new_child) = new_child {
            new_child.index = index;
            children.push(Placed { index, bx: new_child });
        }
        return Ok(Some(ResumeStack::nested(index, Some(resume_at))));
    }

    let Some(last) = children.last() else {
        return Ok(None);
    };
    let resume_at = ResumeStack::at(last.index + 1);
    for gone in waiting.drain(..) {
        state.forget(&gone.bx);
    }
    Ok(Some(resume_at))
}

/// Place an out-of-flow child met inside a line.
#[allow(clippy::too_many_arguments)]
fn inline_out_of_flow_layout(
    ctx: &mut LayoutContext,
    parent: &LayoutBox,
    cb: &ContainingBlock,
    index: usize,
    mut child: LayoutBox,
    children: &mut [Placed],
    waiting: &mut Vec<Placed>,
    state: &mut LineState,
    float_widths: &mut FloatWidths,
    max_x: &mut f64,
    position_x: &mut f64,
    bottom_space: f64,
) -> LayoutResult<()> {
    child.index = index;
    if child.is_absolutely_positioned() {
        child.position_x = *position_x;
        let id = child.id;
        let is_fixed = child.style.position == Position::Fixed;
        state.placeholders.push(id);
        waiting.push(Placed {
            index,
            bx: LayoutBox::placeholder(child),
        });
        if is_fixed {
            state.fixed.push(id);
        } else {
            state.absolutes.push(id);
        }
        return Ok(());
    }

    if child.is_floated() {
        child.position_x = *position_x;
        let mut measured = child.clone();
        resolve_percentages(&mut measured, cb.width, cb.height);
        let mut float_width = shrink_to_fit(ctx, &child, cb.width) + horizontal_decoration(&measured);
        // Trailing spaces of the line do not take room from the float.
        if let Some(last) = children
            .iter()
            .chain(waiting.iter())
            .filter(|placed| !placed.bx.is_floated())
            .last()
        {
            float_width -= trailing_whitespace_width(ctx, &last.bx);
        }

        if float_width > *max_x - *position_x || !state.waiting_floats.is_empty() {
            state.waiting_floats.push(child);
            return Ok(());
        }

        let source = child.clone();
        let (mut new_child, float_resume_at) =
            float_layout(ctx, child, cb, &mut state.absolutes, &mut state.fixed, bottom_space, None)?;
        new_child.index = index;
        if let Some(resume_at) = float_resume_at {
            ctx.broken_out_of_flow.insert(
                new_child.id,
                BrokenBox {
                    source,
                    containing_block: *cb,
                    resume_at,
                },
            );
        }

        let dx = new_child.margin_width().max(0.0);
        let side = new_child.style.float;
        match side {
            Float::Left => {
                float_widths.left += dx;
                // Nested inline boxes are moved by their own float widths.
                if parent.is_line_box() {
                    *position_x += dx;
                }
            }
            Float::Right => {
                float_widths.right += dx;
                *max_x -= dx;
            }
            Float::None => {}
        }
        let rtl = parent.style.direction == Direction::Rtl;
        if (side == Float::Left && !rtl) || (side == Float::Right && rtl) {
            for placed in children.iter_mut().chain(waiting.iter_mut()) {
                if placed.bx.is_in_normal_flow() {
                    placed.bx.translate(dx, 0.0, true);
                }
            }
        }
        waiting.push(Placed { index, bx: new_child });
        return Ok(());
    }

    if child.is_running() {
        ctx.add_running(child);
    }
    Ok(())
}

/// Cut the first line out of the text of `bx`, from byte `skip`.
///
/// Returns the text box for this line, the byte offset where the next line
/// starts and whether the line ends at a preserved line break.
fn split_text_box(
    ctx: &LayoutContext,
    bx: &LayoutBox,
    text: &str,
    available_width: f64,
    skip: usize,
    is_line_start: bool,
) -> (Option<LayoutBox>, Option<usize>, bool) {
    let rest = &text[skip.min(text.len())..];
    if bx.style.font_size == 0.0 || rest.is_empty() {
        return (None, None, false);
    }
    let split = ctx
        .shaper()
        .split_first_line(rest, &bx.style, Some(available_width), is_line_start);

    let new_box = (split.consumed > 0).then(|| {
        let mut new_box = bx.clone();
        new_box.kind = BoxKind::Text(TextData::new(&rest[..split.consumed]));
        new_box.width = Some(split.width);
        new_box.height = Some(split.height);
        let (line_height, _) = ctx.shaper().strut(&bx.style);
        let half_leading = (line_height - split.height) / 2.0;
        new_box.margin.top = Some(half_leading);
        new_box.margin.bottom = Some(half_leading);
        new_box.baseline = Some(split.baseline + half_leading);
        new_box
    });

    match split.resume_at {
        Some(resume) => {
            let resume = resume.min(rest.len());
            let between = &rest[split.consumed.min(resume)..resume];
            let preserved = split.consumed != resume && !between.trim_matches(' ').is_empty();
            (new_box, Some(resume + skip), preserved)
        }
        None => (new_box, None, false),
    }
}

/// Whether a line could break somewhere inside `bx`.
fn can_break_inside(ctx: &LayoutContext, bx: &LayoutBox) -> bool {
    if !bx.style.white_space.wraps() || bx.is_atomic() {
        return false;
    }
    match &bx.kind {
        BoxKind::Text(data) => ctx.shaper().can_break_text(&data.text),
        _ if bx.is_line() => bx.children.iter().any(|child| can_break_inside(ctx, child)),
        _ => false,
    }
}

fn is_zero(value: Dimension) -> bool {
    match value {
        Dimension::Pt(v) | Dimension::Percent(v) => v == 0.0,
        Dimension::Auto => true,
    }
}

/// A line holding no text, no atomic box and no inline box with edges takes
/// no room.
fn is_phantom_line_box(bx: &LayoutBox) -> bool {
    bx.children.iter().all(|child| match child.kind {
        BoxKind::Inline => {
            let style = &child.style;
            let edges = [style.margin.top, style.margin.right, style.margin.bottom, style.margin.left]
                .into_iter()
                .chain([style.padding.top, style.padding.right, style.padding.bottom, style.padding.left])
                .all(is_zero);
            let borders = style.border_width.horizontal() + style.border_width.vertical() == 0.0;
            edges && borders && is_phantom_line_box(child)
        }
        _ => !child.is_in_normal_flow(),
    })
}

/// Strip the collapsible spaces ending the line, and shrink the boxes
/// holding them.
fn remove_last_whitespace(ctx: &LayoutContext, line: &mut LayoutBox) {
    let mut path = Vec::new();
    let mut node: &LayoutBox = line;
    while node.is_line() {
        let Some(last) = node.children.len().checked_sub(1) else {
            return;
        };
        path.push(last);
        node = &node.children[last];
    }
    let BoxKind::Text(data) = &node.kind else {
        return;
    };
    if !node.style.white_space.collapses_spaces() {
        return;
    }
    let stripped = data.text.trim_end_matches(' ');
    if stripped.len() == data.text.len() {
        return;
    }
    let new_width = ctx.shaper().text_width(stripped, &node.style);
    let space_width = node.content_width() - new_width;
    let is_empty = stripped.is_empty();
    let stripped: Rc<str> = Rc::from(stripped);

    if let Some(text_box) = line.at_path_mut(&path) {
        if let BoxKind::Text(data) = &mut text_box.kind {
            data.text = stripped;
        }
        text_box.width = Some(new_width);
    }
    for depth in 0..path.len() {
        if let Some(ancestor) = line.at_path_mut(&path[..depth]) {
            ancestor.width = Some(ancestor.content_width() - space_width);
        }
    }
    if is_empty && line.style.direction == Direction::Rtl {
        line.translate(-space_width, 0.0, true);
    }
}

/// Horizontal offset of the line for `text-align`. Justified lines are
/// stretched in place instead.
fn text_align(line: &mut LayoutBox, available_width: f64, last: bool) -> f64 {
    if line.content_width() >= available_width {
        return 0.0;
    }
    let mut align = line.style.text_align;
    if last {
        align = match line.style.text_align_last {
            Some(align_last) => align_last,
            None if align == TextAlign::Justify => TextAlign::Start,
            None => align,
        };
    }
    let rtl = line.style.direction == Direction::Rtl;
    align = match align {
        TextAlign::Left if rtl => TextAlign::End,
        TextAlign::Left => TextAlign::Start,
        TextAlign::Right if rtl => TextAlign::Start,
        TextAlign::Right => TextAlign::End,
        other => other,
    };

    let offset = available_width - line.content_width();
    match align {
        TextAlign::Center => offset / 2.0,
        TextAlign::End => offset,
        TextAlign::Justify => {
            if line.style.white_space.collapses_spaces() {
                justify_line(line, offset);
            }
            0.0
        }
        _ => 0.0,
    }
}

fn justify_line(line: &mut LayoutBox, extra_width: f64) {
    let spaces = count_spaces(line);
    if spaces == 0 {
        return;
    }
    add_word_spacing(line, extra_width / spaces as f64, 0.0);
}

fn count_spaces(bx: &LayoutBox) -> usize {
    match &bx.kind {
        BoxKind::Text(data) => data.text.matches(' ').count(),
        _ if bx.is_line() => bx.children.iter().map(count_spaces).sum(),
        _ => 0,
    }
}

/// Widen every space by `spacing`, shifting what follows. Returns the
/// accumulated shift.
fn add_word_spacing(bx: &mut LayoutBox, spacing: f64, mut x_advance: f64) -> f64 {
    if let BoxKind::Text(data) = &mut bx.kind {
        let spaces = data.text.matches(' ').count();
        bx.position_x += x_advance;
        if spaces > 0 {
            data.justification_spacing = spacing;
            let extra = spacing * spaces as f64;
            x_advance += extra;
            bx.width = Some(bx.content_width() + extra);
        }
        return x_advance;
    }
    if bx.is_line() {
        bx.position_x += x_advance;
        let previous = x_advance;
        if !bx.children.is_empty() {
            for child in Rc::make_mut(&mut bx.children).iter_mut() {
                if child.is_in_normal_flow() {
                    x_advance = add_word_spacing(child, spacing, x_advance);
                }
            }
        }
        bx.width = Some(bx.content_width() + x_advance - previous);
        return x_advance;
    }
    bx.translate(x_advance, 0.0, false);
    x_advance
}

/// Place the boxes of a line vertically with the baseline at `y = 0`.
/// Returns `(bottom, top)`, the extent of their margin boxes.
fn line_box_verticality(ctx: &mut LayoutContext, line: &mut LayoutBox) -> (f64, f64) {
    let mut subtrees: Vec<Vec<usize>> = Vec::new();
    let (mut max_y, min_y) = aligned_subtree_verticality(ctx, line, &[], &mut subtrees, 0.0);

    // `top` and `bottom` aligned subtrees (and floats) are placed last,
    // against the extent of the rest of the line.
    let mut measured: Vec<(Vec<usize>, Option<(f64, f64)>)> = Vec::new();
    let mut i = 0;
    while i < subtrees.len() {
        let path = subtrees[i].clone();
        let floated = line.at_path(&path).is_some_and(LayoutBox::is_floated);
        let extent = (!floated).then(|| aligned_subtree_verticality(ctx, line, &path, &mut subtrees, 0.0));
        measured.push((path, extent));
        i += 1;
    }

    let highest = measured
        .iter()
        .filter_map(|(_, extent)| extent.map(|(max, min)| max - min))
        .fold(0.0, f64::max);
    if !measured.is_empty() {
        max_y = max_y.max(min_y + highest);
    }

    for (path, extent) in measured {
        let Some(bx) = line.at_path_mut(&path) else {
            continue;
        };
        let dy = match (bx.is_floated(), bx.style.vertical_align, extent) {
            (true, _, _) => min_y - bx.position_y,
            (false, VerticalAlign::Top, Some((_, sub_min))) => min_y - sub_min,
            (false, VerticalAlign::Bottom, Some((sub_max, _))) => max_y - sub_max,
            _ => 0.0,
        };
        if bx.is_floated() {
            bx.translate(0.0, dy, false);
            let moved = bx.clone();
            ctx.shapes.translate_floats_in(&moved, 0.0, dy, false);
        } else {
            translate_subtree(bx, dy);
        }
    }
    (max_y, min_y)
}

fn translate_subtree(bx: &mut LayoutBox, dy: f64) {
    if matches!(bx.kind, BoxKind::Inline) {
        bx.position_y += dy;
        if matches!(bx.style.vertical_align, VerticalAlign::Top | VerticalAlign::Bottom) && !bx.children.is_empty() {
            for child in Rc::make_mut(&mut bx.children).iter_mut() {
                translate_subtree(child, dy);
            }
        }
    } else {
        bx.translate(0.0, dy, true);
    }
}

fn aligned_subtree_verticality(
    ctx: &LayoutContext,
    root: &mut LayoutBox,
    path: &[usize],
    subtrees: &mut Vec<Vec<usize>>,
    baseline_y: f64,
) -> (f64, f64) {
    let Some(bx) = root.at_path_mut(path) else {
        return (baseline_y, baseline_y);
    };
    let (max_y, min_y) = inline_box_verticality(ctx, bx, path, subtrees, baseline_y);
    // The strut of the box itself counts.
    let top = baseline_y - bx.baseline.unwrap_or(0.0);
    let bottom = top + bx.margin_height();
    (
        max_y.map_or(bottom, |max| max.max(bottom)),
        min_y.map_or(top, |min| min.min(top)),
    )
}

/// Place the children of an inline box with its baseline at `baseline_y`.
fn inline_box_verticality(
    ctx: &LayoutContext,
    bx: &mut LayoutBox,
    path: &[usize],
    subtrees: &mut Vec<Vec<usize>>,
    baseline_y: f64,
) -> (Option<f64>, Option<f64>) {
    if !bx.is_line() || bx.children.is_empty() {
        return (None, None);
    }
    let parent_style = Rc::clone(&bx.style);
    let parent_baseline = bx.baseline.unwrap_or(0.0);
    let parent_content_top = bx.margin_top() + bx.border.top + bx.padding.top;
    let parent_height = bx.content_height();

    let (mut max_y, mut min_y): (Option<f64>, Option<f64>) = (None, None);
    for (i, child) in Rc::make_mut(&mut bx.children).iter_mut().enumerate() {
        let mut child_path = path.to_vec();
        child_path.push(i);
        if !child.is_in_normal_flow() {
            if child.is_floated() {
                subtrees.push(child_path);
            }
            continue;
        }

        let child_baseline = child.baseline.unwrap_or(0.0);
        let vertical_align = child.style.vertical_align;
        let child_baseline_y = match vertical_align {
            VerticalAlign::Baseline => baseline_y,
            VerticalAlign::Middle => {
                let one_ex = ctx.shaper().x_height(&parent_style);
                let top = baseline_y - (one_ex + child.margin_height()) / 2.0;
                top + child_baseline
            }
            VerticalAlign::TextTop => {
                let top = baseline_y - parent_baseline + parent_content_top;
                top + child_baseline
            }
            VerticalAlign::TextBottom => {
                let bottom = baseline_y - parent_baseline + parent_content_top + parent_height;
                bottom - child.margin_height() + child_baseline
            }
            VerticalAlign::Top | VerticalAlign::Bottom => 0.0,
            VerticalAlign::Length(raise) => baseline_y - raise,
        };

        let top = child_baseline_y - child_baseline;
        if child.is_atomic() {
            let dy = top - child.position_y;
            child.translate(0.0, dy, false);
        } else {
            child.position_y = top;
        }

        if matches!(vertical_align, VerticalAlign::Top | VerticalAlign::Bottom) {
            subtrees.push(child_path);
            continue;
        }

        let bottom = top + child.margin_height();
        min_y = Some(min_y.map_or(top, |min| min.min(top)));
        max_y = Some(max_y.map_or(bottom, |max| max.max(bottom)));
        if matches!(child.kind, BoxKind::Inline) {
            let (children_max, children_min) = inline_box_verticality(ctx, child, &child_path, subtrees, child_baseline_y);
            if let Some(children_min) = children_min {
                min_y = Some(min_y.map_or(children_min, |min| min.min(children_min)));
            }
            if let Some(children_max) = children_max {
                max_y = Some(max_y.map_or(children_max, |max| max.max(children_max)));
            }
        }
    }
    (max_y, min_y)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::boxes::{LineData, ReplacedData};
    use crate::layout::tests::{context, id, line, text};
    use crate::style::{ComputedStyle, Style};

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

    fn styled_line(style: Style, children: Vec<LayoutBox>) -> LayoutBox {
        let mut bx = line(children);
        bx.style = Rc::new(style.resolve(None));
        bx.kind = BoxKind::Line(LineData::default());
        bx
    }

    fn lines_of(line_box: &LayoutBox, width: f64) -> Vec<(LayoutBox, Option<ResumeStack>)> {
        let mut ctx = context(1000.0);
        let (mut abs, mut fixed) = (Vec::new(), Vec::new());
        let mut lines = LineIterator::new(line_box, 0.0, 0.0, None, cb(width));
        let mut out = Vec::new();
        while let Some(next) = lines.next_line(&mut ctx, &mut abs, &mut fixed).unwrap() {
            out.push(next);
        }
        out
    }

    fn text_of(bx: &LayoutBox) -> &str {
        bx.text().unwrap_or_default()
    }

    #[test]
    fn text_wraps_at_the_last_opportunity_that_fits() {
        // 6pt per character: "aaa bbb" is 42pt, "aaa bbb ccc" is 66pt.
        let lines = lines_of(&line(vec![text("aaa bbb ccc")]), 50.0);
        assert_eq!(lines.len(), 2);

        let (first, resume_at) = &lines[0];
        assert_eq!(resume_at, &Some(ResumeStack::nested(0, Some(ResumeStack::at(8)))));
        assert_eq!(text_of(&first.children[0]), "aaa bbb");
        assert_eq!(first.content_width(), 42.0);
        assert!((first.content_height() - 14.4).abs() < 1e-9);

        let (second, resume_at) = &lines[1];
        assert!(resume_at.is_none());
        assert_eq!(text_of(&second.children[0]), "ccc");
        assert!((second.position_y - 14.4).abs() < 1e-9);
    }

    #[test]
    fn resuming_skips_the_spaces_opening_a_line() {
        let ctx = context(1000.0);
        let bx = line(vec![text("aaa   bbb")]);
        let skip = ResumeStack::nested(0, Some(ResumeStack::at(3)));
        let skipped = skip_first_whitespace(&ctx, &bx, Some(&skip)).unwrap();
        assert_eq!(skipped, Some(Some(ResumeStack::nested(0, Some(ResumeStack::at(6))))));

        let done = ResumeStack::nested(0, Some(ResumeStack::at(9)));
        assert_eq!(skip_first_whitespace(&ctx, &bx, Some(&done)).unwrap(), None);
    }

    #[test]
    fn centered_lines_share_the_free_space() {
        let bx = styled_line(
            Style {
                text_align: Some(TextAlign::Center),
                ..Default::default()
            },
            vec![text("abc")],
        );
        let lines = lines_of(&bx, 100.0);
        // (100 - 18) / 2
        assert_eq!(lines[0].0.children[0].position_x, 41.0);
    }

    #[test]
    fn justified_lines_stretch_their_spaces() {
        let bx = styled_line(
            Style {
                text_align: Some(TextAlign::Justify),
                ..Default::default()
            },
            vec![text("aaa bbb ccc")],
        );
        let lines = lines_of(&bx, 50.0);
        let first = &lines[0].0;
        assert_eq!(first.content_width(), 50.0);
        let BoxKind::Text(data) = &first.children[0].kind else {
            panic!("expected a text box");
        };
        assert_eq!(data.justification_spacing, 8.0);

        // The last line is not justified.
        let last = &lines[1].0;
        assert_eq!(last.content_width(), 18.0);
    }

    #[test]
    fn trailing_spaces_do_not_count_in_the_line_width() {
        let lines = lines_of(&line(vec![text("abc   ")]), 100.0);
        assert_eq!(lines[0].0.content_width(), 18.0);
        assert_eq!(text_of(&lines[0].0.children[0]), "abc");
    }

    #[test]
    fn lines_of_spaces_take_no_room() {
        let lines = lines_of(&line(vec![text("   ")]), 100.0);
        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0].0.content_height(), 0.0);
        assert!(lines[0].1.is_none());
    }

    #[test]
    fn first_line_is_indented() {
        let bx = styled_line(
            Style {
                text_indent: Some(Dimension::Pt(12.0)),
                ..Default::default()
            },
            vec![text("aaa bbb ccc")],
        );
        let lines = lines_of(&bx, 50.0);
        // "aaa bbb" no longer fits after the indent.
        assert_eq!(lines[0].0.children[0].position_x, 12.0);
        assert_eq!(text_of(&lines[0].0.children[0]), "aaa");
        assert_eq!(lines[1].0.children[0].position_x, 0.0);
    }

    #[test]
    fn atomic_inlines_sit_on_the_baseline() {
        let image = LayoutBox::new(
            id(),
            BoxKind::Replaced(ReplacedData {
                intrinsic_width: 20.0,
                intrinsic_height: 30.0,
            }),
            Rc::new(ComputedStyle {
                display: crate::style::Display::Inline,
                ..Default::default()
            }),
        );
        let lines = lines_of(&line(vec![text("ab"), image]), 200.0);
        let first = &lines[0].0;
        // The image rises 30pt above the baseline, the strut goes 3.6pt
        // below it.
        assert!((first.content_height() - 33.6).abs() < 1e-9);
        let image = &first.children[1];
        assert_eq!(image.position_x, 12.0);
        assert!(image.position_y.abs() < 1e-9);
    }

    #[test]
    fn inline_boxes_carry_their_decoration() {
        let inline = LayoutBox::new(
            id(),
            BoxKind::Inline,
            Rc::new(
                Style {
                    padding: Some(crate::style::EdgeValues {
                        top: Dimension::Pt(0.0),
                        right: Dimension::Pt(4.0),
                        bottom: Dimension::Pt(0.0),
                        left: Dimension::Pt(4.0),
                    }),
                    ..Default::default()
                }
                .resolve(None),
            ),
        )
        .with_children(vec![text("ab")]);
        let lines = lines_of(&line(vec![inline, text("c")]), 200.0);
        let first = &lines[0].0;
        assert_eq!(first.children[0].content_width(), 12.0);
        assert_eq!(first.children[0].children[0].position_x, 4.0);
        assert_eq!(first.children[1].position_x, 20.0);
        assert_eq!(first.content_width(), 26.0);
    }
}
