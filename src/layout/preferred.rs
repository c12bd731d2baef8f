//! # Preferred Widths
//!
//! Min-content and max-content widths, and the shrink-to-fit width built from
//! them. Used to size floats, absolutely positioned boxes and flex items
//! whose width is `auto`.

use crate::boxes::{BoxKind, LayoutBox};
use crate::style::Dimension;

use super::LayoutContext;

/// `min(max(min-content, available), max-content)`.
pub fn shrink_to_fit(ctx: &LayoutContext, bx: &LayoutBox, available: f64) -> f64 {
    min_content_width(ctx, bx, false)
        .max(available)
        .min(max_content_width(ctx, bx, false))
}

/// Width when breaking at every opportunity.
pub fn min_content_width(ctx: &LayoutContext, bx: &LayoutBox, outer: bool) -> f64 {
    content_width(ctx, bx, outer, true)
}

/// Width when breaking only at forced breaks.
pub fn max_content_width(ctx: &LayoutContext, bx: &LayoutBox, outer: bool) -> f64 {
    content_width(ctx, bx, outer, false)
}

fn content_width(ctx: &LayoutContext, bx: &LayoutBox, outer: bool, minimum: bool) -> f64 {
    match &bx.kind {
        BoxKind::Line(_) | BoxKind::Inline => {
            let mut widths = inline_line_widths(ctx, bx, minimum, true);
            if !minimum {
                if let Some(last) = widths.last_mut() {
                    *last -= trailing_whitespace_width(ctx, bx);
                }
            }
            let widest = widths.into_iter().fold(0.0, f64::max);
            adjust(bx, outer, widest)
        }
        BoxKind::Replaced(data) => {
            let width = bx.style.width.fixed().unwrap_or(data.intrinsic_width);
            adjust(bx, outer, width)
        }
        BoxKind::Flex if !minimum => {
            // A row lays its items side by side.
            let sum: f64 = in_flow_children(bx)
                .map(|child| content_width(ctx, child, true, false))
                .sum();
            let gaps = bx.style.column_gap * bx.children.len().saturating_sub(1) as f64;
            adjust(bx, outer, explicit_width(bx).unwrap_or(sum + gaps))
        }
        BoxKind::Placeholder(p) => content_width(ctx, p.boxed(), outer, minimum),
        BoxKind::Text(_) => {
            let wrapped = std::slice::from_ref(bx);
            let widths = text_line_widths(ctx, wrapped, minimum, true);
            widths.into_iter().fold(0.0, f64::max)
        }
        _ => {
            let width = explicit_width(bx).unwrap_or_else(|| {
                in_flow_children(bx)
                    .map(|child| content_width(ctx, child, true, minimum))
                    .fold(0.0, f64::max)
            });
            adjust(bx, outer, width)
        }
    }
}

fn in_flow_children(bx: &LayoutBox) -> impl Iterator<Item = &LayoutBox> {
    bx.children.iter().filter(|c| !c.is_absolutely_positioned())
}

/// A fixed `width`; percentages count as `auto` here.
fn explicit_width(bx: &LayoutBox) -> Option<f64> {
    match bx.style.width {
        Dimension::Pt(width) => Some(width),
        _ => None,
    }
}

/// Clamp `width` by min and max widths, and add the horizontal margins,
/// borders and padding when `outer` is set.
fn adjust(bx: &LayoutBox, outer: bool, width: f64) -> f64 {
    let style = &bx.style;
    let min = style.min_width.fixed().unwrap_or(0.0);
    let max = style.max_width.fixed().unwrap_or(f64::INFINITY);
    let width = min.max(width.min(max));
    if !outer {
        return width;
    }
    let mut outer_width = width + style.border_width.left + style.border_width.right;
    let mut percentages = 0.0;
    for value in [
        style.margin.left,
        style.margin.right,
        style.padding.left,
        style.padding.right,
    ] {
        match value {
            Dimension::Pt(v) => outer_width += v,
            Dimension::Percent(p) => percentages += p,
            Dimension::Auto => {}
        }
    }
    if percentages < 100.0 {
        outer_width / (1.0 - percentages / 100.0)
    } else {
        0.0
    }
}

/// Widths of the lines of an inline formatting context, split at forced
/// breaks (and at every opportunity when `minimum` is set).
fn inline_line_widths(ctx: &LayoutContext, bx: &LayoutBox, minimum: bool, is_line_start: bool) -> Vec<f64> {
    let mut text_indent = match (&bx.kind, bx.style.text_indent) {
        (BoxKind::Line(_), Dimension::Pt(indent)) => indent,
        _ => 0.0,
    };
    text_line_widths(ctx, &bx.children, minimum, is_line_start)
        .into_iter()
        .enumerate()
        .map(|(i, width)| {
            if i == 0 {
                let indent = std::mem::take(&mut text_indent);
                width + indent
            } else {
                width
            }
        })
        .collect()
}

fn text_line_widths(ctx: &LayoutContext, children: &[LayoutBox], minimum: bool, mut is_line_start: bool) -> Vec<f64> {
    let mut out = Vec::new();
    let mut current_line = 0.0;
    for child in children {
        if child.is_absolutely_positioned() {
            continue;
        }
        let lines: Vec<f64> = match &child.kind {
            BoxKind::Inline => {
                let mut lines = text_line_widths(ctx, &child.children, minimum, is_line_start);
                let decoration = adjust(child, true, 0.0);
                if let Some(first) = lines.first_mut() {
                    *first += decoration;
                }
                lines
            }
            BoxKind::Text(_) => {
                let text = ctx.text_of(child);
                let style = &child.style;
                let mut text: &str = &text;
                if is_line_start && style.white_space.collapses_spaces() {
                    text = text.trim_start_matches(' ');
                }
                if minimum && text == " " {
                    vec![0.0, 0.0]
                } else {
                    let max_width = if minimum { Some(0.0) } else { None };
                    let mut lines = Vec::new();
                    let mut start = 0;
                    loop {
                        let split = ctx.shaper().split_first_line(&text[start..], style, max_width, start == 0 && is_line_start);
                        lines.push(split.width);
                        match split.resume_at {
                            Some(resume) if resume > 0 => start += resume,
                            _ => break,
                        }
                    }
                    lines
                }
            }
            _ => {
                // Atomic inlines have break opportunities on both sides.
                let width = max_content_width(ctx, child, true);
                if minimum {
                    vec![0.0, width, 0.0]
                } else {
                    vec![width]
                }
            }
        };
        let Some((&first, rest)) = lines.split_first() else {
            continue;
        };
        current_line += first;
        if let Some((&last, middle)) = rest.split_last() {
            out.push(current_line);
            out.extend_from_slice(middle);
            current_line = last;
        }
        is_line_start = lines.last().is_some_and(|&w| w == 0.0);
    }
    out.push(current_line);
    out
}

/// Width of the collapsible spaces ending the inline content of `bx`.
pub(crate) fn trailing_whitespace_width(ctx: &LayoutContext, bx: &LayoutBox) -> f64 {
    let mut node = bx;
    while node.is_line() {
        match node.children.last() {
            Some(last) => node = last,
            None => return 0.0,
        }
    }
    if !matches!(node.kind, BoxKind::Text(_)) || !node.style.white_space.collapses_spaces() {
        return 0.0;
    }
    let text = ctx.text_of(node);
    let stripped = text.trim_end_matches(' ');
    ctx.shaper().text_width(&text[stripped.len()..], &node.style)
}
