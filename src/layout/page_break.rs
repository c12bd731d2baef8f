//! # Page Break Decisions
//!
//! Where a page may end between block-level siblings, which `break-*` value
//! wins at a given boundary, and how to fall back to an earlier opportunity
//! when the natural break point is forbidden.

use crate::boxes::{BoxId, LayoutBox};
use crate::error::LayoutResult;
use crate::style::{BreakValue, Position};

use super::footnotes::unlayout_footnote;
use super::resume::ResumeStack;
use super::LayoutContext;

/// Boxes whose break values meet at the margins between siblings.
fn is_parallel(bx: &LayoutBox) -> bool {
    bx.is_block_level()
}

/// The `break-after`/`break-before` value that wins at the boundary between
/// `before` and `after`, looking through the last descendants of `before` and
/// the first descendants of `after`.
///
/// Forced side breaks beat `page`, which beats the `avoid` values, which beat
/// `auto`. Among side values, the latest in tree order wins.
pub fn block_level_page_break(before: Option<&LayoutBox>, after: Option<&LayoutBox>) -> BreakValue {
    let mut values = Vec::new();

    let mut node = before;
    while let Some(bx) = node.filter(|b| is_parallel(b)) {
        values.push(bx.style.break_after);
        node = bx.children.last();
    }
    values.reverse();

    let mut node = after;
    while let Some(bx) = node.filter(|b| is_parallel(b)) {
        values.push(bx.style.break_before);
        node = bx.children.first();
    }

    values.into_iter().fold(BreakValue::Auto, |result, value| {
        if wins_over(value, result) {
            value
        } else {
            result
        }
    })
}

fn wins_over(value: BreakValue, current: BreakValue) -> bool {
    use BreakValue::*;
    match value {
        Left | Right | Recto | Verso => true,
        Page => matches!(current, Auto | Avoid | AvoidPage),
        Avoid | AvoidPage => current == Auto,
        Auto => false,
    }
}

/// Whether the used page name changes between two siblings.
pub fn block_level_page_name_changes(before: &LayoutBox, after: &LayoutBox) -> bool {
    let (_, before_page) = before.page_values();
    let (after_page, _) = after.page_values();
    before_page != after_page
}

/// Find the last allowed break among laid-out `children`, because the break
/// after them is forbidden.
///
/// Returns the children kept on this page and where to resume, or `None`
/// when no earlier break is allowed. Placeholders, floats and footnotes of
/// the dropped children are forgotten.
pub fn find_earlier_page_break(
    ctx: &mut LayoutContext,
    children: &[LayoutBox],
    absolute_boxes: &mut Vec<BoxId>,
    fixed_boxes: &mut Vec<BoxId>,
) -> LayoutResult<Option<(Vec<LayoutBox>, ResumeStack)>> {
    if let Some(first) = children.first().filter(|c| c.is_line_box()) {
        // Line boxes inherit `orphans` and `widows` from their container.
        let orphans = first.style.orphans as usize;
        let widows = first.style.widows as usize;
        let keep = children.len().saturating_sub(widows);
        if keep < orphans || keep == 0 {
            return Ok(None);
        }
        let kept = children[..keep].to_vec();
        let resume = ResumeStack::nested(0, kept.last().and_then(|l| l.line_resume_at().cloned()));
        remove_placeholders(ctx, &children[keep..], absolute_boxes, fixed_boxes)?;
        return Ok(Some((kept, resume)));
    }

    let mut previous_in_flow: Option<&LayoutBox> = None;
    for index in (0..children.len()).rev() {
        let child = &children[index];
        if child.is_in_normal_flow() {
            let page_break = block_level_page_break(Some(child), previous_in_flow);
            if let Some(next) = previous_in_flow {
                if !page_break.avoids_page_break() {
                    // Break after this child.
                    let kept = children[..=index].to_vec();
                    let resume = ResumeStack::at(next.index);
                    remove_placeholders(ctx, &children[index + 1..], absolute_boxes, fixed_boxes)?;
                    return Ok(Some((kept, resume)));
                }
            }
            previous_in_flow = Some(child);

            let breakable = !child.style.break_inside.avoids_page_break();
            if breakable && child.is_block_container() {
                if let Some((grandchildren, resume)) =
                    find_earlier_page_break(ctx, &child.children, absolute_boxes, fixed_boxes)?
                {
                    let mut kept = children[..index].to_vec();
                    kept.push(child.copy_with_children(grandchildren));
                    let resume = ResumeStack::nested(child.index, Some(resume));
                    remove_placeholders(ctx, &children[index + 1..], absolute_boxes, fixed_boxes)?;
                    return Ok(Some((kept, resume)));
                }
            }
        }
    }
    Ok(None)
}

/// Forget what the layout of `boxes` registered in the context: their
/// absolute and fixed placeholders, their footnotes and their broken floats.
pub fn remove_placeholders(
    ctx: &mut LayoutContext,
    boxes: &[LayoutBox],
    absolute_boxes: &mut Vec<BoxId>,
    fixed_boxes: &mut Vec<BoxId>,
) -> LayoutResult<()> {
    for bx in boxes {
        remove_placeholders(ctx, bx.traversal_children(), absolute_boxes, fixed_boxes)?;
        match bx.style.position {
            Position::Absolute => absolute_boxes.retain(|&id| id != bx.id),
            Position::Fixed => fixed_boxes.retain(|&id| id != bx.id),
            _ => {}
        }
        if let Some(footnote) = bx.footnote {
            unlayout_footnote(ctx, footnote)?;
        }
        ctx.broken_out_of_flow.remove(&bx.id);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::boxes::BoxKind;
    use crate::layout::tests::{context, id, line};
    use crate::layout::BrokenBox;
    use crate::boxes::LineData;
    use crate::style::{ComputedStyle, Style};
    use std::rc::Rc;

    fn block(style: Style, children: Vec<LayoutBox>) -> LayoutBox {
        LayoutBox::new(id(), BoxKind::Block, Rc::new(style.resolve(None))).with_children(children)
    }

    fn breaks(before: Option<BreakValue>, after: Option<BreakValue>) -> (LayoutBox, LayoutBox) {
        let a = block(
            Style {
                break_after: before,
                ..Default::default()
            },
            vec![],
        );
        let b = block(
            Style {
                break_before: after,
                ..Default::default()
            },
            vec![],
        );
        (a, b)
    }

    #[test]
    fn auto_boundary() {
        let (a, b) = breaks(None, None);
        assert_eq!(block_level_page_break(Some(&a), Some(&b)), BreakValue::Auto);
    }

    #[test]
    fn page_beats_avoid() {
        let (a, b) = breaks(Some(BreakValue::Avoid), Some(BreakValue::Page));
        assert_eq!(block_level_page_break(Some(&a), Some(&b)), BreakValue::Page);
        let (a, b) = breaks(Some(BreakValue::Page), Some(BreakValue::Avoid));
        assert_eq!(block_level_page_break(Some(&a), Some(&b)), BreakValue::Page);
    }

    #[test]
    fn later_side_value_wins() {
        let (a, b) = breaks(Some(BreakValue::Left), Some(BreakValue::Right));
        assert_eq!(block_level_page_break(Some(&a), Some(&b)), BreakValue::Right);
    }

    #[test]
    fn values_of_nested_first_and_last_children_count() {
        let inner = block(
            Style {
                break_after: Some(BreakValue::Avoid),
                ..Default::default()
            },
            vec![],
        );
        let outer = block(Style::default(), vec![inner]);
        let next = block(Style::default(), vec![]);
        assert_eq!(block_level_page_break(Some(&outer), Some(&next)), BreakValue::Avoid);
        // Line boxes stop the descent.
        let with_line = block(Style::default(), vec![line(vec![])]);
        assert_eq!(block_level_page_break(Some(&with_line), None), BreakValue::Auto);
    }

    #[test]
    fn earlier_break_skips_avoided_boundaries() {
        let mut ctx = context(1000.0);
        let mut children: Vec<LayoutBox> = (0..3)
            .map(|_| block(Style::default(), vec![]))
            .collect();
        children[1] = block(
            Style {
                break_after: Some(BreakValue::Avoid),
                ..Default::default()
            },
            vec![],
        );
        for (i, child) in children.iter_mut().enumerate() {
            child.index = i;
        }
        let (mut abs, mut fixed) = (Vec::new(), Vec::new());
        let (kept, resume) = find_earlier_page_break(&mut ctx, &children, &mut abs, &mut fixed).unwrap().unwrap();
        // The 1|2 boundary is avoided, 0|1 is allowed.
        assert_eq!(kept.len(), 1);
        assert_eq!(resume, ResumeStack::at(1));
    }

    #[test]
    fn earlier_break_in_lines_respects_widows_and_orphans() {
        let mut ctx = context(1000.0);
        let mut lines: Vec<LayoutBox> = (0..5)
            .map(|i| {
                let mut l = line(vec![]);
                l.kind = BoxKind::Line(LineData {
                    resume_at: Some(ResumeStack::at(i + 1)),
                });
                l
            })
            .collect();
        lines[4].kind = BoxKind::Line(LineData::default());
        let (mut abs, mut fixed) = (Vec::new(), Vec::new());
        let (kept, resume) = find_earlier_page_break(&mut ctx, &lines, &mut abs, &mut fixed).unwrap().unwrap();
        assert_eq!(kept.len(), 3);
        assert_eq!(resume, ResumeStack::nested(0, Some(ResumeStack::at(3))));

        assert!(find_earlier_page_break(&mut ctx, &lines[..3], &mut abs, &mut fixed).unwrap().is_none());
    }

    #[test]
    fn removing_placeholders_forgets_registrations() {
        let mut ctx = context(1000.0);
        let absolute = LayoutBox::new(
            id(),
            BoxKind::Block,
            Rc::new(ComputedStyle {
                position: Position::Absolute,
                ..Default::default()
            }),
        );
        let placeholder = LayoutBox::placeholder(absolute.clone());
        let float = block(
            Style {
                float: Some(crate::style::Float::Left),
                ..Default::default()
            },
            vec![],
        );
        ctx.broken_out_of_flow.insert(
            float.id,
            BrokenBox {
                source: float.clone(),
                containing_block: ctx.page_box,
                resume_at: ResumeStack::at(0),
            },
        );
        let parent = block(Style::default(), vec![placeholder, float]);
        let mut abs = vec![absolute.id];
        let mut fixed = Vec::new();
        remove_placeholders(&mut ctx, &[parent], &mut abs, &mut fixed).unwrap();
        assert!(abs.is_empty());
        assert!(ctx.broken_out_of_flow.is_empty());
    }
}
