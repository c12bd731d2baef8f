//! # Footnotes
//!
//! Footnote bodies live outside the flow until their call is laid out. A
//! line holding a call moves the body into the footnote area of the current
//! page, which grows upwards from the page bottom and so shrinks the room
//! left for content. Bodies that do not fit are *reported* and laid out first
//! on the next page.

use std::collections::HashMap;

use log::debug;

use crate::boxes::{BoxId, LayoutBox};
use crate::error::{LayoutError, LayoutResult};
use crate::style::FootnotePolicy;

use super::block::block_level_layout;
use super::LayoutContext;

#[derive(Debug, Clone, Default)]
pub struct FootnoteState {
    bodies: HashMap<BoxId, LayoutBox>,
    /// Bodies whose call has not been laid out yet.
    waiting: Vec<BoxId>,
    /// Bodies in the footnote area of the current page.
    current: Vec<BoxId>,
    /// Bodies pushed to the next page.
    reported: Vec<BoxId>,
    /// The footnote area of the current page, without children.
    area: Option<LayoutBox>,
    /// Room the laid-out area takes from the page.
    reserved: f64,
}

impl FootnoteState {
    pub fn new(bodies: HashMap<BoxId, LayoutBox>, order: Vec<BoxId>) -> Self {
        Self {
            bodies,
            waiting: order,
            ..Default::default()
        }
    }

    pub fn is_waiting(&self, id: BoxId) -> bool {
        self.waiting.contains(&id)
    }

    pub fn has_waiting(&self) -> bool {
        !self.waiting.is_empty()
    }

    pub fn has_reported(&self) -> bool {
        !self.reported.is_empty()
    }

    pub fn reported(&self) -> &[BoxId] {
        &self.reported
    }

    pub fn current(&self) -> &[BoxId] {
        &self.current
    }

    /// How the call of a body behaves when the body does not fit.
    pub fn policy(&self, id: BoxId) -> FootnotePolicy {
        self.bodies
            .get(&id)
            .map_or(FootnotePolicy::Auto, |body| body.style.footnote_policy)
    }

    /// The current area holding the current bodies, not laid out.
    fn area_with_bodies(&self) -> LayoutResult<Option<LayoutBox>> {
        let Some(area) = &self.area else {
            return Ok(None);
        };
        let mut bodies = Vec::with_capacity(self.current.len());
        for (index, id) in self.current.iter().enumerate() {
            let mut body = self.bodies.get(id).cloned().ok_or(LayoutError::UnknownFootnote(*id))?;
            body.index = index;
            bodies.push(body);
        }
        Ok(Some(area.copy_with_children(bodies)))
    }

    /// Restore the state saved by `clone` before a speculative page layout.
    pub(crate) fn restore(&mut self, saved: FootnoteState) {
        *self = saved;
    }
}

/// Start the footnote area of a new page, and lay out the bodies reported by
/// the previous page.
pub(crate) fn start_page(ctx: &mut LayoutContext, area: LayoutBox) -> LayoutResult<()> {
    ctx.footnotes.current.clear();
    ctx.footnotes.area = Some(area);
    ctx.footnotes.reserved = 0.0;

    let reported = std::mem::take(&mut ctx.footnotes.reported);
    for (i, &id) in reported.iter().enumerate() {
        ctx.footnotes.waiting.push(id);
        let overflow = layout_footnote(ctx, id)?;
        if overflow && i != 0 {
            report_footnote(ctx, id)?;
            ctx.footnotes.reported = reported[i..].to_vec();
            for later in &reported[i + 1..] {
                ctx.footnotes.waiting.retain(|w| w != later);
            }
            break;
        }
    }
    Ok(())
}

/// Move a body into the footnote area of the current page. Returns whether
/// the area overflows its maximum height.
pub fn layout_footnote(ctx: &mut LayoutContext, id: BoxId) -> LayoutResult<bool> {
    ctx.footnotes.waiting.retain(|&w| w != id);
    ctx.footnotes.current.push(id);
    update_footnote_area(ctx)
}

/// Take a body back out of the layout, and put it back on the waiting list.
pub fn unlayout_footnote(ctx: &mut LayoutContext, id: BoxId) -> LayoutResult<()> {
    if ctx.footnotes.waiting.contains(&id) {
        return Ok(());
    }
    ctx.footnotes.waiting.push(id);
    if ctx.footnotes.current.contains(&id) {
        ctx.footnotes.current.retain(|&c| c != id);
    } else {
        ctx.footnotes.reported.retain(|&r| r != id);
    }
    update_footnote_area(ctx)?;
    Ok(())
}

/// Push a body to the next page.
pub fn report_footnote(ctx: &mut LayoutContext, id: BoxId) -> LayoutResult<()> {
    debug!("footnote {:?} moves to the next page", id);
    ctx.footnotes.current.retain(|&c| c != id);
    ctx.footnotes.reported.push(id);
    update_footnote_area(ctx)?;
    Ok(())
}

/// Lay out the footnote area again and move the page bottom above it.
/// Returns whether the bodies overflow the area.
pub fn update_footnote_area(ctx: &mut LayoutContext) -> LayoutResult<bool> {
    ctx.page_bottom += ctx.footnotes.reserved;
    ctx.footnotes.reserved = 0.0;
    if ctx.footnotes.current.is_empty() {
        return Ok(false);
    }
    let Some(area) = ctx.footnotes.area_with_bodies()? else {
        return Ok(false);
    };
    let Some(laid_out) = lay_out_area(ctx, &area)? else {
        return Ok(false);
    };
    ctx.footnotes.reserved = laid_out.margin_height();
    ctx.page_bottom -= ctx.footnotes.reserved;

    let overflow = laid_out.children.last().is_some_and(|last| {
        last.position_y + last.margin_height()
            > laid_out.position_y + laid_out.margin_height() - laid_out.margin_bottom()
    });
    Ok(overflow)
}

/// The final footnote area of the current page, moved above the page
/// bottom. `None` when the page has no footnotes.
pub(crate) fn finish_page(ctx: &mut LayoutContext) -> LayoutResult<Option<LayoutBox>> {
    if ctx.footnotes.current.is_empty() {
        return Ok(None);
    }
    let Some(area) = ctx.footnotes.area_with_bodies()? else {
        return Ok(None);
    };
    let Some(mut laid_out) = lay_out_area(ctx, &area)? else {
        return Ok(None);
    };
    let height = laid_out.margin_height();
    laid_out.translate(0.0, -height, false);
    Ok(Some(laid_out))
}

fn lay_out_area(ctx: &mut LayoutContext, area: &LayoutBox) -> LayoutResult<Option<LayoutBox>> {
    let cb = ctx.page_box;
    let (mut absolute_boxes, mut fixed_boxes, mut adjoining) = (Vec::new(), Vec::new(), Vec::new());
    let (laid_out, _) = block_level_layout(
        ctx,
        area,
        f64::NEG_INFINITY,
        None,
        &cb,
        true,
        &mut absolute_boxes,
        &mut fixed_boxes,
        &mut adjoining,
        false,
    )?;
    Ok(laid_out)
}
