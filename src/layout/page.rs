//! # Page Driver
//!
//! Makes pages one at a time. Each page gets its page box and footnote area,
//! continues the broken floats and absolute boxes of the previous page, then
//! runs the block fragmentation loop on the root from the resume stack the
//! previous page left behind.
//!
//! The per-page inputs (resume stack, break directive, page side, counters)
//! are cached in a [`PageMaker`] entry, so that a later pass can remake only
//! the pages whose inputs changed. Generated content reading page counters
//! can change what fits, so [`layout_document`] repeats passes until the
//! cached entries stop moving.

use std::collections::BTreeMap;
use std::rc::Rc;

use log::{debug, info, warn};
use serde::Serialize;

use crate::boxes::{BoxId, BoxKind, LayoutBox, LineData, TextData};
use crate::counters::{render, CounterValues};
use crate::error::{LayoutError, LayoutResult};
use crate::model::{ContentItem, Document, MarginBoxPosition, MarginBoxSpec, PageSide, PageType};
use crate::style::{BreakValue, ComputedStyle, Dimension, Direction, EdgeValues, Edges, Style};

use super::absolute::{absolute_box_layout, absolute_layout};
use super::block::block_level_layout;
use super::float::{finish_formatting_context, float_layout};
use super::footnotes::{self, FootnoteState};
use super::resume::ResumeStack;
use super::{BrokenBox, ContainingBlock, LayoutContext, PageBreak};

/// Ids of the boxes made by the driver (page, footnote area, margin boxes)
/// start here, far above the ids of the box builder.
const DRIVER_ID_BASE: u32 = 0x8000_0000;
/// Driver ids reserved per page.
const DRIVER_IDS_PER_PAGE: u32 = 64;
/// Driver ids reserved per margin box.
const MARGIN_BOX_IDS: u32 = 10;

/// Flags set while a page is made, telling the driver to remake it.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RemakeState {
    /// Anchors first found on this page.
    pub anchors: Vec<String>,
    /// Generated boxes first found on this page.
    pub content_lookups: Vec<BoxId>,
    pub content_changed: bool,
    /// The page shows the total page count.
    pub pages_wanted: bool,
}

/// What a page needs to be made again: where it starts, which side it is on,
/// the counters at its start and the out-of-flow state left by the page
/// before it.
#[derive(Debug, Clone)]
pub struct PageMaker {
    pub initial_resume_at: Option<ResumeStack>,
    pub initial_next_page: PageBreak,
    pub right_page: bool,
    pub initial_page_state: CounterValues,
    pub remake_state: RemakeState,
    pub(crate) initial_broken: BTreeMap<BoxId, BrokenBox>,
    pub(crate) initial_footnotes: FootnoteState,
}

/// A laid-out page.
#[derive(Debug, Clone)]
pub struct Page {
    pub page_type: PageType,
    pub width: f64,
    pub height: f64,
    pub margin: Edges,
    /// The page box; its children are the root fragment, then the footnote
    /// area when the page has footnotes.
    pub page_box: LayoutBox,
    pub margin_boxes: Vec<LayoutBox>,
    /// Fixed boxes of this page, before layout. They are repeated on every
    /// page.
    pub fixed_boxes: Vec<LayoutBox>,
    /// Page counters at the end of the page.
    pub counters: CounterValues,
}

impl Page {
    /// One-based page number.
    pub fn number(&self) -> usize {
        self.page_type.index + 1
    }

    /// The fragment of the root box laid out on this page.
    pub fn root(&self) -> Option<&LayoutBox> {
        self.page_box
            .children
            .iter()
            .find(|child| !matches!(child.kind, BoxKind::FootnoteArea))
    }

    pub fn footnote_area(&self) -> Option<&LayoutBox> {
        self.page_box
            .children
            .iter()
            .find(|child| matches!(child.kind, BoxKind::FootnoteArea))
    }

    pub fn summary(&self) -> PageSummary {
        PageSummary {
            number: self.number(),
            page_type: self.page_type.clone(),
            width: self.width,
            height: self.height,
            root: self.root().map(FragmentSummary::of),
            footnotes: self.footnote_area().map_or(0, |area| area.children.len()),
            margin_boxes: self
                .margin_boxes
                .iter()
                .filter_map(|bx| match bx.kind {
                    BoxKind::Margin(position) => Some(MarginBoxSummary {
                        position,
                        text: collect_text(bx),
                    }),
                    _ => None,
                })
                .collect(),
        }
    }
}

/// What the CLI prints for each page.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PageSummary {
    pub number: usize,
    pub page_type: PageType,
    pub width: f64,
    pub height: f64,
    pub root: Option<FragmentSummary>,
    /// Footnote bodies placed on the page.
    pub footnotes: usize,
    pub margin_boxes: Vec<MarginBoxSummary>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FragmentSummary {
    pub id: BoxId,
    pub kind: &'static str,
    pub x: f64,
    pub y: f64,
    /// Border box size.
    pub width: f64,
    pub height: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<FragmentSummary>,
}

impl FragmentSummary {
    fn of(bx: &LayoutBox) -> Self {
        Self {
            id: bx.id,
            kind: bx.kind.name(),
            x: bx.border_box_x(),
            y: bx.border_box_y(),
            width: bx.border_width(),
            height: bx.border_height(),
            text: bx.text().map(str::to_string),
            children: bx.traversal_children().iter().map(FragmentSummary::of).collect(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MarginBoxSummary {
    pub position: MarginBoxPosition,
    pub text: String,
}

/// Text of the lines inside `bx`, one space between lines.
fn collect_text(bx: &LayoutBox) -> String {
    let lines: Vec<String> = bx
        .descendants()
        .filter(|b| b.is_line_box())
        .map(|line| {
            let text: String = line.descendants().filter_map(LayoutBox::text).collect();
            text.trim_end().to_string()
        })
        .filter(|text| !text.is_empty())
        .collect();
    lines.join(" ")
}

fn driver_id(page_index: usize, slot: u32) -> BoxId {
    let page = u32::try_from(page_index).unwrap_or(u32::MAX / DRIVER_IDS_PER_PAGE);
    BoxId(DRIVER_ID_BASE.saturating_add(page.saturating_mul(DRIVER_IDS_PER_PAGE)).saturating_add(slot))
}

/// Lay out the box tree of `document` into pages, repaginating until the
/// page-based counters are stable.
pub fn layout_document(ctx: &mut LayoutContext, root: &LayoutBox, document: &Document) -> LayoutResult<Vec<Page>> {
    initialize_page_maker(ctx, root);
    let mut pages: Vec<Page> = Vec::new();
    let mut page_count = 0;
    let max_loops = document.options.max_loops.max(1);

    for pass in 0..max_loops {
        if pass > 0 {
            info!("Repagination #{}", pass);
        }
        let previous_count = page_count;
        pages = make_all_pages(ctx, root, document, pages)?;
        page_count = pages.len();

        let mut reloop_content = false;
        let mut reloop_pages = false;
        for entry in ctx.page_maker.iter_mut() {
            entry
                .initial_page_state
                .insert("pages".to_string(), vec![page_count as i64]);
            reloop_content |= entry.remake_state.content_changed;
            reloop_pages |= entry.remake_state.pages_wanted && previous_count != page_count;
        }
        if !reloop_content && !reloop_pages {
            break;
        }
        if pass + 1 == max_loops {
            warn!("page counters still changing after {} passes", max_loops);
        }
    }

    finish_pages(ctx, document, &mut pages)?;
    Ok(pages)
}

fn initialize_page_maker(ctx: &mut LayoutContext, root: &LayoutBox) {
    let ltr = root.style.direction == Direction::Ltr;
    let right_page = match root.style.break_before {
        BreakValue::Right => true,
        BreakValue::Left => false,
        BreakValue::Recto => ltr,
        BreakValue::Verso => !ltr,
        _ => ltr,
    };
    ctx.page_maker = vec![PageMaker {
        initial_resume_at: None,
        initial_next_page: PageBreak {
            value: BreakValue::Auto,
            page: root.page_values().0.map(str::to_string),
        },
        right_page,
        initial_page_state: CounterValues::new(),
        remake_state: RemakeState::default(),
        initial_broken: BTreeMap::new(),
        initial_footnotes: ctx.footnotes.clone(),
    }];
}

/// Make every page, reusing those of `previous` whose inputs did not change.
fn make_all_pages(
    ctx: &mut LayoutContext,
    root: &LayoutBox,
    document: &Document,
    previous: Vec<Page>,
) -> LayoutResult<Vec<Page>> {
    let mut previous: Vec<Option<Page>> = previous.into_iter().map(Some).collect();
    let mut pages = Vec::new();
    let mut index = 0;
    loop {
        if index >= document.options.max_pages {
            return Err(LayoutError::PageLimit(document.options.max_pages));
        }
        let remake = &ctx.page_maker[index].remake_state;
        let reusable = !remake.content_changed && !remake.pages_wanted && ctx.page_maker.len() > index + 1;
        let kept = if reusable {
            previous.get_mut(index).and_then(Option::take)
        } else {
            None
        };

        let (page, resume_at, has_reported) = match kept {
            Some(page) => {
                debug!("Page {} is up to date", index + 1);
                let next = &ctx.page_maker[index + 1];
                (page, next.initial_resume_at.clone(), next.initial_footnotes.has_reported())
            }
            None => {
                info!("Creating layout - Page {}", index + 1);
                ctx.page_maker[index].remake_state = RemakeState::default();
                let (page, resume_at) = remake_page(ctx, index, root, document)?;
                (page, resume_at, ctx.footnotes.has_reported())
            }
        };
        pages.push(page);
        index += 1;

        if resume_at.is_none() && !has_reported {
            ctx.page_maker.truncate(index + 1);
            ctx.broken_out_of_flow.clear();
            return Ok(pages);
        }
    }
}

/// Make page `index` from its page maker entry, and update the entry of the
/// next page.
fn remake_page(
    ctx: &mut LayoutContext,
    index: usize,
    root: &LayoutBox,
    document: &Document,
) -> LayoutResult<(Page, Option<ResumeStack>)> {
    let entry = ctx.page_maker[index].clone();
    ctx.footnotes.restore(entry.initial_footnotes.clone());
    ctx.broken_out_of_flow = entry.initial_broken.clone();

    let next_break = &entry.initial_next_page;
    let wanted_side = match next_break.value {
        BreakValue::Left => Some(PageSide::Left),
        BreakValue::Right => Some(PageSide::Right),
        BreakValue::Recto | BreakValue::Verso => {
            let ltr = root.style.direction == Direction::Ltr;
            let recto = next_break.value == BreakValue::Recto;
            Some(if ltr == recto { PageSide::Right } else { PageSide::Left })
        }
        _ => None,
    };
    let side = if entry.right_page { PageSide::Right } else { PageSide::Left };
    let blank = wanted_side.is_some_and(|wanted| wanted != side)
        || (ctx.footnotes.has_reported() && entry.initial_resume_at.is_none());
    let page_type = PageType {
        side,
        blank,
        first: index == 0,
        index,
        name: if blank { None } else { next_break.page.clone() },
    };
    ctx.forced_break = next_break.value != BreakValue::Auto || next_break.page.is_some();

    let mut page_state = entry.initial_page_state.clone();
    let (page, resume_at, next_page) = make_page(
        ctx,
        root,
        document,
        page_type,
        entry.initial_resume_at.as_ref(),
        next_break,
        &mut page_state,
    )?;

    let right_page = !entry.right_page;
    let changed = match ctx.page_maker.get(index + 1) {
        None => true,
        Some(next) => {
            next.initial_resume_at != resume_at
                || next.initial_next_page != next_page
                || next.right_page != right_page
                || next.initial_page_state != page_state
        }
    };
    if changed {
        let item = PageMaker {
            initial_resume_at: resume_at.clone(),
            initial_next_page: next_page,
            right_page,
            initial_page_state: page_state,
            remake_state: RemakeState {
                content_changed: resume_at.is_some(),
                ..Default::default()
            },
            initial_broken: ctx.broken_out_of_flow.clone(),
            initial_footnotes: ctx.footnotes.clone(),
        };
        if index + 1 < ctx.page_maker.len() {
            ctx.page_maker[index + 1] = item;
        } else {
            ctx.page_maker.push(item);
        }
    } else if let Some(next) = ctx.page_maker.get_mut(index + 1) {
        next.initial_broken = ctx.broken_out_of_flow.clone();
        next.initial_footnotes = ctx.footnotes.clone();
    }

    Ok((page, resume_at))
}

/// Lay out one page. Returns the page, where the next page starts and the
/// break directive for it.
#[allow(clippy::too_many_arguments)]
fn make_page(
    ctx: &mut LayoutContext,
    root: &LayoutBox,
    document: &Document,
    page_type: PageType,
    resume_at: Option<&ResumeStack>,
    initial_next_page: &PageBreak,
    page_state: &mut CounterValues,
) -> LayoutResult<(Page, Option<ResumeStack>, PageBreak)> {
    let index = page_type.index;
    let page_number = index + 1;
    let resolved = document.page_style(&page_type);
    let margin = resolved.margin;
    let content_width = (resolved.width - margin.horizontal()).max(0.0);
    let content_height = (resolved.height - margin.vertical()).max(0.0);

    let page_cb = ContainingBlock {
        x: margin.left,
        y: margin.top,
        width: content_width,
        height: Some(content_height),
        direction: root.style.direction,
        is_for_root_element: true,
    };
    ctx.page_box = page_cb;
    ctx.page_bottom = margin.top + content_height;
    ctx.current_page = page_number;
    ctx.running_elements.retain(|running| running.page != page_number);
    ctx.shapes = Default::default();
    ctx.shapes.push_context();

    let area_style = Style {
        max_height: resolved.footnote_max_height.map(Dimension::Pt),
        ..Default::default()
    }
    .resolve(None);
    let mut area = LayoutBox::new(driver_id(index, 1), BoxKind::FootnoteArea, Rc::new(area_style));
    area.position_x = page_cb.x;
    area.position_y = ctx.page_bottom;
    footnotes::start_page(ctx, area)?;

    let mut root_box = if page_type.blank {
        root.copy_with_children(Vec::new())
    } else {
        root.clone()
    };
    root_box.position_x = page_cb.x;
    root_box.position_y = page_cb.y;

    let mut absolute_boxes = Vec::new();
    let mut fixed_boxes = Vec::new();
    let out_of_flow_boxes = continue_broken_boxes(ctx, page_cb.y, &mut absolute_boxes, &mut fixed_boxes)?;

    let skip = if page_type.blank { None } else { resume_at };
    let (laid_out, result) = block_level_layout(
        ctx,
        &root_box,
        0.0,
        skip,
        &page_cb,
        true,
        &mut absolute_boxes,
        &mut fixed_boxes,
        &mut Vec::new(),
        false,
    )?;
    let mut root_fragment = laid_out.ok_or(LayoutError::MissingRootFragment { page: page_number })?;
    if !out_of_flow_boxes.is_empty() {
        let children = Rc::make_mut(&mut root_fragment.children);
        children.splice(0..0, out_of_flow_boxes);
    }
    finish_formatting_context(ctx, &mut root_fragment);

    let footnote_area = footnotes::finish_page(ctx)?;

    absolute_layout(ctx, &mut root_fragment, &absolute_boxes, &page_cb, &mut fixed_boxes, 0.0)?;
    let mut fixed_sources = Vec::new();
    while !fixed_boxes.is_empty() {
        let ids = std::mem::take(&mut fixed_boxes);
        fixed_sources.extend(ids.iter().filter_map(|&id| pending_source(&root_fragment, id)));
        absolute_layout(ctx, &mut root_fragment, &ids, &page_cb, &mut fixed_boxes, 0.0)?;
    }

    let page_counter = page_state.entry("page".to_string()).or_insert_with(|| vec![0]);
    if let Some(value) = page_counter.last_mut() {
        *value += 1;
    }

    let page_style = ComputedStyle {
        direction: root.style.direction,
        ..Default::default()
    };
    let mut page_box = LayoutBox::new(driver_id(index, 0), BoxKind::Page, Rc::new(page_style));
    page_box.width = Some(content_width);
    page_box.height = Some(content_height);
    page_box.margin = EdgeValues {
        top: Some(margin.top),
        right: Some(margin.right),
        bottom: Some(margin.bottom),
        left: Some(margin.left),
    };
    let mut children = vec![root_fragment];
    children.extend(footnote_area);
    let page_box = page_box.with_children(children);

    let mut targets = std::mem::take(&mut ctx.targets);
    targets.resolve_page(&page_box, page_state, index, &mut ctx.page_maker);
    ctx.targets = targets;

    let page = Page {
        page_type: page_type.clone(),
        width: resolved.width,
        height: resolved.height,
        margin,
        page_box,
        margin_boxes: Vec::new(),
        fixed_boxes: fixed_sources,
        counters: page_state.clone(),
    };

    if page_type.blank {
        return Ok((page, resume_at.cloned(), initial_next_page.clone()));
    }
    Ok((page, result.resume_at, result.next_page))
}

/// Lay out the floats and absolute boxes cut by the previous page at the top
/// of this one.
fn continue_broken_boxes(
    ctx: &mut LayoutContext,
    top: f64,
    absolute_boxes: &mut Vec<BoxId>,
    fixed_boxes: &mut Vec<BoxId>,
) -> LayoutResult<Vec<LayoutBox>> {
    let broken = std::mem::take(&mut ctx.broken_out_of_flow);
    let mut laid_out = Vec::with_capacity(broken.len());
    for (id, entry) in broken {
        let mut source = entry.source.clone();
        source.position_y = top;
        let (bx, resume_at) = if source.is_floated() {
            float_layout(
                ctx,
                source,
                &entry.containing_block,
                absolute_boxes,
                fixed_boxes,
                0.0,
                Some(&entry.resume_at),
            )?
        } else {
            absolute_box_layout(ctx, source, &entry.containing_block, fixed_boxes, 0.0, Some(&entry.resume_at))?
        };
        debug!("continued out-of-flow box {:?}", id);
        if let Some(resume_at) = resume_at {
            ctx.broken_out_of_flow.insert(
                id,
                BrokenBox {
                    source: entry.source,
                    containing_block: entry.containing_block,
                    resume_at,
                },
            );
        }
        laid_out.push(bx);
    }
    Ok(laid_out)
}

/// The box wrapped by the pending placeholder `id` of `tree`.
fn pending_source(tree: &LayoutBox, id: BoxId) -> Option<LayoutBox> {
    let path = tree.find_path(&|b: &LayoutBox| b.id == id && b.is_placeholder())?;
    match &tree.at_path(&path)?.kind {
        BoxKind::Placeholder(placeholder) if !placeholder.is_done() => Some(placeholder.boxed().clone()),
        _ => None,
    }
}

/// Repeat the fixed boxes on every page and lay out the margin boxes, now
/// that the page count is known.
fn finish_pages(ctx: &mut LayoutContext, document: &Document, pages: &mut [Page]) -> LayoutResult<()> {
    let page_count = pages.len();
    let fixed: Vec<(usize, LayoutBox)> = pages
        .iter()
        .enumerate()
        .flat_map(|(i, page)| page.fixed_boxes.iter().map(move |bx| (i, bx.clone())))
        .collect();

    for (index, page) in pages.iter_mut().enumerate() {
        let margin = page.margin;
        let page_cb = ContainingBlock {
            x: margin.left,
            y: margin.top,
            width: (page.width - margin.horizontal()).max(0.0),
            height: Some((page.height - margin.vertical()).max(0.0)),
            direction: page.page_box.style.direction,
            is_for_root_element: true,
        };
        ctx.page_box = page_cb;
        ctx.current_page = index + 1;
        ctx.page_bottom = f64::INFINITY;

        repeat_fixed_boxes(ctx, page, index, &fixed, &page_cb)?;

        let mut counters = page.counters.clone();
        counters.insert("page".to_string(), vec![(index + 1) as i64]);
        counters.insert("pages".to_string(), vec![page_count as i64]);
        page.counters = counters;

        let resolved = document.page_style(&page.page_type);
        let mut margin_boxes = Vec::with_capacity(resolved.margin_boxes.len());
        for (slot, spec) in resolved.margin_boxes.iter().enumerate() {
            margin_boxes.push(make_margin_box(ctx, page, index, slot, spec)?);
        }
        page.margin_boxes = margin_boxes;
    }
    Ok(())
}

fn repeat_fixed_boxes(
    ctx: &mut LayoutContext,
    page: &mut Page,
    index: usize,
    fixed: &[(usize, LayoutBox)],
    page_cb: &ContainingBlock,
) -> LayoutResult<()> {
    let mut before = Vec::new();
    let mut after = Vec::new();
    for (origin, source) in fixed.iter().filter(|(origin, _)| *origin != index) {
        let (laid_out, _) = absolute_box_layout(ctx, source.clone(), page_cb, &mut Vec::new(), f64::NEG_INFINITY, None)?;
        if *origin < index {
            before.push(laid_out);
        } else {
            after.push(laid_out);
        }
    }
    if before.is_empty() && after.is_empty() {
        return Ok(());
    }
    let children = Rc::make_mut(&mut page.page_box.children);
    if let Some(root) = children.iter_mut().find(|c| !matches!(c.kind, BoxKind::FootnoteArea)) {
        let root_children = Rc::make_mut(&mut root.children);
        let own = std::mem::take(root_children);
        root_children.extend(before);
        root_children.extend(own);
        root_children.extend(after);
    }
    Ok(())
}

/// Geometry of the margin box area at `position`: top boxes fill the top
/// page margin, bottom boxes the bottom one, each a third of the content
/// width.
fn margin_box_area(page: &Page, position: MarginBoxPosition) -> ContainingBlock {
    let margin = page.margin;
    let width = (page.width - margin.horizontal()).max(0.0) / 3.0;
    let (y, height) = if position.is_top() {
        (0.0, margin.top)
    } else {
        (page.height - margin.bottom, margin.bottom)
    };
    ContainingBlock {
        x: margin.left + width * position.column() as f64,
        y,
        width,
        height: Some(height),
        direction: Direction::Ltr,
        is_for_root_element: false,
    }
}

/// Wrap pending margin box text in an anonymous block holding one line.
fn push_text_block(
    children: &mut Vec<LayoutBox>,
    text: &mut String,
    style: &Rc<ComputedStyle>,
    next_id: &mut dyn FnMut() -> BoxId,
) {
    if text.is_empty() {
        return;
    }
    let text_box = LayoutBox::new(next_id(), BoxKind::Text(TextData::new(std::mem::take(text))), Rc::clone(style));
    let line = LayoutBox::new(next_id(), BoxKind::Line(LineData::default()), Rc::clone(style))
        .with_children(vec![text_box]);
    let mut block = LayoutBox::new(next_id(), BoxKind::Block, Rc::clone(style)).with_children(vec![line]);
    block.index = children.len();
    children.push(block);
}

fn make_margin_box(
    ctx: &mut LayoutContext,
    page: &Page,
    index: usize,
    slot: usize,
    spec: &MarginBoxSpec,
) -> LayoutResult<LayoutBox> {
    let area = margin_box_area(page, spec.position);
    let style = Rc::new(spec.style.resolve(None));
    // Slots 0 and 1 hold the page box and the footnote area.
    let base = 2 + MARGIN_BOX_IDS * slot as u32;
    let mut next_slot = base;
    let mut next_id = || {
        next_slot = (next_slot + 1).min(base + MARGIN_BOX_IDS - 1);
        driver_id(index, next_slot)
    };

    let mut children: Vec<LayoutBox> = Vec::new();
    let mut text = String::new();
    for item in &spec.content {
        if let ContentItem::Element(name) = item {
            push_text_block(&mut children, &mut text, &style, &mut next_id);
            match ctx.running_element_for(name) {
                Some(element) => {
                    let mut element = element.clone();
                    element.style = Rc::new(element.style.in_flow());
                    element.index = children.len();
                    children.push(element);
                }
                None => debug!("no running element {:?} on page {}", name, index + 1),
            }
        } else {
            text.push_str(&render(std::slice::from_ref(item), &page.counters, ctx.targets.targets()));
        }
    }
    push_text_block(&mut children, &mut text, &style, &mut next_id);

    let mut margin_box = LayoutBox::new(driver_id(index, base), BoxKind::Margin(spec.position), style)
        .with_children(children);
    margin_box.position_x = area.x;
    margin_box.position_y = area.y;

    ctx.shapes = Default::default();
    ctx.shapes.push_context();
    let (laid_out, _) = block_level_layout(
        ctx,
        &margin_box,
        f64::NEG_INFINITY,
        None,
        &area,
        true,
        &mut Vec::new(),
        &mut Vec::new(),
        &mut Vec::new(),
        false,
    )?;
    ctx.shapes.pop_context();
    let mut laid_out = laid_out.ok_or_else(|| LayoutError::OverConstrained {
        what: format!("margin box {:?} of page {}", spec.position, index + 1),
    })?;

    // Auto heights fill the page margin, content centered vertically.
    if spec.style.height.is_none() {
        let decoration = laid_out.margin_height() - laid_out.content_height();
        let available = area.height.unwrap_or(0.0) - decoration;
        let used = laid_out.content_height();
        if available > used {
            let dy = (available - used) / 2.0;
            for child in Rc::make_mut(&mut laid_out.children).iter_mut() {
                child.translate(0.0, dy, false);
            }
            laid_out.height = Some(available);
        }
    }
    Ok(laid_out)
}
