//! # Fragmentation Engine
//!
//! This is the heart of folio: laying boxes out *into* pages.
//!
//! Layout never sees an infinite canvas. Every block layout call knows where
//! the page ends (`page_bottom` minus the `bottom_space` its ancestors
//! reserve) and returns, along with the fragment that fits, a
//! [`ResumeStack`] addressing where the next page picks up. Laying the same
//! source box out again from that resume stack produces the continuation.
//!
//! ```text
//!   page driver ──► block-level layout ──► block container loop
//!        ▲               │                   │   ├─ out-of-flow children
//!        │               │                   │   ├─ line boxes (inline loop)
//!        │               ▼                   │   └─ in-flow children (recurse)
//!        └─ resume stack + next page ◄───────┘
//! ```
//!
//! Pagination runs to a fixed point: page numbers feed generated content,
//! which can change what fits, so the driver re-lays out the pages whose
//! inputs changed until nothing moves.

pub mod absolute;
pub mod block;
pub mod flex;
pub mod float;
pub mod footnotes;
pub mod inline;
pub mod margins;
pub mod page;
pub mod page_break;
pub mod percentages;
pub mod preferred;
pub mod resume;
pub mod strategy;

use std::collections::BTreeMap;
use std::rc::Rc;

use log::info;

use crate::boxes::{BoxId, LayoutBox};
use crate::counters::TargetCollector;
use crate::error::LayoutResult;
use crate::model::build::build_box_tree;
use crate::model::Document;
use crate::style::{BreakValue, Direction};
use crate::text::{FixedAdvanceShaper, TextShaper};

use self::float::ExclusionStore;
use self::footnotes::FootnoteState;
use self::page::{Page, PageMaker};
use self::resume::ResumeStack;
use self::strategy::{LayoutStrategy, StrategyKind, StrategyRegistry};

/// Geometry of a containing block, detached from the box it belongs to.
///
/// `x`/`y`/`width`/`height` describe the content box for in-flow children and
/// floats, and the padding box for absolutely positioned descendants.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ContainingBlock {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    /// `None` while the height is still auto.
    pub height: Option<f64>,
    pub direction: Direction,
    pub is_for_root_element: bool,
}

impl ContainingBlock {
    pub fn content_of(bx: &LayoutBox) -> Self {
        Self {
            x: bx.content_box_x(),
            y: bx.content_box_y(),
            width: bx.content_width(),
            height: bx.height,
            direction: bx.style.direction,
            is_for_root_element: bx.is_for_root_element,
        }
    }

    pub fn padding_of(bx: &LayoutBox) -> Self {
        Self {
            x: bx.padding_box_x(),
            y: bx.padding_box_y(),
            width: bx.padding_width(),
            height: bx.height.map(|h| h + bx.padding.top + bx.padding.bottom),
            direction: bx.style.direction,
            is_for_root_element: bx.is_for_root_element,
        }
    }
}

/// Where the next page should start and what it should look like.
#[derive(Debug, Clone, PartialEq)]
pub struct PageBreak {
    /// `Auto` means any page side will do.
    pub value: BreakValue,
    /// Page name wanted by the content that starts the next page.
    pub page: Option<String>,
}

impl PageBreak {
    pub fn any() -> Self {
        Self {
            value: BreakValue::Auto,
            page: None,
        }
    }
}

/// Everything a block-level layout call reports besides the fragment.
#[derive(Debug, Clone)]
pub struct BlockLayout {
    /// Where to continue on the next page, `None` when the box is done.
    pub resume_at: Option<ResumeStack>,
    pub next_page: PageBreak,
    /// Margins still collapsing at the bottom of the fragment.
    pub adjoining_margins: Vec<f64>,
    /// The box has no height and its top and bottom margins collapse together.
    pub collapsing_through: bool,
}

impl BlockLayout {
    pub fn finished(next_page: PageBreak) -> Self {
        Self {
            resume_at: None,
            next_page,
            adjoining_margins: Vec::new(),
            collapsing_through: false,
        }
    }
}

/// A float or absolutely positioned box cut by a page end, to be continued at
/// the top of the next page.
#[derive(Debug, Clone)]
pub struct BrokenBox {
    /// The source box.
    pub source: LayoutBox,
    pub containing_block: ContainingBlock,
    pub resume_at: ResumeStack,
}

#[derive(Debug, Clone)]
pub(crate) struct RunningElement {
    pub name: String,
    pub page: usize,
    pub element: LayoutBox,
}

/// State saved before speculative layout and restored after it.
#[derive(Clone)]
pub(crate) struct Checkpoint {
    shapes: usize,
    broken: Vec<BoxId>,
    running: usize,
}

impl Checkpoint {
    /// Number of excluded shapes when the checkpoint was taken.
    pub(crate) fn shapes_len(&self) -> usize {
        self.shapes
    }
}

/// Mutable state of one pagination run.
pub struct LayoutContext {
    shaper: Rc<dyn TextShaper>,
    strategies: StrategyRegistry,
    pub(crate) shapes: ExclusionStore,
    pub(crate) broken_out_of_flow: BTreeMap<BoxId, BrokenBox>,
    pub(crate) footnotes: FootnoteState,
    pub(crate) running_elements: Vec<RunningElement>,
    /// One-based number of the page being made.
    pub(crate) current_page: usize,
    pub(crate) page_bottom: f64,
    /// The page being made was started by a forced break.
    pub(crate) forced_break: bool,
    /// Content box of the page being made.
    pub(crate) page_box: ContainingBlock,
    pub(crate) targets: TargetCollector,
    pub(crate) page_maker: Vec<PageMaker>,
}

impl LayoutContext {
    pub(crate) fn new(
        shaper: Rc<dyn TextShaper>,
        strategies: StrategyRegistry,
        targets: TargetCollector,
        footnotes: FootnoteState,
    ) -> Self {
        Self {
            shaper,
            strategies,
            shapes: ExclusionStore::default(),
            broken_out_of_flow: BTreeMap::new(),
            footnotes,
            running_elements: Vec::new(),
            current_page: 0,
            page_bottom: 0.0,
            forced_break: false,
            page_box: ContainingBlock {
                x: 0.0,
                y: 0.0,
                width: 0.0,
                height: None,
                direction: Direction::Ltr,
                is_for_root_element: false,
            },
            targets,
            page_maker: Vec::new(),
        }
    }

    pub fn shaper(&self) -> &dyn TextShaper {
        self.shaper.as_ref()
    }

    /// Bottom of the page area available to content, in page coordinates.
    pub fn page_bottom(&self) -> f64 {
        self.page_bottom
    }

    /// Whether something ending at `position_y` crosses the usable page bottom.
    pub fn overflows_page(&self, bottom_space: f64, position_y: f64) -> bool {
        // Tolerance for accumulated floating point error.
        position_y > (self.page_bottom - bottom_space) * (1.0 + 1e-9)
    }

    pub(crate) fn strategy(&self, kind: StrategyKind) -> Option<Rc<dyn LayoutStrategy>> {
        self.strategies.get(kind)
    }

    /// Text of a text box, with generated content resolved.
    pub(crate) fn text_of(&self, bx: &LayoutBox) -> Rc<str> {
        if let crate::boxes::BoxKind::Text(data) = &bx.kind {
            if data.generated {
                if let Some(text) = self.targets.text_for(bx.id) {
                    return Rc::from(text);
                }
            }
            return Rc::clone(&data.text);
        }
        Rc::from("")
    }

    pub(crate) fn add_running(&mut self, element: LayoutBox) {
        if let crate::style::Position::Running(name) = &element.style.position {
            self.running_elements.push(RunningElement {
                name: name.clone(),
                page: self.current_page,
                element,
            });
        }
    }

    /// The running element shown on the current page: the first one set on
    /// this page, or else the last one set on an earlier page.
    pub(crate) fn running_element_for(&self, name: &str) -> Option<&LayoutBox> {
        let mut latest: Option<&RunningElement> = None;
        for running in self.running_elements.iter().filter(|r| r.name == name) {
            if running.page == self.current_page {
                return Some(&running.element);
            }
            if running.page < self.current_page
                && latest.map_or(true, |l| l.page <= running.page)
            {
                latest = Some(running);
            }
        }
        latest.map(|r| &r.element)
    }

    pub(crate) fn checkpoint(&self) -> Checkpoint {
        Checkpoint {
            shapes: self.shapes.len(),
            broken: self.broken_out_of_flow.keys().copied().collect(),
            running: self.running_elements.len(),
        }
    }

    pub(crate) fn rollback(&mut self, checkpoint: Checkpoint) {
        self.shapes.truncate(checkpoint.shapes);
        self.broken_out_of_flow
            .retain(|id, _| checkpoint.broken.contains(id));
        self.running_elements.truncate(checkpoint.running);
    }
}

/// The main layout engine.
pub struct LayoutEngine {
    shaper: Rc<dyn TextShaper>,
    strategies: StrategyRegistry,
}

impl Default for LayoutEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl LayoutEngine {
    /// An engine with the fixed-advance shaper and the built-in strategies.
    pub fn new() -> Self {
        Self::with_shaper(FixedAdvanceShaper::default())
    }

    pub fn with_shaper(shaper: impl TextShaper + 'static) -> Self {
        Self {
            shaper: Rc::new(shaper),
            strategies: StrategyRegistry::with_defaults(),
        }
    }

    /// Replace the strategy used for a kind of container.
    pub fn register_strategy(&mut self, kind: StrategyKind, strategy: impl LayoutStrategy + 'static) {
        self.strategies.register(kind, Rc::new(strategy));
    }

    /// Main entry point: lay out a document into pages.
    pub fn layout(&self, document: &Document) -> LayoutResult<Vec<Page>> {
        let tree = build_box_tree(&document.root);
        info!(
            "Built box tree: {} footnotes, {} generated texts, {} anchors",
            tree.footnote_order.len(),
            tree.generated.len(),
            tree.anchors.len()
        );
        let targets = TargetCollector::new(&tree.anchors, &tree.generated);
        let footnotes = FootnoteState::new(tree.footnotes, tree.footnote_order);
        let mut context = LayoutContext::new(
            Rc::clone(&self.shaper),
            self.strategies.clone(),
            targets,
            footnotes,
        );
        page::layout_document(&mut context, &tree.root, document)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::boxes::{BoxKind, LineData, TextData};
    use crate::style::ComputedStyle;
    use std::cell::Cell;

    thread_local! {
        static NEXT_ID: Cell<u32> = const { Cell::new(1000) };
    }

    /// A fresh id for a test box.
    pub(crate) fn id() -> BoxId {
        NEXT_ID.with(|next| {
            let id = next.get();
            next.set(id + 1);
            BoxId(id)
        })
    }

    /// A context with the fixed-advance shaper (12pt text, 6pt per
    /// character) whose page ends at `page_bottom`.
    pub(crate) fn context(page_bottom: f64) -> LayoutContext {
        let mut ctx = LayoutContext::new(
            Rc::new(FixedAdvanceShaper::default()),
            StrategyRegistry::with_defaults(),
            TargetCollector::default(),
            FootnoteState::default(),
        );
        ctx.page_bottom = page_bottom;
        ctx.current_page = 1;
        ctx
    }

    pub(crate) fn line(children: Vec<LayoutBox>) -> LayoutBox {
        let children = children
            .into_iter()
            .enumerate()
            .map(|(i, mut child)| {
                child.index = i;
                child
            })
            .collect();
        LayoutBox::new(id(), BoxKind::Line(LineData::default()), Rc::new(ComputedStyle::default()))
            .with_children(children)
    }

    pub(crate) fn text(content: &str) -> LayoutBox {
        LayoutBox::new(id(), BoxKind::Text(TextData::new(content)), Rc::new(ComputedStyle::default()))
    }

    #[test]
    fn running_elements_persist_until_replaced() {
        let mut ctx = context(100.0);
        let style = crate::style::Style {
            position: Some(crate::style::Position::Running("header".to_string())),
            ..Default::default()
        }
        .resolve(None);
        let header = LayoutBox::new(BoxId(1), BoxKind::Block, Rc::new(style.clone()));
        ctx.add_running(header);
        ctx.current_page = 3;
        assert_eq!(ctx.running_element_for("header").map(|b| b.id), Some(BoxId(1)));

        ctx.add_running(LayoutBox::new(BoxId(2), BoxKind::Block, Rc::new(style)));
        assert_eq!(ctx.running_element_for("header").map(|b| b.id), Some(BoxId(2)));
        assert!(ctx.running_element_for("footer").is_none());
    }

    #[test]
    fn rollback_restores_speculative_state() {
        let mut ctx = context(100.0);
        let checkpoint = ctx.checkpoint();
        let bx = text("x");
        ctx.broken_out_of_flow.insert(
            bx.id,
            BrokenBox {
                source: bx.clone(),
                containing_block: ctx.page_box,
                resume_at: ResumeStack::at(0),
            },
        );
        ctx.rollback(checkpoint);
        assert!(ctx.broken_out_of_flow.is_empty());
    }
}
