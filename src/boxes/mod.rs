//! # Box Tree
//!
//! The formatting structure the layout core works on. A [`LayoutBox`] is the
//! same type before and after layout: unlaid boxes come from the box builder
//! with auto geometry, and every layout function returns *copies* carrying
//! positions and sizes. The source tree is never mutated, so the same box can
//! be laid out again on a later page (or on a later pagination loop) from a
//! resume stack.
//!
//! Children are reference-counted: copying a box is cheap, and a fragment only
//! duplicates the child list when it actually changes it.

use std::rc::Rc;

use serde::Serialize;

use crate::error::{LayoutError, LayoutResult};
use crate::layout::resume::ResumeStack;
use crate::model::MarginBoxPosition;
use crate::style::{BoxDecorationBreak, ComputedStyle, Display, EdgeValues, Float};

/// Stable identity of a box. Copies made during layout keep the id of the box
/// they were copied from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct BoxId(pub u32);

#[derive(Debug, Clone)]
pub enum BoxKind {
    /// A block container, including the root and anonymous blocks.
    Block,
    /// An anonymous line container. Always the only child of its block.
    Line(LineData),
    Inline,
    Text(TextData),
    /// An atomic box with intrinsic dimensions (an image).
    Replaced(ReplacedData),
    /// A flex container; laid out by a pluggable strategy.
    Flex,
    /// A grid container; laid out by a pluggable strategy.
    Grid,
    /// A table wrapper; laid out by a pluggable strategy.
    TableWrapper,
    /// A page margin box (`@top-left` and friends).
    Margin(MarginBoxPosition),
    /// The page itself.
    Page,
    /// The area at the bottom of the page collecting footnote bodies.
    FootnoteArea,
    /// Stands in for an absolutely positioned box until its containing block
    /// is known.
    Placeholder(Placeholder),
}

impl BoxKind {
    pub fn name(&self) -> &'static str {
        match self {
            BoxKind::Block => "block",
            BoxKind::Line(_) => "line",
            BoxKind::Inline => "inline",
            BoxKind::Text(_) => "text",
            BoxKind::Replaced(_) => "replaced",
            BoxKind::Flex => "flex",
            BoxKind::Grid => "grid",
            BoxKind::TableWrapper => "table",
            BoxKind::Margin(_) => "margin",
            BoxKind::Page => "page",
            BoxKind::FootnoteArea => "footnote-area",
            BoxKind::Placeholder(_) => "placeholder",
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct LineData {
    /// Where the next line starts, relative to this line's content.
    pub resume_at: Option<ResumeStack>,
}

#[derive(Debug, Clone)]
pub struct TextData {
    pub text: Rc<str>,
    /// The text is produced by `content` and may change between layout passes.
    pub generated: bool,
    /// Extra space added to each word separator by justification.
    pub justification_spacing: f64,
}

impl TextData {
    pub fn new(text: impl Into<Rc<str>>) -> Self {
        Self {
            text: text.into(),
            generated: false,
            justification_spacing: 0.0,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ReplacedData {
    pub intrinsic_width: f64,
    pub intrinsic_height: f64,
}

/// An absolutely positioned box, waiting for its containing block.
///
/// While pending, moving the placeholder only moves the static position of the
/// wrapped box; once laid out, it moves the whole subtree.
#[derive(Debug, Clone)]
pub enum Placeholder {
    Pending(Box<LayoutBox>),
    Done(Box<LayoutBox>),
}

impl Placeholder {
    pub fn boxed(&self) -> &LayoutBox {
        match self {
            Placeholder::Pending(b) | Placeholder::Done(b) => b,
        }
    }

    pub fn boxed_mut(&mut self) -> &mut LayoutBox {
        match self {
            Placeholder::Pending(b) | Placeholder::Done(b) => b,
        }
    }

    pub fn is_done(&self) -> bool {
        matches!(self, Placeholder::Done(_))
    }

    pub fn translate(&mut self, dx: f64, dy: f64, ignore_floats: bool) {
        match self {
            Placeholder::Pending(b) => {
                b.position_x += dx;
                b.position_y += dy;
            }
            Placeholder::Done(b) => b.translate(dx, dy, ignore_floats),
        }
    }

    /// Replace the pending box with its laid-out version.
    pub fn set_laid_out(&mut self, laid_out: LayoutBox) -> LayoutResult<()> {
        if let Placeholder::Done(b) = self {
            return Err(LayoutError::PlaceholderAlreadyResolved(b.id));
        }
        *self = Placeholder::Done(Box::new(laid_out));
        Ok(())
    }
}

/// A box of the formatting structure, laid out or not.
///
/// `None` in `width`, `height` and margins means `auto` (not yet computed).
#[derive(Debug, Clone)]
pub struct LayoutBox {
    pub id: BoxId,
    pub kind: BoxKind,
    pub style: Rc<ComputedStyle>,
    pub children: Rc<Vec<LayoutBox>>,

    /// Top-left corner of the margin box.
    pub position_x: f64,
    pub position_y: f64,
    pub width: Option<f64>,
    pub height: Option<f64>,
    pub margin: EdgeValues<Option<f64>>,
    pub padding: EdgeValues<f64>,
    pub border: EdgeValues<f64>,
    pub min_width: f64,
    pub max_width: f64,
    pub min_height: f64,
    pub max_height: f64,
    /// Resolved `top`/`right`/`bottom`/`left` offsets.
    pub offsets: EdgeValues<Option<f64>>,
    /// Distance from the top of the margin box to the baseline.
    pub baseline: Option<f64>,
    pub clearance: Option<f64>,

    /// Position among the children of the source parent.
    pub index: usize,
    pub is_for_root_element: bool,
    pub is_flex_item: bool,
    /// The footnote body called from this box.
    pub footnote: Option<BoxId>,
}

impl LayoutBox {
    pub fn new(id: BoxId, kind: BoxKind, style: Rc<ComputedStyle>) -> Self {
        Self {
            id,
            kind,
            style,
            children: Rc::new(Vec::new()),
            position_x: 0.0,
            position_y: 0.0,
            width: None,
            height: None,
            margin: EdgeValues::uniform(Some(0.0)),
            padding: EdgeValues::uniform(0.0),
            border: EdgeValues::uniform(0.0),
            min_width: 0.0,
            max_width: f64::INFINITY,
            min_height: 0.0,
            max_height: f64::INFINITY,
            offsets: EdgeValues::uniform(None),
            baseline: None,
            clearance: None,
            index: 0,
            is_for_root_element: false,
            is_flex_item: false,
            footnote: None,
        }
    }

    pub fn with_children(mut self, children: Vec<LayoutBox>) -> Self {
        self.children = Rc::new(children);
        self
    }

    /// Wrap an absolutely positioned box in a pending placeholder.
    pub fn placeholder(inner: LayoutBox) -> Self {
        let mut placeholder = LayoutBox::new(inner.id, BoxKind::Block, Rc::clone(&inner.style));
        placeholder.index = inner.index;
        placeholder.position_x = inner.position_x;
        placeholder.position_y = inner.position_y;
        placeholder.kind = BoxKind::Placeholder(Placeholder::Pending(Box::new(inner)));
        placeholder
    }

    /// A copy of this box holding different children.
    pub fn copy_with_children(&self, children: Vec<LayoutBox>) -> Self {
        let mut copy = self.clone();
        copy.children = Rc::new(children);
        copy
    }

    // ── Geometry ───────────────────────────────────────────────

    pub fn margin_top(&self) -> f64 {
        self.margin.top.unwrap_or(0.0)
    }

    pub fn margin_right(&self) -> f64 {
        self.margin.right.unwrap_or(0.0)
    }

    pub fn margin_bottom(&self) -> f64 {
        self.margin.bottom.unwrap_or(0.0)
    }

    pub fn margin_left(&self) -> f64 {
        self.margin.left.unwrap_or(0.0)
    }

    pub fn content_width(&self) -> f64 {
        self.width.unwrap_or(0.0)
    }

    pub fn content_height(&self) -> f64 {
        self.height.unwrap_or(0.0)
    }

    pub fn padding_width(&self) -> f64 {
        self.content_width() + self.padding.left + self.padding.right
    }

    pub fn padding_height(&self) -> f64 {
        self.content_height() + self.padding.top + self.padding.bottom
    }

    pub fn border_width(&self) -> f64 {
        self.padding_width() + self.border.left + self.border.right
    }

    pub fn border_height(&self) -> f64 {
        self.padding_height() + self.border.top + self.border.bottom
    }

    pub fn margin_width(&self) -> f64 {
        self.border_width() + self.margin_left() + self.margin_right()
    }

    pub fn margin_height(&self) -> f64 {
        self.border_height() + self.margin_top() + self.margin_bottom()
    }

    pub fn border_box_x(&self) -> f64 {
        self.position_x + self.margin_left()
    }

    pub fn border_box_y(&self) -> f64 {
        self.position_y + self.margin_top()
    }

    pub fn padding_box_x(&self) -> f64 {
        self.border_box_x() + self.border.left
    }

    pub fn padding_box_y(&self) -> f64 {
        self.border_box_y() + self.border.top
    }

    pub fn content_box_x(&self) -> f64 {
        self.padding_box_x() + self.padding.left
    }

    pub fn content_box_y(&self) -> f64 {
        self.padding_box_y() + self.padding.top
    }

    /// Move this box and its descendants. Floats are left in place when
    /// `ignore_floats` is set.
    pub fn translate(&mut self, dx: f64, dy: f64, ignore_floats: bool) {
        if dx == 0.0 && dy == 0.0 {
            return;
        }
        if let BoxKind::Placeholder(placeholder) = &mut self.kind {
            placeholder.translate(dx, dy, ignore_floats);
            self.position_x += dx;
            self.position_y += dy;
            return;
        }
        self.position_x += dx;
        self.position_y += dy;
        if self.children.is_empty() {
            return;
        }
        for child in Rc::make_mut(&mut self.children).iter_mut() {
            if !(ignore_floats && child.is_floated()) {
                child.translate(dx, dy, ignore_floats);
            }
        }
    }

    /// Drop the borders, padding and margin on the sides where this box was
    /// split, unless `box-decoration-break: clone` asks to repeat them.
    pub fn remove_decoration(&mut self, start: bool, end: bool) {
        if self.style.box_decoration_break == BoxDecorationBreak::Clone {
            return;
        }
        let inline = matches!(self.kind, BoxKind::Inline);
        if start {
            if inline {
                self.margin.left = Some(0.0);
                self.padding.left = 0.0;
                self.border.left = 0.0;
            } else {
                self.margin.top = Some(0.0);
                self.padding.top = 0.0;
                self.border.top = 0.0;
            }
        }
        if end {
            if inline {
                self.margin.right = Some(0.0);
                self.padding.right = 0.0;
                self.border.right = 0.0;
            } else {
                self.margin.bottom = Some(0.0);
                self.padding.bottom = 0.0;
                self.border.bottom = 0.0;
            }
        }
    }

    // ── Classification ─────────────────────────────────────────

    pub fn is_floated(&self) -> bool {
        self.style.float != Float::None && !self.style.is_absolutely_positioned()
    }

    pub fn is_absolutely_positioned(&self) -> bool {
        self.style.is_absolutely_positioned()
    }

    pub fn is_running(&self) -> bool {
        self.style.is_running()
    }

    pub fn is_in_normal_flow(&self) -> bool {
        !(self.is_floated() || self.is_absolutely_positioned() || self.is_running())
    }

    pub fn is_placeholder(&self) -> bool {
        matches!(self.kind, BoxKind::Placeholder(_))
    }

    /// Line and inline boxes: the boxes taking part in an inline formatting
    /// context as containers.
    pub fn is_line(&self) -> bool {
        matches!(self.kind, BoxKind::Line(_) | BoxKind::Inline)
    }

    pub fn is_line_box(&self) -> bool {
        matches!(self.kind, BoxKind::Line(_))
    }

    /// Boxes that take part in a block formatting context.
    pub fn is_block_level(&self) -> bool {
        match self.kind {
            BoxKind::Block | BoxKind::Flex | BoxKind::Grid | BoxKind::TableWrapper => true,
            BoxKind::Replaced(_) => self.style.display != Display::Inline,
            _ => false,
        }
    }

    /// Boxes whose contents are laid out by the block container loop.
    pub fn is_block_container(&self) -> bool {
        matches!(
            self.kind,
            BoxKind::Block | BoxKind::Margin(_) | BoxKind::FootnoteArea | BoxKind::Page
        )
    }

    pub fn is_atomic(&self) -> bool {
        matches!(
            self.kind,
            BoxKind::Replaced(_) | BoxKind::Flex | BoxKind::Grid | BoxKind::TableWrapper
        )
    }

    pub fn text(&self) -> Option<&str> {
        match &self.kind {
            BoxKind::Text(data) => Some(&data.text),
            _ => None,
        }
    }

    /// The resume point stored on a laid-out line box.
    pub fn line_resume_at(&self) -> Option<&ResumeStack> {
        match &self.kind {
            BoxKind::Line(data) => data.resume_at.as_ref(),
            _ => None,
        }
    }

    /// Page names at the start and at the end of this box.
    pub fn page_values(&self) -> (Option<&str>, Option<&str>) {
        let start = first_block_descendant(self, |children| children.first())
            .style
            .page
            .as_deref();
        let end = first_block_descendant(self, |children| children.last())
            .style
            .page
            .as_deref();
        (start, end)
    }

    // ── Traversal ──────────────────────────────────────────────

    /// Children as seen by tree walks: a placeholder exposes the box it wraps.
    pub fn traversal_children(&self) -> &[LayoutBox] {
        match &self.kind {
            BoxKind::Placeholder(p) => std::slice::from_ref(p.boxed()),
            _ => &self.children,
        }
    }

    fn traversal_children_mut(&mut self) -> &mut [LayoutBox] {
        match &mut self.kind {
            BoxKind::Placeholder(p) => std::slice::from_mut(p.boxed_mut()),
            _ => Rc::make_mut(&mut self.children).as_mut_slice(),
        }
    }

    /// This box and all its descendants, depth first.
    pub fn descendants(&self) -> Descendants<'_> {
        Descendants { stack: vec![self] }
    }

    /// Path of child indices from this box to the first descendant matching
    /// `predicate`.
    pub fn find_path(&self, predicate: &dyn Fn(&LayoutBox) -> bool) -> Option<Vec<usize>> {
        let mut path = Vec::new();
        if self.find_path_into(predicate, &mut path) {
            Some(path)
        } else {
            None
        }
    }

    fn find_path_into(&self, predicate: &dyn Fn(&LayoutBox) -> bool, path: &mut Vec<usize>) -> bool {
        for (i, child) in self.traversal_children().iter().enumerate() {
            path.push(i);
            if predicate(child) || child.find_path_into(predicate, path) {
                return true;
            }
            path.pop();
        }
        false
    }

    /// Mutable access to the descendant at `path`. Only the boxes along the
    /// path are unshared.
    pub fn at_path_mut(&mut self, path: &[usize]) -> Option<&mut LayoutBox> {
        let mut node = self;
        for &i in path {
            node = node.traversal_children_mut().get_mut(i)?;
        }
        Some(node)
    }

    pub fn at_path(&self, path: &[usize]) -> Option<&LayoutBox> {
        let mut node = self;
        for &i in path {
            node = node.traversal_children().get(i)?;
        }
        Some(node)
    }
}

fn first_block_descendant<'a>(
    bx: &'a LayoutBox,
    pick: impl Fn(&'a [LayoutBox]) -> Option<&'a LayoutBox>,
) -> &'a LayoutBox {
    let mut node = bx;
    while let Some(child) = pick(node.children.as_slice()) {
        if !child.is_block_level() || !child.is_in_normal_flow() {
            break;
        }
        node = child;
    }
    node
}

pub struct Descendants<'a> {
    stack: Vec<&'a LayoutBox>,
}

impl<'a> Iterator for Descendants<'a> {
    type Item = &'a LayoutBox;

    fn next(&mut self) -> Option<&'a LayoutBox> {
        let node = self.stack.pop()?;
        self.stack.extend(node.traversal_children().iter().rev());
        Some(node)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::style::{BoxDecorationBreak, Position, Style};

    fn block(id: u32) -> LayoutBox {
        LayoutBox::new(BoxId(id), BoxKind::Block, Rc::new(ComputedStyle::default()))
    }

    fn styled(id: u32, style: Style) -> LayoutBox {
        LayoutBox::new(BoxId(id), BoxKind::Block, Rc::new(style.resolve(None)))
    }

    #[test]
    fn geometry_accumulates_outward() {
        let mut b = block(1);
        b.width = Some(100.0);
        b.height = Some(50.0);
        b.padding = EdgeValues::uniform(5.0);
        b.border = EdgeValues::uniform(1.0);
        b.margin = EdgeValues::uniform(Some(10.0));
        assert_eq!(b.padding_width(), 110.0);
        assert_eq!(b.border_height(), 62.0);
        assert_eq!(b.margin_width(), 132.0);
        assert_eq!(b.content_box_y(), 16.0);
    }

    #[test]
    fn translate_moves_descendants_but_can_skip_floats() {
        let float = styled(
            3,
            Style {
                float: Some(crate::style::Float::Left),
                ..Default::default()
            },
        );
        let parent = block(1).with_children(vec![block(2), float]);
        let mut moved = parent.clone();
        moved.translate(0.0, 10.0, true);
        assert_eq!(moved.position_y, 10.0);
        assert_eq!(moved.children[0].position_y, 10.0);
        assert_eq!(moved.children[1].position_y, 0.0);
        // the source keeps its own children
        assert_eq!(parent.children[0].position_y, 0.0);
    }

    #[test]
    fn pending_placeholder_moves_only_static_position() {
        let abs = styled(
            2,
            Style {
                position: Some(Position::Absolute),
                ..Default::default()
            },
        )
        .with_children(vec![block(3)]);
        let mut placeholder = LayoutBox::placeholder(abs);
        placeholder.translate(5.0, 7.0, false);
        let BoxKind::Placeholder(p) = &placeholder.kind else {
            panic!("expected a placeholder");
        };
        assert_eq!(p.boxed().position_x, 5.0);
        assert_eq!(p.boxed().position_y, 7.0);
        assert_eq!(p.boxed().children[0].position_y, 0.0);
    }

    #[test]
    fn placeholder_resolves_once() {
        let mut p = Placeholder::Pending(Box::new(block(1)));
        assert!(p.set_laid_out(block(1)).is_ok());
        assert!(p.is_done());
        assert_eq!(
            p.set_laid_out(block(1)),
            Err(LayoutError::PlaceholderAlreadyResolved(BoxId(1)))
        );
    }

    #[test]
    fn decoration_is_kept_when_cloned() {
        let mut sliced = block(1);
        sliced.padding = EdgeValues::uniform(4.0);
        sliced.remove_decoration(true, false);
        assert_eq!(sliced.padding.top, 0.0);
        assert_eq!(sliced.padding.bottom, 4.0);

        let mut cloned = styled(
            2,
            Style {
                box_decoration_break: Some(BoxDecorationBreak::Clone),
                ..Default::default()
            },
        );
        cloned.padding = EdgeValues::uniform(4.0);
        cloned.remove_decoration(true, true);
        assert_eq!(cloned.padding.top, 4.0);
    }

    #[test]
    fn paths_reach_into_placeholders() {
        let abs = styled(
            5,
            Style {
                position: Some(Position::Absolute),
                ..Default::default()
            },
        )
        .with_children(vec![block(6)]);
        let tree = block(1).with_children(vec![block(2), LayoutBox::placeholder(abs)]);
        let path = tree.find_path(&|b| b.id == BoxId(6)).unwrap();
        assert_eq!(path, vec![1, 0, 0]);
        let ids: Vec<u32> = tree.descendants().map(|b| b.id.0).collect();
        assert_eq!(ids, vec![1, 2, 5, 5, 6]);
        let mut tree = tree;
        tree.at_path_mut(&path).unwrap().height = Some(3.0);
        assert_eq!(tree.at_path(&path).unwrap().height, Some(3.0));
    }
}
