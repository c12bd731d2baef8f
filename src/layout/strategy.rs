//! # Layout Strategies
//!
//! Flex, grid and table containers are laid out by pluggable strategies.
//! The fragmentation loop only needs the contract of
//! [`LayoutStrategy::layout`]: a fragment that fits above the page bottom and
//! a resume stack, exactly like a block container reports them.
//!
//! The registry maps each [`StrategyKind`] to an implementation. Kinds with
//! no registered strategy fall back to [`BlockFlowStrategy`], which stacks
//! the children like a block container would.

use std::collections::HashMap;
use std::rc::Rc;

use crate::boxes::{BoxId, LayoutBox};
use crate::error::LayoutResult;

use super::block::block_container_layout;
use super::flex::FlexRowStrategy;
use super::percentages::block_level_width;
use super::resume::ResumeStack;
use super::{BlockLayout, ContainingBlock, LayoutContext};

/// Kinds of containers laid out by a strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StrategyKind {
    Flex,
    Grid,
    Table,
}

/// Lays out a container and the part of its content that fits on the page.
///
/// `bx` arrives with its used margins, padding and borders resolved and its
/// position set. Implementations return `None` when nothing fits and the
/// whole box must move to the next page.
pub trait LayoutStrategy {
    #[allow(clippy::too_many_arguments)]
    fn layout(
        &self,
        ctx: &mut LayoutContext,
        bx: LayoutBox,
        bottom_space: f64,
        skip_stack: Option<&ResumeStack>,
        cb: &ContainingBlock,
        page_is_empty: bool,
        absolute_boxes: &mut Vec<BoxId>,
        fixed_boxes: &mut Vec<BoxId>,
    ) -> LayoutResult<(Option<LayoutBox>, BlockLayout)>;
}

/// Lays the children out one below the other, as a block container.
#[derive(Debug, Clone, Copy, Default)]
pub struct BlockFlowStrategy;

impl LayoutStrategy for BlockFlowStrategy {
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
        if bx.width.is_none() || bx.margin.left.is_none() || bx.margin.right.is_none() {
            block_level_width(&mut bx, cb);
        }
        block_container_layout(
            ctx,
            bx,
            bottom_space,
            skip_stack,
            page_is_empty,
            absolute_boxes,
            fixed_boxes,
            &mut Vec::new(),
            false,
        )
    }
}

/// Strategies by container kind.
#[derive(Clone, Default)]
pub struct StrategyRegistry {
    strategies: HashMap<StrategyKind, Rc<dyn LayoutStrategy>>,
}

impl StrategyRegistry {
    /// Flex rows with [`FlexRowStrategy`], grids and tables as block flow.
    pub fn with_defaults() -> Self {
        let mut registry = Self::default();
        registry.register(StrategyKind::Flex, Rc::new(FlexRowStrategy));
        registry.register(StrategyKind::Grid, Rc::new(BlockFlowStrategy));
        registry.register(StrategyKind::Table, Rc::new(BlockFlowStrategy));
        registry
    }

    pub fn register(&mut self, kind: StrategyKind, strategy: Rc<dyn LayoutStrategy>) {
        self.strategies.insert(kind, strategy);
    }

    pub fn get(&self, kind: StrategyKind) -> Option<Rc<dyn LayoutStrategy>> {
        self.strategies.get(&kind).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::boxes::BoxKind;
    use crate::layout::tests::{context, id};
    use crate::style::{ComputedStyle, Dimension, Style};

    fn block(height: f64) -> LayoutBox {
        let style = Style {
            height: Some(Dimension::Pt(height)),
            ..Default::default()
        }
        .resolve(None);
        LayoutBox::new(id(), BoxKind::Block, Rc::new(style))
    }

    fn page_cb(width: f64) -> ContainingBlock {
        ContainingBlock {
            x: 0.0,
            y: 0.0,
            width,
            height: None,
            direction: Default::default(),
            is_for_root_element: false,
        }
    }

    #[test]
    fn defaults_cover_every_kind() {
        let registry = StrategyRegistry::with_defaults();
        for kind in [StrategyKind::Flex, StrategyKind::Grid, StrategyKind::Table] {
            assert!(registry.get(kind).is_some(), "{kind:?}");
        }
        assert!(StrategyRegistry::default().get(StrategyKind::Grid).is_none());
    }

    #[test]
    fn block_flow_fragments_like_a_block() {
        let mut ctx = context(150.0);
        ctx.shapes.push_context();
        let grid = LayoutBox::new(id(), BoxKind::Grid, Rc::new(ComputedStyle::default()))
            .with_children(vec![block(100.0), block(100.0)]);
        let (laid_out, result) = BlockFlowStrategy
            .layout(&mut ctx, grid, 0.0, None, &page_cb(300.0), true, &mut Vec::new(), &mut Vec::new())
            .unwrap();
        let laid_out = laid_out.unwrap();
        assert_eq!(laid_out.children.len(), 1);
        assert_eq!(laid_out.content_width(), 300.0);
        assert_eq!(result.resume_at, Some(ResumeStack::at(1)));

        let grid = LayoutBox::new(id(), BoxKind::Grid, Rc::new(ComputedStyle::default()))
            .with_children(vec![block(100.0), block(100.0)]);
        let (laid_out, result) = BlockFlowStrategy
            .layout(
                &mut ctx,
                grid,
                0.0,
                Some(&ResumeStack::at(1)),
                &page_cb(300.0),
                true,
                &mut Vec::new(),
                &mut Vec::new(),
            )
            .unwrap();
        assert_eq!(laid_out.unwrap().children.len(), 1);
        assert!(result.resume_at.is_none());
    }
}
