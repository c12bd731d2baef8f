//! # Document Model
//!
//! The input representation: a tree of styled nodes plus page configuration.
//! This is what callers construct (directly or as JSON); the box builder in
//! [`build`] turns it into the formatting structure the layout core fragments.

pub mod build;

use serde::{Deserialize, Serialize};

use crate::style::{Edges, Style};

/// A complete document ready for pagination.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Document {
    /// The root element. Always laid out as a block container.
    pub root: Node,

    /// Default page configuration.
    #[serde(default)]
    pub page: PageConfig,

    /// `@page` rules, applied in order on top of `page` when they match.
    #[serde(default)]
    pub page_rules: Vec<PageRule>,

    #[serde(default)]
    pub options: LayoutOptions,
}

/// Configuration for a page.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageConfig {
    /// Page size. Defaults to A4.
    #[serde(default)]
    pub size: PageSize,

    /// Page margins in points (1/72 inch).
    #[serde(default = "default_page_margin")]
    pub margin: Edges,

    /// Maximum height of the footnote area. Unbounded when unset.
    #[serde(default)]
    pub footnote_max_height: Option<f64>,

    /// Contents of the page margin boxes.
    #[serde(default)]
    pub margin_boxes: Vec<MarginBoxSpec>,
}

impl Default for PageConfig {
    fn default() -> Self {
        Self {
            size: PageSize::A4,
            margin: default_page_margin(),
            footnote_max_height: None,
            margin_boxes: Vec::new(),
        }
    }
}

fn default_page_margin() -> Edges {
    Edges::uniform(54.0) // ~0.75 inch
}

/// Standard page sizes in points.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub enum PageSize {
    #[default]
    A4,
    A3,
    A5,
    Letter,
    Legal,
    Tabloid,
    Custom {
        width: f64,
        height: f64,
    },
}

impl PageSize {
    /// Returns (width, height) in points.
    pub fn dimensions(&self) -> (f64, f64) {
        match self {
            PageSize::A4 => (595.28, 841.89),
            PageSize::A3 => (841.89, 1190.55),
            PageSize::A5 => (419.53, 595.28),
            PageSize::Letter => (612.0, 792.0),
            PageSize::Legal => (612.0, 1008.0),
            PageSize::Tabloid => (792.0, 1224.0),
            PageSize::Custom { width, height } => (*width, *height),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PageSide {
    Left,
    Right,
}

/// An `@page` rule. Every selector field that is set must match.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageRule {
    #[serde(default)]
    pub first: Option<bool>,
    #[serde(default)]
    pub blank: Option<bool>,
    #[serde(default)]
    pub side: Option<PageSide>,
    /// Matches pages whose used page name is this.
    #[serde(default)]
    pub name: Option<String>,

    #[serde(default)]
    pub size: Option<PageSize>,
    #[serde(default)]
    pub margin: Option<Edges>,
    #[serde(default)]
    pub footnote_max_height: Option<f64>,
    /// Replaces margin boxes at the same position.
    #[serde(default)]
    pub margin_boxes: Vec<MarginBoxSpec>,
}

/// What a page looks like to `@page` selectors.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PageType {
    pub side: PageSide,
    pub blank: bool,
    pub first: bool,
    /// Zero-based page index.
    pub index: usize,
    pub name: Option<String>,
}

impl PageRule {
    pub fn matches(&self, page: &PageType) -> bool {
        self.first.map_or(true, |first| first == page.first)
            && self.blank.map_or(true, |blank| blank == page.blank)
            && self.side.map_or(true, |side| side == page.side)
            && self
                .name
                .as_ref()
                .map_or(true, |name| page.name.as_ref() == Some(name))
    }
}

/// The page configuration after applying matching `@page` rules.
#[derive(Debug, Clone)]
pub struct ResolvedPage {
    pub width: f64,
    pub height: f64,
    pub margin: Edges,
    pub footnote_max_height: Option<f64>,
    pub margin_boxes: Vec<MarginBoxSpec>,
}

impl Document {
    /// Resolve the page style for a page of the given type.
    pub fn page_style(&self, page: &PageType) -> ResolvedPage {
        let mut size = self.page.size;
        let mut resolved = ResolvedPage {
            width: 0.0,
            height: 0.0,
            margin: self.page.margin,
            footnote_max_height: self.page.footnote_max_height,
            margin_boxes: self.page.margin_boxes.clone(),
        };
        for rule in self.page_rules.iter().filter(|rule| rule.matches(page)) {
            if let Some(rule_size) = rule.size {
                size = rule_size;
            }
            if let Some(margin) = rule.margin {
                resolved.margin = margin;
            }
            if rule.footnote_max_height.is_some() {
                resolved.footnote_max_height = rule.footnote_max_height;
            }
            for spec in &rule.margin_boxes {
                resolved.margin_boxes.retain(|b| b.position != spec.position);
                resolved.margin_boxes.push(spec.clone());
            }
        }
        let (width, height) = size.dimensions();
        resolved.width = width;
        resolved.height = height;
        resolved
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MarginBoxPosition {
    TopLeft,
    TopCenter,
    TopRight,
    BottomLeft,
    BottomCenter,
    BottomRight,
}

impl MarginBoxPosition {
    pub fn is_top(self) -> bool {
        matches!(
            self,
            MarginBoxPosition::TopLeft | MarginBoxPosition::TopCenter | MarginBoxPosition::TopRight
        )
    }

    /// Column of the box along its edge: 0 left, 1 center, 2 right.
    pub fn column(self) -> usize {
        match self {
            MarginBoxPosition::TopLeft | MarginBoxPosition::BottomLeft => 0,
            MarginBoxPosition::TopCenter | MarginBoxPosition::BottomCenter => 1,
            MarginBoxPosition::TopRight | MarginBoxPosition::BottomRight => 2,
        }
    }
}

/// A page margin box and what it shows.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MarginBoxSpec {
    pub position: MarginBoxPosition,
    #[serde(default)]
    pub content: Vec<ContentItem>,
    #[serde(default)]
    pub style: Style,
}

/// One item of a `content` value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ContentItem {
    /// A literal string.
    Text(String),
    /// `counter(name)`; only the `page` and `pages` counters are known.
    Counter(String),
    /// `target-counter(anchor, name)`.
    TargetCounter { anchor: String, counter: String },
    /// `element(name)`: the running element of that name.
    Element(String),
}

/// A node in the document tree.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Node {
    /// What kind of node this is.
    pub kind: NodeKind,

    /// Style properties for this node.
    #[serde(default)]
    pub style: Style,

    /// Child nodes.
    #[serde(default)]
    pub children: Vec<Node>,
}

/// The different kinds of nodes in the document tree.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum NodeKind {
    /// A block container, analogous to a `<div>`.
    Block,
    /// An inline container, analogous to a `<span>`.
    Inline,
    /// A text run.
    Text { content: String },
    /// Text produced by `content`, recomputed as page numbers become known.
    Generated { content: Vec<ContentItem> },
    /// An image with intrinsic dimensions. Inline unless `display` says otherwise.
    Image { width: f64, height: f64 },
    Flex,
    Grid,
    Table,
    /// A footnote call. Its children form the call marker; `body` is moved to
    /// the footnote area of the page the call lands on.
    FootnoteCall { body: Box<Node> },
}

impl Node {
    pub fn block(children: Vec<Node>) -> Self {
        Self {
            kind: NodeKind::Block,
            style: Style::default(),
            children,
        }
    }

    pub fn text(content: &str) -> Self {
        Self {
            kind: NodeKind::Text {
                content: content.to_string(),
            },
            style: Style::default(),
            children: Vec::new(),
        }
    }

    pub fn with_style(mut self, style: Style) -> Self {
        self.style = style;
        self
    }
}

/// Limits for the pagination driver.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LayoutOptions {
    /// Maximum number of full pagination passes.
    #[serde(default = "default_max_loops")]
    pub max_loops: usize,
    /// Pagination fails past this many pages.
    #[serde(default = "default_max_pages")]
    pub max_pages: usize,
}

impl Default for LayoutOptions {
    fn default() -> Self {
        Self {
            max_loops: default_max_loops(),
            max_pages: default_max_pages(),
        }
    }
}

fn default_max_loops() -> usize {
    8
}

fn default_max_pages() -> usize {
    10_000
}
