//! # Style System
//!
//! The subset of CSS the fragmentation engine reads. Styles arrive already
//! cascaded: every box carries a [`Style`] with the declared values of its own
//! element, and [`Style::resolve`] fills the gaps from the parent (for
//! inherited properties) or from initial values.
//!
//! Selector matching and stylesheet parsing happen upstream and are out of
//! scope here.

use serde::{Deserialize, Serialize};

/// The declared style of a node. Unset properties are `None`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Style {
    // ── Box Model ──────────────────────────────────────────────
    pub display: Option<Display>,
    pub width: Option<Dimension>,
    pub height: Option<Dimension>,
    pub min_width: Option<Dimension>,
    pub max_width: Option<Dimension>,
    pub min_height: Option<Dimension>,
    pub max_height: Option<Dimension>,
    /// Margins. `Auto` is meaningful here.
    pub margin: Option<EdgeValues<Dimension>>,
    pub padding: Option<EdgeValues<Dimension>>,
    pub border_width: Option<Edges>,
    pub overflow: Option<Overflow>,

    // ── Positioning ────────────────────────────────────────────
    pub position: Option<Position>,
    pub top: Option<Dimension>,
    pub right: Option<Dimension>,
    pub bottom: Option<Dimension>,
    pub left: Option<Dimension>,
    pub float: Option<Float>,
    pub clear: Option<Clear>,

    // ── Fragmentation ──────────────────────────────────────────
    pub break_before: Option<BreakValue>,
    pub break_after: Option<BreakValue>,
    pub break_inside: Option<BreakValue>,
    /// Minimum lines left at the top of a new page. Inherited, default 2.
    pub widows: Option<u32>,
    /// Minimum lines kept at the bottom of a page. Inherited, default 2.
    pub orphans: Option<u32>,
    pub margin_break: Option<MarginBreak>,
    pub box_decoration_break: Option<BoxDecorationBreak>,
    /// Named page this box wants to be laid out on.
    pub page: Option<String>,
    pub footnote_policy: Option<FootnotePolicy>,

    // ── Text ───────────────────────────────────────────────────
    pub font_size: Option<f64>,
    /// Line height as a multiple of the font size.
    pub line_height: Option<f64>,
    pub white_space: Option<WhiteSpace>,
    pub text_indent: Option<Dimension>,
    pub text_align: Option<TextAlign>,
    pub text_align_last: Option<TextAlign>,
    pub vertical_align: Option<VerticalAlign>,
    pub direction: Option<Direction>,

    // ── Flex rows ──────────────────────────────────────────────
    pub flex_grow: Option<f64>,
    pub flex_shrink: Option<f64>,
    pub column_gap: Option<f64>,

    // ── Generated content ──────────────────────────────────────
    /// Makes this box a target for `target-counter()` lookups.
    pub anchor: Option<String>,
    /// Style of the `::first-letter` pseudo-element of a block container.
    pub first_letter: Option<Box<Style>>,
}

/// A dimension that can be points, percentage, or auto.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum Dimension {
    /// Fixed size in points (1/72 inch).
    Pt(f64),
    /// Percentage of the containing block's corresponding dimension.
    Percent(f64),
    /// Automatic sizing.
    Auto,
}

impl Dimension {
    /// Resolve against the containing block size. `Auto` stays unresolved.
    pub fn resolve(&self, parent_size: f64) -> Option<f64> {
        match self {
            Dimension::Pt(v) => Some(*v),
            Dimension::Percent(p) => Some(parent_size * p / 100.0),
            Dimension::Auto => None,
        }
    }

    /// Like [`Dimension::resolve`], but a percentage of an unknown size is auto.
    pub fn resolve_maybe(&self, parent_size: Option<f64>) -> Option<f64> {
        match (self, parent_size) {
            (Dimension::Pt(v), _) => Some(*v),
            (Dimension::Percent(p), Some(size)) => Some(size * p / 100.0),
            _ => None,
        }
    }

    pub fn is_auto(&self) -> bool {
        matches!(self, Dimension::Auto)
    }

    /// The value in points when it does not depend on the containing block.
    pub fn fixed(&self) -> Option<f64> {
        match self {
            Dimension::Pt(v) => Some(*v),
            _ => None,
        }
    }
}

impl Default for Dimension {
    fn default() -> Self {
        Dimension::Auto
    }
}

/// Values for each edge (top, right, bottom, left).
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct EdgeValues<T: Copy> {
    pub top: T,
    pub right: T,
    pub bottom: T,
    pub left: T,
}

impl<T: Copy> EdgeValues<T> {
    pub fn uniform(v: T) -> Self {
        Self {
            top: v,
            right: v,
            bottom: v,
            left: v,
        }
    }
}

/// Edge values in points, used for borders and page margins.
pub type Edges = EdgeValues<f64>;

impl Edges {
    pub fn symmetric(vertical: f64, horizontal: f64) -> Self {
        Self {
            top: vertical,
            right: horizontal,
            bottom: vertical,
            left: horizontal,
        }
    }

    pub fn horizontal(&self) -> f64 {
        self.left + self.right
    }

    pub fn vertical(&self) -> f64 {
        self.top + self.bottom
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Display {
    #[default]
    Block,
    Inline,
    /// A block container that always establishes a formatting context.
    FlowRoot,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Overflow {
    #[default]
    Visible,
    Hidden,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Position {
    #[default]
    Static,
    Relative,
    Absolute,
    Fixed,
    /// Removed from the flow and shown in page margin boxes via `element()`.
    Running(String),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Float {
    #[default]
    None,
    Left,
    Right,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Clear {
    #[default]
    None,
    Left,
    Right,
    Both,
}

/// Values of `break-before`, `break-after` and `break-inside`.
///
/// `break-inside` only uses `Auto`, `Avoid` and `AvoidPage`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BreakValue {
    #[default]
    Auto,
    Avoid,
    AvoidPage,
    Page,
    Left,
    Right,
    Recto,
    Verso,
}

impl BreakValue {
    /// `avoid` or `avoid-page`.
    pub fn avoids_page_break(self) -> bool {
        matches!(self, BreakValue::Avoid | BreakValue::AvoidPage)
    }

    /// Any value forcing a page break.
    pub fn forces_page_break(self) -> bool {
        matches!(
            self,
            BreakValue::Page
                | BreakValue::Left
                | BreakValue::Right
                | BreakValue::Recto
                | BreakValue::Verso
        )
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum MarginBreak {
    #[default]
    Auto,
    Keep,
    Discard,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum BoxDecorationBreak {
    #[default]
    Slice,
    Clone,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum FootnotePolicy {
    #[default]
    Auto,
    Line,
    Block,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum WhiteSpace {
    #[default]
    Normal,
    Nowrap,
    Pre,
    PreWrap,
    PreLine,
}

impl WhiteSpace {
    /// Whether lines may wrap at soft break opportunities.
    pub fn wraps(self) -> bool {
        matches!(self, WhiteSpace::Normal | WhiteSpace::PreWrap | WhiteSpace::PreLine)
    }

    /// Whether runs of spaces collapse into one.
    pub fn collapses_spaces(self) -> bool {
        matches!(self, WhiteSpace::Normal | WhiteSpace::Nowrap | WhiteSpace::PreLine)
    }

    /// Whether newlines in the source are forced breaks.
    pub fn preserves_newlines(self) -> bool {
        matches!(self, WhiteSpace::Pre | WhiteSpace::PreWrap | WhiteSpace::PreLine)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum TextAlign {
    #[default]
    Start,
    End,
    Left,
    Right,
    Center,
    Justify,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub enum VerticalAlign {
    #[default]
    Baseline,
    Middle,
    TextTop,
    TextBottom,
    Top,
    Bottom,
    /// Raise the baseline by this many points.
    Length(f64),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Direction {
    #[default]
    Ltr,
    Rtl,
}

/// A fully resolved style: every property has a value.
#[derive(Debug, Clone, PartialEq)]
pub struct ComputedStyle {
    pub display: Display,
    pub width: Dimension,
    pub height: Dimension,
    pub min_width: Dimension,
    /// `Auto` means no maximum.
    pub max_width: Dimension,
    pub min_height: Dimension,
    pub max_height: Dimension,
    pub margin: EdgeValues<Dimension>,
    pub padding: EdgeValues<Dimension>,
    pub border_width: Edges,
    pub overflow: Overflow,

    pub position: Position,
    pub top: Dimension,
    pub right: Dimension,
    pub bottom: Dimension,
    pub left: Dimension,
    pub float: Float,
    pub clear: Clear,

    pub break_before: BreakValue,
    pub break_after: BreakValue,
    pub break_inside: BreakValue,
    pub widows: u32,
    pub orphans: u32,
    pub margin_break: MarginBreak,
    pub box_decoration_break: BoxDecorationBreak,
    pub page: Option<String>,
    pub footnote_policy: FootnotePolicy,

    pub font_size: f64,
    pub line_height: f64,
    pub white_space: WhiteSpace,
    pub text_indent: Dimension,
    pub text_align: TextAlign,
    pub text_align_last: Option<TextAlign>,
    pub vertical_align: VerticalAlign,
    pub direction: Direction,

    pub flex_grow: f64,
    pub flex_shrink: f64,
    pub column_gap: f64,

    pub anchor: Option<String>,
}

impl Default for ComputedStyle {
    fn default() -> Self {
        Style::default().resolve(None)
    }
}

impl Style {
    /// Resolve this style against the parent's computed style.
    ///
    /// Inherited properties (text properties, `widows`, `orphans`, `direction`)
    /// fall back to the parent; everything else falls back to its initial value.
    /// `page` is not inherited in CSS, but a box whose `page` is `auto` lives
    /// on its parent's page, so the parent's used value is carried down.
    pub fn resolve(&self, parent: Option<&ComputedStyle>) -> ComputedStyle {
        let zero = Dimension::Pt(0.0);
        let inherit_f64 = |own: Option<f64>, pick: fn(&ComputedStyle) -> f64, initial: f64| {
            own.or_else(|| parent.map(pick)).unwrap_or(initial)
        };

        ComputedStyle {
            display: self.display.unwrap_or_default(),
            width: self.width.unwrap_or(Dimension::Auto),
            height: self.height.unwrap_or(Dimension::Auto),
            min_width: self.min_width.unwrap_or(zero),
            max_width: self.max_width.unwrap_or(Dimension::Auto),
            min_height: self.min_height.unwrap_or(zero),
            max_height: self.max_height.unwrap_or(Dimension::Auto),
            margin: self.margin.unwrap_or(EdgeValues::uniform(zero)),
            padding: self.padding.unwrap_or(EdgeValues::uniform(zero)),
            border_width: self.border_width.unwrap_or_default(),
            overflow: self.overflow.unwrap_or_default(),

            position: self.position.clone().unwrap_or_default(),
            top: self.top.unwrap_or(Dimension::Auto),
            right: self.right.unwrap_or(Dimension::Auto),
            bottom: self.bottom.unwrap_or(Dimension::Auto),
            left: self.left.unwrap_or(Dimension::Auto),
            float: self.float.unwrap_or_default(),
            clear: self.clear.unwrap_or_default(),

            break_before: self.break_before.unwrap_or_default(),
            break_after: self.break_after.unwrap_or_default(),
            break_inside: self.break_inside.unwrap_or_default(),
            widows: self.widows.or(parent.map(|p| p.widows)).unwrap_or(2),
            orphans: self.orphans.or(parent.map(|p| p.orphans)).unwrap_or(2),
            margin_break: self.margin_break.unwrap_or_default(),
            box_decoration_break: self.box_decoration_break.unwrap_or_default(),
            page: self
                .page
                .clone()
                .or_else(|| parent.and_then(|p| p.page.clone())),
            footnote_policy: self.footnote_policy.unwrap_or_default(),

            font_size: inherit_f64(self.font_size, |p| p.font_size, 12.0),
            line_height: inherit_f64(self.line_height, |p| p.line_height, 1.2),
            white_space: self
                .white_space
                .or(parent.map(|p| p.white_space))
                .unwrap_or_default(),
            text_indent: self
                .text_indent
                .or(parent.map(|p| p.text_indent))
                .unwrap_or(zero),
            text_align: self
                .text_align
                .or(parent.map(|p| p.text_align))
                .unwrap_or_default(),
            text_align_last: self
                .text_align_last
                .or(parent.and_then(|p| p.text_align_last)),
            vertical_align: self.vertical_align.unwrap_or_default(),
            direction: self
                .direction
                .or(parent.map(|p| p.direction))
                .unwrap_or_default(),

            flex_grow: self.flex_grow.unwrap_or(0.0),
            flex_shrink: self.flex_shrink.unwrap_or(1.0),
            column_gap: self.column_gap.unwrap_or(0.0),

            anchor: self.anchor.clone(),
        }
    }
}

impl ComputedStyle {
    pub fn is_floated(&self) -> bool {
        self.float != Float::None
    }

    pub fn is_absolutely_positioned(&self) -> bool {
        matches!(self.position, Position::Absolute | Position::Fixed)
    }

    pub fn is_running(&self) -> bool {
        matches!(self.position, Position::Running(_))
    }

    /// Same style with positioning reset to static, used when a running
    /// element is placed in a margin box.
    pub fn in_flow(&self) -> ComputedStyle {
        ComputedStyle {
            position: Position::Static,
            float: Float::None,
            ..self.clone()
        }
    }
}
