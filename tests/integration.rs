//! Integration tests for the folio pagination pipeline.
//!
//! These tests exercise the full path from a document to laid-out pages.
//! They verify:
//! - Content overflowing a page continues on the next one
//! - Forced breaks, widows and margin collapsing
//! - Floats, absolute boxes and flex rows on the page
//! - Footnotes, margin boxes and page-based counters
//! - JSON input and error reporting
//!
//! Every page is 200×300pt with 50pt margins: a 100×200pt content area
//! ending at y = 250. Text uses the fixed-advance shaper: 12pt text, 6pt per
//! character, 14.4pt lines.

use folio::boxes::{BoxKind, LayoutBox};
use folio::error::{FolioError, LayoutError};
use folio::layout::page::Page;
use folio::model::*;
use folio::style::*;

// ─── Helpers ────────────────────────────────────────────────────

fn make_text(content: &str) -> Node {
    Node::text(content)
}

fn make_block(children: Vec<Node>) -> Node {
    Node::block(children)
}

fn make_styled_block(style: Style, children: Vec<Node>) -> Node {
    Node {
        kind: NodeKind::Block,
        style,
        children,
    }
}

fn make_sized_block(height: f64) -> Node {
    make_styled_block(
        Style {
            height: Some(Dimension::Pt(height)),
            ..Default::default()
        },
        vec![],
    )
}

/// A paragraph of `lines` lines: three four-letter words fill a line.
fn make_paragraph(lines: usize) -> Node {
    let words = vec!["word"; lines * 3].join(" ");
    make_block(vec![make_text(&words)])
}

fn make_margin(top: f64, bottom: f64) -> EdgeValues<Dimension> {
    EdgeValues {
        top: Dimension::Pt(top),
        right: Dimension::Pt(0.0),
        bottom: Dimension::Pt(bottom),
        left: Dimension::Pt(0.0),
    }
}

fn default_doc(children: Vec<Node>) -> Document {
    Document {
        root: make_block(children),
        page: PageConfig {
            size: PageSize::Custom {
                width: 200.0,
                height: 300.0,
            },
            margin: Edges::uniform(50.0),
            footnote_max_height: None,
            margin_boxes: Vec::new(),
        },
        page_rules: Vec::new(),
        options: LayoutOptions::default(),
    }
}

fn layout_doc(doc: &Document) -> Vec<Page> {
    folio::paginate(doc).expect("layout failed")
}

fn root(page: &Page) -> &LayoutBox {
    page.root().expect("page without root fragment")
}

fn line_count(page: &Page) -> usize {
    root(page).descendants().filter(|b| b.is_line_box()).count()
}

fn page_text(page: &Page) -> String {
    root(page).descendants().filter_map(LayoutBox::text).collect()
}

// ─── Fragmentation ──────────────────────────────────────────────

#[test]
fn test_empty_document() {
    let pages = layout_doc(&default_doc(vec![]));
    assert_eq!(pages.len(), 1);
    assert_eq!(pages[0].width, 200.0);
    assert_eq!(pages[0].height, 300.0);
}

#[test]
fn test_content_overflow_creates_new_page() {
    let pages = layout_doc(&default_doc(vec![
        make_sized_block(150.0),
        make_sized_block(150.0),
        make_sized_block(150.0),
    ]));
    assert_eq!(pages.len(), 3);
    for page in &pages {
        assert_eq!(root(page).children.len(), 1);
        assert_eq!(root(page).children[0].position_y, 50.0);
    }
}

#[test]
fn test_forced_page_break() {
    let second = make_styled_block(
        Style {
            height: Some(Dimension::Pt(10.0)),
            break_before: Some(BreakValue::Page),
            ..Default::default()
        },
        vec![],
    );
    let pages = layout_doc(&default_doc(vec![make_sized_block(10.0), second]));
    assert_eq!(pages.len(), 2);
    assert!(!pages[1].page_type.blank);
    assert_eq!(root(&pages[1]).children[0].position_y, 50.0);
}

#[test]
fn test_lines_flow_across_pages() {
    let pages = layout_doc(&default_doc(vec![make_paragraph(30)]));
    assert_eq!(pages.len(), 3);
    // 13 lines of 14.4pt fit in 200pt.
    assert_eq!(line_count(&pages[0]), 13);
    assert_eq!(line_count(&pages[1]), 13);
    assert_eq!(line_count(&pages[2]), 4);
}

#[test]
fn test_widows_pull_lines_to_the_next_page() {
    let pages = layout_doc(&default_doc(vec![make_paragraph(14)]));
    assert_eq!(pages.len(), 2);
    assert_eq!(line_count(&pages[0]), 12);
    assert_eq!(line_count(&pages[1]), 2);
}

#[test]
fn test_adjoining_margins_collapse() {
    let first = make_styled_block(
        Style {
            height: Some(Dimension::Pt(10.0)),
            margin: Some(make_margin(0.0, 20.0)),
            ..Default::default()
        },
        vec![],
    );
    let second = make_styled_block(
        Style {
            height: Some(Dimension::Pt(10.0)),
            margin: Some(make_margin(30.0, 0.0)),
            ..Default::default()
        },
        vec![],
    );
    let pages = layout_doc(&default_doc(vec![first, second]));
    let children = &root(&pages[0]).children;
    assert_eq!(children[0].border_box_y(), 50.0);
    assert_eq!(children[1].border_box_y(), 90.0);
}

// ─── Out-of-flow and strategies ─────────────────────────────────

#[test]
fn test_right_float_sits_at_the_right_edge() {
    let float = make_styled_block(
        Style {
            float: Some(Float::Right),
            width: Some(Dimension::Pt(40.0)),
            height: Some(Dimension::Pt(30.0)),
            ..Default::default()
        },
        vec![],
    );
    let pages = layout_doc(&default_doc(vec![float, make_paragraph(2)]));
    assert_eq!(pages.len(), 1);
    let float = &root(&pages[0]).children[0];
    assert!(float.is_floated());
    assert_eq!(float.position_x, 110.0);
    assert_eq!(float.position_y, 50.0);
}

#[test]
fn test_absolute_box_is_placed_against_the_page() {
    let absolute = make_styled_block(
        Style {
            position: Some(Position::Absolute),
            top: Some(Dimension::Pt(10.0)),
            left: Some(Dimension::Pt(20.0)),
            width: Some(Dimension::Pt(30.0)),
            height: Some(Dimension::Pt(30.0)),
            ..Default::default()
        },
        vec![],
    );
    let pages = layout_doc(&default_doc(vec![absolute, make_sized_block(10.0)]));
    let summary = pages[0].summary();
    let placeholder = &summary.root.as_ref().unwrap().children[0];
    assert_eq!(placeholder.kind, "placeholder");
    let placed = &placeholder.children[0];
    assert_eq!((placed.x, placed.y), (70.0, 60.0));
    assert_eq!((placed.width, placed.height), (30.0, 30.0));
}

#[test]
fn test_flex_row_items_share_the_free_space() {
    let item = || {
        make_styled_block(
            Style {
                flex_grow: Some(1.0),
                height: Some(Dimension::Pt(20.0)),
                ..Default::default()
            },
            vec![],
        )
    };
    let row = Node {
        kind: NodeKind::Flex,
        style: Style::default(),
        children: vec![item(), item()],
    };
    let pages = layout_doc(&default_doc(vec![row]));
    let row = &root(&pages[0]).children[0];
    assert!(matches!(row.kind, BoxKind::Flex));
    assert_eq!(row.children.len(), 2);
    assert_eq!(row.children[0].width, Some(50.0));
    assert_eq!(row.children[1].position_x, 100.0);
    assert_eq!(row.content_height(), 20.0);
}

#[test]
fn test_broken_float_continues_on_the_next_page() {
    let words = vec!["word"; 60].join(" ");
    let float = make_styled_block(
        Style {
            float: Some(Float::Right),
            width: Some(Dimension::Pt(100.0)),
            ..Default::default()
        },
        vec![make_text(&words)],
    );
    let pages = layout_doc(&default_doc(vec![float, make_sized_block(150.0), make_sized_block(150.0)]));
    assert_eq!(pages.len(), 2);

    let word_count = |page: &Page| {
        let float = &root(page).children[0];
        assert!(float.is_floated());
        float
            .descendants()
            .filter_map(LayoutBox::text)
            .flat_map(str::split_whitespace)
            .count()
    };
    // 13 lines of three words fit on the first page.
    assert_eq!(word_count(&pages[0]), 39);
    assert_eq!(word_count(&pages[1]), 21);
    assert_eq!(root(&pages[1]).children[0].position_y, 50.0);
}

// ─── Footnotes, margin boxes and counters ───────────────────────

/// Ten lines, then a paragraph of three lines whose last line calls a 40pt
/// footnote. The footnote does not fit beside the third line.
fn make_footnote_doc(policy: FootnotePolicy) -> Document {
    let body = make_styled_block(
        Style {
            footnote_policy: Some(policy),
            ..Default::default()
        },
        vec![make_sized_block(40.0)],
    );
    let call = Node {
        kind: NodeKind::FootnoteCall { body: Box::new(body) },
        style: Style::default(),
        children: vec![make_text("1")],
    };
    let paragraph = make_styled_block(
        Style {
            orphans: Some(1),
            widows: Some(1),
            ..Default::default()
        },
        vec![make_text(&vec!["word"; 7].join(" ")), call],
    );
    default_doc(vec![make_paragraph(10), paragraph])
}

#[test]
fn test_footnote_policy_auto_reports_the_footnote() {
    let pages = layout_doc(&make_footnote_doc(FootnotePolicy::Auto));
    assert_eq!(pages.len(), 2);
    assert_eq!(line_count(&pages[0]), 13);
    assert!(pages[0].footnote_area().is_none());
    assert!(pages[1].page_type.blank);
    assert_eq!(pages[1].footnote_area().unwrap().children.len(), 1);
}

#[test]
fn test_footnote_policy_line_moves_the_calling_line() {
    let pages = layout_doc(&make_footnote_doc(FootnotePolicy::Line));
    assert_eq!(pages.len(), 2);
    assert_eq!(line_count(&pages[0]), 12);
    assert_eq!(line_count(&pages[1]), 1);
    assert!(pages[0].footnote_area().is_none());
    assert_eq!(pages[1].footnote_area().unwrap().children.len(), 1);
}

#[test]
fn test_footnote_policy_block_moves_the_paragraph() {
    let pages = layout_doc(&make_footnote_doc(FootnotePolicy::Block));
    assert_eq!(pages.len(), 2);
    assert_eq!(line_count(&pages[0]), 10);
    assert_eq!(line_count(&pages[1]), 3);
    assert!(pages[0].footnote_area().is_none());
    assert_eq!(pages[1].footnote_area().unwrap().children.len(), 1);
}


#[test]
fn test_footnote_sits_at_the_page_bottom() {
    let call = Node {
        kind: NodeKind::FootnoteCall {
            body: Box::new(make_block(vec![make_text("note")])),
        },
        style: Style::default(),
        children: vec![make_text("1")],
    };
    let pages = layout_doc(&default_doc(vec![make_block(vec![make_text("see "), call])]));
    assert_eq!(pages.len(), 1);
    let area = pages[0].footnote_area().expect("no footnote area");
    assert_eq!(area.children.len(), 1);
    assert!((area.position_y + area.margin_height() - 250.0).abs() < 1e-9);
    assert_eq!(pages[0].summary().footnotes, 1);
}

#[test]
fn test_page_counters_in_margin_boxes() {
    let mut doc = default_doc(vec![
        make_sized_block(150.0),
        make_sized_block(150.0),
        make_sized_block(150.0),
    ]);
    doc.page.margin_boxes.push(MarginBoxSpec {
        position: MarginBoxPosition::BottomRight,
        content: vec![
            ContentItem::Text("Page ".to_string()),
            ContentItem::Counter("page".to_string()),
            ContentItem::Text(" of ".to_string()),
            ContentItem::Counter("pages".to_string()),
        ],
        style: Style::default(),
    });
    doc.page_rules.push(PageRule {
        first: Some(true),
        margin_boxes: vec![MarginBoxSpec {
            position: MarginBoxPosition::BottomRight,
            content: vec![],
            style: Style::default(),
        }],
        ..Default::default()
    });
    let pages = layout_doc(&doc);
    assert_eq!(pages.len(), 3);
    let texts: Vec<String> = pages
        .iter()
        .map(|p| p.summary().margin_boxes[0].text.clone())
        .collect();
    // A third of the content width: the text wraps, one space between lines.
    assert_eq!(texts, ["", "Page 2 of 3", "Page 3 of 3"]);
    let lines = pages[1].margin_boxes[0]
        .descendants()
        .filter(|b| b.is_line_box())
        .count();
    assert!(lines > 1);
}

#[test]
fn test_target_counter_points_forward() {
    let reference = make_block(vec![Node {
        kind: NodeKind::Generated {
            content: vec![
                ContentItem::Text("p. ".to_string()),
                ContentItem::TargetCounter {
                    anchor: "end".to_string(),
                    counter: "page".to_string(),
                },
            ],
        },
        style: Style::default(),
        children: vec![],
    }]);
    let target = make_styled_block(
        Style {
            height: Some(Dimension::Pt(10.0)),
            anchor: Some("end".to_string()),
            ..Default::default()
        },
        vec![],
    );
    let pages = layout_doc(&default_doc(vec![
        reference,
        make_sized_block(150.0),
        make_sized_block(150.0),
        target,
    ]));
    // 14.4 + 150 fill page 1; the second block and the target share page 2.
    assert_eq!(pages.len(), 2);
    assert_eq!(page_text(&pages[0]), "p. 2");
}

// ─── JSON and errors ────────────────────────────────────────────

#[test]
fn test_minimal_json() {
    let json = r#"{
        "root": {"kind": {"type": "Block"}, "children": [
            {"kind": {"type": "Text", "content": "Hello"}}
        ]},
        "page": {"size": {"Custom": {"width": 200, "height": 300}}}
    }"#;
    let summaries = folio::summarize_json(json).unwrap();
    assert_eq!(summaries.len(), 1);
    assert_eq!(summaries[0].width, 200.0);
    let value = serde_json::to_value(&summaries).unwrap();
    assert_eq!(value[0]["number"], 1);
}

#[test]
fn test_invalid_json_reports_a_hint() {
    match folio::paginate_json(r#"{"root": 5}"#) {
        Err(FolioError::ParseError { hint, .. }) => assert!(hint.contains("schema")),
        other => panic!("expected a parse error, got {:?}", other.map(|p| p.len())),
    }
}

#[test]
fn test_page_limit_is_an_error() {
    let mut doc = default_doc((0..4).map(|_| make_sized_block(150.0)).collect());
    doc.options.max_pages = 2;
    match folio::paginate(&doc) {
        Err(FolioError::Layout(LayoutError::PageLimit(2))) => {}
        other => panic!("expected the page limit, got {:?}", other.map(|p| p.len())),
    }
}
