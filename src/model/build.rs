//! # Box Building
//!
//! Turns the [`Node`] tree into the box tree the layout core fragments:
//!
//! - block containers holding inline-level content get an anonymous line box;
//!   mixed content is split into anonymous blocks, one line box each
//! - collapsible white space is processed once, here, across text runs
//! - `::first-letter` is extracted into its own inline box
//! - footnote bodies are moved out of the flow into a side table
//! - generated content is registered for counter and target resolution
//!
//! Every box gets a fresh [`BoxId`]; layout copies keep it.

use std::collections::HashMap;
use std::rc::Rc;

use log::warn;

use crate::boxes::{BoxId, BoxKind, LayoutBox, LineData, ReplacedData, TextData};
use crate::counters;
use crate::model::{ContentItem, Node, NodeKind};
use crate::style::{ComputedStyle, Display, Style, WhiteSpace};

/// Text produced by `content`, to be recomputed during pagination.
#[derive(Debug, Clone)]
pub struct GeneratedText {
    pub id: BoxId,
    pub content: Vec<ContentItem>,
}

/// The built formatting structure.
#[derive(Debug, Clone)]
pub struct BoxTree {
    pub root: LayoutBox,
    /// Footnote bodies by id, in document order in `footnote_order`.
    pub footnotes: HashMap<BoxId, LayoutBox>,
    pub footnote_order: Vec<BoxId>,
    pub generated: Vec<GeneratedText>,
    /// Every `anchor` declared in the document.
    pub anchors: Vec<String>,
}

/// Build the box tree of a document root.
pub fn build_box_tree(root: &Node) -> BoxTree {
    let mut builder = BoxBuilder::default();
    let style = Rc::new(root.style.resolve(None));
    let mut root_box = builder.block_container(BoxKind::Block, root, style);
    root_box.is_for_root_element = true;
    BoxTree {
        root: root_box,
        footnotes: builder.footnotes,
        footnote_order: builder.footnote_order,
        generated: builder.generated,
        anchors: builder.anchors,
    }
}

#[derive(Default)]
struct BoxBuilder {
    next_id: u32,
    footnotes: HashMap<BoxId, LayoutBox>,
    footnote_order: Vec<BoxId>,
    generated: Vec<GeneratedText>,
    anchors: Vec<String>,
}

/// A built child and how it participates in its parent.
struct Built {
    bx: LayoutBox,
    inline_level: bool,
}

impl BoxBuilder {
    fn id(&mut self) -> BoxId {
        let id = BoxId(self.next_id);
        self.next_id += 1;
        id
    }

    fn anonymous(&mut self, kind: BoxKind, parent: &ComputedStyle) -> LayoutBox {
        let id = self.id();
        LayoutBox::new(id, kind, Rc::new(Style::default().resolve(Some(parent))))
    }

    fn block_container(&mut self, kind: BoxKind, node: &Node, style: Rc<ComputedStyle>) -> LayoutBox {
        if let Some(anchor) = &style.anchor {
            self.anchors.push(anchor.clone());
        }
        let id = self.id();
        let mut container = LayoutBox::new(id, kind, Rc::clone(&style));
        let built: Vec<Built> = node
            .children
            .iter()
            .filter_map(|child| self.build(child, &style))
            .collect();

        // Flex items, grid items and table rows are always block-level.
        let mixed = !matches!(container.kind, BoxKind::Block)
            || built.iter().any(|b| !b.inline_level && b.bx.is_in_normal_flow());
        let children = if mixed {
            self.wrap_inline_runs(built, &style)
        } else if built.is_empty() {
            Vec::new()
        } else {
            self.line_of(built.into_iter().map(|b| b.bx).collect(), &style)
                .into_iter()
                .collect()
        };
        container = container.with_children(reindex(children));

        if let Some(first_letter) = &node.style.first_letter {
            let letter_style = Rc::new(first_letter.resolve(Some(&style)));
            self.extract_first_letter(&mut container, letter_style);
        }
        container
    }

    /// Group consecutive inline-level children into anonymous blocks.
    ///
    /// Out-of-flow boxes join an open inline run, and are block-level
    /// otherwise.
    fn wrap_inline_runs(&mut self, built: Vec<Built>, parent: &ComputedStyle) -> Vec<LayoutBox> {
        let mut children = Vec::new();
        let mut run: Vec<LayoutBox> = Vec::new();
        for b in built {
            let joins_run = b.inline_level || (!run.is_empty() && !b.bx.is_in_normal_flow());
            if joins_run {
                run.push(b.bx);
                continue;
            }
            self.flush_run(&mut run, &mut children, parent);
            children.push(b.bx);
        }
        self.flush_run(&mut run, &mut children, parent);
        children
    }

    fn flush_run(&mut self, run: &mut Vec<LayoutBox>, children: &mut Vec<LayoutBox>, parent: &ComputedStyle) {
        if run.is_empty() {
            return;
        }
        let boxes = std::mem::take(run);
        if let Some(line) = self.line_of(boxes, parent) {
            let mut block = self.anonymous(BoxKind::Block, parent);
            block = block.with_children(vec![line]);
            children.push(block);
        }
    }

    /// Wrap inline-level boxes in a line box, processing white space. Runs
    /// holding nothing but collapsible white space produce no line.
    fn line_of(&mut self, boxes: Vec<LayoutBox>, parent: &ComputedStyle) -> Option<LayoutBox> {
        let mut ends_with_space = true;
        let boxes: Vec<LayoutBox> = boxes
            .into_iter()
            .filter_map(|b| collapse_white_space(b, &mut ends_with_space))
            .collect();
        if boxes.is_empty() {
            return None;
        }
        let line = self.anonymous(BoxKind::Line(LineData::default()), parent);
        Some(line.with_children(reindex(boxes)))
    }

    fn build(&mut self, node: &Node, parent: &ComputedStyle) -> Option<Built> {
        let mut style = node.style.resolve(Some(parent));
        match &node.kind {
            NodeKind::Block => {
                let bx = self.block_container(BoxKind::Block, node, Rc::new(style));
                Some(Built { bx, inline_level: false })
            }
            NodeKind::Flex | NodeKind::Grid | NodeKind::Table => {
                let kind = match node.kind {
                    NodeKind::Flex => BoxKind::Flex,
                    NodeKind::Grid => BoxKind::Grid,
                    _ => BoxKind::TableWrapper,
                };
                let bx = self.block_container(kind, node, Rc::new(style));
                Some(Built { bx, inline_level: false })
            }
            NodeKind::Inline => {
                let style = Rc::new(style);
                if let Some(anchor) = &style.anchor {
                    self.anchors.push(anchor.clone());
                }
                let id = self.id();
                let children = self.inline_children(node, &style);
                let bx = LayoutBox::new(id, BoxKind::Inline, style).with_children(reindex(children));
                Some(Built { bx, inline_level: true })
            }
            NodeKind::Text { content } => {
                let id = self.id();
                let bx = LayoutBox::new(id, BoxKind::Text(TextData::new(content.as_str())), Rc::new(style));
                Some(Built { bx, inline_level: true })
            }
            NodeKind::Generated { content } => {
                let id = self.id();
                let text = counters::render(content, &Default::default(), &Default::default());
                let mut data = TextData::new(text);
                data.generated = true;
                self.generated.push(GeneratedText {
                    id,
                    content: content.clone(),
                });
                let bx = LayoutBox::new(id, BoxKind::Text(data), Rc::new(style));
                Some(Built { bx, inline_level: true })
            }
            NodeKind::Image { width, height } => {
                if node.style.display.is_none() {
                    style.display = Display::Inline;
                }
                let inline_level = style.display == Display::Inline;
                let id = self.id();
                let data = ReplacedData {
                    intrinsic_width: *width,
                    intrinsic_height: *height,
                };
                let bx = LayoutBox::new(id, BoxKind::Replaced(data), Rc::new(style));
                Some(Built { bx, inline_level })
            }
            NodeKind::FootnoteCall { body } => {
                let style = Rc::new(style);
                let body_style = Rc::new(body.style.resolve(Some(&style)));
                let body_box = self.block_container(BoxKind::Block, body, body_style);
                let body_id = body_box.id;
                self.footnotes.insert(body_id, body_box);
                self.footnote_order.push(body_id);

                let id = self.id();
                let children = self.inline_children(node, &style);
                let mut call = LayoutBox::new(id, BoxKind::Inline, style).with_children(reindex(children));
                call.footnote = Some(body_id);
                Some(Built { bx: call, inline_level: true })
            }
        }
    }

    fn inline_children(&mut self, node: &Node, style: &ComputedStyle) -> Vec<LayoutBox> {
        let mut children = Vec::new();
        for child in &node.children {
            let Some(built) = self.build(child, style) else {
                continue;
            };
            if built.inline_level || !built.bx.is_in_normal_flow() {
                children.push(built.bx);
            } else {
                warn!(
                    "block-level {} inside an inline box is not supported, dropping it",
                    built.bx.kind.name()
                );
            }
        }
        children
    }

    /// Move the first letter of the first line into an inline box styled by
    /// `letter_style`.
    fn extract_first_letter(&mut self, container: &mut LayoutBox, letter_style: Rc<ComputedStyle>) {
        let Some(path) = container.find_path(&|b| b.text().is_some_and(|t| !t.trim().is_empty())) else {
            return;
        };
        // Only the first line counts: every step must go through first
        // children of blocks or through line and inline boxes.
        let mut node: &LayoutBox = container;
        for &step in &path[..path.len() - 1] {
            node = &node.children[step];
            if !node.is_in_normal_flow() || !(node.is_line() || node.is_block_container()) {
                return;
            }
        }
        let (&text_index, parent_path) = match path.split_last() {
            Some(split) => split,
            None => return,
        };
        let letter_id = self.id();
        let wrapper_id = self.id();
        let Some(parent) = container.at_path_mut(parent_path) else {
            return;
        };
        let children = Rc::make_mut(&mut parent.children);
        let text_box = children[text_index].clone();
        let Some(text) = text_box.text() else {
            return;
        };
        let letter_end = first_letter_end(text);
        let (letter, rest) = text.split_at(letter_end);

        let letter_text = LayoutBox::new(
            letter_id,
            BoxKind::Text(TextData::new(letter)),
            Rc::clone(&letter_style),
        );
        let wrapper = LayoutBox::new(wrapper_id, BoxKind::Inline, letter_style).with_children(vec![letter_text]);
        let mut replacement = vec![wrapper];
        if !rest.is_empty() {
            let mut rest_box = text_box.clone();
            rest_box.kind = BoxKind::Text(TextData::new(rest));
            replacement.push(rest_box);
        }
        children.splice(text_index..=text_index, replacement);
        for (i, child) in children.iter_mut().enumerate() {
            child.index = i;
        }
    }
}

/// End of the first letter: leading punctuation, one letter, trailing
/// punctuation.
fn first_letter_end(text: &str) -> usize {
    let mut chars = text.char_indices().peekable();
    while let Some(&(_, c)) = chars.peek() {
        if c.is_ascii_punctuation() || c == ' ' {
            chars.next();
        } else {
            break;
        }
    }
    let mut end = match chars.next() {
        Some((i, c)) => i + c.len_utf8(),
        None => return text.len(),
    };
    for (i, c) in chars {
        if c.is_ascii_punctuation() {
            end = i + c.len_utf8();
        } else {
            break;
        }
    }
    end
}

fn reindex(mut boxes: Vec<LayoutBox>) -> Vec<LayoutBox> {
    for (i, b) in boxes.iter_mut().enumerate() {
        b.index = i;
    }
    boxes
}

/// Apply white-space processing to a box of an inline run. Returns `None`
/// when a text box ends up empty.
fn collapse_white_space(mut bx: LayoutBox, ends_with_space: &mut bool) -> Option<LayoutBox> {
    match &bx.kind {
        BoxKind::Text(data) => {
            let processed = process_text(&data.text, bx.style.white_space, ends_with_space);
            if processed.is_empty() {
                return None;
            }
            let mut data = data.clone();
            data.text = processed.into();
            bx.kind = BoxKind::Text(data);
            Some(bx)
        }
        BoxKind::Inline => {
            let children: Vec<LayoutBox> = bx
                .children
                .iter()
                .cloned()
                .filter_map(|c| collapse_white_space(c, ends_with_space))
                .collect();
            bx.children = Rc::new(reindex(children));
            Some(bx)
        }
        _ => {
            if bx.is_in_normal_flow() {
                *ends_with_space = false;
            }
            Some(bx)
        }
    }
}

fn process_text(text: &str, white_space: WhiteSpace, ends_with_space: &mut bool) -> String {
    let mut out = String::with_capacity(text.len());
    match white_space {
        WhiteSpace::Pre | WhiteSpace::PreWrap => {
            out.push_str(text);
        }
        WhiteSpace::Normal | WhiteSpace::Nowrap | WhiteSpace::PreLine => {
            let keep_newlines = white_space == WhiteSpace::PreLine;
            for c in text.chars() {
                if keep_newlines && c == '\n' {
                    while out.ends_with(' ') {
                        out.pop();
                    }
                    out.push('\n');
                    *ends_with_space = true;
                } else if c.is_whitespace() {
                    if !*ends_with_space {
                        out.push(' ');
                        *ends_with_space = true;
                    }
                } else {
                    out.push(c);
                    *ends_with_space = false;
                }
            }
            return out;
        }
    }
    *ends_with_space = out.ends_with([' ', '\n']);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::style::{Float, Style};

    fn text_of(bx: &LayoutBox) -> String {
        bx.descendants().filter_map(|b| b.text()).collect()
    }

    #[test]
    fn inline_content_gets_a_single_line_box() {
        let root = Node::block(vec![Node::text("Hello "), Node::text(" world")]);
        let tree = build_box_tree(&root);
        assert!(tree.root.is_for_root_element);
        assert_eq!(tree.root.children.len(), 1);
        let line = &tree.root.children[0];
        assert!(line.is_line_box());
        assert_eq!(text_of(line), "Hello world");
    }

    #[test]
    fn mixed_content_is_wrapped_in_anonymous_blocks() {
        let root = Node::block(vec![
            Node::text("before"),
            Node::block(vec![Node::text("inside")]),
            Node::text("   "),
            Node::text("after"),
        ]);
        let tree = build_box_tree(&root);
        let kinds: Vec<&str> = tree.root.children.iter().map(|c| c.kind.name()).collect();
        assert_eq!(kinds, vec!["block", "block", "block"]);
        assert!(tree.root.children[0].children[0].is_line_box());
        assert_eq!(text_of(&tree.root.children[2]), "after");
        let indices: Vec<usize> = tree.root.children.iter().map(|c| c.index).collect();
        assert_eq!(indices, vec![0, 1, 2]);
    }

    #[test]
    fn floats_join_an_open_inline_run() {
        let float = Node::block(vec![Node::text("f")]).with_style(Style {
            float: Some(Float::Left),
            ..Default::default()
        });
        let root = Node::block(vec![Node::text("a"), float, Node::block(vec![])]);
        let tree = build_box_tree(&root);
        assert_eq!(tree.root.children.len(), 2);
        let line = &tree.root.children[0].children[0];
        assert_eq!(line.children.len(), 2);
        assert!(line.children[1].is_floated());
    }

    #[test]
    fn footnote_bodies_leave_the_flow() {
        let call = Node {
            kind: NodeKind::FootnoteCall {
                body: Box::new(Node::block(vec![Node::text("The note.")])),
            },
            style: Style::default(),
            children: vec![Node::text("1")],
        };
        let tree = build_box_tree(&Node::block(vec![Node::text("Text"), call]));
        assert_eq!(tree.footnote_order.len(), 1);
        let body = &tree.footnotes[&tree.footnote_order[0]];
        assert_eq!(text_of(body), "The note.");
        let line = &tree.root.children[0];
        assert_eq!(line.children[1].footnote, Some(body.id));
        assert_eq!(text_of(line), "Text1");
    }

    #[test]
    fn first_letter_is_extracted() {
        let root = Node::block(vec![Node::text("\"Once upon")]).with_style(Style {
            first_letter: Some(Box::new(Style {
                font_size: Some(30.0),
                ..Default::default()
            })),
            ..Default::default()
        });
        let tree = build_box_tree(&root);
        let line = &tree.root.children[0];
        assert_eq!(line.children.len(), 2);
        let letter = &line.children[0];
        assert_eq!(letter.kind.name(), "inline");
        assert_eq!(text_of(letter), "\"O");
        assert_eq!(letter.style.font_size, 30.0);
        assert_eq!(line.children[1].text(), Some("nce upon"));
    }

    #[test]
    fn white_space_processing() {
        let mut space = true;
        assert_eq!(process_text("  a \n b  ", WhiteSpace::Normal, &mut space), "a b ");
        assert!(space);
        let mut space = true;
        assert_eq!(process_text("a  \n  b", WhiteSpace::PreLine, &mut space), "a\nb");
        let mut space = false;
        assert_eq!(process_text(" a\n", WhiteSpace::Pre, &mut space), " a\n");
    }
}
