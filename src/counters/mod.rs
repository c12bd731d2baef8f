//! # Counters and Targets
//!
//! Page-based generated content: `counter(page)`, `counter(pages)` and
//! `target-counter(anchor, page)`. Their values are only known once pages
//! exist, so the [`TargetCollector`] remembers which boxes depend on which
//! values, recomputes their text as pages are made, and tells the page driver
//! which pages must be laid out again.
//!
//! Generated text is kept in a side table keyed by box id; the box tree itself
//! is never changed.

use std::collections::{BTreeMap, BTreeSet, HashSet};

use log::{debug, warn};

use crate::boxes::{BoxId, LayoutBox};
use crate::layout::page::PageMaker;
use crate::model::build::GeneratedText;
use crate::model::ContentItem;

/// Counter values by counter name, outermost first.
pub type CounterValues = BTreeMap<String, Vec<i64>>;

/// Counter names whose value depends on pagination.
const PAGE_COUNTERS: [&str; 2] = ["page", "pages"];

/// What is known about an anchor.
#[derive(Debug, Clone, Default)]
pub struct TargetState {
    /// Page maker entry of the page holding the anchor.
    pub page_maker_index: Option<usize>,
    pub cached_page_counter_values: CounterValues,
}

/// A box whose text depends on page counters.
#[derive(Debug, Clone)]
pub struct ContentLookup {
    pub content: Vec<ContentItem>,
    /// Page counters read through `counter()`.
    pub missing_counters: BTreeSet<String>,
    /// Page counters read through `target-counter()`, by anchor.
    pub missing_target_counters: BTreeMap<String, BTreeSet<String>>,
    pub page_maker_index: Option<usize>,
    /// A target moved before this box was placed; recompute on placement.
    pub pending: bool,
    pub cached_page_counter_values: CounterValues,
    pub text: String,
}

#[derive(Debug, Clone, Default)]
pub struct TargetCollector {
    targets: BTreeMap<String, TargetState>,
    lookups: BTreeMap<BoxId, ContentLookup>,
}

/// Render a `content` value with the given page counters.
pub fn render(
    content: &[ContentItem],
    values: &CounterValues,
    targets: &BTreeMap<String, TargetState>,
) -> String {
    let mut text = String::new();
    for item in content {
        match item {
            ContentItem::Text(literal) => text.push_str(literal),
            ContentItem::Counter(name) => text.push_str(&counter_text(values, name)),
            ContentItem::TargetCounter { anchor, counter } => {
                let value = targets
                    .get(anchor)
                    .map(|t| counter_text(&t.cached_page_counter_values, counter))
                    .unwrap_or_else(|| "0".to_string());
                text.push_str(&value);
            }
            // Running elements are boxes, placed by the margin box layout.
            ContentItem::Element(_) => {}
        }
    }
    text
}

fn counter_text(values: &CounterValues, name: &str) -> String {
    values
        .get(name)
        .and_then(|v| v.last())
        .map_or_else(|| "0".to_string(), |v| v.to_string())
}

impl TargetCollector {
    pub fn new(anchors: &[String], generated: &[GeneratedText]) -> Self {
        let mut collector = TargetCollector::default();
        for anchor in anchors {
            if collector.targets.insert(anchor.clone(), TargetState::default()).is_some() {
                warn!("anchor {:?} is declared more than once", anchor);
            }
        }
        for item in generated {
            let mut lookup = ContentLookup {
                content: item.content.clone(),
                missing_counters: BTreeSet::new(),
                missing_target_counters: BTreeMap::new(),
                page_maker_index: None,
                pending: false,
                cached_page_counter_values: CounterValues::new(),
                text: String::new(),
            };
            for content in &item.content {
                match content {
                    ContentItem::Counter(name) if PAGE_COUNTERS.contains(&name.as_str()) => {
                        lookup.missing_counters.insert(name.clone());
                    }
                    ContentItem::TargetCounter { anchor, counter } => {
                        if !collector.targets.contains_key(anchor) {
                            warn!("target-counter() refers to unknown anchor {:?}", anchor);
                        }
                        lookup
                            .missing_target_counters
                            .entry(anchor.clone())
                            .or_default()
                            .insert(counter.clone());
                    }
                    _ => {}
                }
            }
            lookup.text = render(&lookup.content, &lookup.cached_page_counter_values, &collector.targets);
            collector.lookups.insert(item.id, lookup);
        }
        collector
    }

    /// Current text of a generated box.
    pub fn text_for(&self, id: BoxId) -> Option<&str> {
        self.lookups.get(&id).map(|l| l.text.as_str())
    }

    pub fn target(&self, anchor: &str) -> Option<&TargetState> {
        self.targets.get(anchor)
    }

    pub fn targets(&self) -> &BTreeMap<String, TargetState> {
        &self.targets
    }

    /// Record the page counters of the page holding `anchor`, and refresh the
    /// boxes that point at it.
    pub fn cache_target_page_counters(
        &mut self,
        anchor: &str,
        values: &CounterValues,
        page_maker_index: usize,
        page_maker: &mut [PageMaker],
    ) {
        if let Some(target) = self.targets.get_mut(anchor) {
            target.page_maker_index = Some(page_maker_index);
            if &target.cached_page_counter_values != values {
                target.cached_page_counter_values = values.clone();
            }
        }

        let targets = &self.targets;
        for lookup in self.lookups.values_mut() {
            let Some(missing) = lookup.missing_target_counters.get(anchor) else {
                continue;
            };
            let index = match lookup.page_maker_index {
                Some(index) if index < page_maker.len() => index,
                _ => {
                    // Not placed yet: update when the box lands on a page.
                    lookup.pending = true;
                    continue;
                }
            };
            if missing.iter().any(|counter| values.contains_key(counter)) {
                page_maker[index].remake_state.content_changed = true;
                lookup.text = render(&lookup.content, &lookup.cached_page_counter_values, targets);
            }
        }
    }

    /// Resolve anchors and generated content found on a freshly made page.
    pub fn resolve_page(
        &mut self,
        page: &LayoutBox,
        values: &CounterValues,
        remake_index: usize,
        page_maker: &mut [PageMaker],
    ) {
        let mut cached_anchors: HashSet<String> = page_maker[..remake_index]
            .iter()
            .flat_map(|pm| pm.remake_state.anchors.iter().cloned())
            .collect();
        let mut cached_lookups: HashSet<BoxId> = page_maker[..remake_index]
            .iter()
            .flat_map(|pm| pm.remake_state.content_lookups.iter().copied())
            .collect();

        for child in page.descendants() {
            if let Some(anchor) = &child.style.anchor {
                if !cached_anchors.contains(anchor) {
                    page_maker[remake_index].remake_state.anchors.push(anchor.clone());
                    cached_anchors.insert(anchor.clone());
                    self.cache_target_page_counters(anchor, values, remake_index, page_maker);
                }
            }
            if self.lookups.contains_key(&child.id) {
                self.refresh_lookup(
                    child.id,
                    values,
                    remake_index,
                    page_maker,
                    &mut cached_lookups,
                    &cached_anchors,
                );
            }
        }
    }

    fn refresh_lookup(
        &mut self,
        id: BoxId,
        values: &CounterValues,
        remake_index: usize,
        page_maker: &mut [PageMaker],
        cached_lookups: &mut HashSet<BoxId>,
        cached_anchors: &HashSet<String>,
    ) {
        let targets = &self.targets;
        let Some(lookup) = self.lookups.get_mut(&id) else {
            return;
        };
        // Page values are evaluated once, on the first fragment.
        let refresh = !cached_lookups.contains(&id);
        if refresh {
            page_maker[remake_index].remake_state.content_lookups.push(id);
            cached_lookups.insert(id);
            lookup.page_maker_index = Some(remake_index);
        }

        let mut parse_again = false;
        if lookup.pending {
            if &lookup.cached_page_counter_values != values {
                lookup.cached_page_counter_values = values.clone();
            }
            lookup.pending = false;
            parse_again = true;
        }

        if !lookup.missing_counters.is_empty() {
            if lookup.missing_counters.contains("pages") {
                page_maker[remake_index].remake_state.pages_wanted = true;
            }
            if refresh && &lookup.cached_page_counter_values != values {
                lookup.cached_page_counter_values = values.clone();
                if lookup.missing_counters.iter().any(|c| values.contains_key(c)) {
                    parse_again = true;
                }
            }
        }

        for (anchor, counters) in &lookup.missing_target_counters {
            if !counters.contains("pages") {
                continue;
            }
            let Some(target_index) = targets.get(anchor).and_then(|t| t.page_maker_index) else {
                continue;
            };
            if cached_anchors.contains(anchor) && target_index < page_maker.len() {
                page_maker[target_index].remake_state.pages_wanted = true;
            }
        }

        if parse_again {
            page_maker[remake_index].remake_state.content_changed = true;
            let text = render(&lookup.content, &lookup.cached_page_counter_values, targets);
            if text != lookup.text {
                debug!("generated text of {:?} is now {:?}", id, text);
            }
            lookup.text = text;
        }
    }
}
