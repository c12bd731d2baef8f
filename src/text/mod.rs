//! # Text Shaping
//!
//! The layout core never measures glyphs itself: it asks a [`TextShaper`] to
//! fit the first line of a string into a width, and for the metrics of a
//! style's strut. Real font shaping plugs in behind the trait.
//!
//! [`FixedAdvanceShaper`] is the built-in implementation: every character has
//! the same advance (a fraction of the font size) and break opportunities come
//! from UAX#14. It is deterministic, which makes it the shaper of choice for
//! tests and for documents that only need approximate text metrics.

use unicode_linebreak::{linebreaks, BreakOpportunity};

use crate::style::ComputedStyle;

/// The first line cut out of a string.
#[derive(Debug, Clone, PartialEq)]
pub struct LineSplit {
    /// Byte length of the text placed on this line.
    pub consumed: usize,
    /// Byte offset where the next line starts, `None` when the text is done.
    /// Anything between `consumed` and this offset (a preserved newline) is
    /// dropped.
    pub resume_at: Option<usize>,
    pub width: f64,
    /// Height of the content area.
    pub height: f64,
    /// Baseline position from the top of the content area.
    pub baseline: f64,
}

pub trait TextShaper {
    /// Fit as much of `text` as possible into `max_width` (unbounded when
    /// `None`), breaking at the last allowed opportunity. When not even the
    /// first segment fits, it is returned anyway.
    fn split_first_line(
        &self,
        text: &str,
        style: &ComputedStyle,
        max_width: Option<f64>,
        is_line_start: bool,
    ) -> LineSplit;

    fn text_width(&self, text: &str, style: &ComputedStyle) -> f64;

    /// `(line height, baseline)` of an empty line in this style.
    fn strut(&self, style: &ComputedStyle) -> (f64, f64);

    fn x_height(&self, style: &ComputedStyle) -> f64 {
        style.font_size * 0.5
    }

    /// Whether a line may break between these two characters.
    fn can_break_between(&self, before: char, after: char) -> bool {
        let mut pair = String::new();
        pair.push(before);
        pair.push(after);
        let split = before.len_utf8();
        let found = linebreaks(&pair).any(|(offset, _)| offset == split);
        found
    }

    /// Whether `text` contains a break opportunity strictly inside it.
    fn can_break_text(&self, text: &str) -> bool {
        linebreaks(text).any(|(offset, _)| offset > 0 && offset < text.len())
    }

    /// Width of the widest unbreakable segment.
    fn min_content_width(&self, text: &str, style: &ComputedStyle) -> f64 {
        let mut widest = 0.0_f64;
        let mut start = 0;
        for (offset, _) in linebreaks(text) {
            let segment = text[start..offset].trim_end_matches([' ', '\n', '\r', '\t']);
            widest = widest.max(self.text_width(segment, style));
            start = offset;
        }
        widest
    }

    /// Width of the text without soft wrapping.
    fn max_content_width(&self, text: &str, style: &ComputedStyle) -> f64 {
        if style.white_space.preserves_newlines() {
            text.split('\n')
                .map(|line| self.text_width(line, style))
                .fold(0.0, f64::max)
        } else {
            self.text_width(text, style)
        }
    }
}

/// A shaper where every character advances by the same amount.
#[derive(Debug, Clone, Copy)]
pub struct FixedAdvanceShaper {
    /// Advance of one character, in ems.
    pub advance: f64,
    /// Ascent, in ems.
    pub ascent: f64,
}

impl Default for FixedAdvanceShaper {
    fn default() -> Self {
        Self {
            advance: 0.5,
            ascent: 0.8,
        }
    }
}

impl FixedAdvanceShaper {
    fn split(&self, text: &str, style: &ComputedStyle, consumed: usize, resume: usize) -> LineSplit {
        LineSplit {
            consumed,
            resume_at: (resume < text.len()).then_some(resume),
            width: self.text_width(&text[..consumed], style),
            height: style.font_size,
            baseline: style.font_size * self.ascent,
        }
    }
}

impl TextShaper for FixedAdvanceShaper {
    fn split_first_line(
        &self,
        text: &str,
        style: &ComputedStyle,
        max_width: Option<f64>,
        is_line_start: bool,
    ) -> LineSplit {
        if text.is_empty() {
            return self.split(text, style, 0, 0);
        }
        let wraps = style.white_space.wraps() && max_width.is_some();
        let max_width = max_width.unwrap_or(f64::INFINITY);
        // Collapsible spaces at the start of a line take no room.
        let lead = if is_line_start && style.white_space.collapses_spaces() {
            text.len() - text.trim_start_matches(' ').len()
        } else {
            0
        };

        let mut best: Option<(usize, usize)> = None;
        let mut fallback: Option<(usize, usize)> = None;
        for (offset, opportunity) in linebreaks(text) {
            let is_end = offset >= text.len();
            let forced = matches!(opportunity, BreakOpportunity::Mandatory) && !is_end;
            if !wraps && !forced && !is_end {
                continue;
            }
            let consumed = if forced {
                text[..offset].trim_end_matches(['\n', '\r']).len()
            } else {
                offset
            };
            let measured = &text[lead.min(consumed)..consumed];
            let fits = !wraps || self.text_width(measured.trim_end_matches(' '), style) <= max_width;
            if fits {
                best = Some((consumed, offset));
                if forced || is_end {
                    break;
                }
            } else {
                if best.is_none() {
                    fallback = Some((consumed, offset));
                }
                break;
            }
        }
        let (consumed, resume) = best.or(fallback).unwrap_or((text.len(), text.len()));
        self.split(text, style, consumed, resume)
    }

    fn text_width(&self, text: &str, style: &ComputedStyle) -> f64 {
        let count = text.chars().filter(|&c| c != '\n' && c != '\r').count();
        count as f64 * style.font_size * self.advance
    }

    fn strut(&self, style: &ComputedStyle) -> (f64, f64) {
        let line_height = style.font_size * style.line_height;
        let half_leading = (line_height - style.font_size) / 2.0;
        (line_height, half_leading + style.font_size * self.ascent)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::style::{Style, WhiteSpace};

    fn style(font_size: f64, white_space: WhiteSpace) -> ComputedStyle {
        Style {
            font_size: Some(font_size),
            white_space: Some(white_space),
            ..Default::default()
        }
        .resolve(None)
    }

    #[test]
    fn whole_text_fits() {
        let shaper = FixedAdvanceShaper::default();
        let split = shaper.split_first_line("abc def", &style(10.0, WhiteSpace::Normal), Some(100.0), true);
        assert_eq!(split.consumed, 7);
        assert_eq!(split.resume_at, None);
        assert_eq!(split.width, 35.0);
    }

    #[test]
    fn breaks_at_last_fitting_opportunity() {
        let shaper = FixedAdvanceShaper::default();
        // 5pt per char: "aaa bbb" is 35pt, "aaa" alone is 15pt
        let split = shaper.split_first_line("aaa bbb ccc", &style(10.0, WhiteSpace::Normal), Some(36.0), true);
        assert_eq!(&"aaa bbb ccc"[..split.consumed], "aaa bbb ");
        assert_eq!(split.resume_at, Some(8));
    }

    #[test]
    fn overlong_word_is_returned_anyway() {
        let shaper = FixedAdvanceShaper::default();
        let split = shaper.split_first_line("abcdefgh ij", &style(10.0, WhiteSpace::Normal), Some(10.0), true);
        assert_eq!(split.consumed, 9);
        assert_eq!(split.resume_at, Some(9));
    }

    #[test]
    fn nowrap_only_breaks_at_the_end() {
        let shaper = FixedAdvanceShaper::default();
        let split = shaper.split_first_line("aaa bbb ccc", &style(10.0, WhiteSpace::Nowrap), Some(10.0), true);
        assert_eq!(split.consumed, 11);
        assert_eq!(split.resume_at, None);
    }

    #[test]
    fn preserved_newline_forces_a_break() {
        let shaper = FixedAdvanceShaper::default();
        let split = shaper.split_first_line("ab\ncd", &style(10.0, WhiteSpace::Pre), Some(1000.0), true);
        assert_eq!(split.consumed, 2);
        assert_eq!(split.resume_at, Some(3));
    }

    #[test]
    fn strut_centers_leading() {
        let shaper = FixedAdvanceShaper::default();
        let (line_height, baseline) = shaper.strut(&style(10.0, WhiteSpace::Normal));
        assert_eq!(line_height, 12.0);
        assert!((baseline - 9.0).abs() < 1e-9);
    }

    #[test]
    fn content_widths() {
        let shaper = FixedAdvanceShaper::default();
        let s = style(10.0, WhiteSpace::Normal);
        assert_eq!(shaper.min_content_width("aa bbbb c", &s), 20.0);
        assert_eq!(shaper.max_content_width("aa bbbb c", &s), 45.0);
        assert!(shaper.can_break_text("aa bb"));
        assert!(!shaper.can_break_text("aabb"));
        assert!(shaper.can_break_between(' ', 'a'));
        assert!(!shaper.can_break_between('a', 'b'));
    }
}
