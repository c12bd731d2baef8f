//! # Resume Addressing
//!
//! A [`ResumeStack`] addresses the point inside a box tree where layout
//! continues on the next page. Each level names a child index; the innermost
//! level of a text box is a byte offset into its text.
//!
//! "Nothing left" is `Option::<ResumeStack>::None` everywhere; a stack is
//! never empty.

use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResumeStack {
    index: usize,
    child: Option<Box<ResumeStack>>,
}

impl ResumeStack {
    /// Resume at child `index`, from its start.
    pub fn at(index: usize) -> Self {
        Self { index, child: None }
    }

    /// Resume inside child `index`, at `child` (or from its start when `None`).
    pub fn nested(index: usize, child: Option<ResumeStack>) -> Self {
        Self {
            index,
            child: child.map(Box::new),
        }
    }

    /// Build a stack from a path of indices, outermost first.
    pub fn from_path(path: &[usize]) -> Option<Self> {
        let (&last, outer) = path.split_last()?;
        let mut stack = ResumeStack::at(last);
        for &index in outer.iter().rev() {
            stack = ResumeStack::nested(index, Some(stack));
        }
        Some(stack)
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn child(&self) -> Option<&ResumeStack> {
        self.child.as_deref()
    }

    /// The single entry of this level.
    pub fn unpack(&self) -> (usize, Option<&ResumeStack>) {
        (self.index, self.child())
    }

    /// The nested stack for child `index`, if this stack points into it.
    pub fn child_for(stack: Option<&ResumeStack>, index: usize) -> Option<&ResumeStack> {
        stack.filter(|s| s.index == index).and_then(|s| s.child())
    }

    pub fn depth(&self) -> usize {
        1 + self.child().map_or(0, ResumeStack::depth)
    }
}

impl fmt::Display for ResumeStack {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.child() {
            Some(child) => write!(f, "{{{}: {}}}", self.index, child),
            None => write!(f, "{{{}: -}}", self.index),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unpack_returns_the_single_entry() {
        let stack = ResumeStack::nested(2, Some(ResumeStack::at(5)));
        let (index, child) = stack.unpack();
        assert_eq!(index, 2);
        assert_eq!(child, Some(&ResumeStack::at(5)));
        assert_eq!(stack.depth(), 2);
    }

    #[test]
    fn equality_is_structural() {
        let a = ResumeStack::from_path(&[1, 0, 12]);
        let b = ResumeStack::nested(
            1,
            Some(ResumeStack::nested(0, Some(ResumeStack::at(12)))),
        );
        assert_eq!(a, Some(b));
        assert_ne!(ResumeStack::at(1), ResumeStack::nested(1, Some(ResumeStack::at(0))));
        assert_eq!(ResumeStack::from_path(&[]), None);
    }

    #[test]
    fn child_for_matches_only_its_index() {
        let stack = ResumeStack::nested(3, Some(ResumeStack::at(7)));
        assert_eq!(ResumeStack::child_for(Some(&stack), 3), Some(&ResumeStack::at(7)));
        assert_eq!(ResumeStack::child_for(Some(&stack), 2), None);
        assert_eq!(ResumeStack::child_for(None, 3), None);
    }

    #[test]
    fn display_shows_nesting() {
        let stack = ResumeStack::nested(2, Some(ResumeStack::at(0)));
        assert_eq!(stack.to_string(), "{2: {0: -}}");
    }
}
