//! Structured error types for the folio fragmentation engine.
//!
//! Two layers: [`LayoutError`] is returned by the layout core when an internal
//! invariant is broken (these are programming errors, not document errors),
//! and [`FolioError`] is what the public entry points return, adding JSON
//! parsing failures on top.

use std::fmt;

use thiserror::Error;

use crate::boxes::BoxId;

/// Invariant violations detected by the layout core.
///
/// Overflow, breaks and aborted fragments are ordinary outcomes and never
/// surface as errors.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum LayoutError {
    #[error("line box {0:?} is not the only child of its block container")]
    LineBoxWithSiblings(BoxId),

    #[error("resume point {resume} does not apply to a {kind} box")]
    UnexpectedResume { kind: &'static str, resume: String },

    #[error("a {kind} box cannot be laid out by {operation}")]
    UnexpectedBox {
        kind: &'static str,
        operation: &'static str,
    },

    #[error("layout of the root box produced no fragment on page {page}")]
    MissingRootFragment { page: usize },

    #[error("over-constrained dimensions for {what}")]
    OverConstrained { what: String },

    #[error("placeholder {0:?} was already laid out")]
    PlaceholderAlreadyResolved(BoxId),

    #[error("footnote {0:?} is not registered")]
    UnknownFootnote(BoxId),

    #[error("pagination did not finish within {0} pages")]
    PageLimit(usize),
}

pub type LayoutResult<T> = Result<T, LayoutError>;

/// The unified error type returned by all public folio API functions.
#[derive(Debug)]
pub enum FolioError {
    /// JSON input failed to parse as a valid folio document.
    ParseError {
        source: serde_json::Error,
        hint: String,
    },
    /// The layout core detected an internal inconsistency.
    Layout(LayoutError),
}

impl fmt::Display for FolioError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FolioError::ParseError { source, hint } => {
                write!(f, "Failed to parse document: {}", source)?;
                if !hint.is_empty() {
                    write!(f, "\n  Hint: {}", hint)?;
                }
                Ok(())
            }
            FolioError::Layout(e) => write!(f, "Layout error: {}", e),
        }
    }
}

impl std::error::Error for FolioError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            FolioError::ParseError { source, .. } => Some(source),
            FolioError::Layout(e) => Some(e),
        }
    }
}

impl From<serde_json::Error> for FolioError {
    fn from(e: serde_json::Error) -> Self {
        let hint = match e.classify() {
            serde_json::error::Category::Syntax => {
                "Check for trailing commas, missing quotes, or unescaped characters.".to_string()
            }
            serde_json::error::Category::Data => {
                "The JSON is valid but doesn't match the folio document schema. Check field names and types.".to_string()
            }
            serde_json::error::Category::Eof => {
                "Unexpected end of input. Is the JSON truncated?".to_string()
            }
            serde_json::error::Category::Io => String::new(),
        };
        FolioError::ParseError { source: e, hint }
    }
}

impl From<LayoutError> for FolioError {
    fn from(e: LayoutError) -> Self {
        FolioError::Layout(e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn syntax_errors_carry_a_hint() {
        let err: FolioError = serde_json::from_str::<serde_json::Value>("{,}")
            .unwrap_err()
            .into();
        let message = err.to_string();
        assert!(message.starts_with("Failed to parse document"));
        assert!(message.contains("trailing commas"));
    }

    #[test]
    fn layout_errors_display_their_cause() {
        let err = FolioError::from(LayoutError::MissingRootFragment { page: 3 });
        assert_eq!(
            err.to_string(),
            "Layout error: layout of the root box produced no fragment on page 3"
        );
    }
}
