use std::fmt;
use std::num::NonZeroU32;
use std::ops::Range;

use crate::language::Language;

/// Position of a non-library snippet in document order, starting at 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SnippetId(NonZeroU32);

impl SnippetId {
    /// Returns `None` for zero, which never names a snippet.
    pub fn new(n: u32) -> Option<Self> {
        NonZeroU32::new(n).map(SnippetId)
    }

    pub fn get(self) -> u32 {
        self.0.get()
    }

    pub fn first() -> Self {
        SnippetId(NonZeroU32::MIN)
    }

    pub(crate) fn next(self) -> Self {
        SnippetId(self.0.saturating_add(1))
    }
}

impl fmt::Display for SnippetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One body line as authored, without its line terminator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceLine {
    pub text: String,
    /// Byte span in the source document, for diagnostics.
    pub span: Range<usize>,
}

/// Include-expansion state of a snippet.
///
/// The flattened body only exists in the `Resolved` variant.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum Resolution {
    #[default]
    Unvisited,
    InProgress,
    Resolved(Vec<String>),
}

/// A fenced code block captured from the document.
#[derive(Debug, Clone)]
pub struct Snippet {
    /// `None` for library snippets.
    pub id: Option<SnippetId>,
    pub language: Language,
    /// Set by `#%name:`.
    pub name: Option<String>,
    /// Set by `#%lib:<alias>`.
    pub alias: Option<String>,
    pub is_library: bool,
    /// Body lines with `name`/`lib` directives removed. `inc` lines stay.
    pub raw_lines: Vec<SourceLine>,
    pub resolution: Resolution,
    /// Byte span from the opening fence to the closing fence.
    pub span: Range<usize>,
}

impl Snippet {
    pub fn resolved_lines(&self) -> Option<&[String]> {
        match &self.resolution {
            Resolution::Resolved(lines) => Some(lines),
            _ => None,
        }
    }

    pub fn is_resolved(&self) -> bool {
        matches!(self.resolution, Resolution::Resolved(_))
    }

    pub fn raw_text(&self) -> impl Iterator<Item = &str> {
        self.raw_lines.iter().map(|l| l.text.as_str())
    }

    pub fn answers_to(&self, key: &str) -> bool {
        self.name.as_deref() == Some(key) || self.alias.as_deref() == Some(key)
    }

    /// Human-readable handle: name, then alias, then `#id`.
    pub fn label(&self) -> String {
        if let Some(name) = self.name.as_ref().or(self.alias.as_ref()) {
            return name.clone();
        }
        match self.id {
            Some(id) => format!("#{}", id),
            None => format!("library at byte {}", self.span.start),
        }
    }
}
