pub mod diagnostic;
pub mod language;
pub mod parser;
pub mod resolver;
pub mod selection;
pub mod snippet;

pub use diagnostic::Notice;
pub use language::Language;
pub use parser::{FenceStyle, Parser};
pub use resolver::{MissingPolicy, ResolveError, Resolver, Target};
pub use selection::{SelectError, Selection};
pub use snippet::{Resolution, Snippet, SnippetId, SourceLine};

/// A parsed markdown document.
#[derive(Debug, Clone)]
pub struct Document {
    /// Captured snippets, in document order.
    pub snippets: Vec<Snippet>,
    /// The source file ID (for error reporting with codespan-reporting).
    pub source_id: usize,
    /// Non-fatal diagnostics gathered while parsing and resolving.
    pub notices: Vec<Notice>,
}

impl Document {
    pub fn get(&self, id: SnippetId) -> Option<&Snippet> {
        self.snippets.iter().find(|s| s.id == Some(id))
    }

    /// First snippet, in document order, whose name or alias is `key`.
    pub fn find(&self, key: &str) -> Option<&Snippet> {
        self.snippets.iter().find(|s| s.answers_to(key))
    }

    /// IDs of every non-library snippet, ascending.
    pub fn ids(&self) -> Vec<SnippetId> {
        self.snippets.iter().filter_map(|s| s.id).collect()
    }

    pub fn libraries(&self) -> impl Iterator<Item = &Snippet> {
        self.snippets.iter().filter(|s| s.is_library)
    }

    pub fn is_empty(&self) -> bool {
        self.snippets.is_empty()
    }
}
