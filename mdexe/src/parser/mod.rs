mod commonmark;
pub(crate) mod directive;
mod fence;

use std::ops::Range;

use crate::diagnostic::Notice;
use crate::language::{Language, RECOGNIZED_TAGS};
use crate::snippet::{Resolution, Snippet, SnippetId, SourceLine};
use crate::Document;

use self::directive::Directive;

/// How fenced blocks are located in the document.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum FenceStyle {
    /// Line machine: any backtick fence line closes an open snippet,
    /// whatever its length.
    #[default]
    Compat,
    /// CommonMark fenced code blocks: closers must match their opener.
    CommonMark,
}

/// Parser entry point.
pub struct Parser {
    source: String,
    file_id: usize,
    style: FenceStyle,
}

impl Parser {
    pub fn new(source: String, file_id: usize) -> Self {
        Parser {
            source,
            file_id,
            style: FenceStyle::default(),
        }
    }

    pub fn with_style(mut self, style: FenceStyle) -> Self {
        self.style = style;
        self
    }

    /// Extract every snippet of the document. Never fails: unknown languages
    /// and unterminated fences become warnings on the returned document.
    pub fn parse(&self) -> Document {
        let mut collector = Collector::new(self.file_id);
        match self.style {
            FenceStyle::Compat => fence::scan(&self.source, &mut collector),
            FenceStyle::CommonMark => commonmark::scan(&self.source, &mut collector),
        }
        collector.finish()
    }
}

/// A snippet whose fence is still open.
struct SnippetBuilder {
    language: Language,
    name: Option<String>,
    alias: Option<String>,
    is_library: bool,
    lines: Vec<SourceLine>,
    span_start: usize,
}

impl SnippetBuilder {
    fn push_line(&mut self, text: &str, span: Range<usize>) {
        match directive::parse(text) {
            Some(Directive::Name(name)) => self.name = name,
            Some(Directive::Library { alias }) => {
                self.is_library = true;
                if alias.is_some() {
                    self.alias = alias;
                }
            }
            None => self.lines.push(SourceLine {
                text: text.to_string(),
                span,
            }),
        }
    }
}

/// Turns fence events from either scanner into numbered snippets.
struct Collector {
    file_id: usize,
    next_id: SnippetId,
    snippets: Vec<Snippet>,
    notices: Vec<Notice>,
}

impl Collector {
    fn new(file_id: usize) -> Self {
        Collector {
            file_id,
            next_id: SnippetId::first(),
            snippets: Vec::new(),
            notices: Vec::new(),
        }
    }

    /// Start a snippet for `tag`, or record why the block is ignored.
    fn open(&mut self, tag: &str, span: Range<usize>) -> Option<SnippetBuilder> {
        let Some(language) = Language::canonicalize(tag) else {
            log::debug!("ignoring fenced block tagged `{}`", tag);
            self.notices.push(
                Notice::warning(
                    format!("unknown language `{}`, fenced block ignored", tag),
                    span,
                    self.file_id,
                )
                .with_note(format!("recognized tags: {}", RECOGNIZED_TAGS)),
            );
            return None;
        };
        log::trace!("snippet opens at byte {} ({})", span.start, language);
        Some(SnippetBuilder {
            language,
            name: None,
            alias: None,
            is_library: false,
            lines: Vec::new(),
            span_start: span.start,
        })
    }

    fn close(&mut self, builder: SnippetBuilder, span_end: usize) {
        let id = if builder.is_library {
            None
        } else {
            let id = self.next_id;
            self.next_id = id.next();
            Some(id)
        };
        self.snippets.push(Snippet {
            id,
            language: builder.language,
            name: builder.name,
            alias: builder.alias,
            is_library: builder.is_library,
            raw_lines: builder.lines,
            resolution: Resolution::Unvisited,
            span: builder.span_start..span_end,
        });
    }

    fn unterminated(&mut self, builder: SnippetBuilder, span_end: usize) {
        self.notices.push(
            Notice::warning(
                "unterminated fence, snippet dropped",
                builder.span_start..span_end,
                self.file_id,
            )
            .with_note("close the block with a line of three or more backticks"),
        );
    }

    fn finish(self) -> Document {
        Document {
            snippets: self.snippets,
            source_id: self.file_id,
            notices: self.notices,
        }
    }
}
