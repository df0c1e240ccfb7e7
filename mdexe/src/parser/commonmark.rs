//! CommonMark fence scanner backed by pulldown-cmark.
//!
//! Only fenced code blocks are considered. Closing fences must match the
//! opener, so nested or longer fences behave as CommonMark renders them.

use std::ops::Range;

use pulldown_cmark::{CodeBlockKind, Event, Options, Parser as CmarkParser, Tag, TagEnd};

use super::fence::language_token;
use super::{Collector, SnippetBuilder};

struct OpenBlock {
    builder: Option<SnippetBuilder>,
    span: Range<usize>,
    line: String,
    line_start: Option<usize>,
}

impl OpenBlock {
    /// Feed a text event; complete lines go to the builder.
    fn push_text(&mut self, text: &str, start: usize) {
        let Some(builder) = self.builder.as_mut() else {
            return;
        };
        let mut offset = start;
        for piece in text.split_inclusive('\n') {
            let line_start = *self.line_start.get_or_insert(offset);
            offset += piece.len();
            match piece.strip_suffix('\n') {
                Some(rest) => {
                    self.line.push_str(rest.strip_suffix('\r').unwrap_or(rest));
                    builder.push_line(&self.line, line_start..offset - 1);
                    self.line.clear();
                    self.line_start = None;
                }
                None => self.line.push_str(piece),
            }
        }
    }

    fn finish(mut self) -> Option<(SnippetBuilder, usize)> {
        let mut builder = self.builder.take()?;
        if let Some(start) = self.line_start {
            builder.push_line(&self.line, start..start + self.line.len());
        }
        Some((builder, self.span.end))
    }
}

pub(super) fn scan(source: &str, collector: &mut Collector) {
    let events = CmarkParser::new_ext(source, Options::empty()).into_offset_iter();
    let mut open: Option<OpenBlock> = None;

    for (event, range) in events {
        match event {
            Event::Start(Tag::CodeBlock(CodeBlockKind::Fenced(info))) => {
                let builder = language_token(info.trim_start())
                    .and_then(|tag| collector.open(tag, range.clone()));
                open = Some(OpenBlock {
                    builder,
                    span: range,
                    line: String::new(),
                    line_start: None,
                });
            }
            Event::Text(text) => {
                if let Some(block) = open.as_mut() {
                    block.push_text(&text, range.start);
                }
            }
            Event::End(TagEnd::CodeBlock) => {
                if let Some((builder, end)) = open.take().and_then(OpenBlock::finish) {
                    collector.close(builder, end);
                }
            }
            _ => {}
        }
    }
}
