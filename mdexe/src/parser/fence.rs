//! Line-oriented fence scanner.
//!
//! Two states, `Outside` and `Inside`. A fence line is any line starting with
//! three or more backticks. Outside, only a fence line carrying a language tag
//! opens a snippet; inside, every fence line closes it. Fence lengths are
//! never compared, so a shorter or longer closer still ends the snippet.

use super::{Collector, SnippetBuilder};

enum State {
    Outside,
    /// Inside a tagged fence. `None` when the tag was not recognized: the body
    /// is skipped but still has to be closed.
    Inside(Option<SnippetBuilder>),
}

pub(super) fn scan(source: &str, collector: &mut Collector) {
    let mut state = State::Outside;

    for (offset, text) in lines(source) {
        let span = offset..offset + text.len();
        state = match (state, fence_tag(text)) {
            (State::Outside, Some(Some(tag))) => State::Inside(collector.open(tag, span)),
            (State::Outside, _) => State::Outside,
            (State::Inside(builder), Some(_)) => {
                if let Some(builder) = builder {
                    collector.close(builder, span.end);
                }
                State::Outside
            }
            (State::Inside(mut builder), None) => {
                if let Some(builder) = builder.as_mut() {
                    builder.push_line(text, span);
                }
                State::Inside(builder)
            }
        };
    }

    if let State::Inside(Some(builder)) = state {
        collector.unterminated(builder, source.len());
    }
}

/// `None` for ordinary lines, `Some(tag)` for fence lines.
fn fence_tag(line: &str) -> Option<Option<&str>> {
    let ticks = line.bytes().take_while(|&b| b == b'`').count();
    if ticks < 3 {
        return None;
    }
    Some(language_token(line[ticks..].trim_start()))
}

/// Leading run of word characters, if any.
pub(super) fn language_token(text: &str) -> Option<&str> {
    let end = text
        .find(|c: char| !(c.is_alphanumeric() || c == '_'))
        .unwrap_or(text.len());
    (end > 0).then(|| &text[..end])
}

/// Lines with their byte offsets, terminators (`\n`, `\r\n`) stripped.
fn lines(source: &str) -> impl Iterator<Item = (usize, &str)> {
    let mut offset = 0;
    source.split_inclusive('\n').map(move |raw| {
        let start = offset;
        offset += raw.len();
        let text = raw.strip_suffix('\n').unwrap_or(raw);
        (start, text.strip_suffix('\r').unwrap_or(text))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fence_lines() {
        assert_eq!(fence_tag("```python"), Some(Some("python")));
        assert_eq!(fence_tag("````  sh extra"), Some(Some("sh")));
        assert_eq!(fence_tag("```python3.11"), Some(Some("python3")));
        assert_eq!(fence_tag("```"), Some(None));
        assert_eq!(fence_tag("``````"), Some(None));
        assert_eq!(fence_tag("``` {.class}"), Some(None));
    }

    #[test]
    fn non_fence_lines() {
        assert_eq!(fence_tag("``python"), None);
        assert_eq!(fence_tag(" ```python"), None);
        assert_eq!(fence_tag("~~~python"), None);
        assert_eq!(fence_tag("plain text"), None);
    }

    #[test]
    fn line_offsets_skip_terminators() {
        let collected: Vec<_> = lines("a\r\nbc\n\nd").collect();
        assert_eq!(collected, vec![(0, "a"), (3, "bc"), (6, ""), (7, "d")]);
    }
}
