//! `#%` directive lines inside a snippet body.

pub(crate) const PREFIX: &str = "#%";

/// Metadata directives, consumed by the tokenizer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Directive {
    /// `#%name:<NAME>`; an empty value clears the name.
    Name(Option<String>),
    /// `#%lib` or `#%lib:<ALIAS>`.
    Library { alias: Option<String> },
}

pub(crate) fn parse(line: &str) -> Option<Directive> {
    let rest = line.strip_prefix(PREFIX)?;
    if let Some(name) = rest.strip_prefix("name:") {
        return Some(Directive::Name(non_empty(name)));
    }
    let after = rest.strip_prefix("lib")?;
    let alias = after.strip_prefix(':').and_then(non_empty);
    Some(Directive::Library { alias })
}

/// Names listed by an `#%inc:` line, or `None` for any other line.
pub(crate) fn include_names(line: &str) -> Option<Vec<String>> {
    let list = line.strip_prefix(PREFIX)?.strip_prefix("inc:")?;
    Some(list.split(',').map(|n| n.trim().to_string()).collect())
}

fn non_empty(value: &str) -> Option<String> {
    let value = value.trim();
    (!value.is_empty()).then(|| value.to_string())
}
