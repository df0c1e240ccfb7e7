use std::io::{self, Write};

use mdexe::{Document, Snippet};

/// Section tag for a snippet's source.
pub const SNIPPET: &str = "SNIPPET";
/// Section tag for a snippet's execution output.
pub const RESULT: &str = "RESULT";

pub fn header(w: &mut dyn Write, tag: &str, snippet: &Snippet) -> io::Result<()> {
    let id = snippet.id.map_or_else(|| "lib".to_string(), |id| id.to_string());
    writeln!(w)?;
    writeln!(
        w,
        "## {}: ID:{} LANG:{} NAME:{}",
        tag,
        id,
        snippet.language,
        snippet.name.as_deref().or(snippet.alias.as_deref()).unwrap_or("")
    )?;
    writeln!(w)
}

/// The resolved body, or the raw body if the snippet was never resolved.
pub fn body(w: &mut dyn Write, snippet: &Snippet, numbered: bool) -> io::Result<()> {
    let lines: Vec<&str> = match snippet.resolved_lines() {
        Some(lines) => lines.iter().map(String::as_str).collect(),
        None => snippet.raw_text().collect(),
    };
    for (n, line) in lines.iter().enumerate() {
        if numbered {
            writeln!(w, "{:02}: {}", n + 1, line)?;
        } else {
            writeln!(w, "{}", line)?;
        }
    }
    Ok(())
}

/// One row per snippet: ID (or `lib`), language, name, alias.
pub fn listing(w: &mut dyn Write, document: &Document) -> io::Result<()> {
    for snippet in &document.snippets {
        let id = snippet.id.map_or_else(|| "lib".to_string(), |id| id.to_string());
        writeln!(
            w,
            "{:>4}  {:<8} {:<16} {}",
            id,
            snippet.language.tag(),
            snippet.name.as_deref().unwrap_or("-"),
            snippet.alias.as_deref().unwrap_or("-"),
        )?;
    }
    Ok(())
}
