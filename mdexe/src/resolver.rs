//! Include resolution.
//!
//! Expands `#%inc:` lines into the flattened bodies of the named snippets.
//! The walk is depth-first over an explicit frame stack; each snippet's
//! [`Resolution`] doubles as its DFS colour, so a reference to an
//! `InProgress` snippet is a cycle and a `Resolved` one is reused as is.

use std::collections::HashMap;
use std::fmt;
use std::ops::Range;

use codespan_reporting::diagnostic::{Diagnostic, Label};
use thiserror::Error;

use crate::diagnostic::Notice;
use crate::parser::directive;
use crate::snippet::{Resolution, SnippetId};
use crate::Document;

/// What to do with an `#%inc:` name that matches no snippet.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum MissingPolicy {
    /// Fail the resolution.
    #[default]
    Strict,
    /// Record a warning and leave the reference out.
    Lenient,
}

/// A snippet to resolve, by ID or by name/alias.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    Id(SnippetId),
    Name(String),
}

impl From<SnippetId> for Target {
    fn from(id: SnippetId) -> Self {
        Target::Id(id)
    }
}

impl From<&str> for Target {
    fn from(name: &str) -> Self {
        Target::Name(name.to_string())
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Target::Id(id) => write!(f, "ID {}", id),
            Target::Name(name) => write!(f, "name `{}`", name),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResolveError {
    #[error("`{name}` doesn't exist (included from {from})")]
    MissingReference {
        name: String,
        from: String,
        span: Range<usize>,
    },
    #[error("`{name}` is included recursively: {}", .chain.join(" -> "))]
    CyclicReference {
        name: String,
        chain: Vec<String>,
        span: Range<usize>,
    },
    #[error("no snippet with {0}")]
    UnknownTarget(Target),
}

impl ResolveError {
    pub fn span(&self) -> Option<Range<usize>> {
        match self {
            ResolveError::MissingReference { span, .. }
            | ResolveError::CyclicReference { span, .. } => Some(span.clone()),
            ResolveError::UnknownTarget(_) => None,
        }
    }

    pub fn to_diagnostic(&self, file_id: usize) -> Diagnostic<usize> {
        let mut diagnostic = Diagnostic::error().with_message(self.to_string());
        if let Some(span) = self.span() {
            diagnostic = diagnostic.with_labels(vec![Label::primary(file_id, span)]);
        }
        if let ResolveError::CyclicReference { chain, .. } = self {
            let note = format!("include chain: {}", chain.join(" -> "));
            diagnostic = diagnostic.with_notes(vec![note]);
        }
        diagnostic
    }
}

/// One snippet being expanded.
struct Frame {
    index: usize,
    /// Next raw line to read.
    cursor: usize,
    /// Names of the `#%inc:` line being expanded.
    pending: Vec<String>,
    next: usize,
    /// Bodies already spliced for the current `#%inc:` line.
    included: usize,
    span: Range<usize>,
    lines: Vec<String>,
}

impl Frame {
    fn new(index: usize) -> Self {
        Frame {
            index,
            cursor: 0,
            pending: Vec::new(),
            next: 0,
            included: 0,
            span: 0..0,
            lines: Vec::new(),
        }
    }

    /// Append an included body, blank-line separated from the previous one.
    fn splice(&mut self, body: &[String]) {
        if self.included > 0 {
            self.lines.push(String::new());
        }
        self.included += 1;
        self.lines.extend(body.iter().cloned());
    }
}

pub struct Resolver<'a> {
    document: &'a mut Document,
    /// Name or alias to snippet index; the first snippet in document order wins.
    index: HashMap<String, usize>,
    policy: MissingPolicy,
}

impl<'a> Resolver<'a> {
    pub fn new(document: &'a mut Document, policy: MissingPolicy) -> Self {
        let mut index = HashMap::new();
        for (i, snippet) in document.snippets.iter().enumerate() {
            for key in [&snippet.name, &snippet.alias].into_iter().flatten() {
                index.entry(key.clone()).or_insert(i);
            }
        }
        Resolver {
            document,
            index,
            policy,
        }
    }

    /// Flattened body of `target`, expanding it on first use.
    pub fn resolve(&mut self, target: impl Into<Target>) -> Result<&[String], ResolveError> {
        let target = target.into();
        let position = match &target {
            Target::Id(id) => self.document.snippets.iter().position(|s| s.id == Some(*id)),
            Target::Name(name) => self.index.get(name).copied(),
        };
        let Some(position) = position else {
            return Err(ResolveError::UnknownTarget(target));
        };
        self.expand(position)?;
        Ok(self.document.snippets[position]
            .resolved_lines()
            .unwrap_or_default())
    }

    /// Resolve every snippet in document order, stopping at the first error.
    pub fn resolve_all(&mut self) -> Result<(), ResolveError> {
        for position in 0..self.document.snippets.len() {
            self.expand(position)?;
        }
        Ok(())
    }

    fn expand(&mut self, root: usize) -> Result<(), ResolveError> {
        if self.document.snippets[root].is_resolved() {
            return Ok(());
        }
        let mut stack = vec![self.enter(root)];
        let result = self.walk(&mut stack);
        if result.is_err() {
            for frame in &stack {
                self.document.snippets[frame.index].resolution = Resolution::Unvisited;
            }
        }
        result
    }

    fn enter(&mut self, index: usize) -> Frame {
        self.document.snippets[index].resolution = Resolution::InProgress;
        Frame::new(index)
    }

    fn walk(&mut self, stack: &mut Vec<Frame>) -> Result<(), ResolveError> {
        while let Some(frame) = stack.last_mut() {
            // Expand the pending names of the current `#%inc:` line first.
            if let Some(name) = frame.pending.get(frame.next).cloned() {
                frame.next += 1;
                let span = frame.span.clone();
                let target = self.index.get(&name).copied();
                let Some(target) = target else {
                    let from = self.document.snippets[frame.index].label();
                    self.missing(name, from, span)?;
                    continue;
                };
                if let Resolution::Resolved(body) = &self.document.snippets[target].resolution {
                    frame.splice(body);
                } else if self.document.snippets[target].resolution == Resolution::InProgress {
                    let mut chain: Vec<String> = stack
                        .iter()
                        .map(|f| self.document.snippets[f.index].label())
                        .collect();
                    chain.push(name.clone());
                    return Err(ResolveError::CyclicReference { name, chain, span });
                } else {
                    let child = self.enter(target);
                    stack.push(child);
                }
                continue;
            }

            let snippet = &self.document.snippets[frame.index];
            if let Some(line) = snippet.raw_lines.get(frame.cursor) {
                frame.cursor += 1;
                match directive::include_names(&line.text) {
                    Some(names) => {
                        frame.pending = names;
                        frame.next = 0;
                        frame.included = 0;
                        frame.span = line.span.clone();
                    }
                    None => frame.lines.push(line.text.clone()),
                }
                continue;
            }

            let Some(done) = stack.pop() else { break };
            log::debug!(
                "resolved {} ({} lines)",
                self.document.snippets[done.index].label(),
                done.lines.len()
            );
            if let Some(parent) = stack.last_mut() {
                parent.splice(&done.lines);
            }
            self.document.snippets[done.index].resolution = Resolution::Resolved(done.lines);
        }
        Ok(())
    }

    fn missing(
        &mut self,
        name: String,
        from: String,
        span: Range<usize>,
    ) -> Result<(), ResolveError> {
        let error = ResolveError::MissingReference { name, from, span };
        match self.policy {
            MissingPolicy::Strict => Err(error),
            MissingPolicy::Lenient => {
                log::warn!("{}; skipping", error);
                let span = error.span().unwrap_or_default();
                self.document.notices.push(
                    Notice::warning(error.to_string(), span, self.document.source_id)
                        .with_note("the reference was left out of the snippet"),
                );
                Ok(())
            }
        }
    }
}
