use codespan_reporting::diagnostic::Diagnostic;
use codespan_reporting::files::SimpleFiles;
use codespan_reporting::term;
use codespan_reporting::term::termcolor::{ColorChoice, StandardStream};

use mdexe::Document;

/// Renders diagnostics against the documents they came from.
pub struct Reporter {
    files: SimpleFiles<String, String>,
    writer: StandardStream,
    config: term::Config,
}

impl Reporter {
    pub fn new(no_color: bool) -> Self {
        let color_choice = if no_color {
            ColorChoice::Never
        } else {
            ColorChoice::Auto
        };
        Reporter {
            files: SimpleFiles::new(),
            writer: StandardStream::stderr(color_choice),
            config: term::Config::default(),
        }
    }

    /// Register a source and return its file ID.
    pub fn add(&mut self, name: String, source: String) -> usize {
        self.files.add(name, source)
    }

    pub fn emit(&self, diagnostic: &Diagnostic<usize>) {
        let mut writer = self.writer.lock();
        let _ = term::emit_to_write_style(&mut writer, &self.config, &self.files, diagnostic);
    }

    pub fn notices(&self, document: &Document) {
        for notice in &document.notices {
            self.emit(&notice.to_diagnostic());
        }
    }
}
