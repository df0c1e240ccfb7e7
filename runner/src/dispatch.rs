use std::io::Write;

use mdexe::{Document, MissingPolicy, Resolver, Snippet, SnippetId};

use crate::adapter::Adapter;
use crate::error::{DispatchError, ExecError};
use crate::executor::{
    ExecMode, ExecOptions, ExecOutcome, Executor, Job, PipelineExecutor, PtyExecutor,
};

const PYTHON_UNBUFFERED: (&str, &str) = ("PYTHONUNBUFFERED", "YES");

/// Turns resolved snippets into interpreter runs.
#[derive(Debug, Clone, Default)]
pub struct Dispatcher {
    options: ExecOptions,
}

impl Dispatcher {
    pub fn new(options: ExecOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &ExecOptions {
        &self.options
    }

    /// Build the job for a resolved snippet.
    pub fn prepare(&self, snippet: &Snippet) -> Result<Job, ExecError> {
        let lines = snippet
            .resolved_lines()
            .ok_or_else(|| ExecError::Unresolved(snippet.label()))?;

        let mut invocation = snippet.language.invocation();
        if let Some(program) = self.options.interpreters.get(snippet.language.tag()) {
            invocation.program = program.clone();
        }

        let mut env: Vec<(String, String)> = self
            .options
            .env
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        if self.options.unbuffered {
            let (key, value) = PYTHON_UNBUFFERED;
            env.push((key.to_string(), value.to_string()));
        }

        Ok(Job {
            invocation,
            source: snippet.language.prepare(lines),
            env,
            timeout: self.options.timeout,
            cancel: self.options.cancel.clone(),
            interactive: self.options.interactive,
        })
    }

    pub fn dispatch(
        &self,
        snippet: &Snippet,
        out: &mut dyn Write,
        err: &mut dyn Write,
    ) -> Result<ExecOutcome, ExecError> {
        let job = self.prepare(snippet)?;
        match self.options.mode {
            ExecMode::Pipeline => PipelineExecutor.execute(&job, out, err),
            ExecMode::TempFile => PtyExecutor.execute(&job, out, err),
        }
    }
}

/// Resolve snippet `id` (reusing earlier resolutions) and run it.
pub fn execute(
    document: &mut Document,
    id: SnippetId,
    policy: MissingPolicy,
    options: &ExecOptions,
    out: &mut dyn Write,
    err: &mut dyn Write,
) -> Result<ExecOutcome, DispatchError> {
    Resolver::new(document, policy).resolve(id)?;
    let snippet = document
        .get(id)
        .ok_or_else(|| ExecError::Unresolved(format!("#{}", id)))?;
    let outcome = Dispatcher::new(options.clone()).dispatch(snippet, out, err)?;
    Ok(outcome)
}
