use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use mdexe::{Document, FenceStyle, MissingPolicy, Notice, Resolver, Selection};
use runner::{ExecOptions, Termination};

use crate::config::FenceSetting;

/// Upper bound for any one snippet run by a test document.
const SNIPPET_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ExpectedWarning {
    /// Substring that must appear in the warning message.
    pub contains: String,

    /// If set, the warning's span must start on this 1-based source line.
    #[serde(default)]
    pub line: Option<usize>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TestConfig {
    /// Human-readable test description.
    pub description: Option<String>,

    /// Snippets to run for `expect_output`: `all` (default) or `1,3`.
    pub ids: Option<String>,

    /// Extra environment for the interpreters.
    pub env: BTreeMap<String, String>,

    /// Skip unknown includes instead of failing.
    pub lenient: bool,

    pub fences: FenceSetting,

    /// Number of captured snippets, libraries included.
    pub expect_snippets: Option<usize>,

    /// Expected stdout of the selected snippets (trimmed comparison).
    /// Snippets only run when this is set.
    pub expect_output: Option<String>,

    /// Substring of the expected resolution error.
    pub expect_error: Option<String>,

    /// Expected warnings. If present (even empty), warning count and content are checked.
    pub expect_warnings: Option<Vec<ExpectedWarning>>,
}

/// Split a `.test.md` file into its TOML config and markdown document.
fn parse_test_file(content: &str) -> Result<(TestConfig, &str), String> {
    let content = content.trim_start_matches('\u{feff}');

    let Some(after_open) = content.strip_prefix("---") else {
        return Err("missing opening --- frontmatter delimiter".into());
    };
    let after_open = after_open
        .strip_prefix('\n')
        .or_else(|| after_open.strip_prefix("\r\n"))
        .unwrap_or(after_open);

    let close_pos = after_open
        .find("\n---")
        .ok_or("missing closing --- frontmatter delimiter")?;

    let toml_str = after_open[..close_pos].trim_end_matches('\r');
    let rest = &after_open[close_pos + 4..];
    let document = rest
        .strip_prefix("\r\n")
        .or_else(|| rest.strip_prefix('\n'))
        .unwrap_or(rest);

    let config: TestConfig =
        toml::from_str(toml_str).map_err(|e| format!("TOML parse error: {}", e))?;

    Ok((config, document))
}

pub enum TestOutcome {
    Pass,
    Fail(String),
}

pub struct TestResult {
    pub path: PathBuf,
    pub description: Option<String>,
    pub outcome: TestOutcome,
}

fn run_single_test(path: &Path) -> TestResult {
    let mut description = None;
    let outcome = match std::fs::read_to_string(path) {
        Err(e) => TestOutcome::Fail(format!("cannot read file: {}", e)),
        Ok(content) => match parse_test_file(&content) {
            Err(e) => TestOutcome::Fail(format!("frontmatter error: {}", e)),
            Ok((config, source)) => {
                description = config.description.clone();
                match check_document(&config, source) {
                    Ok(()) => TestOutcome::Pass,
                    Err(reason) => TestOutcome::Fail(reason),
                }
            }
        },
    };
    TestResult {
        path: path.to_path_buf(),
        description,
        outcome,
    }
}

/// Check every expectation in `config` against `source`. Returns the first mismatch.
fn check_document(config: &TestConfig, source: &str) -> Result<(), String> {
    let mut document = mdexe::Parser::new(source.to_string(), 0)
        .with_style(FenceStyle::from(config.fences))
        .parse();

    if let Some(expected) = config.expect_snippets {
        let actual = document.snippets.len();
        if actual != expected {
            return Err(format!("expected {} snippet(s), found {}", expected, actual));
        }
    }

    let policy = if config.lenient {
        MissingPolicy::Lenient
    } else {
        MissingPolicy::Strict
    };
    let resolved = Resolver::new(&mut document, policy).resolve_all();

    match (&config.expect_error, resolved) {
        (Some(expected), Err(error)) => {
            let message = error.to_string();
            if !message.contains(expected.as_str()) {
                return Err(format!(
                    "expected error containing \"{}\", got: {}",
                    expected, message
                ));
            }
        }
        (Some(expected), Ok(())) => {
            return Err(format!(
                "expected error containing \"{}\", but resolution succeeded",
                expected
            ));
        }
        (None, Err(error)) => return Err(format!("unexpected error: {}", error)),
        (None, Ok(())) => {}
    }

    if let Some(expected_output) = &config.expect_output {
        let actual = run_snippets(config, &mut document, policy)?;
        let actual_trimmed = actual.trim();
        let expected_trimmed = expected_output.trim();
        if actual_trimmed != expected_trimmed {
            return Err(format!(
                "output mismatch\n  expected: {}\n  actual:   {}",
                expected_trimmed, actual_trimmed
            ));
        }
    }

    if let Some(expected_warnings) = &config.expect_warnings {
        check_warnings(source, &document.notices, expected_warnings)?;
    }

    Ok(())
}

/// Run the selected snippets and collect their stdout.
fn run_snippets(
    config: &TestConfig,
    document: &mut Document,
    policy: MissingPolicy,
) -> Result<String, String> {
    let selection = match &config.ids {
        Some(ids) => ids.parse().map_err(|e| format!("invalid ids: {}", e))?,
        None => Selection::All,
    };
    let ids = document.select(&selection).map_err(|e| e.to_string())?;

    let options = ExecOptions {
        env: config.env.clone(),
        timeout: Some(SNIPPET_TIMEOUT),
        ..ExecOptions::default()
    };

    let mut output = Vec::new();
    for id in ids {
        let mut errors = Vec::new();
        let outcome = runner::execute(document, id, policy, &options, &mut output, &mut errors)
            .map_err(|e| format!("snippet {}: {}", id, e))?;
        let failed = outcome.termination != Termination::Exited || outcome.exit_code != Some(0);
        if failed {
            return Err(format!(
                "snippet {} failed ({:?}, exit {:?})\n{}",
                id,
                outcome.termination,
                outcome.exit_code,
                String::from_utf8_lossy(&errors).trim_end()
            ));
        }
    }
    Ok(String::from_utf8_lossy(&output).into_owned())
}

/// Convert a byte offset in `source` to a 1-based line number.
fn byte_offset_to_line(source: &str, offset: usize) -> usize {
    source.as_bytes()[..offset.min(source.len())]
        .iter()
        .filter(|&&b| b == b'\n')
        .count()
        + 1
}

fn check_warnings(
    source: &str,
    notices: &[Notice],
    expected: &[ExpectedWarning],
) -> Result<(), String> {
    let actual_warnings: Vec<&Notice> = notices.iter().filter(|n| n.is_warning()).collect();

    if actual_warnings.len() != expected.len() {
        let actual_msgs: Vec<String> = actual_warnings
            .iter()
            .map(|w| format!("  - {}", w.message))
            .collect();
        return Err(format!(
            "expected {} warning(s), got {}\n  actual warnings:\n{}",
            expected.len(),
            actual_warnings.len(),
            if actual_msgs.is_empty() {
                "    (none)".to_string()
            } else {
                actual_msgs.join("\n")
            }
        ));
    }

    for (i, (actual, expected)) in actual_warnings.iter().zip(expected).enumerate() {
        if !actual.message.contains(&expected.contains) {
            return Err(format!(
                "warning[{}]: expected message containing \"{}\", got: {}",
                i, expected.contains, actual.message
            ));
        }

        if let Some(expected_line) = expected.line {
            let actual_line = byte_offset_to_line(source, actual.span.start);
            if actual_line != expected_line {
                return Err(format!(
                    "warning[{}]: expected on line {}, but span is on line {}",
                    i, expected_line, actual_line
                ));
            }
        }
    }

    Ok(())
}

/// The `.test.md` files of one directory under the test root. Files in the
/// root itself form the suite with an empty name.
struct Suite {
    name: String,
    files: Vec<PathBuf>,
}

impl Suite {
    fn title(&self) -> &str {
        if self.name.is_empty() { "(root)" } else { &self.name }
    }

    /// `include` selects `include` and everything below it.
    fn matches(&self, category: &str) -> bool {
        let category = category.trim_matches('/');
        if self.name == category {
            return true;
        }
        !category.is_empty()
            && self
                .name
                .strip_prefix(category)
                .is_some_and(|rest| rest.starts_with('/'))
    }
}

fn is_test_document(path: &Path) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .is_some_and(|name| name.ends_with(".test.md"))
}

/// Suites under `root` sorted by name, each with its files sorted.
fn find_suites(root: &Path) -> Vec<Suite> {
    let mut found: BTreeMap<String, Vec<PathBuf>> = BTreeMap::new();
    let mut dirs = vec![root.to_path_buf()];
    while let Some(dir) = dirs.pop() {
        let Ok(entries) = std::fs::read_dir(&dir) else {
            log::debug!("cannot read test directory {}", dir.display());
            continue;
        };
        for path in entries.flatten().map(|entry| entry.path()) {
            if path.is_dir() {
                dirs.push(path);
            } else if is_test_document(&path) {
                let name = dir
                    .strip_prefix(root)
                    .map(|rel| rel.to_string_lossy().replace('\\', "/"))
                    .unwrap_or_default();
                found.entry(name).or_default().push(path);
            }
        }
    }
    found
        .into_iter()
        .map(|(name, mut files)| {
            files.sort();
            Suite { name, files }
        })
        .collect()
}

/// The suites named by `categories`, or all of them when none are named.
fn select_suites(suites: Vec<Suite>, categories: &[String]) -> Vec<Suite> {
    if categories.is_empty() {
        return suites;
    }
    for category in categories {
        if !suites.iter().any(|suite| suite.matches(category)) {
            let known: Vec<&str> = suites.iter().map(Suite::title).collect();
            eprintln!(
                "warning: no test category '{}' (known: {})",
                category,
                known.join(", ")
            );
        }
    }
    suites
        .into_iter()
        .filter(|suite| categories.iter().any(|c| suite.matches(c)))
        .collect()
}

/// Print the categories under `path` with their test counts.
pub fn list_categories(path: &Path) {
    if path.is_file() {
        eprintln!("{} is a single test document", path.display());
        return;
    }
    let suites = find_suites(path);
    if suites.is_empty() {
        eprintln!("no .test.md files found in {}", path.display());
        return;
    }
    for suite in &suites {
        eprintln!("  {:<24} {} test(s)", suite.title(), suite.files.len());
    }
}

fn paint(text: &str, code: &str, no_color: bool) -> String {
    if no_color {
        text.to_string()
    } else {
        format!("\x1b[{}m{}\x1b[0m", code, text)
    }
}

fn label(result: &TestResult) -> &str {
    result.description.as_deref().unwrap_or_else(|| {
        result
            .path
            .file_name()
            .and_then(|s| s.to_str())
            .and_then(|s| s.strip_suffix(".test.md"))
            .unwrap_or("?")
    })
}

/// Run all `.test.md` files under `path` (or a single file).
/// If `categories` is non-empty, only run tests in those categories.
/// Returns exit code: 0 = all pass, 1 = any failure.
pub fn run_tests(path: &Path, no_color: bool, categories: &[String]) -> i32 {
    let directory = !path.is_file();
    let suites = if directory {
        let found = find_suites(path);
        if found.is_empty() {
            eprintln!("no .test.md files found in {}", path.display());
            return 1;
        }
        let selected = select_suites(found, categories);
        if selected.is_empty() {
            eprintln!("no matching categories found");
            return 1;
        }
        selected
    } else {
        vec![Suite {
            name: String::new(),
            files: vec![path.to_path_buf()],
        }]
    };

    let mut passed = 0usize;
    let mut failures: Vec<TestResult> = Vec::new();

    for suite in &suites {
        if directory {
            eprintln!();
            eprintln!("{}", paint(suite.title(), "1", no_color));
        }
        for file in &suite.files {
            let result = run_single_test(file);
            match &result.outcome {
                TestOutcome::Pass => {
                    passed += 1;
                    eprintln!("  {}  {}", paint("PASS", "32", no_color), label(&result));
                }
                TestOutcome::Fail(_) => {
                    eprintln!("  {}  {}", paint("FAIL", "31", no_color), label(&result));
                    failures.push(result);
                }
            }
        }
    }

    if !failures.is_empty() {
        eprintln!();
        eprintln!("failures:");
        for f in &failures {
            eprintln!();
            eprintln!("  --- {} ---", f.path.display());
            if let TestOutcome::Fail(reason) = &f.outcome {
                for line in reason.lines() {
                    eprintln!("  {}", line);
                }
            }
        }
    }

    eprintln!();
    let failed = failures.len();
    if failed == 0 {
        eprintln!("test result: {}. {} passed, 0 failed", paint("ok", "32", no_color), passed);
        0
    } else {
        eprintln!(
            "test result: {}. {} passed, {} failed (of {})",
            paint("FAILED", "31", no_color),
            passed,
            failed,
            passed + failed
        );
        1
    }
}
