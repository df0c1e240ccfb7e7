mod config;
mod render;
mod report;
mod test_runner;

use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::process;
use std::time::Duration;

use clap::{ArgAction, Parser, Subcommand};

use mdexe::{Document, FenceStyle, MissingPolicy, Resolver, Selection, Snippet, SnippetId};
use runner::{ExecMode, ExecOptions, Termination};

use config::{Config, FenceSetting};
use report::Reporter;

const SUBCOMMANDS: &[&str] = &["show", "run", "list", "test", "help"];

#[derive(Parser)]
#[command(name = "mdexe", version, about = "Show and run code snippets embedded in markdown")]
struct Cli {
    /// Disable colored diagnostics
    #[arg(long, global = true)]
    no_color: bool,

    /// Log more (-v debug, -vv trace). RUST_LOG overrides.
    #[arg(short, long, global = true, action = ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Print snippets with includes expanded
    Show(ShowArgs),

    /// Execute snippets with their interpreters
    Run(RunArgs),

    /// List the snippets in a document
    List(DocArgs),

    /// Run .test.md test files
    Test(TestArgs),
}

#[derive(clap::Args)]
struct DocArgs {
    /// Markdown document; `-` or nothing reads stdin
    file: Option<String>,

    /// Snippet IDs separated by commas, or `all`
    #[arg(short, long)]
    ids: Option<Selection>,

    /// Skip includes that name no snippet instead of failing
    #[arg(long)]
    lenient: bool,

    /// How fence lines are recognised
    #[arg(long, value_enum)]
    fences: Option<FenceSetting>,

    /// Config file (default: ./mdexe.toml if present)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Dump the parsed document
    #[arg(long)]
    dump: bool,
}

#[derive(clap::Args)]
struct ShowArgs {
    #[command(flatten)]
    doc: DocArgs,

    /// Don't number lines
    #[arg(short = 'N', long)]
    no_numbers: bool,

    /// Don't print section headers
    #[arg(short = 'H', long)]
    no_headers: bool,

    /// Also show library snippets
    #[arg(long)]
    libs: bool,
}

#[derive(clap::Args)]
struct RunArgs {
    #[command(flatten)]
    doc: DocArgs,

    /// KEY=VAL added to the interpreter environment. Repeatable.
    #[arg(short, long = "env", value_parser = parse_key_val)]
    env: Vec<(String, String)>,

    /// Set PYTHONUNBUFFERED=YES for the interpreters
    #[arg(short, long)]
    unbuffered: bool,

    /// Run from a temporary file on a pseudo-terminal
    #[arg(short = 'z', long)]
    tempfile: bool,

    /// Forward stdin to the terminal (with --tempfile)
    #[arg(long, requires = "tempfile")]
    interactive: bool,

    /// Kill an interpreter after this many seconds
    #[arg(long, value_name = "SECS")]
    timeout: Option<u64>,

    /// Don't print each snippet before its output
    #[arg(short = 'S', long)]
    no_show: bool,

    /// Don't print section headers
    #[arg(short = 'H', long)]
    no_headers: bool,
}

#[derive(clap::Args)]
struct TestArgs {
    /// Path to a .test.md file or directory containing them
    path: String,

    /// Run only tests in these categories (subfolder names). Repeatable.
    #[arg(short, long)]
    category: Vec<String>,

    /// List available categories and exit
    #[arg(long)]
    list_categories: bool,
}

fn parse_key_val(s: &str) -> Result<(String, String), String> {
    match s.split_once('=') {
        Some((key, value)) if !key.is_empty() => Ok((key.to_string(), value.to_string())),
        _ => Err(format!("`{}` doesn't look like KEY=VAL", s)),
    }
}

fn is_global_flag(arg: &str) -> bool {
    arg == "--no-color"
        || arg == "--verbose"
        || (arg.len() > 1 && arg.starts_with('-') && arg[1..].bytes().all(|b| b == b'v'))
}

/// `mdexe doc.md` means `mdexe show doc.md`.
fn inject_default_subcommand(args: &mut Vec<String>) {
    let first = args.iter().skip(1).find(|a| !is_global_flag(a));
    let explicit = first.is_some_and(|first| {
        SUBCOMMANDS.contains(&first.as_str())
            || matches!(first.as_str(), "-h" | "--help" | "-V" | "--version")
    });
    if !explicit {
        args.insert(1.min(args.len()), "show".to_string());
    }
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "debug",
        _ => "trace",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format_timestamp(None)
        .init();
}

fn main() {
    let mut args: Vec<String> = std::env::args().collect();
    inject_default_subcommand(&mut args);
    let cli = Cli::parse_from(&args);
    init_logging(cli.verbose);

    let code = match cli.command {
        Command::Show(show_args) => do_show(show_args, cli.no_color),
        Command::Run(run_args) => do_run(run_args, cli.no_color),
        Command::List(doc_args) => do_list(doc_args, cli.no_color),
        Command::Test(test_args) => {
            let path = Path::new(&test_args.path);
            if test_args.list_categories {
                test_runner::list_categories(path);
                return;
            }
            test_runner::run_tests(path, cli.no_color, &test_args.category)
        }
    };
    process::exit(code);
}

/// A parsed, fully resolved document and the settings it was loaded with.
struct Loaded {
    document: Document,
    config: Config,
    policy: MissingPolicy,
    reporter: Reporter,
}

fn read_source(file: Option<&str>) -> io::Result<(String, String)> {
    match file {
        None | Some("-") => {
            let mut source = String::new();
            io::stdin().read_to_string(&mut source)?;
            Ok(("<stdin>".to_string(), source))
        }
        Some(path) => Ok((path.to_string(), std::fs::read_to_string(path)?)),
    }
}

/// Read, parse and resolve the document. Errors are reported here.
fn load(args: &DocArgs, no_color: bool) -> Result<Loaded, i32> {
    let config = Config::load(args.config.as_deref()).map_err(|e| {
        eprintln!("error: {}", e);
        1
    })?;

    let (name, source) = read_source(args.file.as_deref()).map_err(|e| {
        eprintln!(
            "error: cannot read '{}': {}",
            args.file.as_deref().unwrap_or("-"),
            e
        );
        1
    })?;

    let mut reporter = Reporter::new(no_color);
    let file_id = reporter.add(name, source.clone());

    let style = FenceStyle::from(args.fences.unwrap_or(config.fences));
    let policy = if args.lenient {
        MissingPolicy::Lenient
    } else {
        MissingPolicy::from(config.missing)
    };

    let mut document = mdexe::Parser::new(source, file_id)
        .with_style(style)
        .parse();
    let resolved = Resolver::new(&mut document, policy).resolve_all();
    reporter.notices(&document);
    if let Err(error) = resolved {
        reporter.emit(&error.to_diagnostic(file_id));
        return Err(1);
    }

    Ok(Loaded {
        document,
        config,
        policy,
        reporter,
    })
}

fn select(
    document: &Document,
    requested: Option<&Selection>,
    default: Selection,
) -> Result<Vec<SnippetId>, i32> {
    document.select(requested.unwrap_or(&default)).map_err(|e| {
        eprintln!("error: {}", e);
        1
    })
}

fn do_show(args: ShowArgs, no_color: bool) -> i32 {
    let loaded = match load(&args.doc, no_color) {
        Ok(loaded) => loaded,
        Err(code) => return code,
    };
    let document = &loaded.document;
    if args.doc.dump {
        println!("{:#?}", document);
        return 0;
    }
    let ids = match select(document, args.doc.ids.as_ref(), Selection::All) {
        Ok(ids) => ids,
        Err(code) => return code,
    };

    let libraries = document.libraries().filter(|_| args.libs);
    let selected = ids.iter().filter_map(|&id| document.get(id));

    let mut stdout = io::stdout().lock();
    for snippet in libraries.chain(selected) {
        if show_snippet(&mut stdout, snippet, !args.no_headers, !args.no_numbers).is_err() {
            // Downstream pipe closed.
            return 0;
        }
    }
    let _ = stdout.flush();
    0
}

fn show_snippet(
    w: &mut dyn Write,
    snippet: &Snippet,
    headers: bool,
    numbered: bool,
) -> io::Result<()> {
    if headers {
        render::header(w, render::SNIPPET, snippet)?;
    }
    render::body(w, snippet, numbered)
}

fn do_list(args: DocArgs, no_color: bool) -> i32 {
    let loaded = match load(&args, no_color) {
        Ok(loaded) => loaded,
        Err(code) => return code,
    };
    if args.dump {
        println!("{:#?}", loaded.document);
        return 0;
    }
    let _ = render::listing(&mut io::stdout().lock(), &loaded.document);
    0
}

fn exec_options(args: &RunArgs, config: &Config) -> ExecOptions {
    let mut env = config.env.clone();
    env.extend(args.env.iter().cloned());
    ExecOptions {
        mode: if args.tempfile {
            ExecMode::TempFile
        } else {
            ExecMode::from(config.run.mode)
        },
        env,
        unbuffered: args.unbuffered || config.run.unbuffered,
        timeout: args
            .timeout
            .or(config.run.timeout_secs)
            .map(Duration::from_secs),
        cancel: None,
        interactive: args.interactive,
        interpreters: config.interpreters.clone(),
    }
}

/// The numbered source (unless `-S`) and the `RESULT` header ahead of a run.
fn announce(w: &mut dyn Write, snippet: &Snippet, args: &RunArgs) -> io::Result<()> {
    if !args.no_show {
        show_snippet(w, snippet, !args.no_headers, true)?;
    }
    if !args.no_headers {
        render::header(w, render::RESULT, snippet)?;
    }
    w.flush()
}

fn do_run(args: RunArgs, no_color: bool) -> i32 {
    let Loaded {
        mut document,
        config,
        policy,
        reporter,
    } = match load(&args.doc, no_color) {
        Ok(loaded) => loaded,
        Err(code) => return code,
    };
    if args.doc.dump {
        println!("{:#?}", document);
        return 0;
    }
    let first = Selection::Ids(vec![SnippetId::first()]);
    let ids = match select(&document, args.doc.ids.as_ref(), first) {
        Ok(ids) => ids,
        Err(code) => return code,
    };
    let options = exec_options(&args, &config);

    let mut stdout = io::stdout();
    let mut stderr = io::stderr();
    let mut failed = 0usize;
    for id in ids {
        if let Some(snippet) = document.get(id) {
            let announced = announce(&mut stdout, snippet, &args);
            if announced.is_err() {
                return 1;
            }
        }

        match runner::execute(&mut document, id, policy, &options, &mut stdout, &mut stderr) {
            Ok(outcome) if outcome.success() => {}
            Ok(outcome) => {
                failed += 1;
                match (outcome.termination, outcome.exit_code) {
                    (Termination::TimedOut, _) => eprintln!("error: snippet {} timed out", id),
                    (Termination::Cancelled, _) => eprintln!("error: snippet {} was cancelled", id),
                    (Termination::Exited, Some(0)) => {
                        log::info!("snippet {} wrote {} bytes to stderr", id, outcome.stderr_bytes)
                    }
                    (Termination::Exited, Some(code)) => {
                        eprintln!("error: snippet {} exited with status {}", id, code)
                    }
                    (Termination::Exited, None) => {
                        eprintln!("error: snippet {} was killed by a signal", id)
                    }
                }
            }
            Err(runner::DispatchError::Resolve(error)) => {
                failed += 1;
                reporter.emit(&error.to_diagnostic(document.source_id));
            }
            Err(error) => {
                failed += 1;
                eprintln!("error: snippet {}: {}", id, error);
            }
        }
    }

    if failed > 0 {
        log::debug!("{} snippet(s) failed", failed);
        1
    } else {
        0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn argv(args: &[&str]) -> Vec<String> {
        let mut argv: Vec<String> = args.iter().map(|s| s.to_string()).collect();
        inject_default_subcommand(&mut argv);
        argv
    }

    #[test]
    fn bare_document_means_show() {
        assert_eq!(argv(&["mdexe", "doc.md"]), ["mdexe", "show", "doc.md"]);
        assert_eq!(argv(&["mdexe", "-i", "2", "doc.md"]), ["mdexe", "show", "-i", "2", "doc.md"]);
        assert_eq!(argv(&["mdexe"]), ["mdexe", "show"]);
    }

    #[test]
    fn explicit_subcommands_are_kept() {
        assert_eq!(argv(&["mdexe", "run", "doc.md"]), ["mdexe", "run", "doc.md"]);
        assert_eq!(argv(&["mdexe", "--help"]), ["mdexe", "--help"]);
        assert_eq!(argv(&["mdexe", "-vv", "run", "doc.md"]), ["mdexe", "-vv", "run", "doc.md"]);
        assert_eq!(
            argv(&["mdexe", "--no-color", "doc.md"]),
            ["mdexe", "show", "--no-color", "doc.md"]
        );
    }

    #[test]
    fn run_flags_parse() {
        let cli = Cli::try_parse_from(argv(&[
            "mdexe", "run", "-i", "1,3", "-e", "A=b=c", "-u", "-z", "--timeout", "5", "doc.md",
        ]))
        .unwrap();
        let Command::Run(args) = cli.command else {
            panic!("expected run");
        };
        assert_eq!(args.doc.file.as_deref(), Some("doc.md"));
        assert_eq!(args.env, vec![("A".to_string(), "b=c".to_string())]);

        let options = exec_options(&args, &Config::default());
        assert_eq!(options.mode, ExecMode::TempFile);
        assert!(options.unbuffered);
        assert_eq!(options.timeout, Some(Duration::from_secs(5)));
        assert_eq!(options.env["A"], "b=c");
    }

    #[test]
    fn zero_id_and_bad_env_are_rejected() {
        assert!(Cli::try_parse_from(argv(&["mdexe", "run", "-i", "0", "doc.md"])).is_err());
        assert!(Cli::try_parse_from(argv(&["mdexe", "run", "-e", "NOVALUE", "doc.md"])).is_err());
    }

    #[test]
    fn flags_override_config() {
        let config: Config = toml::from_str(
            "[run]\nmode = \"tempfile\"\ntimeout_secs = 9\n[env]\nA = \"config\"\nB = \"config\"\n",
        )
        .unwrap();
        let cli =
            Cli::try_parse_from(argv(&["mdexe", "run", "-e", "A=flag", "--timeout", "1"])).unwrap();
        let Command::Run(args) = cli.command else {
            panic!("expected run");
        };
        let options = exec_options(&args, &config);
        assert_eq!(options.mode, ExecMode::TempFile);
        assert_eq!(options.timeout, Some(Duration::from_secs(1)));
        assert_eq!(options.env["A"], "flag");
        assert_eq!(options.env["B"], "config");
    }

    fn run_args(extra: &[&str]) -> RunArgs {
        let mut line = vec!["mdexe", "run"];
        line.extend_from_slice(extra);
        let Command::Run(args) = Cli::try_parse_from(argv(&line)).unwrap().command else {
            panic!("expected run");
        };
        args
    }

    fn announced(args: &RunArgs) -> String {
        let doc = mdexe::Parser::new("```sh\necho hi\n```\n".to_string(), 0).parse();
        let mut out = Vec::new();
        announce(&mut out, &doc.snippets[0], args).unwrap();
        String::from_utf8(out).unwrap()
    }

    #[test]
    fn run_shows_source_unless_told_not_to() {
        let shown = announced(&run_args(&["doc.md"]));
        assert!(shown.contains("## SNIPPET: ID:1"));
        assert!(shown.contains("01: echo hi"));
        assert!(shown.contains("## RESULT: ID:1"));
        assert!(shown.find("SNIPPET") < shown.find("RESULT"));

        let hidden = announced(&run_args(&["-S", "doc.md"]));
        assert!(!hidden.contains("SNIPPET"));
        assert!(!hidden.contains("echo hi"));
        assert!(hidden.contains("## RESULT: ID:1"));

        let bare = announced(&run_args(&["--no-show", "-H", "doc.md"]));
        assert!(bare.is_empty());
    }

    #[test]
    fn fences_value_names() {
        let cli = Cli::try_parse_from(argv(&["mdexe", "list", "--fences", "commonmark"])).unwrap();
        let Command::List(args) = cli.command else {
            panic!("expected list");
        };
        assert_eq!(args.fences, Some(FenceSetting::CommonMark));
    }
}
