//! Per-language invocation templates and source preprocessing.

use std::ffi::OsString;
use std::path::Path;

use mdexe::Language;

const PHP_OPEN_TAG: &str = "<?php";

/// How the interpreter receives the program text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceDelivery {
    Stdin,
    /// Written to a file passed after `flag` (`awk -f prog.awk`).
    ProgramFile { flag: &'static str },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub program: String,
    pub delivery: SourceDelivery,
    /// Suffix for temporary source files.
    pub suffix: &'static str,
}

impl Invocation {
    /// Arguments that point the interpreter at a source file.
    pub fn file_args(&self, path: &Path) -> Vec<OsString> {
        let mut args = Vec::with_capacity(2);
        if let SourceDelivery::ProgramFile { flag } = self.delivery {
            args.push(OsString::from(flag));
        }
        args.push(path.as_os_str().to_owned());
        args
    }
}

pub trait Adapter {
    fn invocation(&self) -> Invocation;

    /// Final source text handed to the interpreter.
    fn prepare(&self, lines: &[String]) -> String;
}

impl Adapter for Language {
    fn invocation(&self) -> Invocation {
        let delivery = if self.is_awk_family() {
            SourceDelivery::ProgramFile { flag: "-f" }
        } else {
            SourceDelivery::Stdin
        };
        let suffix = match self {
            Language::Node => ".js",
            Language::Sh | Language::Bash | Language::Zsh => ".sh",
            Language::Php => ".php",
            Language::Perl => ".pl",
            Language::Awk | Language::Gawk | Language::Nawk => ".awk",
            Language::Python(_) => ".py",
        };
        Invocation {
            program: self.tag().to_string(),
            delivery,
            suffix,
        }
    }

    fn prepare(&self, lines: &[String]) -> String {
        let mut source = String::new();
        if *self == Language::Php && lines.first().is_none_or(|l| !l.contains(PHP_OPEN_TAG)) {
            source.push_str(PHP_OPEN_TAG);
            source.push('\n');
        }
        for line in lines {
            source.push_str(line);
            source.push('\n');
        }
        source
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lines(text: &[&str]) -> Vec<String> {
        text.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn php_gets_open_tag() {
        let source = Language::Php.prepare(&lines(&["echo \"hi\";", "echo 2;"]));
        assert_eq!(source, "<?php\necho \"hi\";\necho 2;\n");
    }

    #[test]
    fn php_open_tag_not_duplicated() {
        let body = lines(&["<?php echo 1;"]);
        assert_eq!(Language::Php.prepare(&body), "<?php echo 1;\n");
        assert_eq!(Language::Php.prepare(&[]), "<?php\n");
    }

    #[test]
    fn other_languages_pass_through() {
        let body = lines(&["<?php is just text here", "print(1)"]);
        let python = Language::Python("python3".into());
        assert_eq!(python.prepare(&body), "<?php is just text here\nprint(1)\n");
    }

    #[test]
    fn awk_reads_program_from_file() {
        let invocation = Language::Gawk.invocation();
        assert_eq!(invocation.program, "gawk");
        assert_eq!(invocation.delivery, SourceDelivery::ProgramFile { flag: "-f" });
        let args = invocation.file_args(Path::new("/tmp/p.awk"));
        assert_eq!(args, vec![OsString::from("-f"), OsString::from("/tmp/p.awk")]);
    }

    #[test]
    fn node_family_runs_node() {
        let invocation = Language::Node.invocation();
        assert_eq!(invocation.program, "node");
        assert_eq!(invocation.delivery, SourceDelivery::Stdin);
        assert_eq!(invocation.file_args(Path::new("x.js")), vec![OsString::from("x.js")]);
    }
}
