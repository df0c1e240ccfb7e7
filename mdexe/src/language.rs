use std::fmt;

/// Canonical interpreter family of a snippet.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Language {
    Node,
    Sh,
    Bash,
    Zsh,
    Php,
    Perl,
    Awk,
    Gawk,
    Nawk,
    /// Any `python*` tag, kept verbatim (`python3`, `python3.12`, ...).
    Python(String),
}

/// Fence tags accepted by [`Language::canonicalize`], for diagnostics.
pub const RECOGNIZED_TAGS: &str =
    "node, js, javascript, sh, bash, zsh, php, perl, awk, gawk, nawk, py, python*";

impl Language {
    /// Map a raw fence tag to its canonical language. Matching is case-sensitive.
    pub fn canonicalize(tag: &str) -> Option<Language> {
        let language = match tag {
            "node" | "js" | "javascript" => Language::Node,
            "sh" => Language::Sh,
            "bash" => Language::Bash,
            "zsh" => Language::Zsh,
            "php" => Language::Php,
            "perl" => Language::Perl,
            "awk" => Language::Awk,
            "gawk" => Language::Gawk,
            "nawk" => Language::Nawk,
            "py" => Language::Python("python".to_string()),
            _ if tag.starts_with("python") => Language::Python(tag.to_string()),
            _ => return None,
        };
        Some(language)
    }

    /// The canonical tag, which is also the interpreter command.
    pub fn tag(&self) -> &str {
        match self {
            Language::Node => "node",
            Language::Sh => "sh",
            Language::Bash => "bash",
            Language::Zsh => "zsh",
            Language::Php => "php",
            Language::Perl => "perl",
            Language::Awk => "awk",
            Language::Gawk => "gawk",
            Language::Nawk => "nawk",
            Language::Python(tag) => tag,
        }
    }

    pub fn is_awk_family(&self) -> bool {
        matches!(self, Language::Awk | Language::Gawk | Language::Nawk)
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}
