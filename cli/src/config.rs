//! `mdexe.toml` settings. Command-line flags take precedence.

use std::collections::BTreeMap;
use std::io;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;

use mdexe::{FenceStyle, MissingPolicy};
use runner::ExecMode;

pub const DEFAULT_CONFIG: &str = "mdexe.toml";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read '{}': {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("invalid config '{}': {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum FenceSetting {
    /// Any fence line closes a snippet
    #[default]
    Compat,
    /// Fences follow CommonMark (matching closers, `~~~`, nesting)
    #[value(name = "commonmark")]
    CommonMark,
}

impl From<FenceSetting> for FenceStyle {
    fn from(setting: FenceSetting) -> Self {
        match setting {
            FenceSetting::Compat => FenceStyle::Compat,
            FenceSetting::CommonMark => FenceStyle::CommonMark,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MissingSetting {
    #[default]
    Strict,
    Lenient,
}

impl From<MissingSetting> for MissingPolicy {
    fn from(setting: MissingSetting) -> Self {
        match setting {
            MissingSetting::Strict => MissingPolicy::Strict,
            MissingSetting::Lenient => MissingPolicy::Lenient,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModeSetting {
    #[default]
    Pipeline,
    Tempfile,
}

impl From<ModeSetting> for ExecMode {
    fn from(setting: ModeSetting) -> Self {
        match setting {
            ModeSetting::Pipeline => ExecMode::Pipeline,
            ModeSetting::Tempfile => ExecMode::TempFile,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RunConfig {
    pub mode: ModeSetting,
    pub unbuffered: bool,
    pub timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub fences: FenceSetting,
    pub missing: MissingSetting,
    pub run: RunConfig,
    /// Extra environment for every interpreter.
    pub env: BTreeMap<String, String>,
    /// Interpreter program per canonical language tag.
    pub interpreters: BTreeMap<String, String>,
}

impl Config {
    /// Read `explicit`, or `mdexe.toml` in the working directory if present.
    pub fn load(explicit: Option<&Path>) -> Result<Config, ConfigError> {
        let path = match explicit {
            Some(path) => path.to_path_buf(),
            None => {
                let default = PathBuf::from(DEFAULT_CONFIG);
                if !default.is_file() {
                    return Ok(Config::default());
                }
                default
            }
        };
        log::debug!("loading config from {}", path.display());
        let text = std::fs::read_to_string(&path).map_err(|source| ConfigError::Read {
            path: path.clone(),
            source,
        })?;
        toml::from_str(&text).map_err(|source| ConfigError::Parse { path, source })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn full_config() {
        let config: Config = toml::from_str(
            r#"
fences = "commonmark"
missing = "lenient"

[run]
mode = "tempfile"
unbuffered = true
timeout_secs = 30

[env]
GREETING = "hello"

[interpreters]
python = "python3"
"#,
        )
        .unwrap();
        assert_eq!(config.fences, FenceSetting::CommonMark);
        assert_eq!(MissingPolicy::from(config.missing), MissingPolicy::Lenient);
        assert_eq!(ExecMode::from(config.run.mode), ExecMode::TempFile);
        assert!(config.run.unbuffered);
        assert_eq!(config.run.timeout_secs, Some(30));
        assert_eq!(config.env["GREETING"], "hello");
        assert_eq!(config.interpreters["python"], "python3");
    }

    #[test]
    fn empty_config_is_default() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config.fences, FenceSetting::Compat);
        assert_eq!(config.missing, MissingSetting::Strict);
        assert_eq!(config.run.mode, ModeSetting::Pipeline);
        assert!(config.env.is_empty());
    }

    #[test]
    fn unknown_keys_are_rejected() {
        assert!(toml::from_str::<Config>("fence = \"compat\"").is_err());
        assert!(toml::from_str::<Config>("[run]\ntimeout = 3").is_err());
    }

    #[test]
    fn explicit_path_must_exist() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope.toml");
        let err = Config::load(Some(&missing)).unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));

        let present = dir.path().join("mdexe.toml");
        std::fs::write(&present, "[run]\nunbuffered = true\n").unwrap();
        assert!(Config::load(Some(&present)).unwrap().run.unbuffered);
    }
}
