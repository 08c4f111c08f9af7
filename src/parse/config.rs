//! Parsing `git config --show-scope` output

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::error::CliError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConfigScope {
    Local,
    Worktree,
    Global,
    System,
}

impl ConfigScope {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConfigScope::Local => "local",
            ConfigScope::Worktree => "worktree",
            ConfigScope::Global => "global",
            ConfigScope::System => "system",
        }
    }

    /// The command-line flag selecting this scope, e.g. `--local`
    pub fn flag(&self) -> String {
        format!("--{}", self.as_str())
    }
}

impl fmt::Display for ConfigScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ConfigScope {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "local" => Ok(ConfigScope::Local),
            "worktree" => Ok(ConfigScope::Worktree),
            "global" => Ok(ConfigScope::Global),
            "system" => Ok(ConfigScope::System),
            // git may grow new sources (it once added `worktree`); never guess
            other => Err(ConfigError::UnknownScope {
                scope: other.to_string(),
            }),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConfigValue {
    pub scope: ConfigScope,
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConfigEntry {
    pub scope: ConfigScope,
    pub key: String,
    /// `None` for a bare boolean key such as `[core] bare`
    pub value: Option<String>,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Section missing from key: {key}")]
    SectionMissing { key: String },

    #[error("Key not set: {key}")]
    KeyNotSet { key: String },

    #[error("Value sourced from unknown scope: {scope}")]
    UnknownScope { scope: String },

    #[error("Malformed config line: {line:?}")]
    Malformed { line: String },

    #[error(transparent)]
    Git(#[from] CliError),
}

/// Parse the single `scope\tvalue` line printed for one key
pub fn parse_config_value(key: &str, output: &str) -> Result<ConfigValue, ConfigError> {
    let line = output.trim_end_matches(['\n', '\r']);
    if line.trim().is_empty() {
        return Err(ConfigError::KeyNotSet { key: key.to_string() });
    }

    // Split once: the value itself may contain tabs
    let mut parts = line.splitn(2, '\t');
    let scope = parts.next().unwrap_or_default();
    let Some(value) = parts.next() else {
        return Err(ConfigError::Malformed { line: line.to_string() });
    };

    Ok(ConfigValue {
        scope: scope.parse()?,
        value: value.to_string(),
    })
}

/// Parse `--show-scope --list` output, one `scope\tkey=value` per line
pub fn parse_config_list(output: &str) -> Result<Vec<ConfigEntry>, ConfigError> {
    let mut entries = Vec::new();

    for line in output.lines().filter(|line| !line.is_empty()) {
        let mut parts = line.splitn(2, '\t');
        let scope = parts.next().unwrap_or_default();
        let Some(key_value) = parts.next() else {
            return Err(ConfigError::Malformed { line: line.to_string() });
        };

        let scope: ConfigScope = scope.parse()?;
        let (key, value) = match key_value.split_once('=') {
            Some((key, value)) => (key, Some(value.to_string())),
            None => (key_value, None),
        };

        entries.push(ConfigEntry {
            scope,
            key: key.to_string(),
            value,
        });
    }

    Ok(entries)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_value() {
        let value = parse_config_value("user.name", "global\tJane Doe\n").unwrap();
        assert_eq!(value.scope, ConfigScope::Global);
        assert_eq!(value.value, "Jane Doe");
    }

    #[test]
    fn test_value_with_tab_is_kept_whole() {
        let value = parse_config_value("alias.x", "local\t!printf 'a\\tb'\tc\n").unwrap();
        assert_eq!(value.value, "!printf 'a\\tb'\tc");
    }

    #[test]
    fn test_empty_output_is_key_not_set() {
        assert!(matches!(
            parse_config_value("user.name", ""),
            Err(ConfigError::KeyNotSet { .. })
        ));
        assert!(matches!(
            parse_config_value("user.name", "\n"),
            Err(ConfigError::KeyNotSet { .. })
        ));
    }

    #[test]
    fn test_unknown_scope_is_rejected() {
        let err = parse_config_value("user.name", "command\tJane\n").unwrap_err();
        assert!(matches!(err, ConfigError::UnknownScope { ref scope } if scope == "command"));
    }

    #[test]
    fn test_parse_list() {
        let out = "system\tcore.autocrlf=input\nglobal\tuser.email=j@example.com\nlocal\tcore.bare\nlocal\tremote.origin.url=https://x/y.git?a=b\n";
        let entries = parse_config_list(out).unwrap();
        assert_eq!(entries.len(), 4);
        assert_eq!(entries[0].scope, ConfigScope::System);
        assert_eq!(entries[2].key, "core.bare");
        assert_eq!(entries[2].value, None);
        assert_eq!(entries[3].value.as_deref(), Some("https://x/y.git?a=b"));
    }

    #[test]
    fn test_list_rejects_unknown_scope() {
        assert!(parse_config_list("local\ta.b=1\nblob\tc.d=2\n").is_err());
    }

    #[test]
    fn test_scope_flag() {
        assert_eq!(ConfigScope::Worktree.flag(), "--worktree");
    }
}
