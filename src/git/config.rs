//! Reading git configuration

use std::path::Path;

use crate::error::CliError;
use crate::parse::{parse_config_list, parse_config_value, ConfigEntry, ConfigError, ConfigScope, ConfigValue};
use crate::process::{GitContext, InvocationRequest};

const CONFIG_MAX_BYTES: usize = 1024 * 1024;

/// Read one key from one scope
///
/// Keys must name a section (`user.name`, not `name`).
pub async fn read(git: &GitContext, cwd: &Path, scope: ConfigScope, key: &str) -> Result<ConfigValue, ConfigError> {
    if !key.contains('.') {
        return Err(ConfigError::SectionMissing { key: key.to_string() });
    }

    let request = InvocationRequest::new(cwd, ["config".to_string(), scope.flag(), "--show-scope".to_string(), key.to_string()]);
    match git.read_to_string(request, CONFIG_MAX_BYTES).await {
        Ok(output) => parse_config_value(key, &output),
        Err(err) => Err(map_read_error(key, err)),
    }
}

/// Every entry set in one scope
pub async fn read_all(git: &GitContext, cwd: &Path, scope: ConfigScope) -> Result<Vec<ConfigEntry>, ConfigError> {
    let request = InvocationRequest::new(cwd, ["config".to_string(), scope.flag(), "--show-scope".to_string(), "--list".to_string()]);
    let output = git.read_to_string(request, CONFIG_MAX_BYTES).await?;
    parse_config_list(&output)
}

fn map_read_error(key: &str, err: CliError) -> ConfigError {
    if let CliError::NonZeroExit { code, stderr, stdout, .. } = &err {
        if stderr.contains("key does not contain a section") {
            return ConfigError::SectionMissing { key: key.to_string() };
        }
        // git exits 1 without output when the key is unset
        if *code == Some(1) && stdout.trim().is_empty() {
            return ConfigError::KeyNotSet { key: key.to_string() };
        }
    }
    ConfigError::Git(err)
}
