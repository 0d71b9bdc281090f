// SPDX-FileCopyrightText: 2026 Tiergate Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration loader using Figment for layered config merging.
//!
//! Supports XDG hierarchy: `./tiergate.toml` > `~/.config/tiergate/tiergate.toml` > `/etc/tiergate/tiergate.toml`
//! with environment variable overrides via `TIERGATE_` prefix.

#![allow(clippy::result_large_err)] // figment::Error is external and cannot be boxed without wrapper

use std::path::{Path, PathBuf};

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};

use crate::model::TiergateConfig;

/// System-wide config file.
pub const SYSTEM_CONFIG_PATH: &str = "/etc/tiergate/tiergate.toml";

/// Config file looked up in the working directory.
pub const LOCAL_CONFIG_FILE: &str = "tiergate.toml";

/// Sections whose keys may be overridden through `TIERGATE_<SECTION>_<KEY>`.
///
/// `backends` and `routes` are arrays and are only configurable from files.
const ENV_SECTIONS: &[&str] = &["server", "classifier", "mode", "prometheus"];

/// The user-level config file, if a config directory exists.
pub fn user_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("tiergate").join(LOCAL_CONFIG_FILE))
}

/// Load configuration from the standard XDG hierarchy with env var overrides.
///
/// Merge order (later overrides earlier):
/// 1. Compiled defaults
/// 2. `/etc/tiergate/tiergate.toml` (system-wide)
/// 3. `~/.config/tiergate/tiergate.toml` (user XDG config)
/// 4. `./tiergate.toml` (local directory)
/// 5. `TIERGATE_*` environment variables
pub fn load_config() -> Result<TiergateConfig, figment::Error> {
    build_figment().extract()
}

/// Load configuration from a TOML string over the compiled defaults.
///
/// Used for testing and explicit configuration.
pub fn load_config_from_str(toml_content: &str) -> Result<TiergateConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(TiergateConfig::default()))
        .merge(Toml::string(toml_content))
        .extract()
}

/// Load configuration from a specific file path with env var overrides.
///
/// Unlike [`load_config`], a missing file is an error here.
pub fn load_config_from_path(path: &Path) -> Result<TiergateConfig, figment::Error> {
    if !path.is_file() {
        return Err(figment::Error::from(format!(
            "config file `{}` does not exist",
            path.display()
        )));
    }
    Figment::new()
        .merge(Serialized::defaults(TiergateConfig::default()))
        .merge(Toml::file(path))
        .merge(env_provider())
        .extract()
}

/// Build the Figment used for hierarchy loading (exposed for diagnostic use).
pub fn build_figment() -> Figment {
    Figment::new()
        .merge(Serialized::defaults(TiergateConfig::default()))
        .merge(Toml::file(SYSTEM_CONFIG_PATH))
        .merge(Toml::file(user_config_path().unwrap_or_default()))
        .merge(Toml::file(LOCAL_CONFIG_FILE))
        .merge(env_provider())
}

/// Create the environment variable provider.
///
/// Uses `Env::map()` NOT `Env::split("_")`: key names contain underscores, so
/// `TIERGATE_SERVER_REQUEST_TIMEOUT_SECS` must map to
/// `server.request_timeout_secs`, not `server.request.timeout.secs`.
fn env_provider() -> Env {
    Env::prefixed("TIERGATE_").map(|key| map_env_key(key.as_str()).into())
}

fn map_env_key(key: &str) -> String {
    for section in ENV_SECTIONS {
        if let Some(rest) = key
            .strip_prefix(section)
            .and_then(|rest| rest.strip_prefix('_'))
        {
            return format!("{section}.{rest}");
        }
    }
    key.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn env_keys_map_on_first_underscore_only() {
        assert_eq!(
            map_env_key("server_request_timeout_secs"),
            "server.request_timeout_secs"
        );
        assert_eq!(map_env_key("classifier_tool_cap"), "classifier.tool_cap");
        assert_eq!(map_env_key("mode_constrained"), "mode.constrained");
    }

    #[test]
    fn unknown_sections_pass_through() {
        assert_eq!(map_env_key("backends"), "backends");
        assert_eq!(map_env_key("serverless"), "serverless");
    }

    #[test]
    fn missing_explicit_path_is_an_error() {
        let result = load_config_from_path(Path::new("/nonexistent/tiergate.toml"));
        assert!(result.is_err());
    }
}
