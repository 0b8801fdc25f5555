//! TOML configuration schema and load-time validation.
//!
//! Grounded on the teacher's `Config::from_file` (`toml::from_str` over a
//! `serde::Deserialize` struct), expanded from the teacher's single-server
//! shape into the multi-server/plugin/rule/hook/logging/admin schema
//! SPEC_FULL.md §2 calls for.

use std::collections::HashSet;

use serde::Deserialize;

use crate::error::ConfigError;
use crate::rule::RuleAction;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub admin: Option<AdminConfig>,
    #[serde(default, rename = "server")]
    pub servers: Vec<ServerConfig>,
    #[serde(default, rename = "plugin")]
    pub plugins: Vec<PluginConfig>,
    #[serde(default, rename = "rule")]
    pub rules: Vec<RuleConfig>,
    #[serde(default, rename = "hook")]
    pub hooks: Vec<HookConfig>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub verbose: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            verbose: false,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct AdminConfig {
    pub address: String,
    pub port: u16,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub name: String,
    pub hostname: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default)]
    pub tls: bool,
    #[serde(default = "default_nickname")]
    pub nickname: String,
    #[serde(default = "default_username")]
    pub username: String,
    #[serde(default = "default_realname")]
    pub realname: String,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default = "default_ctcp_version")]
    pub ctcp_version: String,
    #[serde(default = "default_prefix")]
    pub command_char: String,
    #[serde(default)]
    pub channels: Vec<ChannelConfig>,
    #[serde(default = "default_true")]
    pub auto_reconnect: bool,
}

fn default_port() -> u16 {
    6667
}

fn default_true() -> bool {
    true
}

fn default_nickname() -> String {
    "irccd".to_string()
}

fn default_username() -> String {
    "irccd".to_string()
}

fn default_realname() -> String {
    "IRC Client Daemon".to_string()
}

fn default_ctcp_version() -> String {
    "IRC Client Daemon".to_string()
}

fn default_prefix() -> String {
    "!".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChannelConfig {
    pub name: String,
    #[serde(default)]
    pub password: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PluginConfig {
    pub name: String,
    /// `native:<builtin-name>` or a filesystem path resolved by a loader.
    pub location: String,
    #[serde(default)]
    pub templates: std::collections::HashMap<String, String>,
    #[serde(default)]
    pub options: std::collections::HashMap<String, String>,
    #[serde(default)]
    pub paths: std::collections::HashMap<String, String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RuleConfig {
    #[serde(default)]
    pub servers: HashSet<String>,
    #[serde(default)]
    pub channels: HashSet<String>,
    #[serde(default)]
    pub origins: HashSet<String>,
    #[serde(default)]
    pub plugins: HashSet<String>,
    #[serde(default)]
    pub events: HashSet<String>,
    pub action: RuleAction,
}

#[derive(Debug, Clone, Deserialize)]
pub struct HookConfig {
    pub name: String,
    pub path: String,
}

impl Config {
    pub fn from_file(path: &str) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_string(),
            source,
        })?;
        let config: Config = toml::from_str(&raw)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        let mut seen = HashSet::new();
        for server in &self.servers {
            if !seen.insert(server.name.clone()) {
                return Err(ConfigError::DuplicateServer(server.name.clone()));
            }
            if server.port == 0 {
                return Err(ConfigError::InvalidPort(server.port as u32));
            }
        }

        let mut seen = HashSet::new();
        for plugin in &self.plugins {
            if !seen.insert(plugin.name.clone()) {
                return Err(ConfigError::DuplicatePlugin(plugin.name.clone()));
            }
        }

        let mut seen = HashSet::new();
        for hook in &self.hooks {
            if !seen.insert(hook.name.clone()) {
                return Err(ConfigError::DuplicateHook(hook.name.clone()));
            }
        }

        for rule in &self.rules {
            let sets = [&rule.servers, &rule.channels, &rule.origins, &rule.plugins, &rule.events];
            for pattern in sets.into_iter().flatten() {
                if let Err(source) = regex::Regex::new(&format!("^(?:{pattern})$")) {
                    return Err(ConfigError::InvalidRule {
                        pattern: pattern.clone(),
                        source,
                    });
                }
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_minimal_single_server_config() {
        let raw = r#"
            [[server]]
            name = "libera"
            hostname = "irc.libera.chat"
        "#;
        let config: Config = toml::from_str(raw).unwrap();
        config.validate().unwrap();
        assert_eq!(config.servers.len(), 1);
        assert_eq!(config.servers[0].port, 6667);
        assert_eq!(config.servers[0].nickname, "irccd");
    }

    #[test]
    fn rejects_duplicate_server_names() {
        let raw = r#"
            [[server]]
            name = "a"
            hostname = "h1"
            [[server]]
            name = "a"
            hostname = "h2"
        "#;
        let config: Config = toml::from_str(raw).unwrap();
        assert!(matches!(config.validate(), Err(ConfigError::DuplicateServer(_))));
    }

    #[test]
    fn rejects_malformed_rule_regex() {
        let raw = r#"
            [[rule]]
            servers = ["("]
            action = "accept"
        "#;
        let config: Config = toml::from_str(raw).unwrap();
        assert!(matches!(config.validate(), Err(ConfigError::InvalidRule { .. })));
    }
}
