//! Typed error taxonomy for the bot core.
//!
//! Mirrors the propagation table in the specification's error handling
//! design: each variant here corresponds to a row that is logged and
//! recovered from rather than aborting the process.

use thiserror::Error;

/// Failures while establishing or maintaining a server connection.
#[derive(Debug, Error)]
pub enum ConnError {
    #[error("name resolution failed for {host}: {source}")]
    Resolve {
        host: String,
        #[source]
        source: std::io::Error,
    },

    #[error("connect to {addr} failed: {source}")]
    Connect {
        addr: std::net::SocketAddr,
        #[source]
        source: std::io::Error,
    },

    #[error("no endpoints resolved for {host}")]
    NoEndpoints { host: String },

    #[error("TLS handshake failed: {0}")]
    Tls(String),

    #[error("connect timed out after {0:?}")]
    Timeout(std::time::Duration),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}

/// Failures while lexing a raw IRC line.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ParseError {
    #[error("line has no command")]
    NoCommand,

    #[error("line exceeds 512 bytes")]
    TooLong,
}

/// Failures returned to a caller of `ServerHandle::send` and friends.
///
/// These map onto the C core's negative errno returns (`-ENOTCONN`,
/// `-ENOBUFS`) named in the specification.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum SendError {
    #[error("not connected")]
    NotConnected,

    #[error("output buffer full")]
    BufferFull,
}

/// Configuration loading/validation failures.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("duplicate server name: {0}")]
    DuplicateServer(String),

    #[error("duplicate plugin name: {0}")]
    DuplicatePlugin(String),

    #[error("duplicate hook name: {0}")]
    DuplicateHook(String),

    #[error("invalid port {0}: must be in 1..=65535")]
    InvalidPort(u32),

    #[error("invalid regex {pattern:?} in rule: {source}")]
    InvalidRule {
        pattern: String,
        #[source]
        source: regex::Error,
    },
}

/// Plugin lifecycle failures.
#[derive(Debug, Error)]
pub enum PluginError {
    #[error("plugin {0} not found by any loader")]
    NotFound(String),

    #[error("plugin {0} rejected during load()")]
    LoadRejected(String),

    #[error("plugin {0} already registered")]
    AlreadyRegistered(String),

    #[error("plugin panicked while handling an event: {0}")]
    Panicked(String),
}

/// Umbrella error for the bot aggregate's own fallible operations.
#[derive(Debug, Error)]
pub enum BotError {
    #[error("server {0} already exists")]
    ServerExists(String),

    #[error(transparent)]
    Plugin(#[from] PluginError),

    #[error(transparent)]
    Config(#[from] ConfigError),
}
