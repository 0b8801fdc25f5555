//! Configuration loading from an actual file on disk.

use irccd::config::Config;
use std::io::Write;
use tempfile::NamedTempFile;

#[test]
fn loads_a_full_multi_section_config_from_disk() {
    let mut file = NamedTempFile::new().unwrap();
    writeln!(
        file,
        r#"
        [logging]
        level = "debug"

        [admin]
        address = "127.0.0.1"
        port = 9999

        [[server]]
        name = "libera"
        hostname = "irc.libera.chat"
        tls = true
        nickname = "mybot"

        [[server.channels]]
        name = "#test"

        [[plugin]]
        name = "logger"
        location = "native:logger"

        [[rule]]
        plugins = ["logger"]
        events = ["onMessage"]
        action = "drop"

        [[hook]]
        name = "notify"
        path = "/usr/local/bin/irccd-notify"
        "#
    )
    .unwrap();

    let config = Config::from_file(file.path().to_str().unwrap()).unwrap();

    assert_eq!(config.logging.level, "debug");
    assert_eq!(config.admin.unwrap().port, 9999);
    assert_eq!(config.servers.len(), 1);
    assert_eq!(config.servers[0].hostname, "irc.libera.chat");
    assert!(config.servers[0].tls);
    assert_eq!(config.servers[0].channels.len(), 1);
    assert_eq!(config.plugins.len(), 1);
    assert_eq!(config.rules.len(), 1);
    assert_eq!(config.hooks[0].path, "/usr/local/bin/irccd-notify");
}

#[test]
fn missing_file_surfaces_a_read_error() {
    let result = Config::from_file("/nonexistent/path/to/irccd.toml");
    assert!(matches!(result, Err(irccd::error::ConfigError::Read { .. })));
}
