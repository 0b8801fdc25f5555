//! The plugin abstraction: a vtable-shaped trait plus the loader mechanism
//! that resolves a configured `location` string to a concrete plugin.
//!
//! Grounded on `original_source/lib/irccd/plugin.h`'s `irc_plugin` vtable
//! (optional `set`/`get` accessors for templates/paths/options, `open`,
//! `load`, `reload`, `unload`, `event`, `finish`) and `irccd.c`'s
//! `plugin_search`, which tries each configured `irc_plugin_loader` in
//! order and additionally always accepts a bare extensionless path
//! regardless of the loader's declared extension list — preserved here for
//! compatibility and flagged in DESIGN.md.

use std::collections::HashMap;
use std::path::Path;

use async_trait::async_trait;

use crate::error::PluginError;
use crate::event::{Event, EventKind};

/// Metadata every plugin exposes; unset fields fall back to the defaults
/// named in `plugin.h` (`IRC_PLUGIN_DEFAULT_LICENSE` et al.).
#[derive(Debug, Clone)]
pub struct PluginMeta {
    pub license: String,
    pub version: String,
    pub author: String,
    pub description: String,
}

impl Default for PluginMeta {
    fn default() -> Self {
        Self {
            license: "ISC".to_string(),
            version: "0.1".to_string(),
            author: "nobody".to_string(),
            description: "no description".to_string(),
        }
    }
}

/// A loaded, runnable plugin. All lifecycle hooks besides `handle` have a
/// default no-op so a minimal plugin only needs to implement event
/// handling.
#[async_trait]
pub trait Plugin: Send + Sync {
    fn name(&self) -> &str;

    fn meta(&self) -> PluginMeta {
        PluginMeta::default()
    }

    fn get_template(&self, _key: &str) -> Option<String> {
        None
    }

    fn set_template(&mut self, _key: &str, _value: &str) {}

    fn get_templates(&self) -> HashMap<String, String> {
        HashMap::new()
    }

    fn get_path(&self, _key: &str) -> Option<String> {
        None
    }

    fn set_path(&mut self, _key: &str, _value: &str) {}

    fn get_paths(&self) -> HashMap<String, String> {
        HashMap::new()
    }

    fn get_option(&self, _key: &str) -> Option<String> {
        None
    }

    fn set_option(&mut self, _key: &str, _value: &str) {}

    fn get_options(&self) -> HashMap<String, String> {
        HashMap::new()
    }

    /// Called once after construction; a non-`Ok` return rejects the plugin
    /// (`irc_plugin_load` returning non-zero in the original).
    async fn load(&mut self) -> Result<(), PluginError> {
        Ok(())
    }

    async fn reload(&mut self) {}

    async fn unload(&mut self) {}

    async fn handle(&mut self, event: &Event);

    async fn finish(&mut self) {}
}

/// Resolves a configured plugin `location` string to a loaded [`Plugin`].
///
/// A loader only ever constructs the plugin; inserting it into the bot
/// (and calling `load()`) is the caller's responsibility, matching
/// `irc_bot_plugin_add`'s split between `irc_plugin_loader_open` and the
/// registration step.
pub trait PluginLoader: Send + Sync {
    /// Names this loader recognizes, e.g. `["native"]`.
    fn extensions(&self) -> &[&str];

    fn open(&self, name: &str, location: &str) -> Option<Box<dyn Plugin>>;
}

/// A plugin name is accepted by a loader either when its extension is one
/// the loader declares, or when the location has no extension at all.
///
/// The second clause reproduces a quirk in `plugin_search`: an
/// extensionless path is always tried by every configured loader,
/// independent of its `extensions` list. This was never tightened upstream
/// and is preserved here rather than "fixed", since configs in the wild may
/// depend on it.
pub fn loader_accepts(loader: &dyn PluginLoader, location: &str) -> bool {
    match Path::new(location).extension() {
        Some(ext) => loader.extensions().contains(&ext.to_string_lossy().as_ref()),
        None => true,
    }
}

/// Ships builtin plugins behind the `native:<name>` location scheme.
pub struct NativeLoader;

impl PluginLoader for NativeLoader {
    fn extensions(&self) -> &[&str] {
        &["native"]
    }

    fn open(&self, name: &str, location: &str) -> Option<Box<dyn Plugin>> {
        let builtin = location.strip_prefix("native:")?;
        match builtin {
            "logger" => Some(Box::new(LoggerPlugin::new(name))),
            "ask" => Some(Box::new(AskPlugin::new(name))),
            _ => None,
        }
    }
}

/// Logs every event it passively sees; never targets a command.
///
/// Grounded on the teacher's `tracing`-based logging density in
/// `irc_client.rs`.
pub struct LoggerPlugin {
    name: String,
}

impl LoggerPlugin {
    pub fn new(name: &str) -> Self {
        Self { name: name.to_string() }
    }
}

#[async_trait]
impl Plugin for LoggerPlugin {
    fn name(&self) -> &str {
        &self.name
    }

    fn meta(&self) -> PluginMeta {
        PluginMeta {
            description: "logs every dispatched event".to_string(),
            ..PluginMeta::default()
        }
    }

    async fn handle(&mut self, event: &Event) {
        tracing::info!(
            server = %event.server.name,
            event = event.tag(),
            "{:?}", event.kind
        );
    }
}

/// A minimal command plugin: `!ask <question>` echoes a canned reply.
/// Demonstrates the command-target synthesis path described in spec.md §4.3.
pub struct AskPlugin {
    name: String,
    replies: Vec<String>,
}

impl AskPlugin {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            replies: vec![
                "Yes.".to_string(),
                "No.".to_string(),
                "Ask again later.".to_string(),
            ],
        }
    }
}

#[async_trait]
impl Plugin for AskPlugin {
    fn name(&self) -> &str {
        &self.name
    }

    fn meta(&self) -> PluginMeta {
        PluginMeta {
            description: "answers yes/no questions".to_string(),
            ..PluginMeta::default()
        }
    }

    async fn handle(&mut self, event: &Event) {
        let EventKind::Command { origin, channel, message, .. } = &event.kind else {
            return;
        };
        if message.trim().is_empty() {
            return;
        }
        let index = message.len() % self.replies.len();
        let reply = &self.replies[index];
        let target = if channel.starts_with('#') { channel.as_str() } else { origin.as_str() };
        event.server.message(target, reply).await.ok();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Fixed {
        extensions: Vec<&'static str>,
    }

    impl PluginLoader for Fixed {
        fn extensions(&self) -> &[&str] {
            &self.extensions
        }

        fn open(&self, _name: &str, _location: &str) -> Option<Box<dyn Plugin>> {
            None
        }
    }

    #[test]
    fn extensionless_path_always_accepted() {
        let loader = Fixed { extensions: vec!["so"] };
        assert!(loader_accepts(&loader, "/opt/plugins/custom"));
        assert!(loader_accepts(&loader, "/opt/plugins/custom.so"));
        assert!(!loader_accepts(&loader, "/opt/plugins/custom.py"));
    }

    #[test]
    fn native_loader_resolves_logger() {
        let loader = NativeLoader;
        let plugin = loader.open("logger", "native:logger");
        assert!(plugin.is_some());
        assert!(loader.open("logger", "native:does-not-exist").is_none());
    }
}
