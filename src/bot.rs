//! The bot aggregate: ordered servers, plugins, rules, and hooks, plus the
//! dispatch pipeline that ties them together.
//!
//! Grounded on `original_source/lib/irccd/irccd.c`'s `irc_bot_dispatch`,
//! `is_command`/`to_command`, and the `irc_bot_*` CRUD functions for
//! servers/plugins/rules/hooks. All shared state here is owned by a single
//! task (the dispatch task spec.md §5 calls "the event loop task"); server
//! connection tasks only ever forward parsed [`Event`]s to it over an
//! `mpsc` channel, so no locking is needed inside the bot itself.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::config::Config;
use crate::error::{BotError, PluginError};
use crate::event::{Event, EventKind};
use crate::hook::Hook;
use crate::plugin::{loader_accepts, NativeLoader, Plugin, PluginLoader};
use crate::rule::{MatchContext, RuleAction, RuleChain};
use crate::server::{self, ServerHandle};

struct PluginEntry {
    name: String,
    plugin: Box<dyn Plugin>,
}

pub struct Bot {
    servers: Vec<Arc<ServerHandle>>,
    plugins: Vec<PluginEntry>,
    loaders: Vec<Box<dyn PluginLoader>>,
    rules: RuleChain,
    hooks: Vec<Hook>,
    events_tx: mpsc::UnboundedSender<Event>,
    events_rx: mpsc::UnboundedReceiver<Event>,
}

impl Bot {
    pub fn new() -> Self {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        Self {
            servers: Vec::new(),
            plugins: Vec::new(),
            loaders: vec![Box::new(NativeLoader)],
            rules: RuleChain::new(),
            hooks: Vec::new(),
            events_tx,
            events_rx,
        }
    }

    /// Build a bot from a validated [`Config`], connecting every configured
    /// server and loading every configured plugin in declaration order.
    pub async fn from_config(config: Config) -> Result<Self, BotError> {
        let mut bot = Self::new();

        bot.rules = RuleChain::from_configs(&config.rules)?;

        for hook in &config.hooks {
            bot.hooks.push(Hook::new(&hook.name, &hook.path));
        }

        for server_config in config.servers {
            bot.server_add(server_config);
        }

        for plugin_config in &config.plugins {
            bot.plugin_add_configured(plugin_config).await?;
        }

        Ok(bot)
    }

    pub fn server_add(&mut self, config: crate::config::ServerConfig) -> Arc<ServerHandle> {
        let handle = server::spawn(config, self.events_tx.clone());
        self.servers.push(handle.clone());
        handle
    }

    pub fn server_get(&self, name: &str) -> Option<&Arc<ServerHandle>> {
        self.servers.iter().find(|s| s.name == name)
    }

    pub fn server_remove(&mut self, name: &str) {
        self.servers.retain(|s| s.name != name);
    }

    pub fn server_clear(&mut self) {
        self.servers.clear();
    }

    pub async fn plugin_add(&mut self, name: &str, location: &str) -> Result<(), BotError> {
        self.plugin_add_configured(&crate::config::PluginConfig {
            name: name.to_string(),
            location: location.to_string(),
            templates: HashMap::new(),
            options: HashMap::new(),
            paths: HashMap::new(),
        })
        .await
    }

    /// Open and register a plugin from its full config entry, applying any
    /// configured templates/options/paths before `load()` runs so the
    /// plugin sees them from its very first lifecycle call.
    pub async fn plugin_add_configured(&mut self, config: &crate::config::PluginConfig) -> Result<(), BotError> {
        if self.plugins.iter().any(|p| p.name == config.name) {
            return Err(PluginError::AlreadyRegistered(config.name.clone()).into());
        }

        // Try every accepting loader in order, not just the first one that
        // claims the location: `open` can still fail (unrecognized builtin
        // name, missing file) and the next loader deserves a chance too,
        // matching `plugin_search`'s per-loader retry loop.
        let plugin = self
            .loaders
            .iter()
            .filter(|loader| loader_accepts(loader.as_ref(), &config.location))
            .find_map(|loader| loader.open(&config.name, &config.location));

        let Some(mut plugin) = plugin else {
            return Err(PluginError::NotFound(config.name.clone()).into());
        };

        for (key, value) in &config.templates {
            plugin.set_template(key, value);
        }
        for (key, value) in &config.options {
            plugin.set_option(key, value);
        }
        for (key, value) in &config.paths {
            plugin.set_path(key, value);
        }

        self.plugin_insert(&config.name, plugin).await
    }

    /// Register an already-constructed plugin directly, bypassing loader
    /// resolution. Mirrors `irc_bot_plugin_add`, which takes an opened
    /// `struct irc_plugin *` rather than a name/location pair (that's what
    /// `irc_bot_plugin_search` plus the loader table is for).
    pub async fn plugin_insert(&mut self, name: &str, mut plugin: Box<dyn Plugin>) -> Result<(), BotError> {
        if self.plugins.iter().any(|p| p.name == name) {
            return Err(PluginError::AlreadyRegistered(name.to_string()).into());
        }

        plugin.load().await.map_err(BotError::from)?;

        info!(plugin = name, "plugin loaded");
        self.plugins.push(PluginEntry {
            name: name.to_string(),
            plugin,
        });
        Ok(())
    }

    pub fn plugin_get(&self, name: &str) -> bool {
        self.plugins.iter().any(|p| p.name == name)
    }

    pub async fn plugin_remove(&mut self, name: &str) {
        if let Some(pos) = self.plugins.iter().position(|p| p.name == name) {
            let mut entry = self.plugins.remove(pos);
            entry.plugin.unload().await;
        }
    }

    pub fn loader_add(&mut self, loader: Box<dyn PluginLoader>) {
        self.loaders.push(loader);
    }

    pub fn rule_insert(&mut self, index: usize, rule: crate::rule::Rule) {
        self.rules.insert(index, rule);
    }

    pub fn rules(&self) -> &RuleChain {
        &self.rules
    }

    pub fn hook_add(&mut self, hook: Hook) {
        self.hooks.push(hook);
    }

    pub fn hook_remove(&mut self, name: &str) {
        self.hooks.retain(|h| h.name != name);
    }

    /// Run the dispatch loop until the channel closes (every server task
    /// has exited and dropped its sender).
    pub async fn run(&mut self) {
        while let Some(event) = self.events_rx.recv().await {
            self.dispatch(event).await;
        }
    }

    /// Hooks first in registration order, then passive-listener plugins in
    /// registration order filtered by the rule chain, then (if exactly one
    /// plugin is this message's command target) a synthesized `Command`
    /// event to that plugin alone, last.
    pub async fn dispatch(&mut self, event: Event) {
        for hook in &self.hooks {
            hook.invoke(&event.server.name, &event.kind).await;
        }

        let command = to_command(&event, &self.plugins);
        let command_target = command.as_ref().map(|(name, _)| name.as_str());

        for entry in &mut self.plugins {
            if Some(entry.name.as_str()) == command_target {
                // The command target gets the synthesized Command event
                // alone, below; it is not also a passive listener for this
                // line.
                continue;
            }
            let ctx = MatchContext {
                server: &event.server.name,
                channel: event.kind.channel().unwrap_or(""),
                origin: event.kind.origin().unwrap_or(""),
                plugin: &entry.name,
                event: event.tag(),
            };
            if self.rules.evaluate(&ctx) == RuleAction::Drop {
                continue;
            }
            if let Err(panic) = crate::panic_guard::run(entry.plugin.handle(&event)).await {
                warn!(plugin = %entry.name, error = %panic, "plugin panicked handling event");
            }
        }

        if let Some((plugin_name, command_event)) = command {
            if let Some(entry) = self.plugins.iter_mut().find(|p| p.name == plugin_name) {
                let ctx = MatchContext {
                    server: &command_event.server.name,
                    channel: command_event.kind.channel().unwrap_or(""),
                    origin: command_event.kind.origin().unwrap_or(""),
                    plugin: &entry.name,
                    event: command_event.tag(),
                };
                if self.rules.evaluate(&ctx) != RuleAction::Drop {
                    if let Err(panic) = crate::panic_guard::run(entry.plugin.handle(&command_event)).await {
                        warn!(plugin = %entry.name, error = %panic, "plugin panicked handling command");
                    }
                }
            }
        }
    }

    pub async fn shutdown(&mut self) {
        for entry in self.plugins.iter_mut().rev() {
            entry.plugin.finish().await;
        }
        self.servers.clear();
    }
}

impl Default for Bot {
    fn default() -> Self {
        Self::new()
    }
}

/// If `event` is a channel/private `Message` whose text starts with
/// `<command_char><plugin name>`, synthesize the `Command` event that
/// targets that one plugin. Matches `is_command`/`to_command` in the
/// original: ambiguous (multiple plugins share a name prefix) or absent
/// matches are simply not a command.
fn to_command(event: &Event, plugins: &[PluginEntry]) -> Option<(String, Event)> {
    let EventKind::Message { origin, channel, message } = &event.kind else {
        return None;
    };

    let prefix = &event.server.command_char;
    let rest = message.strip_prefix(prefix.as_str())?;

    let matching: Vec<&PluginEntry> = plugins
        .iter()
        .filter(|p| rest == p.name || rest.starts_with(&format!("{} ", p.name)))
        .collect();

    let plugin = match matching.as_slice() {
        [only] => only,
        _ => return None,
    };

    let text = rest
        .strip_prefix(&plugin.name)
        .unwrap_or("")
        .trim_start()
        .to_string();

    let command_event = Event::new(
        event.server.clone(),
        EventKind::Command {
            origin: origin.clone(),
            channel: channel.clone(),
            plugin: plugin.name.clone(),
            message: text,
        },
    );

    Some((plugin.name.clone(), command_event))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ServerConfig;

    fn server_config(name: &str) -> ServerConfig {
        ServerConfig {
            name: name.to_string(),
            hostname: "127.0.0.1".to_string(),
            port: 6667,
            tls: false,
            nickname: "bot".to_string(),
            username: "bot".to_string(),
            realname: "bot".to_string(),
            password: None,
            ctcp_version: "test".to_string(),
            command_char: "!".to_string(),
            channels: vec![],
            auto_reconnect: false,
        }
    }

    #[tokio::test]
    async fn single_plugin_prefix_match_becomes_command() {
        let mut bot = Bot::new();
        bot.plugin_add("ask", "native:ask").await.unwrap();
        let handle = bot.server_add(server_config("libera"));

        let event = Event::new(
            handle,
            EventKind::Message {
                origin: "alice".to_string(),
                channel: "#test".to_string(),
                message: "!ask will it rain".to_string(),
            },
        );

        let command = to_command(&event, &bot.plugins);
        assert!(command.is_some());
        let (name, ev) = command.unwrap();
        assert_eq!(name, "ask");
        match ev.kind {
            EventKind::Command { message, .. } => assert_eq!(message, "will it rain"),
            _ => panic!("expected command event"),
        }
    }

    struct ConfigurableTestPlugin {
        name: String,
        options: HashMap<String, String>,
        seen_option_at_load: Option<String>,
    }

    #[async_trait::async_trait]
    impl Plugin for ConfigurableTestPlugin {
        fn name(&self) -> &str {
            &self.name
        }

        fn set_option(&mut self, key: &str, value: &str) {
            self.options.insert(key.to_string(), value.to_string());
        }

        fn get_option(&self, key: &str) -> Option<String> {
            self.options.get(key).cloned()
        }

        async fn load(&mut self) -> Result<(), crate::error::PluginError> {
            self.seen_option_at_load = self.get_option("greeting");
            Ok(())
        }
    }

    struct TestPluginLoader;

    impl crate::plugin::PluginLoader for TestPluginLoader {
        fn extensions(&self) -> &[&str] {
            &[]
        }

        fn open(&self, name: &str, _location: &str) -> Option<Box<dyn Plugin>> {
            Some(Box::new(ConfigurableTestPlugin {
                name: name.to_string(),
                options: HashMap::new(),
                seen_option_at_load: None,
            }))
        }
    }

    #[tokio::test]
    async fn plugin_add_configured_applies_options_before_load() {
        let mut bot = Bot::new();
        bot.loader_add(Box::new(TestPluginLoader));

        bot.plugin_add_configured(&crate::config::PluginConfig {
            name: "greeter".to_string(),
            location: "test:greeter".to_string(),
            templates: HashMap::new(),
            options: [("greeting".to_string(), "hello".to_string())].into_iter().collect(),
            paths: HashMap::new(),
        })
        .await
        .unwrap();

        assert!(bot.plugin_get("greeter"));
        let entry = bot.plugins.iter().find(|p| p.name == "greeter").unwrap();
        assert_eq!(
            entry.plugin.get_option("greeting"),
            Some("hello".to_string())
        );
    }

    #[tokio::test]
    async fn ambiguous_prefix_is_not_a_command() {
        let mut bot = Bot::new();
        bot.plugin_add("ask", "native:ask").await.unwrap();
        bot.plugin_add("asklog", "native:logger").await.unwrap();
        let handle = bot.server_add(server_config("libera"));

        let event = Event::new(
            handle,
            EventKind::Message {
                origin: "alice".to_string(),
                channel: "#test".to_string(),
                message: "!ask".to_string(),
            },
        );

        assert!(to_command(&event, &bot.plugins).is_none());
    }
}
