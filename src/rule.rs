//! The rule engine: an ordered chain of accept/drop filters consulted before
//! a passive-listener plugin sees an event.
//!
//! Grounded on `irc_bot_rule_insert`/`irc_rule_match` in
//! `original_source/lib/irccd/rule.c` and `irccd.c`: five string-sets
//! (servers/channels/origins/plugins/events), an empty set means wildcard,
//! the last matching rule wins, and the default when nothing matches is
//! accept.

use regex::Regex;
use serde::Deserialize;

use crate::config::RuleConfig;
use crate::error::ConfigError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RuleAction {
    Accept,
    Drop,
}

/// A compiled set of anchored patterns. An empty set matches anything
/// (wildcard), matching the original's "no restriction" semantics for an
/// empty rule field.
#[derive(Debug, Clone)]
struct PatternSet {
    patterns: Vec<Regex>,
}

impl PatternSet {
    fn compile(raw: &std::collections::HashSet<String>) -> Result<Self, ConfigError> {
        let mut patterns = Vec::with_capacity(raw.len());
        for pattern in raw {
            let compiled = Regex::new(&format!("^(?:{pattern})$")).map_err(|source| ConfigError::InvalidRule {
                pattern: pattern.clone(),
                source,
            })?;
            patterns.push(compiled);
        }
        Ok(Self { patterns })
    }

    fn matches(&self, value: &str) -> bool {
        self.patterns.is_empty() || self.patterns.iter().any(|p| p.is_match(value))
    }
}

#[derive(Debug, Clone)]
pub struct Rule {
    servers: PatternSet,
    channels: PatternSet,
    origins: PatternSet,
    plugins: PatternSet,
    events: PatternSet,
    pub action: RuleAction,
}

/// What a rule is evaluated against: an event about to reach a plugin.
#[derive(Debug, Clone, Copy)]
pub struct MatchContext<'a> {
    pub server: &'a str,
    pub channel: &'a str,
    pub origin: &'a str,
    pub plugin: &'a str,
    pub event: &'a str,
}

impl Rule {
    pub fn compile(config: &RuleConfig) -> Result<Self, ConfigError> {
        Ok(Self {
            servers: PatternSet::compile(&config.servers)?,
            channels: PatternSet::compile(&config.channels)?,
            origins: PatternSet::compile(&config.origins)?,
            plugins: PatternSet::compile(&config.plugins)?,
            events: PatternSet::compile(&config.events)?,
            action: config.action,
        })
    }

    fn matches(&self, ctx: &MatchContext) -> bool {
        self.servers.matches(ctx.server)
            && self.channels.matches(ctx.channel)
            && self.origins.matches(ctx.origin)
            && self.plugins.matches(ctx.plugin)
            && self.events.matches(ctx.event)
    }
}

/// An ordered list of [`Rule`]s, mutable the way `irc_bot_rule_*` mutates the
/// original's rule list (0-based indices, clamped on out-of-range insert).
#[derive(Debug, Clone, Default)]
pub struct RuleChain {
    rules: Vec<Rule>,
}

impl RuleChain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_configs(configs: &[RuleConfig]) -> Result<Self, ConfigError> {
        let mut chain = Self::new();
        for config in configs {
            chain.rules.push(Rule::compile(config)?);
        }
        Ok(chain)
    }

    /// Insert `rule` at `index`, clamping to the current length (append) if
    /// `index` is out of range, matching `irc_bot_rule_insert`.
    pub fn insert(&mut self, index: usize, rule: Rule) {
        let index = index.min(self.rules.len());
        self.rules.insert(index, rule);
    }

    pub fn get(&self, index: usize) -> Option<&Rule> {
        self.rules.get(index)
    }

    pub fn remove(&mut self, index: usize) -> Option<Rule> {
        if index < self.rules.len() {
            Some(self.rules.remove(index))
        } else {
            None
        }
    }

    /// Move the rule at `from` to `to`, clamping `to` to the valid range.
    pub fn move_rule(&mut self, from: usize, to: usize) {
        if from >= self.rules.len() {
            return;
        }
        let rule = self.rules.remove(from);
        let to = to.min(self.rules.len());
        self.rules.insert(to, rule);
    }

    pub fn size(&self) -> usize {
        self.rules.len()
    }

    pub fn clear(&mut self) {
        self.rules.clear();
    }

    /// The last matching rule wins; `Accept` if nothing matches at all.
    pub fn evaluate(&self, ctx: &MatchContext) -> RuleAction {
        self.rules
            .iter()
            .rev()
            .find(|rule| rule.matches(ctx))
            .map(|rule| rule.action)
            .unwrap_or(RuleAction::Accept)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn set(items: &[&str]) -> HashSet<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    fn ctx<'a>() -> MatchContext<'a> {
        MatchContext {
            server: "libera",
            channel: "#test",
            origin: "alice",
            plugin: "logger",
            event: "onMessage",
        }
    }

    #[test]
    fn empty_chain_defaults_to_accept() {
        let chain = RuleChain::new();
        assert_eq!(chain.evaluate(&ctx()), RuleAction::Accept);
    }

    #[test]
    fn last_matching_rule_wins() {
        let mut chain = RuleChain::new();
        chain.insert(
            0,
            Rule::compile(&RuleConfig {
                servers: HashSet::new(),
                channels: HashSet::new(),
                origins: HashSet::new(),
                plugins: set(&["logger"]),
                events: HashSet::new(),
                action: RuleAction::Drop,
            })
            .unwrap(),
        );
        chain.insert(
            1,
            Rule::compile(&RuleConfig {
                servers: HashSet::new(),
                channels: set(&["#test"]),
                origins: HashSet::new(),
                plugins: HashSet::new(),
                events: HashSet::new(),
                action: RuleAction::Accept,
            })
            .unwrap(),
        );
        assert_eq!(chain.evaluate(&ctx()), RuleAction::Accept);
    }

    #[test]
    fn insert_clamps_out_of_range_index() {
        let mut chain = RuleChain::new();
        let rule = Rule::compile(&RuleConfig {
            servers: HashSet::new(),
            channels: HashSet::new(),
            origins: HashSet::new(),
            plugins: HashSet::new(),
            events: HashSet::new(),
            action: RuleAction::Drop,
        })
        .unwrap();
        chain.insert(50, rule);
        assert_eq!(chain.size(), 1);
    }
}
