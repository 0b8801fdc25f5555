//! The event model dispatched to hooks and plugins.
//!
//! Grounded on `original_source/lib/irccd/event.h`'s `irc_event` tagged
//! union: one variant per wire event, each carrying exactly the fields the
//! original struct carries. `server` is `Arc<ServerHandle>` rather than a
//! borrow (SPEC_FULL.md §3): an `Event` crosses an `mpsc` channel into the
//! single dispatch task, and a borrowed `&ServerSession` cannot survive that
//! hop.

use std::sync::Arc;

use crate::server::ServerHandle;

/// A single parsed, semantically meaningful occurrence on a server session,
/// or a locally synthesized command invocation.
#[derive(Debug, Clone)]
pub struct Event {
    pub server: Arc<ServerHandle>,
    pub kind: EventKind,
}

impl Event {
    pub fn new(server: Arc<ServerHandle>, kind: EventKind) -> Self {
        Self { server, kind }
    }

    /// The event tag used by rule matching and hook argument vectors
    /// (`"onMessage"`, `"onJoin"`, ...).
    pub fn tag(&self) -> &'static str {
        self.kind.tag()
    }
}

#[derive(Debug, Clone)]
pub enum EventKind {
    Connect,
    Disconnect,
    Invite {
        origin: String,
        channel: String,
        target: String,
    },
    Join {
        origin: String,
        channel: String,
    },
    Kick {
        origin: String,
        channel: String,
        target: String,
        reason: Option<String>,
    },
    Message {
        origin: String,
        channel: String,
        message: String,
    },
    Me {
        origin: String,
        channel: String,
        message: String,
    },
    Mode {
        origin: String,
        channel: String,
        mode: String,
        args: Vec<String>,
    },
    Names {
        channel: String,
        names: Vec<String>,
    },
    Nick {
        origin: String,
        nickname: String,
    },
    Notice {
        origin: String,
        channel: String,
        notice: String,
    },
    Part {
        origin: String,
        channel: String,
        reason: Option<String>,
    },
    Topic {
        origin: String,
        channel: String,
        topic: String,
    },
    Whois {
        nickname: String,
        username: String,
        hostname: String,
        realname: String,
        channels: Vec<String>,
    },
    /// Synthesized by the bot dispatch pipeline when a `Message`'s text
    /// begins with `<prefix><plugin name>`; dispatched only to that plugin,
    /// after all passive listeners have run.
    Command {
        origin: String,
        channel: String,
        plugin: String,
        message: String,
    },
}

impl EventKind {
    pub fn tag(&self) -> &'static str {
        match self {
            EventKind::Connect => "onConnect",
            EventKind::Disconnect => "onDisconnect",
            EventKind::Invite { .. } => "onInvite",
            EventKind::Join { .. } => "onJoin",
            EventKind::Kick { .. } => "onKick",
            EventKind::Message { .. } => "onMessage",
            EventKind::Me { .. } => "onMe",
            EventKind::Mode { .. } => "onMode",
            EventKind::Names { .. } => "onNames",
            EventKind::Nick { .. } => "onNick",
            EventKind::Notice { .. } => "onNotice",
            EventKind::Part { .. } => "onPart",
            EventKind::Topic { .. } => "onTopic",
            EventKind::Whois { .. } => "onWhois",
            EventKind::Command { .. } => "onCommand",
        }
    }

    /// The channel or origin this event is scoped to, for rule matching.
    /// `None` for events with no channel concept (nick changes, whois).
    pub fn channel(&self) -> Option<&str> {
        match self {
            EventKind::Invite { channel, .. }
            | EventKind::Join { channel, .. }
            | EventKind::Kick { channel, .. }
            | EventKind::Message { channel, .. }
            | EventKind::Me { channel, .. }
            | EventKind::Mode { channel, .. }
            | EventKind::Names { channel, .. }
            | EventKind::Notice { channel, .. }
            | EventKind::Part { channel, .. }
            | EventKind::Topic { channel, .. }
            | EventKind::Command { channel, .. } => Some(channel),
            EventKind::Connect
            | EventKind::Disconnect
            | EventKind::Nick { .. }
            | EventKind::Whois { .. } => None,
        }
    }

    pub fn origin(&self) -> Option<&str> {
        match self {
            EventKind::Invite { origin, .. }
            | EventKind::Join { origin, .. }
            | EventKind::Kick { origin, .. }
            | EventKind::Message { origin, .. }
            | EventKind::Me { origin, .. }
            | EventKind::Mode { origin, .. }
            | EventKind::Nick { origin, .. }
            | EventKind::Notice { origin, .. }
            | EventKind::Part { origin, .. }
            | EventKind::Topic { origin, .. }
            | EventKind::Command { origin, .. } => Some(origin),
            EventKind::Connect | EventKind::Disconnect | EventKind::Names { .. } | EventKind::Whois { .. } => None,
        }
    }
}
