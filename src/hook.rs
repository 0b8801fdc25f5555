//! External process hooks: every event is first offered to each configured
//! hook, which receives it as an argument vector on a spawned child.
//!
//! Grounded on `original_source/lib/irccd/hook.h`'s `irc_hook`/
//! `irc_hook_child` and `irccd.c`'s `irc_bot_dispatch`, which invokes hooks
//! before plugins, in registration order. Child teardown (SIGTERM, then
//! SIGKILL after a grace period) follows the same file's exit handling.

use std::process::Stdio;
use std::time::Duration;

use tokio::process::{Child, Command};
use tracing::{debug, warn};

use crate::event::EventKind;

const KILL_GRACE: Duration = Duration::from_secs(5);

#[derive(Debug, Clone)]
pub struct Hook {
    pub name: String,
    pub path: String,
}

impl Hook {
    pub fn new(name: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
        }
    }

    /// Build the argument vector for `kind`, matching the original's fixed
    /// per-event trailing-argument shape: `[tag, server, ...fields]`.
    fn args_for(&self, server: &str, kind: &EventKind) -> Vec<String> {
        let tag = kind.tag().to_string();
        let mut args = vec![tag, server.to_string()];

        match kind {
            EventKind::Connect | EventKind::Disconnect => {}
            EventKind::Invite { origin, channel, target } => {
                args.extend([origin.clone(), channel.clone(), target.clone()]);
            }
            EventKind::Join { origin, channel } => {
                args.extend([origin.clone(), channel.clone()]);
            }
            EventKind::Kick { origin, channel, target, reason } => {
                args.extend([origin.clone(), channel.clone(), target.clone(), reason.clone().unwrap_or_default()]);
            }
            EventKind::Message { origin, channel, message } | EventKind::Me { origin, channel, message } => {
                args.extend([origin.clone(), channel.clone(), message.clone()]);
            }
            EventKind::Mode { origin, channel, mode, args: mode_args } => {
                args.extend([origin.clone(), channel.clone(), mode.clone(), mode_args.join(" ")]);
            }
            EventKind::Names { channel, names } => {
                args.extend([channel.clone(), names.join(" ")]);
            }
            EventKind::Nick { origin, nickname } => {
                args.extend([origin.clone(), nickname.clone()]);
            }
            EventKind::Notice { origin, channel, notice } => {
                args.extend([origin.clone(), channel.clone(), notice.clone()]);
            }
            EventKind::Part { origin, channel, reason } => {
                args.extend([origin.clone(), channel.clone(), reason.clone().unwrap_or_default()]);
            }
            EventKind::Topic { origin, channel, topic } => {
                args.extend([origin.clone(), channel.clone(), topic.clone()]);
            }
            EventKind::Whois {
                nickname,
                username,
                hostname,
                realname,
                channels,
            } => {
                args.extend([nickname.clone(), username.clone(), hostname.clone(), realname.clone(), channels.join(" ")]);
            }
            EventKind::Command { origin, channel, plugin, message } => {
                args.extend([origin.clone(), channel.clone(), plugin.clone(), message.clone()]);
            }
        }

        args
    }

    /// Spawn the hook's executable with `kind`'s argument vector, letting it
    /// run detached (fire-and-forget, matching `irc_hook_invoke`'s
    /// fork/exec-and-don't-wait semantics).
    pub async fn invoke(&self, server: &str, kind: &EventKind) {
        let args = self.args_for(server, kind);

        let child = Command::new(&self.path)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn();

        match child {
            Ok(child) => {
                debug!(hook = %self.name, pid = ?child.id(), "hook spawned");
                tokio::spawn(reap(self.name.clone(), child));
            }
            Err(e) => warn!(hook = %self.name, error = %e, "failed to spawn hook"),
        }
    }
}

async fn reap(name: String, mut child: Child) {
    match tokio::time::timeout(Duration::from_secs(30), child.wait()).await {
        Ok(Ok(status)) => debug!(hook = %name, ?status, "hook exited"),
        Ok(Err(e)) => warn!(hook = %name, error = %e, "error waiting on hook"),
        Err(_) => {
            warn!(hook = %name, "hook still running, sending SIGTERM");
            terminate(&mut child).await;
        }
    }
}

#[cfg(unix)]
async fn terminate(child: &mut Child) {
    use nix::sys::signal::{self, Signal};
    use nix::unistd::Pid;

    if let Some(id) = child.id() {
        let _ = signal::kill(Pid::from_raw(id as i32), Signal::SIGTERM);
    }

    if tokio::time::timeout(KILL_GRACE, child.wait()).await.is_err() {
        let _ = child.start_kill();
        let _ = child.wait().await;
    }
}

#[cfg(not(unix))]
async fn terminate(child: &mut Child) {
    let _ = child.start_kill();
    let _ = child.wait().await;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn args_for_join_matches_table_shape() {
        let hook = Hook::new("notify", "/bin/true");
        let args = hook.args_for(
            "libera",
            &EventKind::Join {
                origin: "alice".to_string(),
                channel: "#test".to_string(),
            },
        );
        assert_eq!(args, vec!["onJoin", "libera", "alice", "#test"]);
    }

    #[test]
    fn args_for_kick_includes_empty_reason_placeholder() {
        let hook = Hook::new("notify", "/bin/true");
        let args = hook.args_for(
            "libera",
            &EventKind::Kick {
                origin: "alice".to_string(),
                channel: "#test".to_string(),
                target: "bob".to_string(),
                reason: None,
            },
        );
        assert_eq!(args, vec!["onKick", "libera", "alice", "#test", "bob", ""]);
    }
}
