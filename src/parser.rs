//! Line lexing and the numeric/command handler table.
//!
//! Grounded on `original_source/lib/irccd/server.c`'s `irc_server_poll`
//! line-splitting and its per-command handlers (`irc_server_handle_join`,
//! `_kick`, `_mode`, `_nick`, `_notice`, `_part`, `_ping`, `_msg`, `_topic`,
//! `_support`, numeric 311/318/319/353/366/433), translated into a pure
//! lexer plus a session-mutating dispatch function.

use tracing::warn;

use crate::error::ParseError;
use crate::event::{Event, EventKind};
use crate::server::ServerSession;

/// A lexed IRC line: optional prefix, command (verb or 3-digit numeric),
/// and parameter list (trailing `:`-prefixed parameter already unwrapped).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub prefix: Option<String>,
    pub command: String,
    pub params: Vec<String>,
}

/// Split `prefix` (`nick!user@host` or a bare server name) into origin and
/// hostmask parts. Only the nick is used as the event origin.
pub fn nick_from_prefix(prefix: &str) -> &str {
    prefix.split('!').next().unwrap_or(prefix)
}

pub fn parse_line(line: &str) -> Result<Message, ParseError> {
    if line.len() > 512 {
        return Err(ParseError::TooLong);
    }

    let mut rest = line;
    let mut prefix = None;

    if let Some(stripped) = rest.strip_prefix(':') {
        let (p, r) = stripped.split_once(' ').unwrap_or((stripped, ""));
        prefix = Some(p.to_string());
        rest = r.trim_start();
    }

    let (command, mut rest) = match rest.split_once(' ') {
        Some((c, r)) => (c, r),
        None if !rest.is_empty() => (rest, ""),
        None => return Err(ParseError::NoCommand),
    };

    if command.is_empty() {
        return Err(ParseError::NoCommand);
    }

    let mut params = Vec::new();
    loop {
        rest = rest.trim_start();
        if rest.is_empty() {
            break;
        }
        if let Some(trailing) = rest.strip_prefix(':') {
            params.push(trailing.to_string());
            break;
        }
        match rest.split_once(' ') {
            Some((param, r)) => {
                params.push(param.to_string());
                rest = r;
            }
            None => {
                params.push(rest.to_string());
                break;
            }
        }
    }

    Ok(Message {
        prefix,
        command: command.to_ascii_uppercase(),
        params,
    })
}

/// Lex `line`, mutate `session` accordingly, and return a semantic event if
/// one resulted. `session.handle` may be used to queue immediate replies
/// (e.g. `PONG`, nick reclamation).
pub async fn handle_line(session: &mut ServerSession, line: &str) -> Option<Event> {
    let message = match parse_line(line) {
        Ok(m) => m,
        Err(_) => return None,
    };

    let origin = message.prefix.as_deref().map(nick_from_prefix).unwrap_or("").to_string();

    match message.command.as_str() {
        "PING" => {
            let token = message.params.first().cloned().unwrap_or_default();
            session.handle.raw(&format!("PONG :{token}")).await.ok();
            None
        }

        "001" => {
            for channel in session.config.channels.clone() {
                session.handle.join(&channel.name, channel.password.as_deref()).await.ok();
            }
            Some(Event::new(session.handle.clone(), EventKind::Connect))
        }

        "005" => {
            session.limits.apply_isupport(&message.params);
            None
        }

        "311" => {
            // <me> <nick> <user> <host> * :<realname>
            let nickname = message.params.get(1)?.clone();
            let username = message.params.get(2)?.clone();
            let hostname = message.params.get(3)?.clone();
            let realname = message.params.last()?.clone();
            session.begin_whois(&nickname, &username, &hostname, &realname);
            None
        }

        "319" => {
            // <me> <nick> :<channels...>
            if let Some(names) = message.params.last() {
                session.add_whois_channels(names);
            }
            None
        }

        "318" => session.take_whois().map(|kind| Event::new(session.handle.clone(), kind)),

        "353" => {
            // <me> <sym> <channel> :<names...>
            let channel = message.params.get(2)?.clone();
            let names = message.params.last()?.clone();
            let prefixes = session.limits.prefixes.clone();
            let ch = session.channel_mut(&channel);
            for token in names.split_whitespace() {
                let (nick, bits) = prefixes.strip(token);
                ch.add(nick, bits);
            }
            None
        }

        "366" => {
            // <me> <channel> :End of /NAMES list.
            let channel = message.params.get(1)?.clone();
            let ch = session.channel_mut(&channel);
            ch.flags.joined = true;
            let names = ch.users().map(|u| u.nickname.clone()).collect();
            Some(Event::new(session.handle.clone(), EventKind::Names { channel, names }))
        }

        "433" => {
            let nickname = message.params.get(1).cloned().unwrap_or_default();
            warn!(server = %session.config.name, nickname, "nickname in use");
            None
        }

        "ERROR" => {
            let reason = message.params.first().cloned().unwrap_or_default();
            warn!(server = %session.config.name, reason, "server sent ERROR");
            None
        }

        "INVITE" => {
            let target = message.params.first()?.clone();
            let channel = message.params.get(1)?.clone();
            Some(Event::new(session.handle.clone(), EventKind::Invite { origin, channel, target }))
        }

        "JOIN" => {
            let channel = message.params.first()?.clone();
            let is_self = origin.eq_ignore_ascii_case(&session.nickname);
            let ch = session.channel_mut(&channel);
            ch.add(&origin, 0);
            if is_self {
                ch.flags.joined = true;
            }
            Some(Event::new(session.handle.clone(), EventKind::Join { origin, channel }))
        }

        "KICK" => {
            let channel = message.params.first()?.clone();
            let target = message.params.get(1)?.clone();
            let reason = message.params.get(2).cloned();
            let is_self = target.eq_ignore_ascii_case(&session.nickname);
            let ch = session.channel_mut(&channel);
            ch.remove(&target);
            if is_self {
                ch.flags.joined = false;
            }

            // A channel named in the server's own configuration is one the
            // operator wants the bot present in persistently; being kicked
            // from it doesn't change that intent, so rejoin immediately.
            if is_self && session.config.channels.iter().any(|c| c.name.eq_ignore_ascii_case(&channel)) {
                let password = session
                    .config
                    .channels
                    .iter()
                    .find(|c| c.name.eq_ignore_ascii_case(&channel))
                    .and_then(|c| c.password.clone());
                session.handle.join(&channel, password.as_deref()).await.ok();
            }

            Some(Event::new(
                session.handle.clone(),
                EventKind::Kick {
                    origin,
                    channel,
                    target,
                    reason,
                },
            ))
        }

        "MODE" => {
            let channel = message.params.first()?.clone();
            if !channel.starts_with(|c: char| "#&!+".contains(c)) {
                // user mode targeting ourselves, not a channel
                let mode = message.params.get(1)?.clone();
                apply_user_modes(session, &mode);
                return Some(Event::new(
                    session.handle.clone(),
                    EventKind::Mode {
                        origin,
                        channel: String::new(),
                        mode,
                        args: vec![],
                    },
                ));
            }
            let mode = message.params.get(1)?.clone();
            let args: Vec<String> = message.params.iter().skip(2).cloned().collect();
            apply_channel_modes(session, &channel, &mode, &args);
            Some(Event::new(
                session.handle.clone(),
                EventKind::Mode {
                    origin,
                    channel,
                    mode,
                    args,
                },
            ))
        }

        "NICK" => {
            let nickname = message.params.first()?.clone();
            if origin.eq_ignore_ascii_case(&session.nickname) {
                session.nickname = nickname.clone();
            }
            for channel in session.channels.values_mut() {
                channel.rename(&origin, &nickname);
            }
            Some(Event::new(session.handle.clone(), EventKind::Nick { origin, nickname }))
        }

        "NOTICE" => {
            let channel = message.params.first()?.clone();
            let notice = message.params.get(1)?.clone();
            Some(Event::new(session.handle.clone(), EventKind::Notice { origin, channel, notice }))
        }

        "PART" => {
            let channel = message.params.first()?.clone();
            let reason = message.params.get(1).cloned();
            let is_self = origin.eq_ignore_ascii_case(&session.nickname);
            if is_self {
                session.channels.remove(&channel.to_ascii_lowercase());
            } else {
                session.channel_mut(&channel).remove(&origin);
            }
            Some(Event::new(session.handle.clone(), EventKind::Part { origin, channel, reason }))
        }

        "PRIVMSG" => {
            let channel = message.params.first()?.clone();
            let text = message.params.get(1)?.clone();

            if let Some(action) = text.strip_prefix('\x01').and_then(|t| t.strip_suffix('\x01')) {
                if let Some(me_text) = action.strip_prefix("ACTION ") {
                    return Some(Event::new(
                        session.handle.clone(),
                        EventKind::Me {
                            origin,
                            channel,
                            message: me_text.to_string(),
                        },
                    ));
                }
                handle_ctcp(session, &origin, action).await;
                return None;
            }

            Some(Event::new(
                session.handle.clone(),
                EventKind::Message {
                    origin,
                    channel,
                    message: text,
                },
            ))
        }

        "TOPIC" => {
            let channel = message.params.first()?.clone();
            let topic = message.params.get(1)?.clone();
            Some(Event::new(session.handle.clone(), EventKind::Topic { origin, channel, topic }))
        }

        _ => None,
    }
}

async fn handle_ctcp(session: &ServerSession, origin: &str, request: &str) {
    let reply = match request {
        "CLIENTINFO" => Some("CLIENTINFO ACTION CLIENTINFO SOURCE TIME VERSION".to_string()),
        "SOURCE" => Some("SOURCE https://github.com/markand/irccd".to_string()),
        "TIME" => Some(format!("TIME {}", chrono::Utc::now().to_rfc2822())),
        "VERSION" => Some(format!("VERSION {}", session.config.ctcp_version)),
        _ => None,
    };

    if let Some(reply) = reply {
        session.handle.notice(origin, &format!("\x01{reply}\x01")).await.ok();
    }
}

fn apply_user_modes(session: &mut ServerSession, mode: &str) {
    let mut adding = true;
    for c in mode.chars() {
        match c {
            '+' => adding = true,
            '-' => adding = false,
            c if adding => {
                session.user_modes.insert(c);
            }
            c => {
                session.user_modes.remove(&c);
            }
        }
    }
}

fn apply_channel_modes(session: &mut ServerSession, channel: &str, mode: &str, args: &[String]) {
    let mut adding = true;
    let mut arg_iter = args.iter();
    let prefixes = session.limits.prefixes.clone();
    let ch = session.channel_mut(channel);

    for c in mode.chars() {
        match c {
            '+' => adding = true,
            '-' => adding = false,
            // These always take an argument we don't otherwise use; consume
            // and discard it so later prefix-mode args stay aligned.
            'b' | 'k' | 'l' | 'e' | 'I' => {
                arg_iter.next();
            }
            c => {
                let Some(bit) = prefixes.bit_for_mode(c) else {
                    arg_iter.next();
                    continue;
                };
                let Some(target) = arg_iter.next() else {
                    continue;
                };
                if let Some(user) = ch.get(target) {
                    let mut modes = user.modes;
                    if adding {
                        modes |= 1 << bit;
                    } else {
                        modes &= !(1 << bit);
                    }
                    ch.set_modes(target, modes);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_prefix_command_and_trailing_param() {
        let msg = parse_line(":alice!a@h PRIVMSG #test :hello there").unwrap();
        assert_eq!(msg.prefix.as_deref(), Some("alice!a@h"));
        assert_eq!(msg.command, "PRIVMSG");
        assert_eq!(msg.params, vec!["#test".to_string(), "hello there".to_string()]);
    }

    #[test]
    fn parses_line_with_no_prefix() {
        let msg = parse_line("PING :token").unwrap();
        assert!(msg.prefix.is_none());
        assert_eq!(msg.command, "PING");
        assert_eq!(msg.params, vec!["token".to_string()]);
    }

    #[test]
    fn rejects_line_with_no_command() {
        assert_eq!(parse_line(""), Err(ParseError::NoCommand));
        assert_eq!(parse_line(":onlyprefix"), Err(ParseError::NoCommand));
    }

    #[test]
    fn nick_from_prefix_splits_at_bang() {
        assert_eq!(nick_from_prefix("alice!a@h"), "alice");
        assert_eq!(nick_from_prefix("irc.example.org"), "irc.example.org");
    }
}
