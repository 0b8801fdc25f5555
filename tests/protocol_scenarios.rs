//! Protocol-level scenarios driven directly through the line parser against
//! a constructed session, without a live socket. Covers spec.md §8's
//! join-on-invite and names-roll-up properties.

use irccd::config::ServerConfig;
use irccd::event::EventKind;
use irccd::parser::handle_line;
use irccd::server::ServerSession;

fn server_config() -> ServerConfig {
    ServerConfig {
        name: "libera".to_string(),
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
async fn invite_line_yields_event_with_origin_channel_and_target() {
    let mut session = ServerSession::new(server_config());

    let event = handle_line(&mut session, ":alice!a@h INVITE bot #secret").await.unwrap();

    match event.kind {
        EventKind::Invite { origin, channel, target } => {
            assert_eq!(origin, "alice");
            assert_eq!(channel, "#secret");
            assert_eq!(target, "bot");
        }
        other => panic!("expected Invite, got {other:?}"),
    }
}

#[tokio::test]
async fn names_roll_up_into_mode_bits_from_prefix_table() {
    let mut session = ServerSession::new(server_config());

    // ISUPPORT advertises op/voice prefixes before any NAMES reply.
    handle_line(&mut session, ":srv 005 bot PREFIX=(ov)@+ CHANTYPES=# :are supported by this server").await;

    handle_line(&mut session, ":srv 353 bot = #test :@alice +bob carol").await;
    let event = handle_line(&mut session, ":srv 366 bot #test :End of /NAMES list.").await.unwrap();

    let EventKind::Names { channel, mut names } = event.kind else {
        panic!("expected Names event");
    };
    names.sort();
    assert_eq!(channel, "#test");
    assert_eq!(names, vec!["alice".to_string(), "bob".to_string(), "carol".to_string()]);

    let op_bit = session.limits.prefixes.bit_for_mode('o').unwrap();
    let voice_bit = session.limits.prefixes.bit_for_mode('v').unwrap();
    let ch = session.channels.get("#test").unwrap();
    assert!(ch.get("alice").unwrap().has_mode(1 << op_bit));
    assert!(ch.get("bob").unwrap().has_mode(1 << voice_bit));
    assert_eq!(ch.get("carol").unwrap().modes, 0);
}
