//! The administration line protocol: a plain-text `TcpListener` for local
//! operators to drive sessions without going through IRC.
//!
//! Grounded on the teacher's `tokio::select!`-based shutdown pattern in
//! `main.rs` for the listener task shape; the line commands themselves
//! (`MESSAGE`/`ME`/`NOTICE`/`MODE`/`INVITE`/`JOIN`/`KICK`/`PART`/`TOPIC`) and
//! their `OK`/error-string reply convention are grounded on
//! `original_source/irccd/transport.c`'s JSON-free predecessor described in
//! spec.md §6.2.

use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpListener;
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::bot::Bot;

pub async fn serve(address: &str, port: u16, bot: Arc<Mutex<Bot>>) -> std::io::Result<()> {
    let listener = TcpListener::bind((address, port)).await?;
    info!(address, port, "admin interface listening");

    loop {
        let (socket, peer) = listener.accept().await?;
        let bot = bot.clone();
        tokio::spawn(async move {
            if let Err(e) = handle_connection(socket, bot).await {
                warn!(%peer, error = %e, "admin connection error");
            }
        });
    }
}

async fn handle_connection(socket: tokio::net::TcpStream, bot: Arc<Mutex<Bot>>) -> std::io::Result<()> {
    let (read_half, mut write_half) = socket.into_split();
    let mut reader = BufReader::new(read_half);
    let mut line = String::new();

    loop {
        line.clear();
        if reader.read_line(&mut line).await? == 0 {
            return Ok(());
        }

        let reply = handle_command(line.trim_end(), &bot).await;
        write_half.write_all(reply.as_bytes()).await?;
        write_half.write_all(b"\n").await?;
    }
}

async fn handle_command(line: &str, bot: &Arc<Mutex<Bot>>) -> String {
    let mut parts = line.split_whitespace();
    let Some(verb) = parts.next() else {
        return "ERROR empty command".to_string();
    };
    let args: Vec<&str> = parts.collect();

    let bot = bot.lock().await;
    let Some(server_id) = args.first() else {
        return "ERROR missing server id".to_string();
    };
    let Some(server) = bot.server_get(server_id) else {
        return format!("ERROR server {server_id} not found");
    };

    let result = match (verb, args.as_slice()) {
        ("MESSAGE", [_, target, rest @ ..]) => server.message(target, &rest.join(" ")).await,
        ("ME", [_, target, rest @ ..]) => server.me(target, &rest.join(" ")).await,
        ("NOTICE", [_, target, rest @ ..]) => server.notice(target, &rest.join(" ")).await,
        ("INVITE", [_, channel, target]) => server.invite(channel, target).await,
        ("JOIN", [_, channel]) => server.join(channel, None).await,
        ("JOIN", [_, channel, password]) => server.join(channel, Some(password)).await,
        ("KICK", [_, channel, target, rest @ ..]) => {
            let reason = (!rest.is_empty()).then(|| rest.join(" "));
            server.kick(channel, target, reason.as_deref()).await
        }
        ("PART", [_, channel, rest @ ..]) => {
            let reason = (!rest.is_empty()).then(|| rest.join(" "));
            server.part(channel, reason.as_deref()).await
        }
        ("TOPIC", [_, channel, rest @ ..]) => server.topic(channel, &rest.join(" ")).await,
        ("MODE", [_, channel, mode, rest @ ..]) => server.mode(channel, mode, &rest.join(" ")).await,
        _ => return format!("ERROR unknown command {verb}"),
    };

    match result {
        Ok(()) => "OK".to_string(),
        Err(e) => format!("ERROR {e}"),
    }
}
