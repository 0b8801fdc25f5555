//! Per-server connection state machine.
//!
//! Grounded on `irc_client.rs`'s `IrcClient::run`/`run_with_reconnect` for
//! the overall task shape (one task per server, reconnect loop around a
//! fallible connect-and-serve attempt) and on
//! `original_source/lib/irccd/server.c`/`server.h` for the wire-level state
//! machine and reconnect/watchdog timing constants named in spec.md §4.1.

mod buffers;
mod transport;

pub use buffers::{InputBuffer, OutputBuffer};
pub use transport::Transport;

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, Mutex, Notify};
use tokio::time::timeout;
use tracing::{debug, info, warn};

use crate::channel::Channel;
use crate::config::ServerConfig;
use crate::error::{ConnError, SendError};
use crate::event::{Event, EventKind};
use crate::isupport::ServerLimits;
use crate::parser;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
const RECONNECT_DELAY: Duration = Duration::from_secs(30);
const INACTIVITY_TIMEOUT: Duration = Duration::from_secs(60);
const PING_TIMEOUT: Duration = Duration::from_secs(300);

/// Lifecycle state of a server session, matching spec.md §4.1's linear
/// `Resolve -> Connect -> Ident -> Ready` machine with a reconnect edge back
/// to `Resolve` from any state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum SessionState {
    Resolve = 0,
    Connect = 1,
    Ident = 2,
    Ready = 3,
}

impl SessionState {
    fn from_u8(v: u8) -> Self {
        match v {
            0 => SessionState::Resolve,
            1 => SessionState::Connect,
            2 => SessionState::Ident,
            _ => SessionState::Ready,
        }
    }
}

/// The cheaply-clonable, cross-task handle plugins and hooks use to talk to
/// a session. The socket itself and all channel/whois bookkeeping stay owned
/// by the connection task in [`ServerSession`]; only the output buffer is
/// shared, guarded by a plain mutex that is never held across an `await`.
#[derive(Debug)]
pub struct ServerHandle {
    pub name: String,
    pub command_char: String,
    state: AtomicU8,
    out: Mutex<OutputBuffer>,
    wake: Notify,
}

impl ServerHandle {
    fn new(name: String, command_char: String) -> Arc<Self> {
        Arc::new(Self {
            name,
            command_char,
            state: AtomicU8::new(SessionState::Resolve as u8),
            out: Mutex::new(OutputBuffer::new()),
            wake: Notify::new(),
        })
    }

    pub fn state(&self) -> SessionState {
        SessionState::from_u8(self.state.load(Ordering::Acquire))
    }

    fn set_state(&self, state: SessionState) {
        self.state.store(state as u8, Ordering::Release);
    }

    /// Append a raw line to the output buffer, waking the connection task's
    /// writer. Returns immediately; the actual socket write happens
    /// asynchronously on the connection task.
    pub async fn raw(&self, line: &str) -> Result<(), SendError> {
        if self.state() != SessionState::Ready {
            return Err(SendError::NotConnected);
        }
        let mut out = self.out.lock().await;
        out.push_line(line)?;
        drop(out);
        self.wake.notify_one();
        Ok(())
    }

    pub async fn message(&self, target: &str, text: &str) -> Result<(), SendError> {
        self.raw(&format!("PRIVMSG {target} :{text}")).await
    }

    pub async fn me(&self, target: &str, text: &str) -> Result<(), SendError> {
        self.raw(&format!("PRIVMSG {target} :\x01ACTION {text}\x01")).await
    }

    pub async fn notice(&self, target: &str, text: &str) -> Result<(), SendError> {
        self.raw(&format!("NOTICE {target} :{text}")).await
    }

    pub async fn join(&self, channel: &str, password: Option<&str>) -> Result<(), SendError> {
        match password {
            Some(pass) => self.raw(&format!("JOIN {channel} {pass}")).await,
            None => self.raw(&format!("JOIN {channel}")).await,
        }
    }

    pub async fn part(&self, channel: &str, reason: Option<&str>) -> Result<(), SendError> {
        match reason {
            Some(reason) => self.raw(&format!("PART {channel} :{reason}")).await,
            None => self.raw(&format!("PART {channel}")).await,
        }
    }

    pub async fn kick(&self, channel: &str, target: &str, reason: Option<&str>) -> Result<(), SendError> {
        match reason {
            Some(reason) => self.raw(&format!("KICK {channel} {target} :{reason}")).await,
            None => self.raw(&format!("KICK {channel} {target}")).await,
        }
    }

    pub async fn topic(&self, channel: &str, topic: &str) -> Result<(), SendError> {
        self.raw(&format!("TOPIC {channel} :{topic}")).await
    }

    pub async fn invite(&self, channel: &str, target: &str) -> Result<(), SendError> {
        self.raw(&format!("INVITE {target} {channel}")).await
    }

    pub async fn mode(&self, channel: &str, mode: &str, args: &str) -> Result<(), SendError> {
        if args.is_empty() {
            self.raw(&format!("MODE {channel} {mode}")).await
        } else {
            self.raw(&format!("MODE {channel} {mode} {args}")).await
        }
    }

    pub async fn whois(&self, target: &str) -> Result<(), SendError> {
        self.raw(&format!("WHOIS {target}")).await
    }

    pub async fn names(&self, channel: &str) -> Result<(), SendError> {
        self.raw(&format!("NAMES {channel}")).await
    }
}

/// A builder accumulating a multi-line `WHOIS` reply (311/319/318) before it
/// is flushed as a single [`crate::event::EventKind::Whois`].
#[derive(Debug, Default)]
struct WhoisBuilder {
    nickname: String,
    username: String,
    hostname: String,
    realname: String,
    channels: Vec<String>,
}

/// Connection-task-owned session state: channels, ISUPPORT limits, own-user
/// modes, in-flight WHOIS accumulation. Not shared across tasks; only
/// touched from the connection task that owns the socket.
pub struct ServerSession {
    pub config: ServerConfig,
    pub handle: Arc<ServerHandle>,
    pub nickname: String,
    pub channels: HashMap<String, Channel>,
    pub limits: ServerLimits,
    pub user_modes: HashSet<char>,
    whois: Option<WhoisBuilder>,
}

impl ServerSession {
    pub fn new(config: ServerConfig) -> Self {
        let handle = ServerHandle::new(config.name.clone(), config.command_char.clone());
        let nickname = config.nickname.clone();
        Self {
            config,
            handle,
            nickname,
            channels: HashMap::new(),
            limits: ServerLimits::default(),
            user_modes: HashSet::new(),
            whois: None,
        }
    }

    pub(crate) fn channel_mut(&mut self, name: &str) -> &mut Channel {
        self.channels
            .entry(name.to_ascii_lowercase())
            .or_insert_with(|| Channel::new(name, None))
    }

    pub(crate) fn begin_whois(&mut self, nickname: &str, username: &str, hostname: &str, realname: &str) {
        self.whois = Some(WhoisBuilder {
            nickname: nickname.to_string(),
            username: username.to_string(),
            hostname: hostname.to_string(),
            realname: realname.to_string(),
            channels: Vec::new(),
        });
    }

    pub(crate) fn add_whois_channels(&mut self, names: &str) {
        if let Some(w) = &mut self.whois {
            w.channels.extend(names.split_whitespace().map(|s| s.to_string()));
        }
    }

    pub(crate) fn take_whois(&mut self) -> Option<EventKind> {
        self.whois.take().map(|w| EventKind::Whois {
            nickname: w.nickname,
            username: w.username,
            hostname: w.hostname,
            realname: w.realname,
            channels: w.channels,
        })
    }
}

/// Spawn the connection task for `config`, returning the handle immediately
/// (in [`SessionState::Resolve`]) while resolution/connection happen in the
/// background.
pub fn spawn(config: ServerConfig, events_tx: mpsc::UnboundedSender<Event>) -> Arc<ServerHandle> {
    let mut session = ServerSession::new(config);
    let handle = session.handle.clone();
    tokio::spawn(async move {
        run_forever(&mut session, events_tx).await;
    });
    handle
}

async fn run_forever(session: &mut ServerSession, events_tx: mpsc::UnboundedSender<Event>) {
    loop {
        session.handle.set_state(SessionState::Resolve);
        match connect_and_serve(session, &events_tx).await {
            Ok(()) => info!(server = %session.config.name, "connection closed"),
            Err(e) => warn!(server = %session.config.name, error = %e, "connection attempt failed"),
        }

        let _ = events_tx.send(Event::new(session.handle.clone(), EventKind::Disconnect));

        if !session.config.auto_reconnect {
            return;
        }

        debug!(server = %session.config.name, delay = ?RECONNECT_DELAY, "reconnecting");
        tokio::time::sleep(RECONNECT_DELAY).await;
    }
}

async fn resolve_and_connect(session: &ServerSession) -> Result<TcpStream, ConnError> {
    session.handle.set_state(SessionState::Connect);

    let target = format!("{}:{}", session.config.hostname, session.config.port);
    let addrs: Vec<_> = tokio::net::lookup_host(&target)
        .await
        .map_err(|source| ConnError::Resolve {
            host: session.config.hostname.clone(),
            source,
        })?
        .collect();

    if addrs.is_empty() {
        return Err(ConnError::NoEndpoints {
            host: session.config.hostname.clone(),
        });
    }

    let mut last_err = None;
    for addr in addrs {
        match timeout(CONNECT_TIMEOUT, TcpStream::connect(addr)).await {
            Ok(Ok(stream)) => return Ok(stream),
            Ok(Err(e)) => last_err = Some(ConnError::Connect { addr, source: e }),
            Err(_) => last_err = Some(ConnError::Timeout(CONNECT_TIMEOUT)),
        }
    }

    Err(last_err.unwrap_or(ConnError::NoEndpoints {
        host: session.config.hostname.clone(),
    }))
}

async fn wrap_tls(session: &ServerSession, stream: TcpStream) -> Result<Transport, ConnError> {
    if !session.config.tls {
        return Ok(Transport::Plain(stream));
    }

    let mut roots = tokio_rustls::rustls::RootCertStore::empty();
    for cert in rustls_native_certs::load_native_certs().map_err(|e| ConnError::Tls(e.to_string()))? {
        let _ = roots.add(cert);
    }
    let client_config = tokio_rustls::rustls::ClientConfig::builder()
        .with_root_certificates(roots)
        .with_no_client_auth();
    let connector = tokio_rustls::TlsConnector::from(Arc::new(client_config));
    let server_name = tokio_rustls::rustls::pki_types::ServerName::try_from(session.config.hostname.clone())
        .map_err(|e| ConnError::Tls(e.to_string()))?;

    let tls_stream = connector
        .connect(server_name, stream)
        .await
        .map_err(|e| ConnError::Tls(e.to_string()))?;

    Ok(Transport::Tls(Box::new(tls_stream)))
}

async fn connect_and_serve(session: &mut ServerSession, events_tx: &mpsc::UnboundedSender<Event>) -> Result<(), ConnError> {
    let tcp = resolve_and_connect(session).await?;
    let mut transport = wrap_tls(session, tcp).await?;

    session.handle.set_state(SessionState::Ident);
    ident(session, &mut transport).await?;

    session.handle.set_state(SessionState::Ready);
    info!(server = %session.config.name, "registered, awaiting welcome");

    serve(session, &mut transport, events_tx).await
}

async fn write_line(transport: &mut Transport, line: &str) -> Result<(), ConnError> {
    transport.write_all(line.as_bytes()).await?;
    transport.write_all(b"\r\n").await?;
    Ok(())
}

async fn ident(session: &ServerSession, transport: &mut Transport) -> Result<(), ConnError> {
    write_line(transport, "CAP REQ :multi-prefix").await?;
    if let Some(password) = &session.config.password {
        write_line(transport, &format!("PASS {password}")).await?;
    }
    write_line(transport, &format!("NICK {}", session.config.nickname)).await?;
    write_line(
        transport,
        &format!("USER {} 0 * :{}", session.config.username, session.config.realname),
    )
    .await?;
    write_line(transport, "CAP END").await?;
    Ok(())
}

async fn serve(session: &mut ServerSession, transport: &mut Transport, events_tx: &mpsc::UnboundedSender<Event>) -> Result<(), ConnError> {
    let mut input = InputBuffer::new();
    let mut read_buf = [0u8; 4096];
    let mut lines = Vec::new();

    loop {
        tokio::select! {
            result = timeout(INACTIVITY_TIMEOUT, transport.read(&mut read_buf)) => {
                let n = match result {
                    Ok(Ok(0)) => return Ok(()),
                    Ok(Ok(n)) => n,
                    Ok(Err(e)) => return Err(ConnError::Io(e)),
                    Err(_) => {
                        warn!(server = %session.config.name, "inactivity timeout, pinging");
                        session.handle.raw(&format!("PING :{}", session.config.hostname)).await.ok();
                        continue;
                    }
                };

                lines.clear();
                if input.feed(&read_buf[..n], &mut lines).is_err() {
                    return Err(ConnError::Io(std::io::Error::new(std::io::ErrorKind::InvalidData, "input buffer overflow")));
                }

                for line in &lines {
                    if let Some(event) = parser::handle_line(session, line).await {
                        let _ = events_tx.send(event);
                    }
                }
            }

            _ = session.handle.wake.notified() => {}

            _ = tokio::time::sleep(PING_TIMEOUT) => {
                return Err(ConnError::Timeout(PING_TIMEOUT));
            }
        }

        flush_output(session, transport).await?;
    }
}

async fn flush_output(session: &ServerSession, transport: &mut Transport) -> Result<(), ConnError> {
    let bytes = {
        let out = session.handle.out.lock().await;
        if out.is_empty() {
            return Ok(());
        }
        out.as_bytes().to_vec()
    };
    transport.write_all(&bytes).await?;
    session.handle.out.lock().await.consume(bytes.len());
    Ok(())
}
