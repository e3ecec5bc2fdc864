//! Async connection runner.
//!
//! [`Client::connect`] spawns one task that owns the [`Transport`] and
//! drives the shared [`Engine`]: it reads inbound lines, flushes the
//! engine's outbound queue, and runs the auto-reconnect timer. Those are
//! the only three suspension points; parsing, dispatch, and projection
//! updates all happen synchronously while the engine lock is held, so
//! effects apply in arrival order and events leave in the same order.
//!
//! The cloneable [`Client`] handle locks the same engine to issue
//! commands — which is how facade validation stays synchronous — and
//! wakes the writer through a [`Notify`] when it queues output.

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::sync::Notify;
use tracing::{debug, warn};

use crate::engine::{ConnectionState, Engine, SessionConfig};
use crate::error::ClientError;
use crate::event::Event;
use crate::transport::{ServerAddr, Transport, TransportWriter};

/// Seconds between reconnect attempts.
pub const RECONNECT_SECS: u64 = 10;

/// Everything needed to run one connection.
#[derive(Clone, Debug)]
pub struct ClientConfig {
    /// Where to connect.
    pub addr: ServerAddr,
    /// Identity and CTCP behavior.
    pub session: SessionConfig,
    /// Reconnect automatically after an unexpected disconnect.
    pub auto_reconnect: bool,
}

fn lock_engine(engine: &Arc<Mutex<Engine>>) -> MutexGuard<'_, Engine> {
    engine
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Handle to a running connection.
///
/// Cloneable; all clones drive the same engine. Methods delegate to the
/// engine under its lock, so validation errors come back synchronously
/// exactly as they do on [`Engine`] itself.
#[derive(Clone)]
pub struct Client {
    engine: Arc<Mutex<Engine>>,
    outbound_ready: Arc<Notify>,
    events: mpsc::UnboundedSender<Event>,
}

impl Client {
    /// Start a connection task. Returns the handle and the event stream.
    pub fn connect(
        config: ClientConfig,
    ) -> Result<(Client, mpsc::UnboundedReceiver<Event>), ClientError> {
        let engine = Engine::new(config.session.clone())?;
        let engine = Arc::new(Mutex::new(engine));
        let outbound_ready = Arc::new(Notify::new());
        let (event_tx, event_rx) = mpsc::unbounded_channel();

        let client = Client {
            engine: Arc::clone(&engine),
            outbound_ready: Arc::clone(&outbound_ready),
            events: event_tx.clone(),
        };

        tokio::spawn(run_connection(config, engine, outbound_ready, event_tx));

        Ok((client, event_rx))
    }

    /// Run `f` against the engine under the lock and wake the writer.
    ///
    /// This is the generic escape hatch; the named wrappers below cover
    /// the common commands.
    pub fn with_engine<R>(&self, f: impl FnOnce(&mut Engine) -> R) -> R {
        let result = f(&mut lock_engine(&self.engine));
        self.after_command();
        result
    }

    fn after_command(&self) {
        let events = lock_engine(&self.engine).drain_events();
        for event in events {
            let _ = self.events.send(event);
        }
        self.outbound_ready.notify_one();
    }

    /// Current connection state.
    pub fn state(&self) -> ConnectionState {
        lock_engine(&self.engine).state()
    }

    /// Current nickname.
    pub fn nickname(&self) -> String {
        lock_engine(&self.engine).nickname().to_string()
    }

    /// Join a channel.
    pub fn join(&self, channel: &str, key: Option<&str>) -> Result<(), ClientError> {
        self.with_engine(|e| e.join(channel, key))
    }

    /// Leave a channel.
    pub fn part(&self, channel: &str, reason: Option<&str>) -> Result<(), ClientError> {
        self.with_engine(|e| e.part(channel, reason))
    }

    /// Send a PRIVMSG.
    pub fn privmsg(&self, target: &str, text: &str) -> Result<(), ClientError> {
        self.with_engine(|e| e.privmsg(target, text))
    }

    /// Send a NOTICE.
    pub fn notice(&self, target: &str, text: &str) -> Result<(), ClientError> {
        self.with_engine(|e| e.notice(target, text))
    }

    /// Send an emote.
    pub fn action(&self, target: &str, text: &str) -> Result<(), ClientError> {
        self.with_engine(|e| e.action(target, text))
    }

    /// Change nick.
    pub fn nick(&self, new_nick: &str) -> Result<(), ClientError> {
        self.with_engine(|e| e.nick(new_nick))
    }

    /// Quit and stop reconnecting.
    pub fn quit(&self, reason: Option<&str>) {
        self.with_engine(|e| e.quit(reason));
    }
}

async fn run_connection(
    config: ClientConfig,
    engine: Arc<Mutex<Engine>>,
    outbound_ready: Arc<Notify>,
    event_tx: mpsc::UnboundedSender<Event>,
) {
    'reconnect: loop {
        lock_engine(&engine).on_connecting();
        pump_events(&engine, &event_tx);

        let transport = match Transport::connect(&config.addr).await {
            Ok(t) => t,
            Err(e) => {
                warn!(
                    "connect to {}:{} failed: {}",
                    config.addr.host, config.addr.port, e
                );
                lock_engine(&engine).on_transport_closed();
                pump_events(&engine, &event_tx);
                if !config.auto_reconnect || !lock_engine(&engine).wants_reconnect() {
                    return;
                }
                tokio::time::sleep(Duration::from_secs(RECONNECT_SECS)).await;
                continue 'reconnect;
            }
        };

        let (mut reader, mut writer) = transport.split();

        lock_engine(&engine).on_transport_connected();
        pump_events(&engine, &event_tx);
        let mut link_ok = flush_outbound(&engine, &mut writer).await;

        // Steady state: wait on inbound lines or queued outbound.
        while link_ok {
            tokio::select! {
                read = reader.read_line() => {
                    match read {
                        Ok(Some(line)) => {
                            if !line.is_empty() {
                                lock_engine(&engine).handle_line(&line);
                            }
                            pump_events(&engine, &event_tx);
                            link_ok = flush_outbound(&engine, &mut writer).await;
                        }
                        Ok(None) => {
                            debug!("server closed the connection");
                            break;
                        }
                        Err(e) => {
                            warn!("transport read error: {:?}", e);
                            break;
                        }
                    }
                }
                _ = outbound_ready.notified() => {
                    // A failed write while quitting is swallowed; the
                    // close below proceeds regardless.
                    link_ok = flush_outbound(&engine, &mut writer).await;
                    if lock_engine(&engine).quit_requested {
                        break;
                    }
                }
            }
        }

        drop(reader);
        drop(writer);
        lock_engine(&engine).on_transport_closed();
        pump_events(&engine, &event_tx);

        if !config.auto_reconnect || !lock_engine(&engine).wants_reconnect() {
            return;
        }
        tokio::time::sleep(Duration::from_secs(RECONNECT_SECS)).await;
    }
}

fn pump_events(engine: &Arc<Mutex<Engine>>, event_tx: &mpsc::UnboundedSender<Event>) {
    let events = lock_engine(engine).drain_events();
    for event in events {
        let _ = event_tx.send(event);
    }
}

/// Write every queued line; `false` means the link is dead.
async fn flush_outbound(engine: &Arc<Mutex<Engine>>, writer: &mut TransportWriter) -> bool {
    loop {
        let line = lock_engine(engine).take_outbound();
        let Some(line) = line else {
            return true;
        };
        if let Err(e) = writer.write_line(&line).await {
            warn!("transport write error: {}", e);
            return false;
        }
    }
}
