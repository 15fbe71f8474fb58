//! Push channel client
//!
//! A single actor task owns the link, the heartbeat interval and the
//! reconnect timer. `RealtimeClient` is a cheap handle that talks to the
//! actor over a command channel and reads shared observables.
//!
//! Commands are always handled before timer and socket branches, so once
//! `stop()` has been processed no heartbeat or reconnect can fire.

use std::future::{pending, Future};
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use backoff::backoff::{Backoff, Constant};
use backoff::ExponentialBackoff;
use futures_util::future::BoxFuture;
use futures_util::{SinkExt, StreamExt};
use parking_lot::RwLock;
use tokio::sync::{mpsc, watch};
use tokio::time::{interval_at, Instant, Interval, MissedTickBehavior, Sleep};
use tokio_tungstenite::tungstenite::{Error as WsError, Message as WsMessage};
use tracing::{debug, error, info, trace, warn};
use url::Url;

use crate::config::{RealtimeSettings, ReconnectStrategy};
use crate::error::{Error, Result};
use crate::protocol::{ControlFrame, EventTag, Inbound, ServerEvent};

use super::state::{ConnectionStats, LinkState};
use super::subscriptions::{invoke, Handlers, SubscriptionToken, Subscriptions};
use super::transport::{Connector, Link, TungsteniteConnector};

/// Upper bound for the close handshake during `stop()`
const CLOSE_TIMEOUT: Duration = Duration::from_secs(5);

/// Upper bound for writing a single pong or heartbeat frame
const SEND_TIMEOUT: Duration = Duration::from_secs(5);

// ─────────────────────────────────────────────────────────────────
// Command Channel
// ─────────────────────────────────────────────────────────────────

/// Control requests handled by the actor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Command {
    Start,
    Stop,
    Restart,
    Shutdown,
}

// ─────────────────────────────────────────────────────────────────
// Shared Observables
// ─────────────────────────────────────────────────────────────────

/// State read by handles and written by the actor
struct Shared {
    /// Reconnect policy. The handle flips it before queueing a command and
    /// the actor sets it again when the command runs.
    reconnect_enabled: AtomicBool,

    subscriptions: RwLock<Subscriptions>,

    stats: RwLock<ConnectionStats>,

    /// `client_id` announced by the server for the current link
    session_id: RwLock<Option<String>>,
}

// ─────────────────────────────────────────────────────────────────
// Realtime Client
// ─────────────────────────────────────────────────────────────────

/// Handle to a push channel connection.
///
/// Clones share the same connection. The actor stops and exits once
/// `shutdown()` is called or every clone has been dropped; a handler that
/// captures a clone keeps the actor alive until `shutdown()`.
#[derive(Clone)]
pub struct RealtimeClient {
    shared: Arc<Shared>,
    command_tx: mpsc::UnboundedSender<Command>,
    state_rx: watch::Receiver<LinkState>,
}

impl RealtimeClient {
    /// Spawn a client using the WebSocket transport.
    ///
    /// Must be called from within a tokio runtime.
    pub fn spawn(settings: RealtimeSettings, handlers: Handlers) -> Result<Self> {
        Self::with_connector(settings, handlers, TungsteniteConnector)
    }

    /// Spawn a client on top of a custom transport
    pub fn with_connector<C: Connector>(
        settings: RealtimeSettings,
        handlers: Handlers,
        connector: C,
    ) -> Result<Self> {
        settings.validate()?;
        let url = Url::parse(&settings.endpoint_url).map_err(|e| {
            Error::config_field_invalid("realtime.endpoint_url", e.to_string())
        })?;

        let shared = Arc::new(Shared {
            reconnect_enabled: AtomicBool::new(settings.auto_start),
            subscriptions: RwLock::new(handlers.into_subscriptions()),
            stats: RwLock::new(ConnectionStats::default()),
            session_id: RwLock::new(None),
        });

        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (state_tx, state_rx) = watch::channel(LinkState::Idle);

        let actor = Actor {
            backoff: reconnect_policy(&settings),
            url,
            settings,
            connector: Arc::new(connector),
            shared: Arc::clone(&shared),
            command_rx,
            state_tx,
            connecting: None,
            link: None,
            heartbeat: None,
            reconnect: None,
        };
        tokio::spawn(actor.run());

        Ok(Self {
            shared,
            command_tx,
            state_rx,
        })
    }

    /// Connect if no link is open or being established, re-enabling reconnects
    pub fn start(&self) {
        self.shared.reconnect_enabled.store(true, Ordering::SeqCst);
        self.send(Command::Start);
    }

    /// Close the link and cancel every pending reconnect and heartbeat
    pub fn stop(&self) {
        self.shared.reconnect_enabled.store(false, Ordering::SeqCst);
        self.send(Command::Stop);
    }

    /// Replace the current link with exactly one fresh connection attempt
    pub fn restart(&self) {
        self.send(Command::Restart);
    }

    /// Stop and terminate the actor task
    pub fn shutdown(&self) {
        self.shared.reconnect_enabled.store(false, Ordering::SeqCst);
        self.send(Command::Shutdown);
    }

    pub fn is_connected(&self) -> bool {
        self.state_rx.borrow().is_connected()
    }

    pub fn connection_state(&self) -> LinkState {
        *self.state_rx.borrow()
    }

    /// Receiver notified on every state transition
    pub fn watch_state(&self) -> watch::Receiver<LinkState> {
        self.state_rx.clone()
    }

    /// Wait until the link reaches `state`
    pub async fn wait_for_state(&self, state: LinkState) -> Result<LinkState> {
        let mut rx = self.state_rx.clone();
        let reached = rx
            .wait_for(|current| *current == state)
            .await
            .map_err(|_| Error::Internal("Realtime actor terminated".to_string()))?;
        Ok(*reached)
    }

    /// Install `handler` for `tag`, replacing the previous one.
    ///
    /// Returns `None` for `connected`, which is never dispatched.
    pub fn subscribe<F>(&self, tag: EventTag, handler: F) -> Option<SubscriptionToken>
    where
        F: Fn(&ServerEvent) + Send + Sync + 'static,
    {
        let token = self.shared.subscriptions.write().insert(tag, Arc::new(handler));
        if token.is_some() {
            debug!(tag = %tag, "Subscribed");
        }
        token
    }

    pub fn unsubscribe(&self, token: SubscriptionToken) -> bool {
        let removed = self.shared.subscriptions.write().remove(token);
        if removed {
            debug!(tag = %token.tag(), "Unsubscribed");
        }
        removed
    }

    pub fn stats(&self) -> ConnectionStats {
        self.shared.stats.read().clone()
    }

    pub fn session_id(&self) -> Option<String> {
        self.shared.session_id.read().clone()
    }

    fn send(&self, command: Command) {
        if self.command_tx.send(command).is_err() {
            debug!(command = ?command, "Realtime actor is gone, command dropped");
        }
    }
}

fn reconnect_policy(settings: &RealtimeSettings) -> Box<dyn Backoff + Send> {
    match settings.reconnect_strategy {
        ReconnectStrategy::Fixed => Box::new(Constant::new(settings.reconnect_delay())),
        ReconnectStrategy::Exponential => Box::new(ExponentialBackoff {
            current_interval: settings.reconnect_delay(),
            initial_interval: settings.reconnect_delay(),
            max_interval: settings.max_reconnect_delay(),
            max_elapsed_time: None, // Retry forever
            ..Default::default()
        }),
    }
}

// ─────────────────────────────────────────────────────────────────
// Actor
// ─────────────────────────────────────────────────────────────────

struct Actor<C: Connector> {
    url: Url,
    settings: RealtimeSettings,
    connector: Arc<C>,
    shared: Arc<Shared>,
    command_rx: mpsc::UnboundedReceiver<Command>,
    state_tx: watch::Sender<LinkState>,
    backoff: Box<dyn Backoff + Send>,

    /// In-flight connection attempt
    connecting: Option<BoxFuture<'static, Result<Link>>>,
    link: Option<Link>,
    heartbeat: Option<Interval>,
    reconnect: Option<Pin<Box<Sleep>>>,
}

impl<C: Connector> Actor<C> {
    async fn run(mut self) {
        debug!(url = %self.url, auto_start = self.settings.auto_start, "Realtime actor started");

        if self.settings.auto_start {
            self.start();
        }

        loop {
            tokio::select! {
                biased;

                command = self.command_rx.recv() => match command {
                    Some(Command::Start) => self.start(),
                    Some(Command::Stop) => self.stop().await,
                    Some(Command::Restart) => self.restart().await,
                    Some(Command::Shutdown) | None => {
                        self.stop().await;
                        break;
                    }
                },

                result = poll_slot(&mut self.connecting) => self.on_connect_result(result),

                frame = next_frame(&mut self.link) => self.on_frame(frame).await,

                _ = tick_slot(&mut self.heartbeat) => self.on_heartbeat().await,

                _ = poll_slot(&mut self.reconnect) => self.on_reconnect_timer(),
            }
        }

        info!("Realtime actor terminated");
    }

    fn set_state(&self, state: LinkState) {
        let previous = self.state_tx.send_replace(state);
        if previous != state {
            debug!(from = %previous, to = %state, "Link state changed");
        }
    }

    fn start(&mut self) {
        self.shared.reconnect_enabled.store(true, Ordering::SeqCst);
        if self.link.is_some() || self.connecting.is_some() {
            debug!("Start ignored, link already open or connecting");
            return;
        }
        self.reconnect = None;
        self.connect();
    }

    fn connect(&mut self) {
        let attempt = {
            let mut stats = self.shared.stats.write();
            stats.connect_attempts += 1;
            stats.connect_attempts
        };
        info!(url = %self.url, attempt = attempt, "Connecting to push endpoint");

        let connector = Arc::clone(&self.connector);
        let url = self.url.clone();
        let timeout = self.settings.connect_timeout();

        self.connecting = Some(Box::pin(async move {
            match tokio::time::timeout(timeout, connector.connect(&url)).await {
                Ok(result) => result,
                Err(_) => Err(Error::ConnectionTimeout {
                    url: url.to_string(),
                    timeout_ms: millis(timeout),
                }),
            }
        }));
        self.set_state(LinkState::Connecting);
    }

    fn on_connect_result(&mut self, result: Result<Link>) {
        self.connecting = None;

        match result {
            Ok(link) => {
                info!(url = %link.url, "Push channel open");
                self.link = Some(link);

                let period = self.settings.heartbeat_interval();
                let mut heartbeat = interval_at(Instant::now() + period, period);
                heartbeat.set_missed_tick_behavior(MissedTickBehavior::Delay);
                self.heartbeat = Some(heartbeat);

                self.backoff.reset();
                self.shared.stats.write().connections_opened += 1;
                self.set_state(LinkState::Open);
            }
            Err(e) => self.on_closed(e),
        }
    }

    async fn on_frame(&mut self, frame: Option<std::result::Result<WsMessage, WsError>>) {
        match frame {
            Some(Ok(WsMessage::Text(text))) => self.handle_text(&text),
            Some(Ok(WsMessage::Binary(data))) => match String::from_utf8(data) {
                Ok(text) => self.handle_text(&text),
                Err(e) => {
                    {
                        let mut stats = self.shared.stats.write();
                        stats.frames_received += 1;
                        stats.frames_dropped += 1;
                    }
                    warn!(
                        error = %Error::malformed(e.to_string()).format_for_log(),
                        "Dropping binary frame"
                    );
                }
            },
            Some(Ok(WsMessage::Ping(payload))) => {
                if let Some(link) = self.link.as_mut() {
                    let sent = send_frame(link, WsMessage::Pong(payload)).await;
                    if let Err(e) = sent {
                        self.on_closed(e);
                    }
                }
            }
            Some(Ok(WsMessage::Pong(_))) | Some(Ok(WsMessage::Frame(_))) => {}
            Some(Ok(WsMessage::Close(frame))) => {
                info!(frame = ?frame, "Server closed the push channel");
                self.on_closed(Error::connection_lost("closed by server"));
            }
            Some(Err(e)) => self.on_closed(Error::from(e)),
            None => self.on_closed(Error::connection_lost("stream ended")),
        }
    }

    fn handle_text(&mut self, text: &str) {
        self.shared.stats.write().frames_received += 1;

        match Inbound::parse(text) {
            Ok(Inbound::Event(ServerEvent::Connected(welcome))) => {
                let client_id = welcome.map(|info| info.client_id);
                info!(client_id = ?client_id, "Server acknowledged connection");
                *self.shared.session_id.write() = client_id;
            }
            Ok(Inbound::Event(event)) => {
                if event.is_raw() {
                    debug!(tag = %event.tag(), "Payload does not match its record type, delivering raw");
                }
                self.dispatch(&event)
            }
            Ok(Inbound::Pong) => trace!("Heartbeat acknowledged"),
            Ok(Inbound::UnknownEvent(name)) => debug!(event = %name, "Ignoring unknown event"),
            Ok(Inbound::Unrecognized(value)) => debug!(frame = %value, "Ignoring unrecognized frame"),
            Err(e) => {
                self.shared.stats.write().frames_dropped += 1;
                warn!(error = %e.format_for_log(), "Dropping malformed frame");
            }
        }
    }

    fn dispatch(&self, event: &ServerEvent) {
        let tag = event.tag();
        // The lock is released before the handler runs so it may resubscribe.
        let handler = self.shared.subscriptions.read().handler(tag);

        let Some(handler) = handler else {
            trace!(tag = %tag, "No subscriber");
            return;
        };

        match invoke(&handler, event) {
            Ok(()) => self.shared.stats.write().events_dispatched += 1,
            Err(e) => {
                self.shared.stats.write().handler_faults += 1;
                error!(tag = %tag, error = %e.format_for_log(), "Subscriber failed");
            }
        }
    }

    async fn on_heartbeat(&mut self) {
        let Some(link) = self.link.as_mut() else {
            return;
        };

        let ping = match ControlFrame::Ping.to_json() {
            Ok(ping) => ping,
            Err(e) => {
                error!(error = %e.format_for_log(), "Failed to encode ping");
                return;
            }
        };

        let sent = send_frame(link, WsMessage::Text(ping)).await;
        match sent {
            Ok(()) => {
                self.shared.stats.write().pings_sent += 1;
                trace!("Sent heartbeat");
            }
            Err(e) => self.on_closed(e),
        }
    }

    /// Tear down the current link and apply the reconnect policy
    fn on_closed(&mut self, reason: Error) {
        if reason.is_retryable() {
            warn!(error = %reason.format_for_log(), "Push channel down");
        } else {
            error!(error = %reason.format_for_log(), "Push channel down");
        }

        self.link = None;
        self.heartbeat = None;
        self.connecting = None;
        self.shared.session_id.write().take();

        if !self.shared.reconnect_enabled.load(Ordering::SeqCst) {
            self.set_state(LinkState::Idle);
            return;
        }

        match self.backoff.next_backoff() {
            Some(delay) => {
                info!(delay_ms = millis(delay), "Reconnecting after delay");
                self.reconnect = Some(Box::pin(tokio::time::sleep(delay)));
                self.shared.stats.write().reconnects_scheduled += 1;
                self.set_state(LinkState::Backoff);
            }
            None => {
                warn!("Reconnect policy exhausted");
                self.set_state(LinkState::Idle);
            }
        }
    }

    fn on_reconnect_timer(&mut self) {
        self.reconnect = None;
        if self.shared.reconnect_enabled.load(Ordering::SeqCst) {
            self.connect();
        } else {
            self.set_state(LinkState::Idle);
        }
    }

    async fn stop(&mut self) {
        self.shared.reconnect_enabled.store(false, Ordering::SeqCst);
        self.reconnect = None;
        self.heartbeat = None;
        self.connecting = None;

        if let Some(mut link) = self.link.take() {
            self.set_state(LinkState::Closing);
            match tokio::time::timeout(CLOSE_TIMEOUT, link.sink.close()).await {
                Ok(Ok(())) => debug!("Close handshake sent"),
                Ok(Err(e)) => debug!(error = %e, "Close handshake failed"),
                Err(_) => debug!("Close handshake timed out"),
            }
            info!(url = %link.url, "Push channel closed");
        }

        self.shared.session_id.write().take();
        self.set_state(LinkState::Idle);
    }

    async fn restart(&mut self) {
        info!("Restarting push channel");
        self.stop().await;
        self.start();
    }
}

/// Write one frame to `link`, treating a stalled peer as a lost connection
async fn send_frame(link: &mut Link, frame: WsMessage) -> Result<()> {
    match tokio::time::timeout(SEND_TIMEOUT, link.sink.send(frame)).await {
        Ok(sent) => sent.map_err(Error::from),
        Err(_) => Err(Error::connection_lost(format!(
            "send timed out after {}ms",
            millis(SEND_TIMEOUT)
        ))),
    }
}

fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

// ─────────────────────────────────────────────────────────────────
// Optional select! branches
// ─────────────────────────────────────────────────────────────────

async fn poll_slot<F: Future + Unpin>(slot: &mut Option<F>) -> F::Output {
    match slot {
        Some(fut) => fut.await,
        None => pending().await,
    }
}

async fn tick_slot(slot: &mut Option<Interval>) {
    match slot {
        Some(interval) => {
            interval.tick().await;
        }
        None => pending().await,
    }
}

async fn next_frame(link: &mut Option<Link>) -> Option<std::result::Result<WsMessage, WsError>> {
    match link {
        Some(link) => link.stream.next().await,
        None => pending().await,
    }
}

// ─────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────
