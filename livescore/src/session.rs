//! Session controller for one live match
//!
//! A [`Session`] owns all per-match state: the player registry, the assist
//! correlator, the latest scoreboard and the handler registry. Nothing is
//! shared between sessions. The transport feeds it [`TransportEvent`]s and
//! receives [`OutboundMessage`]s through a channel; everything in between is
//! decoded, correlated and published to the registered handlers.
//!
//! ## Lifecycle
//! `Disconnected -> Connecting -> Connected`. The connect acknowledgment
//! flushes any kill still waiting, resets the registry and correlator (ids
//! are only unique within one session), sends the `readyForMatch` handshake and publishes `Connect`.
//! A disconnect flushes every kill still waiting for its assist, without
//! an assister, then publishes `Disconnect`.

use crate::config::LivescoreConfig;
use crate::correlator::{AssistCorrelator, CorrelatorStats};
use crate::decoder::{Frame, FrameDecoder, LogEvent};
use crate::dispatcher::{Event, EventDispatcher, EventKind};
use crate::error::{ConfigError, DecodeError, DispatchError, HandlerError, TransportError};
use crate::registry::PlayerRegistry;
use crate::scoreboard::ScoreboardBuilder;
use log::{debug, error, info, warn};
use serde_json::{json, Value};
use shared::{Kill, Scoreboard};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::time::{sleep_until, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
}

/// Messages delivered by the transport.
#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    Connected,
    /// Text of a `log` message
    Log(String),
    /// Payload of a `scoreboard` message
    Scoreboard(Value),
    Disconnected,
}

impl TransportEvent {
    /// Parses one Socket.IO style line such as `["log", "{...}"]`.
    ///
    /// Socket events the session has no use for (`time`, `clock`, ...) yield `None`.
    pub fn from_socketio(line: &str) -> Result<Option<Self>, DecodeError> {
        let value: Value = serde_json::from_str(line).map_err(DecodeError::InvalidJson)?;
        let mut parts = match value {
            Value::Array(parts) if !parts.is_empty() => parts.into_iter(),
            other => return Err(DecodeError::UnexpectedMessage(other.to_string())),
        };

        let name = match parts.next() {
            Some(Value::String(name)) => name,
            other => {
                return Err(DecodeError::UnexpectedMessage(format!("{:?}", other)));
            }
        };
        let data = parts.next().unwrap_or(Value::Null);

        let event = match name.as_str() {
            "connect" => TransportEvent::Connected,
            "disconnect" => TransportEvent::Disconnected,
            "log" => match data {
                Value::String(text) => TransportEvent::Log(text),
                other => TransportEvent::Log(other.to_string()),
            },
            "scoreboard" => TransportEvent::Scoreboard(data),
            other => {
                debug!("Ignoring socket event '{}'", other);
                return Ok(None);
            }
        };

        Ok(Some(event))
    }
}

/// Messages the session asks the transport to send.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutboundMessage {
    ReadyForMatch { list_id: u64 },
}

impl OutboundMessage {
    pub fn event_name(&self) -> &'static str {
        match self {
            OutboundMessage::ReadyForMatch { .. } => "readyForMatch",
        }
    }

    /// Message data, JSON encoded as the scorebot expects it.
    pub fn payload(&self) -> String {
        match self {
            OutboundMessage::ReadyForMatch { list_id } => json!({ "listId": list_id }).to_string(),
        }
    }

    pub fn to_socketio(&self) -> String {
        json!([self.event_name(), self.payload()]).to_string()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SessionStats {
    pub frames: u64,
    pub decode_failures: u64,
    pub snapshots: u64,
    pub rejected_snapshots: u64,
    pub playback_batches: u64,
    pub events_published: u64,
    pub handler_failures: u64,
    pub correlation: CorrelatorStats,
}

pub struct Session {
    config: LivescoreConfig,
    state: ConnectionState,
    registry: Arc<PlayerRegistry>,
    decoder: FrameDecoder,
    builder: ScoreboardBuilder,
    correlator: AssistCorrelator,
    dispatcher: EventDispatcher,
    outbound: mpsc::UnboundedSender<OutboundMessage>,
    scoreboard: Option<Arc<Scoreboard>>,
    stats: SessionStats,
}

impl Session {
    pub fn new(
        config: LivescoreConfig,
        outbound: mpsc::UnboundedSender<OutboundMessage>,
    ) -> Result<Self, ConfigError> {
        config.validate()?;

        let registry = Arc::new(PlayerRegistry::new());

        Ok(Self {
            decoder: FrameDecoder::new(Arc::clone(&registry)),
            builder: ScoreboardBuilder::new(Arc::clone(&registry)),
            correlator: AssistCorrelator::new(config.assist_window),
            registry,
            config,
            state: ConnectionState::Disconnected,
            dispatcher: EventDispatcher::new(),
            outbound,
            scoreboard: None,
            stats: SessionStats::default(),
        })
    }

    /// Registers a handler for one event kind.
    pub fn on<F>(&mut self, kind: EventKind, handler: F) -> Result<(), DispatchError>
    where
        F: FnMut(&Event) -> Result<(), HandlerError> + Send + 'static,
    {
        self.dispatcher.on(kind, handler)
    }

    pub fn dispatcher_mut(&mut self) -> &mut EventDispatcher {
        &mut self.dispatcher
    }

    pub fn config(&self) -> &LivescoreConfig {
        &self.config
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Registry handle for resolving players outside the event flow.
    pub fn registry(&self) -> Arc<PlayerRegistry> {
        Arc::clone(&self.registry)
    }

    /// Latest accepted scoreboard.
    pub fn scoreboard(&self) -> Option<Arc<Scoreboard>> {
        self.scoreboard.clone()
    }

    pub fn stats(&self) -> SessionStats {
        SessionStats {
            correlation: self.correlator.stats(),
            handler_failures: self.dispatcher.failures(),
            ..self.stats
        }
    }

    /// Marks the session as waiting for the transport's connect acknowledgment.
    pub fn connect(&mut self) {
        if self.state == ConnectionState::Disconnected {
            info!(
                "Connecting to {} for match {:?}",
                self.config.socket_uri, self.config.list_id
            );
            self.state = ConnectionState::Connecting;
        }
    }

    /// Earliest instant at which [`poll_timers`](Self::poll_timers) has work.
    pub fn next_deadline(&self) -> Option<Instant> {
        self.correlator.next_deadline()
    }

    /// Publishes kills whose assist window closed by `now`.
    pub fn poll_timers(&mut self, now: Instant) {
        let released = self.correlator.release_due(now);
        self.publish_kills(released);
    }

    /// Processes one transport message received at `now`.
    pub fn handle(&mut self, event: TransportEvent, now: Instant) {
        // Kills whose window already closed go out before anything newer
        self.poll_timers(now);

        match event {
            TransportEvent::Connected => self.on_connected(),
            TransportEvent::Log(text) => self.on_log(&text, now),
            TransportEvent::Scoreboard(payload) => self.on_scoreboard(&payload),
            TransportEvent::Disconnected => self.on_disconnected(),
        }
    }

    /// Drives the session until the inbound channel closes.
    pub async fn run(&mut self, mut inbound: mpsc::Receiver<TransportEvent>) {
        self.connect();

        loop {
            let deadline = self.next_deadline();

            tokio::select! {
                message = inbound.recv() => match message {
                    Some(event) => self.handle(event, Instant::now()),
                    None => {
                        info!("Transport closed");
                        break;
                    }
                },
                _ = sleep_until(deadline.unwrap_or_else(Instant::now)), if deadline.is_some() => {
                    self.poll_timers(Instant::now());
                }
            }
        }

        self.shutdown();
    }

    /// Tears the session down, flushing kills that still wait for an assist.
    pub fn shutdown(&mut self) {
        if self.state != ConnectionState::Disconnected {
            self.on_disconnected();
        } else {
            let flushed = self.correlator.flush();
            self.publish_kills(flushed);
        }
    }

    fn on_connected(&mut self) {
        if self.state == ConnectionState::Connected {
            warn!("Connect acknowledgment while already connected, starting over");
        }

        // Kills accepted before the acknowledgment still go out once
        let flushed = self.correlator.flush();
        if !flushed.is_empty() {
            debug!("Flushing {} kills before reset", flushed.len());
        }
        self.publish_kills(flushed);

        self.registry.clear();
        self.correlator.reset();
        self.scoreboard = None;

        if let Some(list_id) = self.config.list_id {
            if let Err(e) = self.send(OutboundMessage::ReadyForMatch { list_id }) {
                error!("Failed to send ready handshake: {}", e);
            }
        }

        info!("Connected to match {:?}", self.config.list_id);
        self.state = ConnectionState::Connected;
        self.publish(Event::Connect);
    }

    fn on_disconnected(&mut self) {
        let flushed = self.correlator.flush();
        if !flushed.is_empty() {
            debug!("Flushing {} kills on disconnect", flushed.len());
        }
        self.publish_kills(flushed);

        if self.state == ConnectionState::Disconnected {
            return;
        }

        info!("Disconnected from match {:?}", self.config.list_id);
        self.state = ConnectionState::Disconnected;
        self.publish(Event::Disconnect);
    }

    fn on_log(&mut self, text: &str, now: Instant) {
        self.stats.frames += 1;

        let frame = match self.decoder.decode_text(text) {
            Ok(frame) => frame,
            Err(e) => {
                warn!("Dropping log frame: {}", e);
                self.stats.decode_failures += 1;
                return;
            }
        };

        match frame {
            Frame::Playback(batch) => {
                debug!("Playback of {} bundles", batch.len());
                self.stats.playback_batches += 1;
                self.publish(Event::Playback(batch));
            }
            Frame::Live(events) => {
                for event in events {
                    match event {
                        Ok(event) => self.on_log_event(event, now),
                        Err(e) => {
                            warn!("Dropping event: {}", e);
                            self.stats.decode_failures += 1;
                        }
                    }
                }
            }
        }
    }

    fn on_log_event(&mut self, event: LogEvent, now: Instant) {
        match event {
            LogEvent::Kill(kill) => {
                debug!("Kill {} waiting for assist", kill.event_id);
                let released = self.correlator.on_kill(kill, now);
                self.publish_kills(released);
            }
            LogEvent::Assist(assist) => {
                let released = self.correlator.on_assist(assist.pending, now);
                self.publish_kills(released);
                self.publish(Event::Assist(assist.assist));
            }
            other => self.publish(Event::from(other)),
        }
    }

    fn on_scoreboard(&mut self, payload: &Value) {
        match self.builder.build(payload) {
            Ok(scoreboard) => {
                self.stats.snapshots += 1;
                self.scoreboard = Some(Arc::clone(&scoreboard));
                self.publish(Event::Scoreboard(scoreboard));
            }
            Err(e) => {
                warn!("Rejected scoreboard snapshot: {}", e);
                self.stats.rejected_snapshots += 1;
            }
        }
    }

    fn publish_kills(&mut self, kills: Vec<Kill>) {
        for kill in kills {
            self.publish(Event::Kill(kill));
        }
    }

    fn publish(&mut self, event: Event) {
        self.stats.events_published += 1;
        self.dispatcher.publish(&event);
    }

    fn send(&self, message: OutboundMessage) -> Result<(), TransportError> {
        debug!("Sending {} {}", message.event_name(), message.payload());
        self.outbound
            .send(message)
            .map_err(|_| TransportError::Closed)
    }
}
