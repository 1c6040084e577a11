//! # Livescore Library
//!
//! This library turns the raw message stream of an HLTV scorebot connection
//! into typed, correlated match events. It keeps a live view of the
//! scoreboard, resolves every nickname in the event stream to the player it
//! names, stitches kills and their assists back together and hands the
//! result to application callbacks.
//!
//! ## Core Responsibilities
//!
//! ### Scoreboard Tracking
//! Every `scoreboard` message is a full snapshot. It is rebuilt into two
//! teams of players, and the player registry is swapped to the new players
//! in one step, so readers always see a complete roster from a single
//! snapshot.
//!
//! ### Event Decoding
//! `log` messages carry bundles of events keyed by kind. Live frames are
//! decoded into typed events with nicknames resolved against the roster.
//! Backlog frames sent on connect are surfaced whole as a playback batch.
//!
//! ### Kill/Assist Correlation
//! Kills and assists arrive as separate frames, in either order, linked by a
//! correlation id. Kills are held for a short window so the assister can be
//! attached before the kill is published. Nothing ever blocks while waiting.
//!
//! ## Architecture Design
//!
//! ### Single Session Owner
//! A [`Session`] owns the registry, correlator, latest scoreboard and handler
//! registry of one match. The transport only exchanges messages with it over
//! channels, which keeps all match state on one task and makes the session
//! easy to drive from tests with an injected clock.
//!
//! ### Failure Isolation
//! A malformed event, a rejected snapshot or a failing handler is logged and
//! counted. None of them stops the session or hides neighbouring events.
//!
//! ## Module Organization
//!
//! ### Config Module (`config`)
//! Match id, socket endpoint and assist window, plus match page url parsing.
//!
//! ### Registry Module (`registry`)
//! Nickname to player lookup with atomic roster replacement.
//!
//! ### Scoreboard Module (`scoreboard`)
//! Snapshot wire format and scoreboard assembly.
//!
//! ### Decoder Module (`decoder`)
//! `log` frame wire format, playback detection and per-entry decoding.
//!
//! ### Correlator Module (`correlator`)
//! Deadline-driven kill/assist matching.
//!
//! ### Dispatcher Module (`dispatcher`)
//! Published event types and per-kind handler registration.
//!
//! ### Session Module (`session`)
//! Connection lifecycle, handshake and the event loop tying it all together.
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use livescore::{Event, EventKind, LivescoreConfig, Session, TransportEvent};
//! use tokio::sync::mpsc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = LivescoreConfig::from_url("https://www.hltv.org/matches/2366542/x")?;
//!     let (outbound_tx, _outbound_rx) = mpsc::unbounded_channel();
//!     let (_inbound_tx, inbound_rx) = mpsc::channel::<TransportEvent>(64);
//!
//!     let mut session = Session::new(config, outbound_tx)?;
//!     session.on(EventKind::Kill, |event| {
//!         if let Event::Kill(kill) = event {
//!             println!("{} killed {}", kill.killer.nick, kill.victim.nick);
//!         }
//!         Ok(())
//!     })?;
//!
//!     // The transport feeds `_inbound_tx` and sends whatever arrives on
//!     // `_outbound_rx` to the scorebot.
//!     session.run(inbound_rx).await;
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod correlator;
pub mod decoder;
pub mod dispatcher;
pub mod error;
pub mod registry;
pub mod scoreboard;
pub mod session;

pub use config::LivescoreConfig;
pub use correlator::{AssistCorrelator, CorrelatorStats};
pub use decoder::{Frame, FrameDecoder, LogEvent};
pub use dispatcher::{Event, EventDispatcher, EventKind};
pub use error::{BuildError, ConfigError, DecodeError, DispatchError, HandlerError, TransportError};
pub use registry::{PlayerRegistry, Roster};
pub use scoreboard::ScoreboardBuilder;
pub use session::{ConnectionState, OutboundMessage, Session, SessionStats, TransportEvent};
