//! Prints a live kill feed for one match.
//!
//! Socket.IO style lines (`["log", "..."]`, `["scoreboard", {...}]`) are read
//! from stdin, and messages for the scorebot are written to stdout in the
//! same format, so any socket client can be piped in front of it. The kill
//! feed itself goes to stderr.

use clap::Parser;
use livescore::{Event, EventKind, LivescoreConfig, Session, TransportEvent};
use log::{info, warn};
use shared::{Kill, Player, Scoreboard};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::{self, AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::sync::mpsc;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// HLTV match page url, e.g. https://www.hltv.org/matches/2366542/...
    #[arg(short = 'u', long)]
    url: Option<String>,

    /// Numeric match id, used when no url is given
    #[arg(short = 'l', long)]
    list_id: Option<u64>,

    /// How long a kill waits for its assist, in milliseconds
    #[arg(short = 'a', long, default_value = "100")]
    assist_window_ms: u64,

    /// Scorebot endpoint the transport connects to
    #[arg(short = 's', long, default_value = livescore::config::DEFAULT_SOCKET_URI)]
    socket_uri: String,
}

fn player_label(player: &Player) -> String {
    match &player.team {
        Some(team) => format!("{} [{}]", player.nick, team.name),
        None => player.nick.clone(),
    }
}

fn format_kill(kill: &Kill) -> String {
    let mut line = player_label(&kill.killer);
    if let Some(assister) = &kill.assister {
        line.push_str(&format!(" + {}", assister.nick));
    }
    if let Some(flasher) = &kill.flasher {
        line.push_str(&format!(" (flashed by {})", flasher.nick));
    }
    line.push_str(&format!(" <{}", kill.weapon));
    if kill.headshot {
        line.push_str(" HS");
    }
    line.push_str(&format!("> {}", player_label(&kill.victim)));
    line
}

fn register_handlers(session: &mut Session) -> Result<(), Box<dyn std::error::Error>> {
    let last_scoreboard: Arc<Mutex<Option<Arc<Scoreboard>>>> = Arc::new(Mutex::new(None));

    {
        let last_scoreboard = Arc::clone(&last_scoreboard);
        session.on(EventKind::Scoreboard, move |event| {
            if let Event::Scoreboard(scoreboard) = event {
                let mut last = last_scoreboard
                    .lock()
                    .map_err(|_| "scoreboard lock poisoned")?;
                *last = Some(Arc::clone(scoreboard));
            }
            Ok(())
        })?;
    }

    session.on(EventKind::Kill, |event| {
        if let Event::Kill(kill) = event {
            eprintln!("{}", format_kill(kill));
        }
        Ok(())
    })?;

    session.on(EventKind::RoundEnd, move |event| {
        if let Event::RoundEnd(round_end) = event {
            let last = last_scoreboard
                .lock()
                .map_err(|_| "scoreboard lock poisoned")?;
            let (t_name, ct_name) = match last.as_ref() {
                Some(scoreboard) => (
                    scoreboard.terrorists.name.clone(),
                    scoreboard.counter_terrorists.name.clone(),
                ),
                None => ("T".to_string(), "CT".to_string()),
            };
            eprintln!(
                "Round over, {} win: {} {} - {} {}",
                round_end.winner,
                t_name,
                round_end.terrorist_score,
                round_end.counter_terrorist_score,
                ct_name
            );
        }
        Ok(())
    })?;

    session.on(EventKind::Playback, |event| {
        if let Event::Playback(batch) = event {
            let events: usize = batch.iter().map(Vec::len).sum();
            info!("Skipped {} backlog events in {} bundles", events, batch.len());
        }
        Ok(())
    })?;

    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    if std::env::var("RUST_LOG").is_err() {
        eprintln!("Set RUST_LOG=info for detailed logging");
    }

    let args = Args::parse();

    let config = match (&args.url, args.list_id) {
        (Some(url), _) => LivescoreConfig::from_url(url)?,
        (None, Some(list_id)) => LivescoreConfig::new(list_id),
        (None, None) => LivescoreConfig::default(),
    }
    .with_socket_uri(args.socket_uri)
    .with_assist_window(Duration::from_millis(args.assist_window_ms));

    let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel();
    let (inbound_tx, inbound_rx) = mpsc::channel::<TransportEvent>(1000);

    let mut session = Session::new(config, outbound_tx)?;
    register_handlers(&mut session)?;

    // stdin -> session
    let reader = tokio::spawn(async move {
        let mut lines = BufReader::new(io::stdin()).lines();
        loop {
            match lines.next_line().await {
                Ok(Some(line)) if line.trim().is_empty() => continue,
                Ok(Some(line)) => match TransportEvent::from_socketio(&line) {
                    Ok(Some(event)) => {
                        if inbound_tx.send(event).await.is_err() {
                            break;
                        }
                    }
                    Ok(None) => {}
                    Err(e) => warn!("Skipping transport line: {}", e),
                },
                Ok(None) => break,
                Err(e) => {
                    warn!("Failed to read stdin: {}", e);
                    break;
                }
            }
        }
    });

    // session -> stdout
    let writer = tokio::spawn(async move {
        let mut stdout = io::stdout();
        while let Some(message) = outbound_rx.recv().await {
            let line = format!("{}\n", message.to_socketio());
            if let Err(e) = stdout.write_all(line.as_bytes()).await {
                warn!("Failed to write outbound message: {}", e);
                break;
            }
            if let Err(e) = stdout.flush().await {
                warn!("Failed to flush stdout: {}", e);
                break;
            }
        }
    });

    session.run(inbound_rx).await;

    let stats = session.stats();
    info!(
        "Session ended: {} frames, {} kills ({} assisted), {} decode failures",
        stats.frames,
        stats.correlation.kills_released,
        stats.correlation.kills_assisted,
        stats.decode_failures
    );

    drop(session);
    reader.await?;
    writer.await?;

    Ok(())
}
