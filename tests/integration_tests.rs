//! Integration tests for the livescore pipeline
//!
//! These tests drive a full session with transport messages and check what
//! reaches the registered handlers.

use assert_approx_eq::assert_approx_eq;
use livescore::{
    ConnectionState, Event, EventKind, LivescoreConfig, OutboundMessage, Session, TransportEvent,
};
use serde_json::{json, Value};
use shared::{Kill, Side};
use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_test::{assert_err, assert_ok};

const WINDOW: Duration = Duration::from_millis(100);

/// KILL/ASSIST CORRELATION TESTS
mod correlation_tests {
    use super::*;

    /// Kill first, assist inside the window
    #[tokio::test]
    async fn kill_then_assist() {
        let mut harness = Harness::connected();
        let start = Instant::now();

        harness.feed(snapshot_frame(&["a", "b"], &["c", "d"], 0, 0), start);
        harness.feed(kill_frame(42, "a", "c", true), start);
        assert!(harness.kills().is_empty());

        harness.feed(assist_frame(42, "b", "c"), start + WINDOW / 2);
        harness.session.poll_timers(start + WINDOW * 10);

        let kills = harness.kills();
        assert_eq!(kills.len(), 1);
        assert_eq!(kills[0].assister.as_ref().unwrap().nick, "b");
    }

    /// Assist first, kill inside the window
    #[tokio::test]
    async fn assist_then_kill() {
        let mut harness = Harness::connected();
        let start = Instant::now();

        harness.feed(assist_frame(5, "b", "c"), start);
        assert!(harness.kills().is_empty());

        harness.feed(kill_frame(5, "a", "c", false), start + WINDOW / 4);

        // Published without waiting for the window
        let kills = harness.kills();
        assert_eq!(kills.len(), 1);
        assert_eq!(kills[0].assister.as_ref().unwrap().nick, "b");

        harness.session.poll_timers(start + WINDOW * 10);
        assert_eq!(harness.kills().len(), 1);
    }

    /// Kill without an assist is published once the window closes, exactly once
    #[tokio::test]
    async fn kill_without_assist_times_out() {
        let mut harness = Harness::connected();
        let start = Instant::now();

        harness.feed(kill_frame(9, "a", "c", false), start);
        harness.session.poll_timers(start + WINDOW / 2);
        assert!(harness.kills().is_empty());

        harness.session.poll_timers(start + WINDOW);
        harness.session.poll_timers(start + WINDOW * 2);

        // A late assist does not republish the kill
        harness.feed(assist_frame(9, "b", "c"), start + WINDOW * 3);
        harness.session.poll_timers(start + WINDOW * 10);

        let kills = harness.kills();
        assert_eq!(kills.len(), 1);
        assert!(kills[0].assister.is_none());
        assert_eq!(harness.session.stats().correlation.stale_assists, 1);
    }

    /// Kill 42 by "a" on "b" with a headshot, assisted by "c"
    #[tokio::test]
    async fn headshot_kill_with_assister() {
        let mut harness = Harness::connected();
        let start = Instant::now();

        harness.feed(snapshot_frame(&["a", "c"], &["b"], 5, 3), start);
        harness.feed(kill_frame(42, "a", "b", true), start);
        harness.feed(assist_frame(42, "c", "b"), start + Duration::from_millis(20));

        let kills = harness.kills();
        assert_eq!(kills.len(), 1);
        let kill = &kills[0];
        assert_eq!(kill.event_id, 42);
        assert!(kill.headshot);
        assert_eq!(kill.killer.nick, "a");
        assert_eq!(kill.victim.nick, "b");
        assert_eq!(kill.assister.as_ref().unwrap().name, "c");
        assert_eq!(kill.killer.team.as_ref().unwrap().side, Side::Terrorist);
        assert_eq!(kill.victim.team.as_ref().unwrap().side, Side::CounterTerrorist);
    }

    /// Many interleaved kills keep arrival order and each gets its own assister
    #[tokio::test]
    async fn interleaved_kills_keep_order() {
        let mut harness = Harness::connected();
        let start = Instant::now();

        harness.feed(kill_frame(1, "a", "c", false), start);
        harness.feed(kill_frame(2, "b", "d", false), start + Duration::from_millis(5));
        harness.feed(assist_frame(2, "a", "d"), start + Duration::from_millis(10));

        // Kill 2 is complete but waits behind kill 1
        assert!(harness.kills().is_empty());

        harness.feed(assist_frame(1, "b", "c"), start + Duration::from_millis(15));

        let kills = harness.kills();
        let ids: Vec<u64> = kills.iter().map(|kill| kill.event_id).collect();
        assert_eq!(ids, vec![1, 2]);
        assert_eq!(kills[0].assister.as_ref().unwrap().nick, "b");
        assert_eq!(kills[1].assister.as_ref().unwrap().nick, "a");
    }

    /// Kills waiting for an assist are flushed on disconnect
    #[tokio::test]
    async fn disconnect_flushes_waiting_kills() {
        let mut harness = Harness::connected();
        let start = Instant::now();

        harness.feed(kill_frame(1, "a", "c", false), start);
        harness.session.handle(TransportEvent::Disconnected, start);

        let kills = harness.kills();
        assert_eq!(kills.len(), 1);
        assert!(kills[0].assister.is_none());
        assert_eq!(harness.kinds().last(), Some(&EventKind::Disconnect));
        assert_eq!(harness.session.state(), ConnectionState::Disconnected);
    }
}

/// SCOREBOARD AND REGISTRY TESTS
mod scoreboard_tests {
    use super::*;

    /// Both sides are disjoint and together hold every listed player
    #[tokio::test]
    async fn snapshot_sides_disjoint_and_complete() {
        let mut harness = Harness::connected();
        harness.feed(
            snapshot_frame(&["a", "b", "c"], &["d", "e"], 0, 0),
            Instant::now(),
        );

        let scoreboard = harness.session.scoreboard().unwrap();
        let t: HashSet<&str> = scoreboard
            .terrorists
            .players
            .iter()
            .map(|p| p.nick.as_str())
            .collect();
        let ct: HashSet<&str> = scoreboard
            .counter_terrorists
            .players
            .iter()
            .map(|p| p.nick.as_str())
            .collect();

        assert!(t.is_disjoint(&ct));
        let all: HashSet<&str> = t.union(&ct).copied().collect();
        assert_eq!(
            all,
            ["a", "b", "c", "d", "e"]
                .into_iter()
                .collect::<HashSet<&str>>()
        );
    }

    /// Leader is the team with more rounds, none on a tie
    #[tokio::test]
    async fn leader_by_score() {
        let mut harness = Harness::connected();

        harness.feed(snapshot_frame(&["a"], &["b"], 5, 3), Instant::now());
        let scoreboard = harness.session.scoreboard().unwrap();
        assert_eq!(scoreboard.leader().unwrap().side, Side::Terrorist);
        assert_eq!(scoreboard.leader().unwrap().name, "Terrorists FC");

        harness.feed(snapshot_frame(&["a"], &["b"], 4, 4), Instant::now());
        assert!(harness.session.scoreboard().unwrap().leader().is_none());
    }

    /// Events after a snapshot resolve to the snapshot's players
    #[tokio::test]
    async fn events_resolve_against_latest_snapshot() {
        let mut harness = Harness::connected();
        let start = Instant::now();

        harness.feed(snapshot_frame(&["a"], &["b"], 0, 0), start);
        let registry = harness.session.registry();
        let a = registry.resolve("a");
        assert_approx_eq!(a.adr, 81.5);

        harness.feed(kill_frame(1, "a", "b", false), start);
        harness.session.poll_timers(start + WINDOW);

        let kills = harness.kills();
        assert!(Arc::ptr_eq(&kills[0].killer, &a));

        // Nicknames missing from the roster still resolve, as zero-value players
        let ghost = registry.resolve("ghost");
        assert_eq!(ghost.nick, "ghost");
        assert!(!ghost.is_known());
    }

    /// A broken snapshot keeps the previous scoreboard
    #[tokio::test]
    async fn rejected_snapshot_keeps_previous_state() {
        let mut harness = Harness::connected();

        harness.feed(snapshot_frame(&["a"], &["b"], 1, 0), Instant::now());
        harness.session.handle(
            TransportEvent::Scoreboard(json!({"mapName": "de_dust2", "TERRORIST": "?"})),
            Instant::now(),
        );

        let scoreboard = harness.session.scoreboard().unwrap();
        assert_eq!(scoreboard.map_name, "de_mirage");
        assert_eq!(harness.session.registry().len(), 2);
        assert_eq!(harness.session.stats().rejected_snapshots, 1);
    }
}

/// FRAME DECODING TESTS
mod decoding_tests {
    use super::*;

    /// A frame with several bundles is one playback batch, oldest first
    #[tokio::test]
    async fn multi_bundle_frame_is_playback() {
        let mut harness = Harness::connected();
        let text = json!({"log": [
            {"RoundStart": {}},
            {"Kill": {"eventId": 2, "killerNick": "a", "victimNick": "b", "weapon": "awp", "headShot": false}},
            {"Kill": {"eventId": 1, "killerNick": "b", "victimNick": "a", "weapon": "m4a1", "headShot": true}},
        ]})
        .to_string();
        harness.feed(TransportEvent::Log(text), Instant::now());
        harness.session.poll_timers(Instant::now() + WINDOW * 10);

        let events = harness.events();
        assert_eq!(events.len(), 1);
        match &events[0] {
            Event::Playback(batch) => {
                assert_eq!(batch.len(), 3);
                let kinds: Vec<&str> = batch
                    .iter()
                    .flat_map(|bundle| bundle.iter().map(|raw| raw.kind.as_str()))
                    .collect();
                assert_eq!(kinds, vec!["Kill", "Kill", "RoundStart"]);
                assert_eq!(batch[0][0].payload["eventId"], json!(1));
            }
            other => panic!("Expected playback, got {:?}", other),
        }
        assert!(harness.kills().is_empty());
    }

    /// Unrecognised kinds are forwarded untouched
    #[tokio::test]
    async fn unknown_kind_is_forwarded_raw() {
        let mut harness = Harness::connected();
        harness.feed(
            log_frame(json!({"SmokeThrown": {"x": 1.5, "nested": {"who": "a"}}})),
            Instant::now(),
        );

        let events = harness.events();
        assert_eq!(events.len(), 1);
        match &events[0] {
            Event::Unknown(raw) => {
                assert_eq!(raw.kind, "SmokeThrown");
                assert_eq!(raw.payload["nested"]["who"], json!("a"));
            }
            other => panic!("Expected raw event, got {:?}", other),
        }
    }

    /// A malformed entry is dropped without hiding the rest of the bundle
    #[tokio::test]
    async fn malformed_entry_is_isolated() {
        let mut harness = Harness::connected();
        harness.feed(
            log_frame(json!({
                "Kill": {"eventId": "not a number"},
                "RoundStart": {},
            })),
            Instant::now(),
        );

        assert_eq!(harness.kinds(), vec![EventKind::RoundStart]);
        assert_eq!(harness.session.stats().decode_failures, 1);
    }

    /// Round end carries winner and score
    #[tokio::test]
    async fn round_end_is_typed() {
        let mut harness = Harness::connected();
        harness.feed(
            log_frame(json!({"RoundEnd": {
                "winner": "CT",
                "winType": "Bomb_Defused",
                "counterTerroristScore": 7,
                "terroristScore": 4,
            }})),
            Instant::now(),
        );

        match &harness.events()[0] {
            Event::RoundEnd(round_end) => {
                assert_eq!(round_end.winner, Side::CounterTerrorist);
                assert_eq!(round_end.counter_terrorist_score, 7);
                assert_eq!(round_end.terrorist_score, 4);
            }
            other => panic!("Expected round end, got {:?}", other),
        }
    }
}

/// SESSION LIFECYCLE TESTS
mod session_tests {
    use super::*;

    /// The connect acknowledgment triggers the ready handshake
    #[tokio::test]
    async fn handshake_on_connect() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut session = assert_ok!(Session::new(LivescoreConfig::new(2366542), tx));

        session.connect();
        session.handle(TransportEvent::Connected, Instant::now());

        let message = assert_ok!(rx.try_recv());
        assert_eq!(message, OutboundMessage::ReadyForMatch { list_id: 2366542 });
        assert_eq!(
            message.to_socketio(),
            r#"["readyForMatch","{\"listId\":2366542}"]"#
        );
    }

    /// Configuration must name a match and a usable window
    #[test]
    fn invalid_config_rejected() {
        let (tx, _rx) = mpsc::unbounded_channel();
        assert!(Session::new(LivescoreConfig::default(), tx.clone()).is_err());
        assert!(Session::new(
            LivescoreConfig::new(1).with_assist_window(Duration::ZERO),
            tx
        )
        .is_err());
        assert_err!(LivescoreConfig::new(1)
            .with_assist_window(Duration::ZERO)
            .validate());
        assert_err!(LivescoreConfig::from_url("https://www.hltv.org/matches/"));
    }

    /// A failing or panicking handler does not stop the others
    #[tokio::test]
    async fn handler_failures_are_isolated() {
        let mut harness = Harness::connected();
        harness
            .session
            .dispatcher_mut()
            .replace(EventKind::RoundStart, |_| Err("first handler fails".into()));
        assert_ok!(harness
            .session
            .on(EventKind::RoundStart, |_| panic!("second handler panics")));

        let reached = Arc::new(Mutex::new(0));
        {
            let reached = Arc::clone(&reached);
            assert_ok!(harness.session.on(EventKind::RoundStart, move |_| {
                *reached.lock().unwrap() += 1;
                Ok(())
            }));
        }

        harness.feed(log_frame(json!({"RoundStart": {}})), Instant::now());
        harness.feed(log_frame(json!({"RoundStart": {}})), Instant::now());

        assert_eq!(*reached.lock().unwrap(), 2);
        assert_eq!(harness.session.stats().handler_failures, 4);
    }

    /// Full pipeline from Socket.IO lines through the async event loop
    #[tokio::test(start_paused = true)]
    async fn run_over_socketio_lines() {
        let (out_tx, mut out_rx) = mpsc::unbounded_channel();
        let config = LivescoreConfig::from_url("https://www.hltv.org/matches/2366542/a-vs-b")
            .unwrap()
            .with_assist_window(WINDOW);
        let mut session = Session::new(config, out_tx).unwrap();
        let seen = record_all(&mut session);

        let lines = vec![
            r#"["connect"]"#.to_string(),
            json!(["log", json!({"log": [{"Kill": {
                "eventId": 11, "killerNick": "a", "victimNick": "b",
                "weapon": "deagle", "headShot": true
            }}]}).to_string()])
            .to_string(),
            r#"["time", 1700000000]"#.to_string(),
        ];

        let (in_tx, in_rx) = mpsc::channel(16);
        for line in &lines {
            if let Some(event) = TransportEvent::from_socketio(line).unwrap() {
                in_tx.send(event).await.unwrap();
            }
        }

        let assist = TransportEvent::from_socketio(
            &json!(["log", json!({"log": [{"Assist": {
                "killEventId": 11, "assisterNick": "c", "victimNick": "b"
            }}]}).to_string()])
            .to_string(),
        )
        .unwrap()
        .unwrap();

        let feeder = tokio::spawn(async move {
            tokio::time::sleep(WINDOW / 2).await;
            in_tx.send(assist).await.unwrap();
            tokio::time::sleep(WINDOW * 5).await;
            in_tx.send(TransportEvent::Disconnected).await.unwrap();
        });

        session.run(in_rx).await;
        feeder.await.unwrap();

        assert_eq!(
            out_rx.try_recv().unwrap(),
            OutboundMessage::ReadyForMatch { list_id: 2366542 }
        );

        let events = seen.lock().unwrap();
        let kinds: Vec<EventKind> = events.iter().map(Event::kind).collect();
        assert_eq!(
            kinds,
            vec![
                EventKind::Connect,
                EventKind::Kill,
                EventKind::Assist,
                EventKind::Disconnect
            ]
        );
        match &events[1] {
            Event::Kill(kill) => {
                assert_eq!(kill.assister.as_ref().unwrap().nick, "c");
                assert!(kill.headshot);
            }
            other => panic!("Expected kill, got {:?}", other),
        }
    }
}

struct Harness {
    session: Session,
    seen: Arc<Mutex<Vec<Event>>>,
    _outbound: mpsc::UnboundedReceiver<OutboundMessage>,
}

impl Harness {
    /// Connected session recording every event published after the connect
    fn connected() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let config = LivescoreConfig::new(2366542).with_assist_window(WINDOW);
        let mut session = Session::new(config, tx).unwrap();
        session.handle(TransportEvent::Connected, Instant::now());

        let seen = record_all(&mut session);
        Self {
            session,
            seen,
            _outbound: rx,
        }
    }

    fn feed(&mut self, event: TransportEvent, now: Instant) {
        self.session.handle(event, now);
    }

    fn events(&self) -> Vec<Event> {
        self.seen
            .lock()
            .unwrap()
            .iter()
            .filter(|event| !matches!(event, Event::Scoreboard(_)))
            .cloned()
            .collect()
    }

    fn kinds(&self) -> Vec<EventKind> {
        self.events().iter().map(Event::kind).collect()
    }

    fn kills(&self) -> Vec<Kill> {
        self.events()
            .into_iter()
            .filter_map(|event| match event {
                Event::Kill(kill) => Some(kill),
                _ => None,
            })
            .collect()
    }
}

fn record_all(session: &mut Session) -> Arc<Mutex<Vec<Event>>> {
    let seen = Arc::new(Mutex::new(Vec::new()));
    for kind in EventKind::ALL {
        let seen = Arc::clone(&seen);
        session
            .on(kind, move |event| {
                seen.lock().unwrap().push(event.clone());
                Ok(())
            })
            .unwrap();
    }
    seen
}

fn log_frame(bundle: Value) -> TransportEvent {
    TransportEvent::Log(json!({ "log": [bundle] }).to_string())
}

fn kill_frame(id: u64, killer: &str, victim: &str, headshot: bool) -> TransportEvent {
    log_frame(json!({"Kill": {
        "eventId": id,
        "killerNick": killer,
        "victimNick": victim,
        "weapon": "ak47",
        "headShot": headshot,
    }}))
}

fn assist_frame(id: u64, assister: &str, victim: &str) -> TransportEvent {
    log_frame(json!({"Assist": {
        "killEventId": id,
        "assisterNick": assister,
        "victimNick": victim,
    }}))
}

fn player_record(nick: &str) -> Value {
    json!({
        "nick": nick,
        "name": nick,
        "hp": 100,
        "kevlar": true,
        "helmet": true,
        "hasDefusekit": false,
        "money": 4750,
        "damagePrRound": 81.5,
        "assists": 2,
        "deaths": 4,
        "score": 9,
        "alive": true,
        "dbId": 11893,
        "steamId": "STEAM_1:1:23",
    })
}

fn snapshot_frame(t: &[&str], ct: &[&str], t_score: u32, ct_score: u32) -> TransportEvent {
    TransportEvent::Scoreboard(json!({
        "mapName": "de_mirage",
        "bombPlanted": false,
        "currentRound": t_score + ct_score + 1,
        "TERRORIST": t.iter().map(|nick| player_record(nick)).collect::<Vec<_>>(),
        "CT": ct.iter().map(|nick| player_record(nick)).collect::<Vec<_>>(),
        "tTeamId": 6667,
        "terroristTeamName": "Terrorists FC",
        "tTeamScore": t_score,
        "ctTeamId": 4608,
        "ctTeamName": "Counter United",
        "ctTeamScore": ct_score,
    }))
}
