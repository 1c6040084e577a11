//! Kill/assist correlation
//!
//! The scorebot reports a kill and its assist as two independent frames that
//! share only a correlation id, in either order, a few milliseconds apart.
//! The assist may also never come. The correlator attaches assists to kills
//! without ever blocking frame processing: instead of sleeping it keeps a
//! deadline queue that the session polls.
//!
//! ## Rules
//! - A kill opens a window of `window` length. It is released as soon as its
//!   assist is known, or with no assister once the window closes.
//! - An assist seen before its kill is parked for one window. A kill arriving
//!   in that time picks it up immediately.
//! - Assists for a kill that was already released are stale and dropped.
//! - Each correlation id is released at most once. Duplicate kills are ignored.
//! - Kills are released in arrival order. A kill completed early still waits
//!   for any earlier kill whose window is open.
//!
//! Every window has the same length, so arrival order is also deadline order
//! and a plain queue serves as the deadline queue.

use log::{debug, warn};
use shared::{Kill, PendingAssist};
use std::collections::{HashMap, HashSet, VecDeque};
use std::time::Duration;
use tokio::time::Instant;

/// How many released correlation ids are remembered to recognise stale assists.
pub const RESOLVED_CAPACITY: usize = 512;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CorrelatorStats {
    pub kills_released: u64,
    pub kills_assisted: u64,
    pub duplicate_kills: u64,
    pub stale_assists: u64,
    pub expired_assists: u64,
    pub mismatched_assists: u64,
}

#[derive(Debug)]
struct WaitingKill {
    kill: Kill,
    deadline: Instant,
    ready: bool,
}

#[derive(Debug)]
struct ParkedAssist {
    assist: PendingAssist,
    expires: Instant,
}

#[derive(Debug)]
pub struct AssistCorrelator {
    window: Duration,
    waiting: VecDeque<WaitingKill>,
    parked: HashMap<u64, ParkedAssist>,
    parked_order: VecDeque<(Instant, u64)>,
    resolved: HashSet<u64>,
    resolved_order: VecDeque<u64>,
    stats: CorrelatorStats,
}

impl AssistCorrelator {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            waiting: VecDeque::new(),
            parked: HashMap::new(),
            parked_order: VecDeque::new(),
            resolved: HashSet::new(),
            resolved_order: VecDeque::new(),
            stats: CorrelatorStats::default(),
        }
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    pub fn stats(&self) -> CorrelatorStats {
        self.stats
    }

    /// Number of kills still held back.
    pub fn waiting_kills(&self) -> usize {
        self.waiting.len()
    }

    /// Number of assists waiting for their kill.
    pub fn pending_assists(&self) -> usize {
        self.parked.len()
    }

    /// Accepts a decoded kill and returns every kill that can be published now.
    pub fn on_kill(&mut self, mut kill: Kill, now: Instant) -> Vec<Kill> {
        let id = kill.event_id;

        if self.is_known(id) {
            debug!("Ignoring duplicate kill {}", id);
            self.stats.duplicate_kills += 1;
            return self.release_due(now);
        }

        let ready = match self.parked.remove(&id) {
            Some(parked) if victims_agree(&parked.assist, &kill) => {
                kill.assister = Some(parked.assist.assister);
                true
            }
            Some(parked) => {
                self.reject_mismatch(&parked.assist, &kill);
                false
            }
            None => false,
        };

        self.waiting.push_back(WaitingKill {
            kill,
            deadline: now + self.window,
            ready,
        });

        self.release_due(now)
    }

    /// Accepts a decoded assist and returns every kill that can be published now.
    pub fn on_assist(&mut self, assist: PendingAssist, now: Instant) -> Vec<Kill> {
        let id = assist.kill_event_id;

        if let Some(index) = self.waiting.iter().position(|w| w.kill.event_id == id) {
            let agree = victims_agree(&assist, &self.waiting[index].kill);
            let waiting = &mut self.waiting[index];

            if waiting.ready {
                debug!("Kill {} already has an assister", id);
            } else if agree {
                waiting.kill.assister = Some(assist.assister);
                waiting.ready = true;
            } else {
                let kill = waiting.kill.clone();
                self.reject_mismatch(&assist, &kill);
            }

            return self.release_due(now);
        }

        if self.resolved.contains(&id) {
            debug!("Dropping stale assist for kill {}", id);
            self.stats.stale_assists += 1;
        } else if self.parked.contains_key(&id) {
            debug!("Kill {} already has a parked assist", id);
        } else {
            let expires = now + self.window;
            self.parked.insert(id, ParkedAssist { assist, expires });
            self.parked_order.push_back((expires, id));
        }

        self.release_due(now)
    }

    /// Releases kills whose assist is known or whose window has closed, in
    /// arrival order, and drops parked assists that outlived their window.
    pub fn release_due(&mut self, now: Instant) -> Vec<Kill> {
        let mut released = Vec::new();

        while self
            .waiting
            .front()
            .map_or(false, |front| front.ready || front.deadline <= now)
        {
            if let Some(waiting) = self.waiting.pop_front() {
                released.push(self.resolve(waiting.kill));
            }
        }

        while let Some(&(expires, id)) = self.parked_order.front() {
            if expires > now {
                break;
            }
            self.parked_order.pop_front();

            // The entry may already have been claimed by its kill
            if self.parked.get(&id).map_or(false, |p| p.expires == expires) {
                self.parked.remove(&id);
                debug!("Assist for kill {} expired without its kill", id);
                self.stats.expired_assists += 1;
            }
        }

        released
    }

    /// Earliest instant at which [`release_due`](Self::release_due) has work to do.
    pub fn next_deadline(&self) -> Option<Instant> {
        let kill = self.waiting.front().map(|w| w.deadline);
        let assist = self.parked_order.front().map(|&(expires, _)| expires);

        match (kill, assist) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        }
    }

    /// Releases every held kill at once, in arrival order, and drops parked
    /// assists. Kills whose window was still open go out without an assister.
    pub fn flush(&mut self) -> Vec<Kill> {
        let waiting: Vec<WaitingKill> = self.waiting.drain(..).collect();
        let released = waiting
            .into_iter()
            .map(|waiting| self.resolve(waiting.kill))
            .collect();

        self.parked.clear();
        self.parked_order.clear();

        released
    }

    /// Forgets everything, including which ids were already released.
    pub fn reset(&mut self) {
        self.waiting.clear();
        self.parked.clear();
        self.parked_order.clear();
        self.resolved.clear();
        self.resolved_order.clear();
    }

    fn is_known(&self, id: u64) -> bool {
        self.resolved.contains(&id) || self.waiting.iter().any(|w| w.kill.event_id == id)
    }

    fn resolve(&mut self, kill: Kill) -> Kill {
        self.stats.kills_released += 1;
        if kill.assister.is_some() {
            self.stats.kills_assisted += 1;
        }

        if self.resolved.insert(kill.event_id) {
            self.resolved_order.push_back(kill.event_id);
        }
        while self.resolved_order.len() > RESOLVED_CAPACITY {
            if let Some(oldest) = self.resolved_order.pop_front() {
                self.resolved.remove(&oldest);
            }
        }

        kill
    }

    fn reject_mismatch(&mut self, assist: &PendingAssist, kill: &Kill) {
        warn!(
            "Assist for kill {} names victim '{}' but the kill has '{}', ignoring it",
            kill.event_id, assist.victim.nick, kill.victim.nick
        );
        self.stats.mismatched_assists += 1;
    }
}

fn victims_agree(assist: &PendingAssist, kill: &Kill) -> bool {
    assist.victim.nick.is_empty()
        || kill.victim.nick.is_empty()
        || assist.victim.nick == kill.victim.nick
}
