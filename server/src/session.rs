//! Session tracking and outgoing packet queues for connected players
//!
//! This module owns the server-side record of every logged-in player:
//! - Session lifecycle bookkeeping (creation, activity, idle detection)
//! - Per-session outgoing byte queues drained on each poll
//! - Lookup by numeric id, session token and normalised username
//! - Presence fan-out when a session joins the store
//!
//! The store does not tear sessions down by itself. Removal goes through
//! `World::logout`, which leaves channels, matches and spectator links
//! before the session is dropped from the table.

use log::info;
use shared::records::{UserPresence, UserStats};
use shared::{packets, ActionStatus, ClientRank, Mode, Mods, Privileges};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::time::{Duration, Instant};
use thiserror::Error;
use uuid::Uuid;

use crate::matches::MatchId;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SessionError {
    #[error("session id {0} is already online")]
    DuplicateId(i32),
    #[error("session token collision")]
    DuplicateToken,
    #[error("username {0} is already online")]
    DuplicateName(String),
}

/// Lowercases a username and replaces spaces so lookups ignore both
pub fn normalize_name(name: &str) -> String {
    name.trim().to_lowercase().replace(' ', "_")
}

/// Ranking figures shown in the stats packet
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PlayerStats {
    pub ranked_score: i64,
    /// Accuracy in percent
    pub accuracy: f32,
    pub play_count: i32,
    pub total_score: i64,
    pub global_rank: i32,
    pub pp: u32,
}

/// Current activity as last reported by the client
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PlayerStatus {
    pub action: ActionStatus,
    pub text: String,
    pub map_hash: String,
    pub mods: Mods,
    pub mode: Mode,
    pub map_id: i32,
}

/// One authenticated player connection
///
/// A session survives across many HTTP polls. Everything the server wants to
/// tell the player is appended to `queue` and handed out on the next poll.
/// Relationships to channels, matches and other sessions are stored as
/// names and ids, never as references.
#[derive(Debug)]
pub struct Session {
    /// Account id, also used as the protocol user id
    pub id: i32,
    pub username: String,
    /// Normalised form of `username`
    pub safe_name: String,
    /// Opaque token the client echoes in the `osu-token` header
    pub token: String,
    pub privileges: Privileges,
    pub country_code: u8,
    pub utc_offset: i8,
    pub longitude: f32,
    pub latitude: f32,
    pub status: PlayerStatus,
    pub stats: PlayerStats,
    /// Host this session is currently watching
    pub spectating: Option<i32>,
    /// Sessions watching this one, in join order
    pub spectators: Vec<i32>,
    /// Canonical names of joined channels
    pub channels: Vec<String>,
    pub match_id: Option<MatchId>,
    pub friends: BTreeSet<i32>,
    pub in_lobby: bool,
    pub block_non_friend_dms: bool,
    pub client_version: String,
    /// The server's own chat bot never polls and discards its queue
    pub is_bot: bool,
    pub login_time: Instant,
    /// Last time the client polled
    pub last_activity: Instant,
    queue: Vec<u8>,
}

impl Session {
    /// Creates a fresh session with a newly generated token
    pub fn new(id: i32, username: &str, privileges: Privileges) -> Self {
        let now = Instant::now();
        Self {
            id,
            username: username.to_string(),
            safe_name: normalize_name(username),
            token: Uuid::new_v4().to_string(),
            privileges,
            country_code: 0,
            utc_offset: 0,
            longitude: 0.0,
            latitude: 0.0,
            status: PlayerStatus::default(),
            stats: PlayerStats::default(),
            spectating: None,
            spectators: Vec::new(),
            channels: Vec::new(),
            match_id: None,
            friends: BTreeSet::new(),
            in_lobby: false,
            block_non_friend_dms: false,
            client_version: String::new(),
            is_bot: false,
            login_time: now,
            last_activity: now,
            queue: Vec::new(),
        }
    }

    /// Creates the server's chat bot session
    pub fn bot(id: i32, username: &str, country_code: u8) -> Self {
        let mut session = Self::new(id, username, Privileges::USER | Privileges::VERIFIED);
        session.country_code = country_code;
        session.is_bot = true;
        session
    }

    /// Appends packet bytes to the outgoing queue
    pub fn enqueue(&mut self, bytes: &[u8]) {
        if !self.is_bot {
            self.queue.extend_from_slice(bytes);
        }
    }

    /// Takes everything queued so far, leaving the queue empty
    pub fn dequeue(&mut self) -> Vec<u8> {
        std::mem::take(&mut self.queue)
    }

    /// Bytes waiting for the next poll
    pub fn pending(&self) -> usize {
        self.queue.len()
    }

    /// Shows the player a client-side notification
    pub fn notify(&mut self, text: &str) {
        self.enqueue(&packets::notification(text));
    }

    /// Restricted sessions have not been verified and only get a few packets
    pub fn is_restricted(&self) -> bool {
        !self.privileges.contains(Privileges::VERIFIED)
    }

    pub fn is_staff(&self) -> bool {
        self.privileges.intersects(Privileges::STAFF)
    }

    /// Marks the session as having just polled
    pub fn touch(&mut self) {
        self.last_activity = Instant::now();
    }

    /// Returns true if the client has not polled within `timeout`
    pub fn is_timed_out(&self, timeout: Duration) -> bool {
        self.last_activity.elapsed() > timeout
    }

    pub fn client_rank(&self) -> ClientRank {
        ClientRank::from_privileges(self.privileges)
    }

    pub fn presence(&self) -> UserPresence {
        UserPresence {
            user_id: self.id,
            username: self.username.clone(),
            utc_offset: self.utc_offset,
            country_code: self.country_code,
            rank_bits: self.client_rank().bits(),
            longitude: self.longitude,
            latitude: self.latitude,
            global_rank: self.stats.global_rank,
        }
    }

    /// Builds the stats record
    ///
    /// The pp field is only 16 bits wide; larger values are sent in the
    /// ranked score slot instead and the pp field is zeroed, which the
    /// client understands.
    pub fn stats_record(&self) -> UserStats {
        let overflow = self.stats.pp > i16::MAX as u32;

        UserStats {
            user_id: self.id,
            action: self.status.action,
            status_text: self.status.text.clone(),
            map_hash: self.status.map_hash.clone(),
            mods: self.status.mods,
            mode: self.status.mode,
            map_id: self.status.map_id,
            ranked_score: if overflow {
                i64::from(self.stats.pp)
            } else {
                self.stats.ranked_score
            },
            accuracy: self.stats.accuracy / 100.0,
            play_count: self.stats.play_count,
            total_score: self.stats.total_score,
            global_rank: self.stats.global_rank,
            pp: if overflow { 0 } else { self.stats.pp as i16 },
        }
    }

    /// Presence followed by stats, the pair every listing sends
    pub fn presence_and_stats(&self) -> Vec<u8> {
        let mut bytes = packets::user_presence(&self.presence());
        bytes.extend(packets::user_stats(&self.stats_record()));
        bytes
    }
}

/// Table of every live session
///
/// Sessions are keyed by id in a `BTreeMap` so iteration (and therefore
/// broadcast and listing order) is stable. A token index gives O(log n)
/// lookup for the per-request token check.
#[derive(Debug, Default)]
pub struct SessionStore {
    sessions: BTreeMap<i32, Session>,
    tokens: HashMap<String, i32>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a session and exchanges presence with everyone already online
    ///
    /// The new session's presence and stats are queued to every other
    /// session. The returned bytes hold the presence and stats of all other
    /// sessions, for the caller to place in the login reply.
    pub fn add(&mut self, session: Session) -> Result<Vec<u8>, SessionError> {
        if self.sessions.contains_key(&session.id) {
            return Err(SessionError::DuplicateId(session.id));
        }
        if self.tokens.contains_key(&session.token) {
            return Err(SessionError::DuplicateToken);
        }
        if self.find_by_name(&session.safe_name).is_some() {
            return Err(SessionError::DuplicateName(session.username.clone()));
        }

        let announcement = session.presence_and_stats();
        let mut snapshot = Vec::new();

        for other in self.sessions.values_mut() {
            other.enqueue(&announcement);
            snapshot.extend(other.presence_and_stats());
        }

        info!("Session {} ({}) added", session.username, session.id);
        self.tokens.insert(session.token.clone(), session.id);
        self.sessions.insert(session.id, session);

        Ok(snapshot)
    }

    /// Drops a session from the table without any teardown
    pub(crate) fn remove(&mut self, id: i32) -> Option<Session> {
        let session = self.sessions.remove(&id)?;
        self.tokens.remove(&session.token);
        info!("Session {} ({}) removed", session.username, session.id);
        Some(session)
    }

    pub fn get(&self, id: i32) -> Option<&Session> {
        self.sessions.get(&id)
    }

    pub fn get_mut(&mut self, id: i32) -> Option<&mut Session> {
        self.sessions.get_mut(&id)
    }

    pub fn contains(&self, id: i32) -> bool {
        self.sessions.contains_key(&id)
    }

    /// Resolves a session token to a session id
    pub fn find_by_token(&self, token: &str) -> Option<i32> {
        self.tokens.get(token).copied()
    }

    /// Resolves a username, ignoring case and spaces
    pub fn find_by_name(&self, name: &str) -> Option<i32> {
        let wanted = normalize_name(name);
        self.sessions
            .values()
            .find(|session| session.safe_name == wanted)
            .map(|session| session.id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Session> {
        self.sessions.values()
    }

    /// All session ids in ascending order
    pub fn ids(&self) -> Vec<i32> {
        self.sessions.keys().copied().collect()
    }

    /// Queues bytes for one session; false if it is not online
    pub fn enqueue(&mut self, id: i32, bytes: &[u8]) -> bool {
        match self.sessions.get_mut(&id) {
            Some(session) => {
                session.enqueue(bytes);
                true
            }
            None => false,
        }
    }

    /// Drains one session's queue
    pub fn dequeue(&mut self, id: i32) -> Vec<u8> {
        self.sessions
            .get_mut(&id)
            .map(Session::dequeue)
            .unwrap_or_default()
    }

    /// Queues bytes for every session
    pub fn broadcast(&mut self, bytes: &[u8]) {
        for session in self.sessions.values_mut() {
            session.enqueue(bytes);
        }
    }

    /// Queues bytes for every session except `exclude`
    pub fn broadcast_except(&mut self, bytes: &[u8], exclude: i32) {
        for session in self.sessions.values_mut().filter(|s| s.id != exclude) {
            session.enqueue(bytes);
        }
    }

    pub fn notify(&mut self, id: i32, text: &str) {
        if let Some(session) = self.sessions.get_mut(&id) {
            session.notify(text);
        }
    }

    /// Ids of sessions that have not polled within `timeout`, bot excluded
    pub fn timed_out(&self, timeout: Duration) -> Vec<i32> {
        self.sessions
            .values()
            .filter(|session| !session.is_bot && session.is_timed_out(timeout))
            .map(|session| session.id)
            .collect()
    }

    /// Number of sessions, bot included
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

/// Test suite for session bookkeeping
///
/// Covers queue semantics, lookups, presence fan-out on add and idle
/// detection.
#[cfg(test)]
mod tests {
    use super::*;
    use shared::{split_packets, ServerPacketId};

    fn verified(id: i32, name: &str) -> Session {
        Session::new(id, name, Privileges::USER | Privileges::VERIFIED)
    }

    #[test]
    fn test_session_creation() {
        let session = verified(3, "Cool Guy");

        assert_eq!(session.id, 3);
        assert_eq!(session.safe_name, "cool_guy");
        assert_eq!(session.token.len(), 36);
        assert_eq!(session.pending(), 0);
        assert!(!session.is_restricted());
    }

    #[test]
    fn test_unverified_session_is_restricted() {
        let session = Session::new(3, "new", Privileges::USER);
        assert!(session.is_restricted());
    }

    #[test]
    fn test_dequeue_drains_queue() {
        let mut session = verified(3, "a");
        session.enqueue(&[1, 2]);
        session.enqueue(&[3]);

        assert_eq!(session.dequeue(), vec![1, 2, 3]);
        assert!(session.dequeue().is_empty());
    }

    #[test]
    fn test_broadcasts_concatenate_in_order() {
        let mut store = SessionStore::new();
        store.add(verified(3, "a")).unwrap();
        store.dequeue(3);

        store.broadcast(&packets::pong());
        store.broadcast(&packets::notification("x"));

        let mut expected = packets::pong();
        expected.extend(packets::notification("x"));
        assert_eq!(store.dequeue(3), expected);
    }

    #[test]
    fn test_bot_discards_queue() {
        let mut bot = Session::bot(1, "BanchoBot", 0);
        bot.enqueue(&[1, 2, 3]);
        assert_eq!(bot.pending(), 0);
    }

    #[test]
    fn test_add_exchanges_presence() {
        let mut store = SessionStore::new();
        let first = store.add(verified(3, "alice")).unwrap();
        assert!(first.is_empty());

        let snapshot = store.add(verified(4, "bob")).unwrap();
        let ids: Vec<u16> = split_packets(&snapshot).iter().map(|(id, _)| *id).collect();
        assert_eq!(
            ids,
            vec![
                u16::from(ServerPacketId::UserPresence),
                u16::from(ServerPacketId::UserStats)
            ]
        );

        let alice_queue = store.dequeue(3);
        assert_eq!(split_packets(&alice_queue).len(), 2);
        assert!(store.dequeue(4).is_empty());
    }

    #[test]
    fn test_add_rejects_duplicates() {
        let mut store = SessionStore::new();
        store.add(verified(3, "alice")).unwrap();

        assert_eq!(
            store.add(verified(3, "other")).unwrap_err(),
            SessionError::DuplicateId(3)
        );
        assert!(matches!(
            store.add(verified(9, "ALICE")).unwrap_err(),
            SessionError::DuplicateName(_)
        ));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_lookup_by_token_and_name() {
        let mut store = SessionStore::new();
        let session = verified(3, "Some Player");
        let token = session.token.clone();
        store.add(session).unwrap();

        assert_eq!(store.find_by_token(&token), Some(3));
        assert_eq!(store.find_by_token("nope"), None);
        assert_eq!(store.find_by_name("some_player"), Some(3));
        assert_eq!(store.find_by_name("SOME PLAYER"), Some(3));
        assert_eq!(store.find_by_name("someone"), None);
    }

    #[test]
    fn test_remove_clears_token_index() {
        let mut store = SessionStore::new();
        let session = verified(3, "a");
        let token = session.token.clone();
        store.add(session).unwrap();

        assert!(store.remove(3).is_some());
        assert!(store.remove(3).is_none());
        assert_eq!(store.find_by_token(&token), None);
        assert!(store.is_empty());
    }

    #[test]
    fn test_broadcast_except() {
        let mut store = SessionStore::new();
        store.add(verified(3, "a")).unwrap();
        store.add(verified(4, "b")).unwrap();
        store.dequeue(3);
        store.dequeue(4);

        store.broadcast_except(&packets::pong(), 3);

        assert!(store.dequeue(3).is_empty());
        assert_eq!(store.dequeue(4), packets::pong());
    }

    #[test]
    fn test_timeout_detection_skips_bot() {
        let mut store = SessionStore::new();
        store.add(Session::bot(1, "bot", 0)).unwrap();
        store.add(verified(3, "a")).unwrap();

        for id in [1, 3] {
            store.get_mut(id).unwrap().last_activity =
                Instant::now() - Duration::from_secs(60);
        }

        assert_eq!(store.timed_out(Duration::from_secs(30)), vec![3]);
    }

    #[test]
    fn test_large_pp_moves_to_ranked_score() {
        let mut session = verified(3, "a");
        session.stats.pp = 40_000;
        session.stats.ranked_score = 5;
        session.stats.accuracy = 98.5;

        let stats = session.stats_record();
        assert_eq!(stats.pp, 0);
        assert_eq!(stats.ranked_score, 40_000);
        assert!((stats.accuracy - 0.985).abs() < 1e-6);
    }
}
