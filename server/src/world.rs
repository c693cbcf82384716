//! Server-wide state shared by every request
//!
//! `World` owns the session store, the channel registry and the match
//! registry. The dispatcher keeps it behind a single async mutex, so every
//! method here runs with exclusive access and may touch all three tables in
//! one step. Match transitions live in `multiplayer.rs`.

use crate::channel::{
    spectator_channel_name, Channel, ChannelError, ChannelRegistry, LOBBY_CHANNEL,
    MULTIPLAYER_DISPLAY, SPECTATOR_DISPLAY,
};
use crate::config::{Config, ServerConfig};
use crate::matches::MatchRegistry;
use crate::services::{unix_time, Journal, JournalRecord};
use crate::session::{Session, SessionStore};
use log::{info, warn};
use shared::records::{ChatMessage, StatusChange};
use shared::packets;
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Instant;

fn not_connected(channel: &str) -> String {
    format!(
        "You can't send messages to a channel ({}), you're not already connected to.",
        channel
    )
}

/// How a private message was handled
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PrivateDelivery {
    Delivered,
    /// Addressed to the bot; the text should be evaluated as a command
    ToBot,
    Offline,
    /// The recipient only accepts messages from friends
    Blocked,
}

/// Every table the server mutates, guarded together by one lock
#[derive(Debug)]
pub struct World {
    pub sessions: SessionStore,
    pub channels: ChannelRegistry,
    pub matches: MatchRegistry,
    pub settings: ServerConfig,
    pub bot_id: i32,
    pub started: Instant,
    journal: Arc<dyn Journal>,
}

impl World {
    /// Builds the world with the configured channels and the bot online
    pub fn new(config: &Config, journal: Arc<dyn Journal>) -> Self {
        let mut sessions = SessionStore::new();
        let bot = Session::bot(config.bot.id, &config.bot.username, config.bot.country);
        if let Err(e) = sessions.add(bot) {
            warn!("Failed to register bot: {}", e);
        }

        Self {
            sessions,
            channels: ChannelRegistry::from_config(&config.channels),
            matches: MatchRegistry::new(config.server.first_match_id),
            settings: config.server.clone(),
            bot_id: config.bot.id,
            started: Instant::now(),
            journal,
        }
    }

    pub fn journal(&self, record: JournalRecord) {
        self.journal.record(record);
    }

    /// Sessions visible to players, the bot excluded
    pub fn online_count(&self) -> usize {
        self.sessions.iter().filter(|s| !s.is_bot).count()
    }

    /// Members of the lobby channel plus sessions browsing the lobby
    pub fn lobby_audience(&self) -> Vec<i32> {
        let mut audience: BTreeSet<i32> = self
            .channels
            .get(LOBBY_CHANNEL)
            .map(|c| c.members().iter().copied().collect())
            .unwrap_or_default();
        audience.extend(self.sessions.iter().filter(|s| s.in_lobby).map(|s| s.id));
        audience.into_iter().collect()
    }

    /// Queues bytes for the lobby audience, skipping `exclude`
    pub fn enqueue_lobby(&mut self, bytes: &[u8], exclude: &[i32]) {
        for id in self.lobby_audience() {
            if !exclude.contains(&id) {
                self.sessions.enqueue(id, bytes);
            }
        }
    }

    pub fn join_channel(&mut self, session_id: i32, name: &str) -> bool {
        self.channels.join(&mut self.sessions, name, session_id)
    }

    pub fn part_channel(&mut self, session_id: i32, name: &str) -> bool {
        self.channels.part(&mut self.sessions, name, session_id, true)
    }

    /// Maps the name a client typed to a canonical channel name
    ///
    /// `#multiplayer` and `#spectator` resolve to the sender's own match or
    /// spectator chat.
    pub fn resolve_channel(&self, session_id: i32, target: &str) -> Option<String> {
        let session = self.sessions.get(session_id)?;
        match target {
            MULTIPLAYER_DISPLAY => {
                let game = self.matches.get(session.match_id?)?;
                Some(game.chat_channel())
            }
            SPECTATOR_DISPLAY => {
                let host = if !session.spectators.is_empty() {
                    session.id
                } else {
                    session.spectating?
                };
                Some(spectator_channel_name(host))
            }
            name => Some(name.to_string()),
        }
    }

    /// Posts a public message, returning the canonical channel it went to
    pub fn send_public(&mut self, session_id: i32, target: &str, text: &str) -> Option<String> {
        let Some(channel) = self.resolve_channel(session_id, target) else {
            self.sessions.notify(session_id, &not_connected(target));
            return None;
        };

        match self.channels.send(&mut self.sessions, &channel, session_id, text) {
            Ok(()) => Some(channel),
            Err(ChannelError::ReadOnly(_)) => {
                warn!("Session {} tried to talk in read-only {}", session_id, channel);
                None
            }
            Err(e) => {
                warn!("Public message from {} dropped: {}", session_id, e);
                self.sessions.notify(session_id, &not_connected(target));
                None
            }
        }
    }

    /// Posts a message from the bot to a channel
    pub fn bot_say(&mut self, channel: &str, text: &str) {
        if let Err(e) = self.channels.send(&mut self.sessions, channel, self.bot_id, text) {
            warn!("Bot message to {} dropped: {}", channel, e);
        }
    }

    /// Builds a direct message addressed to `recipient`
    fn direct_message(&self, sender_id: i32, recipient_id: i32, text: &str) -> Option<ChatMessage> {
        let sender = self.sessions.get(sender_id)?;
        let recipient = self.sessions.get(recipient_id)?;
        Some(ChatMessage {
            sender: sender.username.clone(),
            text: text.to_string(),
            target: recipient.username.clone(),
            sender_id,
        })
    }

    /// Sends a private message by recipient username
    pub fn send_private(&mut self, sender_id: i32, recipient: &str, text: &str) -> PrivateDelivery {
        let Some(recipient_id) = self.sessions.find_by_name(recipient) else {
            self.sessions.notify(
                sender_id,
                "The player you're trying to reach is currently offline.",
            );
            return PrivateDelivery::Offline;
        };
        if recipient_id == self.bot_id {
            return PrivateDelivery::ToBot;
        }

        let blocked = self
            .sessions
            .get(recipient_id)
            .map(|r| r.block_non_friend_dms && !r.friends.contains(&sender_id))
            .unwrap_or(false);
        if blocked {
            info!("Message from {} to {} blocked", sender_id, recipient_id);
            return PrivateDelivery::Blocked;
        }

        if let Some(message) = self.direct_message(sender_id, recipient_id, text) {
            self.sessions
                .enqueue(recipient_id, &packets::send_message(&message));
        }
        PrivateDelivery::Delivered
    }

    /// Sends a private message from the bot
    pub fn bot_whisper(&mut self, recipient_id: i32, text: &str) {
        if let Some(message) = self.direct_message(self.bot_id, recipient_id, text) {
            self.sessions
                .enqueue(recipient_id, &packets::send_message(&message));
        }
    }

    /// Applies a client's change-action packet
    pub fn change_status(&mut self, session_id: i32, change: StatusChange) {
        let Some(session) = self.sessions.get_mut(session_id) else {
            return;
        };
        session.status.action = change.action;
        session.status.text = change.text.trim().to_string();
        session.status.map_hash = change.map_hash;
        session.status.mods = change.mods;
        session.status.mode = change.mode;
        session.status.map_id = change.map_id;

        let restricted = session.is_restricted();
        let stats = packets::user_stats(&session.stats_record());
        self.journal(JournalRecord::StatusChange {
            user_id: session_id,
            action: change.action,
            text: change.text,
            map_id: change.map_id,
        });

        if !restricted {
            self.sessions.broadcast(&stats);
        }
    }

    /// Adds or removes a friend; only online targets are accepted
    pub fn set_friend(&mut self, session_id: i32, target: i32, add: bool) -> bool {
        if target == session_id || !self.sessions.contains(target) {
            return false;
        }
        let Some(session) = self.sessions.get_mut(session_id) else {
            return false;
        };
        let changed = if add {
            session.friends.insert(target)
        } else {
            session.friends.remove(&target)
        };
        if changed {
            info!(
                "{} {} friend {}",
                session.username,
                if add { "added" } else { "removed" },
                target
            );
        }
        changed
    }

    /// Starts watching `host_id`, leaving any previous host first
    pub fn start_spectating(&mut self, spectator_id: i32, host_id: i32) -> bool {
        if spectator_id == host_id {
            warn!("Session {} tried to spectate itself", spectator_id);
            return false;
        }
        if !self.sessions.contains(host_id) {
            return false;
        }
        let current = self.sessions.get(spectator_id).and_then(|s| s.spectating);
        match current {
            Some(host) if host == host_id => return false,
            Some(_) => self.stop_spectating(spectator_id),
            None => {}
        }

        let channel = spectator_channel_name(host_id);
        if !self.channels.contains(&channel) {
            let host_name = self
                .sessions
                .get(host_id)
                .map(|h| h.username.clone())
                .unwrap_or_default();
            self.channels.insert(Channel::ephemeral(
                &channel,
                SPECTATOR_DISPLAY,
                &format!("Spectator chat for {}", host_name),
            ));
            self.join_channel(host_id, &channel);
        }
        self.join_channel(spectator_id, &channel);

        let fellows = self
            .sessions
            .get(host_id)
            .map(|h| h.spectators.clone())
            .unwrap_or_default();
        let joined = packets::fellow_spectator_joined(spectator_id);
        for fellow in fellows {
            self.sessions.enqueue(fellow, &joined);
            self.sessions
                .enqueue(spectator_id, &packets::fellow_spectator_joined(fellow));
        }

        if let Some(host) = self.sessions.get_mut(host_id) {
            host.spectators.push(spectator_id);
            host.enqueue(&packets::spectator_joined(spectator_id));
        }
        if let Some(spectator) = self.sessions.get_mut(spectator_id) {
            spectator.spectating = Some(host_id);
            info!("{} started spectating {}", spectator.username, host_id);
        }
        true
    }

    /// Stops watching the current host, if any
    pub fn stop_spectating(&mut self, spectator_id: i32) {
        let Some(host_id) = self
            .sessions
            .get_mut(spectator_id)
            .and_then(|s| s.spectating.take())
        else {
            return;
        };

        let channel = spectator_channel_name(host_id);
        self.part_channel(spectator_id, &channel);

        let remaining = match self.sessions.get_mut(host_id) {
            Some(host) => {
                host.spectators.retain(|&s| s != spectator_id);
                host.enqueue(&packets::spectator_left(spectator_id));
                host.spectators.clone()
            }
            None => Vec::new(),
        };

        if remaining.is_empty() {
            self.part_channel(host_id, &channel);
        } else {
            let left = packets::fellow_spectator_left(spectator_id);
            for fellow in remaining {
                self.sessions.enqueue(fellow, &left);
            }
        }
        info!("Session {} stopped spectating {}", spectator_id, host_id);
    }

    /// Relays replay frames to everyone watching `host_id`
    pub fn relay_frames(&mut self, host_id: i32, frames: &[u8]) {
        let spectators = match self.sessions.get(host_id) {
            Some(host) if !host.spectators.is_empty() => host.spectators.clone(),
            _ => return,
        };
        let bytes = packets::spectate_frames(frames);
        for spectator in spectators.into_iter().filter(|&s| s != host_id) {
            self.sessions.enqueue(spectator, &bytes);
        }
    }

    /// Tells the host and its spectators that `session_id` lacks the map
    pub fn cant_spectate(&mut self, session_id: i32) {
        let Some(host_id) = self.sessions.get(session_id).and_then(|s| s.spectating) else {
            return;
        };
        let bytes = packets::cant_spectate(session_id);
        let spectators = self
            .sessions
            .get(host_id)
            .map(|h| h.spectators.clone())
            .unwrap_or_default();

        self.sessions.enqueue(host_id, &bytes);
        for spectator in spectators {
            self.sessions.enqueue(spectator, &bytes);
        }
    }

    /// Checks that a session's links agree with the tables they point into
    pub fn is_consistent(&self, session_id: i32) -> bool {
        let Some(session) = self.sessions.get(session_id) else {
            return false;
        };

        let seated = self.matches.seating(session_id);
        let match_ok = match session.match_id {
            Some(id) => seated == [id],
            None => seated.is_empty(),
        };

        let spectate_ok = match session.spectating {
            Some(host) => self
                .sessions
                .get(host)
                .map(|h| h.spectators.contains(&session_id))
                .unwrap_or(false),
            None => true,
        };

        match_ok && spectate_ok
    }

    /// Removes a session and everything that refers to it
    ///
    /// Leaves spectating in both directions, the match and every channel,
    /// then tells everyone else the player is gone. Returns the removed
    /// session so callers can flush what was still queued for it.
    pub fn logout(&mut self, session_id: i32) -> Option<Session> {
        if !self.sessions.contains(session_id) || session_id == self.bot_id {
            return None;
        }

        self.stop_spectating(session_id);
        let spectators = self
            .sessions
            .get(session_id)
            .map(|s| s.spectators.clone())
            .unwrap_or_default();
        for spectator in spectators {
            self.stop_spectating(spectator);
        }

        self.leave_match(session_id);
        for stray in self.matches.seating(session_id) {
            self.evict(stray, session_id);
        }

        let channels = self
            .sessions
            .get(session_id)
            .map(|s| s.channels.clone())
            .unwrap_or_default();
        for channel in channels {
            self.channels
                .part(&mut self.sessions, &channel, session_id, false);
        }

        let session = self.sessions.remove(session_id)?;
        self.sessions.broadcast(&packets::user_logout(session_id));
        self.journal(JournalRecord::SessionEnd {
            user_id: session_id,
            timestamp: unix_time(),
        });
        info!("{} logged out", session.username);

        Some(session)
    }
}
