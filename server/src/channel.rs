//! Chat channels and their membership

use crate::config::ChannelConfig;
use crate::session::SessionStore;
use log::{debug, info, warn};
use shared::records::{ChannelInfo, ChatMessage};
use shared::packets;
use thiserror::Error;

/// Display name every match chat is shown under
pub const MULTIPLAYER_DISPLAY: &str = "#multiplayer";
/// Display name every spectator chat is shown under
pub const SPECTATOR_DISPLAY: &str = "#spectator";
/// Channel whose members receive lobby broadcasts
pub const LOBBY_CHANNEL: &str = "#lobby";

pub fn match_channel_name(match_id: i16) -> String {
    format!("#multi_{}", match_id)
}

pub fn spectator_channel_name(host_id: i32) -> String {
    format!("#spect_{}", host_id)
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ChannelError {
    #[error("channel {0} does not exist")]
    Unknown(String),
    #[error("sender is not a member of {0}")]
    NotMember(String),
    #[error("{0} is read only")]
    ReadOnly(String),
}

/// A named broadcast group
#[derive(Debug, Clone)]
pub struct Channel {
    /// Canonical name, unique in the registry
    pub name: String,
    /// Name the client sees; differs from `name` for match and spectator chats
    pub display_name: String,
    pub topic: String,
    pub public: bool,
    pub read_only: bool,
    pub auto_join: bool,
    pub staff: bool,
    /// Removed from the registry once the last member leaves
    pub ephemeral: bool,
    members: Vec<i32>,
}

impl Channel {
    pub fn from_config(config: &ChannelConfig) -> Self {
        Self {
            name: config.name.clone(),
            display_name: config.name.clone(),
            topic: config.topic.clone(),
            public: config.public,
            read_only: config.read_only,
            auto_join: config.auto_join,
            staff: config.staff,
            ephemeral: false,
            members: Vec::new(),
        }
    }

    /// Creates a private channel that disappears when empty
    pub fn ephemeral(name: &str, display_name: &str, topic: &str) -> Self {
        Self {
            name: name.to_string(),
            display_name: display_name.to_string(),
            topic: topic.to_string(),
            public: false,
            read_only: false,
            auto_join: false,
            staff: false,
            ephemeral: true,
            members: Vec::new(),
        }
    }

    pub fn members(&self) -> &[i32] {
        &self.members
    }

    pub fn contains(&self, session_id: i32) -> bool {
        self.members.contains(&session_id)
    }

    pub fn info(&self) -> ChannelInfo {
        ChannelInfo {
            name: self.display_name.clone(),
            topic: self.topic.clone(),
            user_count: self.members.len() as i32,
        }
    }

    /// Queues bytes for every member except `exclude`
    pub fn enqueue(&self, sessions: &mut SessionStore, bytes: &[u8], exclude: Option<i32>) {
        for &member in self.members.iter().filter(|&&m| Some(m) != exclude) {
            sessions.enqueue(member, bytes);
        }
    }

    /// Sends the member count to everyone who should see it
    fn announce_info(&self, sessions: &mut SessionStore) {
        let bytes = packets::channel_info(&self.info());
        if self.ephemeral {
            self.enqueue(sessions, &bytes, None);
        } else {
            sessions.broadcast(&bytes);
        }
    }
}

/// Every live channel, permanent ones first in configuration order
#[derive(Debug, Default)]
pub struct ChannelRegistry {
    channels: Vec<Channel>,
}

impl ChannelRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_config(configs: &[ChannelConfig]) -> Self {
        Self {
            channels: configs.iter().map(Channel::from_config).collect(),
        }
    }

    pub fn get(&self, name: &str) -> Option<&Channel> {
        self.channels.iter().find(|c| c.name == name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Channel> {
        self.channels.iter()
    }

    pub fn len(&self) -> usize {
        self.channels.len()
    }

    /// Adds a channel unless one with the same name already exists
    pub fn insert(&mut self, channel: Channel) -> bool {
        if self.contains(&channel.name) {
            return false;
        }
        debug!("Channel {} created", channel.name);
        self.channels.push(channel);
        true
    }

    /// Drops a channel without notifying anyone
    pub fn remove(&mut self, name: &str) -> Option<Channel> {
        let index = self.position(name)?;
        debug!("Channel {} removed", name);
        Some(self.channels.remove(index))
    }

    fn position(&self, name: &str) -> Option<usize> {
        self.channels.iter().position(|c| c.name == name)
    }

    /// Adds a session to a channel
    ///
    /// Returns false without changing anything when the channel is unknown,
    /// the session is already a member or the channel is staff-only and the
    /// session is not staff.
    pub fn join(&mut self, sessions: &mut SessionStore, name: &str, session_id: i32) -> bool {
        let Some(index) = self.position(name) else {
            warn!("Session {} tried to join unknown channel {}", session_id, name);
            return false;
        };
        let Some(session) = sessions.get_mut(session_id) else {
            return false;
        };

        let channel = &mut self.channels[index];
        if channel.contains(session_id) {
            warn!("{} is already in {}", session.username, channel.name);
            return false;
        }
        if channel.staff && !session.is_staff() {
            warn!(
                "{} tried to join staff channel {} without privileges",
                session.username, channel.name
            );
            return false;
        }

        channel.members.push(session_id);
        session.channels.push(channel.name.clone());
        session.enqueue(&packets::channel_join_success(&channel.display_name));
        info!("{} joined {}", session.username, channel.name);

        channel.announce_info(sessions);
        true
    }

    /// Removes a session from a channel
    ///
    /// With `kick` set the session is told it left. An ephemeral channel is
    /// dropped from the registry once empty.
    pub fn part(
        &mut self,
        sessions: &mut SessionStore,
        name: &str,
        session_id: i32,
        kick: bool,
    ) -> bool {
        let Some(index) = self.position(name) else {
            return false;
        };
        let channel = &mut self.channels[index];
        if !channel.contains(session_id) {
            debug!("Session {} is not in {}", session_id, channel.name);
            return false;
        }

        channel.members.retain(|&m| m != session_id);
        if let Some(session) = sessions.get_mut(session_id) {
            session.channels.retain(|c| c != name);
            if kick {
                session.enqueue(&packets::channel_kick(&channel.display_name));
            }
            info!("{} parted from {}", session.username, channel.name);
        }

        if channel.ephemeral && channel.members.is_empty() {
            debug!("Channel {} removed", channel.name);
            self.channels.remove(index);
        } else {
            channel.announce_info(sessions);
        }
        true
    }

    /// Delivers a chat message to every member except the sender
    ///
    /// A sender must be a member unless the channel is read-only, and only
    /// staff may speak in read-only channels. The bot is never checked.
    pub fn send(
        &self,
        sessions: &mut SessionStore,
        name: &str,
        sender_id: i32,
        text: &str,
    ) -> Result<(), ChannelError> {
        let channel = self
            .get(name)
            .ok_or_else(|| ChannelError::Unknown(name.to_string()))?;
        let sender = sessions
            .get(sender_id)
            .ok_or_else(|| ChannelError::NotMember(name.to_string()))?;

        if !sender.is_bot {
            if !channel.contains(sender_id) && !channel.read_only {
                return Err(ChannelError::NotMember(name.to_string()));
            }
            if channel.read_only && !sender.is_staff() {
                return Err(ChannelError::ReadOnly(name.to_string()));
            }
        }

        let message = ChatMessage {
            sender: sender.username.clone(),
            text: text.to_string(),
            target: channel.display_name.clone(),
            sender_id,
        };
        info!("<{}> {} [{}]", sender.username, text, channel.name);

        channel.enqueue(sessions, &packets::send_message(&message), Some(sender_id));
        Ok(())
    }

    /// Queues raw bytes for the members of a channel
    pub fn broadcast(
        &self,
        sessions: &mut SessionStore,
        name: &str,
        bytes: &[u8],
        exclude: Option<i32>,
    ) {
        if let Some(channel) = self.get(name) {
            channel.enqueue(sessions, bytes, exclude);
        }
    }
}
