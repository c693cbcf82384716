//! Login request parsing and session admission
//!
//! A login arrives as a plain-text POST body rather than framed packets:
//!
//! ```text
//! username
//! password_md5
//! version|utc_offset|display_city|client_hashes|block_nonfriend_dms
//! ```
//!
//! Parsing and credential checks happen without the world lock. Only
//! [`admit`] touches shared state, and it builds the whole initial snapshot
//! in one pass so the client sees a consistent view.

use crate::config::ServerConfig;
use crate::services::{unix_time, Account, JournalRecord, ServiceError};
use crate::session::Session;
use crate::world::World;
use log::{info, warn};
use shared::{
    packets, Privileges, LOGIN_BANNED, LOGIN_INCORRECT, LOGIN_OUTDATED_CLIENT, LOGIN_SERVER_ERROR,
    PROTOCOL_VERSION,
};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum LoginError {
    #[error("malformed login request")]
    Malformed,
    #[error("incorrect credentials")]
    IncorrectCredentials,
    #[error("{0} is already online")]
    AlreadyOnline(String),
    #[error("client build {0} is not allowed")]
    OutdatedClient(String),
    #[error("account {0} is banned")]
    Banned(String),
    #[error("collaborator failure: {0}")]
    Service(#[from] ServiceError),
}

impl LoginError {
    /// Numeric code sent in place of a user id
    pub fn code(&self) -> i32 {
        match self {
            LoginError::Malformed
            | LoginError::IncorrectCredentials
            | LoginError::AlreadyOnline(_) => LOGIN_INCORRECT,
            LoginError::OutdatedClient(_) => LOGIN_OUTDATED_CLIENT,
            LoginError::Banned(_) => LOGIN_BANNED,
            LoginError::Service(_) => LOGIN_SERVER_ERROR,
        }
    }

    /// Response body for a failed login
    pub fn response(&self) -> Vec<u8> {
        let mut body = Vec::new();
        if let LoginError::AlreadyOnline(_) = self {
            body.extend(packets::notification("You're already online!"));
        }
        body.extend(packets::user_id(self.code()));
        body
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct LoginRequest {
    pub username: String,
    pub password_md5: String,
    pub client_version: String,
    pub utc_offset: i8,
    pub display_city: bool,
    pub client_hashes: String,
    pub block_non_friend_dms: bool,
}

impl LoginRequest {
    pub fn parse(body: &[u8]) -> Result<Self, LoginError> {
        let text = std::str::from_utf8(body).map_err(|_| LoginError::Malformed)?;
        let mut lines = text.lines();

        let username = lines.next().map(str::trim).unwrap_or_default();
        let password_md5 = lines.next().map(str::trim).unwrap_or_default();
        let client_line = lines.next().ok_or(LoginError::Malformed)?;
        if username.is_empty() || password_md5.is_empty() {
            return Err(LoginError::Malformed);
        }

        let fields: Vec<&str> = client_line.trim().split('|').collect();
        let [version, utc_offset, display_city, client_hashes, block_dms] = fields[..] else {
            return Err(LoginError::Malformed);
        };

        Ok(Self {
            username: username.to_string(),
            password_md5: password_md5.to_lowercase(),
            client_version: version.to_string(),
            utc_offset: utc_offset.parse().map_err(|_| LoginError::Malformed)?,
            display_city: display_city == "1",
            client_hashes: client_hashes.to_string(),
            block_non_friend_dms: block_dms == "1",
        })
    }

    /// Rejects client builds not on the allow list
    pub fn check_client(&self, settings: &ServerConfig) -> Result<(), LoginError> {
        if settings.allowed_builds.is_empty()
            || settings.allowed_builds.contains(&self.client_version)
        {
            Ok(())
        } else {
            Err(LoginError::OutdatedClient(self.client_version.clone()))
        }
    }

    /// Checks the supplied password against the stored account
    pub fn authenticate(&self, account: Option<Account>) -> Result<Account, LoginError> {
        let account = account.ok_or(LoginError::IncorrectCredentials)?;
        if account.password_md5 != self.password_md5 {
            return Err(LoginError::IncorrectCredentials);
        }
        if account.privileges.contains(Privileges::BANNED)
            || !account.privileges.contains(Privileges::USER)
        {
            return Err(LoginError::Banned(account.username));
        }
        Ok(account)
    }
}

/// Registers a session for an authenticated account
///
/// Returns the new token and the initial snapshot body: protocol version,
/// user id, privileges, friends, own presence and stats, public channel
/// listing, auto-joined channels, everyone else's presence and stats, the
/// end of the channel listing and the closing notifications.
pub fn admit(
    world: &mut World,
    request: &LoginRequest,
    account: &Account,
) -> Result<(String, Vec<u8>), LoginError> {
    if world.sessions.contains(account.id)
        || world.sessions.find_by_name(&account.username).is_some()
    {
        warn!("{} tried to log in twice", account.username);
        return Err(LoginError::AlreadyOnline(account.username.clone()));
    }

    let mut session = Session::new(account.id, &account.username, account.privileges);
    session.country_code = account.country;
    session.utc_offset = request.utc_offset;
    session.friends = account.friends.iter().copied().collect();
    session.block_non_friend_dms = request.block_non_friend_dms;
    session.client_version = request.client_version.clone();

    let token = session.token.clone();
    let id = session.id;
    let staff = session.is_staff();
    let restricted = session.is_restricted();

    let mut head = packets::protocol_version(PROTOCOL_VERSION);
    head.extend(packets::user_id(id));
    head.extend(packets::privileges(session.client_rank().bits()));
    head.extend(packets::friends_list(&account.friends));
    head.extend(session.presence_and_stats());

    let mut auto_join = Vec::new();
    for channel in world.channels.iter() {
        let visible = if channel.staff { staff } else { channel.public };
        if !visible {
            continue;
        }
        head.extend(packets::channel_info(&channel.info()));
        if channel.auto_join || channel.staff {
            auto_join.push(channel.name.clone());
        }
    }

    let others = world
        .sessions
        .add(session)
        .map_err(|e| LoginError::AlreadyOnline(e.to_string()))?;
    world.sessions.enqueue(id, &head);

    for name in &auto_join {
        world.join_channel(id, name);
    }

    world.sessions.enqueue(id, &others);
    world.sessions.enqueue(id, &packets::channel_info_end());
    if restricted {
        world.sessions.notify(
            id,
            "Your account is currently in restricted mode. Some features are unavailable.",
        );
    }
    let welcome = world.settings.welcome_message.clone();
    if !welcome.is_empty() {
        world.sessions.notify(id, &welcome);
    }

    world.journal(JournalRecord::SessionStart {
        user_id: id,
        username: account.username.clone(),
        timestamp: unix_time(),
    });
    info!(
        "{} ({}) logged in with {} [{} online]",
        account.username,
        id,
        request.client_version,
        world.online_count()
    );

    Ok((token, world.sessions.dequeue(id)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::services::NullJournal;
    use shared::{split_packets, ServerPacketId};
    use std::sync::Arc;

    const BODY: &[u8] = b"Alice\n5F4DCC3B5AA765D61D8327DEB882CF99\nb20240101|2|0|hash:a:b:c|1\n";

    fn account(id: i32, name: &str, privileges: Privileges) -> Account {
        Account {
            id,
            username: name.to_string(),
            password_md5: "5f4dcc3b5aa765d61d8327deb882cf99".to_string(),
            privileges,
            country: 38,
            friends: vec![4],
        }
    }

    fn verified() -> Privileges {
        Privileges::USER | Privileges::VERIFIED
    }

    #[test]
    fn test_parse_login_body() {
        let request = LoginRequest::parse(BODY).unwrap();

        assert_eq!(request.username, "Alice");
        assert_eq!(request.password_md5, "5f4dcc3b5aa765d61d8327deb882cf99");
        assert_eq!(request.client_version, "b20240101");
        assert_eq!(request.utc_offset, 2);
        assert!(!request.display_city);
        assert!(request.block_non_friend_dms);
    }

    #[test]
    fn test_parse_rejects_short_bodies() {
        assert!(LoginRequest::parse(b"Alice\n").is_err());
        assert!(LoginRequest::parse(b"Alice\nabc\nb1|2|0\n").is_err());
        assert!(LoginRequest::parse(b"Alice\nabc\nb1|x|0|h|0\n").is_err());
    }

    #[test]
    fn test_authenticate() {
        let request = LoginRequest::parse(BODY).unwrap();

        assert!(request.authenticate(Some(account(3, "Alice", verified()))).is_ok());
        assert_eq!(request.authenticate(None).unwrap_err().code(), LOGIN_INCORRECT);

        let mut wrong = account(3, "Alice", verified());
        wrong.password_md5 = "0".repeat(32);
        assert_eq!(request.authenticate(Some(wrong)).unwrap_err().code(), LOGIN_INCORRECT);

        let banned = account(3, "Alice", Privileges::USER | Privileges::BANNED);
        assert_eq!(request.authenticate(Some(banned)).unwrap_err().code(), LOGIN_BANNED);
    }

    #[test]
    fn test_allowed_builds() {
        let request = LoginRequest::parse(BODY).unwrap();
        let mut settings = ServerConfig::default();
        assert!(request.check_client(&settings).is_ok());

        settings.allowed_builds = vec!["b20990101".to_string()];
        assert_eq!(
            request.check_client(&settings).unwrap_err().code(),
            LOGIN_OUTDATED_CLIENT
        );
    }

    #[test]
    fn test_snapshot_order() {
        let mut world = World::new(&Config::default(), Arc::new(NullJournal));
        let request = LoginRequest::parse(BODY).unwrap();

        let (token, body) = admit(&mut world, &request, &account(3, "Alice", verified())).unwrap();
        let ids: Vec<u16> = split_packets(&body).into_iter().map(|(id, _)| id).collect();

        assert_eq!(world.sessions.find_by_token(&token), Some(3));
        assert_eq!(
            &ids[..6],
            &[
                u16::from(ServerPacketId::ProtocolVersion),
                u16::from(ServerPacketId::UserId),
                u16::from(ServerPacketId::Privileges),
                u16::from(ServerPacketId::FriendsList),
                u16::from(ServerPacketId::UserPresence),
                u16::from(ServerPacketId::UserStats),
            ]
        );
        assert!(ids.contains(&u16::from(ServerPacketId::ChannelJoinSuccess)));
        assert_eq!(
            ids[ids.len() - 2..],
            [
                u16::from(ServerPacketId::ChannelInfoEnd),
                u16::from(ServerPacketId::Notification)
            ]
        );
        assert!(world.channels.get("#osu").unwrap().contains(3));
    }

    #[test]
    fn test_second_login_rejected() {
        let mut world = World::new(&Config::default(), Arc::new(NullJournal));
        let request = LoginRequest::parse(BODY).unwrap();
        admit(&mut world, &request, &account(3, "Alice", verified())).unwrap();

        let err = admit(&mut world, &request, &account(3, "Alice", verified())).unwrap_err();
        assert!(matches!(err, LoginError::AlreadyOnline(_)));
        let ids: Vec<u16> = split_packets(&err.response()).into_iter().map(|(id, _)| id).collect();
        assert_eq!(
            ids,
            vec![
                u16::from(ServerPacketId::Notification),
                u16::from(ServerPacketId::UserId)
            ]
        );
    }

    #[test]
    fn test_restricted_login_is_told() {
        let mut world = World::new(&Config::default(), Arc::new(NullJournal));
        let request = LoginRequest::parse(BODY).unwrap();

        let (_, body) = admit(&mut world, &request, &account(3, "Alice", Privileges::USER)).unwrap();
        let notifications = split_packets(&body)
            .into_iter()
            .filter(|(id, _)| *id == u16::from(ServerPacketId::Notification))
            .count();

        assert_eq!(notifications, 2);
        assert!(world.sessions.get(3).unwrap().is_restricted());
    }
}
