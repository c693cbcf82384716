//! Builders for complete packets
//!
//! Functions at the top level produce server-to-client packets. The
//! [`client`] module builds client-to-server packets; the server never sends
//! those, but tests and tooling use them to drive the dispatcher.

use crate::ids::ServerPacketId;
use crate::records::{ChannelInfo, ChatMessage, MatchRecord, ScoreFrame, UserPresence, UserStats};
use crate::writer::PacketWriter;

fn empty(id: ServerPacketId) -> Vec<u8> {
    PacketWriter::new(id).finish()
}

fn with_i32(id: ServerPacketId, value: i32) -> Vec<u8> {
    let mut writer = PacketWriter::new(id);
    writer.write_i32(value);
    writer.finish()
}

fn with_string(id: ServerPacketId, value: &str) -> Vec<u8> {
    let mut writer = PacketWriter::new(id);
    writer.write_string(value);
    writer.finish()
}

fn with_match(id: ServerPacketId, record: &MatchRecord) -> Vec<u8> {
    let mut writer = PacketWriter::new(id);
    record.encode(&mut writer);
    writer.finish()
}

/// Login reply: the session's user id, or a negative failure code
pub fn user_id(id: i32) -> Vec<u8> {
    with_i32(ServerPacketId::UserId, id)
}

pub fn protocol_version(version: i32) -> Vec<u8> {
    with_i32(ServerPacketId::ProtocolVersion, version)
}

/// Client rank bits, widened to the int32 the client expects
pub fn privileges(rank_bits: u8) -> Vec<u8> {
    with_i32(ServerPacketId::Privileges, i32::from(rank_bits))
}

pub fn friends_list(ids: &[i32]) -> Vec<u8> {
    let mut writer = PacketWriter::new(ServerPacketId::FriendsList);
    writer.write_i32_list(ids);
    writer.finish()
}

pub fn notification(text: &str) -> Vec<u8> {
    with_string(ServerPacketId::Notification, text)
}

pub fn pong() -> Vec<u8> {
    empty(ServerPacketId::Pong)
}

/// Asks the client to reconnect after `delay_ms`
pub fn restart(delay_ms: i32) -> Vec<u8> {
    with_i32(ServerPacketId::Restart, delay_ms)
}

pub fn user_presence(presence: &UserPresence) -> Vec<u8> {
    let mut writer = PacketWriter::new(ServerPacketId::UserPresence);
    presence.encode(&mut writer);
    writer.finish()
}

pub fn user_stats(stats: &UserStats) -> Vec<u8> {
    let mut writer = PacketWriter::new(ServerPacketId::UserStats);
    stats.encode(&mut writer);
    writer.finish()
}

pub fn user_logout(user_id: i32) -> Vec<u8> {
    let mut writer = PacketWriter::new(ServerPacketId::UserLogout);
    writer.write_i32(user_id);
    writer.write_u8(0);
    writer.finish()
}

pub fn send_message(message: &ChatMessage) -> Vec<u8> {
    let mut writer = PacketWriter::new(ServerPacketId::SendMessage);
    message.encode(&mut writer);
    writer.finish()
}

pub fn channel_join_success(name: &str) -> Vec<u8> {
    with_string(ServerPacketId::ChannelJoinSuccess, name)
}

pub fn channel_kick(name: &str) -> Vec<u8> {
    with_string(ServerPacketId::ChannelKick, name)
}

pub fn channel_auto_join(name: &str) -> Vec<u8> {
    with_string(ServerPacketId::ChannelAutoJoin, name)
}

pub fn channel_info(info: &ChannelInfo) -> Vec<u8> {
    let mut writer = PacketWriter::new(ServerPacketId::ChannelInfo);
    info.encode(&mut writer);
    writer.finish()
}

pub fn channel_info_end() -> Vec<u8> {
    empty(ServerPacketId::ChannelInfoEnd)
}

pub fn spectator_joined(user_id: i32) -> Vec<u8> {
    with_i32(ServerPacketId::SpectatorJoined, user_id)
}

pub fn spectator_left(user_id: i32) -> Vec<u8> {
    with_i32(ServerPacketId::SpectatorLeft, user_id)
}

pub fn fellow_spectator_joined(user_id: i32) -> Vec<u8> {
    with_i32(ServerPacketId::FellowSpectatorJoined, user_id)
}

pub fn fellow_spectator_left(user_id: i32) -> Vec<u8> {
    with_i32(ServerPacketId::FellowSpectatorLeft, user_id)
}

/// Replay frames relayed verbatim from the spectated player
pub fn spectate_frames(frames: &[u8]) -> Vec<u8> {
    let mut writer = PacketWriter::new(ServerPacketId::SpectateFrames);
    writer.write_bytes(frames);
    writer.finish()
}

pub fn cant_spectate(user_id: i32) -> Vec<u8> {
    with_i32(ServerPacketId::CantSpectate, user_id)
}

pub fn new_match(record: &MatchRecord) -> Vec<u8> {
    with_match(ServerPacketId::NewMatch, record)
}

pub fn update_match(record: &MatchRecord) -> Vec<u8> {
    with_match(ServerPacketId::UpdateMatch, record)
}

pub fn dispose_match(match_id: i32) -> Vec<u8> {
    with_i32(ServerPacketId::DisposeMatch, match_id)
}

pub fn match_join_success(record: &MatchRecord) -> Vec<u8> {
    with_match(ServerPacketId::MatchJoinSuccess, record)
}

pub fn match_join_fail() -> Vec<u8> {
    empty(ServerPacketId::MatchJoinFail)
}

pub fn match_start(record: &MatchRecord) -> Vec<u8> {
    with_match(ServerPacketId::MatchStart, record)
}

pub fn match_score_update(frame: &ScoreFrame) -> Vec<u8> {
    let mut writer = PacketWriter::new(ServerPacketId::MatchScoreUpdate);
    frame.encode(&mut writer);
    writer.finish()
}

pub fn match_transfer_host() -> Vec<u8> {
    empty(ServerPacketId::MatchTransferHost)
}

pub fn match_all_players_loaded() -> Vec<u8> {
    empty(ServerPacketId::MatchAllPlayersLoaded)
}

pub fn match_player_failed(slot_id: i32) -> Vec<u8> {
    with_i32(ServerPacketId::MatchPlayerFailed, slot_id)
}

pub fn match_complete() -> Vec<u8> {
    empty(ServerPacketId::MatchComplete)
}

pub fn match_player_skipped(user_id: i32) -> Vec<u8> {
    with_i32(ServerPacketId::MatchPlayerSkipped, user_id)
}

pub fn match_skip() -> Vec<u8> {
    empty(ServerPacketId::MatchSkip)
}

pub fn match_change_password(password: &str) -> Vec<u8> {
    with_string(ServerPacketId::MatchChangePassword, password)
}

pub fn match_invite(message: &ChatMessage) -> Vec<u8> {
    let mut writer = PacketWriter::new(ServerPacketId::MatchInvite);
    message.encode(&mut writer);
    writer.finish()
}

pub fn match_abort() -> Vec<u8> {
    empty(ServerPacketId::MatchAbort)
}

/// Client-to-server packets
pub mod client {
    use crate::ids::ClientPacketId;
    use crate::records::{ChatMessage, MatchRecord, ScoreFrame, StatusChange};
    use crate::types::Mods;
    use crate::writer::PacketWriter;

    fn empty(id: ClientPacketId) -> Vec<u8> {
        PacketWriter::new(id).finish()
    }

    fn with_i32(id: ClientPacketId, value: i32) -> Vec<u8> {
        let mut writer = PacketWriter::new(id);
        writer.write_i32(value);
        writer.finish()
    }

    fn with_string(id: ClientPacketId, value: &str) -> Vec<u8> {
        let mut writer = PacketWriter::new(id);
        writer.write_string(value);
        writer.finish()
    }

    fn with_match(id: ClientPacketId, record: &MatchRecord) -> Vec<u8> {
        let mut writer = PacketWriter::new(id);
        record.encode(&mut writer);
        writer.finish()
    }

    fn with_list(id: ClientPacketId, ids: &[i32]) -> Vec<u8> {
        let mut writer = PacketWriter::new(id);
        writer.write_i32_list(ids);
        writer.finish()
    }

    fn message(id: ClientPacketId, text: &str, target: &str) -> Vec<u8> {
        let mut writer = PacketWriter::new(id);
        ChatMessage {
            sender: String::new(),
            text: text.to_string(),
            target: target.to_string(),
            sender_id: 0,
        }
        .encode(&mut writer);
        writer.finish()
    }

    pub fn change_action(change: &StatusChange) -> Vec<u8> {
        let mut writer = PacketWriter::new(ClientPacketId::ChangeAction);
        change.encode(&mut writer);
        writer.finish()
    }

    pub fn public_message(text: &str, channel: &str) -> Vec<u8> {
        message(ClientPacketId::SendPublicMessage, text, channel)
    }

    pub fn private_message(text: &str, recipient: &str) -> Vec<u8> {
        message(ClientPacketId::SendPrivateMessage, text, recipient)
    }

    pub fn logout() -> Vec<u8> {
        with_i32(ClientPacketId::Logout, 0)
    }

    pub fn request_status_update() -> Vec<u8> {
        empty(ClientPacketId::RequestStatusUpdate)
    }

    pub fn ping() -> Vec<u8> {
        empty(ClientPacketId::Ping)
    }

    pub fn start_spectating(host_id: i32) -> Vec<u8> {
        with_i32(ClientPacketId::StartSpectating, host_id)
    }

    pub fn stop_spectating() -> Vec<u8> {
        empty(ClientPacketId::StopSpectating)
    }

    pub fn spectate_frames(frames: &[u8]) -> Vec<u8> {
        let mut writer = PacketWriter::new(ClientPacketId::SpectateFrames);
        writer.write_bytes(frames);
        writer.finish()
    }

    pub fn cant_spectate() -> Vec<u8> {
        empty(ClientPacketId::CantSpectate)
    }

    pub fn part_lobby() -> Vec<u8> {
        empty(ClientPacketId::PartLobby)
    }

    pub fn join_lobby() -> Vec<u8> {
        empty(ClientPacketId::JoinLobby)
    }

    pub fn create_match(record: &MatchRecord) -> Vec<u8> {
        with_match(ClientPacketId::CreateMatch, record)
    }

    pub fn join_match(match_id: i32, password: &str) -> Vec<u8> {
        let mut writer = PacketWriter::new(ClientPacketId::JoinMatch);
        writer.write_i32(match_id);
        writer.write_string(password);
        writer.finish()
    }

    pub fn part_match() -> Vec<u8> {
        empty(ClientPacketId::PartMatch)
    }

    pub fn match_change_slot(slot: i32) -> Vec<u8> {
        with_i32(ClientPacketId::MatchChangeSlot, slot)
    }

    pub fn match_ready() -> Vec<u8> {
        empty(ClientPacketId::MatchReady)
    }

    pub fn match_lock(slot: i32) -> Vec<u8> {
        with_i32(ClientPacketId::MatchLock, slot)
    }

    pub fn match_change_settings(record: &MatchRecord) -> Vec<u8> {
        with_match(ClientPacketId::MatchChangeSettings, record)
    }

    pub fn match_start() -> Vec<u8> {
        empty(ClientPacketId::MatchStart)
    }

    pub fn match_score_update(frame: &ScoreFrame) -> Vec<u8> {
        let mut writer = PacketWriter::new(ClientPacketId::MatchScoreUpdate);
        frame.encode(&mut writer);
        writer.finish()
    }

    pub fn match_complete() -> Vec<u8> {
        empty(ClientPacketId::MatchComplete)
    }

    pub fn match_change_mods(mods: Mods) -> Vec<u8> {
        with_i32(ClientPacketId::MatchChangeMods, mods.bits() as i32)
    }

    pub fn match_load_complete() -> Vec<u8> {
        empty(ClientPacketId::MatchLoadComplete)
    }

    pub fn match_no_beatmap() -> Vec<u8> {
        empty(ClientPacketId::MatchNoBeatmap)
    }

    pub fn match_not_ready() -> Vec<u8> {
        empty(ClientPacketId::MatchNotReady)
    }

    pub fn match_failed() -> Vec<u8> {
        empty(ClientPacketId::MatchFailed)
    }

    pub fn match_has_beatmap() -> Vec<u8> {
        empty(ClientPacketId::MatchHasBeatmap)
    }

    pub fn match_skip_request() -> Vec<u8> {
        empty(ClientPacketId::MatchSkipRequest)
    }

    pub fn channel_join(name: &str) -> Vec<u8> {
        with_string(ClientPacketId::ChannelJoin, name)
    }

    pub fn channel_part(name: &str) -> Vec<u8> {
        with_string(ClientPacketId::ChannelPart, name)
    }

    pub fn match_transfer_host(slot: i32) -> Vec<u8> {
        with_i32(ClientPacketId::MatchTransferHost, slot)
    }

    pub fn friend_add(user_id: i32) -> Vec<u8> {
        with_i32(ClientPacketId::FriendAdd, user_id)
    }

    pub fn friend_remove(user_id: i32) -> Vec<u8> {
        with_i32(ClientPacketId::FriendRemove, user_id)
    }

    pub fn match_change_team() -> Vec<u8> {
        empty(ClientPacketId::MatchChangeTeam)
    }

    pub fn user_stats_request(ids: &[i32]) -> Vec<u8> {
        with_list(ClientPacketId::UserStatsRequest, ids)
    }

    pub fn match_invite(user_id: i32) -> Vec<u8> {
        with_i32(ClientPacketId::MatchInvite, user_id)
    }

    pub fn match_change_password(record: &MatchRecord) -> Vec<u8> {
        with_match(ClientPacketId::MatchChangePassword, record)
    }

    pub fn user_presence_request(ids: &[i32]) -> Vec<u8> {
        with_list(ClientPacketId::UserPresenceRequest, ids)
    }

    pub fn user_presence_request_all() -> Vec<u8> {
        with_i32(ClientPacketId::UserPresenceRequestAll, 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ids::ClientPacketId;
    use crate::reader::PacketStream;

    #[test]
    fn test_logout_payload() {
        let bytes = user_logout(42);
        let packet = PacketStream::new(&bytes).next().unwrap().unwrap();

        assert_eq!(packet.id, u16::from(ServerPacketId::UserLogout));
        assert_eq!(packet.payload, &[42, 0, 0, 0, 0]);
    }

    #[test]
    fn test_restart_carries_delay() {
        let bytes = restart(0);
        assert_eq!(bytes, vec![86, 0, 0, 4, 0, 0, 0, 0, 0, 0, 0]);
    }

    #[test]
    fn test_spectate_frames_are_verbatim() {
        let frames = [9u8, 8, 7, 6, 5];
        let bytes = spectate_frames(&frames);
        let packet = PacketStream::new(&bytes).next().unwrap().unwrap();

        assert_eq!(packet.id, 15);
        assert_eq!(packet.payload, &frames);
    }

    #[test]
    fn test_client_join_match_layout() {
        let bytes = client::join_match(1000, "pw");
        let packet = PacketStream::new(&bytes).next().unwrap().unwrap();
        let mut reader = packet.reader();

        assert_eq!(packet.id, u16::from(ClientPacketId::JoinMatch));
        assert_eq!(reader.read_i32().unwrap(), 1000);
        assert_eq!(reader.read_string().unwrap(), "pw");
        assert!(reader.is_empty());
    }

    #[test]
    fn test_channel_info_payload() {
        let bytes = channel_info(&ChannelInfo {
            name: "#osu".to_string(),
            topic: "general".to_string(),
            user_count: 3,
        });
        let packet = PacketStream::new(&bytes).next().unwrap().unwrap();
        let info = ChannelInfo::decode(&mut packet.reader()).unwrap();

        assert_eq!(info.name, "#osu");
        assert_eq!(info.user_count, 3);
    }
}
