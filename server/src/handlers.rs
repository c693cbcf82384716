//! Per-opcode packet handlers
//!
//! Each handler decodes its payload from a [`PacketReader`] and applies it to
//! the [`World`] on behalf of one session. Handlers never await: anything
//! that needs an external collaborator is pushed as an [`Effect`] and run
//! by the dispatcher after the world lock has been released.

use crate::commands::CommandTable;
use crate::matches::MatchId;
use crate::multiplayer::PendingScore;
use crate::world::{PrivateDelivery, World};
use log::{debug, warn};
use shared::records::{ChatMessage, MatchRecord, ScoreFrame, StatusChange};
use shared::{packets, ClientPacketId, DecodeError, Mods, PacketReader, SlotStatus};
use std::collections::HashMap;
use std::time::Duration;

/// Most ids honoured in one stats request
pub const MAX_STATS_REQUEST: usize = 32;
/// Most ids honoured in one presence request
pub const MAX_PRESENCE_REQUEST: usize = 256;
/// Logout packets this soon after login are ignored
pub const LOGOUT_GRACE: Duration = Duration::from_secs(1);

/// Work a handler could not finish while holding the world lock
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    /// Look up a newly selected map and announce it in the match chat
    AnnounceMap { match_id: MatchId, map_hash: String },
    /// Compute pp for a held-back score frame, then relay it
    PerformanceScore(PendingScore),
}

/// State shared by the handlers of one request
pub struct HandlerContext<'w> {
    pub world: &'w mut World,
    pub session_id: i32,
    pub commands: &'w CommandTable,
    pub effects: Vec<Effect>,
    /// Set when the session logged out during this request; holds whatever
    /// was still queued for it
    pub farewell: Option<Vec<u8>>,
}

impl<'w> HandlerContext<'w> {
    pub fn new(world: &'w mut World, session_id: i32, commands: &'w CommandTable) -> Self {
        Self {
            world,
            session_id,
            commands,
            effects: Vec::new(),
            farewell: None,
        }
    }

    fn enqueue(&mut self, bytes: &[u8]) {
        self.world.sessions.enqueue(self.session_id, bytes);
    }
}

pub type Handler = fn(&mut HandlerContext<'_>, &mut PacketReader<'_>) -> Result<(), DecodeError>;

#[derive(Clone, Copy)]
pub struct Route {
    pub handler: Handler,
    /// Restricted sessions may still use this packet
    pub always_allowed: bool,
}

impl std::fmt::Debug for Route {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Route")
            .field("always_allowed", &self.always_allowed)
            .finish()
    }
}

/// Opcode to handler lookup
#[derive(Debug)]
pub struct HandlerTable {
    routes: HashMap<u16, Route>,
}

impl Default for HandlerTable {
    fn default() -> Self {
        Self::new()
    }
}

impl HandlerTable {
    pub fn new() -> Self {
        use ClientPacketId::*;

        let entries: &[(ClientPacketId, Handler, bool)] = &[
            (ChangeAction, change_action, true),
            (SendPublicMessage, public_message, false),
            (Logout, logout, true),
            (RequestStatusUpdate, request_status_update, true),
            (Ping, ping, true),
            (StartSpectating, start_spectating, false),
            (StopSpectating, stop_spectating, false),
            (SpectateFrames, spectate_frames, false),
            (CantSpectate, cant_spectate, false),
            (SendPrivateMessage, private_message, false),
            (PartLobby, part_lobby, false),
            (JoinLobby, join_lobby, false),
            (CreateMatch, create_match, false),
            (JoinMatch, join_match, false),
            (PartMatch, part_match, false),
            (MatchChangeSlot, change_slot, false),
            (MatchReady, ready, false),
            (MatchLock, lock_slot, false),
            (MatchChangeSettings, change_settings, false),
            (MatchStart, start_match, false),
            (MatchScoreUpdate, score_update, false),
            (MatchComplete, complete_match, false),
            (MatchChangeMods, change_mods, false),
            (MatchLoadComplete, load_complete, false),
            (MatchNoBeatmap, no_beatmap, false),
            (MatchNotReady, not_ready, false),
            (MatchFailed, player_failed, false),
            (MatchHasBeatmap, has_beatmap, false),
            (MatchSkipRequest, skip_request, false),
            (ChannelJoin, channel_join, true),
            (MatchTransferHost, transfer_host, false),
            (FriendAdd, friend_add, true),
            (FriendRemove, friend_remove, true),
            (MatchChangeTeam, change_team, false),
            (ChannelPart, channel_part, true),
            (UserStatsRequest, stats_request, true),
            (MatchInvite, invite, false),
            (MatchChangePassword, change_password, false),
            (UserPresenceRequest, presence_request, true),
            (UserPresenceRequestAll, presence_request_all, true),
        ];

        let routes = entries
            .iter()
            .map(|&(id, handler, always_allowed)| {
                (
                    u16::from(id),
                    Route {
                        handler,
                        always_allowed,
                    },
                )
            })
            .collect();

        Self { routes }
    }

    pub fn get(&self, opcode: u16) -> Option<&Route> {
        self.routes.get(&opcode)
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}

fn change_action(ctx: &mut HandlerContext<'_>, reader: &mut PacketReader<'_>) -> Result<(), DecodeError> {
    let change = StatusChange::decode(reader)?;
    ctx.world.change_status(ctx.session_id, change);
    Ok(())
}

fn public_message(ctx: &mut HandlerContext<'_>, reader: &mut PacketReader<'_>) -> Result<(), DecodeError> {
    let message = ChatMessage::decode(reader)?;
    let text = message.text.trim();
    if text.is_empty() {
        return Ok(());
    }

    let Some(channel) = ctx.world.send_public(ctx.session_id, &message.target, text) else {
        return Ok(());
    };
    if ctx.commands.is_command(text) {
        if let Some(reply) = ctx
            .commands
            .evaluate(ctx.world, ctx.session_id, Some(&channel), text)
        {
            ctx.world.bot_say(&channel, &reply);
        }
    }
    Ok(())
}

fn logout(ctx: &mut HandlerContext<'_>, _reader: &mut PacketReader<'_>) -> Result<(), DecodeError> {
    let Some(session) = ctx.world.sessions.get(ctx.session_id) else {
        return Ok(());
    };
    if session.login_time.elapsed() < LOGOUT_GRACE {
        debug!("Ignoring early logout from {}", session.username);
        return Ok(());
    }

    ctx.farewell = ctx
        .world
        .logout(ctx.session_id)
        .map(|mut session| session.dequeue());
    Ok(())
}

fn request_status_update(ctx: &mut HandlerContext<'_>, _reader: &mut PacketReader<'_>) -> Result<(), DecodeError> {
    if let Some(session) = ctx.world.sessions.get(ctx.session_id) {
        let stats = packets::user_stats(&session.stats_record());
        ctx.enqueue(&stats);
    }
    Ok(())
}

fn ping(ctx: &mut HandlerContext<'_>, _reader: &mut PacketReader<'_>) -> Result<(), DecodeError> {
    ctx.enqueue(&packets::pong());
    Ok(())
}

fn start_spectating(ctx: &mut HandlerContext<'_>, reader: &mut PacketReader<'_>) -> Result<(), DecodeError> {
    let host_id = reader.read_i32()?;
    ctx.world.start_spectating(ctx.session_id, host_id);
    Ok(())
}

fn stop_spectating(ctx: &mut HandlerContext<'_>, _reader: &mut PacketReader<'_>) -> Result<(), DecodeError> {
    ctx.world.stop_spectating(ctx.session_id);
    Ok(())
}

fn spectate_frames(ctx: &mut HandlerContext<'_>, reader: &mut PacketReader<'_>) -> Result<(), DecodeError> {
    let frames = reader.read_rest();
    ctx.world.relay_frames(ctx.session_id, frames);
    Ok(())
}

fn cant_spectate(ctx: &mut HandlerContext<'_>, _reader: &mut PacketReader<'_>) -> Result<(), DecodeError> {
    ctx.world.cant_spectate(ctx.session_id);
    Ok(())
}

fn private_message(ctx: &mut HandlerContext<'_>, reader: &mut PacketReader<'_>) -> Result<(), DecodeError> {
    let message = ChatMessage::decode(reader)?;
    let text = message.text.trim();
    if text.is_empty() {
        return Ok(());
    }

    let delivery = ctx
        .world
        .send_private(ctx.session_id, &message.target, text);
    if delivery == PrivateDelivery::ToBot && ctx.commands.is_command(text) {
        if let Some(reply) = ctx.commands.evaluate(ctx.world, ctx.session_id, None, text) {
            ctx.world.bot_whisper(ctx.session_id, &reply);
        }
    }
    Ok(())
}

fn part_lobby(ctx: &mut HandlerContext<'_>, _reader: &mut PacketReader<'_>) -> Result<(), DecodeError> {
    ctx.world.part_lobby(ctx.session_id);
    Ok(())
}

fn join_lobby(ctx: &mut HandlerContext<'_>, _reader: &mut PacketReader<'_>) -> Result<(), DecodeError> {
    ctx.world.join_lobby(ctx.session_id);
    Ok(())
}

fn create_match(ctx: &mut HandlerContext<'_>, reader: &mut PacketReader<'_>) -> Result<(), DecodeError> {
    let record = MatchRecord::decode(reader)?;
    ctx.world.create_match(ctx.session_id, &record);
    Ok(())
}

fn join_match(ctx: &mut HandlerContext<'_>, reader: &mut PacketReader<'_>) -> Result<(), DecodeError> {
    let match_id = reader.read_i32()?;
    let password = reader.read_string()?;

    match MatchId::try_from(match_id) {
        Ok(match_id) => {
            ctx.world.join_match(ctx.session_id, match_id, &password);
        }
        Err(_) => {
            warn!("Session {} asked for match id {}", ctx.session_id, match_id);
            ctx.enqueue(&packets::match_join_fail());
        }
    }
    Ok(())
}

fn part_match(ctx: &mut HandlerContext<'_>, _reader: &mut PacketReader<'_>) -> Result<(), DecodeError> {
    ctx.world.leave_match(ctx.session_id);
    Ok(())
}

/// Reads a slot index, rejecting negative values
fn read_slot(reader: &mut PacketReader<'_>) -> Result<Option<usize>, DecodeError> {
    Ok(usize::try_from(reader.read_i32()?).ok())
}

fn change_slot(ctx: &mut HandlerContext<'_>, reader: &mut PacketReader<'_>) -> Result<(), DecodeError> {
    if let Some(slot) = read_slot(reader)? {
        ctx.world.change_slot(ctx.session_id, slot);
    }
    Ok(())
}

fn ready(ctx: &mut HandlerContext<'_>, _reader: &mut PacketReader<'_>) -> Result<(), DecodeError> {
    ctx.world.set_slot_status(ctx.session_id, SlotStatus::Ready);
    Ok(())
}

fn not_ready(ctx: &mut HandlerContext<'_>, _reader: &mut PacketReader<'_>) -> Result<(), DecodeError> {
    ctx.world.set_slot_status(ctx.session_id, SlotStatus::NotReady);
    Ok(())
}

fn no_beatmap(ctx: &mut HandlerContext<'_>, _reader: &mut PacketReader<'_>) -> Result<(), DecodeError> {
    ctx.world.set_slot_status(ctx.session_id, SlotStatus::NoMap);
    Ok(())
}

fn has_beatmap(ctx: &mut HandlerContext<'_>, _reader: &mut PacketReader<'_>) -> Result<(), DecodeError> {
    ctx.world.set_slot_status(ctx.session_id, SlotStatus::NotReady);
    Ok(())
}

fn lock_slot(ctx: &mut HandlerContext<'_>, reader: &mut PacketReader<'_>) -> Result<(), DecodeError> {
    if let Some(slot) = read_slot(reader)? {
        ctx.world.toggle_slot_lock(ctx.session_id, slot);
    }
    Ok(())
}

fn change_settings(ctx: &mut HandlerContext<'_>, reader: &mut PacketReader<'_>) -> Result<(), DecodeError> {
    let record = MatchRecord::decode(reader)?;
    if let Some(map) = ctx.world.change_settings(ctx.session_id, &record) {
        if let Some(match_id) = ctx.world.current_match(ctx.session_id) {
            ctx.effects.push(Effect::AnnounceMap {
                match_id,
                map_hash: map.hash,
            });
        }
    }
    Ok(())
}

fn start_match(ctx: &mut HandlerContext<'_>, _reader: &mut PacketReader<'_>) -> Result<(), DecodeError> {
    ctx.world.start_match(ctx.session_id);
    Ok(())
}

fn score_update(ctx: &mut HandlerContext<'_>, reader: &mut PacketReader<'_>) -> Result<(), DecodeError> {
    let frame = ScoreFrame::decode(reader)?;
    if let Some(pending) = ctx.world.score_update(ctx.session_id, frame) {
        ctx.effects.push(Effect::PerformanceScore(pending));
    }
    Ok(())
}

fn complete_match(ctx: &mut HandlerContext<'_>, _reader: &mut PacketReader<'_>) -> Result<(), DecodeError> {
    ctx.world.complete_match(ctx.session_id);
    Ok(())
}

fn change_mods(ctx: &mut HandlerContext<'_>, reader: &mut PacketReader<'_>) -> Result<(), DecodeError> {
    let mods = Mods::from_wire(reader.read_u32()?);
    ctx.world.change_mods(ctx.session_id, mods);
    Ok(())
}

fn load_complete(ctx: &mut HandlerContext<'_>, _reader: &mut PacketReader<'_>) -> Result<(), DecodeError> {
    ctx.world.load_complete(ctx.session_id);
    Ok(())
}

fn player_failed(ctx: &mut HandlerContext<'_>, _reader: &mut PacketReader<'_>) -> Result<(), DecodeError> {
    ctx.world.player_failed(ctx.session_id);
    Ok(())
}

fn skip_request(ctx: &mut HandlerContext<'_>, _reader: &mut PacketReader<'_>) -> Result<(), DecodeError> {
    ctx.world.skip_request(ctx.session_id);
    Ok(())
}

fn channel_join(ctx: &mut HandlerContext<'_>, reader: &mut PacketReader<'_>) -> Result<(), DecodeError> {
    let name = reader.read_string()?;
    if !ctx.world.channels.contains(&name) {
        warn!("Session {} tried to join missing channel {}", ctx.session_id, name);
        ctx.world
            .sessions
            .notify(ctx.session_id, &format!("{} does not exist.", name));
        return Ok(());
    }
    ctx.world.join_channel(ctx.session_id, &name);
    Ok(())
}

fn channel_part(ctx: &mut HandlerContext<'_>, reader: &mut PacketReader<'_>) -> Result<(), DecodeError> {
    let name = reader.read_string()?;
    // Closing a private conversation tab also sends a part
    if !name.starts_with('#') {
        return Ok(());
    }
    let channel = ctx
        .world
        .resolve_channel(ctx.session_id, &name)
        .filter(|channel| ctx.world.channels.contains(channel));
    let Some(channel) = channel else {
        ctx.world
            .sessions
            .notify(ctx.session_id, &format!("{} does not exist.", name));
        return Ok(());
    };
    ctx.world.part_channel(ctx.session_id, &channel);
    Ok(())
}

fn transfer_host(ctx: &mut HandlerContext<'_>, reader: &mut PacketReader<'_>) -> Result<(), DecodeError> {
    if let Some(slot) = read_slot(reader)? {
        ctx.world.transfer_host(ctx.session_id, slot);
    }
    Ok(())
}

fn friend_add(ctx: &mut HandlerContext<'_>, reader: &mut PacketReader<'_>) -> Result<(), DecodeError> {
    let target = reader.read_i32()?;
    ctx.world.set_friend(ctx.session_id, target, true);
    Ok(())
}

fn friend_remove(ctx: &mut HandlerContext<'_>, reader: &mut PacketReader<'_>) -> Result<(), DecodeError> {
    let target = reader.read_i32()?;
    ctx.world.set_friend(ctx.session_id, target, false);
    Ok(())
}

fn change_team(ctx: &mut HandlerContext<'_>, _reader: &mut PacketReader<'_>) -> Result<(), DecodeError> {
    ctx.world.change_team(ctx.session_id);
    Ok(())
}

fn stats_request(ctx: &mut HandlerContext<'_>, reader: &mut PacketReader<'_>) -> Result<(), DecodeError> {
    let ids = reader.read_i32_list()?;
    let bytes: Vec<u8> = ids
        .iter()
        .take(MAX_STATS_REQUEST)
        .filter(|&&id| id != ctx.session_id)
        .filter_map(|&id| ctx.world.sessions.get(id))
        .flat_map(|session| packets::user_stats(&session.stats_record()))
        .collect();
    ctx.enqueue(&bytes);
    Ok(())
}

fn invite(ctx: &mut HandlerContext<'_>, reader: &mut PacketReader<'_>) -> Result<(), DecodeError> {
    let target = reader.read_i32()?;
    ctx.world.invite(ctx.session_id, target);
    Ok(())
}

fn change_password(ctx: &mut HandlerContext<'_>, reader: &mut PacketReader<'_>) -> Result<(), DecodeError> {
    let record = MatchRecord::decode(reader)?;
    ctx.world.change_password(ctx.session_id, &record.password);
    Ok(())
}

fn presence_request(ctx: &mut HandlerContext<'_>, reader: &mut PacketReader<'_>) -> Result<(), DecodeError> {
    let ids = reader.read_i32_list()?;
    let bytes: Vec<u8> = ids
        .iter()
        .take(MAX_PRESENCE_REQUEST)
        .filter_map(|&id| ctx.world.sessions.get(id))
        .flat_map(|session| packets::user_presence(&session.presence()))
        .collect();
    ctx.enqueue(&bytes);
    Ok(())
}

fn presence_request_all(ctx: &mut HandlerContext<'_>, _reader: &mut PacketReader<'_>) -> Result<(), DecodeError> {
    let bytes: Vec<u8> = ctx
        .world
        .sessions
        .iter()
        .filter(|session| session.id != ctx.session_id)
        .flat_map(|session| packets::user_presence(&session.presence()))
        .collect();
    ctx.enqueue(&bytes);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::services::NullJournal;
    use crate::session::Session;
    use shared::packets::client;
    use shared::{split_packets, Privileges, ServerPacketId};
    use std::sync::Arc;
    use std::time::Instant;

    struct Harness {
        world: World,
        table: HandlerTable,
        commands: CommandTable,
    }

    impl Harness {
        fn new(ids: &[i32]) -> Self {
            let mut world = World::new(&Config::default(), Arc::new(NullJournal));
            for &id in ids {
                let mut session = Session::new(
                    id,
                    &format!("player{}", id),
                    Privileges::USER | Privileges::VERIFIED,
                );
                session.login_time = Instant::now() - Duration::from_secs(10);
                world.sessions.add(session).unwrap();
            }
            for &id in ids {
                world.sessions.dequeue(id);
            }
            Self {
                world,
                table: HandlerTable::new(),
                commands: CommandTable::new("!"),
            }
        }

        fn send(&mut self, session_id: i32, bytes: &[u8]) -> HandlerOutcome {
            let mut ctx = HandlerContext::new(&mut self.world, session_id, &self.commands);
            for (id, payload) in split_packets(bytes) {
                let route = self.table.get(id).unwrap();
                (route.handler)(&mut ctx, &mut PacketReader::new(&payload)).unwrap();
            }
            HandlerOutcome {
                effects: ctx.effects,
                farewell: ctx.farewell,
            }
        }

        fn drain(&mut self, session_id: i32) -> Vec<u16> {
            split_packets(&self.world.sessions.dequeue(session_id))
                .into_iter()
                .map(|(id, _)| id)
                .collect()
        }
    }

    struct HandlerOutcome {
        effects: Vec<Effect>,
        farewell: Option<Vec<u8>>,
    }

    #[test]
    fn test_every_inbound_opcode_is_routed() {
        let table = HandlerTable::new();
        let unrouted = [ClientPacketId::BeatmapInfoRequest, ClientPacketId::ReceiveUpdates];

        for id in ClientPacketId::ALL {
            assert_eq!(table.get(u16::from(*id)).is_some(), !unrouted.contains(id));
        }
    }

    #[test]
    fn test_restricted_allow_list() {
        let table = HandlerTable::new();
        let allowed: Vec<u16> = ClientPacketId::ALL
            .iter()
            .map(|&id| u16::from(id))
            .filter(|&id| table.get(id).map(|r| r.always_allowed).unwrap_or(false))
            .collect();

        assert_eq!(allowed, vec![0, 2, 3, 4, 63, 73, 74, 78, 85, 97, 98]);
    }

    #[test]
    fn test_ping_answers_pong() {
        let mut harness = Harness::new(&[3]);
        harness.send(3, &client::ping());
        assert_eq!(harness.drain(3), vec![u16::from(ServerPacketId::Pong)]);
    }

    #[test]
    fn test_public_command_reply_from_bot() {
        let mut harness = Harness::new(&[3, 4]);
        harness.world.join_channel(3, "#osu");
        harness.world.join_channel(4, "#osu");
        harness.drain(3);
        harness.drain(4);

        harness.send(3, &client::public_message("!ping", "#osu"));

        let received = split_packets(&harness.world.sessions.dequeue(4));
        assert_eq!(received.len(), 2);
        let reply = ChatMessage::decode(&mut PacketReader::new(&received[1].1)).unwrap();
        assert_eq!(reply.sender, "BanchoBot");
        assert_eq!(reply.text, "PONG");
        assert_eq!(reply.target, "#osu");
        assert_eq!(harness.drain(3), vec![u16::from(ServerPacketId::SendMessage)]);
    }

    #[test]
    fn test_private_command_to_bot() {
        let mut harness = Harness::new(&[3]);

        harness.send(3, &client::private_message("!ping", "BanchoBot"));

        let received = split_packets(&harness.world.sessions.dequeue(3));
        let reply = ChatMessage::decode(&mut PacketReader::new(&received[0].1)).unwrap();
        assert_eq!(reply.text, "PONG");
        assert_eq!(reply.target, "player3");
    }

    #[test]
    fn test_early_logout_ignored() {
        let mut harness = Harness::new(&[3]);
        harness.world.sessions.get_mut(3).unwrap().login_time = Instant::now();

        let outcome = harness.send(3, &client::logout());
        assert!(outcome.farewell.is_none());
        assert!(harness.world.sessions.contains(3));

        harness.world.sessions.get_mut(3).unwrap().login_time =
            Instant::now() - Duration::from_secs(5);
        let outcome = harness.send(3, &client::logout());
        assert!(outcome.farewell.is_some());
        assert!(!harness.world.sessions.contains(3));
    }

    #[test]
    fn test_stats_request_is_capped() {
        let ids: Vec<i32> = (10..60).collect();
        let mut harness = Harness::new(&ids);

        harness.send(10, &client::user_stats_request(&ids));

        // The requester's own id is skipped
        assert_eq!(harness.drain(10).len(), MAX_STATS_REQUEST - 1);
    }

    #[test]
    fn test_presence_all_lists_others() {
        let mut harness = Harness::new(&[3, 4]);

        harness.send(3, &client::user_presence_request_all());

        // player4 and the bot
        assert_eq!(
            harness.drain(3),
            vec![u16::from(ServerPacketId::UserPresence); 2]
        );
    }

    #[test]
    fn test_join_unknown_channel_notifies() {
        let mut harness = Harness::new(&[3]);
        harness.send(3, &client::channel_join("#nowhere"));
        assert_eq!(harness.drain(3), vec![u16::from(ServerPacketId::Notification)]);

        harness.send(3, &client::channel_part("someone"));
        assert!(harness.drain(3).is_empty());
    }

    #[test]
    fn test_part_match_chat_by_display_name() {
        let mut harness = Harness::new(&[3]);
        harness.send(3, &client::create_match(&MatchRecord {
            name: "room".to_string(),
            ..MatchRecord::default()
        }));
        harness.drain(3);

        harness.send(3, &client::channel_part("#multiplayer"));

        assert!(!harness.drain(3).contains(&u16::from(ServerPacketId::Notification)));
        assert!(!harness.world.channels.contains("#multi_1000"));

        harness.send(3, &client::channel_part("#spectator"));
        assert_eq!(harness.drain(3), vec![u16::from(ServerPacketId::Notification)]);
    }

    #[test]
    fn test_settings_with_new_map_defers_announcement() {
        let mut harness = Harness::new(&[3]);
        harness.send(3, &client::create_match(&MatchRecord {
            name: "room".to_string(),
            ..MatchRecord::default()
        }));

        let mut record = harness.world.matches.get(1000).unwrap().to_record(true);
        record.map_hash = "abc123".to_string();
        record.map_id = 7;
        let outcome = harness.send(3, &client::match_change_settings(&record));

        assert_eq!(
            outcome.effects,
            vec![Effect::AnnounceMap {
                match_id: 1000,
                map_hash: "abc123".to_string()
            }]
        );
    }

    #[test]
    fn test_negative_match_id_fails_join() {
        let mut harness = Harness::new(&[3]);
        harness.send(3, &client::join_match(70_000, ""));
        assert_eq!(harness.drain(3), vec![u16::from(ServerPacketId::MatchJoinFail)]);
    }

    #[test]
    fn test_truncated_payload_is_an_error() {
        let mut harness = Harness::new(&[3]);
        let route = harness.table.get(u16::from(ClientPacketId::StartSpectating)).unwrap();
        let mut ctx = HandlerContext::new(&mut harness.world, 3, &harness.commands);

        let result = (route.handler)(&mut ctx, &mut PacketReader::new(&[1, 2]));
        assert!(result.is_err());
    }
}
