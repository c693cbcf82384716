//! Match transitions with their packet fan-out
//!
//! `matches.rs` decides what a transition does to a match. The methods here
//! look up the sender's match, apply the transition and queue the resulting
//! packets for members, the lobby and the match chat. Requests that do not
//! make sense for the sender (no match, not host, match running) are logged
//! and dropped without telling the client.

use crate::channel::{Channel, MULTIPLAYER_DISPLAY};
use crate::matches::{MapSelection, MatchId};
use crate::services::{unix_time, BeatmapInfo, JournalRecord, PerformanceRequest};
use crate::world::World;
use log::{debug, info, warn};
use shared::records::{ChatMessage, MatchRecord, ScoreFrame};
use shared::{packets, Mods, ScoringType, SlotStatus};

/// A score frame held back until its pp value is known
#[derive(Debug, Clone, PartialEq)]
pub struct PendingScore {
    pub match_id: MatchId,
    pub session_id: i32,
    pub frame: ScoreFrame,
    pub request: PerformanceRequest,
}

impl World {
    /// The sender's match id, if the sender is actually seated in it
    pub(crate) fn current_match(&self, session_id: i32) -> Option<MatchId> {
        let match_id = self.sessions.get(session_id)?.match_id?;
        let game = self.matches.get(match_id)?;
        game.slot_of(session_id).map(|_| match_id)
    }

    /// Like `current_match` but only for the host
    pub(crate) fn hosted_match(&self, session_id: i32) -> Option<MatchId> {
        let match_id = self.current_match(session_id)?;
        let game = self.matches.get(match_id)?;
        if !game.is_host(session_id) {
            warn!("{} is not the host of match {}", session_id, match_id);
            return None;
        }
        Some(match_id)
    }

    /// Queues raw bytes for every member of a match
    pub fn enqueue_match(&mut self, match_id: MatchId, bytes: &[u8]) {
        let members = self
            .matches
            .get(match_id)
            .map(|m| m.members())
            .unwrap_or_default();
        for member in members {
            self.sessions.enqueue(member, bytes);
        }
    }

    /// Sends the match state to its members and optionally to the lobby
    ///
    /// The host sees the real password; other members and the lobby get the
    /// masked form.
    pub fn broadcast_match(&mut self, match_id: MatchId, lobby: bool, exclude: Option<i32>) {
        let Some(game) = self.matches.get(match_id) else {
            return;
        };
        let members = game.members();
        let host = game.host_id;
        let revealed = packets::update_match(&game.to_record(true));
        let masked = packets::update_match(&game.to_record(false));

        for &member in members.iter().filter(|&&m| Some(m) != exclude) {
            let bytes = if member == host { &revealed } else { &masked };
            self.sessions.enqueue(member, bytes);
        }
        if lobby {
            self.enqueue_lobby(&masked, &members);
        }
    }

    /// Registers a new match and seats its creator as host
    pub fn create_match(&mut self, session_id: i32, record: &MatchRecord) -> Option<MatchId> {
        if self.sessions.get(session_id)?.match_id.is_some() {
            warn!("{} tried to create a match while in one", session_id);
            self.sessions.enqueue(session_id, &packets::match_join_fail());
            return None;
        }
        let Some(match_id) = self.matches.create(session_id, record) else {
            warn!("No free match id for {}", session_id);
            self.sessions.enqueue(session_id, &packets::match_join_fail());
            return None;
        };

        let game = self.matches.get(match_id)?;
        if !game.has_free_slot() {
            warn!("Match {} from {} has no open slot", match_id, session_id);
            self.matches.remove(match_id);
            self.sessions.enqueue(session_id, &packets::match_join_fail());
            return None;
        }
        let password = game.password.clone();
        let channel = game.chat_channel();
        let new_match = packets::new_match(&game.to_record(false));
        self.channels
            .insert(Channel::ephemeral(&channel, MULTIPLAYER_DISPLAY, &game.name));
        self.enqueue_lobby(&new_match, &[]);

        if !self.join_match(session_id, match_id, &password) {
            self.matches.remove(match_id);
            self.channels.remove(&channel);
            self.enqueue_lobby(&packets::dispose_match(i32::from(match_id)), &[]);
            return None;
        }
        Some(match_id)
    }

    /// Seats a session in a match after checking the password
    pub fn join_match(&mut self, session_id: i32, match_id: MatchId, password: &str) -> bool {
        let Some(session) = self.sessions.get(session_id) else {
            return false;
        };
        let already_seated = session.match_id.is_some();

        let seat = match self.matches.get_mut(match_id) {
            Some(_) if already_seated => None,
            Some(game) if game.password != password => {
                warn!("{} used the wrong password for match {}", session_id, match_id);
                None
            }
            Some(game) => game.seat(session_id),
            None => None,
        };
        if seat.is_none() {
            debug!("{} could not join match {}", session_id, match_id);
            self.sessions.enqueue(session_id, &packets::match_join_fail());
            return false;
        }

        let Some(game) = self.matches.get(match_id) else {
            return false;
        };
        let channel = game.chat_channel();
        let joined = packets::match_join_success(&game.to_record(true));

        if let Some(session) = self.sessions.get_mut(session_id) {
            session.match_id = Some(match_id);
            session.enqueue(&joined);
            info!("{} joined match {}", session.username, match_id);
        }
        self.join_channel(session_id, &channel);
        self.broadcast_match(match_id, true, None);
        true
    }

    /// Leaves the sender's current match
    pub fn leave_match(&mut self, session_id: i32) {
        let match_id = self
            .sessions
            .get_mut(session_id)
            .and_then(|s| s.match_id.take());
        if let Some(match_id) = match_id {
            self.evict(match_id, session_id);
        }
    }

    /// Removes a session from a match's slots and chat
    ///
    /// The last leaver disposes the match. Otherwise host passes on if
    /// needed and the remaining members and the lobby get the new state.
    pub(crate) fn evict(&mut self, match_id: MatchId, session_id: i32) {
        let Some(game) = self.matches.get_mut(match_id) else {
            return;
        };
        let channel = game.chat_channel();
        let Some(departure) = game.vacate(session_id) else {
            return;
        };
        self.channels
            .part(&mut self.sessions, &channel, session_id, true);
        info!("Session {} left match {}", session_id, match_id);

        if departure.empty {
            self.matches.remove(match_id);
            self.enqueue_lobby(&packets::dispose_match(i32::from(match_id)), &[]);
            return;
        }

        if let Some(host) = departure.new_host {
            info!("Host of match {} passed to {}", match_id, host);
            self.sessions.enqueue(host, &packets::match_transfer_host());
        }
        self.broadcast_match(match_id, true, Some(session_id));
    }

    /// Moves the sender to another open slot
    pub fn change_slot(&mut self, session_id: i32, target: usize) -> bool {
        let Some(match_id) = self.current_match(session_id) else {
            return false;
        };
        let Some(game) = self.matches.get_mut(match_id) else {
            return false;
        };
        if game.locked && !game.is_host(session_id) {
            debug!("Match {} is locked; {} cannot move", match_id, session_id);
            return false;
        }
        if !game.move_to(session_id, target) {
            warn!("{} cannot move to slot {} in match {}", session_id, target, match_id);
            return false;
        }
        self.broadcast_match(match_id, false, None);
        true
    }

    /// Sets the sender's slot status (ready, not ready, no map, has map)
    pub fn set_slot_status(&mut self, session_id: i32, status: SlotStatus) -> bool {
        let Some(match_id) = self.current_match(session_id) else {
            return false;
        };
        let changed = self
            .matches
            .get_mut(match_id)
            .map(|game| game.set_status(session_id, status))
            .unwrap_or(false);
        if changed {
            self.broadcast_match(match_id, false, None);
        }
        changed
    }

    /// Host toggles a seat between open and locked
    pub fn toggle_slot_lock(&mut self, session_id: i32, index: usize) -> bool {
        let Some(match_id) = self.hosted_match(session_id) else {
            return false;
        };
        let changed = self
            .matches
            .get_mut(match_id)
            .map(|game| game.toggle_lock(index))
            .unwrap_or(false);
        if changed {
            self.broadcast_match(match_id, false, None);
        }
        changed
    }

    /// Applies new settings from the host
    ///
    /// Returns the newly selected map, if any, so the caller can announce it.
    pub fn change_settings(
        &mut self,
        session_id: i32,
        record: &MatchRecord,
    ) -> Option<MapSelection> {
        let match_id = self.hosted_match(session_id)?;
        let game = self.matches.get_mut(match_id)?;
        if game.in_progress {
            warn!("Settings change for running match {} ignored", match_id);
            return None;
        }
        let change = game.apply_settings(record);
        self.broadcast_match(match_id, true, None);
        change.new_map
    }

    pub fn change_mods(&mut self, session_id: i32, mods: Mods) -> bool {
        let Some(match_id) = self.current_match(session_id) else {
            return false;
        };
        let changed = self
            .matches
            .get_mut(match_id)
            .map(|game| game.change_mods(session_id, mods))
            .unwrap_or(false);
        if changed {
            self.broadcast_match(match_id, false, None);
        }
        changed
    }

    pub fn change_team(&mut self, session_id: i32) -> bool {
        let Some(match_id) = self.current_match(session_id) else {
            return false;
        };
        let Some(game) = self.matches.get_mut(match_id) else {
            return false;
        };
        if game.locked && !game.is_host(session_id) {
            debug!("Match {} is locked; {} cannot change team", match_id, session_id);
            return false;
        }
        if !game.change_team(session_id) {
            return false;
        }
        self.broadcast_match(match_id, false, None);
        true
    }

    /// Starts the host's match for everyone who has the map
    pub fn start_match(&mut self, session_id: i32) -> bool {
        let Some(match_id) = self.hosted_match(session_id) else {
            return false;
        };
        let Some(game) = self.matches.get_mut(match_id) else {
            return false;
        };
        let Some(started) = game.start() else {
            warn!("Match {} is already running", match_id);
            return false;
        };

        let host = game.host_id;
        let revealed = packets::match_start(&game.to_record(true));
        let masked = packets::match_start(&game.to_record(false));
        for player in started {
            let bytes = if player == host { &revealed } else { &masked };
            self.sessions.enqueue(player, bytes);
        }
        self.broadcast_match(match_id, true, None);
        true
    }

    /// Tags a score frame with the sender's slot and relays it
    ///
    /// Under the pp win condition the frame is returned instead, to be
    /// relayed by `finish_score` once its pp value is known.
    pub fn score_update(&mut self, session_id: i32, mut frame: ScoreFrame) -> Option<PendingScore> {
        let match_id = self.current_match(session_id)?;
        let game = self.matches.get(match_id)?;
        let slot_index = game.slot_of(session_id)?;
        frame.slot_id = slot_index as u8;

        if game.pp_win {
            if let Some(map) = &game.map {
                let mods = game.mods | game.slots[slot_index].mods;
                let request = PerformanceRequest {
                    map_id: map.id,
                    map_hash: map.hash.clone(),
                    mode: game.mode,
                    mods,
                    count_300: frame.count_300,
                    count_100: frame.count_100,
                    count_50: frame.count_50,
                    count_geki: frame.count_geki,
                    count_katu: frame.count_katu,
                    count_miss: frame.count_miss,
                    max_combo: frame.max_combo,
                    accuracy: None,
                };
                return Some(PendingScore {
                    match_id,
                    session_id,
                    frame,
                    request,
                });
            }
        }

        self.enqueue_match(match_id, &packets::match_score_update(&frame));
        None
    }

    /// Relays a held-back score frame with its pp as the score
    ///
    /// Dropped if the player has left the match or play has ended meanwhile.
    pub fn finish_score(&mut self, pending: PendingScore, pp: Option<f32>) {
        let PendingScore {
            match_id,
            session_id,
            mut frame,
            ..
        } = pending;

        let still_playing = self
            .matches
            .get(match_id)
            .map(|game| game.in_progress && game.slot_of(session_id) == Some(frame.slot_id as usize))
            .unwrap_or(false);
        if !still_playing {
            debug!("Score from {} for match {} discarded", session_id, match_id);
            return;
        }

        frame.total_score = match pp {
            Some(pp) if pp.is_finite() => pp.round() as i32,
            _ => 0,
        };
        self.enqueue_match(match_id, &packets::match_score_update(&frame));
    }

    /// Ends the sender's running play
    pub fn complete_match(&mut self, session_id: i32) -> bool {
        let Some(match_id) = self.current_match(session_id) else {
            return false;
        };
        let Some(game) = self.matches.get_mut(match_id) else {
            return false;
        };
        let Some(played) = game.complete() else {
            debug!("Match {} is not running", match_id);
            return false;
        };
        let map_hash = game.map.as_ref().map(|m| m.hash.clone()).unwrap_or_default();

        self.broadcast_match(match_id, true, None);
        let complete = packets::match_complete();
        for &player in &played {
            self.sessions.enqueue(player, &complete);
        }
        self.broadcast_match(match_id, true, None);

        self.journal(JournalRecord::MatchCompleted {
            match_id,
            map_hash,
            players: played,
            timestamp: unix_time(),
        });
        true
    }

    pub fn load_complete(&mut self, session_id: i32) {
        let Some(match_id) = self.current_match(session_id) else {
            return;
        };
        let all_loaded = self
            .matches
            .get_mut(match_id)
            .map(|game| game.load_complete(session_id))
            .unwrap_or(false);
        if all_loaded {
            self.enqueue_match(match_id, &packets::match_all_players_loaded());
        }
    }

    pub fn skip_request(&mut self, session_id: i32) {
        let Some(match_id) = self.current_match(session_id) else {
            return;
        };
        let Some(all_skipped) = self
            .matches
            .get_mut(match_id)
            .and_then(|game| game.skip(session_id))
        else {
            return;
        };

        self.enqueue_match(match_id, &packets::match_player_skipped(session_id));
        if all_skipped {
            self.enqueue_match(match_id, &packets::match_skip());
        }
    }

    pub fn player_failed(&mut self, session_id: i32) {
        let Some(match_id) = self.current_match(session_id) else {
            return;
        };
        let Some(slot) = self
            .matches
            .get(match_id)
            .and_then(|game| game.failed(session_id))
        else {
            return;
        };
        self.enqueue_match(match_id, &packets::match_player_failed(slot as i32));
    }

    /// Host hands host to the occupant of `index`
    pub fn transfer_host(&mut self, session_id: i32, index: usize) -> bool {
        let Some(match_id) = self.hosted_match(session_id) else {
            return false;
        };
        let Some(target) = self
            .matches
            .get_mut(match_id)
            .and_then(|game| game.transfer_host(index))
        else {
            warn!("Slot {} of match {} is empty", index, match_id);
            return false;
        };

        self.sessions.enqueue(target, &packets::match_transfer_host());
        if let Some(name) = self.sessions.get(target).map(|s| s.username.clone()) {
            let notice = packets::notification(&format!("{} became host!", name));
            self.enqueue_match(match_id, &notice);
        }
        self.broadcast_match(match_id, true, None);
        true
    }

    /// Host replaces the password; members are told it individually
    pub fn change_password(&mut self, session_id: i32, password: &str) -> bool {
        let Some(match_id) = self.hosted_match(session_id) else {
            return false;
        };
        let changed = self
            .matches
            .get_mut(match_id)
            .map(|game| game.set_password(password))
            .unwrap_or(false);
        if !changed {
            return false;
        }

        self.enqueue_match(match_id, &packets::match_change_password(password));
        let masked = self
            .matches
            .get(match_id)
            .map(|game| packets::update_match(&game.to_record(false)));
        if let Some(masked) = masked {
            self.enqueue_lobby(&masked, &[]);
        }
        true
    }

    /// Host cancels the running play
    pub fn abort_match(&mut self, session_id: i32) -> bool {
        let Some(match_id) = self.hosted_match(session_id) else {
            return false;
        };
        let Some(played) = self.matches.get_mut(match_id).and_then(|game| game.abort()) else {
            return false;
        };

        let abort = packets::match_abort();
        for player in played {
            self.sessions.enqueue(player, &abort);
        }
        self.broadcast_match(match_id, true, None);
        true
    }

    /// Host sets how the winner is decided
    pub fn set_win_condition(&mut self, session_id: i32, scoring: ScoringType, pp: bool) -> bool {
        let Some(match_id) = self.hosted_match(session_id) else {
            return false;
        };
        let Some(game) = self.matches.get_mut(match_id) else {
            return false;
        };
        game.scoring_type = scoring;
        game.pp_win = pp;
        self.broadcast_match(match_id, true, None);
        true
    }

    /// Host moves another player to a slot
    pub fn move_player(&mut self, session_id: i32, target_id: i32, index: usize) -> bool {
        let Some(match_id) = self.hosted_match(session_id) else {
            return false;
        };
        let moved = self
            .matches
            .get_mut(match_id)
            .map(|game| game.move_to(target_id, index))
            .unwrap_or(false);
        if moved {
            self.broadcast_match(match_id, false, None);
        }
        moved
    }

    /// Host limits the number of open seats
    pub fn resize_match(&mut self, session_id: i32, size: usize) -> bool {
        let Some(match_id) = self.hosted_match(session_id) else {
            return false;
        };
        let resized = self
            .matches
            .get_mut(match_id)
            .map(|game| game.resize(size))
            .unwrap_or(false);
        if resized {
            self.broadcast_match(match_id, true, None);
        }
        resized
    }

    /// Host sets or clears the slot/team lock
    pub fn set_match_locked(&mut self, session_id: i32, locked: bool) -> bool {
        let Some(match_id) = self.hosted_match(session_id) else {
            return false;
        };
        match self.matches.get_mut(match_id) {
            Some(game) => {
                game.locked = locked;
                true
            }
            None => false,
        }
    }

    /// Sends `target_id` a chat link to the sender's match
    pub fn invite(&mut self, session_id: i32, target_id: i32) -> bool {
        let Some(match_id) = self.current_match(session_id) else {
            return false;
        };
        if target_id == self.bot_id || !self.sessions.contains(target_id) {
            self.sessions
                .notify(session_id, "You can't invite someone who's offline.");
            return false;
        }
        let (Some(game), Some(inviter), Some(target)) = (
            self.matches.get(match_id),
            self.sessions.get(session_id),
            self.sessions.get(target_id),
        ) else {
            return false;
        };

        let message = ChatMessage {
            sender: inviter.username.clone(),
            text: format!("Come join my multiplayer match: {}", game.embed()),
            target: target.username.clone(),
            sender_id: session_id,
        };
        self.sessions
            .enqueue(target_id, &packets::match_invite(&message));
        true
    }

    /// Enters the lobby, leaving any match, and lists every live match
    pub fn join_lobby(&mut self, session_id: i32) {
        self.leave_match(session_id);
        let listing: Vec<u8> = self
            .matches
            .iter()
            .flat_map(|game| packets::new_match(&game.to_record(false)))
            .collect();
        if let Some(session) = self.sessions.get_mut(session_id) {
            session.in_lobby = true;
            session.enqueue(&listing);
        }
    }

    pub fn part_lobby(&mut self, session_id: i32) {
        if let Some(session) = self.sessions.get_mut(session_id) {
            session.in_lobby = false;
        }
    }

    /// Posts the newly selected map to the match chat
    ///
    /// Skipped if the match is gone or has moved on to another map while
    /// the lookup was running.
    pub fn announce_map(&mut self, match_id: MatchId, map: &BeatmapInfo, pp: &[(f32, f32)]) {
        let Some(game) = self.matches.get(match_id) else {
            return;
        };
        if game.map.as_ref().map(|m| m.hash.as_str()) != Some(map.hash.as_str()) {
            return;
        }

        let mut text = format!("Now playing: {} (id {})", map.title, map.id);
        if !pp.is_empty() {
            let figures: Vec<String> = pp
                .iter()
                .map(|(accuracy, pp)| format!("{}%: {:.0}pp", accuracy, pp))
                .collect();
            text.push_str(" | ");
            text.push_str(&figures.join(" | "));
        }
        let channel = game.chat_channel();
        self.bot_say(&channel, &text);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::services::NullJournal;
    use crate::session::Session;
    use shared::records::MatchRecord;
    use shared::{split_packets, Mode, PacketReader, Privileges, ServerPacketId, MASKED_PASSWORD};
    use std::sync::Arc;

    fn world_with(ids: &[i32]) -> World {
        let mut world = World::new(&Config::default(), Arc::new(NullJournal));
        for &id in ids {
            let session = Session::new(
                id,
                &format!("player{}", id),
                Privileges::USER | Privileges::VERIFIED,
            );
            world.sessions.add(session).unwrap();
        }
        for &id in ids {
            world.sessions.dequeue(id);
        }
        world
    }

    fn room(password: &str) -> MatchRecord {
        MatchRecord {
            name: "room".to_string(),
            password: password.to_string(),
            map_id: 1,
            map_hash: "abc123".to_string(),
            map_title: "Song".to_string(),
            ..MatchRecord::default()
        }
    }

    fn ids(bytes: &[u8]) -> Vec<u16> {
        split_packets(bytes).into_iter().map(|(id, _)| id).collect()
    }

    fn last_update(bytes: &[u8]) -> MatchRecord {
        let update = split_packets(bytes)
            .into_iter()
            .filter(|(id, _)| *id == u16::from(ServerPacketId::UpdateMatch))
            .last()
            .unwrap();
        MatchRecord::decode(&mut PacketReader::new(&update.1)).unwrap()
    }

    #[test]
    fn test_create_seats_host_and_opens_chat() {
        let mut world = world_with(&[3]);

        let id = world.create_match(3, &room("")).unwrap();

        assert_eq!(id, 1000);
        let game = world.matches.get(id).unwrap();
        assert_eq!(game.host_id, 3);
        assert_eq!(game.slots[0].session_id, Some(3));
        assert_eq!(game.slots[0].status, SlotStatus::NotReady);
        assert_eq!(world.sessions.get(3).unwrap().match_id, Some(id));
        assert_eq!(world.channels.get("#multi_1000").unwrap().members(), &[3]);
        assert!(ids(&world.sessions.dequeue(3)).contains(&u16::from(ServerPacketId::MatchJoinSuccess)));
    }

    #[test]
    fn test_join_checks_password_and_seat() {
        let mut world = world_with(&[3, 4, 5]);
        let id = world.create_match(3, &room("pw")).unwrap();

        assert!(!world.join_match(4, id, "wrong"));
        assert_eq!(
            ids(&world.sessions.dequeue(4)),
            vec![u16::from(ServerPacketId::MatchJoinFail)]
        );

        assert!(world.join_match(4, id, "pw"));
        assert!(!world.join_match(4, id, "pw"));
        assert!(!world.join_match(5, 999, "pw"));
        assert_eq!(world.matches.get(id).unwrap().members(), vec![3, 4]);
    }

    #[test]
    fn test_password_masked_for_non_host() {
        let mut world = world_with(&[3, 4]);
        let id = world.create_match(3, &room("pw")).unwrap();
        world.join_match(4, id, "pw");
        world.sessions.dequeue(3);
        world.sessions.dequeue(4);

        world.set_slot_status(4, SlotStatus::Ready);

        assert_eq!(last_update(&world.sessions.dequeue(3)).password, "pw");
        assert_eq!(last_update(&world.sessions.dequeue(4)).password, MASKED_PASSWORD);
    }

    #[test]
    fn test_lobby_sees_masked_state_once() {
        let mut world = world_with(&[3, 4]);
        world.join_lobby(4);
        let id = world.create_match(3, &room("pw")).unwrap();

        let lobby = world.sessions.dequeue(4);
        assert!(ids(&lobby).contains(&u16::from(ServerPacketId::NewMatch)));
        assert_eq!(last_update(&lobby).password, MASKED_PASSWORD);

        world.leave_match(3);
        assert!(world.matches.get(id).is_none());
        assert_eq!(
            ids(&world.sessions.dequeue(4)),
            vec![u16::from(ServerPacketId::DisposeMatch)]
        );
    }

    #[test]
    fn test_host_rotates_on_leave() {
        let mut world = world_with(&[3, 4]);
        let id = world.create_match(3, &room("")).unwrap();
        world.join_match(4, id, "");
        world.sessions.dequeue(4);

        world.leave_match(3);

        let game = world.matches.get(id).unwrap();
        assert_eq!(game.host_id, 4);
        assert_eq!(game.slots[0].status, SlotStatus::Open);
        assert!(world.sessions.get(3).unwrap().match_id.is_none());
        assert!(ids(&world.sessions.dequeue(4)).contains(&u16::from(ServerPacketId::MatchTransferHost)));
    }

    #[test]
    fn test_only_host_starts() {
        let mut world = world_with(&[3, 4]);
        let id = world.create_match(3, &room("")).unwrap();
        world.join_match(4, id, "");

        assert!(!world.start_match(4));
        assert!(world.start_match(3));
        assert!(!world.start_match(3));

        let game = world.matches.get(id).unwrap();
        assert!(game.in_progress);
        assert_eq!(game.playing(), vec![3, 4]);
        assert!(ids(&world.sessions.dequeue(4)).contains(&u16::from(ServerPacketId::MatchStart)));
    }

    #[test]
    fn test_complete_resets_slots() {
        let mut world = world_with(&[3, 4]);
        let id = world.create_match(3, &room("")).unwrap();
        world.join_match(4, id, "");
        world.start_match(3);
        world.sessions.dequeue(3);

        assert!(world.complete_match(4));
        assert!(!world.complete_match(3));

        let game = world.matches.get(id).unwrap();
        assert!(!game.in_progress);
        assert_eq!(game.slots[0].status, SlotStatus::NotReady);
        assert_eq!(game.slots[1].status, SlotStatus::NotReady);
        let host_ids = ids(&world.sessions.dequeue(3));
        assert!(host_ids.contains(&u16::from(ServerPacketId::MatchComplete)));
    }

    #[test]
    fn test_score_is_tagged_with_slot() {
        let mut world = world_with(&[3, 4]);
        let id = world.create_match(3, &room("")).unwrap();
        world.join_match(4, id, "");
        world.start_match(3);
        world.sessions.dequeue(3);

        let frame = ScoreFrame {
            total_score: 1234,
            slot_id: 9,
            ..ScoreFrame::default()
        };
        assert!(world.score_update(4, frame).is_none());

        let relayed = split_packets(&world.sessions.dequeue(3));
        let frame = ScoreFrame::decode(&mut PacketReader::new(&relayed[0].1)).unwrap();
        assert_eq!(frame.slot_id, 1);
        assert_eq!(frame.total_score, 1234);
    }

    #[test]
    fn test_pp_win_holds_score_for_calculation() {
        let mut world = world_with(&[3]);
        let id = world.create_match(3, &room("")).unwrap();
        world.set_win_condition(3, ScoringType::Score, true);
        world.start_match(3);
        world.sessions.dequeue(3);

        let pending = world.score_update(3, ScoreFrame::default()).unwrap();
        assert_eq!(pending.match_id, id);
        assert_eq!(pending.request.map_hash, "abc123");
        assert_eq!(pending.request.mode, Mode::Osu);
        assert!(world.sessions.dequeue(3).is_empty());

        world.finish_score(pending, Some(321.6));
        let relayed = split_packets(&world.sessions.dequeue(3));
        let frame = ScoreFrame::decode(&mut PacketReader::new(&relayed[0].1)).unwrap();
        assert_eq!(frame.total_score, 322);
    }

    #[test]
    fn test_finished_score_dropped_after_leave() {
        let mut world = world_with(&[3, 4]);
        let id = world.create_match(3, &room("")).unwrap();
        world.join_match(4, id, "");
        world.set_win_condition(3, ScoringType::Score, true);
        world.start_match(3);

        let pending = world.score_update(4, ScoreFrame::default()).unwrap();
        world.leave_match(4);
        world.sessions.dequeue(3);

        world.finish_score(pending, None);
        assert!(world.sessions.dequeue(3).is_empty());
    }

    #[test]
    fn test_locked_match_blocks_slot_moves() {
        let mut world = world_with(&[3, 4]);
        let id = world.create_match(3, &room("")).unwrap();
        world.join_match(4, id, "");

        assert!(!world.set_match_locked(4, true));
        assert!(world.set_match_locked(3, true));
        assert!(!world.change_slot(4, 5));
        assert!(!world.change_team(4));
        assert!(world.change_slot(3, 5));
    }

    #[test]
    fn test_settings_report_new_map() {
        let mut world = world_with(&[3, 4]);
        let id = world.create_match(3, &room("")).unwrap();
        world.join_match(4, id, "");

        let mut record = world.matches.get(id).unwrap().to_record(true);
        assert!(world.change_settings(3, &record).is_none());

        record.map_hash = "def456".to_string();
        record.map_id = 2;
        assert!(world.change_settings(4, &record).is_none());
        let map = world.change_settings(3, &record).unwrap();
        assert_eq!(map.hash, "def456");
    }

    #[test]
    fn test_password_change_reaches_members() {
        let mut world = world_with(&[3, 4]);
        let id = world.create_match(3, &room("old")).unwrap();
        world.join_match(4, id, "old");
        world.sessions.dequeue(4);

        assert!(world.change_password(3, "new"));
        assert_eq!(world.matches.get(id).unwrap().password, "new");
        assert_eq!(
            ids(&world.sessions.dequeue(4)),
            vec![u16::from(ServerPacketId::MatchChangePassword)]
        );
    }

    #[test]
    fn test_invite_sends_embed() {
        let mut world = world_with(&[3, 4]);
        world.create_match(3, &room("a b")).unwrap();

        assert!(world.invite(3, 4));
        let received = split_packets(&world.sessions.dequeue(4));
        let message = ChatMessage::decode(&mut PacketReader::new(&received[0].1)).unwrap();
        assert_eq!(
            message.text,
            "Come join my multiplayer match: [osump://1000/a_b room]"
        );

        assert!(!world.invite(3, 42));
    }

    #[test]
    fn test_failed_reports_slot_index() {
        let mut world = world_with(&[3, 4]);
        let id = world.create_match(3, &room("")).unwrap();
        world.join_match(4, id, "");
        world.start_match(3);
        world.sessions.dequeue(3);

        world.player_failed(4);

        assert_eq!(world.sessions.dequeue(3), packets::match_player_failed(1));
    }

    #[test]
    fn test_skip_waits_for_everyone() {
        let mut world = world_with(&[3, 4]);
        let id = world.create_match(3, &room("")).unwrap();
        world.join_match(4, id, "");
        world.start_match(3);
        world.sessions.dequeue(3);

        world.skip_request(3);
        assert_eq!(
            ids(&world.sessions.dequeue(3)),
            vec![u16::from(ServerPacketId::MatchPlayerSkipped)]
        );

        world.skip_request(4);
        assert_eq!(
            ids(&world.sessions.dequeue(3)),
            vec![
                u16::from(ServerPacketId::MatchPlayerSkipped),
                u16::from(ServerPacketId::MatchSkip)
            ]
        );
    }

    #[test]
    fn test_logout_disposes_hosted_match() {
        let mut world = world_with(&[3]);
        let id = world.create_match(3, &room("")).unwrap();

        world.logout(3);

        assert!(world.matches.get(id).is_none());
        assert!(!world.channels.contains("#multi_1000"));
    }

    #[test]
    fn test_announce_map_posts_to_match_chat() {
        let mut world = world_with(&[3, 4]);
        let id = world.create_match(3, &room("")).unwrap();
        world.join_match(4, id, "");
        world.sessions.dequeue(4);

        let map = BeatmapInfo {
            id: 1,
            hash: "abc123".to_string(),
            title: "Song".to_string(),
            mode: Mode::Osu,
        };
        world.announce_map(id, &map, &[(100.0, 250.4)]);

        let received = split_packets(&world.sessions.dequeue(4));
        let message = ChatMessage::decode(&mut PacketReader::new(&received[0].1)).unwrap();
        assert_eq!(message.target, "#multiplayer");
        assert_eq!(message.text, "Now playing: Song (id 1) | 100%: 250pp");
    }

    #[test]
    fn test_transfer_host_notifies_match() {
        let mut world = world_with(&[3, 4]);
        let id = world.create_match(3, &room("")).unwrap();
        world.join_match(4, id, "");
        world.sessions.dequeue(3);
        world.sessions.dequeue(4);

        assert!(world.transfer_host(3, 1));

        assert_eq!(world.matches.get(id).unwrap().host_id, 4);
        let notification = u16::from(ServerPacketId::Notification);
        let old_host = world.sessions.dequeue(3);
        let new_host = world.sessions.dequeue(4);
        assert!(ids(&old_host).contains(&notification));
        assert_eq!(
            ids(&new_host),
            vec![
                u16::from(ServerPacketId::MatchTransferHost),
                notification,
                u16::from(ServerPacketId::UpdateMatch)
            ]
        );

        let (_, payload) = split_packets(&old_host)
            .into_iter()
            .find(|(packet, _)| *packet == notification)
            .unwrap();
        let text = PacketReader::new(&payload).read_string().unwrap();
        assert_eq!(text, "player4 became host!");
    }

    #[test]
    fn test_transfer_to_empty_slot_is_ignored() {
        let mut world = world_with(&[3]);
        let id = world.create_match(3, &room("")).unwrap();
        world.sessions.dequeue(3);

        assert!(!world.transfer_host(3, 5));
        assert_eq!(world.matches.get(id).unwrap().host_id, 3);
        assert!(world.sessions.dequeue(3).is_empty());
    }

    #[test]
    fn test_create_without_open_slot_leaves_nothing_behind() {
        let mut world = world_with(&[3, 4]);
        world.join_lobby(4);
        world.sessions.dequeue(4);
        let mut record = room("");
        for slot in record.slots.iter_mut() {
            slot.status = SlotStatus::Locked;
        }

        assert!(world.create_match(3, &record).is_none());

        assert_eq!(world.matches.len(), 0);
        assert!(!world.channels.contains("#multi_1000"));
        assert!(world.sessions.get(3).unwrap().match_id.is_none());
        assert_eq!(
            ids(&world.sessions.dequeue(3)),
            vec![u16::from(ServerPacketId::MatchJoinFail)]
        );
        assert!(world.sessions.dequeue(4).is_empty());
    }

    #[test]
    fn test_full_match_rejects_seventeenth_player() {
        let players: Vec<i32> = (3..=19).collect();
        let mut world = world_with(&players);
        let id = world.create_match(3, &room("")).unwrap();
        for &player in &players[1..16] {
            assert!(world.join_match(player, id, ""));
        }
        let before: Vec<_> = world
            .matches
            .get(id)
            .unwrap()
            .slots
            .iter()
            .map(|slot| (slot.session_id, slot.status))
            .collect();
        world.sessions.dequeue(19);

        assert!(!world.join_match(19, id, ""));

        assert_eq!(
            ids(&world.sessions.dequeue(19)),
            vec![u16::from(ServerPacketId::MatchJoinFail)]
        );
        assert!(world.sessions.get(19).unwrap().match_id.is_none());
        let game = world.matches.get(id).unwrap();
        let after: Vec<_> = game
            .slots
            .iter()
            .map(|slot| (slot.session_id, slot.status))
            .collect();
        assert_eq!(before, after);
        assert_eq!(game.members().len(), 16);
        assert_eq!(world.channels.get("#multi_1000").unwrap().members().len(), 16);
    }
}
