//! Multiplayer matches and their slot state machine
//!
//! Everything in here is pure state: transitions return what changed and
//! leave packet delivery to the caller (see `multiplayer.rs`). A match never
//! stores references to sessions, only their ids, and the list of connected
//! players is derived from the slots so it cannot drift from them.

use log::{debug, info};
use shared::records::{MatchRecord, SlotRecord, MATCH_SLOTS};
use shared::{Mode, Mods, ScoringType, SlotStatus, SlotTeam, TeamType, MASKED_PASSWORD};
use std::collections::BTreeMap;

use crate::channel::match_channel_name;

pub type MatchId = i16;

/// Beatmap currently selected for a match
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MapSelection {
    pub id: i32,
    pub hash: String,
    pub title: String,
}

/// One of the sixteen seats
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Slot {
    pub session_id: Option<i32>,
    pub status: SlotStatus,
    pub team: SlotTeam,
    /// Only meaningful under free-mod
    pub mods: Mods,
    pub loaded: bool,
    pub skipped: bool,
}

impl Slot {
    pub fn is_occupied(&self) -> bool {
        self.status.is_occupied()
    }

    fn clear_play_flags(&mut self) {
        self.loaded = false;
        self.skipped = false;
    }
}

/// What happened when a player left
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Departure {
    pub slot: usize,
    /// Set when the leaver was host and someone was left to take over
    pub new_host: Option<i32>,
    /// True when nobody is left and the match should be disposed
    pub empty: bool,
}

/// Outcome of a settings change by the host
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SettingsChange {
    /// A different beatmap was selected
    pub new_map: Option<MapSelection>,
}

/// One multiplayer room
#[derive(Debug, Clone)]
pub struct Match {
    pub id: MatchId,
    pub name: String,
    pub password: String,
    pub host_id: i32,
    pub in_progress: bool,
    /// While set, only the host may move players between slots or teams
    pub locked: bool,
    pub map: Option<MapSelection>,
    pub slots: [Slot; MATCH_SLOTS],
    pub mods: Mods,
    pub freemod: bool,
    pub mode: Mode,
    pub scoring_type: ScoringType,
    /// Scores are replaced by computed pp before relaying
    pub pp_win: bool,
    pub team_type: TeamType,
    pub seed: i32,
}

impl Match {
    /// Builds a match from the record the creating client sent
    pub fn from_record(id: MatchId, host_id: i32, record: &MatchRecord) -> Self {
        let map = record.has_map().then(|| MapSelection {
            id: record.map_id,
            hash: record.map_hash.clone(),
            title: record.map_title.clone(),
        });

        let mut slots = [Slot::default(); MATCH_SLOTS];
        for (slot, wire) in slots.iter_mut().zip(record.slots.iter()) {
            if wire.status == SlotStatus::Locked {
                slot.status = SlotStatus::Locked;
            }
        }

        Self {
            id,
            name: record.name.clone(),
            password: record.password.clone(),
            host_id,
            in_progress: false,
            locked: false,
            map,
            slots,
            mods: record.mods,
            freemod: record.freemod,
            mode: record.mode,
            scoring_type: record.scoring_type,
            pp_win: false,
            team_type: record.team_type,
            seed: record.seed,
        }
    }

    pub fn chat_channel(&self) -> String {
        match_channel_name(self.id)
    }

    pub fn is_host(&self, session_id: i32) -> bool {
        self.host_id == session_id
    }

    /// Sessions seated in the match, in slot order
    pub fn members(&self) -> Vec<i32> {
        self.slots.iter().filter_map(|s| s.session_id).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.iter().all(|s| s.session_id.is_none())
    }

    pub fn slot_of(&self, session_id: i32) -> Option<usize> {
        self.slots
            .iter()
            .position(|s| s.session_id == Some(session_id))
    }

    pub fn slot(&self, index: usize) -> Option<&Slot> {
        self.slots.get(index)
    }

    /// Occupants that are currently playing
    pub fn playing(&self) -> Vec<i32> {
        self.slots
            .iter()
            .filter(|s| s.status == SlotStatus::Playing)
            .filter_map(|s| s.session_id)
            .collect()
    }

    fn free_slot(&self) -> Option<usize> {
        self.slots.iter().position(|s| s.status == SlotStatus::Open)
    }

    pub fn has_free_slot(&self) -> bool {
        self.free_slot().is_some()
    }

    fn demote(&mut self, from: impl Fn(SlotStatus) -> bool) {
        for slot in self.slots.iter_mut().filter(|s| from(s.status)) {
            slot.status = SlotStatus::NotReady;
        }
    }

    /// Demotes every occupied slot that has the map
    fn unready_all(&mut self) {
        self.demote(|status| status.is_occupied() && status != SlotStatus::NoMap);
    }

    /// Seats a session in the first open slot
    pub fn seat(&mut self, session_id: i32) -> Option<usize> {
        let index = self.free_slot()?;
        self.slots[index] = Slot {
            session_id: Some(session_id),
            status: SlotStatus::NotReady,
            ..Slot::default()
        };
        Some(index)
    }

    /// Frees the seat of a leaving session and hands host on if needed
    pub fn vacate(&mut self, session_id: i32) -> Option<Departure> {
        let index = self.slot_of(session_id)?;
        self.slots[index] = Slot::default();

        if self.is_empty() {
            return Some(Departure {
                slot: index,
                new_host: None,
                empty: true,
            });
        }

        let mut new_host = None;
        if self.host_id == session_id {
            new_host = self
                .slots
                .iter()
                .find(|s| s.is_occupied())
                .and_then(|s| s.session_id);
            if let Some(host) = new_host {
                self.host_id = host;
            }
        }

        Some(Departure {
            slot: index,
            new_host,
            empty: false,
        })
    }

    /// Moves a session to another open slot, taking its state along
    pub fn move_to(&mut self, session_id: i32, target: usize) -> bool {
        if self.in_progress || target >= MATCH_SLOTS {
            return false;
        }
        let Some(from) = self.slot_of(session_id) else {
            return false;
        };
        if self.slots[target].status != SlotStatus::Open {
            return false;
        }

        self.slots[target] = self.slots[from];
        self.slots[from] = Slot::default();
        true
    }

    /// Changes the sender's own slot status
    ///
    /// Returns false when the match is running or the slot already has the
    /// requested status, so callers can skip the broadcast.
    pub fn set_status(&mut self, session_id: i32, status: SlotStatus) -> bool {
        if self.in_progress {
            return false;
        }
        let Some(index) = self.slot_of(session_id) else {
            return false;
        };
        let slot = &mut self.slots[index];
        if slot.status == status {
            return false;
        }
        slot.status = status;
        true
    }

    /// Toggles a seat between open and locked
    pub fn toggle_lock(&mut self, index: usize) -> bool {
        if self.in_progress {
            return false;
        }
        let Some(slot) = self.slots.get_mut(index) else {
            return false;
        };
        slot.status = match slot.status {
            SlotStatus::Open => SlotStatus::Locked,
            SlotStatus::Locked => SlotStatus::Open,
            _ => return false,
        };
        true
    }

    /// Locks open seats from `size` onwards and opens locked seats below it
    pub fn resize(&mut self, size: usize) -> bool {
        if self.in_progress || size == 0 || size > MATCH_SLOTS {
            return false;
        }
        for (index, slot) in self.slots.iter_mut().enumerate() {
            match slot.status {
                SlotStatus::Open if index >= size => slot.status = SlotStatus::Locked,
                SlotStatus::Locked if index < size => slot.status = SlotStatus::Open,
                _ => {}
            }
        }
        true
    }

    /// Applies the host's new settings
    pub fn apply_settings(&mut self, record: &MatchRecord) -> SettingsChange {
        let mut change = SettingsChange::default();

        let current_hash = self.map.as_ref().map(|m| m.hash.as_str()).unwrap_or("");
        if record.map_hash != current_hash {
            self.map = record.has_map().then(|| MapSelection {
                id: record.map_id,
                hash: record.map_hash.clone(),
                title: record.map_title.clone(),
            });
            self.mode = record.mode;
            self.demote(|status| status == SlotStatus::Ready);
            change.new_map = self.map.clone();
        }

        if record.name != self.name {
            self.name = record.name.clone();
        }

        if record.freemod != self.freemod {
            if record.freemod {
                let player_mods = self.mods - Mods::MULTIPLAYER;
                for slot in self.slots.iter_mut().filter(|s| s.is_occupied()) {
                    slot.mods = player_mods;
                }
                self.mods &= Mods::MULTIPLAYER;
            } else {
                for slot in self.slots.iter_mut() {
                    slot.mods = Mods::empty();
                }
            }
            self.freemod = record.freemod;
        }

        if record.scoring_type != self.scoring_type {
            self.scoring_type = record.scoring_type;
        }

        if record.team_type != self.team_type {
            self.team_type = record.team_type;
            let team = match self.team_type {
                TeamType::HeadToHead | TeamType::TagCoop => SlotTeam::Neutral,
                TeamType::TeamVs | TeamType::TagTeamVs => SlotTeam::Red,
            };
            for slot in self.slots.iter_mut().filter(|s| s.is_occupied()) {
                slot.team = team;
            }
        }

        change
    }

    /// Applies a mod change from `session_id`
    pub fn change_mods(&mut self, session_id: i32, mods: Mods) -> bool {
        if self.in_progress {
            return false;
        }
        let is_host = self.is_host(session_id);

        if self.freemod {
            let Some(index) = self.slot_of(session_id) else {
                return false;
            };
            if is_host {
                let speed = mods & Mods::MULTIPLAYER;
                if speed != self.mods {
                    self.mods = speed;
                    self.demote(|status| status == SlotStatus::Ready);
                }
            }
            self.slots[index].mods = mods - Mods::MULTIPLAYER;
            true
        } else {
            if !is_host {
                debug!("Non-host {} tried to change mods of match {}", session_id, self.id);
                return false;
            }
            self.mods = mods;
            self.unready_all();
            true
        }
    }

    /// Flips the sender between the blue and red team
    pub fn change_team(&mut self, session_id: i32) -> bool {
        if self.in_progress {
            return false;
        }
        let Some(index) = self.slot_of(session_id) else {
            return false;
        };
        let slot = &mut self.slots[index];
        slot.team = match slot.team {
            SlotTeam::Blue => SlotTeam::Red,
            _ => SlotTeam::Blue,
        };
        self.unready_all();
        true
    }

    /// Starts play for everyone who has the map
    ///
    /// Returns the sessions that were moved to playing, or `None` if the
    /// match was already running.
    pub fn start(&mut self) -> Option<Vec<i32>> {
        if self.in_progress {
            return None;
        }
        let mut started = Vec::new();
        for slot in self.slots.iter_mut() {
            if slot.is_occupied() && slot.status != SlotStatus::NoMap {
                slot.status = SlotStatus::Playing;
                slot.clear_play_flags();
                started.extend(slot.session_id);
            }
        }
        self.in_progress = true;
        info!("Match {} started with {} players", self.id, started.len());
        Some(started)
    }

    /// Marks the sender as loaded; true once every player has loaded
    pub fn load_complete(&mut self, session_id: i32) -> bool {
        if !self.in_progress {
            return false;
        }
        let Some(index) = self.slot_of(session_id) else {
            return false;
        };
        self.slots[index].loaded = true;
        self.slots
            .iter()
            .filter(|s| s.status == SlotStatus::Playing)
            .all(|s| s.loaded)
    }

    /// Marks the sender as wanting to skip
    ///
    /// Returns `None` for a repeated or invalid request, otherwise whether
    /// every playing slot now wants to skip.
    pub fn skip(&mut self, session_id: i32) -> Option<bool> {
        if !self.in_progress {
            return None;
        }
        let index = self.slot_of(session_id)?;
        if self.slots[index].skipped {
            return None;
        }
        self.slots[index].skipped = true;
        Some(
            self.slots
                .iter()
                .filter(|s| s.status == SlotStatus::Playing)
                .all(|s| s.skipped),
        )
    }

    /// Ends the running play
    ///
    /// Returns the sessions that were playing, or `None` if nothing was
    /// running. Every occupied slot with the map ends up not ready.
    pub fn complete(&mut self) -> Option<Vec<i32>> {
        if !self.in_progress {
            return None;
        }
        let played = self.playing();
        self.in_progress = false;
        self.unready_all();
        for slot in self.slots.iter_mut() {
            slot.clear_play_flags();
        }
        info!("Match {} completed", self.id);
        Some(played)
    }

    /// Cancels the running play, returning who was playing
    pub fn abort(&mut self) -> Option<Vec<i32>> {
        if !self.in_progress {
            return None;
        }
        let played = self.playing();
        for slot in self.slots.iter_mut() {
            if slot.status == SlotStatus::Playing {
                slot.status = SlotStatus::NotReady;
            }
            slot.clear_play_flags();
        }
        self.in_progress = false;
        info!("Match {} aborted", self.id);
        Some(played)
    }

    /// Slot index of a failing player
    pub fn failed(&self, session_id: i32) -> Option<usize> {
        if !self.in_progress {
            return None;
        }
        self.slot_of(session_id)
    }

    /// Gives host to the occupant of `index`
    pub fn transfer_host(&mut self, index: usize) -> Option<i32> {
        let target = self.slots.get(index)?.session_id?;
        self.host_id = target;
        Some(target)
    }

    pub fn set_password(&mut self, password: &str) -> bool {
        if self.in_progress || self.password == password {
            return false;
        }
        self.password = password.to_string();
        true
    }

    /// Wire form of the match
    ///
    /// Unless `reveal_password` is set a non-empty password is replaced by a
    /// placeholder.
    pub fn to_record(&self, reveal_password: bool) -> MatchRecord {
        let password = if reveal_password || self.password.is_empty() {
            self.password.clone()
        } else {
            MASKED_PASSWORD.to_string()
        };

        let mut slots = [SlotRecord::default(); MATCH_SLOTS];
        for (wire, slot) in slots.iter_mut().zip(self.slots.iter()) {
            *wire = SlotRecord {
                status: slot.status,
                team: slot.team,
                user_id: slot.session_id,
                mods: slot.mods,
            };
        }

        MatchRecord {
            id: self.id,
            in_progress: self.in_progress,
            mods: self.mods,
            name: self.name.clone(),
            password,
            map_title: self.map.as_ref().map(|m| m.title.clone()).unwrap_or_default(),
            map_id: self.map.as_ref().map(|m| m.id).unwrap_or(-1),
            map_hash: self.map.as_ref().map(|m| m.hash.clone()).unwrap_or_default(),
            slots,
            host_id: self.host_id,
            mode: self.mode,
            scoring_type: self.scoring_type,
            team_type: self.team_type,
            freemod: self.freemod,
            seed: self.seed,
        }
    }

    /// Chat link that opens the match in the client
    pub fn embed(&self) -> String {
        format!(
            "[osump://{}/{} {}]",
            self.id,
            self.password.replace(' ', "_"),
            self.name
        )
    }
}

/// All live matches keyed by id
#[derive(Debug)]
pub struct MatchRegistry {
    matches: BTreeMap<MatchId, Match>,
    first_id: MatchId,
    next_id: MatchId,
}

impl MatchRegistry {
    pub fn new(first_id: MatchId) -> Self {
        let first_id = first_id.max(1);
        Self {
            matches: BTreeMap::new(),
            first_id,
            next_id: first_id,
        }
    }

    /// Picks the next free id, wrapping back to the first id after the
    /// int16 limit
    fn allocate_id(&mut self) -> Option<MatchId> {
        let span = (i16::MAX - self.first_id) as usize + 1;
        for _ in 0..span {
            let candidate = self.next_id;
            self.next_id = if candidate == i16::MAX {
                self.first_id
            } else {
                candidate + 1
            };
            if !self.matches.contains_key(&candidate) {
                return Some(candidate);
            }
        }
        None
    }

    /// Registers a new match hosted by `host_id`
    pub fn create(&mut self, host_id: i32, record: &MatchRecord) -> Option<MatchId> {
        let id = self.allocate_id()?;
        self.matches
            .insert(id, Match::from_record(id, host_id, record));
        info!("Match {} created by {}", id, host_id);
        Some(id)
    }

    pub fn get(&self, id: MatchId) -> Option<&Match> {
        self.matches.get(&id)
    }

    pub fn get_mut(&mut self, id: MatchId) -> Option<&mut Match> {
        self.matches.get_mut(&id)
    }

    pub fn remove(&mut self, id: MatchId) -> Option<Match> {
        let removed = self.matches.remove(&id);
        if removed.is_some() {
            info!("Match {} disposed", id);
        }
        removed
    }

    pub fn iter(&self) -> impl Iterator<Item = &Match> {
        self.matches.values()
    }

    /// Matches whose slots list `session_id`
    pub fn seating(&self, session_id: i32) -> Vec<MatchId> {
        self.matches
            .values()
            .filter(|m| m.slot_of(session_id).is_some())
            .map(|m| m.id)
            .collect()
    }

    pub fn len(&self) -> usize {
        self.matches.len()
    }

    pub fn is_empty(&self) -> bool {
        self.matches.is_empty()
    }
}
