//! Chat commands answered by the bot
//!
//! Commands are plain functions registered in a [`CommandTable`] under a
//! trigger word. Multiplayer commands live in their own set behind the
//! `mp`/`multi` trigger and only work for the host, typed in the match chat.

use crate::world::World;
use log::debug;
use rand::Rng;
use shared::records::MATCH_SLOTS;
use shared::{Privileges, ScoringType, SlotStatus};

/// Everything a command gets to see about its invocation
#[derive(Debug)]
pub struct CommandContext<'a> {
    pub table: &'a CommandTable,
    pub session_id: i32,
    /// Canonical channel the command was typed in; `None` when it was sent
    /// privately to the bot
    pub channel: Option<&'a str>,
    pub trigger: &'a str,
    pub args: Vec<&'a str>,
}

/// A command returns the bot's reply, or `None` to stay silent
pub type CommandFn = fn(&mut World, &CommandContext<'_>) -> Option<String>;

pub struct Command {
    pub trigger: &'static str,
    pub aliases: &'static [&'static str],
    /// Any one of these privileges allows the command
    pub privileges: Privileges,
    pub doc: &'static str,
    pub hidden: bool,
    handler: CommandFn,
}

impl std::fmt::Debug for Command {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Command")
            .field("trigger", &self.trigger)
            .field("aliases", &self.aliases)
            .field("privileges", &self.privileges)
            .finish()
    }
}

impl Command {
    fn matches(&self, word: &str) -> bool {
        self.trigger == word || self.aliases.contains(&word)
    }
}

/// Registered commands, looked up by trigger word
#[derive(Debug)]
pub struct CommandTable {
    prefix: String,
    commands: Vec<Command>,
    match_commands: Vec<Command>,
}

macro_rules! command {
    ($trigger:literal, [$($alias:literal),*], $privileges:expr, $handler:expr, $doc:literal) => {
        Command {
            trigger: $trigger,
            aliases: &[$($alias),*],
            privileges: $privileges,
            doc: $doc,
            hidden: false,
            handler: $handler,
        }
    };
    ($trigger:literal, $handler:expr, $doc:literal) => {
        command!($trigger, [], Privileges::USER, $handler, $doc)
    };
}

impl CommandTable {
    pub fn new(prefix: &str) -> Self {
        Self {
            prefix: prefix.to_string(),
            commands: vec![
                command!("help", help, "Lists the commands you can use"),
                command!("ping", ping, "Checks that the server responds"),
                command!("roll", roll, "Rolls a number between 0 and the given maximum"),
            ],
            match_commands: vec![
                command!("start", [], Privileges::USER, mp_start, "Starts the match"),
                command!("abort", ["ab"], Privileges::USER, mp_abort, "Aborts the running match"),
                command!("win", ["wc"], Privileges::USER, mp_win, "Changes the win condition"),
                command!("move", mp_move, "Moves a player to another slot"),
                command!("size", mp_size, "Changes the number of open slots"),
                command!("invite", mp_invite, "Invites a player to the match"),
                command!("lock", mp_lock, "Prevents players from changing slot or team"),
                command!("unlock", mp_unlock, "Lets players change slot and team again"),
            ],
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn is_command(&self, text: &str) -> bool {
        !self.prefix.is_empty() && text.starts_with(&self.prefix)
    }

    /// Runs the command in `text`, returning the bot's reply
    pub fn evaluate(
        &self,
        world: &mut World,
        session_id: i32,
        channel: Option<&str>,
        text: &str,
    ) -> Option<String> {
        let body = text.strip_prefix(&self.prefix)?;
        let mut words = body.split_whitespace();
        let mut trigger = words.next()?;

        let set = if trigger == "mp" || trigger == "multi" {
            trigger = words.next()?;
            &self.match_commands
        } else {
            &self.commands
        };

        let privileges = world.sessions.get(session_id)?.privileges;
        let command = set
            .iter()
            .find(|c| c.matches(trigger) && c.privileges.intersects(privileges))?;

        let context = CommandContext {
            table: self,
            session_id,
            channel,
            trigger,
            args: words.collect(),
        };
        debug!("Session {} ran command {}", session_id, command.trigger);
        (command.handler)(world, &context)
    }

    /// Commands visible to a session with `privileges`
    pub fn visible(&self, privileges: Privileges) -> Vec<&'static str> {
        self.commands
            .iter()
            .filter(|c| !c.hidden && c.privileges.intersects(privileges))
            .map(|c| c.trigger)
            .collect()
    }
}

fn help(world: &mut World, ctx: &CommandContext<'_>) -> Option<String> {
    let privileges = world.sessions.get(ctx.session_id)?.privileges;
    let table = ctx.table;

    if let Some(wanted) = ctx.args.first() {
        if let Some(command) = table
            .commands
            .iter()
            .find(|c| c.matches(wanted) && !c.hidden && c.privileges.intersects(privileges))
        {
            return Some(format!("{}{}: {}", table.prefix, command.trigger, command.doc));
        }
    }

    Some(format!(
        "List of all commands: {}",
        table.visible(privileges).join("|")
    ))
}

fn ping(_world: &mut World, _ctx: &CommandContext<'_>) -> Option<String> {
    Some("PONG".to_string())
}

fn roll(world: &mut World, ctx: &CommandContext<'_>) -> Option<String> {
    let max = ctx
        .args
        .first()
        .and_then(|arg| arg.parse::<u32>().ok())
        .unwrap_or(100);
    let rolled = rand::thread_rng().gen_range(0..=max);
    let name = &world.sessions.get(ctx.session_id)?.username;
    Some(format!("{} rolled {} point(s)", name, rolled))
}

/// True when the command was typed by the host in their own match chat
fn in_hosted_chat(world: &World, ctx: &CommandContext<'_>) -> bool {
    let Some(match_id) = world.hosted_match(ctx.session_id) else {
        return false;
    };
    let chat = world.matches.get(match_id).map(|m| m.chat_channel());
    chat.is_some() && chat.as_deref() == ctx.channel
}

fn mp_start(world: &mut World, ctx: &CommandContext<'_>) -> Option<String> {
    if !in_hosted_chat(world, ctx) {
        return None;
    }
    let match_id = world.hosted_match(ctx.session_id)?;
    let game = world.matches.get(match_id)?;
    if game.in_progress {
        return Some("The match is already running.".to_string());
    }

    let force = ctx.args.first() == Some(&"force");
    let all_ready = game
        .slots
        .iter()
        .filter(|s| s.is_occupied() && s.status != SlotStatus::NoMap)
        .all(|s| s.status == SlotStatus::Ready);
    if !force && !all_ready {
        return Some(format!(
            "Not all players are ready. Use {}mp start force to start anyway.",
            ctx.table.prefix()
        ));
    }

    world
        .start_match(ctx.session_id)
        .then(|| "Starting match... Good luck!".to_string())
}

fn mp_abort(world: &mut World, ctx: &CommandContext<'_>) -> Option<String> {
    if !in_hosted_chat(world, ctx) {
        return None;
    }
    world
        .abort_match(ctx.session_id)
        .then(|| "Aborted match.".to_string())
}

fn mp_win(world: &mut World, ctx: &CommandContext<'_>) -> Option<String> {
    if !in_hosted_chat(world, ctx) {
        return None;
    }
    let Some(&condition) = ctx.args.first() else {
        return Some(format!(
            "Wrong usage. {}mp {} <score|acc|combo|sv2|pp>",
            ctx.table.prefix(), ctx.trigger
        ));
    };

    let (scoring, pp) = match condition {
        "pp" => (ScoringType::Score, true),
        name => match ScoringType::from_name(name) {
            Some(scoring) => (scoring, false),
            None => return Some("Not a valid win condition.".to_string()),
        },
    };
    world.set_win_condition(ctx.session_id, scoring, pp);

    Some(if pp {
        "Changed win condition to pp.".to_string()
    } else {
        format!("Changed win condition to {}.", scoring.name())
    })
}

fn mp_move(world: &mut World, ctx: &CommandContext<'_>) -> Option<String> {
    if !in_hosted_chat(world, ctx) {
        return None;
    }
    let usage = || {
        Some(format!(
            "Wrong usage. {}mp move <player> <slot>",
            ctx.table.prefix()
        ))
    };
    let (Some(name), Some(slot)) = (ctx.args.first(), ctx.args.get(1)) else {
        return usage();
    };
    let Some(slot) = slot
        .parse::<usize>()
        .ok()
        .filter(|n| (1..=MATCH_SLOTS).contains(n))
    else {
        return usage();
    };

    let Some(target) = world.sessions.find_by_name(name) else {
        return Some(format!("{} is not online.", name));
    };
    if world.move_player(ctx.session_id, target, slot - 1) {
        Some(format!("Moved {} to slot {}.", name, slot))
    } else {
        Some(format!("Could not move {} to slot {}.", name, slot))
    }
}

fn mp_size(world: &mut World, ctx: &CommandContext<'_>) -> Option<String> {
    if !in_hosted_chat(world, ctx) {
        return None;
    }
    let size = ctx.args.first().and_then(|arg| arg.parse::<usize>().ok());
    match size {
        Some(size) if world.resize_match(ctx.session_id, size) => {
            Some(format!("Match size changed to {}.", size))
        }
        _ => Some(format!(
            "Wrong usage. {}mp size <1-{}>",
            ctx.table.prefix(), MATCH_SLOTS
        )),
    }
}

fn mp_invite(world: &mut World, ctx: &CommandContext<'_>) -> Option<String> {
    if !in_hosted_chat(world, ctx) {
        return None;
    }
    let Some(&name) = ctx.args.first() else {
        return Some(format!(
            "Wrong usage. {}mp invite <player>",
            ctx.table.prefix()
        ));
    };
    let target = world.sessions.find_by_name(name).unwrap_or(-1);
    world
        .invite(ctx.session_id, target)
        .then(|| format!("Invited {}.", name))
}

fn mp_lock(world: &mut World, ctx: &CommandContext<'_>) -> Option<String> {
    if !in_hosted_chat(world, ctx) {
        return None;
    }
    world
        .set_match_locked(ctx.session_id, true)
        .then(|| "Locked the match.".to_string())
}

fn mp_unlock(world: &mut World, ctx: &CommandContext<'_>) -> Option<String> {
    if !in_hosted_chat(world, ctx) {
        return None;
    }
    world
        .set_match_locked(ctx.session_id, false)
        .then(|| "Unlocked the match.".to_string())
}
