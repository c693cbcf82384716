//! # Bancho Server Library
//!
//! This library implements the real-time session server for the rhythm game
//! client: login, presence, chat, spectating and multiplayer matches. Clients
//! speak a binary packet protocol tunnelled over repeated HTTP POST requests;
//! the server queues outgoing packets per session and flushes them on every
//! poll.
//!
//! ## Core Responsibilities
//!
//! ### Session Lifecycle
//! Tracks every connected player from login to logout:
//! - Credential checks and the initial state snapshot
//! - Presence and stats fan-out to everyone online
//! - Idle detection and forced logout through one teardown path
//!
//! ### Chat
//! Permanent channels come from configuration. Match and spectator chats are
//! created on demand and disappear with their last member. Messages starting
//! with the command prefix are answered by the server's bot.
//!
//! ### Multiplayer
//! Each match has 16 slots and a host. Slot, ready, mod and team changes are
//! applied under one lock and broadcast to the match members and, for the
//! bigger transitions, to everyone browsing the lobby.
//!
//! ## Architecture Design
//!
//! ### One Lock, No Awaits Inside
//! Sessions, channels and matches live together in a [`world::World`] behind
//! a single tokio mutex. Packet handlers are plain functions that run with
//! the lock held. Anything that needs an external collaborator (beatmap
//! lookup, pp calculation) is returned as an effect and run afterwards with
//! a timeout, then applied under a fresh lock.
//!
//! ### Table Dispatch
//! Inbound opcodes map to handler functions in a table built at startup.
//! Chat commands use the same approach, keyed by trigger word.
//!
//! ### Ids, Not Pointers
//! Sessions, matches and channels refer to each other by id. A session
//! stores the id of its match; the match stores occupant ids in its slots.
//!
//! ## Module Organization
//!
//! ### Config Module (`config`)
//! TOML configuration with defaults for every field.
//!
//! ### Session Module (`session`)
//! Session records, outgoing queues and the session table.
//!
//! ### Channel Module (`channel`)
//! Chat channels with membership rules and message delivery.
//!
//! ### Matches Module (`matches`)
//! The 16-slot match state machine and the match registry.
//!
//! ### World Module (`world`)
//! The locked aggregate plus chat, social, spectating and logout operations.
//!
//! ### Multiplayer Module (`multiplayer`)
//! Match transitions together with the packets they fan out.
//!
//! ### Services Module (`services`)
//! Collaborator traits (beatmaps, performance, accounts, journal) and their
//! default implementations.
//!
//! ### Commands Module (`commands`)
//! The chat command table.
//!
//! ### Handlers Module (`handlers`)
//! One handler per inbound opcode.
//!
//! ### Login Module (`login`)
//! Login body parsing, credential checks and the initial snapshot.
//!
//! ### Dispatcher Module (`dispatcher`)
//! Per-request processing, the restart reply and the idle sweeper.
//!
//! ### Http Module (`http`)
//! The axum router in front of the dispatcher.
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use server::config::Config;
//! use server::dispatcher::Bancho;
//! use server::services::Services;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::default();
//!     let bancho = Bancho::new(&config, Services::from_config(&config));
//!     bancho.spawn_idle_sweeper();
//!
//!     let listener = tokio::net::TcpListener::bind("127.0.0.1:5001").await?;
//!     server::http::serve(listener, bancho, async {
//!         let _ = tokio::signal::ctrl_c().await;
//!     })
//!     .await?;
//!
//!     Ok(())
//! }
//! ```

pub mod channel;
pub mod commands;
pub mod config;
pub mod dispatcher;
pub mod handlers;
pub mod http;
pub mod login;
pub mod matches;
pub mod multiplayer;
pub mod services;
pub mod session;
pub mod world;
