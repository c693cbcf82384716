//! Request dispatch over the HTTP tunnel
//!
//! Every client poll lands in [`Bancho::handle_request`]. A request without
//! a token is a login; otherwise the body is a run of framed packets that
//! are decoded in order and routed through the [`HandlerTable`]. The reply
//! body is whatever the session had queued once the request is done.
//!
//! All shared state lives in one [`World`] behind a tokio mutex. Handlers
//! run with the lock held and never await. Collaborator calls requested by
//! handlers run after the lock is released, bounded by the configured
//! timeout, and their results are applied under a fresh lock.

use crate::commands::CommandTable;
use crate::config::Config;
use crate::handlers::{Effect, HandlerContext, HandlerTable};
use crate::login::{admit, LoginError, LoginRequest};
use crate::matches::MatchId;
use crate::services::{PerformanceRequest, Services};
use crate::world::World;
use log::{debug, error, info, warn};
use shared::{packets, Mods, PacketStream};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};

/// Accuracies listed in a "now playing" announcement
const ANNOUNCE_ACCURACIES: [f32; 4] = [100.0, 99.0, 98.0, 95.0];

/// Response to one tunnel request
#[derive(Debug, Clone, PartialEq)]
pub struct Reply {
    /// Token to hand back in the `cho-token` header; only set by logins
    pub token: Option<String>,
    pub body: Vec<u8>,
}

impl Reply {
    fn body(body: Vec<u8>) -> Self {
        Self { token: None, body }
    }
}

/// The server: shared world plus the tables and collaborators that act on it
#[derive(Debug, Clone)]
pub struct Bancho {
    world: Arc<Mutex<World>>,
    services: Arc<Services>,
    handlers: Arc<HandlerTable>,
    commands: Arc<CommandTable>,
    idle_timeout: Duration,
    sweep_interval: Duration,
    restart_grace: Duration,
}

impl Bancho {
    pub fn new(config: &Config, services: Services) -> Self {
        let world = World::new(config, Arc::clone(&services.journal));
        Self {
            world: Arc::new(Mutex::new(world)),
            services: Arc::new(services),
            handlers: Arc::new(HandlerTable::new()),
            commands: Arc::new(CommandTable::new(&config.server.command_prefix)),
            idle_timeout: config.idle_timeout(),
            sweep_interval: config.sweep_interval(),
            restart_grace: config.restart_grace(),
        }
    }

    /// Shared handle to the world, mostly for inspection
    pub fn world(&self) -> Arc<Mutex<World>> {
        Arc::clone(&self.world)
    }

    pub async fn handle_request(&self, token: Option<&str>, body: &[u8]) -> Reply {
        match token {
            None => self.login(body).await,
            Some(token) => Reply::body(self.handle_packets(token, body).await),
        }
    }

    /// Runs a login request, answering with a failure code on any error
    pub async fn login(&self, body: &[u8]) -> Reply {
        match self.try_login(body).await {
            Ok((token, body)) => Reply {
                token: Some(token),
                body,
            },
            Err(e) => {
                warn!("Login failed: {}", e);
                Reply::body(e.response())
            }
        }
    }

    async fn try_login(&self, body: &[u8]) -> Result<(String, Vec<u8>), LoginError> {
        let request = LoginRequest::parse(body)?;
        {
            let world = self.world.lock().await;
            request.check_client(&world.settings)?;
        }

        let account = self
            .services
            .bounded(self.services.accounts.find(&request.username))
            .await?;
        let account = request.authenticate(account)?;

        let mut world = self.world.lock().await;
        admit(&mut world, &request, &account)
    }

    async fn handle_packets(&self, token: &str, body: &[u8]) -> Vec<u8> {
        let (session_id, effects) = {
            let mut world = self.world.lock().await;
            let Some(session_id) = world.sessions.find_by_token(token) else {
                debug!("Unknown token, asking client to reconnect");
                return self.restart_reply(&world);
            };

            if !world.is_consistent(session_id) {
                error!("Session {} is inconsistent, forcing logout", session_id);
                world.logout(session_id);
                return self.restart_reply(&world);
            }

            let restricted = world
                .sessions
                .get(session_id)
                .map(|s| s.is_restricted())
                .unwrap_or(true);

            let mut ctx = HandlerContext::new(&mut *world, session_id, &self.commands);
            for packet in PacketStream::new(body) {
                let packet = match packet {
                    Ok(packet) => packet,
                    Err(e) => {
                        warn!("Dropping rest of request from {}: {}", session_id, e);
                        break;
                    }
                };

                let Some(route) = self.handlers.get(packet.id) else {
                    debug!("Unhandled packet {} from {}", packet.id, session_id);
                    continue;
                };
                if restricted && !route.always_allowed {
                    debug!("Restricted session {} sent packet {}", session_id, packet.id);
                    continue;
                }

                if let Err(e) = (route.handler)(&mut ctx, &mut packet.reader()) {
                    warn!(
                        "Bad payload for packet {} from {}: {}",
                        packet.id, session_id, e
                    );
                    break;
                }
                if ctx.farewell.is_some() {
                    break;
                }
            }

            let HandlerContext {
                effects, farewell, ..
            } = ctx;
            if let Some(remaining) = farewell {
                return remaining;
            }
            if let Some(session) = world.sessions.get_mut(session_id) {
                session.touch();
            }
            (session_id, effects)
        };

        for effect in effects {
            self.run_effect(effect).await;
        }

        self.world.lock().await.sessions.dequeue(session_id)
    }

    /// Notification plus restart packet for clients holding a stale token
    fn restart_reply(&self, world: &World) -> Vec<u8> {
        let text = if world.started.elapsed() < self.restart_grace {
            "Server has restarted"
        } else {
            "You lost connection to the server!"
        };
        let mut body = packets::notification(text);
        body.extend(packets::restart(0));
        body
    }

    async fn run_effect(&self, effect: Effect) {
        match effect {
            Effect::AnnounceMap { match_id, map_hash } => {
                self.announce_map(match_id, &map_hash).await;
            }
            Effect::PerformanceScore(pending) => {
                let pp = match self
                    .services
                    .bounded(self.services.performance.calculate(&pending.request))
                    .await
                {
                    Ok(pp) => Some(pp),
                    Err(e) => {
                        debug!("No pp for score in match {}: {}", pending.match_id, e);
                        None
                    }
                };
                self.world.lock().await.finish_score(pending, pp);
            }
        }
    }

    async fn announce_map(&self, match_id: MatchId, map_hash: &str) {
        let map = match self
            .services
            .bounded(self.services.beatmaps.by_hash(map_hash))
            .await
        {
            Ok(Some(map)) => map,
            Ok(None) => {
                debug!("Map {} is not known, skipping announcement", map_hash);
                return;
            }
            Err(e) => {
                warn!("Beatmap lookup for {} failed: {}", map_hash, e);
                return;
            }
        };

        let mods = {
            let world = self.world.lock().await;
            world
                .matches
                .get(match_id)
                .map(|game| game.mods)
                .unwrap_or(Mods::empty())
        };

        let mut figures = Vec::new();
        for accuracy in ANNOUNCE_ACCURACIES {
            let request = PerformanceRequest::for_accuracy(&map, mods, accuracy);
            match self
                .services
                .bounded(self.services.performance.calculate(&request))
                .await
            {
                Ok(pp) => figures.push((accuracy, pp)),
                Err(e) => {
                    debug!("No pp for map {}: {}", map.id, e);
                    figures.clear();
                    break;
                }
            }
        }

        self.world
            .lock()
            .await
            .announce_map(match_id, &map, &figures);
    }

    /// Logs out every session that has stopped polling
    ///
    /// Sessions are handled one at a time, yielding in between so that
    /// requests waiting on the lock get a turn.
    pub async fn sweep_idle(&self) -> usize {
        let expired = self.world.lock().await.sessions.timed_out(self.idle_timeout);

        let mut swept = 0;
        for session_id in expired {
            {
                let mut world = self.world.lock().await;
                // The client may have polled since the scan
                let still_idle = world
                    .sessions
                    .get(session_id)
                    .map(|s| s.is_timed_out(self.idle_timeout))
                    .unwrap_or(false);
                if still_idle && world.logout(session_id).is_some() {
                    info!("Session {} timed out", session_id);
                    swept += 1;
                }
            }
            tokio::task::yield_now().await;
        }
        swept
    }

    /// Runs [`Bancho::sweep_idle`] on the configured interval
    pub fn spawn_idle_sweeper(&self) -> JoinHandle<()> {
        let bancho = self.clone();
        tokio::spawn(async move {
            let mut ticker = interval(bancho.sweep_interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

            // Skip the first tick since it fires immediately
            ticker.tick().await;

            loop {
                ticker.tick().await;
                let swept = bancho.sweep_idle().await;
                if swept > 0 {
                    info!("Idle sweep removed {} session(s)", swept);
                }
            }
        })
    }

    /// Aborts a sweeper started by [`Bancho::spawn_idle_sweeper`] and waits for it
    ///
    /// Returns false when the task had already ended some other way.
    pub async fn stop_idle_sweeper(sweeper: JoinHandle<()>) -> bool {
        sweeper.abort();
        match sweeper.await {
            Err(e) if e.is_cancelled() => {
                debug!("Idle sweeper stopped");
                true
            }
            Err(e) => {
                debug!("Idle sweeper ended with {}", e);
                false
            }
            Ok(()) => {
                debug!("Idle sweeper had already finished");
                false
            }
        }
    }

    pub async fn online_count(&self) -> usize {
        self.world.lock().await.online_count()
    }

    pub async fn match_count(&self) -> usize {
        self.world.lock().await.matches.len()
    }
}
