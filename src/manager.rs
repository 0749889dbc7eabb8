//! Routing of chat events to per-channel sessions
//!
//! The [`SessionManager`] owns the channel to session map. It creates a
//! session on the first join in a channel, forwards joins and messages to
//! the session queues without ever blocking, and forgets a session once the
//! session reports that it finished.

use std::{collections::HashMap, sync::Arc, time::Duration};

use enum_map::EnumMap;
use tokio::sync::{Semaphore, mpsc, mpsc::error::TrySendError};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use web_time::SystemTime;

use crate::{
    config::Config,
    constants::answer_text,
    error::Result,
    game::{AnswerMessage, Finished, Game, QueueWaits, SessionHandle, SessionState, Shared},
    game_id::GameId,
    handler::Handler,
    player::{Channel, ChannelId, Player},
    store::Store,
};

/// Event coming from the chat transport
#[derive(Debug, Clone)]
pub enum InboundEvent {
    /// A player asked to join the channel's game
    Join {
        /// Channel the request was sent in
        channel: Channel,
        /// Requesting player
        player: Player,
    },
    /// Any other text message in a channel
    Message {
        /// Channel the message was sent in
        channel: ChannelId,
        /// Author
        player: Player,
        /// Raw text
        text: String,
        /// When the transport received it
        received_at: SystemTime,
    },
}

/// What happened to a routed event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    /// Queued for the session
    Delivered,
    /// No session runs in the channel; the message was dropped
    NoSession,
    /// The session queue was full; the event was dropped
    QueueFull,
    /// The event was malformed and dropped
    Rejected,
}

/// Maps channels to their running sessions
pub struct SessionManager {
    shared: Arc<Shared>,
    sessions: HashMap<ChannelId, SessionHandle>,
    finished: mpsc::UnboundedReceiver<Finished>,
    cancel: CancellationToken,
}

impl SessionManager {
    /// Creates a manager with a fresh concurrency pool
    ///
    /// # Arguments
    ///
    /// * `config` - settings for the manager and every session
    /// * `handler` - presentation and question supply
    /// * `store` - score persistence
    /// * `cancel` - parent token; cancelling it stops the manager and every
    ///   session. The manager only ever cancels a child of it.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::InvalidConfig`] if `config` is out of bounds.
    pub fn new(
        config: Config,
        handler: Arc<dyn Handler>,
        store: Arc<dyn Store>,
        cancel: CancellationToken,
    ) -> Result<Self> {
        let config = config.validated()?;
        let pool = Arc::new(Semaphore::new(config.max_active_games));
        let (finished_tx, finished) = mpsc::unbounded_channel();

        info!(
            max_active_games = config.max_active_games,
            quorum = config.quorum,
            rounds_per_game = config.rounds_per_game,
            "session manager created"
        );

        Ok(Self {
            shared: Arc::new(Shared {
                config,
                handler,
                store,
                pool,
                waits: QueueWaits::default(),
                finished: finished_tx,
            }),
            sessions: HashMap::new(),
            finished,
            cancel: cancel.child_token(),
        })
    }

    /// Settings in effect
    pub fn config(&self) -> &Config {
        &self.shared.config
    }

    /// Validates and routes one transport event
    pub fn handle_event(&mut self, event: InboundEvent) -> Delivery {
        match event {
            InboundEvent::Join { channel, player } => {
                if channel.id.is_empty() || player.id.as_str().is_empty() {
                    warn!(channel = %channel.id, player = %player.id, "malformed join dropped");
                    return Delivery::Rejected;
                }
                self.handle_join(channel, player)
            }
            InboundEvent::Message {
                channel,
                player,
                text,
                received_at,
            } => {
                if channel.is_empty()
                    || player.id.as_str().is_empty()
                    || text.trim().is_empty()
                {
                    warn!(channel = %channel, player = %player.id, "malformed message dropped");
                    return Delivery::Rejected;
                }
                if text.chars().count() > answer_text::MAX_LENGTH {
                    debug!(channel = %channel, player = %player.id, "overlong message dropped");
                    return Delivery::Rejected;
                }
                self.handle_message(
                    &channel,
                    AnswerMessage {
                        player,
                        text,
                        received_at,
                    },
                )
            }
        }
    }

    /// Forwards a join, creating the channel's session if needed
    ///
    /// A session that already finished but was not reaped yet is replaced.
    pub fn handle_join(&mut self, channel: Channel, player: Player) -> Delivery {
        self.reap_finished();

        let player = match self.live_session(&channel).try_join(player) {
            Ok(()) => return Delivery::Delivered,
            Err(TrySendError::Full(player)) => {
                warn!(channel = %channel.id, player = %player.id, "join queue full, join dropped");
                return Delivery::QueueFull;
            }
            Err(TrySendError::Closed(player)) => player,
        };

        debug!(channel = %channel.id, "session ended before the join, starting a new one");
        match self.spawn_session(&channel).try_join(player) {
            Ok(()) => Delivery::Delivered,
            Err(e) => {
                warn!(channel = %channel.id, error = %e, "join dropped");
                Delivery::QueueFull
            }
        }
    }

    /// Forwards a chat message to the channel's session, if any
    pub fn handle_message(&mut self, channel: &ChannelId, message: AnswerMessage) -> Delivery {
        self.reap_finished();

        let Some(handle) = self.sessions.get(channel) else {
            debug!(%channel, "no session, message dropped");
            return Delivery::NoSession;
        };
        match handle.try_message(message) {
            Ok(()) => Delivery::Delivered,
            Err(TrySendError::Full(message)) => {
                warn!(%channel, player = %message.player.id, "message queue full, message dropped");
                Delivery::QueueFull
            }
            Err(TrySendError::Closed(_)) => {
                debug!(%channel, "session closed, message dropped");
                self.sessions.remove(channel);
                Delivery::NoSession
            }
        }
    }

    /// Forgets a finished session
    ///
    /// Notices from a session that was already replaced are ignored.
    ///
    /// # Returns
    ///
    /// Whether a session was removed
    pub fn on_session_finished(&mut self, channel: &ChannelId, game_id: GameId) -> bool {
        match self.sessions.get(channel) {
            Some(handle) if handle.game_id() == game_id => {
                self.sessions.remove(channel);
                info!(%channel, game = %game_id, "session removed");
                true
            }
            Some(handle) => {
                debug!(%channel, game = %game_id, current = %handle.game_id(), "stale finish notice ignored");
                false
            }
            None => false,
        }
    }

    /// Processes every finish notice received so far
    pub fn reap_finished(&mut self) {
        while let Ok(done) = self.finished.try_recv() {
            self.on_session_finished(&done.channel, done.game_id);
        }
    }

    /// Stops a channel's session without notifications
    ///
    /// # Returns
    ///
    /// Whether a session was found
    pub fn cancel_session(&self, channel: &ChannelId) -> bool {
        let Some(handle) = self.sessions.get(channel) else {
            return false;
        };
        info!(%channel, game = %handle.game_id(), "cancelling session");
        handle.cancel();
        true
    }

    /// Whether the channel has a session
    pub fn has_session(&self, channel: &ChannelId) -> bool {
        self.sessions.contains_key(channel)
    }

    /// Handle of the channel's session
    pub fn session(&self, channel: &ChannelId) -> Option<&SessionHandle> {
        self.sessions.get(channel)
    }

    /// Number of sessions tracked
    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    /// Free slots in the concurrency pool
    pub fn available_tokens(&self) -> usize {
        self.shared.pool.available_permits()
    }

    /// Average time games spent queued before getting a slot
    ///
    /// Zero until a queued game has obtained one.
    pub fn waiting_avg(&self) -> Duration {
        self.shared.waits.average()
    }

    /// Number of tracked sessions per state
    pub fn stats(&self) -> EnumMap<SessionState, usize> {
        let mut stats = EnumMap::default();
        for handle in self.sessions.values() {
            stats[handle.state()] += 1;
        }
        stats
    }

    /// Cancels every session
    ///
    /// The token passed to [`SessionManager::new`] is left untouched.
    pub fn shutdown(&self) {
        info!(sessions = self.sessions.len(), "shutting down sessions");
        self.cancel.cancel();
    }

    /// Routes events until the stream ends or the manager is cancelled
    ///
    /// Every session is cancelled on the way out.
    pub async fn run(mut self, mut events: mpsc::Receiver<InboundEvent>) {
        info!("session manager running");
        loop {
            tokio::select! {
                biased;
                () = self.cancel.cancelled() => break,
                Some(done) = self.finished.recv() => {
                    self.on_session_finished(&done.channel, done.game_id);
                }
                event = events.recv() => match event {
                    Some(event) => {
                        self.handle_event(event);
                    }
                    None => break,
                },
            }
        }
        self.shutdown();
        info!("session manager stopped");
    }

    fn live_session(&mut self, channel: &Channel) -> &SessionHandle {
        if self
            .sessions
            .get(&channel.id)
            .is_some_and(SessionHandle::is_live)
        {
            return &self.sessions[&channel.id];
        }
        self.spawn_session(channel)
    }

    fn spawn_session(&mut self, channel: &Channel) -> &SessionHandle {
        let handle = Game::spawn(
            Arc::clone(&self.shared),
            channel.clone(),
            self.cancel.child_token(),
        );
        info!(channel = %channel.id, game = %handle.game_id(), "session created");
        if let Some(old) = self.sessions.insert(channel.id.clone(), handle) {
            debug!(channel = %channel.id, game = %old.game_id(), "replaced finished session");
        }
        &self.sessions[&channel.id]
    }
}
