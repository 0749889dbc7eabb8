//! Per-channel game session
//!
//! Every channel with a game in progress owns one session task. The task
//! waits for a slot in the global concurrency pool and for enough players,
//! then plays a fixed number of rounds. All of its inputs (joins, chat
//! messages, timers and cancellation) are multiplexed in a single loop, so
//! the session state is only ever touched by its own task.

use std::{
    pin::Pin,
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};

use garde::Validate;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::{
    sync::{
        OwnedSemaphorePermit, Semaphore,
        mpsc::{self, error::TrySendError},
        watch,
    },
    time::{Instant, MissedTickBehavior, Sleep, interval_at, sleep, sleep_until},
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};
use web_time::SystemTime;

use super::{
    TruncatedVec,
    config::Config,
    constants::game::MAX_LISTED_PLAYERS,
    error::{Error, Result},
    game_id::GameId,
    handler::{GameSnapshot, Handler, RoundSummary},
    player::{Channel, ChannelId, Player, Roster},
    rank::Rank,
    round::Round,
    store::Store,
};

/// Lifecycle of a session
///
/// States only move forward, in declaration order.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, enum_map::Enum,
)]
pub enum SessionState {
    /// Waiting for a slot in the concurrency pool
    Queued,
    /// Holding a slot, waiting for the quorum
    Ready,
    /// Rounds in progress
    Started,
    /// Over, by completion, timeout or cancellation
    Finished,
}

/// A chat message routed to a session
#[derive(Debug, Clone)]
pub struct AnswerMessage {
    /// Author of the message
    pub player: Player,
    /// Raw text, matched against the current question
    pub text: String,
    /// When the transport received it
    pub received_at: SystemTime,
}

/// Notice sent to the manager when a session task ends
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Finished {
    /// Channel the session was hosted in
    pub channel: ChannelId,
    /// Identifier of the finished session
    pub game_id: GameId,
}

/// Collaborators shared by the manager and all of its sessions
pub(crate) struct Shared {
    pub(crate) config: Config,
    pub(crate) handler: Arc<dyn Handler>,
    pub(crate) store: Arc<dyn Store>,
    pub(crate) pool: Arc<Semaphore>,
    pub(crate) waits: QueueWaits,
    pub(crate) finished: mpsc::UnboundedSender<Finished>,
}

/// Running average of how long games stayed queued before getting a slot
///
/// Only games that left the queue are counted.
#[derive(Debug, Default)]
pub(crate) struct QueueWaits {
    inner: Mutex<WaitTotals>,
}

#[derive(Debug, Default)]
struct WaitTotals {
    total: Duration,
    count: u32,
}

impl QueueWaits {
    pub(crate) fn record(&self, waited: Duration) {
        let mut totals = self.inner.lock();
        totals.total = totals.total.saturating_add(waited);
        totals.count = totals.count.saturating_add(1);
    }

    /// Zero until a game has left the queue
    pub(crate) fn average(&self) -> Duration {
        let totals = self.inner.lock();
        totals
            .total
            .checked_div(totals.count)
            .unwrap_or(Duration::ZERO)
    }
}

/// Manager side of a running session
///
/// Holds the sending half of the session queues and read-only views of its
/// state. Dropping the handle does not stop the session.
#[derive(Debug, Clone)]
pub struct SessionHandle {
    game_id: GameId,
    joins: mpsc::Sender<Player>,
    messages: mpsc::Sender<AnswerMessage>,
    state: watch::Receiver<SessionState>,
    player_count: Arc<AtomicUsize>,
    cancel: CancellationToken,
}

impl SessionHandle {
    /// Identifier of the session
    pub fn game_id(&self) -> GameId {
        self.game_id
    }

    /// Latest state published by the session
    pub fn state(&self) -> SessionState {
        *self.state.borrow()
    }

    /// Number of players known to the session
    pub fn player_count(&self) -> usize {
        self.player_count.load(Ordering::Relaxed)
    }

    /// Asks the session to stop without any further notification
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Whether the session can still accept joins
    pub fn is_live(&self) -> bool {
        !self.joins.is_closed() && self.state() != SessionState::Finished
    }

    pub(crate) fn try_join(&self, player: Player) -> std::result::Result<(), TrySendError<Player>> {
        self.joins.try_send(player)
    }

    pub(crate) fn try_message(
        &self,
        message: AnswerMessage,
    ) -> std::result::Result<(), TrySendError<AnswerMessage>> {
        self.messages.try_send(message)
    }
}

enum Outcome {
    Completed,
    QuorumTimeout,
    Aborted,
    Cancelled,
}

enum Quorum {
    Met,
    TimedOut,
    Cancelled,
}

enum RoundEnd {
    Completed,
    TimedOut,
    Cancelled,
}

/// State owned by a session task
pub(crate) struct Game {
    id: GameId,
    channel: Channel,
    shared: Arc<Shared>,
    state: SessionState,
    players: Roster,
    /// Current round, 1-indexed
    round: usize,
    /// Running total of the finished rounds
    rank: Rank,
    joins: mpsc::Receiver<Player>,
    messages: mpsc::Receiver<AnswerMessage>,
    cancel: CancellationToken,
    /// Slot in the concurrency pool, released on drop
    permit: Option<OwnedSemaphorePermit>,
    state_tx: watch::Sender<SessionState>,
    player_count: Arc<AtomicUsize>,
    last_join_notice: Option<Instant>,
}

impl Game {
    /// Creates a session for `channel` and runs it on the current runtime
    ///
    /// # Arguments
    ///
    /// * `shared` - collaborators and configuration
    /// * `channel` - channel hosting the game
    /// * `cancel` - token stopping the session silently
    ///
    /// # Returns
    ///
    /// The handle used to feed the session and observe its state
    pub(crate) fn spawn(
        shared: Arc<Shared>,
        channel: Channel,
        cancel: CancellationToken,
    ) -> SessionHandle {
        let (join_tx, joins) = mpsc::channel(shared.config.join_buffer);
        let (message_tx, messages) = mpsc::channel(shared.config.message_buffer);
        let (state_tx, state_rx) = watch::channel(SessionState::Queued);
        let player_count = Arc::new(AtomicUsize::new(0));

        let game = Self {
            id: GameId::new(),
            channel,
            shared,
            state: SessionState::Queued,
            players: Roster::default(),
            round: 0,
            rank: Rank::default(),
            joins,
            messages,
            cancel: cancel.clone(),
            permit: None,
            state_tx,
            player_count: Arc::clone(&player_count),
            last_join_notice: None,
        };

        let handle = SessionHandle {
            game_id: game.id,
            joins: join_tx,
            messages: message_tx,
            state: state_rx,
            player_count,
            cancel,
        };

        tokio::spawn(game.run());
        handle
    }

    async fn run(mut self) {
        info!(channel = %self.channel.id, game = %self.id, "game created");

        let outcome = self.play().await;

        self.permit = None;
        self.set_state(SessionState::Finished);

        match outcome {
            Outcome::Cancelled => {
                info!(channel = %self.channel.id, game = %self.id, "game cancelled");
            }
            Outcome::QuorumTimeout => {
                info!(
                    channel = %self.channel.id,
                    game = %self.id,
                    players = self.players.len(),
                    "quorum not reached"
                );
                self.shared.handler.game_finished(&self.snapshot(), true);
            }
            Outcome::Completed | Outcome::Aborted => {
                info!(channel = %self.channel.id, game = %self.id, rounds = self.round, "game finished");
                self.shared.handler.game_finished(&self.snapshot(), false);
            }
        }

        let finished = Finished {
            channel: self.channel.id.clone(),
            game_id: self.id,
        };
        if self.shared.finished.send(finished).is_err() {
            debug!(channel = %self.channel.id, game = %self.id, "manager already gone");
        }
    }

    async fn play(&mut self) -> Outcome {
        match self.gather_quorum().await {
            Quorum::Met => self.play_rounds().await,
            Quorum::TimedOut => Outcome::QuorumTimeout,
            Quorum::Cancelled => Outcome::Cancelled,
        }
    }

    /// Waits for a pool slot and for enough distinct players
    ///
    /// The quorum deadline runs from creation and restarts with every new
    /// player. Once the quorum is met the deadline is disarmed, so a queued
    /// game with enough players waits for its slot indefinitely.
    async fn gather_quorum(&mut self) -> Quorum {
        let quorum = self.shared.config.quorum;
        let quorum_wait = self.shared.config.quorum_wait;

        let deadline = sleep(quorum_wait);
        tokio::pin!(deadline);
        let acquire = Arc::clone(&self.shared.pool).acquire_owned();
        tokio::pin!(acquire);
        let queued_at = Instant::now();

        if let Ok(permit) = Arc::clone(&self.shared.pool).try_acquire_owned() {
            self.permit = Some(permit);
            self.set_state(SessionState::Ready);
        } else {
            info!(channel = %self.channel.id, game = %self.id, "no free slot, game queued");
            self.shared.handler.game_queued(&self.snapshot());
        }

        loop {
            let quorum_met = self.players.len() >= quorum;
            if quorum_met && self.permit.is_some() {
                return Quorum::Met;
            }

            tokio::select! {
                biased;
                () = self.cancel.cancelled() => return Quorum::Cancelled,
                permit = &mut acquire, if self.permit.is_none() => match permit {
                    Ok(permit) => {
                        self.permit = Some(permit);
                        self.set_state(SessionState::Ready);
                        let waited = queued_at.elapsed();
                        self.shared.waits.record(waited);
                        info!(
                            channel = %self.channel.id,
                            game = %self.id,
                            waited_ms = waited.as_millis() as u64,
                            "game left the queue"
                        );
                        self.shared.handler.ready_after_queue(&self.snapshot());
                    }
                    Err(e) => {
                        error!(channel = %self.channel.id, game = %self.id, error = %e, "concurrency pool closed");
                        return Quorum::Cancelled;
                    }
                },
                () = &mut deadline, if !quorum_met => return Quorum::TimedOut,
                Some(player) = self.joins.recv() => self.on_join(player, deadline.as_mut()),
                Some(message) = self.messages.recv() => {
                    debug!(channel = %self.channel.id, player = %message.player.id, "message before start ignored");
                }
            }
        }
    }

    fn on_join(&mut self, player: Player, deadline: Pin<&mut Sleep>) {
        let player_id = player.id.clone();
        if !self.players.add(player) {
            debug!(channel = %self.channel.id, player = %player_id, "player already joined");
            return;
        }
        self.player_count.store(self.players.len(), Ordering::Relaxed);
        info!(
            channel = %self.channel.id,
            game = %self.id,
            player = %player_id,
            players = self.players.len(),
            "player joined"
        );

        let config = &self.shared.config;
        if self.players.len() >= config.quorum {
            return;
        }

        let now = Instant::now();
        deadline.reset(now + config.quorum_wait);

        if self
            .last_join_notice
            .is_some_and(|at| now.duration_since(at) < config.join_notify_interval)
        {
            return;
        }
        self.last_join_notice = Some(now);
        self.shared
            .handler
            .user_joined(&self.snapshot(), self.shared.config.quorum_wait);
    }

    async fn play_rounds(&mut self) -> Outcome {
        self.set_state(SessionState::Started);
        info!(
            channel = %self.channel.id,
            game = %self.id,
            players = self.players.len(),
            "game started"
        );
        self.shared.handler.game_started(&self.snapshot());

        for _ in 0..self.shared.config.rounds_per_game {
            self.round += 1;

            let mut round = match self.new_round() {
                Ok(round) => round,
                Err(e) => {
                    error!(channel = %self.channel.id, game = %self.id, round = self.round, error = %e, "failed to create round");
                    return Outcome::Aborted;
                }
            };
            round.start();
            info!(
                channel = %self.channel.id,
                game = %self.id,
                round = %round.id(),
                question = round.question().id,
                "round started"
            );
            self.shared
                .handler
                .round_started(&self.snapshot(), &round.reveal(false));

            match self.play_round(&mut round).await {
                RoundEnd::Completed => self.finish_round(&mut round, false),
                RoundEnd::TimedOut => self.finish_round(&mut round, true),
                RoundEnd::Cancelled => return Outcome::Cancelled,
            }
        }

        Outcome::Completed
    }

    fn new_round(&self) -> Result<Round> {
        let question = self.shared.handler.new_round(&self.snapshot())?;
        question
            .validate()
            .map_err(|report| Error::InvalidQuestion {
                id: question.id,
                report,
            })?;
        Ok(Round::new(self.id, question, self.shared.config.round_duration))
    }

    async fn play_round(&mut self, round: &mut Round) -> RoundEnd {
        let Some(end_at) = round.end_at() else {
            return RoundEnd::TimedOut;
        };
        let start = Instant::now();

        let deadline = sleep_until(end_at);
        tokio::pin!(deadline);

        let warning_at = self.shared.config.time_left_offset().map(|offset| start + offset);
        let warning = sleep_until(warning_at.unwrap_or(end_at));
        tokio::pin!(warning);
        let mut warned = warning_at.is_none();

        let every = self.shared.config.reveal_interval;
        let mut reveal = interval_at(start + every, every);
        reveal.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                () = self.cancel.cancelled() => return RoundEnd::Cancelled,
                () = &mut deadline => return RoundEnd::TimedOut,
                Some(message) = self.messages.recv() => {
                    if self.on_answer(round, message) {
                        return RoundEnd::Completed;
                    }
                }
                () = &mut warning, if !warned => {
                    warned = true;
                    self.shared.handler.round_time_left(&self.snapshot(), round.time_left());
                }
                _ = reveal.tick() => self.reveal_claims(round),
                Some(player) = self.joins.recv() => {
                    debug!(channel = %self.channel.id, player = %player.id, "join ignored, game already started");
                }
            }
        }
    }

    /// Applies one chat message to the round
    ///
    /// # Returns
    ///
    /// `true` once every slot has been claimed
    fn on_answer(&mut self, round: &mut Round, message: AnswerMessage) -> bool {
        let outcome = round.submit_answer(&message.player, &message.text);

        if !outcome.correct {
            if self.shared.config.nudge_after_wrong_answer {
                self.shared
                    .handler
                    .wrong_answer(&self.snapshot(), &message.player, round.time_left());
            }
            return false;
        }
        if outcome.already_claimed {
            debug!(channel = %self.channel.id, player = %message.player.id, slot = ?outcome.slot, "answer already claimed");
            return false;
        }

        let player_id = message.player.id.clone();
        if self.players.add(message.player) {
            self.player_count.store(self.players.len(), Ordering::Relaxed);
        }
        info!(
            channel = %self.channel.id,
            game = %self.id,
            player = %player_id,
            slot = ?outcome.slot,
            delay_ms = message.received_at.elapsed().map_or(0, |d| d.as_millis() as u64),
            "answer claimed"
        );
        round.is_complete()
    }

    fn reveal_claims(&self, round: &mut Round) {
        if !round.has_highlights() {
            return;
        }
        self.shared
            .handler
            .answers_revealed(&self.snapshot(), &round.reveal(false));
        round.clear_highlights();
    }

    fn finish_round(&mut self, round: &mut Round, timeout: bool) {
        if !round.finish() {
            return;
        }
        let ranking = round.ranking();
        self.rank.merge(&ranking);

        if let Err(e) = self.shared.store.save_rank(&self.channel, &ranking) {
            error!(channel = %self.channel.id, game = %self.id, error = %e, "saving round scores failed");
        }
        info!(
            channel = %self.channel.id,
            game = %self.id,
            round = %round.id(),
            timeout,
            claimed = round.claimed_count(),
            "round finished"
        );

        let summary = RoundSummary {
            reveal: round.reveal(timeout),
            ranking,
            timeout,
        };
        self.shared.handler.round_finished(&self.snapshot(), &summary);
    }

    fn set_state(&mut self, state: SessionState) {
        if state <= self.state {
            return;
        }
        debug!(channel = %self.channel.id, game = %self.id, from = ?self.state, to = ?state, "state changed");
        self.state = state;
        self.state_tx.send_replace(state);
    }

    fn snapshot(&self) -> GameSnapshot {
        GameSnapshot {
            id: self.id,
            channel: self.channel.clone(),
            state: self.state,
            players: TruncatedVec::new(
                self.players.iter().map(|p| p.name.clone()),
                MAX_LISTED_PLAYERS,
                self.players.len(),
            ),
            quorum: self.shared.config.quorum,
            round: self.round,
            rounds_per_game: self.shared.config.rounds_per_game,
            rank: self.rank.clone(),
            waiting_avg: self.shared.waits.average(),
        }
    }
}

#[cfg(test)]
mod tests {
    use tokio::time::sleep;

    use super::*;
    use crate::{
        store::MemoryStore,
        testing::{Event, RecordingHandler, player, test_config},
    };

    struct Harness {
        handle: SessionHandle,
        handler: Arc<RecordingHandler>,
        store: Arc<MemoryStore>,
        shared: Arc<Shared>,
        pool: Arc<Semaphore>,
        finished: mpsc::UnboundedReceiver<Finished>,
        channel: Channel,
    }

    impl Harness {
        fn new(config: Config) -> Self {
            let pool = Arc::new(Semaphore::new(config.max_active_games));
            Self::with(config, pool, RecordingHandler::default())
        }

        fn with(config: Config, pool: Arc<Semaphore>, handler: RecordingHandler) -> Self {
            let handler = Arc::new(handler);
            let store = Arc::new(MemoryStore::default());
            let (finished_tx, finished) = mpsc::unbounded_channel();
            let shared = Arc::new(Shared {
                config,
                handler: handler.clone(),
                store: store.clone(),
                pool: pool.clone(),
                waits: QueueWaits::default(),
                finished: finished_tx,
            });
            let channel = Channel::new("chan", "Trivia");
            let handle = Game::spawn(shared.clone(), channel.clone(), CancellationToken::new());
            Self {
                handle,
                handler,
                store,
                shared,
                pool,
                finished,
                channel,
            }
        }

        fn join(&self, id: &str) {
            self.handle.try_join(player(id)).unwrap();
        }

        fn say(&self, id: &str, text: &str) {
            self.handle
                .try_message(AnswerMessage {
                    player: player(id),
                    text: text.to_owned(),
                    received_at: SystemTime::now(),
                })
                .unwrap();
        }

        fn finished_count(&self) -> usize {
            self.handler
                .count(|e| matches!(e, Event::GameFinished { .. }))
        }
    }

    fn config(quorum: usize, rounds_per_game: usize) -> Config {
        Config {
            quorum,
            rounds_per_game,
            ..test_config()
        }
    }

    async fn settle() {
        sleep(Duration::from_millis(1)).await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_quorum_starts_game() {
        let h = Harness::new(config(3, 3));
        h.join("a");
        h.join("b");
        settle().await;

        assert_eq!(h.handle.state(), SessionState::Ready);
        assert_eq!(h.handle.player_count(), 2);
        assert_eq!(h.pool.available_permits(), 3);

        h.join("c");
        settle().await;

        assert_eq!(h.handle.state(), SessionState::Started);
        assert_eq!(
            h.handler.events(),
            [
                Event::UserJoined {
                    players: 1,
                    time_left: Duration::from_secs(120),
                },
                Event::GameStarted { players: 3 },
                Event::RoundStarted { round: 1 },
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_new_player_restarts_quorum_timer() {
        let mut h = Harness::new(config(3, 3));
        h.join("a");
        settle().await;

        sleep(Duration::from_secs(100)).await;
        h.join("b");
        settle().await;

        sleep(Duration::from_secs(100)).await;
        assert_eq!(h.finished_count(), 0);
        assert_eq!(h.handle.state(), SessionState::Ready);

        sleep(Duration::from_secs(21)).await;
        assert_eq!(
            h.handler.events().last(),
            Some(&Event::GameFinished { timeout: true })
        );
        assert_eq!(h.handle.state(), SessionState::Finished);
        assert_eq!(h.pool.available_permits(), 4);

        let done = h.finished.recv().await.unwrap();
        assert_eq!(done.game_id, h.handle.game_id());
        assert_eq!(done.channel, h.channel.id);
    }

    #[tokio::test(start_paused = true)]
    async fn test_known_player_does_not_restart_timer() {
        let h = Harness::new(config(3, 3));
        h.join("a");
        settle().await;

        sleep(Duration::from_secs(119)).await;
        h.join("a");
        settle().await;
        sleep(Duration::from_secs(2)).await;

        assert_eq!(h.handle.player_count(), 1);
        assert_eq!(
            h.handler.events().last(),
            Some(&Event::GameFinished { timeout: true })
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_join_notices_are_debounced() {
        let h = Harness::new(config(5, 3));
        h.join("a");
        settle().await;
        sleep(Duration::from_secs(1)).await;
        h.join("b");
        settle().await;
        sleep(Duration::from_secs(1)).await;
        h.join("a");
        settle().await;
        sleep(Duration::from_secs(4)).await;
        h.join("c");
        settle().await;

        let joined: Vec<_> = h
            .handler
            .events()
            .into_iter()
            .filter_map(|e| match e {
                Event::UserJoined { players, .. } => Some(players),
                _ => None,
            })
            .collect();
        assert_eq!(joined, [1, 3]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_completed_round_is_scored_in_claim_order() {
        let h = Harness::new(config(3, 1));
        for id in ["a", "b", "c"] {
            h.join(id);
        }
        settle().await;

        h.say("a", "Oven");
        h.say("b", "fridge");
        h.say("c", "knife");
        h.say("a", "fridge");
        h.say("b", "sink");
        h.say("c", "spoon!");
        settle().await;

        let events = h.handler.events();
        assert_eq!(
            &events[events.len() - 2..],
            [
                Event::RoundFinished {
                    round: 1,
                    timeout: false,
                    hidden: 0,
                    ranking: vec![("b".into(), 25), ("c".into(), 25), ("a".into(), 20)],
                },
                Event::GameFinished { timeout: false },
            ]
        );

        let saved = h.store.channel_ranking(&h.channel.id, 0).unwrap();
        assert_eq!(saved.len(), 3);
        assert_eq!(h.store.channel_name(&h.channel.id).as_deref(), Some("Trivia"));
        assert_eq!(h.pool.available_permits(), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_round_timeout_warning_and_reveals() {
        let h = Harness::new(Config {
            nudge_after_wrong_answer: true,
            ..config(1, 1)
        });
        h.join("a");
        settle().await;
        assert_eq!(h.handle.state(), SessionState::Started);

        h.say("a", "stove");
        h.say("a", "table");
        settle().await;
        sleep(Duration::from_secs(6)).await;
        sleep(Duration::from_secs(10)).await;
        assert_eq!(
            h.handler.count(|e| matches!(e, Event::AnswersRevealed { .. })),
            1
        );

        sleep(Duration::from_secs(80)).await;

        assert_eq!(
            h.handler.events(),
            [
                Event::GameStarted { players: 1 },
                Event::RoundStarted { round: 1 },
                Event::WrongAnswer {
                    player: "a".into()
                },
                Event::AnswersRevealed { highlighted: 1 },
                Event::RoundTimeLeft {
                    time_left: Duration::from_secs(30)
                },
                Event::RoundFinished {
                    round: 1,
                    timeout: true,
                    hidden: 0,
                    ranking: vec![("a".into(), 20)],
                },
                Event::GameFinished { timeout: false },
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_plays_every_round() {
        let h = Harness::new(config(1, 2));
        h.join("a");
        settle().await;
        sleep(Duration::from_secs(200)).await;

        let rounds: Vec<_> = h
            .handler
            .events()
            .into_iter()
            .filter_map(|e| match e {
                Event::RoundFinished { round, timeout, .. } => Some((round, timeout)),
                _ => None,
            })
            .collect();
        assert_eq!(rounds, [(1, true), (2, true)]);
        assert_eq!(h.finished_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_late_join_is_ignored() {
        let h = Harness::new(config(1, 1));
        h.join("a");
        settle().await;
        h.join("b");
        settle().await;

        assert_eq!(h.handle.state(), SessionState::Started);
        assert_eq!(h.handle.player_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_messages_before_start_are_dropped() {
        let h = Harness::new(config(2, 1));
        h.say("a", "oven");
        h.join("a");
        settle().await;
        h.join("b");
        settle().await;
        sleep(Duration::from_secs(91)).await;

        assert!(h.handler.events().contains(&Event::RoundFinished {
            round: 1,
            timeout: true,
            hidden: 0,
            ranking: vec![],
        }));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_is_silent_and_releases_slot() {
        let mut h = Harness::new(config(1, 3));
        h.join("a");
        settle().await;
        assert_eq!(h.pool.available_permits(), 3);

        h.handle.cancel();
        settle().await;

        assert_eq!(h.handle.state(), SessionState::Finished);
        assert_eq!(h.finished_count(), 0);
        assert_eq!(h.pool.available_permits(), 4);
        assert_eq!(h.finished.recv().await.unwrap().game_id, h.handle.game_id());
        assert!(!h.handle.is_live());
    }

    #[tokio::test(start_paused = true)]
    async fn test_queued_game_waits_for_slot() {
        let pool = Arc::new(Semaphore::new(1));
        let held = Arc::clone(&pool).try_acquire_owned().unwrap();
        let h = Harness::with(config(3, 1), pool, RecordingHandler::default());
        for id in ["a", "b", "c"] {
            h.join(id);
        }
        settle().await;
        sleep(Duration::from_secs(200)).await;

        assert_eq!(h.handle.state(), SessionState::Queued);
        assert_eq!(h.finished_count(), 0);

        drop(held);
        settle().await;

        assert_eq!(h.handle.state(), SessionState::Started);
        assert_eq!(h.pool.available_permits(), 0);
        let waited = h.shared.waits.average();
        assert!(waited >= Duration::from_secs(200) && waited < Duration::from_secs(201));
        assert_eq!(
            &h.handler.events()[..3],
            [
                Event::Queued,
                Event::UserJoined {
                    players: 1,
                    time_left: Duration::from_secs(120),
                },
                Event::ReadyAfterQueue,
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_queued_game_times_out_without_slot() {
        let pool = Arc::new(Semaphore::new(1));
        let held = Arc::clone(&pool).try_acquire_owned().unwrap();
        let h = Harness::with(config(3, 1), pool, RecordingHandler::default());
        h.join("a");
        settle().await;
        sleep(Duration::from_secs(121)).await;

        assert_eq!(h.handle.state(), SessionState::Finished);
        assert_eq!(
            h.handler.events().last(),
            Some(&Event::GameFinished { timeout: true })
        );

        drop(held);
        assert_eq!(h.pool.available_permits(), 1);
        assert_eq!(h.shared.waits.average(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_while_queued_releases_nothing() {
        let pool = Arc::new(Semaphore::new(1));
        let held = Arc::clone(&pool).try_acquire_owned().unwrap();
        let mut h = Harness::with(config(3, 1), pool, RecordingHandler::default());
        h.join("a");
        settle().await;
        assert_eq!(h.handle.state(), SessionState::Queued);

        h.handle.cancel();
        settle().await;

        assert_eq!(h.handle.state(), SessionState::Finished);
        assert_eq!(h.finished_count(), 0);
        assert_eq!(h.finished.recv().await.unwrap().game_id, h.handle.game_id());
        assert_eq!(h.pool.available_permits(), 0);
        assert_eq!(h.shared.waits.average(), Duration::ZERO);

        drop(held);
        assert_eq!(h.pool.available_permits(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_slot_is_returned_before_finished_is_published() {
        let h = Harness::new(config(1, 3));
        let mut state = h.handle.state.clone();
        h.join("a");
        state
            .wait_for(|s| *s == SessionState::Started)
            .await
            .unwrap();

        let pool = Arc::clone(&h.pool);
        let observer = tokio::spawn(async move {
            state
                .wait_for(|s| *s == SessionState::Finished)
                .await
                .unwrap();
            pool.available_permits()
        });
        h.handle.cancel();

        assert_eq!(observer.await.unwrap(), 4);
    }

    #[test]
    fn test_queue_waits_average() {
        let waits = QueueWaits::default();
        assert_eq!(waits.average(), Duration::ZERO);

        waits.record(Duration::from_secs(10));
        waits.record(Duration::from_secs(20));
        assert_eq!(waits.average(), Duration::from_secs(15));
    }

    #[tokio::test(start_paused = true)]
    async fn test_round_creation_failure_finishes_game() {
        let pool = Arc::new(Semaphore::new(2));
        let h = Harness::with(config(1, 3), pool, RecordingHandler::failing());
        h.join("a");
        settle().await;

        assert_eq!(
            h.handler.events(),
            [
                Event::GameStarted { players: 1 },
                Event::GameFinished { timeout: false },
            ]
        );
        assert_eq!(h.handle.state(), SessionState::Finished);
        assert_eq!(h.pool.available_permits(), 2);
    }

    #[test]
    fn test_states_only_move_forward() {
        assert!(SessionState::Queued < SessionState::Ready);
        assert!(SessionState::Ready < SessionState::Started);
        assert!(SessionState::Started < SessionState::Finished);
    }
}
