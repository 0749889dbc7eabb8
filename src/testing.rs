//! Fixtures shared by the unit tests

use std::{
    sync::atomic::{AtomicBool, Ordering},
    time::Duration,
};

use parking_lot::Mutex;

use crate::{
    config::Config,
    error::{Error, Result},
    handler::{GameSnapshot, Handler, RoundSummary},
    player::{ChannelId, Player, PlayerId},
    question::{AnswerSlot, Question},
    round::{RevealedAnswer, RoundReveal},
};

/// Five answer question worth 70 points in total
pub(crate) fn kitchen_question() -> Question {
    Question::new(
        7,
        "Something you find in a kitchen",
        vec![
            AnswerSlot::new(["stove", "oven"], 20),
            AnswerSlot::new(["fridge", "refrigerator"], 15),
            AnswerSlot::new(["knife"], 15),
            AnswerSlot::new(["sink"], 10),
            AnswerSlot::new(["spoon"], 10),
        ],
    )
}

/// Single answer questions with ids `0..count`
pub(crate) fn numbered_questions(count: usize) -> Vec<Question> {
    (0..count)
        .map(|i| {
            Question::new(
                i as u64,
                format!("Question {i}"),
                vec![AnswerSlot::new([format!("answer {i}")], 10)],
            )
        })
        .collect()
}

/// Player whose display name is the upper-cased id
pub(crate) fn player(id: &str) -> Player {
    Player::new(id, id.to_uppercase(), id)
}

/// Defaults with small queues and pool
pub(crate) fn test_config() -> Config {
    Config {
        max_active_games: 4,
        join_buffer: 16,
        message_buffer: 16,
        ..Config::default()
    }
}

/// Handler notification, reduced to what the tests assert on
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Event {
    Queued,
    ReadyAfterQueue,
    UserJoined {
        players: usize,
        time_left: Duration,
    },
    GameStarted {
        players: usize,
    },
    RoundStarted {
        round: usize,
    },
    RoundTimeLeft {
        time_left: Duration,
    },
    WrongAnswer {
        player: PlayerId,
    },
    AnswersRevealed {
        highlighted: usize,
    },
    RoundFinished {
        round: usize,
        timeout: bool,
        hidden: usize,
        ranking: Vec<(String, u64)>,
    },
    GameFinished {
        timeout: bool,
    },
}

/// Handler that records every notification per channel
#[derive(Default)]
pub(crate) struct RecordingHandler {
    events: Mutex<Vec<(ChannelId, Event)>>,
    queued_waits: Mutex<Vec<Duration>>,
    fail_rounds: AtomicBool,
}

impl RecordingHandler {
    /// Handler whose question supply always fails
    pub(crate) fn failing() -> Self {
        let handler = Self::default();
        handler.fail_rounds.store(true, Ordering::Relaxed);
        handler
    }

    pub(crate) fn events(&self) -> Vec<Event> {
        self.events.lock().iter().map(|(_, e)| e.clone()).collect()
    }

    pub(crate) fn events_for(&self, channel: &str) -> Vec<Event> {
        self.events
            .lock()
            .iter()
            .filter(|(id, _)| id.as_str() == channel)
            .map(|(_, e)| e.clone())
            .collect()
    }

    /// Average queue wait carried by each `game_queued` snapshot
    pub(crate) fn queued_waits(&self) -> Vec<Duration> {
        self.queued_waits.lock().clone()
    }

    pub(crate) fn count(&self, matches: impl Fn(&Event) -> bool) -> usize {
        self.events.lock().iter().filter(|(_, e)| matches(e)).count()
    }

    fn record(&self, game: &GameSnapshot, event: Event) {
        self.events.lock().push((game.channel.id.clone(), event));
    }
}

fn count_answers(round: &RoundReveal, matches: impl Fn(&RevealedAnswer) -> bool) -> usize {
    round.answers.iter().filter(|a| matches(a)).count()
}

impl Handler for RecordingHandler {
    fn new_round(&self, game: &GameSnapshot) -> Result<Question> {
        if self.fail_rounds.load(Ordering::Relaxed) {
            return Err(Error::QuestionNotFound {
                seed: game.id.as_u64(),
                rounds_played: game.round,
            });
        }
        Ok(kitchen_question())
    }

    fn game_queued(&self, game: &GameSnapshot) {
        self.queued_waits.lock().push(game.waiting_avg);
        self.record(game, Event::Queued);
    }

    fn ready_after_queue(&self, game: &GameSnapshot) {
        self.record(game, Event::ReadyAfterQueue);
    }

    fn user_joined(&self, game: &GameSnapshot, time_left: Duration) {
        self.record(
            game,
            Event::UserJoined {
                players: game.players.exact_count(),
                time_left,
            },
        );
    }

    fn game_started(&self, game: &GameSnapshot) {
        self.record(
            game,
            Event::GameStarted {
                players: game.players.exact_count(),
            },
        );
    }

    fn round_started(&self, game: &GameSnapshot, _round: &RoundReveal) {
        self.record(game, Event::RoundStarted { round: game.round });
    }

    fn round_time_left(&self, game: &GameSnapshot, time_left: Duration) {
        self.record(game, Event::RoundTimeLeft { time_left });
    }

    fn wrong_answer(&self, game: &GameSnapshot, player: &Player, _time_left: Duration) {
        self.record(
            game,
            Event::WrongAnswer {
                player: player.id.clone(),
            },
        );
    }

    fn answers_revealed(&self, game: &GameSnapshot, round: &RoundReveal) {
        let highlighted = count_answers(round, |a| {
            matches!(
                a,
                RevealedAnswer::Claimed {
                    highlighted: true,
                    ..
                }
            )
        });
        self.record(game, Event::AnswersRevealed { highlighted });
    }

    fn round_finished(&self, game: &GameSnapshot, summary: &RoundSummary) {
        let hidden = count_answers(&summary.reveal, |a| matches!(a, RevealedAnswer::Hidden));
        let ranking = summary
            .ranking
            .iter()
            .map(|s| (s.player_id.to_string(), s.score))
            .collect();
        self.record(
            game,
            Event::RoundFinished {
                round: game.round,
                timeout: summary.timeout,
                hidden,
                ranking,
            },
        );
    }

    fn game_finished(&self, game: &GameSnapshot, timeout: bool) {
        self.record(game, Event::GameFinished { timeout });
    }
}
