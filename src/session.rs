//! Session: settings, participants, payoff model and the round loop.
//!
//! A [`FairGame`] plays rounds until the configured count is exhausted, the last round's
//! joint-outcome tag is one of the stop tags, or cancellation is requested through its
//! [`CancelToken`]. A round that fails, or is interrupted, is rolled back: the [`History`]
//! only ever holds closed rounds and stays readable after [`FairGame::run`] returns, error or
//! not.
//!
//! # Example
//!
//! ```
//! use fair_game::prelude::*;
//!
//! # fn main() -> anyhow::Result<()> {
//! let kind = GameKind::PrisonersDilemma;
//! let participants = ["Alice", "Bob", "Charlie"]
//!     .into_iter()
//!     .map(|name| Participant::new(name, "scripted", Box::new(ScriptedService::new(["Cooperate"]))))
//!     .collect();
//! let settings = GameSettings::new().with_rounds(3);
//! let template = PromptTemplate::new(kind.template("en").unwrap_or_default());
//! let mut game = FairGame::new(kind.description(), settings, kind.payoff_table(), template, participants)?;
//!
//! assert_eq!(game.run()?, StopReason::RoundLimit);
//! assert_eq!(game.scores(), vec![21, 21, 21]);
//! # Ok(())
//! # }
//! ```

use std::collections::BTreeSet;

use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use tracing::{error, info, instrument, trace, warn};

use crate::agent::Participant;
use crate::configuration::GameSettings;
use crate::decision::CancelToken;
use crate::error::GameError;
use crate::history::History;
use crate::logger::init_logger;
use crate::payoff::{PayoffModel, PayoffTable};
use crate::response_parser::{ActionParser, SanctionParser};
use crate::round::{GameRound, RoundOutcome};
use crate::template::PromptTemplate;

/// Why [`FairGame::run`] stopped.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StopReason {
    /// Every configured round was played.
    RoundLimit,
    /// The last round produced this stop tag.
    StopTag(String),
    /// Cancellation was requested; completed rounds are kept.
    Cancelled,
}

/// Notified after every closed round.
pub trait RoundObserver: Send {
    /// `history` already contains `round`. Errors are logged and do not stop the session.
    fn on_round_closed(&mut self, game: &str, round: u32, history: &History) -> anyhow::Result<()>;
}

/// One repeated game.
pub struct FairGame {
    name: String,
    settings: GameSettings,
    payoff: PayoffModel,
    template: PromptTemplate,
    action_parser: ActionParser,
    sanction_parser: SanctionParser,
    participants: Vec<Participant>,
    history: History,
    rng: ChaCha8Rng,
    cancel: CancelToken,
    observers: Vec<Box<dyn RoundObserver>>,
    last_tag: Option<String>,
}

impl std::fmt::Debug for FairGame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FairGame")
            .field("name", &self.name)
            .field("settings", &self.settings)
            .field("participants", &self.participants)
            .field("rounds", &self.history.len())
            .finish()
    }
}

impl FairGame {
    /// Validate everything a session relies on and seat the participants.
    ///
    /// # Errors
    /// [`GameError::InvalidSettings`] or [`GameError::InvalidPayoffModel`] when the
    /// settings, the payoff table, the participant set or the stop tags are inconsistent.
    #[instrument(skip_all)]
    pub fn new(
        name: impl Into<String>,
        settings: GameSettings,
        table: PayoffTable,
        template: PromptTemplate,
        participants: Vec<Participant>,
    ) -> Result<FairGame, GameError> {
        if settings.log {
            if let Err(e) = init_logger() {
                eprintln!("file logging disabled: {e:#}");
            }
        }
        trace!(?settings);

        settings.validate()?;
        let payoff = PayoffModel::new(table, &settings.language)?;
        if participants.len() != payoff.player_count() {
            return Err(GameError::InvalidSettings(format!(
                "{} participants for a {}-player payoff model",
                participants.len(),
                payoff.player_count()
            )));
        }
        let mut names = BTreeSet::new();
        if let Some(dup) = participants.iter().find(|p| !names.insert(p.name())) {
            return Err(GameError::InvalidSettings(format!(
                "participant name '{}' is used twice",
                dup.name()
            )));
        }
        if let Some(tag) = settings
            .stop_tags
            .iter()
            .find(|t| !payoff.combinations().contains_key(t.as_str()))
        {
            return Err(GameError::InvalidSettings(format!(
                "stop tag '{tag}' is not a joint outcome of the payoff model"
            )));
        }

        let action_parser = ActionParser::new(payoff.strategies())
            .map_err(|e| GameError::InvalidPayoffModel(format!("strategy pattern: {e}")))?;
        let seating: Vec<String> = participants.iter().map(|p| p.name().to_owned()).collect();
        let sanction_parser = SanctionParser::new(&seating)
            .map_err(|e| GameError::InvalidSettings(format!("participant name pattern: {e}")))?;

        let rng = match settings.seed {
            Some(seed) => ChaCha8Rng::seed_from_u64(seed),
            None => ChaCha8Rng::from_entropy(),
        };
        Ok(FairGame {
            name: name.into(),
            settings,
            payoff,
            template,
            action_parser,
            sanction_parser,
            participants,
            history: History::new(),
            rng,
            cancel: CancelToken::new(),
            observers: vec![],
            last_tag: None,
        })
    }

    /// Register a round observer.
    pub fn with_observer(mut self, observer: impl RoundObserver + 'static) -> Self {
        self.observers.push(Box::new(observer));
        self
    }

    /// Share an existing cancellation token, e.g. one token for a whole batch.
    pub fn with_cancel_token(mut self, token: CancelToken) -> Self {
        self.cancel = token;
        self
    }

    /// Token cancelling this session, usable from another thread.
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    /// Play rounds until a stop condition holds.
    ///
    /// Cancellation is not an error: it returns [`StopReason::Cancelled`]. On error the failed
    /// round is discarded and every earlier round stays in [`FairGame::history`].
    #[instrument(skip_all, fields(game = %self.name))]
    pub fn run(&mut self) -> Result<StopReason, GameError> {
        if self.settings.verbose {
            println!("\x1b[2K\x1b[32m{}\x1b[39m", self.name);
        }
        loop {
            if let Some(tag) = self.last_tag.as_ref().filter(|t| self.settings.stop_tags.contains(*t)) {
                info!(%tag, rounds = self.history.len(), "stop tag reached");
                return Ok(StopReason::StopTag(tag.clone()));
            }
            if self.history.len() >= self.settings.n_rounds as usize {
                info!(rounds = self.history.len(), "round limit reached");
                return Ok(StopReason::RoundLimit);
            }
            if self.cancel.is_cancelled() {
                info!(rounds = self.history.len(), "session cancelled");
                return Ok(StopReason::Cancelled);
            }

            let result = GameRound {
                settings: &self.settings,
                payoff: &self.payoff,
                template: &self.template,
                action_parser: &self.action_parser,
                sanction_parser: &self.sanction_parser,
                participants: &mut self.participants,
                history: &mut self.history,
                rng: &mut self.rng,
                cancel: &self.cancel,
            }
            .run();

            match result {
                Ok(outcome) => {
                    if self.settings.verbose {
                        self.print_round(&outcome);
                    }
                    self.notify(outcome.round);
                    self.last_tag = Some(outcome.tag);
                }
                Err(GameError::Cancelled) => {
                    self.rollback();
                    info!(rounds = self.history.len(), "session cancelled mid-round");
                    return Ok(StopReason::Cancelled);
                }
                Err(e) => {
                    self.rollback();
                    error!(error = %e, rounds = self.history.len(), "session aborted");
                    return Err(e);
                }
            }
        }
    }

    fn rollback(&mut self) {
        if let Some(round) = self.history.discard_open_round() {
            warn!(round, "discarding unfinished round");
        }
        let completed = self.history.len();
        for participant in &mut self.participants {
            participant.truncate(completed);
        }
    }

    fn notify(&mut self, round: u32) {
        for observer in &mut self.observers {
            if let Err(e) = observer.on_round_closed(&self.name, round, &self.history) {
                error!(round, error = %format!("{e:#}"), "round observer failed");
            }
        }
    }

    fn print_round(&self, outcome: &RoundOutcome) {
        let actions = self
            .participants
            .iter()
            .zip(&outcome.actions)
            .zip(&outcome.noise)
            .map(|((p, key), noisy)| {
                let noise = if *noisy { "*" } else { "" };
                format!("{}={}{noise}", p.name(), key.code())
            })
            .collect::<Vec<_>>()
            .join(" ");
        let totals = self
            .scores()
            .iter()
            .map(i64::to_string)
            .collect::<Vec<_>>()
            .join("-");
        // clear line, green round, actions, yellow totals, red sanctions
        println!(
            "\x1b[2K\x1b[32mRound {}: \x1b[39m{actions} [{}] \x1b[33m{totals}\x1b[39m \x1b[31m{}\x1b[39m",
            outcome.round,
            outcome.tag,
            outcome
                .sanctions
                .iter()
                .map(|(a, b)| format!("{a}->{b}"))
                .collect::<Vec<_>>()
                .join(" ")
        );
    }

    /// Name of the session, stored as the history description.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Settings of the session.
    pub fn settings(&self) -> &GameSettings {
        &self.settings
    }

    /// Payoff model bound to the session language.
    pub fn payoff(&self) -> &PayoffModel {
        &self.payoff
    }

    /// Closed rounds so far.
    pub fn history(&self) -> &History {
        &self.history
    }

    /// Consume the session, keeping its ledger.
    pub fn into_history(self) -> History {
        self.history
    }

    /// Participants, in seating order.
    pub fn participants(&self) -> &[Participant] {
        &self.participants
    }

    /// Total score of every participant, in seating order.
    pub fn scores(&self) -> Vec<i64> {
        self.participants.iter().map(Participant::total_score).collect()
    }

    /// Index of the next round to play.
    pub fn current_round(&self) -> u32 {
        self.history.len() as u32 + 1
    }
}
