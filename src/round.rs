//! Per-round protocol.
//!
//! Phases run strictly in order, each one completing for every participant before the next
//! starts: probe, communication, action elicitation, parsing, noise, scoring, sanctions,
//! rationale. The round is closed in the [`History`] only once all of them succeeded; on error
//! the caller rolls the open round back.

use rand_chacha::ChaCha8Rng;
use tracing::{debug, info, instrument, warn};

use crate::agent::Participant;
use crate::configuration::GameSettings;
use crate::decision::CancelToken;
use crate::error::GameError;
use crate::history::{ComprehensionAnswers, History};
use crate::noise::TremblingHand;
use crate::payoff::{PayoffModel, StrategyKey};
use crate::phase_prompts::{
    probe_prompt, rationale_prompt, sanction_prompt, truncate, ProbeKind, PROBE_ANSWER_LIMIT,
    RATIONALE_LIMIT,
};
use crate::response_parser::{ActionParser, SanctionParser};
use crate::template::{render_transcript, Phase, PromptContext, PromptTemplate, PromptView};

/// What a closed round produced.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RoundOutcome {
    /// Index of the round, from 1.
    pub round: u32,
    /// Joint-outcome tag of the executed actions.
    pub tag: String,
    /// Executed actions, in seating order.
    pub actions: Vec<StrategyKey>,
    /// Noise flags, in seating order.
    pub noise: Vec<bool>,
    /// Payoffs before sanctions, in seating order.
    pub payoffs: Vec<i64>,
    /// `(sanctioner, sanctioned)` edges.
    pub sanctions: Vec<(String, String)>,
}

/// Mutable view over a session while one round is played.
pub(crate) struct GameRound<'a> {
    pub(crate) settings: &'a GameSettings,
    pub(crate) payoff: &'a PayoffModel,
    pub(crate) template: &'a PromptTemplate,
    pub(crate) action_parser: &'a ActionParser,
    pub(crate) sanction_parser: &'a SanctionParser,
    pub(crate) participants: &'a mut [Participant],
    pub(crate) history: &'a mut History,
    pub(crate) rng: &'a mut ChaCha8Rng,
    pub(crate) cancel: &'a CancelToken,
}

impl GameRound<'_> {
    /// Play the next round and close it.
    #[instrument(skip_all)]
    pub(crate) fn run(mut self) -> Result<RoundOutcome, GameError> {
        let names: Vec<String> = self.participants.iter().map(|p| p.name.clone()).collect();
        let round = self.history.open_round(&names)?;
        debug!(round, "round opened");

        if self.settings.probe_rounds.contains(&round) {
            self.probe(round)?;
        }
        if self.settings.communicate {
            self.communicate(round)?;
        }

        // every answer is collected before any record of the round is written
        let mut responses = Vec::with_capacity(names.len());
        for seat in 0..names.len() {
            let prompt = self.render(seat, round, Phase::Choose)?;
            responses.push(self.ask(seat, &prompt)?);
        }

        let payoff = self.payoff;
        let hand = TremblingHand::new(self.settings.noise);
        let mut actions = Vec::with_capacity(names.len());
        let mut noise = Vec::with_capacity(names.len());
        let mut intended_keys = Vec::with_capacity(names.len());
        for (name, response) in names.iter().zip(&responses) {
            let parsed = self.action_parser.parse(response);
            if parsed.is_default() {
                warn!(
                    agent = %name,
                    response = %response,
                    "no strategy found in response, defaulting to first strategy"
                );
            }
            let (executed, flipped) = hand.apply(
                name,
                parsed.key,
                payoff.strategies().len(),
                &mut *self.rng,
            );
            intended_keys.push(parsed.key);
            actions.push(executed);
            noise.push(flipped);
        }

        for (seat, participant) in self.participants.iter_mut().enumerate() {
            participant.add_action(actions[seat]);
        }
        let (tag, payoffs) = payoff.apply_scores(self.participants, &actions)?;
        for (seat, name) in names.iter().enumerate() {
            let record = self.history.record_mut(round, name)?;
            record.intended_strategy = Some(payoff.strategy_text(intended_keys[seat]).to_owned());
            record.strategy = Some(payoff.strategy_text(actions[seat]).to_owned());
            record.is_noise = noise[seat];
            record.score = Some(payoffs[seat]);
        }

        let sanctions = if self.settings.sanctions {
            self.sanction(round, &names, &actions)?
        } else {
            vec![]
        };

        if self.settings.reasoning {
            self.rationale(round, &intended_keys)?;
        }

        self.history.close_round(round)?;
        info!(round, %tag, ?payoffs, "round closed");
        Ok(RoundOutcome {
            round,
            tag,
            actions,
            noise,
            payoffs,
            sanctions,
        })
    }

    fn render(&self, seat: usize, round: u32, phase: Phase) -> Result<String, GameError> {
        let view = PromptView {
            seat,
            participants: &*self.participants,
            payoff: self.payoff,
            history: &*self.history,
            round,
            n_rounds: self.settings.n_rounds,
            rounds_known: self.settings.rounds_known,
            window: self.settings.transcript_window,
            phase,
        };
        self.template.render(&PromptContext::from_view(&view))
    }

    fn ask(&mut self, seat: usize, prompt: &str) -> Result<String, GameError> {
        let participant = &mut self.participants[seat];
        self.settings.retry.call(
            &participant.name,
            participant.service.as_mut(),
            prompt,
            self.cancel,
        )
    }

    fn probe(&mut self, round: u32) -> Result<(), GameError> {
        let transcript =
            render_transcript(self.history, self.payoff, self.settings.transcript_window);
        for seat in 0..self.participants.len() {
            let name = self.participants[seat].name.clone();
            let mut answers = ComprehensionAnswers::default();
            for kind in ProbeKind::ALL {
                let prompt = probe_prompt(kind, self.payoff, &name, round, &transcript);
                let answer = truncate(&self.ask(seat, &prompt)?, PROBE_ANSWER_LIMIT);
                match kind {
                    ProbeKind::PayoffUnderstanding => answers.payoff_understanding = answer,
                    ProbeKind::HistoryRecall => answers.history_recall = answer,
                    ProbeKind::StrategyUnderstanding => answers.strategy_understanding = answer,
                }
            }
            self.history.record_mut(round, &name)?.meta_prompt_validation = Some(answers);
        }
        Ok(())
    }

    fn communicate(&mut self, round: u32) -> Result<(), GameError> {
        for seat in 0..self.participants.len() {
            let prompt = self.render(seat, round, Phase::Communicate)?;
            let message = self.ask(seat, &prompt)?;
            let name = self.participants[seat].name.clone();
            self.history.record_mut(round, &name)?.message = Some(message.trim().to_owned());
        }
        Ok(())
    }

    /// Ask every participant whom to sanction and apply cost and fine once per pair.
    fn sanction(
        &mut self,
        round: u32,
        names: &[String],
        actions: &[StrategyKey],
    ) -> Result<Vec<(String, String)>, GameError> {
        let payoff = self.payoff;
        let outcome: Vec<(&str, &str)> = names
            .iter()
            .zip(actions)
            .map(|(name, key)| (name.as_str(), payoff.strategy_text(*key)))
            .collect();
        let rules = self.settings.sanction_rules;

        let mut edges = vec![];
        for (seat, name) in names.iter().enumerate() {
            let prompt = sanction_prompt(payoff, &rules, name, round, &outcome);
            let response = self.ask(seat, &prompt)?;
            for target in self.sanction_parser.targets(&response, name) {
                let Some(target_seat) = names.iter().position(|n| *n == target) else {
                    continue;
                };
                self.participants[seat].adjust_last_score(-rules.cost);
                self.participants[target_seat].adjust_last_score(-rules.fine);
                info!(round, sanctioner = %name, sanctioned = %target, "sanction applied");
                edges.push((name.clone(), target));
            }
        }

        for (sanctioner, sanctioned) in &edges {
            self.history
                .record_mut(round, sanctioner)?
                .punished
                .push(sanctioned.clone());
            self.history
                .record_mut(round, sanctioned)?
                .was_punished_by
                .push(sanctioner.clone());
        }
        for participant in self.participants.iter() {
            let score = participant.last_score();
            self.history.record_mut(round, &participant.name)?.score = score;
        }
        Ok(edges)
    }

    fn rationale(&mut self, round: u32, intended: &[StrategyKey]) -> Result<(), GameError> {
        let payoff = self.payoff;
        for seat in 0..self.participants.len() {
            let name = self.participants[seat].name.clone();
            let chosen = payoff.strategy_text(intended[seat]);
            let prompt = rationale_prompt(payoff, &name, round, chosen);
            let reasoning = truncate(&self.ask(seat, &prompt)?, RATIONALE_LIMIT);
            self.history.record_mut(round, &name)?.reasoning = Some(reasoning);
        }
        Ok(())
    }
}
