//! Seated participants and their per-round actions and scores.

use std::fmt;
use std::hash::Hash;

use crate::decision::DecisionService;
use crate::payoff::StrategyKey;

/// One seat at the table: identity, disclosed personality and per-round sequences.
///
/// `actions[i]` and `scores[i]` belong to round `i + 1`.
pub struct Participant {
    pub(crate) name: String,
    pub(crate) service: Box<dyn DecisionService>,
    pub(crate) service_id: String,
    pub(crate) personality: Option<String>,
    pub(crate) opponent_personality_prob: u8,
    pub(crate) actions: Vec<StrategyKey>,
    pub(crate) scores: Vec<i64>,
}

impl fmt::Debug for Participant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Participant")
            .field("name", &self.name)
            .field("service_id", &self.service_id)
            .field("personality", &self.personality)
            .field("opponent_personality_prob", &self.opponent_personality_prob)
            .field("actions", &self.actions)
            .field("scores", &self.scores)
            .finish()
    }
}

impl PartialEq for Participant {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
    }
}

impl Eq for Participant {}

impl Hash for Participant {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.name.hash(state);
    }
}

impl Participant {
    /// Seat `name` behind `service`. `service_id` is only used for logs and result keys.
    pub fn new(
        name: impl Into<String>,
        service_id: impl Into<String>,
        service: Box<dyn DecisionService>,
    ) -> Participant {
        Participant {
            name: name.into(),
            service,
            service_id: service_id.into(),
            personality: None,
            opponent_personality_prob: 100,
            actions: vec![],
            scores: vec![],
        }
    }

    /// Disclose a personality. `"None"` (any case) and the empty string mean no personality.
    pub fn with_personality(mut self, personality: impl Into<String>) -> Self {
        let personality = personality.into();
        self.personality = (!personality.is_empty() && !personality.eq_ignore_ascii_case("none"))
            .then_some(personality);
        self
    }

    /// How confidently opponents are told about this participant's personality, in percent.
    pub fn with_opponent_personality_prob(mut self, percent: u8) -> Self {
        self.opponent_personality_prob = percent.min(100);
        self
    }

    /// Unique name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Identifier of the decision service.
    pub fn service_id(&self) -> &str {
        &self.service_id
    }

    /// Disclosed personality, if any.
    pub fn personality(&self) -> Option<&str> {
        self.personality.as_deref()
    }

    /// Disclosure confidence in percent.
    pub fn opponent_personality_prob(&self) -> u8 {
        self.opponent_personality_prob
    }

    /// Final actions, one per completed round.
    pub fn actions(&self) -> &[StrategyKey] {
        &self.actions
    }

    /// Score deltas, one per completed round.
    pub fn scores(&self) -> &[i64] {
        &self.scores
    }

    /// Sum of all score deltas.
    pub fn total_score(&self) -> i64 {
        self.scores.iter().sum()
    }

    pub(crate) fn add_action(&mut self, action: StrategyKey) {
        self.actions.push(action);
    }

    pub(crate) fn add_score(&mut self, score: i64) {
        self.scores.push(score);
    }

    /// Add `delta` to the current round's score entry (sanctions).
    pub(crate) fn adjust_last_score(&mut self, delta: i64) {
        if let Some(last) = self.scores.last_mut() {
            *last += delta;
        }
    }

    pub(crate) fn last_score(&self) -> Option<i64> {
        self.scores.last().copied()
    }

    /// Drop every per-round entry past `rounds` completed rounds.
    pub(crate) fn truncate(&mut self, rounds: usize) {
        self.actions.truncate(rounds);
        self.scores.truncate(rounds);
    }
}

#[cfg(test)]
mod agent_tests {
    use super::*;
    use crate::decision::ScriptedService;

    fn alice() -> Participant {
        Participant::new("Alice", "scripted", Box::new(ScriptedService::new(["Cooperate"])))
    }

    #[test]
    fn none_personality_is_not_disclosed() {
        assert_eq!(alice().with_personality("None").personality(), None);
        assert_eq!(alice().with_personality("").personality(), None);
        assert_eq!(
            alice().with_personality("Selfish").personality(),
            Some("Selfish")
        );
    }

    #[test]
    fn sanction_delta_lands_on_current_round() {
        let mut p = alice();
        p.add_score(7);
        p.add_score(2);
        p.adjust_last_score(-3);
        assert_eq!(p.scores(), [7, -1]);
        assert_eq!(p.total_score(), 6);
    }

    #[test]
    fn truncate_rolls_back_partial_round() {
        let mut p = alice();
        p.add_action(StrategyKey(0));
        p.add_score(7);
        p.add_action(StrategyKey(1));
        p.truncate(1);
        assert_eq!(p.actions(), [StrategyKey(0)]);
        assert_eq!(p.scores(), [7]);
        assert_eq!(p.last_score(), Some(7));
    }

    #[test]
    fn disclosure_is_capped() {
        assert_eq!(alice().with_opponent_personality_prob(250).opponent_personality_prob(), 100);
    }
}
