//! Round-indexed ledger of participant records.
//!
//! Records are filled phase by phase while their round is open. Closing a round freezes it:
//! every later write to it fails with [`GameError::RoundClosed`]. Only closed rounds are
//! serialized, as a `{"round_1": [record, ...], "round_2": ...}` map in numeric order.

use std::collections::BTreeMap;

use serde::ser::SerializeMap;
use serde::{Deserialize, Serialize, Serializer};

use crate::error::GameError;
use crate::payoff::StrategyKey;

/// Verbatim answers to the comprehension probe.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComprehensionAnswers {
    /// What does the participant believe the payoffs are.
    pub payoff_understanding: String,
    /// What does it remember about previous rounds.
    pub history_recall: String,
    /// How does it restate its goal.
    pub strategy_understanding: String,
}

/// One participant in one round.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoundRecord {
    /// Participant name.
    pub agent: String,
    /// Communication-phase message.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Display text of the parsed action, before noise.
    #[serde(default)]
    pub intended_strategy: Option<String>,
    /// Display text of the executed action.
    #[serde(default)]
    pub strategy: Option<String>,
    /// True when noise replaced the intended action.
    #[serde(default)]
    pub is_noise: bool,
    /// Score delta of the round, sanctions included.
    #[serde(default)]
    pub score: Option<i64>,
    /// Post-hoc rationale.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reasoning: Option<String>,
    /// Comprehension probe answers, on probe rounds only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meta_prompt_validation: Option<ComprehensionAnswers>,
    /// Peers this participant sanctioned.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub punished: Vec<String>,
    /// Peers who sanctioned this participant.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub was_punished_by: Vec<String>,
}

impl RoundRecord {
    /// Empty record for `agent`.
    pub fn new(agent: impl Into<String>) -> Self {
        Self {
            agent: agent.into(),
            message: None,
            intended_strategy: None,
            strategy: None,
            is_noise: false,
            score: None,
            reasoning: None,
            meta_prompt_validation: None,
            punished: vec![],
            was_punished_by: vec![],
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
struct RoundLedger {
    records: Vec<RoundRecord>,
    closed: bool,
}

/// The ledger. Round keys are dense from 1.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(try_from = "BTreeMap<String, Vec<RoundRecord>>")]
pub struct History {
    rounds: BTreeMap<u32, RoundLedger>,
}

impl History {
    /// Empty history.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of closed rounds.
    pub fn len(&self) -> usize {
        self.rounds.values().filter(|r| r.closed).count()
    }

    /// No closed round yet.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Index of the open round, if any.
    pub fn open_round_index(&self) -> Option<u32> {
        self.rounds
            .iter()
            .next_back()
            .filter(|(_, r)| !r.closed)
            .map(|(n, _)| *n)
    }

    /// Open the next round with one empty record per name, in seating order.
    pub fn open_round<S: AsRef<str>>(&mut self, names: &[S]) -> Result<u32, GameError> {
        if let Some(open) = self.open_round_index() {
            return Err(GameError::RoundClosed(open + 1));
        }
        let next = self.rounds.keys().next_back().map_or(1, |n| n + 1);
        let records = names.iter().map(|n| RoundRecord::new(n.as_ref())).collect();
        self.rounds.insert(
            next,
            RoundLedger {
                records,
                closed: false,
            },
        );
        Ok(next)
    }

    /// Mutable access to a record of the open round.
    pub fn record_mut(&mut self, round: u32, agent: &str) -> Result<&mut RoundRecord, GameError> {
        let ledger = self
            .rounds
            .get_mut(&round)
            .filter(|r| !r.closed)
            .ok_or(GameError::RoundClosed(round))?;
        ledger
            .records
            .iter_mut()
            .find(|r| r.agent == agent)
            .ok_or_else(|| GameError::InvalidSettings(format!("no participant '{agent}' in round {round}")))
    }

    /// Freeze `round`.
    pub fn close_round(&mut self, round: u32) -> Result<(), GameError> {
        let ledger = self
            .rounds
            .get_mut(&round)
            .filter(|r| !r.closed)
            .ok_or(GameError::RoundClosed(round))?;
        ledger.closed = true;
        Ok(())
    }

    /// Drop the open round, if any, and return its index.
    pub fn discard_open_round(&mut self) -> Option<u32> {
        let open = self.open_round_index()?;
        self.rounds.remove(&open);
        Some(open)
    }

    /// Records of a closed round, in seating order.
    pub fn round(&self, round: u32) -> Option<&[RoundRecord]> {
        self.rounds
            .get(&round)
            .filter(|r| r.closed)
            .map(|r| r.records.as_slice())
    }

    /// Closed rounds in increasing order.
    pub fn rounds(&self) -> impl DoubleEndedIterator<Item = (u32, &[RoundRecord])> + '_ {
        self.rounds
            .iter()
            .filter(|(_, r)| r.closed)
            .map(|(n, r)| (*n, r.records.as_slice()))
    }

    /// The last `window` closed rounds, oldest first.
    pub fn recent(&self, window: usize) -> Vec<(u32, &[RoundRecord])> {
        let mut recent: Vec<_> = self.rounds().rev().take(window).collect();
        recent.reverse();
        recent
    }

    /// Every closed record of `agent`, with its round index.
    pub fn records_for<'a>(&'a self, agent: &'a str) -> impl Iterator<Item = (u32, &'a RoundRecord)> + 'a {
        self.rounds()
            .filter_map(move |(n, records)| records.iter().find(|r| r.agent == agent).map(|r| (n, r)))
    }

    /// Executed action tuple of a closed round, resolved against `vocabulary`.
    pub fn action_tuple(&self, round: u32, vocabulary: &[String]) -> Option<Vec<StrategyKey>> {
        self.round(round)?
            .iter()
            .map(|r| {
                let text = r.strategy.as_deref()?;
                vocabulary.iter().position(|s| s == text).map(StrategyKey)
            })
            .collect()
    }

    /// Number of records whose action was flipped by noise.
    pub fn noise_events(&self) -> usize {
        self.rounds()
            .flat_map(|(_, records)| records)
            .filter(|r| r.is_noise)
            .count()
    }

    /// Share of executed actions equal to the first strategy of `vocabulary`.
    pub fn cooperation_rate(&self, vocabulary: &[String]) -> Option<f64> {
        let first = vocabulary.first()?;
        let (total, cooperative) = self
            .rounds()
            .flat_map(|(_, records)| records)
            .filter_map(|r| r.strategy.as_ref())
            .fold((0usize, 0usize), |(t, c), s| (t + 1, c + usize::from(s == first)));
        (total > 0).then(|| cooperative as f64 / total as f64)
    }
}

impl Serialize for History {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.len()))?;
        for (n, records) in self.rounds() {
            map.serialize_entry(&format!("round_{n}"), records)?;
        }
        map.end()
    }
}

impl TryFrom<BTreeMap<String, Vec<RoundRecord>>> for History {
    type Error = String;

    fn try_from(raw: BTreeMap<String, Vec<RoundRecord>>) -> Result<Self, Self::Error> {
        let mut rounds = BTreeMap::new();
        for (key, records) in raw {
            let n = key
                .strip_prefix("round_")
                .and_then(|n| n.parse::<u32>().ok())
                .ok_or_else(|| format!("'{key}' is not a round key (expected round_N)"))?;
            rounds.insert(
                n,
                RoundLedger {
                    records,
                    closed: true,
                },
            );
        }
        if let Some((expected, found)) = rounds
            .keys()
            .enumerate()
            .map(|(i, n)| (i as u32 + 1, *n))
            .find(|(expected, found)| expected != found)
        {
            return Err(format!(
                "round keys are not dense: expected round_{expected}, found round_{found}"
            ));
        }
        Ok(Self { rounds })
    }
}
