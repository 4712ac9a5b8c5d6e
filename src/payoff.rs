//! Declarative strategic-form payoff tables.
//!
//! A [`PayoffTable`] is plain data, shaped like the JSON experiment configs: named weights in
//! declaration order, a two-word vocabulary per language, and two maps keyed by joint-outcome tag
//! (`"CCD"`, ...). `combinations` gives the ordered strategy keys of each tag and `matrix` the
//! ordered weight labels paid to each seat.
//!
//! [`PayoffModel`] is a validated table bound to one language. Lookups are positional: the seat
//! order used to build an action tuple must be the seat order used to pay it out.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::agent::Participant;
use crate::error::GameError;

/// Positional strategy key. `StrategyKey(0)` is written `strategy1`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct StrategyKey(pub usize);

impl StrategyKey {
    /// The first declared strategy, used as the parse-failure default.
    pub const FIRST: StrategyKey = StrategyKey(0);

    /// Zero-based position in the vocabulary.
    pub fn index(self) -> usize {
        self.0
    }

    /// One-letter code used in joint-outcome tags and transcripts.
    pub fn code(self) -> char {
        match self.0 {
            0 => 'C',
            1 => 'D',
            n => (b'A' + (n as u8 % 26)) as char,
        }
    }
}

impl fmt::Display for StrategyKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "strategy{}", self.0 + 1)
    }
}

impl From<StrategyKey> for String {
    fn from(key: StrategyKey) -> Self {
        key.to_string()
    }
}

impl TryFrom<String> for StrategyKey {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        let position = value
            .strip_prefix("strategy")
            .and_then(|n| n.parse::<usize>().ok())
            .filter(|n| *n >= 1)
            .ok_or_else(|| format!("'{value}' is not a strategy key (expected strategyN)"))?;
        Ok(StrategyKey(position - 1))
    }
}

/// A named payoff value, e.g. `Reward = 7`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PayoffWeight {
    /// Symbolic label referenced from the matrix.
    pub label: String,
    /// Points paid for this label.
    pub value: i64,
}

impl PayoffWeight {
    /// Shorthand constructor.
    pub fn new(label: impl Into<String>, value: i64) -> Self {
        Self {
            label: label.into(),
            value,
        }
    }
}

/// Raw payoff table, covering every language variant.
///
/// Serialized as in experiment configs: `weights` is a `{label: value}` map whose order is
/// the declaration order, `strategies` maps each language to `{strategyN: text}`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PayoffTable {
    /// Weights in declaration order (`weight1`, `weight2`, ... in templates).
    #[serde(with = "weights_as_map")]
    pub weights: Vec<PayoffWeight>,
    /// Display text of each strategy, per language tag.
    #[serde(with = "strategies_by_key")]
    pub strategies: BTreeMap<String, Vec<String>>,
    /// Joint-outcome tag to ordered strategy keys, one per seat.
    pub combinations: BTreeMap<String, Vec<StrategyKey>>,
    /// Joint-outcome tag to ordered weight labels, one per seat.
    pub matrix: BTreeMap<String, Vec<String>>,
}

impl PayoffTable {
    /// Generate the full `2^players` table from a per-seat rule.
    ///
    /// `rule(actions, seat)` returns the weight label paid to `seat` for the joint `actions`.
    /// Tags are built from [`StrategyKey::code`], seat order first to last.
    pub fn from_rule<F>(
        players: usize,
        weights: Vec<PayoffWeight>,
        strategies: BTreeMap<String, Vec<String>>,
        rule: F,
    ) -> Self
    where
        F: Fn(&[StrategyKey], usize) -> String,
    {
        let mut combinations = BTreeMap::new();
        let mut matrix = BTreeMap::new();
        for actions in all_action_tuples(players, 2) {
            let tag: String = actions.iter().map(|k| k.code()).collect();
            let labels = (0..players).map(|seat| rule(&actions, seat)).collect();
            matrix.insert(tag.clone(), labels);
            combinations.insert(tag, actions);
        }
        Self {
            weights,
            strategies,
            combinations,
            matrix,
        }
    }

    /// Number of seats, taken from the combination tuples.
    pub fn player_count(&self) -> usize {
        self.combinations.values().next().map_or(0, Vec::len)
    }
}

mod weights_as_map {
    use std::fmt;

    use serde::de::{MapAccess, Visitor};
    use serde::ser::SerializeMap;
    use serde::{Deserializer, Serializer};

    use super::PayoffWeight;

    pub fn serialize<S: Serializer>(weights: &[PayoffWeight], serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(weights.len()))?;
        for w in weights {
            map.serialize_entry(&w.label, &w.value)?;
        }
        map.end()
    }

    struct OrderedWeights;

    impl<'de> Visitor<'de> for OrderedWeights {
        type Value = Vec<PayoffWeight>;

        fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str("a map of payoff labels to integer values")
        }

        fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Self::Value, A::Error> {
            let mut weights = Vec::with_capacity(access.size_hint().unwrap_or(0));
            while let Some((label, value)) = access.next_entry::<String, i64>()? {
                weights.push(PayoffWeight { label, value });
            }
            Ok(weights)
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<PayoffWeight>, D::Error> {
        deserializer.deserialize_map(OrderedWeights)
    }
}

mod strategies_by_key {
    use std::collections::BTreeMap;

    use serde::de::Error;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    use super::StrategyKey;

    pub fn serialize<S: Serializer>(
        strategies: &BTreeMap<String, Vec<String>>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        let keyed: BTreeMap<&String, BTreeMap<StrategyKey, &String>> = strategies
            .iter()
            .map(|(lang, texts)| {
                (lang, texts.iter().enumerate().map(|(i, t)| (StrategyKey(i), t)).collect())
            })
            .collect();
        keyed.serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<BTreeMap<String, Vec<String>>, D::Error> {
        let keyed = BTreeMap::<String, BTreeMap<StrategyKey, String>>::deserialize(deserializer)?;
        keyed
            .into_iter()
            .map(|(lang, texts)| {
                if texts.keys().enumerate().any(|(i, k)| k.index() != i) {
                    return Err(D::Error::custom(format!(
                        "strategies of '{lang}' must be strategy1..strategyN without gaps"
                    )));
                }
                Ok((lang, texts.into_values().collect()))
            })
            .collect()
    }
}

/// Every ordered tuple of `players` keys over a vocabulary of `options` strategies,
/// in lexicographic order of keys.
pub fn all_action_tuples(players: usize, options: usize) -> Vec<Vec<StrategyKey>> {
    let mut tuples: Vec<Vec<StrategyKey>> = vec![vec![]];
    for _ in 0..players {
        tuples = tuples
            .into_iter()
            .flat_map(|prefix| {
                (0..options).map(move |k| {
                    let mut next = prefix.clone();
                    next.push(StrategyKey(k));
                    next
                })
            })
            .collect();
    }
    tuples
}

/// A validated payoff table bound to a single language.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PayoffModel {
    language: String,
    strategies: Vec<String>,
    weights: Vec<PayoffWeight>,
    combinations: BTreeMap<String, Vec<StrategyKey>>,
    matrix: BTreeMap<String, Vec<String>>,
}

impl PayoffModel {
    /// Validate `table` and select the vocabulary for `language`.
    ///
    /// # Errors
    /// [`GameError::InvalidPayoffModel`] when the language is missing, the vocabulary is not
    /// exactly two strategies, `combinations` and `matrix` have different tags, a label has no
    /// weight, or the combinations are not an exact partition of the joint-action space.
    pub fn new(table: PayoffTable, language: &str) -> Result<Self, GameError> {
        let invalid = |msg: String| Err(GameError::InvalidPayoffModel(msg));

        let Some(strategies) = table.strategies.get(language).cloned() else {
            return invalid(format!(
                "no strategies for language '{language}' (have {:?})",
                table.strategies.keys().collect::<Vec<_>>()
            ));
        };
        if strategies.len() != 2 {
            return invalid(format!(
                "expected exactly 2 strategies, found {}",
                strategies.len()
            ));
        }

        let combo_tags: BTreeSet<_> = table.combinations.keys().collect();
        let matrix_tags: BTreeSet<_> = table.matrix.keys().collect();
        if combo_tags != matrix_tags {
            return invalid(format!(
                "combinations and matrix tags differ: {:?}",
                combo_tags.symmetric_difference(&matrix_tags).collect::<Vec<_>>()
            ));
        }

        let players = table.player_count();
        if players == 0 {
            return invalid("no combinations".to_owned());
        }

        let mut seen = BTreeSet::new();
        for (tag, actions) in &table.combinations {
            if actions.len() != players {
                return invalid(format!(
                    "combination '{tag}' has {} seats instead of {players}",
                    actions.len()
                ));
            }
            if let Some(key) = actions.iter().find(|k| k.index() >= strategies.len()) {
                return invalid(format!("combination '{tag}' uses unknown {key}"));
            }
            if !seen.insert(actions.clone()) {
                return invalid(format!("combination '{tag}' duplicates another tag"));
            }
        }
        let Some(expected) = u32::try_from(players)
            .ok()
            .and_then(|shift| 1usize.checked_shl(shift))
        else {
            return invalid(format!("{players} players is more than the joint-action space can hold"));
        };
        if seen.len() != expected {
            return invalid(format!(
                "{} combinations for {players} players, expected {expected}",
                seen.len()
            ));
        }

        for (tag, labels) in &table.matrix {
            if labels.len() != players {
                return invalid(format!(
                    "matrix row '{tag}' has {} payoffs instead of {players}",
                    labels.len()
                ));
            }
            if let Some(label) = labels
                .iter()
                .find(|l| !table.weights.iter().any(|w| &w.label == *l))
            {
                return invalid(format!("matrix row '{tag}' uses unknown weight '{label}'"));
            }
        }

        Ok(Self {
            language: language.to_owned(),
            strategies,
            weights: table.weights,
            combinations: table.combinations,
            matrix: table.matrix,
        })
    }

    /// Selected language tag.
    pub fn language(&self) -> &str {
        &self.language
    }

    /// Number of seats in a joint action.
    pub fn player_count(&self) -> usize {
        self.combinations.values().next().map_or(0, Vec::len)
    }

    /// Strategy keys in declaration order.
    pub fn strategy_keys(&self) -> impl Iterator<Item = StrategyKey> + '_ {
        (0..self.strategies.len()).map(StrategyKey)
    }

    /// Display text of every strategy, in declaration order.
    pub fn strategies(&self) -> &[String] {
        &self.strategies
    }

    /// Display text of one strategy.
    pub fn strategy_text(&self, key: StrategyKey) -> &str {
        &self.strategies[key.index()]
    }

    /// Weights in declaration order.
    pub fn weights(&self) -> &[PayoffWeight] {
        &self.weights
    }

    /// Joint-outcome tags with their strategy keys.
    pub fn combinations(&self) -> &BTreeMap<String, Vec<StrategyKey>> {
        &self.combinations
    }

    /// Exact positional lookup of a joint action.
    pub fn combination_for(&self, actions: &[StrategyKey]) -> Result<&str, GameError> {
        self.combinations
            .iter()
            .find(|(_, keys)| keys.as_slice() == actions)
            .map(|(tag, _)| tag.as_str())
            .ok_or_else(|| GameError::UnknownCombination {
                actions: actions.iter().map(ToString::to_string).collect(),
            })
    }

    /// Ordered payoffs of a joint-outcome tag.
    pub fn score_for(&self, tag: &str) -> Result<Vec<i64>, GameError> {
        let labels = self
            .matrix
            .get(tag)
            .ok_or_else(|| GameError::UnknownTag(tag.to_owned()))?;
        labels
            .iter()
            .map(|label| {
                self.weights
                    .iter()
                    .find(|w| &w.label == label)
                    .map(|w| w.value)
                    .ok_or_else(|| GameError::InvalidPayoffModel(format!("no weight '{label}'")))
            })
            .collect()
    }

    /// Pay out one round: seat `i` of `participants` receives payoff `i` of the joint action.
    ///
    /// Appends one score entry to every participant and returns the tag and payoffs.
    pub fn apply_scores(
        &self,
        participants: &mut [Participant],
        actions: &[StrategyKey],
    ) -> Result<(String, Vec<i64>), GameError> {
        if participants.len() != actions.len() {
            return Err(GameError::UnknownCombination {
                actions: actions.iter().map(ToString::to_string).collect(),
            });
        }
        let tag = self.combination_for(actions)?.to_owned();
        let payoffs = self.score_for(&tag)?;
        for (participant, payoff) in participants.iter_mut().zip(&payoffs) {
            participant.add_score(*payoff);
        }
        Ok((tag, payoffs))
    }
}
