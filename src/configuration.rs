//! Session configuration
//!
//! A [`GameSettings`] is fixed for the lifetime of a session. It can be created
//! programmatically using [`GameSettings::new()`] and the chainable `with_*` setters, or by
//! reading environment variables using [`GameSettings::from_env()`].
//!
//! # Environment Variables
//!
//! All values are optional. Flags are case-insensitive and enabled by `"true"`; unset or
//! unparsable values keep the default.
//!
//! - `GAME_LANGUAGE` — Language tag of prompts and vocabulary (default: `en`)
//! - `GAME_ROUNDS` — Maximum number of rounds (default: `5`)
//! - `GAME_ROUNDS_KNOWN` — Disclose the round count to participants (default: `true`)
//! - `GAME_COMMUNICATE` — Run the communication phase (default: `false`)
//! - `GAME_NOISE` — Trembling-hand probability in `[0, 1]` (default: `0`)
//! - `GAME_SANCTIONS` — Run the sanctioning phase (default: `false`)
//! - `GAME_PROBE_ROUNDS` — Comma-separated rounds with a comprehension probe (default: none)
//! - `GAME_REASONING` — Ask for a rationale after each choice (default: `false`)
//! - `GAME_SEED` — Seed of the noise generator (default: OS entropy)
//! - `GAME_VERBOSE` — Print one progress line per round (default: `false`)
//! - `GAME_LOG` — Enable logging to a file (default: `false`)

use std::collections::BTreeSet;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::decision::RetryPolicy;
use crate::error::GameError;

/// Price of one sanction.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SanctionRules {
    /// Paid by the sanctioner.
    pub cost: i64,
    /// Paid by the sanctioned participant.
    pub fine: i64,
}

impl Default for SanctionRules {
    fn default() -> Self {
        Self { cost: 1, fine: 3 }
    }
}

/// Configuration of one session.
#[derive(Debug, Clone, PartialEq)]
pub struct GameSettings {
    pub(crate) language: String,
    pub(crate) n_rounds: u32,
    pub(crate) rounds_known: bool,
    pub(crate) stop_tags: BTreeSet<String>,
    pub(crate) communicate: bool,
    pub(crate) noise: f64,
    pub(crate) sanctions: bool,
    pub(crate) sanction_rules: SanctionRules,
    pub(crate) probe_rounds: BTreeSet<u32>,
    pub(crate) reasoning: bool,
    pub(crate) transcript_window: usize,
    pub(crate) seed: Option<u64>,
    pub(crate) retry: RetryPolicy,
    pub(crate) verbose: bool,
    pub(crate) log: bool,
}

impl GameSettings {
    /// Create settings with default parameters.
    ///
    /// By default:
    /// - Prompts are in English and the 5 rounds are disclosed.
    /// - No early-stop tag, no communication, no noise, no sanctions.
    /// - No comprehension probe and no rationale.
    /// - The transcript shows the last 10 rounds.
    /// - Decision services get 3 attempts, 2 seconds apart.
    /// - Nothing is printed and logging to file is disabled.
    pub fn new() -> Self {
        Self {
            language: "en".to_owned(),
            n_rounds: 5,
            rounds_known: true,
            stop_tags: BTreeSet::new(),
            communicate: false,
            noise: 0.0,
            sanctions: false,
            sanction_rules: SanctionRules::default(),
            probe_rounds: BTreeSet::new(),
            reasoning: false,
            transcript_window: 10,
            seed: None,
            retry: RetryPolicy::default(),
            verbose: false,
            log: false,
        }
    }

    /// Create settings from environment variables.
    ///
    /// See the [module documentation](self) for the recognized variables. Anything unset or
    /// unparsable keeps its default value.
    pub fn from_env() -> Self {
        fn get_env_flag(var: &str, default: bool) -> bool {
            match std::env::var(var) {
                Ok(val) => val.eq_ignore_ascii_case("true"),
                Err(_) => default,
            }
        }

        fn get_env_value<T: FromStr>(var: &str) -> Option<T> {
            std::env::var(var).ok()?.trim().parse().ok()
        }

        let defaults = Self::new();
        Self {
            language: std::env::var("GAME_LANGUAGE")
                .ok()
                .map(|l| l.trim().to_ascii_lowercase())
                .filter(|l| !l.is_empty())
                .unwrap_or(defaults.language),
            n_rounds: get_env_value("GAME_ROUNDS").unwrap_or(defaults.n_rounds),
            rounds_known: get_env_flag("GAME_ROUNDS_KNOWN", defaults.rounds_known),
            communicate: get_env_flag("GAME_COMMUNICATE", defaults.communicate),
            noise: get_env_value("GAME_NOISE").unwrap_or(defaults.noise),
            sanctions: get_env_flag("GAME_SANCTIONS", defaults.sanctions),
            probe_rounds: std::env::var("GAME_PROBE_ROUNDS")
                .map(|list| parse_round_list(&list))
                .unwrap_or(defaults.probe_rounds),
            reasoning: get_env_flag("GAME_REASONING", defaults.reasoning),
            seed: get_env_value("GAME_SEED").or(defaults.seed),
            verbose: get_env_flag("GAME_VERBOSE", defaults.verbose),
            log: get_env_flag("GAME_LOG", defaults.log),
            ..defaults
        }
    }

    /// Check the invariants a session relies on.
    pub fn validate(&self) -> Result<(), GameError> {
        let invalid = |msg: &str| Err(GameError::InvalidSettings(msg.to_owned()));
        if !(0.0..=1.0).contains(&self.noise) {
            return invalid("noise probability must be within [0, 1]");
        }
        if self.n_rounds == 0 {
            return invalid("at least one round is required");
        }
        if self.transcript_window == 0 {
            return invalid("transcript window must be at least 1");
        }
        if self.retry.max_attempts == 0 {
            return invalid("at least one decision-service attempt is required");
        }
        if self.sanction_rules.cost < 0 || self.sanction_rules.fine < 0 {
            return invalid("sanction cost and fine cannot be negative");
        }
        if self.language.is_empty() {
            return invalid("language tag is empty");
        }
        Ok(())
    }

    /// Language tag.
    pub fn with_language(mut self, language: impl Into<String>) -> Self {
        self.language = language.into();
        self
    }

    /// Maximum number of rounds.
    pub fn with_rounds(mut self, n_rounds: u32) -> Self {
        self.n_rounds = n_rounds;
        self
    }

    /// Disclose the round count or not.
    pub fn with_rounds_known(mut self, value: bool) -> Self {
        self.rounds_known = value;
        self
    }

    /// Joint-outcome tags that end the session once played.
    pub fn with_stop_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.stop_tags = tags.into_iter().map(Into::into).collect();
        self
    }

    /// Enable or disable the communication phase.
    pub fn with_communicate(mut self, value: bool) -> Self {
        self.communicate = value;
        self
    }

    /// Trembling-hand probability.
    pub fn with_noise(mut self, epsilon: f64) -> Self {
        self.noise = epsilon;
        self
    }

    /// Enable or disable the sanctioning phase.
    pub fn with_sanctions(mut self, value: bool) -> Self {
        self.sanctions = value;
        self
    }

    /// Cost and fine of one sanction.
    pub fn with_sanction_rules(mut self, rules: SanctionRules) -> Self {
        self.sanction_rules = rules;
        self
    }

    /// Rounds with a comprehension probe.
    pub fn with_probe_rounds(mut self, rounds: impl IntoIterator<Item = u32>) -> Self {
        self.probe_rounds = rounds.into_iter().collect();
        self
    }

    /// Enable or disable rationale elicitation.
    pub fn with_reasoning(mut self, value: bool) -> Self {
        self.reasoning = value;
        self
    }

    /// Number of closed rounds shown in prompts.
    pub fn with_transcript_window(mut self, rounds: usize) -> Self {
        self.transcript_window = rounds;
        self
    }

    /// Seed of the noise generator.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Retry policy around every decision-service call.
    pub fn with_retry(mut self, max_attempts: u32, backoff: Duration) -> Self {
        self.retry = RetryPolicy {
            max_attempts,
            backoff,
        };
        self
    }

    /// Enable or disable the per-round progress line.
    pub fn with_verbose(mut self, value: bool) -> Self {
        self.verbose = value;
        self
    }

    /// Enable or disable logging to file.
    pub fn with_log(mut self, value: bool) -> Self {
        self.log = value;
        self
    }

    /// Language tag.
    pub fn language(&self) -> &str {
        &self.language
    }

    /// Maximum number of rounds.
    pub fn rounds(&self) -> u32 {
        self.n_rounds
    }

    /// Trembling-hand probability.
    pub fn noise(&self) -> f64 {
        self.noise
    }

    /// Whether sanctions are on.
    pub fn sanctions(&self) -> bool {
        self.sanctions
    }

    /// Early-stop tags.
    pub fn stop_tags(&self) -> &BTreeSet<String> {
        &self.stop_tags
    }
}

impl Default for GameSettings {
    fn default() -> Self {
        Self::new()
    }
}

fn parse_round_list(list: &str) -> BTreeSet<u32> {
    list.split(',')
        .filter_map(|r| r.trim().parse().ok())
        .collect()
}

#[cfg(test)]
mod configuration_tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let settings = GameSettings::default();
        assert!(settings.validate().is_ok());
        assert_eq!(settings.sanction_rules, SanctionRules { cost: 1, fine: 3 });
        assert_eq!(settings.retry.max_attempts, 3);
        assert_eq!(settings.retry.backoff, Duration::from_secs(2));
        assert_eq!(settings.transcript_window, 10);
    }

    #[test]
    fn validation_rejects_out_of_range_values() {
        for settings in [
            GameSettings::new().with_noise(1.5),
            GameSettings::new().with_noise(f64::NAN),
            GameSettings::new().with_rounds(0),
            GameSettings::new().with_transcript_window(0),
            GameSettings::new().with_retry(0, Duration::ZERO),
            GameSettings::new().with_language(""),
        ] {
            assert!(matches!(
                settings.validate(),
                Err(GameError::InvalidSettings(_))
            ));
        }
    }

    #[test]
    fn round_lists_skip_garbage() {
        assert_eq!(
            parse_round_list(" 1, 5,x,,10 "),
            BTreeSet::from([1, 5, 10])
        );
    }

    #[test]
    fn environment_overrides() {
        std::env::set_var("GAME_ROUNDS", "12");
        std::env::set_var("GAME_NOISE", "0.1");
        std::env::set_var("GAME_SANCTIONS", "TRUE");
        std::env::set_var("GAME_PROBE_ROUNDS", "1,3");
        std::env::set_var("GAME_SEED", "not a number");
        std::env::set_var("GAME_LANGUAGE", "VN");
        let settings = GameSettings::from_env();
        for var in [
            "GAME_ROUNDS",
            "GAME_NOISE",
            "GAME_SANCTIONS",
            "GAME_PROBE_ROUNDS",
            "GAME_SEED",
            "GAME_LANGUAGE",
        ] {
            std::env::remove_var(var);
        }
        assert_eq!(settings.rounds(), 12);
        assert_eq!(settings.noise(), 0.1);
        assert!(settings.sanctions());
        assert_eq!(settings.probe_rounds, BTreeSet::from([1, 3]));
        assert_eq!(settings.seed, None);
        assert_eq!(settings.language(), "vn");
        assert!(settings.rounds_known);
    }
}
