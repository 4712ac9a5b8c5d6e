//! Experiment configs and batches.
//!
//! An [`ExperimentConfig`] is the JSON document describing one game: agents, payoff table,
//! templates per language and the session switches. [`run_experiments`] plays it once per
//! `(model, language)` pair and keys every result `{GAME}_{model}_{lang}_Noise{ε}`. A session
//! that fails keeps its completed rounds and carries an `error` instead of aborting the batch.

use std::collections::BTreeMap;
use std::path::PathBuf;

use anyhow::{bail, Context};
use serde::{Deserialize, Serialize};
use tracing::{error, info, instrument};

use crate::agent::Participant;
use crate::configuration::GameSettings;
use crate::decision::{CancelToken, ProviderRequest, ServiceRegistry, MOCK_MODEL};
use crate::games::{GameKind, DEFAULT_AGENTS};
use crate::history::History;
use crate::payoff::PayoffTable;
use crate::persistence::{ExperimentRecord, ExperimentResults, IncrementalSaver};
use crate::session::{FairGame, StopReason};
use crate::template::PromptTemplate;

/// Participants of an experiment.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentsConfig {
    /// Names, in seating order.
    pub names: Vec<String>,
    /// Personalities in seating order, per language. Missing entries mean `None`.
    #[serde(default)]
    pub personalities: BTreeMap<String, Vec<String>>,
    /// Disclosure confidence in seating order. Missing entries mean 0.
    #[serde(default)]
    pub opponent_personality_prob: Vec<u8>,
}

/// One experiment, as stored in JSON configs.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExperimentConfig {
    /// Session name, saved as `description`.
    pub name: String,
    /// Maximum number of rounds.
    pub n_rounds: u32,
    /// Disclose the round count.
    #[serde(default = "default_true")]
    pub n_rounds_is_known: bool,
    /// Provider played when a batch names no model.
    #[serde(default = "default_llm")]
    pub llm: String,
    /// Languages to play.
    pub languages: Vec<String>,
    /// Participants.
    pub agents: AgentsConfig,
    /// Payoff table.
    pub payoff_matrix: PayoffTable,
    /// Template text per language.
    pub prompt_template: BTreeMap<String, String>,
    /// Early-stop joint-outcome tags.
    #[serde(default)]
    pub stop_game_when: Vec<String>,
    /// Run the communication phase.
    #[serde(default)]
    pub agents_communicate: bool,
    /// Trembling-hand probability.
    #[serde(default)]
    pub noise: f64,
    /// Run the sanctioning phase.
    #[serde(default, rename = "punishment_enabled")]
    pub punishment_enabled: bool,
    /// Ask for a rationale after each choice.
    #[serde(default, rename = "extract_reasoning")]
    pub extract_reasoning: bool,
    /// Master switch of the comprehension probes.
    #[serde(default = "default_true", rename = "meta_prompt_enabled")]
    pub meta_prompt_enabled: bool,
    /// Rounds with a comprehension probe, when enabled.
    #[serde(default, rename = "meta_prompt_rounds")]
    pub meta_prompt_rounds: Vec<u32>,
    /// Seed of noise and mock services.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,
}

fn default_true() -> bool {
    true
}

fn default_llm() -> String {
    MOCK_MODEL.to_owned()
}

impl ExperimentConfig {
    /// Built-in configuration of `kind`: default agents, both languages, `n_rounds` rounds.
    pub fn for_game(kind: GameKind, n_rounds: u32) -> Self {
        let languages = ["en", "vn"];
        Self {
            name: kind.description().to_owned(),
            n_rounds,
            n_rounds_is_known: true,
            llm: MOCK_MODEL.to_owned(),
            languages: vec!["en".to_owned()],
            agents: AgentsConfig {
                names: DEFAULT_AGENTS.map(String::from).to_vec(),
                personalities: languages
                    .iter()
                    .map(|l| {
                        let personalities = GameKind::default_personalities(l);
                        (l.to_string(), personalities.map(String::from).to_vec())
                    })
                    .collect(),
                opponent_personality_prob: vec![100; DEFAULT_AGENTS.len()],
            },
            payoff_matrix: kind.payoff_table(),
            prompt_template: languages
                .iter()
                .filter_map(|l| kind.template(l).map(|t| (l.to_string(), t.to_owned())))
                .collect(),
            stop_game_when: vec![],
            agents_communicate: false,
            noise: 0.0,
            punishment_enabled: kind.sanctions_by_default(),
            extract_reasoning: false,
            meta_prompt_enabled: true,
            meta_prompt_rounds: vec![],
            seed: None,
        }
    }

    /// Parse a JSON config.
    pub fn from_json(text: &str) -> anyhow::Result<Self> {
        serde_json::from_str(text).context("invalid experiment config")
    }

    /// Session settings for `language`, layered over `base`.
    pub fn settings(&self, language: &str, base: GameSettings) -> GameSettings {
        let settings = base
            .with_language(language)
            .with_rounds(self.n_rounds)
            .with_rounds_known(self.n_rounds_is_known)
            .with_stop_tags(self.stop_game_when.iter().cloned())
            .with_communicate(self.agents_communicate)
            .with_noise(self.noise)
            .with_sanctions(self.punishment_enabled)
            .with_probe_rounds(
                self.meta_prompt_rounds
                    .iter()
                    .copied()
                    .filter(|_| self.meta_prompt_enabled),
            )
            .with_reasoning(self.extract_reasoning);
        match self.seed {
            Some(seed) => settings.with_seed(seed),
            None => settings,
        }
    }

    /// Build one session: participants served by `model`, template and vocabulary of
    /// `language`.
    pub fn build_session(
        &self,
        model: &str,
        language: &str,
        registry: &ServiceRegistry,
        base: GameSettings,
    ) -> anyhow::Result<FairGame> {
        let Some(template) = self.prompt_template.get(language) else {
            bail!("no prompt template for language '{language}'");
        };
        let Some(vocabulary) = self.payoff_matrix.strategies.get(language) else {
            bail!("no strategies for language '{language}'");
        };
        let personalities = self.agents.personalities.get(language);

        let mut participants = Vec::with_capacity(self.agents.names.len());
        for (seat, name) in self.agents.names.iter().enumerate() {
            let service = registry
                .create(&ProviderRequest {
                    model,
                    vocabulary,
                    seat,
                    seed: self.seed,
                })
                .with_context(|| format!("could not create decision service of {name}"))?;
            let personality = personalities
                .and_then(|p| p.get(seat))
                .map_or("None", String::as_str);
            let prob = self
                .agents
                .opponent_personality_prob
                .get(seat)
                .copied()
                .unwrap_or(0);
            participants.push(
                Participant::new(name.as_str(), model, service)
                    .with_personality(personality)
                    .with_opponent_personality_prob(prob),
            );
        }

        let game = FairGame::new(
            self.name.as_str(),
            self.settings(language, base),
            self.payoff_matrix.clone(),
            PromptTemplate::new(template.as_str()),
            participants,
        )?;
        Ok(game)
    }
}

/// Knobs of a batch beyond the experiment config.
#[derive(Clone, Debug, Default)]
pub struct BatchOptions {
    /// Settings every session starts from (verbosity, retry, window...).
    pub base: GameSettings,
    /// Directory receiving one checkpoint file per session.
    pub checkpoint_dir: Option<PathBuf>,
    /// Shared cancellation: the running session stops and no further session starts.
    pub cancel: CancelToken,
}

/// `{GAME}_{model}_{lang}_Noise{ε}`
pub fn experiment_key(kind: GameKind, model: &str, language: &str, noise: f64) -> String {
    format!("{}_{model}_{language}_Noise{noise:?}", kind.tag())
}

/// [`run_experiments_with`] with default options.
pub fn run_experiments(
    config: &ExperimentConfig,
    kind: GameKind,
    models: &[String],
    languages: &[String],
    registry: &ServiceRegistry,
) -> ExperimentResults {
    run_experiments_with(config, kind, models, languages, registry, &BatchOptions::default())
}

/// Play `config` once per `(model, language)` pair.
///
/// An empty `models` plays the config's `llm`, an empty `languages` its `languages`.
#[instrument(skip_all, fields(game = %kind))]
pub fn run_experiments_with(
    config: &ExperimentConfig,
    kind: GameKind,
    models: &[String],
    languages: &[String],
    registry: &ServiceRegistry,
    options: &BatchOptions,
) -> ExperimentResults {
    let models = if models.is_empty() {
        std::slice::from_ref(&config.llm)
    } else {
        models
    };
    let languages = if languages.is_empty() {
        config.languages.as_slice()
    } else {
        languages
    };

    let mut results = ExperimentResults::new();
    for model in models.iter().map(|m| m.trim()) {
        for language in languages.iter().map(|l| l.trim()) {
            if options.cancel.is_cancelled() {
                info!("batch cancelled");
                return results;
            }
            let key = experiment_key(kind, model, language, config.noise);
            info!(%key, "running experiment");
            let record = run_one(config, model, language, registry, options, &key);
            results.insert(key, record);
        }
    }
    results
}

fn run_one(
    config: &ExperimentConfig,
    model: &str,
    language: &str,
    registry: &ServiceRegistry,
    options: &BatchOptions,
    key: &str,
) -> ExperimentRecord {
    let mut game = match config.build_session(model, language, registry, options.base.clone()) {
        Ok(game) => game.with_cancel_token(options.cancel.clone()),
        Err(e) => {
            error!(%key, error = %format!("{e:#}"), "could not set up experiment");
            return ExperimentRecord {
                description: config.name.clone(),
                history: History::new(),
                error: Some(format!("{e:#}")),
            };
        }
    };
    if let Some(dir) = &options.checkpoint_dir {
        game = game.with_observer(IncrementalSaver::new(dir.join(format!("{key}.json"))));
    }

    let error = match game.run() {
        Ok(StopReason::Cancelled) => Some("cancelled".to_owned()),
        Ok(reason) => {
            info!(%key, ?reason, scores = ?game.scores(), "experiment finished");
            None
        }
        Err(e) => {
            error!(%key, error = %e, "experiment failed");
            Some(e.to_string())
        }
    };
    ExperimentRecord {
        description: config.name.clone(),
        history: game.into_history(),
        error,
    }
}

#[cfg(test)]
mod experiment_tests {
    use super::*;

    #[test]
    fn keys_follow_the_saved_naming() {
        assert_eq!(
            experiment_key(GameKind::PublicGoods, "MockModel", "vn", 0.0),
            "PGG_MockModel_vn_Noise0.0"
        );
        assert_eq!(
            experiment_key(GameKind::PrisonersDilemma, "gpt", "en", 0.1),
            "PD_gpt_en_Noise0.1"
        );
    }

    #[test]
    fn builtin_config_survives_json() {
        let config = ExperimentConfig::for_game(GameKind::VolunteersDilemma, 4);
        let text = serde_json::to_string_pretty(&config).unwrap();
        assert!(text.contains("\"nRoundsIsKnown\""));
        assert!(text.contains("\"punishment_enabled\""));
        assert!(text.contains("\"opponentPersonalityProb\""));
        assert_eq!(ExperimentConfig::from_json(&text).unwrap(), config);
    }

    #[test]
    fn minimal_json_uses_defaults() {
        let table = serde_json::to_string(&GameKind::PrisonersDilemma.payoff_table()).unwrap();
        let text = format!(
            r#"{{
                "name": "Triadic Prisoner's Dilemma",
                "nRounds": 2,
                "languages": ["en"],
                "agents": {{"names": ["Alice", "Bob", "Charlie"]}},
                "payoffMatrix": {table},
                "promptTemplate": {{"en": "{{choose}}: [{{currentPlayerName}} picks]"}}
            }}"#
        );
        let config = ExperimentConfig::from_json(&text).unwrap();
        assert!(config.n_rounds_is_known);
        assert_eq!(config.llm, MOCK_MODEL);
        assert!(!config.punishment_enabled);

        let registry = ServiceRegistry::new();
        let game = config
            .build_session(MOCK_MODEL, "en", &registry, GameSettings::new())
            .unwrap();
        assert!(game.participants().iter().all(|p| p.personality().is_none()));
        assert!(game
            .participants()
            .iter()
            .all(|p| p.opponent_personality_prob() == 0));
    }

    #[test]
    fn empty_batch_falls_back_to_config() {
        let mut config = ExperimentConfig::for_game(GameKind::PrisonersDilemma, 2);
        config.seed = Some(3);
        let results = run_experiments(
            &config,
            GameKind::PrisonersDilemma,
            &[],
            &[],
            &ServiceRegistry::new(),
        );
        let keys: Vec<&String> = results.keys().collect();
        assert_eq!(keys, ["PD_MockModel_en_Noise0.0"]);
        assert_eq!(results["PD_MockModel_en_Noise0.0"].history.len(), 2);
    }

    #[test]
    fn probe_rounds_follow_the_master_switch() {
        let mut config = ExperimentConfig::for_game(GameKind::VolunteersDilemma, 3);
        config.meta_prompt_rounds = vec![1, 3];
        assert_eq!(config.settings("en", GameSettings::new()).probe_rounds.len(), 2);
        config.meta_prompt_enabled = false;
        assert!(config.settings("en", GameSettings::new()).probe_rounds.is_empty());

        let table = serde_json::to_value(GameKind::VolunteersDilemma.payoff_table()).unwrap();
        let json = serde_json::json!({
            "name": "Volunteer's Dilemma",
            "nRounds": 3,
            "languages": ["en"],
            "agents": {"names": ["Alice", "Bob", "Charlie"]},
            "payoffMatrix": table,
            "promptTemplate": {"en": "{choose}: [pick]"},
            "meta_prompt_rounds": [1]
        });
        let parsed: ExperimentConfig = serde_json::from_value(json).unwrap();
        assert!(parsed.meta_prompt_enabled);
    }

    #[test]
    fn missing_language_is_recorded_not_raised() {
        let config = ExperimentConfig::for_game(GameKind::PrisonersDilemma, 2);
        let results = run_experiments(
            &config,
            GameKind::PrisonersDilemma,
            &[MOCK_MODEL.to_owned()],
            &["fr".to_owned()],
            &ServiceRegistry::new(),
        );
        let record = &results["PD_MockModel_fr_Noise0.0"];
        assert!(record.history.is_empty());
        assert!(record.error.as_deref().unwrap_or_default().contains("'fr'"));
    }
}
