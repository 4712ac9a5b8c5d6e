//! # Fair Game
//!
//! An engine for repeated three-player social-dilemma games played by language-model agents.
//!
//! It provides:
//! - Game definitions as data: a [`PayoffTable`](crate::payoff::PayoffTable) mapping every
//!   joint action to per-seat payoffs, and a prompt template per language
//! - A round loop (`FairGame`) with optional communication, trembling-hand noise, costly
//!   sanctions, comprehension probes and rationale extraction
//! - Deterministic response parsing: a response never fails to resolve to a strategy
//! - A round-keyed [`History`](crate::history::History) that serializes to the results format,
//!   checkpoints after every round and batch runs over `(model, language)` pairs
//!
//! Decision services (the models) sit behind the
//! [`DecisionService`](crate::decision::DecisionService) trait. A seeded mock model is
//! registered by default so that whole games can be played offline.
//!
//! # Documentation Overview
//!
//! - For the round protocol and stop conditions, see the [`session`] module.
//! - For session switches and their environment variables, see
//!   [`GameSettings`](crate::configuration::GameSettings).
//! - For JSON experiment configs and batches, see the [`experiment`] module.
//! - For the built-in Prisoner's Dilemma, Public Goods and Volunteer's Dilemma, see
//!   [`GameKind`](crate::games::GameKind).
//!
//! # Usage Example
//!
//! ```no_run
//! use std::time::{SystemTime, UNIX_EPOCH};
//! use fair_game::prelude::*;
//!
//! fn main() -> anyhow::Result<()> {
//!     let kind = GameKind::PublicGoods;
//!     let config = ExperimentConfig::for_game(kind, 5);
//!     let registry = ServiceRegistry::new();
//!
//!     let results = run_experiments(
//!         &config,
//!         kind,
//!         &["MockModel".to_owned()],
//!         &["en".to_owned(), "vn".to_owned()],
//!         &registry,
//!     );
//!
//!     let timestamp = SystemTime::now().duration_since(UNIX_EPOCH)?.as_secs();
//!     save_results(results_file_name(kind.tag(), timestamp), &results)?;
//!     Ok(())
//! }
//! ```
//!
//! # Custom Decision Service
//!
//! ```no_run
//! use fair_game::prelude::*;
//!
//! struct Stubborn;
//!
//! impl DecisionService for Stubborn {
//!     fn respond(&mut self, _prompt: &str) -> anyhow::Result<String> {
//!         Ok("Defect".to_owned())
//!     }
//! }
//!
//! let mut registry = ServiceRegistry::new();
//! registry.register("stubborn", |_request| {
//!     let service: Box<dyn DecisionService> = Box::new(Stubborn);
//!     Ok(service)
//! });
//! ```
#![warn(missing_docs)]

pub use anyhow;
pub mod agent;
pub mod configuration;
pub mod decision;
pub mod error;
pub mod experiment;
pub mod games;
pub mod history;
mod logger;
pub mod noise;
pub mod payoff;
pub mod persistence;
mod phase_prompts;
pub mod response_parser;
mod round;
pub mod session;
pub mod template;

/// Commonly used types and traits for quick access.
///
/// Import this prelude to get started easily:
/// ```rust
/// use fair_game::prelude::*;
/// ```
///
/// Includes:
/// - [`FairGame`](crate::session::FairGame) and its [`GameSettings`](crate::configuration::GameSettings)
/// - the built-in games and experiment batches
/// - decision services and their registry
/// - results persistence
pub mod prelude {
    pub use crate::agent::Participant;
    pub use crate::configuration::{GameSettings, SanctionRules};
    pub use crate::decision::{
        CancelToken, DecisionService, FnService, PromptLog, RetryPolicy, ScriptedService,
        ServiceRegistry,
    };
    pub use crate::error::GameError;
    pub use crate::experiment::{
        experiment_key, run_experiments, run_experiments_with, BatchOptions, ExperimentConfig,
    };
    pub use crate::games::GameKind;
    pub use crate::history::{History, RoundRecord};
    pub use crate::payoff::{PayoffModel, PayoffTable, PayoffWeight, StrategyKey};
    pub use crate::persistence::{
        load_checkpoint, load_results, results_file_name, save_results, IncrementalSaver,
    };
    pub use crate::session::{FairGame, RoundObserver, StopReason};
    pub use crate::template::PromptTemplate;
}
