//! Saved results and per-round checkpoints.
//!
//! Results are a `{experiment id: {description, history[, error]}}` JSON document, pretty
//! printed, with non-ASCII text kept as is.

use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use anyhow::Context;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::history::History;
use crate::session::RoundObserver;

/// Outcome of one session in a batch.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExperimentRecord {
    /// Session name.
    pub description: String,
    /// Closed rounds, possibly partial when `error` is set.
    pub history: History,
    /// Why the session stopped early.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Experiment identifier to record.
pub type ExperimentResults = BTreeMap<String, ExperimentRecord>;

/// `experiment_results_<GAME>_<timestamp>.json`
pub fn results_file_name(game_tag: &str, timestamp: u64) -> String {
    format!("experiment_results_{game_tag}_{timestamp}.json")
}

/// Write `value` as pretty JSON to a sibling temporary file, then move it over `path`.
fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> anyhow::Result<()> {
    let tmp = path.with_extension("json.tmp");
    {
        let file = File::create(&tmp)
            .with_context(|| format!("could not create {}", tmp.display()))?;
        let mut writer = BufWriter::new(file);
        serde_json::to_writer_pretty(&mut writer, value)
            .with_context(|| format!("could not serialize into {}", tmp.display()))?;
        writer.flush()?;
    }
    fs::rename(&tmp, path)
        .with_context(|| format!("could not move {} to {}", tmp.display(), path.display()))
}

/// Save a batch of results.
pub fn save_results(path: impl AsRef<Path>, results: &ExperimentResults) -> anyhow::Result<()> {
    let path = path.as_ref();
    write_json(path, results)?;
    debug!(path = %path.display(), experiments = results.len(), "results saved");
    Ok(())
}

/// Load a batch of results. Histories with gaps in their rounds are rejected.
pub fn load_results(path: impl AsRef<Path>) -> anyhow::Result<ExperimentResults> {
    let path = path.as_ref();
    let file = File::open(path).with_context(|| format!("could not open {}", path.display()))?;
    serde_json::from_reader(BufReader::new(file))
        .with_context(|| format!("invalid results file {}", path.display()))
}

/// Snapshot written after every closed round.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Checkpoint {
    /// Session name.
    pub description: String,
    /// Last closed round.
    pub current_round: u32,
    /// Every closed round.
    pub history: History,
}

#[derive(Serialize)]
struct CheckpointRef<'a> {
    description: &'a str,
    current_round: u32,
    history: &'a History,
}

/// Read a checkpoint written by [`IncrementalSaver`].
pub fn load_checkpoint(path: impl AsRef<Path>) -> anyhow::Result<Checkpoint> {
    let path = path.as_ref();
    let file = File::open(path).with_context(|| format!("could not open {}", path.display()))?;
    serde_json::from_reader(BufReader::new(file))
        .with_context(|| format!("invalid checkpoint {}", path.display()))
}

/// Round observer rewriting a [`Checkpoint`] file after every closed round.
#[derive(Clone, Debug)]
pub struct IncrementalSaver {
    path: PathBuf,
}

impl IncrementalSaver {
    /// Checkpoint into `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Target file.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl RoundObserver for IncrementalSaver {
    fn on_round_closed(&mut self, game: &str, round: u32, history: &History) -> anyhow::Result<()> {
        write_json(
            &self.path,
            &CheckpointRef {
                description: game,
                current_round: round,
                history,
            },
        )?;
        debug!(path = %self.path.display(), round, "checkpoint written");
        Ok(())
    }
}
