//! Conditional prompt templates.
//!
//! A template mixes named slots, `{field}`, with optional regions written
//! `{regionName}: [literal content]`. Rendering first resolves every region against the
//! [`PromptContext`] flags (kept without its marker, or deleted whole), then fills the slots.
//! `{{` and `}}` produce literal braces. Region content cannot contain `]`.
//!
//! Recognized regions:
//!
//! | region          | kept when                                                        |
//! |-----------------|------------------------------------------------------------------|
//! | `intro`         | the participant has a disclosed personality                      |
//! | `opponentIntro` | it has a personality and some opponent disclosure is non-zero    |
//! | `gameLength`    | the round count is disclosed                                     |
//! | `communicate`   | communication phase                                              |
//! | `choose`        | action phase                                                     |

use std::collections::BTreeMap;

use once_cell::sync::Lazy;
use regex::{Captures, Regex};

use crate::agent::Participant;
use crate::error::GameError;
use crate::history::History;
use crate::payoff::{PayoffModel, StrategyKey};

static REGION: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?s)\{(intro|opponentIntro|gameLength|communicate|choose)\}:\s*\[(.*?)\]")
        .expect("region pattern is valid")
});

static SLOT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\{\{|\}\}|\{([A-Za-z_][A-Za-z0-9_]*)\}").expect("slot pattern is valid")
});

const MESSAGE_PREVIEW: usize = 80;

/// Which rendering of the template is requested.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Phase {
    /// Free-text message to the other participants.
    Communicate,
    /// Action elicitation.
    Choose,
}

/// Slot values and region flags for one rendering.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PromptContext {
    values: BTreeMap<String, String>,
    regions: BTreeMap<&'static str, bool>,
}

impl PromptContext {
    /// Empty context: no slot values, every region dropped.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a slot value.
    pub fn set(&mut self, field: impl Into<String>, value: impl ToString) -> &mut Self {
        self.values.insert(field.into(), value.to_string());
        self
    }

    /// Keep or drop a region.
    pub fn set_region(&mut self, region: &'static str, keep: bool) -> &mut Self {
        self.regions.insert(region, keep);
        self
    }

    /// Value of a slot.
    pub fn get(&self, field: &str) -> Option<&str> {
        self.values.get(field).map(String::as_str)
    }

    fn keeps(&self, region: &str) -> bool {
        self.regions.get(region).copied().unwrap_or(false)
    }
}

/// Everything a participant may see when prompted at `round`.
///
/// Only closed rounds of `history` reach the transcript, so no participant can see another
/// one's action for the round being played.
pub struct PromptView<'a> {
    /// Seat of the prompted participant.
    pub seat: usize,
    /// All participants, in seating order.
    pub participants: &'a [Participant],
    /// Payoff model, for strategy and weight texts.
    pub payoff: &'a PayoffModel,
    /// Ledger the transcript is drawn from.
    pub history: &'a History,
    /// Round being played.
    pub round: u32,
    /// Configured round count.
    pub n_rounds: u32,
    /// Whether the round count is disclosed.
    pub rounds_known: bool,
    /// Transcript window.
    pub window: usize,
    /// Requested rendering.
    pub phase: Phase,
}

impl PromptContext {
    /// Build the full context of a participant's prompt.
    pub fn from_view(view: &PromptView<'_>) -> Self {
        let mut ctx = Self::new();
        let me = &view.participants[view.seat];
        let personality = me.personality();
        let opponents: Vec<&Participant> = view
            .participants
            .iter()
            .enumerate()
            .filter(|(i, _)| *i != view.seat)
            .map(|(_, p)| p)
            .collect();

        ctx.set("currentPlayerName", me.name())
            .set("currentRound", view.round)
            .set("nRounds", view.n_rounds)
            .set("personality", personality.unwrap_or("None"))
            .set(
                "history",
                render_transcript(view.history, view.payoff, view.window),
            );
        for (i, text) in view.payoff.strategies().iter().enumerate() {
            ctx.set(format!("strategy{}", i + 1), text);
        }
        for (i, weight) in view.payoff.weights().iter().enumerate() {
            ctx.set(format!("weight{}", i + 1), weight.value);
        }
        for (i, opponent) in opponents.iter().enumerate() {
            ctx.set(format!("opponent{}", i + 1), opponent.name());
            ctx.set(
                format!("opponentPersonality{}", i + 1),
                opponent.personality().unwrap_or("None"),
            );
            ctx.set(
                format!("opponentPersonalityProbability{}", i + 1),
                opponent.opponent_personality_prob(),
            );
        }

        // opponents are described as soon as one of them has something to disclose
        let opponents_disclosed = opponents
            .iter()
            .any(|o| o.opponent_personality_prob() != 0 && o.personality().is_some());
        ctx.set_region("intro", personality.is_some())
            .set_region("opponentIntro", opponents_disclosed)
            .set_region("gameLength", view.rounds_known)
            .set_region("communicate", view.phase == Phase::Communicate)
            .set_region("choose", view.phase == Phase::Choose);
        ctx
    }
}

/// A parsed prompt template.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PromptTemplate {
    text: String,
}

impl PromptTemplate {
    /// Wrap template text.
    pub fn new(text: impl Into<String>) -> Self {
        Self { text: text.into() }
    }

    /// Raw template text.
    pub fn text(&self) -> &str {
        &self.text
    }

    /// Resolve regions, then substitute every slot.
    ///
    /// # Errors
    /// [`GameError::TemplateFieldMissing`] for the first slot without a value.
    pub fn render(&self, ctx: &PromptContext) -> Result<String, GameError> {
        let resolved = REGION.replace_all(&self.text, |caps: &Captures<'_>| {
            if ctx.keeps(&caps[1]) {
                caps[2].to_owned()
            } else {
                String::new()
            }
        });

        let mut out = String::with_capacity(resolved.len());
        let mut last = 0;
        for caps in SLOT.captures_iter(&resolved) {
            let Some(whole) = caps.get(0) else { continue };
            out.push_str(&resolved[last..whole.start()]);
            match caps.get(1) {
                Some(field) => {
                    let value = ctx
                        .get(field.as_str())
                        .ok_or_else(|| GameError::TemplateFieldMissing(field.as_str().to_owned()))?;
                    out.push_str(value);
                }
                None => out.push_str(&whole.as_str()[..1]),
            }
            last = whole.end();
        }
        out.push_str(&resolved[last..]);
        Ok(out)
    }
}

/// Compact transcript of the last `window` closed rounds, one line per round.
///
/// `Round 2: Alice=C, Bob=D, Charlie=C | Alice: "let's all cooperate"`
pub fn render_transcript(history: &History, payoff: &PayoffModel, window: usize) -> String {
    let recent = history.recent(window);
    let (round_word, empty) = match payoff.language() {
        "vn" => ("Vòng", "Chưa có vòng nào được chơi."),
        _ => ("Round", "No rounds played yet."),
    };
    if recent.is_empty() {
        return empty.to_owned();
    }

    let legend = payoff
        .strategy_keys()
        .map(|k| format!("{} = {}", k.code(), payoff.strategy_text(k)))
        .collect::<Vec<_>>()
        .join(", ");
    let mut lines = vec![format!("({legend})")];
    for (n, records) in recent {
        let actions = records
            .iter()
            .map(|r| {
                let code = r
                    .strategy
                    .as_deref()
                    .and_then(|s| payoff.strategies().iter().position(|t| t == s))
                    .map_or('?', |i| StrategyKey(i).code());
                format!("{}={code}", r.agent)
            })
            .collect::<Vec<_>>()
            .join(", ");
        let messages = records
            .iter()
            .filter_map(|r| {
                r.message
                    .as_deref()
                    .map(|m| format!("{}: \"{}\"", r.agent, preview(m)))
            })
            .collect::<Vec<_>>();
        if messages.is_empty() {
            lines.push(format!("{round_word} {n}: {actions}"));
        } else {
            lines.push(format!("{round_word} {n}: {actions} | {}", messages.join(" | ")));
        }
    }
    lines.join("\n")
}

fn preview(message: &str) -> String {
    let flat = message.split_whitespace().collect::<Vec<_>>().join(" ");
    if flat.chars().count() <= MESSAGE_PREVIEW {
        flat
    } else {
        let cut: String = flat.chars().take(MESSAGE_PREVIEW).collect();
        format!("{cut}...")
    }
}
