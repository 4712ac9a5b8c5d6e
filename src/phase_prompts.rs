//! Fixed prompts of the side phases: comprehension probe, sanctions and rationale.

use crate::configuration::SanctionRules;
use crate::payoff::PayoffModel;

/// Stored length of a probe answer, in characters.
pub const PROBE_ANSWER_LIMIT: usize = 300;
/// Stored length of a rationale, in characters.
pub const RATIONALE_LIMIT: usize = 500;

/// The three comprehension questions.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ProbeKind {
    /// Restate the payoffs.
    PayoffUnderstanding,
    /// Recall the last round.
    HistoryRecall,
    /// Restate the goal.
    StrategyUnderstanding,
}

impl ProbeKind {
    /// Asking order.
    pub const ALL: [ProbeKind; 3] = [
        ProbeKind::PayoffUnderstanding,
        ProbeKind::HistoryRecall,
        ProbeKind::StrategyUnderstanding,
    ];
}

/// Probe prompt of `kind` for `agent` at `round`.
pub fn probe_prompt(
    kind: ProbeKind,
    payoff: &PayoffModel,
    agent: &str,
    round: u32,
    transcript: &str,
) -> String {
    let options = quoted_options(payoff);
    match (payoff.language(), kind) {
        ("vn", ProbeKind::PayoffUnderstanding) => format!(
            "Bạn là {agent}, đang chơi vòng {round} của một trò chơi lặp lại với các lựa chọn {options}. \
             Bằng lời của bạn, mỗi tổ hợp lựa chọn mang lại cho bạn bao nhiêu điểm? Trả lời tối đa 3 câu."
        ),
        ("vn", ProbeKind::HistoryRecall) => format!(
            "Bạn là {agent}. Các vòng trước:\n{transcript}\n\
             Những người chơi khác đã chọn gì ở vòng gần nhất? Trả lời trong 1-2 câu."
        ),
        ("vn", ProbeKind::StrategyUnderstanding) => format!(
            "Bạn là {agent}. Mục tiêu của bạn trong trò chơi này là gì và bạn định đạt được nó như thế nào? \
             Trả lời trong 1-2 câu."
        ),
        (_, ProbeKind::PayoffUnderstanding) => format!(
            "You are {agent}, playing round {round} of a repeated game with the options {options}. \
             In your own words, how many points does each combination of choices give you? \
             Answer in at most 3 sentences."
        ),
        (_, ProbeKind::HistoryRecall) => format!(
            "You are {agent}. Previous rounds:\n{transcript}\n\
             What did the other players choose in the most recent round? Answer in 1-2 sentences."
        ),
        (_, ProbeKind::StrategyUnderstanding) => format!(
            "You are {agent}. What is your goal in this game, and how do you plan to reach it? \
             Answer in 1-2 sentences."
        ),
    }
}

/// Sanction prompt. `outcome` pairs every participant with its executed action text.
pub fn sanction_prompt(
    payoff: &PayoffModel,
    rules: &SanctionRules,
    agent: &str,
    round: u32,
    outcome: &[(&str, &str)],
) -> String {
    let results = outcome
        .iter()
        .map(|(name, action)| format!("{name}: {action}"))
        .collect::<Vec<_>>()
        .join(", ");
    let (cost, fine) = (rules.cost, rules.fine);
    match payoff.language() {
        "vn" => format!(
            "Giai đoạn lựa chọn của vòng {round} đã kết thúc.\n\
             Kết quả: {results}.\n\
             Bạn là {agent}. Bạn có thể trừng phạt những người chơi đã hành động ích kỷ.\n\
             Chi phí cho bạn: {cost} điểm. Mức phạt cho họ: {fine} điểm.\n\
             Bạn có thể trừng phạt nhiều người (ví dụ: 'Bob, Charlie') hoặc 'None'.\n\
             CHỈ xuất ra tên hoặc 'None'."
        ),
        _ => format!(
            "The choice phase for Round {round} is over.\n\
             Results: {results}.\n\
             You are {agent}. You have the option to punish players who acted selfishly (Free-riders).\n\
             Cost to you: {cost} point(s). Fine to them: {fine} point(s).\n\
             You can punish multiple people (e.g., 'Bob, Charlie') or 'None'.\n\
             Output ONLY the names or 'None'."
        ),
    }
}

/// Rationale prompt about the action `agent` chose.
pub fn rationale_prompt(payoff: &PayoffModel, agent: &str, round: u32, chosen: &str) -> String {
    match payoff.language() {
        "vn" => format!(
            "Bạn là {agent}. Ở vòng {round}, bạn đã chọn '{chosen}'. \
             Hãy giải thích lựa chọn của bạn trong 1-2 câu."
        ),
        _ => format!(
            "You are {agent}. In round {round} you chose '{chosen}'. \
             Explain your choice in 1-2 sentences."
        ),
    }
}

/// At most `limit` characters of `text`, trimmed.
pub fn truncate(text: &str, limit: usize) -> String {
    text.trim().chars().take(limit).collect()
}

fn quoted_options(payoff: &PayoffModel) -> String {
    payoff
        .strategies()
        .iter()
        .map(|s| format!("'{s}'"))
        .collect::<Vec<_>>()
        .join(" / ")
}
