//! Built-in three-player social dilemmas.
//!
//! Each [`GameKind`] ships a payoff table (English and Vietnamese vocabularies) and a prompt
//! template per language, written in the region syntax understood by [`crate::template`].

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use anyhow::bail;

use crate::payoff::{PayoffTable, PayoffWeight, StrategyKey};

/// Seats in every built-in game.
pub const PLAYERS: usize = 3;

/// Default participant names.
pub const DEFAULT_AGENTS: [&str; PLAYERS] = ["Alice", "Bob", "Charlie"];

/// The games shipped with the engine.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum GameKind {
    /// Triadic Prisoner's Dilemma.
    PrisonersDilemma,
    /// Public Goods Game, usually played with sanctions.
    PublicGoods,
    /// Volunteer's Dilemma.
    VolunteersDilemma,
}

impl GameKind {
    /// Short tag used in experiment identifiers.
    pub fn tag(self) -> &'static str {
        match self {
            GameKind::PrisonersDilemma => "PD",
            GameKind::PublicGoods => "PGG",
            GameKind::VolunteersDilemma => "VD",
        }
    }

    /// Human readable description stored next to each history.
    pub fn description(self) -> &'static str {
        match self {
            GameKind::PrisonersDilemma => "Triadic Prisoner's Dilemma",
            GameKind::PublicGoods => "Public Goods Game (3-Player)",
            GameKind::VolunteersDilemma => "Volunteer's Dilemma (3-Player)",
        }
    }

    /// Whether the sanctioning sub-phase is on unless overridden.
    pub fn sanctions_by_default(self) -> bool {
        matches!(self, GameKind::PublicGoods)
    }

    /// The full payoff table of the game.
    pub fn payoff_table(self) -> PayoffTable {
        match self {
            GameKind::PrisonersDilemma => PayoffTable::from_rule(
                PLAYERS,
                vec![
                    PayoffWeight::new("Reward", 7),
                    PayoffWeight::new("Temptation", 9),
                    PayoffWeight::new("Sucker", 0),
                    PayoffWeight::new("Punishment", 1),
                    PayoffWeight::new("LoneSucker", 0),
                    PayoffWeight::new("Exploiter", 5),
                ],
                vocabularies(("Cooperate", "Defect"), ("Hợp tác", "Phản bội")),
                |actions, seat| {
                    let label = match (defectors(actions), actions[seat].index()) {
                        (0, _) => "Reward",
                        (n, _) if n == actions.len() => "Punishment",
                        (1, 1) => "Temptation",
                        (_, 1) => "Exploiter",
                        _ => "Sucker",
                    };
                    label.to_owned()
                },
            ),
            GameKind::PublicGoods => PayoffTable::from_rule(
                PLAYERS,
                vec![
                    PayoffWeight::new("GlobalWin", 10),
                    PayoffWeight::new("FreeRide", 12),
                    PayoffWeight::new("Sucker", 2),
                    PayoffWeight::new("PartialC", 6),
                    PayoffWeight::new("PartialD", 8),
                    PayoffWeight::new("AllDefect", 4),
                ],
                vocabularies(("Contribute", "Keep"), ("Đóng góp", "Giữ lại")),
                |actions, seat| {
                    let label = match (defectors(actions), actions[seat].index()) {
                        (0, _) => "GlobalWin",
                        (n, _) if n == actions.len() => "AllDefect",
                        (_, 1) => "FreeRide",
                        _ => "Sucker",
                    };
                    label.to_owned()
                },
            ),
            GameKind::VolunteersDilemma => PayoffTable::from_rule(
                PLAYERS,
                vec![
                    PayoffWeight::new("VolunteerNet", 80),
                    PayoffWeight::new("FreeRide", 100),
                    PayoffWeight::new("Disaster", -100),
                ],
                vocabularies(("Volunteer", "Ignore"), ("Tình nguyện", "Làm ngơ")),
                |actions, seat| {
                    let label = match (defectors(actions), actions[seat].index()) {
                        (n, _) if n == actions.len() => "Disaster",
                        (_, 0) => "VolunteerNet",
                        _ => "FreeRide",
                    };
                    label.to_owned()
                },
            ),
        }
    }

    /// Prompt template for `language`, if the game ships one.
    pub fn template(self, language: &str) -> Option<&'static str> {
        match (self, language) {
            (GameKind::PrisonersDilemma, "en") => Some(PD_EN),
            (GameKind::PrisonersDilemma, "vn") => Some(PD_VN),
            (GameKind::PublicGoods, "en") => Some(PGG_EN),
            (GameKind::PublicGoods, "vn") => Some(PGG_VN),
            (GameKind::VolunteersDilemma, "en") => Some(VD_EN),
            (GameKind::VolunteersDilemma, "vn") => Some(VD_VN),
            _ => None,
        }
    }

    /// Default personalities of the three seats, per language.
    pub fn default_personalities(language: &str) -> [&'static str; PLAYERS] {
        match language {
            "vn" => ["Hợp tác", "Ích kỷ", "Ăn miếng trả miếng"],
            _ => ["Cooperative", "Selfish", "Tit-for-Tat"],
        }
    }
}

impl fmt::Display for GameKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

impl FromStr for GameKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "PD" => Ok(GameKind::PrisonersDilemma),
            "PGG" => Ok(GameKind::PublicGoods),
            "VD" => Ok(GameKind::VolunteersDilemma),
            other => bail!("unknown game '{other}', expected one of PD, PGG, VD"),
        }
    }
}

fn defectors(actions: &[StrategyKey]) -> usize {
    actions.iter().filter(|k| k.index() == 1).count()
}

fn vocabularies(en: (&str, &str), vn: (&str, &str)) -> BTreeMap<String, Vec<String>> {
    BTreeMap::from([
        ("en".to_owned(), vec![en.0.to_owned(), en.1.to_owned()]),
        ("vn".to_owned(), vec![vn.0.to_owned(), vn.1.to_owned()]),
    ])
}

const PD_EN: &str = "
You are {currentPlayerName}. You are playing a game with {opponent1} and {opponent2}.
{intro}: [Your personality is: {personality}.]
{opponentIntro}: [You know that {opponent1} has a {opponentPersonalityProbability1}% chance of being {opponentPersonality1}, and {opponent2} has a {opponentPersonalityProbability2}% chance of being {opponentPersonality2}.]

The game proceeds in rounds.
{gameLength}: [There are {nRounds} rounds in total.]
Current Round: {currentRound}.

Each round you must choose between two options: '{strategy1}' or '{strategy2}'.

Payoff Rules:
- If everyone chooses '{strategy1}', everyone gets {weight1}.
- If you alone choose '{strategy2}', you get {weight2} and the others get {weight3}.
- If two players choose '{strategy2}', they get {weight6} each and the other gets {weight3}.
- If everyone chooses '{strategy2}', everyone gets {weight4}.

History of previous rounds:
{history}

Your goal is to maximize your own score over the long run.
{communicate}: [Before anyone chooses, write ONE short message to the other players. Output ONLY the message.]
{choose}: [Respond with EXACTLY one word: '{strategy1}' or '{strategy2}'.
Your response:]
";

const PD_VN: &str = "
Bạn là {currentPlayerName}. Bạn đang tham gia một trò chơi cùng với {opponent1} và {opponent2}.
{intro}: [Tính cách của bạn là: {personality}.]
{opponentIntro}: [Bạn biết rằng {opponent1} có {opponentPersonalityProbability1}% khả năng là người {opponentPersonality1}, và {opponent2} có {opponentPersonalityProbability2}% khả năng là người {opponentPersonality2}.]

Trò chơi diễn ra theo nhiều vòng.
{gameLength}: [Tổng cộng có {nRounds} vòng.]
Vòng hiện tại: {currentRound}.

Mỗi vòng bạn phải chọn giữa hai phương án: '{strategy1}' hoặc '{strategy2}'.

Quy tắc trả thưởng:
- Nếu tất cả cùng chọn '{strategy1}', mỗi người nhận được {weight1}.
- Nếu chỉ mình bạn chọn '{strategy2}', bạn nhận {weight2} và những người khác nhận {weight3}.
- Nếu hai người chọn '{strategy2}', mỗi người nhận {weight6} và người còn lại nhận {weight3}.
- Nếu tất cả cùng chọn '{strategy2}', mỗi người nhận được {weight4}.

Lịch sử các vòng trước:
{history}

Mục tiêu của bạn là tối đa hóa điểm số của mình trong dài hạn.
{communicate}: [Trước khi chọn, hãy viết MỘT tin nhắn ngắn cho những người chơi khác. CHỈ xuất ra tin nhắn.]
{choose}: [Trả lời bằng CHÍNH XÁC một từ: '{strategy1}' hoặc '{strategy2}'.
Câu trả lời của bạn:]
";

const PGG_EN: &str = "
You are {currentPlayerName}. You are a participant in a game with {opponent1} and {opponent2}.
{intro}: [Your personality is: {personality}.]
{opponentIntro}: [You know that {opponent1} has a {opponentPersonalityProbability1}% chance of being {opponentPersonality1}, and {opponent2} has a {opponentPersonalityProbability2}% chance of being {opponentPersonality2}.]

The game proceeds in rounds.
{gameLength}: [There are {nRounds} rounds in total.]
Current Round: {currentRound}.

Each round you either '{strategy1}' to the common pool or '{strategy2}' your endowment.

Payoff Rules:
- If everyone chooses '{strategy1}', everyone gets {weight1}.
- Whoever chooses '{strategy2}' while someone contributes gets {weight2} (Free rider); contributors then get {weight3} (Sucker).
- If everyone chooses '{strategy2}', everyone gets {weight6}.

History of previous rounds:
{history}

Your goal is to maximize your own score over the long run.
{communicate}: [Before anyone chooses, write ONE short message to the other players. Output ONLY the message.]
{choose}: [Respond with EXACTLY one word: '{strategy1}' or '{strategy2}'.
Your response:]
";

const PGG_VN: &str = "
Bạn là {currentPlayerName}. Bạn đang tham gia một trò chơi cùng với {opponent1} và {opponent2}.
{intro}: [Tính cách của bạn là: {personality}.]
{opponentIntro}: [Bạn biết rằng {opponent1} có {opponentPersonalityProbability1}% khả năng là người {opponentPersonality1}, và {opponent2} có {opponentPersonalityProbability2}% khả năng là người {opponentPersonality2}.]

Trò chơi diễn ra theo nhiều vòng.
{gameLength}: [Tổng cộng có {nRounds} vòng.]
Vòng hiện tại: {currentRound}.

Mỗi vòng bạn chọn '{strategy1}' vào quỹ chung hoặc '{strategy2}' phần của mình.

Quy tắc trả thưởng:
- Nếu tất cả cùng chọn '{strategy1}', mỗi người nhận được {weight1}.
- Người chọn '{strategy2}' trong khi có người đóng góp nhận {weight2} (Hưởng lợi miễn phí); người đóng góp nhận {weight3} (Người chịu thiệt).
- Nếu tất cả cùng chọn '{strategy2}', mỗi người nhận được {weight6}.

Lịch sử các vòng trước:
{history}

Mục tiêu của bạn là tối đa hóa điểm số của mình trong dài hạn.
{communicate}: [Trước khi chọn, hãy viết MỘT tin nhắn ngắn cho những người chơi khác. CHỈ xuất ra tin nhắn.]
{choose}: [Trả lời bằng CHÍNH XÁC một từ: '{strategy1}' hoặc '{strategy2}'.
Câu trả lời của bạn:]
";

const VD_EN: &str = "
You are {currentPlayerName}. Your opponents are {opponent1} and {opponent2}.
{intro}: [You are {personality}.]
{opponentIntro}: [{opponent1} has a probability of {opponentPersonalityProbability1}% of being {opponentPersonality1}, {opponent2} has a probability of {opponentPersonalityProbability2}% of being {opponentPersonality2}.]

The three of you are in a critical situation. If at least one person volunteers, the group is safe, but the volunteer pays a cost. If no one volunteers, everyone suffers a much heavier penalty. You cannot coordinate your choices.

Each round, choose between '{strategy1}' and '{strategy2}'.
{gameLength}: [There are {nRounds} rounds.]
Current Round: {currentRound}.

Outcomes:
- If at least one person chooses {strategy1}: volunteers get {weight1}, the others get {weight2}.
- If NO ONE chooses {strategy1}: everyone gets {weight3}.

Goal: Maximize your personal outcome.
History:
{history}
{communicate}: [Before anyone chooses, write ONE short message to the other players. Output ONLY the message.]
{choose}: [Respond with EXACTLY one word: '{strategy1}' or '{strategy2}'.
Your response:]
";

const VD_VN: &str = "
Bạn là {currentPlayerName}. Đối thủ của bạn là {opponent1} và {opponent2}.
{intro}: [Bạn là người có tính cách: {personality}.]
{opponentIntro}: [{opponent1} có {opponentPersonalityProbability1}% khả năng là {opponentPersonality1}, {opponent2} có {opponentPersonalityProbability2}% khả năng là {opponentPersonality2}.]

Ba người các bạn đang trong tình thế nguy cấp. Nếu có ÍT NHẤT một người tình nguyện, cả nhóm sẽ an toàn, nhưng người tình nguyện phải trả một cái giá. Nếu không ai tình nguyện, tất cả sẽ chịu phạt nặng. Các bạn không thể bàn bạc trước.

Mỗi vòng, các bạn chọn giữa '{strategy1}' và '{strategy2}'.
{gameLength}: [Có {nRounds} vòng.]
Vòng hiện tại: {currentRound}.

Kết quả như sau:
- Nếu có ít nhất 1 người chọn {strategy1}: người tình nguyện nhận {weight1}, những người khác nhận {weight2}.
- Nếu KHÔNG AI chọn {strategy1}: tất cả nhận {weight3}.

Mục tiêu: Tối đa hóa lợi ích cá nhân.
Lịch sử:
{history}
{communicate}: [Trước khi chọn, hãy viết MỘT tin nhắn ngắn cho những người chơi khác. CHỈ xuất ra tin nhắn.]
{choose}: [Trả lời bằng CHÍNH XÁC một từ: '{strategy1}' hoặc '{strategy2}'.
Câu trả lời của bạn:]
";
