//! Free-text answer parsing.
//!
//! Action answers go through three patterns in priority order, every strategy being tried in
//! declaration order within a pattern:
//!
//! 1. a labelled answer (`A: Defect`, `Choice: Defect`, ...),
//! 2. a whole-word mention,
//! 3. a case-insensitive substring.
//!
//! When nothing matches, the first declared strategy is used. This biases ambiguous answers
//! toward that strategy; callers log it.

use regex::Regex;

use crate::payoff::StrategyKey;

const LABELS: &str = "a|answer|final answer|choice|decision|action|strategy|response|trả lời|câu trả lời|lựa chọn|chiến lược";

/// Prefix length searched for an explicit "none" in sanction answers.
pub const NONE_PREFIX: usize = 20;

/// Which pattern resolved an action answer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MatchKind {
    /// `label: value`.
    Labelled,
    /// Whole-word mention.
    WholeWord,
    /// Substring fallback.
    Substring,
    /// Nothing matched, first strategy used.
    Default,
}

/// Result of [`parse_action`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ParsedAction {
    /// Intended strategy.
    pub key: StrategyKey,
    /// How it was found.
    pub matched_by: MatchKind,
}

impl ParsedAction {
    /// True when no pattern matched.
    pub fn is_default(&self) -> bool {
        self.matched_by == MatchKind::Default
    }
}

#[derive(Clone, Debug)]
struct StrategyPatterns {
    key: StrategyKey,
    lower: String,
    labelled: Regex,
    whole_word: Regex,
}

/// Action patterns compiled once for a vocabulary.
#[derive(Clone, Debug)]
pub struct ActionParser {
    patterns: Vec<StrategyPatterns>,
}

impl ActionParser {
    /// Compile the patterns of every non-empty strategy text.
    pub fn new(strategies: &[String]) -> Result<Self, regex::Error> {
        let mut patterns = Vec::with_capacity(strategies.len());
        for (i, text) in strategies.iter().enumerate() {
            if text.is_empty() {
                continue;
            }
            let lower = text.to_lowercase();
            let escaped = regex::escape(&lower);
            patterns.push(StrategyPatterns {
                key: StrategyKey(i),
                labelled: Regex::new(&format!(
                    r"\b(?:{LABELS})\s*:\s*[*'\x22\[]*\s*{escaped}\b"
                ))?,
                whole_word: Regex::new(&format!(r"\b{escaped}\b"))?,
                lower,
            });
        }
        Ok(Self { patterns })
    }

    /// Extract the intended strategy from `response`.
    pub fn parse(&self, response: &str) -> ParsedAction {
        let lower = response.to_lowercase();
        let find = |matched_by: MatchKind, test: &dyn Fn(&StrategyPatterns) -> bool| {
            self.patterns.iter().find(|p| test(p)).map(|p| ParsedAction {
                key: p.key,
                matched_by,
            })
        };

        find(MatchKind::Labelled, &|p| p.labelled.is_match(&lower))
            .or_else(|| find(MatchKind::WholeWord, &|p| p.whole_word.is_match(&lower)))
            .or_else(|| find(MatchKind::Substring, &|p| lower.contains(&p.lower)))
            .unwrap_or(ParsedAction {
                key: StrategyKey::FIRST,
                matched_by: MatchKind::Default,
            })
    }
}

/// One-shot [`ActionParser::parse`]. `strategies` are display texts.
pub fn parse_action(response: &str, strategies: &[String]) -> ParsedAction {
    match ActionParser::new(strategies) {
        Ok(parser) => parser.parse(response),
        Err(_) => ParsedAction {
            key: StrategyKey::FIRST,
            matched_by: MatchKind::Default,
        },
    }
}

/// Name patterns of a seating, compiled once.
#[derive(Clone, Debug)]
pub struct SanctionParser {
    names: Vec<(String, Regex)>,
}

impl SanctionParser {
    /// Compile a case-insensitive whole-word pattern per name, in seating order.
    pub fn new(names: &[String]) -> Result<Self, regex::Error> {
        let names: Vec<(String, Regex)> = names
            .iter()
            .map(|name| {
                let re = Regex::new(&format!(r"(?i)\b{}\b", regex::escape(name)))?;
                Ok((name.clone(), re))
            })
            .collect::<Result<_, regex::Error>>()?;
        Ok(Self { names })
    }

    /// Peers named in a sanction answer, in seating order.
    ///
    /// An answer whose first [`NONE_PREFIX`] characters contain "none" sanctions nobody.
    /// Otherwise every name other than `own_name` that appears as a whole word,
    /// case-insensitively, is returned once.
    pub fn targets(&self, response: &str, own_name: &str) -> Vec<String> {
        let prefix = response.chars().take(NONE_PREFIX).collect::<String>().to_lowercase();
        if prefix.contains("none") || prefix.contains("không ai") {
            return vec![];
        }
        let mut targets: Vec<String> = vec![];
        for (name, re) in &self.names {
            if name == own_name || targets.contains(name) {
                continue;
            }
            if re.is_match(response) {
                targets.push(name.clone());
            }
        }
        targets
    }
}

/// One-shot [`SanctionParser::targets`].
pub fn parse_sanction_targets(response: &str, own_name: &str, names: &[String]) -> Vec<String> {
    SanctionParser::new(names)
        .map(|parser| parser.targets(response, own_name))
        .unwrap_or_default()
}

#[cfg(test)]
mod parser_tests {
    use super::*;

    fn pd() -> Vec<String> {
        vec!["Cooperate".to_owned(), "Defect".to_owned()]
    }

    #[test]
    fn action_answers() {
        let cases = [
            ("Cooperate", 0, MatchKind::WholeWord),
            ("A: Cooperate", 0, MatchKind::Labelled),
            ("I choose to Cooperate based on...", 0, MatchKind::WholeWord),
            ("Defect", 1, MatchKind::WholeWord),
            ("My choice is Defect.", 1, MatchKind::WholeWord),
            ("The cooperation strategy seems best. Cooperate.", 0, MatchKind::WholeWord),
            ("Cooperate\nDefect", 0, MatchKind::WholeWord),
            ("Uncooperateable", 0, MatchKind::Substring),
            ("**Choice:** defect", 1, MatchKind::Labelled),
        ];
        for (response, index, kind) in cases {
            let parsed = parse_action(response, &pd());
            assert_eq!(parsed.key, StrategyKey(index), "{response}");
            assert_eq!(parsed.matched_by, kind, "{response}");
        }
    }

    #[test]
    fn label_beats_earlier_mentions() {
        let parsed = parse_action("Cooperate would be nice, but answer: Defect", &pd());
        assert_eq!(parsed.key, StrategyKey(1));
        assert_eq!(parsed.matched_by, MatchKind::Labelled);
    }

    #[test]
    fn unparsable_defaults_to_first() {
        let parsed = parse_action("xyz", &pd());
        assert_eq!(parsed.key, StrategyKey::FIRST);
        assert!(parsed.is_default());
        assert!(parse_action("", &pd()).is_default());
    }

    #[test]
    fn vietnamese_vocabulary() {
        let vn = vec!["Hợp tác".to_owned(), "Phản bội".to_owned()];
        assert_eq!(parse_action("Tôi chọn PHẢN BỘI.", &vn).key, StrategyKey(1));
        assert_eq!(
            parse_action("Lựa chọn: Hợp tác", &vn).matched_by,
            MatchKind::Labelled
        );
    }

    #[test]
    fn sanction_answers() {
        let names: Vec<String> = ["Alice", "Bob", "Charlie"].map(String::from).to_vec();
        let cases: [(&str, &[&str]); 10] = [
            ("None", &[]),
            ("none", &[]),
            ("None.", &[]),
            ("Bob", &["Bob"]),
            ("Bob, Charlie", &["Bob", "Charlie"]),
            ("I will punish Bob for defecting", &["Bob"]),
            ("Alice cooperated, so I'll punish Charlie", &["Charlie"]),
            ("Everyone cooperated. None", &[]),
            (
                "I think Alice did well but Bob and Charlie deserve punishment",
                &["Bob", "Charlie"],
            ),
            ("No one to punish", &[]),
        ];
        for (response, expected) in cases {
            assert_eq!(
                parse_sanction_targets(response, "Alice", &names),
                expected,
                "{response}"
            );
        }
    }

    #[test]
    fn sanction_names_are_whole_words_and_deduplicated() {
        let names: Vec<String> = ["Alice", "Bob", "Bob"].map(String::from).to_vec();
        assert_eq!(parse_sanction_targets("bob, BOB and Bobby", "Alice", &names), ["Bob"]);
        assert!(parse_sanction_targets("Bobby", "Alice", &names).is_empty());
    }

    #[test]
    fn compiled_parsers_are_reusable() {
        let parser = ActionParser::new(&pd()).unwrap();
        assert_eq!(parser.parse("Defect").key, StrategyKey(1));
        assert_eq!(parser.parse("answer: Cooperate").matched_by, MatchKind::Labelled);
        assert!(parser.parse("pass").is_default());

        let names: Vec<String> = ["Alice", "Bob", "Charlie"].map(String::from).to_vec();
        let sanctions = SanctionParser::new(&names).unwrap();
        assert_eq!(sanctions.targets("Charlie and alice", "Bob"), ["Alice", "Charlie"]);
        assert_eq!(sanctions.targets("Charlie and alice", "Alice"), ["Charlie"]);
        assert!(sanctions.targets("None, not even Charlie", "Bob").is_empty());
    }
}
