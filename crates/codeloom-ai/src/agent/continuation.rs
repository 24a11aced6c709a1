//! Narration-versus-answer heuristic.
//!
//! Some models describe the next step ("Let me check the tests...") instead of
//! emitting a tool call. When that happens right after tool results came back,
//! the conversation loop nudges the model to keep going rather than treating
//! the narration as the final answer.

use std::collections::BTreeSet;

use regex::Regex;

const STARTING_PHRASES: &[&str] = &[
    "let me",
    "now let me",
    "let's",
    "i'll",
    "i will",
    "i'm going to",
    "i am going to",
    "i need to",
    "i should",
    "now i",
    "next, i",
    "first, i",
];

const CONCLUSIVE_PHRASES: &[&str] = &[
    "in summary",
    "to summarize",
    "in conclusion",
    "to conclude",
    "overall,",
    "all done",
    "task is complete",
    "has been completed",
    "i've completed",
    "let me know if",
    "hope this helps",
    "is there anything else",
];

const ACTION_VERBS: &[&str] = &[
    "check",
    "search",
    "look",
    "read",
    "examine",
    "analyze",
    "find",
    "investigate",
    "explore",
    "review",
    "run",
    "create",
    "update",
    "write",
    "fix",
    "implement",
    "open",
    "list",
    "inspect",
    "verify",
];

/// Tunables for [`ContinuationDetector`].
#[derive(Debug, Clone)]
pub struct ContinuationConfig {
    /// Trimmed texts shorter than this never continue.
    pub min_length: usize,
    /// Trimmed texts longer than this are treated as complete answers.
    pub max_length: usize,
    pub threshold: f32,
    pub starting_phrases: Vec<String>,
    pub conclusive_phrases: Vec<String>,
    pub action_verbs: Vec<String>,
}

impl Default for ContinuationConfig {
    fn default() -> Self {
        Self {
            min_length: 10,
            max_length: 1000,
            threshold: 0.4,
            starting_phrases: STARTING_PHRASES.iter().map(|s| s.to_string()).collect(),
            conclusive_phrases: CONCLUSIVE_PHRASES.iter().map(|s| s.to_string()).collect(),
            action_verbs: ACTION_VERBS.iter().map(|s| s.to_string()).collect(),
        }
    }
}

impl ContinuationConfig {
    pub fn with_lengths(mut self, min_length: usize, max_length: usize) -> Self {
        self.min_length = min_length;
        self.max_length = max_length;
        self
    }

    pub fn with_threshold(mut self, threshold: f32) -> Self {
        self.threshold = threshold;
        self
    }
}

/// Outcome of [`ContinuationDetector::detect`].
#[derive(Debug, Clone, PartialEq)]
pub struct ContinuationDecision {
    pub should_continue: bool,
    pub confidence: f32,
    pub detected_patterns: Vec<String>,
    pub reason: String,
}

impl ContinuationDecision {
    fn rejected(reason: impl Into<String>) -> Self {
        Self {
            should_continue: false,
            confidence: 0.0,
            detected_patterns: Vec::new(),
            reason: reason.into(),
        }
    }
}

const CONCLUSIVE_WEIGHT: f32 = -0.6;
const STARTING_WEIGHT: f32 = 0.5;
const ACTION_VERB_WEIGHT: f32 = 0.15;
const ACTION_VERB_CAP: f32 = 0.3;
const RECENT_TOOLS_WEIGHT: f32 = 0.3;
const TRAILING_COLON_WEIGHT: f32 = 0.2;
const TRAILING_ELLIPSIS_WEIGHT: f32 = 0.2;
const QUESTION_WEIGHT: f32 = -0.2;

pub struct ContinuationDetector {
    config: ContinuationConfig,
    verbs: Option<Regex>,
}

impl ContinuationDetector {
    pub fn new(config: ContinuationConfig) -> Self {
        let verbs = if config.action_verbs.is_empty() {
            None
        } else {
            let alternation = config
                .action_verbs
                .iter()
                .map(|verb| regex::escape(&verb.to_lowercase()))
                .collect::<Vec<_>>()
                .join("|");
            Regex::new(&format!(r"\b(?:{alternation})\b")).ok()
        };
        Self { config, verbs }
    }

    pub fn config(&self) -> &ContinuationConfig {
        &self.config
    }

    pub fn detect(&self, text: &str, had_recent_tool_results: bool) -> ContinuationDecision {
        let trimmed = text.trim();
        let length = trimmed.chars().count();
        if length < self.config.min_length {
            return ContinuationDecision::rejected(format!(
                "too short ({length} < {})",
                self.config.min_length
            ));
        }
        if length > self.config.max_length {
            return ContinuationDecision::rejected(format!(
                "too long ({length} > {}), treated as a complete answer",
                self.config.max_length
            ));
        }

        let lower = trimmed.to_lowercase();
        let mut score = 0.0f32;
        let mut patterns = Vec::new();

        if let Some(phrase) = self
            .config
            .conclusive_phrases
            .iter()
            .find(|phrase| lower.contains(phrase.as_str()))
        {
            score += CONCLUSIVE_WEIGHT;
            patterns.push(format!("conclusive:{phrase}"));
        }

        if let Some(phrase) = self
            .config
            .starting_phrases
            .iter()
            .find(|phrase| starts_with_phrase(&lower, phrase))
        {
            score += STARTING_WEIGHT;
            patterns.push(format!("starting:{phrase}"));
        }

        if let Some(verbs) = &self.verbs {
            let matched: BTreeSet<&str> = verbs.find_iter(&lower).map(|m| m.as_str()).collect();
            if !matched.is_empty() {
                score += (matched.len() as f32 * ACTION_VERB_WEIGHT).min(ACTION_VERB_CAP);
                patterns.extend(matched.iter().map(|verb| format!("action:{verb}")));
            }
        }

        if had_recent_tool_results {
            score += RECENT_TOOLS_WEIGHT;
            patterns.push("recent_tool_results".to_string());
        }

        if trimmed.ends_with("...") || trimmed.ends_with('…') {
            score += TRAILING_ELLIPSIS_WEIGHT;
            patterns.push("trailing_ellipsis".to_string());
        } else if trimmed.ends_with(':') {
            score += TRAILING_COLON_WEIGHT;
            patterns.push("trailing_colon".to_string());
        }

        if trimmed.contains('?') {
            score += QUESTION_WEIGHT;
            patterns.push("question".to_string());
        }

        let confidence = score.clamp(0.0, 1.0);
        let should_continue = confidence >= self.config.threshold;
        let comparison = if should_continue { ">=" } else { "<" };

        ContinuationDecision {
            should_continue,
            confidence,
            detected_patterns: patterns,
            reason: format!(
                "score {confidence:.2} {comparison} threshold {:.2}",
                self.config.threshold
            ),
        }
    }
}

impl Default for ContinuationDetector {
    fn default() -> Self {
        Self::new(ContinuationConfig::default())
    }
}

/// Phrase at the very start, ending on a word boundary.
fn starts_with_phrase(lower: &str, phrase: &str) -> bool {
    let Some(rest) = lower.strip_prefix(phrase) else {
        return false;
    };
    rest.chars()
        .next()
        .is_none_or(|ch| !ch.is_alphanumeric())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn detector() -> ContinuationDetector {
        ContinuationDetector::default()
    }

    #[test]
    fn test_narration_after_tools_continues() {
        let decision = detector().detect("Let me check the files...", true);
        assert!(decision.should_continue);
        assert!(decision.confidence >= 0.7);
        assert!(decision.detected_patterns.contains(&"starting:let me".to_string()));
        assert!(decision.detected_patterns.contains(&"trailing_ellipsis".to_string()));
    }

    #[test]
    fn test_summary_stops() {
        let decision = detector().detect("In summary, the task is done.", false);
        assert!(!decision.should_continue);
        assert_eq!(decision.confidence, 0.0);
    }

    #[test]
    fn test_conclusive_beats_starting_phrase() {
        let decision = detector().detect(
            "Let me know if you want me to check anything else.",
            true,
        );
        assert!(!decision.should_continue);
    }

    #[test]
    fn test_length_bounds() {
        let short = detector().detect("  ok  ", true);
        assert!(!short.should_continue);
        assert!(short.reason.contains("too short"));

        let long_text = format!("Let me check {}", "x".repeat(1200));
        let long = detector().detect(&long_text, true);
        assert!(!long.should_continue);
        assert!(long.reason.contains("too long"));
    }

    #[test]
    fn test_question_lowers_score() {
        let decision = detector().detect("Should I update the config?", false);
        assert!(!decision.should_continue);
    }

    #[test]
    fn test_action_verbs_capped() {
        let decision = detector().detect(
            "Next step: search, read, review and verify the code",
            false,
        );
        // Four verbs but capped at 0.3, no other signals.
        assert!((decision.confidence - 0.3).abs() < f32::EPSILON);
        assert!(!decision.should_continue);
    }

    #[test]
    fn test_trailing_colon() {
        let decision = detector().detect("I'll run the tests now:", true);
        assert!(decision.should_continue);
        assert!(decision.detected_patterns.contains(&"trailing_colon".to_string()));
    }

    #[test]
    fn test_starting_phrase_needs_word_boundary() {
        assert!(starts_with_phrase("let me see", "let me"));
        assert!(!starts_with_phrase("let mem", "let me"));
        assert!(starts_with_phrase("i'll", "i'll"));
    }
}
