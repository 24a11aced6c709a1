//! Phase announcements in model output.

use regex::{Regex, RegexBuilder};

use super::PlanPhase;

/// Decides which plan phase, if any, a model turn announces.
///
/// The state machine only asks for phases ahead of the current one, so an
/// implementation never has to reason about ordering.
pub trait PhaseTransitionDetector: Send + Sync {
    fn detect(&self, text: &str, current: PlanPhase) -> Option<PlanPhase>;
}

/// Matches natural-language phrases and Markdown headings.
pub struct RegexPhaseDetector {
    patterns: Vec<(PlanPhase, Vec<Regex>)>,
}

impl RegexPhaseDetector {
    pub fn new() -> Self {
        let patterns = [
            (PlanPhase::Design, "design"),
            (PlanPhase::Review, "review"),
            (PlanPhase::Final, r"final(?:\s+plan(?:ning)?)?"),
        ]
        .into_iter()
        .map(|(phase, keyword)| {
            let mut sources = default_sources(keyword);
            if phase == PlanPhase::Final {
                sources.push(r"(?m)^\s*#{1,6}\s*final\s+plan\s*$".to_string());
            }
            let compiled = sources
                .iter()
                .filter_map(|source| compile(source).ok())
                .collect();
            (phase, compiled)
        })
        .collect();

        Self { patterns }
    }

    /// Build a detector from custom per-phase patterns (case-insensitive).
    pub fn with_patterns(
        patterns: Vec<(PlanPhase, Vec<String>)>,
    ) -> Result<Self, regex::Error> {
        let patterns = patterns
            .into_iter()
            .map(|(phase, sources)| {
                let compiled = sources
                    .iter()
                    .map(|source| compile(source))
                    .collect::<Result<Vec<_>, _>>()?;
                Ok((phase, compiled))
            })
            .collect::<Result<Vec<_>, regex::Error>>()?;
        Ok(Self { patterns })
    }
}

impl Default for RegexPhaseDetector {
    fn default() -> Self {
        Self::new()
    }
}

impl PhaseTransitionDetector for RegexPhaseDetector {
    fn detect(&self, text: &str, current: PlanPhase) -> Option<PlanPhase> {
        let mut ahead: Vec<&(PlanPhase, Vec<Regex>)> = self
            .patterns
            .iter()
            .filter(|(phase, _)| current.is_before(*phase))
            .collect();
        ahead.sort_by_key(|(phase, _)| *phase);

        ahead
            .into_iter()
            .find(|(_, regexes)| regexes.iter().any(|regex| regex.is_match(text)))
            .map(|(phase, _)| *phase)
    }
}

fn default_sources(keyword: &str) -> Vec<String> {
    vec![
        format!(
            r"\b(?:moving|move|moved|proceeding|proceed|transitioning|advancing)\s+(?:on\s+)?to\s+(?:the\s+)?{keyword}\s+phase\b"
        ),
        format!(r"\b(?:entering|starting|beginning|now\s+in)\s+(?:the\s+)?{keyword}\s+phase\b"),
        format!(r"(?m)^\s*#{{1,6}}\s*(?:phase\s*\d+\s*[:.\-]\s*)?{keyword}\s+phase\b"),
    ]
}

fn compile(source: &str) -> Result<Regex, regex::Error> {
    RegexBuilder::new(source).case_insensitive(true).build()
}
