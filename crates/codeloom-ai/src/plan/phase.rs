use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Phases of a planning session, in their fixed order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlanPhase {
    Understanding,
    Design,
    Review,
    Final,
    Exit,
}

impl PlanPhase {
    pub const ALL: [PlanPhase; 5] = [
        PlanPhase::Understanding,
        PlanPhase::Design,
        PlanPhase::Review,
        PlanPhase::Final,
        PlanPhase::Exit,
    ];

    pub fn index(self) -> usize {
        self as usize
    }

    pub fn as_str(self) -> &'static str {
        match self {
            PlanPhase::Understanding => "understanding",
            PlanPhase::Design => "design",
            PlanPhase::Review => "review",
            PlanPhase::Final => "final",
            PlanPhase::Exit => "exit",
        }
    }

    /// Whether moving from `self` to `target` goes strictly forward.
    pub fn is_before(self, target: PlanPhase) -> bool {
        self.index() < target.index()
    }

    pub fn is_terminal(self) -> bool {
        self == PlanPhase::Exit
    }
}

impl fmt::Display for PlanPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PlanPhase {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        PlanPhase::ALL
            .into_iter()
            .find(|phase| phase.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| format!("Unknown plan phase: {s}"))
    }
}
