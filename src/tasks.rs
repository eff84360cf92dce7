//! Canned analysis tasks offered next to free-form chat.

use std::fmt;
use std::str::FromStr;

/// A predefined analysis the user can run with one click.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskKind {
    Summarize,
    KeyPoints,
    Risks,
    ActionItems,
}

/// Returned when a form carries an unknown task name.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid task type: {0}")]
pub struct UnknownTask(pub String);

impl TaskKind {
    pub const ALL: [TaskKind; 4] = [
        TaskKind::Summarize,
        TaskKind::KeyPoints,
        TaskKind::Risks,
        TaskKind::ActionItems,
    ];

    /// Form value.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Summarize => "summarize",
            Self::KeyPoints => "key-points",
            Self::Risks => "risks",
            Self::ActionItems => "action-items",
        }
    }

    /// Badge text shown above the result.
    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            Self::Summarize => "📝 Summary",
            Self::KeyPoints => "🎯 Key Points",
            Self::Risks => "⚠️ Risk Analysis",
            Self::ActionItems => "✅ Action Items",
        }
    }

    /// Instruction sent to the model along with the document.
    #[must_use]
    pub fn prompt(self) -> &'static str {
        match self {
            Self::Summarize => SUMMARIZE_PROMPT,
            Self::KeyPoints => KEY_POINTS_PROMPT,
            Self::Risks => RISKS_PROMPT,
            Self::ActionItems => ACTION_ITEMS_PROMPT,
        }
    }
}

impl fmt::Display for TaskKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TaskKind {
    type Err = UnknownTask;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| UnknownTask(s.to_string()))
    }
}

const SUMMARIZE_PROMPT: &str = "Provide a comprehensive summary of this document in the following format:

OVERVIEW:
[2-3 sentence high-level summary]

MAIN SECTIONS:
[Bullet points of major sections/topics]

KEY FINDINGS:
[Most important discoveries or statements]

CONCLUSION:
[Brief wrap-up of document's purpose and outcome]";

const KEY_POINTS_PROMPT: &str = "Extract and list the most important points from this document:

1. [First key point with brief explanation]
2. [Second key point with brief explanation]
... (continue for all major points)

Focus on actionable information, critical deadlines, important numbers, and binding commitments.";

const RISKS_PROMPT: &str = "Analyze this document for potential risks, concerns, or red flags:

LEGAL RISKS:
- [Any legal vulnerabilities or unclear terms]

FINANCIAL RISKS:
- [Financial obligations or exposures]

OPERATIONAL RISKS:
- [Process or execution challenges]

COMPLIANCE RISKS:
- [Regulatory or policy concerns]

RECOMMENDATIONS:
- [Suggested mitigations for identified risks]";

const ACTION_ITEMS_PROMPT: &str = "Extract all action items and next steps from this document:

IMMEDIATE ACTIONS (Within 7 days):
□ [Action item with responsible party if mentioned]
□ [Action item with deadline if specified]

SHORT-TERM ACTIONS (Within 30 days):
□ [Action items]

LONG-TERM ACTIONS (30+ days):
□ [Action items]

DEPENDENCIES:
- [Items that require other actions to complete first]";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_form_values() {
        assert_eq!("summarize".parse::<TaskKind>().unwrap(), TaskKind::Summarize);
        assert_eq!("key-points".parse::<TaskKind>().unwrap(), TaskKind::KeyPoints);
        assert_eq!("risks".parse::<TaskKind>().unwrap(), TaskKind::Risks);
        assert_eq!("action-items".parse::<TaskKind>().unwrap(), TaskKind::ActionItems);
        assert_eq!(
            "Summarize".parse::<TaskKind>(),
            Err(UnknownTask("Summarize".to_string()))
        );
    }

    #[test]
    fn test_every_task_has_prompt_and_label() {
        for task in TaskKind::ALL {
            assert!(!task.prompt().is_empty());
            assert!(!task.label().is_empty());
            assert_eq!(task.to_string().parse::<TaskKind>().unwrap(), task);
        }
    }
}
