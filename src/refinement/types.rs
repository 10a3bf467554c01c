// Refinement types: Topic, Draft, CriticVerdict, RunHistory, RefinementResult

use serde::{Deserialize, Serialize};

use super::error::EvaluationError;
use crate::config::constants::DEFAULT_MAX_ITERATIONS;

/// What a post should be about. Immutable for the duration of a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Topic {
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    /// Target category ("leadership", "engineering", ...)
    #[serde(default)]
    pub category: Option<String>,
    /// Name of one of the profile's post types; steers example selection
    #[serde(default)]
    pub post_type: Option<String>,
}

impl Topic {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            description: None,
            category: None,
            post_type: None,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }

    pub fn with_post_type(mut self, post_type: impl Into<String>) -> Self {
        self.post_type = Some(post_type.into());
        self
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.title.trim().is_empty() {
            return Err("topic title is empty".to_string());
        }
        Ok(())
    }
}

/// One versioned generation attempt within a run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Draft {
    /// 1-based, strictly increasing within a run
    pub version: usize,
    pub content: String,
    /// Critic feedback this draft was revised from (None for the first draft)
    pub feedback: Option<String>,
}

/// Sub-scores from the critic's rubric
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScoreBreakdown {
    /// Out of 40
    pub authenticity: u8,
    /// Out of 35
    pub content_quality: u8,
    /// Out of 25
    pub technical_execution: u8,
}

/// A concrete edit the critic asks for
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpecificChange {
    pub original: String,
    pub replacement: String,
    #[serde(default)]
    pub reason: String,
}

/// The critic's structured evaluation of one draft
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CriticVerdict {
    /// 0..=100, informational; `approved` is the stop signal
    pub score: u8,
    pub feedback: String,
    pub approved: bool,
    #[serde(default)]
    pub strengths: Vec<String>,
    #[serde(default)]
    pub improvements: Vec<String>,
    #[serde(default)]
    pub specific_changes: Vec<SpecificChange>,
    #[serde(default)]
    pub breakdown: Option<ScoreBreakdown>,
}

impl CriticVerdict {
    pub fn approve(score: u8, feedback: impl Into<String>) -> Self {
        Self::new(score, feedback, true)
    }

    pub fn revise(score: u8, feedback: impl Into<String>) -> Self {
        Self::new(score, feedback, false)
    }

    fn new(score: u8, feedback: impl Into<String>, approved: bool) -> Self {
        Self {
            score,
            feedback: feedback.into(),
            approved,
            strengths: Vec::new(),
            improvements: Vec::new(),
            specific_changes: Vec::new(),
            breakdown: None,
        }
    }

    /// Check the critic contract: score within 0..=100 and feedback on every revise verdict
    pub fn validate(&self) -> Result<(), EvaluationError> {
        if self.score > 100 {
            return Err(EvaluationError::ScoreOutOfRange(i64::from(self.score)));
        }
        if !self.approved && self.feedback.trim().is_empty() {
            return Err(EvaluationError::MissingFeedback);
        }
        Ok(())
    }
}

/// Append-only record of one run. Only the loop can add entries.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunHistory {
    drafts: Vec<Draft>,
    verdicts: Vec<CriticVerdict>,
}

impl RunHistory {
    pub fn drafts(&self) -> &[Draft] {
        &self.drafts
    }

    pub fn verdicts(&self) -> &[CriticVerdict] {
        &self.verdicts
    }

    pub fn last_draft(&self) -> Option<&Draft> {
        self.drafts.last()
    }

    pub fn last_verdict(&self) -> Option<&CriticVerdict> {
        self.verdicts.last()
    }

    /// Drafts that received a verdict
    pub fn completed_iterations(&self) -> usize {
        self.verdicts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.drafts.is_empty()
    }

    pub(crate) fn push_draft(&mut self, draft: Draft) -> &Draft {
        debug_assert_eq!(draft.version, self.drafts.len() + 1);
        let index = self.drafts.len();
        self.drafts.push(draft);
        &self.drafts[index]
    }

    pub(crate) fn push_verdict(&mut self, verdict: CriticVerdict) -> &CriticVerdict {
        debug_assert_eq!(self.verdicts.len() + 1, self.drafts.len());
        let index = self.verdicts.len();
        self.verdicts.push(verdict);
        &self.verdicts[index]
    }
}

/// How a run terminated without error
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Outcome {
    /// The critic approved the last draft
    Approved,
    /// Iteration cap reached without approval
    Exhausted,
    /// Cancelled at an iteration boundary
    Cancelled,
}

impl Outcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Outcome::Approved => "approved",
            Outcome::Exhausted => "exhausted",
            Outcome::Cancelled => "cancelled",
        }
    }
}

impl std::str::FromStr for Outcome {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "approved" => Ok(Outcome::Approved),
            "exhausted" => Ok(Outcome::Exhausted),
            "cancelled" => Ok(Outcome::Cancelled),
            other => Err(format!("unknown outcome '{other}'")),
        }
    }
}

/// Terminal record of a run. Sealed once returned.
#[derive(Debug, Clone, PartialEq)]
pub struct RefinementResult {
    outcome: Outcome,
    max_iterations: usize,
    history: RunHistory,
}

impl RefinementResult {
    pub(crate) fn new(outcome: Outcome, max_iterations: usize, history: RunHistory) -> Self {
        Self {
            outcome,
            max_iterations,
            history,
        }
    }

    pub fn outcome(&self) -> Outcome {
        self.outcome
    }

    pub fn approved(&self) -> bool {
        self.outcome == Outcome::Approved
    }

    /// Completed writer/critic rounds
    pub fn iterations(&self) -> usize {
        self.history.completed_iterations()
    }

    pub fn max_iterations(&self) -> usize {
        self.max_iterations
    }

    pub fn history(&self) -> &RunHistory {
        &self.history
    }

    pub fn drafts(&self) -> &[Draft] {
        self.history.drafts()
    }

    pub fn verdicts(&self) -> &[CriticVerdict] {
        self.history.verdicts()
    }

    /// The approved draft, or the best-effort last draft otherwise
    pub fn final_draft(&self) -> Option<&Draft> {
        self.history.last_draft()
    }

    pub fn final_score(&self) -> Option<u8> {
        self.history.last_verdict().map(|v| v.score)
    }
}

/// Loop state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    AwaitingDraft,
    AwaitingVerdict,
    Approved,
    Exhausted,
    Cancelled,
    Failed,
}

impl LoopState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            LoopState::Approved | LoopState::Exhausted | LoopState::Cancelled | LoopState::Failed
        )
    }

    pub fn can_transition_to(&self, next: LoopState) -> bool {
        use LoopState::*;
        match (self, next) {
            (AwaitingDraft, AwaitingVerdict) => true,
            (AwaitingVerdict, AwaitingDraft) => true,
            (AwaitingVerdict, Approved) => true,
            (AwaitingDraft | AwaitingVerdict, Exhausted) => true,
            (AwaitingDraft, Cancelled) => true,
            (AwaitingDraft | AwaitingVerdict, Failed) => true,
            _ => false,
        }
    }
}

/// Progress notification from a running loop
#[derive(Debug, Clone, PartialEq)]
pub enum LoopEvent {
    IterationStarted {
        iteration: usize,
        max_iterations: usize,
    },
    DraftWritten {
        iteration: usize,
        chars: usize,
    },
    VerdictReceived {
        iteration: usize,
        score: u8,
        approved: bool,
    },
    Finished {
        outcome: Outcome,
        iterations: usize,
    },
}

/// A `LoopEvent` tagged with the run it came from
#[derive(Debug, Clone, PartialEq)]
pub struct ProgressUpdate {
    pub topic: String,
    pub event: LoopEvent,
}

/// Configuration for the refinement loop
#[derive(Debug, Clone)]
pub struct RefinementConfig {
    /// Hard cap on writer/critic rounds
    pub max_iterations: usize,
}

impl Default for RefinementConfig {
    fn default() -> Self {
        Self {
            max_iterations: DEFAULT_MAX_ITERATIONS,
        }
    }
}
