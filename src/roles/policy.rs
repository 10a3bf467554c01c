// Score-to-approval policy, owned by the critic
//
// The critic's explicit approve flag is authoritative. The policy can only
// veto an approval below `min_score`, or accept a revise verdict on the final
// iteration when the score clears `final_iteration_min_score`.

use crate::config::CriticConfig;
use crate::refinement::CriticVerdict;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ApprovalPolicy {
    /// Approvals scoring below this are downgraded to revisions
    pub min_score: Option<u8>,
    /// Revise verdicts on the last iteration scoring at least this are approved
    pub final_iteration_min_score: Option<u8>,
}

impl Default for ApprovalPolicy {
    fn default() -> Self {
        Self {
            min_score: None,
            final_iteration_min_score: Some(
                crate::config::constants::DEFAULT_FINAL_ITERATION_MIN_SCORE,
            ),
        }
    }
}

impl ApprovalPolicy {
    /// Pass the critic's flag through untouched
    pub fn flag_only() -> Self {
        Self {
            min_score: None,
            final_iteration_min_score: None,
        }
    }

    pub fn from_config(config: &CriticConfig) -> Self {
        Self {
            min_score: config.min_score,
            final_iteration_min_score: config
                .final_iteration_leniency
                .then_some(config.final_iteration_min_score),
        }
    }

    pub fn apply(&self, mut verdict: CriticVerdict, final_iteration: bool) -> CriticVerdict {
        if !verdict.approved && final_iteration {
            if let Some(bar) = self.final_iteration_min_score {
                if verdict.score >= bar {
                    tracing::info!(
                        "Accepting score {} on the final iteration (bar {})",
                        verdict.score,
                        bar
                    );
                    verdict.approved = true;
                }
            }
        }

        if verdict.approved {
            if let Some(bar) = self.min_score {
                if verdict.score < bar {
                    tracing::info!(
                        "Approval with score {} is below the minimum of {}, revising",
                        verdict.score,
                        bar
                    );
                    verdict.approved = false;
                    if verdict.feedback.trim().is_empty() {
                        verdict.feedback =
                            format!("Score {} is below the approval bar of {}.", verdict.score, bar);
                    }
                }
            }
        }

        verdict
    }
}
