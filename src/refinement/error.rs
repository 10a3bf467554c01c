// Error taxonomy for refinement runs
//
// Exhaustion is not an error: it is an `Ok` result with `Outcome::Exhausted`.

use std::fmt;
use thiserror::Error;

use super::types::RunHistory;

/// Which role an invocation belonged to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    Writer,
    Critic,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Writer => write!(f, "writer"),
            Role::Critic => write!(f, "critic"),
        }
    }
}

/// Writer-side failure
#[derive(Debug, Error)]
pub enum GenerationError {
    #[error("LLM request failed: {0:#}")]
    Provider(anyhow::Error),

    #[error("writer returned empty content")]
    EmptyOutput,
}

/// Critic-side failure, including contract violations by the model
#[derive(Debug, Error)]
pub enum EvaluationError {
    #[error("LLM request failed: {0:#}")]
    Provider(anyhow::Error),

    #[error("malformed critic response: {0}")]
    Malformed(String),

    #[error("score {0} is outside 0..=100")]
    ScoreOutOfRange(i64),

    #[error("revise verdict carried no feedback")]
    MissingFeedback,
}

/// A failed role invocation
#[derive(Debug, Error)]
pub enum RoleFailure {
    #[error(transparent)]
    Generation(#[from] GenerationError),

    #[error(transparent)]
    Evaluation(#[from] EvaluationError),
}

impl RoleFailure {
    pub fn role(&self) -> Role {
        match self {
            RoleFailure::Generation(_) => Role::Writer,
            RoleFailure::Evaluation(_) => Role::Critic,
        }
    }
}

/// Why a refinement run did not produce a `RefinementResult`
#[derive(Debug, Error)]
pub enum RefinementError {
    /// Rejected before any role was invoked
    #[error("invalid refinement input: {0}")]
    InvalidInput(String),

    /// A role invocation failed; everything appended before the failure is kept
    #[error("{role} failed at iteration {iteration}: {source}")]
    RoleFailed {
        iteration: usize,
        role: Role,
        source: RoleFailure,
        partial: RunHistory,
    },
}

impl RefinementError {
    /// History produced before the failure, if any role ran
    pub fn partial_history(&self) -> Option<&RunHistory> {
        match self {
            RefinementError::RoleFailed { partial, .. } => Some(partial),
            RefinementError::InvalidInput(_) => None,
        }
    }

    pub fn iteration(&self) -> Option<usize> {
        match self {
            RefinementError::RoleFailed { iteration, .. } => Some(*iteration),
            RefinementError::InvalidInput(_) => None,
        }
    }

    pub fn role(&self) -> Option<Role> {
        match self {
            RefinementError::RoleFailed { role, .. } => Some(*role),
            RefinementError::InvalidInput(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_failure_maps_to_role() {
        let writer: RoleFailure = GenerationError::EmptyOutput.into();
        let critic: RoleFailure = EvaluationError::MissingFeedback.into();
        assert_eq!(writer.role(), Role::Writer);
        assert_eq!(critic.role(), Role::Critic);
    }

    #[test]
    fn test_role_failed_message_names_iteration_and_role() {
        let err = RefinementError::RoleFailed {
            iteration: 2,
            role: Role::Critic,
            source: EvaluationError::ScoreOutOfRange(150).into(),
            partial: RunHistory::default(),
        };
        let message = err.to_string();
        assert!(message.contains("critic failed at iteration 2"));
        assert!(message.contains("150"));
        assert_eq!(err.iteration(), Some(2));
        assert_eq!(err.role(), Some(Role::Critic));
    }

    #[test]
    fn test_provider_error_shows_context_chain() {
        let inner = anyhow::anyhow!("connection refused").context("Failed to send request");
        let err = GenerationError::Provider(inner);
        assert_eq!(
            err.to_string(),
            "LLM request failed: Failed to send request: connection refused"
        );
    }
}
