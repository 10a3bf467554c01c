// Writer/critic refinement
//
// Drives a draft through rounds of writing and critique until the critic
// approves it or the iteration budget runs out. The loop owns the stop
// condition; the critic owns the approval policy.

mod batch;
mod error;
mod loop_runner;
mod types;

pub use batch::{refine_batch, JobOutcome, RefinementJob};
pub use error::{EvaluationError, GenerationError, RefinementError, Role, RoleFailure};
pub use loop_runner::RefinementLoop;
pub use types::{
    CriticVerdict, Draft, LoopEvent, LoopState, Outcome, ProgressUpdate, RefinementConfig,
    RefinementResult, RunHistory, ScoreBreakdown, SpecificChange, Topic,
};
