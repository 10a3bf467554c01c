// Project-wide constants
//
// Import via `use crate::config::constants::*;`.

/// Default cap on writer/critic iterations per refinement run.
pub const DEFAULT_MAX_ITERATIONS: usize = 10;

/// Default number of refinement runs allowed in flight at once.
pub const DEFAULT_CONCURRENCY: usize = 2;

/// Default maximum tokens for provider requests.
pub const DEFAULT_MAX_TOKENS: u32 = 4096;

/// Writer sampling temperature (creative).
pub const DEFAULT_WRITER_TEMPERATURE: f32 = 0.7;

/// Critic sampling temperature (consistent scoring).
pub const DEFAULT_CRITIC_TEMPERATURE: f32 = 0.3;

/// Score at which the critic accepts a post on the final iteration even if it
/// asked for another revision.
pub const DEFAULT_FINAL_ITERATION_MIN_SCORE: u8 = 80;

/// Posts whose final score is below this feed the lessons-learned extraction.
pub const LESSONS_SCORE_CUTOFF: u8 = 85;

/// Number of past posts inspected for recurring critic feedback.
pub const DEFAULT_FEEDBACK_HISTORY_COUNT: usize = 10;

/// First drafts generated in parallel before the best one is picked.
pub const DEFAULT_MULTI_DRAFT_COUNT: usize = 3;

/// Upper bound on parallel first drafts (one per writing angle).
pub const MAX_MULTI_DRAFT_COUNT: usize = 5;

/// Config directory name under the user's home.
pub const CONFIG_DIR_NAME: &str = ".postsmith";
