// Concurrent refinement of independent topics

use futures::stream::{self, StreamExt};
use tokio_util::sync::CancellationToken;

use super::error::RefinementError;
use super::loop_runner::RefinementLoop;
use super::types::{RefinementResult, Topic};
use crate::profile::StyleProfile;

/// One independent refinement run
#[derive(Debug, Clone)]
pub struct RefinementJob {
    pub topic: Topic,
    pub profile: StyleProfile,
}

impl RefinementJob {
    pub fn new(topic: Topic, profile: StyleProfile) -> Self {
        Self { topic, profile }
    }
}

pub type JobOutcome = (RefinementJob, Result<RefinementResult, RefinementError>);

/// Run `jobs` with at most `concurrency` refinements in flight.
///
/// Runs share nothing but the loop's role implementations. Results come back
/// in job order. Cancelling `cancel` stops every run at its next iteration
/// boundary; jobs not yet started come back as cancelled with no history.
pub async fn refine_batch(
    refinement: &RefinementLoop,
    jobs: Vec<RefinementJob>,
    concurrency: usize,
    cancel: &CancellationToken,
) -> Vec<JobOutcome> {
    let concurrency = concurrency.max(1);
    tracing::info!("Refining {} topics, {} at a time", jobs.len(), concurrency);

    stream::iter(jobs)
        .map(move |job| async move {
            let result = refinement.refine(&job.topic, &job.profile, cancel).await;
            (job, result)
        })
        .buffered(concurrency)
        .collect()
        .await
}
