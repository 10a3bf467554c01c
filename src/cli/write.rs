// `postsmith write`: resolve topics, refine them, persist the results

use anyhow::{bail, Context, Result};
use std::sync::Arc;
use tokio::sync::mpsc::{self, UnboundedReceiver};
use tokio_util::sync::CancellationToken;

use crate::config::Config;
use crate::providers::{create_provider_from_entry, LlmProvider};
use crate::refinement::{
    refine_batch, JobOutcome, LoopEvent, Outcome, ProgressUpdate, RefinementConfig,
    RefinementError, RefinementJob, RefinementLoop, Topic,
};
use crate::roles::{extract_lessons, ApprovalPolicy, Lessons, LlmCritic, LlmWriter, ModelParams};
use crate::store::{PostStore, StoredPost};

#[derive(Debug, Clone)]
pub struct WriteArgs {
    pub subject: String,
    pub topics: Vec<String>,
    pub next: bool,
    pub max_iterations: Option<usize>,
    pub concurrency: Option<usize>,
}

/// A topic to write about, and its queue entry if it came from the store
struct PlannedTopic {
    topic: Topic,
    stored_id: Option<String>,
}

pub async fn write_posts(config: &Config, store: &PostStore, args: WriteArgs) -> Result<()> {
    let subject = args.subject.as_str();
    let profile = store.load_profile(subject).await.with_context(|| {
        format!("Import a profile first: postsmith profile import {subject} <file.json>")
    })?;

    let planned = plan_topics(store, &args).await?;
    let max_iterations = args.max_iterations.unwrap_or(config.refinement.max_iterations);
    let concurrency = args.concurrency.unwrap_or(config.refinement.concurrency);
    if max_iterations == 0 || concurrency == 0 {
        bail!("--max-iterations and --concurrency must be at least 1");
    }

    let entry = config
        .active_provider()
        .context("No provider configured")?;
    let provider: Arc<dyn LlmProvider> = Arc::from(create_provider_from_entry(entry)?);
    tracing::info!("Using provider {} ({})", entry.display_name(), provider.default_model());

    let lessons = if config.writer.learn_from_feedback {
        let history = store
            .recent_verdicts(subject, config.writer.feedback_history_count)
            .await?;
        extract_lessons(&history)
    } else {
        Lessons::default()
    };

    let writer = LlmWriter::new(provider.clone())
        .with_params(
            ModelParams::new(config.writer.temperature, config.writer.max_tokens)
                .with_model(config.writer.model.clone()),
        )
        .with_example_count(config.writer.example_post_count)
        .with_lessons(lessons)
        .with_draft_count(config.writer.draft_count())
        .with_semantic_matching(config.writer.semantic_matching);
    let critic = LlmCritic::new(provider)
        .with_params(
            ModelParams::new(config.critic.temperature, config.critic.max_tokens)
                .with_model(config.critic.model.clone()),
        )
        .with_example_count(config.writer.example_post_count)
        .with_policy(ApprovalPolicy::from_config(&config.critic));

    let (tx, rx) = mpsc::unbounded_channel();
    let reporter = tokio::spawn(report_progress(rx));
    let refinement = RefinementLoop::new(
        Arc::new(writer),
        Arc::new(critic),
        RefinementConfig { max_iterations },
    )
    .with_progress(tx);

    let cancel = CancellationToken::new();
    let ctrl_c = {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                eprintln!("\nCancelling: finishing the current iteration, then saving drafts...");
                cancel.cancel();
            }
        })
    };

    let jobs = planned
        .iter()
        .map(|p| RefinementJob::new(p.topic.clone(), profile.clone()))
        .collect();
    let outcomes = refine_batch(&refinement, jobs, concurrency, &cancel).await;

    ctrl_c.abort();
    drop(refinement);
    let _ = reporter.await;

    let total = outcomes.len();
    let failures = persist_outcomes(store, subject, outcomes, &planned).await;
    if failures > 0 {
        bail!("{failures} of {total} posts failed");
    }
    Ok(())
}

/// Save every finished run and print it. A failed run or a failed save is
/// reported and counted, and the remaining results are still saved.
async fn persist_outcomes(
    store: &PostStore,
    subject: &str,
    outcomes: Vec<JobOutcome>,
    planned: &[PlannedTopic],
) -> usize {
    let mut failures = 0;
    for ((job, result), plan) in outcomes.into_iter().zip(planned) {
        let result = match result {
            Ok(result) => result,
            Err(e) => {
                failures += 1;
                report_failure(&job.topic, &e);
                continue;
            }
        };

        if result.drafts().is_empty() {
            println!("- {}: cancelled before the first draft, nothing saved", job.topic.title);
            continue;
        }

        let post = match store
            .save_result(subject, &job.topic, plan.stored_id.as_deref(), &result)
            .await
        {
            Ok(post) => post,
            Err(e) => {
                failures += 1;
                tracing::error!("Failed to save post for '{}': {}", job.topic.title, e);
                eprintln!("✗ {}: could not be saved: {}", job.topic.title, e);
                if let Some(draft) = result.final_draft() {
                    eprintln!("\n{}\n", draft.content);
                }
                continue;
            }
        };
        if let Some(id) = &plan.stored_id {
            if let Err(e) = store.mark_topic_used(id).await {
                failures += 1;
                tracing::error!("Failed to mark topic {} as used: {}", id, e);
            }
        }
        println!("{}", summary_line(&post, result.max_iterations()));
        println!("\n{}\n", post.content);
    }
    failures
}

/// Topics named on the command line in order, each at most once, then the
/// oldest unused queued topic not already named when `--next` is set or no
/// titles were given
async fn plan_topics(store: &PostStore, args: &WriteArgs) -> Result<Vec<PlannedTopic>> {
    let mut planned: Vec<PlannedTopic> = Vec::new();
    for title in &args.topics {
        if planned.iter().any(|p| p.topic.title == *title) {
            tracing::warn!("Topic '{title}' given more than once, writing it once");
            continue;
        }
        let stored = store.find_topic(&args.subject, title).await?;
        planned.push(match stored {
            Some(stored) => PlannedTopic {
                topic: stored.topic,
                stored_id: Some(stored.id),
            },
            None => PlannedTopic {
                topic: Topic::new(title.clone()),
                stored_id: None,
            },
        });
    }

    if args.next || args.topics.is_empty() {
        let already: Vec<&str> = planned.iter().filter_map(|p| p.stored_id.as_deref()).collect();
        let next = store.next_unused_topic(&args.subject, &already).await?;
        match next {
            Some(stored) => planned.push(PlannedTopic {
                topic: stored.topic,
                stored_id: Some(stored.id),
            }),
            None => bail!(
                "No unused topics for {}. Add one with: postsmith topic add {} \"<title>\"",
                args.subject,
                args.subject
            ),
        }
    }
    Ok(planned)
}

fn summary_line(post: &StoredPost, max_iterations: usize) -> String {
    let marker = match post.outcome {
        Outcome::Approved => "✓",
        Outcome::Exhausted => "~",
        Outcome::Cancelled => "✗",
    };
    let score = post
        .final_score
        .map(|s| format!("score {s}"))
        .unwrap_or_else(|| "unscored".to_string());
    format!(
        "{marker} {title}: {outcome} ({score}, {iterations}/{max_iterations} iterations) saved as {status} post {id}",
        title = post.topic_title,
        outcome = post.outcome.as_str(),
        iterations = post.iterations,
        status = post.status,
        id = post.id,
    )
}

fn report_failure(topic: &Topic, error: &RefinementError) {
    eprintln!("✗ {}: {}", topic.title, error);
    if let Some(partial) = error.partial_history() {
        for (draft, verdict) in partial.drafts().iter().zip(partial.verdicts()) {
            tracing::warn!(
                "  kept v{} (score {}): {}",
                draft.version,
                verdict.score,
                verdict.feedback
            );
        }
        if partial.drafts().len() > partial.verdicts().len() {
            tracing::warn!("  last draft was never scored");
        }
    }
}

/// One line of progress output, or `None` for events not worth printing
pub fn describe_event(update: &ProgressUpdate) -> Option<String> {
    let topic = &update.topic;
    match &update.event {
        LoopEvent::IterationStarted {
            iteration,
            max_iterations,
        } => Some(format!("[{topic}] iteration {iteration}/{max_iterations}: writing")),
        LoopEvent::DraftWritten { .. } => None,
        LoopEvent::VerdictReceived {
            iteration,
            score,
            approved,
        } => Some(format!(
            "[{topic}] iteration {iteration}: score {score}, {}",
            if *approved { "approved" } else { "revising" }
        )),
        LoopEvent::Finished {
            outcome,
            iterations,
        } => Some(format!(
            "[{topic}] {} after {iterations} iterations",
            outcome.as_str()
        )),
    }
}

async fn report_progress(mut rx: UnboundedReceiver<ProgressUpdate>) {
    while let Some(update) = rx.recv().await {
        if let Some(line) = describe_event(&update) {
            eprintln!("{line}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::profile::StyleProfile;
    use crate::refinement::{CriticVerdict, Draft, RefinementResult, RunHistory};
    use crate::store::PostStatus;
    use chrono::Utc;
    use tempfile::NamedTempFile;

    fn store() -> (NamedTempFile, PostStore) {
        let temp = NamedTempFile::new().unwrap();
        let store = PostStore::open(temp.path()).unwrap();
        (temp, store)
    }

    fn args(topics: &[&str], next: bool) -> WriteArgs {
        WriteArgs {
            subject: "ada".to_string(),
            topics: topics.iter().map(|t| t.to_string()).collect(),
            next,
            max_iterations: None,
            concurrency: None,
        }
    }

    fn titles(planned: &[PlannedTopic]) -> Vec<&str> {
        planned.iter().map(|p| p.topic.title.as_str()).collect()
    }

    fn approved_result(content: &str) -> RefinementResult {
        let mut history = RunHistory::default();
        history.push_draft(Draft {
            version: 1,
            content: content.to_string(),
            feedback: None,
        });
        history.push_verdict(CriticVerdict::approve(90, "Ready"));
        RefinementResult::new(Outcome::Approved, 3, history)
    }

    fn update(event: LoopEvent) -> ProgressUpdate {
        ProgressUpdate {
            topic: "Hiring".to_string(),
            event,
        }
    }

    #[tokio::test]
    async fn test_next_skips_a_topic_already_named() -> anyhow::Result<()> {
        let (_temp, store) = store();
        store.add_topic("ada", &Topic::new("First")).await?;
        store.add_topic("ada", &Topic::new("Second")).await?;

        let planned = plan_topics(&store, &args(&["First"], true)).await?;
        assert_eq!(titles(&planned), vec!["First", "Second"]);
        assert!(planned.iter().all(|p| p.stored_id.is_some()));
        Ok(())
    }

    #[tokio::test]
    async fn test_next_without_another_unused_topic_fails() -> anyhow::Result<()> {
        let (_temp, store) = store();
        store.add_topic("ada", &Topic::new("First")).await?;

        let err = plan_topics(&store, &args(&["First"], true)).await.err().unwrap();
        assert!(err.to_string().contains("No unused topics for ada"));
        Ok(())
    }

    #[tokio::test]
    async fn test_repeated_titles_are_planned_once() -> anyhow::Result<()> {
        let (_temp, store) = store();
        store.add_topic("ada", &Topic::new("Queued")).await?;

        let planned = plan_topics(&store, &args(&["Ad hoc", "Queued", "Ad hoc", "Queued"], false)).await?;
        assert_eq!(titles(&planned), vec!["Ad hoc", "Queued"]);
        assert!(planned[0].stored_id.is_none());
        assert!(planned[1].stored_id.is_some());
        Ok(())
    }

    #[tokio::test]
    async fn test_no_titles_takes_the_oldest_unused_topic() -> anyhow::Result<()> {
        let (_temp, store) = store();
        store.add_topic("ada", &Topic::new("First")).await?;
        store.add_topic("ada", &Topic::new("Second")).await?;

        let planned = plan_topics(&store, &args(&[], false)).await?;
        assert_eq!(titles(&planned), vec!["First"]);
        Ok(())
    }

    #[tokio::test]
    async fn test_failed_save_does_not_stop_later_saves() -> anyhow::Result<()> {
        let (_temp, store) = store();
        let profile = StyleProfile::new("Ada", "calm");
        let planned = vec![
            // points at a topic row that does not exist, so the insert fails
            PlannedTopic {
                topic: Topic::new("Ghost"),
                stored_id: Some("ghost".to_string()),
            },
            PlannedTopic {
                topic: Topic::new("Real"),
                stored_id: None,
            },
        ];
        let outcomes: Vec<JobOutcome> = planned
            .iter()
            .map(|p| {
                (
                    RefinementJob::new(p.topic.clone(), profile.clone()),
                    Ok(approved_result(&format!("{} post", p.topic.title))),
                )
            })
            .collect();

        let failures = persist_outcomes(&store, "ada", outcomes, &planned).await;

        assert_eq!(failures, 1);
        let posts = store.list_posts("ada").await?;
        assert_eq!(posts.len(), 1);
        assert_eq!(posts[0].content, "Real post");
        Ok(())
    }

    #[test]
    fn test_describe_event() {
        assert_eq!(
            describe_event(&update(LoopEvent::IterationStarted {
                iteration: 2,
                max_iterations: 5
            })),
            Some("[Hiring] iteration 2/5: writing".to_string())
        );
        assert_eq!(
            describe_event(&update(LoopEvent::DraftWritten {
                iteration: 2,
                chars: 900
            })),
            None
        );
        assert_eq!(
            describe_event(&update(LoopEvent::VerdictReceived {
                iteration: 2,
                score: 71,
                approved: false
            })),
            Some("[Hiring] iteration 2: score 71, revising".to_string())
        );
        assert_eq!(
            describe_event(&update(LoopEvent::Finished {
                outcome: Outcome::Exhausted,
                iterations: 5
            })),
            Some("[Hiring] exhausted after 5 iterations".to_string())
        );
    }

    #[test]
    fn test_summary_line() {
        let post = StoredPost {
            id: "p1".to_string(),
            subject: "ada".to_string(),
            topic_id: None,
            topic_title: "Hiring".to_string(),
            content: "body".to_string(),
            iterations: 2,
            outcome: Outcome::Approved,
            status: PostStatus::Approved,
            final_score: Some(88),
            drafts: Vec::new(),
            verdicts: Vec::new(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        assert_eq!(
            summary_line(&post, 10),
            "✓ Hiring: approved (score 88, 2/10 iterations) saved as approved post p1"
        );
    }
}
