// Refinement loop runner: writer drafts, critic scores, repeat until approval or the cap

use std::sync::Arc;
use tokio::sync::mpsc::UnboundedSender;
use tokio_util::sync::CancellationToken;

use super::error::{RefinementError, RoleFailure};
use super::types::{
    Draft, LoopEvent, LoopState, Outcome, ProgressUpdate, RefinementConfig, RefinementResult,
    RunHistory, Topic,
};
use super::GenerationError;
use crate::profile::StyleProfile;
use crate::roles::{Critic, EvaluateRequest, Revision, WriteRequest, Writer};

/// The writer/critic refinement loop.
///
/// Each call to [`refine`](Self::refine) owns its history exclusively, so one
/// loop can serve any number of concurrent runs. Terminates when:
/// - the critic approves a draft
/// - `max_iterations` rounds completed without approval
/// - the cancellation token fires (checked before every writer call)
/// - a role invocation fails (surfaced as an error with the partial history)
pub struct RefinementLoop {
    writer: Arc<dyn Writer>,
    critic: Arc<dyn Critic>,
    config: RefinementConfig,
    progress: Option<UnboundedSender<ProgressUpdate>>,
}

fn advance(state: &mut LoopState, next: LoopState) {
    debug_assert!(
        state.can_transition_to(next),
        "illegal loop transition {:?} -> {:?}",
        state,
        next
    );
    tracing::trace!("loop state {:?} -> {:?}", state, next);
    *state = next;
}

impl RefinementLoop {
    pub fn new(writer: Arc<dyn Writer>, critic: Arc<dyn Critic>, config: RefinementConfig) -> Self {
        Self {
            writer,
            critic,
            config,
            progress: None,
        }
    }

    /// Report progress on `tx`. A dropped receiver is ignored.
    pub fn with_progress(mut self, tx: UnboundedSender<ProgressUpdate>) -> Self {
        self.progress = Some(tx);
        self
    }

    pub fn config(&self) -> &RefinementConfig {
        &self.config
    }

    /// Run one refinement to approval, exhaustion or cancellation
    pub async fn refine(
        &self,
        topic: &Topic,
        profile: &StyleProfile,
        cancel: &CancellationToken,
    ) -> Result<RefinementResult, RefinementError> {
        topic.validate().map_err(RefinementError::InvalidInput)?;
        profile
            .validate()
            .map_err(|e| RefinementError::InvalidInput(format!("{e:#}")))?;
        let max_iterations = self.config.max_iterations;
        if max_iterations == 0 {
            return Err(RefinementError::InvalidInput(
                "max_iterations must be at least 1".to_string(),
            ));
        }

        tracing::info!("Refining \"{}\" (up to {} iterations)", topic.title, max_iterations);
        let mut state = LoopState::AwaitingDraft;
        let mut history = RunHistory::default();

        for iteration in 1..=max_iterations {
            // ── 1. Cancellation at the iteration boundary ──────────────────
            if cancel.is_cancelled() {
                tracing::info!(
                    "Refinement of \"{}\" cancelled after {} iterations",
                    topic.title,
                    history.completed_iterations()
                );
                advance(&mut state, LoopState::Cancelled);
                return Ok(self.finish(topic, Outcome::Cancelled, history));
            }

            self.emit(
                topic,
                LoopEvent::IterationStarted {
                    iteration,
                    max_iterations,
                },
            );

            // ── 2. Draft ───────────────────────────────────────────────────
            let revision = match (history.last_draft(), history.last_verdict()) {
                (Some(previous), Some(verdict)) => Some(Revision { previous, verdict }),
                _ => None,
            };
            let written = self
                .writer
                .write(WriteRequest {
                    topic,
                    profile,
                    revision,
                })
                .await
                .and_then(|content| {
                    if content.trim().is_empty() {
                        Err(GenerationError::EmptyOutput)
                    } else {
                        Ok(content)
                    }
                });
            let content = match written {
                Ok(content) => content,
                Err(e) => return Err(self.fail(topic, iteration, e.into(), state, history)),
            };

            let feedback = history.last_verdict().map(|v| v.feedback.clone());
            let chars = content.chars().count();
            let draft = history.push_draft(Draft {
                version: iteration,
                content,
                feedback,
            });
            advance(&mut state, LoopState::AwaitingVerdict);
            self.emit(topic, LoopEvent::DraftWritten { iteration, chars });

            // ── 3. Verdict ─────────────────────────────────────────────────
            let evaluated = self
                .critic
                .evaluate(EvaluateRequest {
                    draft,
                    profile,
                    topic,
                    iteration,
                    max_iterations,
                })
                .await
                .and_then(|verdict| verdict.validate().map(|()| verdict));
            let verdict = match evaluated {
                Ok(verdict) => verdict,
                Err(e) => return Err(self.fail(topic, iteration, e.into(), state, history)),
            };

            tracing::info!(
                "Iteration {}/{} for \"{}\": score {}, {}",
                iteration,
                max_iterations,
                topic.title,
                verdict.score,
                if verdict.approved { "approved" } else { "revise" }
            );
            let verdict = history.push_verdict(verdict);
            self.emit(
                topic,
                LoopEvent::VerdictReceived {
                    iteration,
                    score: verdict.score,
                    approved: verdict.approved,
                },
            );

            // ── 4. Decide ──────────────────────────────────────────────────
            if verdict.approved {
                advance(&mut state, LoopState::Approved);
                return Ok(self.finish(topic, Outcome::Approved, history));
            }
            if iteration < max_iterations {
                advance(&mut state, LoopState::AwaitingDraft);
            }
        }

        tracing::warn!(
            "\"{}\" not approved after {} iterations; keeping the last draft",
            topic.title,
            max_iterations
        );
        advance(&mut state, LoopState::Exhausted);
        Ok(self.finish(topic, Outcome::Exhausted, history))
    }

    fn finish(&self, topic: &Topic, outcome: Outcome, history: RunHistory) -> RefinementResult {
        let result = RefinementResult::new(outcome, self.config.max_iterations, history);
        self.emit(
            topic,
            LoopEvent::Finished {
                outcome,
                iterations: result.iterations(),
            },
        );
        result
    }

    fn fail(
        &self,
        topic: &Topic,
        iteration: usize,
        source: RoleFailure,
        mut state: LoopState,
        partial: RunHistory,
    ) -> RefinementError {
        let role = source.role();
        tracing::warn!(
            "{} failed at iteration {} for \"{}\": {}",
            role,
            iteration,
            topic.title,
            source
        );
        advance(&mut state, LoopState::Failed);
        RefinementError::RoleFailed {
            iteration,
            role,
            source,
            partial,
        }
    }

    fn emit(&self, topic: &Topic, event: LoopEvent) {
        if let Some(tx) = &self.progress {
            let _ = tx.send(ProgressUpdate {
                topic: topic.title.clone(),
                event,
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::refinement::{CriticVerdict, EvaluationError, Role};
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    /// Writer that numbers its drafts and can fail on a chosen call
    struct ScriptedWriter {
        calls: Mutex<Vec<Option<String>>>,
        fail_on: Option<usize>,
    }

    impl ScriptedWriter {
        fn new() -> Self {
            Self {
                calls: Mutex::new(Vec::new()),
                fail_on: None,
            }
        }

        fn failing_on(call: usize) -> Self {
            Self {
                fail_on: Some(call),
                ..Self::new()
            }
        }

        /// Feedback each call was revising from
        fn seen_feedback(&self) -> Vec<Option<String>> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Writer for ScriptedWriter {
        async fn write(&self, request: WriteRequest<'_>) -> Result<String, GenerationError> {
            let call = {
                let mut calls = self.calls.lock().unwrap();
                calls.push(request.revision.map(|r| r.verdict.feedback.clone()));
                calls.len()
            };
            if self.fail_on == Some(call) {
                return Err(GenerationError::Provider(anyhow::anyhow!("timed out")));
            }
            Ok(format!("draft {call} about {}", request.topic.title))
        }
    }

    /// Critic that replays scripted verdicts, then keeps asking for revisions
    struct ScriptedCritic {
        script: Mutex<VecDeque<Result<CriticVerdict, EvaluationError>>>,
    }

    impl ScriptedCritic {
        fn new(script: Vec<Result<CriticVerdict, EvaluationError>>) -> Self {
            Self {
                script: Mutex::new(script.into()),
            }
        }

        fn always_revise() -> Self {
            Self::new(Vec::new())
        }
    }

    #[async_trait]
    impl Critic for ScriptedCritic {
        async fn evaluate(
            &self,
            request: EvaluateRequest<'_>,
        ) -> Result<CriticVerdict, EvaluationError> {
            self.script.lock().unwrap().pop_front().unwrap_or_else(|| {
                Ok(CriticVerdict::revise(
                    60,
                    format!("improve v{}", request.draft.version),
                ))
            })
        }
    }

    fn build_loop(writer: ScriptedWriter, critic: ScriptedCritic, max: usize) -> RefinementLoop {
        RefinementLoop::new(
            Arc::new(writer),
            Arc::new(critic),
            RefinementConfig {
                max_iterations: max,
            },
        )
    }

    fn profile() -> StyleProfile {
        StyleProfile::new("Ada", "curious")
    }

    #[tokio::test]
    async fn test_exhaustion_keeps_every_round() {
        let refinement = build_loop(ScriptedWriter::new(), ScriptedCritic::always_revise(), 3);
        let result = refinement
            .refine(&Topic::new("Remote work"), &profile(), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(result.outcome(), Outcome::Exhausted);
        assert!(!result.approved());
        assert_eq!(result.iterations(), 3);
        assert_eq!(result.drafts().len(), 3);
        assert_eq!(result.verdicts().len(), 3);
        assert_eq!(result.final_draft().map(|d| d.version), Some(3));
    }

    #[tokio::test]
    async fn test_revisions_carry_previous_feedback() {
        let writer = Arc::new(ScriptedWriter::new());
        let refinement = RefinementLoop::new(
            writer.clone(),
            Arc::new(ScriptedCritic::always_revise()),
            RefinementConfig { max_iterations: 3 },
        );
        let result = refinement
            .refine(&Topic::new("Hiring"), &profile(), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(
            writer.seen_feedback(),
            vec![None, Some("improve v1".to_string()), Some("improve v2".to_string())]
        );
        let drafts = result.drafts();
        assert_eq!(drafts[0].feedback, None);
        assert_eq!(drafts[1].feedback.as_deref(), Some("improve v1"));
        assert_eq!(
            drafts.iter().map(|d| d.version).collect::<Vec<_>>(),
            vec![1, 2, 3]
        );
    }

    #[tokio::test]
    async fn test_failure_in_verdict_validation_is_critic_failure() {
        // a non-LLM critic that breaks the contract is still caught by the loop
        let critic = ScriptedCritic::new(vec![Ok(CriticVerdict::revise(50, ""))]);
        let refinement = build_loop(ScriptedWriter::new(), critic, 3);

        let err = refinement
            .refine(&Topic::new("Hiring"), &profile(), &CancellationToken::new())
            .await
            .unwrap_err();
        assert_eq!(err.role(), Some(Role::Critic));
        assert_eq!(err.iteration(), Some(1));
        let partial = err.partial_history().unwrap();
        assert_eq!(partial.drafts().len(), 1);
        assert!(partial.verdicts().is_empty());
    }

    #[tokio::test]
    async fn test_invalid_input_rejected_before_any_role_call() {
        let writer = Arc::new(ScriptedWriter::new());
        let refinement = RefinementLoop::new(
            writer.clone(),
            Arc::new(ScriptedCritic::always_revise()),
            RefinementConfig::default(),
        );

        let err = refinement
            .refine(&Topic::new(" "), &profile(), &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, RefinementError::InvalidInput(_)));

        let zero = RefinementLoop::new(
            writer.clone(),
            Arc::new(ScriptedCritic::always_revise()),
            RefinementConfig { max_iterations: 0 },
        );
        let err = zero
            .refine(&Topic::new("Hiring"), &profile(), &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, RefinementError::InvalidInput(_)));
        assert!(writer.seen_feedback().is_empty());
    }

    #[tokio::test]
    async fn test_cancelled_before_start() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let refinement = build_loop(ScriptedWriter::new(), ScriptedCritic::always_revise(), 3);

        let result = refinement
            .refine(&Topic::new("Hiring"), &profile(), &cancel)
            .await
            .unwrap();
        assert_eq!(result.outcome(), Outcome::Cancelled);
        assert_eq!(result.iterations(), 0);
        assert!(result.final_draft().is_none());
    }

    #[tokio::test]
    async fn test_progress_events() {
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        let critic = ScriptedCritic::new(vec![Ok(CriticVerdict::approve(91, "great"))]);
        let refinement = build_loop(ScriptedWriter::new(), critic, 3).with_progress(tx);

        refinement
            .refine(&Topic::new("Hiring"), &profile(), &CancellationToken::new())
            .await
            .unwrap();
        drop(refinement);

        let mut events = Vec::new();
        while let Some(update) = rx.recv().await {
            assert_eq!(update.topic, "Hiring");
            events.push(update.event);
        }
        assert_eq!(
            events,
            vec![
                LoopEvent::IterationStarted {
                    iteration: 1,
                    max_iterations: 3
                },
                LoopEvent::DraftWritten {
                    iteration: 1,
                    chars: "draft 1 about Hiring".len()
                },
                LoopEvent::VerdictReceived {
                    iteration: 1,
                    score: 91,
                    approved: true
                },
                LoopEvent::Finished {
                    outcome: Outcome::Approved,
                    iterations: 1
                },
            ]
        );
    }

    #[tokio::test]
    async fn test_dropped_progress_receiver_is_ignored() {
        let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
        drop(rx);
        let refinement =
            build_loop(ScriptedWriter::new(), ScriptedCritic::always_revise(), 2).with_progress(tx);

        let result = refinement
            .refine(&Topic::new("Hiring"), &profile(), &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(result.iterations(), 2);
    }
}
