// LLM-backed critic: scores drafts against the subject's style and a fixed rubric

use async_trait::async_trait;
use serde::Deserialize;
use std::fmt::Write as _;
use std::sync::Arc;

use super::{
    examples_section, invoke, strip_markdown_fences, ApprovalPolicy, Critic, EvaluateRequest,
    ModelParams,
};
use crate::config::constants::DEFAULT_CRITIC_TEMPERATURE;
use crate::profile::StyleProfile;
use crate::providers::LlmProvider;
use crate::refinement::{CriticVerdict, EvaluationError, ScoreBreakdown, SpecificChange};

const RUBRIC: &str = "SCORING CRITERIA (100 points total):

1. Authenticity & style (40 points)
   - Sounds natural and human, not machine-written
   - Matches the subject's tone
   - No AI cliches (\"In today's fast-paced world\", \"Let's dive in\", ...)

2. Content quality (35 points)
   - Strong, attention-grabbing hook
   - Clear value for the audience
   - Good structure and flow
   - Fitting call to action

3. Technical execution (25 points)
   - Correct perspective and form of address
   - Appropriate length
   - Clean formatting

APPROVAL THRESHOLDS:
- >= 85 points: approve (ready to publish)
- 75-84 points: nearly there, small adjustments
- < 75 points: needs revision

FEEDBACK RULES:
- Give exact wording suggestions (not \"improve the hook\" but \"change 'X' to 'Y'\")
- At most 3 improvements per iteration
- Acknowledge improvements when the post has been revised";

const RESPONSE_SCHEMA: &str = r#"Respond in JSON:

{
  "approved": true/false,
  "overall_score": 0-100,
  "scores": {
    "authenticity_and_style": 0-40,
    "content_quality": 0-35,
    "technical_execution": 0-25
  },
  "strengths": ["strength 1", "strength 2"],
  "improvements": ["improvement 1", "improvement 2"],
  "feedback": "Short summary",
  "specific_changes": [
    {
      "original": "Exact text from the post to change",
      "replacement": "The proposed new text",
      "reason": "Why this change"
    }
  ]
}

For specific_changes:
- "original" must appear verbatim in the post
- At most 3 changes per iteration"#;

pub struct LlmCritic {
    provider: Arc<dyn LlmProvider>,
    params: ModelParams,
    policy: ApprovalPolicy,
    example_count: usize,
}

impl LlmCritic {
    pub fn new(provider: Arc<dyn LlmProvider>) -> Self {
        Self {
            provider,
            params: ModelParams::new(DEFAULT_CRITIC_TEMPERATURE, 2048),
            policy: ApprovalPolicy::default(),
            example_count: 3,
        }
    }

    pub fn with_params(mut self, params: ModelParams) -> Self {
        self.params = params;
        self
    }

    pub fn with_policy(mut self, policy: ApprovalPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_example_count(mut self, count: usize) -> Self {
        self.example_count = count;
        self
    }

    pub fn policy(&self) -> &ApprovalPolicy {
        &self.policy
    }

    pub(crate) fn system_prompt(&self, profile: &StyleProfile, iteration: usize, max_iterations: usize) -> String {
        let mut prompt = String::from(
            "You are an experienced LinkedIn content editor.\n\n\
             Your job: score posts and suggest CONCRETE, ACTIONABLE improvements.",
        );
        prompt.push_str(&examples_section(
            "REAL POSTS BY THE SUBJECT (compare the style!):",
            &profile.example_posts(self.example_count),
        ));
        prompt.push('\n');
        prompt.push_str(&iteration_guidance(iteration, max_iterations));

        prompt.push_str("\n\nREFERENCE PROFILE:\n");
        let _ = writeln!(prompt, "- Tone: {}", profile.tone);
        let _ = writeln!(prompt, "- Perspective: {}", profile.perspective);
        if let Some(address) = &profile.form_of_address {
            let _ = writeln!(prompt, "- Form of address: {address}");
        }
        if let Some(level) = profile.energy_level {
            let _ = writeln!(prompt, "- Energy level: {level}/10");
        }
        if let Some(language) = &profile.language {
            let _ = writeln!(prompt, "- Language: {language}");
        }

        prompt.push('\n');
        prompt.push_str(RUBRIC);
        prompt.push_str("\n\nAnswer as JSON.");
        prompt
    }

    pub(crate) fn user_prompt(request: &EvaluateRequest<'_>) -> String {
        let mut prompt = String::from("Score this LinkedIn post:\n");
        if request.iteration > 1 {
            let _ = writeln!(
                prompt,
                "\nNOTE: this is iteration {} of {}. The post has already been revised.",
                request.iteration, request.max_iterations
            );
        }
        if request.is_final_iteration() {
            prompt.push_str(
                "LAST CHANCE: score generously and approve if the post is fundamentally good (>= 80 points).\n",
            );
        }
        let _ = write!(
            prompt,
            "\nTOPIC: {}\n\nPOST:\n{}\n\n---\n\n{}",
            request.topic.title, request.draft.content, RESPONSE_SCHEMA
        );
        prompt
    }
}

fn iteration_guidance(iteration: usize, max_iterations: usize) -> String {
    if iteration >= max_iterations {
        "FINAL ITERATION - be generous:\n\
         - The post has already been revised\n\
         - Accept the post if it is fundamentally good (score >= 80)\n\
         - Small imperfections are fine; judge whether it is publishable, not perfect"
            .to_string()
    } else if iteration <= 1 {
        "FIRST ITERATION - focus on the most important improvements:\n\
         - Concentrate on at most 2-3 critical points\n\
         - Give very specific change instructions (e.g. \"change the hook from 'X' to 'Y'\")\n\
         - Small stylistic nuances can be polished later"
            .to_string()
    } else {
        format!(
            "ITERATION {iteration}/{max_iterations} - acknowledge progress:\n\
             - Check whether earlier points were addressed\n\
             - Focus on the remaining improvements\n\
             - Again give specific change instructions"
        )
    }
}

#[async_trait]
impl Critic for LlmCritic {
    async fn evaluate(&self, request: EvaluateRequest<'_>) -> Result<CriticVerdict, EvaluationError> {
        let provider_request = self
            .params
            .request(
                self.system_prompt(request.profile, request.iteration, request.max_iterations),
                Self::user_prompt(&request),
            )
            .with_json_mode(true);

        let raw = invoke(&self.provider, &provider_request)
            .await
            .map_err(EvaluationError::Provider)?;

        // leniency may approve a verdict that came without feedback, so
        // the contract is checked only after the policy has run
        let verdict = self.policy.apply(parse_verdict(&raw)?, request.is_final_iteration());
        verdict.validate()?;

        tracing::info!(
            "Critic: {} ({}/100) for draft v{}",
            if verdict.approved { "APPROVED" } else { "NEEDS REVISION" },
            verdict.score,
            request.draft.version
        );
        Ok(verdict)
    }
}

/// Raw JSON shape from the LLM; everything optional so missing fields can be reported precisely
#[derive(Debug, Deserialize)]
struct RawVerdict {
    approved: Option<bool>,
    overall_score: Option<serde_json::Value>,
    #[serde(default)]
    scores: Option<RawScores>,
    #[serde(default)]
    strengths: Vec<String>,
    #[serde(default)]
    improvements: Vec<String>,
    #[serde(default)]
    feedback: Option<String>,
    #[serde(default)]
    specific_changes: Vec<SpecificChange>,
}

#[derive(Debug, Deserialize)]
struct RawScores {
    authenticity_and_style: Option<i64>,
    content_quality: Option<i64>,
    technical_execution: Option<i64>,
}

impl RawScores {
    /// Sub-scores are informational; an incomplete or out-of-range set is dropped
    fn into_breakdown(self) -> Option<ScoreBreakdown> {
        let within = |value: Option<i64>, max: i64| {
            value
                .filter(|v| (0..=max).contains(v))
                .and_then(|v| u8::try_from(v).ok())
        };
        Some(ScoreBreakdown {
            authenticity: within(self.authenticity_and_style, 40)?,
            content_quality: within(self.content_quality, 35)?,
            technical_execution: within(self.technical_execution, 25)?,
        })
    }
}

/// Parse the critic's JSON response into a verdict.
///
/// Scores outside 0..=100 are rejected, never clamped. A revise verdict
/// without feedback falls back to its improvements joined together and may
/// still come back with empty feedback; `CriticVerdict::validate` decides.
pub fn parse_verdict(text: &str) -> Result<CriticVerdict, EvaluationError> {
    let stripped = strip_markdown_fences(text.trim());

    let raw: RawVerdict = match serde_json::from_str(stripped) {
        Ok(raw) => raw,
        Err(first_err) => {
            // the model sometimes wraps the object in prose
            let slice = match (stripped.find('{'), stripped.rfind('}')) {
                (Some(start), Some(end)) if start < end => &stripped[start..=end],
                _ => return Err(EvaluationError::Malformed(first_err.to_string())),
            };
            serde_json::from_str(slice).map_err(|e| EvaluationError::Malformed(e.to_string()))?
        }
    };

    let score = match raw.overall_score {
        None | Some(serde_json::Value::Null) => {
            return Err(EvaluationError::Malformed("missing overall_score".to_string()))
        }
        Some(value) => integer_score(&value)?,
    };
    let score = u8::try_from(score)
        .ok()
        .filter(|s| *s <= 100)
        .ok_or(EvaluationError::ScoreOutOfRange(score))?;

    let approved = raw
        .approved
        .ok_or_else(|| EvaluationError::Malformed("missing approved flag".to_string()))?;

    let mut feedback = raw.feedback.unwrap_or_default().trim().to_string();
    if !approved && feedback.is_empty() {
        feedback = raw.improvements.join("; ");
    }

    Ok(CriticVerdict {
        score,
        feedback,
        approved,
        strengths: raw.strengths,
        improvements: raw.improvements,
        specific_changes: raw.specific_changes,
        breakdown: raw.scores.and_then(RawScores::into_breakdown),
    })
}

/// Whole numbers of any magnitude come back as integers (saturating at the
/// i64 bounds) so the range check can report them.
fn integer_score(value: &serde_json::Value) -> Result<i64, EvaluationError> {
    if let Some(n) = value.as_i64() {
        return Ok(n);
    }
    if value.as_u64().is_some() {
        return Ok(i64::MAX);
    }
    match value.as_f64() {
        // `as` saturates for floats beyond the i64 range
        Some(f) if f.is_finite() && f.fract() == 0.0 => Ok(f as i64),
        _ => Err(EvaluationError::Malformed(format!(
            "overall_score is not an integer: {value}"
        ))),
    }
}
