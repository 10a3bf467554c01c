// LLM-backed writer: ghostwrites posts in the subject's voice

use async_trait::async_trait;
use futures::future::join_all;
use rand::rngs::SmallRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use serde::Deserialize;
use std::fmt::Write as _;
use std::sync::Arc;

use super::{
    examples_section, invoke, strip_markdown_fences, Lessons, ModelParams, Revision, WriteRequest,
    Writer,
};
use crate::config::constants::{
    DEFAULT_MAX_TOKENS, DEFAULT_WRITER_TEMPERATURE, MAX_MULTI_DRAFT_COUNT,
};
use crate::profile::{PostType, StyleProfile};
use crate::providers::LlmProvider;
use crate::refinement::{GenerationError, Topic};

/// Phrases that make a post read as machine-written
const GUARDRAILS: &[&str] = &[
    "\"In today's fast-paced world\", \"Let's dive in\", \"It's no secret that\"",
    "\"Imagine a world where\", \"Let that sink in\", \"Here's the thing\"",
    "dashes to join sentences; use commas or full stops instead",
    "lecturing the reader when the subject writes in the first person",
    "empty superlatives without substance",
    "overly polished phrasing; real people write with rough edges",
];

/// How one of several parallel first drafts approaches the topic
struct DraftAngle {
    name: &'static str,
    temperature: f32,
    emphasis: &'static str,
}

static DRAFT_ANGLES: [DraftAngle; MAX_MULTI_DRAFT_COUNT] = [
    DraftAngle {
        name: "hook",
        temperature: 0.5,
        emphasis: "Focus on a STRONG, surprising hook. The first sentence has to grab the reader.",
    },
    DraftAngle {
        name: "storytelling",
        temperature: 0.7,
        emphasis: "Focus on STORYTELLING. Build in a short story or anecdote.",
    },
    DraftAngle {
        name: "value",
        temperature: 0.6,
        emphasis: "Focus on CONCRETE VALUE. What exactly does the reader take away?",
    },
    DraftAngle {
        name: "emotion",
        temperature: 0.8,
        emphasis: "Focus on EMOTION. Speak to feelings and personal experience.",
    },
    DraftAngle {
        name: "provocation",
        temperature: 0.55,
        emphasis: "Focus on PROVOCATION. Put forward a thesis that makes people think.",
    },
];

const SELECTOR_SYSTEM: &str =
    "You are a content editor who compares LinkedIn post drafts and picks the best one.";

/// Low so the pick is stable
const SELECTOR_TEMPERATURE: f32 = 0.2;

const MAX_KEYWORDS: usize = 15;

const STOP_WORDS: &[&str] = &[
    "werden", "dass", "nach", "wird", "einer", "noch", "einem", "einen", "über", "kann", "sein",
    "nicht", "oder", "aber", "wenn", "ihre", "mehr", "neue", "neuen", "können", "durch", "diese",
    "dieser", "that", "this", "have", "from", "your", "with", "about", "what", "when", "will",
    "them", "they", "their", "there", "were", "been", "into", "than", "then", "just", "also",
];

pub struct LlmWriter {
    provider: Arc<dyn LlmProvider>,
    params: ModelParams,
    example_count: usize,
    lessons: Lessons,
    draft_count: usize,
    semantic_matching: bool,
    seed: Option<u64>,
}

/// A first draft that came back from the model
struct Candidate {
    /// 1-based, as shown to the selector
    number: usize,
    angle: &'static DraftAngle,
    content: String,
}

#[derive(Debug, Deserialize)]
struct DraftChoice {
    #[serde(default = "first_draft_number")]
    winner: usize,
    #[serde(default)]
    reason: String,
}

fn first_draft_number() -> usize {
    1
}

impl LlmWriter {
    pub fn new(provider: Arc<dyn LlmProvider>) -> Self {
        Self {
            provider,
            params: ModelParams::new(DEFAULT_WRITER_TEMPERATURE, DEFAULT_MAX_TOKENS),
            example_count: 3,
            lessons: Lessons::default(),
            draft_count: 1,
            semantic_matching: true,
            seed: None,
        }
    }

    pub fn with_params(mut self, params: ModelParams) -> Self {
        self.params = params;
        self
    }

    /// Number of real posts shown as style reference
    pub fn with_example_count(mut self, count: usize) -> Self {
        self.example_count = count;
        self
    }

    /// Feedback from earlier posts, to be avoided up front
    pub fn with_lessons(mut self, lessons: Lessons) -> Self {
        self.lessons = lessons;
        self
    }

    /// First drafts written in parallel, clamped to 1..=5. With more than
    /// one, the model picks the best before the critic sees it. Revisions
    /// are always a single draft.
    pub fn with_draft_count(mut self, count: usize) -> Self {
        self.draft_count = count.clamp(1, MAX_MULTI_DRAFT_COUNT);
        self
    }

    /// Rank example posts by keyword overlap with the topic (default), or sample them at random
    pub fn with_semantic_matching(mut self, enabled: bool) -> Self {
        self.semantic_matching = enabled;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Style references for `topic`, drawn from its post type when the profile has enough of those
    pub(crate) fn pick_examples<'p>(&self, topic: &Topic, profile: &'p StyleProfile) -> Vec<&'p str> {
        let pool = profile.reference_posts(topic.post_type.as_deref());
        let mut rng = match self.seed {
            Some(seed) => SmallRng::seed_from_u64(seed),
            None => SmallRng::from_entropy(),
        };
        if self.semantic_matching {
            select_examples(topic, &pool, self.example_count, &mut rng)
        } else {
            pool.choose_multiple(&mut rng, self.example_count)
                .copied()
                .collect()
        }
    }

    pub(crate) fn system_prompt(
        &self,
        profile: &StyleProfile,
        examples: &[&str],
        post_type: Option<&PostType>,
    ) -> String {
        let mut prompt = format!(
            "ROLE: You are a first-class LinkedIn ghostwriter. Write a post that sounds \
             exactly like {name}. Adapt completely to the profile below.",
            name = profile.name
        );
        prompt.push_str(&examples_section(
            "REFERENCE POSTS BY THE SUBJECT (match this style!):",
            examples,
        ));

        prompt.push_str("\n\n1. STYLE & VOICE\n");
        let _ = writeln!(prompt, "Tone: {}", profile.tone);
        let _ = writeln!(prompt, "Perspective (follow strictly): {}", profile.perspective);
        if let Some(address) = &profile.form_of_address {
            let _ = writeln!(prompt, "Form of address (follow strictly): {address}");
        }
        if let Some(level) = profile.energy_level {
            let _ = writeln!(
                prompt,
                "Energy level (1-10): {level}. Match the intensity of the text to this value."
            );
        }
        if let Some(audience) = &profile.audience {
            let _ = writeln!(prompt, "Audience: {audience}");
        }
        if let Some(language) = &profile.language {
            let _ = writeln!(prompt, "Language: write the post in {language}.");
        }

        if !profile.hook_patterns.is_empty() || !profile.signature_phrases.is_empty() {
            prompt.push_str("\n2. PHRASES (pick what fits, do not use them all)\n");
            push_list(&mut prompt, "Hook patterns (inspiration, never copy 1:1):", &profile.hook_patterns);
            push_list(&mut prompt, "Signature phrases (at most 1-2, organically):", &profile.signature_phrases);
        }

        if !profile.structure_templates.is_empty() {
            prompt.push_str("\n3. STRUCTURE\n");
            push_list(&mut prompt, "Typical structures:", &profile.structure_templates);
        }

        if let Some(kind) = post_type {
            let _ = writeln!(prompt, "\nPOST TYPE: {}", kind.name);
            if let Some(description) = &kind.description {
                let _ = writeln!(prompt, "{}", description.trim());
            }
            if let Some(analysis) = &kind.analysis {
                let _ = writeln!(
                    prompt,
                    "What the subject's posts of this type have in common (follow it):\n{}",
                    analysis.trim()
                );
            }
        }

        prompt.push_str("\n4. GUARDRAILS\nAlways avoid:\n");
        for rule in GUARDRAILS {
            let _ = writeln!(prompt, "- {rule}");
        }

        let mut section = 5;
        if !self.lessons.critical.is_empty() {
            let _ = writeln!(
                prompt,
                "\n{section}. LESSONS LEARNED (these led to low scores, avoid them at all costs)"
            );
            for lesson in &self.lessons.critical {
                let _ = writeln!(prompt, "- {lesson}");
            }
            section += 1;
        }
        if !self.lessons.recurring.is_empty() {
            let _ = writeln!(
                prompt,
                "\n{section}. RECURRING FEEDBACK (often requested on earlier posts)"
            );
            for lesson in &self.lessons.recurring {
                let _ = writeln!(prompt, "- {lesson}");
            }
        }
        if !self.lessons.is_empty() {
            prompt.push_str("Address these points proactively.\n");
        }

        prompt.push_str(
            "\nStart directly with the hook. No preamble, no \"Here is the post\".",
        );
        prompt
    }

    fn first_draft_prompt(topic: &Topic, angle: Option<&DraftAngle>) -> String {
        let mut prompt = format!("Write a LinkedIn post about this topic:\n\nTOPIC: {}\n", topic.title);
        if let Some(category) = &topic.category {
            let _ = writeln!(prompt, "CATEGORY: {category}");
        }
        if let Some(description) = &topic.description {
            let _ = write!(prompt, "\nCONTEXT:\n{description}\n");
        }
        if let Some(angle) = angle {
            let _ = write!(
                prompt,
                "\nYOUR ANGLE FOR THIS DRAFT ({}):\n{}\n",
                angle.name, angle.emphasis
            );
        }
        prompt.push_str(
            "\nTASK:\n\
             1. Open with a strong, unexpected hook\n\
             2. Pick up the topic and give the reader real value\n\
             3. Add a personal note or opinion\n\
             4. End with a fitting call to action\n\n\
             Return ONLY the finished post.",
        );
        prompt
    }

    pub(crate) fn revision_prompt(topic: &Topic, revision: &Revision<'_>) -> String {
        let verdict = revision.verdict;
        let mut prompt = format!(
            "REVISE the post on \"{title}\" based on the editor's feedback.\n\n\
             PREVIOUS VERSION:\n{previous}\n\n\
             CURRENT SCORE: {score}/100\n\n\
             FEEDBACK:\n{feedback}\n",
            title = topic.title,
            previous = revision.previous.content,
            score = verdict.score,
            feedback = verdict.feedback.trim(),
        );

        if !verdict.specific_changes.is_empty() {
            prompt.push_str("\nCONCRETE CHANGES (apply exactly):\n");
            for (i, change) in verdict.specific_changes.iter().enumerate() {
                let _ = write!(
                    prompt,
                    "{}. Replace \"{}\" with \"{}\"",
                    i + 1,
                    change.original,
                    change.replacement
                );
                if change.reason.trim().is_empty() {
                    prompt.push('\n');
                } else {
                    let _ = writeln!(prompt, " ({})", change.reason.trim());
                }
            }
        }

        if !verdict.improvements.is_empty() {
            push_list(&mut prompt, "\nFURTHER IMPROVEMENTS:", &verdict.improvements);
        }

        prompt.push_str(
            "\nYOUR TASK:\n\
             1. Apply the concrete changes exactly\n\
             2. Keep everything that was not criticised\n\
             3. Aim for a score of at least 85\n\n\
             Return ONLY the revised post, no commentary.",
        );
        prompt
    }

    fn selector_prompt(topic: &Topic, profile: &StyleProfile, candidates: &[Candidate]) -> String {
        let mut prompt = format!(
            "Pick the BEST draft.\n\nTOPIC OF THE POST:\n{}\n\nSTYLE REQUIREMENTS:\n- Tone: {}\n",
            topic.title, profile.tone
        );
        if let Some(level) = profile.energy_level {
            let _ = writeln!(prompt, "- Energy level: {level}/10");
        }
        if let Some(address) = &profile.form_of_address {
            let _ = writeln!(prompt, "- Form of address: {address}");
        }
        if !profile.hook_patterns.is_empty() {
            let hooks: Vec<&str> = profile.hook_patterns.iter().take(3).map(String::as_str).collect();
            let _ = writeln!(prompt, "- Typical hooks: {}", hooks.join(", "));
        }

        prompt.push_str("\nTHE DRAFTS:\n");
        for candidate in candidates {
            let _ = write!(
                prompt,
                "\n=== DRAFT {} ({}) ===\n{}\n=== END OF DRAFT ===\n",
                candidate.number, candidate.angle.name, candidate.content
            );
        }

        prompt.push_str(
            r#"
CRITERIA:
1. Hook quality (30%): how attention-grabbing is the first sentence?
2. Style match (25%): how well does the draft fit the style above?
3. Value (25%): how much concrete use does the post offer?
4. Naturalness (20%): how authentic and human does it sound?

Analyse each draft briefly and pick the best. Respond in JSON:

{
  "analysis": [
    {"draft": 1, "hook_score": 8, "style_score": 7, "value_score": 8, "natural_score": 7, "total": 30, "notes": "Short reason"}
  ],
  "winner": 1,
  "reason": "Short reason for the pick"
}"#,
        );
        prompt
    }

    /// One model call, cleaned. Blank output is an error.
    async fn generate(&self, system: &str, user: String, temperature: f32) -> Result<String, GenerationError> {
        let params = ModelParams {
            temperature,
            ..self.params.clone()
        };
        let raw = invoke(&self.provider, &params.request(system.to_string(), user))
            .await
            .map_err(GenerationError::Provider)?;

        let post = clean_post_text(&raw);
        if post.is_empty() {
            return Err(GenerationError::EmptyOutput);
        }
        Ok(post)
    }

    async fn write_first_draft(
        &self,
        topic: &Topic,
        profile: &StyleProfile,
        system: &str,
    ) -> Result<String, GenerationError> {
        if self.draft_count <= 1 {
            return self
                .generate(system, Self::first_draft_prompt(topic, None), self.params.temperature)
                .await;
        }

        let angles = &DRAFT_ANGLES[..self.draft_count];
        tracing::info!("Writing {} drafts for '{}'", angles.len(), topic.title);
        let attempts = join_all(angles.iter().map(|angle| {
            self.generate(
                system,
                Self::first_draft_prompt(topic, Some(angle)),
                angle.temperature,
            )
        }))
        .await;

        let mut candidates = Vec::new();
        let mut first_error = None;
        for (i, (angle, attempt)) in angles.iter().zip(attempts).enumerate() {
            match attempt {
                Ok(content) => candidates.push(Candidate {
                    number: i + 1,
                    angle,
                    content,
                }),
                Err(e) => {
                    tracing::warn!("Draft {} ({}) failed: {}", i + 1, angle.name, e);
                    if first_error.is_none() {
                        first_error = Some(e);
                    }
                }
            }
        }

        match candidates.len() {
            0 => Err(first_error.unwrap_or(GenerationError::EmptyOutput)),
            1 => {
                tracing::warn!("Only one draft succeeded, using it directly");
                Ok(candidates.remove(0).content)
            }
            _ => Ok(self.pick_best(topic, profile, candidates).await),
        }
    }

    /// Let the model choose among the drafts. If the choice fails or names
    /// no known draft, the first draft wins.
    async fn pick_best(&self, topic: &Topic, profile: &StyleProfile, mut candidates: Vec<Candidate>) -> String {
        let params = ModelParams {
            temperature: SELECTOR_TEMPERATURE,
            ..self.params.clone()
        };
        let request = params
            .request(
                SELECTOR_SYSTEM.to_string(),
                Self::selector_prompt(topic, profile, &candidates),
            )
            .with_json_mode(true);

        let choice = match invoke(&self.provider, &request).await {
            Ok(raw) => match serde_json::from_str::<DraftChoice>(strip_markdown_fences(&raw)) {
                Ok(choice) => Some(choice),
                Err(e) => {
                    tracing::warn!("Could not parse the draft selection, using the first draft: {e}");
                    None
                }
            },
            Err(e) => {
                tracing::warn!("Draft selection failed, using the first draft: {e:#}");
                None
            }
        };

        let index = match choice {
            Some(choice) => match candidates.iter().position(|c| c.number == choice.winner) {
                Some(index) => {
                    tracing::info!(
                        "Selected draft {} ({}): {}",
                        choice.winner,
                        candidates[index].angle.name,
                        choice.reason
                    );
                    index
                }
                None => {
                    tracing::warn!("Selector picked unknown draft {}, using the first draft", choice.winner);
                    0
                }
            },
            None => 0,
        };
        candidates.swap_remove(index).content
    }
}

fn push_list(prompt: &mut String, heading: &str, items: &[String]) {
    if items.is_empty() {
        return;
    }
    let _ = writeln!(prompt, "{heading}");
    for item in items {
        let _ = writeln!(prompt, "  - {item}");
    }
}

/// Distinct lowercase words of four or more letters from the topic, stop words removed
fn topic_keywords(topic: &Topic) -> Vec<String> {
    let text = format!(
        "{} {} {}",
        topic.title,
        topic.description.as_deref().unwrap_or_default(),
        topic.category.as_deref().unwrap_or_default()
    )
    .to_lowercase();

    let mut keywords: Vec<String> = Vec::new();
    for word in text.split(|c: char| !c.is_alphabetic()) {
        if word.chars().count() < 4 || STOP_WORDS.contains(&word) {
            continue;
        }
        if !keywords.iter().any(|k| k == word) {
            keywords.push(word.to_string());
            if keywords.len() == MAX_KEYWORDS {
                break;
            }
        }
    }
    keywords
}

/// Up to `limit` example posts: the most keyword-relevant ones, one random
/// post for variety, then the best-ranked of the rest.
pub(crate) fn select_examples<'p>(
    topic: &Topic,
    posts: &[&'p str],
    limit: usize,
    rng: &mut impl Rng,
) -> Vec<&'p str> {
    if posts.is_empty() || limit == 0 {
        return Vec::new();
    }

    let keywords = topic_keywords(topic);
    let mut ranked: Vec<(usize, &'p str)> = posts
        .iter()
        .map(|post| {
            let lower = post.to_lowercase();
            let hits = keywords.iter().filter(|k| lower.contains(k.as_str())).count();
            (hits, *post)
        })
        .collect();
    // stable: equal scores keep profile order
    ranked.sort_by(|a, b| b.0.cmp(&a.0));

    let relevant_slots = limit.saturating_sub(1).max(1).min(ranked.len());
    let mut selected: Vec<&'p str> = ranked[..relevant_slots]
        .iter()
        .filter(|(hits, _)| *hits > 0)
        .map(|(_, post)| *post)
        .collect();

    if selected.len() < limit {
        let rest: Vec<&'p str> = ranked[relevant_slots..]
            .iter()
            .map(|(_, post)| *post)
            .filter(|post| !selected.contains(post))
            .collect();
        if let Some(pick) = rest.choose(rng) {
            selected.push(*pick);
        }
    }

    for (_, post) in &ranked {
        if selected.len() >= limit {
            break;
        }
        if !selected.contains(post) {
            selected.push(*post);
        }
    }

    tracing::debug!(
        "Selected {} of {} example posts ({} topic keywords)",
        selected.len(),
        posts.len(),
        keywords.len()
    );
    selected
}

/// Trim model output and strip code fences or quotes wrapped around the post
pub fn clean_post_text(raw: &str) -> String {
    let mut text = raw.trim();

    if let Some(rest) = text.strip_prefix("```") {
        // drop an optional language tag on the fence line; a one-line fence has none
        let rest = rest.split_once('\n').map_or(rest, |(_, body)| body);
        text = rest.strip_suffix("```").unwrap_or(rest).trim();
    }

    for (open, close) in [('"', '"'), ('\u{201C}', '\u{201D}')] {
        if text.len() > 1 && text.starts_with(open) && text.ends_with(close) {
            let inner = &text[open.len_utf8()..text.len() - close.len_utf8()];
            // a post that merely starts and ends with a quotation stays as is
            if !inner.contains(open) && !inner.contains(close) {
                text = inner.trim();
            }
        }
    }

    text.to_string()
}

#[async_trait]
impl Writer for LlmWriter {
    async fn write(&self, request: WriteRequest<'_>) -> Result<String, GenerationError> {
        let examples = self.pick_examples(request.topic, request.profile);
        let post_type = request
            .topic
            .post_type
            .as_deref()
            .and_then(|name| request.profile.post_type(name));
        let system = self.system_prompt(request.profile, &examples, post_type);

        match &request.revision {
            None => {
                self.write_first_draft(request.topic, request.profile, &system)
                    .await
            }
            Some(revision) => {
                self.generate(
                    &system,
                    Self::revision_prompt(request.topic, revision),
                    self.params.temperature,
                )
                .await
            }
        }
    }
}
