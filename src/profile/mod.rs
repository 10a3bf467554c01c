// Style profile: the writing-style fingerprint of one subject
//
// Produced upstream from the subject's published posts and consumed
// read-only by the writer and critic roles.

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Posts shorter than this carry too little style signal to use as examples
const MIN_EXAMPLE_POST_CHARS: usize = 100;

/// A post type needs this many posts of its own before they replace the full set
const MIN_POST_TYPE_POSTS: usize = 3;

/// A recurring kind of post the subject writes ("Story", "Event recap", ...)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PostType {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    /// What posts of this type have in common: structure, hooks, length
    #[serde(default)]
    pub analysis: Option<String>,
    /// Real posts of this type
    #[serde(default)]
    pub example_posts: Vec<String>,
}

/// Immutable description of how a subject writes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StyleProfile {
    /// Display name of the subject
    pub name: String,
    /// Primary tone ("warm and direct", "provocative", ...)
    pub tone: String,
    /// Narrative perspective ("first person singular", "we", ...)
    #[serde(default = "default_perspective")]
    pub perspective: String,
    /// How readers are addressed ("informal you", "formal", ...)
    #[serde(default)]
    pub form_of_address: Option<String>,
    /// Writing language, e.g. "German". Unset means English.
    #[serde(default)]
    pub language: Option<String>,
    /// Emotional intensity on a 1-10 scale
    #[serde(default)]
    pub energy_level: Option<u8>,
    /// Recurring phrases that mark the subject's voice
    #[serde(default)]
    pub signature_phrases: Vec<String>,
    /// How posts typically open
    #[serde(default)]
    pub hook_patterns: Vec<String>,
    /// Post structures, e.g. "Hook -> Story -> Insight -> CTA"
    #[serde(default)]
    pub structure_templates: Vec<String>,
    /// Who the posts are written for
    #[serde(default)]
    pub audience: Option<String>,
    /// Real posts by the subject, used as style reference
    #[serde(default)]
    pub example_posts: Vec<String>,
    #[serde(default)]
    pub post_types: Vec<PostType>,
}

fn default_perspective() -> String {
    "first person singular".to_string()
}

impl StyleProfile {
    /// Minimal profile; everything else stays empty
    pub fn new(name: impl Into<String>, tone: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            tone: tone.into(),
            perspective: default_perspective(),
            form_of_address: None,
            language: None,
            energy_level: None,
            signature_phrases: Vec::new(),
            hook_patterns: Vec::new(),
            structure_templates: Vec::new(),
            audience: None,
            example_posts: Vec::new(),
            post_types: Vec::new(),
        }
    }

    pub fn from_json_str(json: &str) -> Result<Self> {
        let profile: Self = serde_json::from_str(json).context("Invalid style profile JSON")?;
        profile.validate()?;
        Ok(profile)
    }

    pub fn from_json_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read style profile {}", path.display()))?;
        Self::from_json_str(&contents).with_context(|| format!("In {}", path.display()))
    }

    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            bail!("style profile has no name");
        }
        if self.tone.trim().is_empty() {
            bail!("style profile '{}' has no tone", self.name);
        }
        if let Some(level) = self.energy_level {
            if !(1..=10).contains(&level) {
                bail!("energy_level must be within 1..=10 (got {level})");
            }
        }
        Ok(())
    }

    /// Up to `limit` substantial example posts, in profile order
    pub fn example_posts(&self, limit: usize) -> Vec<&str> {
        substantial(&self.example_posts).take(limit).collect()
    }

    /// Post type called `name`, ignoring case
    pub fn post_type(&self, name: &str) -> Option<&PostType> {
        let name = name.trim();
        self.post_types
            .iter()
            .find(|t| t.name.trim().eq_ignore_ascii_case(name))
    }

    /// Every substantial post to pick style references from.
    ///
    /// With a known post type that has at least 3 posts, only that type's
    /// posts are used; otherwise all of the subject's posts.
    pub fn reference_posts(&self, post_type: Option<&str>) -> Vec<&str> {
        if let Some(kind) = post_type.and_then(|name| self.post_type(name)) {
            if kind.example_posts.len() >= MIN_POST_TYPE_POSTS {
                return substantial(&kind.example_posts).collect();
            }
            tracing::info!(
                "Post type '{}' has only {} posts, using all posts",
                kind.name,
                kind.example_posts.len()
            );
        }
        substantial(&self.example_posts).collect()
    }
}

fn substantial(posts: &[String]) -> impl Iterator<Item = &str> {
    posts
        .iter()
        .map(|p| p.trim())
        .filter(|p| p.chars().count() > MIN_EXAMPLE_POST_CHARS)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minimal_json_uses_defaults() {
        let profile = StyleProfile::from_json_str(r#"{"name": "Ada", "tone": "curious"}"#).unwrap();
        assert_eq!(profile.perspective, "first person singular");
        assert!(profile.signature_phrases.is_empty());
        assert!(profile.energy_level.is_none());
    }

    #[test]
    fn test_blank_tone_rejected() {
        let err = StyleProfile::from_json_str(r#"{"name": "Ada", "tone": "  "}"#).unwrap_err();
        assert!(err.to_string().contains("no tone"));
    }

    #[test]
    fn test_energy_level_out_of_range() {
        let mut profile = StyleProfile::new("Ada", "curious");
        profile.energy_level = Some(11);
        assert!(profile.validate().is_err());
    }

    #[test]
    fn test_example_posts_skips_short_posts() {
        let mut profile = StyleProfile::new("Ada", "curious");
        profile.example_posts = vec![
            "too short".to_string(),
            "a".repeat(150),
            "b".repeat(101),
            "c".repeat(300),
        ];

        let examples = profile.example_posts(2);
        assert_eq!(examples.len(), 2);
        assert!(examples[0].starts_with('a'));
        assert!(examples[1].starts_with('b'));
    }

    fn typed_profile(story_posts: usize) -> StyleProfile {
        let mut profile = StyleProfile::new("Ada", "curious");
        profile.example_posts = vec!["general ".repeat(20), "another ".repeat(20)];
        profile.post_types = vec![PostType {
            name: "Story".to_string(),
            description: None,
            analysis: Some("Opens with a scene".to_string()),
            example_posts: (0..story_posts).map(|i| format!("story {i} {}", "x".repeat(120))).collect(),
        }];
        profile
    }

    #[test]
    fn test_reference_posts_prefers_post_type() {
        let profile = typed_profile(3);
        let posts = profile.reference_posts(Some("story"));
        assert_eq!(posts.len(), 3);
        assert!(posts.iter().all(|p| p.starts_with("story")));
    }

    #[test]
    fn test_reference_posts_falls_back_to_all_posts() {
        let profile = typed_profile(2);
        let posts = profile.reference_posts(Some("Story"));
        assert_eq!(posts.len(), 2);
        assert!(posts[0].starts_with("general"));

        assert_eq!(profile.reference_posts(Some("Unknown")).len(), 2);
        assert_eq!(profile.reference_posts(None).len(), 2);
    }

    #[test]
    fn test_post_types_parse_from_json() {
        let profile = StyleProfile::from_json_str(
            r#"{"name": "Ada", "tone": "curious", "post_types": [{"name": "Story", "analysis": "Scene first"}]}"#,
        )
        .unwrap();
        let story = profile.post_type(" STORY ").unwrap();
        assert_eq!(story.analysis.as_deref(), Some("Scene first"));
        assert!(story.example_posts.is_empty());
    }
}
