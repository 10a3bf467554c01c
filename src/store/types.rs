// Stored records and post status lifecycle

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

use crate::refinement::{CriticVerdict, Draft, Outcome, RefinementResult, Topic};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("failed to prepare database directory: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to (de)serialize stored JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("no style profile stored for '{0}'")]
    MissingProfile(String),

    #[error("post {0} not found")]
    PostNotFound(String),

    #[error("topic {0} not found")]
    TopicNotFound(String),

    #[error("cannot move post from {from} to {to}")]
    IllegalTransition { from: PostStatus, to: PostStatus },

    #[error("refinement result has no draft to store")]
    EmptyResult,

    #[error("corrupt row: {0}")]
    Corrupt(String),
}

/// Publication status of a generated post
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PostStatus {
    Draft,
    Approved,
    Published,
    Rejected,
}

impl PostStatus {
    /// Initial status of a freshly refined post
    pub fn for_result(result: &RefinementResult) -> Self {
        if result.approved() {
            PostStatus::Approved
        } else {
            PostStatus::Draft
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PostStatus::Draft => "draft",
            PostStatus::Approved => "approved",
            PostStatus::Published => "published",
            PostStatus::Rejected => "rejected",
        }
    }

    /// draft -> approved | rejected, approved -> published | rejected
    pub fn can_transition_to(&self, next: PostStatus) -> bool {
        matches!(
            (self, next),
            (PostStatus::Draft, PostStatus::Approved)
                | (PostStatus::Draft, PostStatus::Rejected)
                | (PostStatus::Approved, PostStatus::Published)
                | (PostStatus::Approved, PostStatus::Rejected)
        )
    }
}

impl fmt::Display for PostStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

impl FromStr for PostStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "draft" => Ok(PostStatus::Draft),
            "approved" => Ok(PostStatus::Approved),
            "published" => Ok(PostStatus::Published),
            "rejected" => Ok(PostStatus::Rejected),
            other => Err(format!(
                "unknown status '{other}' (expected draft, approved, published or rejected)"
            )),
        }
    }
}

/// A topic queued for a subject
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StoredTopic {
    pub id: String,
    pub subject: String,
    pub topic: Topic,
    pub is_used: bool,
    pub used_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// A persisted refinement result
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StoredPost {
    pub id: String,
    pub subject: String,
    pub topic_id: Option<String>,
    pub topic_title: String,
    /// Final approved or best-effort draft
    pub content: String,
    pub iterations: usize,
    pub outcome: Outcome,
    pub status: PostStatus,
    pub final_score: Option<u8>,
    pub drafts: Vec<Draft>,
    pub verdicts: Vec<CriticVerdict>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
