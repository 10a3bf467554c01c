// Post store
//
// SQLite persistence for subjects, style profiles, topics and generated posts.
// - WAL mode so the CLI can read while a batch is writing
// - Drafts and verdicts are kept as JSON next to the final post
// - Status is write-only from the loop's point of view

mod types;

pub use types::{PostStatus, StoreError, StoredPost, StoredTopic};

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::path::Path;
use std::sync::Arc;
use tokio::sync::Mutex;

use crate::profile::StyleProfile;
use crate::refinement::{CriticVerdict, Draft, RefinementResult, Topic};

type StoreResult<T> = Result<T, StoreError>;

const TOPIC_COLUMNS: &str =
    "t.id, s.name, t.title, t.description, t.category, t.post_type, t.is_used, t.used_at, t.created_at";

const POST_COLUMNS: &str = "p.id, s.name, p.topic_id, p.topic_title, p.content, p.iterations, \
     p.outcome, p.status, p.final_score, p.drafts_json, p.verdicts_json, p.created_at, p.updated_at";

#[derive(Clone)]
pub struct PostStore {
    db: Arc<Mutex<Connection>>,
}

impl PostStore {
    /// Open (or create) the database at `path`
    pub fn open(path: &Path) -> StoreResult<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")?;
        conn.execute_batch(include_str!("schema.sql"))?;
        migrate(&conn)?;

        tracing::debug!("Post store opened: {}", path.display());

        Ok(Self {
            db: Arc::new(Mutex::new(conn)),
        })
    }

    /// Id of the subject called `name`, creating it on first use
    pub async fn ensure_subject(&self, name: &str) -> StoreResult<String> {
        let conn = self.db.lock().await;
        ensure_subject(&conn, name)
    }

    pub async fn save_profile(&self, subject: &str, profile: &StyleProfile) -> StoreResult<()> {
        let json = serde_json::to_string(profile)?;
        let conn = self.db.lock().await;
        let subject_id = ensure_subject(&conn, subject)?;
        conn.execute(
            "INSERT INTO style_profiles (subject_id, profile_json, updated_at)
             VALUES (?1, ?2, ?3)
             ON CONFLICT(subject_id) DO UPDATE SET
                profile_json = excluded.profile_json,
                updated_at = excluded.updated_at",
            params![subject_id, json, now()],
        )?;
        tracing::info!("Stored style profile for {}", subject);
        Ok(())
    }

    pub async fn load_profile(&self, subject: &str) -> StoreResult<StyleProfile> {
        let conn = self.db.lock().await;
        let json: Option<String> = conn
            .query_row(
                "SELECT sp.profile_json FROM style_profiles sp
                 JOIN subjects s ON s.id = sp.subject_id
                 WHERE s.name = ?1",
                [subject],
                |row| row.get(0),
            )
            .optional()?;

        let json = json.ok_or_else(|| StoreError::MissingProfile(subject.to_string()))?;
        Ok(serde_json::from_str(&json)?)
    }

    pub async fn add_topic(&self, subject: &str, topic: &Topic) -> StoreResult<StoredTopic> {
        let conn = self.db.lock().await;
        let subject_id = ensure_subject(&conn, subject)?;
        let id = uuid::Uuid::new_v4().to_string();
        conn.execute(
            "INSERT INTO topics (id, subject_id, title, description, category, post_type, is_used, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, 0, ?7)",
            params![
                id,
                subject_id,
                topic.title,
                topic.description,
                topic.category,
                topic.post_type,
                now()
            ],
        )?;
        get_topic(&conn, &id)
    }

    /// Oldest topic not yet written about, skipping the ids in `exclude`
    pub async fn next_unused_topic(
        &self,
        subject: &str,
        exclude: &[&str],
    ) -> StoreResult<Option<StoredTopic>> {
        Ok(self
            .list_topics(subject, true)
            .await?
            .into_iter()
            .find(|stored| !exclude.contains(&stored.id.as_str())))
    }

    /// Topics for `subject`, oldest first
    pub async fn list_topics(&self, subject: &str, only_unused: bool) -> StoreResult<Vec<StoredTopic>> {
        let conn = self.db.lock().await;
        let mut stmt = conn.prepare(&format!(
            "SELECT {TOPIC_COLUMNS} FROM topics t JOIN subjects s ON s.id = t.subject_id
             WHERE s.name = ?1 AND (?2 = 0 OR t.is_used = 0)
             ORDER BY t.created_at ASC, t.rowid ASC"
        ))?;
        let rows = stmt
            .query_map(params![subject, only_unused], TopicRow::from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        rows.into_iter().map(TopicRow::into_topic).collect()
    }

    /// Most recent stored topic with this exact title
    pub async fn find_topic(&self, subject: &str, title: &str) -> StoreResult<Option<StoredTopic>> {
        let conn = self.db.lock().await;
        let row = conn
            .query_row(
                &format!(
                    "SELECT {TOPIC_COLUMNS} FROM topics t JOIN subjects s ON s.id = t.subject_id
                     WHERE s.name = ?1 AND t.title = ?2
                     ORDER BY t.created_at DESC, t.rowid DESC LIMIT 1"
                ),
                params![subject, title],
                TopicRow::from_row,
            )
            .optional()?;
        row.map(TopicRow::into_topic).transpose()
    }

    pub async fn mark_topic_used(&self, topic_id: &str) -> StoreResult<()> {
        let conn = self.db.lock().await;
        let changed = conn.execute(
            "UPDATE topics SET is_used = 1, used_at = ?2 WHERE id = ?1",
            params![topic_id, now()],
        )?;
        if changed == 0 {
            return Err(StoreError::TopicNotFound(topic_id.to_string()));
        }
        Ok(())
    }

    /// Persist a finished run. Approved runs start as `approved`, everything else as `draft`.
    pub async fn save_result(
        &self,
        subject: &str,
        topic: &Topic,
        topic_id: Option<&str>,
        result: &RefinementResult,
    ) -> StoreResult<StoredPost> {
        let final_draft = result.final_draft().ok_or(StoreError::EmptyResult)?;
        let drafts_json = serde_json::to_string(result.drafts())?;
        let verdicts_json = serde_json::to_string(result.verdicts())?;
        let status = PostStatus::for_result(result);
        let id = uuid::Uuid::new_v4().to_string();
        let timestamp = now();

        let conn = self.db.lock().await;
        let subject_id = ensure_subject(&conn, subject)?;
        conn.execute(
            "INSERT INTO generated_posts (id, subject_id, topic_id, topic_title, content, iterations,
                 outcome, status, final_score, drafts_json, verdicts_json, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?12)",
            params![
                id,
                subject_id,
                topic_id,
                topic.title,
                final_draft.content,
                result.iterations() as i64,
                result.outcome().as_str(),
                status.as_str(),
                result.final_score(),
                drafts_json,
                verdicts_json,
                timestamp,
            ],
        )?;

        tracing::info!(
            "Saved post {} for {} ({}, {} iterations)",
            id,
            subject,
            status,
            result.iterations()
        );
        get_post(&conn, &id)
    }

    pub async fn get_post(&self, id: &str) -> StoreResult<StoredPost> {
        let conn = self.db.lock().await;
        get_post(&conn, id)
    }

    /// Posts for `subject`, newest first
    pub async fn list_posts(&self, subject: &str) -> StoreResult<Vec<StoredPost>> {
        let conn = self.db.lock().await;
        let mut stmt = conn.prepare(&format!(
            "SELECT {POST_COLUMNS} FROM generated_posts p JOIN subjects s ON s.id = p.subject_id
             WHERE s.name = ?1
             ORDER BY p.created_at DESC, p.rowid DESC"
        ))?;
        let rows = stmt
            .query_map([subject], PostRow::from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        rows.into_iter().map(PostRow::into_post).collect()
    }

    /// Move a post along draft -> approved -> published (or to rejected)
    pub async fn set_status(&self, id: &str, status: PostStatus) -> StoreResult<StoredPost> {
        let conn = self.db.lock().await;
        let current = get_post(&conn, id)?;
        if !current.status.can_transition_to(status) {
            return Err(StoreError::IllegalTransition {
                from: current.status,
                to: status,
            });
        }
        conn.execute(
            "UPDATE generated_posts SET status = ?2, updated_at = ?3 WHERE id = ?1",
            params![id, status.as_str(), now()],
        )?;
        tracing::info!("Post {}: {} -> {}", id, current.status, status);
        get_post(&conn, id)
    }

    /// Verdicts of the `limit` most recent posts, newest first
    pub async fn recent_verdicts(&self, subject: &str, limit: usize) -> StoreResult<Vec<Vec<CriticVerdict>>> {
        let conn = self.db.lock().await;
        let mut stmt = conn.prepare(
            "SELECT p.verdicts_json FROM generated_posts p JOIN subjects s ON s.id = p.subject_id
             WHERE s.name = ?1
             ORDER BY p.created_at DESC, p.rowid DESC
             LIMIT ?2",
        )?;
        let rows: Vec<String> = stmt
            .query_map(params![subject, limit as i64], |row| row.get(0))?
            .collect::<Result<Vec<_>, _>>()?;
        rows.iter()
            .map(|json| serde_json::from_str(json).map_err(StoreError::from))
            .collect()
    }
}

/// Bring databases created by older versions up to the current schema
fn migrate(conn: &Connection) -> StoreResult<()> {
    let has_post_type: bool = conn.query_row(
        "SELECT COUNT(*) > 0 FROM pragma_table_info('topics') WHERE name = 'post_type'",
        [],
        |row| row.get(0),
    )?;
    if !has_post_type {
        conn.execute_batch("ALTER TABLE topics ADD COLUMN post_type TEXT;")?;
        tracing::info!("Added topics.post_type column");
    }
    Ok(())
}

fn now() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_time(value: &str) -> StoreResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| StoreError::Corrupt(format!("bad timestamp '{value}': {e}")))
}

fn ensure_subject(conn: &Connection, name: &str) -> StoreResult<String> {
    conn.execute(
        "INSERT OR IGNORE INTO subjects (id, name, created_at) VALUES (?1, ?2, ?3)",
        params![uuid::Uuid::new_v4().to_string(), name, now()],
    )?;
    Ok(conn.query_row("SELECT id FROM subjects WHERE name = ?1", [name], |row| row.get(0))?)
}

fn get_topic(conn: &Connection, id: &str) -> StoreResult<StoredTopic> {
    conn.query_row(
        &format!(
            "SELECT {TOPIC_COLUMNS} FROM topics t JOIN subjects s ON s.id = t.subject_id WHERE t.id = ?1"
        ),
        [id],
        TopicRow::from_row,
    )
    .optional()?
    .ok_or_else(|| StoreError::TopicNotFound(id.to_string()))?
    .into_topic()
}

fn get_post(conn: &Connection, id: &str) -> StoreResult<StoredPost> {
    conn.query_row(
        &format!(
            "SELECT {POST_COLUMNS} FROM generated_posts p JOIN subjects s ON s.id = p.subject_id WHERE p.id = ?1"
        ),
        [id],
        PostRow::from_row,
    )
    .optional()?
    .ok_or_else(|| StoreError::PostNotFound(id.to_string()))?
    .into_post()
}

/// Raw columns of a topic row, before timestamp parsing
struct TopicRow {
    id: String,
    subject: String,
    title: String,
    description: Option<String>,
    category: Option<String>,
    post_type: Option<String>,
    is_used: bool,
    used_at: Option<String>,
    created_at: String,
}

impl TopicRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            subject: row.get(1)?,
            title: row.get(2)?,
            description: row.get(3)?,
            category: row.get(4)?,
            post_type: row.get(5)?,
            is_used: row.get(6)?,
            used_at: row.get(7)?,
            created_at: row.get(8)?,
        })
    }

    fn into_topic(self) -> StoreResult<StoredTopic> {
        Ok(StoredTopic {
            id: self.id,
            subject: self.subject,
            topic: Topic {
                title: self.title,
                description: self.description,
                category: self.category,
                post_type: self.post_type,
            },
            is_used: self.is_used,
            used_at: self.used_at.as_deref().map(parse_time).transpose()?,
            created_at: parse_time(&self.created_at)?,
        })
    }
}

/// Raw columns of a post row, before JSON and timestamp parsing
struct PostRow {
    id: String,
    subject: String,
    topic_id: Option<String>,
    topic_title: String,
    content: String,
    iterations: i64,
    outcome: String,
    status: String,
    final_score: Option<u8>,
    drafts_json: String,
    verdicts_json: String,
    created_at: String,
    updated_at: String,
}

impl PostRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            subject: row.get(1)?,
            topic_id: row.get(2)?,
            topic_title: row.get(3)?,
            content: row.get(4)?,
            iterations: row.get(5)?,
            outcome: row.get(6)?,
            status: row.get(7)?,
            final_score: row.get(8)?,
            drafts_json: row.get(9)?,
            verdicts_json: row.get(10)?,
            created_at: row.get(11)?,
            updated_at: row.get(12)?,
        })
    }

    fn into_post(self) -> StoreResult<StoredPost> {
        let drafts: Vec<Draft> = serde_json::from_str(&self.drafts_json)?;
        let verdicts: Vec<CriticVerdict> = serde_json::from_str(&self.verdicts_json)?;
        Ok(StoredPost {
            iterations: usize::try_from(self.iterations)
                .map_err(|_| StoreError::Corrupt(format!("negative iteration count in post {}", self.id)))?,
            outcome: self.outcome.parse().map_err(StoreError::Corrupt)?,
            status: self.status.parse().map_err(StoreError::Corrupt)?,
            created_at: parse_time(&self.created_at)?,
            updated_at: parse_time(&self.updated_at)?,
            id: self.id,
            subject: self.subject,
            topic_id: self.topic_id,
            topic_title: self.topic_title,
            content: self.content,
            final_score: self.final_score,
            drafts,
            verdicts,
        })
    }
}
