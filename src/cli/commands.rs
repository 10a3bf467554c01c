// Command dispatch and output formatting

use anyhow::{Context, Result};
use std::path::PathBuf;

use super::write::{write_posts, WriteArgs};
use super::{Cli, Commands, PostCommands, ProfileCommands, TopicCommands};
use crate::config::{config_path, load_config, load_config_file, StorageConfig};
use crate::profile::StyleProfile;
use crate::refinement::Topic;
use crate::store::{PostStore, StoredPost, StoredTopic};

/// Preview length in `posts list`
const PREVIEW_CHARS: usize = 60;

pub async fn run(cli: Cli) -> Result<()> {
    let store = open_store(cli.db)?;

    match cli.command {
        Commands::Profile { command } => match command {
            ProfileCommands::Import { subject, file } => {
                let profile = StyleProfile::from_json_file(&file)?;
                store.save_profile(&subject, &profile).await?;
                println!(
                    "Imported profile '{}' for {} ({} example posts)",
                    profile.name,
                    subject,
                    profile.example_posts.len()
                );
            }
            ProfileCommands::Show { subject } => {
                let profile = store.load_profile(&subject).await?;
                println!("{}", serde_json::to_string_pretty(&profile)?);
            }
        },

        Commands::Topic { command } => match command {
            TopicCommands::Add {
                subject,
                title,
                description,
                category,
                post_type,
            } => {
                let mut topic = Topic::new(title);
                if let Some(description) = description {
                    topic = topic.with_description(description);
                }
                if let Some(category) = category {
                    topic = topic.with_category(category);
                }
                if let Some(post_type) = post_type {
                    if let Ok(profile) = store.load_profile(&subject).await {
                        if profile.post_type(&post_type).is_none() {
                            tracing::warn!(
                                "Profile for {subject} has no post type '{post_type}', all posts will be used"
                            );
                        }
                    }
                    topic = topic.with_post_type(post_type);
                }
                topic.validate().map_err(anyhow::Error::msg)?;
                let stored = store.add_topic(&subject, &topic).await?;
                println!("Queued topic {} for {}", stored.id, subject);
            }
            TopicCommands::List { subject, unused } => {
                let topics = store.list_topics(&subject, unused).await?;
                print!("{}", format_topics(&topics));
            }
        },

        Commands::Write {
            subject,
            topics,
            next,
            max_iterations,
            concurrency,
        } => {
            let config = load_config()?;
            let args = WriteArgs {
                subject,
                topics,
                next,
                max_iterations,
                concurrency,
            };
            write_posts(&config, &store, args).await?;
        }

        Commands::Posts { command } => match command {
            PostCommands::List { subject } => {
                let posts = store.list_posts(&subject).await?;
                print!("{}", format_post_list(&posts));
            }
            PostCommands::Show { id } => {
                let post = store.get_post(&id).await?;
                print!("{}", format_post(&post));
            }
            PostCommands::SetStatus { id, status } => {
                let post = store.set_status(&id, status).await?;
                println!("Post {} is now {}", post.id, post.status);
            }
        },
    }

    Ok(())
}

/// `--db`, else the config file's storage path, else the default location.
/// A missing or broken config file is not an error for commands that never call a model.
fn open_store(db: Option<PathBuf>) -> Result<PostStore> {
    let path = match db {
        Some(path) => path,
        None => match load_config_file(&config_path()) {
            Ok(Some(config)) => config.storage.db_path,
            Ok(None) => StorageConfig::default().db_path,
            Err(e) => {
                tracing::debug!("Ignoring config file for storage path: {e:#}");
                StorageConfig::default().db_path
            }
        },
    };
    PostStore::open(&path).with_context(|| format!("Failed to open {}", path.display()))
}

pub fn format_topics(topics: &[StoredTopic]) -> String {
    if topics.is_empty() {
        return "No topics.\n".to_string();
    }

    let mut output = String::new();
    for stored in topics {
        let marker = if stored.is_used { "x" } else { " " };
        output.push_str(&format!("[{marker}] {}  {}", stored.id, stored.topic.title));
        if let Some(category) = &stored.topic.category {
            output.push_str(&format!(" ({category})"));
        }
        if let Some(post_type) = &stored.topic.post_type {
            output.push_str(&format!(" [{post_type}]"));
        }
        output.push('\n');
    }
    output
}

pub fn format_post_list(posts: &[StoredPost]) -> String {
    if posts.is_empty() {
        return "No posts.\n".to_string();
    }

    let mut output = String::new();
    for post in posts {
        let score = post
            .final_score
            .map(|s| s.to_string())
            .unwrap_or_else(|| "-".to_string());
        output.push_str(&format!(
            "{}  {:<9} {:>3}  {}  {}\n",
            post.id,
            post.status,
            score,
            post.created_at.format("%Y-%m-%d"),
            preview(&post.content),
        ));
    }
    output
}

/// Full post with its revision history
pub fn format_post(post: &StoredPost) -> String {
    let mut output = format!(
        "Post {}\nSubject: {}\nTopic: {}\nStatus: {}\nOutcome: {} after {} iterations\n",
        post.id,
        post.subject,
        post.topic_title,
        post.status,
        post.outcome.as_str(),
        post.iterations,
    );
    if let Some(score) = post.final_score {
        output.push_str(&format!("Final score: {score}\n"));
    }
    output.push_str(&format!("\n{}\n", post.content));

    if post.drafts.len() > 1 || !post.verdicts.is_empty() {
        output.push_str("\nHistory:\n");
        for draft in &post.drafts {
            match post.verdicts.get(draft.version - 1) {
                Some(verdict) => output.push_str(&format!(
                    "  v{}: {} {}, {}\n",
                    draft.version,
                    verdict.score,
                    if verdict.approved { "approved" } else { "revise" },
                    verdict.feedback
                )),
                None => output.push_str(&format!("  v{}: not scored\n", draft.version)),
            }
        }
    }
    output
}

fn preview(content: &str) -> String {
    let first_line = content.lines().next().unwrap_or("").trim();
    if first_line.chars().count() > PREVIEW_CHARS {
        let cut: String = first_line.chars().take(PREVIEW_CHARS).collect();
        format!("{cut}...")
    } else {
        first_line.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::refinement::{CriticVerdict, Draft, Outcome};
    use crate::store::PostStatus;
    use chrono::{TimeZone, Utc};

    fn draft(version: usize, content: &str) -> Draft {
        Draft {
            version,
            content: content.to_string(),
            feedback: None,
        }
    }

    fn post() -> StoredPost {
        let created = Utc.with_ymd_and_hms(2026, 3, 2, 9, 30, 0).unwrap();
        StoredPost {
            id: "p1".to_string(),
            subject: "ada".to_string(),
            topic_id: None,
            topic_title: "Hiring juniors".to_string(),
            content: "We hired three juniors last year.\nHere is what happened.".to_string(),
            iterations: 2,
            outcome: Outcome::Approved,
            status: PostStatus::Approved,
            final_score: Some(87),
            drafts: vec![draft(1, "first"), draft(2, "second")],
            verdicts: vec![
                CriticVerdict::revise(62, "Hook is generic"),
                CriticVerdict::approve(87, "Ready"),
            ],
            created_at: created,
            updated_at: created,
        }
    }

    #[test]
    fn test_format_post_list() {
        let output = format_post_list(&[post()]);
        assert_eq!(
            output,
            "p1  approved   87  2026-03-02  We hired three juniors last year.\n"
        );
        assert_eq!(format_post_list(&[]), "No posts.\n");
    }

    #[test]
    fn test_format_post_includes_history() {
        let output = format_post(&post());
        assert!(output.contains("Outcome: approved after 2 iterations"));
        assert!(output.contains("Final score: 87"));
        assert!(output.contains("  v1: 62 revise, Hook is generic"));
        assert!(output.contains("  v2: 87 approved, Ready"));
    }

    #[test]
    fn test_format_post_marks_unscored_draft() {
        let mut cancelled = post();
        cancelled.verdicts.truncate(1);
        cancelled.final_score = None;
        let output = format_post(&cancelled);
        assert!(output.contains("  v2: not scored"));
        assert!(!output.contains("Final score"));
    }

    #[test]
    fn test_format_topics() {
        let created = Utc.with_ymd_and_hms(2026, 3, 1, 8, 0, 0).unwrap();
        let topics = vec![
            StoredTopic {
                id: "t1".to_string(),
                subject: "ada".to_string(),
                topic: Topic::new("Hiring juniors").with_category("leadership"),
                is_used: true,
                used_at: Some(created),
                created_at: created,
            },
            StoredTopic {
                id: "t2".to_string(),
                subject: "ada".to_string(),
                topic: Topic::new("On-call").with_post_type("Story"),
                is_used: false,
                used_at: None,
                created_at: created,
            },
        ];
        assert_eq!(
            format_topics(&topics),
            "[x] t1  Hiring juniors (leadership)\n[ ] t2  On-call [Story]\n"
        );
        assert_eq!(format_topics(&[]), "No topics.\n");
    }

    #[test]
    fn test_preview_truncates_long_lines() {
        let long = "a".repeat(80);
        assert_eq!(preview(&long), format!("{}...", "a".repeat(60)));
    }
}
