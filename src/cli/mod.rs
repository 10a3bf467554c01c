// CLI module
// Command-line surface of the postsmith binary

mod commands;
mod write;

pub use commands::{format_post, format_post_list, format_topics, run};
pub use write::{describe_event, WriteArgs};

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::store::PostStatus;

/// postsmith - ghostwrite LinkedIn posts through a writer/critic loop
#[derive(Parser, Debug)]
#[command(name = "postsmith")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Write LinkedIn posts in a subject's voice, refined by an LLM critic.", long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Database file (overrides storage.db_path)
    #[arg(long, global = true)]
    pub db: Option<PathBuf>,

    /// Debug logging (RUST_LOG still wins)
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Manage style profiles
    Profile {
        #[command(subcommand)]
        command: ProfileCommands,
    },

    /// Manage the topic queue
    Topic {
        #[command(subcommand)]
        command: TopicCommands,
    },

    /// Write posts for a subject
    Write {
        /// Subject to write for
        subject: String,

        /// Topic title (repeatable); stored topics with this title are marked used
        #[arg(short, long = "topic")]
        topics: Vec<String>,

        /// Take the oldest unused stored topic (default when no --topic is given)
        #[arg(long)]
        next: bool,

        /// Writer/critic rounds per post
        #[arg(long)]
        max_iterations: Option<usize>,

        /// Posts refined at the same time
        #[arg(long)]
        concurrency: Option<usize>,
    },

    /// Inspect generated posts
    Posts {
        #[command(subcommand)]
        command: PostCommands,
    },
}

#[derive(Subcommand, Debug)]
pub enum ProfileCommands {
    /// Import a style profile from a JSON file
    Import {
        subject: String,
        file: PathBuf,
    },

    /// Print the stored profile as JSON
    Show { subject: String },
}

#[derive(Subcommand, Debug)]
pub enum TopicCommands {
    /// Queue a topic
    Add {
        subject: String,
        title: String,

        #[arg(short, long)]
        description: Option<String>,

        #[arg(short, long)]
        category: Option<String>,

        /// One of the profile's post types; its posts become the style reference
        #[arg(short, long)]
        post_type: Option<String>,
    },

    /// List queued topics, oldest first
    List {
        subject: String,

        /// Only topics not yet written about
        #[arg(long)]
        unused: bool,
    },
}

#[derive(Subcommand, Debug)]
pub enum PostCommands {
    /// List posts, newest first
    List { subject: String },

    /// Show a post with its revision history
    Show { id: String },

    /// Move a post to another status (draft, approved, published, rejected)
    SetStatus { id: String, status: PostStatus },
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_write() {
        let cli = Cli::try_parse_from([
            "postsmith",
            "write",
            "ada",
            "--topic",
            "Hiring",
            "-t",
            "Burnout",
            "--max-iterations",
            "3",
            "--db",
            "/tmp/x.db",
        ])
        .unwrap();

        assert_eq!(cli.db, Some(PathBuf::from("/tmp/x.db")));
        match cli.command {
            Commands::Write {
                subject,
                topics,
                next,
                max_iterations,
                concurrency,
            } => {
                assert_eq!(subject, "ada");
                assert_eq!(topics, vec!["Hiring", "Burnout"]);
                assert!(!next);
                assert_eq!(max_iterations, Some(3));
                assert_eq!(concurrency, None);
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn test_parse_set_status() {
        let cli = Cli::try_parse_from(["postsmith", "posts", "set-status", "abc", "published"]).unwrap();
        assert!(matches!(
            cli.command,
            Commands::Posts {
                command: PostCommands::SetStatus {
                    status: PostStatus::Published,
                    ..
                }
            }
        ));

        assert!(Cli::try_parse_from(["postsmith", "posts", "set-status", "abc", "archived"]).is_err());
    }

    #[test]
    fn test_parse_topic_add_with_post_type() {
        let cli = Cli::try_parse_from([
            "postsmith", "topic", "add", "ada", "Hiring", "-c", "career", "--post-type", "Story",
        ])
        .unwrap();
        match cli.command {
            Commands::Topic {
                command:
                    TopicCommands::Add {
                        title,
                        category,
                        post_type,
                        ..
                    },
            } => {
                assert_eq!(title, "Hiring");
                assert_eq!(category.as_deref(), Some("career"));
                assert_eq!(post_type.as_deref(), Some("Story"));
            }
            other => panic!("unexpected command {other:?}"),
        }
    }
}
