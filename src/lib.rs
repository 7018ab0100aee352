//! prs: which open pull requests are waiting on you?
//!
//! Searches a set of GitHub organizations for the open pull requests of a
//! user and their teammates, follows bot-linked enterprise mirror PRs, and
//! classifies every PR by its reviews: the user's own PRs with the
//! approvals they have collected so far, and teammates' PRs the user has
//! not approved yet.

pub mod cli;
pub mod config;
pub mod github;
pub mod mirror;
pub mod query;
pub mod review;
pub mod search;
pub mod types;

pub use cli::{CliOptions, DisplayMode, parse_args};
pub use config::Config;
pub use github::GitHub;
pub use mirror::{MirrorRule, reattribute_mirror};
pub use query::{QueryResult, QuerySpec, fetch_review_report, fetch_review_report_at};
pub use review::{Classification, ClassificationFailure, Outcome};
pub use types::{
    ClassifiedPullRequest, Comment, Forge, Issue, PullRequest, Repo, Review, ReviewState,
};
