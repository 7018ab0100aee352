use std::fmt;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;

/// A GitHub repository identified by owner and name.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Repo {
    owner: String,
    name: String,
}

impl Repo {
    pub fn new(owner: impl Into<String>, name: impl Into<String>) -> Result<Self> {
        let owner = owner.into();
        let name = name.into();
        if owner.is_empty() || name.is_empty() {
            anyhow::bail!("repository owner and name must not be empty");
        }
        if owner.contains('/') || name.contains('/') {
            anyhow::bail!("repository owner and name must not contain '/'");
        }
        Ok(Self { owner, name })
    }

    /// Parses `owner/repo`.
    pub fn parse(s: &str) -> Result<Self> {
        match s.trim().split_once('/') {
            Some((owner, name)) => Self::new(owner, name),
            None => anyhow::bail!("repository must be in format 'owner/repo', got: '{}'", s),
        }
    }

    /// Parses an API repository URL such as
    /// `https://api.github.com/repos/owner/repo`, taking the last two path
    /// segments.
    pub fn from_api_url(repository_url: &str) -> Result<Self> {
        let mut segments = repository_url.trim_end_matches('/').rsplit('/');
        match (segments.next(), segments.next()) {
            (Some(name), Some(owner)) => Self::new(owner, name),
            _ => anyhow::bail!("invalid repository URL: '{}'", repository_url),
        }
    }

    pub fn owner(&self) -> &str {
        &self.owner
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl fmt::Display for Repo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.owner, self.name)
    }
}

/// An issue as returned by the issue search and issue lookup endpoints.
///
/// GitHub models pull requests as issues with an attached pull request
/// link; `is_pull_request` records whether that link was present.
#[derive(Debug, Clone, PartialEq)]
pub struct Issue {
    pub repo: Repo,
    pub number: u64,
    pub title: String,
    pub url: String,
    pub author: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub is_pull_request: bool,
}

impl Issue {
    /// Returns the pull request view of this issue, or `None` for plain
    /// issues.
    pub fn into_pull_request(self) -> Option<PullRequest> {
        self.is_pull_request.then(|| PullRequest {
            repo: self.repo,
            number: self.number,
            title: self.title,
            url: self.url,
            author: self.author,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

/// An open pull request discovered for the user or a teammate.
#[derive(Debug, Clone, PartialEq)]
pub struct PullRequest {
    pub repo: Repo,
    pub number: u64,
    pub title: String,
    /// Web (HTML) URL.
    pub url: String,
    pub author: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl fmt::Display for PullRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.repo, self.number)
    }
}

/// An issue comment on a pull request.
#[derive(Debug, Clone, PartialEq)]
pub struct Comment {
    pub author: String,
    pub body: String,
}

/// The verdict recorded by a pull request review.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReviewState {
    Approved,
    ChangesRequested,
    Commented,
    Dismissed,
    Pending,
    #[serde(other)]
    Unknown,
}

impl ReviewState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReviewState::Approved => "APPROVED",
            ReviewState::ChangesRequested => "CHANGES_REQUESTED",
            ReviewState::Commented => "COMMENTED",
            ReviewState::Dismissed => "DISMISSED",
            ReviewState::Pending => "PENDING",
            ReviewState::Unknown => "UNKNOWN",
        }
    }
}

impl fmt::Display for ReviewState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A review submitted on a pull request.
#[derive(Debug, Clone, PartialEq)]
pub struct Review {
    pub author: String,
    pub state: ReviewState,
    /// Pending reviews have not been submitted yet and carry no timestamp.
    pub submitted_at: Option<DateTime<Utc>>,
}

impl Review {
    pub fn is_approved(&self) -> bool {
        self.state == ReviewState::Approved
    }
}

/// A pull request paired with the reviews relevant to its classification.
///
/// Reviews are ordered by submission time, most recent first. For the
/// user's own pull requests they are the approving reviews; for teammates'
/// pull requests the list is always empty.
#[derive(Debug, Clone, PartialEq)]
pub struct ClassifiedPullRequest {
    pub pr: PullRequest,
    pub reviews: Vec<Review>,
}

impl ClassifiedPullRequest {
    /// Approver logins, most recent first, without duplicates.
    pub fn approvers(&self) -> Vec<&str> {
        let mut out: Vec<&str> = Vec::with_capacity(self.reviews.len());
        for review in self.reviews.iter().filter(|r| r.is_approved()) {
            if !out.contains(&review.author.as_str()) {
                out.push(&review.author);
            }
        }
        out
    }
}

/// The remote source-control operations the pipeline depends on.
///
/// Implemented by [`crate::GitHub`] for the real API and by in-memory fakes
/// in tests.
#[async_trait]
pub trait Forge: Send + Sync {
    /// Runs an issue search and returns the first page of results.
    async fn search_issues(&self, query: &str) -> Result<Vec<Issue>>;

    /// Fetches a single issue. Returns `Ok(None)` when it does not exist.
    async fn get_issue(&self, repo: &Repo, number: u64) -> Result<Option<Issue>>;

    async fn list_comments(&self, repo: &Repo, number: u64) -> Result<Vec<Comment>>;

    async fn list_reviews(&self, repo: &Repo, number: u64) -> Result<Vec<Review>>;
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    #[test]
    fn test_repo_parse() {
        let repo = Repo::parse("dcos/dcos").unwrap();
        assert_eq!(repo.owner(), "dcos");
        assert_eq!(repo.name(), "dcos");
        assert_eq!(repo.to_string(), "dcos/dcos");

        assert!(Repo::parse("dcos").is_err());
        assert!(Repo::parse("/dcos").is_err());
        assert!(Repo::parse("dcos/").is_err());
        assert!(Repo::parse("a/b/c").is_err());
    }

    #[test]
    fn test_repo_from_api_url() {
        let repo = Repo::from_api_url("https://api.github.com/repos/mesosphere/dcos-enterprise")
            .unwrap();
        assert_eq!(repo, Repo::new("mesosphere", "dcos-enterprise").unwrap());
        assert!(Repo::from_api_url("nope").is_err());
    }

    #[test]
    fn test_into_pull_request() {
        let at = Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap();
        let issue = Issue {
            repo: Repo::new("dcos", "dcos").unwrap(),
            number: 42,
            title: "Bump mesos".to_string(),
            url: "https://github.com/dcos/dcos/pull/42".to_string(),
            author: "alice".to_string(),
            created_at: at,
            updated_at: at,
            is_pull_request: true,
        };

        let pr = issue.clone().into_pull_request().unwrap();
        assert_eq!(pr.number, 42);
        assert_eq!(pr.to_string(), "dcos/dcos#42");

        let plain = Issue {
            is_pull_request: false,
            ..issue
        };
        assert!(plain.into_pull_request().is_none());
    }

    #[test]
    fn test_review_state_deserialize() {
        let states: Vec<ReviewState> =
            serde_json::from_str(r#"["APPROVED","CHANGES_REQUESTED","COMMENTED","SOMETHING_NEW"]"#)
                .unwrap();
        assert_eq!(
            states,
            vec![
                ReviewState::Approved,
                ReviewState::ChangesRequested,
                ReviewState::Commented,
                ReviewState::Unknown,
            ]
        );
    }

    #[test]
    fn test_approvers_deduplicated() {
        let at = Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap();
        let review = |author: &str| Review {
            author: author.to_string(),
            state: ReviewState::Approved,
            submitted_at: Some(at),
        };
        let classified = ClassifiedPullRequest {
            pr: PullRequest {
                repo: Repo::new("dcos", "dcos").unwrap(),
                number: 1,
                title: "t".to_string(),
                url: "u".to_string(),
                author: "me".to_string(),
                created_at: at,
                updated_at: at,
            },
            reviews: vec![review("bob"), review("carol"), review("bob")],
        };
        assert_eq!(classified.approvers(), vec!["bob", "carol"]);
    }
}
