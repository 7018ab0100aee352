use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use octocrab::Octocrab;
use serde::{Deserialize, Serialize};

use crate::types::{Comment, Forge, Issue, Repo, Review, ReviewState};

/// GitHub caps `per_page` at 100; anything beyond the first page is ignored.
const PAGE_SIZE: u8 = 100;

/// Login reported for content whose author account was deleted.
const GHOST_LOGIN: &str = "ghost";

/// `Forge` implementation backed by the GitHub REST API.
#[derive(Debug, Clone)]
pub struct GitHub {
    client: Octocrab,
}

impl GitHub {
    /// Creates an authenticated client. The token is used only here.
    pub fn new(token: &str) -> Result<Self> {
        let client = Octocrab::builder()
            .personal_token(token.to_string())
            .build()
            .context("Failed to create GitHub client")?;
        Ok(Self { client })
    }
}

#[derive(Debug, Serialize)]
struct SearchParams<'a> {
    q: &'a str,
    per_page: u8,
}

#[derive(Debug, Serialize)]
struct PageParams {
    per_page: u8,
}

#[derive(Debug, Deserialize)]
struct ApiSearchResults {
    items: Vec<ApiIssue>,
}

#[derive(Debug, Deserialize)]
struct ApiUser {
    login: String,
}

#[derive(Debug, Deserialize)]
struct ApiIssue {
    number: u64,
    title: String,
    html_url: String,
    repository_url: String,
    user: Option<ApiUser>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    // Only present when the issue is a pull request.
    pull_request: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct ApiComment {
    user: Option<ApiUser>,
    body: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiReview {
    user: Option<ApiUser>,
    state: ReviewState,
    submitted_at: Option<DateTime<Utc>>,
}

fn login(user: Option<ApiUser>) -> String {
    user.map(|u| u.login)
        .unwrap_or_else(|| GHOST_LOGIN.to_string())
}

fn convert_issue(issue: ApiIssue) -> Result<Issue> {
    Ok(Issue {
        repo: Repo::from_api_url(&issue.repository_url)?,
        number: issue.number,
        title: issue.title,
        url: issue.html_url,
        author: login(issue.user),
        created_at: issue.created_at,
        updated_at: issue.updated_at,
        is_pull_request: issue.pull_request.is_some(),
    })
}

fn is_not_found(err: &octocrab::Error) -> bool {
    matches!(err, octocrab::Error::GitHub { source, .. } if source.status_code.as_u16() == 404)
}

#[async_trait]
impl Forge for GitHub {
    async fn search_issues(&self, query: &str) -> Result<Vec<Issue>> {
        let params = SearchParams {
            q: query,
            per_page: PAGE_SIZE,
        };
        let results: ApiSearchResults = self
            .client
            .get("/search/issues", Some(&params))
            .await
            .with_context(|| format!("Failed to search issues with query '{}'", query))?;

        results.items.into_iter().map(convert_issue).collect()
    }

    async fn get_issue(&self, repo: &Repo, number: u64) -> Result<Option<Issue>> {
        let route = format!("/repos/{}/{}/issues/{}", repo.owner(), repo.name(), number);
        match self.client.get::<ApiIssue, _, ()>(route, None).await {
            Ok(issue) => convert_issue(issue).map(Some),
            Err(err) if is_not_found(&err) => Ok(None),
            Err(err) => {
                Err(err).with_context(|| format!("Failed to fetch issue {}#{}", repo, number))
            }
        }
    }

    async fn list_comments(&self, repo: &Repo, number: u64) -> Result<Vec<Comment>> {
        let route = format!(
            "/repos/{}/{}/issues/{}/comments",
            repo.owner(),
            repo.name(),
            number
        );
        let comments: Vec<ApiComment> = self
            .client
            .get(route, Some(&PageParams { per_page: PAGE_SIZE }))
            .await
            .with_context(|| format!("Failed to list comments of {}#{}", repo, number))?;

        Ok(comments
            .into_iter()
            .map(|c| Comment {
                author: login(c.user),
                body: c.body.unwrap_or_default(),
            })
            .collect())
    }

    async fn list_reviews(&self, repo: &Repo, number: u64) -> Result<Vec<Review>> {
        let route = format!(
            "/repos/{}/{}/pulls/{}/reviews",
            repo.owner(),
            repo.name(),
            number
        );
        let reviews: Vec<ApiReview> = self
            .client
            .get(route, Some(&PageParams { per_page: PAGE_SIZE }))
            .await
            .with_context(|| format!("Failed to fetch reviews of {}#{}", repo, number))?;

        Ok(reviews
            .into_iter()
            .map(|r| Review {
                author: login(r.user),
                state: r.state,
                submitted_at: r.submitted_at,
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_convert_search_results() {
        let json = r#"{
            "total_count": 2,
            "incomplete_results": false,
            "items": [
                {
                    "number": 7,
                    "title": "Fix flaky test",
                    "html_url": "https://github.com/dcos/dcos/pull/7",
                    "repository_url": "https://api.github.com/repos/dcos/dcos",
                    "user": {"login": "alice"},
                    "created_at": "2024-01-02T03:04:05Z",
                    "updated_at": "2024-01-03T03:04:05Z",
                    "pull_request": {"url": "https://api.github.com/repos/dcos/dcos/pulls/7"}
                },
                {
                    "number": 8,
                    "title": "Question",
                    "html_url": "https://github.com/dcos/dcos/issues/8",
                    "repository_url": "https://api.github.com/repos/dcos/dcos",
                    "user": null,
                    "created_at": "2024-01-02T03:04:05Z",
                    "updated_at": "2024-01-03T03:04:05Z"
                }
            ]
        }"#;

        let results: ApiSearchResults = serde_json::from_str(json).unwrap();
        let issues: Vec<Issue> = results
            .items
            .into_iter()
            .map(convert_issue)
            .collect::<Result<_>>()
            .unwrap();

        assert_eq!(issues.len(), 2);
        assert_eq!(issues[0].repo, Repo::new("dcos", "dcos").unwrap());
        assert_eq!(issues[0].author, "alice");
        assert!(issues[0].is_pull_request);
        assert_eq!(issues[1].author, GHOST_LOGIN);
        assert!(!issues[1].is_pull_request);
    }

    #[test]
    fn test_convert_reviews() {
        let json = r#"[
            {"user": {"login": "bob"}, "state": "APPROVED", "submitted_at": "2024-01-02T03:04:05Z"},
            {"user": {"login": "carol"}, "state": "PENDING"}
        ]"#;

        let reviews: Vec<ApiReview> = serde_json::from_str(json).unwrap();
        assert_eq!(reviews[0].state, ReviewState::Approved);
        assert!(reviews[0].submitted_at.is_some());
        assert_eq!(reviews[1].state, ReviewState::Pending);
        assert!(reviews[1].submitted_at.is_none());
    }
}
