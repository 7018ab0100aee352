use anyhow::{Context, Result};
use chrono::{DateTime, Duration, Utc};
use futures::{Stream, stream};
use tracing::debug;

use crate::types::{Forge, PullRequest};

/// Assembles a GitHub issue search query from individual qualifiers.
#[derive(Debug, Default)]
pub struct SearchQueryBuilder {
    terms: Vec<String>,
}

impl SearchQueryBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn author(&mut self, login: &str) -> &mut Self {
        self.terms.push(format!("author:{}", login));
        self
    }

    pub fn pr_type(&mut self) -> &mut Self {
        self.terms.push("is:pr".to_string());
        self
    }

    pub fn open(&mut self) -> &mut Self {
        self.terms.push("is:open".to_string());
        self
    }

    pub fn org(&mut self, org: &str) -> &mut Self {
        self.terms.push(format!("org:{}", org));
        self
    }

    pub fn build(&self) -> String {
        self.terms.join(" ")
    }
}

/// Builds the team query: `author:U author:T1 … is:pr is:open org:O1 …`.
///
/// Blank teammate entries are skipped so a sloppy configuration cannot
/// produce an empty `author:` qualifier.
pub fn build_team_query(user: &str, teammates: &[String], organizations: &[String]) -> String {
    let mut builder = SearchQueryBuilder::new();
    builder.author(user);
    for mate in teammates.iter().map(|m| m.trim()).filter(|m| !m.is_empty()) {
        builder.author(mate);
    }
    builder.pr_type().open();
    for org in organizations {
        builder.org(org);
    }
    builder.build()
}

/// Runs the team search and yields the results that are pull requests.
///
/// A search failure is returned as an error; there is nothing to process
/// without a candidate set.
pub async fn discover<F>(forge: &F, query: &str) -> Result<impl Stream<Item = PullRequest>>
where
    F: Forge + ?Sized,
{
    debug!(query, "Searching for team pull requests");
    let issues = forge
        .search_issues(query)
        .await
        .context("Failed to fetch PRs")?;
    debug!(count = issues.len(), "Search returned issues");

    Ok(stream::iter(
        issues.into_iter().filter_map(|issue| issue.into_pull_request()),
    ))
}

/// True when `pr` has not been updated within `horizon` of `now`. A horizon
/// reaching past the representable range never expires.
pub fn is_stale(pr: &PullRequest, now: DateTime<Utc>, horizon: Duration) -> bool {
    pr.updated_at
        .checked_add_signed(horizon)
        .is_some_and(|expiry| expiry < now)
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;
    use crate::types::Repo;

    fn pr_updated_at(updated_at: DateTime<Utc>) -> PullRequest {
        PullRequest {
            repo: Repo::new("dcos", "dcos").unwrap(),
            number: 1,
            title: "Update docs".to_string(),
            url: "https://github.com/dcos/dcos/pull/1".to_string(),
            author: "alice".to_string(),
            created_at: updated_at,
            updated_at,
        }
    }

    #[test]
    fn test_build_team_query() {
        let query = build_team_query(
            "me",
            &["alice".to_string(), "bob".to_string()],
            &["dcos".to_string(), "mesosphere".to_string()],
        );
        assert_eq!(
            query,
            "author:me author:alice author:bob is:pr is:open org:dcos org:mesosphere"
        );
    }

    #[test]
    fn test_build_team_query_skips_blank_teammates() {
        let query = build_team_query("me", &["".to_string(), " ".to_string()], &[]);
        assert_eq!(query, "author:me is:pr is:open");
    }

    #[test]
    fn test_is_stale_boundary() {
        let now = Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap();
        let horizon = Duration::days(90);

        assert!(!is_stale(&pr_updated_at(now), now, horizon));
        assert!(!is_stale(&pr_updated_at(now - horizon), now, horizon));
        assert!(is_stale(
            &pr_updated_at(now - horizon - Duration::seconds(1)),
            now,
            horizon
        ));
        assert!(is_stale(&pr_updated_at(now - Duration::days(365)), now, horizon));
    }

    #[test]
    fn test_is_stale_with_huge_horizon() {
        let now = Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap();
        let horizon = Duration::days(1_000_000_000);

        assert!(!is_stale(&pr_updated_at(now), now, horizon));
        assert!(!is_stale(&pr_updated_at(now - Duration::days(3650)), now, horizon));
    }
}
