use std::time::Duration;

use anyhow::{Context, Result};
use tokio::sync::Semaphore;
use tracing::debug;

use crate::types::{ClassifiedPullRequest, Forge, PullRequest, Review};

/// Where a pull request ends up after looking at its reviews.
#[derive(Debug, Clone, PartialEq)]
pub enum Classification {
    /// Authored by the user; carries the approving reviews.
    Mine(ClassifiedPullRequest),
    /// Authored by a teammate and not yet approved by the user.
    NeedsMyReview(ClassifiedPullRequest),
    /// A teammate's pull request the user already approved.
    NotActionable(PullRequest),
}

/// A pull request whose reviews could not be fetched.
#[derive(Debug)]
pub struct ClassificationFailure {
    pub pr: PullRequest,
    pub error: anyhow::Error,
}

impl std::fmt::Display for ClassificationFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "PR {} ({}): {:#}", self.pr, self.pr.url, self.error)
    }
}

/// Result of one classification task.
#[derive(Debug)]
pub enum Outcome {
    Classified(Classification),
    Failed(ClassificationFailure),
}

/// Orders reviews by submission time, most recent first. Unsubmitted
/// reviews sort last.
pub fn sort_reviews(reviews: &mut [Review]) {
    reviews.sort_by(|a, b| b.submitted_at.cmp(&a.submitted_at));
}

/// Classifies `pr` for `user`, given its reviews sorted most recent first.
pub fn classify(pr: PullRequest, reviews: Vec<Review>, user: &str) -> Classification {
    if pr.author == user {
        let approvals = reviews.into_iter().filter(Review::is_approved).collect();
        return Classification::Mine(ClassifiedPullRequest {
            pr,
            reviews: approvals,
        });
    }

    let approved_by_me = reviews
        .iter()
        .any(|review| review.author == user && review.is_approved());
    if approved_by_me {
        Classification::NotActionable(pr)
    } else {
        Classification::NeedsMyReview(ClassifiedPullRequest {
            pr,
            reviews: Vec::new(),
        })
    }
}

/// Fetches the reviews of `pr` and classifies it. A failed review fetch is
/// reported as [`Outcome::Failed`] rather than aborting the run.
///
/// Waits `throttle` before touching the API; the delay is taken before the
/// concurrency gate so it never serializes tasks.
pub async fn classify_pull_request<F>(
    forge: &F,
    gate: &Semaphore,
    throttle: Duration,
    user: &str,
    pr: PullRequest,
) -> Outcome
where
    F: Forge + ?Sized,
{
    tokio::time::sleep(throttle).await;

    match fetch_sorted_reviews(forge, gate, &pr).await {
        Ok(reviews) => {
            let classification = classify(pr, reviews, user);
            debug!(?classification, "Classified PR");
            Outcome::Classified(classification)
        }
        Err(error) => Outcome::Failed(ClassificationFailure { pr, error }),
    }
}

async fn fetch_sorted_reviews<F>(
    forge: &F,
    gate: &Semaphore,
    pr: &PullRequest,
) -> Result<Vec<Review>>
where
    F: Forge + ?Sized,
{
    let _permit = gate.acquire().await.context("concurrency gate closed")?;
    let mut reviews = forge
        .list_reviews(&pr.repo, pr.number)
        .await
        .context("Error fetching reviews")?;
    sort_reviews(&mut reviews);
    Ok(reviews)
}

#[cfg(test)]
mod tests {
    use chrono::{DateTime, TimeZone, Utc};

    use super::*;
    use crate::types::{Repo, ReviewState};

    fn at(hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, hour, 0, 0).unwrap()
    }

    fn pr_by(author: &str) -> PullRequest {
        PullRequest {
            repo: Repo::new("mesosphere", "dcos-commons").unwrap(),
            number: 17,
            title: "Add TLS support".to_string(),
            url: "https://github.com/mesosphere/dcos-commons/pull/17".to_string(),
            author: author.to_string(),
            created_at: at(1),
            updated_at: at(2),
        }
    }

    fn review(author: &str, state: ReviewState, hour: u32) -> Review {
        Review {
            author: author.to_string(),
            state,
            submitted_at: Some(at(hour)),
        }
    }

    #[test]
    fn test_sort_reviews_most_recent_first() {
        let mut reviews = vec![
            review("a", ReviewState::Approved, 1),
            Review {
                author: "p".to_string(),
                state: ReviewState::Pending,
                submitted_at: None,
            },
            review("c", ReviewState::Approved, 3),
            review("b", ReviewState::Commented, 2),
        ];
        sort_reviews(&mut reviews);

        let authors: Vec<&str> = reviews.iter().map(|r| r.author.as_str()).collect();
        assert_eq!(authors, vec!["c", "b", "a", "p"]);
    }

    #[test]
    fn test_classify_mine_keeps_only_approvals_in_order() {
        let mut reviews = vec![
            review("bob", ReviewState::Approved, 1),
            review("carol", ReviewState::ChangesRequested, 2),
            review("dave", ReviewState::Approved, 3),
        ];
        sort_reviews(&mut reviews);

        match classify(pr_by("me"), reviews, "me") {
            Classification::Mine(classified) => {
                let authors: Vec<&str> = classified
                    .reviews
                    .iter()
                    .map(|r| r.author.as_str())
                    .collect();
                assert_eq!(authors, vec!["dave", "bob"]);
                assert!(classified.reviews.iter().all(Review::is_approved));
            }
            other => panic!("expected Mine, got {:?}", other),
        }
    }

    #[test]
    fn test_classify_mine_without_approvals_is_kept() {
        let reviews = vec![review("bob", ReviewState::Commented, 1)];
        match classify(pr_by("me"), reviews, "me") {
            Classification::Mine(classified) => assert!(classified.reviews.is_empty()),
            other => panic!("expected Mine, got {:?}", other),
        }
    }

    #[test]
    fn test_classify_teammate_needs_my_review() {
        let reviews = vec![
            review("bob", ReviewState::Approved, 1),
            review("me", ReviewState::Commented, 2),
            review("me", ReviewState::ChangesRequested, 3),
        ];
        match classify(pr_by("alice"), reviews, "me") {
            Classification::NeedsMyReview(classified) => {
                assert_eq!(classified.pr.author, "alice");
                assert!(classified.reviews.is_empty());
            }
            other => panic!("expected NeedsMyReview, got {:?}", other),
        }
    }

    #[test]
    fn test_classify_teammate_already_approved_by_me() {
        // Any approval by the user counts, even if a later review changed
        // its mind.
        let mut reviews = vec![
            review("me", ReviewState::Approved, 1),
            review("me", ReviewState::ChangesRequested, 2),
        ];
        sort_reviews(&mut reviews);
        assert_eq!(
            classify(pr_by("alice"), reviews, "me"),
            Classification::NotActionable(pr_by("alice"))
        );
    }
}
