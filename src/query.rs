use std::{sync::Arc, time::Duration};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use futures::{Stream, StreamExt};
use tokio::sync::{Semaphore, mpsc};
use tokio_stream::wrappers::UnboundedReceiverStream;
use tokio_util::task::TaskTracker;
use tracing::{debug, warn};

use crate::{
    mirror::{MirrorRule, resolve_mirrors},
    review::{Classification, ClassificationFailure, Outcome, classify_pull_request},
    search::{build_team_query, discover, is_stale},
    types::{ClassifiedPullRequest, Forge, PullRequest},
};

pub const DEFAULT_ORGANIZATIONS: &[&str] = &["dcos", "mesosphere"];
pub const DEFAULT_STALE_AFTER_DAYS: i64 = 90;
pub const DEFAULT_THROTTLE: Duration = Duration::from_secs(3);
pub const DEFAULT_MAX_CONCURRENT: usize = 8;

/// Everything the pipeline needs to know about one run.
#[derive(Debug, Clone)]
pub struct QuerySpec {
    pub user: String,
    pub teammates: Vec<String>,
    pub organizations: Vec<String>,
    /// `None` disables mirror resolution.
    pub mirror: Option<MirrorRule>,
    /// Candidates not updated within this horizon are skipped.
    pub stale_after: chrono::Duration,
    /// Fixed delay before every review fetch.
    pub throttle: Duration,
    /// Upper bound on in-flight remote calls.
    pub max_concurrent: usize,
}

impl QuerySpec {
    pub fn new(user: impl Into<String>, teammates: Vec<String>) -> Self {
        Self {
            user: user.into(),
            teammates,
            organizations: DEFAULT_ORGANIZATIONS.iter().map(|s| s.to_string()).collect(),
            mirror: Some(MirrorRule::default()),
            stale_after: chrono::Duration::days(DEFAULT_STALE_AFTER_DAYS),
            throttle: DEFAULT_THROTTLE,
            max_concurrent: DEFAULT_MAX_CONCURRENT,
        }
    }

    pub fn search_query(&self) -> String {
        build_team_query(&self.user, &self.teammates, &self.organizations)
    }
}

/// The classified pull requests of one run.
///
/// `mine` and `needs_review` are sorted by creation time, newest first.
/// Every scheduled classification ends up in exactly one of `mine`,
/// `needs_review`, `dropped` or `failures`.
#[derive(Debug, Default)]
pub struct QueryResult {
    /// The user's own pull requests with their approving reviews.
    pub mine: Vec<ClassifiedPullRequest>,
    /// Teammates' pull requests the user has not approved.
    pub needs_review: Vec<ClassifiedPullRequest>,
    /// Teammates' pull requests the user already approved.
    pub dropped: usize,
    pub failures: Vec<ClassificationFailure>,
    /// Number of classification tasks started.
    pub scheduled: usize,
}

impl QueryResult {
    fn record(&mut self, outcome: Outcome) {
        match outcome {
            Outcome::Classified(Classification::Mine(pr)) => self.mine.push(pr),
            Outcome::Classified(Classification::NeedsMyReview(pr)) => self.needs_review.push(pr),
            Outcome::Classified(Classification::NotActionable(_)) => self.dropped += 1,
            Outcome::Failed(failure) => self.failures.push(failure),
        }
    }

    /// Number of classification outcomes recorded.
    pub fn accounted(&self) -> usize {
        self.mine.len() + self.needs_review.len() + self.dropped + self.failures.len()
    }

    pub fn is_complete(&self) -> bool {
        self.accounted() == self.scheduled
    }
}

/// Sorts newest first. The sort is stable, so equal timestamps keep their
/// arrival order.
pub fn sort_by_creation_desc(prs: &mut [ClassifiedPullRequest]) {
    prs.sort_by(|a, b| b.pr.created_at.cmp(&a.pr.created_at));
}

/// Collects classification outcomes until the stream ends, then sorts both
/// lists.
pub async fn aggregate<S>(outcomes: S) -> QueryResult
where
    S: Stream<Item = Outcome>,
{
    let mut result = outcomes
        .fold(QueryResult::default(), |mut acc, outcome| async move {
            acc.record(outcome);
            acc
        })
        .await;

    sort_by_creation_desc(&mut result.mine);
    sort_by_creation_desc(&mut result.needs_review);
    result
}

/// Discovers, resolves and classifies the team's open pull requests.
pub async fn fetch_review_report<F>(spec: &QuerySpec, forge: Arc<F>) -> Result<QueryResult>
where
    F: Forge + 'static,
{
    fetch_review_report_at(spec, forge, Utc::now()).await
}

/// Like [`fetch_review_report`], judging staleness relative to `now`.
///
/// Each non-stale candidate gets a resolver task that feeds the candidate
/// and its mirror into a shared channel; each pull request read from that
/// channel gets a classification task that sends its outcome to the
/// aggregator. A stage is finished when the last sender feeding it is
/// dropped, so no task needs to know how many pull requests there are.
pub async fn fetch_review_report_at<F>(
    spec: &QuerySpec,
    forge: Arc<F>,
    now: DateTime<Utc>,
) -> Result<QueryResult>
where
    F: Forge + 'static,
{
    let query = spec.search_query();
    let candidates = discover(forge.as_ref(), &query).await?;
    let gate = Arc::new(Semaphore::new(spec.max_concurrent.max(1)));

    let (outcome_tx, outcome_rx) = mpsc::unbounded_channel::<Outcome>();
    let aggregator = tokio::spawn(aggregate(UnboundedReceiverStream::new(outcome_rx)));

    let (pr_tx, mut pr_rx) = mpsc::unbounded_channel::<PullRequest>();
    let resolvers = TaskTracker::new();
    let mut candidates = std::pin::pin!(candidates);

    while let Some(candidate) = candidates.next().await {
        if is_stale(&candidate, now, spec.stale_after) {
            debug!(pr = %candidate, updated_at = %candidate.updated_at, "Skipping stale PR");
            continue;
        }

        let Some(rule) = &spec.mirror else {
            let _ = pr_tx.send(candidate);
            continue;
        };

        let forge = Arc::clone(&forge);
        let gate = Arc::clone(&gate);
        let rule = rule.clone();
        let sink = pr_tx.clone();
        resolvers.spawn(async move {
            resolve_mirrors(forge.as_ref(), &rule, &gate, candidate, &sink).await;
        });
    }
    resolvers.close();
    drop(pr_tx);

    let user: Arc<str> = Arc::from(spec.user.as_str());
    let classifiers = TaskTracker::new();
    let mut scheduled = 0;

    while let Some(pr) = pr_rx.recv().await {
        scheduled += 1;

        let forge = Arc::clone(&forge);
        let gate = Arc::clone(&gate);
        let user = Arc::clone(&user);
        let out = outcome_tx.clone();
        let throttle = spec.throttle;
        classifiers.spawn(async move {
            let outcome = classify_pull_request(forge.as_ref(), &gate, throttle, &user, pr).await;
            let _ = out.send(outcome);
        });
    }
    classifiers.close();
    drop(outcome_tx);

    resolvers.wait().await;
    classifiers.wait().await;

    let mut result = aggregator.await.context("PR aggregation task failed")?;
    result.scheduled = scheduled;

    debug!(
        scheduled,
        mine = result.mine.len(),
        needs_review = result.needs_review.len(),
        dropped = result.dropped,
        failed = result.failures.len(),
        "Classification complete"
    );
    if !result.is_complete() {
        warn!(
            scheduled,
            accounted = result.accounted(),
            "Some PRs were lost during classification"
        );
    }

    Ok(result)
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;
    use futures::stream;

    use super::*;
    use crate::types::{Repo, Review, ReviewState};

    fn classified(number: u64, day: u32) -> ClassifiedPullRequest {
        let created_at = Utc.with_ymd_and_hms(2024, 2, day, 9, 0, 0).unwrap();
        ClassifiedPullRequest {
            pr: PullRequest {
                repo: Repo::new("dcos", "dcos").unwrap(),
                number,
                title: format!("PR {}", number),
                url: format!("https://github.com/dcos/dcos/pull/{}", number),
                author: "me".to_string(),
                created_at,
                updated_at: created_at,
            },
            reviews: Vec::new(),
        }
    }

    #[test]
    fn test_query_spec_defaults() {
        let spec = QuerySpec::new("me", vec!["alice".to_string()]);
        assert_eq!(
            spec.search_query(),
            "author:me author:alice is:pr is:open org:dcos org:mesosphere"
        );
        assert_eq!(spec.stale_after, chrono::Duration::days(90));
        assert_eq!(spec.throttle, Duration::from_secs(3));
        assert!(spec.mirror.is_some());
    }

    #[tokio::test]
    async fn test_aggregate_partitions_and_sorts() {
        let approved = Review {
            author: "bob".to_string(),
            state: ReviewState::Approved,
            submitted_at: None,
        };
        let mut with_review = classified(2, 20);
        with_review.reviews.push(approved);

        let outcomes = vec![
            Outcome::Classified(Classification::Mine(classified(1, 10))),
            Outcome::Classified(Classification::NeedsMyReview(classified(4, 5))),
            Outcome::Classified(Classification::Mine(with_review)),
            Outcome::Classified(Classification::NotActionable(classified(3, 1).pr)),
            Outcome::Classified(Classification::NeedsMyReview(classified(5, 25))),
            Outcome::Classified(Classification::Mine(classified(6, 15))),
            Outcome::Failed(ClassificationFailure {
                pr: classified(7, 2).pr,
                error: anyhow::anyhow!("boom"),
            }),
        ];

        let mut result = aggregate(stream::iter(outcomes)).await;
        result.scheduled = 7;

        let mine: Vec<u64> = result.mine.iter().map(|c| c.pr.number).collect();
        let review: Vec<u64> = result.needs_review.iter().map(|c| c.pr.number).collect();
        assert_eq!(mine, vec![2, 6, 1]);
        assert_eq!(review, vec![5, 4]);
        assert_eq!(result.mine[0].reviews.len(), 1);
        assert_eq!(result.dropped, 1);
        assert_eq!(result.failures.len(), 1);
        assert!(result.is_complete());
    }

    #[tokio::test]
    async fn test_aggregate_empty() {
        let result = aggregate(stream::empty()).await;
        assert!(result.mine.is_empty());
        assert!(result.needs_review.is_empty());
        assert!(result.is_complete());
    }

    #[test]
    fn test_sort_by_creation_desc_is_stable() {
        let mut prs = vec![classified(1, 3), classified(2, 3), classified(3, 4)];
        sort_by_creation_desc(&mut prs);
        let numbers: Vec<u64> = prs.iter().map(|c| c.pr.number).collect();
        assert_eq!(numbers, vec![3, 1, 2]);
    }
}
