//! Resolution of "Enterprise Bump" mirror pull requests.
//!
//! When a pull request in the primary public repository is merged forward,
//! a bot opens a counterpart pull request in a private repository and links
//! it from the original with a comment of the form
//! `Enterprise Bump PR: <url>`. The resolver follows that link so the mirror
//! is classified alongside its original.

use std::sync::LazyLock;

use anyhow::{Context, Result};
use regex::Regex;
use tokio::sync::{Semaphore, mpsc::UnboundedSender};
use tracing::{debug, warn};

use crate::types::{Comment, Forge, PullRequest, Repo};

pub const DEFAULT_PRIMARY_OWNER: &str = "dcos";
pub const DEFAULT_PRIMARY_REPO: &str = "dcos";
pub const DEFAULT_MIRROR_BOT: &str = "mesosphere-mergebot";

static MARKER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^Enterprise Bump PR: (.*)$").expect("mirror marker pattern is valid")
});

/// Where mirrors are looked for and how they are attributed.
#[derive(Debug, Clone, PartialEq)]
pub struct MirrorRule {
    /// Only pull requests in this repository can have a mirror.
    pub primary: Repo,
    /// Login of the bot that posts the marker comment.
    pub bot: String,
    /// Attribute resolved mirrors to the author of the original.
    pub reattribute: bool,
}

impl Default for MirrorRule {
    fn default() -> Self {
        Self {
            primary: Repo::new(DEFAULT_PRIMARY_OWNER, DEFAULT_PRIMARY_REPO)
                .expect("default primary repository is valid"),
            bot: DEFAULT_MIRROR_BOT.to_string(),
            reattribute: true,
        }
    }
}

impl MirrorRule {
    pub fn applies_to(&self, pr: &PullRequest) -> bool {
        pr.repo == self.primary
    }

    /// Returns the link of the first marker comment posted by the bot.
    pub fn find_marker<'a>(&self, comments: &'a [Comment]) -> Option<&'a str> {
        comments
            .iter()
            .filter(|c| c.author == self.bot)
            .find_map(|c| parse_marker(&c.body))
    }
}

/// Extracts the link from an `Enterprise Bump PR: <url>` comment body.
pub fn parse_marker(body: &str) -> Option<&str> {
    MARKER
        .captures(body.trim())
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().trim())
        .filter(|link| !link.is_empty())
}

/// Parses a pull request or issue web URL into its repository and number.
///
/// Both `/pull/` and `/issues/` paths are accepted since the bot links
/// either form.
pub fn parse_pr_url(url_str: &str) -> Result<(Repo, u64)> {
    let url =
        url::Url::parse(url_str).with_context(|| format!("Failed to parse URL: '{}'", url_str))?;

    let segments: Vec<&str> = url
        .path_segments()
        .context("Cannot parse URL path")?
        .filter(|s| !s.is_empty())
        .collect();

    let [owner, repo, kind, number] = segments.as_slice() else {
        anyhow::bail!(
            "URL must be in format https://github.com/owner/repo/pull/123, got: '{}'",
            url_str
        );
    };
    if *kind != "pull" && *kind != "issues" {
        anyhow::bail!("URL does not point at a pull request: '{}'", url_str);
    }

    let number: u64 = number
        .parse()
        .with_context(|| format!("Invalid PR number in URL: '{}'", url_str))?;
    Ok((Repo::new(*owner, *repo)?, number))
}

/// Hands a mirror over to the author of the pull request it mirrors.
///
/// The mirror is opened by the bot, but the human who authored the original
/// is the one waiting on its reviews. Nothing verifies the ownership beyond
/// the bot's link.
pub fn reattribute_mirror(mut mirror: PullRequest, original: &PullRequest) -> PullRequest {
    mirror.author = original.author.clone();
    mirror
}

/// Emits `candidate` to `sink`, followed by its mirror if one is found.
///
/// The original is always emitted first. Failures while looking for the
/// mirror are logged and end resolution for this candidate only.
pub async fn resolve_mirrors<F>(
    forge: &F,
    rule: &MirrorRule,
    gate: &Semaphore,
    candidate: PullRequest,
    sink: &UnboundedSender<PullRequest>,
) where
    F: Forge + ?Sized,
{
    let original = candidate.clone();
    if sink.send(candidate).is_err() {
        return;
    }

    if !rule.applies_to(&original) {
        return;
    }

    match fetch_mirror(forge, rule, gate, &original).await {
        Ok(Some(mirror)) => {
            debug!(original = %original, mirror = %mirror, "Resolved mirror PR");
            let mirror = if rule.reattribute {
                reattribute_mirror(mirror, &original)
            } else {
                mirror
            };
            let _ = sink.send(mirror);
        }
        Ok(None) => {}
        Err(err) => warn!(pr = %original, "Error resolving mirror PR: {:#}", err),
    }
}

async fn fetch_mirror<F>(
    forge: &F,
    rule: &MirrorRule,
    gate: &Semaphore,
    original: &PullRequest,
) -> Result<Option<PullRequest>>
where
    F: Forge + ?Sized,
{
    let comments = {
        let _permit = gate.acquire().await.context("concurrency gate closed")?;
        forge
            .list_comments(&original.repo, original.number)
            .await
            .context("Error fetching PR comments")?
    };

    let Some(link) = rule.find_marker(&comments) else {
        return Ok(None);
    };
    let (repo, number) = parse_pr_url(link)?;

    let issue = {
        let _permit = gate.acquire().await.context("concurrency gate closed")?;
        forge
            .get_issue(&repo, number)
            .await
            .with_context(|| format!("Error getting mirror PR {}#{}", repo, number))?
    };

    match issue {
        Some(issue) => {
            let pr = issue.into_pull_request();
            if pr.is_none() {
                debug!(%repo, number, "Mirror link points at an issue, not a PR");
            }
            Ok(pr)
        }
        None => {
            debug!(%repo, number, "Mirror PR not found");
            Ok(None)
        }
    }
}
