use std::{path::PathBuf, time::Duration};

use anyhow::{Context, Result};
use clap::Parser;

use crate::{
    config::{Config, default_config_path},
    mirror::MirrorRule,
    query::{DEFAULT_MAX_CONCURRENT, DEFAULT_ORGANIZATIONS, DEFAULT_STALE_AFTER_DAYS, QuerySpec},
    types::Repo,
};

const BUILD_INFO: &str = env!("PRS_BUILD_INFO");

/// Upper bound for `--stale-after`, roughly a century.
const MAX_STALE_AFTER_DAYS: i64 = 36_500;

/// How the report is printed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisplayMode {
    Table,
    Quiet,
}

#[derive(Parser, Debug)]
#[command(
    name = "prs",
    about = "Show the open PRs waiting on your review and your own PRs still waiting on approvals"
)]
#[command(long_version = BUILD_INFO)]
struct CliArgs {
    /// Configuration file (default: ~/.prs.json)
    #[arg(long, env = "PRS_CONFIG", value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Organization to search (can specify multiple or comma-separated)
    #[arg(short = 'o', long = "org", value_name = "ORG", value_delimiter = ',')]
    pub orgs: Vec<String>,

    /// Delay before each review fetch (e.g. 500ms, 3s, 1m; unitless implies seconds)
    #[arg(long, default_value = "3s", value_name = "DURATION")]
    pub throttle: String,

    /// Maximum number of concurrent GitHub requests
    #[arg(short = 'j', long, default_value_t = DEFAULT_MAX_CONCURRENT, value_name = "NUM")]
    pub max_concurrent: usize,

    /// Skip PRs not updated within this many days
    #[arg(long, default_value_t = DEFAULT_STALE_AFTER_DAYS, value_name = "DAYS")]
    pub stale_after: i64,

    /// Do not look for enterprise mirror PRs
    #[arg(long)]
    pub no_mirrors: bool,

    /// Keep the bot as author of mirror PRs instead of the original author
    #[arg(long)]
    pub keep_mirror_author: bool,

    /// Print PR URLs only
    #[arg(short = 'q', long)]
    pub quiet: bool,

    /// Exit with status 1 if reviews could not be fetched for some PR
    #[arg(long)]
    pub fail_on_error: bool,

    /// Enable debug logging
    #[arg(long)]
    pub debug: bool,
}

impl CliArgs {
    fn validate(&self) -> Result<()> {
        if self.max_concurrent == 0 {
            anyhow::bail!("--max-concurrent must be at least 1");
        }
        if !(0..=MAX_STALE_AFTER_DAYS).contains(&self.stale_after) {
            anyhow::bail!(
                "--stale-after must be between 0 and {} days",
                MAX_STALE_AFTER_DAYS
            );
        }
        if self.orgs.iter().any(|o| o.trim().is_empty()) {
            anyhow::bail!("--org must not be empty");
        }
        Ok(())
    }
}

/// Parsed and validated command-line options.
#[derive(Debug, Clone)]
pub struct CliOptions {
    pub config_path: PathBuf,
    pub organizations: Vec<String>,
    pub throttle: Duration,
    pub max_concurrent: usize,
    pub stale_after: chrono::Duration,
    pub mirrors: bool,
    pub reattribute_mirrors: bool,
    pub display_mode: DisplayMode,
    pub fail_on_error: bool,
    pub debug: bool,
}

impl CliOptions {
    /// Combines the options with the user's configuration.
    ///
    /// Organizations given on the command line win over the configured
    /// ones, which win over the built-in set.
    pub fn query_spec(&self, config: &Config) -> Result<QuerySpec> {
        let mut spec = QuerySpec::new(config.user.trim(), config.teammates());

        spec.organizations = if !self.organizations.is_empty() {
            self.organizations.clone()
        } else {
            config
                .organizations
                .clone()
                .filter(|orgs| !orgs.is_empty())
                .unwrap_or_else(|| DEFAULT_ORGANIZATIONS.iter().map(|s| s.to_string()).collect())
        };

        spec.mirror = if self.mirrors {
            let mut rule = MirrorRule {
                reattribute: self.reattribute_mirrors,
                ..MirrorRule::default()
            };
            if let Some(primary) = &config.primary_repo {
                rule.primary = Repo::parse(primary)
                    .with_context(|| format!("Invalid PrimaryRepo '{}'", primary))?;
            }
            if let Some(bot) = config.mirror_bot.as_deref().filter(|b| !b.trim().is_empty()) {
                rule.bot = bot.trim().to_string();
            }
            Some(rule)
        } else {
            None
        };

        spec.stale_after = self.stale_after;
        spec.throttle = self.throttle;
        spec.max_concurrent = self.max_concurrent;
        Ok(spec)
    }
}

/// Parses a delay such as `500ms`, `3s`, `2m` or `1h`. A bare number is
/// taken as seconds.
pub fn parse_throttle_duration(throttle_str: &str) -> Result<Duration> {
    let throttle_str = throttle_str.trim();

    if let Ok(seconds) = throttle_str.parse::<u64>() {
        return Ok(Duration::from_secs(seconds));
    }

    if let Some(millis_str) = throttle_str.strip_suffix("ms") {
        let millis: u64 = millis_str
            .parse()
            .with_context(|| format!("Invalid throttle milliseconds: '{}'", millis_str))?;
        return Ok(Duration::from_millis(millis));
    }

    if let Some(seconds_str) = throttle_str.strip_suffix('s') {
        let seconds: u64 = seconds_str
            .parse()
            .with_context(|| format!("Invalid throttle seconds: '{}'", seconds_str))?;
        return Ok(Duration::from_secs(seconds));
    }

    if let Some(minutes_str) = throttle_str.strip_suffix('m') {
        let minutes: u64 = minutes_str
            .parse()
            .with_context(|| format!("Invalid throttle minutes: '{}'", minutes_str))?;
        let seconds = minutes
            .checked_mul(60)
            .with_context(|| format!("Throttle too large: '{}'", throttle_str))?;
        return Ok(Duration::from_secs(seconds));
    }

    if let Some(hours_str) = throttle_str.strip_suffix('h') {
        let hours: u64 = hours_str
            .parse()
            .with_context(|| format!("Invalid throttle hours: '{}'", hours_str))?;
        let seconds = hours
            .checked_mul(3600)
            .with_context(|| format!("Throttle too large: '{}'", throttle_str))?;
        return Ok(Duration::from_secs(seconds));
    }

    anyhow::bail!(
        "Invalid throttle format '{}'. Supported formats: unitless number (seconds), '500ms', '30s', '5m', '2h'",
        throttle_str
    )
}

fn build_options(cli: CliArgs) -> Result<CliOptions> {
    cli.validate()?;

    let config_path = match cli.config {
        Some(path) => path,
        None => default_config_path()?,
    };

    Ok(CliOptions {
        config_path,
        organizations: cli.orgs.iter().map(|o| o.trim().to_string()).collect(),
        throttle: parse_throttle_duration(&cli.throttle)?,
        max_concurrent: cli.max_concurrent,
        stale_after: chrono::Duration::try_days(cli.stale_after)
            .context("--stale-after is out of range")?,
        mirrors: !cli.no_mirrors,
        reattribute_mirrors: !cli.keep_mirror_author,
        display_mode: if cli.quiet {
            DisplayMode::Quiet
        } else {
            DisplayMode::Table
        },
        fail_on_error: cli.fail_on_error,
        debug: cli.debug,
    })
}

/// Parses command-line arguments into validated options.
///
/// Errors from clap (including `--help` and `--version`) are returned as
/// `clap::Error` inside the `anyhow::Error` so the caller can tell them
/// apart.
pub fn parse_args<I, T>(args: I) -> Result<CliOptions>
where
    I: IntoIterator<Item = T>,
    T: Into<std::ffi::OsString> + Clone,
{
    let cli = CliArgs::try_parse_from(args)?;
    build_options(cli)
}
