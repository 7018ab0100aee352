//! User configuration: identity, access token and teammates.
//!
//! Stored as JSON, by default in `~/.prs.json`. When the file is missing or
//! empty the user is asked for the values on the terminal and the answers
//! are written back so the prompt only happens once.

use std::{
    fs,
    io::{self, BufRead, Write},
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

pub const CONFIG_FILE_NAME: &str = ".prs.json";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(rename = "User", alias = "user", default)]
    pub user: String,
    #[serde(rename = "Token", alias = "token", default)]
    pub token: String,
    #[serde(rename = "Teammates", alias = "teammates", default)]
    pub teammates: Vec<String>,
    /// Organizations to search; the built-in set when absent.
    #[serde(
        rename = "Organizations",
        alias = "organizations",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub organizations: Option<Vec<String>>,
    /// Repository whose PRs may have an enterprise mirror, as `owner/repo`.
    #[serde(
        rename = "PrimaryRepo",
        alias = "primary_repo",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub primary_repo: Option<String>,
    /// Login of the bot that links mirror PRs.
    #[serde(
        rename = "MirrorBot",
        alias = "mirror_bot",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub mirror_bot: Option<String>,
}

impl Config {
    /// Checks that the mandatory fields are filled in.
    pub fn validate(&self) -> Result<()> {
        let mut problems = Vec::new();
        if self.user.trim().is_empty() {
            problems.push("user must not be empty");
        }
        if self.token.trim().is_empty() {
            problems.push("token must not be empty");
        }
        if !problems.is_empty() {
            anyhow::bail!("configuration invalid: {}", problems.join(", "));
        }
        Ok(())
    }

    /// Teammates with blank entries removed.
    pub fn teammates(&self) -> Vec<String> {
        self.teammates
            .iter()
            .map(|m| m.trim())
            .filter(|m| !m.is_empty())
            .map(str::to_string)
            .collect()
    }
}

/// Location of the configuration file in the user's home directory.
pub fn default_config_path() -> Result<PathBuf> {
    dirs::home_dir()
        .map(|home| home.join(CONFIG_FILE_NAME))
        .context("Cannot determine home directory for the configuration file")
}

/// Splits a comma-separated teammate list, ignoring all whitespace.
pub fn parse_teammates(input: &str) -> Vec<String> {
    let compact: String = input.chars().filter(|c| !c.is_whitespace()).collect();
    compact
        .split(',')
        .filter(|name| !name.is_empty())
        .map(str::to_string)
        .collect()
}

fn ask<R: BufRead, W: Write>(reader: &mut R, writer: &mut W, question: &str) -> Result<String> {
    write!(writer, "{question}")?;
    writer.flush()?;

    let mut line = String::new();
    let read = reader.read_line(&mut line)?;
    if read == 0 {
        anyhow::bail!("unexpected end of input while reading configuration");
    }
    Ok(line.trim_end_matches(['\r', '\n']).to_string())
}

/// Asks the user for the configuration values.
pub fn prompt_config<R: BufRead, W: Write>(reader: &mut R, writer: &mut W) -> Result<Config> {
    let user = ask(reader, writer, "Please enter your GitHub username: ")?;
    let token = ask(reader, writer, "Please enter a GitHub personal access token: ")?;
    let teammates = ask(
        reader,
        writer,
        "Please enter all GitHub usernames of your teammates (separated with commas): ",
    )?;

    Ok(Config {
        user: user.trim().to_string(),
        token: token.trim().to_string(),
        teammates: parse_teammates(&teammates),
        ..Config::default()
    })
}

/// Writes `config` to `path`, readable only by the owner on Unix.
pub fn write_config(path: &Path, config: &Config) -> Result<()> {
    let json = serde_json::to_vec_pretty(config).context("Failed to serialize configuration")?;

    let mut options = fs::OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }

    let mut file = options
        .open(path)
        .with_context(|| format!("Failed to open configuration file {}", path.display()))?;
    file.write_all(&json)
        .with_context(|| format!("Failed to write configuration file {}", path.display()))?;
    Ok(())
}

/// Reads the configuration at `path`, prompting through `reader`/`writer`
/// and saving the answers when the file is missing or empty.
pub fn load_or_prompt<R: BufRead, W: Write>(
    path: &Path,
    reader: &mut R,
    writer: &mut W,
) -> Result<Config> {
    let contents = match fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(err) if err.kind() == io::ErrorKind::NotFound => String::new(),
        Err(err) => {
            return Err(err)
                .with_context(|| format!("Failed to read configuration file {}", path.display()));
        }
    };

    if contents.trim().is_empty() {
        let config = prompt_config(reader, writer)?;
        // Rejected answers are not saved, so the next run prompts again.
        config.validate()?;
        write_config(path, &config)?;
        return Ok(config);
    }

    let config: Config = serde_json::from_str(&contents)
        .with_context(|| format!("Failed to parse configuration file {}", path.display()))?;
    config
        .validate()
        .with_context(|| format!("please check your configuration file {}", path.display()))?;
    Ok(config)
}

/// Loads the configuration, prompting on the terminal if needed.
pub fn load(path: &Path) -> Result<Config> {
    let stdin = io::stdin();
    let mut reader = stdin.lock();
    let mut writer = io::stdout();
    load_or_prompt(path, &mut reader, &mut writer)
}
