//! Build script for prs: embeds a human-readable version string.
//!
//! The string is `CARGO_PKG_VERSION (git-describe) rustc-version`. When the
//! checkout has no tags, `git describe` only yields a commit hash, so a
//! pseudo-version `v{version}-{yyyymmddHHMMSS}-{hash}` is used instead. The
//! git part is omitted entirely when git is unavailable (e.g. building from
//! a crates.io tarball).

use std::process::Command;

use chrono::{DateTime, Utc};

fn main() {
    for path in ["src", "build.rs", "Cargo.toml"] {
        println!("cargo:rerun-if-changed={path}");
    }

    let version = env!("CARGO_PKG_VERSION");
    let parts: Vec<String> = [
        Some(version.to_string()),
        git_version(version).map(|v| format!("({v})")),
        run(Command::new("rustc").arg("--version")),
    ]
    .into_iter()
    .flatten()
    .collect();

    println!("cargo:rustc-env=PRS_BUILD_INFO={}", parts.join(" "));
}

fn run(cmd: &mut Command) -> Option<String> {
    let output = cmd.output().ok().filter(|o| o.status.success())?;
    let text = String::from_utf8(output.stdout).ok()?;
    let text = text.trim();
    (!text.is_empty()).then(|| text.to_string())
}

fn git(args: &[&str]) -> Option<String> {
    run(Command::new("git").args(args))
}

fn git_version(version: &str) -> Option<String> {
    let described = git(&["describe", "--tags", "--always", "--dirty"])?;
    if described.contains('v') || described.contains("-g") {
        return Some(described);
    }

    let hash = git(&["rev-parse", "--short=12", "HEAD"])?;
    let dirty = described.ends_with("-dirty");
    // Clean builds are stamped with the commit time so they are reproducible.
    let stamp = git(&["log", "-1", "--format=%ct"])
        .filter(|_| !dirty)
        .and_then(|secs| secs.parse::<i64>().ok())
        .and_then(|secs| DateTime::<Utc>::from_timestamp(secs, 0))
        .unwrap_or_else(Utc::now)
        .format("%Y%m%d%H%M%S");
    let suffix = if dirty { "+dirty" } else { "" };

    Some(format!("v{version}-{stamp}-{hash}{suffix}"))
}
