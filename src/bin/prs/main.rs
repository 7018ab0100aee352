mod display;

use std::{process::ExitCode, sync::Arc};

use anyhow::Result;
use display::{display_report, output_failures};
use prs::{CliOptions, GitHub, config, fetch_review_report, parse_args};

fn handle_clap_help_version(clap_err: &clap::Error) -> ExitCode {
    use clap::error::ErrorKind;
    match clap_err.kind() {
        ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => {
            print!("{clap_err}");
            ExitCode::SUCCESS
        }
        _ => {
            eprint!("{clap_err}");
            ExitCode::from(2)
        }
    }
}

fn init_tracing(debug: bool) {
    use tracing_subscriber::{EnvFilter, fmt, prelude::*};

    let default_level = if debug { "debug" } else { "warn" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
        .with(filter)
        .init();
}

async fn run(opts: &CliOptions) -> Result<ExitCode> {
    let config = config::load(&opts.config_path)?;
    let spec = opts.query_spec(&config)?;
    let github = Arc::new(GitHub::new(&config.token)?);

    let result = fetch_review_report(&spec, github).await?;

    output_failures(&result.failures, &mut std::io::stderr())?;
    display_report(&result, opts.display_mode, &mut std::io::stdout().lock())?;

    if opts.fail_on_error && !result.failures.is_empty() {
        return Ok(ExitCode::FAILURE);
    }
    Ok(ExitCode::SUCCESS)
}

#[tokio::main]
async fn main() -> ExitCode {
    let opts = match parse_args(std::env::args_os()) {
        Ok(opts) => opts,
        Err(err) => {
            if let Some(clap_err) = err.downcast_ref::<clap::Error>() {
                return handle_clap_help_version(clap_err);
            }
            eprintln!("Error: {err:#}");
            return ExitCode::FAILURE;
        }
    };

    init_tracing(opts.debug);

    match run(&opts).await {
        Ok(code) => code,
        Err(err) => {
            eprintln!("Error: {err:#}");
            ExitCode::FAILURE
        }
    }
}
