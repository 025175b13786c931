use std::process::ExitCode;

use anyhow::Context as _;
use clap::Parser as _;

fn main() -> ExitCode {
    match try_main() {
        Ok(code) => code,
        Err(err) => {
            eprintln!("{err:#}");
            ExitCode::FAILURE
        }
    }
}

fn try_main() -> anyhow::Result<ExitCode> {
    casefetch::logging::init().context("init logging")?;

    let cli = casefetch::cli::Cli::parse();
    tracing::debug!(?cli, "parsed cli");

    match cli.command {
        casefetch::cli::Command::Discover(args) => {
            casefetch::catalog::run(args).context("discover")?;
        }
        casefetch::cli::Command::Subgroups(args) => {
            casefetch::catalog::run_subgroups(args).context("subgroups")?;
        }
        casefetch::cli::Command::Links(args) => {
            casefetch::links::run(args).context("links")?;
        }
        casefetch::cli::Command::Download(args) => {
            let summary = casefetch::download::run(args).context("download")?;
            if summary.has_failures() {
                return Ok(ExitCode::FAILURE);
            }
        }
    }

    Ok(ExitCode::SUCCESS)
}
