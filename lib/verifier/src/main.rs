//! `provenance-verify`: checks deployed contracts against the source they
//! declare.
use std::{path::PathBuf, process::ExitCode};

use alloy::primitives::Address;
use clap::{Parser, Subcommand};
use eyre::{bail, WrapErr};
use provenance_verifier::{
    check_record, ChainReader, Config, ProvenanceRecord, Report, RpcReader,
    Verifier,
};
use serde::Serialize;
use tracing_subscriber::EnvFilter;
use url::Url;

/// Checks that deployed contracts were built from the source they declare.
#[derive(Debug, Parser)]
#[command(name = "provenance-verify", version, about)]
struct Cli {
    /// Configuration file.
    #[arg(long, short, global = true)]
    config: Option<PathBuf>,

    /// JSON-RPC endpoint, overrides `rpc_url` of the configuration.
    #[arg(long, env = "RPC_URL", global = true)]
    rpc_url: Option<Url>,

    /// Prints results as JSON on stdout.
    #[arg(long, global = true)]
    json: bool,

    /// Raises the log level, once for debug, twice for trace.
    #[arg(long, short, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Fetches, rebuilds and compares the source of each contract.
    Verify {
        /// Contracts to verify.
        #[arg(required = true)]
        addresses: Vec<Address>,
    },
    /// Reads and checks the record a contract declares.
    Show {
        /// Contract to read.
        address: Address,
    },
    /// Lists every record of a contract keeping its provenance history.
    History {
        /// Contract to read.
        address: Address,
    },
    /// Checks the format of a record without touching the chain.
    Check {
        /// Repository type, e.g. `git`.
        repository_type: String,
        /// Repository URL.
        repository_url: String,
        /// Commit hash.
        commit_hash: String,
    },
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct Failure {
    address: Address,
    error: String,
}

#[tokio::main]
async fn main() -> eyre::Result<ExitCode> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let config = match &cli.config {
        Some(path) => Config::load(path)
            .wrap_err_with(|| format!("failed to load {}", path.display()))?,
        None => Config::default(),
    };

    match &cli.command {
        Command::Verify { addresses } => {
            verify(&cli, &config, addresses).await
        }
        Command::Show { address } => show(&cli, &config, *address).await,
        Command::History { address } => {
            history(&cli, &config, *address).await
        }
        Command::Check { repository_type, repository_url, commit_hash } => {
            let record = ProvenanceRecord::new(
                repository_type.as_str(),
                repository_url.as_str(),
                commit_hash.as_str(),
            );
            check(&cli, &config, &record)
        }
    }
}

fn init_tracing(verbose: u8) {
    let default = match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default));

    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(filter)
        .init();
}

fn connect(cli: &Cli, config: &Config) -> eyre::Result<RpcReader> {
    let rpc_url = match &cli.rpc_url {
        Some(url) => url.clone(),
        None => match config.rpc_url()? {
            Some(url) => url,
            None => bail!("no RPC endpoint, pass --rpc-url or set rpc_url"),
        },
    };
    Ok(RpcReader::connect(rpc_url))
}

async fn verify(
    cli: &Cli,
    config: &Config,
    addresses: &[Address],
) -> eyre::Result<ExitCode> {
    let reader = connect(cli, config)?;
    let verifier = Verifier::new(reader, config.fetcher(), config.builder())
        .with_policy(config.policy())
        .with_comparator(config.comparator())
        .with_max_parallel(config.max_parallel);

    let results = verifier.verify_many(addresses).await;

    let mut all_match = true;
    let mut reports = Vec::new();
    let mut failures = Vec::new();
    for (address, result) in addresses.iter().zip(results) {
        match result {
            Ok(report) => {
                all_match &= report.verdict.is_match();
                reports.push(report);
            }
            Err(e) => {
                all_match = false;
                failures
                    .push(Failure { address: *address, error: e.to_string() });
            }
        }
    }

    if cli.json {
        let out =
            serde_json::json!({ "reports": reports, "failures": failures });
        println!("{}", serde_json::to_string_pretty(&out)?);
    } else {
        for report in &reports {
            print_report(report);
        }
        for failure in &failures {
            println!("{}: ERROR: {}", failure.address, failure.error);
        }
    }

    Ok(if all_match { ExitCode::SUCCESS } else { ExitCode::FAILURE })
}

fn print_report(report: &Report) {
    println!("{}: {}", report.address, report.verdict);
    println!("  {}", report.record);
    for problem in &report.problems {
        println!("  warning: {problem}");
    }
}

async fn show(
    cli: &Cli,
    config: &Config,
    address: Address,
) -> eyre::Result<ExitCode> {
    let reader = connect(cli, config)?;
    let record = reader
        .provenance(address)
        .await
        .wrap_err_with(|| format!("failed to read provenance of {address}"))?;
    let advertised = reader
        .supports_provenance(address)
        .await
        .wrap_err("failed to query supportsInterface")?;
    let history = reader
        .supports_history(address)
        .await
        .wrap_err("failed to query supportsInterface")?;

    let problems =
        check_record(&config.fetcher(), &config.policy(), &record).await;

    if cli.json {
        let out = serde_json::json!({
            "address": address,
            "record": record,
            "supportsInterface": advertised,
            "keepsHistory": history,
            "problems": problems,
        });
        println!("{}", serde_json::to_string_pretty(&out)?);
    } else {
        println!("address:         {address}");
        println!("repository type: {}", record.repository_type);
        println!("repository url:  {}", record.repository_url);
        println!("commit hash:     {}", record.commit_hash);
        let advertised =
            if advertised { "advertised" } else { "not advertised" };
        println!("erc-165:         {advertised}");
        let history = if history { "kept" } else { "not kept" };
        println!("history:         {history}");
        for problem in &problems {
            println!("problem:         {problem}");
        }
    }

    Ok(if problems.is_empty() { ExitCode::SUCCESS } else { ExitCode::FAILURE })
}

async fn history(
    cli: &Cli,
    config: &Config,
    address: Address,
) -> eyre::Result<ExitCode> {
    let reader = connect(cli, config)?;
    let advertised = reader
        .supports_history(address)
        .await
        .wrap_err("failed to query supportsInterface")?;
    if !advertised {
        tracing::warn!(%address, "contract does not advertise its history");
    }
    let records = reader.history(address).await.wrap_err_with(|| {
        format!("failed to read provenance history of {address}")
    })?;

    if cli.json {
        println!("{}", serde_json::to_string_pretty(&records)?);
    } else if records.is_empty() {
        println!("{address}: no records");
    } else {
        for (index, record) in records.iter().enumerate() {
            println!("#{index} {record}");
        }
    }

    Ok(ExitCode::SUCCESS)
}

fn check(
    cli: &Cli,
    config: &Config,
    record: &ProvenanceRecord,
) -> eyre::Result<ExitCode> {
    let problems = record.check(&config.known_refs);

    if cli.json {
        println!("{}", serde_json::to_string_pretty(&problems)?);
    } else if problems.is_empty() {
        println!("ok: {record}");
    } else {
        for problem in &problems {
            println!("{problem}");
        }
    }

    Ok(if problems.is_empty() { ExitCode::SUCCESS } else { ExitCode::FAILURE })
}
