//! CLI entry point for `imapvault`.

use std::path::PathBuf;
use std::time::Instant;

use clap::{CommandFactory, Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};

use imapvault::config::{self, Account, Config};
use imapvault::model::report::RunReport;
use imapvault::remote::ImapConnector;
use imapvault::store::archive::{account_dir, account_stats, DirStats};
use imapvault::sync::{Archiver, FailurePolicy, Progress};

#[derive(Parser)]
#[command(name = "imapvault", version, about = "Incremental IMAP mailbox archiver")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Configuration file (JSON, or TOML with a .toml extension)
    #[arg(short, long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Verbose logging (-v info, -vv debug, -vvv trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch and archive every message not archived yet (default)
    Sync {
        /// Only archive this account (username)
        #[arg(short, long, value_name = "USERNAME")]
        account: Option<String>,
        /// Go on with the next account when one fails
        #[arg(long)]
        continue_on_error: bool,
        /// Print the run report as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show what a sync would fetch without writing anything
    Plan {
        #[arg(short, long, value_name = "USERNAME")]
        account: Option<String>,
        #[arg(long)]
        json: bool,
    },
    /// Summarize the local archive without connecting
    Inventory {
        #[arg(long)]
        json: bool,
    },
    /// Generate shell completions
    Completions {
        #[arg(value_enum)]
        shell: clap_complete::Shell,
    },
    /// Generate a man page
    Manpage,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // These never need a configuration file
    match cli.command {
        Some(Commands::Completions { shell }) => return cmd_completions(shell),
        Some(Commands::Manpage) => return cmd_manpage(),
        _ => {}
    }

    let config_path = config::config_file_path(cli.config.as_deref());
    let config = config::load_config(&config_path)?;

    let log_level = match cli.verbose {
        0 => config.log_level.as_str(),
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    setup_logging(log_level);
    tracing::info!(
        path = %config_path.display(),
        accounts = config.accounts.len(),
        "Loaded config"
    );

    match cli.command {
        Some(Commands::Sync {
            account,
            continue_on_error,
            json,
        }) => cmd_sync(&config, account.as_deref(), continue_on_error, json),
        None => cmd_sync(&config, None, false, false),
        Some(Commands::Plan { account, json }) => cmd_plan(&config, account.as_deref(), json),
        Some(Commands::Inventory { json }) => cmd_inventory(&config, json),
        Some(Commands::Completions { .. }) | Some(Commands::Manpage) => Ok(()),
    }
}

/// Set up tracing with stderr output and optional file logging.
fn setup_logging(level: &str) {
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));

    let stderr_layer = tracing_subscriber::fmt::layer().with_writer(std::io::stderr);

    let log_dir = config::cache_dir();
    if std::fs::create_dir_all(&log_dir).is_ok() {
        let file_appender = tracing_appender::rolling::never(&log_dir, config::LOG_FILE_NAME);
        let file_layer = tracing_subscriber::fmt::layer()
            .with_ansi(false)
            .with_writer(file_appender);

        tracing_subscriber::registry()
            .with(env_filter)
            .with(stderr_layer)
            .with(file_layer)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(stderr_layer)
            .init();
    }
}

/// Generate shell completions and print to stdout.
fn cmd_completions(shell: clap_complete::Shell) -> anyhow::Result<()> {
    let mut cmd = Cli::command();
    clap_complete::generate(shell, &mut cmd, "imapvault", &mut std::io::stdout());
    Ok(())
}

/// Generate a man page and print to stdout.
fn cmd_manpage() -> anyhow::Result<()> {
    let cmd = Cli::command();
    let man = clap_mangen::Man::new(cmd);
    let mut buf = Vec::new();
    man.render(&mut buf)?;
    std::io::Write::write_all(&mut std::io::stdout(), &buf)?;
    Ok(())
}

/// Resolve `--account` against the configuration.
fn select_accounts<'c>(config: &'c Config, only: Option<&str>) -> anyhow::Result<Vec<&'c Account>> {
    match only {
        Some(name) => match config.account(name) {
            Some(account) => Ok(vec![account]),
            None => anyhow::bail!("no account '{name}' in configuration"),
        },
        None => Ok(config.accounts.iter().collect()),
    }
}

fn progress_bar() -> ProgressBar {
    let pb = ProgressBar::new(0);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} {prefix} [{bar:40.cyan/blue}] {pos}/{len} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("#>-"),
    );
    pb
}

/// Archive new messages and print the report.
fn cmd_sync(
    config: &Config,
    only: Option<&str>,
    continue_on_error: bool,
    json: bool,
) -> anyhow::Result<()> {
    let accounts = select_accounts(config, only)?;
    let policy = if continue_on_error {
        FailurePolicy::Continue
    } else {
        config.failure_policy
    };

    let pb = progress_bar();
    let on_progress = |event: &Progress<'_>| {
        match *event {
            Progress::Account { username } => pb.set_prefix(username.to_string()),
            Progress::Mailbox { mailbox, .. } => {
                pb.set_message(mailbox.to_string());
                pb.set_position(0);
                pb.set_length(0);
            }
            Progress::Planned { planned, .. } => pb.set_length(planned as u64),
            Progress::Written { written, .. } => pb.set_position(written as u64),
        }
        true
    };

    let start = Instant::now();
    let report = Archiver::new(config, ImapConnector)
        .failure_policy(policy)
        .progress(&on_progress)
        .run(accounts);
    pb.finish_and_clear();

    print_report(&report, json, start.elapsed())?;

    if report.has_failures() {
        anyhow::bail!("{} account(s) failed", report.failures().count());
    }
    Ok(())
}

/// Plan without fetching and print the pending counts.
fn cmd_plan(config: &Config, only: Option<&str>, json: bool) -> anyhow::Result<()> {
    let accounts = select_accounts(config, only)?;

    let start = Instant::now();
    let report = Archiver::new(config, ImapConnector)
        .failure_policy(FailurePolicy::Continue)
        .dry_run(true)
        .run(accounts);

    print_report(&report, json, start.elapsed())?;

    if report.has_failures() {
        anyhow::bail!("{} account(s) failed", report.failures().count());
    }
    Ok(())
}

/// Summarize what is on disk for every configured account.
fn cmd_inventory(config: &Config, json: bool) -> anyhow::Result<()> {
    let mut summary: Vec<(&str, Vec<DirStats>)> = Vec::new();
    for account in &config.accounts {
        let dir = account_dir(&config.dir, &account.username);
        let stats = if dir.is_dir() {
            account_stats(&dir)?
        } else {
            Vec::new()
        };
        summary.push((&account.username, stats));
    }

    if json {
        let value: Vec<serde_json::Value> = summary
            .iter()
            .map(|(username, stats)| {
                serde_json::json!({
                    "username": username,
                    "mailboxes": stats,
                })
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&value)?);
        return Ok(());
    }

    use humansize::{format_size, BINARY};

    println!();
    println!("  {:<20} {}", "Archive", config.dir.display());
    for (username, stats) in &summary {
        println!();
        println!("  {username}");
        if stats.is_empty() {
            println!("    (nothing archived)");
            continue;
        }
        for s in stats {
            println!(
                "    {:<32} {:>8} {:>12}  max uid {}",
                s.mailbox,
                s.entries,
                format_size(s.bytes, BINARY),
                s.max_uid.map_or_else(|| "-".to_string(), |u| u.to_string())
            );
        }
    }
    println!();
    Ok(())
}

fn print_report(report: &RunReport, json: bool, elapsed: std::time::Duration) -> anyhow::Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(report)?);
        return Ok(());
    }

    use humansize::{format_size, BINARY};

    println!();
    for account in &report.accounts {
        println!("  {}", account.username);
        for mailbox in &account.mailboxes {
            if report.dry_run {
                println!(
                    "    {:<32} {:>6} remote {:>6} archived {:>6} pending",
                    mailbox.name, mailbox.remote, mailbox.archived, mailbox.planned
                );
            } else {
                println!(
                    "    {:<32} {:>6} written {:>12}",
                    mailbox.name,
                    mailbox.written,
                    format_size(mailbox.bytes, BINARY)
                );
            }
        }
        if !account.skipped.is_empty() {
            println!("    skipped: {}", account.skipped.join(", "));
        }
        if let Some(error) = &account.error {
            println!("    error: {error}");
        }
    }

    println!();
    if report.dry_run {
        let pending: usize = report.accounts.iter().map(|a| a.planned()).sum();
        println!("  {:<20} {}", "Pending", pending);
    } else {
        println!("  {:<20} {}", "Written", report.written());
        println!("  {:<20} {}", "Bytes", format_size(report.bytes(), BINARY));
    }
    println!("  {:<20} {:.2?}", "Elapsed", elapsed);
    println!();
    Ok(())
}
