use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;

use crate::application::{AppError, LedgerService, RetryPolicy};
use crate::config::{
    DEFAULT_BUSY_TIMEOUT_MS, DEFAULT_DATABASE, DEFAULT_MAX_CONNECTIONS, LedgerConfig, StoreConfig,
};
use crate::domain::{AccountId, LedgerEntry, format_amount, parse_amount};
use crate::logging::{self, LogFormat};

/// Argentum - account ledger for a small bank
#[derive(Parser)]
#[command(name = "argentum")]
#[command(about = "Accounts, balances and an append-only transaction ledger")]
#[command(version)]
pub struct Cli {
    /// Database file path
    #[arg(short, long, env = "ARGENTUM_DB", default_value = DEFAULT_DATABASE)]
    pub database: String,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Log line format
    #[arg(long, global = true, value_enum, default_value_t = LogFormat::Text)]
    pub log_format: LogFormat,

    /// Maximum pooled database connections
    #[arg(long, env = "ARGENTUM_MAX_CONNECTIONS", default_value_t = DEFAULT_MAX_CONNECTIONS)]
    pub max_connections: u32,

    /// How long to wait on a locked database before retrying (milliseconds)
    #[arg(long, env = "ARGENTUM_BUSY_TIMEOUT_MS", default_value_t = DEFAULT_BUSY_TIMEOUT_MS)]
    pub busy_timeout_ms: u64,

    /// Attempts per operation before reporting the ledger busy
    #[arg(long, env = "ARGENTUM_MAX_ATTEMPTS", default_value_t = crate::application::DEFAULT_MAX_ATTEMPTS)]
    pub max_attempts: u32,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Initialize a new database
    Init,

    #[command(flatten)]
    Ledger(LedgerCommand),
}

/// Commands that run against an initialized database
#[derive(Subcommand)]
pub enum LedgerCommand {
    /// Open a new account
    Open {
        #[arg(long)]
        first_name: String,

        #[arg(long)]
        last_name: String,

        #[arg(long)]
        email: String,

        /// Account password
        #[arg(long, env = "ARGENTUM_PASSWORD", hide_env_values = true)]
        password: String,
    },

    /// Show the balance of an account
    Balance {
        /// Account ID
        account: AccountId,
    },

    /// Deposit money into an account
    Deposit {
        /// Account ID
        account: AccountId,

        /// Whole amount (e.g. "50" or "1,000")
        amount: String,
    },

    /// Withdraw money from an account
    Withdraw {
        /// Account ID
        account: AccountId,

        /// Whole amount (e.g. "50" or "1,000")
        amount: String,
    },

    /// Terminate an account (irreversible)
    Terminate {
        /// Account ID
        account: AccountId,
    },

    /// Transfer money between accounts
    Transfer {
        /// Whole amount (e.g. "50" or "1,000")
        amount: String,

        /// Source account ID
        #[arg(long)]
        from: AccountId,

        /// Destination account ID
        #[arg(long)]
        to: AccountId,
    },

    /// Check a login
    Login {
        #[arg(long)]
        email: String,

        #[arg(long, env = "ARGENTUM_PASSWORD", hide_env_values = true)]
        password: String,
    },

    /// List all accounts
    Accounts {
        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },

    /// Show the ledger entries of an account
    History {
        /// Account ID
        account: AccountId,

        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },

    /// Replay the ledger and compare it with stored balances
    Reconcile {
        /// Print JSON instead of text
        #[arg(long)]
        json: bool,
    },
}

impl Cli {
    fn config(&self) -> LedgerConfig {
        let store = StoreConfig::new(&self.database)
            .with_max_connections(self.max_connections)
            .with_busy_timeout(Duration::from_millis(self.busy_timeout_ms));

        LedgerConfig {
            store,
            ..LedgerConfig::default()
        }
        .with_retry(RetryPolicy::new(self.max_attempts))
    }

    pub async fn run(self) -> Result<()> {
        logging::init(self.verbose, self.log_format);
        let config = self.config();

        match self.command {
            Commands::Init => {
                LedgerService::init(&config).await?;
                println!("Database initialized: {}", self.database);
            }

            Commands::Ledger(command) => {
                let service = LedgerService::connect(&config).await.with_context(|| {
                    format!("Cannot open database {} (run `init` first?)", self.database)
                })?;

                let outcome = run_command(&service, command).await;
                service.repository().close().await;
                outcome.map_err(explain)?;
            }
        }

        Ok(())
    }
}

/// Tell the user when a failure is worth retrying.
fn explain(err: anyhow::Error) -> anyhow::Error {
    match err.downcast_ref::<AppError>() {
        Some(app) if app.is_transient() => {
            err.context("The ledger is busy right now; the command can be retried")
        }
        _ => err,
    }
}

async fn run_command(service: &LedgerService, command: LedgerCommand) -> Result<()> {
    match command {
        LedgerCommand::Open {
            first_name,
            last_name,
            email,
            password,
        } => {
            let account = service
                .open_account(&first_name, &last_name, &email, &password)
                .await?;
            println!(
                "Opened account {} for {} <{}>",
                account.id,
                account.full_name(),
                account.email
            );
        }

        LedgerCommand::Balance { account } => {
            let balance = service.check_balance(account).await?;
            println!("{}", format_amount(balance));
        }

        LedgerCommand::Deposit { account, amount } => {
            let amount = parse_cli_amount(&amount)?;
            let change = service.deposit(account, amount).await?;
            println!(
                "Deposited {} into {}. Balance: {}",
                format_amount(amount),
                account,
                format_amount(change.balance)
            );
        }

        LedgerCommand::Withdraw { account, amount } => {
            let amount = parse_cli_amount(&amount)?;
            let change = service.withdraw(account, amount).await?;
            println!(
                "Withdrew {} from {}. Balance: {}",
                format_amount(amount),
                account,
                format_amount(change.balance)
            );
        }

        LedgerCommand::Terminate { account } => {
            let account = service.terminate_account(account).await?;
            println!(
                "Terminated account {} (final balance {})",
                account.id,
                format_amount(account.balance)
            );
        }

        LedgerCommand::Transfer { amount, from, to } => {
            let amount = parse_cli_amount(&amount)?;
            let mut result = service.transfer(from, to, amount).await?;
            println!(
                "Transferred {} {} -> {} ({})",
                format_amount(amount),
                from,
                to,
                result.transfer_id
            );
            println!(
                "  {:>8}: {}",
                from,
                format_amount(result.source.balance)
            );
            println!(
                "  {:>8}: {}",
                to,
                format_amount(result.destination.balance)
            );
            if let Some(notice) = result.notice.take() {
                println!("Warning: account {} is overdrawn", from);
                // Let the notice go out before the process exits
                let _ = notice.await;
            }
        }

        LedgerCommand::Login { email, password } => {
            let account = service.login(&email, &password).await?;
            println!("Welcome, {} (account {})", account.first_name, account.id);
        }

        LedgerCommand::Accounts { json } => {
            let accounts = service.list_accounts().await?;
            if json {
                print_json(&accounts)?;
            } else if accounts.is_empty() {
                println!("No accounts.");
            } else {
                println!(
                    "{:>6}  {:<24} {:<30} {:>14}  {}",
                    "ID", "Name", "Email", "Balance", "Status"
                );
                println!("{}", "-".repeat(86));
                for account in accounts {
                    println!(
                        "{:>6}  {:<24} {:<30} {:>14}  {}",
                        account.id,
                        truncate(&account.full_name(), 24),
                        truncate(&account.email, 30),
                        format_amount(account.balance),
                        if account.terminated { "terminated" } else { "open" }
                    );
                }
            }
        }

        LedgerCommand::History { account, json } => {
            let entries = service.history(account).await?;
            if json {
                print_json(&entries)?;
            } else {
                print_history(account, &entries);
            }
        }

        LedgerCommand::Reconcile { json } => {
            let report = service.reconcile().await?;
            if json {
                print_json(&report)?;
            } else {
                println!("Accounts: {}", report.accounts_checked);
                println!("Entries:  {}", report.entries_checked);
                println!();
                if report.is_consistent() {
                    println!("Ledger is consistent.");
                } else {
                    println!("Issues found:");
                    for issue in report.issues() {
                        println!("  - {}", issue);
                    }
                }
            }
            if !report.is_consistent() {
                anyhow::bail!("Ledger reconciliation failed");
            }
        }
    }

    Ok(())
}

fn parse_cli_amount(input: &str) -> Result<i64> {
    parse_amount(input).with_context(|| format!("Invalid amount '{}'. Use a whole number like '50'", input))
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn print_history(account: AccountId, entries: &[LedgerEntry]) {
    if entries.is_empty() {
        println!("No ledger entries for account {}.", account);
        return;
    }

    println!(
        "{:>6}  {:<20} {:<13} {:>12}  {:>12}  {}",
        "Seq", "Recorded", "Kind", "Amount", "Balance", "Counterparty"
    );
    println!("{}", "-".repeat(80));

    let mut running = 0;
    for entry in entries {
        running += entry.delta();
        println!(
            "{:>6}  {:<20} {:<13} {:>12}  {:>12}  {}",
            entry.sequence,
            entry.recorded_at.format("%Y-%m-%d %H:%M:%S"),
            entry.kind,
            format_amount(entry.delta()),
            format_amount(running),
            entry
                .counterparty
                .map(|id| id.to_string())
                .unwrap_or_default()
        );
    }
}

fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{}...", kept)
    }
}
