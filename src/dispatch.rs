// Copyright (c) The leetcode-weekly Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! CLI argument parsing and command dispatch.

use crate::{commands, config, db, query};
use anyhow::{Context, Result};
use camino::Utf8PathBuf;
use chrono::{DateTime, Utc};
use clap::Parser;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Path to the SQLite database file
    #[arg(short, long, default_value = "leetcode-weekly.db", global = true)]
    database: Utf8PathBuf,

    /// Path to the configuration file
    #[arg(short, long, default_value = "config.toml", global = true)]
    config: Utf8PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Parser, Debug)]
enum Command {
    /// Post the weekly update on schedule until interrupted
    Serve,

    /// Compute and post the weekly update now (admins only)
    Update {
        /// Chat user id issuing the command. Self-declared and not verified:
        /// admin checks trust whoever can run this binary
        #[arg(long = "as", value_name = "ID")]
        caller: String,

        /// Print the update instead of posting it, and don't save counts
        #[arg(long)]
        dry_run: bool,

        /// Pretend the current time is this RFC 3339 timestamp
        #[arg(long)]
        now: Option<DateTime<Utc>>,
    },

    /// Register a LeetCode username for weekly updates
    Register {
        /// Chat user id issuing the command
        #[arg(long = "as", value_name = "ID")]
        caller: String,

        /// Name shown in the leaderboard
        #[arg(long)]
        name: String,

        /// LeetCode username
        handle: String,
    },

    /// Remove your registration
    Unregister {
        /// Chat user id issuing the command
        #[arg(long = "as", value_name = "ID")]
        caller: String,
    },

    /// Remove another user's registration (admins only)
    AdminUnregister {
        /// Chat user id issuing the command. Self-declared and not verified:
        /// admin checks trust whoever can run this binary
        #[arg(long = "as", value_name = "ID")]
        caller: String,

        /// Chat user id to unregister
        target: String,
    },

    /// Show your LeetCode statistics
    Profile {
        /// Chat user id issuing the command
        #[arg(long = "as", value_name = "ID")]
        caller: String,
    },

    /// List registered users
    Users,

    /// Show the week the next update reports on
    Window {
        /// Pretend the current time is this RFC 3339 timestamp
        #[arg(long)]
        now: Option<DateTime<Utc>>,
    },

    /// Query stored weekly statistics
    Query {
        #[command(subcommand)]
        query_type: QueryType,
    },

    /// Export statistics to various formats
    Export {
        #[command(subcommand)]
        export_type: ExportType,
    },
}

#[derive(Parser, Debug)]
enum QueryType {
    /// Show per-week totals
    Weekly {
        /// Number of weeks to show (default: 12)
        #[arg(short = 'n', long, default_value = "12")]
        limit: usize,
    },

    /// Show one user's weekly history
    User {
        /// LeetCode username
        handle: String,

        /// Number of weeks to show (default: 12)
        #[arg(short = 'n', long, default_value = "12")]
        limit: usize,
    },

    /// Show the latest stored leaderboard
    Latest,
}

#[derive(Parser, Debug)]
enum ExportType {
    /// Export to CSV format
    Csv {
        /// Output file path
        #[arg(short, long)]
        output: Utf8PathBuf,
    },

    /// Export to JSON format
    Json {
        /// Output file path
        #[arg(short, long)]
        output: Utf8PathBuf,
    },
}

/// Parse arguments and dispatch to the appropriate command.
pub async fn dispatch() -> Result<()> {
    let args = Args::parse();
    let load_config =
        || config::Config::load(&args.config).context("failed to load configuration");

    match args.command {
        Command::Serve => {
            commands::run_serve(&args.database, &load_config()?).await?;
        }
        Command::Update {
            caller,
            dry_run,
            now,
        } => {
            commands::run_update(&args.database, &load_config()?, &caller, now, dry_run).await?;
        }
        Command::Register {
            caller,
            name,
            handle,
        } => {
            commands::run_register(&args.database, &load_config()?, &caller, &name, &handle)
                .await?;
        }
        Command::Unregister { caller } => {
            commands::run_unregister(&args.database, &load_config()?, &caller)?;
        }
        Command::AdminUnregister { caller, target } => {
            commands::run_admin_unregister(&args.database, &load_config()?, &caller, &target)?;
        }
        Command::Profile { caller } => {
            commands::run_profile(&args.database, &load_config()?, &caller).await?;
        }
        Command::Users => {
            commands::run_users(&args.database)?;
        }
        Command::Window { now } => {
            commands::run_window(&load_config()?, now)?;
        }
        Command::Query { query_type } => {
            let db = db::Database::open(&args.database).context("failed to open database")?;
            let query_kind = match query_type {
                QueryType::Weekly { limit } => query::QueryKind::Weekly { limit },
                QueryType::User { handle, limit } => query::QueryKind::User { handle, limit },
                QueryType::Latest => query::QueryKind::Latest,
            };
            query::run_query(&*db.connection()?, query_kind)?;
        }
        Command::Export { export_type } => {
            let db = db::Database::open(&args.database).context("failed to open database")?;
            let export_kind = match export_type {
                ExportType::Csv { output } => query::ExportKind::Csv {
                    output: output.to_string(),
                },
                ExportType::Json { output } => query::ExportKind::Json {
                    output: output.to_string(),
                },
            };
            query::run_export(&*db.connection()?, export_kind)?;
        }
    }

    Ok(())
}
