// Copyright (c) The leetcode-weekly Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Command implementations.

use crate::{
    aggregate::{Aggregator, AggregatorSettings, Outcome, RunMode},
    config::Config,
    db::{Database, Store},
    leetcode::{ActivitySource, LeetCodeClient},
    notify::{ConsoleSink, DiscordChannel, NotificationSink},
    registration::{Caller, Registrar},
    schedule, window,
};
use anyhow::{Context, Result};
use camino::Utf8Path;
use chrono::{DateTime, Utc};
use std::{sync::Arc, time::Duration};

/// Run the weekly trigger until interrupted.
pub async fn run_serve(database: &Utf8Path, config: &Config) -> Result<()> {
    let channel_id = config.discord_channel()?;
    let aggregator = Aggregator::new(
        leetcode_client(config)?,
        open_database(database)?,
        discord_sink(config)?,
        AggregatorSettings::from_config(config, channel_id),
    );

    println!(
        "Posting weekly updates to channel {} every {:?} at {:02}:{:02} ({})",
        channel_id,
        config.schedule.weekday,
        config.schedule.hour,
        config.schedule.minute,
        config.schedule.timezone
    );
    schedule::run(Arc::new(aggregator), &config.schedule).await
}

/// Run the weekly update once, on behalf of an administrator.
pub async fn run_update(
    database: &Utf8Path,
    config: &Config,
    caller: &str,
    now: Option<DateTime<Utc>>,
    dry_run: bool,
) -> Result<()> {
    caller_for(config, caller).require_admin()?;

    let (sink, channel_id): (Arc<dyn NotificationSink>, String) = if dry_run {
        let channel = config.discord.channel_id.as_deref().unwrap_or("console");
        (Arc::new(ConsoleSink), channel.to_string())
    } else {
        (discord_sink(config)?, config.discord_channel()?.to_string())
    };
    let mode = if dry_run {
        RunMode::DryRun
    } else {
        RunMode::Publish
    };

    let aggregator = Aggregator::new(
        leetcode_client(config)?,
        open_database(database)?,
        sink,
        AggregatorSettings::from_config(config, channel_id),
    );
    let result = aggregator
        .run(now.unwrap_or_else(Utc::now), mode)
        .await
        .context("weekly update failed")?;

    println!("\nWeek of {}", result.window);
    for (i, standing) in result.standings.iter().enumerate() {
        let note = match standing.outcome {
            Outcome::Counted => String::new(),
            Outcome::Reconciled { raw } => format!("  (estimated, {} seen in recent list)", raw),
            Outcome::Failed(kind) => format!("  (fetch failed: {:?})", kind),
        };
        println!(
            "{:>3}. {} ({}): {}{}",
            i + 1,
            standing.display_name,
            standing.handle,
            standing.solved,
            note
        );
    }
    println!("\nTotal: {} problems by {} users", result.total, result.active_users());
    if dry_run {
        println!("Dry run: weekly statistics were not saved.");
    }
    Ok(())
}

pub async fn run_register(
    database: &Utf8Path,
    config: &Config,
    caller: &str,
    display_name: &str,
    handle: &str,
) -> Result<()> {
    let registrar = registrar(database, config)?;
    let user = registrar
        .register(&caller_for(config, caller), display_name, handle)
        .await?;

    println!(
        "Registered {} with LeetCode username {}. Weekly updates will include your progress.",
        user.display_name, user.handle
    );
    Ok(())
}

pub fn run_unregister(database: &Utf8Path, config: &Config, caller: &str) -> Result<()> {
    let registrar = registrar(database, config)?;
    let user = registrar.unregister(&caller_for(config, caller))?;

    println!(
        "Unregistered {} ({}). You will no longer appear in weekly updates.",
        user.display_name, user.handle
    );
    Ok(())
}

pub fn run_admin_unregister(
    database: &Utf8Path,
    config: &Config,
    caller: &str,
    target: &str,
) -> Result<()> {
    let registrar = registrar(database, config)?;
    let user = registrar.admin_unregister(&caller_for(config, caller), target)?;

    println!("Unregistered {} ({}).", user.display_name, user.handle);
    Ok(())
}

pub async fn run_profile(database: &Utf8Path, config: &Config, caller: &str) -> Result<()> {
    let registrar = registrar(database, config)?;
    let profile = registrar
        .profile(&caller_for(config, caller), Utc::now())
        .await?;

    println!("{}", profile);
    Ok(())
}

/// List registered users in registration order.
pub fn run_users(database: &Utf8Path) -> Result<()> {
    let db = open_database(database)?;
    let users = db.list_users().context("failed to list users")?;

    if users.is_empty() {
        println!("No registered users.");
        return Ok(());
    }

    println!(
        "\n{:<20} {:<24} {:<20} {:<20}",
        "ID", "Name", "LeetCode", "Last updated"
    );
    println!("{}", "=".repeat(87));
    for user in &users {
        println!(
            "{:<20} {:<24} {:<20} {:<20}",
            user.external_id, user.display_name, user.handle, user.last_updated
        );
    }
    println!("\n{} registered users", users.len());
    Ok(())
}

/// Print the window the next update would report on.
pub fn run_window(config: &Config, now: Option<DateTime<Utc>>) -> Result<()> {
    let now = now.unwrap_or_else(Utc::now);
    let tz = config.schedule.timezone;
    let window = window::reporting_window(now, &tz);

    println!("Now:            {}", now.with_timezone(&tz));
    println!("Reporting week: {}", window);
    println!("Lookback:       {} days", window::lookback_days(now, &window, &tz));
    Ok(())
}

fn caller_for(config: &Config, external_id: &str) -> Caller {
    Caller::new(external_id, config.is_admin(external_id))
}

fn registrar(database: &Utf8Path, config: &Config) -> Result<Registrar> {
    Ok(Registrar::new(
        leetcode_client(config)?,
        open_database(database)?,
    ))
}

fn open_database(database: &Utf8Path) -> Result<Arc<dyn Store>> {
    let db = Database::open(database).context("failed to open database")?;
    Ok(Arc::new(db))
}

fn leetcode_client(config: &Config) -> Result<Arc<dyn ActivitySource>> {
    let client = LeetCodeClient::new(&config.upstream).context("failed to set up LeetCode client")?;
    Ok(Arc::new(client))
}

fn discord_sink(config: &Config) -> Result<Arc<dyn NotificationSink>> {
    let token = config.discord_token()?;
    let sink = DiscordChannel::new(
        &config.discord.api_base,
        token,
        Duration::from_secs(config.discord.timeout_secs),
    )?;
    Ok(Arc::new(sink))
}
