// Copyright (c) The leetcode-weekly Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration for the weekly update bot.

use crate::reconcile::Thresholds;
use anyhow::{Context, Result};
use camino::Utf8Path;
use chrono::Weekday;
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use std::fs;
use tracing::warn;

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct Config {
    /// Chat user ids allowed to run administrative commands.
    #[serde(default)]
    pub admins: Vec<String>,

    #[serde(default)]
    pub upstream: UpstreamConfig,

    #[serde(default)]
    pub schedule: ScheduleConfig,

    #[serde(default)]
    pub reconcile: Thresholds,

    #[serde(default)]
    pub discord: DiscordConfig,
}

#[derive(Debug, Deserialize, Serialize)]
#[serde(default)]
pub struct UpstreamConfig {
    pub endpoint: String,
    /// Requested size of the recent submission list. LeetCode may return
    /// fewer.
    pub recent_limit: u32,
    pub timeout_secs: u64,
    pub max_retries: u32,
    pub retry_backoff_ms: u64,
    /// Number of users fetched at the same time.
    pub concurrency: usize,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            endpoint: "https://leetcode.com/graphql".to_string(),
            recent_limit: 100,
            timeout_secs: 15,
            max_retries: 2,
            retry_backoff_ms: 2_000,
            concurrency: 4,
        }
    }
}

/// When the weekly update is posted. The timezone also decides where
/// reporting weeks begin and end.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ScheduleConfig {
    pub timezone: Tz,
    pub weekday: Weekday,
    pub hour: u32,
    pub minute: u32,
    /// A run lock older than this is treated as left behind by a crashed
    /// process and may be taken over.
    pub run_lock_timeout_secs: u64,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            timezone: chrono_tz::America::New_York,
            weekday: Weekday::Mon,
            hour: 9,
            minute: 0,
            run_lock_timeout_secs: 3_600,
        }
    }
}

#[derive(Debug, Deserialize, Serialize)]
#[serde(default)]
pub struct DiscordConfig {
    pub channel_id: Option<String>,
    pub api_base: String,
    /// Environment variable holding the bot token.
    pub token_env: String,
    /// Per-request timeout for Discord API calls.
    pub timeout_secs: u64,
}

impl Default for DiscordConfig {
    fn default() -> Self {
        Self {
            channel_id: None,
            api_base: "https://discord.com/api/v10".to_string(),
            token_env: "DISCORD_TOKEN".to_string(),
            timeout_secs: 15,
        }
    }
}

impl Config {
    /// Load configuration from a TOML file, falling back to defaults if the
    /// file does not exist.
    pub fn load(path: &Utf8Path) -> Result<Self> {
        if !path.as_std_path().exists() {
            warn!("no config file at {}, using defaults", path);
            return Ok(Self::default());
        }

        let content = fs::read_to_string(path.as_std_path())
            .with_context(|| format!("failed to read config file at {}", path))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("failed to parse config file at {}", path))?;
        config
            .validate()
            .with_context(|| format!("invalid config file at {}", path))?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.schedule.hour > 23 || self.schedule.minute > 59 {
            anyhow::bail!(
                "schedule time {:02}:{:02} is not a valid time of day",
                self.schedule.hour,
                self.schedule.minute
            );
        }
        if self.schedule.run_lock_timeout_secs == 0 {
            anyhow::bail!("schedule.run_lock_timeout_secs must be at least 1");
        }
        if self.discord.timeout_secs == 0 {
            anyhow::bail!("discord.timeout_secs must be at least 1");
        }
        if self.upstream.concurrency == 0 {
            anyhow::bail!("upstream.concurrency must be at least 1");
        }
        if !(0.0..=1.0).contains(&self.reconcile.min_coverage_ratio) {
            anyhow::bail!("reconcile.min_coverage_ratio must be between 0 and 1");
        }
        if self.reconcile.fallback_submissions_per_problem < 1.0 {
            anyhow::bail!("reconcile.fallback_submissions_per_problem must be at least 1");
        }
        Ok(())
    }

    pub fn is_admin(&self, external_id: &str) -> bool {
        self.admins.iter().any(|id| id == external_id)
    }

    /// Read the Discord bot token from the configured environment variable.
    pub fn discord_token(&self) -> Result<String> {
        std::env::var(&self.discord.token_env)
            .with_context(|| format!("{} is not set", self.discord.token_env))
    }

    pub fn discord_channel(&self) -> Result<&str> {
        self.discord
            .channel_id
            .as_deref()
            .context("discord.channel_id is not configured")
    }
}
