// Copyright (c) The leetcode-weekly Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Delivery of reports to a chat channel.

use crate::{error::NotifyError, report::Report};
use anyhow::{Context, Result};
use async_trait::async_trait;
use std::time::Duration;
use tracing::info;

#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn post_message(&self, channel_id: &str, report: &Report) -> Result<(), NotifyError>;
}

/// Posts reports as embeds through the Discord REST API.
pub struct DiscordChannel {
    client: reqwest::Client,
    api_base: String,
    token: String,
}

impl DiscordChannel {
    /// `timeout` bounds each API call, from connecting to reading the body.
    pub fn new(api_base: &str, token: String, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!(
                "DiscordBot (leetcode-weekly, ",
                env!("CARGO_PKG_VERSION"),
                ")"
            ))
            .build()
            .context("failed to build HTTP client")?;

        Ok(Self {
            client,
            api_base: api_base.trim_end_matches('/').to_string(),
            token,
        })
    }
}

#[async_trait]
impl NotificationSink for DiscordChannel {
    async fn post_message(&self, channel_id: &str, report: &Report) -> Result<(), NotifyError> {
        let url = format!("{}/channels/{}/messages", self.api_base, channel_id);
        let body = serde_json::json!({ "embeds": [report.to_embed()] });

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bot {}", self.token))
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(NotifyError::Rejected { status, body });
        }

        info!(channel_id, "posted report");
        Ok(())
    }
}

/// Prints reports to stdout instead of posting them.
pub struct ConsoleSink;

#[async_trait]
impl NotificationSink for ConsoleSink {
    async fn post_message(&self, channel_id: &str, report: &Report) -> Result<(), NotifyError> {
        println!("--- would post to channel {} ---", channel_id);
        println!("{}", report);
        Ok(())
    }
}
