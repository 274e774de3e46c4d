// Copyright (c) The leetcode-weekly Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Weekly trigger for the aggregation run.

use crate::{aggregate::Aggregator, config::ScheduleConfig};
use anyhow::{Context, Result};
use chrono::{DateTime, Datelike, Duration, NaiveDateTime, NaiveTime, TimeZone, Utc};
use std::sync::Arc;
use tokio::signal;
use tracing::{error, info};

/// The first configured weekday/time strictly after `now`.
///
/// A wall-clock time skipped by a DST change fires an hour later instead.
pub fn next_fire_after(schedule: &ScheduleConfig, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
    let tz = schedule.timezone;
    let time = NaiveTime::from_hms_opt(schedule.hour, schedule.minute, 0)?;
    let today = now.with_timezone(&tz).date_naive();

    (0..=7)
        .map(|offset| today + Duration::days(offset))
        .filter(|date| date.weekday() == schedule.weekday)
        .filter_map(|date| {
            let local = NaiveDateTime::new(date, time);
            tz.from_local_datetime(&local)
                .earliest()
                .or_else(|| tz.from_local_datetime(&(local + Duration::hours(1))).earliest())
        })
        .map(|at| at.with_timezone(&Utc))
        .find(|at| *at > now)
}

/// Run the weekly update on schedule until interrupted.
pub async fn run(aggregator: Arc<Aggregator>, schedule: &ScheduleConfig) -> Result<()> {
    loop {
        let now = Utc::now();
        let next = next_fire_after(schedule, now)
            .with_context(|| format!("no upcoming time matches schedule {:?}", schedule))?;
        info!(
            next = %next.with_timezone(&schedule.timezone),
            "next weekly update scheduled"
        );

        let wait = (next - now).to_std().unwrap_or_default();
        tokio::select! {
            _ = tokio::time::sleep(wait) => {}
            _ = signal::ctrl_c() => {
                info!("received Ctrl+C, shutting down");
                return Ok(());
            }
        }

        match aggregator.run_weekly_aggregation(Utc::now()).await {
            Ok(result) => info!(
                window = %result.window,
                total = result.total,
                "scheduled weekly update posted"
            ),
            Err(err) => error!(error = %err, "scheduled weekly update failed"),
        }
    }
}
