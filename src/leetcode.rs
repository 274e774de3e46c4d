// Copyright (c) The leetcode-weekly Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! LeetCode GraphQL client for fetching a user's recent activity.
//!
//! LeetCode's `recentSubmissionList` is capped: it returns at most a fixed
//! number of submissions (observed between 100 and 150), newest first,
//! regardless of the requested limit. Anyone who submits more than that in a
//! week loses the oldest in-window submissions from the response. The
//! submission calendar has no such cap but counts submissions rather than
//! distinct problems. See `reconcile` for how the two are combined.

use crate::{config::UpstreamConfig, error::FetchError};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use std::{collections::BTreeMap, time::Duration};
use tracing::{debug, warn};

pub const ACCEPTED: &str = "Accepted";

const USER_ACTIVITY_QUERY: &str = r#"
query userWeeklyActivity($username: String!, $limit: Int!) {
  matchedUser(username: $username) {
    username
    profile {
      ranking
      reputation
    }
    submitStats {
      acSubmissionNum {
        difficulty
        count
      }
    }
    submissionCalendar
  }
  recentSubmissionList(username: $username, limit: $limit) {
    title
    titleSlug
    timestamp
    statusDisplay
    lang
  }
}
"#;

/// One submission from the recent-submission list.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct SubmissionRecord {
    pub title: String,
    /// Identifies the problem, not the submission.
    pub slug: String,
    pub timestamp: i64,
    pub status: String,
    pub language: String,
}

impl SubmissionRecord {
    pub fn is_accepted(&self) -> bool {
        self.status == ACCEPTED
    }
}

/// Submissions made on one UTC day.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CalendarEntry {
    /// Unix timestamp of the start of the day.
    pub day: i64,
    pub submissions: u32,
}

/// All-time accepted problem counts.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SolvedCounts {
    pub all: u32,
    pub easy: u32,
    pub medium: u32,
    pub hard: u32,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UpstreamProfile {
    pub handle: String,
    pub solved: SolvedCounts,
    pub ranking: Option<u64>,
    pub reputation: Option<i64>,
}

#[derive(Clone, Debug)]
pub struct RecentActivity {
    pub profile: UpstreamProfile,
    /// Newest first, accepted and rejected alike.
    pub submissions: Vec<SubmissionRecord>,
    /// `None` when the calendar was missing or unreadable.
    pub calendar: Option<Vec<CalendarEntry>>,
}

impl RecentActivity {
    pub fn total_solved_all_time(&self) -> u32 {
        self.profile.solved.all
    }
}

/// A source of per-handle activity.
#[async_trait]
pub trait ActivitySource: Send + Sync {
    async fn fetch_recent_activity(
        &self,
        handle: &str,
        lookback_days: u32,
    ) -> Result<RecentActivity, FetchError>;
}

pub struct LeetCodeClient {
    client: reqwest::Client,
    endpoint: String,
    recent_limit: u32,
}

impl LeetCodeClient {
    pub fn new(config: &UpstreamConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("leetcode-weekly/", env!("CARGO_PKG_VERSION")))
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .context("failed to build HTTP client")?;

        Ok(Self {
            client,
            endpoint: config.endpoint.clone(),
            recent_limit: config.recent_limit,
        })
    }
}

#[async_trait]
impl ActivitySource for LeetCodeClient {
    async fn fetch_recent_activity(
        &self,
        handle: &str,
        lookback_days: u32,
    ) -> Result<RecentActivity, FetchError> {
        debug!(handle, lookback_days, "querying LeetCode");

        let body = serde_json::json!({
            "query": USER_ACTIVITY_QUERY,
            "variables": { "username": handle, "limit": self.recent_limit },
        });

        let response = self
            .client
            .post(&self.endpoint)
            .header("Referer", "https://leetcode.com")
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(classify_status(status, &body));
        }

        let text = response.text().await?;
        let horizon = Utc::now().timestamp() - i64::from(lookback_days) * 86_400;
        decode_response(handle, &text, horizon)
    }
}

fn classify_status(status: StatusCode, body: &str) -> FetchError {
    let message = format!("status {}: {}", status, truncate(body, 200));
    if status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
        FetchError::Transient(message)
    } else {
        FetchError::Malformed(message)
    }
}

fn truncate(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

#[derive(Debug, Deserialize)]
struct GraphQlResponse {
    data: Option<ResponseData>,
    #[serde(default)]
    errors: Vec<GraphQlError>,
}

#[derive(Debug, Deserialize)]
struct GraphQlError {
    message: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ResponseData {
    matched_user: Option<MatchedUser>,
    recent_submission_list: Option<Vec<RawSubmission>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MatchedUser {
    username: String,
    profile: Option<RawProfile>,
    submit_stats: SubmitStats,
    submission_calendar: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawProfile {
    ranking: Option<u64>,
    reputation: Option<i64>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SubmitStats {
    ac_submission_num: Vec<DifficultyCount>,
}

#[derive(Debug, Deserialize)]
struct DifficultyCount {
    difficulty: String,
    count: u32,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawSubmission {
    title: String,
    title_slug: String,
    timestamp: RawTimestamp,
    status_display: String,
    lang: String,
}

/// LeetCode sends timestamps as strings of digits.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawTimestamp {
    Text(String),
    Number(i64),
}

impl RawTimestamp {
    fn parse(&self) -> Result<i64, FetchError> {
        match self {
            RawTimestamp::Number(n) => Ok(*n),
            RawTimestamp::Text(s) => s
                .parse()
                .map_err(|_| FetchError::Malformed(format!("invalid timestamp '{}'", s))),
        }
    }
}

/// Decode a GraphQL response body. Calendar days that ended before
/// `horizon` (a unix timestamp) are dropped.
fn decode_response(handle: &str, body: &str, horizon: i64) -> Result<RecentActivity, FetchError> {
    let response: GraphQlResponse =
        serde_json::from_str(body).map_err(|e| FetchError::Malformed(e.to_string()))?;

    let data = match response.data {
        Some(data) => data,
        None if !response.errors.is_empty() => {
            let messages: Vec<_> = response.errors.into_iter().map(|e| e.message).collect();
            return Err(FetchError::Malformed(messages.join("; ")));
        }
        None => return Err(FetchError::Malformed("response has no data".to_string())),
    };

    // A handle that doesn't exist comes back as a null user, usually with an
    // accompanying "user does not exist" error.
    let user = data
        .matched_user
        .ok_or_else(|| FetchError::NotFound(handle.to_string()))?;

    let raw_submissions = data.recent_submission_list.ok_or_else(|| {
        FetchError::Malformed("recentSubmissionList is missing".to_string())
    })?;

    let submissions = raw_submissions
        .into_iter()
        .map(|raw| {
            Ok(SubmissionRecord {
                timestamp: raw.timestamp.parse()?,
                title: raw.title,
                slug: raw.title_slug,
                status: raw.status_display,
                language: raw.lang,
            })
        })
        .collect::<Result<Vec<_>, FetchError>>()?;

    let solved = solved_counts(&user.submit_stats.ac_submission_num)?;

    let calendar = match user.submission_calendar.as_deref().map(decode_calendar) {
        Some(Ok(entries)) => Some(trim_calendar(entries, horizon)),
        Some(Err(err)) => {
            warn!(handle, error = %err, "ignoring unreadable submission calendar");
            None
        }
        None => {
            warn!(handle, "LeetCode returned no submission calendar");
            None
        }
    };

    let (ranking, reputation) = user
        .profile
        .map(|p| (p.ranking, p.reputation))
        .unwrap_or_default();

    Ok(RecentActivity {
        profile: UpstreamProfile {
            handle: user.username,
            solved,
            ranking,
            reputation,
        },
        submissions,
        calendar,
    })
}

fn solved_counts(counts: &[DifficultyCount]) -> Result<SolvedCounts, FetchError> {
    let mut solved = SolvedCounts::default();
    let mut saw_all = false;
    for entry in counts {
        match entry.difficulty.as_str() {
            "All" => {
                solved.all = entry.count;
                saw_all = true;
            }
            "Easy" => solved.easy = entry.count,
            "Medium" => solved.medium = entry.count,
            "Hard" => solved.hard = entry.count,
            other => debug!(difficulty = other, "ignoring unknown difficulty"),
        }
    }

    if !saw_all {
        return Err(FetchError::Malformed(
            "acSubmissionNum has no 'All' entry".to_string(),
        ));
    }
    Ok(solved)
}

/// The calendar is a JSON object encoded as a string, mapping day
/// timestamps to submission counts.
fn decode_calendar(raw: &str) -> Result<Vec<CalendarEntry>, String> {
    let map: BTreeMap<String, u32> = serde_json::from_str(raw).map_err(|e| e.to_string())?;
    let mut entries = map
        .into_iter()
        .map(|(day, submissions)| {
            day.parse()
                .map(|day| CalendarEntry { day, submissions })
                .map_err(|_| format!("invalid calendar day '{}'", day))
        })
        .collect::<Result<Vec<_>, _>>()?;
    entries.sort_by_key(|e| e.day);
    Ok(entries)
}

fn trim_calendar(entries: Vec<CalendarEntry>, horizon: i64) -> Vec<CalendarEntry> {
    entries
        .into_iter()
        .filter(|e| e.day + 86_400 > horizon)
        .collect()
}
