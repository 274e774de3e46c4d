// Copyright (c) The leetcode-weekly Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Fakes for the LeetCode and chat seams, shared by unit tests.

use crate::{
    error::{FetchError, NotifyError},
    leetcode::{
        ActivitySource, CalendarEntry, RecentActivity, SolvedCounts, SubmissionRecord,
        UpstreamProfile,
    },
    notify::NotificationSink,
    report::Report,
};
use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use std::{
    collections::HashMap,
    sync::{
        Arc, Mutex,
        atomic::{AtomicBool, Ordering},
    },
};
use tokio::sync::Notify;

/// Unix timestamp for a day and hour in August 2025 (UTC).
pub fn aug(day: u32, hour: u32) -> i64 {
    Utc.with_ymd_and_hms(2025, 8, day, hour, 0, 0).unwrap().timestamp()
}

/// Unix timestamp for a day and hour in September 2025 (UTC).
pub fn sep(day: u32, hour: u32) -> i64 {
    Utc.with_ymd_and_hms(2025, 9, day, hour, 0, 0).unwrap().timestamp()
}

pub fn submission(slug: &str, timestamp: i64, status: &str) -> SubmissionRecord {
    SubmissionRecord {
        title: slug.replace('-', " "),
        slug: slug.to_string(),
        timestamp,
        status: status.to_string(),
        language: "rust".to_string(),
    }
}

fn activity(
    handle: &str,
    submissions: Vec<SubmissionRecord>,
    calendar: Vec<CalendarEntry>,
    all_solved: u32,
) -> RecentActivity {
    RecentActivity {
        profile: UpstreamProfile {
            handle: handle.to_string(),
            solved: SolvedCounts {
                all: all_solved,
                easy: all_solved / 2,
                medium: all_solved - all_solved / 2,
                hard: 0,
            },
            ranking: Some(50_000),
            reputation: Some(3),
        },
        submissions,
        calendar: Some(calendar),
    }
}

/// `solved` distinct problems accepted on 2025-08-26, plus one rejected
/// submission.
pub fn light_week(handle: &str, solved: u32) -> RecentActivity {
    let mut submissions: Vec<_> = (0..solved)
        .map(|i| submission(&format!("problem-{i}"), aug(26, i % 24), "Accepted"))
        .collect();
    submissions.push(submission("problem-0", aug(26, 0), "Time Limit Exceeded"));

    let calendar = vec![CalendarEntry {
        day: aug(26, 0),
        submissions: solved + 1,
    }];
    activity(handle, submissions, calendar, 100)
}

/// A busy user whose recent list (100 entries, 30 distinct accepted
/// problems) only reaches 3 problems into the 2025-08-25 week, while the
/// calendar shows 40 submissions in it.
pub fn truncated_week(handle: &str) -> RecentActivity {
    let mut submissions = Vec::new();
    for i in 0..70 {
        submissions.push(submission("hard-one", sep(1, 12) + i, "Wrong Answer"));
    }
    for i in 0..27 {
        submissions.push(submission(&format!("later-{i}"), sep(1, 6) + i, "Accepted"));
    }
    for (i, day) in [26, 27, 28].into_iter().enumerate() {
        submissions.push(submission(&format!("in-window-{i}"), aug(day, 22), "Accepted"));
    }
    submissions.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));

    let mut calendar: Vec<_> = (25..=29)
        .map(|day| CalendarEntry {
            day: aug(day, 0),
            submissions: 8,
        })
        .collect();
    calendar.push(CalendarEntry {
        day: sep(1, 0),
        submissions: 97,
    });
    activity(handle, submissions, calendar, 300)
}

#[derive(Clone, Debug)]
pub enum Canned {
    Activity(RecentActivity),
    NotFound,
    Transient,
    Malformed,
}

/// Lets a test hold a fetch in flight.
#[derive(Default)]
pub struct Gate {
    /// Signalled when a fetch reaches the gate.
    pub entered: Notify,
    /// Signal to let the fetch continue.
    pub release: Notify,
}

#[derive(Default)]
pub struct FakeSource {
    responses: Mutex<HashMap<String, Canned>>,
    failures_left: Mutex<HashMap<String, u32>>,
    calls: Mutex<HashMap<String, usize>>,
    gate: Mutex<Option<Arc<Gate>>>,
}

impl FakeSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, handle: &str, canned: Canned) {
        self.responses
            .lock()
            .unwrap()
            .insert(handle.to_string(), canned);
    }

    /// Fail with `Transient` `failures` times before returning `activity`.
    pub fn set_flaky(&self, handle: &str, failures: u32, activity: RecentActivity) {
        self.set(handle, Canned::Activity(activity));
        self.failures_left
            .lock()
            .unwrap()
            .insert(handle.to_string(), failures);
    }

    /// Make every fetch wait on the returned gate.
    pub fn gate(&self) -> Arc<Gate> {
        let gate = Arc::new(Gate::default());
        *self.gate.lock().unwrap() = Some(Arc::clone(&gate));
        gate
    }

    pub fn calls(&self, handle: &str) -> usize {
        self.calls.lock().unwrap().get(handle).copied().unwrap_or(0)
    }
}

#[async_trait]
impl ActivitySource for FakeSource {
    async fn fetch_recent_activity(
        &self,
        handle: &str,
        _lookback_days: u32,
    ) -> Result<RecentActivity, FetchError> {
        *self
            .calls
            .lock()
            .unwrap()
            .entry(handle.to_string())
            .or_default() += 1;

        let gate = self.gate.lock().unwrap().clone();
        if let Some(gate) = gate {
            gate.entered.notify_one();
            gate.release.notified().await;
        }

        if let Some(left) = self.failures_left.lock().unwrap().get_mut(handle) {
            if *left > 0 {
                *left -= 1;
                return Err(FetchError::Transient("flaky".to_string()));
            }
        }

        let canned = self.responses.lock().unwrap().get(handle).cloned();
        match canned {
            Some(Canned::Activity(activity)) => Ok(activity),
            Some(Canned::Transient) => Err(FetchError::Transient("timed out".to_string())),
            Some(Canned::Malformed) => Err(FetchError::Malformed("bad shape".to_string())),
            Some(Canned::NotFound) | None => Err(FetchError::NotFound(handle.to_string())),
        }
    }
}

#[derive(Default)]
pub struct RecordingSink {
    posts: Mutex<Vec<(String, Report)>>,
    failing: AtomicBool,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing() -> Self {
        let sink = Self::default();
        sink.set_failing(true);
        sink
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn posts(&self) -> Vec<(String, Report)> {
        self.posts.lock().unwrap().clone()
    }
}

#[async_trait]
impl NotificationSink for RecordingSink {
    async fn post_message(&self, channel_id: &str, report: &Report) -> Result<(), NotifyError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(NotifyError::Rejected {
                status: 503,
                body: "unavailable".to_string(),
            });
        }
        self.posts
            .lock()
            .unwrap()
            .push((channel_id.to_string(), report.clone()));
        Ok(())
    }
}
