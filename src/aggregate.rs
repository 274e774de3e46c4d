// Copyright (c) The leetcode-weekly Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Weekly aggregation of solved problems across registered users.

use crate::{
    config::Config,
    db::{RegisteredUser, Store},
    error::{FetchError, RunError},
    leetcode::{ActivitySource, CalendarEntry, RecentActivity, SubmissionRecord},
    notify::NotificationSink,
    reconcile::{self, Estimate, Thresholds},
    report,
    window::{self, ReportingWindow},
};
use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use serde::Serialize;
use std::{
    collections::{HashMap, HashSet},
    sync::{
        Arc, Mutex, PoisonError,
        atomic::{AtomicU64, Ordering},
    },
    time::Duration,
};
use tokio::{sync::Semaphore, task::JoinSet};
use tracing::{debug, error, info, warn};

/// A problem counted towards a user's week.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct SolvedProblem {
    pub title: String,
    pub slug: String,
    /// Unix timestamp of the first accepted submission in the window.
    pub solved_at: i64,
    pub language: String,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FailureKind {
    NotFound,
    Transient,
    Malformed,
    /// The user's task died before producing a result.
    Aborted,
}

impl From<&FetchError> for FailureKind {
    fn from(err: &FetchError) -> Self {
        match err {
            FetchError::NotFound(_) => FailureKind::NotFound,
            FetchError::Transient(_) => FailureKind::Transient,
            FetchError::Malformed(_) => FailureKind::Malformed,
        }
    }
}

/// How a user's count was arrived at.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Outcome {
    Counted,
    /// The recent list looked truncated and the calendar estimate was used.
    Reconciled { raw: u32 },
    /// Fetching failed; the user counts as zero.
    Failed(FailureKind),
}

#[derive(Clone, Debug)]
pub struct Standing {
    pub user_id: i64,
    pub display_name: String,
    pub handle: String,
    pub solved: u32,
    pub problems: Vec<SolvedProblem>,
    pub outcome: Outcome,
}

impl Standing {
    fn failed(user: &RegisteredUser, kind: FailureKind) -> Self {
        Self {
            user_id: user.id,
            display_name: user.display_name.clone(),
            handle: user.handle.clone(),
            solved: 0,
            problems: Vec::new(),
            outcome: Outcome::Failed(kind),
        }
    }
}

/// The ranked result of one weekly run.
#[derive(Clone, Debug)]
pub struct AggregationResult {
    pub window: ReportingWindow,
    /// Sorted by solved count, descending; ties keep registration order.
    pub standings: Vec<Standing>,
    pub total: u32,
}

impl AggregationResult {
    pub fn active_users(&self) -> usize {
        self.standings.len()
    }
}

/// Accepted submissions inside the window, one per problem, keeping the
/// earliest acceptance. Sorted oldest first.
pub fn solved_in_window(
    submissions: &[SubmissionRecord],
    window: &ReportingWindow,
    tz: &Tz,
) -> Vec<SolvedProblem> {
    let mut by_slug: HashMap<&str, &SubmissionRecord> = HashMap::new();
    for submission in submissions {
        if !submission.is_accepted() || !window.contains_timestamp(submission.timestamp, tz) {
            continue;
        }
        by_slug
            .entry(submission.slug.as_str())
            .and_modify(|kept| {
                if submission.timestamp < kept.timestamp {
                    *kept = submission;
                }
            })
            .or_insert(submission);
    }

    let mut problems: Vec<_> = by_slug
        .into_values()
        .map(|s| SolvedProblem {
            title: s.title.clone(),
            slug: s.slug.clone(),
            solved_at: s.timestamp,
            language: s.language.clone(),
        })
        .collect();
    problems.sort_by(|a, b| a.solved_at.cmp(&b.solved_at).then_with(|| a.slug.cmp(&b.slug)));
    problems
}

/// Distinct accepted problems anywhere in the recent list.
pub fn unique_accepted(submissions: &[SubmissionRecord]) -> usize {
    submissions
        .iter()
        .filter(|s| s.is_accepted())
        .map(|s| s.slug.as_str())
        .collect::<HashSet<_>>()
        .len()
}

/// Calendar submissions on days inside the window. Calendar days are UTC
/// days.
pub fn calendar_window_submissions(calendar: &[CalendarEntry], window: &ReportingWindow) -> u32 {
    calendar
        .iter()
        .filter(|entry| {
            DateTime::from_timestamp(entry.day, 0)
                .map(|day| window.contains(day.date_naive()))
                .unwrap_or(false)
        })
        .map(|entry| entry.submissions)
        .sum()
}

/// Count a user's week, correcting for the recent-list cap if needed.
///
/// Submissions are placed in the window by their local day in `tz`, but
/// calendar entries are UTC days. Away from UTC the two can disagree near
/// the window edges: a late Sunday solve in New York counts towards the raw
/// count while its calendar day (Monday UTC) falls outside the window. The
/// calendar sum only decides whether to correct, so this shifts the estimate
/// at most by one day's submissions.
pub fn tally(
    activity: &RecentActivity,
    window: &ReportingWindow,
    tz: &Tz,
    thresholds: &Thresholds,
) -> (Vec<SolvedProblem>, Estimate) {
    let problems = solved_in_window(&activity.submissions, window, tz);
    let calendar = activity
        .calendar
        .as_deref()
        .map(|calendar| calendar_window_submissions(calendar, window));

    let estimate = reconcile::estimate_problems_solved(
        problems.len() as u32,
        activity.submissions.len(),
        calendar,
        unique_accepted(&activity.submissions),
        thresholds,
    );
    (problems, estimate)
}

#[derive(Clone, Debug)]
pub struct AggregatorSettings {
    pub timezone: Tz,
    pub thresholds: Thresholds,
    pub concurrency: usize,
    pub max_retries: u32,
    pub retry_backoff: Duration,
    pub channel_id: String,
    /// Age after which another process's run lock counts as abandoned.
    pub run_lock_timeout: Duration,
}

impl AggregatorSettings {
    pub fn from_config(config: &Config, channel_id: impl Into<String>) -> Self {
        Self {
            timezone: config.schedule.timezone,
            thresholds: config.reconcile,
            concurrency: config.upstream.concurrency,
            max_retries: config.upstream.max_retries,
            retry_backoff: Duration::from_millis(config.upstream.retry_backoff_ms),
            channel_id: channel_id.into(),
            run_lock_timeout: Duration::from_secs(config.schedule.run_lock_timeout_secs),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RunState {
    Idle,
    Running,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RunMode {
    /// Persist counts and post the report.
    Publish,
    /// Post the report but leave stored counts untouched.
    DryRun,
}

/// Everything a per-user task needs.
#[derive(Clone, Copy, Debug)]
struct UserContext {
    window: ReportingWindow,
    lookback_days: u32,
    timezone: Tz,
    thresholds: Thresholds,
    max_retries: u32,
    retry_backoff: Duration,
}

/// Releases the store's run lock and resets the run state when a run ends,
/// however it ends.
struct RunGuard<'a> {
    aggregator: &'a Aggregator,
    holder: Option<String>,
}

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        if let Some(holder) = &self.holder {
            if let Err(err) = self.aggregator.store.release_run_lock(holder) {
                warn!(%holder, error = %err, "failed to release run lock");
            }
        }
        *self
            .aggregator
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = RunState::Idle;
    }
}

/// Identifies one run across every process sharing the database.
fn run_lock_holder() -> String {
    static NEXT_RUN: AtomicU64 = AtomicU64::new(0);
    format!(
        "{}:{}",
        std::process::id(),
        NEXT_RUN.fetch_add(1, Ordering::Relaxed)
    )
}

pub struct Aggregator {
    source: Arc<dyn ActivitySource>,
    store: Arc<dyn Store>,
    sink: Arc<dyn NotificationSink>,
    settings: AggregatorSettings,
    state: Mutex<RunState>,
}

impl Aggregator {
    pub fn new(
        source: Arc<dyn ActivitySource>,
        store: Arc<dyn Store>,
        sink: Arc<dyn NotificationSink>,
        settings: AggregatorSettings,
    ) -> Self {
        Self {
            source,
            store,
            sink,
            settings,
            state: Mutex::new(RunState::Idle),
        }
    }

    pub fn run_state(&self) -> RunState {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Compute, store and post the leaderboard for the week before `now`.
    ///
    /// Fails with [`RunError::AlreadyRunning`] if another run has not
    /// finished yet, on this aggregator or in any process using the same
    /// store.
    pub async fn run_weekly_aggregation(
        &self,
        now: DateTime<Utc>,
    ) -> Result<AggregationResult, RunError> {
        self.run(now, RunMode::Publish).await
    }

    pub async fn run(
        &self,
        now: DateTime<Utc>,
        mode: RunMode,
    ) -> Result<AggregationResult, RunError> {
        let _guard = self.begin()?;

        let tz = self.settings.timezone;
        let window = window::reporting_window(now, &tz);
        let lookback_days = window::lookback_days(now, &window, &tz);
        info!(%window, lookback_days, ?mode, "starting weekly update");

        let users = self.store.list_users().map_err(RunError::ListUsers)?;
        info!("processing {} users", users.len());

        let ctx = UserContext {
            window,
            lookback_days,
            timezone: tz,
            thresholds: self.settings.thresholds,
            max_retries: self.settings.max_retries,
            retry_backoff: self.settings.retry_backoff,
        };
        let mut standings = self.collect_standings(&users, ctx).await;

        if mode == RunMode::Publish {
            for standing in &standings {
                self.persist(&window, standing);
            }
        }

        // Stable sort, so ties stay in registration order.
        standings.sort_by(|a, b| b.solved.cmp(&a.solved));
        let total = standings.iter().map(|s| s.solved).sum();
        let result = AggregationResult {
            window,
            standings,
            total,
        };

        let report = report::weekly_report(&result, now);
        self.sink
            .post_message(&self.settings.channel_id, &report)
            .await
            .inspect_err(|err| error!(error = %err, "failed to post weekly update"))?;

        info!(
            total = result.total,
            users = result.active_users(),
            "weekly update complete"
        );
        Ok(result)
    }

    fn begin(&self) -> Result<RunGuard<'_>, RunError> {
        {
            let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
            if *state == RunState::Running {
                warn!("weekly update already running, skipping");
                return Err(RunError::AlreadyRunning);
            }
            *state = RunState::Running;
        }
        // From here on, dropping the guard resets the state.
        let mut guard = RunGuard {
            aggregator: self,
            holder: None,
        };

        let holder = run_lock_holder();
        let stale_after = self.settings.run_lock_timeout.as_secs() as i64;
        match self
            .store
            .try_acquire_run_lock(&holder, Utc::now().timestamp(), stale_after)
        {
            Ok(true) => {
                debug!(%holder, "took run lock");
                guard.holder = Some(holder);
                Ok(guard)
            }
            Ok(false) => {
                warn!("weekly update already running in another process, skipping");
                Err(RunError::AlreadyRunning)
            }
            Err(err) => {
                error!(error = %err, "failed to take run lock");
                Err(RunError::Lock(err))
            }
        }
    }

    /// Process every user and wait for all of them. Users whose task fails
    /// count as zero.
    async fn collect_standings(&self, users: &[RegisteredUser], ctx: UserContext) -> Vec<Standing> {
        let semaphore = Arc::new(Semaphore::new(self.settings.concurrency.max(1)));
        let mut tasks = JoinSet::new();

        for (index, user) in users.iter().cloned().enumerate() {
            let source = Arc::clone(&self.source);
            let semaphore = Arc::clone(&semaphore);
            tasks.spawn(async move {
                let _permit = semaphore.acquire_owned().await.ok();
                (index, process_user(source.as_ref(), &user, &ctx).await)
            });
        }

        let mut slots: Vec<Option<Standing>> = users.iter().map(|_| None).collect();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((index, standing)) => slots[index] = Some(standing),
                Err(err) => error!(error = %err, "user task failed"),
            }
        }

        users
            .iter()
            .zip(slots)
            .map(|(user, slot)| slot.unwrap_or_else(|| Standing::failed(user, FailureKind::Aborted)))
            .collect()
    }

    fn persist(&self, window: &ReportingWindow, standing: &Standing) {
        // Don't clobber an earlier good count with a failure.
        if let Outcome::Failed(_) = standing.outcome {
            return;
        }

        if let Err(err) = self
            .store
            .upsert_weekly_stat(standing.user_id, window.start, standing.solved)
        {
            error!(handle = %standing.handle, error = %err, "failed to save weekly stats");
            return;
        }
        if let Err(err) = self.store.touch_user(standing.user_id) {
            warn!(handle = %standing.handle, error = %err, "failed to update last_updated");
        }
    }
}

async fn process_user(
    source: &dyn ActivitySource,
    user: &RegisteredUser,
    ctx: &UserContext,
) -> Standing {
    debug!(name = %user.display_name, handle = %user.handle, "processing user");

    let activity = match fetch_with_retry(source, &user.handle, ctx).await {
        Ok(activity) => activity,
        Err(err) => {
            let kind = FailureKind::from(&err);
            warn!(handle = %user.handle, ?kind, error = %err, "failed to get data, counting zero");
            return Standing::failed(user, kind);
        }
    };

    debug!(
        handle = %user.handle,
        submissions = activity.submissions.len(),
        all_time = activity.total_solved_all_time(),
        "fetched activity"
    );

    let (problems, estimate) = tally(&activity, &ctx.window, &ctx.timezone, &ctx.thresholds);
    let raw = problems.len() as u32;
    let outcome = if estimate.count > raw {
        info!(
            handle = %user.handle,
            raw,
            estimate = estimate.count,
            ratio = ?estimate.ratio,
            "recent submissions look truncated, using calendar estimate"
        );
        Outcome::Reconciled { raw }
    } else {
        Outcome::Counted
    };

    info!(handle = %user.handle, solved = estimate.count, "counted user");
    Standing {
        user_id: user.id,
        display_name: user.display_name.clone(),
        handle: user.handle.clone(),
        solved: estimate.count,
        problems,
        outcome,
    }
}

async fn fetch_with_retry(
    source: &dyn ActivitySource,
    handle: &str,
    ctx: &UserContext,
) -> Result<RecentActivity, FetchError> {
    let mut attempt = 0;
    loop {
        match source.fetch_recent_activity(handle, ctx.lookback_days).await {
            Err(err) if err.is_retryable() && attempt < ctx.max_retries => {
                attempt += 1;
                let delay = ctx.retry_backoff * attempt;
                warn!(handle, attempt, error = %err, "retrying in {:?}", delay);
                tokio::time::sleep(delay).await;
            }
            result => return result,
        }
    }
}
