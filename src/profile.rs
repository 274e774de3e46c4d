// Copyright (c) The leetcode-weekly Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Statistics shown by the `profile` command.

use crate::{
    aggregate::SolvedProblem,
    db::RegisteredUser,
    error::FetchError,
    leetcode::{CalendarEntry, RecentActivity, SolvedCounts},
};
use chrono::{DateTime, Duration, NaiveDate, Utc};
use std::{collections::HashSet, fmt};

/// Days covered by the "recent activity" numbers.
pub const RECENT_DAYS: i64 = 7;

/// How much calendar to request so that long streaks are visible.
pub const CALENDAR_LOOKBACK_DAYS: u32 = 366;

const RECENT_PROBLEMS_SHOWN: usize = 5;

#[derive(Clone, Debug, PartialEq)]
pub struct ProfileStats {
    pub solved: SolvedCounts,
    pub ranking: Option<u64>,
    pub reputation: Option<i64>,
    /// Consecutive days with at least one submission, ending today or
    /// yesterday.
    pub streak: u32,
    /// Calendar submissions over the last [`RECENT_DAYS`] days.
    pub recent_submissions: u32,
    /// Distinct problems accepted over the last [`RECENT_DAYS`] days, newest
    /// first.
    pub recent_problems: Vec<SolvedProblem>,
}

/// A registered user together with whatever LeetCode had to say about them.
#[derive(Debug)]
pub struct Profile {
    pub user: RegisteredUser,
    pub stats: Result<ProfileStats, FetchError>,
}

pub fn profile_stats(activity: &RecentActivity, now: DateTime<Utc>) -> ProfileStats {
    let today = now.date_naive();
    let cutoff = (now - Duration::days(RECENT_DAYS)).timestamp();

    let mut seen = HashSet::new();
    let mut recent: Vec<_> = activity
        .submissions
        .iter()
        .filter(|s| s.is_accepted() && s.timestamp >= cutoff)
        .map(|s| SolvedProblem {
            title: s.title.clone(),
            slug: s.slug.clone(),
            solved_at: s.timestamp,
            language: s.language.clone(),
        })
        .collect();
    recent.sort_by(|a, b| b.solved_at.cmp(&a.solved_at));
    recent.retain(|p| seen.insert(p.slug.clone()));

    let calendar = activity.calendar.as_deref().unwrap_or_default();
    let first_recent_day = today - Duration::days(RECENT_DAYS - 1);
    let recent_submissions = calendar
        .iter()
        .filter(|e| {
            calendar_date(e).is_some_and(|date| first_recent_day <= date && date <= today)
        })
        .map(|e| e.submissions)
        .sum();

    ProfileStats {
        solved: activity.profile.solved,
        ranking: activity.profile.ranking,
        reputation: activity.profile.reputation,
        streak: current_streak(calendar, today),
        recent_submissions,
        recent_problems: recent,
    }
}

fn calendar_date(entry: &CalendarEntry) -> Option<NaiveDate> {
    DateTime::from_timestamp(entry.day, 0).map(|at| at.date_naive())
}

/// Consecutive active days ending at `today`. A day without submissions
/// so far doesn't break a streak that ran through yesterday.
pub fn current_streak(calendar: &[CalendarEntry], today: NaiveDate) -> u32 {
    let active: HashSet<NaiveDate> = calendar
        .iter()
        .filter(|e| e.submissions > 0)
        .filter_map(calendar_date)
        .collect();

    let mut day = if active.contains(&today) {
        today
    } else {
        today - Duration::days(1)
    };

    let mut streak = 0;
    while active.contains(&day) {
        streak += 1;
        day -= Duration::days(1);
    }
    streak
}

impl fmt::Display for Profile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let user = &self.user;
        writeln!(f, "{} ({})", user.display_name, user.handle)?;
        writeln!(f, "  Registered:    {}", date_part(&user.registered_at))?;
        writeln!(f, "  Last updated:  {}", date_part(&user.last_updated))?;

        let stats = match &self.stats {
            Ok(stats) => stats,
            Err(err) => {
                writeln!(f)?;
                return writeln!(f, "Activity unavailable: {}", err);
            }
        };

        writeln!(f)?;
        writeln!(
            f,
            "Solved: {} (easy {}, medium {}, hard {})",
            stats.solved.all, stats.solved.easy, stats.solved.medium, stats.solved.hard
        )?;
        if let Some(ranking) = stats.ranking {
            writeln!(f, "Ranking: {}", ranking)?;
        }
        if let Some(reputation) = stats.reputation {
            writeln!(f, "Reputation: {}", reputation)?;
        }
        writeln!(f, "Streak: {} days", stats.streak)?;

        writeln!(f)?;
        writeln!(f, "Last {} days", RECENT_DAYS)?;
        writeln!(f, "  Submissions:     {}", stats.recent_submissions)?;
        writeln!(f, "  Problems solved: {}", stats.recent_problems.len())?;
        for (i, problem) in stats
            .recent_problems
            .iter()
            .take(RECENT_PROBLEMS_SHOWN)
            .enumerate()
        {
            writeln!(f, "    {}. {}", i + 1, problem.title)?;
        }
        if stats.recent_problems.len() > RECENT_PROBLEMS_SHOWN {
            writeln!(
                f,
                "    ... and {} more",
                stats.recent_problems.len() - RECENT_PROBLEMS_SHOWN
            )?;
        }
        Ok(())
    }
}

/// `YYYY-MM-DD HH:MM:SS` timestamps from SQLite, shown as dates.
fn date_part(timestamp: &str) -> &str {
    timestamp.get(..10).unwrap_or(timestamp)
}
