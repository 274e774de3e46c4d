// Copyright (c) The leetcode-weekly Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Correction of weekly counts truncated by the recent-submission cap.
//!
//! The raw count (distinct accepted problems in the recent list) is trusted
//! unless the uncapped calendar shows a lot of activity in the window and the
//! raw count covers only a small fraction of it. In that case the calendar's
//! submission count is converted back to problems using the submissions per
//! problem observed in the recent list.

use serde::{Deserialize, Serialize};

/// Tuning knobs for the truncation heuristic. The defaults were chosen
/// empirically.
#[derive(Clone, Copy, Debug, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct Thresholds {
    /// Minimum calendar submissions in the window before the raw count is
    /// questioned at all.
    pub high_volume_threshold: u32,
    /// The raw count is suspect below this fraction of calendar submissions.
    pub min_coverage_ratio: f64,
    /// Submissions per problem assumed when the recent list has no accepted
    /// problems to learn from.
    pub fallback_submissions_per_problem: f64,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            high_volume_threshold: 35,
            min_coverage_ratio: 0.3,
            fallback_submissions_per_problem: 2.5,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Estimate {
    pub count: u32,
    /// Whether the raw count was deemed unreliable.
    pub corrected: bool,
    /// Submissions per problem used for the correction.
    pub ratio: Option<f64>,
}

impl Estimate {
    fn raw(count: u32) -> Self {
        Self {
            count,
            corrected: false,
            ratio: None,
        }
    }
}

/// Whether `raw` is likely missing problems hidden by the recent list cap.
pub fn is_suspect(raw: u32, calendar_window_submissions: u32, thresholds: &Thresholds) -> bool {
    calendar_window_submissions >= thresholds.high_volume_threshold
        && f64::from(raw) < thresholds.min_coverage_ratio * f64::from(calendar_window_submissions)
}

/// Estimate the problems solved in the window.
///
/// * `raw` - distinct accepted problems found in the window.
/// * `recent_list_len` - number of submissions in the recent list.
/// * `calendar_window_submissions` - calendar submissions in the window, if
///   the calendar was available.
/// * `unique_accepted_in_sample` - distinct accepted problems anywhere in the
///   recent list.
///
/// The result is never below `raw` and, when corrected, never above the
/// calendar's submission count.
pub fn estimate_problems_solved(
    raw: u32,
    recent_list_len: usize,
    calendar_window_submissions: Option<u32>,
    unique_accepted_in_sample: usize,
    thresholds: &Thresholds,
) -> Estimate {
    let Some(calendar) = calendar_window_submissions else {
        return Estimate::raw(raw);
    };
    if !is_suspect(raw, calendar, thresholds) {
        return Estimate::raw(raw);
    }

    let ratio = if unique_accepted_in_sample == 0 {
        thresholds.fallback_submissions_per_problem
    } else {
        // Every accepted problem took at least one submission.
        (recent_list_len as f64 / unique_accepted_in_sample as f64).max(1.0)
    };

    let estimate = (f64::from(calendar) / ratio).round() as u32;
    Estimate {
        count: raw.max(estimate.min(calendar)),
        corrected: true,
        ratio: Some(ratio),
    }
}
