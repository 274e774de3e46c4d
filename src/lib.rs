// Copyright (c) The leetcode-weekly Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Weekly LeetCode leaderboard for a chat community.

pub mod aggregate;
pub mod commands;
pub mod config;
pub mod db;
pub mod dispatch;
pub mod error;
pub mod leetcode;
pub mod notify;
pub mod profile;
pub mod query;
pub mod reconcile;
pub mod registration;
pub mod report;
pub mod schedule;
pub mod window;

#[cfg(test)]
mod testing;
