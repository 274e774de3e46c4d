// Copyright (c) The leetcode-weekly Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Error types shared across the bot's components.

use thiserror::Error;

/// Failure to obtain activity for a handle from LeetCode.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("no LeetCode profile found for '{0}'")]
    NotFound(String),

    /// Network failures, timeouts, rate limiting and 5xx responses.
    #[error("LeetCode request failed: {0}")]
    Transient(String),

    /// The response did not match the expected schema. Retrying won't help.
    #[error("unexpected LeetCode response: {0}")]
    Malformed(String),
}

impl FetchError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, FetchError::Transient(_))
    }
}

impl From<reqwest::Error> for FetchError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() || err.is_builder() {
            FetchError::Malformed(err.to_string())
        } else {
            FetchError::Transient(err.to_string())
        }
    }
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("'{0}' is already registered")]
    DuplicateExternalId(String),

    #[error("handle '{0}' is already registered")]
    DuplicateHandle(String),

    #[error("database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("database connection lock poisoned")]
    Poisoned,

    #[error("invalid value in database: {0}")]
    Corrupt(String),
}

/// Failures surfaced to the person issuing a registration-style command.
///
/// The `Display` text is what the caller gets to read.
#[derive(Debug, Error)]
pub enum RegistrationError {
    #[error("you are already registered with LeetCode username '{handle}'")]
    AlreadyRegistered { handle: String },

    #[error("the LeetCode username '{handle}' is already registered by another user")]
    HandleTaken { handle: String },

    #[error("could not find LeetCode user '{handle}', check the username and try again")]
    HandleNotFound { handle: String },

    #[error("you are not registered yet, use `register` first")]
    NotRegistered,

    #[error("'{0}' is not registered")]
    TargetNotRegistered(String),

    #[error("you need administrator permissions to do that")]
    PermissionDenied,

    #[error("{0}")]
    InvalidInput(String),

    #[error("LeetCode is unavailable right now, please try again later ({0})")]
    Upstream(#[source] FetchError),

    #[error("something went wrong on our side, please try again later ({0})")]
    Persistence(#[from] StoreError),
}

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("failed to reach the chat API: {0}")]
    Http(#[from] reqwest::Error),

    #[error("chat API rejected the message with status {status}: {body}")]
    Rejected { status: u16, body: String },
}

/// Run-level failures of a weekly aggregation.
#[derive(Debug, Error)]
pub enum RunError {
    #[error("a weekly update is already in progress")]
    AlreadyRunning,

    #[error("failed to take the run lock: {0}")]
    Lock(#[source] StoreError),

    #[error("failed to list registered users: {0}")]
    ListUsers(#[source] StoreError),

    #[error("failed to post the weekly update: {0}")]
    Notify(#[from] NotifyError),
}
