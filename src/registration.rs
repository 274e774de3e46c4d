// Copyright (c) The leetcode-weekly Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Member registration, removal and profile lookup.

use crate::{
    db::{RegisteredUser, Store},
    error::{FetchError, RegistrationError, StoreError},
    leetcode::ActivitySource,
    profile::{self, CALENDAR_LOOKBACK_DAYS, Profile},
};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::info;

const MAX_HANDLE_LEN: usize = 40;
const MAX_DISPLAY_NAME_LEN: usize = 64;

/// The chat identity issuing a command.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Caller {
    pub external_id: String,
    pub is_admin: bool,
}

impl Caller {
    pub fn new(external_id: impl Into<String>, is_admin: bool) -> Self {
        Self {
            external_id: external_id.into(),
            is_admin,
        }
    }

    pub fn require_admin(&self) -> Result<(), RegistrationError> {
        if self.is_admin {
            Ok(())
        } else {
            Err(RegistrationError::PermissionDenied)
        }
    }
}

pub struct Registrar {
    source: Arc<dyn ActivitySource>,
    store: Arc<dyn Store>,
}

impl Registrar {
    pub fn new(source: Arc<dyn ActivitySource>, store: Arc<dyn Store>) -> Self {
        Self { source, store }
    }

    /// Register `handle` for the caller after checking that it exists on
    /// LeetCode.
    pub async fn register(
        &self,
        caller: &Caller,
        display_name: &str,
        handle: &str,
    ) -> Result<RegisteredUser, RegistrationError> {
        let display_name = validate_display_name(display_name)?;
        let handle = validate_handle(handle)?;
        info!(caller = %caller.external_id, handle, "registration attempt");

        if let Some(existing) = self.store.get_user(&caller.external_id)? {
            return Err(RegistrationError::AlreadyRegistered {
                handle: existing.handle,
            });
        }
        if self.store.get_user_by_handle(handle)?.is_some() {
            return Err(RegistrationError::HandleTaken {
                handle: handle.to_string(),
            });
        }

        match self.source.fetch_recent_activity(handle, 1).await {
            Ok(_) => {}
            Err(FetchError::NotFound(_)) => {
                return Err(RegistrationError::HandleNotFound {
                    handle: handle.to_string(),
                });
            }
            Err(err) => return Err(RegistrationError::Upstream(err)),
        }

        let user = self
            .store
            .create_user(&caller.external_id, display_name, handle)
            .map_err(|err| match err {
                StoreError::DuplicateExternalId(_) => RegistrationError::AlreadyRegistered {
                    handle: handle.to_string(),
                },
                StoreError::DuplicateHandle(_) => RegistrationError::HandleTaken {
                    handle: handle.to_string(),
                },
                other => RegistrationError::Persistence(other),
            })?;

        info!(name = %user.display_name, handle = %user.handle, "user registered");
        Ok(user)
    }

    /// Remove the caller's own registration.
    pub fn unregister(&self, caller: &Caller) -> Result<RegisteredUser, RegistrationError> {
        let user = self
            .store
            .get_user(&caller.external_id)?
            .ok_or(RegistrationError::NotRegistered)?;
        self.store.delete_user(&user.external_id)?;

        info!(name = %user.display_name, handle = %user.handle, "user unregistered");
        Ok(user)
    }

    /// Remove someone else's registration. Administrators only.
    pub fn admin_unregister(
        &self,
        caller: &Caller,
        target_external_id: &str,
    ) -> Result<RegisteredUser, RegistrationError> {
        caller.require_admin()?;

        let user = self
            .store
            .get_user(target_external_id)?
            .ok_or_else(|| RegistrationError::TargetNotRegistered(target_external_id.to_string()))?;
        self.store.delete_user(&user.external_id)?;

        info!(
            admin = %caller.external_id,
            name = %user.display_name,
            handle = %user.handle,
            "admin unregistered user"
        );
        Ok(user)
    }

    /// The caller's registration plus live LeetCode statistics. A LeetCode
    /// failure is reported inside the profile rather than as an error.
    pub async fn profile(
        &self,
        caller: &Caller,
        now: DateTime<Utc>,
    ) -> Result<Profile, RegistrationError> {
        let user = self
            .store
            .get_user(&caller.external_id)?
            .ok_or(RegistrationError::NotRegistered)?;

        let stats = self
            .source
            .fetch_recent_activity(&user.handle, CALENDAR_LOOKBACK_DAYS)
            .await
            .map(|activity| profile::profile_stats(&activity, now));

        Ok(Profile { user, stats })
    }
}

fn validate_handle(handle: &str) -> Result<&str, RegistrationError> {
    let handle = handle.trim();
    if handle.is_empty() {
        return Err(RegistrationError::InvalidInput(
            "the LeetCode username must not be empty".to_string(),
        ));
    }
    if handle.chars().count() > MAX_HANDLE_LEN {
        return Err(RegistrationError::InvalidInput(format!(
            "the LeetCode username must be at most {} characters",
            MAX_HANDLE_LEN
        )));
    }
    if !handle
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'))
    {
        return Err(RegistrationError::InvalidInput(format!(
            "'{}' is not a valid LeetCode username",
            handle
        )));
    }
    Ok(handle)
}

fn validate_display_name(name: &str) -> Result<&str, RegistrationError> {
    let name = name.trim();
    if name.is_empty() {
        return Err(RegistrationError::InvalidInput(
            "the display name must not be empty".to_string(),
        ));
    }
    if name.chars().count() > MAX_DISPLAY_NAME_LEN {
        return Err(RegistrationError::InvalidInput(format!(
            "the display name must be at most {} characters",
            MAX_DISPLAY_NAME_LEN
        )));
    }
    Ok(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        db::Database,
        testing::{self, Canned, FakeSource},
    };
    use chrono::TimeZone;

    struct Fixture {
        db: Arc<Database>,
        source: Arc<FakeSource>,
        registrar: Registrar,
    }

    fn fixture() -> Fixture {
        let db = Arc::new(Database::open_in_memory().unwrap());
        let source = Arc::new(FakeSource::new());
        for handle in ["abc", "alice", "bob"] {
            source.set(handle, Canned::Activity(testing::light_week(handle, 2)));
        }
        let registrar = Registrar::new(
            Arc::clone(&source) as Arc<dyn ActivitySource>,
            Arc::clone(&db) as Arc<dyn Store>,
        );
        Fixture {
            db,
            source,
            registrar,
        }
    }

    fn rows_for(db: &Database, handle: &str) -> i64 {
        db.connection()
            .unwrap()
            .query_row("SELECT COUNT(*) FROM users WHERE handle = ?1", [handle], |r| {
                r.get(0)
            })
            .unwrap()
    }

    #[tokio::test]
    async fn test_register() {
        let fx = fixture();
        let user = fx
            .registrar
            .register(&Caller::new("1001", false), "  Alice ", " alice ")
            .await
            .unwrap();

        assert_eq!(user.display_name, "Alice");
        assert_eq!(user.handle, "alice");
        assert_eq!(fx.db.get_user("1001").unwrap(), Some(user));
        assert_eq!(fx.source.calls("alice"), 1);
    }

    #[tokio::test]
    async fn test_handle_taken_by_another_identity() {
        let fx = fixture();
        fx.registrar
            .register(&Caller::new("1001", false), "First", "abc")
            .await
            .unwrap();

        let err = fx
            .registrar
            .register(&Caller::new("1002", false), "Second", "abc")
            .await
            .unwrap_err();
        assert!(matches!(err, RegistrationError::HandleTaken { ref handle } if handle == "abc"));
        assert_eq!(rows_for(&fx.db, "abc"), 1);
        assert_eq!(fx.db.get_user("1002").unwrap(), None);
    }

    #[tokio::test]
    async fn test_already_registered() {
        let fx = fixture();
        let caller = Caller::new("1001", false);
        fx.registrar.register(&caller, "Alice", "alice").await.unwrap();

        let err = fx.registrar.register(&caller, "Alice", "bob").await.unwrap_err();
        assert!(
            matches!(err, RegistrationError::AlreadyRegistered { ref handle } if handle == "alice")
        );
        assert_eq!(rows_for(&fx.db, "bob"), 0);
        // Rejected before asking LeetCode.
        assert_eq!(fx.source.calls("bob"), 0);
    }

    #[tokio::test]
    async fn test_unknown_handle_is_not_stored() {
        let fx = fixture();
        let err = fx
            .registrar
            .register(&Caller::new("1001", false), "Ghost", "ghost")
            .await
            .unwrap_err();
        assert!(matches!(err, RegistrationError::HandleNotFound { .. }));
        assert!(err.to_string().contains("could not find LeetCode user 'ghost'"));
        assert_eq!(fx.db.get_user("1001").unwrap(), None);
    }

    #[tokio::test]
    async fn test_upstream_outage_is_not_stored() {
        let fx = fixture();
        fx.source.set("flaky", Canned::Transient);
        let err = fx
            .registrar
            .register(&Caller::new("1001", false), "Flaky", "flaky")
            .await
            .unwrap_err();
        assert!(matches!(err, RegistrationError::Upstream(FetchError::Transient(_))));
        assert_eq!(fx.db.get_user("1001").unwrap(), None);
    }

    #[tokio::test]
    async fn test_invalid_input() {
        let fx = fixture();
        let caller = Caller::new("1001", false);
        for (name, handle) in [("", "alice"), ("Alice", ""), ("Alice", "has space"), ("Alice", "a/b")]
        {
            let err = fx.registrar.register(&caller, name, handle).await.unwrap_err();
            assert!(matches!(err, RegistrationError::InvalidInput(_)), "{name:?} {handle:?}");
        }
        assert!(fx.db.list_users().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_unregister() {
        let fx = fixture();
        let caller = Caller::new("1001", false);

        let err = fx.registrar.unregister(&caller).unwrap_err();
        assert!(matches!(err, RegistrationError::NotRegistered));

        fx.registrar.register(&caller, "Alice", "alice").await.unwrap();
        let removed = fx.registrar.unregister(&caller).unwrap();
        assert_eq!(removed.handle, "alice");
        assert_eq!(fx.db.get_user("1001").unwrap(), None);

        // The handle is free again.
        fx.registrar
            .register(&Caller::new("1002", false), "Alice 2", "alice")
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_admin_unregister() {
        let fx = fixture();
        fx.registrar
            .register(&Caller::new("1001", false), "Alice", "alice")
            .await
            .unwrap();

        let err = fx
            .registrar
            .admin_unregister(&Caller::new("1002", false), "1001")
            .unwrap_err();
        assert!(matches!(err, RegistrationError::PermissionDenied));
        assert!(fx.db.get_user("1001").unwrap().is_some());

        let admin = Caller::new("9", true);
        let err = fx.registrar.admin_unregister(&admin, "4242").unwrap_err();
        assert!(matches!(err, RegistrationError::TargetNotRegistered(_)));

        let removed = fx.registrar.admin_unregister(&admin, "1001").unwrap();
        assert_eq!(removed.display_name, "Alice");
        assert_eq!(fx.db.get_user("1001").unwrap(), None);
    }

    #[tokio::test]
    async fn test_profile() {
        let fx = fixture();
        let caller = Caller::new("1001", false);
        let now = Utc.with_ymd_and_hms(2025, 8, 28, 12, 0, 0).unwrap();

        let err = fx.registrar.profile(&caller, now).await.unwrap_err();
        assert!(matches!(err, RegistrationError::NotRegistered));

        fx.registrar.register(&caller, "Alice", "alice").await.unwrap();
        let profile = fx.registrar.profile(&caller, now).await.unwrap();
        let stats = profile.stats.as_ref().unwrap();
        assert_eq!(stats.recent_problems.len(), 2);

        let text = profile.to_string();
        assert!(text.starts_with("Alice (alice)"));
        assert!(text.contains("Problems solved: 2"));

        fx.source.set("alice", Canned::Malformed);
        let profile = fx.registrar.profile(&caller, now).await.unwrap();
        assert!(profile.stats.is_err());
        assert!(profile.to_string().contains("Activity unavailable"));
    }
}
