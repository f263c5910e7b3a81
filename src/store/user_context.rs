//! User contexts and permission grants.
//!
//! A user context is an isolated cookie jar and permission scope. The
//! `"default"` user context always exists and cannot be removed.

// ============================================================================
// Imports
// ============================================================================

use parking_lot::RwLock;
use rustc_hash::FxHashMap;

use crate::error::{Error, Result};
use crate::identifiers::UserContextId;
use crate::protocol::command::PermissionState;

// ============================================================================
// UserContextStore
// ============================================================================

/// Per-user-context record.
#[derive(Debug, Clone, Default)]
struct UserContextRecord {
    /// CDP browser context id; `None` for the default user context.
    cdp_browser_context: Option<String>,
    /// Permission grants keyed by (origin, permission name).
    grants: FxHashMap<(String, String), PermissionState>,
}

/// Registry of user contexts.
pub struct UserContextStore {
    records: RwLock<FxHashMap<UserContextId, UserContextRecord>>,
}

impl Default for UserContextStore {
    fn default() -> Self {
        Self::new()
    }
}

impl UserContextStore {
    /// Creates the store with the default user context present.
    #[must_use]
    pub fn new() -> Self {
        let mut records = FxHashMap::default();
        records.insert(
            UserContextId::default_context(),
            UserContextRecord::default(),
        );
        Self {
            records: RwLock::new(records),
        }
    }

    /// Registers a user context backed by a CDP browser context.
    pub fn insert(&self, id: UserContextId, cdp_browser_context: impl Into<String>) {
        self.records.write().insert(
            id,
            UserContextRecord {
                cdp_browser_context: Some(cdp_browser_context.into()),
                grants: FxHashMap::default(),
            },
        );
    }

    /// Returns `true` when the user context exists.
    #[must_use]
    pub fn contains(&self, id: &UserContextId) -> bool {
        self.records.read().contains_key(id)
    }

    /// Fails with `no such user context` when the id is unknown.
    pub fn expect(&self, id: &UserContextId) -> Result<()> {
        if self.contains(id) {
            Ok(())
        } else {
            Err(Error::no_such_user_context(id.as_str()))
        }
    }

    /// Removes a user context, returning its CDP browser context id.
    ///
    /// # Errors
    ///
    /// - `invalid argument` for the default user context.
    /// - `no such user context` when the id is unknown.
    pub fn remove(&self, id: &UserContextId) -> Result<Option<String>> {
        if id.is_default() {
            return Err(Error::invalid_argument(
                "The default user context cannot be removed",
            ));
        }
        self.records
            .write()
            .remove(id)
            .map(|record| record.cdp_browser_context)
            .ok_or_else(|| Error::no_such_user_context(id.as_str()))
    }

    /// Returns every user context id, the default first.
    #[must_use]
    pub fn all(&self) -> Vec<UserContextId> {
        let mut ids: Vec<_> = self.records.read().keys().cloned().collect();
        ids.sort_by_key(|id| (!id.is_default(), id.clone()));
        ids
    }

    /// Returns the CDP browser context id backing a user context.
    pub fn cdp_browser_context(&self, id: &UserContextId) -> Result<Option<String>> {
        self.records
            .read()
            .get(id)
            .map(|record| record.cdp_browser_context.clone())
            .ok_or_else(|| Error::no_such_user_context(id.as_str()))
    }

    /// Records a permission grant.
    pub fn set_permission(
        &self,
        id: &UserContextId,
        origin: impl Into<String>,
        permission: impl Into<String>,
        state: PermissionState,
    ) -> Result<()> {
        let mut records = self.records.write();
        let record = records
            .get_mut(id)
            .ok_or_else(|| Error::no_such_user_context(id.as_str()))?;

        let key = (origin.into(), permission.into());
        if state == PermissionState::Prompt {
            record.grants.remove(&key);
        } else {
            record.grants.insert(key, state);
        }
        Ok(())
    }

    /// Looks up a recorded grant.
    #[must_use]
    pub fn permission(
        &self,
        id: &UserContextId,
        origin: &str,
        permission: &str,
    ) -> Option<PermissionState> {
        self.records
            .read()
            .get(id)?
            .grants
            .get(&(origin.to_string(), permission.to_string()))
            .copied()
    }
}

// ============================================================================
// Tests
// ============================================================================
