//! JavaScript realms and remote handles.
//!
//! A realm is created on `Runtime.executionContextCreated` and destroyed
//! on `executionContextDestroyed`; destroying a context drops all its
//! realms. Handles minted by `script.evaluate`/`callFunction` live on
//! the realm record until the realm dies or the handle is disowned.

// ============================================================================
// Imports
// ============================================================================

use parking_lot::RwLock;
use rustc_hash::FxHashMap;

use crate::error::{Error, Result};
use crate::identifiers::{BrowsingContextId, RealmId};
use crate::protocol::command::{RealmInfo, RealmType};

// ============================================================================
// Realm
// ============================================================================

/// One JavaScript execution environment.
#[derive(Debug, Clone)]
pub struct Realm {
    /// The realm id.
    pub id: RealmId,
    /// Owning context; `None` for shared worker/worklet realms.
    pub context: Option<BrowsingContextId>,
    /// Realm origin.
    pub origin: String,
    /// Realm kind.
    pub realm_type: RealmType,
    /// Sandbox name for isolated-world realms.
    pub sandbox: Option<String>,
    /// CDP numeric execution context id, used for evaluate targeting.
    pub execution_context_id: i64,
    /// Live remote handles owned by this realm.
    pub handles: Vec<String>,
}

impl Realm {
    /// Builds the wire description.
    #[must_use]
    pub fn info(&self) -> RealmInfo {
        RealmInfo {
            realm: self.id.clone(),
            origin: self.origin.clone(),
            context: self.context.clone(),
            realm_type: self.realm_type,
            sandbox: self.sandbox.clone(),
        }
    }
}

// ============================================================================
// RealmStore
// ============================================================================

/// Registry of live realms.
#[derive(Default)]
pub struct RealmStore {
    realms: RwLock<FxHashMap<RealmId, Realm>>,
}

impl RealmStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a realm.
    pub fn insert(&self, realm: Realm) {
        self.realms.write().insert(realm.id.clone(), realm);
    }

    /// Removes a realm, returning it when it existed.
    pub fn remove(&self, id: &RealmId) -> Option<Realm> {
        self.realms.write().remove(id)
    }

    /// Removes every realm of a context, returning them.
    pub fn remove_by_context(&self, context: &BrowsingContextId) -> Vec<Realm> {
        let mut realms = self.realms.write();
        let ids: Vec<_> = realms
            .iter()
            .filter(|(_, realm)| realm.context.as_ref() == Some(context))
            .map(|(id, _)| id.clone())
            .collect();
        ids.iter().filter_map(|id| realms.remove(id)).collect()
    }

    /// Looks up a realm by id.
    pub fn get(&self, id: &RealmId) -> Result<Realm> {
        self.realms
            .read()
            .get(id)
            .cloned()
            .ok_or_else(|| Error::invalid_argument(format!("Realm '{id}' not found")))
    }

    /// Finds a context's window realm: the default realm, or the named
    /// sandbox.
    #[must_use]
    pub fn find_window_realm(
        &self,
        context: &BrowsingContextId,
        sandbox: Option<&str>,
    ) -> Option<Realm> {
        self.realms
            .read()
            .values()
            .find(|realm| {
                realm.context.as_ref() == Some(context)
                    && realm.realm_type == RealmType::Window
                    && realm.sandbox.as_deref() == sandbox
            })
            .cloned()
    }

    /// Finds a realm by its CDP numeric execution context id.
    #[must_use]
    pub fn find_by_execution_context(&self, execution_context_id: i64) -> Option<Realm> {
        self.realms
            .read()
            .values()
            .find(|realm| realm.execution_context_id == execution_context_id)
            .cloned()
    }

    /// Lists realms, optionally filtered by context and kind.
    #[must_use]
    pub fn list(
        &self,
        context: Option<&BrowsingContextId>,
        realm_type: Option<RealmType>,
    ) -> Vec<RealmInfo> {
        let mut infos: Vec<_> = self
            .realms
            .read()
            .values()
            .filter(|realm| context.is_none_or(|c| realm.context.as_ref() == Some(c)))
            .filter(|realm| realm_type.is_none_or(|t| realm.realm_type == t))
            .map(Realm::info)
            .collect();
        infos.sort_by(|a, b| a.realm.cmp(&b.realm));
        infos
    }

    /// Records a handle on its owning realm.
    pub fn add_handle(&self, realm: &RealmId, handle: impl Into<String>) {
        if let Some(realm) = self.realms.write().get_mut(realm) {
            realm.handles.push(handle.into());
        }
    }

    /// Drops a handle from a realm; returns `true` when it existed.
    pub fn remove_handle(&self, realm: &RealmId, handle: &str) -> bool {
        let mut realms = self.realms.write();
        let Some(realm) = realms.get_mut(realm) else {
            return false;
        };
        let before = realm.handles.len();
        realm.handles.retain(|h| h != handle);
        realm.handles.len() != before
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn window_realm(id: &str, context: &str, sandbox: Option<&str>) -> Realm {
        Realm {
            id: RealmId::new(id),
            context: Some(BrowsingContextId::new(context)),
            origin: "https://example.test".to_string(),
            realm_type: RealmType::Window,
            sandbox: sandbox.map(str::to_string),
            execution_context_id: 1,
            handles: Vec::new(),
        }
    }

    #[test]
    fn test_find_default_vs_sandbox() {
        let store = RealmStore::new();
        store.insert(window_realm("r-default", "CTX1", None));
        store.insert(window_realm("r-probe", "CTX1", Some("probe")));

        let context = BrowsingContextId::new("CTX1");
        assert_eq!(
            store.find_window_realm(&context, None).unwrap().id,
            RealmId::new("r-default")
        );
        assert_eq!(
            store.find_window_realm(&context, Some("probe")).unwrap().id,
            RealmId::new("r-probe")
        );
        assert!(store.find_window_realm(&context, Some("other")).is_none());
    }

    #[test]
    fn test_remove_by_context() {
        let store = RealmStore::new();
        store.insert(window_realm("r-1", "CTX1", None));
        store.insert(window_realm("r-2", "CTX1", Some("probe")));
        store.insert(window_realm("r-3", "CTX2", None));

        let removed = store.remove_by_context(&BrowsingContextId::new("CTX1"));
        assert_eq!(removed.len(), 2);
        assert!(store.get(&RealmId::new("r-3")).is_ok());
        assert!(store.get(&RealmId::new("r-1")).is_err());
    }

    #[test]
    fn test_handles_lifecycle() {
        let store = RealmStore::new();
        store.insert(window_realm("r-1", "CTX1", None));
        let realm = RealmId::new("r-1");

        store.add_handle(&realm, "h-1");
        assert!(store.remove_handle(&realm, "h-1"));
        assert!(!store.remove_handle(&realm, "h-1"));
    }

    #[test]
    fn test_list_filters() {
        let store = RealmStore::new();
        store.insert(window_realm("r-1", "CTX1", None));
        store.insert(window_realm("r-2", "CTX2", None));

        assert_eq!(store.list(None, None).len(), 2);
        assert_eq!(
            store
                .list(Some(&BrowsingContextId::new("CTX1")), None)
                .len(),
            1
        );
        assert!(
            store
                .list(None, Some(RealmType::DedicatedWorker))
                .is_empty()
        );
    }
}
