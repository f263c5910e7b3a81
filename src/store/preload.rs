//! Preload script registry.
//!
//! A preload script applies to every future realm matching its filter.
//! The mapper installs it into the browser via
//! `Page.addScriptToEvaluateOnNewDocument` per matching target; this
//! store tracks the registrations and the CDP identifiers needed to
//! uninstall them.

// ============================================================================
// Imports
// ============================================================================

use parking_lot::RwLock;
use rustc_hash::FxHashMap;

use crate::error::{Error, Result};
use crate::identifiers::{BrowsingContextId, PreloadScriptId, UserContextId};

// ============================================================================
// PreloadScript
// ============================================================================

/// One registered preload script.
#[derive(Debug, Clone)]
pub struct PreloadScript {
    /// The minted script id.
    pub id: PreloadScriptId,
    /// Function source evaluated in each matching realm.
    pub source: String,
    /// Context filter; `None` applies to every context.
    pub contexts: Option<Vec<BrowsingContextId>>,
    /// User-context filter; `None` applies to every user context.
    pub user_contexts: Option<Vec<UserContextId>>,
    /// Sandbox realm name; `None` targets the default realm.
    pub sandbox: Option<String>,
    /// CDP script identifiers, keyed by the top-level context they were
    /// installed into.
    pub cdp_ids: FxHashMap<BrowsingContextId, String>,
}

impl PreloadScript {
    /// Returns `true` when the script applies to a context.
    #[must_use]
    pub fn matches(&self, context: &BrowsingContextId, user_context: &UserContextId) -> bool {
        let context_ok = self
            .contexts
            .as_ref()
            .is_none_or(|contexts| contexts.contains(context));
        let user_context_ok = self
            .user_contexts
            .as_ref()
            .is_none_or(|user_contexts| user_contexts.contains(user_context));
        context_ok && user_context_ok
    }
}

// ============================================================================
// PreloadScriptStore
// ============================================================================

/// Registry of preload scripts.
#[derive(Default)]
pub struct PreloadScriptStore {
    scripts: RwLock<FxHashMap<PreloadScriptId, PreloadScript>>,
}

impl PreloadScriptStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a script and returns its minted id.
    pub fn insert(
        &self,
        source: impl Into<String>,
        contexts: Option<Vec<BrowsingContextId>>,
        user_contexts: Option<Vec<UserContextId>>,
        sandbox: Option<String>,
    ) -> PreloadScriptId {
        let id = PreloadScriptId::generate();
        self.scripts.write().insert(
            id.clone(),
            PreloadScript {
                id: id.clone(),
                source: source.into(),
                contexts,
                user_contexts,
                sandbox,
                cdp_ids: FxHashMap::default(),
            },
        );
        id
    }

    /// Removes a script, returning it for CDP uninstallation.
    ///
    /// # Errors
    ///
    /// Returns `no such script` when the id is unknown.
    pub fn remove(&self, id: &PreloadScriptId) -> Result<PreloadScript> {
        self.scripts
            .write()
            .remove(id)
            .ok_or_else(|| Error::no_such_script(id.clone()))
    }

    /// Returns the scripts applying to a context, in registration id
    /// order for determinism.
    #[must_use]
    pub fn matching(
        &self,
        context: &BrowsingContextId,
        user_context: &UserContextId,
    ) -> Vec<PreloadScript> {
        let mut scripts: Vec<_> = self
            .scripts
            .read()
            .values()
            .filter(|script| script.matches(context, user_context))
            .cloned()
            .collect();
        scripts.sort_by(|a, b| a.id.cmp(&b.id));
        scripts
    }

    /// Records the CDP identifier of an installation.
    pub fn record_cdp_id(
        &self,
        id: &PreloadScriptId,
        context: BrowsingContextId,
        cdp_id: impl Into<String>,
    ) {
        if let Some(script) = self.scripts.write().get_mut(id) {
            script.cdp_ids.insert(context, cdp_id.into());
        }
    }

    /// Drops the installations recorded for a removed context.
    pub fn forget_context(&self, context: &BrowsingContextId) {
        for script in self.scripts.write().values_mut() {
            script.cdp_ids.remove(context);
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
