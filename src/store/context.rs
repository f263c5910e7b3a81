//! Browsing-context tree and navigation state machine.
//!
//! The store is the authoritative model of the browser's frame tree.
//! Every non-root context has exactly one parent already present in the
//! store; removal is post-order and returns the child-first destruction
//! order so `browsingContext.contextDestroyed` events match it.
//!
//! # Navigation Machine
//!
//! ```text
//! idle ──willSend──► pending ──responseReceived──► committing ──load──► committed
//!   ▲                   │                              │
//!   │                   ├── failed ───────────────► aborted/failed
//!   │                   └── superseded (new navigation replaces)
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::time::Duration;

use parking_lot::RwLock;
use rustc_hash::FxHashMap;
use tokio::sync::Notify;
use tracing::debug;

use crate::error::{Error, Result};
use crate::identifiers::{BrowsingContextId, CdpSessionId, NavigationId, UserContextId};
use crate::protocol::command::ReadinessState;
use crate::protocol::event::BrowsingContextInfo;

// ============================================================================
// Navigation
// ============================================================================

/// Machine stage of a navigation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NavigationStage {
    /// Request accepted, nothing committed yet.
    Pending,
    /// Response received, document swap in progress.
    Committing,
    /// Load event fired.
    Committed,
    /// Superseded or canceled before commit.
    Aborted,
    /// Network or browser failure.
    Failed,
}

impl NavigationStage {
    /// Returns `true` for `Aborted` and `Failed`.
    #[inline]
    #[must_use]
    pub fn is_terminal_failure(self) -> bool {
        matches!(self, Self::Aborted | Self::Failed)
    }
}

/// One tracked navigation attempt.
#[derive(Debug, Clone)]
pub struct Navigation {
    /// The minted navigation id.
    pub id: NavigationId,
    /// Destination URL.
    pub url: String,
    /// Machine stage.
    pub stage: NavigationStage,
    /// Readiness the navigation has reached.
    pub reached: ReadinessState,
}

// ============================================================================
// BrowsingContext
// ============================================================================

/// One node in the context tree.
#[derive(Debug, Clone)]
struct BrowsingContext {
    parent: Option<BrowsingContextId>,
    children: Vec<BrowsingContextId>,
    user_context: UserContextId,
    url: String,
    cdp_session: Option<CdpSessionId>,
    navigation: Option<Navigation>,
}

// ============================================================================
// BrowsingContextStore
// ============================================================================

/// The live context tree.
///
/// All mutation methods take effect atomically under the store lock and
/// wake navigation waiters afterwards, so each observable intermediate
/// state is valid.
pub struct BrowsingContextStore {
    contexts: RwLock<FxHashMap<BrowsingContextId, BrowsingContext>>,
    top_level: RwLock<Vec<BrowsingContextId>>,
    nav_notify: Notify,
}

impl Default for BrowsingContextStore {
    fn default() -> Self {
        Self::new()
    }
}

impl BrowsingContextStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self {
            contexts: RwLock::new(FxHashMap::default()),
            top_level: RwLock::new(Vec::new()),
            nav_notify: Notify::new(),
        }
    }

    // ========================================================================
    // Tree Operations
    // ========================================================================

    /// Inserts a top-level context.
    pub fn insert_top_level(
        &self,
        id: BrowsingContextId,
        user_context: UserContextId,
        cdp_session: Option<CdpSessionId>,
        url: impl Into<String>,
    ) {
        debug!(context = %id, "Top-level context attached");
        self.contexts.write().insert(
            id.clone(),
            BrowsingContext {
                parent: None,
                children: Vec::new(),
                user_context,
                url: url.into(),
                cdp_session,
                navigation: None,
            },
        );
        self.top_level.write().push(id);
        self.nav_notify.notify_waiters();
    }

    /// Waits until a context appears in the store.
    ///
    /// Used by `browsingContext.create` between issuing the CDP create
    /// call and the target attaching.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Timeout`] when `timeout` elapses first.
    pub async fn wait_for_context(
        &self,
        id: &BrowsingContextId,
        timeout: Option<Duration>,
    ) -> Result<()> {
        let deadline = timeout.map(|t| tokio::time::Instant::now() + t);

        loop {
            let notified = self.nav_notify.notified();
            if self.contains(id) {
                return Ok(());
            }

            match deadline {
                Some(deadline) => {
                    tokio::select! {
                        _ = notified => {}
                        _ = tokio::time::sleep_until(deadline) => {
                            return Err(Error::timeout(
                                "context attach",
                                timeout.map_or(0, |t| t.as_millis() as u64),
                            ));
                        }
                    }
                }
                None => notified.await,
            }
        }
    }

    /// Inserts a child context under an existing parent.
    ///
    /// The child inherits the parent's user context and CDP session.
    ///
    /// # Errors
    ///
    /// Returns `no such frame` when the parent is unknown.
    pub fn insert_child(&self, id: BrowsingContextId, parent: &BrowsingContextId) -> Result<()> {
        let mut contexts = self.contexts.write();

        let (user_context, cdp_session) = {
            let parent_node = contexts
                .get_mut(parent)
                .ok_or_else(|| Error::no_such_frame(parent.clone()))?;
            parent_node.children.push(id.clone());
            (
                parent_node.user_context.clone(),
                parent_node.cdp_session.clone(),
            )
        };

        debug!(context = %id, parent = %parent, "Child context attached");
        contexts.insert(
            id,
            BrowsingContext {
                parent: Some(parent.clone()),
                children: Vec::new(),
                user_context,
                url: String::new(),
                cdp_session,
                navigation: None,
            },
        );
        drop(contexts);
        self.nav_notify.notify_waiters();
        Ok(())
    }

    /// Returns `true` when the context exists.
    #[must_use]
    pub fn contains(&self, id: &BrowsingContextId) -> bool {
        self.contexts.read().contains_key(id)
    }

    /// Fails with `no such frame` when the context is unknown.
    pub fn expect(&self, id: &BrowsingContextId) -> Result<()> {
        if self.contains(id) {
            Ok(())
        } else {
            Err(Error::no_such_frame(id.clone()))
        }
    }

    /// Returns the context's current URL.
    pub fn url_of(&self, id: &BrowsingContextId) -> Result<String> {
        self.contexts
            .read()
            .get(id)
            .map(|c| c.url.clone())
            .ok_or_else(|| Error::no_such_frame(id.clone()))
    }

    /// Updates the context's current URL.
    pub fn set_url(&self, id: &BrowsingContextId, url: impl Into<String>) {
        if let Some(context) = self.contexts.write().get_mut(id) {
            context.url = url.into();
        }
    }

    /// Returns the context's direct children, in attach order.
    #[must_use]
    pub fn children(&self, id: &BrowsingContextId) -> Vec<BrowsingContextId> {
        self.contexts
            .read()
            .get(id)
            .map(|c| c.children.clone())
            .unwrap_or_default()
    }

    /// Walks up to the top-level ancestor.
    ///
    /// # Errors
    ///
    /// Returns `no such frame` when the context is unknown.
    pub fn top_level_of(&self, id: &BrowsingContextId) -> Result<BrowsingContextId> {
        let contexts = self.contexts.read();
        let mut current = id;
        loop {
            let node = contexts
                .get(current)
                .ok_or_else(|| Error::no_such_frame(id.clone()))?;
            match &node.parent {
                Some(parent) => current = parent,
                None => return Ok(current.clone()),
            }
        }
    }

    /// Returns `true` for a top-level context.
    pub fn is_top_level(&self, id: &BrowsingContextId) -> Result<bool> {
        self.contexts
            .read()
            .get(id)
            .map(|c| c.parent.is_none())
            .ok_or_else(|| Error::no_such_frame(id.clone()))
    }

    /// Returns the owning user context.
    pub fn user_context_of(&self, id: &BrowsingContextId) -> Result<UserContextId> {
        self.contexts
            .read()
            .get(id)
            .map(|c| c.user_context.clone())
            .ok_or_else(|| Error::no_such_frame(id.clone()))
    }

    /// Returns the CDP session serving the context's target.
    pub fn session_of(&self, id: &BrowsingContextId) -> Result<CdpSessionId> {
        self.contexts
            .read()
            .get(id)
            .ok_or_else(|| Error::no_such_frame(id.clone()))?
            .cdp_session
            .clone()
            .ok_or_else(|| Error::unknown(format!("Context '{id}' has no CDP session")))
    }

    /// Finds the top-level context served by a CDP session.
    #[must_use]
    pub fn context_by_session(&self, session: &CdpSessionId) -> Option<BrowsingContextId> {
        let contexts = self.contexts.read();
        self.top_level
            .read()
            .iter()
            .find(|id| {
                contexts
                    .get(*id)
                    .is_some_and(|c| c.cdp_session.as_ref() == Some(session))
            })
            .cloned()
    }

    /// Returns all top-level contexts, in attach order.
    #[must_use]
    pub fn top_level_contexts(&self) -> Vec<BrowsingContextId> {
        self.top_level.read().clone()
    }

    /// Returns the top-level contexts of one user context.
    #[must_use]
    pub fn top_level_in_user_context(&self, user_context: &UserContextId) -> Vec<BrowsingContextId> {
        let contexts = self.contexts.read();
        self.top_level
            .read()
            .iter()
            .filter(|id| {
                contexts
                    .get(*id)
                    .is_some_and(|c| &c.user_context == user_context)
            })
            .cloned()
            .collect()
    }

    /// Removes a subtree, returning the removed nodes in strict
    /// post-order (children before parents, subtrees in attach order).
    ///
    /// # Errors
    ///
    /// Returns `no such frame` when the root is unknown.
    pub fn remove_subtree(&self, id: &BrowsingContextId) -> Result<Vec<BrowsingContextInfo>> {
        let mut contexts = self.contexts.write();
        if !contexts.contains_key(id) {
            return Err(Error::no_such_frame(id.clone()));
        }

        let mut order = Vec::new();
        Self::collect_post_order(&contexts, id, &mut order);

        let mut removed = Vec::with_capacity(order.len());
        for node_id in &order {
            if let Some(node) = contexts.remove(node_id) {
                removed.push(BrowsingContextInfo {
                    context: node_id.clone(),
                    url: node.url,
                    children: None,
                    parent: node.parent.clone(),
                    user_context: node.user_context,
                });
            }
        }

        // Unlink from the parent or the top-level list.
        if let Some(parent) = removed.last().and_then(|info| info.parent.clone()) {
            if let Some(parent_node) = contexts.get_mut(&parent) {
                parent_node.children.retain(|child| child != id);
            }
        } else {
            self.top_level.write().retain(|top| top != id);
        }

        drop(contexts);
        self.nav_notify.notify_waiters();

        debug!(context = %id, count = removed.len(), "Subtree removed");
        Ok(removed)
    }

    fn collect_post_order(
        contexts: &FxHashMap<BrowsingContextId, BrowsingContext>,
        id: &BrowsingContextId,
        order: &mut Vec<BrowsingContextId>,
    ) {
        if let Some(node) = contexts.get(id) {
            for child in &node.children {
                Self::collect_post_order(contexts, child, order);
            }
        }
        order.push(id.clone());
    }

    /// Builds the context description down to `max_depth` levels of
    /// children (`None` = unlimited).
    pub fn info(&self, id: &BrowsingContextId, max_depth: Option<u32>) -> Result<BrowsingContextInfo> {
        let contexts = self.contexts.read();
        Self::build_info(&contexts, id, max_depth)
    }

    /// Builds the forest rooted at `root`, or all top-level contexts.
    pub fn tree(
        &self,
        root: Option<&BrowsingContextId>,
        max_depth: Option<u32>,
    ) -> Result<Vec<BrowsingContextInfo>> {
        match root {
            Some(root) => Ok(vec![self.info(root, max_depth)?]),
            None => {
                let tops = self.top_level.read().clone();
                let contexts = self.contexts.read();
                tops.iter()
                    .map(|id| Self::build_info(&contexts, id, max_depth))
                    .collect()
            }
        }
    }

    fn build_info(
        contexts: &FxHashMap<BrowsingContextId, BrowsingContext>,
        id: &BrowsingContextId,
        max_depth: Option<u32>,
    ) -> Result<BrowsingContextInfo> {
        let node = contexts
            .get(id)
            .ok_or_else(|| Error::no_such_frame(id.clone()))?;

        let children = match max_depth {
            Some(0) => None,
            _ => {
                let next_depth = max_depth.map(|d| d - 1);
                Some(
                    node.children
                        .iter()
                        .map(|child| Self::build_info(contexts, child, next_depth))
                        .collect::<Result<Vec<_>>>()?,
                )
            }
        };

        Ok(BrowsingContextInfo {
            context: id.clone(),
            url: node.url.clone(),
            children,
            parent: node.parent.clone(),
            user_context: node.user_context.clone(),
        })
    }

    // ========================================================================
    // Navigation Machine
    // ========================================================================

    /// Starts a navigation, superseding any in-flight one.
    ///
    /// Returns the minted navigation id and, when a pending or
    /// committing navigation was superseded, its final snapshot so the
    /// caller can emit `navigationAborted` before `navigationStarted`.
    ///
    /// # Errors
    ///
    /// Returns `no such frame` when the context is unknown.
    pub fn begin_navigation(
        &self,
        id: &BrowsingContextId,
        url: impl Into<String>,
    ) -> Result<(NavigationId, Option<Navigation>)> {
        let mut contexts = self.contexts.write();
        let context = contexts
            .get_mut(id)
            .ok_or_else(|| Error::no_such_frame(id.clone()))?;

        let superseded = match context.navigation.take() {
            Some(mut old)
                if matches!(
                    old.stage,
                    NavigationStage::Pending | NavigationStage::Committing
                ) =>
            {
                old.stage = NavigationStage::Aborted;
                Some(old)
            }
            _ => None,
        };

        let navigation_id = NavigationId::generate();
        context.navigation = Some(Navigation {
            id: navigation_id.clone(),
            url: url.into(),
            stage: NavigationStage::Pending,
            reached: ReadinessState::None,
        });

        drop(contexts);
        self.nav_notify.notify_waiters();

        Ok((navigation_id, superseded))
    }

    /// Marks the current navigation as committing (response received).
    pub fn navigation_committing(&self, id: &BrowsingContextId) -> Option<Navigation> {
        let snapshot = {
            let mut contexts = self.contexts.write();
            let navigation = contexts.get_mut(id)?.navigation.as_mut()?;
            if navigation.stage == NavigationStage::Pending {
                navigation.stage = NavigationStage::Committing;
            }
            Some(navigation.clone())
        };
        self.nav_notify.notify_waiters();
        snapshot
    }

    /// Records a readiness milestone on the current navigation.
    ///
    /// `Complete` also commits the navigation. Returns the snapshot for
    /// event emission.
    pub fn navigation_reached(
        &self,
        id: &BrowsingContextId,
        readiness: ReadinessState,
    ) -> Option<Navigation> {
        let snapshot = {
            let mut contexts = self.contexts.write();
            let navigation = contexts.get_mut(id)?.navigation.as_mut()?;
            if navigation.stage.is_terminal_failure() {
                return None;
            }
            if readiness > navigation.reached {
                navigation.reached = readiness;
            }
            if readiness == ReadinessState::Complete {
                navigation.stage = NavigationStage::Committed;
            }
            Some(navigation.clone())
        };
        self.nav_notify.notify_waiters();
        snapshot
    }

    /// Fails the current navigation. Returns the snapshot for the
    /// `navigationFailed` event.
    pub fn navigation_failed(&self, id: &BrowsingContextId) -> Option<Navigation> {
        let snapshot = {
            let mut contexts = self.contexts.write();
            let navigation = contexts.get_mut(id)?.navigation.as_mut()?;
            if navigation.stage == NavigationStage::Committed {
                return None;
            }
            navigation.stage = NavigationStage::Failed;
            Some(navigation.clone())
        };
        self.nav_notify.notify_waiters();
        snapshot
    }

    /// Returns the current navigation snapshot.
    #[must_use]
    pub fn current_navigation(&self, id: &BrowsingContextId) -> Option<Navigation> {
        self.contexts.read().get(id)?.navigation.clone()
    }

    /// Waits until the given navigation reaches `wanted` readiness.
    ///
    /// The waiter registers before checking, so a transition between
    /// check and sleep is never lost. A superseded, failed, or removed
    /// navigation fails the wait; `timeout` caps the suspension.
    ///
    /// # Errors
    ///
    /// - `unknown error` when the navigation aborts or fails.
    /// - [`Error::Timeout`] when `timeout` elapses.
    pub async fn wait_for_navigation(
        &self,
        id: &BrowsingContextId,
        navigation: &NavigationId,
        wanted: ReadinessState,
        timeout: Option<Duration>,
    ) -> Result<()> {
        let deadline = timeout.map(|t| tokio::time::Instant::now() + t);

        loop {
            let notified = self.nav_notify.notified();

            {
                let contexts = self.contexts.read();
                let context = contexts
                    .get(id)
                    .ok_or_else(|| Error::no_such_frame(id.clone()))?;

                match &context.navigation {
                    Some(current) if current.id == *navigation => match current.stage {
                        NavigationStage::Aborted => {
                            return Err(Error::unknown("navigation aborted"));
                        }
                        NavigationStage::Failed => {
                            return Err(Error::unknown("navigation failed"));
                        }
                        _ if current.reached >= wanted => return Ok(()),
                        _ => {}
                    },
                    // The awaited navigation was replaced or dropped.
                    _ => return Err(Error::unknown("navigation aborted")),
                }
            }

            match deadline {
                Some(deadline) => {
                    tokio::select! {
                        _ = notified => {}
                        _ = tokio::time::sleep_until(deadline) => {
                            return Err(Error::timeout(
                                "navigation",
                                timeout.map_or(0, |t| t.as_millis() as u64),
                            ));
                        }
                    }
                }
                None => notified.await,
            }
        }
    }

    /// Wakes every navigation waiter; used at session teardown.
    pub fn wake_all(&self) {
        self.nav_notify.notify_waiters();
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx(id: &str) -> BrowsingContextId {
        BrowsingContextId::new(id)
    }

    fn store_with_tree() -> BrowsingContextStore {
        // top ── F1 ── F1a
        //    └── F2
        let store = BrowsingContextStore::new();
        store.insert_top_level(
            ctx("top"),
            UserContextId::default_context(),
            Some(CdpSessionId::new("s1")),
            "https://example.test/",
        );
        store.insert_child(ctx("F1"), &ctx("top")).unwrap();
        store.insert_child(ctx("F2"), &ctx("top")).unwrap();
        store.insert_child(ctx("F1a"), &ctx("F1")).unwrap();
        store
    }

    #[test]
    fn test_insert_child_unknown_parent_fails() {
        let store = BrowsingContextStore::new();
        let err = store.insert_child(ctx("child"), &ctx("ghost")).unwrap_err();
        assert_eq!(err.error_code(), "no such frame");
    }

    #[test]
    fn test_top_level_of_walks_up() {
        let store = store_with_tree();
        assert_eq!(store.top_level_of(&ctx("F1a")).unwrap(), ctx("top"));
        assert_eq!(store.top_level_of(&ctx("top")).unwrap(), ctx("top"));
    }

    #[test]
    fn test_remove_subtree_post_order() {
        let store = store_with_tree();
        let removed = store.remove_subtree(&ctx("top")).unwrap();

        let order: Vec<_> = removed.iter().map(|info| info.context.as_str()).collect();
        assert_eq!(order, vec!["F1a", "F1", "F2", "top"]);
        assert!(!store.contains(&ctx("top")));
        assert!(!store.contains(&ctx("F1a")));
        assert!(store.top_level_contexts().is_empty());
    }

    #[test]
    fn test_remove_child_subtree_unlinks_parent() {
        let store = store_with_tree();
        let removed = store.remove_subtree(&ctx("F1")).unwrap();

        let order: Vec<_> = removed.iter().map(|info| info.context.as_str()).collect();
        assert_eq!(order, vec!["F1a", "F1"]);
        assert_eq!(store.children(&ctx("top")), vec![ctx("F2")]);
    }

    #[test]
    fn test_tree_depth_cap() {
        let store = store_with_tree();

        let info = store.info(&ctx("top"), Some(1)).unwrap();
        let children = info.children.unwrap();
        assert_eq!(children.len(), 2);
        assert!(children[0].children.is_none());

        let info = store.info(&ctx("top"), None).unwrap();
        let f1 = &info.children.unwrap()[0];
        assert_eq!(f1.children.as_ref().unwrap().len(), 1);
    }

    #[test]
    fn test_session_lookup() {
        let store = store_with_tree();
        assert_eq!(
            store.session_of(&ctx("F1a")).unwrap(),
            CdpSessionId::new("s1")
        );
        assert_eq!(
            store.context_by_session(&CdpSessionId::new("s1")),
            Some(ctx("top"))
        );
        assert_eq!(store.context_by_session(&CdpSessionId::new("s9")), None);
    }

    #[test]
    fn test_begin_navigation_supersedes_pending() {
        let store = store_with_tree();

        let (first, superseded) = store
            .begin_navigation(&ctx("top"), "https://a.test/")
            .unwrap();
        assert!(superseded.is_none());

        let (second, superseded) = store
            .begin_navigation(&ctx("top"), "https://b.test/")
            .unwrap();
        let old = superseded.expect("first navigation superseded");
        assert_eq!(old.id, first);
        assert_eq!(old.stage, NavigationStage::Aborted);
        assert_ne!(first, second);
    }

    #[test]
    fn test_navigation_stage_progression() {
        let store = store_with_tree();
        let (nav, _) = store
            .begin_navigation(&ctx("top"), "https://a.test/")
            .unwrap();

        store.navigation_committing(&ctx("top"));
        let snapshot = store
            .navigation_reached(&ctx("top"), ReadinessState::Interactive)
            .unwrap();
        assert_eq!(snapshot.stage, NavigationStage::Committing);
        assert_eq!(snapshot.reached, ReadinessState::Interactive);

        let snapshot = store
            .navigation_reached(&ctx("top"), ReadinessState::Complete)
            .unwrap();
        assert_eq!(snapshot.id, nav);
        assert_eq!(snapshot.stage, NavigationStage::Committed);
    }

    #[tokio::test]
    async fn test_wait_resolves_on_load() {
        let store = std::sync::Arc::new(store_with_tree());
        let (nav, _) = store
            .begin_navigation(&ctx("top"), "https://a.test/")
            .unwrap();

        let waiter = {
            let store = std::sync::Arc::clone(&store);
            let nav = nav.clone();
            tokio::spawn(async move {
                store
                    .wait_for_navigation(&ctx("top"), &nav, ReadinessState::Complete, None)
                    .await
            })
        };

        tokio::task::yield_now().await;
        store.navigation_reached(&ctx("top"), ReadinessState::Complete);

        waiter.await.unwrap().expect("wait resolves");
    }

    #[tokio::test]
    async fn test_wait_fails_when_superseded() {
        let store = std::sync::Arc::new(store_with_tree());
        let (nav, _) = store
            .begin_navigation(&ctx("top"), "https://a.test/")
            .unwrap();

        let waiter = {
            let store = std::sync::Arc::clone(&store);
            let nav = nav.clone();
            tokio::spawn(async move {
                store
                    .wait_for_navigation(&ctx("top"), &nav, ReadinessState::Complete, None)
                    .await
            })
        };

        tokio::task::yield_now().await;
        store
            .begin_navigation(&ctx("top"), "https://b.test/")
            .unwrap();

        let err = waiter.await.unwrap().unwrap_err();
        assert_eq!(err.to_string(), "navigation aborted");
    }

    #[tokio::test]
    async fn test_wait_times_out() {
        let store = store_with_tree();
        let (nav, _) = store
            .begin_navigation(&ctx("top"), "https://a.test/")
            .unwrap();

        let err = store
            .wait_for_navigation(
                &ctx("top"),
                &nav,
                ReadinessState::Complete,
                Some(Duration::from_millis(20)),
            )
            .await
            .unwrap_err();
        assert!(err.is_timeout());
    }
}
