//! Priority-ordered event subscriptions.
//!
//! Each `(channel, context, event)` triple holds one integer priority
//! minted from a process-wide monotonic counter, so a later subscription
//! compares higher than an earlier one. Subscriptions attach to
//! top-level contexts; callers normalize descendant contexts before
//! calling in, and a `None` context key is a session-wide subscription.
//!
//! # Operations
//!
//! | Operation | Behavior |
//! |-----------|----------|
//! | [`SubscriptionManager::subscribe`] | expand groups, idempotent per triple |
//! | [`SubscriptionManager::unsubscribe_all`] | all-or-nothing removal |
//! | [`SubscriptionManager::channels_for`] | applicable channels, oldest first |

// ============================================================================
// Imports
// ============================================================================

use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use tracing::debug;

use crate::error::{Error, Result};
use crate::identifiers::{BrowsingContextId, Channel};
use crate::protocol::event::names;

// ============================================================================
// Types
// ============================================================================

/// Context key: `None` is session-wide, `Some` is a top-level context.
type ContextKey = Option<BrowsingContextId>;

/// events → priority, per context key, per channel.
type SubscriptionMap = FxHashMap<Channel, FxHashMap<ContextKey, FxHashMap<String, u64>>>;

// ============================================================================
// SubscriptionManager
// ============================================================================

/// The subscription registry.
pub struct SubscriptionManager {
    subscriptions: Mutex<SubscriptionMap>,
    next_priority: AtomicU64,
}

impl Default for SubscriptionManager {
    fn default() -> Self {
        Self::new()
    }
}

impl SubscriptionManager {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self {
            subscriptions: Mutex::new(SubscriptionMap::default()),
            next_priority: AtomicU64::new(0),
        }
    }

    /// Expands an event name list: module groups become their atomic
    /// events, atomic names pass through.
    ///
    /// # Errors
    ///
    /// Returns `invalid argument` for names that are neither.
    fn expand_events(events: &[String]) -> Result<Vec<&'static str>> {
        let mut expanded = Vec::new();
        for name in events {
            if let Some(group) = names::module_events(name) {
                expanded.extend_from_slice(group);
            } else if names::is_atomic_event(name) {
                // Map onto the static name so the registry stores one
                // canonical string per event.
                let atomic = names::module_events(name.split('.').next().unwrap_or_default())
                    .and_then(|group| group.iter().copied().find(|e| *e == name.as_str()))
                    .ok_or_else(|| {
                        Error::invalid_argument(format!("Unknown event '{name}'"))
                    })?;
                expanded.push(atomic);
            } else {
                return Err(Error::invalid_argument(format!("Unknown event '{name}'")));
            }
        }
        Ok(expanded)
    }

    /// Subscribes a channel to events, scoped to the given top-level
    /// contexts (`None` = session-wide).
    ///
    /// Re-subscribing an existing triple preserves its earlier priority.
    ///
    /// # Errors
    ///
    /// Returns `invalid argument` for unknown event names; nothing is
    /// registered in that case.
    pub fn subscribe(
        &self,
        events: &[String],
        contexts: Option<&[BrowsingContextId]>,
        channel: &Channel,
    ) -> Result<()> {
        let expanded = Self::expand_events(events)?;

        let context_keys: Vec<ContextKey> = match contexts {
            Some(contexts) => contexts.iter().cloned().map(Some).collect(),
            None => vec![None],
        };

        let mut subscriptions = self.subscriptions.lock();
        let channel_map = subscriptions.entry(channel.clone()).or_default();

        for context_key in &context_keys {
            let event_map = channel_map.entry(context_key.clone()).or_default();
            for event in &expanded {
                if !event_map.contains_key(*event) {
                    let priority = self.next_priority.fetch_add(1, Ordering::Relaxed);
                    event_map.insert((*event).to_string(), priority);
                    debug!(event = *event, channel = %channel, priority, "Subscribed");
                }
            }
        }

        Ok(())
    }

    /// Removes subscriptions atomically.
    ///
    /// Every `(event, context)` pair must exist under `channel`; when
    /// any is missing the whole call fails and nothing is removed.
    ///
    /// # Errors
    ///
    /// Returns `invalid argument` for unknown event names or missing
    /// pairs.
    pub fn unsubscribe_all(
        &self,
        events: &[String],
        contexts: Option<&[BrowsingContextId]>,
        channel: &Channel,
    ) -> Result<()> {
        let expanded = Self::expand_events(events)?;

        let context_keys: Vec<ContextKey> = match contexts {
            Some(contexts) => contexts.iter().cloned().map(Some).collect(),
            None => vec![None],
        };

        let mut subscriptions = self.subscriptions.lock();
        let channel_map = subscriptions
            .get_mut(channel)
            .ok_or_else(|| Error::invalid_argument("No subscription found for this channel"))?;

        // Validate the whole batch before touching anything.
        for context_key in &context_keys {
            let event_map = channel_map.get(context_key);
            for event in &expanded {
                let present = event_map.is_some_and(|map| map.contains_key(*event));
                if !present {
                    return Err(Error::invalid_argument(format!(
                        "No subscription found for event '{event}'"
                    )));
                }
            }
        }

        for context_key in &context_keys {
            if let Some(event_map) = channel_map.get_mut(context_key) {
                for event in &expanded {
                    event_map.remove(*event);
                }
                if event_map.is_empty() {
                    channel_map.remove(context_key);
                }
            }
        }
        if channel_map.is_empty() {
            subscriptions.remove(channel);
        }

        Ok(())
    }

    /// Returns the channels subscribed to `event` on the given top-level
    /// context, sorted ascending by priority (oldest subscription
    /// first). Session-wide subscriptions always apply.
    #[must_use]
    pub fn channels_for(&self, event: &str, context: Option<&BrowsingContextId>) -> Vec<Channel> {
        let subscriptions = self.subscriptions.lock();

        let mut matches: Vec<(u64, Channel)> = Vec::new();
        for (channel, channel_map) in subscriptions.iter() {
            let mut best: Option<u64> = None;

            if let Some(priority) = channel_map.get(&None).and_then(|map| map.get(event)) {
                best = Some(*priority);
            }
            if let Some(context) = context
                && let Some(priority) = channel_map
                    .get(&Some(context.clone()))
                    .and_then(|map| map.get(event))
            {
                best = Some(best.map_or(*priority, |b| b.min(*priority)));
            }

            if let Some(priority) = best {
                matches.push((priority, channel.clone()));
            }
        }

        matches.sort_by_key(|(priority, _)| *priority);
        matches.into_iter().map(|(_, channel)| channel).collect()
    }

    /// Returns `true` when any channel would receive the event.
    #[must_use]
    pub fn has_subscribers(&self, event: &str, context: Option<&BrowsingContextId>) -> bool {
        !self.channels_for(event, context).is_empty()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    const LOAD: &str = "browsingContext.load";

    fn ctx(id: &str) -> BrowsingContextId {
        BrowsingContextId::new(id)
    }

    fn events(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| (*s).to_string()).collect()
    }

    #[test]
    fn test_subscribe_is_idempotent() {
        let manager = SubscriptionManager::new();
        let channel = Channel::new("ch");

        manager
            .subscribe(&events(&[LOAD]), Some(&[ctx("top")]), &channel)
            .unwrap();
        // A competing subscription mints the next priority.
        manager
            .subscribe(&events(&[LOAD]), Some(&[ctx("top")]), &Channel::new("late"))
            .unwrap();
        // Re-subscribing must keep the original (lower) priority.
        manager
            .subscribe(&events(&[LOAD]), Some(&[ctx("top")]), &channel)
            .unwrap();

        let channels = manager.channels_for(LOAD, Some(&ctx("top")));
        assert_eq!(channels, vec![channel, Channel::new("late")]);
    }

    #[test]
    fn test_group_expansion() {
        let manager = SubscriptionManager::new();
        let channel = Channel::new("ch");

        manager
            .subscribe(&events(&["network"]), None, &channel)
            .unwrap();

        assert!(manager.has_subscribers("network.beforeRequestSent", None));
        assert!(manager.has_subscribers("network.fetchError", None));
        assert!(!manager.has_subscribers(LOAD, None));
    }

    #[test]
    fn test_unknown_event_rejected() {
        let manager = SubscriptionManager::new();
        let err = manager
            .subscribe(&events(&["element.added"]), None, &Channel::default_channel())
            .unwrap_err();
        assert_eq!(err.error_code(), "invalid argument");
    }

    #[test]
    fn test_unsubscribe_all_or_nothing() {
        let manager = SubscriptionManager::new();
        let channel = Channel::new("ch");

        manager
            .subscribe(&events(&[LOAD]), Some(&[ctx("ctx1")]), &channel)
            .unwrap();

        // One valid pair plus one missing pair: nothing may be removed.
        let err = manager
            .unsubscribe_all(
                &events(&[LOAD, "browsingContext.domContentLoaded"]),
                Some(&[ctx("ctx1")]),
                &channel,
            )
            .unwrap_err();
        assert_eq!(err.error_code(), "invalid argument");
        assert!(manager.has_subscribers(LOAD, Some(&ctx("ctx1"))));

        // The fully valid batch removes and prunes.
        manager
            .unsubscribe_all(&events(&[LOAD]), Some(&[ctx("ctx1")]), &channel)
            .unwrap();
        assert!(!manager.has_subscribers(LOAD, Some(&ctx("ctx1"))));
    }

    #[test]
    fn test_channels_sorted_by_priority() {
        let manager = SubscriptionManager::new();

        manager
            .subscribe(&events(&[LOAD]), None, &Channel::new("first"))
            .unwrap();
        manager
            .subscribe(&events(&[LOAD]), Some(&[ctx("top")]), &Channel::new("second"))
            .unwrap();
        manager
            .subscribe(&events(&[LOAD]), None, &Channel::new("third"))
            .unwrap();

        let channels = manager.channels_for(LOAD, Some(&ctx("top")));
        assert_eq!(
            channels,
            vec![
                Channel::new("first"),
                Channel::new("second"),
                Channel::new("third"),
            ]
        );

        // Without the context, only session-wide subscriptions apply.
        let channels = manager.channels_for(LOAD, None);
        assert_eq!(channels, vec![Channel::new("first"), Channel::new("third")]);
    }

    #[test]
    fn test_global_and_scoped_use_oldest_priority() {
        let manager = SubscriptionManager::new();
        let channel = Channel::new("ch");

        manager
            .subscribe(&events(&[LOAD]), Some(&[ctx("top")]), &channel)
            .unwrap();
        manager
            .subscribe(&events(&[LOAD]), None, &Channel::new("between"))
            .unwrap();
        manager.subscribe(&events(&[LOAD]), None, &channel).unwrap();

        // "ch" subscribed before "between"; its oldest priority wins.
        let channels = manager.channels_for(LOAD, Some(&ctx("top")));
        assert_eq!(channels, vec![channel, Channel::new("between")]);
    }
}
