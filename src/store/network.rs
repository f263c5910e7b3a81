//! Network requests, phases, intercept registry.
//!
//! A request is created at `Network.requestWillBeSent` and removed at
//! `loadingFinished`/`loadingFailed` or session close. Phase progression
//! is monotonic:
//!
//! ```text
//! beforeRequestSent → responseStarted → authRequired? → responseCompleted | fetchError
//! ```
//!
//! The intercept registry lives here too; matching is performed by the
//! network module against the snapshot this store hands out.

// ============================================================================
// Imports
// ============================================================================

use std::time::{SystemTime, UNIX_EPOCH};

use parking_lot::RwLock;
use rustc_hash::FxHashMap;
use tracing::debug;

use crate::error::{Error, Result};
use crate::identifiers::{BrowsingContextId, InterceptId, NavigationId, NetworkRequestId};
use crate::protocol::network::{FetchTimingInfo, Header, InterceptPhase, UrlPattern};

// ============================================================================
// Timing
// ============================================================================

/// Coerces a timing input to a non-negative millisecond value.
///
/// Finite values floor to `max(0, floor(x))`; `None`, negative, and NaN
/// collapse to 0.
#[must_use]
pub fn get_timing(value: Option<f64>) -> u64 {
    match value {
        Some(x) if x.is_finite() && x > 0.0 => x.floor() as u64,
        _ => 0,
    }
}

/// Current wall time in milliseconds since the Unix epoch.
#[must_use]
pub fn wall_time_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| d.as_millis() as u64)
}

// ============================================================================
// RequestPhase
// ============================================================================

/// Phase of a tracked request; progression is monotonic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum RequestPhase {
    /// Request recorded, not yet on the wire.
    BeforeRequestSent,
    /// Response headers received.
    ResponseStarted,
    /// Server challenged for credentials.
    AuthRequired,
    /// Body delivered.
    Completed,
    /// Fetch failed or was canceled.
    Failed,
}

impl RequestPhase {
    /// Maps to the intercept phase this request phase can block at.
    #[must_use]
    pub fn intercept_phase(self) -> Option<InterceptPhase> {
        match self {
            Self::BeforeRequestSent => Some(InterceptPhase::BeforeRequestSent),
            Self::ResponseStarted => Some(InterceptPhase::ResponseStarted),
            Self::AuthRequired => Some(InterceptPhase::AuthRequired),
            Self::Completed | Self::Failed => None,
        }
    }
}

// ============================================================================
// Intercept
// ============================================================================

/// A registered network intercept.
#[derive(Debug, Clone)]
pub struct Intercept {
    /// The minted intercept id.
    pub id: InterceptId,
    /// Phases the intercept pauses.
    pub phases: Vec<InterceptPhase>,
    /// URL patterns; `None` matches every URL.
    pub patterns: Option<Vec<UrlPattern>>,
    /// Context filter; `None` applies everywhere.
    pub contexts: Option<Vec<BrowsingContextId>>,
}

// ============================================================================
// NetworkRequest
// ============================================================================

/// One tracked network request.
#[derive(Debug, Clone)]
pub struct NetworkRequest {
    /// The CDP request id.
    pub id: NetworkRequestId,
    /// Owning context.
    pub context: Option<BrowsingContextId>,
    /// Triggering navigation, if any.
    pub navigation: Option<NavigationId>,
    /// Request URL.
    pub url: String,
    /// HTTP method.
    pub method: String,
    /// Request headers.
    pub headers: Vec<Header>,
    /// Redirects observed so far.
    pub redirect_count: u32,
    /// Current phase.
    pub phase: RequestPhase,
    /// Whether the request is paused awaiting client resolution.
    pub blocked: bool,
    /// Intercepts blocking the request.
    pub blocked_by: Vec<InterceptId>,
    /// The `Fetch.requestPaused` id, present while paused.
    pub fetch_id: Option<String>,
    /// Response status once headers arrived.
    pub response_status: Option<u32>,
    /// Response headers once they arrived.
    pub response_headers: Vec<Header>,
    /// Timing snapshot.
    pub timings: FetchTimingInfo,
}

impl NetworkRequest {
    /// Creates a fresh record in the `beforeRequestSent` phase.
    #[must_use]
    pub fn new(
        id: NetworkRequestId,
        context: Option<BrowsingContextId>,
        navigation: Option<NavigationId>,
        url: impl Into<String>,
        method: impl Into<String>,
        headers: Vec<Header>,
    ) -> Self {
        Self {
            id,
            context,
            navigation,
            url: url.into(),
            method: method.into(),
            headers,
            redirect_count: 0,
            phase: RequestPhase::BeforeRequestSent,
            blocked: false,
            blocked_by: Vec::new(),
            fetch_id: None,
            response_status: None,
            response_headers: Vec::new(),
            timings: FetchTimingInfo::default(),
        }
    }
}

// ============================================================================
// NetworkStore
// ============================================================================

/// Registry of live requests and intercepts.
#[derive(Default)]
pub struct NetworkStore {
    requests: RwLock<FxHashMap<NetworkRequestId, NetworkRequest>>,
    intercepts: RwLock<FxHashMap<InterceptId, Intercept>>,
}

impl NetworkStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    // ========================================================================
    // Requests
    // ========================================================================

    /// Inserts a fresh request, or bumps the redirect count and rewrites
    /// the URL when the id is already tracked (redirect hop).
    pub fn upsert_request(&self, request: NetworkRequest) {
        let mut requests = self.requests.write();
        match requests.get_mut(&request.id) {
            Some(existing) => {
                existing.redirect_count += 1;
                existing.url = request.url;
                existing.method = request.method;
                existing.headers = request.headers;
                existing.phase = RequestPhase::BeforeRequestSent;
                existing.blocked = false;
                existing.blocked_by.clear();
                existing.fetch_id = None;
            }
            None => {
                requests.insert(request.id.clone(), request);
            }
        }
    }

    /// Looks up a request snapshot.
    pub fn get(&self, id: &NetworkRequestId) -> Result<NetworkRequest> {
        self.requests
            .read()
            .get(id)
            .cloned()
            .ok_or_else(|| Error::no_such_request(id.clone()))
    }

    /// Advances a request's phase; regressions are ignored so the
    /// progression stays monotonic.
    pub fn advance_phase(&self, id: &NetworkRequestId, phase: RequestPhase) {
        if let Some(request) = self.requests.write().get_mut(id)
            && phase > request.phase
        {
            request.phase = phase;
        }
    }

    /// Records response headers and status.
    pub fn record_response(&self, id: &NetworkRequestId, status: u32, headers: Vec<Header>) {
        if let Some(request) = self.requests.write().get_mut(id) {
            request.response_status = Some(status);
            request.response_headers = headers;
        }
    }

    /// Marks a request paused by the given intercepts.
    pub fn mark_blocked(
        &self,
        id: &NetworkRequestId,
        fetch_id: impl Into<String>,
        intercepts: Vec<InterceptId>,
    ) {
        if let Some(request) = self.requests.write().get_mut(id) {
            request.blocked = true;
            request.blocked_by = intercepts;
            request.fetch_id = Some(fetch_id.into());
        }
    }

    /// Remembers the fetch id of a paused request without blocking it.
    ///
    /// `Fetch.authRequired` carries no network id, so later phases
    /// correlate through this.
    pub fn note_fetch_id(&self, id: &NetworkRequestId, fetch_id: impl Into<String>) {
        if let Some(request) = self.requests.write().get_mut(id) {
            request.fetch_id = Some(fetch_id.into());
        }
    }

    /// Finds the request currently bound to a fetch id.
    #[must_use]
    pub fn find_by_fetch_id(&self, fetch_id: &str) -> Option<NetworkRequestId> {
        self.requests
            .read()
            .values()
            .find(|request| request.fetch_id.as_deref() == Some(fetch_id))
            .map(|request| request.id.clone())
    }

    /// Claims a blocked request for resolution, clearing the blocked
    /// state atomically so a second resolution fails.
    ///
    /// # Errors
    ///
    /// - `no such request` when the id is unknown.
    /// - `invalid argument` when the request is not blocked (including
    ///   double resolution).
    /// - `invalid argument` when the request's phase is not in
    ///   `allowed`.
    pub fn claim_blocked(
        &self,
        id: &NetworkRequestId,
        allowed: &[InterceptPhase],
    ) -> Result<(String, RequestPhase)> {
        let mut requests = self.requests.write();
        let request = requests
            .get_mut(id)
            .ok_or_else(|| Error::no_such_request(id.clone()))?;

        if !request.blocked {
            return Err(Error::invalid_argument(format!(
                "No blocked request found for network id '{id}'"
            )));
        }

        let phase = request.phase;
        let intercept_phase = phase.intercept_phase();
        if !intercept_phase.is_some_and(|p| allowed.contains(&p)) {
            return Err(Error::invalid_argument(format!(
                "Blocked request for network id '{id}' is in an unexpected phase"
            )));
        }

        let fetch_id = request
            .fetch_id
            .clone()
            .ok_or_else(|| Error::unknown(format!("Request '{id}' has no fetch id")))?;

        // The fetch id stays behind: a later auth phase of the same
        // fetch correlates through it.
        request.blocked = false;
        request.blocked_by.clear();

        Ok((fetch_id, phase))
    }

    /// Removes a finished request.
    pub fn remove(&self, id: &NetworkRequestId) -> Option<NetworkRequest> {
        self.requests.write().remove(id)
    }

    /// Returns the ids of in-flight requests owned by a context.
    #[must_use]
    pub fn requests_for_context(&self, context: &BrowsingContextId) -> Vec<NetworkRequestId> {
        self.requests
            .read()
            .values()
            .filter(|request| {
                request.context.as_ref() == Some(context)
                    && request.phase < RequestPhase::Completed
            })
            .map(|request| request.id.clone())
            .collect()
    }

    // ========================================================================
    // Intercepts
    // ========================================================================

    /// Registers an intercept and returns its minted id.
    pub fn add_intercept(
        &self,
        phases: Vec<InterceptPhase>,
        patterns: Option<Vec<UrlPattern>>,
        contexts: Option<Vec<BrowsingContextId>>,
    ) -> InterceptId {
        let id = InterceptId::generate();
        debug!(intercept = %id, ?phases, "Intercept added");
        self.intercepts.write().insert(
            id.clone(),
            Intercept {
                id: id.clone(),
                phases,
                patterns,
                contexts,
            },
        );
        id
    }

    /// Removes an intercept.
    ///
    /// # Errors
    ///
    /// Returns `no such intercept` when the id is unknown.
    pub fn remove_intercept(&self, id: &InterceptId) -> Result<()> {
        self.intercepts
            .write()
            .remove(id)
            .map(|_| ())
            .ok_or_else(|| Error::no_such_intercept(id.clone()))
    }

    /// Snapshot of every registered intercept.
    #[must_use]
    pub fn intercepts(&self) -> Vec<Intercept> {
        self.intercepts.read().values().cloned().collect()
    }

    /// Returns `true` when any intercept pauses the given phase.
    #[must_use]
    pub fn has_phase(&self, phase: InterceptPhase) -> bool {
        self.intercepts
            .read()
            .values()
            .any(|intercept| intercept.phases.contains(&phase))
    }
}

// ============================================================================
// Tests
// ============================================================================
