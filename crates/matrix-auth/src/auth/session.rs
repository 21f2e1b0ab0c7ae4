//! Authenticated user sessions.
//!
//! A `Session` owns the token pair returned by a successful login and keeps
//! the access token alive: every time a new access token is installed a
//! refresh is scheduled for its expiry. When it fires, the refresh token is
//! exchanged for a fresh access token and the timer is armed again.
//!
//! State transitions:
//!
//! ```text
//! Active --(timer fires)--> Refreshing --> Active    (new token, timer armed)
//!                                     \--> Degraded  (no timer, needs a manual refresh)
//! any --(logout / drop)--> LoggedOut
//! ```

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use chrono::{DateTime, Utc};
use tokio::runtime::Handle;
use serde_json::{Map, Value};
use tracing::{debug, info, warn};

use crate::api::response::required_str;
use crate::api::{Method, ResponseError};

use super::client::{DEVICE_SECRET_PATH, REFRESH_TOKEN_PATH, USER_DETAILS_PATH};
use super::claims::time_until;
use super::scheduler::{schedule_once, CancelHandle};
use super::{decode_credentials, AuthClient, AuthError, Credentials};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionStatus {
    /// Access token installed, refresh scheduled or vetoed
    Active,
    /// A refresh request is in flight
    Refreshing,
    /// The last refresh failed; no refresh is scheduled
    Degraded,
    /// Terminal
    LoggedOut,
}

/// Hooks around token refresh.
///
/// Both methods have defaults: refresh always proceeds and results are ignored.
pub trait SessionObserver: Send + Sync {
    /// Consulted before each scheduled refresh. Returning `false` skips the
    /// refresh and leaves no refresh scheduled.
    fn should_refresh(&self, subject_id: &str) -> bool {
        let _ = subject_id;
        true
    }

    /// Called with the outcome of every refresh attempt.
    fn on_refreshed(&self, subject_id: &str, result: &Result<(), AuthError>) {
        let _ = (subject_id, result);
    }
}

/// Observer used when none is set
struct AlwaysRefresh;

impl SessionObserver for AlwaysRefresh {}

struct ArmedRefresh {
    generation: u64,
    handle: CancelHandle,
}

struct SessionState {
    /// `None` once logged out
    access_token: Option<String>,
    refresh_token: Option<String>,
    expires_at: DateTime<Utc>,
    status: SessionStatus,
    pending: Option<ArmedRefresh>,
    /// Bumped every time a refresh is armed or the session degrades
    generation: u64,
    observer: Arc<dyn SessionObserver>,
}

struct SessionShared {
    client: AuthClient,
    subject_id: String,
    state: Mutex<SessionState>,
    /// Serializes refreshes; at most one request in flight
    refresh_gate: tokio::sync::Mutex<()>,
    /// Runtime the session was created on; refresh timers run here
    runtime: Handle,
}

/// An authenticated user.
///
/// Dropping the session logs it out.
pub struct Session {
    shared: Arc<SessionShared>,
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.shared.state();
        f.debug_struct("Session")
            .field("subject_id", &self.shared.subject_id)
            .field("status", &state.status)
            .field("expires_at", &state.expires_at)
            .finish_non_exhaustive()
    }
}

impl Session {
    /// Wrap a freshly issued token pair and schedule the first refresh.
    ///
    /// Only called from `AuthClient::authenticate`, so a runtime is current.
    pub(crate) fn start(
        client: AuthClient,
        credentials: Credentials,
        access_token: String,
        refresh_token: String,
    ) -> Self {
        let shared = Arc::new(SessionShared {
            client,
            subject_id: credentials.subject_id,
            state: Mutex::new(SessionState {
                access_token: Some(access_token),
                refresh_token: Some(refresh_token),
                expires_at: credentials.expires_at,
                status: SessionStatus::Active,
                pending: None,
                generation: 0,
                observer: Arc::new(AlwaysRefresh),
            }),
            refresh_gate: tokio::sync::Mutex::new(()),
            runtime: Handle::current(),
        });

        {
            let mut state = shared.state();
            SessionShared::arm(&shared, &mut state);
        }

        Self { shared }
    }

    pub fn client(&self) -> &AuthClient {
        &self.shared.client
    }

    pub fn subject_id(&self) -> &str {
        &self.shared.subject_id
    }

    /// Current access token, `None` after logout
    pub fn access_token(&self) -> Option<String> {
        self.shared.state().access_token.clone()
    }

    /// Refresh token, `None` after logout
    pub fn refresh_token(&self) -> Option<String> {
        self.shared.state().refresh_token.clone()
    }

    /// Expiry of the current access token
    pub fn expires_at(&self) -> DateTime<Utc> {
        self.shared.state().expires_at
    }

    pub fn status(&self) -> SessionStatus {
        self.shared.state().status
    }

    /// True if a refresh is scheduled and has not fired yet
    pub fn has_pending_refresh(&self) -> bool {
        self.shared.state().pending.is_some()
    }

    pub fn set_observer(&self, observer: Arc<dyn SessionObserver>) {
        self.shared.state().observer = observer;
    }

    /// Install a new access token and reschedule the refresh for its expiry.
    ///
    /// The token is decoded first; if decoding fails the session is left
    /// untouched. Callable from any thread.
    pub fn set_access_token(&self, token: impl Into<String>) -> Result<(), AuthError> {
        let token = token.into();
        let credentials = decode_credentials(&token)?;
        self.shared.install(token, credentials)
    }

    /// Exchange the refresh token for a new access token now.
    ///
    /// Waits for any refresh already in flight. On failure no refresh is
    /// scheduled and the session is `Degraded` until a later refresh
    /// succeeds.
    pub async fn refresh_access_token(&self) -> Result<(), AuthError> {
        self.shared.refresh().await
    }

    /// Fetch the secret for `device_id`.
    pub async fn device_secret(&self, device_id: &str) -> Result<String, AuthError> {
        let token = self.shared.current_token()?;
        let results = self
            .shared
            .client
            .call(
                Method::Get,
                DEVICE_SECRET_PATH,
                &[("device_id", device_id), ("access_token", token.as_str())],
            )
            .await?;

        match required_str(&results, "deviceSecret") {
            Some(secret) => Ok(secret.to_string()),
            None => Err(ResponseError::Retrieval(Value::Object(results)).into()),
        }
    }

    /// Fetch the details of the session's user.
    pub async fn details(&self) -> Result<Map<String, Value>, AuthError> {
        let token = self.shared.current_token()?;
        let results = self
            .shared
            .client
            .call(
                Method::Get,
                USER_DETAILS_PATH,
                &[
                    ("user_id", self.shared.subject_id.as_str()),
                    ("access_token", token.as_str()),
                ],
            )
            .await?;
        Ok(results)
    }

    /// Cancel the scheduled refresh and discard the tokens.
    ///
    /// Safe to call more than once. A refresh already in flight completes
    /// but its result is discarded.
    pub fn logout(&self) {
        self.shared.logout();
    }

    #[cfg(test)]
    fn generation(&self) -> u64 {
        self.shared.state().generation
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.shared.logout();
    }
}

impl SessionShared {
    fn state(&self) -> MutexGuard<'_, SessionState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn current_token(&self) -> Result<String, AuthError> {
        self.state().access_token.clone().ok_or(AuthError::LoggedOut)
    }

    /// Schedule a refresh at the current expiry, replacing any pending one.
    fn arm(this: &Arc<Self>, state: &mut SessionState) {
        let delay = time_until(state.expires_at);

        state.generation += 1;
        let generation = state.generation;
        let weak = Arc::downgrade(this);

        debug!(
            subject_id = %this.subject_id,
            delay_secs = delay.as_secs(),
            generation,
            "Arming token refresh"
        );

        // Replacing the previous handle cancels it
        state.pending = Some(ArmedRefresh {
            generation,
            handle: schedule_once(&this.runtime, delay, Self::on_timer(weak, generation)),
        });
    }

    async fn on_timer(weak: Weak<Self>, generation: u64) {
        if let Some(shared) = weak.upgrade() {
            shared.scheduled_refresh(generation).await;
        }
    }

    async fn scheduled_refresh(self: Arc<Self>, generation: u64) {
        let observer = {
            let mut state = self.state();
            let current = state
                .pending
                .as_ref()
                .is_some_and(|p| p.generation == generation);
            if !current || state.status == SessionStatus::LoggedOut {
                return;
            }
            // Detach our own handle so re-arming below does not abort this task
            if let Some(pending) = state.pending.take() {
                pending.handle.detach();
            }
            Arc::clone(&state.observer)
        };

        if !observer.should_refresh(&self.subject_id) {
            warn!(subject_id = %self.subject_id, "Scheduled token refresh vetoed");
            return;
        }

        debug!(subject_id = %self.subject_id, generation, "Scheduled token refresh firing");
        if let Err(e) = self.refresh_after(Some(generation)).await {
            warn!(subject_id = %self.subject_id, error = %e, "Scheduled token refresh failed");
        }
    }

    async fn refresh(self: &Arc<Self>) -> Result<(), AuthError> {
        self.refresh_after(None).await
    }

    /// Run one refresh. With `scheduled_for`, the refresh is skipped if the
    /// session moved on (new token or failed refresh) while waiting for the gate.
    async fn refresh_after(self: &Arc<Self>, scheduled_for: Option<u64>) -> Result<(), AuthError> {
        let _gate = self.refresh_gate.lock().await;

        let (refresh_token, observer) = {
            let mut state = self.state();
            if state.status == SessionStatus::LoggedOut {
                return Err(AuthError::LoggedOut);
            }
            if scheduled_for.is_some_and(|g| g != state.generation) {
                debug!(subject_id = %self.subject_id, "Scheduled refresh superseded, skipping");
                return Ok(());
            }
            let Some(refresh_token) = state.refresh_token.clone() else {
                return Err(AuthError::LoggedOut);
            };
            state.status = SessionStatus::Refreshing;
            (refresh_token, Arc::clone(&state.observer))
        };

        let result = match self.request_access_token(&refresh_token).await {
            Ok((token, credentials)) => self.install(token, credentials),
            Err(e) => {
                self.degrade();
                Err(e)
            }
        };

        observer.on_refreshed(&self.subject_id, &result);
        result
    }

    async fn request_access_token(
        &self,
        refresh_token: &str,
    ) -> Result<(String, Credentials), AuthError> {
        let config = self.client.config();
        let params = [
            ("client_id", config.client_id()),
            ("client_secret", config.client_secret()),
            ("grant_type", "refresh_token"),
            ("jwt_token", "true"),
            ("refresh_token", refresh_token),
        ];

        let results = self
            .client
            .call(Method::Post, REFRESH_TOKEN_PATH, &params)
            .await?;

        let token = match required_str(&results, "access_token") {
            Some(token) => token.to_string(),
            None => return Err(ResponseError::Retrieval(Value::Object(results)).into()),
        };
        let credentials = decode_credentials(&token)?;
        Ok((token, credentials))
    }

    /// Swap in a decoded access token and re-arm. No-op after logout.
    fn install(self: &Arc<Self>, token: String, credentials: Credentials) -> Result<(), AuthError> {
        let mut state = self.state();
        if state.status == SessionStatus::LoggedOut {
            debug!(subject_id = %self.subject_id, "Discarding token for logged out session");
            return Err(AuthError::LoggedOut);
        }

        if credentials.subject_id != self.subject_id {
            warn!(
                subject_id = %self.subject_id,
                token_subject = %credentials.subject_id,
                "Access token issued for a different subject"
            );
        }

        state.access_token = Some(token);
        state.expires_at = credentials.expires_at;
        state.status = SessionStatus::Active;
        Self::arm(self, &mut state);

        info!(
            subject_id = %self.subject_id,
            expires_at = %credentials.expires_at,
            "Access token installed"
        );
        Ok(())
    }

    fn degrade(&self) {
        let mut state = self.state();
        if state.status == SessionStatus::LoggedOut {
            return;
        }
        state.status = SessionStatus::Degraded;
        // Retire any scheduled refresh still waiting on the gate
        state.generation += 1;
        state.pending = None;
    }

    fn logout(&self) {
        let mut state = self.state();
        if state.status == SessionStatus::LoggedOut {
            return;
        }
        state.status = SessionStatus::LoggedOut;
        state.access_token = None;
        state.refresh_token = None;
        if let Some(pending) = state.pending.take() {
            pending.handle.cancel();
        }
        info!(subject_id = %self.subject_id, "Logged out");
    }
}
