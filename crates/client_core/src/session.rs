//! Session state machine.
//!
//! `SessionController` is the only writer of session state. Every transition
//! waits for its network call first and then applies its result and
//! publishes one snapshot under the state lock. Results that belong to an
//! older session (the epoch moved on while the request was in flight) are
//! dropped.
//!
//! Sign-out of an authenticated session can be triggered from two places: a
//! user logout and a credential rejected by the server. Whichever path
//! performs the sign-out of an `Authenticated` session emits the redirect,
//! so a rejected credential yields exactly one `RedirectToLogin`.

use std::sync::{Arc, Mutex as StdMutex, MutexGuard, PoisonError, Weak};

use futures::future::{BoxFuture, FutureExt, Shared};
use shared::{
    domain::{Profile, UserSummary},
    protocol::{NewProfile, ProfileChanges, TokenResponse},
};
use storage::StoredSession;
use tokio::{
    sync::{broadcast, watch, Mutex},
    task::JoinHandle,
};
use tracing::{debug, error, info, warn};

use crate::{
    auth_gateway::AuthGateway,
    error::{classify, ClassifiedError, ErrorKind, RequestContext, TransportError},
    profile_gateway::ProfileGateway,
    transport::{ExpiryNotice, Transport},
    types::{AuthOutcome, ProfileStatus, SessionEvent, SessionPhase, SessionSnapshot},
};

struct SessionState {
    phase: SessionPhase,
    user: Option<UserSummary>,
    credential: Option<String>,
    profile: ProfileStatus,
    last_error: Option<ClassifiedError>,
    /// Bumped whenever the signed-in identity changes.
    epoch: u64,
}

impl SessionState {
    fn new() -> Self {
        Self {
            phase: SessionPhase::Initializing,
            user: None,
            credential: None,
            profile: ProfileStatus::Unknown,
            last_error: None,
            epoch: 0,
        }
    }

    fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot::new(
            self.phase,
            self.user.clone(),
            self.profile,
            self.last_error.clone(),
        )
    }

    fn sign_in(&mut self, token: String, user: UserSummary, profile: ProfileStatus) {
        self.epoch += 1;
        self.phase = SessionPhase::Authenticated;
        self.user = Some(user);
        self.credential = Some(token);
        self.profile = profile;
        self.last_error = None;
    }

    /// Leaves `last_error` alone; logout clears it separately.
    fn sign_out(&mut self) {
        self.epoch += 1;
        self.phase = SessionPhase::Unauthenticated;
        self.user = None;
        self.credential = None;
        self.profile = ProfileStatus::Unknown;
    }
}

type PendingCheck<T> = Shared<BoxFuture<'static, T>>;

#[derive(Default)]
struct InflightChecks {
    credential: Option<PendingCheck<()>>,
    profile: Option<(u64, PendingCheck<ProfileStatus>)>,
}

pub struct SessionController {
    transport: Arc<Transport>,
    auth: AuthGateway,
    profiles: ProfileGateway,
    state: Mutex<SessionState>,
    inflight: StdMutex<InflightChecks>,
    snapshots: watch::Sender<SessionSnapshot>,
    events: broadcast::Sender<SessionEvent>,
    expiry_listener: JoinHandle<()>,
}

impl SessionController {
    /// Build a controller in the `Initializing` phase. Must be called from
    /// within a tokio runtime; the controller listens for credential
    /// rejections reported by `transport`.
    pub fn new(transport: Arc<Transport>) -> Arc<Self> {
        let (snapshots, _) = watch::channel(SessionSnapshot::initializing());
        let (events, _) = broadcast::channel(64);
        let notices = transport.subscribe_expiry();

        Arc::new_cyclic(|controller| Self {
            auth: AuthGateway::new(Arc::clone(&transport)),
            profiles: ProfileGateway::new(Arc::clone(&transport)),
            transport,
            state: Mutex::new(SessionState::new()),
            inflight: StdMutex::new(InflightChecks::default()),
            snapshots,
            events,
            expiry_listener: spawn_expiry_listener(controller.clone(), notices),
        })
    }

    /// Build a controller and run the startup credential check in the
    /// background. Observe the outcome through [`Self::subscribe`].
    pub fn start(transport: Arc<Transport>) -> Arc<Self> {
        let controller = Self::new(transport);
        let startup = Arc::clone(&controller);
        tokio::spawn(async move {
            startup.initialize().await;
        });
        controller
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        self.snapshots.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<SessionSnapshot> {
        self.snapshots.subscribe()
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    /// Whether a bearer credential is currently held in memory.
    pub async fn has_credential(&self) -> bool {
        self.state.lock().await.credential.is_some()
    }

    /// Validate the stored credential, if any, and resolve the session.
    ///
    /// Concurrent callers share one check. The check runs as its own task,
    /// so it completes even if every caller stops waiting.
    pub async fn initialize(self: &Arc<Self>) -> SessionSnapshot {
        let pending = {
            let mut inflight = self.lock_inflight();
            if let Some(pending) = inflight.credential.clone() {
                pending
            } else {
                let controller = Arc::clone(self);
                let task = tokio::spawn(async move {
                    controller.validate_stored_credential().await;
                    controller.lock_inflight().credential = None;
                });
                let pending = async move {
                    if let Err(error) = task.await {
                        error!(%error, "credential check task failed");
                    }
                }
                .boxed()
                .shared();
                inflight.credential = Some(pending.clone());
                pending
            }
        };
        pending.await;
        self.snapshot()
    }

    /// Re-run the credential check against the server, for example after the
    /// application resumes. A rejected credential signs the session out.
    pub async fn revalidate(self: &Arc<Self>) -> SessionSnapshot {
        self.initialize().await
    }

    /// Ask the server whether the signed-in user has a profile.
    ///
    /// Returns `Unknown` when nobody is signed in. Concurrent callers for the
    /// same session share one request.
    pub async fn check_profile(self: &Arc<Self>) -> ProfileStatus {
        let epoch = {
            let state = self.state.lock().await;
            if state.phase != SessionPhase::Authenticated {
                return ProfileStatus::Unknown;
            }
            state.epoch
        };

        let pending = {
            let mut inflight = self.lock_inflight();
            let attached = inflight
                .profile
                .as_ref()
                .filter(|(pending_epoch, _)| *pending_epoch == epoch)
                .map(|(_, pending)| pending.clone());
            if let Some(pending) = attached {
                pending
            } else {
                let controller = Arc::clone(self);
                let pending = async move {
                    let status = controller.fetch_profile_status(epoch).await;
                    {
                        let mut inflight = controller.lock_inflight();
                        let finished = inflight
                            .profile
                            .as_ref()
                            .is_some_and(|(pending_epoch, _)| *pending_epoch == epoch);
                        if finished {
                            inflight.profile = None;
                        }
                    }
                    status
                }
                .boxed()
                .shared();
                inflight.profile = Some((epoch, pending.clone()));
                pending
            }
        };
        pending.await
    }

    pub async fn login(
        self: &Arc<Self>,
        email: &str,
        password: &str,
    ) -> Result<AuthOutcome, ClassifiedError> {
        let response = match self.auth.login(email, password).await {
            Ok(response) => response,
            Err(error) => return Err(self.record_failure(RequestContext::Login, &error).await),
        };
        let user = self
            .establish(response, ProfileStatus::Unknown, RequestContext::Login)
            .await?;

        let has_profile = self.check_profile().await.as_bool().unwrap_or(false);
        info!(user_id = ?user.id, has_profile, "signed in");
        Ok(AuthOutcome { user, has_profile })
    }

    /// A freshly registered account has no profile; no profile request is made.
    pub async fn register(
        &self,
        email: &str,
        password: &str,
        name: &str,
    ) -> Result<AuthOutcome, ClassifiedError> {
        let response = match self.auth.register(email, password, name).await {
            Ok(response) => response,
            Err(error) => {
                return Err(self.record_failure(RequestContext::Register, &error).await)
            }
        };
        let user = self
            .establish(response, ProfileStatus::Missing, RequestContext::Register)
            .await?;

        info!(user_id = ?user.id, "account registered");
        Ok(AuthOutcome {
            user,
            has_profile: false,
        })
    }

    /// Sign out locally and notify the server. The stored token is removed
    /// before the server call, which carries the old token explicitly. The
    /// server call is best effort.
    pub async fn logout(&self) {
        let credential = {
            let mut state = self.state.lock().await;
            if state.phase == SessionPhase::Unauthenticated && state.credential.is_none() {
                debug!("logout while signed out; nothing to do");
                return;
            }
            let credential = state.credential.take();
            state.sign_out();
            state.last_error = None;
            match &credential {
                Some(token) => {
                    self.transport.revoke_if_current(token).await;
                }
                None => {
                    self.transport.store().clear().await;
                }
            }
            self.publish(&state);
            credential
        };
        let _ = self.events.send(SessionEvent::SignedOut);

        if let Some(token) = credential {
            // The store is already empty, so a 401 here finds nothing to
            // revoke and raises no expiry notice.
            if let Err(error) = self.auth.logout(&token).await {
                warn!(%error, "logout notification failed; local session cleared anyway");
            }
        }
        info!("signed out");
    }

    pub async fn clear_error(&self) {
        let mut state = self.state.lock().await;
        if state.last_error.take().is_some() {
            self.publish(&state);
        }
    }

    /// Submit the onboarding profile. On success the session's profile
    /// status becomes `Present` without another round-trip.
    pub async fn create_profile(&self, profile: &NewProfile) -> Result<Profile, ClassifiedError> {
        profile
            .validate()
            .map_err(|error| ClassifiedError::new(ErrorKind::ValidationError, error.to_string()))?;
        let epoch = self.state.lock().await.epoch;
        let created = self
            .profiles
            .create_profile(profile)
            .await
            .map_err(|error| profile_failure(&error))?;
        self.mark_profile_present(epoch).await;
        Ok(created)
    }

    pub async fn update_profile(
        &self,
        changes: &ProfileChanges,
    ) -> Result<Profile, ClassifiedError> {
        changes
            .validate()
            .map_err(|error| ClassifiedError::new(ErrorKind::ValidationError, error.to_string()))?;
        let epoch = self.state.lock().await.epoch;
        let updated = self
            .profiles
            .update_profile(changes)
            .await
            .map_err(|error| profile_failure(&error))?;
        self.mark_profile_present(epoch).await;
        Ok(updated)
    }

    async fn validate_stored_credential(self: &Arc<Self>) {
        // Read the store and capture the epoch in one critical section so a
        // login landing in between cannot be paired with the older token.
        let (stored, epoch) = {
            let mut state = self.state.lock().await;
            let Some(stored) = self.transport.store().read().await else {
                if state.phase != SessionPhase::Unauthenticated {
                    debug!("no stored credential");
                    let redirect = state.phase == SessionPhase::Authenticated;
                    state.sign_out();
                    self.publish(&state);
                    drop(state);
                    if redirect {
                        let _ = self.events.send(SessionEvent::RedirectToLogin);
                    }
                }
                return;
            };
            if state.credential.is_none() {
                state.credential = Some(stored.token.clone());
            }
            (stored, state.epoch)
        };

        match self.auth.current_user().await {
            Ok(user) => {
                {
                    let mut state = self.state.lock().await;
                    let current = self.transport.store().token().await;
                    if state.epoch != epoch || current.as_deref() != Some(stored.token.as_str()) {
                        debug!("session changed during credential check; result discarded");
                        return;
                    }
                    info!(user_id = ?user.id, "stored credential accepted");
                    if state.phase != SessionPhase::Authenticated {
                        state.profile = ProfileStatus::Unknown;
                    }
                    state.phase = SessionPhase::Authenticated;
                    state.user = Some(user);
                    state.credential = Some(stored.token);
                    self.publish(&state);
                }
                self.check_profile().await;
            }
            Err(error) => {
                info!(%error, "stored credential rejected; signing out");
                self.transport.revoke_if_current(&stored.token).await;

                let mut state = self.state.lock().await;
                if state.epoch != epoch {
                    debug!("session changed during credential check; result discarded");
                    return;
                }
                let redirect = state.phase == SessionPhase::Authenticated;
                state.sign_out();
                self.publish(&state);
                drop(state);
                if redirect {
                    let _ = self.events.send(SessionEvent::RedirectToLogin);
                }
            }
        }
    }

    async fn fetch_profile_status(&self, epoch: u64) -> ProfileStatus {
        let status = match self.profiles.get_profile().await {
            Ok(Some(_)) => ProfileStatus::Present,
            Ok(None) => {
                debug!("no profile yet");
                ProfileStatus::Missing
            }
            Err(error) => {
                warn!(%error, "profile check failed; treating profile as missing");
                ProfileStatus::Missing
            }
        };

        let mut state = self.state.lock().await;
        if state.epoch != epoch || state.phase != SessionPhase::Authenticated {
            debug!("profile check result discarded for superseded session");
            return ProfileStatus::Unknown;
        }
        state.profile = status;
        self.publish(&state);
        status
    }

    async fn establish(
        &self,
        response: TokenResponse,
        profile: ProfileStatus,
        context: RequestContext,
    ) -> Result<UserSummary, ClassifiedError> {
        let TokenResponse {
            access_token, user, ..
        } = response;

        let stored = StoredSession::new(access_token.clone(), user.clone());
        if let Err(error) = self.transport.store().save(&stored).await {
            error!(%error, "failed to persist session credential");
            let classified =
                ClassifiedError::new(ErrorKind::Unclassified, context.fallback_message());
            let mut state = self.state.lock().await;
            state.last_error = Some(classified.clone());
            self.publish(&state);
            return Err(classified);
        }

        {
            let mut state = self.state.lock().await;
            state.sign_in(access_token, user.clone(), profile);
            self.publish(&state);
        }
        let _ = self.events.send(SessionEvent::SignedIn(user.clone()));
        Ok(user)
    }

    async fn record_failure(
        &self,
        context: RequestContext,
        error: &TransportError,
    ) -> ClassifiedError {
        let classified = classify(context, error);
        warn!(?context, kind = ?classified.kind, %error, "authentication request failed");
        let mut state = self.state.lock().await;
        state.last_error = Some(classified.clone());
        self.publish(&state);
        classified
    }

    async fn mark_profile_present(&self, epoch: u64) {
        let mut state = self.state.lock().await;
        if state.epoch == epoch && state.phase == SessionPhase::Authenticated {
            state.profile = ProfileStatus::Present;
            self.publish(&state);
        }
    }

    async fn apply_expiry(&self, notice: ExpiryNotice) {
        let mut state = self.state.lock().await;
        if state.phase != SessionPhase::Authenticated
            || state.credential.as_deref() != Some(notice.token.as_str())
        {
            debug!(path = %notice.path, "expiry notice for superseded session ignored");
            return;
        }
        warn!(path = %notice.path, "session expired; returning to login");
        state.sign_out();
        self.publish(&state);
        drop(state);
        let _ = self.events.send(SessionEvent::RedirectToLogin);
    }

    fn publish(&self, state: &SessionState) {
        self.snapshots.send_replace(state.snapshot());
    }

    fn lock_inflight(&self) -> MutexGuard<'_, InflightChecks> {
        self.inflight.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Drop for SessionController {
    fn drop(&mut self) {
        self.expiry_listener.abort();
    }
}

fn profile_failure(error: &TransportError) -> ClassifiedError {
    let classified = classify(RequestContext::Profile, error);
    warn!(kind = ?classified.kind, %error, "profile request failed");
    classified
}

fn spawn_expiry_listener(
    controller: Weak<SessionController>,
    mut notices: broadcast::Receiver<ExpiryNotice>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            match notices.recv().await {
                Ok(notice) => {
                    let Some(controller) = controller.upgrade() else {
                        break;
                    };
                    controller.apply_expiry(notice).await;
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(skipped, "expiry notices dropped");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    })
}

#[cfg(test)]
#[path = "tests/session_tests.rs"]
mod tests;
