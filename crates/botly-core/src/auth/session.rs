//! Session state machine.
//!
//! ```text
//! Unauthenticated --login/register--> Validating --ok--> Authenticated
//!        ^                                 |                  |
//!        +-------- failure / 401 ----------+                  |
//!        +------------- logout / 401 on re-validation --------+
//! ```
//!
//! Each authenticated lifetime has an epoch. Logout and invalidation bump it,
//! and any pending transition or timer tick holding an older epoch drops its
//! result instead of touching the store.

use std::future::Future;
use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use super::error::CallContext;
use super::{validation, Credential, CredentialStore, SessionError};
use crate::api::{ApiError, ApiGateway, GatewayOptions};
use crate::models::Identity;

/// How often `/auth/me` is re-checked while signed in.
pub const DEFAULT_REVALIDATE_INTERVAL: Duration = Duration::from_secs(60 * 60);

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionState {
    Unauthenticated,
    Validating,
    Authenticated(Identity),
    /// A credential was obtained but the identity could not be confirmed.
    Error(String),
}

impl SessionState {
    pub fn is_authenticated(&self) -> bool {
        matches!(self, SessionState::Authenticated(_))
    }

    pub fn identity(&self) -> Option<&Identity> {
        match self {
            SessionState::Authenticated(identity) => Some(identity),
            _ => None,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            SessionState::Unauthenticated => "signed out",
            SessionState::Validating => "validating",
            SessionState::Authenticated(_) => "signed in",
            SessionState::Error(_) => "error",
        }
    }
}

#[derive(Debug, Clone)]
pub struct SessionOptions {
    pub gateway: GatewayOptions,
    pub revalidate_interval: Duration,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            gateway: GatewayOptions::default(),
            revalidate_interval: DEFAULT_REVALIDATE_INTERVAL,
        }
    }
}

/// Epoch captured when a request was issued.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionTicket {
    epoch: u64,
}

#[derive(Default)]
struct Lifetime {
    epoch: u64,
    timer: Option<JoinHandle<()>>,
}

struct Inner {
    gateway: ApiGateway,
    store: Arc<dyn CredentialStore>,
    state: watch::Sender<SessionState>,
    /// Held for the whole of login/register/restore.
    transition: tokio::sync::Mutex<()>,
    lifetime: Mutex<Lifetime>,
    revalidate_interval: Duration,
}

/// Owns the session state and the only operations that change it.
/// Clone is cheap and every clone drives the same session.
#[derive(Clone)]
pub struct SessionManager {
    inner: Arc<Inner>,
}

impl SessionManager {
    /// Starts in `Validating` when a token is already stored, otherwise in
    /// `Unauthenticated`. Call [`restore`](Self::restore) to settle it.
    pub fn new(options: SessionOptions, store: Arc<dyn CredentialStore>) -> Result<Self, ApiError> {
        let gateway = ApiGateway::new(options.gateway, Arc::clone(&store))?;
        let initial = if store.get().is_some() {
            SessionState::Validating
        } else {
            SessionState::Unauthenticated
        };
        debug!(state = initial.label(), "Session manager created");
        let (state, _) = watch::channel(initial);

        Ok(Self {
            inner: Arc::new(Inner {
                gateway,
                store,
                state,
                transition: tokio::sync::Mutex::new(()),
                lifetime: Mutex::new(Lifetime::default()),
                revalidate_interval: options.revalidate_interval,
            }),
        })
    }

    /// For calls that need no session, such as the public widget endpoints.
    pub fn gateway(&self) -> &ApiGateway {
        &self.inner.gateway
    }

    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.inner.state.subscribe()
    }

    pub fn state(&self) -> SessionState {
        self.inner.state.borrow().clone()
    }

    pub fn identity(&self) -> Option<Identity> {
        self.inner.state.borrow().identity().cloned()
    }

    pub fn is_authenticated(&self) -> bool {
        self.inner.state.borrow().is_authenticated()
    }

    pub fn has_stored_credential(&self) -> bool {
        self.inner.store.get().is_some()
    }

    pub fn is_revalidation_armed(&self) -> bool {
        self.inner
            .lifetime
            .lock()
            .map(|lifetime| lifetime.timer.as_ref().is_some_and(|t| !t.is_finished()))
            .unwrap_or(false)
    }

    fn begin_transition(&self) -> Result<tokio::sync::MutexGuard<'_, ()>, SessionError> {
        self.inner.transition.try_lock().map_err(|_| {
            debug!("Session transition already in progress, ignoring request");
            SessionError::TransitionInProgress
        })
    }

    /// Validate the stored token against `/auth/me`.
    ///
    /// A 401/403 clears the token. Any other failure leaves the session
    /// signed out but keeps the token so a later call can retry.
    pub async fn restore(&self) -> Result<Identity, SessionError> {
        let _guard = self.begin_transition()?;
        if let Some(identity) = self.identity() {
            return Ok(identity);
        }

        let epoch = self.inner.current_epoch();
        if self.inner.store.get().is_none() {
            self.inner.settle(epoch, SessionState::Unauthenticated);
            return Err(SessionError::NotAuthenticated);
        }

        info!("Validating stored credential");
        self.inner.settle(epoch, SessionState::Validating);
        match self.inner.gateway.current_user().await {
            Ok(identity) => {
                if self.inner.commit_authenticated(epoch, identity.clone()) {
                    info!(user_id = identity.id, "Stored credential is valid");
                    Ok(identity)
                } else {
                    Err(SessionError::NotAuthenticated)
                }
            }
            Err(e) if e.is_definitive_rejection() => {
                info!(status = ?e.status(), "Stored credential rejected, clearing it");
                self.inner.invalidate(epoch);
                Err(SessionError::Unauthorized)
            }
            Err(e) => {
                warn!(error = %e, "Could not validate stored credential, keeping it for retry");
                self.inner.settle(epoch, SessionState::Unauthenticated);
                Err(SessionError::from_api(e, CallContext::Authenticated))
            }
        }
    }

    /// Retry after an ambiguous failure left a token stored.
    pub async fn retry_validation(&self) -> Result<Identity, SessionError> {
        self.restore().await
    }

    pub async fn login(&self, email: &str, password: &str) -> Result<Identity, SessionError> {
        validation::validate_login(email, password)?;
        let _guard = self.begin_transition()?;
        if let Some(identity) = self.identity() {
            return Err(SessionError::AlreadyAuthenticated(identity.email));
        }

        let epoch = self.inner.current_epoch();
        self.inner.settle(epoch, SessionState::Validating);
        self.authenticate(epoch, email.trim(), password).await
    }

    /// Create an account, then sign in with the same credentials.
    pub async fn register(
        &self,
        email: &str,
        password: &str,
        api_key: &str,
    ) -> Result<Identity, SessionError> {
        validation::validate_registration(email, password, api_key)?;
        let _guard = self.begin_transition()?;
        if let Some(identity) = self.identity() {
            return Err(SessionError::AlreadyAuthenticated(identity.email));
        }

        let epoch = self.inner.current_epoch();
        self.inner.settle(epoch, SessionState::Validating);
        let email = email.trim();
        match self.inner.gateway.register(email, password, api_key).await {
            Ok(created) => info!(user_id = created.id, "Account created"),
            Err(e) => {
                warn!(error = %e, "Registration failed");
                self.inner.settle(epoch, SessionState::Unauthenticated);
                return Err(SessionError::from_api(e, CallContext::Register));
            }
        }
        self.authenticate(epoch, email, password).await
    }

    /// Token exchange and identity fetch shared by login and register.
    async fn authenticate(
        &self,
        epoch: u64,
        email: &str,
        password: &str,
    ) -> Result<Identity, SessionError> {
        let token = match self.inner.gateway.login(email, password).await {
            Ok(token) => token,
            Err(e) => {
                warn!(error = %e, "Login failed");
                self.inner.settle(epoch, SessionState::Unauthenticated);
                return Err(SessionError::from_api(e, CallContext::Login));
            }
        };

        if !self.inner.store_credential(epoch, &token.access_token) {
            debug!("Login superseded by logout, discarding token");
            return Err(SessionError::NotAuthenticated);
        }

        match self.inner.gateway.current_user().await {
            Ok(identity) => {
                if self.inner.commit_authenticated(epoch, identity.clone()) {
                    info!(user_id = identity.id, "Login successful");
                    Ok(identity)
                } else {
                    Err(SessionError::NotAuthenticated)
                }
            }
            Err(e) if e.is_definitive_rejection() => {
                warn!(status = ?e.status(), "Fresh token rejected by /auth/me");
                self.inner.invalidate(epoch);
                Err(SessionError::Unauthorized)
            }
            Err(e) => {
                warn!(error = %e, "Signed in but could not load the profile");
                let err = SessionError::from_api(e, CallContext::Authenticated);
                self.inner.settle(epoch, SessionState::Error(err.to_string()));
                Err(err)
            }
        }
    }

    /// Sign out: stop re-validation, forget the token and the identity.
    pub fn logout(&self) {
        if let Ok(mut lifetime) = self.inner.lifetime.lock() {
            self.inner.end_session(&mut lifetime);
            info!("Logged out");
        }
    }

    /// Identifies the session a request is issued under. Take one before
    /// calling the gateway directly and hand it to
    /// [`handle_response`](Self::handle_response) with the result.
    pub fn ticket(&self) -> SessionTicket {
        SessionTicket {
            epoch: self.inner.current_epoch(),
        }
    }

    /// Run a resource call under the current session.
    pub async fn call<T, F, Fut>(&self, f: F) -> Result<T, SessionError>
    where
        F: FnOnce(ApiGateway) -> Fut,
        Fut: Future<Output = Result<T, ApiError>>,
    {
        if !self.is_authenticated() {
            return Err(SessionError::NotAuthenticated);
        }
        let ticket = self.ticket();
        let result = f(self.inner.gateway.clone()).await;
        self.inner.settle_response(ticket.epoch, result)
    }

    /// Report the outcome of a resource call made directly on the gateway.
    ///
    /// A 401/403 ends the session `ticket` was taken in, and only if it is
    /// still the current one. Other failures are mapped without side effects.
    pub fn handle_response<T>(
        &self,
        ticket: SessionTicket,
        result: Result<T, ApiError>,
    ) -> Result<T, SessionError> {
        if !self.is_authenticated() {
            return result.map_err(|e| SessionError::from_api(e, CallContext::Authenticated));
        }
        self.inner.settle_response(ticket.epoch, result)
    }

    /// Set a new OpenAI key on the account (`PUT /auth/me`).
    pub async fn update_secret(&self, api_key: &str) -> Result<Identity, SessionError> {
        validation::validate_api_key(api_key)?;
        let epoch = self.inner.current_epoch();
        let key = api_key.to_string();
        let identity = self
            .call(|api| async move { api.update_current_user(&key).await })
            .await?;
        self.inner.refresh_identity(epoch, identity.clone());
        Ok(identity)
    }
}

impl Inner {
    fn current_epoch(&self) -> u64 {
        self.lifetime.lock().map(|l| l.epoch).unwrap_or(u64::MAX)
    }

    fn publish(&self, next: SessionState) {
        self.state.send_if_modified(|current| {
            if *current == next {
                false
            } else {
                debug!(from = current.label(), to = next.label(), "Session state changed");
                *current = next;
                true
            }
        });
    }

    /// Publish `next` if `epoch` is still current.
    fn settle(&self, epoch: u64, next: SessionState) -> bool {
        let Ok(lifetime) = self.lifetime.lock() else {
            return false;
        };
        if lifetime.epoch != epoch {
            return false;
        }
        self.publish(next);
        true
    }

    fn store_credential(&self, epoch: u64, credential: &Credential) -> bool {
        let Ok(lifetime) = self.lifetime.lock() else {
            return false;
        };
        if lifetime.epoch != epoch {
            return false;
        }
        self.store.set(credential);
        true
    }

    /// Enter `Authenticated` and arm re-validation, unless superseded.
    fn commit_authenticated(self: &Arc<Self>, epoch: u64, identity: Identity) -> bool {
        let Ok(mut lifetime) = self.lifetime.lock() else {
            return false;
        };
        if lifetime.epoch != epoch {
            return false;
        }
        if let Some(stale) = lifetime.timer.take() {
            stale.abort();
        }
        lifetime.timer = Some(tokio::spawn(revalidation_loop(
            Arc::downgrade(self),
            epoch,
            self.revalidate_interval,
        )));
        self.publish(SessionState::Authenticated(identity));
        true
    }

    fn refresh_identity(&self, epoch: u64, identity: Identity) {
        let Ok(lifetime) = self.lifetime.lock() else {
            return;
        };
        if lifetime.epoch == epoch && self.state.borrow().is_authenticated() {
            self.publish(SessionState::Authenticated(identity));
        }
    }

    /// A 401/403 ends the session the call was issued under, never a newer one.
    fn settle_response<T>(&self, epoch: u64, result: Result<T, ApiError>) -> Result<T, SessionError> {
        match result {
            Ok(value) => Ok(value),
            Err(e) if e.is_definitive_rejection() => {
                if self.invalidate(epoch) {
                    info!(status = ?e.status(), "Credential rejected by resource call, signed out");
                }
                Err(SessionError::Unauthorized)
            }
            Err(e) => Err(SessionError::from_api(e, CallContext::Authenticated)),
        }
    }

    /// End the session `epoch` belongs to. Returns false if it already ended.
    fn invalidate(&self, epoch: u64) -> bool {
        let Ok(mut lifetime) = self.lifetime.lock() else {
            return false;
        };
        if lifetime.epoch != epoch {
            return false;
        }
        self.end_session(&mut lifetime);
        true
    }

    /// Timer goes first so nothing observes the new state with it armed.
    fn end_session(&self, lifetime: &mut Lifetime) {
        lifetime.epoch = lifetime.epoch.wrapping_add(1);
        if let Some(timer) = lifetime.timer.take() {
            timer.abort();
        }
        self.store.clear();
        self.publish(SessionState::Unauthenticated);
    }
}

impl Drop for Inner {
    fn drop(&mut self) {
        if let Ok(lifetime) = self.lifetime.get_mut() {
            if let Some(timer) = lifetime.timer.take() {
                timer.abort();
            }
        }
    }
}

async fn revalidation_loop(inner: Weak<Inner>, epoch: u64, period: Duration) {
    let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        ticker.tick().await;
        let Some(inner) = inner.upgrade() else {
            return;
        };
        if inner.current_epoch() != epoch {
            return;
        }

        match inner.gateway.current_user().await {
            Ok(identity) => inner.refresh_identity(epoch, identity),
            Err(e) if e.is_definitive_rejection() => {
                if inner.invalidate(epoch) {
                    info!(status = ?e.status(), "Credential rejected during re-validation, signed out");
                }
                return;
            }
            Err(e) => debug!(error = %e, "Re-validation inconclusive, keeping session"),
        }
    }
}
