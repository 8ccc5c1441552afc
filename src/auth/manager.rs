//! Access/refresh token lifecycle
//!
//! `TokenManager` is the single owner of the current token record. Callers
//! ask for an access token and either get one that is not about to expire,
//! or `None` when re-authentication is required. Refresh happens lazily on
//! the first call that notices the token is stale, and concurrent callers
//! share that one refresh instead of each hitting the token endpoint.

use futures::future::{BoxFuture, FutureExt, Shared};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::time::Duration;

use super::exchange::{ExchangeError, TokenExchange};
use super::tokens::AuthTokens;
use crate::clock::Clock;
use crate::storage::{self, KeyValueStore};

/// Storage key of the persisted token record.
pub const TOKEN_KEY: &str = "auth_tokens";

/// Token state transitions reported to observers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenEvent {
    /// Tokens were set from outside (login, import)
    Acquired,
    /// A refresh replaced the access token
    Refreshed,
    /// Tokens were dropped (logout, failed refresh, explicit clear)
    Cleared,
}

type Listener = Arc<dyn Fn(TokenEvent) + Send + Sync>;
type RefreshFuture = Shared<BoxFuture<'static, Option<String>>>;

#[derive(Default)]
struct State {
    tokens: Option<AuthTokens>,
    in_flight: Option<RefreshFuture>,
    /// Bumped on every clear; a refresh started under an older generation
    /// must not write its result back.
    generation: u64,
}

struct Inner {
    store: Arc<dyn KeyValueStore>,
    exchange: Arc<dyn TokenExchange>,
    clock: Arc<dyn Clock>,
    refresh_timeout: Duration,
    state: Mutex<State>,
    listeners: Mutex<Vec<(u64, Listener)>>,
    next_listener_id: AtomicU64,
}

/// Handle returned by [`TokenManager::on_token_change`].
pub struct Subscription {
    id: u64,
    inner: Weak<Inner>,
}

impl Subscription {
    /// Stop receiving events.
    pub fn unsubscribe(self) {
        if let Some(inner) = self.inner.upgrade() {
            inner.lock_listeners().retain(|(id, _)| *id != self.id);
        }
    }
}

/// Owner of the OAuth token record. Cheap to clone; clones share state.
#[derive(Clone)]
pub struct TokenManager {
    inner: Arc<Inner>,
}

impl TokenManager {
    pub fn new(
        store: Arc<dyn KeyValueStore>,
        exchange: Arc<dyn TokenExchange>,
        clock: Arc<dyn Clock>,
        refresh_timeout: Duration,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                store,
                exchange,
                clock,
                refresh_timeout,
                state: Mutex::new(State::default()),
                listeners: Mutex::new(Vec::new()),
                next_listener_id: AtomicU64::new(0),
            }),
        }
    }

    /// Load any persisted record into memory.
    pub fn init(&self) {
        match self.inner.current() {
            Some(tokens) => tracing::debug!("Loaded persisted tokens ({:?})", tokens),
            None => tracing::debug!("No persisted tokens"),
        }
    }

    /// Drop observers and forget any in-flight refresh marker.
    pub fn dispose(&self) {
        self.inner.lock_listeners().clear();
        self.inner.lock_state().in_flight = None;
    }

    /// Replace the token record wholesale and persist it.
    pub fn set_tokens(&self, tokens: AuthTokens) {
        self.inner.store_tokens(tokens, TokenEvent::Acquired);
    }

    /// Current access token, refreshed first if it is within five minutes
    /// of expiry. `None` means the user has to log in again.
    pub async fn get_access_token(&self) -> Option<String> {
        let tokens = self.inner.current()?;
        if tokens.is_expired(self.inner.clock.now_ms()) {
            tracing::debug!("Access token stale, refreshing");
            return self.refresh(false).await;
        }
        Some(tokens.access_token)
    }

    /// Exchange the refresh token for a new access token.
    ///
    /// Without a refresh token, or when the exchange fails or times out, all
    /// token state is cleared and `None` is returned. Concurrent calls join
    /// the refresh already in flight.
    pub async fn refresh_access_token(&self) -> Option<String> {
        self.refresh(true).await
    }

    /// Join or start a refresh. Unless `force` is set, a token that became
    /// fresh while the caller waited for the lock is returned as is.
    async fn refresh(&self, force: bool) -> Option<String> {
        let refresh = {
            let mut state = self.inner.lock_state();
            if let Some(in_flight) = state.in_flight.clone() {
                tracing::debug!("Joining in-flight token refresh");
                in_flight
            } else {
                let held = self.inner.held(&mut state);
                if !force {
                    let now = self.inner.clock.now_ms();
                    if let Some(tokens) = held.as_ref().filter(|t| !t.is_expired(now)) {
                        tracing::debug!("Token already refreshed by another caller");
                        return Some(tokens.access_token.clone());
                    }
                }

                let refresh_token = held
                    .and_then(|t| t.refresh_token)
                    .filter(|rt| !rt.is_empty());
                let Some(refresh_token) = refresh_token else {
                    drop(state);
                    tracing::info!("No refresh token held; re-authentication required");
                    self.inner.clear();
                    return None;
                };

                let inner = Arc::clone(&self.inner);
                let generation = state.generation;
                let fut = async move { inner.run_refresh(refresh_token, generation).await }
                    .boxed()
                    .shared();
                state.in_flight = Some(fut.clone());
                fut
            }
        };

        refresh.await
    }

    /// Drop in-memory and persisted tokens. Never fails.
    pub fn clear_tokens(&self) {
        self.inner.clear();
    }

    /// Copy of the held record, loading it from storage if needed.
    pub fn snapshot(&self) -> Option<AuthTokens> {
        self.inner.current()
    }

    /// Register an observer for token transitions.
    pub fn on_token_change<F>(&self, callback: F) -> Subscription
    where
        F: Fn(TokenEvent) + Send + Sync + 'static,
    {
        let id = self.inner.next_listener_id.fetch_add(1, Ordering::Relaxed);
        self.inner.lock_listeners().push((id, Arc::new(callback)));
        Subscription {
            id,
            inner: Arc::downgrade(&self.inner),
        }
    }
}

impl Inner {
    fn lock_state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn lock_listeners(&self) -> MutexGuard<'_, Vec<(u64, Listener)>> {
        self.listeners.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn current(&self) -> Option<AuthTokens> {
        let mut state = self.lock_state();
        self.held(&mut state)
    }

    /// Held record, falling back to storage when memory is empty.
    fn held(&self, state: &mut State) -> Option<AuthTokens> {
        if state.tokens.is_none() {
            state.tokens = self.load_persisted();
        }
        state.tokens.clone()
    }

    fn load_persisted(&self) -> Option<AuthTokens> {
        match storage::load_json::<AuthTokens>(self.store.as_ref(), TOKEN_KEY) {
            Ok(tokens) => tokens.filter(|t| !t.access_token.is_empty()),
            Err(e) => {
                tracing::warn!("Ignoring unreadable token record: {}", e);
                None
            }
        }
    }

    fn store_tokens(&self, tokens: AuthTokens, event: TokenEvent) {
        self.lock_state().tokens = Some(tokens.clone());
        if let Err(e) = storage::save_json(self.store.as_ref(), TOKEN_KEY, &tokens) {
            tracing::warn!("Failed to persist tokens (kept in memory): {}", e);
        }
        self.notify(event);
    }

    fn clear(&self) {
        let mut state = self.lock_state();
        let dropped = self.clear_locked(&mut state);
        drop(state);
        self.cleared(dropped);
    }

    /// Forget memory and storage, invalidating any refresh in flight.
    /// Returns whether anything was actually held or persisted.
    fn clear_locked(&self, state: &mut State) -> bool {
        state.generation += 1;
        state.in_flight = None;
        let held = state.tokens.take().is_some();
        let persisted = matches!(self.store.get(TOKEN_KEY), Ok(Some(_)));
        if let Err(e) = self.store.remove(TOKEN_KEY) {
            tracing::warn!("Failed to remove persisted tokens: {}", e);
        }
        held || persisted
    }

    fn cleared(&self, dropped: bool) {
        if dropped {
            tracing::info!("Tokens cleared");
            self.notify(TokenEvent::Cleared);
        }
    }

    async fn run_refresh(self: Arc<Self>, refresh_token: String, generation: u64) -> Option<String> {
        tracing::info!("Refreshing access token...");

        let outcome =
            match tokio::time::timeout(self.refresh_timeout, self.exchange.refresh(&refresh_token))
                .await
            {
                Ok(outcome) => outcome,
                Err(_) => Err(ExchangeError::Timeout),
            };

        let mut state = self.lock_state();
        if state.generation != generation {
            tracing::info!("Tokens cleared during refresh; discarding result");
            return None;
        }
        state.in_flight = None;

        match outcome {
            Ok(grant) => {
                let rotated = grant.refresh_token.filter(|rt| !rt.is_empty());
                let tokens = AuthTokens::from_expires_in(
                    grant.access_token,
                    rotated.or(Some(refresh_token)),
                    grant.expires_in,
                    self.clock.now_ms(),
                );
                let access_token = tokens.access_token.clone();
                // Same critical section as the generation check
                state.tokens = Some(tokens.clone());
                if let Err(e) = storage::save_json(self.store.as_ref(), TOKEN_KEY, &tokens) {
                    tracing::warn!("Failed to persist tokens (kept in memory): {}", e);
                }
                drop(state);
                self.notify(TokenEvent::Refreshed);
                tracing::info!("Token refresh complete");
                Some(access_token)
            }
            Err(e) => {
                tracing::warn!("Token refresh failed: {}", e);
                let dropped = self.clear_locked(&mut state);
                drop(state);
                self.cleared(dropped);
                None
            }
        }
    }

    fn notify(&self, event: TokenEvent) {
        // Snapshot so callbacks may (un)subscribe without deadlocking
        let listeners: Vec<Listener> = self
            .lock_listeners()
            .iter()
            .map(|(_, l)| Arc::clone(l))
            .collect();
        for listener in listeners {
            listener(event);
        }
    }
}
