/*
    setlist-catalog | Authenticated catalog search for building DJ setlists.
    Copyright (C) 2025  Israel Alberto Roldan Vega

    This program is free software: you can redistribute it and/or modify
    it under the terms of the GNU Affero General Public License as published
    by the Free Software Foundation, either version 3 of the License, or
    (at your option) any later version.

    This program is distributed in the hope that it will be useful,
    but WITHOUT ANY WARRANTY; without even the implied warranty of
    MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
    GNU Affero General Public License for more details.

    You should have received a copy of the GNU Affero General Public License
    along with this program.  If not, see <https://www.gnu.org/licenses/>.
*/

//! In-memory access token cache.
//!
//! The cache hands out the current token while it is outside the expiry margin.
//! When it has nothing usable, the first caller starts a token request on its own
//! task and every other caller awaits that same request. Dropping a waiting caller
//! never cancels the request.
//!
//! Each stored token arms a timer that clears it once the margin is reached. The
//! timer only holds a `Weak` reference and is cancelled when the token is replaced,
//! invalidated, or the cache goes away.

use crate::error::{CatalogError, Result};
use futures::future::{BoxFuture, FutureExt, Shared};
use log::{debug, info, warn};
use parking_lot::Mutex;
use std::fmt;
use std::future::Future;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Longest lifetime a token is trusted for, whatever the server reports.
pub const MAX_LIFETIME: Duration = Duration::from_secs(10 * 365 * 24 * 60 * 60);

/// Bearer credential issued by the token endpoint.
#[derive(Clone, PartialEq, Eq)]
pub struct Token {
    value: String,
    expires_at: Instant,
}

impl Token {
    /// Lifetimes above [`MAX_LIFETIME`] are clamped to it.
    pub fn new(value: impl Into<String>, lifetime: Duration) -> Self {
        let now = Instant::now();
        // A clock that cannot represent the expiry yields an already expired token.
        let expires_at = now.checked_add(lifetime.min(MAX_LIFETIME)).unwrap_or(now);

        Self {
            value: value.into(),
            expires_at,
        }
    }

    pub fn secret(&self) -> &str {
        &self.value
    }

    pub fn expires_at(&self) -> Instant {
        self.expires_at
    }

    pub fn remaining(&self) -> Duration {
        self.expires_at.saturating_duration_since(Instant::now())
    }

    /// `false` once fewer than `margin` remain before expiry.
    pub fn is_usable(&self, margin: Duration) -> bool {
        self.remaining() > margin
    }
}

impl fmt::Debug for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Token")
            .field("value", &"<redacted>")
            .field("remaining", &self.remaining())
            .finish()
    }
}

type PendingToken = Shared<BoxFuture<'static, Result<Token>>>;

/// Shared token slot with single-flight acquisition. Cloning shares the slot.
#[derive(Clone)]
pub struct TokenCache {
    inner: Arc<CacheInner>,
}

struct CacheInner {
    margin: Duration,
    state: Mutex<CacheState>,
}

#[derive(Default)]
struct CacheState {
    token: Option<Token>,
    // Bumped on every store/invalidate so a stale timer cannot clear a newer token.
    generation: u64,
    in_flight: Option<PendingToken>,
    expiry: Option<CancellationToken>,
}

impl TokenCache {
    pub fn new(margin: Duration) -> Self {
        Self {
            inner: Arc::new(CacheInner {
                margin,
                state: Mutex::new(CacheState::default()),
            }),
        }
    }

    pub fn expiry_margin(&self) -> Duration {
        self.inner.margin
    }

    /// The cached token, if it is still outside the expiry margin.
    pub fn current(&self) -> Option<Token> {
        let state = self.inner.state.lock();
        state
            .token
            .as_ref()
            .filter(|token| token.is_usable(self.inner.margin))
            .cloned()
    }

    pub fn is_refreshing(&self) -> bool {
        self.inner.state.lock().in_flight.is_some()
    }

    /// Returns the cached token or waits for the single in-flight request.
    ///
    /// `fetch` is only called when no usable token is cached and no request is
    /// already running. Its future runs on a spawned task, so it keeps going even
    /// if the caller that started it is dropped. A failed request leaves the cache
    /// empty; the next call starts a new one.
    pub async fn get_or_fetch<F, Fut>(&self, fetch: F) -> Result<Token>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Token>> + Send + 'static,
    {
        let pending = {
            let mut state = self.inner.state.lock();

            if let Some(token) = state
                .token
                .as_ref()
                .filter(|token| token.is_usable(self.inner.margin))
            {
                return Ok(token.clone());
            }

            match &state.in_flight {
                Some(pending) => {
                    debug!("Joining in-flight token request");
                    pending.clone()
                }
                None => {
                    debug!("No usable token cached, requesting a new one");
                    let pending = spawn_request(&self.inner, fetch());
                    state.in_flight = Some(pending.clone());
                    pending
                }
            }
        };

        pending.await
    }

    /// Replaces the cached token and re-arms the expiry timer.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn store(&self, token: Token) {
        let mut state = self.inner.state.lock();
        install(&self.inner, &mut state, token);
    }

    /// Drops the cached token so the next caller requests a fresh one.
    pub fn invalidate(&self) {
        clear(&mut self.inner.state.lock());
    }

    /// Like [`TokenCache::invalidate`], but only if `rejected` is still the cached
    /// token. A token minted after the rejected one was sent stays in place.
    pub fn invalidate_if_current(&self, rejected: &Token) -> bool {
        let mut state = self.inner.state.lock();
        let is_current = state.token.as_ref() == Some(rejected);
        if is_current {
            clear(&mut state);
        }
        is_current
    }
}

impl fmt::Debug for TokenCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.inner.state.lock();
        f.debug_struct("TokenCache")
            .field("margin", &self.inner.margin)
            .field("token", &state.token)
            .field("refreshing", &state.in_flight.is_some())
            .finish()
    }
}

impl CacheInner {
    fn expire(&self, generation: u64) {
        let mut state = self.state.lock();
        if state.generation == generation && state.token.is_some() {
            info!("Access token reached its refresh window, dropping it");
            state.token = None;
            state.expiry = None;
        }
    }
}

impl Drop for CacheInner {
    fn drop(&mut self) {
        if let Some(expiry) = self.state.get_mut().expiry.take() {
            expiry.cancel();
        }
    }
}

fn spawn_request<Fut>(inner: &Arc<CacheInner>, request: Fut) -> PendingToken
where
    Fut: Future<Output = Result<Token>> + Send + 'static,
{
    let cache = Arc::downgrade(inner);
    let handle = tokio::spawn(async move {
        let mut guard = InFlightGuard {
            cache: cache.clone(),
            armed: true,
        };

        let result = request.await;
        guard.armed = false;

        if let Some(inner) = cache.upgrade() {
            let mut state = inner.state.lock();
            state.in_flight = None;
            if let Ok(token) = &result {
                install(&inner, &mut state, token.clone());
            }
        }
        result
    });

    async move {
        match handle.await {
            Ok(result) => result,
            Err(err) => {
                warn!("Token request task failed: {}", err);
                Err(CatalogError::TokenRequest {
                    status: 0,
                    body: format!("token request did not complete: {}", err),
                })
            }
        }
    }
    .boxed()
    .shared()
}

/// Frees the in-flight slot when the request task unwinds or is aborted.
struct InFlightGuard {
    cache: Weak<CacheInner>,
    armed: bool,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        if let Some(inner) = self.cache.upgrade() {
            inner.state.lock().in_flight = None;
        }
    }
}

fn clear(state: &mut CacheState) {
    if state.token.take().is_some() {
        info!("Access token invalidated");
    }
    state.generation += 1;
    if let Some(expiry) = state.expiry.take() {
        expiry.cancel();
    }
}

fn install(inner: &Arc<CacheInner>, state: &mut CacheState, token: Token) {
    if let Some(previous) = state.expiry.take() {
        previous.cancel();
    }

    state.generation += 1;
    let generation = state.generation;
    let delay = token.remaining().saturating_sub(inner.margin);
    debug!("Access token stored, refresh window opens in {:?}", delay);
    state.token = Some(token);

    let cancel = CancellationToken::new();
    state.expiry = Some(cancel.clone());

    let cache = Arc::downgrade(inner);
    tokio::spawn(async move {
        tokio::select! {
            _ = cancel.cancelled() => {}
            _ = tokio::time::sleep(delay) => {
                if let Some(inner) = cache.upgrade() {
                    inner.expire(generation);
                }
            }
        }
    });
}
