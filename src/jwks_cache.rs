//! JWKS cache with scheduled and rate-limited on-demand refresh.
//!
//! Keys live in an `Arc<KeySet>` that is swapped wholesale, so a lookup sees
//! either the set before a refresh or the one after it.
//!
//! Refreshing is a small state machine guarded by an async mutex around
//! [`RefreshState`]: holding the guard is the *refreshing* phase, releasing it
//! returns to *idle*. Lookups for an unknown `kid` queue on the guard, so
//! concurrent misses coalesce into a single fetch, and a new attempt is only
//! made once `rate_limit` has elapsed since the previous one completed. The
//! same rule applies to the scheduled refresh.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use std::time::Instant;

use tokio::sync::Mutex;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use tracing::info;
use tracing::warn;

use crate::config::RefreshOptions;
use crate::error::Error;
use crate::error::Result;
use crate::key_source::KeySet;
use crate::key_source::KeySource;
use crate::key_source::VerificationKey;
use crate::sink::ErrorSink;

/// Refresh bookkeeping of a [`JwksCache`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RefreshState {
    /// Completion of the last refresh that replaced the key set, including
    /// the initial load
    pub last_successful_refresh: Option<Instant>,
    /// Completion of the last refresh attempt, successful or not. The
    /// initial load is not counted.
    pub last_refresh_attempt: Option<Instant>,
    pub attempts: u64,
    pub failures: u64,
}

impl RefreshState {
    fn rate_limited(&self, rate_limit: Duration) -> bool {
        self.last_refresh_attempt
            .is_some_and(|completed| completed.elapsed() < rate_limit)
    }
}

#[derive(Debug, Clone, Copy)]
enum RefreshTrigger {
    UnknownKey,
    Scheduled,
}

impl fmt::Display for RefreshTrigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnknownKey => f.write_str("unknown_kid"),
            Self::Scheduled => f.write_str("scheduled"),
        }
    }
}

struct Shared {
    keys: RwLock<Arc<KeySet>>,
    refresh: Arc<Mutex<RefreshState>>,
    source: Arc<dyn KeySource>,
    sink: Arc<dyn ErrorSink>,
    options: RefreshOptions,
}

impl Shared {
    async fn current(&self) -> Arc<KeySet> {
        Arc::clone(&*self.keys.read().await)
    }

    async fn find(&self, kid: &str) -> Option<VerificationKey> {
        self.keys.read().await.get(kid).cloned()
    }

    /// Run one refresh. `state` must come from the `refresh` guard.
    async fn refresh_locked(&self, state: &mut RefreshState, trigger: RefreshTrigger) -> Result<()> {
        let fetched = fetch_with_timeout(self.source.as_ref(), self.options.refresh_timeout).await;

        state.attempts += 1;
        state.last_refresh_attempt = Some(Instant::now());

        match fetched {
            Ok(key_set) => {
                let key_count = key_set.len();
                *self.keys.write().await = Arc::new(key_set);
                state.last_successful_refresh = state.last_refresh_attempt;

                info!(
                    source = %self.source.describe(),
                    trigger = %trigger,
                    key_count,
                    "JWKS cache refreshed"
                );
                Ok(())
            }
            Err(error) => {
                state.failures += 1;
                self.sink.report(&error);
                Err(error)
            }
        }
    }

    async fn scheduled_refresh(&self) {
        let mut state = self.refresh.lock().await;

        if state.rate_limited(self.options.rate_limit) {
            debug!("Skipping scheduled JWKS refresh, last attempt is within the rate limit");
            return;
        }

        if let Err(error) = self
            .refresh_locked(&mut state, RefreshTrigger::Scheduled)
            .await
        {
            debug!(error = %error, "Scheduled JWKS refresh failed, keeping current keys");
        }
    }
}

async fn fetch_with_timeout(source: &dyn KeySource, timeout: Duration) -> Result<KeySet> {
    match tokio::time::timeout(timeout, source.fetch()).await {
        Ok(result) => result,
        Err(_) => Err(Error::KeySource(format!(
            "Fetching keys from {} timed out after {timeout:?}",
            source.describe()
        ))),
    }
}

/// Cache of signing keys indexed by key ID
///
/// Dropping the cache stops its scheduled refresh.
pub struct JwksCache {
    shared: Arc<Shared>,
    cancel_token: CancellationToken,
    refresh_handle: Mutex<Option<JoinHandle<()>>>,
}

impl JwksCache {
    /// Load the initial key set and, for polling sources, start the scheduled refresh
    ///
    /// # Errors
    /// Returns `Error::KeySource` if the initial load fails or times out
    pub async fn new(
        source: Arc<dyn KeySource>,
        options: RefreshOptions,
        sink: Arc<dyn ErrorSink>,
    ) -> Result<Self> {
        let initial = fetch_with_timeout(source.as_ref(), options.refresh_timeout).await?;

        info!(
            source = %source.describe(),
            key_count = initial.len(),
            polling = source.is_polling(),
            "JWKS cache initialized"
        );

        let state = RefreshState {
            last_successful_refresh: Some(Instant::now()),
            ..RefreshState::default()
        };

        let schedule = source.is_polling() && !options.refresh_interval.is_zero();

        let shared = Arc::new(Shared {
            keys: RwLock::new(Arc::new(initial)),
            refresh: Arc::new(Mutex::new(state)),
            source,
            sink,
            options,
        });

        let cancel_token = CancellationToken::new();
        let refresh_handle = if schedule {
            Some(spawn_scheduled_refresh(
                Arc::clone(&shared),
                cancel_token.clone(),
            ))
        } else {
            None
        };

        Ok(Self {
            shared,
            cancel_token,
            refresh_handle: Mutex::new(refresh_handle),
        })
    }

    /// Get the verification key for `kid`
    ///
    /// A miss on a polling source triggers at most one refresh per rate-limit
    /// window, shared by all concurrent callers, then retries once.
    ///
    /// # Errors
    /// Returns `Error::UnknownKey` if the key is still unknown
    pub async fn lookup(&self, kid: &str) -> Result<VerificationKey> {
        if let Some(key) = self.shared.find(kid).await {
            return Ok(key);
        }

        if !self.shared.source.is_polling() {
            debug!(kid = %kid, "Key not found in static key set");
            return Err(Error::UnknownKey(kid.to_string()));
        }

        self.refresh_on_miss(kid).await
    }

    async fn refresh_on_miss(&self, kid: &str) -> Result<VerificationKey> {
        let guard = Arc::clone(&self.shared.refresh).lock_owned().await;

        // Another caller may have refreshed while this one was waiting.
        if let Some(key) = self.shared.find(kid).await {
            return Ok(key);
        }

        if guard.rate_limited(self.shared.options.rate_limit) {
            debug!(kid = %kid, "Key not found, JWKS refresh is rate limited");
            return Err(Error::UnknownKey(kid.to_string()));
        }

        debug!(kid = %kid, "Key not found in cache, refreshing JWKS");

        // Detached so the refresh completes even if this caller goes away.
        let shared = Arc::clone(&self.shared);
        let refresh = tokio::spawn(async move {
            let mut guard = guard;
            shared
                .refresh_locked(&mut guard, RefreshTrigger::UnknownKey)
                .await
        });

        match refresh.await {
            Ok(Ok(())) => {}
            Ok(Err(error)) => {
                debug!(kid = %kid, error = %error, "JWKS refresh for unknown kid failed");
            }
            Err(error) => {
                warn!(kid = %kid, error = %error, "JWKS refresh task failed");
            }
        }

        self.shared
            .find(kid)
            .await
            .ok_or_else(|| Error::UnknownKey(kid.to_string()))
    }

    /// The key set currently in use
    pub async fn current_keys(&self) -> Arc<KeySet> {
        self.shared.current().await
    }

    /// Key IDs currently cached, sorted
    pub async fn key_ids(&self) -> Vec<String> {
        self.shared.current().await.key_ids()
    }

    pub fn is_polling(&self) -> bool {
        self.shared.source.is_polling()
    }

    pub fn options(&self) -> RefreshOptions {
        self.shared.options
    }

    /// Snapshot of the refresh bookkeeping. Waits for a refresh in progress.
    pub async fn refresh_state(&self) -> RefreshState {
        *self.shared.refresh.lock().await
    }

    /// Stop the scheduled refresh and wait for it to finish
    pub async fn shutdown(&self) {
        self.cancel_token.cancel();

        let handle = self.refresh_handle.lock().await.take();
        if let Some(handle) = handle {
            if let Err(error) = handle.await {
                warn!(error = %error, "Scheduled JWKS refresh task ended abnormally");
            }
        }
    }
}

impl Drop for JwksCache {
    fn drop(&mut self) {
        self.cancel_token.cancel();
    }
}

impl fmt::Debug for JwksCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JwksCache")
            .field("source", &self.shared.source.describe())
            .field("options", &self.shared.options)
            .finish()
    }
}

fn spawn_scheduled_refresh(shared: Arc<Shared>, token: CancellationToken) -> JoinHandle<()> {
    let period = shared.options.refresh_interval;

    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        // The first tick fires immediately and the keys were just loaded.
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = token.cancelled() => {
                    debug!("Scheduled JWKS refresh shutting down");
                    break;
                }
                _ = ticker.tick() => {
                    shared.scheduled_refresh().await;
                }
            }
        }
    })
}
