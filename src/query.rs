//! Reactive data fetching with caching support.
//!
//! A [`Subscription`] binds one consumer to one `(url, options)` pair. It
//! checks the shared cache, fetches on a miss, writes the result back and
//! publishes every state change to the consumer.
//!
//! # Example
//!
//! ```ignore
//! let client = SmartFetch::new(global_cache(), Arc::new(transport));
//! let mut subscription = client.subscribe("/api/users/1", FetchOptions::new(), |state| {
//!     // Called on every state change, never after dispose
//! });
//!
//! let state = subscription.settled().await;
//! match state.status() {
//!     QueryStatus::Success => render_data(state.data()),
//!     QueryStatus::Failure => render_error(state.error()),
//!     QueryStatus::Loading | QueryStatus::Idle => {}
//! }
//!
//! // Drop (or dispose) on teardown
//! subscription.dispose();
//! ```

use std::sync::{Arc, Mutex, MutexGuard, OnceLock, PoisonError};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::cache::MemoryCache;
use crate::fetch::{FetchError, FetchExecutor, HttpTransport, Payload};
use crate::request::{derive_key, normalize, CacheKey, FetchOptions, RequestSpec};

/// The process-wide response cache, empty at start-up.
pub fn global_cache() -> Arc<MemoryCache<Payload>> {
  static CACHE: OnceLock<Arc<MemoryCache<Payload>>> = OnceLock::new();
  Arc::clone(CACHE.get_or_init(|| Arc::new(MemoryCache::new())))
}

/// Where a subscription is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryStatus {
  /// Settled without a request (empty URL)
  Idle,
  /// A request is in flight
  Loading,
  /// Settled with data
  Success,
  /// Settled with an error
  Failure,
}

impl QueryStatus {
  pub fn as_str(&self) -> &'static str {
    match self {
      Self::Idle => "idle",
      Self::Loading => "loading",
      Self::Success => "success",
      Self::Failure => "failure",
    }
  }
}

/// Observable state of a subscription.
#[derive(Debug, Clone)]
pub struct FetchState {
  pub data: Option<Payload>,
  pub error: Option<Arc<FetchError>>,
  pub loading: bool,
}

impl FetchState {
  fn loading() -> Self {
    Self {
      data: None,
      error: None,
      loading: true,
    }
  }

  fn idle() -> Self {
    Self {
      data: None,
      error: None,
      loading: false,
    }
  }

  fn success(data: Payload) -> Self {
    Self {
      data: Some(data),
      error: None,
      loading: false,
    }
  }

  fn failure(error: FetchError) -> Self {
    Self {
      data: None,
      error: Some(Arc::new(error)),
      loading: false,
    }
  }

  pub fn status(&self) -> QueryStatus {
    match (self.loading, &self.data, &self.error) {
      (true, _, _) => QueryStatus::Loading,
      (false, _, Some(_)) => QueryStatus::Failure,
      (false, Some(_), None) => QueryStatus::Success,
      (false, None, None) => QueryStatus::Idle,
    }
  }

  pub fn is_loading(&self) -> bool {
    self.loading
  }

  pub fn data(&self) -> Option<&Payload> {
    self.data.as_ref()
  }

  pub fn error(&self) -> Option<&FetchError> {
    self.error.as_deref()
  }
}

type Listener = Box<dyn Fn(&FetchState) + Send + Sync>;

/// Entry point for creating subscriptions.
///
/// Cloning is cheap; clones share the cache and transport.
#[derive(Clone)]
pub struct SmartFetch {
  cache: Arc<MemoryCache<Payload>>,
  executor: FetchExecutor,
}

impl SmartFetch {
  pub fn new(cache: Arc<MemoryCache<Payload>>, transport: Arc<dyn HttpTransport>) -> Self {
    Self {
      cache,
      executor: FetchExecutor::new(transport),
    }
  }

  pub fn cache(&self) -> &Arc<MemoryCache<Payload>> {
    &self.cache
  }

  /// Subscribe to `url`, calling `on_update` with every state change.
  ///
  /// A cache hit (or an empty URL) settles before this returns. A miss
  /// spawns the fetch on the current tokio runtime, so this must be called
  /// from within one.
  ///
  /// `on_update` runs while teardown is held off, so it must not dispose or
  /// drop its own subscription.
  pub fn subscribe<F>(
    &self,
    url: impl Into<String>,
    options: FetchOptions,
    on_update: F,
  ) -> Subscription
  where
    F: Fn(&FetchState) + Send + Sync + 'static,
  {
    self.start(url.into(), options, Some(Box::new(on_update)))
  }

  /// Subscribe without a listener; observe through [`Subscription::changed`].
  pub fn watch(&self, url: impl Into<String>, options: FetchOptions) -> Subscription {
    self.start(url.into(), options, None)
  }

  fn start(&self, url: String, options: FetchOptions, listener: Option<Listener>) -> Subscription {
    let (state, receiver) = watch::channel(FetchState::loading());
    let inner = Arc::new(Inner {
      url,
      options,
      cache: Arc::clone(&self.cache),
      executor: self.executor.clone(),
      state,
      listener,
      root: CancellationToken::new(),
      current: Mutex::new(None),
      active: Mutex::new(true),
    });

    if let Plan::Fetch(attempt) = inner.plan() {
      inner.spawn(attempt);
    }

    Subscription { inner, receiver }
  }
}

/// A cache miss that needs a network round trip.
struct Attempt {
  key: CacheKey,
  spec: RequestSpec,
  token: CancellationToken,
}

enum Plan {
  Settled,
  Fetch(Attempt),
}

struct Inner {
  url: String,
  options: FetchOptions,
  cache: Arc<MemoryCache<Payload>>,
  executor: FetchExecutor,
  state: watch::Sender<FetchState>,
  listener: Option<Listener>,
  /// Parent of every attempt token; cancelled on teardown
  root: CancellationToken,
  /// Token of the attempt currently allowed to publish
  current: Mutex<Option<CancellationToken>>,
  /// Held across every check-then-publish, and by teardown to flip it
  active: Mutex<bool>,
}

impl Inner {
  fn active(&self) -> MutexGuard<'_, bool> {
    self.active.lock().unwrap_or_else(PoisonError::into_inner)
  }

  fn is_active(&self) -> bool {
    *self.active()
  }

  fn key(&self) -> Option<(CacheKey, RequestSpec)> {
    if self.url.is_empty() {
      return None;
    }
    let spec = normalize(&self.options);
    Some((derive_key(&self.url, &spec), spec))
  }

  /// Settle from the cache if possible, otherwise start a new attempt.
  fn plan(&self) -> Plan {
    let active = self.active();
    if !*active {
      return Plan::Settled;
    }

    let Some((key, spec)) = self.key() else {
      self.publish_guarded(&active, FetchState::idle(), None);
      return Plan::Settled;
    };

    if let Some(entry) = self.cache.get(key.as_str()) {
      debug!(url = %self.url, key = %key.fingerprint(), "Cache hit");
      self.publish_guarded(&active, FetchState::success(entry.data), None);
      return Plan::Settled;
    }

    debug!(url = %self.url, key = %key.fingerprint(), "Cache miss");
    let token = self.supersede();

    let mut loading = self.state.borrow().clone();
    loading.loading = true;
    loading.error = None;
    self.publish_guarded(&active, loading, Some(&token));

    Plan::Fetch(Attempt { key, spec, token })
  }

  /// Cancel the previous attempt and hand out a fresh token.
  fn supersede(&self) -> CancellationToken {
    let mut current = self.current.lock().unwrap_or_else(PoisonError::into_inner);
    if let Some(previous) = current.take() {
      previous.cancel();
    }
    let token = self.root.child_token();
    *current = Some(token.clone());
    token
  }

  async fn fetch(&self, attempt: Attempt) {
    let Attempt { key, spec, token } = attempt;

    match self.executor.execute(&self.url, &spec, &token).await {
      Ok(data) => {
        let active = self.active();
        if *active && !token.is_cancelled() {
          self.cache.set(key.as_str(), data.clone(), spec.cache_time);
          self.publish_guarded(&active, FetchState::success(data), Some(&token));
        }
      }
      Err(e) if e.is_cancelled() => {
        debug!(url = %self.url, "Attempt superseded or torn down");
      }
      Err(e) => {
        warn!(url = %self.url, error = %e, "Fetch failed");
        self.publish(FetchState::failure(e), Some(&token));
      }
    }
  }

  /// Run the attempt on its own task so it settles even if nobody waits.
  fn spawn(self: &Arc<Self>, attempt: Attempt) -> JoinHandle<()> {
    let task = Arc::clone(self);
    tokio::spawn(async move { task.fetch(attempt).await })
  }

  fn publish(&self, state: FetchState, attempt: Option<&CancellationToken>) {
    let active = self.active();
    self.publish_guarded(&active, state, attempt);
  }

  /// Publish a new state unless torn down or, for an attempt, superseded.
  fn publish_guarded(
    &self,
    active: &MutexGuard<'_, bool>,
    state: FetchState,
    attempt: Option<&CancellationToken>,
  ) {
    if !**active || attempt.is_some_and(CancellationToken::is_cancelled) {
      return;
    }

    self.state.send_replace(state.clone());

    if let Some(listener) = &self.listener {
      listener(&state);
    }
  }

  fn dispose(&self) {
    let mut active = self.active();
    if *active {
      *active = false;
      self.root.cancel();
      debug!(url = %self.url, "Subscription disposed");
    }
  }
}

/// One consumer's binding to a request.
///
/// Dropping the subscription disposes it.
pub struct Subscription {
  inner: Arc<Inner>,
  receiver: watch::Receiver<FetchState>,
}

impl Subscription {
  /// Snapshot of the current state.
  pub fn state(&self) -> FetchState {
    self.receiver.borrow().clone()
  }

  /// The cache key this subscription reads and writes, if it has a URL.
  pub fn key(&self) -> Option<CacheKey> {
    self.inner.key().map(|(key, _)| key)
  }

  pub fn is_active(&self) -> bool {
    self.inner.is_active()
  }

  /// Wait for the next state change.
  pub async fn changed(&mut self) -> FetchState {
    // The sender lives in `inner`, so it outlives this receiver
    let _ = self.receiver.changed().await;
    self.receiver.borrow_and_update().clone()
  }

  /// Wait until the subscription is no longer loading.
  pub async fn settled(&mut self) -> FetchState {
    if let Ok(state) = self.receiver.wait_for(|state| !state.loading).await {
      return state.clone();
    }
    self.state()
  }

  /// Fetch again, bypassing whatever the cache holds for this request.
  ///
  /// Waits until the new attempt settles, is superseded or is torn down.
  /// The attempt runs on its own task: dropping this future stops the
  /// waiting, not the request.
  pub async fn refetch(&self) {
    if let Some((key, _)) = self.inner.key() {
      if self.inner.cache.get(key.as_str()).is_some() {
        // Clears every cached response, not only this key's entry.
        // TODO: decide whether this should narrow to per-key invalidation.
        self.inner.cache.clear();
      }
    }
    if let Plan::Fetch(attempt) = self.inner.plan() {
      // A failed join means the runtime is shutting down
      let _ = self.inner.spawn(attempt).await;
    }
  }

  /// Tear down: cancel the in-flight attempt and stop publishing.
  pub fn dispose(&self) {
    self.inner.dispose();
  }
}

impl Drop for Subscription {
  fn drop(&mut self) {
    self.inner.dispose();
  }
}

impl std::fmt::Debug for Subscription {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("Subscription")
      .field("url", &self.inner.url)
      .field("state", &*self.receiver.borrow())
      .field("active", &self.is_active())
      .finish_non_exhaustive()
  }
}
