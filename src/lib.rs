//! HTTP fetching with an in-memory response cache and reactive subscriptions.

pub mod cache;
pub mod config;
pub mod fetch;
pub mod query;
pub mod request;

#[cfg(test)]
mod testing;

pub use cache::{CacheEntry, MemoryCache};
pub use fetch::{FetchError, HttpTransport, Payload, ReqwestTransport};
pub use query::{global_cache, FetchState, QueryStatus, SmartFetch, Subscription};
pub use request::{
  derive_key, normalize, should_include_body, CacheKey, FetchOptions, HttpMethod, RequestSpec,
};
