//! Cache-first link lookup.
//!
//! [`LinkService`] is what the HTTP handler talks to: it answers from the
//! [`ResolutionCache`] when it can and falls back to one live
//! [`LinkResolver`] attempt otherwise. With single-flight enabled,
//! concurrent misses for the same identifier wait on one shared attempt
//! instead of each launching a browser.

use crate::{
    cache::ResolutionCache,
    error::{Result, ScoutError},
    metrics,
    resolver::{LinkResolver, ResolveError},
};
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use futures_util::future::{BoxFuture, FutureExt, Shared};
use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info};

type SharedResolution = Shared<BoxFuture<'static, std::result::Result<String, ResolveError>>>;

/// Where a returned link came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LinkSource {
    Cache,
    Live,
}

/// A manifest URL plus its provenance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResolvedLink {
    pub url: String,
    pub source: LinkSource,
}

#[derive(Clone)]
pub struct LinkService {
    cache: ResolutionCache,
    resolver: LinkResolver,
    /// In-flight attempts by identifier; `None` when single-flight is off
    in_flight: Option<Arc<DashMap<String, SharedResolution>>>,
}

impl LinkService {
    pub fn new(cache: ResolutionCache, resolver: LinkResolver) -> Self {
        Self {
            cache,
            resolver,
            in_flight: None,
        }
    }

    /// Share one attempt between concurrent callers of the same identifier.
    pub fn with_single_flight(mut self, enabled: bool) -> Self {
        self.in_flight = enabled.then(|| Arc::new(DashMap::new()));
        self
    }

    pub fn cache(&self) -> &ResolutionCache {
        &self.cache
    }

    /// Manifest URL for `identifier`, from cache or a fresh browser attempt.
    pub async fn get_link(&self, identifier: &str) -> Result<ResolvedLink> {
        if identifier.trim().is_empty() {
            return Err(ScoutError::MissingId);
        }

        if let Some(url) = self.cache.lookup(identifier) {
            info!("Cache HIT for {}", identifier);
            metrics::record_cache_lookup(true);
            return Ok(ResolvedLink {
                url,
                source: LinkSource::Cache,
            });
        }
        info!("Cache MISS for {}, resolving live", identifier);
        metrics::record_cache_lookup(false);

        let outcome = match &self.in_flight {
            Some(registry) => self.join_or_start(registry, identifier).await,
            None => resolve_and_store(&self.resolver, &self.cache, identifier).await,
        };

        match outcome {
            Ok(url) => Ok(ResolvedLink {
                url,
                source: LinkSource::Live,
            }),
            Err(_) => Err(ScoutError::LinkNotFound(identifier.to_string())),
        }
    }

    async fn join_or_start(
        &self,
        registry: &Arc<DashMap<String, SharedResolution>>,
        identifier: &str,
    ) -> std::result::Result<String, ResolveError> {
        let attempt = match registry.entry(identifier.to_string()) {
            Entry::Occupied(existing) => {
                debug!("Joining in-flight resolution for {}", identifier);
                existing.get().clone()
            }
            Entry::Vacant(slot) => {
                let resolver = self.resolver.clone();
                let cache = self.cache.clone();
                let registry = Arc::clone(registry);
                let key = identifier.to_string();
                // Spawned so the attempt completes, closes its session and
                // leaves the registry even if every waiter goes away.
                let task = tokio::spawn(async move {
                    let outcome = resolve_and_store(&resolver, &cache, &key).await;
                    registry.remove(&key);
                    outcome
                });
                let attempt = async move {
                    task.await
                        .unwrap_or_else(|e| Err(ResolveError::Aborted(e.to_string())))
                }
                .boxed()
                .shared();
                slot.insert(attempt.clone());
                attempt
            }
        };
        attempt.await
    }
}

/// One live attempt; the cache is written only on success.
async fn resolve_and_store(
    resolver: &LinkResolver,
    cache: &ResolutionCache,
    identifier: &str,
) -> std::result::Result<String, ResolveError> {
    let start = Instant::now();
    let outcome = resolver.resolve(identifier).await;
    match &outcome {
        Ok(url) => {
            cache.store(identifier, url.clone());
            metrics::record_resolution("found", start);
        }
        Err(ResolveError::Timeout { .. }) => metrics::record_resolution("timeout", start),
        Err(ResolveError::Driver(_)) => metrics::record_resolution("driver_error", start),
        Err(ResolveError::Aborted(_)) => metrics::record_resolution("aborted", start),
    }
    outcome
}
