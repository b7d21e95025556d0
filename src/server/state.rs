use crate::{
    browser::{BrowserDriver, ChromiumDriver, LaunchOptions},
    cache::ResolutionCache,
    config::Config,
    resolver::{LinkResolver, ResolverSettings},
    service::LinkService,
};
use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::Arc;
use std::time::Instant;

/// Application state shared across all handlers
#[derive(Clone)]
pub struct AppState {
    /// Application configuration
    pub config: Arc<Config>,
    /// Cache-first link lookup
    pub links: LinkService,
    /// Prometheus handle for `/metrics` (absent if another recorder won)
    pub metrics: Option<PrometheusHandle>,
    /// Process start, for uptime reporting
    pub started_at: Instant,
}

impl AppState {
    /// Create state backed by headless Chromium
    pub fn new(config: Config) -> Self {
        Self::with_driver(config, Arc::new(ChromiumDriver::new()))
    }

    /// Create state with an explicit browser driver
    pub fn with_driver(config: Config, driver: Arc<dyn BrowserDriver>) -> Self {
        let cache = ResolutionCache::new(config.cache_ttl());
        Self::with_parts(config, driver, cache)
    }

    /// Create state with an explicit driver and cache (tests inject a manual clock here)
    pub fn with_parts(
        config: Config,
        driver: Arc<dyn BrowserDriver>,
        cache: ResolutionCache,
    ) -> Self {
        let resolver = LinkResolver::new(
            driver,
            ResolverSettings {
                embed_domain: config.embed_domain.clone(),
                user_agent: config.user_agent.clone(),
                timeout: config.resolve_timeout(),
                launch: LaunchOptions {
                    headless: config.headless,
                    executable: config.chrome_path.clone(),
                    navigation_timeout: config.navigation_timeout(),
                },
            },
        );
        let links = LinkService::new(cache, resolver).with_single_flight(config.single_flight);

        Self {
            config: Arc::new(config),
            links,
            metrics: crate::metrics::init(),
            started_at: Instant::now(),
        }
    }
}
