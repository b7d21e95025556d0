//! Manifest discovery through a browser session.
//!
//! One call to [`LinkResolver::resolve`] is one attempt: open a session,
//! load the embed page, click play if there is a button, and wait for the
//! first request to an `.m3u8` resource. The session is closed on every
//! exit path.

use crate::browser::{
    BrowserDriver, BrowserSession, DriverError, LaunchOptions, RequestDescriptor,
};
use futures_util::stream::{BoxStream, StreamExt};
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, error, info, warn};

/// Suffix identifying an HLS manifest request.
pub const MANIFEST_SUFFIX: &str = ".m3u8";

/// Clicks the player's big play button when the page has one.
const PLAY_SCRIPT: &str = r#"(() => {
    const button = document.querySelector('.vjs-big-play-button')
        || document.querySelector('button[title="Play Video"]');
    if (button) button.click();
})()"#;

/// Why an attempt produced no manifest URL.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ResolveError {
    #[error("no manifest request for {identifier} within {}s", .waited.as_secs())]
    Timeout {
        identifier: String,
        waited: Duration,
    },

    #[error(transparent)]
    Driver(#[from] DriverError),

    #[error("resolution task ended abnormally: {0}")]
    Aborted(String),
}

/// Settings for a [`LinkResolver`].
#[derive(Debug, Clone)]
pub struct ResolverSettings {
    pub embed_domain: String,
    pub user_agent: String,
    /// How long to wait for a manifest request once the page is up
    pub timeout: Duration,
    pub launch: LaunchOptions,
}

/// Whether `url` points at a streaming manifest.
pub fn is_manifest_url(url: &str) -> bool {
    url.ends_with(MANIFEST_SUFFIX)
}

/// Drives one browser session per identifier to find its manifest URL.
#[derive(Clone)]
pub struct LinkResolver {
    driver: Arc<dyn BrowserDriver>,
    settings: Arc<ResolverSettings>,
}

impl LinkResolver {
    pub fn new(driver: Arc<dyn BrowserDriver>, settings: ResolverSettings) -> Self {
        Self {
            driver,
            settings: Arc::new(settings),
        }
    }

    /// Embed page URL for `identifier`.
    pub fn target_url(&self, identifier: &str) -> String {
        format!("https://{}/{}", self.settings.embed_domain, identifier)
    }

    /// Find the manifest URL for `identifier`.
    ///
    /// The attempt runs on its own task, so dropping the returned future
    /// (a client hanging up mid-wait) still lets it finish and close the
    /// browser session.
    pub async fn resolve(&self, identifier: &str) -> Result<String, ResolveError> {
        let resolver = self.clone();
        let key = identifier.to_string();
        let task = tokio::spawn(async move { resolver.run(&key).await });

        match task.await {
            Ok(outcome) => outcome,
            Err(e) => {
                error!("Resolution task for {} failed: {}", identifier, e);
                Err(ResolveError::Aborted(e.to_string()))
            }
        }
    }

    async fn run(&self, identifier: &str) -> Result<String, ResolveError> {
        let start = Instant::now();
        let target = self.target_url(identifier);
        info!("Resolving {} via {}", identifier, target);

        let mut session = match self.driver.launch(&self.settings.launch).await {
            Ok(session) => session,
            Err(e) => {
                error!("Browser launch failed for {}: {}", identifier, e);
                return Err(e.into());
            }
        };

        let outcome = self.attempt(&mut *session, identifier, &target).await;

        if let Err(e) = session.close().await {
            warn!("Failed to close browser session for {}: {}", identifier, e);
        } else {
            debug!("Browser session for {} closed", identifier);
        }

        match &outcome {
            Ok(url) => info!(
                "Found manifest for {} in {}ms: {}",
                identifier,
                start.elapsed().as_millis(),
                url
            ),
            Err(ResolveError::Timeout { waited, .. }) => warn!(
                "No manifest request for {} after {}s",
                identifier,
                waited.as_secs()
            ),
            Err(e) => error!("Resolution of {} failed: {}", identifier, e),
        }

        outcome
    }

    /// Everything between launch and close.
    async fn attempt(
        &self,
        session: &mut dyn BrowserSession,
        identifier: &str,
        target: &str,
    ) -> Result<String, ResolveError> {
        session.set_user_agent(&self.settings.user_agent).await?;

        // Subscribe before navigating so requests fired during load are seen
        let requests = session.requests().await?;

        info!("Navigating to {}", target);
        session.navigate(target).await?;

        // Many players start on their own; a missing button is fine
        if let Err(e) = session.evaluate(PLAY_SCRIPT).await {
            debug!("Play interaction skipped for {}: {}", identifier, e);
        }

        match tokio::time::timeout(self.settings.timeout, first_manifest(requests)).await {
            Ok(Some(url)) => Ok(url),
            Ok(None) => Err(DriverError::Observe(format!(
                "request stream for {} ended before a manifest was seen",
                identifier
            ))
            .into()),
            Err(_) => Err(ResolveError::Timeout {
                identifier: identifier.to_string(),
                waited: self.settings.timeout,
            }),
        }
    }
}

/// First manifest URL on the stream, or `None` if the stream ends first.
async fn first_manifest(
    mut requests: BoxStream<'static, RequestDescriptor>,
) -> Option<String> {
    while let Some(request) = requests.next().await {
        if is_manifest_url(&request.url) {
            return Some(request.url);
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::browser::{PageScript, ScriptedDriver};

    const MANIFEST: &str = "https://cdn.example/abc123/master.m3u8";

    fn resolver(driver: &ScriptedDriver) -> LinkResolver {
        LinkResolver::new(
            Arc::new(driver.clone()),
            ResolverSettings {
                embed_domain: "embed.test".to_string(),
                user_agent: "TestAgent/1.0".to_string(),
                timeout: Duration::from_secs(20),
                launch: LaunchOptions::default(),
            },
        )
    }

    #[test]
    fn manifest_suffix_matching() {
        assert!(is_manifest_url(MANIFEST));
        assert!(!is_manifest_url("https://cdn.example/seg-001.ts"));
        assert!(!is_manifest_url("https://cdn.example/master.m3u8?token=x"));
        assert!(!is_manifest_url("https://cdn.example/m3u8"));
    }

    #[test]
    fn target_url_joins_domain_and_identifier() {
        let r = resolver(&ScriptedDriver::new());
        assert_eq!(r.target_url("abc123"), "https://embed.test/abc123");
    }

    #[tokio::test]
    async fn finds_manifest_fired_during_load() {
        let driver = ScriptedDriver::new().with_page(
            "https://embed.test/abc123",
            PageScript::loads(&["https://cdn.example/player.js", MANIFEST]),
        );

        let url = resolver(&driver).resolve("abc123").await.unwrap();

        assert_eq!(url, MANIFEST);
        assert_eq!(driver.navigations(), vec!["https://embed.test/abc123"]);
        assert_eq!(driver.user_agents(), vec!["TestAgent/1.0"]);
        assert_eq!(driver.closes(), 1);
    }

    #[tokio::test]
    async fn first_manifest_wins() {
        let driver = ScriptedDriver::new().with_page(
            "https://embed.test/abc123",
            PageScript::loads(&[
                "https://cdn.example/abc123/master.m3u8",
                "https://cdn.example/abc123/720p.m3u8",
            ]),
        );

        let url = resolver(&driver).resolve("abc123").await.unwrap();
        assert_eq!(url, "https://cdn.example/abc123/master.m3u8");
    }

    #[tokio::test]
    async fn play_click_provokes_manifest() {
        let driver = ScriptedDriver::new()
            .with_page("https://embed.test/abc123", PageScript::on_play(&[MANIFEST]));

        assert_eq!(resolver(&driver).resolve("abc123").await.unwrap(), MANIFEST);
    }

    #[tokio::test]
    async fn failed_play_click_is_not_an_error() {
        let mut script = PageScript::loads(&[MANIFEST]);
        script.script_error = true;
        let driver = ScriptedDriver::new().with_page("https://embed.test/abc123", script);

        assert_eq!(resolver(&driver).resolve("abc123").await.unwrap(), MANIFEST);
    }

    #[tokio::test(start_paused = true)]
    async fn times_out_when_no_manifest_requested() {
        let driver = ScriptedDriver::new().with_page(
            "https://embed.test/deadlink",
            PageScript::loads(&["https://cdn.example/ads.js"]),
        );

        let err = resolver(&driver).resolve("deadlink").await.unwrap_err();

        assert_eq!(
            err,
            ResolveError::Timeout {
                identifier: "deadlink".to_string(),
                waited: Duration::from_secs(20),
            }
        );
        assert_eq!(driver.closes(), 1, "session closed after timeout");
    }

    #[tokio::test(start_paused = true)]
    async fn manifest_after_deadline_is_ignored() {
        let driver = ScriptedDriver::new().with_page(
            "https://embed.test/slow",
            PageScript::loads(&[MANIFEST]).with_request_delay(Duration::from_secs(21)),
        );

        let err = resolver(&driver).resolve("slow").await.unwrap_err();
        assert!(matches!(err, ResolveError::Timeout { .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn manifest_just_before_deadline_is_found() {
        let driver = ScriptedDriver::new().with_page(
            "https://embed.test/slow",
            PageScript::loads(&[MANIFEST]).with_request_delay(Duration::from_secs(19)),
        );

        assert_eq!(resolver(&driver).resolve("slow").await.unwrap(), MANIFEST);
    }

    #[tokio::test(start_paused = true)]
    async fn close_failure_after_timeout_does_not_mask_outcome() {
        let driver = ScriptedDriver::new().fail_close();

        let err = resolver(&driver).resolve("deadlink").await.unwrap_err();

        assert!(matches!(err, ResolveError::Timeout { .. }));
        assert_eq!(driver.closes(), 1);
    }

    #[tokio::test]
    async fn close_failure_after_success_keeps_url() {
        let driver = ScriptedDriver::new()
            .with_page("https://embed.test/abc123", PageScript::loads(&[MANIFEST]))
            .fail_close();

        assert_eq!(resolver(&driver).resolve("abc123").await.unwrap(), MANIFEST);
    }

    #[tokio::test]
    async fn navigation_error_is_driver_error_and_session_closed() {
        let mut script = PageScript::loads(&[MANIFEST]);
        script.navigation_error = Some("net::ERR_NAME_NOT_RESOLVED".to_string());
        let driver = ScriptedDriver::new().with_page("https://embed.test/abc123", script);

        let err = resolver(&driver).resolve("abc123").await.unwrap_err();

        assert_eq!(
            err,
            ResolveError::Driver(DriverError::Navigation(
                "net::ERR_NAME_NOT_RESOLVED".to_string()
            ))
        );
        assert_eq!(driver.closes(), 1);
    }

    #[tokio::test]
    async fn launch_error_is_driver_error() {
        let driver = ScriptedDriver::new().fail_launch("chromium not found");

        let err = resolver(&driver).resolve("abc123").await.unwrap_err();

        assert!(matches!(err, ResolveError::Driver(DriverError::Launch(_))));
        assert_eq!(driver.closes(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn cancelled_caller_still_closes_session() {
        let driver = ScriptedDriver::new();
        let r = resolver(&driver);

        let abandoned =
            tokio::time::timeout(Duration::from_secs(5), r.resolve("deadlink")).await;
        assert!(abandoned.is_err(), "caller gave up before the deadline");
        assert_eq!(driver.closes(), 0);

        tokio::time::sleep(Duration::from_secs(30)).await;

        assert_eq!(driver.launches(), 1);
        assert_eq!(driver.closes(), 1, "attempt ran to its deadline and closed");
    }

    #[tokio::test]
    async fn user_agent_failure_is_identity_error_and_session_closed() {
        let driver = ScriptedDriver::new().fail_user_agent();

        let err = resolver(&driver).resolve("abc123").await.unwrap_err();

        assert!(matches!(err, ResolveError::Driver(DriverError::Identity(_))));
        assert_eq!(driver.navigations().len(), 0);
        assert_eq!(driver.closes(), 1);
    }
}
