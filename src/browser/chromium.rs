//! Headless Chromium driver over the DevTools protocol.

use super::{BrowserDriver, BrowserSession, DriverError, LaunchOptions, RequestDescriptor};
use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::cdp::browser_protocol::network::EventRequestWillBeSent;
use chromiumoxide::Page;
use futures_util::stream::{BoxStream, StreamExt};
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Per-process counter so concurrent sessions never share a profile directory.
static PROFILE_SEQ: AtomicU64 = AtomicU64::new(0);

/// Launches one Chromium process per session.
#[derive(Debug, Clone, Default)]
pub struct ChromiumDriver;

impl ChromiumDriver {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl BrowserDriver for ChromiumDriver {
    async fn launch(
        &self,
        options: &LaunchOptions,
    ) -> Result<Box<dyn BrowserSession>, DriverError> {
        let profile_dir = std::env::temp_dir().join(format!(
            "streamscout-{}-{}",
            std::process::id(),
            PROFILE_SEQ.fetch_add(1, Ordering::Relaxed)
        ));

        // --no-sandbox: container hosts usually lack the user namespaces
        // Chromium's sandbox needs.
        let mut builder = BrowserConfig::builder()
            .no_sandbox()
            .arg("--disable-setuid-sandbox")
            .arg("--disable-dev-shm-usage")
            .arg("--mute-audio")
            .user_data_dir(&profile_dir)
            .request_timeout(options.navigation_timeout);
        if !options.headless {
            builder = builder.with_head();
        }
        if let Some(path) = &options.executable {
            builder = builder.chrome_executable(path);
        }
        let config = builder.build().map_err(DriverError::Launch)?;

        let (mut browser, mut handler) = Browser::launch(config)
            .await
            .map_err(|e| DriverError::Launch(e.to_string()))?;

        // The CDP handler must be polled for the browser to make progress.
        let handler_task = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(e) = event {
                    debug!("CDP handler stopped: {}", e);
                    break;
                }
            }
        });

        let page = match browser.new_page("about:blank").await {
            Ok(page) => page,
            Err(e) => {
                // Don't leak the process when the first tab can't be opened
                if let Err(close_err) = browser.close().await {
                    warn!("Failed to close browser after launch error: {}", close_err);
                }
                handler_task.abort();
                return Err(DriverError::Launch(e.to_string()));
            }
        };

        let session = ChromiumSession {
            browser: Some(browser),
            page: Some(page),
            handler_task,
            profile_dir,
            navigation_timeout: options.navigation_timeout,
        };

        Ok(Box::new(session))
    }
}

/// A Chromium process with a single page.
pub struct ChromiumSession {
    browser: Option<Browser>,
    page: Option<Page>,
    handler_task: JoinHandle<()>,
    profile_dir: PathBuf,
    navigation_timeout: Duration,
}

impl ChromiumSession {
    fn page(&self) -> Result<&Page, DriverError> {
        self.page
            .as_ref()
            .ok_or_else(|| DriverError::Observe("session is closed".to_string()))
    }
}

#[async_trait]
impl BrowserSession for ChromiumSession {
    async fn set_user_agent(&mut self, user_agent: &str) -> Result<(), DriverError> {
        self.page()?
            .set_user_agent(user_agent)
            .await
            .map_err(|e| DriverError::Identity(e.to_string()))?;
        Ok(())
    }

    async fn requests(
        &mut self,
    ) -> Result<BoxStream<'static, RequestDescriptor>, DriverError> {
        let events = self
            .page()?
            .event_listener::<EventRequestWillBeSent>()
            .await
            .map_err(|e| DriverError::Observe(e.to_string()))?;

        Ok(events
            .map(|event| RequestDescriptor {
                url: event.request.url.clone(),
            })
            .boxed())
    }

    async fn navigate(&mut self, url: &str) -> Result<(), DriverError> {
        let page = self.page()?;
        match tokio::time::timeout(self.navigation_timeout, page.goto(url)).await {
            Ok(Ok(_)) => Ok(()),
            Ok(Err(e)) => Err(DriverError::Navigation(e.to_string())),
            Err(_) => Err(DriverError::Navigation(format!(
                "{} did not settle within {}s",
                url,
                self.navigation_timeout.as_secs()
            ))),
        }
    }

    async fn evaluate(&mut self, script: &str) -> Result<(), DriverError> {
        self.page()?
            .evaluate(script)
            .await
            .map_err(|e| DriverError::Script(e.to_string()))?;
        Ok(())
    }

    async fn close(&mut self) -> Result<(), DriverError> {
        self.page = None;
        let Some(mut browser) = self.browser.take() else {
            return Ok(());
        };

        let result = match browser.close().await {
            Ok(_) => browser
                .wait()
                .await
                .map(|_| ())
                .map_err(|e| DriverError::Close(e.to_string())),
            Err(e) => Err(DriverError::Close(e.to_string())),
        };

        self.handler_task.abort();
        if let Err(e) = tokio::fs::remove_dir_all(&self.profile_dir).await {
            debug!(
                "Could not remove browser profile {}: {}",
                self.profile_dir.display(),
                e
            );
        }

        result
    }
}

impl Drop for ChromiumSession {
    fn drop(&mut self) {
        self.handler_task.abort();
        // close() never ran: dropping the Browser kills the child, after
        // which its profile directory can go.
        if let Some(browser) = self.browser.take() {
            drop(browser);
            if let Err(e) = std::fs::remove_dir_all(&self.profile_dir) {
                debug!(
                    "Could not remove browser profile {}: {}",
                    self.profile_dir.display(),
                    e
                );
            }
        }
    }
}
