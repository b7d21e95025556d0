//! Browser capability used by the link resolver.
//!
//! The resolver only needs a handful of operations from a browser: open an
//! isolated session, watch its outgoing requests, navigate, run a snippet of
//! script and close. [`BrowserDriver`] and [`BrowserSession`] capture exactly
//! that, so the resolver can run against headless Chromium in production and
//! against [`ScriptedDriver`] in tests.

pub mod chromium;
pub mod scripted;

use async_trait::async_trait;
use futures_util::stream::BoxStream;
use std::time::Duration;
use thiserror::Error;

pub use chromium::ChromiumDriver;
pub use scripted::{PageScript, ScriptedDriver};

/// Errors raised by a browser driver.
///
/// Detail is kept as text: the resolver only logs it.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum DriverError {
    #[error("failed to launch browser: {0}")]
    Launch(String),

    #[error("failed to set client identity: {0}")]
    Identity(String),

    #[error("navigation failed: {0}")]
    Navigation(String),

    #[error("script evaluation failed: {0}")]
    Script(String),

    #[error("failed to observe network requests: {0}")]
    Observe(String),

    #[error("failed to close browser: {0}")]
    Close(String),
}

/// Options for launching a browser session.
#[derive(Debug, Clone)]
pub struct LaunchOptions {
    pub headless: bool,
    /// Explicit browser executable; the driver picks one when `None`
    pub executable: Option<String>,
    /// Upper bound for a single navigation
    pub navigation_timeout: Duration,
}

impl Default for LaunchOptions {
    fn default() -> Self {
        Self {
            headless: true,
            executable: None,
            navigation_timeout: Duration::from_secs(30),
        }
    }
}

/// An outgoing network request seen by a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestDescriptor {
    pub url: String,
}

/// Launches isolated browser sessions.
#[async_trait]
pub trait BrowserDriver: Send + Sync {
    async fn launch(
        &self,
        options: &LaunchOptions,
    ) -> Result<Box<dyn BrowserSession>, DriverError>;
}

/// One isolated browsing context.
///
/// Callers must call [`BrowserSession::close`] once they are done; dropping
/// a session without closing it is allowed but may leave cleanup to the
/// driver's drop glue.
#[async_trait]
pub trait BrowserSession: Send {
    /// Present `user_agent` on every subsequent request.
    async fn set_user_agent(&mut self, user_agent: &str) -> Result<(), DriverError>;

    /// Stream of outgoing requests issued after this call.
    ///
    /// The stream buffers, so requests fired during [`navigate`] are not lost.
    ///
    /// [`navigate`]: BrowserSession::navigate
    async fn requests(
        &mut self,
    ) -> Result<BoxStream<'static, RequestDescriptor>, DriverError>;

    /// Navigate to `url` and wait until the page's network settles.
    async fn navigate(&mut self, url: &str) -> Result<(), DriverError>;

    /// Evaluate `script` in the page.
    async fn evaluate(&mut self, script: &str) -> Result<(), DriverError>;

    /// Release the session. Calling it more than once is a no-op.
    async fn close(&mut self) -> Result<(), DriverError>;
}
