//! In-process browser driver that replays canned network traffic.
//!
//! Pages are keyed by URL. Navigating to a URL with no registered script
//! behaves like a page that loads but never requests anything.

use super::{BrowserDriver, BrowserSession, DriverError, LaunchOptions, RequestDescriptor};
use async_trait::async_trait;
use dashmap::DashMap;
use futures_util::stream::{self, BoxStream, StreamExt};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;

/// What a page does once the browser reaches it.
#[derive(Debug, Clone, Default)]
pub struct PageScript {
    /// Requests fired while the page loads
    pub on_load: Vec<String>,
    /// Requests fired only after the play interaction runs
    pub on_play: Vec<String>,
    /// How long `navigate` takes to return
    pub load_time: Duration,
    /// Delay between the triggering step and the requests being observed
    pub request_delay: Duration,
    /// Make `navigate` fail with this message
    pub navigation_error: Option<String>,
    /// Make the play interaction throw
    pub script_error: bool,
}

impl PageScript {
    /// A page that requests `urls` as soon as it loads.
    pub fn loads(urls: &[&str]) -> Self {
        Self {
            on_load: urls.iter().map(|u| u.to_string()).collect(),
            ..Default::default()
        }
    }

    /// A page that only requests `urls` after the play button is pressed.
    pub fn on_play(urls: &[&str]) -> Self {
        Self {
            on_play: urls.iter().map(|u| u.to_string()).collect(),
            ..Default::default()
        }
    }

    pub fn with_load_time(mut self, load_time: Duration) -> Self {
        self.load_time = load_time;
        self
    }

    pub fn with_request_delay(mut self, delay: Duration) -> Self {
        self.request_delay = delay;
        self
    }
}

#[derive(Debug, Default)]
struct Recorder {
    pages: DashMap<String, PageScript>,
    launch_error: Mutex<Option<String>>,
    fail_close: AtomicBool,
    fail_user_agent: AtomicBool,
    launches: AtomicUsize,
    closes: AtomicUsize,
    navigations: Mutex<Vec<String>>,
    user_agents: Mutex<Vec<String>>,
}

/// Deterministic [`BrowserDriver`] for tests. Clones share state.
#[derive(Debug, Clone, Default)]
pub struct ScriptedDriver {
    inner: Arc<Recorder>,
}

impl ScriptedDriver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register (or replace) the behaviour of the page at `url`.
    pub fn with_page(self, url: &str, script: PageScript) -> Self {
        self.inner.pages.insert(url.to_string(), script);
        self
    }

    /// Make every subsequent launch fail.
    pub fn fail_launch(self, message: &str) -> Self {
        *lock(&self.inner.launch_error) = Some(message.to_string());
        self
    }

    /// Make `close` report an error (the session is still released).
    pub fn fail_close(self) -> Self {
        self.inner.fail_close.store(true, Ordering::SeqCst);
        self
    }

    /// Make `set_user_agent` fail on every session.
    pub fn fail_user_agent(self) -> Self {
        self.inner.fail_user_agent.store(true, Ordering::SeqCst);
        self
    }

    /// Sessions successfully launched.
    pub fn launches(&self) -> usize {
        self.inner.launches.load(Ordering::SeqCst)
    }

    /// Sessions closed (first close of each session only).
    pub fn closes(&self) -> usize {
        self.inner.closes.load(Ordering::SeqCst)
    }

    /// URLs navigated to, in order.
    pub fn navigations(&self) -> Vec<String> {
        lock(&self.inner.navigations).clone()
    }

    /// User agents set on sessions, in order.
    pub fn user_agents(&self) -> Vec<String> {
        lock(&self.inner.user_agents).clone()
    }
}

fn lock<T>(m: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|p| p.into_inner())
}

#[async_trait]
impl BrowserDriver for ScriptedDriver {
    async fn launch(
        &self,
        _options: &LaunchOptions,
    ) -> Result<Box<dyn BrowserSession>, DriverError> {
        if let Some(message) = lock(&self.inner.launch_error).clone() {
            return Err(DriverError::Launch(message));
        }
        self.inner.launches.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(ScriptedSession {
            recorder: self.inner.clone(),
            observer: None,
            script: None,
            closed: false,
        }))
    }
}

struct ScriptedSession {
    recorder: Arc<Recorder>,
    observer: Option<mpsc::UnboundedSender<RequestDescriptor>>,
    script: Option<PageScript>,
    closed: bool,
}

impl ScriptedSession {
    fn ensure_open(&self) -> Result<(), DriverError> {
        if self.closed {
            return Err(DriverError::Observe("session is closed".to_string()));
        }
        Ok(())
    }

    /// Deliver `urls` to the observer, after `delay` if non-zero.
    fn emit(&self, urls: Vec<String>, delay: Duration) {
        let Some(tx) = self.observer.clone() else {
            return;
        };
        if urls.is_empty() {
            return;
        }
        let send_all = move || {
            for url in urls {
                let _ = tx.send(RequestDescriptor { url });
            }
        };
        if delay.is_zero() {
            send_all();
        } else {
            tokio::spawn(async move {
                tokio::time::sleep(delay).await;
                send_all();
            });
        }
    }
}

#[async_trait]
impl BrowserSession for ScriptedSession {
    async fn set_user_agent(&mut self, user_agent: &str) -> Result<(), DriverError> {
        self.ensure_open()?;
        if self.recorder.fail_user_agent.load(Ordering::SeqCst) {
            return Err(DriverError::Identity("Network.setUserAgentOverride failed".to_string()));
        }
        lock(&self.recorder.user_agents).push(user_agent.to_string());
        Ok(())
    }

    async fn requests(
        &mut self,
    ) -> Result<BoxStream<'static, RequestDescriptor>, DriverError> {
        self.ensure_open()?;
        let (tx, rx) = mpsc::unbounded_channel();
        self.observer = Some(tx);
        Ok(stream::unfold(rx, |mut rx| async move {
            rx.recv().await.map(|req| (req, rx))
        })
        .boxed())
    }

    async fn navigate(&mut self, url: &str) -> Result<(), DriverError> {
        self.ensure_open()?;
        lock(&self.recorder.navigations).push(url.to_string());

        let script = self
            .recorder
            .pages
            .get(url)
            .map(|s| s.clone())
            .unwrap_or_default();

        if !script.load_time.is_zero() {
            tokio::time::sleep(script.load_time).await;
        }
        if let Some(message) = &script.navigation_error {
            return Err(DriverError::Navigation(message.clone()));
        }

        self.emit(script.on_load.clone(), script.request_delay);
        self.script = Some(script);
        Ok(())
    }

    async fn evaluate(&mut self, _script: &str) -> Result<(), DriverError> {
        self.ensure_open()?;
        let Some(script) = &self.script else {
            return Err(DriverError::Script("no page loaded".to_string()));
        };
        if script.script_error {
            return Err(DriverError::Script("play button not found".to_string()));
        }
        self.emit(script.on_play.clone(), script.request_delay);
        Ok(())
    }

    async fn close(&mut self) -> Result<(), DriverError> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        self.observer = None;
        self.recorder.closes.fetch_add(1, Ordering::SeqCst);
        if self.recorder.fail_close.load(Ordering::SeqCst) {
            return Err(DriverError::Close("browser process already gone".to_string()));
        }
        Ok(())
    }
}
