//! Browser capabilities the pipeline stages are written against, and the
//! `headless_chrome` implementation used in production.

use async_trait::async_trait;
use headless_chrome::{Browser, LaunchOptions, Tab};
use once_cell::sync::Lazy;
use rand::seq::SliceRandom;
use serde_json::Value;
use std::ffi::OsStr;
use std::fmt;
use std::ops::Deref;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::time::sleep;
use tracing::{debug, info};

use crate::config::BrowserConfig;

static USER_AGENTS: Lazy<Vec<&'static str>> = Lazy::new(|| {
    vec![
        "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/123.0.0.0 Safari/537.36",
        "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/123.0.0.0 Safari/537.36",
        "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/123.0.0.0 Safari/537.36",
        "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/123.0.0.0 Safari/537.36 Edg/123.0.0.0",
    ]
});

const FALLBACK_USER_AGENT: &str =
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/123.0.0.0 Safari/537.36";

/// Injected before any page script runs.
const STEALTH_SCRIPT: &str = r#"
    Object.defineProperty(navigator, 'webdriver', { get: () => undefined });
    Object.defineProperty(navigator, 'hardwareConcurrency', { get: () => 4 });
    Object.defineProperty(navigator, 'languages', { get: () => ['de-DE', 'de', 'en-US', 'en'] });
    window.chrome = { runtime: {}, loadTimes: function() {}, csi: function() {}, app: {} };
"#;

// ============================================================================
// Capabilities
// ============================================================================

/// A CSS selector, optionally resolved inside the document of an `<iframe>`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Locator {
    pub frame: Option<String>,
    pub selector: String,
}

impl Locator {
    pub fn page(selector: impl Into<String>) -> Self {
        Self {
            frame: None,
            selector: selector.into(),
        }
    }

    pub fn in_frame(frame: impl Into<String>, selector: impl Into<String>) -> Self {
        Self {
            frame: Some(frame.into()),
            selector: selector.into(),
        }
    }
}

impl fmt::Display for Locator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.frame {
            Some(frame) => write!(f, "{frame} >> {}", self.selector),
            None => f.write_str(&self.selector),
        }
    }
}

#[derive(Debug, Error)]
pub enum BrowserError {
    #[error("`{locator}` did not appear within {timeout:?}")]
    ElementTimeout { locator: Locator, timeout: Duration },

    #[error("`{0}` is not on the page")]
    ElementMissing(Locator),

    #[error("embedded document `{0}` is not accessible")]
    FrameUnavailable(String),

    #[error("selector `{0}` is not valid")]
    InvalidSelector(String),

    #[error("page script failed: {0}")]
    ScriptFailed(String),

    #[error(transparent)]
    Substrate(#[from] anyhow::Error),
}

impl BrowserError {
    /// True when the page does not look the way the layout table expects.
    pub fn is_layout(&self) -> bool {
        !matches!(self, BrowserError::Substrate(_))
    }
}

/// One browser tab owned by a single scrape.
#[async_trait]
pub trait BrowserSession: Send + Sync {
    /// Loads `url` and waits for the navigation to finish.
    async fn navigate(&self, url: &str) -> Result<(), BrowserError>;

    /// Resolves once `locator` matches, or fails with `ElementTimeout`.
    async fn wait_for(&self, locator: &Locator, timeout: Duration) -> Result<(), BrowserError>;

    async fn click(&self, locator: &Locator) -> Result<(), BrowserError>;

    async fn type_text(&self, locator: &Locator, text: &str) -> Result<(), BrowserError>;

    /// Runs a read-only script against the current document.
    async fn evaluate(&self, script: &str) -> Result<Value, BrowserError>;

    /// Serialized HTML of the current document.
    async fn content(&self) -> Result<String, BrowserError>;

    /// Releases the tab and its browser. Idempotent, and safe to call while
    /// another operation on the session is still pending.
    fn close(&self);
}

#[async_trait]
pub trait BrowserLauncher: Send + Sync {
    type Session: BrowserSession + 'static;

    async fn launch(&self) -> Result<Self::Session, BrowserError>;
}

/// Closes the wrapped session when dropped, whichever way the owner exits.
pub struct SessionGuard<S: BrowserSession> {
    session: S,
}

impl<S: BrowserSession> SessionGuard<S> {
    pub fn new(session: S) -> Self {
        Self { session }
    }
}

impl<S: BrowserSession> Deref for SessionGuard<S> {
    type Target = S;

    fn deref(&self) -> &S {
        &self.session
    }
}

impl<S: BrowserSession> Drop for SessionGuard<S> {
    fn drop(&mut self) {
        self.session.close();
    }
}

// ============================================================================
// headless_chrome implementation
// ============================================================================

#[derive(Debug, Clone)]
pub struct ChromeLauncher {
    config: BrowserConfig,
}

impl ChromeLauncher {
    pub fn new(config: BrowserConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl BrowserLauncher for ChromeLauncher {
    type Session = ChromeSession;

    async fn launch(&self) -> Result<ChromeSession, BrowserError> {
        let config = self.config.clone();
        tokio::task::spawn_blocking(move || ChromeSession::launch_blocking(config))
            .await
            .map_err(|e| BrowserError::Substrate(e.into()))?
    }
}

pub struct ChromeSession {
    browser: Mutex<Option<Browser>>,
    tab: Arc<Tab>,
    typing_delay: Duration,
    poll_interval: Duration,
}

impl ChromeSession {
    fn launch_blocking(config: BrowserConfig) -> Result<Self, BrowserError> {
        let user_agent = USER_AGENTS
            .choose(&mut rand::thread_rng())
            .copied()
            .unwrap_or(FALLBACK_USER_AGENT);
        debug!(user_agent, "launching chrome");

        let ua_arg = format!("--user-agent={user_agent}");
        let args = vec![
            OsStr::new("--disable-blink-features=AutomationControlled"),
            OsStr::new("--no-sandbox"),
            OsStr::new("--disable-dev-shm-usage"),
            OsStr::new("--disable-infobars"),
            OsStr::new("--lang=de-DE"),
            // The consent overlay lives in a cross-origin frame; without this
            // its document is unreachable from the page.
            OsStr::new("--disable-features=IsolateOrigins,site-per-process"),
            OsStr::new("--disable-web-security"),
            OsStr::new(&ua_arg),
        ];

        let browser = Browser::new(LaunchOptions {
            headless: config.headless,
            window_size: Some(config.window_size),
            path: config.chrome_path.clone(),
            idle_browser_timeout: config.idle_timeout,
            args,
            ..Default::default()
        })?;

        let tab = browser.new_tab()?;
        tab.call_method(headless_chrome::protocol::cdp::Page::AddScriptToEvaluateOnNewDocument {
            source: STEALTH_SCRIPT.to_string(),
            world_name: None,
            include_command_line_api: None,
            run_immediately: None,
        })?;

        info!(headless = config.headless, "chrome session opened");
        Ok(Self {
            browser: Mutex::new(Some(browser)),
            tab,
            typing_delay: config.typing_delay,
            poll_interval: config.poll_interval,
        })
    }

    /// Runs a blocking CDP call off the async runtime.
    async fn blocking<T, F>(&self, f: F) -> Result<T, BrowserError>
    where
        T: Send + 'static,
        F: FnOnce(&Tab) -> Result<T, BrowserError> + Send + 'static,
    {
        let tab = Arc::clone(&self.tab);
        tokio::task::spawn_blocking(move || f(&tab))
            .await
            .map_err(|e| BrowserError::Substrate(e.into()))?
    }

    async fn eval_string(&self, script: String) -> Result<Option<String>, BrowserError> {
        let value = self.evaluate(&script).await?;
        Ok(match value {
            Value::String(s) => Some(s),
            _ => None,
        })
    }
}

/// Runs blocking teardown on the blocking pool when called from a runtime
/// thread, inline otherwise. Never waits for it to finish.
fn run_detached<F>(f: F)
where
    F: FnOnce() + Send + 'static,
{
    match tokio::runtime::Handle::try_current() {
        Ok(handle) => {
            handle.spawn_blocking(f);
        }
        Err(_) => f(),
    }
}

fn js_string(value: &str) -> String {
    // JSON string literals are valid JS string literals.
    Value::String(value.to_string()).to_string()
}

/// Script answering `present`, `absent`, `no_frame` or `inaccessible`.
fn probe_script(locator: &Locator) -> String {
    let selector = js_string(&locator.selector);
    match &locator.frame {
        None => format!("document.querySelector({selector}) ? 'present' : 'absent'"),
        Some(frame) => format!(
            r#"(() => {{
                const frame = document.querySelector({frame});
                if (!frame) return 'no_frame';
                let doc = null;
                try {{ doc = frame.contentDocument; }} catch (e) {{ doc = null; }}
                if (!doc) return 'inaccessible';
                return doc.querySelector({selector}) ? 'present' : 'absent';
            }})()"#,
            frame = js_string(frame),
        ),
    }
}

/// Script running `action` on the element inside a frame; answers `done` or `missing`.
fn frame_action_script(frame: &str, selector: &str, action: &str) -> String {
    format!(
        r#"(() => {{
            const frame = document.querySelector({frame});
            const doc = frame && frame.contentDocument;
            const el = doc && doc.querySelector({selector});
            if (!el) return 'missing';
            {action}
            return 'done';
        }})()"#,
        frame = js_string(frame),
        selector = js_string(selector),
    )
}

#[async_trait]
impl BrowserSession for ChromeSession {
    async fn navigate(&self, url: &str) -> Result<(), BrowserError> {
        let url = url.to_string();
        self.blocking(move |tab| {
            tab.navigate_to(&url)?;
            tab.wait_until_navigated()?;
            Ok(())
        })
        .await
    }

    async fn wait_for(&self, locator: &Locator, timeout: Duration) -> Result<(), BrowserError> {
        let script = probe_script(locator);
        let started = Instant::now();
        loop {
            match self.eval_string(script.clone()).await?.as_deref() {
                Some("present") => return Ok(()),
                Some("inaccessible") => {
                    let frame = locator.frame.clone().unwrap_or_default();
                    return Err(BrowserError::FrameUnavailable(frame));
                }
                _ => {}
            }
            if started.elapsed() >= timeout {
                return Err(BrowserError::ElementTimeout {
                    locator: locator.clone(),
                    timeout,
                });
            }
            sleep(self.poll_interval).await;
        }
    }

    async fn click(&self, locator: &Locator) -> Result<(), BrowserError> {
        match &locator.frame {
            None => {
                let target = locator.clone();
                self.blocking(move |tab| {
                    let element = tab
                        .find_element(&target.selector)
                        .map_err(|_| BrowserError::ElementMissing(target.clone()))?;
                    element.click()?;
                    Ok(())
                })
                .await
            }
            Some(frame) => {
                let script = frame_action_script(frame, &locator.selector, "el.click();");
                match self.eval_string(script).await?.as_deref() {
                    Some("done") => Ok(()),
                    _ => Err(BrowserError::ElementMissing(locator.clone())),
                }
            }
        }
    }

    async fn type_text(&self, locator: &Locator, text: &str) -> Result<(), BrowserError> {
        if let Some(frame) = &locator.frame {
            let action = format!(
                "el.focus(); el.value = {}; el.dispatchEvent(new Event('input', {{ bubbles: true }}));",
                js_string(text)
            );
            let script = frame_action_script(frame, &locator.selector, &action);
            return match self.eval_string(script).await?.as_deref() {
                Some("done") => Ok(()),
                _ => Err(BrowserError::ElementMissing(locator.clone())),
            };
        }

        self.click(locator).await?;
        for ch in text.chars() {
            let key = ch.to_string();
            self.blocking(move |tab| {
                tab.type_str(&key)?;
                Ok(())
            })
            .await?;
            sleep(self.typing_delay + Duration::from_millis(rand::random::<u64>() % 120)).await;
        }
        Ok(())
    }

    async fn evaluate(&self, script: &str) -> Result<Value, BrowserError> {
        let script = script.to_string();
        self.blocking(move |tab| {
            let result = tab.evaluate(&script, true)?;
            Ok(result.value.unwrap_or(Value::Null))
        })
        .await
    }

    async fn content(&self) -> Result<String, BrowserError> {
        self.blocking(|tab| Ok(tab.get_content()?)).await
    }

    fn close(&self) {
        let browser = self
            .browser
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(browser) = browser {
            // Dropping the last handle sends Browser.Close and kills the process.
            run_detached(move || {
                drop(browser);
                info!("chrome session closed");
            });
        }
    }
}

impl Drop for ChromeSession {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn locator_display_shows_frame_scope() {
        assert_eq!(Locator::page("#a").to_string(), "#a");
        assert_eq!(Locator::in_frame("iframe", "#b").to_string(), "iframe >> #b");
    }

    #[test]
    fn probe_script_escapes_selectors() {
        let script = probe_script(&Locator::page(r#"input[type="search"]"#));
        assert_eq!(
            script,
            r#"document.querySelector("input[type=\"search\"]") ? 'present' : 'absent'"#
        );
    }

    #[test]
    fn frame_probe_checks_document_access() {
        let script = probe_script(&Locator::in_frame("iframe#consent", "button"));
        assert!(script.contains(r#"document.querySelector("iframe#consent")"#));
        assert!(script.contains("contentDocument"));
        assert!(script.contains("'inaccessible'"));
    }

    #[test]
    fn only_substrate_errors_are_not_layout_errors() {
        assert!(BrowserError::ElementMissing(Locator::page("#x")).is_layout());
        assert!(BrowserError::FrameUnavailable("iframe".into()).is_layout());
        assert!(BrowserError::InvalidSelector("??".into()).is_layout());
        assert!(BrowserError::ScriptFailed("TypeError".into()).is_layout());
        assert!(!BrowserError::Substrate(anyhow::anyhow!("gone")).is_layout());
    }

    struct CountingSession(Arc<AtomicUsize>);

    #[async_trait]
    impl BrowserSession for CountingSession {
        async fn navigate(&self, _url: &str) -> Result<(), BrowserError> {
            Ok(())
        }
        async fn wait_for(&self, _l: &Locator, _t: Duration) -> Result<(), BrowserError> {
            Ok(())
        }
        async fn click(&self, _l: &Locator) -> Result<(), BrowserError> {
            Ok(())
        }
        async fn type_text(&self, _l: &Locator, _t: &str) -> Result<(), BrowserError> {
            Ok(())
        }
        async fn evaluate(&self, _s: &str) -> Result<Value, BrowserError> {
            Ok(Value::Null)
        }
        async fn content(&self) -> Result<String, BrowserError> {
            Ok(String::new())
        }
        fn close(&self) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn detached_teardown_runs_inline_without_a_runtime() {
        let done = Arc::new(AtomicUsize::new(0));
        let flag = Arc::clone(&done);
        run_detached(move || {
            flag.fetch_add(1, Ordering::SeqCst);
        });
        assert_eq!(done.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn detached_teardown_does_not_block_the_runtime() {
        let done = Arc::new(AtomicUsize::new(0));
        let flag = Arc::clone(&done);
        let started = Instant::now();
        run_detached(move || {
            std::thread::sleep(Duration::from_millis(300));
            flag.fetch_add(1, Ordering::SeqCst);
        });
        assert!(started.elapsed() < Duration::from_millis(150));
        assert_eq!(done.load(Ordering::SeqCst), 0);

        let deadline = Instant::now() + Duration::from_secs(5);
        while done.load(Ordering::SeqCst) == 0 && Instant::now() < deadline {
            sleep(Duration::from_millis(20)).await;
        }
        assert_eq!(done.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn guard_closes_once_on_drop() {
        let closes = Arc::new(AtomicUsize::new(0));
        {
            let guard = SessionGuard::new(CountingSession(Arc::clone(&closes)));
            assert_eq!(guard.0.load(Ordering::SeqCst), 0);
        }
        assert_eq!(closes.load(Ordering::SeqCst), 1);
    }
}
