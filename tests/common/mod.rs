//! Scripted in-memory browser used by the integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use price_scraper::{
    BrowserError, BrowserLauncher, BrowserSession, Locator, ScraperConfig, SiteLayout, Timings,
};
use serde_json::{json, Value};
use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::sleep;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Consent {
    Absent,
    Shown,
    Inaccessible,
}

/// What the fake site looks like.
#[derive(Debug)]
pub struct MockSite {
    pub consent_frame: String,
    pub consent: Consent,
    /// Page selectors that never appear.
    pub missing: HashSet<String>,
    /// A selector whose wait never resolves.
    pub stall: Option<String>,
    /// Result of the extraction script; `Null` echoes the typed query.
    pub items: Value,
    pub html: String,
    pub latency: Duration,
    pub launch_fails: bool,
    /// Error returned by the extraction script instead of a result.
    pub script_error: Option<BrowserError>,
}

impl Default for MockSite {
    fn default() -> Self {
        Self {
            consent_frame: SiteLayout::idealo().consent_frame,
            consent: Consent::Absent,
            missing: HashSet::new(),
            stall: None,
            items: json!([]),
            html: String::new(),
            latency: Duration::ZERO,
            launch_fails: false,
            script_error: None,
        }
    }
}

impl MockSite {
    pub fn with_items(items: Value) -> Self {
        Self {
            items: Value::String(items.to_string()),
            ..Self::default()
        }
    }
}

#[derive(Debug, Default)]
pub struct Recorder {
    pub launches: AtomicUsize,
    pub closes: AtomicUsize,
    actions: Mutex<Vec<String>>,
}

impl Recorder {
    pub fn launches(&self) -> usize {
        self.launches.load(Ordering::SeqCst)
    }

    pub fn closes(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }

    pub fn actions(&self) -> Vec<String> {
        self.actions.lock().unwrap().clone()
    }

    fn record(&self, action: String) {
        self.actions.lock().unwrap().push(action);
    }
}

pub struct MockLauncher {
    pub site: Arc<MockSite>,
    pub recorder: Arc<Recorder>,
}

impl MockLauncher {
    pub fn new(site: MockSite) -> Self {
        Self {
            site: Arc::new(site),
            recorder: Arc::new(Recorder::default()),
        }
    }
}

#[async_trait]
impl BrowserLauncher for MockLauncher {
    type Session = MockSession;

    async fn launch(&self) -> Result<MockSession, BrowserError> {
        if self.site.launch_fails {
            return Err(BrowserError::Substrate(anyhow::anyhow!("chrome binary not found")));
        }
        self.recorder.launches.fetch_add(1, Ordering::SeqCst);
        Ok(MockSession {
            site: Arc::clone(&self.site),
            recorder: Arc::clone(&self.recorder),
            typed: Mutex::new(String::new()),
        })
    }
}

pub struct MockSession {
    site: Arc<MockSite>,
    recorder: Arc<Recorder>,
    typed: Mutex<String>,
}

impl MockSession {
    fn is_present(&self, locator: &Locator) -> Result<bool, BrowserError> {
        let site = &self.site;
        if let Some(frame) = &locator.frame {
            return match site.consent {
                Consent::Absent => Ok(false),
                Consent::Shown => Ok(true),
                Consent::Inaccessible => Err(BrowserError::FrameUnavailable(frame.clone())),
            };
        }
        if locator.selector == site.consent_frame {
            return Ok(site.consent != Consent::Absent);
        }
        Ok(!site.missing.contains(&locator.selector))
    }
}

#[async_trait]
impl BrowserSession for MockSession {
    async fn navigate(&self, url: &str) -> Result<(), BrowserError> {
        sleep(self.site.latency).await;
        self.recorder.record(format!("navigate:{url}"));
        Ok(())
    }

    async fn wait_for(&self, locator: &Locator, timeout: Duration) -> Result<(), BrowserError> {
        sleep(self.site.latency).await;
        if self.site.stall.as_deref() == Some(locator.selector.as_str()) {
            std::future::pending::<()>().await;
        }
        if self.is_present(locator)? {
            return Ok(());
        }
        sleep(timeout).await;
        Err(BrowserError::ElementTimeout {
            locator: locator.clone(),
            timeout,
        })
    }

    async fn click(&self, locator: &Locator) -> Result<(), BrowserError> {
        sleep(self.site.latency).await;
        if !self.is_present(locator)? {
            return Err(BrowserError::ElementMissing(locator.clone()));
        }
        self.recorder.record(format!("click:{locator}"));
        Ok(())
    }

    async fn type_text(&self, locator: &Locator, text: &str) -> Result<(), BrowserError> {
        sleep(self.site.latency).await;
        self.typed.lock().unwrap().push_str(text);
        self.recorder.record(format!("type:{locator}:{text}"));
        Ok(())
    }

    async fn evaluate(&self, script: &str) -> Result<Value, BrowserError> {
        sleep(self.site.latency).await;
        if script == "document.title" {
            return Ok(json!("Mock Preisvergleich"));
        }
        match &self.site.script_error {
            Some(BrowserError::ScriptFailed(msg)) => {
                return Err(BrowserError::ScriptFailed(msg.clone()))
            }
            Some(other) => return Err(BrowserError::Substrate(anyhow::anyhow!("{other}"))),
            None => {}
        }
        if self.site.items.is_null() {
            let query = self.typed.lock().unwrap().clone();
            let items = json!([
                {"title": format!("{query} Basic"), "price": "19,99 €", "href": format!("/offer/{query}/1")},
                {"title": format!("{query} Deluxe"), "price": "1.049,00 €", "href": format!("/offer/{query}/2")},
            ]);
            return Ok(Value::String(items.to_string()));
        }
        Ok(self.site.items.clone())
    }

    async fn content(&self) -> Result<String, BrowserError> {
        Ok(self.site.html.clone())
    }

    fn close(&self) {
        self.recorder.closes.fetch_add(1, Ordering::SeqCst);
    }
}

pub fn fast_timings() -> Timings {
    Timings {
        deadline: Duration::from_secs(5),
        element_timeout: Duration::from_millis(20),
        consent_timeout: Duration::from_millis(20),
        settle_delay: Duration::ZERO,
        render_grace: Duration::ZERO,
    }
}

pub fn test_config() -> ScraperConfig {
    ScraperConfig {
        timings: fast_timings(),
        ..ScraperConfig::default()
    }
}
