use serde_json::Value;
use std::fmt;
use std::sync::{Mutex, PoisonError};
use std::time::Instant;
use tracing::{debug, info, info_span, warn, Instrument};

use crate::browser::{BrowserLauncher, BrowserSession, SessionGuard};
use crate::config::ScraperConfig;
use crate::consent;
use crate::error::{ScrapeError, Stage};
use crate::extract;
use crate::filter;
use crate::layout::SiteLayout;
use crate::model::{Product, ScrapeRequest};
use crate::search;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Success,
    Failure,
}

/// Progress of a single scrape.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    Idle,
    SessionOpen,
    Navigated,
    ConsentResolved,
    Searched,
    Filtered,
    Extracted,
    Closed(Outcome),
}

impl fmt::Display for PipelineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PipelineState::Idle => f.write_str("idle"),
            PipelineState::SessionOpen => f.write_str("session open"),
            PipelineState::Navigated => f.write_str("navigated"),
            PipelineState::ConsentResolved => f.write_str("consent resolved"),
            PipelineState::Searched => f.write_str("searched"),
            PipelineState::Filtered => f.write_str("filtered"),
            PipelineState::Extracted => f.write_str("extracted"),
            PipelineState::Closed(Outcome::Success) => f.write_str("closed (success)"),
            PipelineState::Closed(Outcome::Failure) => f.write_str("closed (failure)"),
        }
    }
}

struct StateTracker(Mutex<PipelineState>);

impl StateTracker {
    fn new() -> Self {
        Self(Mutex::new(PipelineState::Idle))
    }

    fn advance(&self, next: PipelineState) {
        let mut state = self.0.lock().unwrap_or_else(PoisonError::into_inner);
        let from = *state;
        debug!(%from, to = %next, "pipeline transition");
        *state = next;
    }

    fn current(&self) -> PipelineState {
        *self.0.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Runs scrapes against the comparison site, one browser session each.
///
/// A `Scraper` holds no per-scrape state, so one instance can serve any number
/// of concurrent calls.
pub struct Scraper<L> {
    launcher: L,
    layout: SiteLayout,
    config: ScraperConfig,
}

impl<L: BrowserLauncher> Scraper<L> {
    pub fn new(launcher: L, layout: SiteLayout, config: ScraperConfig) -> Self {
        Self {
            launcher,
            layout,
            config,
        }
    }

    /// Validates the raw request fields and runs the scrape.
    pub async fn scrape(
        &self,
        product_type: &str,
        product_width: &str,
        product_depth: &str,
    ) -> Result<Vec<Product>, ScrapeError> {
        let request = ScrapeRequest::parse(product_type, product_width, product_depth)?;
        self.run(&request).await
    }

    pub async fn run(&self, request: &ScrapeRequest) -> Result<Vec<Product>, ScrapeError> {
        let span = info_span!(
            "scrape",
            product_type = %request.product_type,
            width = request.width.as_str(),
            depth = request.depth.as_str(),
        );

        async {
            let tracker = StateTracker::new();
            let limit = self.config.timings.deadline;
            let started = Instant::now();

            // Dropping `drive` on expiry drops its session guard, which closes
            // the browser even if a stage is still waiting.
            let result = match tokio::time::timeout(limit, self.drive(request, &tracker)).await {
                Ok(result) => result,
                Err(_) => Err(ScrapeError::PipelineTimeout {
                    limit,
                    state: tracker.current(),
                }),
            };

            let outcome = match &result {
                Ok(_) => Outcome::Success,
                Err(_) => Outcome::Failure,
            };
            tracker.advance(PipelineState::Closed(outcome));

            let elapsed_ms = started.elapsed().as_millis() as u64;
            match &result {
                Ok(products) => info!(count = products.len(), elapsed_ms, "scrape finished"),
                Err(e) => warn!(kind = e.kind(), elapsed_ms, "scrape failed: {e}"),
            }
            result
        }
        .instrument(span)
        .await
    }

    async fn drive(
        &self,
        request: &ScrapeRequest,
        tracker: &StateTracker,
    ) -> Result<Vec<Product>, ScrapeError> {
        let timings = &self.config.timings;
        let layout = &self.layout;

        let session = self
            .launcher
            .launch()
            .await
            .map_err(|e| ScrapeError::from_browser(Stage::Launch, e))?;
        let session = SessionGuard::new(session);
        tracker.advance(PipelineState::SessionOpen);

        let base_url = self.config.base_url.as_str();
        session
            .navigate(base_url)
            .await
            .map_err(|e| ScrapeError::from_browser(Stage::Navigate, e))?;
        if let Ok(Value::String(title)) = session.evaluate("document.title").await {
            info!(%title, "landed on {base_url}");
        }
        tracker.advance(PipelineState::Navigated);

        let consent = consent::resolve(&*session, layout, timings).await;
        debug!(?consent, "consent stage done");
        tracker.advance(PipelineState::ConsentResolved);

        search::submit(&*session, layout, timings, &request.product_type).await?;
        tracker.advance(PipelineState::Searched);

        filter::apply(
            &*session,
            layout,
            timings,
            request.width.position(),
            request.depth.position(),
        )
        .await?;
        tracker.advance(PipelineState::Filtered);

        let products = extract::collect(&*session, layout, timings, &self.config.base_url).await?;
        tracker.advance(PipelineState::Extracted);

        Ok(products)
    }
}
