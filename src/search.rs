use tokio::time::sleep;
use tracing::info;

use crate::browser::{BrowserSession, Locator};
use crate::config::Timings;
use crate::error::{ScrapeError, Stage};
use crate::layout::SiteLayout;

/// Types `product_type` into the site search and waits for the result page.
pub async fn submit<S>(
    session: &S,
    layout: &SiteLayout,
    timings: &Timings,
    product_type: &str,
) -> Result<(), ScrapeError>
where
    S: BrowserSession + ?Sized,
{
    let fail = |e| ScrapeError::from_browser(Stage::Search, e);

    let input = Locator::page(&layout.search_input);
    session
        .wait_for(&input, timings.element_timeout)
        .await
        .map_err(fail)?;
    info!(product_type, "typing search query");
    session.type_text(&input, product_type).await.map_err(fail)?;
    sleep(timings.settle_delay).await;

    let submit = Locator::page(&layout.search_submit);
    session
        .wait_for(&submit, timings.element_timeout)
        .await
        .map_err(fail)?;
    session.click(&submit).await.map_err(fail)?;

    session
        .wait_for(&Locator::page(&layout.results_page), timings.element_timeout)
        .await
        .map_err(fail)?;
    info!("search submitted");
    Ok(())
}
