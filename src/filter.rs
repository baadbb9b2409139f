use tokio::time::sleep;
use tracing::{debug, info};

use crate::browser::{BrowserError, BrowserSession, Locator};
use crate::config::Timings;
use crate::error::{ScrapeError, Stage};
use crate::layout::{FilterPanel, SiteLayout};
use crate::mapping::UNMAPPED;
use crate::model::{Dimension, InputError};

/// Applies the width and depth filters and submits them together.
///
/// Positions come from [`crate::mapping`]; an unmapped position is rejected
/// before the page is touched so a filter is never half-applied.
pub async fn apply<S>(
    session: &S,
    layout: &SiteLayout,
    timings: &Timings,
    width_position: u32,
    depth_position: u32,
) -> Result<(), ScrapeError>
where
    S: BrowserSession + ?Sized,
{
    let selections = [
        (Dimension::Width, &layout.width_filter, width_position),
        (Dimension::Depth, &layout.depth_filter, depth_position),
    ];
    for (dimension, _, position) in &selections {
        if *position == UNMAPPED {
            return Err(InputError::UnmappedPosition(*dimension).into());
        }
    }

    let fail = |e| ScrapeError::from_browser(Stage::Filter, e);

    let toggle = Locator::page(&layout.filter_toggle);
    session
        .wait_for(&toggle, timings.element_timeout)
        .await
        .map_err(fail)?;
    session.click(&toggle).await.map_err(fail)?;
    sleep(timings.settle_delay).await;

    // One panel at a time: each is opened, used and settled before the next.
    for (dimension, panel, position) in selections {
        select_option(session, panel, position, timings)
            .await
            .map_err(fail)?;
        info!(%dimension, position, "filter option selected");
    }

    let submit = Locator::page(&layout.filter_submit);
    session
        .wait_for(&submit, timings.element_timeout)
        .await
        .map_err(fail)?;
    session.click(&submit).await.map_err(fail)?;
    sleep(timings.settle_delay).await;
    debug!("filters submitted");
    Ok(())
}

async fn select_option<S>(
    session: &S,
    panel: &FilterPanel,
    position: u32,
    timings: &Timings,
) -> Result<(), BrowserError>
where
    S: BrowserSession + ?Sized,
{
    let disclosure = panel.disclosure();
    session.wait_for(&disclosure, timings.element_timeout).await?;
    session.click(&disclosure).await?;

    let option = panel.option(position);
    session.wait_for(&option, timings.element_timeout).await?;
    session.click(&option).await?;
    sleep(timings.settle_delay).await;
    Ok(())
}
