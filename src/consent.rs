use thiserror::Error;
use tokio::time::sleep;
use tracing::{debug, info, warn};

use crate::browser::{BrowserError, BrowserSession};
use crate::config::Timings;
use crate::layout::SiteLayout;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsentOutcome {
    /// No overlay showed up within the consent timeout.
    NotShown,
    Dismissed,
    /// An overlay was there but could not be dismissed; scraping continues.
    Skipped,
}

#[derive(Debug, Error)]
#[error("consent overlay could not be dismissed: {0}")]
pub struct ConsentError(#[from] BrowserError);

/// Dismisses the cookie consent overlay if one is shown. Never fails.
pub async fn resolve<S>(session: &S, layout: &SiteLayout, timings: &Timings) -> ConsentOutcome
where
    S: BrowserSession + ?Sized,
{
    match session
        .wait_for(&layout.consent_frame(), timings.consent_timeout)
        .await
    {
        Ok(()) => {}
        Err(BrowserError::ElementTimeout { .. }) => {
            debug!("no consent overlay");
            return ConsentOutcome::NotShown;
        }
        Err(e) => {
            warn!("{}", ConsentError::from(e));
            return ConsentOutcome::Skipped;
        }
    }

    match accept(session, layout, timings).await {
        Ok(()) => {
            info!("consent overlay dismissed");
            ConsentOutcome::Dismissed
        }
        Err(e) => {
            warn!("{e}");
            ConsentOutcome::Skipped
        }
    }
}

async fn accept<S>(session: &S, layout: &SiteLayout, timings: &Timings) -> Result<(), ConsentError>
where
    S: BrowserSession + ?Sized,
{
    let button = layout.consent_accept();
    session.wait_for(&button, timings.consent_timeout).await?;
    session.click(&button).await?;
    sleep(timings.settle_delay).await;
    Ok(())
}
