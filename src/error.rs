use std::fmt;
use std::time::Duration;
use thiserror::Error;

use crate::browser::BrowserError;
use crate::model::InputError;
use crate::pipeline::PipelineState;

/// Pipeline stage a failure originated from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Launch,
    Navigate,
    Search,
    Filter,
    Extract,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Launch => "launch",
            Stage::Navigate => "navigate",
            Stage::Search => "search",
            Stage::Filter => "filter",
            Stage::Extract => "extract",
        };
        f.write_str(name)
    }
}

/// Terminal failure of a scrape, as seen by the caller.
#[derive(Debug, Error)]
pub enum ScrapeError {
    #[error("invalid input: {0}")]
    InvalidInput(#[from] InputError),

    #[error("{stage} stage could not find a required page element: {source}")]
    LayoutMismatch {
        stage: Stage,
        #[source]
        source: BrowserError,
    },

    #[error("scrape exceeded its {limit:?} deadline (last state: {state})")]
    PipelineTimeout {
        limit: Duration,
        state: PipelineState,
    },

    #[error("browser session failed during {stage}: {source}")]
    Session {
        stage: Stage,
        #[source]
        source: BrowserError,
    },
}

impl ScrapeError {
    /// Sorts a browser failure into a layout problem or a substrate problem.
    pub fn from_browser(stage: Stage, source: BrowserError) -> Self {
        if source.is_layout() {
            ScrapeError::LayoutMismatch { stage, source }
        } else {
            ScrapeError::Session { stage, source }
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            ScrapeError::InvalidInput(_) => "invalid_input",
            ScrapeError::LayoutMismatch { .. } => "layout_mismatch",
            ScrapeError::PipelineTimeout { .. } => "timeout",
            ScrapeError::Session { .. } => "session",
        }
    }
}
