//! Price scraper for a shopping-comparison site: searches a product category,
//! applies the width and depth filters and returns the listed offers.

pub mod api;
pub mod browser;
pub mod config;
pub mod consent;
pub mod error;
pub mod extract;
pub mod filter;
pub mod layout;
pub mod mapping;
pub mod model;
pub mod pipeline;
pub mod search;

pub use browser::{BrowserError, BrowserLauncher, BrowserSession, ChromeLauncher, Locator};
pub use config::{BrowserConfig, Config, ScraperConfig, Timings};
pub use error::{ScrapeError, Stage};
pub use layout::SiteLayout;
pub use model::{Depth, InputError, Product, ScrapeRequest, Width};
pub use pipeline::{PipelineState, Scraper};
