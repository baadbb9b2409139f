use anyhow::{anyhow, Context, Result};
use std::fmt::Display;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use url::Url;

pub const DEFAULT_BASE_URL: &str = "https://www.idealo.de";

/// Waits and deadlines applied by the pipeline stages.
#[derive(Debug, Clone)]
pub struct Timings {
    /// Wall-clock bound on one whole scrape, launch to extraction.
    pub deadline: Duration,
    /// How long a required element may take to appear.
    pub element_timeout: Duration,
    /// How long to look for the consent overlay before assuming there is none.
    pub consent_timeout: Duration,
    /// Pause after an interaction so the page can react.
    pub settle_delay: Duration,
    /// Pause after the result list appears, for late-rendered entries.
    pub render_grace: Duration,
}

impl Default for Timings {
    fn default() -> Self {
        Self {
            deadline: Duration::from_secs(60),
            element_timeout: Duration::from_secs(10),
            consent_timeout: Duration::from_secs(5),
            settle_delay: Duration::from_millis(2000),
            render_grace: Duration::from_millis(1000),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ScraperConfig {
    /// Origin of the comparison site; also the base for relative offer links.
    pub base_url: Url,
    pub timings: Timings,
}

impl Default for ScraperConfig {
    fn default() -> Self {
        Self {
            base_url: Url::parse(DEFAULT_BASE_URL).expect("default base url is valid"),
            timings: Timings::default(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct BrowserConfig {
    pub headless: bool,
    /// Chrome binary; auto-detected when unset.
    pub chrome_path: Option<PathBuf>,
    pub window_size: (u32, u32),
    /// Base pause between typed characters; a random jitter is added.
    pub typing_delay: Duration,
    /// Interval between element presence checks.
    pub poll_interval: Duration,
    /// Chrome is killed after this much inactivity on its connection.
    pub idle_timeout: Duration,
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            headless: true,
            chrome_path: None,
            window_size: (1920, 1080),
            typing_delay: Duration::from_millis(80),
            poll_interval: Duration::from_millis(250),
            idle_timeout: Duration::from_secs(90),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Text,
    Json,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    /// CORS allow-list; `None` allows any origin.
    pub allowed_origins: Option<Vec<String>>,
    pub log_format: LogFormat,
    pub scraper: ScraperConfig,
    pub browser: BrowserConfig,
}

impl Config {
    /// Reads `.env` and the process environment.
    pub fn from_env() -> Result<Self> {
        dotenv::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };

        let timing_defaults = Timings::default();
        let browser_defaults = BrowserConfig::default();

        let base_url = get("SCRAPER_BASE_URL").unwrap_or_else(|| DEFAULT_BASE_URL.to_string());
        let base_url = Url::parse(&base_url)
            .with_context(|| format!("SCRAPER_BASE_URL is not a valid URL: {base_url}"))?;

        let timings = Timings {
            deadline: secs(&get, "SCRAPE_DEADLINE_SECS", timing_defaults.deadline)?,
            element_timeout: secs(&get, "ELEMENT_TIMEOUT_SECS", timing_defaults.element_timeout)?,
            consent_timeout: secs(&get, "CONSENT_TIMEOUT_SECS", timing_defaults.consent_timeout)?,
            settle_delay: millis(&get, "SETTLE_DELAY_MS", timing_defaults.settle_delay)?,
            render_grace: millis(&get, "RENDER_GRACE_MS", timing_defaults.render_grace)?,
        };

        let browser = BrowserConfig {
            headless: parse_or(&get, "CHROME_HEADLESS", browser_defaults.headless)?,
            chrome_path: get("CHROME_PATH").map(PathBuf::from),
            window_size: (
                parse_or(&get, "CHROME_WINDOW_WIDTH", browser_defaults.window_size.0)?,
                parse_or(&get, "CHROME_WINDOW_HEIGHT", browser_defaults.window_size.1)?,
            ),
            typing_delay: millis(&get, "TYPING_DELAY_MS", browser_defaults.typing_delay)?,
            poll_interval: millis(&get, "POLL_INTERVAL_MS", browser_defaults.poll_interval)?,
            // Outlive the scrape deadline so Chrome is never reaped mid-scrape.
            idle_timeout: timings.deadline + Duration::from_secs(30),
        };

        let log_format = match get("LOG_FORMAT").as_deref() {
            None | Some("text") => LogFormat::Text,
            Some("json") => LogFormat::Json,
            Some(other) => return Err(anyhow!("LOG_FORMAT must be `text` or `json`, got `{other}`")),
        };

        let allowed_origins = get("ALLOWED_ORIGINS").map(|raw| {
            raw.split(',')
                .map(|origin| origin.trim().to_string())
                .filter(|origin| !origin.is_empty())
                .collect::<Vec<_>>()
        });

        Ok(Self {
            port: parse_or(&get, "PORT", 5000)?,
            allowed_origins,
            log_format,
            scraper: ScraperConfig { base_url, timings },
            browser,
        })
    }
}

fn parse_or<T, G>(get: &G, key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: Display,
    G: Fn(&str) -> Option<String>,
{
    match get(key) {
        Some(raw) => raw
            .parse()
            .map_err(|e| anyhow!("{key} has invalid value `{raw}`: {e}")),
        None => Ok(default),
    }
}

fn secs<G>(get: &G, key: &str, default: Duration) -> Result<Duration>
where
    G: Fn(&str) -> Option<String>,
{
    parse_or(get, key, default.as_secs()).map(Duration::from_secs)
}

fn millis<G>(get: &G, key: &str, default: Duration) -> Result<Duration>
where
    G: Fn(&str) -> Option<String>,
{
    parse_or(get, key, default.as_millis() as u64).map(Duration::from_millis)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_from(pairs: &[(&str, &str)]) -> Result<Config> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn empty_environment_gives_defaults() {
        let config = config_from(&[]).unwrap();
        assert_eq!(config.port, 5000);
        assert_eq!(config.allowed_origins, None);
        assert_eq!(config.log_format, LogFormat::Text);
        assert_eq!(config.scraper.base_url.as_str(), "https://www.idealo.de/");
        assert_eq!(config.scraper.timings.deadline, Duration::from_secs(60));
        assert_eq!(config.scraper.timings.consent_timeout, Duration::from_secs(5));
        assert!(config.browser.headless);
        assert_eq!(config.browser.window_size, (1920, 1080));
    }

    #[test]
    fn overrides_are_applied() {
        let config = config_from(&[
            ("PORT", "8080"),
            ("ALLOWED_ORIGINS", "https://a.example, https://b.example,"),
            ("LOG_FORMAT", "json"),
            ("SCRAPE_DEADLINE_SECS", "120"),
            ("SETTLE_DELAY_MS", "0"),
            ("CHROME_HEADLESS", "false"),
            ("CHROME_PATH", "/usr/bin/chromium"),
        ])
        .unwrap();

        assert_eq!(config.port, 8080);
        assert_eq!(
            config.allowed_origins,
            Some(vec!["https://a.example".to_string(), "https://b.example".to_string()])
        );
        assert_eq!(config.log_format, LogFormat::Json);
        assert_eq!(config.scraper.timings.deadline, Duration::from_secs(120));
        assert_eq!(config.scraper.timings.settle_delay, Duration::ZERO);
        assert!(!config.browser.headless);
        assert_eq!(config.browser.chrome_path, Some(PathBuf::from("/usr/bin/chromium")));
        assert_eq!(config.browser.idle_timeout, Duration::from_secs(150));
    }

    #[test]
    fn invalid_values_name_their_key() {
        let err = config_from(&[("ELEMENT_TIMEOUT_SECS", "soon")]).unwrap_err();
        assert!(err.to_string().contains("ELEMENT_TIMEOUT_SECS"));

        let err = config_from(&[("SCRAPER_BASE_URL", "not a url")]).unwrap_err();
        assert!(err.to_string().contains("SCRAPER_BASE_URL"));

        let err = config_from(&[("LOG_FORMAT", "xml")]).unwrap_err();
        assert!(err.to_string().contains("LOG_FORMAT"));
    }

    #[test]
    fn blank_values_fall_back_to_defaults() {
        let config = config_from(&[("PORT", "  "), ("ALLOWED_ORIGINS", "")]).unwrap();
        assert_eq!(config.port, 5000);
        assert_eq!(config.allowed_origins, None);
    }
}
