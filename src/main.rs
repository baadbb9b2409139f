use axum::http::HeaderValue;
use std::sync::Arc;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use price_scraper::api::{self, AppState};
use price_scraper::config::{Config, LogFormat};
use price_scraper::{ChromeLauncher, Scraper, SiteLayout};

fn init_logging(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("price_scraper=info,tower_http=info"));
    let registry = tracing_subscriber::registry().with(filter);

    match format {
        LogFormat::Text => registry
            .with(tracing_subscriber::fmt::layer().with_target(false).compact())
            .init(),
        LogFormat::Json => registry.with(tracing_subscriber::fmt::layer().json()).init(),
    }
}

fn cors_layer(allowed_origins: Option<&[String]>) -> CorsLayer {
    let layer = CorsLayer::new().allow_methods(Any).allow_headers(Any);
    let Some(origins) = allowed_origins else {
        return layer.allow_origin(Any);
    };

    let origins: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match origin.parse() {
            Ok(value) => Some(value),
            Err(_) => {
                warn!(%origin, "ignoring invalid CORS origin");
                None
            }
        })
        .collect();
    layer.allow_origin(AllowOrigin::list(origins))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::from_env()?;
    init_logging(config.log_format);

    let scraper = Scraper::new(
        ChromeLauncher::new(config.browser.clone()),
        SiteLayout::idealo(),
        config.scraper.clone(),
    );
    let state = Arc::new(AppState { scraper });

    let app = api::router(state)
        .layer(cors_layer(config.allowed_origins.as_deref()))
        .layer(TraceLayer::new_for_http());

    let addr = format!("0.0.0.0:{}", config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("listening on {}", listener.local_addr()?);
    info!(
        "health check: http://localhost:{}/health, docs: http://localhost:{}/swagger-ui",
        config.port, config.port
    );
    axum::serve(listener, app).await?;

    Ok(())
}
