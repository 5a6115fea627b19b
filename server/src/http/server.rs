use std::any::Any;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use axum::body::Body;
use axum::extract::{Request, State};
use axum::http::{header, HeaderValue, StatusCode};
use axum::middleware::{self, Next};
use axum::response::Response;
use axum::routing::get;
use axum::Router;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::catch_panic::CatchPanicLayer;
use tracing::{error, info, warn};

use crate::config::Config;
use crate::engine::EngineApi;
use crate::media::MediaApi;
use crate::raster::{InkscapeRasterizer, ResvgRasterizer, SvgRasterizer};
use crate::render::BoardRenderer;

use super::handlers;
use super::pool::RenderPool;

/// Active requests get this long to finish once shutdown begins.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(20);

/// Everything a handler needs, cheap to clone per request.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub engine: Arc<EngineApi>,
    pub media: Arc<MediaApi>,
    pub renderer: Arc<BoardRenderer>,
    pub pool: Arc<RenderPool>,
}

impl AppState {
    pub fn new(config: Config) -> Self {
        let rasterizer: Arc<dyn SvgRasterizer> = match config.svg_rasterizer.as_str() {
            "inkscape" => Arc::new(InkscapeRasterizer::new()),
            other => match other.strip_prefix("inkscape:") {
                Some(command) => Arc::new(InkscapeRasterizer::with_command(command)),
                None => Arc::new(ResvgRasterizer),
            },
        };
        let media = Arc::new(MediaApi::new(config.media_url.clone(), rasterizer));

        AppState {
            engine: Arc::new(EngineApi::new(config.engine_url.clone())),
            renderer: Arc::new(BoardRenderer::new(media.clone())),
            pool: Arc::new(RenderPool::new(config.render_workers, config.render_backlog)),
            media,
            config: Arc::new(config),
        }
    }
}

pub fn build_router(state: AppState) -> Router {
    // export routes get cache headers; system routes stay uncached
    let export_routes = Router::new()
        .route("/avatars/{*rest}", get(handlers::handle_avatar))
        .route(
            "/customizations/{kind}/{file}",
            get(handlers::handle_customization),
        )
        .route("/games/{game}/gif", get(handlers::handle_game_gif))
        .route("/games/{game}/{size}", get(handlers::handle_game_gif_sized))
        .route(
            "/games/{game}/frames/{frame}/gif",
            get(handlers::handle_frame_gif),
        )
        .route(
            "/games/{game}/frames/{frame}/{size}",
            get(handlers::handle_frame_gif_sized),
        )
        .route(
            "/games/{game}/frames/{frame}/ascii",
            get(handlers::handle_frame_ascii),
        )
        .route(
            "/games/{game}/frames/{frame}",
            get(handlers::handle_frame_ascii_txt),
        )
        .layer(middleware::from_fn_with_state(
            state.clone(),
            with_caching_headers,
        ));

    Router::new()
        .route("/", get(handlers::handle_version))
        .route("/version", get(handlers::handle_version))
        .route("/healthz/alive", get(handlers::handle_alive))
        .route("/healthz/ready", get(handlers::handle_ready))
        .route("/robots.txt", get(handlers::handle_robots))
        .merge(export_routes)
        .layer(CatchPanicLayer::custom(handle_panic))
        .with_state(state)
}

/// Export responses are immutable for a given app version, so mark them
/// cacheable and give proxies a deterministic ETag.
async fn with_caching_headers(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Response {
    let path = request.uri().path().to_string();
    let mut response = next.run(request).await;

    let headers = response.headers_mut();
    if let Ok(value) = HeaderValue::from_str(&format!(
        "public, max-age={}",
        state.config.cache_control_max_age_seconds
    )) {
        headers.insert(header::CACHE_CONTROL, value);
    }

    let etag = format!(
        "\"{:x}\"",
        md5::compute(format!("{}/{}", state.config.app_version, path))
    );
    if let Ok(value) = HeaderValue::from_str(&etag) {
        headers.insert(header::ETAG, value);
    }

    response
}

fn handle_panic(panic: Box<dyn Any + Send + 'static>) -> axum::http::Response<Body> {
    let detail = if let Some(message) = panic.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    };
    error!(panic = %detail, "unhandled panic in request handler");

    let mut response = axum::http::Response::new(Body::from("internal server error"));
    *response.status_mut() = StatusCode::INTERNAL_SERVER_ERROR;
    response
}

/// Binds the listener and serves until interrupted, then drains connections
/// for up to the grace period.
pub async fn run(config: Config) -> Result<()> {
    let port = config.port;
    let state = AppState::new(config);
    state.media.start_sweepers();
    info!(
        workers = state.config.render_workers,
        backlog = state.config.render_backlog,
        "starting GIF render pool"
    );

    let app = build_router(state);
    let listener = TcpListener::bind(("0.0.0.0", port))
        .await
        .with_context(|| format!("failed to bind port {port}"))?;
    info!(port = port, "exporter serving");

    let shutdown_started = CancellationToken::new();
    let shutdown_trigger = shutdown_started.clone();
    let graceful = axum::serve(listener, app).with_graceful_shutdown(async move {
        shutdown_signal().await;
        warn!("exporter shutdown signal received");
        shutdown_trigger.cancel();
    });

    tokio::select! {
        result = graceful => {
            result.context("server error")?;
            info!("exporter shutdown successfully");
        }
        _ = async {
            shutdown_started.cancelled().await;
            tokio::time::sleep(SHUTDOWN_GRACE).await;
        } => {
            warn!("shutdown grace period elapsed with connections still open");
        }
    }

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        let _ = tokio::signal::ctrl_c().await;
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => error!(error = %err, "failed to install SIGTERM handler"),
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
