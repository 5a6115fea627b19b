use std::net::SocketAddr;
use std::time::Duration;

use anyhow::{Context, Result};
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::json;
use tokio::net::TcpListener;

use ::common::{Game, GameFrame};
use server::config::Config;
use server::http::{build_router, AppState};

pub const SAMPLE_HEAD_SVG: &str = r##"<svg xmlns="http://www.w3.org/2000/svg" viewBox="0 0 100 100"><path d="M0 0h80a20 20 0 0 1 0 100H0z"/></svg>"##;
pub const SAMPLE_TAIL_SVG: &str = r##"<svg xmlns="http://www.w3.org/2000/svg" viewBox="0 0 100 100"><path d="M100 0v100L0 50z"/></svg>"##;

/// Spins up a stub engine, a stub media server and the exporter itself,
/// each on an ephemeral port.
pub struct TestEnvironment {
    pub base_url: String,
    pub http: reqwest::Client,
}

pub struct TestOptions {
    pub game: Game,
    pub frames: Vec<GameFrame>,
    pub engine_delay: Duration,
    pub render_workers: usize,
    pub render_backlog: usize,
}

impl Default for TestOptions {
    fn default() -> Self {
        TestOptions {
            game: test_game(3, 3),
            frames: vec![GameFrame::default()],
            engine_delay: Duration::ZERO,
            render_workers: 2,
            render_backlog: 8,
        }
    }
}

pub fn test_game(width: i32, height: i32) -> Game {
    Game {
        id: "test-game".to_string(),
        status: "complete".to_string(),
        width,
        height,
    }
}

impl TestEnvironment {
    pub async fn start(options: TestOptions) -> Result<Self> {
        let engine_addr = spawn_stub_engine(
            options.game.clone(),
            options.frames.clone(),
            options.engine_delay,
        )
        .await?;
        let media_addr = spawn_stub_media().await?;

        let config = Config {
            port: 0,
            app_version: "test-version".to_string(),
            cache_control_max_age_seconds: 86400,
            engine_url: format!("http://{engine_addr}"),
            media_url: format!("http://{media_addr}"),
            render_workers: options.render_workers,
            render_backlog: options.render_backlog,
            svg_rasterizer: "resvg".to_string(),
        };

        let app = build_router(AppState::new(config));
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .context("failed to bind exporter listener")?;
        let addr = listener.local_addr()?;
        tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });

        Ok(TestEnvironment {
            base_url: format!("http://{addr}"),
            http: reqwest::Client::new(),
        })
    }

    pub async fn get(&self, path: &str) -> Result<reqwest::Response> {
        Ok(self
            .http
            .get(format!("{}{}", self.base_url, path))
            .send()
            .await?)
    }
}

#[derive(Clone)]
struct EngineStubState {
    game: Game,
    frames: Vec<GameFrame>,
    delay: Duration,
}

#[derive(Deserialize)]
struct FramesQuery {
    #[serde(default)]
    offset: usize,
    #[serde(default)]
    limit: usize,
}

async fn spawn_stub_engine(
    game: Game,
    frames: Vec<GameFrame>,
    delay: Duration,
) -> Result<SocketAddr> {
    let state = EngineStubState {
        game,
        frames,
        delay,
    };

    let router = Router::new()
        .route("/games/{id}", get(stub_get_game))
        .route("/games/{id}/frames", get(stub_get_frames))
        .with_state(state);

    spawn_router(router).await
}

async fn stub_get_game(State(state): State<EngineStubState>, Path(id): Path<String>) -> Response {
    tokio::time::sleep(state.delay).await;
    if id != state.game.id {
        return StatusCode::NOT_FOUND.into_response();
    }
    Json(json!({ "Game": state.game })).into_response()
}

async fn stub_get_frames(
    State(state): State<EngineStubState>,
    Path(id): Path<String>,
    Query(query): Query<FramesQuery>,
) -> Response {
    if id != state.game.id {
        return StatusCode::NOT_FOUND.into_response();
    }
    let start = query.offset.min(state.frames.len());
    let end = start.saturating_add(query.limit).min(state.frames.len());
    let page = &state.frames[start..end];
    Json(json!({ "count": page.len(), "frames": page })).into_response()
}

/// Serves one known head and one known tail; everything else is missing so
/// the exporter's bundled fallbacks get exercised.
async fn spawn_stub_media() -> Result<SocketAddr> {
    let router = Router::new()
        .route("/snakes/heads/beluga.svg", get(|| async { SAMPLE_HEAD_SVG }))
        .route("/snakes/tails/bolt.svg", get(|| async { SAMPLE_TAIL_SVG }))
        .fallback(|| async { StatusCode::NOT_FOUND });

    spawn_router(router).await
}

async fn spawn_router(router: Router) -> Result<SocketAddr> {
    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .context("failed to bind stub listener")?;
    let addr = listener.local_addr()?;
    tokio::spawn(async move {
        let _ = axum::serve(listener, router).await;
    });
    Ok(addr)
}
