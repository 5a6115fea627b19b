use std::io::{self, Write};

use axum::body::Body;
use axum::extract::{Path, Query, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use bytes::Bytes;
use futures::StreamExt;
use serde::Deserialize;
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tracing::{error, info, warn};

use common::{parse_hex_color, Game};

use crate::engine::EngineError;
use crate::media::{svg, AssetKind, MediaError};
use crate::render::{
    self, avatar_svg, render_ascii, AnimationOptions, AvatarSettings, GIF_FRAME_DELAY,
    GIF_LOOP_DELAY,
};

use super::server::AppState;

/// Largest GIF we are willing to render. Bigger boards take dramatically
/// more IO, CPU and memory; 504x504 is where it stops being worth it.
const MAX_GIF_RESOLUTION: i64 = 504 * 504;

/// Square edges the dimensioned endpoints will accept.
const ALLOWED_PIXELS_PER_SQUARE: [i32; 4] = [10, 20, 30, 40];

const ERR_BAD_REQUEST: &str = "bad request";
const ERR_BAD_COLOR: &str = "color parameter should have the format #FFFFFF";

#[derive(Debug, Deserialize, Default)]
pub struct RenderQuery {
    pub engine_url: Option<String>,
    pub frames: Option<String>,
    #[serde(rename = "frameDelay")]
    pub frame_delay: Option<String>,
    #[serde(rename = "loopDelay")]
    pub loop_delay: Option<String>,
    pub color: Option<String>,
    pub flipped: Option<String>,
}

pub async fn handle_version(State(state): State<AppState>) -> String {
    state.config.app_version.clone()
}

pub async fn handle_alive() -> &'static str {
    "ok"
}

pub async fn handle_ready() -> &'static str {
    "ok"
}

pub async fn handle_robots() -> &'static str {
    "User-agent: *\nDisallow: /\n"
}

fn bad_request(message: impl Into<String>) -> Response {
    (StatusCode::BAD_REQUEST, message.into()).into_response()
}

fn not_found(message: impl Into<String>) -> Response {
    (StatusCode::NOT_FOUND, message.into()).into_response()
}

fn internal_error(err: impl std::fmt::Display) -> Response {
    error!(error = %err, "request failed");
    (StatusCode::INTERNAL_SERVER_ERROR, "internal server error").into_response()
}

fn engine_error_response(err: EngineError) -> Response {
    match err {
        EngineError::NotFound => not_found("resource not found"),
        other => internal_error(other),
    }
}

/// Colour parameters must be exactly `#RRGGBB`.
fn parse_color_param(value: &str) -> Option<common::Rgba> {
    if value.len() != 7 || !value.starts_with('#') {
        return None;
    }
    Some(parse_hex_color(value))
}

fn is_valid_customization_name(name: &str) -> bool {
    !name.is_empty()
        && name.len() <= 32
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '#')
}

// Avatars

pub async fn handle_avatar(
    State(state): State<AppState>,
    Path(rest): Path<String>,
) -> Response {
    let mut settings = AvatarSettings::default();

    let mut segments: Vec<&str> = rest.split('/').filter(|s| !s.is_empty()).collect();
    let Some(filename) = segments.pop() else {
        return bad_request(ERR_BAD_REQUEST);
    };

    let Some((width, height, ext)) = parse_avatar_filename(filename) else {
        return bad_request(ERR_BAD_REQUEST);
    };
    settings.width = width;
    settings.height = height;

    for segment in segments {
        let Some((key, value)) = segment.split_once(':') else {
            return bad_request(ERR_BAD_REQUEST);
        };
        if value.is_empty() {
            continue;
        }
        match key {
            "head" => match state.media.get_head_svg(value).await {
                Ok(svg) => settings.head_svg = Some(svg),
                Err(MediaError::NotFound) => return bad_request(ERR_BAD_REQUEST),
                Err(err) => return internal_error(err),
            },
            "tail" => match state.media.get_tail_svg(value).await {
                Ok(svg) => settings.tail_svg = Some(svg),
                Err(MediaError::NotFound) => return bad_request(ERR_BAD_REQUEST),
                Err(err) => return internal_error(err),
            },
            "color" => {
                if parse_color_param(value).is_none() {
                    return bad_request(ERR_BAD_REQUEST);
                }
                settings.color = Some(value.to_string());
            }
            _ => return bad_request(ERR_BAD_REQUEST),
        }
    }

    let svg = match avatar_svg(&settings) {
        Ok(svg) => svg,
        Err(_) => return bad_request(ERR_BAD_REQUEST),
    };

    if ext == "png" {
        let pixmap = match state
            .media
            .svg_to_pixmap(&svg, settings.width as u32, settings.height as u32)
        {
            Ok(pixmap) => pixmap,
            Err(err) => return internal_error(err),
        };
        return match pixmap.encode_png() {
            Ok(png) => ([(header::CONTENT_TYPE, "image/png")], png).into_response(),
            Err(err) => internal_error(err),
        };
    }

    ([(header::CONTENT_TYPE, "image/svg+xml")], svg).into_response()
}

/// `{width}x{height}.{ext}` with 2-4 digit dimensions and an svg/png suffix.
fn parse_avatar_filename(filename: &str) -> Option<(i32, i32, &str)> {
    let (stem, ext) = filename.rsplit_once('.')?;
    if ext != "svg" && ext != "png" {
        return None;
    }
    let (w, h) = stem.split_once('x')?;
    if !(2..=4).contains(&w.len()) || !(2..=4).contains(&h.len()) {
        return None;
    }
    let width: i32 = w.parse().ok()?;
    let height: i32 = h.parse().ok()?;
    Some((width, height, ext))
}

// Customisations

pub async fn handle_customization(
    State(state): State<AppState>,
    Path((kind, file)): Path<(String, String)>,
    Query(query): Query<RenderQuery>,
) -> Response {
    let Some(name) = file.strip_suffix(".svg") else {
        return bad_request(ERR_BAD_REQUEST);
    };
    if !is_valid_customization_name(name) {
        return bad_request(ERR_BAD_REQUEST);
    }

    let asset_kind = match kind.as_str() {
        "head" => AssetKind::Head,
        "tail" => AssetKind::Tail,
        _ => return bad_request(ERR_BAD_REQUEST),
    };

    let color = match query.color.as_deref() {
        None | Some("") => common::Rgba::BLACK,
        Some(value) => match parse_color_param(value) {
            Some(color) => color,
            None => return bad_request(ERR_BAD_COLOR),
        },
    };

    let flipped_param = query.flipped.as_deref().is_some_and(|f| !f.is_empty());

    let (svg_result, flip) = match asset_kind {
        AssetKind::Head => (state.media.get_head_svg(name).await, flipped_param),
        // tails face left by default, so "flipped" means un-mirrored
        AssetKind::Tail => (state.media.get_tail_svg(name).await, !flipped_param),
    };

    let raw_svg = match svg_result {
        Ok(svg) => svg,
        Err(MediaError::NotFound) => return not_found("resource not found"),
        Err(err) => return internal_error(err),
    };

    match svg::customize_snake_svg(&raw_svg, color, flip) {
        Ok(svg) => ([(header::CONTENT_TYPE, "image/svg+xml")], svg).into_response(),
        Err(err) => internal_error(err),
    }
}

// ASCII frames

pub async fn handle_frame_ascii(
    State(state): State<AppState>,
    Path((game_id, frame)): Path<(String, String)>,
    Query(query): Query<RenderQuery>,
) -> Response {
    render_frame_ascii(state, game_id, frame, query).await
}

/// The `.txt` spelling of the ASCII route: `/games/{game}/frames/{frame}.txt`.
pub async fn handle_frame_ascii_txt(
    State(state): State<AppState>,
    Path((game_id, frame_file)): Path<(String, String)>,
    Query(query): Query<RenderQuery>,
) -> Response {
    let Some(frame) = frame_file.strip_suffix(".txt") else {
        return not_found("not found");
    };
    render_frame_ascii(state, game_id, frame.to_string(), query).await
}

async fn render_frame_ascii(
    state: AppState,
    game_id: String,
    frame: String,
    query: RenderQuery,
) -> Response {
    let Ok(frame_index) = frame.parse::<usize>() else {
        return bad_request(format!("invalid frame: {frame}"));
    };
    let engine_url = query.engine_url.as_deref();

    let game = match state.engine.get_game(&game_id, engine_url).await {
        Ok(game) => game,
        Err(err) => return engine_error_response(err),
    };
    let game_frame = match state
        .engine
        .get_game_frame(&game.id, engine_url, frame_index)
        .await
    {
        Ok(frame) => frame,
        Err(err) => return engine_error_response(err),
    };

    let board = common::Board::from_game_frame(&game, &game_frame);
    render_ascii(&board).into_response()
}

// Dimension validation

fn parse_size_param(size: &str) -> Result<(i32, i32), String> {
    let stem = size
        .strip_suffix(".gif")
        .ok_or_else(|| ERR_BAD_REQUEST.to_string())?;
    let (w, h) = stem
        .split_once('x')
        .ok_or_else(|| format!("invalid size: {stem}"))?;
    let width: i32 = w.parse().map_err(|_| format!("invalid width: {w}"))?;
    let height: i32 = h.parse().map_err(|_| format!("invalid height: {h}"))?;

    if width < 0 || height < 0 {
        return Err(format!("Dimensions {width}x{height} invalid"));
    }
    if (width as i64) * (height as i64) > MAX_GIF_RESOLUTION {
        return Err(format!(
            "Dimensions {width}x{height} invalid - maximum total resolution is {MAX_GIF_RESOLUTION} pixels"
        ));
    }

    Ok((width, height))
}

/// Non-zero dimensions must match one of the four supported square sizes for
/// this particular board; the error spells out every valid option.
fn validate_dimensions_for_board(game: &Game, width: i32, height: i32) -> Result<(), String> {
    // the legacy routes pass 0x0 for "default size"
    if width == 0 || height == 0 {
        return Ok(());
    }

    let border = render::BOARD_BORDER * 2;
    let mut options = Vec::with_capacity(ALLOWED_PIXELS_PER_SQUARE.len());
    for r in ALLOWED_PIXELS_PER_SQUARE {
        let aw = game.width * r + border;
        let ah = game.height * r + border;
        options.push(format!("{aw}x{ah}"));
        if aw == width && ah == height {
            return Ok(());
        }
    }

    Err(format!(
        "Dimensions {width}x{height} invalid - valid options are: {}",
        options.join(", ")
    ))
}

// Single-frame GIFs

pub async fn handle_frame_gif(
    State(state): State<AppState>,
    Path((game_id, frame)): Path<(String, String)>,
    Query(query): Query<RenderQuery>,
) -> Response {
    render_frame_gif(state, game_id, frame, 0, 0, query).await
}

pub async fn handle_frame_gif_sized(
    State(state): State<AppState>,
    Path((game_id, frame, size)): Path<(String, String, String)>,
    Query(query): Query<RenderQuery>,
) -> Response {
    let (width, height) = match parse_size_param(&size) {
        Ok(dims) => dims,
        Err(message) => return bad_request(message),
    };
    render_frame_gif(state, game_id, frame, width, height, query).await
}

async fn render_frame_gif(
    state: AppState,
    game_id: String,
    frame: String,
    width: i32,
    height: i32,
    query: RenderQuery,
) -> Response {
    let Some(_permit) = state.pool.try_submit().await else {
        return reject_overloaded();
    };

    let Ok(frame_index) = frame.parse::<usize>() else {
        return bad_request(format!("invalid frame: {frame}"));
    };
    info!(game = %game_id, frame = frame_index, "exporting frame");

    let engine_url = query.engine_url.as_deref();
    let game = match state.engine.get_game(&game_id, engine_url).await {
        Ok(game) => game,
        Err(err) => return engine_error_response(err),
    };
    if let Err(message) = validate_dimensions_for_board(&game, width, height) {
        return bad_request(message);
    }
    let game_frame = match state
        .engine
        .get_game_frame(&game.id, engine_url, frame_index)
        .await
    {
        Ok(frame) => frame,
        Err(err) => return engine_error_response(err),
    };

    let mut body = Vec::new();
    if let Err(err) =
        render::render_frame(&mut body, &state.renderer, &game, &game_frame, width, height).await
    {
        return internal_error(err);
    }

    ([(header::CONTENT_TYPE, "image/gif")], body).into_response()
}

// Animated GIFs

pub async fn handle_game_gif(
    State(state): State<AppState>,
    Path(game_id): Path<String>,
    Query(query): Query<RenderQuery>,
) -> Response {
    render_game_gif(state, game_id, 0, 0, query).await
}

pub async fn handle_game_gif_sized(
    State(state): State<AppState>,
    Path((game_id, size)): Path<(String, String)>,
    Query(query): Query<RenderQuery>,
) -> Response {
    let (width, height) = match parse_size_param(&size) {
        Ok(dims) => dims,
        Err(message) => return bad_request(message),
    };
    render_game_gif(state, game_id, width, height, query).await
}

async fn render_game_gif(
    state: AppState,
    game_id: String,
    width: i32,
    height: i32,
    query: RenderQuery,
) -> Response {
    let Some(permit) = state.pool.try_submit().await else {
        return reject_overloaded();
    };

    let engine_url = query.engine_url.as_deref();
    info!(game = %game_id, engine_url = ?engine_url, "exporting game");

    let game = match state.engine.get_game(&game_id, engine_url).await {
        Ok(game) => game,
        Err(err) => return engine_error_response(err),
    };
    if let Err(message) = validate_dimensions_for_board(&game, width, height) {
        return bad_request(message);
    }

    let (offset, limit) = match parse_frames_range(query.frames.as_deref()) {
        Ok(range) => range,
        Err(message) => return bad_request(message),
    };
    let frames = match state
        .engine
        .get_game_frames(&game.id, engine_url, offset, limit)
        .await
    {
        Ok(frames) => frames,
        Err(err) => return engine_error_response(err),
    };
    if frames.is_empty() {
        return not_found("no frames found");
    }

    let options = AnimationOptions {
        frame_delay: parse_delay(query.frame_delay.as_deref(), GIF_FRAME_DELAY),
        loop_delay: parse_delay(query.loop_delay.as_deref(), GIF_LOOP_DELAY),
        width,
        height,
    };

    // frames stream out as they are encoded; the pool permit rides along
    // with the render task so the slot stays occupied until the body is done
    let (tx, mut rx) = mpsc::unbounded_channel::<Result<Bytes, io::Error>>();
    let renderer = state.renderer.clone();
    let game_for_log = game.id.clone();
    tokio::spawn(async move {
        let _permit = permit;
        let writer = ChannelWriter { tx: tx.clone() };
        if let Err(err) = render::render_animated(writer, renderer, game, frames, options).await {
            error!(game = %game_for_log, error = %err, "animated GIF render failed");
            let _ = tx.send(Err(io::Error::other(err.to_string())));
        }
    });

    // hold the response until the first chunk so pre-stream failures still
    // produce a real error status
    match rx.recv().await {
        Some(Ok(first)) => {
            let stream = futures::stream::once(async move { Ok::<_, io::Error>(first) })
                .chain(UnboundedReceiverStream::new(rx));
            (
                [(header::CONTENT_TYPE, "image/gif")],
                Body::from_stream(stream),
            )
                .into_response()
        }
        Some(Err(err)) => internal_error(err),
        None => internal_error("render finished without output"),
    }
}

fn reject_overloaded() -> Response {
    warn!("no render worker available from pool, rejecting request");
    StatusCode::TOO_MANY_REQUESTS.into_response()
}

/// `frames=<start>-<end>`, inclusive on both ends. Absent means everything.
fn parse_frames_range(param: Option<&str>) -> Result<(usize, usize), String> {
    let Some(param) = param.filter(|p| !p.is_empty()) else {
        return Ok((0, usize::MAX));
    };

    let parts: Vec<&str> = param.split('-').collect();
    if parts.len() != 2 {
        return Err(format!("invalid frames parameter: {param}"));
    }
    let start: usize = parts[0]
        .parse()
        .map_err(|_| format!("invalid frames parameter: {param}"))?;
    let end: usize = parts[1]
        .parse()
        .map_err(|_| format!("invalid frames parameter: {param}"))?;

    let limit = if end >= start { end - start + 1 } else { 0 };
    Ok((start, limit))
}

fn parse_delay(param: Option<&str>, default: u16) -> u16 {
    param
        .and_then(|value| value.parse::<u16>().ok())
        .unwrap_or(default)
}

/// Adapts the byte-oriented GIF encoder to a streamed response body.
struct ChannelWriter {
    tx: mpsc::UnboundedSender<Result<Bytes, io::Error>>,
}

impl Write for ChannelWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.tx
            .send(Ok(Bytes::copy_from_slice(buf)))
            .map_err(|_| io::Error::new(io::ErrorKind::BrokenPipe, "response body closed"))?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
