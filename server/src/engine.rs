use serde::Deserialize;
use tracing::debug;

use common::{Game, GameFrame};

/// Frames are fetched from the engine in pages of this size.
const FRAME_BATCH_SIZE: usize = 100;

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("resource not found")]
    NotFound,
    #[error("got non 200 from engine: {0}")]
    Status(u16),
    #[error(transparent)]
    Transport(#[from] reqwest::Error),
}

#[derive(Debug, Deserialize)]
struct GameStatusResponse {
    #[serde(rename = "Game")]
    game: Game,
}

#[derive(Debug, Deserialize)]
struct GameFramesResponse {
    #[serde(rename = "frames", default)]
    frames: Vec<GameFrame>,
}

/// Read-only client for the game engine's REST API.
#[derive(Debug, Clone)]
pub struct EngineApi {
    http: reqwest::Client,
    default_base_url: String,
}

impl EngineApi {
    pub fn new(default_base_url: String) -> Self {
        EngineApi {
            http: reqwest::Client::new(),
            default_base_url,
        }
    }

    /// Resolves the base URL for a request: an explicit `engine_url` query
    /// parameter wins over the configured default.
    fn base_url<'a>(&'a self, override_url: Option<&'a str>) -> &'a str {
        match override_url {
            Some(url) if !url.is_empty() => url,
            _ => &self.default_base_url,
        }
    }

    async fn api_call<T: serde::de::DeserializeOwned>(
        &self,
        base: Option<&str>,
        path: &str,
    ) -> Result<T, EngineError> {
        let url = format!("{}/{}", self.base_url(base).trim_end_matches('/'), path);
        debug!(url = %url, "engine api call");

        let response = self.http.get(&url).send().await?;
        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(EngineError::NotFound);
        }
        if !response.status().is_success() {
            return Err(EngineError::Status(response.status().as_u16()));
        }

        Ok(response.json().await?)
    }

    pub async fn get_game(&self, game_id: &str, base: Option<&str>) -> Result<Game, EngineError> {
        let response: GameStatusResponse =
            self.api_call(base, &format!("games/{game_id}")).await?;
        Ok(response.game)
    }

    async fn get_frames_page(
        &self,
        game_id: &str,
        base: Option<&str>,
        offset: usize,
        limit: usize,
    ) -> Result<Vec<GameFrame>, EngineError> {
        let response: GameFramesResponse = self
            .api_call(
                base,
                &format!("games/{game_id}/frames?offset={offset}&limit={limit}"),
            )
            .await?;
        Ok(response.frames)
    }

    pub async fn get_game_frame(
        &self,
        game_id: &str,
        base: Option<&str>,
        frame_index: usize,
    ) -> Result<GameFrame, EngineError> {
        let frames = self.get_frames_page(game_id, base, frame_index, 1).await?;
        frames.into_iter().next().ok_or(EngineError::NotFound)
    }

    /// Fetches up to `limit` frames starting at `offset`, paging through the
    /// engine in batches and stopping early on a short page.
    pub async fn get_game_frames(
        &self,
        game_id: &str,
        base: Option<&str>,
        offset: usize,
        limit: usize,
    ) -> Result<Vec<GameFrame>, EngineError> {
        let mut frames: Vec<GameFrame> = Vec::new();
        if limit == 0 {
            return Ok(frames);
        }

        let mut offset = offset;
        loop {
            let batch_size = FRAME_BATCH_SIZE.min(limit - frames.len());
            let page = self
                .get_frames_page(game_id, base, offset, batch_size)
                .await?;
            let page_len = page.len();
            frames.extend(page);

            if frames.len() >= limit {
                break;
            }
            // a short page means there are no more frames to get
            if page_len < batch_size {
                break;
            }
            offset += page_len;
        }

        Ok(frames)
    }
}
