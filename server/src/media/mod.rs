mod cache;
pub mod svg;

use std::sync::Arc;
use std::time::Duration;

use tiny_skia::Pixmap;
use tracing::{debug, info};

use common::Rgba;

use crate::raster::{self, Rotation, SvgRasterizer};

pub use cache::TtlCache;

const SVG_CACHE_TTL: Duration = Duration::from_secs(6 * 60 * 60);
const IMAGE_CACHE_TTL: Duration = Duration::from_secs(60 * 60);
const CACHE_SWEEP_PERIOD: Duration = Duration::from_secs(10 * 60);

const FALLBACK_HEAD_SVG: &str = include_str!("../../assets/heads/default.svg");
const FALLBACK_TAIL_SVG: &str = include_str!("../../assets/tails/default.svg");
const WATERMARK_SVG: &str = include_str!("../../assets/watermark.svg");

#[derive(Debug, thiserror::Error)]
pub enum MediaError {
    #[error("resource not found")]
    NotFound,
    #[error("got non 200 from media server: {0}")]
    Status(u16),
    #[error(transparent)]
    Transport(#[from] reqwest::Error),
    #[error("unable to render asset: {0}")]
    Render(#[from] anyhow::Error),
}

/// The two sprite families served by the media server.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssetKind {
    Head,
    Tail,
}

impl AssetKind {
    fn remote_path(&self, name: &str) -> String {
        match self {
            AssetKind::Head => format!("snakes/heads/{name}.svg"),
            AssetKind::Tail => format!("snakes/tails/{name}.svg"),
        }
    }

    fn fallback_svg(&self) -> &'static str {
        match self {
            AssetKind::Head => FALLBACK_HEAD_SVG,
            AssetKind::Tail => FALLBACK_TAIL_SVG,
        }
    }
}

/// Client for the media server plus the process-wide asset caches: raw SVG
/// text keyed by path, and rasterised sprite images keyed by everything that
/// shapes the pixels (path, size, colour, rotation).
pub struct MediaApi {
    base_url: String,
    http: reqwest::Client,
    rasterizer: Arc<dyn SvgRasterizer>,
    svg_cache: Arc<TtlCache<String, Arc<String>>>,
    image_cache: Arc<TtlCache<String, Arc<Pixmap>>>,
}

impl MediaApi {
    pub fn new(base_url: String, rasterizer: Arc<dyn SvgRasterizer>) -> Self {
        MediaApi {
            base_url,
            http: reqwest::Client::new(),
            rasterizer,
            svg_cache: Arc::new(TtlCache::new(SVG_CACHE_TTL)),
            image_cache: Arc::new(TtlCache::new(IMAGE_CACHE_TTL)),
        }
    }

    /// Starts the background sweep tasks. Requires a tokio runtime.
    pub fn start_sweepers(&self) {
        cache::spawn_sweeper(&self.svg_cache, CACHE_SWEEP_PERIOD);
        cache::spawn_sweeper(&self.image_cache, CACHE_SWEEP_PERIOD);
    }

    pub async fn get_head_svg(&self, name: &str) -> Result<String, MediaError> {
        let svg = self
            .get_media_resource(&AssetKind::Head.remote_path(name))
            .await?;
        Ok(svg.as_ref().clone())
    }

    pub async fn get_tail_svg(&self, name: &str) -> Result<String, MediaError> {
        let svg = self
            .get_media_resource(&AssetKind::Tail.remote_path(name))
            .await?;
        Ok(svg.as_ref().clone())
    }

    /// A head or tail sprite rasterised at `width`×`height`, recoloured and
    /// rotated. Falls back to the bundled default silhouette when the remote
    /// asset is missing or cannot be rasterised.
    pub async fn get_snake_png(
        &self,
        kind: AssetKind,
        name: &str,
        width: u32,
        height: u32,
        color: Rgba,
        rotation: Rotation,
    ) -> Result<Arc<Pixmap>, MediaError> {
        let path = kind.remote_path(name);
        let key = format!(
            "{}:{}:{}:{}:{}",
            path,
            width,
            height,
            color.hex6(),
            rotation.cache_key()
        );
        if let Some(image) = self.image_cache.get(&key) {
            return Ok(image);
        }

        let pixmap = match self.remote_snake_pixmap(&path, width, height, color).await {
            Ok(pixmap) => pixmap,
            Err(err) => {
                // this can fail just because someone asked for a snake type
                // that doesn't exist, so log at info and fall back
                info!(path = %path, error = %err, "unable to load SVG image asset - loading fallback");
                self.rasterize_colored(kind.fallback_svg(), width, height, color)?
            }
        };

        let image = Arc::new(raster::rotate(&pixmap, rotation));
        self.image_cache.insert(key, image.clone());
        Ok(image)
    }

    /// The watermark drawn behind every board, scaled to the requested size.
    pub async fn get_watermark_png(
        &self,
        width: u32,
        height: u32,
    ) -> Result<Arc<Pixmap>, MediaError> {
        let key = format!("watermark:{width}:{height}");
        if let Some(image) = self.image_cache.get(&key) {
            return Ok(image);
        }

        let pixmap = self
            .rasterizer
            .rasterize(WATERMARK_SVG.as_bytes(), width, height)?;
        let image = Arc::new(pixmap);
        self.image_cache.insert(key, image.clone());
        Ok(image)
    }

    async fn remote_snake_pixmap(
        &self,
        path: &str,
        width: u32,
        height: u32,
        color: Rgba,
    ) -> Result<Pixmap, MediaError> {
        let svg = self.get_media_resource(path).await?;
        Ok(self.rasterize_colored(&svg, width, height, color)?)
    }

    fn rasterize_colored(
        &self,
        svg: &str,
        width: u32,
        height: u32,
        color: Rgba,
    ) -> Result<Pixmap, anyhow::Error> {
        if !self.rasterizer.available() {
            anyhow::bail!("rasterizer is not available - unable to convert SVG");
        }
        let customized = svg::customize_snake_svg(svg, color, false)?;
        self.rasterizer.rasterize(customized.as_bytes(), width, height)
    }

    /// Converts arbitrary SVG text to a pixel image, for avatar PNG output.
    pub fn svg_to_pixmap(
        &self,
        svg: &str,
        width: u32,
        height: u32,
    ) -> Result<Pixmap, MediaError> {
        if !self.rasterizer.available() {
            return Err(MediaError::Render(anyhow::anyhow!(
                "rasterizer is not available - unable to convert SVG"
            )));
        }
        Ok(self.rasterizer.rasterize(svg.as_bytes(), width, height)?)
    }

    async fn get_media_resource(&self, path: &str) -> Result<Arc<String>, MediaError> {
        if let Some(svg) = self.svg_cache.get(&path.to_string()) {
            return Ok(svg);
        }

        let resource = Arc::new(self.fetch_media_resource(path).await?);
        self.svg_cache.insert(path.to_string(), resource.clone());
        Ok(resource)
    }

    async fn fetch_media_resource(&self, path: &str) -> Result<String, MediaError> {
        let url = format!("{}/{}", self.base_url.trim_end_matches('/'), path);
        debug!(url = %url, "fetching media resource");

        let response = self.http.get(&url).send().await?;
        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND || status == reqwest::StatusCode::FORBIDDEN {
            return Err(MediaError::NotFound);
        }
        if !status.is_success() {
            return Err(MediaError::Status(status.as_u16()));
        }

        Ok(response.text().await?)
    }
}
