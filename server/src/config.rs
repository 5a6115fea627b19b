use std::env;

const DEFAULT_PORT: u16 = 8000;
const DEFAULT_ENGINE_URL: &str = "https://engine.battlesnake.com";
const DEFAULT_MEDIA_URL: &str = "https://media.battlesnake.com";
const DEFAULT_CACHE_CONTROL_MAX_AGE_SECONDS: u64 = 86400; // 24 hours

/// How many queued renders each worker is allowed before requests are
/// rejected with HTTP 429.
const RENDER_BACKLOG_PER_WORKER: usize = 40;

/// Runtime configuration, read once from the environment at startup.
#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub app_version: String,
    pub cache_control_max_age_seconds: u64,
    pub engine_url: String,
    pub media_url: String,
    /// Concurrent heavy renders; defaults to the number of CPU cores.
    pub render_workers: usize,
    /// Bounded submit queue behind the render workers.
    pub render_backlog: usize,
    /// `resvg` (in-process, the default), `inkscape`, or `inkscape:<command>`.
    pub svg_rasterizer: String,
}

impl Config {
    pub fn from_env() -> Self {
        let workers = env::var("RENDER_WORKERS")
            .ok()
            .and_then(|v| v.parse().ok())
            .filter(|&n: &usize| n > 0)
            .unwrap_or_else(|| {
                std::thread::available_parallelism()
                    .map(|n| n.get())
                    .unwrap_or(1)
            });

        let backlog = env::var("RENDER_BACKLOG")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(workers * RENDER_BACKLOG_PER_WORKER);

        Config {
            port: env::var("PORT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(DEFAULT_PORT),
            app_version: env::var("APP_VERSION").unwrap_or_else(|_| "unknown".to_string()),
            cache_control_max_age_seconds: env::var("CACHE_CONTROL_MAX_AGE_SECONDS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(DEFAULT_CACHE_CONTROL_MAX_AGE_SECONDS),
            engine_url: env::var("ENGINE_URL").unwrap_or_else(|_| DEFAULT_ENGINE_URL.to_string()),
            media_url: env::var("MEDIA_URL").unwrap_or_else(|_| DEFAULT_MEDIA_URL.to_string()),
            render_workers: workers,
            render_backlog: backlog,
            svg_rasterizer: env::var("SVG_RASTERIZER").unwrap_or_else(|_| "resvg".to_string()),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Config {
            port: DEFAULT_PORT,
            app_version: "unknown".to_string(),
            cache_control_max_age_seconds: DEFAULT_CACHE_CONTROL_MAX_AGE_SECONDS,
            engine_url: DEFAULT_ENGINE_URL.to_string(),
            media_url: DEFAULT_MEDIA_URL.to_string(),
            render_workers: 1,
            render_backlog: RENDER_BACKLOG_PER_WORKER,
            svg_rasterizer: "resvg".to_string(),
        }
    }
}
