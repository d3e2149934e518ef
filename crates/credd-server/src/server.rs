use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result};
use axum::{
    routing::{get, post},
    Router,
};
use directories::ProjectDirs;
use http::HeaderValue;
use tower_http::cors::{AllowHeaders, AllowMethods, AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::{
    handlers::{health, login, register},
    store::{self, StoreUrl},
    AppState,
};

pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Store URL ($CREDD_STORE_URL). `CREDD_STORE_URL_FILE` takes precedence.
    pub store_url: Option<String>,
    pub data_dir: Option<PathBuf>,
    /// Upper bound on every store call ($CREDD_STORE_TIMEOUT_MS).
    pub store_timeout: Duration,
    /// `*` or a comma-separated origin list ($CREDD_CORS_ORIGINS).
    pub cors_origins: Option<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: std::env::var("CREDD_HOST").unwrap_or_else(|_| "0.0.0.0".into()),
            port: std::env::var("CREDD_PORT")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(8000),
            store_url: std::env::var("CREDD_STORE_URL").ok(),
            data_dir: std::env::var("CREDD_DATA_DIR").ok().map(PathBuf::from),
            store_timeout: Duration::from_millis(
                std::env::var("CREDD_STORE_TIMEOUT_MS")
                    .ok()
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(5000),
            ),
            cors_origins: std::env::var("CREDD_CORS_ORIGINS").ok(),
        }
    }
}

/// Read a secret from a file, trimming surrounding whitespace.
/// Fails if the file cannot be read or is empty after trimming.
pub fn read_secret_file(path: &Path) -> Result<String> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("read secret file: {}", path.display()))?;
    let secret = content.trim().to_string();
    if secret.is_empty() {
        anyhow::bail!("secret file is empty: {}", path.display());
    }
    Ok(secret)
}

/// Resolve the store from `CREDD_STORE_URL_FILE` (preferred), the configured URL,
/// or `credd.db` inside the data directory.
/// File-based delivery keeps connection credentials out of `docker inspect` and `/proc`.
pub fn resolve_store_url(cfg: &ServerConfig) -> Result<StoreUrl> {
    if let Ok(path) = std::env::var("CREDD_STORE_URL_FILE") {
        let url = read_secret_file(Path::new(&path))?;
        if cfg.store_url.is_some() {
            warn!("both CREDD_STORE_URL and CREDD_STORE_URL_FILE are set; using file");
        }
        return url.parse();
    }
    if let Some(url) = &cfg.store_url {
        return url.parse();
    }
    let dir = resolve_data_dir(cfg.data_dir.as_ref())?;
    Ok(StoreUrl::Redb(dir.join("credd.db")))
}

/// The configured directory (`CREDD_DATA_DIR`), else the platform data dir
/// (`~/.local/share/credd/` and the like). Created if missing.
pub fn resolve_data_dir(data_dir: Option<&PathBuf>) -> Result<PathBuf> {
    let path = match data_dir {
        Some(d) => d.clone(),
        None => ProjectDirs::from("", "", "credd")
            .context("could not determine platform data directory")?
            .data_dir()
            .to_owned(),
    };
    std::fs::create_dir_all(&path)
        .with_context(|| format!("create data dir: {}", path.display()))?;
    Ok(path)
}

/// Which origins may call the API cross-origin.
#[derive(Debug, Clone, PartialEq)]
pub enum CorsPolicy {
    /// `*`: any origin. The request origin is echoed back so credentials stay allowed.
    AnyOrigin,
    AllowList(Vec<HeaderValue>),
}

impl FromStr for CorsPolicy {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        let entries: Vec<&str> = s
            .split(',')
            .map(str::trim)
            .filter(|e| !e.is_empty())
            .collect();
        if entries.is_empty() || entries.contains(&"*") {
            return Ok(Self::AnyOrigin);
        }
        let origins = entries
            .into_iter()
            .map(|e| HeaderValue::from_str(e).with_context(|| format!("invalid CORS origin: {e}")))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self::AllowList(origins))
    }
}

pub fn build_cors(policy: &CorsPolicy) -> CorsLayer {
    let cors = CorsLayer::new()
        .allow_credentials(true)
        .allow_methods(AllowMethods::mirror_request())
        .allow_headers(AllowHeaders::mirror_request());

    match policy {
        CorsPolicy::AnyOrigin => cors.allow_origin(AllowOrigin::mirror_request()),
        CorsPolicy::AllowList(origins) => cors.allow_origin(origins.clone()),
    }
}

/// The full HTTP application.
pub fn router(state: AppState, cors: &CorsPolicy) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/register", post(register))
        .route("/login", post(login))
        .with_state(state)
        .layer(build_cors(cors))
        .layer(TraceLayer::new_for_http())
}

pub async fn run(cfg: ServerConfig) -> Result<()> {
    let store_url = resolve_store_url(&cfg)?;
    let cors = cfg
        .cors_origins
        .as_deref()
        .unwrap_or("*")
        .parse::<CorsPolicy>()?;
    if cors == CorsPolicy::AnyOrigin {
        warn!("CORS allows any origin with credentials; set CREDD_CORS_ORIGINS in production");
    }

    let store = store::open_store(&store_url).context("open store")?;
    match &store_url {
        StoreUrl::Memory => warn!("using in-memory store; users are lost on restart"),
        StoreUrl::Redb(path) => info!(path = %path.display(), "using redb store"),
    }

    let state = AppState::new(store, cfg.store_timeout);
    let app = router(state, &cors);

    let addr: SocketAddr = format!("{}:{}", cfg.host, cfg.port)
        .parse()
        .context("invalid host/port")?;

    info!(%addr, "credd listening");
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .context("bind listener")?;

    axum::serve(listener, app).await.context("server error")
}
