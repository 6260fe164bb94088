//! Preset storage endpoints
//!
//! Surface layouts are opaque JSON documents stored per role name. The
//! bridge never parses them; it only moves them between disk and the
//! editor page, which lives on a different origin and needs open CORS.

use std::io;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tower_http::cors::{Any, CorsLayer};
use tracing::{debug, error, info};

use crate::config::BridgeConfig;
use crate::error::Result;

/// Preset files on disk, one JSON document per role
pub struct PresetStore {
    dir: PathBuf,
}

impl PresetStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Strip a role name down to `[A-Za-z0-9_]`.
    ///
    /// Everything else is dropped, which also kills path traversal. A name
    /// with nothing left becomes `default`.
    pub fn sanitize(role: &str) -> String {
        let cleaned: String = role
            .chars()
            .filter(|c| c.is_ascii_alphanumeric() || *c == '_')
            .collect();
        if cleaned.is_empty() {
            "default".to_string()
        } else {
            cleaned
        }
    }

    fn path_for(&self, role: &str) -> PathBuf {
        self.dir.join(format!("{}.json", Self::sanitize(role)))
    }

    pub fn load(&self, role: &str) -> io::Result<String> {
        std::fs::read_to_string(self.path_for(role))
    }

    pub fn save(&self, role: &str, body: &str) -> io::Result<()> {
        std::fs::create_dir_all(&self.dir)?;
        std::fs::write(self.path_for(role), body)
    }
}

/// The preset half of the bridge
pub struct PresetServer {
    config: BridgeConfig,
}

impl PresetServer {
    pub fn new(config: BridgeConfig) -> Self {
        Self { config }
    }

    /// Bind the HTTP listener; separate from running for ephemeral ports
    pub async fn bind(self) -> Result<BoundPresets> {
        let addr = self.config.http_addr();
        let listener = match TcpListener::bind(&addr).await {
            Ok(listener) => listener,
            Err(e) => {
                error!("failed to bind preset server on {}: {}", addr, e);
                return Err(e.into());
            }
        };
        info!("preset server listening on {}", listener.local_addr()?);
        Ok(BoundPresets {
            listener,
            store: PresetStore::new(self.config.presets_dir),
        })
    }
}

/// A preset server with its listener bound, ready to run
pub struct BoundPresets {
    listener: TcpListener,
    store: PresetStore,
}

impl BoundPresets {
    pub fn addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Serve preset requests until the listener stops
    pub async fn run(self) -> Result<()> {
        let app = preset_router(self.store);
        Ok(axum::serve(self.listener, app.into_make_service()).await?)
    }

    /// Spawn the server in a background task
    pub fn spawn(self) -> JoinHandle<Result<()>> {
        tokio::spawn(async move { self.run().await })
    }
}

/// GET and POST under `/presets/:role`, CORS open to any origin
pub fn preset_router(store: PresetStore) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);
    Router::new()
        .route("/presets/:role", get(load_preset).post(store_preset))
        .layer(cors)
        .with_state(Arc::new(store))
}

async fn load_preset(
    State(store): State<Arc<PresetStore>>,
    Path(role): Path<String>,
) -> Response {
    match store.load(&role) {
        Ok(body) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "application/json")],
            body,
        )
            .into_response(),
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            debug!("no preset stored for {}", role);
            StatusCode::NOT_FOUND.into_response()
        }
        Err(e) => {
            error!("failed to read preset {}: {}", role, e);
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

async fn store_preset(
    State(store): State<Arc<PresetStore>>,
    Path(role): Path<String>,
    body: String,
) -> StatusCode {
    match store.save(&role, &body) {
        Ok(()) => {
            info!("stored preset {} ({} bytes)", PresetStore::sanitize(&role), body.len());
            StatusCode::OK
        }
        Err(e) => {
            error!("failed to store preset {}: {}", role, e);
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}
