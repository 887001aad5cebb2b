use crate::cli::ServeArgs;
use crate::pipeline::config::AnalysisConfig;
use crate::web::api::{
    home_handler, ping_handler, processed_handler, progress_handler, result_handler,
    upload_handler, AppState,
};
use crate::web::jobs::{JobRegistry, JobSettings};
use anyhow::Result;
use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};
use std::fs;
use std::net::{IpAddr, SocketAddr, TcpListener};
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

/// Uploads larger than this are rejected before reaching the handler.
const MAX_UPLOAD_BYTES: usize = 1024 * 1024 * 1024;

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(home_handler))
        .route("/ping", get(ping_handler))
        .route("/upload", post(upload_handler))
        .route("/result/:job_id", get(result_handler))
        .route("/progress/:job_id", get(progress_handler))
        .route("/processed/:filename", get(processed_handler))
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn bind(host: IpAddr, port: u16) -> Result<TcpListener> {
    let mut current_port = port;
    loop {
        let addr = SocketAddr::new(host, current_port);
        match TcpListener::bind(addr) {
            Ok(listener) => {
                // Tokio requires non-blocking std listeners
                listener.set_nonblocking(true)?;
                info!("Successfully bound to {}", addr);
                return Ok(listener);
            }
            Err(e) => {
                warn!("Failed to bind to {}: {}. Trying next port...", addr, e);
                current_port = current_port.wrapping_add(1);
                if current_port == 0 {
                    return Err(anyhow::anyhow!("No available ports found"));
                }
            }
        }
    }
}

pub async fn run_server(args: ServeArgs) -> Result<()> {
    fs::create_dir_all(&args.upload_root)?;
    fs::create_dir_all(&args.processed_root)?;

    let listener = bind(args.host, args.port)?;
    let local_addr = listener.local_addr()?;
    let public_url = format!("http://{}", local_addr);

    let registry = JobRegistry::restore(&args.processed_root, &public_url);
    let settings = JobSettings {
        model_path: args.model.clone(),
        backend: args.backend,
        upload_root: args.upload_root.clone(),
        processed_root: args.processed_root.clone(),
        public_url,
        analysis: AnalysisConfig::default(),
    };

    let app = router(AppState {
        settings: Arc::new(settings),
        registry: Arc::new(registry),
    });

    let tokio_listener = tokio::net::TcpListener::from_std(listener)?;
    info!(
        "Squat counter server started on http://{:?}",
        tokio_listener.local_addr()?
    );

    axum::serve(tokio_listener, app).await?;

    Ok(())
}
