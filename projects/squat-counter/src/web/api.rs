use crate::pipeline::types::ProcessingState;
use crate::run_context::create_job;
use crate::web::assets::serve_download;
use crate::web::jobs::{run_job, JobRegistry, JobResult, JobSettings, JobStatus};
use axum::{
    body::Body,
    extract::{Multipart, Path, State},
    http::{header, HeaderMap, Response, StatusCode},
    response::sse::{Event, KeepAlive, Sse},
    Json,
};
use futures::Stream;
use serde_json::{json, Value};
use std::convert::Infallible;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;
use tokio_stream::wrappers::IntervalStream;
use tokio_stream::StreamExt;

const PROGRESS_INTERVAL: Duration = Duration::from_millis(500);

#[derive(Clone)]
pub struct AppState {
    pub settings: Arc<JobSettings>,
    pub registry: Arc<JobRegistry>,
}

type ApiError = (StatusCode, Json<Value>);

fn bad_request(message: impl Into<String>) -> ApiError {
    (
        StatusCode::BAD_REQUEST,
        Json(json!({ "error": message.into() })),
    )
}

fn internal_error(message: impl Into<String>) -> ApiError {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!({ "error": message.into() })),
    )
}

/// Scheme and host the client used, honouring a TLS-terminating proxy.
fn base_url(headers: &HeaderMap, fallback: &str) -> String {
    let scheme = match headers
        .get("x-forwarded-proto")
        .and_then(|v| v.to_str().ok())
    {
        Some("https") => "https",
        _ => "http",
    };

    match headers.get(header::HOST).and_then(|v| v.to_str().ok()) {
        Some(host) => format!("{}://{}", scheme, host),
        None => fallback.to_string(),
    }
}

pub async fn home_handler() -> Json<Value> {
    Json(json!({
        "info": "Welcome to the Squat Counter server!",
        "routes": {
            "/ping": "GET - Check if the server is live",
            "/upload": "POST - Upload a video (multipart field 'video') for squat analysis",
            "/result/{job_id}": "GET - Check processing status and get results",
            "/progress/{job_id}": "GET - Server-sent processing progress",
            "/processed/{filename}": "GET - Download a processed video"
        }
    }))
}

pub async fn ping_handler() -> Json<Value> {
    Json(json!({ "message": "Server is live!" }))
}

pub async fn upload_handler(
    State(app): State<AppState>,
    headers: HeaderMap,
    mut multipart: Multipart,
) -> Result<Json<Value>, ApiError> {
    let mut video: Option<(String, Vec<u8>)> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| bad_request(e.to_string()))?
    {
        if field.name() != Some("video") {
            continue;
        }
        let filename = field.file_name().unwrap_or("upload.mp4").to_string();
        let data = field
            .bytes()
            .await
            .map_err(|e| bad_request(e.to_string()))?;
        video = Some((filename, data.to_vec()));
    }

    let (filename, data) = video.ok_or_else(|| bad_request("No video file part"))?;

    let job_id = uuid::Uuid::new_v4().to_string();
    let settings = app.settings.clone();
    let context = create_job(
        &settings.upload_root,
        &settings.processed_root,
        &job_id,
        &filename,
    )
    .map_err(|e| internal_error(format!("{:#}", e)))?;

    tokio::fs::write(&context.input_path, &data)
        .await
        .map_err(|e| internal_error(e.to_string()))?;

    let video_url = format!(
        "{}/processed/{}",
        base_url(&headers, &settings.public_url),
        context.output_filename
    );

    let progress = Arc::new(ProcessingState::new(job_id.clone(), 0));
    app.registry
        .insert(&job_id, progress.clone(), JobStatus::Processing);
    tracing::info!(
        "Job {} created for {} ({} bytes)",
        job_id,
        filename,
        data.len()
    );

    let registry = app.registry.clone();
    let task_job_id = job_id.clone();
    tokio::spawn(async move {
        let outcome =
            tokio::task::spawn_blocking(move || run_job(&settings, &context, &progress)).await;

        let status = match outcome {
            Ok(Ok(summary)) => JobStatus::Done(JobResult { summary, video_url }),
            Ok(Err(e)) => JobStatus::Error(format!("{:#}", e)),
            Err(e) => JobStatus::Error(format!("processing task failed: {}", e)),
        };
        if let JobStatus::Error(message) = &status {
            tracing::error!("Job {} failed: {}", task_job_id, message);
        }
        registry.set_status(&task_job_id, status);
    });

    Ok(Json(json!({
        "status": "processing",
        "job_id": job_id,
        "message": "Video uploaded successfully. Processing started."
    })))
}

pub async fn result_handler(
    State(app): State<AppState>,
    Path(job_id): Path<String>,
) -> (StatusCode, Json<Value>) {
    match app.registry.status(&job_id) {
        None => (
            StatusCode::NOT_FOUND,
            Json(json!({ "status": "not_found", "error": "Job not found" })),
        ),
        Some(JobStatus::Processing) => (
            StatusCode::OK,
            Json(json!({ "status": "processing", "message": "Video is being processed..." })),
        ),
        Some(JobStatus::Error(error)) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({ "status": "error", "error": error })),
        ),
        Some(JobStatus::Done(result)) => (
            StatusCode::OK,
            Json(json!({ "status": "done", "result": result })),
        ),
    }
}

pub async fn processed_handler(
    State(app): State<AppState>,
    Path(filename): Path<String>,
) -> Result<Response<Body>, StatusCode> {
    serve_download(&app.settings.processed_root, &filename).await
}

pub async fn progress_handler(
    State(app): State<AppState>,
    Path(job_id): Path<String>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, StatusCode> {
    let progress = app.registry.progress(&job_id).ok_or(StatusCode::NOT_FOUND)?;
    let mut ticks = IntervalStream::new(tokio::time::interval(PROGRESS_INTERVAL));

    let stream = async_stream::stream! {
        while ticks.next().await.is_some() {
            let finished = !progress.is_active.load(Ordering::Relaxed);
            yield Ok(Event::default().data(progress.to_progress_json().to_string()));
            if finished {
                break;
            }
        }
    };

    Ok(Sse::new(stream).keep_alive(KeepAlive::default()))
}
