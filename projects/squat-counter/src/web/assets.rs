use axum::{
    body::Body,
    http::{header, HeaderValue, Response, StatusCode},
};
use std::path::Path;

/// Serve a file from `root` as a download. Names that would leave `root`
/// are rejected.
pub async fn serve_download(root: &Path, filename: &str) -> Result<Response<Body>, StatusCode> {
    if filename.is_empty()
        || filename.contains('/')
        || filename.contains('\\')
        || filename.starts_with('.')
    {
        return Err(StatusCode::BAD_REQUEST);
    }

    let path = root.join(filename);
    let data = match tokio::fs::read(&path).await {
        Ok(data) => data,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Err(StatusCode::NOT_FOUND),
        Err(e) => {
            tracing::warn!("Failed to read {}: {}", path.display(), e);
            return Err(StatusCode::INTERNAL_SERVER_ERROR);
        }
    };

    let mime = mime_guess::from_path(&path).first_or_octet_stream();
    let disposition = format!("attachment; filename=\"{}\"", filename);

    Response::builder()
        .header(
            header::CONTENT_TYPE,
            HeaderValue::from_str(mime.as_ref()).map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?,
        )
        .header(
            header::CONTENT_DISPOSITION,
            HeaderValue::from_str(&disposition).map_err(|_| StatusCode::BAD_REQUEST)?,
        )
        .body(Body::from(data))
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_serves_mp4_as_attachment() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("processed_a.mp4"), b"video").unwrap();

        let response = serve_download(dir.path(), "processed_a.mp4").await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[header::CONTENT_TYPE], "video/mp4");
        assert_eq!(
            response.headers()[header::CONTENT_DISPOSITION],
            "attachment; filename=\"processed_a.mp4\""
        );
    }

    #[tokio::test]
    async fn test_missing_and_escaping_names() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(
            serve_download(dir.path(), "nope.mp4").await.err(),
            Some(StatusCode::NOT_FOUND)
        );
        assert_eq!(
            serve_download(dir.path(), "..").await.err(),
            Some(StatusCode::BAD_REQUEST)
        );
    }
}
