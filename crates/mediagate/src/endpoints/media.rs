use std::io;

use axum::body::Body;
use axum::extract::{Path, State};
use axum::http::{HeaderMap, header};
use axum::response::{IntoResponse, Response};
use tokio_util::io::ReaderStream;

use mediagate_sources::ObjectKey;
use mediagate_service::caching::CacheError;

use crate::endpoints::ResponseError;
use crate::service::ServiceState;

/// Content type by file extension for the media formats the archive holds.
fn content_type_for(key: &ObjectKey) -> &'static str {
    let Some(extension) = key.extension() else {
        return "application/octet-stream";
    };
    match extension.to_ascii_lowercase().as_str() {
        "jpg" | "jpeg" => "image/jpeg",
        "png" => "image/png",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "mp4" => "video/mp4",
        "mov" => "video/quicktime",
        "webm" => "video/webm",
        "mp3" => "audio/mpeg",
        "ogg" | "oga" => "audio/ogg",
        "wav" => "audio/wav",
        "m4a" => "audio/mp4",
        "pdf" => "application/pdf",
        "txt" => "text/plain; charset=utf-8",
        "json" => "application/json",
        _ => "application/octet-stream",
    }
}

/// Resolves a media file through the cache and streams it back.
pub async fn serve_media(
    State(service): State<ServiceState>,
    headers: HeaderMap,
    Path(filename): Path<String>,
) -> Result<Response, ResponseError> {
    if service.auth().authorize(&headers).is_none() {
        return Err(ResponseError::unauthorized());
    }

    let key = ObjectKey::new(&filename).map_err(CacheError::from)?;
    let local_path = service.media_cache().resolve(&key).await?;

    let file = match tokio::fs::File::open(&local_path).await {
        Ok(file) => file,
        // The entry was evicted between resolution and open; treat it as a
        // fresh miss once.
        Err(err) if err.kind() == io::ErrorKind::NotFound => {
            let local_path = service.media_cache().resolve(&key).await?;
            tokio::fs::File::open(&local_path).await?
        }
        Err(err) => return Err(err.into()),
    };

    let body = Body::from_stream(ReaderStream::new(file));
    let response = ([(header::CONTENT_TYPE, content_type_for(&key))], body);
    Ok(response.into_response())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_content_type_for() {
        let ct = |name: &str| content_type_for(&ObjectKey::new(name).unwrap());
        assert_eq!(ct("IMG_2041.JPG"), "image/jpeg");
        assert_eq!(ct("voice-note.ogg"), "audio/ogg");
        assert_eq!(ct("clip.mp4"), "video/mp4");
        assert_eq!(ct("unknown.blob"), "application/octet-stream");
        assert_eq!(ct("no-extension"), "application/octet-stream");
    }
}
