use super::error_response::bad_request;
use super::AppState;
use crate::error::Result;
use crate::media::{archive_filename, SingleAsset, TargetFormat};
use axum::{
    body::Body,
    extract::{Query, State},
    http::header,
    response::{IntoResponse, Response},
    Json,
};
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use tokio_util::io::ReaderStream;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Buffer between the archive writer task and the response body
const ARCHIVE_PIPE_CAPACITY: usize = 64 * 1024;

#[derive(Debug, Deserialize)]
pub struct GalleryRequest {
    #[serde(default)]
    pub url: String,
}

#[derive(Debug, Serialize)]
pub struct GalleryResponse {
    pub title: String,
    pub images: Vec<String>,
    pub url: String,
    pub message: String,
}

#[derive(Debug, Deserialize)]
pub struct SingleDownloadQuery {
    pub url: Option<String>,
    pub format: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ZipDownloadRequest {
    #[serde(default)]
    pub image_urls: Vec<String>,
    pub format: Option<String>,
    #[serde(default)]
    pub page_title: String,
}

fn parse_format(format: Option<&str>) -> Result<TargetFormat> {
    format.unwrap_or_default().parse()
}

/// POST /api/gallery
pub async fn load_gallery(
    State(state): State<AppState>,
    Json(request): Json<GalleryRequest>,
) -> Result<Json<GalleryResponse>> {
    // Cancels upstream work if the client hangs up mid-request
    let cancel = CancellationToken::new();
    let _guard = cancel.clone().drop_guard();

    let gallery = state.media.resolve_and_fetch(&request.url, &cancel).await?;
    Ok(Json(GalleryResponse {
        message: format!("Loaded {} images!", gallery.images.len()),
        title: gallery.title,
        images: gallery.images,
        url: gallery.source_url,
    }))
}

/// GET /download-single?url=..&format=..
pub async fn download_single(
    State(state): State<AppState>,
    Query(query): Query<SingleDownloadQuery>,
) -> Response {
    let Some(url) = query.url.filter(|url| !url.is_empty()) else {
        return bad_request("missing_url", "Missing URL");
    };

    let response = match parse_format(query.format.as_deref()) {
        Ok(format) => single_asset_response(&state, &url, format).await,
        Err(e) => Err(e),
    };
    response.unwrap_or_else(IntoResponse::into_response)
}

/// POST /download-zip
pub async fn download_zip(
    State(state): State<AppState>,
    Json(request): Json<ZipDownloadRequest>,
) -> Response {
    let format = match parse_format(request.format.as_deref()) {
        Ok(format) => format,
        Err(e) => return e.into_response(),
    };

    match request.image_urls.as_slice() {
        [] => bad_request("no_images_selected", "No images selected"),
        [url] => single_asset_response(&state, url, format)
            .await
            .unwrap_or_else(IntoResponse::into_response),
        _ => archive_response(state, request.image_urls, format, &request.page_title),
    }
}

async fn single_asset_response(
    state: &AppState,
    url: &str,
    format: TargetFormat,
) -> Result<Response> {
    let cancel = CancellationToken::new();
    let _guard = cancel.clone().drop_guard();

    let SingleAsset {
        body,
        filename,
        content_type,
    } = state.media.stream_single_asset(url, format, &cancel).await?;

    info!("Sending {} ({})", filename, content_type);
    Ok((
        [
            (header::CONTENT_TYPE, content_type),
            (header::CONTENT_DISPOSITION, content_disposition(&filename)),
        ],
        Body::from_stream(body),
    )
        .into_response())
}

fn archive_response(
    state: AppState,
    urls: Vec<String>,
    format: TargetFormat,
    page_title: &str,
) -> Response {
    let filename = archive_filename(page_title);
    let (writer, reader) = tokio::io::duplex(ARCHIVE_PIPE_CAPACITY);
    let cancel = CancellationToken::new();

    let task_cancel = cancel.clone();
    let archive_name = filename.clone();
    tokio::spawn(async move {
        let report = state
            .media
            .assemble_archive(&urls, format, &task_cancel, writer)
            .await;
        let names: Vec<&str> = report.written_entries().map(|(_, name)| name).collect();
        debug!("{} holds {}", archive_name, names.join(", "));
        for (url, reason) in report.failures() {
            debug!("Left out of archive: {} ({})", url, reason);
        }
        if report.written() == 0 {
            warn!("Archive for {} images finished empty", urls.len());
        }
    });

    // The body owns the guard: when the client goes away the body is
    // dropped and the assembler stops at its next checkpoint.
    let guard = cancel.drop_guard();
    let body = ReaderStream::new(reader).map(move |chunk| {
        let _ = &guard;
        chunk
    });

    info!("Streaming archive {}", filename);
    (
        [
            (header::CONTENT_TYPE, "application/zip".to_string()),
            (header::CONTENT_DISPOSITION, content_disposition(&filename)),
        ],
        Body::from_stream(body),
    )
        .into_response()
}

/// `attachment` disposition with an ASCII fallback name, plus the UTF-8 name
/// when the two differ.
fn content_disposition(filename: &str) -> String {
    let fallback: String = filename
        .chars()
        .map(|c| {
            if c.is_ascii_graphic() && c != '"' && c != '\\' {
                c
            } else {
                '_'
            }
        })
        .collect();

    if fallback == filename {
        format!("attachment; filename=\"{}\"", filename)
    } else {
        let encoded: String = url::form_urlencoded::byte_serialize(filename.as_bytes()).collect();
        format!(
            "attachment; filename=\"{}\"; filename*=UTF-8''{}",
            fallback, encoded
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::media::MediaService;
    use crate::reddit::test_support::client_for;
    use crate::server::create_router;
    use axum::http::{Request, StatusCode};
    use axum::Router;
    use serde_json::json;
    use std::io::{Cursor, Read};
    use std::sync::Arc;
    use tower::ServiceExt;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn app_for(mock_server: &MockServer) -> Router {
        create_router(Arc::new(MediaService::new(Arc::new(client_for(
            &mock_server.uri(),
        )))))
    }

    fn post_json(uri: &str, body: serde_json::Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    fn get(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    async fn body_bytes(response: Response) -> Vec<u8> {
        axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap()
            .to_vec()
    }

    async fn body_json(response: Response) -> serde_json::Value {
        serde_json::from_slice(&body_bytes(response).await).unwrap()
    }

    fn header_str<'a>(response: &'a Response, name: header::HeaderName) -> &'a str {
        response.headers().get(name).unwrap().to_str().unwrap()
    }

    async fn mount_asset(mock_server: &MockServer, asset_path: &str, body: &[u8], mime: &str) {
        Mock::given(method("GET"))
            .and(path(asset_path))
            .respond_with(ResponseTemplate::new(200).set_body_raw(body.to_vec(), mime))
            .mount(mock_server)
            .await;
    }

    #[test]
    fn test_content_disposition() {
        assert_eq!(
            content_disposition("photo.png"),
            "attachment; filename=\"photo.png\""
        );
        assert_eq!(
            content_disposition("Café.zip"),
            "attachment; filename=\"Caf_.zip\"; filename*=UTF-8''Caf%C3%A9.zip"
        );
    }

    #[tokio::test]
    async fn test_gallery_success() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/r/pics/comments/abc/t.json"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([{
                "data": {"children": [{"data": {
                    "title": "Two cats",
                    "is_gallery": true,
                    "gallery_data": {"items": [{"media_id": "m1"}, {"media_id": "m2"}]},
                    "media_metadata": {
                        "m1": {"s": {"u": "https://preview.redd.it/m1.jpg?a=1&amp;b=2"}},
                        "m2": {"s": {
                            "u": "https://preview.redd.it/m2.png",
                            "gif": "https://i.redd.it/m2.gif"
                        }}
                    }
                }}]}
            }])))
            .mount(&mock_server)
            .await;

        let input = format!("{}/r/pics/comments/abc/t/", mock_server.uri());
        let response = app_for(&mock_server)
            .oneshot(post_json("/api/gallery", json!({ "url": input })))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["title"], "Two cats");
        assert_eq!(
            body["images"],
            json!(["https://preview.redd.it/m1.jpg?a=1&b=2", "https://i.redd.it/m2.gif"])
        );
        assert_eq!(body["url"], input);
        assert_eq!(body["message"], "Loaded 2 images!");
    }

    #[tokio::test]
    async fn test_gallery_rejects_foreign_link() {
        let mock_server = MockServer::start().await;
        let response = app_for(&mock_server)
            .oneshot(post_json(
                "/api/gallery",
                json!({ "url": "https://example.com/r/pics/comments/abc" }),
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = body_json(response).await;
        assert_eq!(body["error"], "invalid_url");
        assert_eq!(body["message"], "That doesn't look like a valid Reddit link.");
    }

    #[tokio::test]
    async fn test_gallery_not_found() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                {"data": {"children": []}}
            ])))
            .mount(&mock_server)
            .await;

        let input = format!("{}/r/pics/comments/gone/t", mock_server.uri());
        let response = app_for(&mock_server)
            .oneshot(post_json("/api/gallery", json!({ "url": input })))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(body_json(response).await["error"], "post_not_found");
    }

    #[tokio::test]
    async fn test_download_single_missing_url() {
        let mock_server = MockServer::start().await;
        let response = app_for(&mock_server)
            .oneshot(get("/download-single?format=png"))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_json(response).await["message"], "Missing URL");
    }

    #[tokio::test]
    async fn test_download_single_unsupported_format() {
        let mock_server = MockServer::start().await;
        let response = app_for(&mock_server)
            .oneshot(get("/download-single?url=https%3A%2F%2Fi.redd.it%2Fa.png&format=tiff"))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_json(response).await["error"], "unsupported_format");
    }

    #[tokio::test]
    async fn test_download_single_original() {
        let mock_server = MockServer::start().await;
        mount_asset(&mock_server, "/img/cat.png", b"png bytes", "image/png").await;

        let asset_url = format!("{}/img/cat.png", mock_server.uri());
        let uri = format!(
            "/download-single?url={}",
            url::form_urlencoded::byte_serialize(asset_url.as_bytes()).collect::<String>()
        );
        let response = app_for(&mock_server).oneshot(get(&uri)).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(header_str(&response, header::CONTENT_TYPE), "image/png");
        assert_eq!(
            header_str(&response, header::CONTENT_DISPOSITION),
            "attachment; filename=\"cat.png\""
        );
        assert_eq!(body_bytes(response).await, b"png bytes");
    }

    #[tokio::test]
    async fn test_download_zip_empty_selection() {
        let mock_server = MockServer::start().await;
        let response = app_for(&mock_server)
            .oneshot(post_json(
                "/download-zip",
                json!({ "image_urls": [], "page_title": "x" }),
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_json(response).await["message"], "No images selected");
    }

    #[tokio::test]
    async fn test_download_zip_single_url_skips_archive() {
        let mock_server = MockServer::start().await;
        mount_asset(&mock_server, "/only.gif", b"GIF89a", "image/gif").await;

        let response = app_for(&mock_server)
            .oneshot(post_json(
                "/download-zip",
                json!({
                    "image_urls": [format!("{}/only.gif", mock_server.uri())],
                    "page_title": "Solo"
                }),
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(header_str(&response, header::CONTENT_TYPE), "image/gif");
        assert_eq!(
            header_str(&response, header::CONTENT_DISPOSITION),
            "attachment; filename=\"only.gif\""
        );
        assert_eq!(body_bytes(response).await, b"GIF89a");
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_download_zip_streams_archive() {
        let mock_server = MockServer::start().await;
        mount_asset(&mock_server, "/one.jpg", b"first", "image/jpeg").await;
        mount_asset(&mock_server, "/two.webp", b"second", "image/webp").await;

        let response = app_for(&mock_server)
            .oneshot(post_json(
                "/download-zip",
                json!({
                    "image_urls": [
                        format!("{}/one.jpg", mock_server.uri()),
                        format!("{}/two.webp", mock_server.uri())
                    ],
                    "format": "original",
                    "page_title": "My Gallery! 2024"
                }),
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(header_str(&response, header::CONTENT_TYPE), "application/zip");
        assert_eq!(
            header_str(&response, header::CONTENT_DISPOSITION),
            "attachment; filename=\"My_Gallery_2024.zip\""
        );

        let archive = body_bytes(response).await;
        let mut zip = zip::ZipArchive::new(Cursor::new(archive)).unwrap();
        assert_eq!(zip.len(), 2);

        let mut second = Vec::new();
        zip.by_name("image_002.webp")
            .unwrap()
            .read_to_end(&mut second)
            .unwrap();
        assert_eq!(second, b"second");
    }
}
