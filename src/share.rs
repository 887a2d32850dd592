//! 分享模式：提供下载页与文件下载。

use axum::body::Body as AxumBody;
use axum::extract::{ConnectInfo, Extension};
use axum::http::{HeaderMap, HeaderValue, Request, StatusCode, header};
use axum::response::{Html, IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use futures_util::StreamExt;
use httpdate::fmt_http_date;
use std::io;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs::{self, File};
use tokio_util::io::ReaderStream;
use tracing::{info, warn};

use crate::archive;
use crate::error::ApiError;
use crate::frontend;
use crate::http::resolve_client_ip;
use crate::progress::TransferProgress;
use crate::staging::StagedFile;

/// 正在分享的单个文件（可能是临时压缩包）。
#[derive(Clone, Debug)]
pub struct SharedFile {
    pub path: PathBuf,
    /// 下载时使用的文件名。
    pub name: String,
}

/// 启动前准备好的分享内容。`archive` 存活期间压缩包保留在临时目录。
#[derive(Debug)]
pub struct PreparedShare {
    pub file: SharedFile,
    pub archive: Option<StagedFile>,
}

#[derive(Debug)]
pub struct ShareState {
    pub file: SharedFile,
}

/// 校验路径并决定分享方式：单个文件直接分享，其余情况打包。
pub async fn prepare_shared_file(paths: &[PathBuf], temp_dir: &Path) -> io::Result<PreparedShare> {
    if paths.is_empty() {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            "nothing to share",
        ));
    }
    let mut single_file = None;
    for path in paths {
        let metadata = fs::metadata(path).await.map_err(|err| {
            let message = if err.kind() == io::ErrorKind::NotFound {
                format!("'{}' does not exist", path.display())
            } else {
                format!("unable to access '{}': {err}", path.display())
            };
            io::Error::new(err.kind(), message)
        })?;
        if paths.len() == 1 && metadata.is_file() {
            single_file = Some(path);
        }
    }

    if let Some(path) = single_file {
        let name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| "download".to_string());
        return Ok(PreparedShare {
            file: SharedFile {
                path: path.clone(),
                name,
            },
            archive: None,
        });
    }

    let name = archive::archive_name(paths);
    println!("📦 Creating archive {name}...");
    let staged = archive::create_archive(paths.to_vec(), temp_dir).await?;
    Ok(PreparedShare {
        file: SharedFile {
            path: staged.path().to_path_buf(),
            name,
        },
        archive: Some(staged),
    })
}

/// 分享模式的路由：`GET /` 下载页，`GET /download` 文件流。
pub fn router(state: Arc<ShareState>) -> Router {
    Router::new()
        .route("/", get(share_page))
        .route("/download", get(download))
        .fallback(frontend::serve_asset)
        .layer(Extension(state))
}

pub async fn share_page(
    Extension(state): Extension<Arc<ShareState>>,
) -> Result<Html<String>, ApiError> {
    frontend::share_page(&state.file.name)
}

/// 以附件形式流式发送分享文件，并在控制台显示发送进度。
pub async fn download(
    Extension(state): Extension<Arc<ShareState>>,
    request: Request<AxumBody>,
) -> Result<Response, ApiError> {
    let connect_ip = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip());
    let client = resolve_client_ip(request.headers(), connect_ip)
        .map(|ip| ip.to_string())
        .unwrap_or_else(|| "unknown".to_string());
    info!(client, file = %state.file.name, "download request");

    let file = File::open(&state.file.path).await.map_err(|err| {
        warn!(error = %err, "error opening file");
        ApiError::from(err)
    })?;
    let metadata = file.metadata().await.map_err(|err| {
        warn!(error = %err, "error getting file info");
        ApiError::from(err)
    })?;
    let file_size = metadata.len();

    let mut headers = HeaderMap::new();
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("application/octet-stream"),
    );
    headers.insert(
        header::CONTENT_DISPOSITION,
        HeaderValue::from_str(&content_disposition(&state.file.name))
            .map_err(|_| ApiError::Internal("响应头构建失败".into()))?,
    );
    headers.insert(header::CONTENT_LENGTH, HeaderValue::from(file_size));
    if let Ok(modified) = metadata.modified() {
        headers.insert(
            header::LAST_MODIFIED,
            HeaderValue::from_str(&fmt_http_date(modified))
                .map_err(|_| ApiError::Internal("响应头构建失败".into()))?,
        );
    }

    let tracker = SendTracker {
        progress: TransferProgress::sending(&state.file.name, file_size),
        total: file_size,
        client,
    };
    let stream = ReaderStream::new(file).map(move |chunk| {
        if let Ok(bytes) = &chunk {
            tracker.progress.advance(bytes.len() as u64);
        }
        chunk
    });
    Ok((StatusCode::OK, headers, AxumBody::from_stream(stream)).into_response())
}

/// 随响应体一起释放，用来报告下载是否完整。
struct SendTracker {
    progress: TransferProgress,
    total: u64,
    client: String,
}

impl Drop for SendTracker {
    fn drop(&mut self) {
        let sent = self.progress.position();
        if sent >= self.total {
            self.progress.finish();
            info!(client = %self.client, bytes = sent, "file successfully downloaded");
        } else {
            self.progress.abandon();
            warn!(client = %self.client, sent, total = self.total, "download interrupted");
        }
    }
}

/// `attachment` 头：ASCII 回退名加 RFC 5987 编码的原始名。
fn content_disposition(name: &str) -> String {
    let fallback: String = name
        .chars()
        .map(|ch| match ch {
            '"' | '\\' => '_',
            ch if ch.is_ascii() && !ch.is_ascii_control() => ch,
            _ => '_',
        })
        .collect();
    if fallback == name {
        return format!("attachment; filename=\"{name}\"");
    }
    let mut encoded = String::with_capacity(name.len() * 3);
    for byte in name.bytes() {
        if byte.is_ascii_alphanumeric() || b"!#$&+-.^_`|~".contains(&byte) {
            encoded.push(byte as char);
        } else {
            encoded.push_str(&format!("%{byte:02X}"));
        }
    }
    format!("attachment; filename=\"{fallback}\"; filename*=UTF-8''{encoded}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::to_bytes;
    use tempfile::tempdir;

    fn state_for(path: PathBuf, name: &str) -> Arc<ShareState> {
        Arc::new(ShareState {
            file: SharedFile {
                path,
                name: name.to_string(),
            },
        })
    }

    fn get_request(uri: &str) -> Request<AxumBody> {
        Request::builder()
            .uri(uri)
            .body(AxumBody::empty())
            .expect("request")
    }

    #[tokio::test]
    async fn download_streams_file_as_attachment() {
        let temp = tempdir().expect("tempdir");
        let path = temp.path().join("hello.txt");
        std::fs::write(&path, b"hello over the lan").expect("write");

        let response = download(
            Extension(state_for(path, "hello.txt")),
            get_request("/download"),
        )
        .await
        .unwrap_or_else(|_| panic!("download"));
        assert_eq!(response.status(), StatusCode::OK);
        let headers = response.headers();
        assert_eq!(
            headers.get(header::CONTENT_DISPOSITION).expect("disposition"),
            "attachment; filename=\"hello.txt\""
        );
        assert_eq!(
            headers.get(header::CONTENT_TYPE).expect("type"),
            "application/octet-stream"
        );
        assert_eq!(headers.get(header::CONTENT_LENGTH).expect("length"), "18");
        assert!(headers.get(header::LAST_MODIFIED).is_some());

        let body = to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("body");
        assert_eq!(&body[..], b"hello over the lan");
    }

    #[tokio::test]
    async fn download_of_vanished_file_is_not_found() {
        let temp = tempdir().expect("tempdir");
        let result = download(
            Extension(state_for(temp.path().join("gone.bin"), "gone.bin")),
            get_request("/download"),
        )
        .await;
        let Err(err) = result else {
            panic!("expected error");
        };
        assert_eq!(err.into_response().status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn share_page_names_the_file() {
        let temp = tempdir().expect("tempdir");
        let Html(page) = share_page(Extension(state_for(temp.path().join("x"), "photos.zip")))
            .await
            .expect("page");
        assert!(page.contains("photos.zip"));
        assert!(page.contains("/download"));
    }

    #[test]
    fn non_ascii_names_use_extended_parameter() {
        assert_eq!(
            content_disposition("résumé.pdf"),
            "attachment; filename=\"r_sum_.pdf\"; filename*=UTF-8''r%C3%A9sum%C3%A9.pdf"
        );
        assert_eq!(
            content_disposition("say \"hi\".txt"),
            "attachment; filename=\"say _hi_.txt\"; filename*=UTF-8''say%20%22hi%22.txt"
        );
    }

    #[tokio::test]
    async fn single_file_is_shared_directly() {
        let temp = tempdir().expect("tempdir");
        let path = temp.path().join("report.pdf");
        std::fs::write(&path, b"pdf").expect("write");

        let prepared = prepare_shared_file(std::slice::from_ref(&path), temp.path())
            .await
            .expect("prepare");
        assert_eq!(prepared.file.path, path);
        assert_eq!(prepared.file.name, "report.pdf");
        assert!(prepared.archive.is_none());
    }

    #[tokio::test]
    async fn directory_is_zipped_and_cleaned_up() {
        let temp = tempdir().expect("tempdir");
        let dir = temp.path().join("album");
        std::fs::create_dir(&dir).expect("mkdir");
        std::fs::write(dir.join("1.jpg"), b"jpg").expect("write");
        let scratch = temp.path().join("scratch");
        std::fs::create_dir(&scratch).expect("mkdir");

        let prepared = prepare_shared_file(&[dir], &scratch).await.expect("prepare");
        assert_eq!(prepared.file.name, "album.zip");
        assert!(prepared.file.path.starts_with(&scratch));
        assert!(prepared.file.path.exists());

        let archive_path = prepared.file.path.clone();
        drop(prepared);
        assert!(!archive_path.exists());
    }

    #[tokio::test]
    async fn missing_path_is_startup_error() {
        let temp = tempdir().expect("tempdir");
        let err = prepare_shared_file(&[temp.path().join("nope")], temp.path())
            .await
            .expect_err("missing path");
        assert_eq!(err.kind(), io::ErrorKind::NotFound);
        assert!(err.to_string().contains("does not exist"));
    }
}
