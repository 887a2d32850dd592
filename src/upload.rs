//! 接收模式：上传页面与上传处理器。
//!
//! 请求体先完整写入临时文件，再进入审批队列；处理器一直挂起到操作员作出决定。

use axum::extract::multipart::{Field, MultipartError};
use axum::extract::{DefaultBodyLimit, Extension, Multipart};
use axum::http::{HeaderMap, StatusCode, header};
use axum::response::Html;
use axum::Router;
use axum::routing::{get, post};
use std::sync::Arc;
use tracing::{info, warn};

use crate::error::ApiError;
use crate::frontend;
use crate::progress::{TransferProgress, format_megabytes};
use crate::queue::AdmissionQueue;
use crate::sanitize::sanitize_filename;
use crate::staging::{StagedFile, TempStaging};

/// 上传处理器共享的状态。
#[derive(Debug)]
pub struct UploadState {
    pub staging: TempStaging,
    pub queue: AdmissionQueue,
}

/// 接收模式的路由：`GET /`、`POST /upload`，未知路径回退到静态资源。
pub fn router(state: Arc<UploadState>, max_upload_size: u64) -> Router {
    let body_limit = usize::try_from(max_upload_size).unwrap_or(usize::MAX);
    Router::new()
        .route("/", get(upload_page))
        .route(
            "/upload",
            post(receive_upload).layer(DefaultBodyLimit::max(body_limit)),
        )
        .fallback(frontend::serve_asset)
        .layer(Extension(state))
}

/// 返回上传页面。
pub async fn upload_page() -> Result<Html<String>, ApiError> {
    frontend::upload_page()
}

/// 处理单个文件上传，直到操作员裁决后才返回结果页。
pub async fn receive_upload(
    Extension(state): Extension<Arc<UploadState>>,
    headers: HeaderMap,
    mut multipart: Multipart,
) -> Result<Html<String>, ApiError> {
    let declared_size = headers
        .get(header::CONTENT_LENGTH)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.parse::<u64>().ok())
        .unwrap_or(0);

    let field = loop {
        let field = multipart.next_field().await.map_err(|err| {
            warn!(error = %err, "error parsing form");
            form_error(&err)
        })?;
        match field {
            Some(field) if field.name() == Some("file") => break field,
            Some(_) => continue,
            None => {
                warn!("upload request without a file field");
                return Err(ApiError::BadRequest("error retrieving file".into()));
            }
        }
    };

    let filename = sanitize_filename(field.file_name().unwrap_or_default()).map_err(|err| {
        warn!(raw = ?field.file_name(), "invalid filename");
        ApiError::from(err)
    })?;

    println!();
    println!(
        "📤 Incoming file: {filename} ({})",
        format_megabytes(declared_size)
    );
    info!(filename, declared_size, "incoming upload");

    let staged = stage_field(&state.staging, field, &filename, declared_size).await?;
    info!(filename, bytes = staged.len(), "upload staged, awaiting approval");

    let verdict = state
        .queue
        .enqueue(filename.clone(), declared_size, staged)
        .await
        .verdict()
        .await;

    if verdict.is_accepted() {
        frontend::accepted_page()
    } else {
        frontend::rejected_page()
    }
}

/// 把文件字段流式写入临时文件，同时驱动进度条。
///
/// 请求体读取失败（客户端断开、超出大小限制或表单残缺）时删除部分文件并中止，不会入队。
async fn stage_field(
    staging: &TempStaging,
    mut field: Field<'_>,
    filename: &str,
    declared_size: u64,
) -> Result<StagedFile, ApiError> {
    let mut writer = staging.create().await.map_err(|err| {
        warn!(dir = ?staging.dir(), error = %err, "error creating temp file");
        ApiError::Internal("error processing file".into())
    })?;
    let progress = TransferProgress::receiving(filename, Some(declared_size));

    loop {
        let chunk = match field.chunk().await {
            Ok(Some(chunk)) => chunk,
            Ok(None) => break,
            Err(err) => {
                progress.abandon();
                let received = writer.bytes_written();
                writer.abort().await;
                return Err(match err.status() {
                    StatusCode::PAYLOAD_TOO_LARGE => {
                        warn!(filename, received, "upload exceeds size limit");
                        ApiError::PayloadTooLarge("error parsing form or file too large".into())
                    }
                    StatusCode::BAD_REQUEST => {
                        warn!(filename, received, error = %err, "malformed multipart body");
                        ApiError::BadRequest("error parsing form".into())
                    }
                    _ => {
                        info!(filename, received, error = %err, "upload cancelled by client");
                        ApiError::Cancelled
                    }
                });
            }
        };
        if let Err(err) = writer.write_chunk(&chunk).await {
            progress.abandon();
            writer.abort().await;
            warn!(filename, error = %err, "error saving file");
            return Err(ApiError::Internal("error saving file".into()));
        }
        progress.advance(chunk.len() as u64);
    }
    progress.finish();

    writer.finish().await.map_err(|err| {
        warn!(filename, error = %err, "error saving file");
        ApiError::Internal("error saving file".into())
    })
}

fn form_error(err: &MultipartError) -> ApiError {
    if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
        ApiError::PayloadTooLarge("error parsing form or file too large".into())
    } else {
        ApiError::BadRequest("error parsing form or file too large".into())
    }
}
