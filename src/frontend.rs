//! 嵌入式页面与静态资源。

use axum::body::Body as AxumBody;
use axum::http::{HeaderMap, HeaderValue, Request, header};
use axum::response::{Html, IntoResponse, Response};
use rust_embed::RustEmbed;

use crate::error::ApiError;

#[derive(RustEmbed)]
#[folder = "assets"]
/// 编译期嵌入的页面与样式。
pub struct Assets;

const FILE_NAME_PLACEHOLDER: &str = "{{file_name}}";

fn load_page(name: &str) -> Result<String, ApiError> {
    let asset = Assets::get(name).ok_or_else(|| ApiError::NotFound(format!("{name} missing")))?;
    String::from_utf8(asset.data.into_owned())
        .map_err(|_| ApiError::Internal("页面编码无效".into()))
}

pub fn upload_page() -> Result<Html<String>, ApiError> {
    load_page("upload.html").map(Html)
}

pub fn accepted_page() -> Result<Html<String>, ApiError> {
    load_page("accepted.html").map(Html)
}

pub fn rejected_page() -> Result<Html<String>, ApiError> {
    load_page("rejected.html").map(Html)
}

/// 下载页，文件名经过 HTML 转义。
pub fn share_page(file_name: &str) -> Result<Html<String>, ApiError> {
    let page = load_page("share.html")?;
    Ok(Html(page.replace(FILE_NAME_PLACEHOLDER, &escape_html(file_name))))
}

fn escape_html(raw: &str) -> String {
    let mut escaped = String::with_capacity(raw.len());
    for ch in raw.chars() {
        match ch {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            _ => escaped.push(ch),
        }
    }
    escaped
}

/// 静态资源回退处理器；未知路径返回 404。
pub async fn serve_asset(req: Request<AxumBody>) -> Result<Response, ApiError> {
    let path = req.uri().path().trim_start_matches('/');
    let Some(asset) = Assets::get(path) else {
        return Err(ApiError::NotFound("not found".into()));
    };
    let mime = mime_guess::from_path(path).first_or_octet_stream();
    let mut headers = HeaderMap::new();
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_str(mime.essence_str())
            .map_err(|_| ApiError::Internal("无效的 MIME 类型".into()))?,
    );
    Ok((headers, AxumBody::from(asset.data.into_owned())).into_response())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::StatusCode;

    #[test]
    fn outcome_pages_differ() {
        let Html(accepted) = accepted_page().expect("accepted");
        let Html(rejected) = rejected_page().expect("rejected");
        assert!(accepted.contains("Upload Accepted"));
        assert!(rejected.contains("Upload Rejected"));
    }

    #[test]
    fn upload_page_posts_file_field() {
        let Html(page) = upload_page().expect("upload page");
        assert!(page.contains("'/upload'"));
        assert!(page.contains("data.append('file'"));
    }

    #[test]
    fn share_page_escapes_file_name() {
        let Html(page) = share_page("<script>&.zip").expect("share page");
        assert!(page.contains("&lt;script&gt;&amp;.zip"));
        assert!(!page.contains("<script>&.zip"));
        assert!(!page.contains(FILE_NAME_PLACEHOLDER));
    }

    #[tokio::test]
    async fn serves_stylesheet_and_404s_unknown_paths() {
        let req = Request::builder()
            .uri("/style.css")
            .body(AxumBody::empty())
            .expect("request");
        let response = serve_asset(req).await.unwrap_or_else(|_| panic!("asset"));
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers().get(header::CONTENT_TYPE).expect("type"),
            "text/css"
        );

        let req = Request::builder()
            .uri("/nope.js")
            .body(AxumBody::empty())
            .expect("request");
        assert!(matches!(serve_asset(req).await, Err(ApiError::NotFound(_))));
    }
}
