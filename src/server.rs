//! HTTP 监听、启动横幅与优雅关闭。

use axum::{Router, middleware};
use axum_server::Handle;
use std::io;
use std::net::{IpAddr, SocketAddr};
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tower_http::trace::{DefaultOnRequest, DefaultOnResponse, TraceLayer};
use tracing::{Level, info, warn};

use crate::config::{SHUTDOWN_TIMEOUT, ServerArgs};
use crate::console::{self, Mode};
use crate::http::{add_security_headers, request_span};

/// 绑定地址并运行服务器，直到收到终止信号或 `shutdown` 被取消。
///
/// 关闭时先取消 `shutdown`，再给在途请求 [`SHUTDOWN_TIMEOUT`] 的收尾时间。
pub async fn serve(
    app: Router,
    server: &ServerArgs,
    shutdown: CancellationToken,
    mode: Mode,
) -> io::Result<()> {
    let host = server.host.parse::<IpAddr>().map_err(|err| {
        io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("invalid bind address '{}': {err}", server.host),
        )
    })?;
    let addr = SocketAddr::new(host, server.port);

    let app = app
        .layer(middleware::from_fn(add_security_headers))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(request_span)
                .on_request(DefaultOnRequest::new().level(Level::DEBUG))
                .on_response(DefaultOnResponse::new().level(Level::DEBUG)),
        );

    let handle = Handle::new();
    tokio::spawn(announce_when_listening(handle.clone(), server.port, mode));
    let signal_task = tokio::spawn(shutdown_signal(handle.clone(), shutdown.clone()));

    info!(%addr, "starting HTTP server");
    let result = axum_server::bind(addr)
        .handle(handle)
        .serve(app.into_make_service_with_connect_info::<SocketAddr>())
        .await;

    shutdown.cancel();
    signal_task.abort();
    result
}

async fn announce_when_listening(handle: Handle, port: u16, mode: Mode) {
    if let Some(addr) = handle.listening().await {
        info!(%addr, "listening");
        let url = console::server_url(&console::local_ip(), port);
        console::print_banner(&url, mode);
    }
}

async fn shutdown_signal(handle: Handle, shutdown: CancellationToken) {
    let ctrl_c = async {
        if let Err(err) = signal::ctrl_c().await {
            warn!(error = %err, "failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(err) => {
                warn!(error = %err, "failed to install signal handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
        _ = shutdown.cancelled() => {},
    }

    info!("received termination signal, shutting down");
    shutdown.cancel();
    handle.graceful_shutdown(Some(SHUTDOWN_TIMEOUT));
}
