//! lanshare binary.
//!
//! Two modes over a short-lived HTTP server on the local network: `receive`
//! stages uploads and asks the operator on the console before keeping each one,
//! `share` serves a file (or a zip of several paths) for download.

mod approval;
mod archive;
mod config;
mod console;
mod error;
mod finalize;
mod frontend;
mod http;
mod logging;
mod picker;
mod progress;
mod queue;
mod sanitize;
mod server;
mod share;
mod staging;
mod upload;

use clap::Parser;
use shadow_rs::shadow;
use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::approval::{ApprovalLoop, ConsoleOperator};
use crate::config::{Args, Command, PENDING_UPLOAD_CAPACITY, ReceiveArgs, ShareArgs};
use crate::console::Mode;
use crate::queue::admission_queue;
use crate::share::{ShareState, prepare_shared_file};
use crate::staging::TempStaging;
use crate::upload::UploadState;

shadow!(build);

#[tokio::main]
async fn main() -> Result<(), io::Error> {
    logging::init_logging();

    let args = Args::parse();
    match args.command {
        Command::Receive(receive) => run_receive(receive).await?,
        Command::Share(share) => run_share(share).await?,
    }

    println!("\n🛑 Server stopped.");
    Ok(())
}

/// 接收模式：上传先暂存，由控制台逐个审批。
async fn run_receive(args: ReceiveArgs) -> io::Result<()> {
    let save_dir = resolve_save_dir(args.save_dir);
    tokio::fs::create_dir_all(&save_dir).await?;
    let temp_dir = args.temp_dir.unwrap_or_else(std::env::temp_dir);
    tokio::fs::create_dir_all(&temp_dir).await?;
    println!("📂 Files will be saved to: {}", save_dir.display());
    info!(save_dir = ?save_dir, temp_dir = ?temp_dir, "receive mode");

    let (queue, receiver) = admission_queue(PENDING_UPLOAD_CAPACITY);
    let shutdown = CancellationToken::new();
    let operator = ConsoleOperator::spawn()?;
    let approval =
        tokio::spawn(ApprovalLoop::new(receiver, operator, save_dir, shutdown.clone()).run());

    let state = Arc::new(UploadState {
        staging: TempStaging::new(temp_dir),
        queue,
    });
    let app = upload::router(state, args.max_upload_size);
    let served = server::serve(app, &args.server, shutdown.clone(), Mode::Receive).await;

    shutdown.cancel();
    if let Err(err) = approval.await {
        warn!(error = %err, "approval loop ended abnormally");
    }
    served
}

/// 分享模式：单个文件直接提供下载，目录或多个路径先打包。未给路径时从当前目录交互选择。
async fn run_share(args: ShareArgs) -> io::Result<()> {
    let paths = if args.paths.is_empty() {
        let mut operator = ConsoleOperator::spawn()?;
        let picked = picker::pick_file(std::env::current_dir()?, &mut operator).await?;
        info!(path = ?picked, "file picked interactively");
        vec![picked]
    } else {
        args.paths
    };
    let prepared = prepare_shared_file(&paths, &std::env::temp_dir()).await?;
    println!("Sharing file: {}", prepared.file.name);
    info!(path = ?prepared.file.path, name = %prepared.file.name, "share mode");

    let state = Arc::new(ShareState {
        file: prepared.file.clone(),
    });
    let app = share::router(state);
    let served = server::serve(app, &args.server, CancellationToken::new(), Mode::Share).await;

    if let Some(archive) = prepared.archive {
        archive.discard().await;
    }
    served
}

/// 未指定保存目录时使用当前目录；当前目录不可用时退回系统临时目录。
fn resolve_save_dir(configured: Option<PathBuf>) -> PathBuf {
    if let Some(dir) = configured {
        return dir;
    }
    std::env::current_dir().unwrap_or_else(|err| {
        let fallback = std::env::temp_dir();
        warn!(error = %err, fallback = ?fallback, "working directory unavailable, saving to temp dir");
        fallback
    })
}
