//! 审批循环：逐个向操作员询问是否接收上传，关闭时拒绝并清空剩余条目。

use std::future::Future;
use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::sync::mpsc as std_mpsc;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::finalize;
use crate::progress::format_megabytes;
use crate::queue::{AdmissionReceiver, PendingUpload, Verdict};

/// 收集操作员决定的通道。
pub trait Operator: Send {
    /// 显示问题并读取一行回答。
    fn ask(&mut self, question: String) -> impl Future<Output = io::Result<String>> + Send;
}

/// 只有 `y` / `yes`（不区分大小写）视为同意，其余一律拒绝。
pub fn is_affirmative(answer: &str) -> bool {
    let answer = answer.trim();
    answer.eq_ignore_ascii_case("y") || answer.eq_ignore_ascii_case("yes")
}

type LineReply = oneshot::Sender<io::Result<String>>;

/// 从标准输入读取回答的操作员。
///
/// 读取在独立线程上进行，且只在提问时读一行；阻塞在 stdin 上的线程不会妨碍进程退出。
pub struct ConsoleOperator {
    requests: std_mpsc::Sender<LineReply>,
}

impl ConsoleOperator {
    pub fn spawn() -> io::Result<Self> {
        let (tx, rx) = std_mpsc::channel::<LineReply>();
        std::thread::Builder::new()
            .name("operator-console".into())
            .spawn(move || {
                let stdin = io::stdin();
                for reply in rx {
                    let mut line = String::new();
                    let result = match stdin.lock().read_line(&mut line) {
                        Ok(0) => Err(io::Error::new(io::ErrorKind::UnexpectedEof, "stdin closed")),
                        Ok(_) => Ok(line),
                        Err(err) => Err(err),
                    };
                    let _ = reply.send(result);
                }
            })?;
        Ok(Self { requests: tx })
    }
}

impl Operator for ConsoleOperator {
    fn ask(&mut self, question: String) -> impl Future<Output = io::Result<String>> + Send {
        print!("{question}");
        let _ = io::stdout().flush();
        let (reply_tx, reply_rx) = oneshot::channel();
        let sent = self
            .requests
            .send(reply_tx)
            .map_err(|_| io::Error::other("console reader stopped"));
        async move {
            sent?;
            reply_rx
                .await
                .map_err(|_| io::Error::other("console reader stopped"))?
        }
    }
}

enum Flow {
    Continue,
    Drain,
}

/// 队列的唯一消费者，也是保存目录的唯一写入者。
pub struct ApprovalLoop<O> {
    queue: AdmissionReceiver,
    operator: O,
    save_dir: PathBuf,
    shutdown: CancellationToken,
}

impl<O: Operator> ApprovalLoop<O> {
    pub fn new(
        queue: AdmissionReceiver,
        operator: O,
        save_dir: PathBuf,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            queue,
            operator,
            save_dir,
            shutdown,
        }
    }

    /// 运行直到收到关闭信号并清空队列，或所有生产者都已离开。
    pub async fn run(mut self) {
        loop {
            let next = tokio::select! {
                biased;
                _ = self.shutdown.cancelled() => break,
                next = self.queue.recv() => next,
            };
            let Some(pending) = next else {
                return;
            };
            if let Flow::Drain = self.review(pending).await {
                break;
            }
        }
        self.drain().await;
    }

    async fn review(&mut self, pending: PendingUpload) -> Flow {
        let question = format!(
            "\n📋 File: {} ({})\nAccept this file? (y/n): ",
            pending.filename,
            format_megabytes(pending.staged.len())
        );
        info!(
            filename = %pending.filename,
            declared = pending.declared_size,
            staged = pending.staged.len(),
            "awaiting operator decision"
        );
        let answer = tokio::select! {
            biased;
            _ = self.shutdown.cancelled() => {
                println!();
                info!(filename = %pending.filename, "shutdown while awaiting decision");
                pending.reject().await;
                return Flow::Drain;
            }
            answer = self.operator.ask(question) => answer,
        };

        let accepted = match answer {
            Ok(answer) => is_affirmative(&answer),
            Err(err) => {
                warn!(error = %err, "failed to read operator decision, rejecting");
                false
            }
        };

        let (filename, staged, resolver) = pending.into_parts();
        if !accepted {
            staged.discard().await;
            println!("❌ File rejected and deleted");
            info!(filename, "upload rejected");
            resolver.resolve(Verdict::Rejected);
            return Flow::Continue;
        }

        match finalize::persist(staged, &self.save_dir, &filename).await {
            Ok(path) => {
                println!("✅ File saved: {}", path.display());
                info!(filename, path = ?path, "upload accepted");
                resolver.resolve(Verdict::Accepted);
            }
            Err(err) => {
                println!("❌ Error saving file: {err}");
                warn!(filename, error = %err, "failed to save accepted upload");
                resolver.resolve(Verdict::Rejected);
            }
        }
        Flow::Continue
    }

    async fn drain(&mut self) {
        self.queue.close();
        let mut drained = 0u32;
        while let Some(pending) = self.queue.recv().await {
            pending.reject().await;
            drained += 1;
        }
        info!(drained, "approval loop stopped");
    }
}
