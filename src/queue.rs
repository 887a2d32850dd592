//! 待审批队列：多个上传请求（生产者）与单个审批循环（消费者）之间的有界交接。
//!
//! 每个条目携带一次性的结果通道；发送端按值消费，因此每个上传最多被裁决一次，
//! 而条目若在未裁决时被丢弃，等待方会将其视为拒绝。

use tokio::sync::{mpsc, oneshot};
use tracing::warn;

use crate::staging::StagedFile;

/// 审批结果。
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Verdict {
    Accepted,
    Rejected,
}

impl Verdict {
    pub fn is_accepted(self) -> bool {
        matches!(self, Verdict::Accepted)
    }
}

/// 等待操作员裁决的上传。
#[derive(Debug)]
pub struct PendingUpload {
    /// 已清洗的文件名。
    pub filename: String,
    /// 客户端声明的大小，可能不准确。
    pub declared_size: u64,
    pub staged: StagedFile,
    resolver: Resolver,
}

impl PendingUpload {
    /// 拆分为文件名、暂存文件与结果通道。
    pub fn into_parts(self) -> (String, StagedFile, Resolver) {
        (self.filename, self.staged, self.resolver)
    }

    /// 删除暂存文件并回复拒绝。
    pub async fn reject(self) {
        let (_, staged, resolver) = self.into_parts();
        staged.discard().await;
        resolver.resolve(Verdict::Rejected);
    }
}

/// 一次性结果写入端。
#[derive(Debug)]
pub struct Resolver {
    tx: oneshot::Sender<Verdict>,
}

impl Resolver {
    pub fn resolve(self, verdict: Verdict) {
        // 接收方已离开时无需处理
        let _ = self.tx.send(verdict);
    }
}

/// 上传请求持有的结果读取端。
#[derive(Debug)]
pub struct Ticket {
    rx: oneshot::Receiver<Verdict>,
}

impl Ticket {
    /// 等待裁决；条目在未裁决时被丢弃视为拒绝。
    pub async fn verdict(self) -> Verdict {
        self.rx.await.unwrap_or(Verdict::Rejected)
    }
}

/// 队列的生产者端，可在并发请求之间克隆共享。
#[derive(Clone, Debug)]
pub struct AdmissionQueue {
    tx: mpsc::Sender<PendingUpload>,
}

/// 队列的唯一消费者端。
#[derive(Debug)]
pub struct AdmissionReceiver {
    rx: mpsc::Receiver<PendingUpload>,
}

/// 创建容量为 `capacity` 的审批队列。
///
/// 容量只计算排队等待的条目；审批循环正在询问的那一个已被取出，不占容量。
pub fn admission_queue(capacity: usize) -> (AdmissionQueue, AdmissionReceiver) {
    let (tx, rx) = mpsc::channel(capacity);
    (AdmissionQueue { tx }, AdmissionReceiver { rx })
}

impl AdmissionQueue {
    /// 入队等待审批；队列满时阻塞（背压）。
    ///
    /// 审批循环已停止时立即删除暂存文件并返回已拒绝的凭据。
    pub async fn enqueue(&self, filename: String, declared_size: u64, staged: StagedFile) -> Ticket {
        let (tx, rx) = oneshot::channel();
        let pending = PendingUpload {
            filename,
            declared_size,
            staged,
            resolver: Resolver { tx },
        };
        if let Err(mpsc::error::SendError(pending)) = self.tx.send(pending).await {
            warn!(filename = %pending.filename, "approval loop stopped, rejecting upload");
            pending.reject().await;
        }
        Ticket { rx }
    }
}

impl AdmissionReceiver {
    pub async fn recv(&mut self) -> Option<PendingUpload> {
        self.rx.recv().await
    }

    /// 停止接收新条目，已缓冲的条目仍可取出。
    pub fn close(&mut self) {
        self.rx.close();
    }
}
