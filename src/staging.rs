//! 上传暂存：把请求体写入唯一命名的临时文件，并以所有权管理其生命周期。

use std::io;
use std::path::{Path, PathBuf};
use tokio::fs::{self, File, OpenOptions};
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::config::TEMP_FILE_PREFIX;

/// 已落盘的临时文件，持有者即唯一所有者。
///
/// 未被 [`StagedFile::release`] 交出的文件会在 drop 时删除，
/// 客户端断开导致 handler future 被丢弃时同样适用。
#[derive(Debug)]
pub struct StagedFile {
    path: Option<PathBuf>,
    len: u64,
}

impl StagedFile {
    /// 接管一个已存在的临时文件。
    pub fn adopt(path: PathBuf, len: u64) -> Self {
        Self {
            path: Some(path),
            len,
        }
    }

    pub fn path(&self) -> &Path {
        self.path.as_deref().unwrap_or_else(|| Path::new(""))
    }

    /// 实际写入的字节数。
    pub fn len(&self) -> u64 {
        self.len
    }

    /// 删除临时文件；重复调用或文件已不存在时不做任何事。
    pub async fn discard(mut self) {
        if let Some(path) = self.path.take() {
            remove_quietly(&path).await;
        }
    }

    /// 放弃所有权（文件已被移动到别处）。
    pub fn release(mut self) -> PathBuf {
        self.path.take().unwrap_or_default()
    }
}

impl Drop for StagedFile {
    fn drop(&mut self) {
        if let Some(path) = self.path.take() {
            match std::fs::remove_file(&path) {
                Ok(()) => debug!(path = ?path, "removed abandoned temp file"),
                Err(err) if err.kind() == io::ErrorKind::NotFound => {}
                Err(err) => warn!(path = ?path, error = %err, "failed to remove temp file"),
            }
        }
    }
}

async fn remove_quietly(path: &Path) {
    match fs::remove_file(path).await {
        Ok(()) => {}
        Err(err) if err.kind() == io::ErrorKind::NotFound => {}
        Err(err) => warn!(path = ?path, error = %err, "failed to remove temp file"),
    }
}

/// 临时文件所在目录。
#[derive(Clone, Debug)]
pub struct TempStaging {
    dir: PathBuf,
}

impl TempStaging {
    pub fn new(dir: PathBuf) -> Self {
        Self { dir }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// 以独占方式创建新的临时文件。
    pub async fn create(&self) -> io::Result<StagingWriter> {
        let path = self
            .dir
            .join(format!("{TEMP_FILE_PREFIX}{}", Uuid::new_v4()));
        let file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .await?;
        Ok(StagingWriter {
            file,
            staged: StagedFile::adopt(path, 0),
        })
    }
}

/// 正在写入的临时文件；中途丢弃会删除文件。
#[derive(Debug)]
pub struct StagingWriter {
    file: File,
    staged: StagedFile,
}

impl StagingWriter {
    pub async fn write_chunk(&mut self, chunk: &[u8]) -> io::Result<()> {
        self.file.write_all(chunk).await?;
        self.staged.len += chunk.len() as u64;
        Ok(())
    }

    pub fn bytes_written(&self) -> u64 {
        self.staged.len
    }

    /// 刷新并关闭文件，交出 [`StagedFile`]。
    pub async fn finish(mut self) -> io::Result<StagedFile> {
        self.file.flush().await?;
        drop(self.file);
        Ok(self.staged)
    }

    /// 中止写入并删除部分文件。
    pub async fn abort(self) {
        drop(self.file);
        self.staged.discard().await;
    }
}
