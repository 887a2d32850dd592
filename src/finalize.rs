//! 接收文件落地：避开同名冲突，移动失败时退回到复制并同步到磁盘。

use std::io;
use std::path::{Path, PathBuf};
use tokio::fs::{self, File, OpenOptions};
use tracing::{debug, warn};

use crate::staging::StagedFile;

/// 在 `dir` 中为 `filename` 找到一个尚未占用的路径。
///
/// 冲突时在扩展名前追加 `_1`、`_2`……。检查与写入之间没有加锁，
/// 调用方需保证目标目录只有一个写入者。
pub async fn unique_destination(dir: &Path, filename: &str) -> io::Result<PathBuf> {
    let candidate = dir.join(filename);
    if !fs::try_exists(&candidate).await? {
        return Ok(candidate);
    }

    let (stem, ext) = split_extension(filename);
    let mut counter: u64 = 1;
    loop {
        let candidate = dir.join(format!("{stem}_{counter}{ext}"));
        if !fs::try_exists(&candidate).await? {
            return Ok(candidate);
        }
        counter += 1;
    }
}

/// 拆分为 (主名, 含点的扩展名)；以点开头的隐藏文件视为无扩展名。
fn split_extension(filename: &str) -> (&str, &str) {
    match filename.rfind('.') {
        Some(index) if index > 0 => filename.split_at(index),
        _ => (filename, ""),
    }
}

/// 把暂存文件放到目标目录，返回最终路径。
///
/// 失败时暂存文件已被删除，目标目录中也不会留下半截文件。
pub async fn persist(staged: StagedFile, dir: &Path, filename: &str) -> io::Result<PathBuf> {
    let destination = match unique_destination(dir, filename).await {
        Ok(path) => path,
        Err(err) => {
            staged.discard().await;
            return Err(err);
        }
    };

    match fs::rename(staged.path(), &destination).await {
        Ok(()) => {
            staged.release();
            debug!(path = ?destination, "temp file moved into place");
            return Ok(destination);
        }
        Err(err) => {
            warn!(error = %err, "rename failed, falling back to copy");
        }
    }

    match copy_durably(staged.path(), &destination).await {
        Ok(bytes) => {
            debug!(path = ?destination, bytes, "temp file copied into place");
            staged.discard().await;
            Ok(destination)
        }
        Err(err) => {
            staged.discard().await;
            Err(err)
        }
    }
}

/// 复制后 `sync_all`，保证报告成功前数据已落盘；失败时删除目标文件。
pub async fn copy_durably(src: &Path, dst: &Path) -> io::Result<u64> {
    let mut source = File::open(src).await?;
    let mut target = OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(dst)
        .await?;

    let result = async {
        let copied = tokio::io::copy(&mut source, &mut target).await?;
        target.sync_all().await?;
        Ok::<u64, io::Error>(copied)
    }
    .await;

    if result.is_err() {
        drop(target);
        let _ = fs::remove_file(dst).await;
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::staging::TempStaging;
    use tempfile::tempdir;

    async fn stage(staging: &TempStaging, content: &[u8]) -> StagedFile {
        let mut writer = staging.create().await.expect("create");
        writer.write_chunk(content).await.expect("write");
        writer.finish().await.expect("finish")
    }

    #[test]
    fn split_extension_cases() {
        assert_eq!(split_extension("report.pdf"), ("report", ".pdf"));
        assert_eq!(split_extension("archive.tar.gz"), ("archive.tar", ".gz"));
        assert_eq!(split_extension("README"), ("README", ""));
        assert_eq!(split_extension(".bashrc"), (".bashrc", ""));
    }

    #[tokio::test]
    async fn unused_name_is_kept() {
        let dir = tempdir().expect("tempdir");
        let path = unique_destination(dir.path(), "report.pdf").await.expect("dest");
        assert_eq!(path, dir.path().join("report.pdf"));
    }

    #[tokio::test]
    async fn collision_gets_numeric_suffix() {
        let dir = tempdir().expect("tempdir");
        std::fs::write(dir.path().join("report.pdf"), b"old").expect("write");
        let path = unique_destination(dir.path(), "report.pdf").await.expect("dest");
        assert_eq!(path, dir.path().join("report_1.pdf"));

        std::fs::write(dir.path().join("report_1.pdf"), b"old").expect("write");
        let path = unique_destination(dir.path(), "report.pdf").await.expect("dest");
        assert_eq!(path, dir.path().join("report_2.pdf"));
    }

    #[tokio::test]
    async fn saving_same_name_n_times_yields_n_files() {
        let temp = tempdir().expect("tempdir");
        let staging = TempStaging::new(temp.path().to_path_buf());
        let dest = temp.path().join("inbox");
        std::fs::create_dir_all(&dest).expect("mkdir");

        let mut saved = Vec::new();
        for index in 0..5u8 {
            let staged = stage(&staging, &[index]).await;
            saved.push(persist(staged, &dest, "notes").await.expect("persist"));
        }

        let names: Vec<_> = saved
            .iter()
            .map(|path| path.file_name().expect("name").to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, ["notes", "notes_1", "notes_2", "notes_3", "notes_4"]);
        for (index, path) in saved.iter().enumerate() {
            assert_eq!(std::fs::read(path).expect("read"), [index as u8]);
        }
        let leftovers = std::fs::read_dir(temp.path())
            .expect("read dir")
            .filter(|entry| {
                entry
                    .as_ref()
                    .map(|entry| entry.path() != dest)
                    .unwrap_or(false)
            })
            .count();
        assert_eq!(leftovers, 0, "temp files should be consumed");
    }

    #[tokio::test]
    async fn copy_durably_copies_and_refuses_to_overwrite() {
        let dir = tempdir().expect("tempdir");
        let src = dir.path().join("src.bin");
        let dst = dir.path().join("dst.bin");
        std::fs::write(&src, b"payload").expect("write");

        assert_eq!(copy_durably(&src, &dst).await.expect("copy"), 7);
        assert_eq!(std::fs::read(&dst).expect("read"), b"payload");
        assert!(copy_durably(&src, &dst).await.is_err());
        assert_eq!(std::fs::read(&dst).expect("read"), b"payload");
    }

    #[tokio::test]
    async fn persist_failure_removes_temp_file() {
        let temp = tempdir().expect("tempdir");
        let staging = TempStaging::new(temp.path().to_path_buf());
        let staged = stage(&staging, b"data").await;
        let temp_path = staged.path().to_path_buf();

        let missing = temp.path().join("does-not-exist");
        assert!(persist(staged, &missing, "file.txt").await.is_err());
        assert!(!temp_path.exists());
    }
}
