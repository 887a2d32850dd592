//! 分享模式的 zip 打包：目录或多个路径先打包成临时文件再提供下载。

use std::fs::{self, File};
use std::io::{self, BufWriter};
use std::path::{Component, Path, PathBuf};
use tracing::{debug, info};
use uuid::Uuid;
use zip::CompressionMethod;
use zip::write::{FileOptions, ZipWriter};

use crate::config::{MULTI_ARCHIVE_NAME, TEMP_FILE_PREFIX};
use crate::staging::StagedFile;

/// 下载时展示的压缩包名称。
///
/// 单个目录为 `<目录名>.zip`，单个文件为 `<去扩展名>.zip`，多个路径为固定名称。
pub fn archive_name(paths: &[PathBuf]) -> String {
    let [path] = paths else {
        return MULTI_ARCHIVE_NAME.to_string();
    };
    let name = if path.is_dir() {
        path.file_name()
    } else {
        path.file_stem()
    };
    match name {
        Some(name) => format!("{}.zip", name.to_string_lossy()),
        None => MULTI_ARCHIVE_NAME.to_string(),
    }
}

/// 在 `temp_dir` 中生成压缩包，返回的 [`StagedFile`] 被丢弃时删除压缩包。
pub async fn create_archive(paths: Vec<PathBuf>, temp_dir: &Path) -> io::Result<StagedFile> {
    let dest = temp_dir.join(format!("{TEMP_FILE_PREFIX}{}.zip", Uuid::new_v4()));
    let target = dest.clone();
    let len = tokio::task::spawn_blocking(move || write_archive(&paths, &target))
        .await
        .map_err(io::Error::other)?;
    match len {
        Ok(len) => {
            info!(path = ?dest, bytes = len, "archive created");
            Ok(StagedFile::adopt(dest, len))
        }
        Err(err) => {
            let _ = fs::remove_file(&dest);
            Err(err)
        }
    }
}

/// 同步写出压缩包，返回压缩包大小。
pub fn write_archive(paths: &[PathBuf], dest: &Path) -> io::Result<u64> {
    let file = File::options().write(true).create_new(true).open(dest)?;
    let mut zip = ZipWriter::new(BufWriter::new(file));
    let options = FileOptions::default()
        .compression_method(CompressionMethod::Deflated)
        .unix_permissions(0o644);

    for path in paths {
        let root = entry_root(path)?;
        add_path(&mut zip, path, &root, options)?;
    }

    let mut writer = zip.finish()?;
    io::Write::flush(&mut writer)?;
    let file = writer.into_inner().map_err(|err| err.into_error())?;
    file.sync_all()?;
    Ok(file.metadata()?.len())
}

/// 共享根在包内的名称，即路径最后一段。
fn entry_root(path: &Path) -> io::Result<String> {
    let resolved;
    let path = if path.file_name().is_none() {
        resolved = fs::canonicalize(path)?;
        resolved.as_path()
    } else {
        path
    };
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("cannot archive '{}'", path.display()),
            )
        })
}

fn add_path(
    zip: &mut ZipWriter<BufWriter<File>>,
    source: &Path,
    entry: &str,
    options: FileOptions,
) -> io::Result<()> {
    check_entry_name(entry)?;
    if fs::metadata(source)?.is_dir() {
        let mut children = fs::read_dir(source)?.collect::<Result<Vec<_>, _>>()?;
        children.sort_by_key(|child| child.file_name());
        for child in children {
            let child_entry = format!("{entry}/{}", child.file_name().to_string_lossy());
            add_path(zip, &child.path(), &child_entry, options)?;
        }
        return Ok(());
    }

    debug!(entry, "adding archive entry");
    zip.start_file(entry, options)?;
    let mut file = File::open(source)?;
    io::copy(&mut file, zip)?;
    Ok(())
}

/// 包内路径必须是相对路径且不能向上越级。
fn check_entry_name(entry: &str) -> io::Result<()> {
    let escapes = Path::new(entry)
        .components()
        .any(|component| !matches!(component, Component::Normal(_)));
    if entry.is_empty() || escapes {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("invalid path in archive: {entry}"),
        ));
    }
    Ok(())
}
