//! 客户端文件名清洗：只保留最后一段路径，拒绝 `.`/`..`。

use std::fmt;

#[derive(Debug, PartialEq, Eq)]
pub struct InvalidFilename;

impl fmt::Display for InvalidFilename {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("invalid filename")
    }
}

impl std::error::Error for InvalidFilename {}

/// 将不可信的文件名转换为可安全拼接到保存目录下的基础名。
///
/// 目录部分按 `/` 截断（与 URL/multipart 的约定一致），剩余的 `\`、`:` 与 NUL
/// 一律替换为 `_`，因此结果在任何平台上都只有一个路径段，也不会带盘符前缀。
pub fn sanitize_filename(raw: &str) -> Result<String, InvalidFilename> {
    let trimmed = raw.trim_end_matches('/');
    let base = match trimmed.rsplit_once('/') {
        Some((_, last)) => last,
        None => trimmed,
    };
    if base.is_empty() || base == "." || base == ".." {
        return Err(InvalidFilename);
    }
    Ok(base.replace(['/', '\\', ':', '\0'], "_"))
}
