//! 分享模式未给路径时的交互式文件选择：逐级浏览目录，选中文件即返回。

use std::io;
use std::path::{Path, PathBuf};
use tokio::fs;

use crate::approval::Operator;

/// 菜单中的一项。
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Entry {
    Parent(PathBuf),
    Dir(PathBuf),
    File(PathBuf),
}

impl Entry {
    fn label(&self) -> String {
        match self {
            Entry::Parent(_) => "📁 .. (parent directory)".to_string(),
            Entry::Dir(path) => format!("📁 {}/", display_name(path)),
            Entry::File(path) => format!("📄 {}", display_name(path)),
        }
    }
}

fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// 列出 `dir`：上级目录（若有）在前，然后是子目录，最后是文件，各自按名称排序。
pub async fn list_entries(dir: &Path) -> io::Result<Vec<Entry>> {
    let mut dirs = Vec::new();
    let mut files = Vec::new();
    let mut reader = fs::read_dir(dir).await?;
    while let Some(entry) = reader.next_entry().await? {
        let path = entry.path();
        if entry.file_type().await?.is_dir() {
            dirs.push(path);
        } else {
            files.push(path);
        }
    }
    dirs.sort();
    files.sort();

    let mut entries = Vec::with_capacity(dirs.len() + files.len() + 1);
    if let Some(parent) = dir.parent() {
        entries.push(Entry::Parent(parent.to_path_buf()));
    }
    entries.extend(dirs.into_iter().map(Entry::Dir));
    entries.extend(files.into_iter().map(Entry::File));
    Ok(entries)
}

fn render_menu(dir: &Path, entries: &[Entry]) -> String {
    let mut menu = format!("\n📂 File Selection\nCurrent: {}\n\n", dir.display());
    for (index, entry) in entries.iter().enumerate() {
        menu.push_str(&format!("  {:>3}) {}\n", index + 1, entry.label()));
    }
    menu.push_str("Select a file or folder (number): ");
    menu
}

/// 从 `start` 开始浏览，直到操作员选中一个文件。
///
/// 进入目录或返回上级会重新列出菜单；无效输入重新提问；读取失败（如 stdin 关闭）时返回错误。
pub async fn pick_file<O: Operator>(start: PathBuf, operator: &mut O) -> io::Result<PathBuf> {
    let mut current = start;
    loop {
        let entries = list_entries(&current).await?;
        if entries.is_empty() {
            return Err(io::Error::new(
                io::ErrorKind::NotFound,
                "no files or folders found",
            ));
        }

        let answer = operator.ask(render_menu(&current, &entries)).await?;
        let choice = answer
            .trim()
            .parse::<usize>()
            .ok()
            .and_then(|number| number.checked_sub(1))
            .and_then(|index| entries.get(index));
        match choice {
            Some(Entry::Parent(parent)) => current = parent.clone(),
            Some(Entry::Dir(dir)) => current = dir.clone(),
            Some(Entry::File(file)) => return Ok(file.clone()),
            None => println!("Invalid selection, enter a number from 1 to {}", entries.len()),
        }
    }
}
