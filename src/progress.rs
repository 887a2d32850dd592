//! 控制台传输进度条，刷新频率受限，写到 stderr。

use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};

use crate::config::{PROGRESS_BAR_WIDTH, PROGRESS_REFRESH_HZ};

/// 单个传输的进度显示。
#[derive(Debug, Clone)]
pub struct TransferProgress {
    bar: ProgressBar,
}

impl TransferProgress {
    /// `total` 未知（或为 0）时退化为只显示字节数的 spinner。
    pub fn new(total: Option<u64>, message: String) -> Self {
        let target = ProgressDrawTarget::stderr_with_hz(PROGRESS_REFRESH_HZ);
        let bar = match total {
            Some(total) if total > 0 => {
                let bar = ProgressBar::with_draw_target(Some(total), target);
                bar.set_style(bar_style());
                bar
            }
            _ => {
                let bar = ProgressBar::with_draw_target(None, target);
                bar.set_style(spinner_style());
                bar
            }
        };
        bar.set_message(message);
        Self { bar }
    }

    pub fn receiving(filename: &str, total: Option<u64>) -> Self {
        Self::new(total, format!("📥 Receiving {filename}"))
    }

    pub fn sending(filename: &str, total: u64) -> Self {
        Self::new(Some(total), format!("📤 Sending {filename}"))
    }

    pub fn advance(&self, bytes: u64) {
        self.bar.inc(bytes);
        if let Some(total) = self.bar.length()
            && self.bar.position() >= total
        {
            self.bar.finish();
        }
    }

    pub fn position(&self) -> u64 {
        self.bar.position()
    }

    pub fn finish(&self) {
        if !self.bar.is_finished() {
            self.bar.finish();
        }
    }

    /// 传输中断：保留当前进度行。
    pub fn abandon(&self) {
        if !self.bar.is_finished() {
            self.bar.abandon();
        }
    }
}

fn bar_style() -> ProgressStyle {
    let template = format!(
        "{{spinner:.green}} {{msg}} [{{bar:{PROGRESS_BAR_WIDTH}.cyan/blue}}] {{bytes}}/{{total_bytes}} ({{bytes_per_sec}})"
    );
    ProgressStyle::with_template(&template)
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("=>-")
}

fn spinner_style() -> ProgressStyle {
    ProgressStyle::with_template("{spinner:.green} {msg} {bytes} ({bytes_per_sec})")
        .unwrap_or_else(|_| ProgressStyle::default_spinner())
}

/// 以 MB 为单位格式化字节数（保留两位小数）。
pub fn format_megabytes(bytes: u64) -> String {
    format!("{:.2} MB", bytes as f64 / (1024.0 * 1024.0))
}
