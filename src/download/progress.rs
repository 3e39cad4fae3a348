//! 进度上报与 CLI 进度条管理。

use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};

use super::models::{ChapterStatus, ProgressEvent};

pub type ProgressCallback = Box<dyn FnMut(ProgressEvent) + Send>;

pub struct ProgressReporter {
    failed: usize,
    cb: Option<ProgressCallback>, // optional caller callback
    bar: Option<ProgressBar>,
}

impl ProgressReporter {
    /// `show_bar` 为真时在 stderr 上绘制进度条。
    pub fn new(total: usize, show_bar: bool, cb: Option<ProgressCallback>) -> Self {
        let bar = (show_bar && total > 0).then(|| {
            let style = ProgressStyle::with_template(
                "{prefix} [{elapsed_precise}] {wide_bar} {pos}/{len} ({eta}) {msg}",
            )
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("##-");
            let bar = ProgressBar::with_draw_target(Some(total as u64), ProgressDrawTarget::stderr());
            bar.set_style(style);
            bar.set_prefix("章节下载");
            bar
        });
        Self {
            failed: 0,
            cb,
            bar,
        }
    }

    pub fn record(&mut self, event: ProgressEvent) {
        if event.status == ChapterStatus::Failed {
            self.failed += 1;
        }
        if let Some(bar) = self.bar.as_ref() {
            bar.inc(1);
            if self.failed > 0 {
                bar.set_message(format!("失败 {}", self.failed));
            }
        }
        if let Some(cb) = self.cb.as_mut() {
            cb(event);
        }
    }

    pub fn failed(&self) -> usize {
        self.failed
    }

    pub fn finish(&mut self) {
        if let Some(bar) = self.bar.take() {
            bar.finish_and_clear();
        }
    }
}

impl Drop for ProgressReporter {
    fn drop(&mut self) {
        self.finish();
    }
}
