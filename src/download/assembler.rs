//! 结果汇总：把按 index 填充的槽位整理为最终输出。

use serde::{Deserialize, Serialize};

use super::models::{Chapter, ChapterStatus, CrawlResult};

/// 哪些章节进入最终输出。失败/空章节保留时都带有占位标题与诊断正文。
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "snake_case")]
pub enum InclusionPolicy {
    /// 全部保留，输出长度等于任务数。
    #[default]
    #[value(name = "keep_all")]
    KeepAll,
    #[value(name = "drop_failed")]
    DropFailed,
    #[value(name = "drop_failed_and_empty")]
    DropFailedAndEmpty,
}

impl InclusionPolicy {
    pub fn keeps(&self, status: ChapterStatus) -> bool {
        match (self, status) {
            (InclusionPolicy::KeepAll, _) => true,
            (InclusionPolicy::DropFailed, s) => s != ChapterStatus::Failed,
            (InclusionPolicy::DropFailedAndEmpty, s) => s == ChapterStatus::Ok,
        }
    }
}

/// Sort by index and filter by policy. Dropped chapters leave a gap in the
/// index sequence; survivors are never renumbered.
pub fn assemble(mut chapters: Vec<Chapter>, policy: InclusionPolicy) -> CrawlResult {
    chapters.sort_by_key(|c| c.index);
    chapters.retain(|c| policy.keeps(c.status));
    CrawlResult { chapters }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::download::models::ChapterTask;

    fn task(i: usize) -> ChapterTask {
        ChapterTask {
            index: i,
            url: format!("https://x/p{}.html", i + 1),
        }
    }

    /// 4 章，index 2 失败，index 3 为空；乱序到达。
    fn settled() -> Vec<Chapter> {
        vec![
            Chapter::empty(&task(3), Some("Four".into())),
            Chapter::ok(&task(1), "Two".into(), "b".into()),
            Chapter::failed(&task(2), "HTTP status 503"),
            Chapter::ok(&task(0), "One".into(), "a".into()),
        ]
    }

    #[test]
    fn keep_all_preserves_length_and_order() {
        let out = assemble(settled(), InclusionPolicy::KeepAll);
        assert_eq!(out.indices(), vec![0, 1, 2, 3]);
        assert_eq!(out.chapters[2].title, "Chapter 3 (Failed)");
        assert!(out.chapters[2].content.contains("503"));
    }

    #[test]
    fn drop_failed_keeps_original_indices() {
        let out = assemble(settled(), InclusionPolicy::DropFailed);
        assert_eq!(out.indices(), vec![0, 1, 3]);
    }

    #[test]
    fn drop_failed_and_empty_keeps_only_ok() {
        let out = assemble(settled(), InclusionPolicy::DropFailedAndEmpty);
        assert_eq!(out.indices(), vec![0, 1]);
        assert!(out.chapters.iter().all(Chapter::is_ok));
    }

    #[test]
    fn everything_failed_under_keep_all_is_all_placeholders() {
        let chapters = (0..3).map(|i| Chapter::failed(&task(i), "timeout")).collect();
        let out = assemble(chapters, InclusionPolicy::KeepAll);
        assert_eq!(out.len(), 3);
        assert!(assemble(out.chapters, InclusionPolicy::DropFailed).is_empty());
    }
}
