//! 下载相关的数据模型定义。
//!
//! 包含章节任务、章节结果、抓取结果、下载统计、进度事件等核心数据结构。

use serde::{Deserialize, Serialize};

use crate::site::NovelInfo;

/// 一次待执行的抓取任务，由目录解析产生，下载器消费一次。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChapterTask {
    pub index: usize,
    pub url: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChapterStatus {
    Ok,
    Failed,
    Empty,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chapter {
    pub index: usize,
    pub title: String,
    pub content: String,
    pub source_url: String,
    pub status: ChapterStatus,
}

impl Chapter {
    pub fn ok(task: &ChapterTask, title: String, content: String) -> Self {
        Self {
            index: task.index,
            title,
            content,
            source_url: task.url.clone(),
            status: ChapterStatus::Ok,
        }
    }

    /// 页面取到了但没有正文。
    pub fn empty(task: &ChapterTask, title: Option<String>) -> Self {
        Self {
            index: task.index,
            title: title.unwrap_or_else(|| default_title(task.index)),
            content: String::new(),
            source_url: task.url.clone(),
            status: ChapterStatus::Empty,
        }
    }

    /// 失败占位：标题与正文都带上诊断信息。
    pub fn failed(task: &ChapterTask, reason: &str) -> Self {
        Self {
            index: task.index,
            title: format!("{} (Failed)", default_title(task.index)),
            content: format!("Failed to download: {reason}"),
            source_url: task.url.clone(),
            status: ChapterStatus::Failed,
        }
    }

    pub fn is_ok(&self) -> bool {
        self.status == ChapterStatus::Ok
    }
}

/// 以 1 起始的章节序号作为兜底标题。
pub fn default_title(index: usize) -> String {
    format!("Chapter {}", index + 1)
}

/// 最终输出：按 index 升序、已应用保留策略的章节序列。
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CrawlResult {
    pub chapters: Vec<Chapter>,
}

impl CrawlResult {
    pub fn len(&self) -> usize {
        self.chapters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chapters.is_empty()
    }

    pub fn indices(&self) -> Vec<usize> {
        self.chapters.iter().map(|c| c.index).collect()
    }
}

/// 一本书的完整产出（写盘用）。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NovelOutput {
    pub novel_id: String,
    pub source_url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub info: Option<NovelInfo>,
    #[serde(default)]
    pub volumes: Vec<Volume>,
    pub chapters: Vec<Chapter>,
}

pub const CHAPTERS_PER_VOLUME: usize = 100;

/// 每 100 章（按原始序号）一卷，仅用于输出分组。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Volume {
    pub id: usize,
    pub title: String,
    /// 卷内第一章与最后一章的原始序号（从 0 开始，闭区间）。
    pub first_index: usize,
    pub last_index: usize,
}

/// `chapters` 须已按序号排序；被保留策略剔除的章节不会产生空卷。
pub fn volumes_for(chapters: &[Chapter]) -> Vec<Volume> {
    let mut volumes: Vec<Volume> = Vec::new();
    for ch in chapters {
        let id = ch.index / CHAPTERS_PER_VOLUME + 1;
        match volumes.last_mut() {
            Some(v) if v.id == id => v.last_index = ch.index,
            _ => volumes.push(Volume {
                id,
                title: format!("Volume {id}"),
                first_index: ch.index,
                last_index: ch.index,
            }),
        }
    }
    volumes
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DownloadResult {
    pub success: u32,
    pub failed: u32,
    pub empty: u32,
    pub canceled: u32,
}

impl DownloadResult {
    pub fn tally(chapters: &[Chapter], canceled: usize) -> Self {
        let mut out = Self {
            canceled: canceled as u32,
            ..Self::default()
        };
        for ch in chapters {
            match ch.status {
                ChapterStatus::Ok => out.success += 1,
                ChapterStatus::Failed => out.failed += 1,
                ChapterStatus::Empty => out.empty += 1,
            }
        }
        out
    }

    pub fn total(&self) -> u32 {
        self.success + self.failed + self.empty
    }

    /// 没有任何一章拿到页面：视为整体失败。
    pub fn is_total_failure(&self) -> bool {
        self.total() > 0 && self.failed == self.total()
    }
}

/// 1 起始、闭区间的章节范围。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChapterRange {
    pub start: usize,
    pub end: usize,
}

impl std::str::FromStr for ChapterRange {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (a, b) = s
            .split_once('-')
            .ok_or_else(|| format!("expected START-END, got '{s}'"))?;
        let start: usize = a.trim().parse().map_err(|_| format!("bad start '{a}'"))?;
        let end: usize = b.trim().parse().map_err(|_| format!("bad end '{b}'"))?;
        if start == 0 || start > end {
            return Err(format!("invalid range {start}-{end}"));
        }
        Ok(Self { start, end })
    }
}

/// Keep only the tasks inside `range`; tasks keep their original index.
pub fn apply_range(tasks: Vec<ChapterTask>, range: Option<ChapterRange>) -> Vec<ChapterTask> {
    match range {
        None => tasks,
        Some(r) => tasks
            .into_iter()
            .filter(|t| t.index + 1 >= r.start && t.index < r.end)
            .collect(),
    }
}

/// Emitted once per settled task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ProgressEvent {
    pub done: usize,
    pub total: usize,
    pub index: usize,
    pub status: ChapterStatus,
}
