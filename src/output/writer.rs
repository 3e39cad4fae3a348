//! JSON / TXT 输出写入。
//!
//! 文件名以小说 id 为键（`<save_path>/<novel_id>.json|txt`），
//! 先写临时文件再 rename，避免中断时留下半截文件。

use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::info;

use crate::base_system::context::{Config, OutputFormat, safe_fs_name};
use crate::download::models::{NovelOutput, Volume};
use crate::site::SearchHit;

#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("io error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("serialize output failed: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("文件已存在且配置禁止覆盖: {0}")]
    AlreadyExists(PathBuf),
}

impl PersistenceError {
    fn io(path: &Path, source: std::io::Error) -> Self {
        Self::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

#[derive(Debug, Clone)]
pub struct OutputWriter {
    dir: PathBuf,
    format: OutputFormat,
    allow_overwrite: bool,
}

impl OutputWriter {
    pub fn new(dir: impl Into<PathBuf>, format: OutputFormat, allow_overwrite: bool) -> Self {
        Self {
            dir: dir.into(),
            format,
            allow_overwrite,
        }
    }

    pub fn from_config(cfg: &Config) -> Self {
        Self::new(cfg.save_dir(), cfg.output_format, cfg.allow_overwrite_files)
    }

    pub fn novel_path(&self, novel_id: &str) -> PathBuf {
        let ext = match self.format {
            OutputFormat::Json => "json",
            OutputFormat::Txt => "txt",
        };
        self.dir
            .join(format!("{}.{}", safe_fs_name(novel_id, "_", 120), ext))
    }

    pub fn write_novel(&self, novel: &NovelOutput) -> Result<PathBuf, PersistenceError> {
        let path = self.novel_path(&novel.novel_id);
        let bytes = match self.format {
            OutputFormat::Json => serde_json::to_vec_pretty(novel)?,
            OutputFormat::Txt => render_txt(novel).into_bytes(),
        };
        self.persist(&path, &bytes)?;
        info!(target: "writer", path = %path.display(), chapters = novel.chapters.len(), "已保存");
        Ok(path)
    }

    /// `search_results_<query>.json`
    pub fn write_search_results(
        &self,
        query: &str,
        hits: &[SearchHit],
    ) -> Result<PathBuf, PersistenceError> {
        let name = format!("search_results_{}.json", safe_fs_name(query, "_", 120));
        let path = self.dir.join(name);
        self.persist(&path, &serde_json::to_vec_pretty(hits)?)?;
        info!(target: "writer", path = %path.display(), hits = hits.len(), "搜索结果已保存");
        Ok(path)
    }

    fn persist(&self, path: &Path, bytes: &[u8]) -> Result<(), PersistenceError> {
        std::fs::create_dir_all(&self.dir).map_err(|e| PersistenceError::io(&self.dir, e))?;
        if !self.allow_overwrite && path.exists() {
            return Err(PersistenceError::AlreadyExists(path.to_path_buf()));
        }
        write_atomic(path, bytes).map_err(|e| PersistenceError::io(path, e))
    }
}

fn write_atomic(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let tmp = path.with_extension(format!(
        "{}.part",
        path.extension().and_then(|s| s.to_str()).unwrap_or("")
    ));
    std::fs::write(&tmp, bytes)?;
    std::fs::rename(&tmp, path).inspect_err(|_| {
        let _ = std::fs::remove_file(&tmp);
    })
}

/// 书籍信息头 + 按顺序拼接的章节正文。
pub fn render_txt(novel: &NovelOutput) -> String {
    let mut out = String::new();
    if let Some(info) = &novel.info {
        let _ = writeln!(out, "书名：{}", info.title);
        if !info.author.trim().is_empty() {
            let _ = writeln!(out, "作者：{}", info.author);
        }
    }
    let _ = writeln!(out, "novel_id={}", novel.novel_id);
    let _ = writeln!(out, "来源：{}", novel.source_url);
    if let Some(synopsis) = novel.info.as_ref().and_then(|i| i.synopsis.as_deref()) {
        let _ = writeln!(out);
        let _ = writeln!(out, "简介：");
        let _ = writeln!(out, "{}", synopsis.trim());
    }
    let _ = writeln!(out);
    let _ = writeln!(out, "{}", "=".repeat(40));

    let mut volumes = novel.volumes.iter().peekable();
    for ch in &novel.chapters {
        // 超过一卷时在每卷第一章前写卷标题
        if novel.volumes.len() > 1 {
            if let Some(v) = volumes.next_if(|v: &&Volume| v.first_index == ch.index) {
                let _ = writeln!(out);
                let _ = writeln!(out, "【{}】", v.title);
            }
        }
        let _ = writeln!(out);
        let _ = writeln!(out, "{}", ch.title);
        let _ = writeln!(out);
        // 保留首段的全角缩进，只去尾部空白
        let _ = writeln!(out, "{}", ch.content.trim_end());
    }
    out
}
