//! 全局配置结构（Config）与默认值。
//!
//! 该模块同时提供生成 `config.yml` 的字段元信息。

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::config::{ConfigError, ConfigSpec, FieldMeta};
use crate::download::assembler::InclusionPolicy;
use crate::download::resolver::ChapterStrategy;

/// 并发上限的硬性边界，防止误配置压垮源站。
pub const MAX_CONCURRENCY: usize = 64;

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "snake_case")]
pub enum OutputFormat {
    #[default]
    Json,
    Txt,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    // 网络配置
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
    #[serde(default = "default_request_timeout")]
    pub request_timeout: u64,
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout: f64,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    #[serde(default = "default_accept_language")]
    pub accept_language: String,
    #[serde(default)]
    pub max_retries: u32,
    #[serde(default = "default_min_wait_time")]
    pub min_wait_time: u64,
    #[serde(default = "default_max_wait_time")]
    pub max_wait_time: u64,

    // 目录解析
    #[serde(default)]
    pub chapter_strategy: ChapterStrategy,
    #[serde(default = "default_max_chapters")]
    pub max_chapters: usize,
    #[serde(default = "default_max_traversal_steps")]
    pub max_traversal_steps: usize,
    #[serde(default)]
    pub crawl_deadline_secs: u64,

    // 保存配置
    #[serde(default)]
    pub inclusion_policy: InclusionPolicy,
    #[serde(default = "default_save_path")]
    pub save_path: String,
    #[serde(default)]
    pub output_format: OutputFormat,
    #[serde(default = "default_true")]
    pub allow_overwrite_files: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            concurrency: default_concurrency(),
            request_timeout: default_request_timeout(),
            connect_timeout: default_connect_timeout(),
            user_agent: default_user_agent(),
            accept_language: default_accept_language(),
            max_retries: 0,
            min_wait_time: default_min_wait_time(),
            max_wait_time: default_max_wait_time(),
            chapter_strategy: ChapterStrategy::default(),
            max_chapters: default_max_chapters(),
            max_traversal_steps: default_max_traversal_steps(),
            crawl_deadline_secs: 0,
            inclusion_policy: InclusionPolicy::default(),
            save_path: default_save_path(),
            output_format: OutputFormat::default(),
            allow_overwrite_files: default_true(),
        }
    }
}

impl ConfigSpec for Config {
    const FILE_NAME: &'static str = "config.yml";

    fn fields() -> &'static [FieldMeta] {
        static FIELDS: [FieldMeta; 16] = [
            FieldMeta {
                name: "concurrency",
                description: "同时下载的章节数上限（1-64）",
            },
            FieldMeta {
                name: "request_timeout",
                description: "单次请求超时时间（秒）",
            },
            FieldMeta {
                name: "connect_timeout",
                description: "建立连接超时时间（秒），0 表示不单独限制",
            },
            FieldMeta {
                name: "user_agent",
                description: "请求使用的 User-Agent",
            },
            FieldMeta {
                name: "accept_language",
                description: "请求使用的 Accept-Language",
            },
            FieldMeta {
                name: "max_retries",
                description: "单章失败后的重试次数，0 表示不重试",
            },
            FieldMeta {
                name: "min_wait_time",
                description: "重试最小退避时间, 单位ms",
            },
            FieldMeta {
                name: "max_wait_time",
                description: "重试最大退避时间, 单位ms",
            },
            FieldMeta {
                name: "chapter_strategy",
                description: "目录解析方式, 可选: [auto, numeric_range, enumeration, reverse_traversal]",
            },
            FieldMeta {
                name: "max_chapters",
                description: "单本小说允许的最大章节数（安全上限）",
            },
            FieldMeta {
                name: "max_traversal_steps",
                description: "逆向翻页解析目录时的最大步数（安全上限）",
            },
            FieldMeta {
                name: "crawl_deadline_secs",
                description: "整本下载的截止时间（秒），0 表示不限制",
            },
            FieldMeta {
                name: "inclusion_policy",
                description: "失败/空章节的保留策略, 可选: [keep_all, drop_failed, drop_failed_and_empty]",
            },
            FieldMeta {
                name: "save_path",
                description: "结果保存目录",
            },
            FieldMeta {
                name: "output_format",
                description: "保存格式, 可选: [json, txt]",
            },
            FieldMeta {
                name: "allow_overwrite_files",
                description: "是否允许覆盖已存在的结果文件",
            },
        ];
        &FIELDS
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.concurrency == 0 {
            return Err(ConfigError::Validation(
                "concurrency must be at least 1".to_string(),
            ));
        }
        if self.request_timeout == 0 {
            return Err(ConfigError::Validation(
                "request_timeout must be at least 1 second".to_string(),
            ));
        }
        if self.min_wait_time > self.max_wait_time {
            return Err(ConfigError::Validation(format!(
                "min_wait_time ({}) is larger than max_wait_time ({})",
                self.min_wait_time, self.max_wait_time
            )));
        }
        Ok(())
    }
}

impl Config {
    pub fn save_dir(&self) -> PathBuf {
        if self.save_path.trim().is_empty() {
            std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."))
        } else {
            PathBuf::from(&self.save_path)
        }
    }

    pub fn effective_concurrency(&self) -> usize {
        self.concurrency.clamp(1, MAX_CONCURRENCY)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout.max(1))
    }

    pub fn connect_timeout(&self) -> Option<Duration> {
        if self.connect_timeout <= 0.0 {
            return None;
        }
        let ms = (self.connect_timeout * 1000.0).round() as u64;
        (ms > 0).then(|| Duration::from_millis(ms))
    }

    pub fn crawl_deadline(&self) -> Option<Duration> {
        (self.crawl_deadline_secs > 0).then(|| Duration::from_secs(self.crawl_deadline_secs))
    }
}

/// 把任意字符串转换为可用作文件名的形式。
pub fn safe_fs_name(name: &str, replacement: &str, max_len: usize) -> String {
    let fallback = replacement.chars().next().unwrap_or('_');
    let mut cleaned: String = name
        .trim()
        .chars()
        .map(|ch| match ch {
            ':' | '"' | '<' | '>' | '/' | '\\' | '|' | '?' | '*' => fallback,
            c if c.is_whitespace() => fallback,
            c if (c as u32) < 32 => fallback,
            _ => ch,
        })
        .collect();

    while cleaned.ends_with(' ') || cleaned.ends_with('.') {
        cleaned.pop();
    }

    const RESERVED: [&str; 22] = [
        "CON", "PRN", "AUX", "NUL", "COM1", "COM2", "COM3", "COM4", "COM5", "COM6", "COM7", "COM8",
        "COM9", "LPT1", "LPT2", "LPT3", "LPT4", "LPT5", "LPT6", "LPT7", "LPT8", "LPT9",
    ];
    if RESERVED.contains(&cleaned.to_uppercase().as_str()) {
        cleaned = format!("_{}", cleaned);
    }

    if cleaned.len() > max_len {
        // 避免在多字节 UTF-8 字符中间截断
        let mut end = max_len;
        while end > 0 && !cleaned.is_char_boundary(end) {
            end -= 1;
        }
        cleaned.truncate(end);
    }

    if cleaned.is_empty() {
        cleaned.push_str("unnamed");
    }
    cleaned
}

fn default_true() -> bool {
    true
}

fn default_concurrency() -> usize {
    10
}

fn default_request_timeout() -> u64 {
    10
}

fn default_connect_timeout() -> f64 {
    3.05
}

fn default_user_agent() -> String {
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120 Safari/537.36".to_string()
}

fn default_accept_language() -> String {
    "en-US,en;q=0.9".to_string()
}

fn default_min_wait_time() -> u64 {
    500
}

fn default_max_wait_time() -> u64 {
    8000
}

fn default_max_chapters() -> usize {
    10_000
}

fn default_max_traversal_steps() -> usize {
    10_000
}

fn default_save_path() -> String {
    "results".to_string()
}
