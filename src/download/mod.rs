//! 下载流程模块入口。
//!
//! 子模块：
//! - `models`    — 数据模型（ChapterTask / Chapter / CrawlResult / ProgressEvent 等）
//! - `resolver`  — 目录解析（数字区间 / 目录枚举 / 逆向翻页）
//! - `pool`      — 章节并发下载工作池
//! - `assembler` — 保留策略与结果汇总
//! - `progress`  — 进度上报与 CLI 进度条
//! - `search`    — 书名搜索
//! - `pipeline`  — 下载主流程编排

pub mod assembler;
pub mod models;
pub mod pipeline;
pub mod pool;
pub mod progress;
pub mod resolver;
pub mod search;
