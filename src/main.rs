//! 小说站点章节抓取器。
//!
//! 给定目录页或章节链接，解析出有序章节列表，并发下载正文，按保留策略汇总后写为 JSON/TXT。
//!
//! 代码结构（读代码入口）：
//! - `base_system`：配置/日志/重试/链接规范化等基础设施
//! - `network_parser`：单页抓取（超时、请求头、重试装饰器）
//! - `site`：站点识别与 HTML 解析
//! - `download`：目录解析、并发下载、结果汇总与主流程
//! - `output`：结果落盘

use std::path::Path;
use std::process::ExitCode;
use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};

use anyhow::{Context, Result, anyhow};
use clap::Parser;
use tracing::{debug, error, info, warn};

mod base_system;
mod download;
mod network_parser;
mod output;
mod site;
#[cfg(test)]
mod test_support;

use base_system::config::load_or_create;
use base_system::context::{Config, MAX_CONCURRENCY, OutputFormat};
use base_system::logging::{LogOptions, LogSystem};
use base_system::retry::RetryPolicy;
use download::assembler::InclusionPolicy;
use download::models::ChapterRange;
use download::pipeline::{CrawlError, CrawlHooks, CrawlRequest, CrawlSummary, crawl};
use download::resolver::ChapterStrategy;
use network_parser::{FetchPolicy, HttpFetcher, RetryingFetcher};
use output::OutputWriter;
use site::Site;

const VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Debug, Parser)]
#[command(name = "novel-crawler")]
#[command(about = "Download every chapter of a web novel into one JSON/TXT file")]
struct Cli {
    /// 小说目录页或任一章节链接
    url: Option<String>,

    /// 按书名搜索（结果写入 search_results_<query>.json）
    #[arg(long, conflicts_with = "url")]
    search: Option<String>,

    /// 章节列表解析方式（覆盖配置）
    #[arg(long, value_enum)]
    strategy: Option<ChapterStrategy>,

    /// 同时进行的章节请求数（1..=64）
    #[arg(long)]
    concurrency: Option<usize>,

    /// 失败/空章节的保留策略
    #[arg(long, value_enum)]
    policy: Option<InclusionPolicy>,

    #[arg(long, value_enum)]
    format: Option<OutputFormat>,

    /// 只下载部分章节，如 `1-50`（从 1 开始，闭区间）
    #[arg(long)]
    range: Option<ChapterRange>,

    /// 输出目录（覆盖配置中的 save_path）
    #[arg(long)]
    output_dir: Option<String>,

    /// 整体下载时限（秒），到时不再派发新章节
    #[arg(long)]
    deadline_secs: Option<u64>,

    /// 数据目录路径（用于存放 config.yml 和 logs）
    #[arg(long)]
    data_dir: Option<String>,

    /// 启用调试日志输出
    #[arg(long, default_value_t = false)]
    debug: bool,

    /// 显示版本信息后退出
    #[arg(long, default_value_t = false)]
    version: bool,
}

impl Cli {
    fn apply_overrides(&self, config: &mut Config) {
        if let Some(strategy) = self.strategy {
            config.chapter_strategy = strategy;
        }
        if let Some(concurrency) = self.concurrency {
            config.concurrency = concurrency.clamp(1, MAX_CONCURRENCY);
        }
        if let Some(policy) = self.policy {
            config.inclusion_policy = policy;
        }
        if let Some(format) = self.format {
            config.output_format = format;
        }
        if let Some(dir) = self.output_dir.as_ref() {
            config.save_path = dir.clone();
        }
        if let Some(secs) = self.deadline_secs {
            config.crawl_deadline_secs = secs;
        }
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    if cli.version {
        println!("novel-crawler v{}", VERSION);
        return ExitCode::SUCCESS;
    }

    match run(cli) {
        Ok(code) => code,
        Err(err) => {
            error!(target: "startup", "{:#}", err);
            eprintln!("error: {:#}", err);
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<ExitCode> {
    let data_dir = cli.data_dir.as_deref().map(Path::new);
    let log = init_logging(cli.debug, data_dir)?;
    info!(target: "startup", "当前版本: v{}", VERSION);
    debug!(target: "startup", logs = %log.logs_dir().display(), "日志已初始化");

    let mut config = load_or_create::<Config>(data_dir).context("load config.yml")?;
    cli.apply_overrides(&mut config);

    let retry = RetryPolicy::from_config(&config);
    if retry.is_enabled() {
        info!(target: "startup", max_retries = retry.max_retries, "已启用请求重试");
    }
    let fetcher = RetryingFetcher::new(
        HttpFetcher::new(&FetchPolicy::from_config(&config)).context("init http client")?,
        retry,
    );
    let writer = OutputWriter::from_config(&config);

    if let Some(query) = cli.search.as_deref() {
        let hits = download::search::search(&fetcher, Site::Ixdzs, query)?;
        for hit in &hits {
            println!("{}\t{}", hit.title, hit.url);
        }
        let path = writer.write_search_results(query, &hits)?;
        info!(target: "startup", path = %path.display(), "共 {} 条结果", hits.len());
        return Ok(ExitCode::SUCCESS);
    }

    let Some(url) = cli.url.clone() else {
        return Err(anyhow!("missing novel URL (or use --search <QUERY>)"));
    };

    let cancel = Arc::new(AtomicBool::new(false));
    let flag = cancel.clone();
    ctrlc::set_handler(move || {
        if !flag.swap(true, Ordering::SeqCst) {
            warn!(target: "startup", "收到中断信号，等待进行中的章节结束");
        }
    })
    .context("install Ctrl-C handler")?;

    let outcome = crawl(
        &config,
        &fetcher,
        &writer,
        &CrawlRequest {
            start_url: url,
            range: cli.range,
        },
        CrawlHooks {
            cancel: Some(cancel),
            progress: None,
            show_progress_bar: true,
        },
    );

    match &outcome {
        Ok(summary) => report(summary),
        Err(err) => error!(target: "download", "{}", err),
    }
    Ok(ExitCode::from(exit_code_for(&outcome)))
}

fn report(summary: &CrawlSummary) {
    let r = summary.result;
    info!(
        target: "download",
        novel_id = %summary.novel_id,
        title = summary.title.as_deref().unwrap_or("-"),
        "完成: 成功 {} / 失败 {} / 空 {} / 取消 {}，输出 {} 章",
        r.success,
        r.failed,
        r.empty,
        r.canceled,
        summary.kept
    );
    if let Some(path) = summary.output_path.as_ref() {
        println!("{}", path.display());
    }
}

/// 0：全部或部分成功；1：目录解析失败；2：写盘失败；3：所有章节都失败。
fn exit_code_for(outcome: &Result<CrawlSummary, CrawlError>) -> u8 {
    match outcome {
        Ok(summary) if summary.result.is_total_failure() => 3,
        Ok(_) => 0,
        Err(CrawlError::Resolution(_) | CrawlError::EmptySelection) => 1,
        Err(CrawlError::Persistence(_)) => 2,
    }
}

fn init_logging(debug: bool, base_dir: Option<&Path>) -> Result<LogSystem> {
    let opts = LogOptions {
        debug,
        use_color: true,
        archive_on_exit: true,
    };
    LogSystem::init(opts, base_dir).map_err(|e| anyhow!(e))
}
