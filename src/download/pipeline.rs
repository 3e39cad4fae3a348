//! 抓取主流程：解析目录 -> 并发下载 -> 汇总 -> 落盘。

use std::path::PathBuf;
use std::sync::{Arc, atomic::AtomicBool};

use thiserror::Error;
use tracing::{debug, info, warn};

use super::assembler::assemble;
use super::models::{ChapterRange, DownloadResult, NovelOutput, apply_range, volumes_for};
use super::pool::BoundedDownloader;
use super::progress::{ProgressCallback, ProgressReporter};
use super::resolver::{ChapterListResolver, ResolutionError, ResolverLimits};
use crate::base_system::context::Config;
use crate::network_parser::{PageFetcher, PrefetchedFetcher};
use crate::output::{OutputWriter, PersistenceError};

#[derive(Debug, Error)]
pub enum CrawlError {
    #[error(transparent)]
    Resolution(#[from] ResolutionError),
    #[error("范围无效或章节为空")]
    EmptySelection,
    #[error(transparent)]
    Persistence(#[from] PersistenceError),
}

#[derive(Debug, Clone)]
pub struct CrawlRequest {
    pub start_url: String,
    pub range: Option<ChapterRange>,
}

/// 调用方可选注入的取消标志与进度回调。
#[derive(Default)]
pub struct CrawlHooks {
    pub cancel: Option<Arc<AtomicBool>>,
    pub progress: Option<ProgressCallback>,
    pub show_progress_bar: bool,
}

#[derive(Debug, Clone)]
pub struct CrawlSummary {
    pub novel_id: String,
    pub title: Option<String>,
    pub result: DownloadResult,
    /// Chapters kept by the inclusion policy.
    pub kept: usize,
    /// `None` when nothing was written (every chapter failed).
    pub output_path: Option<PathBuf>,
}

pub fn crawl(
    cfg: &Config,
    fetcher: &dyn PageFetcher,
    writer: &OutputWriter,
    request: &CrawlRequest,
    hooks: CrawlHooks,
) -> Result<CrawlSummary, CrawlError> {
    let mut resolver = ChapterListResolver::new(fetcher, ResolverLimits::from_config(cfg));
    if let Some(cancel) = hooks.cancel.clone() {
        resolver = resolver.with_cancel(cancel);
    }
    let resolution = resolver.resolve(&request.start_url, cfg.chapter_strategy)?;

    let tasks = apply_range(resolution.tasks, request.range);
    if tasks.is_empty() {
        return Err(CrawlError::EmptySelection);
    }
    info!(
        target: "download",
        novel_id = %resolution.novel_id,
        chapters = tasks.len(),
        concurrency = cfg.effective_concurrency(),
        "启动下载"
    );

    // 逆向翻页时已经取到的章节页不再重复请求
    let cached = PrefetchedFetcher::new(fetcher, resolution.prefetched);
    let mut downloader =
        BoundedDownloader::new(&cached, resolution.site.parser(), cfg.effective_concurrency())
            .with_deadline(cfg.crawl_deadline());
    if let Some(cancel) = hooks.cancel {
        downloader = downloader.with_cancel(cancel);
    }

    let mut reporter = ProgressReporter::new(tasks.len(), hooks.show_progress_bar, hooks.progress);
    let outcome = downloader.run(&tasks, |event| reporter.record(event));
    reporter.finish();
    debug!(
        target: "download",
        failed = reporter.failed(),
        unused_cache = cached.remaining(),
        "下载阶段结束"
    );

    let result = DownloadResult::tally(&outcome.chapters, outcome.canceled);
    info!(
        target: "download",
        "下载结束: 成功 {} 章，失败 {} 章，空章节 {} 章，取消 {} 章",
        result.success,
        result.failed,
        result.empty,
        result.canceled
    );

    let assembled = assemble(outcome.chapters, cfg.inclusion_policy);
    let title = resolution.info.as_ref().map(|i| i.title.clone());
    let kept = assembled.len();

    let output_path = if result.is_total_failure() {
        warn!(target: "download", "所有章节均下载失败，跳过写入");
        None
    } else {
        let novel = NovelOutput {
            novel_id: resolution.novel_id.clone(),
            source_url: resolution.listing_url,
            info: resolution.info,
            volumes: volumes_for(&assembled.chapters),
            chapters: assembled.chapters,
        };
        Some(writer.write_novel(&novel)?)
    };

    Ok(CrawlSummary {
        novel_id: resolution.novel_id,
        title,
        result,
        kept,
        output_path,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::base_system::context::OutputFormat;
    use crate::download::assembler::InclusionPolicy;
    use crate::download::resolver::ChapterStrategy;
    use crate::test_support::TestServer;
    use crate::network_parser::{FetchPolicy, HttpFetcher};
    use std::sync::Mutex;

    fn listing(latest: usize) -> String {
        format!(
            r#"<html><body>
            <div class="novel"><div class="n-text"><h1>Test Novel</h1><a class="bauthor">Writer</a></div></div>
            <ul class="u-chapter"><li><a href="/read/42/p{latest}.html">latest</a></li></ul>
            <ul class="u-chapter cfirst"><li><a href="/read/42/p1.html">start</a></li></ul>
            </body></html>"#
        )
    }

    fn chapter(n: usize) -> String {
        let prev = if n > 1 {
            format!(r#"<a href="/read/42/p{}.html">上一章</a>"#, n - 1)
        } else {
            String::new()
        };
        format!(
            r#"<html><body><article class="page-content"><h3>第{n}章</h3>
            <section><p>Paragraph {n}.</p><script>ads()</script></section></article>{prev}</body></html>"#
        )
    }

    fn server(latest: usize, broken: Option<usize>) -> TestServer {
        let chapter_paths: Vec<String> = (1..=latest).map(|n| format!("/read/42/p{n}.html")).collect();
        let mut pages = vec![("/read/42", 200, listing(latest))];
        for (i, path) in chapter_paths.iter().enumerate() {
            let n = i + 1;
            let status = if Some(n) == broken { 500 } else { 200 };
            pages.push((path.as_str(), status, chapter(n)));
        }
        TestServer::start(pages)
    }

    fn config(dir: &std::path::Path) -> Config {
        Config {
            concurrency: 3,
            save_path: dir.to_string_lossy().to_string(),
            ..Config::default()
        }
    }

    #[test]
    fn crawls_a_novel_end_to_end() {
        let server = server(4, Some(3));
        let tmp = tempfile::tempdir().unwrap();
        let cfg = config(tmp.path());
        let fetcher = HttpFetcher::new(&FetchPolicy::from_config(&cfg)).unwrap();
        let writer = OutputWriter::from_config(&cfg);

        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let summary = crawl(
            &cfg,
            &fetcher,
            &writer,
            &CrawlRequest {
                start_url: server.url("/read/42/"),
                range: None,
            },
            CrawlHooks {
                progress: Some(Box::new(move |e| sink.lock().unwrap().push(e.index))),
                ..CrawlHooks::default()
            },
        )
        .unwrap();

        assert_eq!(summary.novel_id, "42");
        assert_eq!(summary.title.as_deref(), Some("Test Novel"));
        assert_eq!(summary.result.success, 3);
        assert_eq!(summary.result.failed, 1);
        assert_eq!(summary.kept, 4);

        let mut indices = seen.lock().unwrap().clone();
        indices.sort_unstable();
        assert_eq!(indices, vec![0, 1, 2, 3]);

        let path = summary.output_path.unwrap();
        let value: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(path).unwrap()).unwrap();
        let chapters = value["chapters"].as_array().unwrap();
        assert_eq!(chapters.len(), 4);
        assert_eq!(chapters[0]["title"], "第1章");
        assert_eq!(chapters[0]["content"], "Paragraph 1.");
        assert_eq!(chapters[2]["status"], "failed");
        assert_eq!(value["info"]["author"], "Writer");
        assert_eq!(value["volumes"][0]["title"], "Volume 1");
        assert_eq!(value["volumes"][0]["last_index"], 3);
    }

    #[test]
    fn drop_failed_policy_and_range_keep_original_indices() {
        let server = server(5, Some(3));
        let tmp = tempfile::tempdir().unwrap();
        let cfg = Config {
            inclusion_policy: InclusionPolicy::DropFailedAndEmpty,
            output_format: OutputFormat::Json,
            ..config(tmp.path())
        };
        let fetcher = HttpFetcher::new(&FetchPolicy::from_config(&cfg)).unwrap();

        let summary = crawl(
            &cfg,
            &fetcher,
            &OutputWriter::from_config(&cfg),
            &CrawlRequest {
                start_url: server.url("/read/42"),
                range: Some("2-4".parse().unwrap()),
            },
            CrawlHooks::default(),
        )
        .unwrap();

        assert_eq!(summary.result.total(), 3);
        assert_eq!(summary.kept, 2);
        let value: serde_json::Value = serde_json::from_str(
            &std::fs::read_to_string(summary.output_path.unwrap()).unwrap(),
        )
        .unwrap();
        let indices: Vec<u64> = value["chapters"]
            .as_array()
            .unwrap()
            .iter()
            .map(|c| c["index"].as_u64().unwrap())
            .collect();
        assert_eq!(indices, vec![1, 3]);
    }

    #[test]
    fn reverse_traversal_reuses_walked_pages() {
        let server = server(3, None);
        let tmp = tempfile::tempdir().unwrap();
        let cfg = Config {
            chapter_strategy: ChapterStrategy::ReverseTraversal,
            output_format: OutputFormat::Txt,
            ..config(tmp.path())
        };
        let fetcher = HttpFetcher::new(&FetchPolicy::from_config(&cfg)).unwrap();

        let summary = crawl(
            &cfg,
            &fetcher,
            &OutputWriter::from_config(&cfg),
            &CrawlRequest {
                start_url: server.url("/read/42"),
                range: None,
            },
            CrawlHooks::default(),
        )
        .unwrap();

        assert_eq!(summary.result.total(), 3);
        assert_eq!(summary.result.success, 3);
        let text = std::fs::read_to_string(summary.output_path.unwrap()).unwrap();
        let p1 = text.find("第1章").unwrap();
        let p2 = text.find("第2章").unwrap();
        let p3 = text.find("第3章").unwrap();
        assert!(p1 < p2 && p2 < p3);
    }

    #[test]
    fn cancel_during_resolution_is_fatal() {
        let server = server(5, None);
        let tmp = tempfile::tempdir().unwrap();
        let cfg = Config {
            chapter_strategy: ChapterStrategy::ReverseTraversal,
            ..config(tmp.path())
        };
        let fetcher = HttpFetcher::new(&FetchPolicy::from_config(&cfg)).unwrap();

        let err = crawl(
            &cfg,
            &fetcher,
            &OutputWriter::from_config(&cfg),
            &CrawlRequest {
                start_url: server.url("/read/42"),
                range: None,
            },
            CrawlHooks {
                cancel: Some(Arc::new(AtomicBool::new(true))),
                ..CrawlHooks::default()
            },
        )
        .unwrap_err();
        assert!(matches!(
            err,
            CrawlError::Resolution(ResolutionError::Canceled)
        ));
        assert_eq!(std::fs::read_dir(tmp.path()).unwrap().count(), 0);
    }

    #[test]
    fn total_failure_writes_nothing() {
        let server = TestServer::start(vec![("/read/42", 200, listing(2))]);
        let tmp = tempfile::tempdir().unwrap();
        let cfg = config(tmp.path());
        let fetcher = HttpFetcher::new(&FetchPolicy::from_config(&cfg)).unwrap();

        let summary = crawl(
            &cfg,
            &fetcher,
            &OutputWriter::from_config(&cfg),
            &CrawlRequest {
                start_url: server.url("/read/42"),
                range: None,
            },
            CrawlHooks::default(),
        )
        .unwrap();

        assert!(summary.result.is_total_failure());
        assert!(summary.output_path.is_none());
    }

    #[test]
    fn resolution_failure_is_fatal() {
        let server = TestServer::start(vec![]);
        let tmp = tempfile::tempdir().unwrap();
        let cfg = config(tmp.path());
        let fetcher = HttpFetcher::new(&FetchPolicy::from_config(&cfg)).unwrap();

        let err = crawl(
            &cfg,
            &fetcher,
            &OutputWriter::from_config(&cfg),
            &CrawlRequest {
                start_url: server.url("/read/42"),
                range: None,
            },
            CrawlHooks::default(),
        )
        .unwrap_err();
        assert!(matches!(err, CrawlError::Resolution(_)));
    }
}
