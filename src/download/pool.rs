//! 章节并发下载工作池。
//!
//! 固定数量的工作线程从共享队列领取任务，结果按任务位置写入预分配的槽位，
//! 因此完成顺序不影响输出顺序。

use std::panic::{self, AssertUnwindSafe};
use std::sync::{
    Arc, OnceLock,
    atomic::{AtomicBool, AtomicUsize, Ordering},
};
use std::time::{Duration, Instant};

use crossbeam_channel as channel;
use tracing::{debug, info, warn};

use super::models::{Chapter, ChapterTask, ProgressEvent, default_title};
use crate::base_system::context::MAX_CONCURRENCY;
use crate::network_parser::PageFetcher;
use crate::site::PageParser;

const CANCELED_REASON: &str = "canceled";

/// 一轮下载的结果：`chapters` 与输入任务一一对应（同序、同长）。
#[derive(Debug, Default)]
pub struct DownloadOutcome {
    pub chapters: Vec<Chapter>,
    /// Tasks never claimed because of cancellation or the deadline.
    pub canceled: usize,
}

pub struct BoundedDownloader<'a> {
    fetcher: &'a dyn PageFetcher,
    parser: &'a dyn PageParser,
    concurrency: usize,
    cancel: Option<Arc<AtomicBool>>,
    deadline: Option<Duration>,
}

impl<'a> BoundedDownloader<'a> {
    pub fn new(fetcher: &'a dyn PageFetcher, parser: &'a dyn PageParser, concurrency: usize) -> Self {
        Self {
            fetcher,
            parser,
            concurrency: concurrency.clamp(1, MAX_CONCURRENCY),
            cancel: None,
            deadline: None,
        }
    }

    pub fn with_cancel(mut self, cancel: Arc<AtomicBool>) -> Self {
        self.cancel = Some(cancel);
        self
    }

    /// Stop claiming new tasks once `deadline` has elapsed since `run` started.
    pub fn with_deadline(mut self, deadline: Option<Duration>) -> Self {
        self.deadline = deadline;
        self
    }

    /// Download every task. Returns once each task has settled; progress
    /// events are delivered on the calling thread.
    pub fn run(
        &self,
        tasks: &[ChapterTask],
        mut on_progress: impl FnMut(ProgressEvent),
    ) -> DownloadOutcome {
        let total = tasks.len();
        if total == 0 {
            return DownloadOutcome::default();
        }
        let workers = self.concurrency.min(total);
        info!(target: "download", total, workers, "开始下载章节");

        let slots: Vec<OnceLock<Chapter>> = (0..total).map(|_| OnceLock::new()).collect();
        let settled = AtomicUsize::new(0);
        let started = Instant::now();

        let (task_tx, task_rx) = channel::bounded::<usize>(total);
        for pos in 0..total {
            let _ = task_tx.send(pos);
        }
        drop(task_tx);
        let (evt_tx, evt_rx) = channel::unbounded::<ProgressEvent>();

        std::thread::scope(|s| {
            for _ in 0..workers {
                let task_rx = task_rx.clone();
                let evt_tx = evt_tx.clone();
                let slots = &slots;
                let settled = &settled;
                s.spawn(move || {
                    while let Ok(pos) = task_rx.recv() {
                        if self.should_stop(started) {
                            break;
                        }
                        let task = &tasks[pos];
                        let chapter = self.download_one(task);
                        let status = chapter.status;
                        let _ = slots[pos].set(chapter);
                        let done = settled.fetch_add(1, Ordering::AcqRel) + 1;
                        let _ = evt_tx.send(ProgressEvent {
                            done,
                            total,
                            index: task.index,
                            status,
                        });
                    }
                });
            }
            drop(evt_tx);
            for evt in evt_rx.iter() {
                on_progress(evt);
            }
        });

        let mut canceled = 0;
        let chapters = slots
            .into_iter()
            .zip(tasks)
            .map(|(slot, task)| {
                slot.into_inner().unwrap_or_else(|| {
                    canceled += 1;
                    Chapter::failed(task, CANCELED_REASON)
                })
            })
            .collect();

        if canceled > 0 {
            warn!(target: "download", canceled, "下载被中止，未开始的章节已标记为失败");
        }
        DownloadOutcome { chapters, canceled }
    }

    fn should_stop(&self, started: Instant) -> bool {
        self.cancel
            .as_ref()
            .is_some_and(|c| c.load(Ordering::Relaxed))
            || self.deadline.is_some_and(|d| started.elapsed() >= d)
    }

    fn download_one(&self, task: &ChapterTask) -> Chapter {
        let attempt = panic::catch_unwind(AssertUnwindSafe(|| self.fetch_and_parse(task)));
        attempt.unwrap_or_else(|_| {
            warn!(target: "download", index = task.index, url = %task.url, "章节处理线程 panic");
            Chapter::failed(task, "worker panicked")
        })
    }

    fn fetch_and_parse(&self, task: &ChapterTask) -> Chapter {
        let body = match self.fetcher.fetch(&task.url) {
            Ok(body) => body,
            Err(err) => {
                warn!(target: "download", index = task.index, "{}", err);
                return Chapter::failed(task, &err.to_string());
            }
        };

        let page = self.parser.parse(&String::from_utf8_lossy(&body));
        match page.chapter_content(&task.url) {
            Ok(content) => {
                let title = page
                    .title
                    .clone()
                    .unwrap_or_else(|| default_title(task.index));
                debug!(target: "download", index = task.index, %title, "章节完成");
                Chapter::ok(task, title, content.to_string())
            }
            Err(err) => {
                warn!(target: "download", index = task.index, "{}", err);
                Chapter::empty(task, page.title)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::download::models::ChapterStatus;
    use crate::network_parser::{FetchCause, FetchError};
    use crate::site::ParsedPage;
    use std::sync::Mutex;
    use std::thread;

    fn count_status(chapters: &[Chapter], status: ChapterStatus) -> usize {
        chapters.iter().filter(|c| c.status == status).count()
    }

    /// 把 URL 原样当作页面内容返回，可配置延迟、失败页与并发计数。
    #[derive(Default)]
    struct InstrumentedFetcher {
        delay: Duration,
        fail_urls: Vec<String>,
        empty_urls: Vec<String>,
        in_flight: AtomicUsize,
        max_in_flight: AtomicUsize,
        calls: AtomicUsize,
    }

    impl PageFetcher for InstrumentedFetcher {
        fn fetch(&self, url: &str) -> Result<Vec<u8>, FetchError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(now, Ordering::SeqCst);
            if !self.delay.is_zero() {
                thread::sleep(self.delay);
            }
            self.in_flight.fetch_sub(1, Ordering::SeqCst);

            if self.fail_urls.iter().any(|u| u == url) {
                return Err(FetchError::new(url, FetchCause::Status(500)));
            }
            if self.empty_urls.iter().any(|u| u == url) {
                return Ok(Vec::new());
            }
            Ok(url.as_bytes().to_vec())
        }
    }

    /// 页面内容即 URL：标题取最后一段路径。
    struct EchoParser;

    impl PageParser for EchoParser {
        fn parse(&self, html: &str) -> ParsedPage {
            if html.is_empty() {
                return ParsedPage::default();
            }
            ParsedPage {
                title: html.rsplit('/').next().map(str::to_string),
                content: Some(format!("body of {html}")),
                ..ParsedPage::default()
            }
        }
    }

    fn tasks(n: usize) -> Vec<ChapterTask> {
        (0..n)
            .map(|i| ChapterTask {
                index: i,
                url: format!("https://x.example/read/1/p{}.html", i + 1),
            })
            .collect()
    }

    #[test]
    fn every_slot_is_filled_in_task_order() {
        let fetcher = InstrumentedFetcher {
            delay: Duration::from_millis(5),
            ..Default::default()
        };
        let tasks = tasks(40);
        let mut events = Vec::new();
        let out = BoundedDownloader::new(&fetcher, &EchoParser, 8).run(&tasks, |e| events.push(e));

        assert_eq!(out.chapters.len(), 40);
        assert_eq!(out.canceled, 0);
        for (task, ch) in tasks.iter().zip(&out.chapters) {
            assert_eq!(ch.index, task.index);
            assert_eq!(ch.source_url, task.url);
            assert_eq!(ch.content, format!("body of {}", task.url));
        }
        assert_eq!(events.len(), 40);
        assert_eq!(events.iter().map(|e| e.done).max(), Some(40));
        assert!(events.iter().all(|e| e.total == 40));
    }

    #[test]
    fn in_flight_reaches_but_never_exceeds_ceiling() {
        let fetcher = InstrumentedFetcher {
            delay: Duration::from_millis(30),
            ..Default::default()
        };
        let out = BoundedDownloader::new(&fetcher, &EchoParser, 2).run(&tasks(5), |_| {});
        assert_eq!(out.chapters.len(), 5);
        assert_eq!(fetcher.max_in_flight.load(Ordering::SeqCst), 2);
        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 5);
    }

    #[test]
    fn wide_pool_runs_requests_in_parallel() {
        let fetcher = InstrumentedFetcher {
            delay: Duration::from_millis(50),
            ..Default::default()
        };
        let out = BoundedDownloader::new(&fetcher, &EchoParser, 8).run(&tasks(40), |_| {});
        assert_eq!(out.chapters.len(), 40);
        assert_eq!(fetcher.max_in_flight.load(Ordering::SeqCst), 8);
    }

    #[test]
    fn one_failure_does_not_affect_siblings() {
        let tasks = tasks(4);
        let fetcher = InstrumentedFetcher {
            fail_urls: vec![tasks[2].url.clone()],
            empty_urls: vec![tasks[3].url.clone()],
            ..Default::default()
        };
        let out = BoundedDownloader::new(&fetcher, &EchoParser, 3).run(&tasks, |_| {});

        let statuses: Vec<_> = out.chapters.iter().map(|c| c.status).collect();
        assert_eq!(
            statuses,
            vec![
                ChapterStatus::Ok,
                ChapterStatus::Ok,
                ChapterStatus::Failed,
                ChapterStatus::Empty
            ]
        );
        assert!(out.chapters[2].content.contains("500"));
        assert_eq!(out.chapters[3].title, "Chapter 4");
        assert_eq!(count_status(&out.chapters, ChapterStatus::Ok), 2);
    }

    #[test]
    fn cancellation_marks_unclaimed_tasks() {
        let fetcher = InstrumentedFetcher {
            delay: Duration::from_millis(20),
            ..Default::default()
        };
        let cancel = Arc::new(AtomicBool::new(false));
        let flag = cancel.clone();
        let seen = Mutex::new(0usize);

        let out = BoundedDownloader::new(&fetcher, &EchoParser, 1)
            .with_cancel(cancel)
            .run(&tasks(10), |_| {
                let mut n = seen.lock().unwrap();
                *n += 1;
                if *n == 2 {
                    flag.store(true, Ordering::SeqCst);
                }
            });

        assert_eq!(out.chapters.len(), 10);
        assert!(out.canceled > 0);
        let failed = count_status(&out.chapters, ChapterStatus::Failed);
        assert_eq!(failed, out.canceled);
        assert!(out.chapters.last().unwrap().content.contains("canceled"));
        assert!(fetcher.calls.load(Ordering::SeqCst) < 10);
    }

    #[test]
    fn expired_deadline_claims_nothing() {
        let fetcher = InstrumentedFetcher::default();
        let out = BoundedDownloader::new(&fetcher, &EchoParser, 4)
            .with_deadline(Some(Duration::ZERO))
            .run(&tasks(6), |_| {});
        assert_eq!(out.canceled, 6);
        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn empty_task_list_is_a_noop() {
        let fetcher = InstrumentedFetcher::default();
        let out = BoundedDownloader::new(&fetcher, &EchoParser, 4).run(&[], |_| {});
        assert!(out.chapters.is_empty());
    }
}
