//! 目录解析：把起始链接变成有序的章节任务列表。
//!
//! 三种方式：
//! - `NumericRange`：读取“最新章节”的序号 N，按模板生成 1..=N；
//! - `Enumeration`：按目录页 DOM 顺序收集全部章节链接；
//! - `ReverseTraversal`：从入口章节沿“上一章”逐页回溯到第一章，严格串行。

use std::collections::{HashMap, HashSet};
use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

use super::models::ChapterTask;
use crate::base_system::context::Config;
use crate::base_system::novel_id::trailing_chapter_number;
use crate::network_parser::{FetchError, PageFetcher};
use crate::site::{NovelInfo, ParsedPage, Site, absolute_url};

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "snake_case")]
pub enum ChapterStrategy {
    /// 按站点默认方式
    #[default]
    #[value(name = "auto")]
    Auto,
    #[value(name = "numeric_range")]
    NumericRange,
    #[value(name = "enumeration")]
    Enumeration,
    #[value(name = "reverse_traversal")]
    ReverseTraversal,
}

#[derive(Debug, Error)]
pub enum ResolutionError {
    #[error("unrecognized novel url: {0}")]
    UnrecognizedUrl(String),
    #[error("listing page unreachable: {0}")]
    ListingUnreachable(#[source] FetchError),
    #[error("no latest-chapter link found on {0}")]
    NoLatestChapter(String),
    #[error("cannot read a chapter number from {0}")]
    NoChapterNumber(String),
    #[error("no chapter anchors found on {0}")]
    NoChapterLinks(String),
    #[error("no entry chapter link found on {0}")]
    NoEntryChapter(String),
    #[error("site {0} has no numeric chapter url template")]
    NoTemplate(&'static str),
    #[error("{found} chapters exceeds the safety cap of {cap} (max_chapters)")]
    TooManyChapters { found: usize, cap: usize },
    #[error("walked {0} pages backwards without reaching the first chapter (max_traversal_steps)")]
    TraversalLimit(usize),
    #[error("backward walk broke at {url}: {source}")]
    TraversalBroken {
        url: String,
        #[source]
        source: FetchError,
    },
    #[error("resolved chapter list is empty")]
    Empty,
    #[error("chapter list resolution canceled")]
    Canceled,
}

#[derive(Debug, Clone, Copy)]
pub struct ResolverLimits {
    pub max_chapters: usize,
    pub max_traversal_steps: usize,
}

impl ResolverLimits {
    pub fn from_config(cfg: &Config) -> Self {
        Self {
            max_chapters: cfg.max_chapters.max(1),
            max_traversal_steps: cfg.max_traversal_steps.max(1),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Resolution {
    pub site: Site,
    pub novel_id: String,
    pub listing_url: String,
    pub strategy: ChapterStrategy,
    pub tasks: Vec<ChapterTask>,
    pub info: Option<NovelInfo>,
    /// Chapter pages already downloaded while resolving, keyed by URL.
    pub prefetched: HashMap<String, Vec<u8>>,
}

pub struct ChapterListResolver<'a> {
    fetcher: &'a dyn PageFetcher,
    limits: ResolverLimits,
    cancel: Option<Arc<AtomicBool>>,
}

impl<'a> ChapterListResolver<'a> {
    pub fn new(fetcher: &'a dyn PageFetcher, limits: ResolverLimits) -> Self {
        Self {
            fetcher,
            limits,
            cancel: None,
        }
    }

    /// 取消标志置位后不再发出新的请求。
    pub fn with_cancel(mut self, cancel: Arc<AtomicBool>) -> Self {
        self.cancel = Some(cancel);
        self
    }

    fn check_canceled(&self) -> Result<(), ResolutionError> {
        match self.cancel.as_ref() {
            Some(flag) if flag.load(Ordering::SeqCst) => Err(ResolutionError::Canceled),
            _ => Ok(()),
        }
    }

    pub fn resolve(
        &self,
        start_url: &str,
        strategy: ChapterStrategy,
    ) -> Result<Resolution, ResolutionError> {
        let site = Site::detect(start_url)
            .ok_or_else(|| ResolutionError::UnrecognizedUrl(start_url.to_string()))?;
        let listing_url = site
            .listing_url(start_url)
            .ok_or_else(|| ResolutionError::UnrecognizedUrl(start_url.to_string()))?;
        let novel_id = site
            .novel_id(&listing_url)
            .ok_or_else(|| ResolutionError::UnrecognizedUrl(start_url.to_string()))?;

        let strategy = match strategy {
            ChapterStrategy::Auto => site.default_strategy(),
            other => other,
        };
        info!(target: "resolver", site = site.name(), novel_id, ?strategy, "解析目录: {}", listing_url);

        self.check_canceled()?;
        let listing = self.fetch_page(site, &listing_url)?;
        let info = listing.info.clone().map(|mut info| {
            info.cover = info
                .cover
                .as_deref()
                .and_then(|c| absolute_url(c, &listing_url));
            info
        });

        let mut prefetched = HashMap::new();
        let urls = match strategy {
            ChapterStrategy::NumericRange | ChapterStrategy::Auto => {
                let template = site
                    .chapter_template(&listing_url)
                    .ok_or(ResolutionError::NoTemplate(site.name()))?;
                let latest = latest_chapter_number(&listing, &listing_url)?;
                self.check_cap(latest)?;
                return finish(
                    site,
                    novel_id,
                    listing_url,
                    strategy,
                    numeric_range_tasks(&template, latest),
                    info,
                    prefetched,
                );
            }
            ChapterStrategy::Enumeration => enumerate_links(&listing, &listing_url)?,
            ChapterStrategy::ReverseTraversal => {
                self.walk_backwards(site, &listing, &listing_url, &mut prefetched)?
            }
        };

        self.check_cap(urls.len())?;
        let tasks = urls
            .into_iter()
            .enumerate()
            .map(|(index, url)| ChapterTask { index, url })
            .collect();
        finish(site, novel_id, listing_url, strategy, tasks, info, prefetched)
    }

    fn fetch_page(&self, site: Site, url: &str) -> Result<ParsedPage, ResolutionError> {
        let body = self
            .fetcher
            .fetch(url)
            .map_err(ResolutionError::ListingUnreachable)?;
        Ok(site.parser().parse(&String::from_utf8_lossy(&body)))
    }

    fn check_cap(&self, found: usize) -> Result<(), ResolutionError> {
        if found > self.limits.max_chapters {
            return Err(ResolutionError::TooManyChapters {
                found,
                cap: self.limits.max_chapters,
            });
        }
        Ok(())
    }

    /// Serial walk over "previous chapter" links. Each step depends on the
    /// page before it, so nothing here runs concurrently.
    fn walk_backwards(
        &self,
        site: Site,
        listing: &ParsedPage,
        listing_url: &str,
        prefetched: &mut HashMap<String, Vec<u8>>,
    ) -> Result<Vec<String>, ResolutionError> {
        let mut current = listing
            .entry_chapter
            .as_deref()
            .and_then(|href| absolute_url(href, listing_url))
            .ok_or_else(|| ResolutionError::NoEntryChapter(listing_url.to_string()))?;

        let listing_key = listing_url.trim_end_matches('/');
        let mut found: Vec<String> = Vec::new();
        let mut seen: HashSet<String> = HashSet::new();

        loop {
            if let Err(err) = self.check_canceled() {
                info!(target: "resolver", walked = found.len(), "回溯已取消");
                return Err(err);
            }
            if found.len() >= self.limits.max_traversal_steps {
                return Err(ResolutionError::TraversalLimit(found.len()));
            }
            if !seen.insert(current.clone()) {
                warn!(target: "resolver", url = %current, "上一章链接形成环，停止回溯");
                break;
            }

            let body = self
                .fetcher
                .fetch(&current)
                .map_err(|source| ResolutionError::TraversalBroken {
                    url: current.clone(),
                    source,
                })?;
            let page = site.parser().parse(&String::from_utf8_lossy(&body));
            prefetched.insert(current.clone(), body);
            found.push(current.clone());
            debug!(target: "resolver", step = found.len(), url = %current, "回溯");

            if site.is_first_chapter(&current) {
                break;
            }
            match page
                .prev_chapter
                .as_deref()
                .and_then(|href| absolute_url(href, &current))
            {
                Some(prev) if prev.trim_end_matches('/') != listing_key => current = prev,
                _ => break,
            }
        }

        found.reverse();
        Ok(found)
    }
}

fn finish(
    site: Site,
    novel_id: String,
    listing_url: String,
    strategy: ChapterStrategy,
    tasks: Vec<ChapterTask>,
    info: Option<NovelInfo>,
    prefetched: HashMap<String, Vec<u8>>,
) -> Result<Resolution, ResolutionError> {
    if tasks.is_empty() {
        return Err(ResolutionError::Empty);
    }
    info!(target: "resolver", chapters = tasks.len(), "目录解析完成，共 {} 章", tasks.len());
    Ok(Resolution {
        site,
        novel_id,
        listing_url,
        strategy,
        tasks,
        info,
        prefetched,
    })
}

fn latest_chapter_number(page: &ParsedPage, listing_url: &str) -> Result<usize, ResolutionError> {
    let href = page
        .latest_chapter
        .as_deref()
        .ok_or_else(|| ResolutionError::NoLatestChapter(listing_url.to_string()))?;
    let abs = absolute_url(href, listing_url).unwrap_or_else(|| href.to_string());
    trailing_chapter_number(&abs).ok_or(ResolutionError::NoChapterNumber(abs))
}

/// Chapters `1..=latest` from a `{n}` template; index 0 is chapter 1.
pub fn numeric_range_tasks(template: &str, latest: usize) -> Vec<ChapterTask> {
    (1..=latest)
        .map(|n| ChapterTask {
            index: n - 1,
            url: template.replace("{n}", &n.to_string()),
        })
        .collect()
}

/// Absolute chapter URLs in DOM order; repeated links keep their first position.
fn enumerate_links(page: &ParsedPage, listing_url: &str) -> Result<Vec<String>, ResolutionError> {
    let mut seen = HashSet::new();
    let urls: Vec<String> = page
        .chapter_links
        .iter()
        .filter_map(|href| absolute_url(href, listing_url))
        .filter(|url| seen.insert(url.clone()))
        .collect();
    if urls.is_empty() {
        return Err(ResolutionError::NoChapterLinks(listing_url.to_string()));
    }
    Ok(urls)
}
