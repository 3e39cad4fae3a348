//! 站点适配：URL 形态识别与页面解析。
//!
//! 核心流程只依赖 [`PageParser`] 与 [`Site`] 暴露的 URL 规则，
//! 具体的 HTML 选择器都封装在各站点子模块里。

pub mod biquge;
pub(crate) mod html_text;
pub mod ixdzs;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::{Url, form_urlencoded};

use crate::base_system::novel_id::{book_path_id, normalize_start_url, read_path_id};
use crate::download::resolver::ChapterStrategy;

/// 书籍元数据（来自目录页）。
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NovelInfo {
    pub title: String,
    pub author: String,
    pub cover: Option<String>,
    pub synopsis: Option<String>,
}

/// What a parser could find on one page. Every field is optional because the
/// same parser is used for listing pages and chapter pages.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParsedPage {
    pub title: Option<String>,
    pub content: Option<String>,
    /// Chapter anchors in document order, hrefs as written in the page.
    pub chapter_links: Vec<String>,
    pub latest_chapter: Option<String>,
    /// Where a backward walk starts (usually the newest chapter).
    pub entry_chapter: Option<String>,
    pub prev_chapter: Option<String>,
    pub info: Option<NovelInfo>,
}

impl ParsedPage {
    /// Chapter body, or an error when the page had nothing readable.
    pub fn chapter_content(&self, url: &str) -> Result<&str, ParseError> {
        self.content
            .as_deref()
            .ok_or_else(|| ParseError::MissingContent(url.to_string()))
    }
}

#[derive(Debug, Error)]
pub enum ParseError {
    #[error("no chapter content found at {0}")]
    MissingContent(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchHit {
    pub title: String,
    pub url: String,
}

pub trait PageParser: Send + Sync {
    fn parse(&self, html: &str) -> ParsedPage;

    fn parse_search(&self, _html: &str) -> Vec<SearchHit> {
        Vec::new()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Site {
    /// ixdzs 及其镜像：`/read/<id>`，章节 `p<n>.html`。
    Ixdzs,
    /// 笔趣阁类目录站：`/book/<id>/`，目录页列出全部章节。
    Biquge,
}

const IXDZS_SEARCH_URL: &str = "https://ixdzs.tw/bsearch?q=";

impl Site {
    pub fn detect(url: &str) -> Option<Self> {
        let url = normalize_start_url(url);
        let host = Url::parse(&url).ok()?.host_str()?.to_ascii_lowercase();
        if host.contains("ixdzs") || read_path_id(&url).is_some() {
            Some(Site::Ixdzs)
        } else if book_path_id(&url).is_some() {
            Some(Site::Biquge)
        } else {
            None
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Site::Ixdzs => "ixdzs",
            Site::Biquge => "biquge",
        }
    }

    pub fn novel_id(&self, url: &str) -> Option<String> {
        match self {
            Site::Ixdzs => read_path_id(url),
            Site::Biquge => book_path_id(url),
        }
    }

    pub fn parser(&self) -> &'static dyn PageParser {
        match self {
            Site::Ixdzs => &ixdzs::IxdzsParser,
            Site::Biquge => &biquge::BiqugeParser,
        }
    }

    pub fn default_strategy(&self) -> ChapterStrategy {
        match self {
            Site::Ixdzs => ChapterStrategy::NumericRange,
            Site::Biquge => ChapterStrategy::Enumeration,
        }
    }

    /// Canonical listing page for a novel, or `None` when the URL carries no
    /// novel id. Chapter URLs are reduced to their listing page.
    pub fn listing_url(&self, start_url: &str) -> Option<String> {
        let normalized = rectify_mirror(&normalize_start_url(start_url));
        let parsed = Url::parse(&normalized).ok()?;
        let origin = parsed.origin().ascii_serialization();
        let id = self.novel_id(&normalized)?;
        Some(match self {
            Site::Ixdzs => format!("{origin}/read/{id}"),
            Site::Biquge => format!("{origin}/book/{id}/"),
        })
    }

    /// URL template with a `{n}` placeholder for the chapter number.
    pub fn chapter_template(&self, listing_url: &str) -> Option<String> {
        match self {
            Site::Ixdzs => Some(format!("{}/p{{n}}.html", listing_url.trim_end_matches('/'))),
            Site::Biquge => None,
        }
    }

    /// 逆向翻页的终止标记：已经到达第一章。
    pub fn is_first_chapter(&self, url: &str) -> bool {
        let path = Url::parse(url)
            .map(|u| u.path().to_string())
            .unwrap_or_else(|_| url.to_string());
        match self {
            Site::Ixdzs => path.ends_with("/p1.html"),
            Site::Biquge => path.ends_with("/1.html"),
        }
    }

    pub fn search_url(&self, query: &str) -> Option<String> {
        match self {
            Site::Ixdzs => Some(format!("{}{}", IXDZS_SEARCH_URL, encode_query(query))),
            Site::Biquge => None,
        }
    }

    pub fn search_base(&self) -> Option<&'static str> {
        match self {
            Site::Ixdzs => Some("https://ixdzs8.tw/"),
            Site::Biquge => None,
        }
    }
}

/// 旧域名 www.aixdzs.com 已迁移到 ixdzs8.com。
fn rectify_mirror(url: &str) -> String {
    let url = url.trim_end_matches('/');
    if url.contains("://www.aixdzs.com") {
        return url.replacen("://www.aixdzs.com", "://ixdzs8.com", 1);
    }
    url.to_string()
}

/// 小写、空白折叠为 `+`，其余字符按表单规则编码。
pub fn encode_query(query: &str) -> String {
    let folded = query
        .to_lowercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ");
    form_urlencoded::byte_serialize(folded.as_bytes()).collect()
}

/// Resolve `href` against `base`; `javascript:` and empty links yield `None`.
pub fn absolute_url(href: &str, base: &str) -> Option<String> {
    let href = href.trim();
    if href.is_empty() || href.to_ascii_lowercase().starts_with("javascript") {
        return None;
    }
    if let Ok(abs) = Url::parse(href) {
        return Some(abs.to_string());
    }
    Url::parse(base).ok()?.join(href).ok().map(|u| u.to_string())
}
