//! 小说链接解析与规范化。

use regex::Regex;
use std::sync::OnceLock;

static RE_URL: OnceLock<Regex> = OnceLock::new();
static RE_READ: OnceLock<Regex> = OnceLock::new();
static RE_BOOK: OnceLock<Regex> = OnceLock::new();
static RE_TRAILING_NUM: OnceLock<Regex> = OnceLock::new();

fn re_url() -> &'static Regex {
    RE_URL.get_or_init(|| Regex::new(r"https?://\S+").expect("compile RE_URL"))
}

fn re_read() -> &'static Regex {
    RE_READ.get_or_init(|| Regex::new(r"/read/(\d+)").expect("compile RE_READ"))
}

fn re_book() -> &'static Regex {
    RE_BOOK.get_or_init(|| Regex::new(r"/book/(\d+)").expect("compile RE_BOOK"))
}

fn re_trailing_num() -> &'static Regex {
    RE_TRAILING_NUM
        .get_or_init(|| Regex::new(r"(\d+)\D*$").expect("compile RE_TRAILING_NUM"))
}

/// Tidy user input into an absolute URL: pull the URL out of surrounding
/// text, default the scheme to https and drop a trailing slash.
pub fn normalize_start_url(input: &str) -> String {
    let trimmed = input.trim();
    let target = re_url()
        .find(trimmed)
        .map(|m| m.as_str())
        .unwrap_or(trimmed);

    let with_scheme = if target.starts_with("http://") || target.starts_with("https://") {
        target.to_string()
    } else {
        format!("https://{}", target)
    };
    with_scheme.trim_end_matches('/').to_string()
}

/// `/read/<id>` 形式（ixdzs 系站点）。
pub fn read_path_id(url: &str) -> Option<String> {
    re_read()
        .captures(url)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
}

/// `/book/<id>` 形式（目录页站点）。
pub fn book_path_id(url: &str) -> Option<String> {
    re_book()
        .captures(url)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
}

/// 取 URL 最后一段中的数字，例如 `.../p1520.html` -> 1520。
pub fn trailing_chapter_number(url: &str) -> Option<usize> {
    let last = url.trim_end_matches('/').rsplit('/').next()?;
    re_trailing_num()
        .captures(last)
        .and_then(|caps| caps.get(1))
        .and_then(|m| m.as_str().parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalizes_scheme_and_trailing_slash() {
        assert_eq!(
            normalize_start_url("ixdzs.tw/read/212475/"),
            "https://ixdzs.tw/read/212475"
        );
        assert_eq!(
            normalize_start_url("see https://ixdzs.tw/read/1 please"),
            "https://ixdzs.tw/read/1"
        );
    }

    #[test]
    fn extracts_ids() {
        assert_eq!(
            read_path_id("https://ixdzs.tw/read/212475").as_deref(),
            Some("212475")
        );
        assert_eq!(
            book_path_id("https://www.bqg.com/book/3301/12.html").as_deref(),
            Some("3301")
        );
        assert_eq!(read_path_id("https://ixdzs.tw/about"), None);
    }

    #[test]
    fn trailing_number_from_chapter_urls() {
        assert_eq!(
            trailing_chapter_number("https://ixdzs.tw/read/1/p1520.html"),
            Some(1520)
        );
        assert_eq!(trailing_chapter_number("https://x.com/book/1/77.html"), Some(77));
        assert_eq!(trailing_chapter_number("https://x.com/read/1/end.html"), None);
    }
}
