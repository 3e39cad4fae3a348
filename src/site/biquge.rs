//! 笔趣阁类目录站：目录页一次列出全部章节链接。

use std::sync::OnceLock;

use scraper::{Html, Selector};

use super::html_text::{attr, block_text, first, inline_text, meta_content};
use super::{NovelInfo, PageParser, ParsedPage};

struct Selectors {
    chapter_links: Selector,
    chapter_title: Selector,
    chapter_body: Selector,
    anchors: Selector,
    og_title: Selector,
    og_author: Selector,
    og_image: Selector,
    og_description: Selector,
    og_latest: Selector,
}

fn selectors() -> &'static Selectors {
    static SEL: OnceLock<Selectors> = OnceLock::new();
    SEL.get_or_init(|| {
        let s = |css: &str| Selector::parse(css).expect("compile biquge selector");
        Selectors {
            chapter_links: s("#list-chapterAll dd a"),
            chapter_title: s("h1.pt10"),
            chapter_body: s("div.readcotent"),
            anchors: s("a"),
            og_title: s(r#"meta[property="og:novel:book_name"]"#),
            og_author: s(r#"meta[property="og:novel:author"]"#),
            og_image: s(r#"meta[property="og:image"]"#),
            og_description: s(r#"meta[property="og:description"]"#),
            og_latest: s(r#"meta[property="og:novel:latest_chapter_url"]"#),
        }
    })
}

pub struct BiqugeParser;

impl PageParser for BiqugeParser {
    fn parse(&self, html: &str) -> ParsedPage {
        let sel = selectors();
        let doc = Html::parse_document(html);

        let chapter_links = doc
            .select(&sel.chapter_links)
            .filter_map(|a| attr(a, "href"))
            .filter(|href| !href.to_ascii_lowercase().starts_with("javascript"))
            .collect();

        let prev_chapter = doc
            .select(&sel.anchors)
            .filter(|a| a.text().any(|t| t.contains("上一章")))
            .find_map(|a| attr(a, "href"))
            .filter(|href| !href.to_ascii_lowercase().starts_with("javascript"));

        let info = meta_content(&doc, &sel.og_title).map(|title| NovelInfo {
            title,
            author: meta_content(&doc, &sel.og_author).unwrap_or_default(),
            cover: meta_content(&doc, &sel.og_image),
            synopsis: meta_content(&doc, &sel.og_description),
        });

        let latest_chapter = meta_content(&doc, &sel.og_latest);

        ParsedPage {
            title: first(&doc, &sel.chapter_title).and_then(inline_text),
            content: first(&doc, &sel.chapter_body).and_then(block_text),
            chapter_links,
            entry_chapter: latest_chapter.clone(),
            latest_chapter,
            prev_chapter,
            info,
        }
    }
}
