//! ixdzs 系站点（ixdzs.tw / ixdzs8.com / tw.m.ixdzs.com）的页面解析。

use std::sync::OnceLock;

use scraper::{Html, Selector};

use super::html_text::{attr, block_text, first, inline_text};
use super::{NovelInfo, PageParser, ParsedPage, SearchHit};

struct Selectors {
    chapter_title: Selector,
    chapter_body: Selector,
    latest: Selector,
    latest_any: Selector,
    entry: Selector,
    anchors: Selector,
    novel_title: Selector,
    novel_author: Selector,
    novel_cover: Selector,
    novel_intro: Selector,
    search_item: Selector,
    search_link: Selector,
}

fn selectors() -> &'static Selectors {
    static SEL: OnceLock<Selectors> = OnceLock::new();
    SEL.get_or_init(|| {
        let s = |css: &str| Selector::parse(css).expect("compile ixdzs selector");
        Selectors {
            chapter_title: s("article.page-content h3"),
            chapter_body: s("article.page-content section"),
            latest: s("ul.u-chapter:not(.cfirst) > li:nth-child(1) > a"),
            latest_any: s("ul.u-chapter > li:nth-child(1) > a"),
            entry: s("ul.u-chapter.cfirst li a"),
            anchors: s("a"),
            novel_title: s("div.novel div.n-text h1"),
            novel_author: s("div.novel div.n-text a.bauthor"),
            novel_cover: s("div.novel div.n-img > img"),
            novel_intro: s("p#intro"),
            search_item: s("main > div.panel > ul.u-list > li.burl"),
            search_link: s("h3 a"),
        }
    })
}

const PREV_CHAPTER_TEXT: &str = "上一章";

pub struct IxdzsParser;

impl PageParser for IxdzsParser {
    fn parse(&self, html: &str) -> ParsedPage {
        let sel = selectors();
        let doc = Html::parse_document(html);

        let latest_chapter = first(&doc, &sel.latest)
            .or_else(|| first(&doc, &sel.latest_any))
            .and_then(|a| attr(a, "href"));
        // 逆向回溯从最新章节开始；没有最新章节时才退回 cfirst 入口
        let entry_chapter = latest_chapter
            .clone()
            .or_else(|| first(&doc, &sel.entry).and_then(|a| attr(a, "href")));

        let prev_chapter = doc
            .select(&sel.anchors)
            .filter(|a| a.text().any(|t| t.contains(PREV_CHAPTER_TEXT)))
            .find_map(|a| attr(a, "href"))
            .filter(|href| !href.to_ascii_lowercase().starts_with("javascript"));

        let info = first(&doc, &sel.novel_title)
            .and_then(inline_text)
            .map(|title| NovelInfo {
                title,
                author: first(&doc, &sel.novel_author)
                    .and_then(inline_text)
                    .unwrap_or_default(),
                cover: first(&doc, &sel.novel_cover).and_then(|img| attr(img, "src")),
                synopsis: first(&doc, &sel.novel_intro).and_then(block_text),
            });

        ParsedPage {
            title: first(&doc, &sel.chapter_title).and_then(inline_text),
            content: first(&doc, &sel.chapter_body).and_then(block_text),
            chapter_links: Vec::new(),
            latest_chapter,
            entry_chapter,
            prev_chapter,
            info,
        }
    }

    fn parse_search(&self, html: &str) -> Vec<SearchHit> {
        let sel = selectors();
        let doc = Html::parse_document(html);
        doc.select(&sel.search_item)
            .filter_map(|item| {
                let link = item.select(&sel.search_link).next()?;
                Some(SearchHit {
                    title: inline_text(link).unwrap_or_default(),
                    url: attr(link, "href")?,
                })
            })
            .collect()
    }
}
