//! HTML 文本抽取：把正文节点转换为规范化纯文本。
//!
//! 规则：丢弃 script/style/iframe/noscript 与广告节点；`<br>` 换行；
//! 块级元素之间空一行；行首尾空白去掉，空行丢弃。

use scraper::node::{Element, Node};
use scraper::{ElementRef, Html, Selector};

const NOISE_TAGS: [&str; 4] = ["script", "style", "iframe", "noscript"];
const NOISE_CLASSES: [&str; 2] = ["ad", "ads"];
const BLOCK_TAGS: [&str; 13] = [
    "p", "div", "section", "article", "h1", "h2", "h3", "h4", "h5", "h6", "li", "blockquote",
    "pre",
];

pub(crate) fn first<'a>(doc: &'a Html, selector: &Selector) -> Option<ElementRef<'a>> {
    doc.select(selector).next()
}

pub(crate) fn attr(el: ElementRef<'_>, name: &str) -> Option<String> {
    el.value()
        .attr(name)
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

/// Single-line text of an element with whitespace collapsed.
pub(crate) fn inline_text(el: ElementRef<'_>) -> Option<String> {
    let joined = el.text().collect::<Vec<_>>().join(" ");
    let collapsed = joined.split_whitespace().collect::<Vec<_>>().join(" ");
    (!collapsed.is_empty()).then_some(collapsed)
}

/// Multi-paragraph text of a content container; `None` when nothing readable
/// is left after cleaning.
pub(crate) fn block_text(el: ElementRef<'_>) -> Option<String> {
    let mut buf = TextBuf::default();
    walk(el, &mut buf);
    buf.end_paragraph();
    let text = buf.paragraphs.join("\n\n");
    (!text.is_empty()).then_some(text)
}

/// `meta[property=...]` 的 content 值。
pub(crate) fn meta_content(doc: &Html, selector: &Selector) -> Option<String> {
    first(doc, selector).and_then(|el| attr(el, "content"))
}

#[derive(Default)]
struct TextBuf {
    paragraphs: Vec<String>,
    current: String,
}

impl TextBuf {
    fn push_text(&mut self, text: &str) {
        for ch in text.chars() {
            if ch.is_whitespace() {
                if !self.current.is_empty() && !self.current.ends_with([' ', '\n']) {
                    self.current.push(' ');
                }
            } else {
                self.current.push(ch);
            }
        }
    }

    fn line_break(&mut self) {
        self.current.push('\n');
    }

    fn end_paragraph(&mut self) {
        let para = self
            .current
            .split('\n')
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .collect::<Vec<_>>()
            .join("\n");
        if !para.is_empty() {
            self.paragraphs.push(para);
        }
        self.current.clear();
    }
}

fn is_noise(el: &Element) -> bool {
    NOISE_TAGS.contains(&el.name()) || el.classes().any(|c| NOISE_CLASSES.contains(&c))
}

fn walk(el: ElementRef<'_>, buf: &mut TextBuf) {
    for child in el.children() {
        match child.value() {
            Node::Text(text) => buf.push_text(text),
            Node::Element(element) => {
                if is_noise(element) {
                    continue;
                }
                let Some(child_el) = ElementRef::wrap(child) else {
                    continue;
                };
                let name = element.name();
                if name == "br" {
                    buf.line_break();
                } else if BLOCK_TAGS.contains(&name) {
                    buf.end_paragraph();
                    walk(child_el, buf);
                    buf.end_paragraph();
                } else {
                    walk(child_el, buf);
                }
            }
            _ => {}
        }
    }
}
