//! 书名搜索。

use thiserror::Error;
use tracing::info;

use crate::network_parser::{FetchError, PageFetcher};
use crate::site::{SearchHit, Site, absolute_url};

#[derive(Debug, Error)]
pub enum SearchError {
    #[error("site {0} has no search page")]
    Unsupported(&'static str),
    #[error("search request failed: {0}")]
    Fetch(#[from] FetchError),
}

/// Run `query` against the site's search page. Result URLs are absolute.
pub fn search(
    fetcher: &dyn PageFetcher,
    site: Site,
    query: &str,
) -> Result<Vec<SearchHit>, SearchError> {
    let (Some(url), Some(base)) = (site.search_url(query), site.search_base()) else {
        return Err(SearchError::Unsupported(site.name()));
    };
    info!(target: "search", %url, "搜索: {}", query.trim());

    let body = fetcher.fetch(&url)?;
    let hits: Vec<SearchHit> = site
        .parser()
        .parse_search(&String::from_utf8_lossy(&body))
        .into_iter()
        .filter_map(|hit| {
            Some(SearchHit {
                url: absolute_url(&hit.url, base)?,
                title: hit.title,
            })
        })
        .collect();

    info!(target: "search", hits = hits.len(), "搜索完成");
    Ok(hits)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network_parser::FetchCause;
    use std::sync::Mutex;

    struct OnePage {
        html: &'static str,
        requested: Mutex<Option<String>>,
    }

    impl PageFetcher for OnePage {
        fn fetch(&self, url: &str) -> Result<Vec<u8>, FetchError> {
            *self.requested.lock().unwrap() = Some(url.to_string());
            if self.html.is_empty() {
                return Err(FetchError::new(url, FetchCause::Timeout));
            }
            Ok(self.html.as_bytes().to_vec())
        }
    }

    #[test]
    fn hits_are_absolute_and_query_is_encoded() {
        let fetcher = OnePage {
            html: r#"<html><body><main><div class="panel"><ul class="u-list">
                <li class="burl"><h3><a href="/read/99/">Lord of the Mysteries</a></h3></li>
            </ul></div></main></body></html>"#,
            requested: Mutex::new(None),
        };
        let hits = search(&fetcher, Site::Ixdzs, " Lord of  Mysteries").unwrap();
        assert_eq!(
            fetcher.requested.lock().unwrap().as_deref(),
            Some("https://ixdzs.tw/bsearch?q=lord+of+mysteries")
        );
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].url, "https://ixdzs8.tw/read/99/");
        assert_eq!(hits[0].title, "Lord of the Mysteries");
    }

    #[test]
    fn failures_are_reported() {
        let fetcher = OnePage {
            html: "",
            requested: Mutex::new(None),
        };
        assert!(matches!(
            search(&fetcher, Site::Ixdzs, "x"),
            Err(SearchError::Fetch(_))
        ));
        assert!(matches!(
            search(&fetcher, Site::Biquge, "x"),
            Err(SearchError::Unsupported("biquge"))
        ));
    }
}
