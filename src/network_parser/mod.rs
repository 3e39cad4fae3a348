//! 网络层：单页抓取与抓取装饰器（重试 / 预取缓存）。

pub mod fetcher;

pub use fetcher::{
    FetchCause, FetchError, FetchPolicy, HttpFetcher, PageFetcher, PrefetchedFetcher,
    RetryingFetcher,
};
