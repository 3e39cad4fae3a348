pub mod config;
pub mod context;
pub mod logging;
pub mod novel_id;
pub mod retry;
