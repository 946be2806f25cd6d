//! Brave Search integration: a two-step search then summarize client and the
//! conversion of summaries into Slack blocks.

pub mod client;
pub mod format;
pub mod types;

pub use client::{normalize_query, BraveClient, SearchApi, SearchError, SearchStep};
pub use format::{convert_bold, to_blocks};
pub use types::{SummarizerSearchApiResponse, WebSearchApiResponse};
