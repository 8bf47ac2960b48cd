//! External retrieval tools
//!
//! - [`search::Retriever`] - web search and page extraction boundary
//! - [`search::DaedraRetriever`] - DuckDuckGo search and markdown page fetch

pub mod search;

pub use search::{DaedraRetriever, FetchedPage, Retriever, SearchHit};
