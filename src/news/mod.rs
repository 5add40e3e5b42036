mod client;
mod fetcher;
mod query;

pub use client::{NewsApiClient, NewsSource};
pub use fetcher::{FetchOutcome, FetchSettings, NewsFetcher};
pub use query::{build_queries, CategoryTable};

#[cfg(test)]
pub use client::NewsRequest;
#[cfg(test)]
pub use fetcher::CategoryReport;
