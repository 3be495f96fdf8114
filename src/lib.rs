pub mod aggregator;
pub mod config;
pub mod fetcher;
pub mod query;
pub mod report;
pub mod state;
pub mod work;

pub use aggregator::{AggregatorOptions, FetchError, WorksAggregator, PAGE_SIZE};
pub use config::ClientConfig;
pub use fetcher::{crossref::CrossrefClient, Collection, CollectionKind, PageFetcher, TransportError};
pub use query::{SortOrder, WorksQuery};
pub use state::{FetchSnapshot, FetchState};
pub use work::{Member, Page, Work};

/// Aggregator backed by the Crossref REST API
pub type CrossrefAggregator = WorksAggregator<CrossrefClient>;

/// Build an aggregator talking to Crossref with `config`
pub fn crossref_aggregator(
    config: ClientConfig,
    options: AggregatorOptions,
) -> Result<CrossrefAggregator, TransportError> {
    let client = CrossrefClient::new(config)?;
    Ok(WorksAggregator::with_options(client, options))
}
