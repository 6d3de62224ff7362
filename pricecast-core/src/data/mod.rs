//! Data ingestion: providers, normalization, merge-dedup and the CSV codec

pub mod codec;
pub mod merge;
pub mod normalize;
pub mod provider;
pub mod synthetic;
pub mod yahoo;

pub use codec::CodecError;
pub use merge::{merge, merge_with_report, MergeReport};
pub use normalize::{normalize_batch, NormalizeError, NormalizedBatch};
pub use provider::{
    FetchBatches, FetchError, FetchPeriod, MarketDataProvider, RawBar, StaticProvider,
};
pub use synthetic::SyntheticProvider;
pub use yahoo::{YahooProvider, YahooSettings};
