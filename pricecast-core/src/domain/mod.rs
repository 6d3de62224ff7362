//! Domain types for PriceCast

pub mod bar;
pub mod dataset;
pub mod feature;
pub mod forecast;
pub mod ids;

pub use bar::{day_ordinal, PriceBar};
pub use dataset::SeriesDataset;
pub use feature::{FeatureRecord, Indicators};
pub use forecast::{ForecastRecord, TrendDirection};
pub use ids::{ConfigHash, DatasetHash};
