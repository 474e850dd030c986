pub mod error;
pub mod extract;
pub mod fetch;
pub mod load;
pub mod season;
pub mod session;
pub mod structs;
pub mod transform;
pub mod validate;

#[cfg(test)]
mod test_support;

// Re-export public API
pub use error::{FetchError, PipelineError, Result};
pub use extract::read_observations;
pub use fetch::WeatherClient;
pub use load::{
    build_summaries, write_csv, write_json, write_live_json, write_parquet, write_series_csv,
};
pub use season::{DISPLAY_NAMES, Season};
pub use session::{LiveCheck, LoadedData, Session};
pub use structs::{
    AnalysisConfig, CityStatistics, CitySummary, FetchConfig, LiveTemperature, ObservationRecord,
    SimpleLogger, Verdict,
};
pub use transform::{aggregate_cities, city_statistics, distinct_cities};
pub use validate::{classify, validate_cities};
