//! Ingestion schedulers and the display pipeline facade.
//!
//! - `WeatherScheduler` / `ExchangeScheduler`: fetch -> normalize -> persist -> publish
//! - `RotationCursor`: which watched currency the display shows next
//! - `source`: upstream HTTP clients behind `WeatherSource` / `RateSource`
//! - `Pipeline`: typed operations for an external control surface

pub mod config;
pub mod cycle;
pub mod error;
pub mod exchange;
pub mod pipeline;
pub mod rotation;
pub mod source;
pub mod weather;

pub use config::{DisplayConfig, TopicConfig};
pub use cycle::{spawn_periodic, CyclePhase, PhaseTracker};
pub use error::{IngestError, IngestResult};
pub use exchange::ExchangeScheduler;
pub use pipeline::{Pipeline, RateQuote};
pub use rotation::RotationCursor;
pub use source::{
    ExchangeRateClient, OpenMeteoClient, RateSource, StaticRateSource, StaticWeatherSource,
    WeatherSource,
};
pub use weather::WeatherScheduler;
