//! SQLite persistence gateway for ledlink.
//!
//! Append-only storage for four record kinds:
//! - `weather`: canonical weather observations
//! - `exchange`: canonical exchange rates
//! - `messages`: free text sent to the display
//! - `logs`: bus traffic audit trail (publish and subscribe)

pub mod error;
pub mod gateway;
pub mod schema;

pub use error::{StoreError, StoreResult};
pub use gateway::{ExchangeFilter, Page, RateAverage, Store, Stored, Table};
