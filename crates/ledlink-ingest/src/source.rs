//! Upstream data sources.
//!
//! Each provider sits behind a small trait so schedulers can be driven by
//! static sources in tests. The reqwest clients report transport failures and
//! non-2xx statuses as `Fetch`; bodies that do not decode are `Schema`.

use crate::error::{IngestError, IngestResult};
use ledlink_core::{CoreError, CurrencyCode, Location, WeatherResponse};
use ledlink_mqtt::BoxFuture;
use parking_lot::Mutex;
use reqwest::Client;
use std::collections::VecDeque;
use std::time::Duration;
use tracing::debug;

/// Default timeout for upstream requests.
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Current-conditions fields requested from the weather provider.
const CURRENT_FIELDS: &str =
    "temperature_2m,relative_humidity_2m,pressure_msl,weather_code,wind_speed_10m";

/// Weather provider.
pub trait WeatherSource: Send + Sync {
    fn fetch_current(&self, location: Location) -> BoxFuture<'_, IngestResult<WeatherResponse>>;
}

/// Exchange-rate provider.
pub trait RateSource: Send + Sync {
    /// Raw rate table as returned by the provider.
    fn fetch_rates(&self) -> BoxFuture<'_, IngestResult<serde_json::Value>>;

    /// Whether requests go to the keyed tier (selects the accepted shapes).
    fn has_api_key(&self) -> bool;
}

fn build_client() -> IngestResult<Client> {
    Client::builder()
        .timeout(DEFAULT_TIMEOUT)
        .user_agent(concat!("ledlink/", env!("CARGO_PKG_VERSION")))
        .build()
        .map_err(|e| IngestError::Fetch(format!("Failed to create HTTP client: {e}")))
}

/// GET `request` and return the body of a 2xx response.
async fn fetch_body(request: reqwest::RequestBuilder) -> IngestResult<String> {
    let response = request
        .send()
        .await
        .map_err(|e| IngestError::Fetch(format!("HTTP request failed: {e}")))?;

    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(IngestError::Fetch(format!("HTTP {status}: {body}")));
    }

    response
        .text()
        .await
        .map_err(|e| IngestError::Fetch(format!("Failed to read response body: {e}")))
}

fn schema_error(what: &str, e: serde_json::Error) -> IngestError {
    IngestError::Core(CoreError::Schema(format!("{what} response: {e}")))
}

/// Open-Meteo forecast API client.
pub struct OpenMeteoClient {
    client: Client,
    url: String,
}

impl OpenMeteoClient {
    /// * `url` - forecast endpoint (e.g. "https://api.open-meteo.com/v1/forecast")
    pub fn new(url: impl Into<String>) -> IngestResult<Self> {
        Ok(Self {
            client: build_client()?,
            url: url.into(),
        })
    }

    pub async fn fetch(&self, location: Location) -> IngestResult<WeatherResponse> {
        debug!(url = %self.url, %location, "Fetching current weather");

        let request = self.client.get(&self.url).query(&[
            ("latitude", location.latitude.to_string()),
            ("longitude", location.longitude.to_string()),
            ("current", CURRENT_FIELDS.to_string()),
            ("timezone", "auto".to_string()),
        ]);
        let body = fetch_body(request).await?;

        serde_json::from_str(&body).map_err(|e| schema_error("weather", e))
    }
}

impl WeatherSource for OpenMeteoClient {
    fn fetch_current(&self, location: Location) -> BoxFuture<'_, IngestResult<WeatherResponse>> {
        Box::pin(self.fetch(location))
    }
}

/// Exchange-rate API client.
///
/// Without an API key the free endpoint is used as-is. With a key the
/// request goes to `{keyed_url}/{key}/latest/{base}`.
pub struct ExchangeRateClient {
    client: Client,
    url: String,
    keyed: bool,
}

impl ExchangeRateClient {
    pub fn new(
        free_url: &str,
        keyed_url: &str,
        api_key: Option<&str>,
        base: &CurrencyCode,
    ) -> IngestResult<Self> {
        let key = api_key.map(str::trim).filter(|k| !k.is_empty());
        let url = match key {
            Some(key) => format!("{}/{}/latest/{}", keyed_url.trim_end_matches('/'), key, base),
            None => free_url.to_string(),
        };

        Ok(Self {
            client: build_client()?,
            url,
            keyed: key.is_some(),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub async fn fetch(&self) -> IngestResult<serde_json::Value> {
        debug!(keyed = self.keyed, "Fetching exchange rates");
        let body = fetch_body(self.client.get(&self.url)).await?;
        serde_json::from_str(&body).map_err(|e| schema_error("exchange", e))
    }
}

impl RateSource for ExchangeRateClient {
    fn fetch_rates(&self) -> BoxFuture<'_, IngestResult<serde_json::Value>> {
        Box::pin(self.fetch())
    }

    fn has_api_key(&self) -> bool {
        self.keyed
    }
}

/// Scripted weather source for tests.
///
/// Replies are consumed in order; the last one repeats once the script runs
/// out. A reply of `Err(message)` becomes a `Fetch` error.
pub struct StaticWeatherSource {
    replies: Mutex<VecDeque<Result<serde_json::Value, String>>>,
    requests: Mutex<Vec<Location>>,
}

impl StaticWeatherSource {
    pub fn new(replies: Vec<Result<serde_json::Value, String>>) -> Self {
        Self {
            replies: Mutex::new(replies.into()),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Always answer with `body`.
    pub fn ok(body: serde_json::Value) -> Self {
        Self::new(vec![Ok(body)])
    }

    /// Locations requested so far.
    pub fn requests(&self) -> Vec<Location> {
        self.requests.lock().clone()
    }

    fn next_reply(&self) -> Result<serde_json::Value, String> {
        next_scripted(&self.replies)
    }
}

impl WeatherSource for StaticWeatherSource {
    fn fetch_current(&self, location: Location) -> BoxFuture<'_, IngestResult<WeatherResponse>> {
        self.requests.lock().push(location);
        let reply = self.next_reply();
        Box::pin(async move {
            let body = reply.map_err(IngestError::Fetch)?;
            serde_json::from_value(body).map_err(|e| schema_error("weather", e))
        })
    }
}

/// Scripted rate source for tests. Same reply rules as [`StaticWeatherSource`].
pub struct StaticRateSource {
    replies: Mutex<VecDeque<Result<serde_json::Value, String>>>,
    keyed: bool,
}

impl StaticRateSource {
    pub fn new(replies: Vec<Result<serde_json::Value, String>>, keyed: bool) -> Self {
        Self {
            replies: Mutex::new(replies.into()),
            keyed,
        }
    }

    pub fn ok(body: serde_json::Value) -> Self {
        Self::new(vec![Ok(body)], false)
    }
}

impl RateSource for StaticRateSource {
    fn fetch_rates(&self) -> BoxFuture<'_, IngestResult<serde_json::Value>> {
        let reply = next_scripted(&self.replies);
        Box::pin(async move { reply.map_err(IngestError::Fetch) })
    }

    fn has_api_key(&self) -> bool {
        self.keyed
    }
}

fn next_scripted(
    replies: &Mutex<VecDeque<Result<serde_json::Value, String>>>,
) -> Result<serde_json::Value, String> {
    let mut replies = replies.lock();
    if replies.len() > 1 {
        replies
            .pop_front()
            .unwrap_or_else(|| Err("no scripted reply".to_string()))
    } else {
        replies
            .front()
            .cloned()
            .unwrap_or_else(|| Err("no scripted reply".to_string()))
    }
}
