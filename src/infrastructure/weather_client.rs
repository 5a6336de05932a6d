use crate::infrastructure::error::InfraError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::Deserialize;
use url::Url;

pub const GEOCODING_ENDPOINT: &str = "https://api.openweathermap.org/geo/1.0/direct";
pub const DAILY_FORECAST_ENDPOINT: &str = "https://api.openweathermap.org/data/2.5/forecast/daily";
pub const DEFAULT_FORECAST_DAYS: u8 = 16;

#[derive(Debug, Clone, PartialEq)]
pub struct GeoLocation {
    pub lat: f64,
    pub lon: f64,
    pub display_name: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DailyForecast {
    pub timestamp: DateTime<Utc>,
    pub weather_code: u32,
    pub max_temp_kelvin: f64,
    pub rain_mm: f64,
}

#[async_trait]
pub trait WeatherClient: Send + Sync {
    /// First match for free-text `query`, or `None` when nothing matches.
    async fn geocode(&self, query: &str) -> Result<Option<GeoLocation>, InfraError>;

    async fn daily_forecast(&self, lat: f64, lon: f64) -> Result<Vec<DailyForecast>, InfraError>;
}

#[derive(Debug, Clone)]
pub struct ReqwestWeatherClient {
    client: Client,
    api_key: String,
    geocoding_endpoint: Url,
    forecast_endpoint: Url,
    forecast_days: u8,
}

impl ReqwestWeatherClient {
    pub fn with_endpoints(
        client: Client,
        api_key: &str,
        geocoding_endpoint: &str,
        forecast_endpoint: &str,
    ) -> Result<Self, InfraError> {
        let api_key = api_key.trim();
        if api_key.is_empty() {
            return Err(InfraError::InvalidConfig(
                "weather api key must not be empty".to_string(),
            ));
        }
        Ok(Self {
            client,
            api_key: api_key.to_string(),
            geocoding_endpoint: parse_endpoint(geocoding_endpoint, "geocoding")?,
            forecast_endpoint: parse_endpoint(forecast_endpoint, "forecast")?,
            forecast_days: DEFAULT_FORECAST_DAYS,
        })
    }

    pub fn with_forecast_days(mut self, forecast_days: u8) -> Self {
        self.forecast_days = forecast_days.max(1);
        self
    }
}

fn parse_endpoint(raw: &str, name: &str) -> Result<Url, InfraError> {
    Url::parse(raw)
        .map_err(|error| InfraError::InvalidConfig(format!("invalid {name} endpoint: {error}")))
}

#[derive(Debug, Deserialize)]
struct GeocodingHit {
    name: String,
    lat: f64,
    lon: f64,
    #[serde(default)]
    state: Option<String>,
    #[serde(default)]
    country: Option<String>,
}

impl GeocodingHit {
    fn display_name(&self) -> String {
        let mut display = self.name.clone();
        if let Some(state) = self.state.as_deref().filter(|value| !value.is_empty()) {
            display.push_str(", ");
            display.push_str(state);
        }
        if let Some(country) = self.country.as_deref().filter(|value| !value.is_empty()) {
            display.push_str(&format!(" ({country})"));
        }
        display
    }
}

#[derive(Debug, Deserialize)]
struct DailyForecastResponse {
    #[serde(default)]
    list: Vec<DailyForecastItem>,
}

#[derive(Debug, Deserialize)]
struct DailyForecastItem {
    dt: i64,
    temp: DailyTemperature,
    #[serde(default)]
    rain: Option<f64>,
    #[serde(default)]
    weather: Vec<WeatherCode>,
}

#[derive(Debug, Deserialize)]
struct DailyTemperature {
    max: f64,
}

#[derive(Debug, Deserialize)]
struct WeatherCode {
    id: u32,
}

fn round_coordinate(value: f64) -> f64 {
    (value * 10_000.0).round() / 10_000.0
}

#[async_trait]
impl WeatherClient for ReqwestWeatherClient {
    async fn geocode(&self, query: &str) -> Result<Option<GeoLocation>, InfraError> {
        let response = self
            .client
            .get(self.geocoding_endpoint.clone())
            .query(&[("q", query), ("limit", "1"), ("appid", self.api_key.as_str())])
            .send()
            .await
            .map_err(|error| InfraError::from_reqwest("network error while geocoding", error))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|error| InfraError::from_reqwest("failed reading geocoding response", error))?;
        if !status.is_success() {
            return Err(InfraError::http_status("geocoding failed", status, &body));
        }

        let hits: Vec<GeocodingHit> = serde_json::from_str(&body)?;
        Ok(hits.into_iter().next().map(|hit| GeoLocation {
            lat: round_coordinate(hit.lat),
            lon: round_coordinate(hit.lon),
            display_name: hit.display_name(),
        }))
    }

    async fn daily_forecast(&self, lat: f64, lon: f64) -> Result<Vec<DailyForecast>, InfraError> {
        let response = self
            .client
            .get(self.forecast_endpoint.clone())
            .query(&[
                ("lat", lat.to_string()),
                ("lon", lon.to_string()),
                ("cnt", self.forecast_days.to_string()),
                ("appid", self.api_key.clone()),
            ])
            .send()
            .await
            .map_err(|error| InfraError::from_reqwest("network error while fetching forecast", error))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|error| InfraError::from_reqwest("failed reading forecast response", error))?;
        if !status.is_success() {
            return Err(InfraError::http_status("forecast lookup failed", status, &body));
        }

        let parsed: DailyForecastResponse = serde_json::from_str(&body)?;
        Ok(parsed
            .list
            .into_iter()
            .filter_map(|item| {
                let timestamp = DateTime::from_timestamp(item.dt, 0)?;
                Some(DailyForecast {
                    timestamp,
                    weather_code: item.weather.first().map(|code| code.id).unwrap_or(0),
                    max_temp_kelvin: item.temp.max,
                    rain_mm: item.rain.unwrap_or(0.0),
                })
            })
            .collect())
    }
}
