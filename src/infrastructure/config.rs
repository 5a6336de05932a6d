use crate::domain::slots::SlotWindow;
use crate::infrastructure::document_store::JSONBIN_API_BASE;
use crate::infrastructure::error::InfraError;
use crate::infrastructure::retry::RetryPolicy;
use crate::infrastructure::weather_client::{
    DAILY_FORECAST_ENDPOINT, DEFAULT_FORECAST_DAYS, GEOCODING_ENDPOINT,
};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::Path;

const PLANNER_JSON: &str = "planner.json";
const CONFIG_SCHEMA: u64 = 1;
pub const DEFAULT_TIMEZONE: &str = "Asia/Tokyo";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DefaultLocation {
    pub name: String,
    pub lat: f64,
    pub lon: f64,
}

impl Default for DefaultLocation {
    fn default() -> Self {
        Self {
            name: "Shin-Urayasu Station".to_string(),
            lat: 35.6517,
            lon: 139.9079,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DocumentStoreConfig {
    pub endpoint: String,
}

impl Default for DocumentStoreConfig {
    fn default() -> Self {
        Self {
            endpoint: JSONBIN_API_BASE.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct WeatherConfig {
    pub geocoding_endpoint: String,
    pub forecast_endpoint: String,
    pub forecast_days: u8,
}

impl Default for WeatherConfig {
    fn default() -> Self {
        Self {
            geocoding_endpoint: GEOCODING_ENDPOINT.to_string(),
            forecast_endpoint: DAILY_FORECAST_ENDPOINT.to_string(),
            forecast_days: DEFAULT_FORECAST_DAYS,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PlannerConfig {
    pub schema: u8,
    pub timezone: String,
    pub slot_window: SlotWindow,
    pub default_location: DefaultLocation,
    pub document_store: DocumentStoreConfig,
    pub weather: WeatherConfig,
    pub retry: RetryPolicy,
    pub http_timeout_seconds: u64,
}

impl Default for PlannerConfig {
    fn default() -> Self {
        Self {
            schema: 1,
            timezone: DEFAULT_TIMEZONE.to_string(),
            slot_window: SlotWindow::default(),
            default_location: DefaultLocation::default(),
            document_store: DocumentStoreConfig::default(),
            weather: WeatherConfig::default(),
            retry: RetryPolicy::default(),
            http_timeout_seconds: 30,
        }
    }
}

impl PlannerConfig {
    pub fn validate(&self) -> Result<(), InfraError> {
        self.time_zone()?;
        self.slot_window.validate().map_err(InfraError::InvalidConfig)?;
        self.retry.validate().map_err(InfraError::InvalidConfig)?;
        if self.default_location.name.trim().is_empty() {
            return Err(InfraError::InvalidConfig(
                "defaultLocation.name must not be empty".to_string(),
            ));
        }
        if !(-90.0..=90.0).contains(&self.default_location.lat)
            || !(-180.0..=180.0).contains(&self.default_location.lon)
        {
            return Err(InfraError::InvalidConfig(
                "defaultLocation coordinates are out of range".to_string(),
            ));
        }
        if self.weather.forecast_days == 0 {
            return Err(InfraError::InvalidConfig(
                "weather.forecastDays must be > 0".to_string(),
            ));
        }
        if self.http_timeout_seconds == 0 {
            return Err(InfraError::InvalidConfig(
                "httpTimeoutSeconds must be > 0".to_string(),
            ));
        }
        Ok(())
    }

    pub fn time_zone(&self) -> Result<Tz, InfraError> {
        self.timezone.trim().parse::<Tz>().map_err(|_| {
            InfraError::InvalidConfig(format!("unknown timezone: {}", self.timezone))
        })
    }
}

pub fn ensure_default_config(config_dir: &Path) -> Result<(), InfraError> {
    let path = config_dir.join(PLANNER_JSON);
    if !path.exists() {
        let formatted = serde_json::to_string_pretty(&PlannerConfig::default())?;
        fs::write(path, format!("{formatted}\n"))?;
    }
    Ok(())
}

fn read_config(path: &Path) -> Result<serde_json::Value, InfraError> {
    let raw = fs::read_to_string(path)?;
    let parsed: serde_json::Value = serde_json::from_str(&raw)?;
    let schema = parsed
        .get("schema")
        .and_then(serde_json::Value::as_u64)
        .ok_or_else(|| InfraError::InvalidConfig(format!("missing schema in {}", path.display())))?;
    if schema != CONFIG_SCHEMA {
        return Err(InfraError::InvalidConfig(format!(
            "unsupported schema {} in {}",
            schema,
            path.display()
        )));
    }
    Ok(parsed)
}

pub fn load_planner_config(config_dir: &Path) -> Result<PlannerConfig, InfraError> {
    let path = config_dir.join(PLANNER_JSON);
    let config: PlannerConfig = serde_json::from_value(read_config(&path)?).map_err(|error| {
        InfraError::InvalidConfig(format!("invalid {}: {error}", path.display()))
    })?;
    config.validate()?;
    Ok(config)
}

#[derive(Clone, PartialEq, Eq)]
pub struct DocumentStoreCredentials {
    pub bin_id: String,
    pub master_key: String,
}

impl fmt::Debug for DocumentStoreCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DocumentStoreCredentials")
            .field("bin_id", &self.bin_id)
            .field("master_key", &"<redacted>")
            .finish()
    }
}

#[derive(Clone, Default, PartialEq, Eq)]
pub struct Secrets {
    pub document_store: Option<DocumentStoreCredentials>,
    pub weather_api_key: Option<String>,
}

impl fmt::Debug for Secrets {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Secrets")
            .field("document_store", &self.document_store)
            .field(
                "weather_api_key",
                &self.weather_api_key.as_ref().map(|_| "<redacted>"),
            )
            .finish()
    }
}

const BIN_ID_KEYS: &[&str] = &["INK_PLANNER_BIN_ID", "JSONBIN_BIN_ID"];
const MASTER_KEY_KEYS: &[&str] = &["INK_PLANNER_MASTER_KEY", "JSONBIN_MASTER_KEY"];
const WEATHER_KEY_KEYS: &[&str] = &["INK_PLANNER_WEATHER_API_KEY", "OPENWEATHER_API_KEY"];

pub fn load_secrets_from_env() -> Result<Secrets, InfraError> {
    load_secrets_from_lookup(|key| std::env::var(key).ok())
}

/// Reads credentials through `lookup`. The document store needs both the bin
/// id and the master key; one without the other is a configuration error.
pub fn load_secrets_from_lookup<F>(lookup: F) -> Result<Secrets, InfraError>
where
    F: Fn(&str) -> Option<String>,
{
    let bin_id = optional_lookup_value(&lookup, BIN_ID_KEYS);
    let master_key = optional_lookup_value(&lookup, MASTER_KEY_KEYS);
    let document_store = match (bin_id, master_key) {
        (None, None) => None,
        (Some(bin_id), None) => Some(DocumentStoreCredentials {
            bin_id,
            master_key: required_lookup_value(&lookup, MASTER_KEY_KEYS, "document store master key")?,
        }),
        (None, Some(master_key)) => Some(DocumentStoreCredentials {
            bin_id: required_lookup_value(&lookup, BIN_ID_KEYS, "document store bin id")?,
            master_key,
        }),
        (Some(bin_id), Some(master_key)) => Some(DocumentStoreCredentials { bin_id, master_key }),
    };

    Ok(Secrets {
        document_store,
        weather_api_key: optional_lookup_value(&lookup, WEATHER_KEY_KEYS),
    })
}

fn required_lookup_value<F>(
    lookup: &F,
    keys: &[&str],
    field_name: &str,
) -> Result<String, InfraError>
where
    F: Fn(&str) -> Option<String>,
{
    optional_lookup_value(lookup, keys).ok_or_else(|| {
        InfraError::InvalidConfig(format!(
            "missing {} (set one of: {})",
            field_name,
            keys.join(", ")
        ))
    })
}

fn optional_lookup_value<F>(lookup: &F, keys: &[&str]) -> Option<String>
where
    F: Fn(&str) -> Option<String>,
{
    for key in keys {
        if let Some(value) = lookup(key) {
            let normalized = value.trim();
            if !normalized.is_empty() {
                return Some(normalized.to_string());
            }
        }
    }
    None
}
