use crate::application::NowProvider;
use crate::domain::weather::{
    default_location_label, not_found_label, ForecastOutcome, ForecastSummary,
};
use crate::infrastructure::config::DefaultLocation;
use crate::infrastructure::error::InfraError;
use crate::infrastructure::retry::{retry_with_backoff, RetryPolicy};
use crate::infrastructure::weather_client::WeatherClient;
use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use std::sync::Arc;
use tracing::{debug, warn};

struct ResolvedLocation {
    lat: f64,
    lon: f64,
    label: String,
}

/// Turns an entry's location text and start time into a forecast summary.
/// Without a client (no API key configured) every lookup reports
/// `MissingApiKey`.
pub struct ForecastService<C>
where
    C: WeatherClient,
{
    client: Option<Arc<C>>,
    default_location: DefaultLocation,
    retry_policy: RetryPolicy,
    timezone: Tz,
    now_provider: NowProvider,
}

impl<C> ForecastService<C>
where
    C: WeatherClient,
{
    pub fn new(client: Option<Arc<C>>, default_location: DefaultLocation, timezone: Tz) -> Self {
        Self {
            client,
            default_location,
            retry_policy: RetryPolicy::default(),
            timezone,
            now_provider: Arc::new(Utc::now),
        }
    }

    pub fn with_retry_policy(mut self, retry_policy: RetryPolicy) -> Self {
        self.retry_policy = retry_policy;
        self
    }

    pub fn with_now_provider(mut self, now_provider: NowProvider) -> Self {
        self.now_provider = now_provider;
        self
    }

    pub async fn resolve_forecast(&self, location_text: &str, at: DateTime<Utc>) -> ForecastSummary {
        let query = location_text.trim();
        let provisional_label = if query.is_empty() {
            default_location_label(&self.default_location.name)
        } else {
            query.to_string()
        };

        if at < (self.now_provider)() {
            return ForecastSummary::unavailable(ForecastOutcome::PastDate, provisional_label);
        }
        let Some(client) = self.client.as_deref() else {
            return ForecastSummary::unavailable(ForecastOutcome::MissingApiKey, provisional_label);
        };

        let location = match self.resolve_location(client, query).await {
            Some(location) => location,
            None => {
                return ForecastSummary::unavailable(
                    ForecastOutcome::LocationNotFound,
                    not_found_label(query),
                );
            }
        };

        let forecast = retry_with_backoff(
            &self.retry_policy,
            "weather_forecast",
            InfraError::is_transient,
            || client.daily_forecast(location.lat, location.lon),
        )
        .await;
        let days = match forecast {
            Ok(days) if !days.is_empty() => days,
            Ok(_) => {
                warn!(location = %location.label, "forecast returned no days");
                return ForecastSummary::unavailable(ForecastOutcome::LookupFailed, location.label);
            }
            Err(error) => {
                warn!(location = %location.label, %error, "forecast lookup failed");
                return ForecastSummary::unavailable(ForecastOutcome::LookupFailed, location.label);
            }
        };

        let target_day = at.with_timezone(&self.timezone).date_naive();
        match days
            .iter()
            .find(|day| day.timestamp.with_timezone(&self.timezone).date_naive() == target_day)
        {
            Some(day) => ForecastSummary::available(
                day.weather_code,
                day.max_temp_kelvin,
                day.rain_mm,
                location.label,
            ),
            None => {
                debug!(%target_day, "date outside forecast horizon");
                ForecastSummary::unavailable(ForecastOutcome::OutsideHorizon, location.label)
            }
        }
    }

    async fn resolve_location(&self, client: &C, query: &str) -> Option<ResolvedLocation> {
        if query.is_empty() {
            return Some(ResolvedLocation {
                lat: self.default_location.lat,
                lon: self.default_location.lon,
                label: default_location_label(&self.default_location.name),
            });
        }

        let result = retry_with_backoff(
            &self.retry_policy,
            "geocode",
            InfraError::is_transient,
            || client.geocode(query),
        )
        .await;
        match result {
            Ok(Some(location)) => Some(ResolvedLocation {
                lat: location.lat,
                lon: location.lon,
                label: location.display_name,
            }),
            Ok(None) => {
                debug!(query, "location not found");
                None
            }
            Err(error) => {
                warn!(query, %error, "geocoding failed");
                None
            }
        }
    }
}
