use serde::Serialize;

const KELVIN_OFFSET: f64 = 273.15;
const HEAVY_RAIN_WARNING_MM: f64 = 15.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ForecastOutcome {
    Available,
    PastDate,
    LocationNotFound,
    OutsideHorizon,
    LookupFailed,
    MissingApiKey,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WeatherCondition {
    pub icon: &'static str,
    pub condition: &'static str,
    pub warning: bool,
}

/// Forecast summary for one entry. Every outcome is informational.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ForecastSummary {
    pub outcome: ForecastOutcome,
    pub icon: String,
    pub condition: String,
    pub max_temp_celsius: Option<i64>,
    pub precipitation_display: Option<String>,
    pub warning: bool,
    pub location_label: String,
}

impl ForecastSummary {
    pub fn available(
        weather_code: u32,
        max_temp_kelvin: f64,
        rain_mm: f64,
        location_label: String,
    ) -> Self {
        let condition = classify_weather(weather_code, rain_mm);
        Self {
            outcome: ForecastOutcome::Available,
            icon: condition.icon.to_string(),
            condition: condition.condition.to_string(),
            max_temp_celsius: Some(kelvin_to_celsius(max_temp_kelvin)),
            precipitation_display: Some(precipitation_band(rain_mm).to_string()),
            warning: condition.warning,
            location_label,
        }
    }

    pub fn unavailable(outcome: ForecastOutcome, location_label: String) -> Self {
        let (icon, condition, warning) = match outcome {
            ForecastOutcome::PastDate => ("🕰️", "past date", false),
            ForecastOutcome::LocationNotFound => ("🔍", "location not found", true),
            ForecastOutcome::OutsideHorizon => ("❓", "outside forecast range", false),
            ForecastOutcome::LookupFailed => ("❌", "lookup failed", true),
            ForecastOutcome::MissingApiKey => ("❗", "weather API key not configured", true),
            ForecastOutcome::Available => ("❓", "unknown", false),
        };
        Self {
            outcome,
            icon: icon.to_string(),
            condition: condition.to_string(),
            max_temp_celsius: None,
            precipitation_display: None,
            warning,
            location_label,
        }
    }
}

pub fn classify_weather(code: u32, rain_mm: f64) -> WeatherCondition {
    let base = match code {
        200..=299 => WeatherCondition {
            icon: "⛈️",
            condition: "thunderstorm",
            warning: true,
        },
        300..=499 => WeatherCondition {
            icon: "🌧️",
            condition: "drizzle",
            warning: false,
        },
        500..=599 => WeatherCondition {
            icon: "☔",
            condition: if rain_mm > 10.0 { "heavy rain" } else { "rain" },
            warning: rain_mm > 5.0,
        },
        600..=699 => WeatherCondition {
            icon: "❄️",
            condition: "snow",
            warning: false,
        },
        700..=799 => WeatherCondition {
            icon: "🌫️",
            condition: "fog",
            warning: false,
        },
        800 => WeatherCondition {
            icon: "☀️",
            condition: "clear",
            warning: false,
        },
        801 | 802 => WeatherCondition {
            icon: "🌤️",
            condition: "partly cloudy",
            warning: false,
        },
        803 | 804 => WeatherCondition {
            icon: "☁️",
            condition: "cloudy",
            warning: false,
        },
        _ => WeatherCondition {
            icon: "❓",
            condition: "unknown",
            warning: false,
        },
    };

    if rain_mm > HEAVY_RAIN_WARNING_MM {
        return WeatherCondition {
            condition: "heavy rain warning",
            warning: true,
            ..base
        };
    }
    base
}

/// Coarse chance-of-rain band derived from the daily volume in millimetres.
pub fn precipitation_band(rain_mm: f64) -> &'static str {
    if rain_mm == 0.0 {
        "0%"
    } else if rain_mm > 10.0 {
        "80%+"
    } else if rain_mm > 3.0 {
        "50-80%"
    } else if rain_mm > 0.5 {
        "20-50%"
    } else {
        "under 20%"
    }
}

pub fn kelvin_to_celsius(kelvin: f64) -> i64 {
    (kelvin - KELVIN_OFFSET).round() as i64
}

pub fn default_location_label(name: &str) -> String {
    format!("near {name}")
}

pub fn not_found_label(query: &str) -> String {
    format!("{query} (location not found)")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn precipitation_bands_follow_volume_thresholds() {
        assert_eq!(precipitation_band(0.0), "0%");
        assert_eq!(precipitation_band(0.3), "under 20%");
        assert_eq!(precipitation_band(0.5), "under 20%");
        assert_eq!(precipitation_band(1.2), "20-50%");
        assert_eq!(precipitation_band(3.0), "20-50%");
        assert_eq!(precipitation_band(7.0), "50-80%");
        assert_eq!(precipitation_band(10.5), "80%+");
    }

    #[test]
    fn rain_band_escalates_with_volume() {
        let light = classify_weather(500, 2.0);
        assert_eq!((light.condition, light.warning), ("rain", false));

        let steady = classify_weather(501, 6.0);
        assert_eq!((steady.condition, steady.warning), ("rain", true));

        let heavy = classify_weather(502, 12.0);
        assert_eq!((heavy.condition, heavy.warning), ("heavy rain", true));
    }

    #[test]
    fn extreme_volume_overrides_any_condition() {
        let storm = classify_weather(800, 20.0);
        assert_eq!(storm.icon, "☀️");
        assert_eq!(storm.condition, "heavy rain warning");
        assert!(storm.warning);
    }

    #[test]
    fn code_bands_map_to_conditions() {
        assert_eq!(classify_weather(211, 0.0).condition, "thunderstorm");
        assert!(classify_weather(211, 0.0).warning);
        assert_eq!(classify_weather(310, 0.0).condition, "drizzle");
        assert_eq!(classify_weather(601, 0.0).condition, "snow");
        assert_eq!(classify_weather(741, 0.0).condition, "fog");
        assert_eq!(classify_weather(800, 0.0).condition, "clear");
        assert_eq!(classify_weather(802, 0.0).condition, "partly cloudy");
        assert_eq!(classify_weather(804, 0.0).condition, "cloudy");
        assert_eq!(classify_weather(900, 0.0).icon, "❓");
    }

    #[test]
    fn available_summary_converts_units() {
        let summary = ForecastSummary::available(800, 288.15, 0.0, "Tokyo, JP".to_string());
        assert_eq!(summary.outcome, ForecastOutcome::Available);
        assert_eq!(summary.max_temp_celsius, Some(15));
        assert_eq!(summary.precipitation_display.as_deref(), Some("0%"));
        assert!(!summary.warning);
    }

    #[test]
    fn kelvin_conversion_rounds_to_nearest_degree() {
        assert_eq!(kelvin_to_celsius(273.15), 0);
        assert_eq!(kelvin_to_celsius(300.0), 27);
        assert_eq!(kelvin_to_celsius(263.0), -10);
    }

    #[test]
    fn unavailable_outcomes_carry_no_measurements() {
        let summary =
            ForecastSummary::unavailable(ForecastOutcome::LookupFailed, "Osaka".to_string());
        assert!(summary.warning);
        assert!(summary.max_temp_celsius.is_none());
        assert!(summary.precipitation_display.is_none());
        assert_eq!(not_found_label("Atlantis"), "Atlantis (location not found)");
    }
}
