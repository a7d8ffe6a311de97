//! Weather report skill
//!
//! Geocodes the requested city via Open-Meteo and speaks the current
//! conditions. Free API, no key. Handlers run on blocking workers, so the
//! blocking reqwest client is fine here.

use std::sync::Arc;
use std::time::Duration;

use crate::Result;
use crate::skills::{RequiredParam, Skill, SkillContext, SkillHandler};

const GEOCODE_URL: &str = "https://geocoding-api.open-meteo.com/v1/search";
const FORECAST_URL: &str = "https://api.open-meteo.com/v1/forecast";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// WMO weather code descriptions
const WMO_CODES: &[(u32, &str)] = &[
    (0, "clear sky"),
    (1, "mainly clear"),
    (2, "partly cloudy"),
    (3, "overcast"),
    (45, "foggy"),
    (48, "depositing rime fog"),
    (51, "light drizzle"),
    (53, "moderate drizzle"),
    (55, "dense drizzle"),
    (61, "slight rain"),
    (63, "moderate rain"),
    (65, "heavy rain"),
    (71, "slight snow"),
    (73, "moderate snow"),
    (75, "heavy snow"),
    (80, "slight rain showers"),
    (81, "moderate rain showers"),
    (82, "violent rain showers"),
    (95, "thunderstorm"),
    (96, "thunderstorm with slight hail"),
    (99, "thunderstorm with heavy hail"),
];

/// Build the weather report skill
#[must_use]
pub fn skill() -> Skill {
    Skill::new("weather_report", "weather report", Arc::new(WeatherReport))
        .with_required_params(vec![RequiredParam::new(
            "city",
            "Which city should I check the weather for?",
        )])
}

struct WeatherReport;

impl SkillHandler for WeatherReport {
    fn handle(&self, ctx: SkillContext) -> Result<bool> {
        let Some(city) = ctx.param("city").map(str::trim).map(String::from) else {
            ctx.speaker.say("The city is missing for the weather report.");
            return Ok(false);
        };

        let Some((lat, lon, resolved)) = geocode(&city) else {
            ctx.speaker.say(format!("I couldn't find the location for {city}."));
            return Ok(false);
        };

        let Some(current) = fetch_current(lat, lon) else {
            ctx.speaker
                .say(format!("I couldn't fetch weather data for {resolved}."));
            return Ok(false);
        };

        let condition = describe_code(current.weather_code);
        let message = format!(
            "Weather in {resolved}: {}°C, {condition}, humidity {}%, wind {} km/h.",
            current.temperature_2m, current.relative_humidity_2m, current.wind_speed_10m
        );

        tracing::info!(city = %resolved, "weather report delivered");
        ctx.speaker.say(message);
        ctx.session.clear_pending_intent();
        Ok(true)
    }
}

#[derive(serde::Deserialize)]
struct GeocodeResponse {
    results: Option<Vec<GeocodeResult>>,
}

#[derive(serde::Deserialize)]
struct GeocodeResult {
    latitude: f64,
    longitude: f64,
    name: Option<String>,
}

#[derive(serde::Deserialize)]
struct ForecastResponse {
    current: Option<CurrentConditions>,
}

#[derive(serde::Deserialize)]
struct CurrentConditions {
    temperature_2m: f64,
    relative_humidity_2m: f64,
    weather_code: u32,
    wind_speed_10m: f64,
}

fn geocode(city: &str) -> Option<(f64, f64, String)> {
    let client = blocking_client()?;
    let response: GeocodeResponse = client
        .get(GEOCODE_URL)
        .query(&[("name", city), ("count", "1")])
        .send()
        .ok()?
        .json()
        .ok()?;

    let result = response.results?.into_iter().next()?;
    let name = result.name.unwrap_or_else(|| city.to_string());
    Some((result.latitude, result.longitude, name))
}

fn fetch_current(lat: f64, lon: f64) -> Option<CurrentConditions> {
    let client = blocking_client()?;
    let response: ForecastResponse = client
        .get(FORECAST_URL)
        .query(&[
            ("latitude", lat.to_string()),
            ("longitude", lon.to_string()),
            (
                "current",
                "temperature_2m,relative_humidity_2m,weather_code,wind_speed_10m".to_string(),
            ),
            ("temperature_unit", "celsius".to_string()),
            ("wind_speed_unit", "kmh".to_string()),
        ])
        .send()
        .ok()?
        .json()
        .ok()?;

    response.current
}

fn blocking_client() -> Option<reqwest::blocking::Client> {
    reqwest::blocking::Client::builder()
        .timeout(REQUEST_TIMEOUT)
        .build()
        .ok()
}

fn describe_code(code: u32) -> &'static str {
    WMO_CODES
        .iter()
        .find(|&&(c, _)| c == code)
        .map_or("unknown conditions", |&(_, desc)| desc)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_codes_described() {
        assert_eq!(describe_code(0), "clear sky");
        assert_eq!(describe_code(95), "thunderstorm");
    }

    #[test]
    fn unknown_code_falls_back() {
        assert_eq!(describe_code(42), "unknown conditions");
    }

    #[test]
    fn skill_requires_city() {
        let skill = skill();
        assert_eq!(skill.required_params.len(), 1);
        assert_eq!(skill.required_params[0].name, "city");
    }
}
