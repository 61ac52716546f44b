use std::collections::BTreeMap;
use std::path::Path;
use tracing::{debug, info, warn};

/// One weather reading: metric name to numeric value. Keys beyond the
/// known set are carried through unchanged.
pub type WeatherReading = BTreeMap<String, f64>;

/// Metric names with fixed positions in the human-readable payload, in
/// emission order.
pub const KNOWN_METRICS: &[&str] = &[
    "temperature",
    "dewpoint",
    "humidity",
    "pressure",
    "wind_speed",
    "wind_direction",
    "wind_gust",
    "rain_1h",
    "rain_24h",
];

/// Load the current reading document. A missing or malformed file is not
/// an error: the daemon transmits without weather data. Non-numeric values
/// in the document are dropped.
pub fn load_reading(path: &Path) -> WeatherReading {
    let text = match std::fs::read_to_string(path) {
        Ok(text) => text,
        Err(e) => {
            debug!("weather file {} not readable ({}), using empty data", path.display(), e);
            return WeatherReading::new();
        }
    };
    match serde_json::from_str::<serde_json::Map<String, serde_json::Value>>(&text) {
        Ok(document) => {
            let reading: WeatherReading = document
                .iter()
                .filter_map(|(key, value)| value.as_f64().map(|v| (key.clone(), v)))
                .collect();
            info!("weather file loaded: {} parameters", reading.len());
            reading
        }
        Err(e) => {
            warn!("failed to parse weather file {}: {}", path.display(), e);
            WeatherReading::new()
        }
    }
}
