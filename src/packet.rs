use chrono::{DateTime, Utc};
use tracing::warn;

use crate::config::StationConfig;
use crate::weather::WeatherReading;

/// Generic destination used for test transmissions.
pub const TOCALL_TEST: &str = "APRS";
/// Product destination for everything else.
pub const TOCALL_WX: &str = "APWXGT";

pub fn tocall(is_test: bool) -> &'static str {
    if is_test { TOCALL_TEST } else { TOCALL_WX }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Axis {
    Latitude,
    Longitude,
}

/// Encode decimal degrees as APRS degrees-and-minutes: `DDMM.MMh` for
/// latitude, `DDDMM.MMh` for longitude, hemisphere letter by sign.
pub fn encode_coordinate(degrees: f64, axis: Axis) -> String {
    let whole = degrees.abs().trunc();
    let minutes = (degrees.abs() - whole) * 60.0;
    match axis {
        Axis::Latitude => {
            let hemi = if degrees >= 0.0 { 'N' } else { 'S' };
            format!("{:02}{:05.2}{}", whole as u32, minutes, hemi)
        }
        Axis::Longitude => {
            let hemi = if degrees >= 0.0 { 'E' } else { 'W' };
            format!("{:03}{:05.2}{}", whole as u32, minutes, hemi)
        }
    }
}

/// UTC day-hour-minute timestamp embedded in position frames.
pub fn dhm(now: DateTime<Utc>) -> String {
    now.format("%d%H%M").to_string()
}

/// Append the SSID to the callsign when it is a valid integer in [0, 15];
/// anything else is logged and the bare callsign used.
pub fn source_identity(callsign: &str, ssid: &str) -> String {
    if ssid.is_empty() {
        return callsign.to_string();
    }
    match ssid.parse::<i64>() {
        Ok(n) if (0..=15).contains(&n) => format!("{callsign}-{n}"),
        Ok(n) => {
            warn!("SSID {} out of range, ignored", n);
            callsign.to_string()
        }
        Err(_) => {
            warn!("SSID '{}' invalid, ignored", ssid);
            callsign.to_string()
        }
    }
}

/// Fixed-field APRS weather payload. Wind and rain fields are always
/// emitted with zero defaults (the format requires their positions);
/// temperature, humidity and pressure are omitted when absent.
pub fn encode_weather_payload(reading: &WeatherReading) -> String {
    let value = |key: &str| reading.get(key).copied();
    let mph = |ms: f64| (ms * 2.237).round() as i64;
    let hundredths_inch = |mm: f64| (mm / 25.4 * 100.0).round() as i64;

    let mut payload = String::new();

    let wind_direction = (value("wind_direction").unwrap_or(0.0).round() as i64).rem_euclid(360);
    payload.push_str(&format!("c{wind_direction:03}"));
    payload.push_str(&format!("s{:03}", mph(value("wind_speed").unwrap_or(0.0))));
    payload.push_str(&format!("g{:03}", mph(value("wind_gust").unwrap_or(0.0))));

    if let Some(celsius) = value("temperature") {
        // Fahrenheit, truncated toward zero.
        payload.push_str(&format!("t{:03}", (celsius * 9.0 / 5.0 + 32.0) as i64));
    }

    payload.push_str(&format!(
        "r{:03}",
        hundredths_inch(value("rain_1h").unwrap_or(0.0))
    ));
    let rain_24h = hundredths_inch(value("rain_24h").unwrap_or(0.0));
    payload.push_str(&format!("p{rain_24h:03}"));
    payload.push_str(&format!("P{rain_24h:03}"));

    if let Some(humidity) = value("humidity") {
        let mut h = humidity.round() as i64;
        if h == 100 {
            h = 0;
        }
        payload.push_str(&format!("h{h:02}"));
    }
    if let Some(pressure) = value("pressure") {
        payload.push_str(&format!("b{:05}", (pressure * 10.0).round() as i64));
    }

    payload
}

/// Payload carried after the symbol code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FrameBody {
    /// Free text, rendered after a separating space.
    Status(String),
    /// Weather payload, rendered immediately after the symbol code.
    Weather(String),
    /// Nothing after the symbol code (icon-restore frame).
    Empty,
}

/// One wire packet, built per send and discarded after transmission.
#[derive(Debug, Clone)]
pub struct Frame {
    pub source: String,
    pub destination: String,
    pub timestamp: String,
    pub lat: String,
    pub symbol_table: String,
    pub lon: String,
    pub symbol_code: String,
    pub body: FrameBody,
}

impl Frame {
    /// Position frame carrying free text and the configured symbol.
    pub fn status(
        config: &StationConfig,
        now: DateTime<Utc>,
        destination: &str,
        text: impl Into<String>,
    ) -> Self {
        Self {
            source: source_identity(&config.callsign, &config.ssid),
            destination: destination.to_string(),
            timestamp: dhm(now),
            lat: encode_coordinate(config.lat, Axis::Latitude),
            symbol_table: config.symbol_table.clone(),
            lon: encode_coordinate(config.lon, Axis::Longitude),
            symbol_code: config.symbol_code.clone(),
            body: FrameBody::Status(text.into()),
        }
    }

    /// Position+weather frame. The WX symbol pair `/` `_` is mandated by
    /// the format and overrides the configured symbol.
    pub fn weather(
        config: &StationConfig,
        now: DateTime<Utc>,
        destination: &str,
        reading: &WeatherReading,
    ) -> Self {
        Self {
            source: source_identity(&config.callsign, &config.ssid),
            destination: destination.to_string(),
            timestamp: dhm(now),
            lat: encode_coordinate(config.lat, Axis::Latitude),
            symbol_table: "/".to_string(),
            lon: encode_coordinate(config.lon, Axis::Longitude),
            symbol_code: "_".to_string(),
            body: FrameBody::Weather(encode_weather_payload(reading)),
        }
    }

    /// Bare position frame restoring the configured symbol after a
    /// weather frame replaced it.
    pub fn icon_restore(config: &StationConfig, now: DateTime<Utc>, destination: &str) -> Self {
        Self {
            source: source_identity(&config.callsign, &config.ssid),
            destination: destination.to_string(),
            timestamp: dhm(now),
            lat: encode_coordinate(config.lat, Axis::Latitude),
            symbol_table: config.symbol_table.clone(),
            lon: encode_coordinate(config.lon, Axis::Longitude),
            symbol_code: config.symbol_code.clone(),
            body: FrameBody::Empty,
        }
    }

    /// Render the single-line wire form:
    /// `SOURCE[-SSID]>DEST,TCPIP*:@DDHHMMz<lat><table><lon><code><body>`.
    pub fn render(&self) -> String {
        let mut line = format!(
            "{}>{},TCPIP*:@{}z{}{}{}{}",
            self.source,
            self.destination,
            self.timestamp,
            self.lat,
            self.symbol_table,
            self.lon,
            self.symbol_code,
        );
        match &self.body {
            FrameBody::Status(text) => {
                line.push(' ');
                line.push_str(text);
            }
            FrameBody::Weather(payload) => line.push_str(payload),
            FrameBody::Empty => {}
        }
        line
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn test_config() -> StationConfig {
        StationConfig {
            callsign: "TEST".to_string(),
            ssid: "7".to_string(),
            passcode: "12345".to_string(),
            server: "euro.aprs2.net".to_string(),
            port: 14580,
            comment_prefix: String::new(),
            comment: "73 de TEST".to_string(),
            comment_wx: "Weather Station".to_string(),
            test_message: "TEST".to_string(),
            send_weather: true,
            wx_format: crate::config::WxFormat::Text,
            restore_icon: false,
            symbol_table: "/".to_string(),
            symbol_code: "<".to_string(),
            lat: 45.0,
            lon: 9.0,
        }
    }

    #[test]
    fn coordinate_widths_and_hemispheres() {
        assert_eq!(encode_coordinate(45.0, Axis::Latitude), "4500.00N");
        assert_eq!(encode_coordinate(9.0, Axis::Longitude), "00900.00E");
        assert_eq!(encode_coordinate(0.0, Axis::Latitude), "0000.00N");
        assert_eq!(encode_coordinate(0.0, Axis::Longitude), "00000.00E");
        assert_eq!(encode_coordinate(89.99, Axis::Latitude), "8959.40N");
        assert_eq!(encode_coordinate(-89.99, Axis::Latitude), "8959.40S");
        assert_eq!(encode_coordinate(179.99, Axis::Longitude), "17959.40E");
        assert_eq!(encode_coordinate(-179.99, Axis::Longitude), "17959.40W");
    }

    #[test]
    fn coordinate_has_fixed_width() {
        for lat in [-90.0, -45.123, -0.01, 0.0, 12.3456, 89.5, 90.0] {
            assert_eq!(encode_coordinate(lat, Axis::Latitude).len(), 8);
        }
        for lon in [-180.0, -100.5, -0.01, 0.0, 7.7, 179.99, 180.0] {
            assert_eq!(encode_coordinate(lon, Axis::Longitude).len(), 9);
        }
    }

    #[test]
    fn ssid_range_validation() {
        assert_eq!(source_identity("TEST", "0"), "TEST-0");
        assert_eq!(source_identity("TEST", "15"), "TEST-15");
        assert_eq!(source_identity("TEST", "16"), "TEST");
        assert_eq!(source_identity("TEST", "-1"), "TEST");
        assert_eq!(source_identity("TEST", "abc"), "TEST");
        assert_eq!(source_identity("TEST", ""), "TEST");
    }

    #[test]
    fn weather_payload_defaults_wind_and_rain_to_zero() {
        let reading = WeatherReading::new();
        assert_eq!(encode_weather_payload(&reading), "c000s000g000r000p000P000");
    }

    #[test]
    fn weather_payload_full_reading() {
        let mut reading = WeatherReading::new();
        reading.insert("wind_direction".to_string(), 270.0);
        reading.insert("wind_speed".to_string(), 5.0);
        reading.insert("wind_gust".to_string(), 8.0);
        reading.insert("temperature".to_string(), 25.5);
        reading.insert("rain_1h".to_string(), 2.5);
        reading.insert("rain_24h".to_string(), 10.0);
        reading.insert("humidity".to_string(), 65.0);
        reading.insert("pressure".to_string(), 1013.2);
        // 5 m/s -> 11 mph, 8 m/s -> 18 mph, 25.5 C -> 77.9 F truncated,
        // 2.5 mm -> 10/100 in, 10 mm -> 39/100 in.
        assert_eq!(
            encode_weather_payload(&reading),
            "c270s011g018t077r010p039P039h65b10132"
        );
    }

    #[test]
    fn humidity_100_wraps_to_00() {
        let mut reading = WeatherReading::new();
        reading.insert("humidity".to_string(), 100.0);
        assert!(encode_weather_payload(&reading).ends_with("h00"));
        reading.insert("humidity".to_string(), 0.0);
        assert!(encode_weather_payload(&reading).ends_with("h00"));
        reading.insert("humidity".to_string(), 55.0);
        assert!(encode_weather_payload(&reading).ends_with("h55"));
    }

    #[test]
    fn wind_direction_wraps_mod_360() {
        let mut reading = WeatherReading::new();
        reading.insert("wind_direction".to_string(), 360.0);
        assert!(encode_weather_payload(&reading).starts_with("c000"));
    }

    #[test]
    fn test_frame_wire_form() {
        let config = test_config();
        let now = Utc.with_ymd_and_hms(2025, 8, 14, 12, 30, 0).unwrap();
        let frame = Frame::status(&config, now, TOCALL_TEST, "TEST");
        assert_eq!(frame.source, "TEST-7");
        assert_eq!(frame.lat, "4500.00N");
        assert_eq!(frame.lon, "00900.00E");
        assert_eq!(
            frame.render(),
            "TEST-7>APRS,TCPIP*:@141230z4500.00N/00900.00E< TEST"
        );
    }

    #[test]
    fn weather_frame_uses_wx_symbol_pair() {
        let config = test_config();
        let now = Utc.with_ymd_and_hms(2025, 8, 14, 12, 30, 0).unwrap();
        let frame = Frame::weather(&config, now, TOCALL_WX, &WeatherReading::new());
        assert_eq!(
            frame.render(),
            "TEST-7>APWXGT,TCPIP*:@141230z4500.00N/00900.00E_c000s000g000r000p000P000"
        );
    }

    #[test]
    fn icon_restore_frame_has_no_body() {
        let config = test_config();
        let now = Utc.with_ymd_and_hms(2025, 8, 14, 12, 45, 0).unwrap();
        let frame = Frame::icon_restore(&config, now, TOCALL_WX);
        assert_eq!(
            frame.render(),
            "TEST-7>APWXGT,TCPIP*:@141245z4500.00N/00900.00E<"
        );
    }
}
