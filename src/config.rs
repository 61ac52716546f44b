use std::env;
use std::path::PathBuf;
use thiserror::Error;
use tracing::info;

/// Filesystem locations shared by the services. Defaults match the
/// container layout; every binary exposes flags to override them.
#[derive(Debug, Clone)]
pub struct WxPaths {
    /// Live configuration file (TOML, created on first load).
    pub config: PathBuf,
    /// Packaged default configuration, copied when no config exists.
    pub defaults: PathBuf,
    /// Current weather reading document (JSON, written by the ingest service).
    pub reading: PathBuf,
}

impl Default for WxPaths {
    fn default() -> Self {
        Self {
            config: PathBuf::from("/config/aprs_config.toml"),
            defaults: PathBuf::from("/defaults/aprs_config.toml"),
            reading: PathBuf::from("/config/wx.json"),
        }
    }
}

/// Fatal configuration failures. Anything here aborts startup (or the
/// daemon process, when a live edit breaks the file mid-flight).
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("missing [{0}] section in configuration")]
    MissingSection(&'static str),
    #[error("missing required key '{key}' in [{section}]")]
    MissingKey {
        section: &'static str,
        key: &'static str,
    },
    #[error("invalid value '{value}' for '{key}': {reason}")]
    InvalidValue {
        key: &'static str,
        value: String,
        reason: String,
    },
    #[error("failed to read configuration: {0}")]
    Io(#[from] std::io::Error),
    #[error("configuration is not valid TOML: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("failed to serialize configuration: {0}")]
    Serialize(#[from] toml::ser::Error),
}

/// Weather encoding selected by the `wx_format` key. Unrecognized values
/// resolve to `Text`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WxFormat {
    Text,
    Wx,
    WxText,
}

impl WxFormat {
    fn parse(raw: &str) -> Self {
        match raw.trim().to_lowercase().as_str() {
            "wx" => WxFormat::Wx,
            "wx-text" => WxFormat::WxText,
            _ => WxFormat::Text,
        }
    }
}

/// Fully resolved station configuration, reloaded every transmission cycle.
#[derive(Debug, Clone)]
pub struct StationConfig {
    pub callsign: String,
    /// Raw SSID string; validated only when the source identity is built so
    /// an out-of-range value degrades to the bare callsign instead of
    /// failing the load.
    pub ssid: String,
    pub passcode: String,
    pub server: String,
    pub port: u16,
    pub comment_prefix: String,
    pub comment: String,
    pub comment_wx: String,
    pub test_message: String,
    pub send_weather: bool,
    pub wx_format: WxFormat,
    pub restore_icon: bool,
    pub symbol_table: String,
    pub symbol_code: String,
    pub lat: f64,
    pub lon: f64,
}

/// Static table mapping each recognized configuration key to its
/// environment override variable.
const ENV_OVERRIDES: &[(&str, &str, &str)] = &[
    ("aprs", "callsign", "APRS_CALLSIGN"),
    ("aprs", "ssid", "APRS_SSID"),
    ("aprs", "passcode", "APRS_PASSCODE"),
    ("aprs", "server", "APRS_SERVER"),
    ("aprs", "port", "APRS_PORT"),
    ("aprs", "comment_prefix", "APRS_COMMENT_PREFIX"),
    ("aprs", "comment", "APRS_COMMENT"),
    ("aprs", "comment_wx", "APRS_COMMENT_WX"),
    ("aprs", "test_message", "APRS_TEST_MESSAGE"),
    ("aprs", "send_weather", "APRS_SEND_WEATHER"),
    ("aprs", "wx_format", "APRS_WX_FORMAT"),
    ("aprs", "restore_icon", "APRS_RESTORE_ICON"),
    ("aprs", "symbol_table", "APRS_SYMBOL_TABLE"),
    ("aprs", "symbol_code", "APRS_SYMBOL_CODE"),
    ("station", "lat", "STATION_LAT"),
    ("station", "lon", "STATION_LON"),
];

/// Built-in defaults written when neither a config nor a packaged default
/// file exists.
const DEFAULT_CONFIG: &str = r#"[aprs]
callsign = "NOCALL"
ssid = "13"
passcode = "00000"
server = "euro.aprs2.net"
port = "14580"
comment_prefix = ""
comment = ""
comment_wx = "Rust APRS Weather Station"
test_message = "TEST"
send_weather = "no"
wx_format = "text"
restore_icon = "no"
symbol_table = "/"
symbol_code = "<"

[station]
lat = "42.0000"
lon = "12.0000"
"#;

/// Load the configuration, applying environment overrides and persisting
/// the merged file when any override changed a value.
pub fn load(paths: &WxPaths) -> Result<StationConfig, ConfigError> {
    materialize_defaults(paths)?;

    let text = std::fs::read_to_string(&paths.config)?;
    let mut root: toml::Table = text.parse()?;

    let mut aprs = match root.get("aprs").and_then(|v| v.as_table()) {
        Some(table) => table.clone(),
        None => return Err(ConfigError::MissingSection("aprs")),
    };
    let mut station = match root.get("station").and_then(|v| v.as_table()) {
        Some(table) => table.clone(),
        None => return Err(ConfigError::MissingSection("station")),
    };

    let mut dirty = false;
    for (section, key, env_name) in ENV_OVERRIDES {
        let Ok(value) = env::var(env_name) else {
            continue;
        };
        let table = if *section == "aprs" {
            &mut aprs
        } else {
            &mut station
        };
        if table.get(*key).and_then(string_value).as_deref() != Some(value.as_str()) {
            info!("config override from env: {}={}", env_name, value);
            table.insert((*key).to_string(), toml::Value::String(value));
            dirty = true;
        }
    }

    if dirty {
        root.insert("aprs".to_string(), toml::Value::Table(aprs.clone()));
        root.insert("station".to_string(), toml::Value::Table(station.clone()));
        std::fs::write(&paths.config, toml::to_string(&root)?)?;
        info!("persisted configuration with environment overrides");
    }

    resolve(&aprs, &station)
}

fn materialize_defaults(paths: &WxPaths) -> Result<(), ConfigError> {
    if paths.config.exists() {
        return Ok(());
    }
    if let Some(parent) = paths.config.parent() {
        std::fs::create_dir_all(parent)?;
    }
    if paths.defaults.exists() {
        info!(
            "copying packaged default config from {}",
            paths.defaults.display()
        );
        std::fs::copy(&paths.defaults, &paths.config)?;
    } else {
        info!(
            "writing built-in default config to {}",
            paths.config.display()
        );
        std::fs::write(&paths.config, DEFAULT_CONFIG)?;
    }
    Ok(())
}

/// The sections are nominally string-valued, but tolerate bare TOML
/// numbers/booleans from hand-edited files.
fn string_value(value: &toml::Value) -> Option<String> {
    match value {
        toml::Value::String(s) => Some(s.clone()),
        toml::Value::Integer(n) => Some(n.to_string()),
        toml::Value::Float(f) => Some(f.to_string()),
        toml::Value::Boolean(b) => Some(b.to_string()),
        _ => None,
    }
}

fn get(table: &toml::Table, key: &str) -> Option<String> {
    table
        .get(key)
        .and_then(string_value)
        .map(|s| s.trim().to_string())
}

fn required(
    table: &toml::Table,
    section: &'static str,
    key: &'static str,
) -> Result<String, ConfigError> {
    match get(table, key) {
        Some(value) if !value.is_empty() => Ok(value),
        _ => Err(ConfigError::MissingKey { section, key }),
    }
}

fn or_default(value: Option<String>, default: &str) -> String {
    match value {
        Some(v) if !v.is_empty() => v,
        _ => default.to_string(),
    }
}

fn yes(value: Option<String>, default: bool) -> bool {
    match value {
        Some(v) if !v.is_empty() => v.to_lowercase() == "yes",
        _ => default,
    }
}

fn finite_coordinate(
    table: &toml::Table,
    section: &'static str,
    key: &'static str,
) -> Result<f64, ConfigError> {
    let raw = required(table, section, key)?;
    let parsed: f64 = raw
        .parse()
        .map_err(|e: std::num::ParseFloatError| ConfigError::InvalidValue {
            key,
            value: raw.clone(),
            reason: e.to_string(),
        })?;
    if !parsed.is_finite() {
        return Err(ConfigError::InvalidValue {
            key,
            value: raw,
            reason: "not a finite number".to_string(),
        });
    }
    Ok(parsed)
}

fn resolve(aprs: &toml::Table, station: &toml::Table) -> Result<StationConfig, ConfigError> {
    let callsign = required(aprs, "aprs", "callsign")?;
    let passcode = required(aprs, "aprs", "passcode")?;

    let port_raw = get(aprs, "port").unwrap_or_else(|| "14580".to_string());
    let port: u16 = port_raw
        .parse()
        .map_err(|e: std::num::ParseIntError| ConfigError::InvalidValue {
            key: "port",
            value: port_raw.clone(),
            reason: e.to_string(),
        })?;

    Ok(StationConfig {
        ssid: get(aprs, "ssid").unwrap_or_default(),
        passcode,
        server: or_default(get(aprs, "server"), "euro.aprs2.net"),
        port,
        comment_prefix: get(aprs, "comment_prefix").unwrap_or_default(),
        comment: or_default(get(aprs, "comment"), &format!("73 de {callsign}")),
        comment_wx: or_default(get(aprs, "comment_wx"), "Weather Station"),
        test_message: or_default(get(aprs, "test_message"), "TEST"),
        send_weather: yes(get(aprs, "send_weather"), true),
        wx_format: WxFormat::parse(&get(aprs, "wx_format").unwrap_or_default()),
        restore_icon: yes(get(aprs, "restore_icon"), false),
        symbol_table: or_default(get(aprs, "symbol_table"), "/"),
        symbol_code: or_default(get(aprs, "symbol_code"), "<"),
        lat: finite_coordinate(station, "station", "lat")?,
        lon: finite_coordinate(station, "station", "lon")?,
        callsign,
    })
}
