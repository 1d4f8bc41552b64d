use chrono::{DateTime, Utc};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::CoreError;

/// One normalized beacon, built by the request decoder. Never mutated after
/// construction; a burst replaces its latest event wholesale on merge.
#[derive(Debug, Clone)]
pub struct Event {
    pub identity: IdentitySeed,
    pub received_at: DateTime<Utc>,
    pub geo: Geo,
    pub signals: ClientSignals,
    pub user_agent: String,
    /// Request headers as a JSON object, kept for the diagnostic payload only.
    pub raw_headers: Value,
    /// Parsed request body (`{}` when absent or malformed), diagnostic only.
    pub raw_body: Value,
}

/// The attributes that decide whether two events belong to the same burst.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IdentitySeed {
    pub ip: String,
    pub device: String,
    pub browser: String,
    /// Pathname only; query and fragment are stripped by the decoder.
    pub path: String,
    pub fp_hash: Option<String>,
    pub click_id: Option<String>,
}

/// Edge-provided location facts. Every field may be empty.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Geo {
    pub city: String,
    pub region: String,
    /// ISO 3166-1 alpha-2, upper-cased.
    pub country_code: String,
    pub asn: String,
    pub latitude: String,
    pub longitude: String,
}

/// Browser-declared attributes. Scoring reads `language` and `timezone`; the
/// rest is only rendered into the notification.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ClientSignals {
    pub os: String,
    pub language: String,
    pub languages: Option<Vec<String>>,
    pub timezone: Option<String>,
    pub timezone_offset_min: Option<i64>,
    pub referrer: String,
    pub extra: Option<ExtraInfo>,
    pub color: Option<ColorPrefs>,
    pub screen: Option<ScreenInfo>,
    pub hw: Option<HardwareInfo>,
    pub net: Option<NetworkInfo>,
    pub battery: Option<BatteryInfo>,
    pub gpu: Option<GpuInfo>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtraInfo {
    pub platform: Option<String>,
    pub vendor: Option<String>,
    pub cookie_enabled: Option<bool>,
    pub do_not_track: Option<String>,
    pub max_touch_points: Option<f64>,
    pub user_agent_data: Option<ClientHints>,
}

/// `navigator.userAgentData` as reported by Chromium browsers.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ClientHints {
    pub mobile: Option<bool>,
    pub platform: Option<String>,
    pub brands: Option<Vec<String>>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ColorPrefs {
    pub scheme: Option<String>,
    pub gamut: Option<String>,
    pub hdr: Option<String>,
    pub prefers_reduced_motion: Option<String>,
    pub prefers_contrast: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScreenInfo {
    pub w: Option<f64>,
    pub h: Option<f64>,
    pub color_depth: Option<f64>,
    pub dpr: Option<f64>,
    pub avail_w: Option<f64>,
    pub avail_h: Option<f64>,
    pub inner_w: Option<f64>,
    pub inner_h: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HardwareInfo {
    pub cores: Option<f64>,
    #[serde(rename = "memoryGB")]
    pub memory_gb: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NetworkInfo {
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub downlink: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BatteryInfo {
    pub level: Option<f64>,
    pub charging: Option<bool>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GpuInfo {
    pub vendor: Option<String>,
    pub renderer: Option<String>,
    pub max_texture_size: Option<f64>,
    pub extensions: Option<Vec<String>>,
}

/// The JSON object the tracker script posts.
///
/// Every field is optional and read independently: a mistyped `screen` does
/// not discard a valid `timezone`. Empty strings count as absent.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BeaconPayload {
    pub path: Option<String>,
    pub click_id: Option<String>,
    pub fp_hash: Option<String>,
    pub browser: Option<String>,
    pub os: Option<String>,
    pub device: Option<String>,
    pub language: Option<String>,
    pub languages: Option<Vec<String>>,
    pub timezone: Option<String>,
    pub timezone_offset_min: Option<i64>,
    pub referrer: Option<String>,
    pub extra: Option<ExtraInfo>,
    pub color: Option<ColorPrefs>,
    pub screen: Option<ScreenInfo>,
    pub hw: Option<HardwareInfo>,
    pub net: Option<NetworkInfo>,
    pub battery: Option<BatteryInfo>,
    pub gpu: Option<GpuInfo>,
}

impl BeaconPayload {
    /// Parse a raw request body into a JSON object. Empty bodies yield `{}`.
    pub fn parse_body(raw: &[u8]) -> Result<Value, CoreError> {
        if raw.iter().all(u8::is_ascii_whitespace) {
            return Ok(Value::Object(Map::new()));
        }
        let value: Value = serde_json::from_slice(raw)?;
        if value.is_object() {
            Ok(value)
        } else {
            Err(CoreError::NotAnObject)
        }
    }

    pub fn from_value(body: &Value) -> Self {
        let Some(obj) = body.as_object() else {
            return Self::default();
        };
        Self {
            path: text(obj, "path"),
            click_id: text(obj, "click_id"),
            fp_hash: text(obj, "fpHash"),
            browser: text(obj, "browser"),
            os: text(obj, "os"),
            device: text(obj, "device"),
            language: text(obj, "language"),
            languages: field(obj, "languages"),
            timezone: text(obj, "timezone"),
            timezone_offset_min: obj.get("timezoneOffsetMin").and_then(Value::as_i64),
            referrer: text(obj, "ref"),
            extra: field(obj, "extra"),
            color: field(obj, "color"),
            screen: field(obj, "screen"),
            hw: field(obj, "hw"),
            net: field(obj, "net"),
            battery: field(obj, "battery"),
            gpu: field(obj, "gpu"),
        }
    }
}

fn text(obj: &Map<String, Value>, name: &str) -> Option<String> {
    obj.get(name)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

fn field<T: DeserializeOwned>(obj: &Map<String, Value>, name: &str) -> Option<T> {
    obj.get(name)
        .filter(|v| !v.is_null())
        .and_then(|v| serde_json::from_value(v.clone()).ok())
}
