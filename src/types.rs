use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::fmt;
use tracing::warn;

use crate::error::{Error, Result};

/// Reservation classification reported by the backend.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
#[serde(into = "String")]
pub enum Tag {
    #[default]
    Free,
    Reserved,
    Static,
    /// Anything the backend sends that we don't recognise, lowercased
    Other(String),
}

impl Tag {
    pub fn parse(raw: &str) -> Self {
        let raw = raw.trim().to_lowercase();
        match raw.as_str() {
            "" | "free" => Tag::Free,
            "resv" | "reserved" => Tag::Reserved,
            "static" => Tag::Static,
            _ => Tag::Other(raw),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Tag::Free => "free",
            Tag::Reserved => "resv",
            Tag::Static => "static",
            Tag::Other(s) => s,
        }
    }
}

impl fmt::Display for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<Tag> for String {
    fn from(tag: Tag) -> Self {
        tag.as_str().to_string()
    }
}

impl<'de> Deserialize<'de> for Tag {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let raw = lenient_string(deserializer)?;
        Ok(Tag::parse(raw.as_deref().unwrap_or("")))
    }
}

/// Reservation fields some backends nest under `_derived`.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
pub struct Derived {
    #[serde(default)]
    pub permanent: bool,
    #[serde(default, deserialize_with = "lenient_string")]
    pub start_iso: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub end_iso: Option<String>,
    #[serde(default, deserialize_with = "lenient_i64")]
    pub duration_seconds: Option<i64>,
    #[serde(default, deserialize_with = "lenient_i64")]
    pub remaining_seconds: Option<i64>,
}

/// One switch as reported by `/api/devices`. Read-only on the client.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
pub struct Device {
    #[serde(default, deserialize_with = "lenient_id")]
    pub device_id: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub model_name: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub hw_id: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub mgmt_ip: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub console_ip: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub port_id: Option<String>,
    #[serde(default)]
    pub tag: Tag,
    #[serde(default, deserialize_with = "lenient_string")]
    pub current_user: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub start_time: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub end_time: Option<String>,
    #[serde(default, deserialize_with = "lenient_i64")]
    pub duration_seconds: Option<i64>,
    #[serde(default, deserialize_with = "lenient_i64")]
    pub remaining_seconds: Option<i64>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub health: Option<String>,
    #[serde(default, deserialize_with = "lenient_u32")]
    pub retry_count: Option<u32>,
    #[serde(default, rename = "_derived", deserialize_with = "lenient_derived")]
    pub derived: Option<Derived>,
}

/// Reservation timing merged from the top-level fields and `_derived`.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ReservationTimes {
    pub start: Option<String>,
    pub end: Option<String>,
    pub duration_seconds: Option<i64>,
    pub remaining_seconds: Option<i64>,
    /// Static reservations and `NA` end times never expire
    pub open_ended: bool,
}

/// Alternative wire names, in order of preference after the canonical key.
const FIELD_ALIASES: &[(&str, &[&str])] = &[
    ("device_id", &["device_name"]),
    ("port_id", &["server_port"]),
    ("start_time", &["start_iso", "resv_start_time"]),
    ("end_time", &["end_iso", "resv_end_time"]),
];

impl Device {
    /// Decodes one snapshot entry. Alternative field names are folded into
    /// the canonical ones; a non-null canonical value wins.
    pub fn from_value(value: Value) -> Result<Self> {
        let Value::Object(mut fields) = value else {
            return Err(Error::Decode(serde::de::Error::custom(
                "device record is not an object",
            )));
        };
        for (canonical, aliases) in FIELD_ALIASES {
            for alias in aliases.iter() {
                let Some(value) = fields.remove(*alias) else {
                    continue;
                };
                let missing = fields.get(*canonical).map_or(true, Value::is_null);
                if missing {
                    fields.insert(canonical.to_string(), value);
                }
            }
        }
        Ok(serde_json::from_value(Value::Object(fields))?)
    }

    pub fn new(device_id: impl Into<String>) -> Self {
        Self {
            device_id: device_id.into(),
            ..Default::default()
        }
    }

    pub fn reservation(&self) -> ReservationTimes {
        let derived = self.derived.clone().unwrap_or_default();
        let start = non_placeholder(self.start_time.clone().or(derived.start_iso));
        let raw_end = self.end_time.clone().or(derived.end_iso);
        let end_is_na = raw_end
            .as_deref()
            .map(|e| e.trim().eq_ignore_ascii_case("na"))
            .unwrap_or(false);

        ReservationTimes {
            start,
            end: non_placeholder(raw_end),
            duration_seconds: self.duration_seconds.or(derived.duration_seconds),
            remaining_seconds: self.remaining_seconds.or(derived.remaining_seconds),
            open_ended: self.tag == Tag::Static || derived.permanent || end_is_na,
        }
    }
}

fn non_placeholder(value: Option<String>) -> Option<String> {
    value.filter(|v| {
        let v = v.trim();
        !v.is_empty() && !v.eq_ignore_ascii_case("na")
    })
}

/// Both shapes the backends are known to send for a snapshot. Entries stay
/// raw until [`Device::from_value`] so one bad record can't sink the rest.
#[derive(Deserialize, Debug)]
#[serde(untagged)]
pub enum SnapshotPayload {
    Wrapped { devices: Vec<Value> },
    Bare(Vec<Value>),
}

impl SnapshotPayload {
    /// Fails only when the payload isn't a device list at all. Malformed
    /// entries are logged and skipped.
    pub fn parse(text: &str) -> Result<Vec<Device>> {
        let payload: SnapshotPayload = serde_json::from_str(text)?;
        let entries = match payload {
            SnapshotPayload::Wrapped { devices } => devices,
            SnapshotPayload::Bare(devices) => devices,
        };
        let devices = entries
            .into_iter()
            .enumerate()
            .filter_map(|(index, entry)| match Device::from_value(entry) {
                Ok(device) => Some(device),
                Err(e) => {
                    warn!(index, error = %e, "skipping malformed device record");
                    None
                }
            })
            .collect();
        Ok(devices)
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ReserveRequest {
    #[serde(rename = "device_name")]
    pub device_id: String,
    pub owner: String,
    pub duration_minutes: u32,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ReleaseRequest {
    #[serde(rename = "device_name")]
    pub device_id: String,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct HealthRefreshRequest {
    pub device_id: String,
}

/// `{ok, error?}` reply shared by reserve and release.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ActionReply {
    pub ok: bool,
    #[serde(default)]
    pub error: Option<String>,
}

impl ActionReply {
    pub fn into_result(self) -> Result<()> {
        if self.ok {
            Ok(())
        } else {
            Err(Error::Rejected(
                self.error.unwrap_or_else(|| "request rejected".to_string()),
            ))
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct PingReply {
    pub ok: bool,
    #[serde(default)]
    pub up: Option<bool>,
    #[serde(default)]
    pub error: Option<String>,
}

impl PingReply {
    /// A reply without `up`, or with `ok: false`, counts as down.
    pub fn is_up(&self) -> bool {
        self.ok && self.up.unwrap_or(false)
    }
}

fn lenient_string<'de, D>(deserializer: D) -> std::result::Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(Value::String(s)) => Some(s),
        Some(Value::Number(n)) => Some(n.to_string()),
        Some(Value::Bool(b)) => Some(b.to_string()),
        _ => None,
    })
}

fn lenient_id<'de, D>(deserializer: D) -> std::result::Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(lenient_string(deserializer)?.unwrap_or_default())
}

/// Anything but a well-formed object is treated as absent.
fn lenient_derived<'de, D>(deserializer: D) -> std::result::Result<Option<Derived>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(serde_json::from_value(value).ok())
}

fn lenient_i64<'de, D>(deserializer: D) -> std::result::Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(Value::Number(n)) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
        Some(Value::String(s)) => s.trim().parse().ok(),
        _ => None,
    })
}

fn lenient_u32<'de, D>(deserializer: D) -> std::result::Result<Option<u32>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(lenient_i64(deserializer)?.and_then(|n| u32::try_from(n).ok()))
}
