//! # sdnfuzz-types: Core types for `sdnfuzz`
//!
//! This crate contains the value types shared by the event model and the
//! replay engine:
//! - Network identifiers ([`Dpid`], [`PortNo`], [`ControllerId`])
//! - Event identity ([`Label`], [`SyncTime`])
//! - Occurrence descriptors ([`Fingerprint`], [`TaggedFingerprint`])
//!
//! Every type here serializes to the flat, legible JSON used by superlog
//! records: ids are bare integers, controller ids are `[host, port]` pairs,
//! times are `[seconds, microseconds]` pairs and tagged fingerprints are
//! `[tag, {structured}]` pairs.

use std::{
    borrow::Borrow,
    fmt::{self, Display},
    hash::{Hash, Hasher},
    time::Duration,
};

use serde::{Deserialize, Deserializer, Serialize, Serializer, de};

pub mod lenient;

// ============================================================================
// Network Identifiers - All Copy except ControllerId
// ============================================================================

/// Datapath identifier of an OpenFlow switch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct Dpid(u64);

impl Dpid {
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    pub fn as_u64(self) -> u64 {
        self.0
    }
}

impl Display for Dpid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for Dpid {
    fn from(value: u64) -> Self {
        Self(value)
    }
}

impl From<Dpid> for u64 {
    fn from(id: Dpid) -> Self {
        id.0
    }
}

impl<'de> Deserialize<'de> for Dpid {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        lenient::u64(deserializer).map(Self)
    }
}

/// Port number on a switch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct PortNo(u32);

impl PortNo {
    pub fn new(port: u32) -> Self {
        Self(port)
    }

    pub fn as_u32(self) -> u32 {
        self.0
    }
}

impl Display for PortNo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u32> for PortNo {
    fn from(value: u32) -> Self {
        Self(value)
    }
}

impl<'de> Deserialize<'de> for PortNo {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = lenient::u64(deserializer)?;
        u32::try_from(raw)
            .map(Self)
            .map_err(|_| de::Error::invalid_value(de::Unexpected::Unsigned(raw), &"a 32-bit port number"))
    }
}

/// Address of a controller process, serialized as `[host, port]`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ControllerId {
    pub host: String,
    pub port: u16,
}

impl ControllerId {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }
}

impl Display for ControllerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

impl Serialize for ControllerId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        (&self.host, self.port).serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for ControllerId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        struct Repr(String, #[serde(deserialize_with = "lenient::u64")] u64);

        let Repr(host, port) = Repr::deserialize(deserializer)?;
        let port = u16::try_from(port).map_err(|_| {
            de::Error::invalid_value(de::Unexpected::Unsigned(port), &"a 16-bit TCP port")
        })?;
        Ok(Self { host, port })
    }
}

// ============================================================================
// Event Identity
// ============================================================================

/// Wall-clock time attached to an event, serialized as `[seconds, microseconds]`.
///
/// Informational only: the position of an event in the superlog is the
/// authoritative order, never its time.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(from = "(u64, u32)", into = "(u64, u32)")]
pub struct SyncTime {
    pub seconds: u64,
    pub micros: u32,
}

impl SyncTime {
    pub fn new(seconds: u64, micros: u32) -> Self {
        Self { seconds, micros }
    }

    /// Current wall-clock time.
    pub fn now() -> Self {
        let now = chrono::Utc::now();
        Self {
            seconds: u64::try_from(now.timestamp()).unwrap_or(0),
            // Leap seconds are reported as micros >= 1_000_000.
            micros: now.timestamp_subsec_micros().min(999_999),
        }
    }

    pub fn as_duration(self) -> Duration {
        Duration::from_secs(self.seconds) + Duration::from_micros(u64::from(self.micros))
    }
}

impl From<(u64, u32)> for SyncTime {
    fn from((seconds, micros): (u64, u32)) -> Self {
        Self { seconds, micros }
    }
}

impl From<SyncTime> for (u64, u32) {
    fn from(time: SyncTime) -> Self {
        (time.seconds, time.micros)
    }
}

impl Display for SyncTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{:06}", self.seconds, self.micros)
    }
}

/// Human-traceable event identifier: `<prefix><integer>`, e.g. `e12` or `i3`.
///
/// Labels are only unique when issued through a label registry; this type
/// just carries the string.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Label(String);

impl Label {
    pub fn new(label: impl Into<String>) -> Self {
        Self(label.into())
    }

    /// Builds `<prefix><id>`.
    pub fn generated(prefix: &str, id: u64) -> Self {
        Self(format!("{prefix}{id}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The trailing integer of the label, if it has one.
    ///
    /// ```
    /// # use sdnfuzz_types::Label;
    /// assert_eq!(Label::new("e42").numeric_suffix(), Some(42));
    /// assert_eq!(Label::new("e").numeric_suffix(), None);
    /// ```
    pub fn numeric_suffix(&self) -> Option<u64> {
        let prefix_len = self.prefix().len();
        self.0[prefix_len..].parse().ok()
    }

    /// Everything before the trailing integer.
    pub fn prefix(&self) -> &str {
        self.0.trim_end_matches(|c: char| c.is_ascii_digit())
    }
}

impl Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Label {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl AsRef<str> for Label {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl Borrow<str> for Label {
    fn borrow(&self) -> &str {
        &self.0
    }
}

// ============================================================================
// Fingerprints
// ============================================================================

/// Structured, comparable descriptor of a network occurrence (an OpenFlow
/// message or a dataplane packet instance).
///
/// The contents are produced by the fingerprinting scheme of the live
/// harness and are opaque here. Equality is structural and the hash is taken
/// over the canonical (key-sorted) JSON form, so equal fingerprints hash
/// equally.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Fingerprint(serde_json::Value);

impl Fingerprint {
    pub fn new(value: serde_json::Value) -> Self {
        Self(value)
    }

    /// Builds an object-shaped fingerprint from `(key, value)` pairs.
    pub fn from_fields<K, I>(fields: I) -> Self
    where
        K: Into<String>,
        I: IntoIterator<Item = (K, serde_json::Value)>,
    {
        let map = fields
            .into_iter()
            .map(|(key, value)| (key.into(), value))
            .collect::<serde_json::Map<_, _>>();
        Self(serde_json::Value::Object(map))
    }

    pub fn as_value(&self) -> &serde_json::Value {
        &self.0
    }

    pub fn into_value(self) -> serde_json::Value {
        self.0
    }
}

impl Hash for Fingerprint {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.0.to_string().hash(state);
    }
}

impl Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A fingerprint paired with the class name of the event that produced it,
/// serialized as `[tag, {structured}]`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TaggedFingerprint {
    pub tag: String,
    pub fingerprint: Fingerprint,
}

impl TaggedFingerprint {
    pub fn new(tag: impl Into<String>, fingerprint: Fingerprint) -> Self {
        Self {
            tag: tag.into(),
            fingerprint,
        }
    }
}

impl Display for TaggedFingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.tag, self.fingerprint)
    }
}

impl Serialize for TaggedFingerprint {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        (&self.tag, &self.fingerprint).serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for TaggedFingerprint {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let (tag, fingerprint) = <(String, Fingerprint)>::deserialize(deserializer)?;
        Ok(Self { tag, fingerprint })
    }
}

// ============================================================================
// Tests
// ============================================================================
