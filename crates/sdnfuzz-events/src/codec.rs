//! Superlog record codec.
//!
//! A record is one flat JSON object per event: a `class` key naming the
//! variant, the identity keys (`label`, `time`, `dependent_labels`) and the
//! variant's own fields. Fingerprints are written expanded, as
//! `[tag, {structured}]`, so superlogs stay legible and diffable.
//!
//! Decoding goes through a fixed table keyed by class name. Every field the
//! variant needs is checked up front so a broken record is reported by the
//! name of the missing field, together with the record itself, before any
//! event reaches a simulation.

use std::sync::Arc;

use sdnfuzz_types::SyncTime;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::error::CodecError;
use crate::event::{
    CheckInvariants, ControlChannelBlock, ControlChannelUnblock, ControlMessageReceive,
    ControllerFailure, ControllerRecovery, ControllerStateChange, DataplaneDrop,
    DataplanePermit, DeterministicValue, Event, HostMigration, InvariantViolation, LinkFailure,
    LinkRecovery, PolicyChange, SwitchFailure, SwitchRecovery, TrafficInjection, WaitTime,
};
use crate::invariant::Invariant;
use crate::label::LabelRegistry;

/// One decoded superlog line.
pub type Record = serde_json::Map<String, Value>;

/// Key of the variant tag.
pub const CLASS_KEY: &str = "class";

/// Key older recorders used for `controller_id`.
const LEGACY_CONTROLLER_KEY: &str = "uuid";

/// Key of the serialized predicate code older recorders wrote.
const LEGACY_INVARIANT_CODE_KEY: &str = "invariant_check";

type DecodeFn = fn(Value) -> Result<Event, serde_json::Error>;

struct Decoder {
    class: &'static str,
    required: &'static [&'static str],
    decode: DecodeFn,
}

fn decode_as<T>(value: Value) -> Result<Event, serde_json::Error>
where
    T: DeserializeOwned + Into<Event>,
{
    serde_json::from_value::<T>(value).map(Into::into)
}

const LINK_FIELDS: &[&str] = &["start_dpid", "start_port_no", "end_dpid", "end_port_no"];
const CHANNEL_FIELDS: &[&str] = &["dpid", "controller_id"];

static DECODERS: &[Decoder] = &[
    Decoder {
        class: SwitchFailure::CLASS,
        required: &["dpid"],
        decode: decode_as::<SwitchFailure>,
    },
    Decoder {
        class: SwitchRecovery::CLASS,
        required: &["dpid"],
        decode: decode_as::<SwitchRecovery>,
    },
    Decoder {
        class: LinkFailure::CLASS,
        required: LINK_FIELDS,
        decode: decode_as::<LinkFailure>,
    },
    Decoder {
        class: LinkRecovery::CLASS,
        required: LINK_FIELDS,
        decode: decode_as::<LinkRecovery>,
    },
    Decoder {
        class: ControllerFailure::CLASS,
        required: &["controller_id"],
        decode: decode_as::<ControllerFailure>,
    },
    Decoder {
        class: ControllerRecovery::CLASS,
        required: &["controller_id"],
        decode: decode_as::<ControllerRecovery>,
    },
    Decoder {
        class: HostMigration::CLASS,
        required: &[
            "old_ingress_dpid",
            "old_ingress_port_no",
            "new_ingress_dpid",
            "new_ingress_port_no",
        ],
        decode: decode_as::<HostMigration>,
    },
    Decoder {
        class: PolicyChange::CLASS,
        required: &["request_type"],
        decode: decode_as::<PolicyChange>,
    },
    Decoder {
        class: TrafficInjection::CLASS,
        required: &[],
        decode: decode_as::<TrafficInjection>,
    },
    Decoder {
        class: WaitTime::CLASS,
        required: &["wait_time"],
        decode: decode_as::<WaitTime>,
    },
    Decoder {
        class: CheckInvariants::CLASS,
        required: &[],
        decode: decode_as::<CheckInvariants>,
    },
    Decoder {
        class: ControlChannelBlock::CLASS,
        required: CHANNEL_FIELDS,
        decode: decode_as::<ControlChannelBlock>,
    },
    Decoder {
        class: ControlChannelUnblock::CLASS,
        required: CHANNEL_FIELDS,
        decode: decode_as::<ControlChannelUnblock>,
    },
    Decoder {
        class: DataplaneDrop::CLASS,
        required: &["fingerprint"],
        decode: decode_as::<DataplaneDrop>,
    },
    Decoder {
        class: DataplanePermit::CLASS,
        required: &["fingerprint"],
        decode: decode_as::<DataplanePermit>,
    },
    Decoder {
        class: ControlMessageReceive::CLASS,
        required: &["dpid", "controller_id", "fingerprint"],
        decode: decode_as::<ControlMessageReceive>,
    },
    Decoder {
        class: ControllerStateChange::CLASS,
        required: &["controller_id", "fingerprint", "name", "value"],
        decode: decode_as::<ControllerStateChange>,
    },
    Decoder {
        class: DeterministicValue::CLASS,
        required: &[],
        decode: decode_as::<DeterministicValue>,
    },
    Decoder {
        class: InvariantViolation::CLASS,
        required: &["violations"],
        decode: decode_as::<InvariantViolation>,
    },
];

fn decoder_for(class: &str) -> Option<&'static Decoder> {
    DECODERS.iter().find(|decoder| decoder.class == class)
}

fn render(record: &Record) -> String {
    serde_json::to_string(record).unwrap_or_else(|_| format!("{record:?}"))
}

/// Converts events to superlog records and back.
///
/// Decoded labels are claimed in the codec's registry, so events issued
/// afterwards from the same registry never reuse them.
#[derive(Debug, Clone)]
pub struct EventCodec {
    registry: Arc<LabelRegistry>,
}

impl EventCodec {
    pub fn new(registry: Arc<LabelRegistry>) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &Arc<LabelRegistry> {
        &self.registry
    }

    /// Serializes an event to a flat record tagged with its class.
    pub fn encode(&self, event: &Event) -> Result<Record, CodecError> {
        match serde_json::to_value(event)? {
            Value::Object(record) => Ok(record),
            other => Err(CodecError::NotAnObject(other.to_string())),
        }
    }

    /// Serializes an event to one superlog line, without the newline.
    pub fn encode_line(&self, event: &Event) -> Result<String, CodecError> {
        let record = self.encode(event)?;
        Ok(serde_json::to_string(&record)?)
    }

    /// Parses and decodes one superlog line.
    pub fn decode_line(&self, line: &str) -> Result<Event, CodecError> {
        match serde_json::from_str::<Value>(line)? {
            Value::Object(record) => self.decode(record),
            other => Err(CodecError::NotAnObject(other.to_string())),
        }
    }

    /// Rebuilds an event from a record, keeping its label, time and
    /// dependency annotation.
    pub fn decode(&self, mut record: Record) -> Result<Event, CodecError> {
        let raw = render(&record);

        let decoder = match record.get(CLASS_KEY) {
            None => {
                return Err(CodecError::MissingField {
                    field: CLASS_KEY,
                    record: raw,
                });
            }
            Some(Value::String(class)) => {
                decoder_for(class).ok_or_else(|| CodecError::UnknownClass {
                    class: class.clone(),
                    record: raw.clone(),
                })?
            }
            Some(other) => {
                return Err(CodecError::UnknownClass {
                    class: other.to_string(),
                    record: raw,
                });
            }
        };

        if decoder.required.contains(&"controller_id") && !record.contains_key("controller_id") {
            if let Some(id) = record.remove(LEGACY_CONTROLLER_KEY) {
                record.insert("controller_id".to_string(), id);
            }
        }

        for &field in std::iter::once(&"label").chain(decoder.required) {
            if !record.contains_key(field) {
                return Err(CodecError::MissingField { field, record: raw });
            }
        }

        if !record.contains_key("time") {
            let now = SyncTime::now();
            tracing::debug!(class = decoder.class, %now, "record has no time, stamping decode time");
            record.insert("time".to_string(), serde_json::to_value(now)?);
        }

        if decoder.required.contains(&"fingerprint") {
            tag_bare_fingerprint(&mut record, decoder.class);
        }

        if decoder.class == CheckInvariants::CLASS {
            check_invariant_name(&mut record, &raw)?;
        }

        if decoder.class == WaitTime::CLASS {
            check_wait_time(&record, &raw)?;
        }

        let event = (decoder.decode)(Value::Object(record)).map_err(|source| {
            CodecError::Malformed {
                class: decoder.class,
                record: raw,
                source,
            }
        })?;
        self.registry.claim(event.label())?;
        Ok(event)
    }
}

/// A fingerprint written as a bare structure is tagged with the record's class.
fn tag_bare_fingerprint(record: &mut Record, class: &str) {
    if let Some(fingerprint) = record.get_mut("fingerprint") {
        if !fingerprint.is_array() {
            let bare = fingerprint.take();
            *fingerprint = Value::Array(vec![Value::String(class.to_string()), bare]);
        }
    }
}

fn check_invariant_name(record: &mut Record, raw: &str) -> Result<(), CodecError> {
    if record.remove(LEGACY_INVARIANT_CODE_KEY).is_some() {
        tracing::warn!(
            "ignoring serialized invariant code in CheckInvariants record, resolving by name"
        );
    }

    match record.get("invariant_name") {
        None => Ok(()),
        Some(Value::String(name)) => match Invariant::from_name(name) {
            Some(_) => Ok(()),
            None => Err(CodecError::UnknownInvariant {
                name: name.clone(),
                version: Invariant::REGISTRY_VERSION,
            }),
        },
        Some(other) => Err(CodecError::InvalidField {
            class: CheckInvariants::CLASS,
            field: "invariant_name",
            reason: format!("expected a predicate name, found {other}"),
            record: raw.to_string(),
        }),
    }
}

fn check_wait_time(record: &Record, raw: &str) -> Result<(), CodecError> {
    let wait = record.get("wait_time").and_then(Value::as_f64);
    match wait {
        Some(seconds) if seconds.is_finite() && seconds >= 0.0 => Ok(()),
        _ => Err(CodecError::InvalidField {
            class: WaitTime::CLASS,
            field: "wait_time",
            reason: "expected a non-negative number of seconds".to_string(),
            record: raw.to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sdnfuzz_types::{ControllerId, Dpid, Fingerprint, Label, PortNo, TaggedFingerprint};
    use serde_json::json;

    fn codec() -> EventCodec {
        EventCodec::new(Arc::new(LabelRegistry::new()))
    }

    fn record(value: Value) -> Record {
        match value {
            Value::Object(map) => map,
            other => panic!("not an object: {other}"),
        }
    }

    #[test]
    fn decoder_table_covers_every_class() {
        for class in Event::CLASSES {
            assert!(decoder_for(class).is_some(), "no decoder for {class}");
        }
        assert_eq!(DECODERS.len(), Event::CLASSES.len());
    }

    #[test]
    fn missing_field_is_named() {
        let err = codec()
            .decode(record(json!({
                "class": "LinkFailure",
                "label": "e1",
                "time": [0, 0],
                "start_dpid": 8,
                "start_port_no": 3,
                "end_dpid": 15,
            })))
            .unwrap_err();

        match err {
            CodecError::MissingField { field, record } => {
                assert_eq!(field, "end_port_no");
                assert!(record.contains("\"start_dpid\":8"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn missing_label_is_named() {
        let err = codec()
            .decode(record(json!({"class": "TrafficInjection", "time": [0, 0]})))
            .unwrap_err();
        assert!(matches!(err, CodecError::MissingField { field: "label", .. }));
    }

    #[test]
    fn unknown_class_is_rejected() {
        let err = codec()
            .decode_line(r#"{"class": "MeteorStrike", "label": "e1"}"#)
            .unwrap_err();
        assert!(matches!(err, CodecError::UnknownClass { ref class, .. } if class == "MeteorStrike"));
    }

    #[test]
    fn non_object_lines_are_rejected() {
        assert!(matches!(codec().decode_line("[1, 2]"), Err(CodecError::NotAnObject(_))));
        assert!(matches!(codec().decode_line("{nope"), Err(CodecError::Json(_))));
    }

    #[test]
    fn legacy_uuid_key_is_accepted() {
        let event = codec()
            .decode(record(json!({
                "class": "ControllerFailure",
                "label": "e4",
                "time": [1, 2],
                "uuid": ["127.0.0.1", 8899],
            })))
            .unwrap();

        let Event::ControllerFailure(failure) = event else {
            panic!("decoded the wrong variant");
        };
        assert_eq!(failure.controller_id, ControllerId::new("127.0.0.1", 8899));
    }

    #[test]
    fn numeric_strings_are_accepted() {
        let event = codec()
            .decode(record(json!({
                "class": "HostMigration",
                "label": "e2",
                "time": [0, 0],
                "old_ingress_dpid": "7",
                "old_ingress_port_no": "1",
                "new_ingress_dpid": 8,
                "new_ingress_port_no": "99",
            })))
            .unwrap();

        let Event::HostMigration(migration) = event else {
            panic!("decoded the wrong variant");
        };
        assert_eq!(migration.old_ingress_dpid, Dpid::new(7));
        assert_eq!(migration.new_ingress_port_no, PortNo::new(99));
    }

    #[test]
    fn bare_fingerprint_is_tagged_with_class() {
        let event = codec()
            .decode(record(json!({
                "class": "DataplaneDrop",
                "label": "e9",
                "time": [0, 0],
                "fingerprint": {"dl_src": "00:00:00:00:00:01"},
            })))
            .unwrap();

        assert_eq!(
            event.fingerprint(),
            Some(TaggedFingerprint::new(
                "DataplaneDrop",
                Fingerprint::new(json!({"dl_src": "00:00:00:00:00:01"}))
            ))
        );
    }

    #[test]
    fn tagged_fingerprint_keeps_its_tag() {
        let event = codec()
            .decode(record(json!({
                "class": "ControlMessageReceive",
                "label": "i3",
                "time": [0, 0],
                "dpid": 1,
                "controller_id": ["127.0.0.1", 6633],
                "fingerprint": ["OFFingerprint", {"class": "ofp_flow_mod"}],
            })))
            .unwrap();

        assert_eq!(event.fingerprint().unwrap().tag, "OFFingerprint");
    }

    #[test]
    fn missing_time_is_stamped() {
        let event = codec()
            .decode(record(json!({"class": "DeterministicValue", "label": "i1"})))
            .unwrap();
        assert!(event.time().seconds > 0);
    }

    #[test]
    fn decoded_labels_are_claimed() {
        let codec = codec();
        codec
            .decode(record(json!({"class": "TrafficInjection", "label": "e1", "time": [0, 0]})))
            .unwrap();
        assert!(codec.registry().is_claimed(&Label::new("e1")));
        assert_eq!(codec.registry().next_label("e").as_str(), "e2");
    }

    #[test]
    fn label_without_suffix_is_rejected() {
        let err = codec()
            .decode(record(json!({"class": "TrafficInjection", "label": "start", "time": [0, 0]})))
            .unwrap_err();
        assert!(matches!(err, CodecError::Label(_)));
    }

    #[test]
    fn invariant_is_resolved_by_name() {
        let event = codec()
            .decode(record(json!({
                "class": "CheckInvariants",
                "label": "e5",
                "time": [0, 0],
                "fail_on_error": true,
                "invariant_name": "check_loops",
                "invariant_check": "YwAAAAAAAAAAAQAAAEMAAABzBAAAAGQAAFMo",
            })))
            .unwrap();

        let Event::CheckInvariants(check) = event else {
            panic!("decoded the wrong variant");
        };
        assert_eq!(check.invariant, Invariant::Loops);
        assert!(check.fail_on_error);

        let encoded = codec().encode(&Event::CheckInvariants(check)).unwrap();
        assert_eq!(encoded["invariant_name"], json!("check_loops"));
        assert!(!encoded.contains_key("invariant_check"));
    }

    #[test]
    fn invariant_defaults_to_correspondence() {
        let Event::CheckInvariants(check) = codec()
            .decode(record(json!({"class": "CheckInvariants", "label": "e5", "time": [0, 0]})))
            .unwrap()
        else {
            panic!("decoded the wrong variant");
        };
        assert_eq!(check.invariant, Invariant::Correspondence);
        assert!(!check.fail_on_error);
    }

    #[test]
    fn unknown_invariant_is_rejected() {
        let err = codec()
            .decode(record(json!({
                "class": "CheckInvariants",
                "label": "e5",
                "time": [0, 0],
                "invariant_name": "check_vibes",
            })))
            .unwrap_err();
        assert!(matches!(
            err,
            CodecError::UnknownInvariant { ref name, version: 1 } if name == "check_vibes"
        ));
    }

    #[test]
    fn negative_wait_is_rejected() {
        let err = codec()
            .decode(record(json!({"class": "WaitTime", "label": "e1", "time": [0, 0], "wait_time": -1.5})))
            .unwrap_err();
        assert!(matches!(err, CodecError::InvalidField { field: "wait_time", .. }));
    }

    #[test]
    fn encode_tags_class_and_expands_fingerprint() {
        let registry = LabelRegistry::new();
        let event = Event::from(ControlMessageReceive::new(
            &registry,
            Dpid::new(2),
            ControllerId::new("10.0.0.1", 6633),
            Fingerprint::new(json!({"class": "ofp_packet_in"})),
        ));

        let encoded = codec().encode(&event).unwrap();
        assert_eq!(encoded["class"], json!("ControlMessageReceive"));
        assert_eq!(encoded["controller_id"], json!(["10.0.0.1", 6633]));
        assert_eq!(
            encoded["fingerprint"],
            json!(["ControlMessageReceive", {"class": "ofp_packet_in"}])
        );
        assert_eq!(encoded["dependent_labels"], json!([]));
    }
}
