//! Wire envelopes and report classification.
//!
//! An [`Envelope`] is the unit exchanged with the transport: a sequence
//! number, a [`MessageKind`], and either a short status code or one body keyed
//! by a [`Category`]. On the wire it is a JSON object:
//!
//! ```text
//! {"seq": 1004, "msgtype": 1, "sdks": {"item": 1103, "num": 1004, "prm1": 2}}
//! {"seq": 1004, "msgtype": 2, "code": 100}
//! ```
//!
//! Incoming text is decoded exactly once, by [`Report::decode`], into a tagged
//! [`Report`]. The ingestion loop matches on that variant instead of probing
//! fields ad hoc.

use crate::descriptor::OperationDescriptor;
use crate::error::{LinkError, LinkResult};
use serde_json::{Map, Value};
use std::fmt;

// =============================================================================
// Protocol enumerations
// =============================================================================

/// `msgtype` field of an envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageKind {
    /// Unsolicited message.
    Normal = 0,
    /// A command, or a completion report sent by the device.
    Request = 1,
    /// An acknowledgment.
    Response = 2,
}

impl MessageKind {
    /// Decode the numeric `msgtype` value.
    pub fn from_code(code: i64) -> Option<Self> {
        match code {
            0 => Some(Self::Normal),
            1 => Some(Self::Request),
            2 => Some(Self::Response),
            _ => None,
        }
    }

    /// Numeric `msgtype` value.
    pub fn code(self) -> i64 {
        self as i64
    }
}

/// Logical channel a body belongs to. Only [`Category::Sdks`] carries
/// operation descriptors; the others are the device's internal channels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Category {
    /// Hardware info: id, version, wifi, language, volume, battery.
    Hard,
    /// File transmission.
    Transmit,
    /// Video mode and upgrade switches.
    Control,
    Growth,
    Motor,
    Database,
    /// SDK commands and their reports.
    Sdks,
}

impl Category {
    /// All categories, in the order they are probed when decoding.
    pub const ALL: [Category; 7] = [
        Category::Hard,
        Category::Transmit,
        Category::Control,
        Category::Growth,
        Category::Motor,
        Category::Database,
        Category::Sdks,
    ];

    /// JSON key of this category.
    pub fn key(self) -> &'static str {
        match self {
            Category::Hard => "hard",
            Category::Transmit => "transmit",
            Category::Control => "control",
            Category::Growth => "growth",
            Category::Motor => "motor",
            Category::Database => "database",
            Category::Sdks => "sdks",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

/// Status/result codes used by acknowledgments and completions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResultCode {
    Success = 100,
    Fail = 101,
}

impl ResultCode {
    /// Numeric value.
    pub fn code(self) -> i64 {
        self as i64
    }

    /// `true` when `code` is the success value.
    pub fn is_success(code: Option<i64>) -> bool {
        code == Some(ResultCode::Success.code())
    }
}

// =============================================================================
// Envelope
// =============================================================================

/// Body of an envelope.
#[derive(Debug, Clone, PartialEq)]
pub enum EnvelopeBody {
    /// An `sdks` operation descriptor.
    Operation(OperationDescriptor),
    /// Any other category, kept as raw JSON.
    Channel {
        /// Category key the body was found under.
        category: Category,
        /// Raw body.
        value: Value,
    },
}

impl EnvelopeBody {
    /// Category of this body.
    pub fn category(&self) -> Category {
        match self {
            EnvelopeBody::Operation(_) => Category::Sdks,
            EnvelopeBody::Channel { category, .. } => *category,
        }
    }
}

/// One message exchanged with the transport.
#[derive(Debug, Clone, PartialEq)]
pub struct Envelope {
    /// Sequence number of the envelope.
    pub seq: u64,
    /// Message kind.
    pub kind: MessageKind,
    /// Short status code (acknowledgments).
    pub code: Option<i64>,
    /// Category body, if any.
    pub body: Option<EnvelopeBody>,
}

impl Envelope {
    /// Outbound command envelope for an operation.
    pub fn request(descriptor: OperationDescriptor) -> Self {
        Self {
            seq: descriptor.correlation(),
            kind: MessageKind::Request,
            code: None,
            body: Some(EnvelopeBody::Operation(descriptor)),
        }
    }

    /// Terminal acknowledgment closing the device-side wait on a completion.
    ///
    /// `seq` is the completion report's own envelope seq, which need not equal
    /// the operation's correlation number.
    pub fn completion_ack(seq: u64) -> Self {
        Self {
            seq,
            kind: MessageKind::Response,
            code: Some(ResultCode::Success.code()),
            body: None,
        }
    }

    /// Firmware version query sent after connecting.
    pub fn version_query(seq: u64) -> Self {
        let mut body = Map::new();
        body.insert("num".into(), Value::from(seq));
        body.insert("call".into(), Value::from(300));
        Self {
            seq,
            kind: MessageKind::Request,
            code: None,
            body: Some(EnvelopeBody::Channel {
                category: Category::Hard,
                value: Value::Object(body),
            }),
        }
    }

    /// The operation descriptor carried in an `sdks` body.
    pub fn descriptor(&self) -> Option<&OperationDescriptor> {
        match &self.body {
            Some(EnvelopeBody::Operation(op)) => Some(op),
            _ => None,
        }
    }

    /// Consume the envelope, keeping only its operation descriptor.
    pub fn into_descriptor(self) -> Option<OperationDescriptor> {
        match self.body {
            Some(EnvelopeBody::Operation(op)) => Some(op),
            _ => None,
        }
    }

    /// Correlation number: the descriptor's `num` when present and non-zero,
    /// else `seq`.
    pub fn correlation(&self) -> u64 {
        self.descriptor()
            .map(OperationDescriptor::correlation)
            .filter(|num| *num != 0)
            .unwrap_or(self.seq)
    }

    /// Encode to the JSON wire form.
    ///
    /// When a status code is set the body is omitted, mirroring what the
    /// device expects from an acknowledgment.
    pub fn encode(&self) -> LinkResult<String> {
        let mut object = Map::new();
        object.insert("seq".into(), Value::from(self.seq));
        object.insert("msgtype".into(), Value::from(self.kind.code()));

        if let Some(code) = self.code {
            object.insert("code".into(), Value::from(code));
        } else if let Some(body) = &self.body {
            let value = match body {
                EnvelopeBody::Operation(op) => serde_json::to_value(op)?,
                EnvelopeBody::Channel { value, .. } => value.clone(),
            };
            object.insert(body.category().key().into(), value);
        }

        Ok(serde_json::to_string(&Value::Object(object))?)
    }

    /// Decode from the JSON wire form.
    pub fn decode(text: &str) -> LinkResult<Self> {
        let value: Value = serde_json::from_str(text)?;
        let Value::Object(mut object) = value else {
            return Err(malformed("envelope is not a JSON object"));
        };

        let seq = object.get("seq").and_then(Value::as_u64).unwrap_or_default();
        let kind = object
            .get("msgtype")
            .and_then(Value::as_i64)
            .and_then(MessageKind::from_code)
            .ok_or_else(|| malformed("missing or unknown msgtype"))?;
        let code = object.get("code").and_then(Value::as_i64);

        let body = match Category::ALL
            .iter()
            .find(|category| object.contains_key(category.key()))
        {
            Some(Category::Sdks) => {
                let raw = object.remove(Category::Sdks.key()).unwrap_or(Value::Null);
                Some(EnvelopeBody::Operation(serde_json::from_value(raw)?))
            }
            Some(&category) => Some(EnvelopeBody::Channel {
                category,
                value: object.remove(category.key()).unwrap_or(Value::Null),
            }),
            None => None,
        };

        Ok(Self {
            seq,
            kind,
            code,
            body,
        })
    }
}

fn malformed(reason: &str) -> LinkError {
    LinkError::Decode(<serde_json::Error as serde::de::Error>::custom(reason))
}

// =============================================================================
// Report classification
// =============================================================================

/// A decoded inbound report.
#[derive(Debug, Clone, PartialEq)]
pub enum Report {
    /// Hardware report carrying the firmware version string.
    Hardware {
        /// Raw `ver` field.
        version: String,
    },
    /// The device accepted (or refused) a command.
    Acknowledgment {
        /// Correlation number of the acknowledged command.
        correlation: u64,
        /// Status code; only `100` means accepted.
        status: Option<i64>,
    },
    /// The device finished a command and reports its result.
    Completion {
        /// Correlation number of the completed command.
        correlation: u64,
        /// Full completion envelope; its descriptor carries the result fields.
        envelope: Envelope,
    },
    /// Anything else.
    Unknown(Envelope),
}

impl Report {
    /// Decode and classify one raw frame.
    pub fn decode(text: &str) -> LinkResult<Self> {
        Ok(Self::classify(Envelope::decode(text)?))
    }

    /// Classify an already decoded envelope.
    pub fn classify(envelope: Envelope) -> Self {
        if let Some(EnvelopeBody::Channel {
            category: Category::Hard,
            value,
        }) = &envelope.body
        {
            if let Some(version) = value.get("ver").and_then(Value::as_str) {
                return Report::Hardware {
                    version: version.to_string(),
                };
            }
        }

        match envelope.kind {
            MessageKind::Response => Report::Acknowledgment {
                correlation: envelope.correlation(),
                status: envelope.code,
            },
            MessageKind::Request if envelope.descriptor().is_some() => Report::Completion {
                correlation: envelope.correlation(),
                envelope,
            },
            _ => Report::Unknown(envelope),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_request_encoding() {
        let op = OperationDescriptor::with_correlation(1103, 1004).param(1, 2);
        let text = Envelope::request(op).encode().unwrap();
        let value: Value = serde_json::from_str(&text).unwrap();
        assert_eq!(
            value,
            json!({"seq": 1004, "msgtype": 1, "sdks": {"item": 1103, "num": 1004, "prm1": 2}})
        );
    }

    #[test]
    fn test_completion_ack_omits_body() {
        let text = Envelope::completion_ack(1004).encode().unwrap();
        let value: Value = serde_json::from_str(&text).unwrap();
        assert_eq!(value, json!({"seq": 1004, "msgtype": 2, "code": 100}));
    }

    #[test]
    fn test_version_query_shape() {
        let text = Envelope::version_query(1001).encode().unwrap();
        let value: Value = serde_json::from_str(&text).unwrap();
        assert_eq!(
            value,
            json!({"seq": 1001, "msgtype": 1, "hard": {"num": 1001, "call": 300}})
        );
    }

    #[test]
    fn test_acknowledgment_keeps_code_and_body() {
        let report = Report::decode(
            r#"{"seq": 1004, "msgtype": 2, "code": 100, "sdks": {"item": 1103, "num": 1004}}"#,
        )
        .unwrap();
        assert_eq!(
            report,
            Report::Acknowledgment {
                correlation: 1004,
                status: Some(100)
            }
        );
    }

    #[test]
    fn test_correlation_prefers_descriptor_num() {
        let report = Report::decode(
            r#"{"seq": 7, "msgtype": 1, "sdks": {"item": 1031, "num": 1010, "result": 100}}"#,
        )
        .unwrap();
        match report {
            Report::Completion {
                correlation,
                envelope,
            } => {
                assert_eq!(correlation, 1010);
                assert_eq!(envelope.descriptor().and_then(|d| d.result), Some(100));
            }
            other => panic!("expected completion, got {:?}", other),
        }
    }

    #[test]
    fn test_hardware_version_report() {
        let report =
            Report::decode(r#"{"seq": 1001, "msgtype": 2, "hard": {"ver": "3.1.2"}}"#).unwrap();
        assert_eq!(
            report,
            Report::Hardware {
                version: "3.1.2".into()
            }
        );
    }

    #[test]
    fn test_other_shapes_are_unknown() {
        let report =
            Report::decode(r#"{"seq": 15, "msgtype": 1, "control": {"video": 101}}"#).unwrap();
        assert!(matches!(report, Report::Unknown(_)));

        let report = Report::decode(r#"{"seq": 15, "msgtype": 0}"#).unwrap();
        assert!(matches!(report, Report::Unknown(_)));
    }

    #[test]
    fn test_malformed_frames_are_errors() {
        assert!(Report::decode("not json").is_err());
        assert!(Report::decode("[1, 2]").is_err());
        assert!(Report::decode(r#"{"seq": 1, "msgtype": 9}"#).is_err());
    }
}
