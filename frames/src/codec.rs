//! Protobuf codec for compact binary frame transport.
//!
//! The websocket path speaks JSON text frames by default; binary frames use
//! this codec. Payloads stay flexible (`serde_json::Value`) and are carried
//! on the wire as `prost_types::Value`.

use prost::Message;
use serde_json::Value;
use uuid::Uuid;

use crate::{Data, Frame, Status};

/// Error returned by [`decode_frame`].
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    /// The raw bytes could not be decoded as a protobuf `WireFrame`.
    #[error("failed to decode protobuf frame: {0}")]
    Decode(#[from] prost::DecodeError),
    /// The `status` integer on the wire does not map to a known [`Status`] variant.
    #[error("invalid frame status: {0}")]
    InvalidStatus(i32),
    /// An id field on the wire is not a valid UUID.
    #[error("invalid frame id: {0}")]
    InvalidId(#[from] uuid::Error),
}

/// Encode a frame into protobuf bytes.
#[must_use]
pub fn encode_frame(frame: &Frame) -> Vec<u8> {
    let wire = frame_to_wire(frame);

    let mut out = Vec::with_capacity(wire.encoded_len());
    // Encoding into a growable Vec cannot fail with BufferTooSmall.
    wire.encode(&mut out).unwrap_or_default();
    out
}

/// Decode protobuf bytes into a frame.
///
/// # Errors
///
/// Returns [`CodecError::Decode`] for malformed bytes,
/// [`CodecError::InvalidStatus`] for out-of-range status values, and
/// [`CodecError::InvalidId`] for id fields that are not UUIDs.
pub fn decode_frame(bytes: &[u8]) -> Result<Frame, CodecError> {
    let wire = WireFrame::decode(bytes)?;
    wire_to_frame(wire)
}

fn frame_to_wire(frame: &Frame) -> WireFrame {
    let data = frame
        .data
        .iter()
        .map(|(k, v)| (k.clone(), json_to_proto_value(v)))
        .collect();
    WireFrame {
        id: frame.id.to_string(),
        parent_id: frame.parent_id.map(|id| id.to_string()),
        ts: frame.ts,
        page_id: frame.page_id.map(|id| id.to_string()),
        from: frame.from.clone(),
        syscall: frame.syscall.clone(),
        status: status_to_wire(frame.status),
        data: Some(prost_types::Struct { fields: data }),
    }
}

fn wire_to_frame(wire: WireFrame) -> Result<Frame, CodecError> {
    let parent_id = wire.parent_id.as_deref().map(Uuid::parse_str).transpose()?;
    let page_id = wire.page_id.as_deref().map(Uuid::parse_str).transpose()?;
    Ok(Frame {
        id: Uuid::parse_str(&wire.id)?,
        parent_id,
        ts: wire.ts,
        page_id,
        from: wire.from,
        syscall: wire.syscall,
        status: status_from_wire(wire.status)?,
        data: wire.data.map_or_else(Data::new, |s| {
            s.fields
                .iter()
                .map(|(k, v)| (k.clone(), proto_to_json_value(v)))
                .collect()
        }),
    })
}

fn status_to_wire(status: Status) -> i32 {
    match status {
        Status::Request => WireFrameStatus::Request as i32,
        Status::Item => WireFrameStatus::Item as i32,
        Status::Bulk => WireFrameStatus::Bulk as i32,
        Status::Done => WireFrameStatus::Done as i32,
        Status::Error => WireFrameStatus::Error as i32,
        Status::Cancel => WireFrameStatus::Cancel as i32,
    }
}

fn status_from_wire(value: i32) -> Result<Status, CodecError> {
    match WireFrameStatus::try_from(value) {
        Ok(WireFrameStatus::Request) => Ok(Status::Request),
        Ok(WireFrameStatus::Item) => Ok(Status::Item),
        Ok(WireFrameStatus::Bulk) => Ok(Status::Bulk),
        Ok(WireFrameStatus::Done) => Ok(Status::Done),
        Ok(WireFrameStatus::Error) => Ok(Status::Error),
        Ok(WireFrameStatus::Cancel) => Ok(Status::Cancel),
        Err(_) => Err(CodecError::InvalidStatus(value)),
    }
}

fn json_to_proto_value(value: &Value) -> prost_types::Value {
    let kind = match value {
        Value::Null => {
            prost_types::value::Kind::NullValue(prost_types::NullValue::NullValue as i32)
        }
        Value::Bool(v) => prost_types::value::Kind::BoolValue(*v),
        Value::Number(v) => prost_types::value::Kind::NumberValue(v.as_f64().unwrap_or(0.0)),
        Value::String(v) => prost_types::value::Kind::StringValue(v.clone()),
        Value::Array(v) => prost_types::value::Kind::ListValue(prost_types::ListValue {
            values: v.iter().map(json_to_proto_value).collect(),
        }),
        Value::Object(v) => prost_types::value::Kind::StructValue(prost_types::Struct {
            fields: v
                .iter()
                .map(|(k, v)| (k.clone(), json_to_proto_value(v)))
                .collect(),
        }),
    };

    prost_types::Value { kind: Some(kind) }
}

fn proto_to_json_value(value: &prost_types::Value) -> Value {
    let Some(kind) = &value.kind else {
        return Value::Null;
    };

    match kind {
        prost_types::value::Kind::NullValue(_) => Value::Null,
        prost_types::value::Kind::NumberValue(v) => {
            serde_json::Number::from_f64(*v).map_or(Value::Null, Value::Number)
        }
        prost_types::value::Kind::StringValue(v) => Value::String(v.clone()),
        prost_types::value::Kind::BoolValue(v) => Value::Bool(*v),
        prost_types::value::Kind::StructValue(v) => Value::Object(
            v.fields
                .iter()
                .map(|(k, v)| (k.clone(), proto_to_json_value(v)))
                .collect(),
        ),
        prost_types::value::Kind::ListValue(v) => {
            Value::Array(v.values.iter().map(proto_to_json_value).collect())
        }
    }
}

#[derive(Clone, PartialEq, Message)]
struct WireFrame {
    #[prost(string, tag = "1")]
    id: String,
    #[prost(string, optional, tag = "2")]
    parent_id: Option<String>,
    #[prost(int64, tag = "3")]
    ts: i64,
    #[prost(string, optional, tag = "4")]
    page_id: Option<String>,
    #[prost(string, optional, tag = "5")]
    from: Option<String>,
    #[prost(string, tag = "6")]
    syscall: String,
    #[prost(enumeration = "WireFrameStatus", tag = "7")]
    status: i32,
    #[prost(message, optional, tag = "8")]
    data: Option<prost_types::Struct>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, prost::Enumeration)]
#[repr(i32)]
enum WireFrameStatus {
    Request = 0,
    Done = 1,
    Error = 2,
    Cancel = 3,
    Item = 4,
    Bulk = 5,
}

#[cfg(test)]
#[path = "codec_test.rs"]
mod tests;
