use std::collections::BTreeMap;
use std::io::{Read, Write};

use base64::Engine as _;
use flate2::Compression;
use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use schemaless_query::Value;

use crate::error::EngineError;

/// Bytes that would otherwise have no native JSON representation are carried
/// as base64 text under this wrapper key, the way a hand-written JSON codec
/// for a dynamically-typed document store usually does it.
const BYTES_MARKER: &str = "$bytes";

pub fn value_to_json(value: &Value) -> serde_json::Value {
    match value {
        Value::Null => serde_json::Value::Null,
        Value::Bool(b) => serde_json::Value::Bool(*b),
        Value::Int(i) => serde_json::Value::Number((*i).into()),
        Value::Float(f) => serde_json::Number::from_f64(*f)
            .map(serde_json::Value::Number)
            .unwrap_or(serde_json::Value::Null),
        Value::Str(s) => serde_json::Value::String(s.clone()),
        Value::Bytes(b) => {
            let mut obj = serde_json::Map::new();
            obj.insert(
                BYTES_MARKER.to_string(),
                serde_json::Value::String(base64::engine::general_purpose::STANDARD.encode(b)),
            );
            serde_json::Value::Object(obj)
        }
        Value::List(items) => serde_json::Value::Array(items.iter().map(value_to_json).collect()),
        Value::Map(map) => {
            let mut obj = serde_json::Map::new();
            for (k, v) in map {
                obj.insert(k.clone(), value_to_json(v));
            }
            serde_json::Value::Object(obj)
        }
    }
}

pub fn json_to_value(value: &serde_json::Value) -> Value {
    match value {
        serde_json::Value::Null => Value::Null,
        serde_json::Value::Bool(b) => Value::Bool(*b),
        serde_json::Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Value::Int(i)
            } else {
                Value::Float(n.as_f64().unwrap_or(0.0))
            }
        }
        serde_json::Value::String(s) => Value::Str(s.clone()),
        serde_json::Value::Array(items) => Value::List(items.iter().map(json_to_value).collect()),
        serde_json::Value::Object(obj) => {
            if obj.len() == 1 {
                if let Some(serde_json::Value::String(b64)) = obj.get(BYTES_MARKER) {
                    if let Ok(bytes) = base64::engine::general_purpose::STANDARD.decode(b64) {
                        return Value::Bytes(bytes);
                    }
                }
            }
            Value::Map(obj.iter().map(|(k, v)| (k.clone(), json_to_value(v))).collect())
        }
    }
}

/// Serialize a document body to bytes. When `use_zlib` is set the JSON is
/// zlib-compressed at a fast level.
pub fn encode(fields: &BTreeMap<String, Value>, use_zlib: bool) -> Result<Vec<u8>, EngineError> {
    let json = serde_json::Value::Object(
        fields
            .iter()
            .map(|(k, v)| (k.clone(), value_to_json(v)))
            .collect(),
    );
    let text = serde_json::to_vec(&json).map_err(|e| EngineError::CorruptBody(e.to_string()))?;
    if use_zlib {
        let mut encoder = ZlibEncoder::new(Vec::new(), Compression::fast());
        encoder
            .write_all(&text)
            .map_err(|e| EngineError::CorruptCompression(e.to_string()))?;
        encoder
            .finish()
            .map_err(|e| EngineError::CorruptCompression(e.to_string()))
    } else {
        Ok(text)
    }
}

/// Inverse of [`encode`]. Does not know about `id`/`updated` — those are
/// overlaid by the caller from the entity row's own columns.
pub fn decode(body: &[u8], use_zlib: bool) -> Result<BTreeMap<String, Value>, EngineError> {
    let text: Vec<u8> = if use_zlib {
        let mut decoder = ZlibDecoder::new(body);
        let mut out = Vec::new();
        decoder
            .read_to_end(&mut out)
            .map_err(|e| EngineError::CorruptCompression(e.to_string()))?;
        out
    } else {
        body.to_vec()
    };
    let json: serde_json::Value =
        serde_json::from_slice(&text).map_err(|e| EngineError::CorruptBody(e.to_string()))?;
    match json {
        serde_json::Value::Object(obj) => {
            Ok(obj.iter().map(|(k, v)| (k.clone(), json_to_value(v))).collect())
        }
        _ => Err(EngineError::CorruptBody(
            "document body is not a JSON object".to_string(),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> BTreeMap<String, Value> {
        let mut m = BTreeMap::new();
        m.insert("first_name".to_string(), Value::Str("evan".to_string()));
        m.insert("count".to_string(), Value::Int(7));
        m.insert(
            "tags".to_string(),
            Value::List(vec![Value::Str("a".to_string()), Value::Null]),
        );
        m
    }

    #[test]
    fn roundtrip_uncompressed() {
        let m = sample();
        let bytes = encode(&m, false).unwrap();
        let back = decode(&bytes, false).unwrap();
        assert_eq!(m, back);
    }

    #[test]
    fn roundtrip_compressed() {
        let m = sample();
        let bytes = encode(&m, true).unwrap();
        let back = decode(&bytes, true).unwrap();
        assert_eq!(m, back);
    }

    #[test]
    fn corrupt_body_is_rejected() {
        assert!(decode(b"not json", false).is_err());
    }

    #[test]
    fn bytes_roundtrip_through_json() {
        let mut m = BTreeMap::new();
        m.insert("blob".to_string(), Value::Bytes(vec![1, 2, 3, 255]));
        let bytes = encode(&m, false).unwrap();
        let back = decode(&bytes, false).unwrap();
        assert_eq!(m, back);
    }
}
