//! Legacy-compatible hashing and canonical serialization.
//!
//! Mesh hashes, Merkle roots and mined block hashes are compared bit-for-bit
//! with data produced by older nodes, so they use SHA-256 rendered as
//! lowercase hex, computed over a canonical JSON text:
//!
//! - object keys sorted by code point
//! - `", "` between items and `": "` between key and value
//! - every non-ASCII character escaped as `\uXXXX` (UTF-16 units, lowercase)

use crate::error::Result;
use serde::ser::{SerializeMap, SerializeSeq};
use serde::{Serialize, Serializer};
use serde_json::ser::Formatter;
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::io::{self, Write};

/// SHA-256 of `data` as lowercase hex.
pub fn sha256_hex(data: impl AsRef<[u8]>) -> String {
    hex::encode(Sha256::digest(data.as_ref()))
}

/// SHA-256 of `data` as raw bytes.
pub fn sha256(data: impl AsRef<[u8]>) -> [u8; 32] {
    Sha256::digest(data.as_ref()).into()
}

/// Canonical JSON text for a JSON value.
pub fn canonical_json(value: &Value) -> Result<String> {
    let mut out = Vec::with_capacity(128);
    let mut ser = serde_json::Serializer::with_formatter(&mut out, LegacyFormatter);
    SortedValue(value).serialize(&mut ser)?;
    // The formatter only ever emits ASCII.
    Ok(String::from_utf8_lossy(&out).into_owned())
}

/// Canonical JSON text for any serializable value.
pub fn canonical_json_of<T: Serialize>(value: &T) -> Result<String> {
    let value = serde_json::to_value(value)?;
    canonical_json(&value)
}

/// Formatter reproducing the legacy separators and ASCII escaping.
struct LegacyFormatter;

impl Formatter for LegacyFormatter {
    fn begin_array_value<W>(&mut self, writer: &mut W, first: bool) -> io::Result<()>
    where
        W: ?Sized + Write,
    {
        if first {
            Ok(())
        } else {
            writer.write_all(b", ")
        }
    }

    fn begin_object_key<W>(&mut self, writer: &mut W, first: bool) -> io::Result<()>
    where
        W: ?Sized + Write,
    {
        if first {
            Ok(())
        } else {
            writer.write_all(b", ")
        }
    }

    fn begin_object_value<W>(&mut self, writer: &mut W) -> io::Result<()>
    where
        W: ?Sized + Write,
    {
        writer.write_all(b": ")
    }

    fn write_string_fragment<W>(&mut self, writer: &mut W, fragment: &str) -> io::Result<()>
    where
        W: ?Sized + Write,
    {
        if fragment.is_ascii() {
            return writer.write_all(fragment.as_bytes());
        }
        let mut units = [0u16; 2];
        for ch in fragment.chars() {
            if ch.is_ascii() {
                writer.write_all(&[ch as u8])?;
            } else {
                for unit in ch.encode_utf16(&mut units) {
                    write!(writer, "\\u{:04x}", unit)?;
                }
            }
        }
        Ok(())
    }
}

/// Serializes a JSON value with object keys in sorted order regardless of
/// how the underlying map preserves insertion order.
struct SortedValue<'a>(&'a Value);

impl Serialize for SortedValue<'_> {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match self.0 {
            Value::Object(map) => {
                let mut entries: Vec<(&String, &Value)> = map.iter().collect();
                entries.sort_by(|a, b| a.0.cmp(b.0));
                let mut out = serializer.serialize_map(Some(entries.len()))?;
                for (key, value) in entries {
                    out.serialize_entry(key, &SortedValue(value))?;
                }
                out.end()
            }
            Value::Array(items) => {
                let mut out = serializer.serialize_seq(Some(items.len()))?;
                for item in items {
                    out.serialize_element(&SortedValue(item))?;
                }
                out.end()
            }
            other => other.serialize(serializer),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_sha256_hex_known_vector() {
        assert_eq!(
            sha256_hex(b"abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn test_canonical_json_sorts_and_spaces() {
        let value = json!({"b": 1, "a": [1, 2], "c": {"z": true, "y": null}});
        assert_eq!(
            canonical_json(&value).unwrap(),
            r#"{"a": [1, 2], "b": 1, "c": {"y": null, "z": true}}"#
        );
    }

    #[test]
    fn test_canonical_json_escapes_non_ascii() {
        let value = json!({"city": "Zürich", "note": "📦"});
        assert_eq!(
            canonical_json(&value).unwrap(),
            r#"{"city": "Z\u00fcrich", "note": "\ud83d\udce6"}"#
        );
    }

    #[test]
    fn test_canonical_json_floats() {
        let value = json!({"amount": 1.0, "fee": 0.25});
        assert_eq!(
            canonical_json(&value).unwrap(),
            r#"{"amount": 1.0, "fee": 0.25}"#
        );
    }

    #[test]
    fn test_canonical_json_of_struct() {
        #[derive(Serialize)]
        struct Header {
            version: u32,
            mode: &'static str,
        }
        let text = canonical_json_of(&Header {
            version: 1,
            mode: "mesh",
        })
        .unwrap();
        assert_eq!(text, r#"{"mode": "mesh", "version": 1}"#);
    }
}
