//! Cadence values in their JSON-Cadence interchange form.
//!
//! Script and transaction arguments, script results and event payloads all
//! travel as JSON-Cadence (`{"type": ..., "value": ...}`). Values are kept
//! in that form; helpers cover the handful of shapes flowkit inspects.

use std::fmt::{self, Display};

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::error::Error;
use crate::types::Address;

/// A JSON-Cadence encoded value.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CadenceValue {
    #[serde(rename = "type")]
    pub type_name: String,
    #[serde(default)]
    pub value: Value,
}

impl CadenceValue {
    /// Build a value from a type name and its JSON payload.
    pub fn new(type_name: impl Into<String>, value: Value) -> Self {
        Self {
            type_name: type_name.into(),
            value,
        }
    }

    /// A `String` value.
    pub fn string(s: impl Into<String>) -> Self {
        Self::new("String", Value::String(s.into()))
    }

    /// An `Address` value.
    pub fn address(address: Address) -> Self {
        Self::new("Address", Value::String(address.to_hex_prefixed()))
    }

    /// A `UInt8` value.
    pub fn uint8(v: u8) -> Self {
        Self::new("UInt8", Value::String(v.to_string()))
    }

    /// A `UInt64` value.
    pub fn uint64(v: u64) -> Self {
        Self::new("UInt64", Value::String(v.to_string()))
    }

    /// A `UFix64` value from its decimal string form.
    pub fn ufix64(v: impl Into<String>) -> Self {
        Self::new("UFix64", Value::String(v.into()))
    }

    /// A `Bool` value.
    pub fn bool(v: bool) -> Self {
        Self::new("Bool", Value::Bool(v))
    }

    /// An `Array` value.
    pub fn array(items: Vec<CadenceValue>) -> Self {
        Self::new("Array", Value::Array(items.iter().map(|i| i.to_json()).collect()))
    }

    /// A `Dictionary` value from ordered key/value pairs.
    pub fn dictionary(entries: Vec<(CadenceValue, CadenceValue)>) -> Self {
        let entries = entries
            .iter()
            .map(|(k, v)| json!({ "key": k.to_json(), "value": v.to_json() }))
            .collect();
        Self::new("Dictionary", Value::Array(entries))
    }

    /// JSON form of the value.
    pub fn to_json(&self) -> Value {
        json!({ "type": self.type_name, "value": self.value })
    }

    /// Encoded JSON bytes, as sent on the wire.
    pub fn to_json_bytes(&self) -> Result<Vec<u8>, Error> {
        Ok(serde_json::to_vec(&self.to_json())?)
    }

    /// Decode a value from JSON bytes.
    pub fn from_json_bytes(bytes: &[u8]) -> Result<Self, Error> {
        Ok(serde_json::from_slice(bytes)?)
    }

    /// Payload as a string, for string-valued scalars.
    pub fn as_str(&self) -> Option<&str> {
        self.value.as_str()
    }

    /// Look up a field of a composite value (struct, resource, event).
    pub fn field(&self, name: &str) -> Option<CadenceValue> {
        self.value
            .get("fields")?
            .as_array()?
            .iter()
            .find(|f| f.get("name").and_then(Value::as_str) == Some(name))
            .and_then(|f| f.get("value"))
            .and_then(|v| serde_json::from_value(v.clone()).ok())
    }

    /// Qualified type id of a composite value.
    pub fn composite_id(&self) -> Option<&str> {
        self.value.get("id").and_then(Value::as_str)
    }

    /// Cadence type annotation for this value, as used in parameter lists.
    pub fn cadence_type(&self) -> Result<String, Error> {
        match self.type_name.as_str() {
            "Optional" => {
                if self.value.is_null() {
                    return Err(Error::InvalidArgument(
                        "cannot infer the type of a nil optional".to_string(),
                    ));
                }
                let inner: CadenceValue = serde_json::from_value(self.value.clone())?;
                Ok(format!("{}?", inner.cadence_type()?))
            }
            "Array" => {
                let first = self
                    .value
                    .as_array()
                    .and_then(|items| items.first())
                    .ok_or_else(|| {
                        Error::InvalidArgument(
                            "cannot infer the element type of an empty array".to_string(),
                        )
                    })?;
                let inner: CadenceValue = serde_json::from_value(first.clone())?;
                Ok(format!("[{}]", inner.cadence_type()?))
            }
            "Dictionary" => {
                let entry = self
                    .value
                    .as_array()
                    .and_then(|items| items.first())
                    .ok_or_else(|| {
                        Error::InvalidArgument(
                            "cannot infer the type of an empty dictionary".to_string(),
                        )
                    })?;
                let key: CadenceValue = serde_json::from_value(entry["key"].clone())?;
                let value: CadenceValue = serde_json::from_value(entry["value"].clone())?;
                Ok(format!("{{{}: {}}}", key.cadence_type()?, value.cadence_type()?))
            }
            "Path" => match self.value.get("domain").and_then(Value::as_str) {
                Some("storage") => Ok("StoragePath".to_string()),
                Some("public") => Ok("PublicPath".to_string()),
                Some("private") => Ok("PrivatePath".to_string()),
                _ => Ok("Path".to_string()),
            },
            "Struct" | "Resource" | "Event" | "Contract" | "Enum" => self
                .composite_id()
                .map(str::to_string)
                .ok_or_else(|| Error::InvalidArgument("composite value without id".to_string())),
            other => Ok(other.to_string()),
        }
    }
}

impl Display for CadenceValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.value {
            Value::String(s) if self.type_name == "String" => write!(f, "\"{}\"", s),
            Value::String(s) => f.write_str(s),
            Value::Null => f.write_str("nil"),
            other => write!(f, "{}", other),
        }
    }
}

// ============================================================================
// Argument Parsing
// ============================================================================

/// Parse a JSON array of JSON-Cadence values.
pub fn parse_json_arguments(raw: &str) -> Result<Vec<CadenceValue>, Error> {
    serde_json::from_str(raw)
        .map_err(|e| Error::InvalidArgument(format!("arguments are not valid JSON-Cadence: {}", e)))
}

/// Parse a `Type:Value` shorthand argument such as `UInt64:42` or
/// `Address:0x01`.
///
/// Only scalar types can be expressed this way; use JSON-Cadence for
/// anything else.
pub fn parse_shorthand_argument(raw: &str) -> Result<CadenceValue, Error> {
    let (type_name, value) = raw
        .split_once(':')
        .ok_or_else(|| Error::InvalidArgument(format!("argument '{}' is not in Type:Value form", raw)))?;

    let value = value.trim();
    let parsed = match type_name.trim() {
        "String" => CadenceValue::string(value),
        "Bool" => match value {
            "true" => CadenceValue::bool(true),
            "false" => CadenceValue::bool(false),
            _ => {
                return Err(Error::InvalidArgument(format!(
                    "'{}' is not a valid Bool",
                    value
                )));
            }
        },
        "Address" => CadenceValue::address(value.parse()?),
        "UFix64" | "Fix64" => {
            let Some((int, frac)) = value.split_once('.') else {
                return Err(Error::InvalidArgument(format!(
                    "fixed point value '{}' must contain a decimal point",
                    value
                )));
            };
            if frac.len() > 8 || frac.is_empty() || int.is_empty() {
                return Err(Error::InvalidArgument(format!(
                    "'{}' is not a valid fixed point value",
                    value
                )));
            }
            CadenceValue::new(type_name.trim(), Value::String(value.to_string()))
        }
        t @ ("Int" | "Int8" | "Int16" | "Int32" | "Int64" | "Int128" | "Int256") => {
            value
                .parse::<i128>()
                .map_err(|_| Error::InvalidArgument(format!("'{}' is not a valid {}", value, t)))?;
            CadenceValue::new(t, Value::String(value.to_string()))
        }
        t @ ("UInt" | "UInt8" | "UInt16" | "UInt32" | "UInt64" | "UInt128" | "UInt256"
        | "Word8" | "Word16" | "Word32" | "Word64") => {
            value
                .parse::<u128>()
                .map_err(|_| Error::InvalidArgument(format!("'{}' is not a valid {}", value, t)))?;
            CadenceValue::new(t, Value::String(value.to_string()))
        }
        other => {
            return Err(Error::InvalidArgument(format!(
                "type '{}' is not supported in Type:Value form, use JSON-Cadence instead",
                other
            )));
        }
    };
    Ok(parsed)
}
