//! Stable string form of argument values for loose matching

use crate::value::Value;
use serde_json::{Map, Number};

/// Marker produced for values that have no stable serialized form
pub const UNSERIALIZABLE: &str = "[unserializable]";

/// Turns a value into a deterministic string.
///
/// Implementations must not fail: values without a stable form map to a
/// marker such as [`UNSERIALIZABLE`].
pub trait ArgSerializer: Send + Sync {
    fn serialize(&self, value: &Value) -> String;
}

/// JSON rendering via `serde_json`.
///
/// Object fields are emitted in key order. Functions nested in a list become
/// `null` and functions held in object fields are skipped. A function at the top
/// level or any cycle yields [`UNSERIALIZABLE`].
#[derive(Debug, Default, Clone, Copy)]
pub struct JsonSerializer;

impl ArgSerializer for JsonSerializer {
    fn serialize(&self, value: &Value) -> String {
        match value {
            Value::Undefined => "undefined".to_string(),
            Value::Function(_) => UNSERIALIZABLE.to_string(),
            _ => match to_json(value, &mut Vec::new()) {
                Ok(Some(json)) => json.to_string(),
                Ok(None) | Err(Cycle) => UNSERIALIZABLE.to_string(),
            },
        }
    }
}

struct Cycle;

/// `Ok(None)` means the value is skipped (functions).
fn to_json(
    value: &Value,
    path: &mut Vec<usize>,
) -> std::result::Result<Option<serde_json::Value>, Cycle> {
    let json = match value {
        Value::Undefined | Value::Null => serde_json::Value::Null,
        Value::Bool(b) => serde_json::Value::Bool(*b),
        Value::Int(i) => serde_json::Value::Number(Number::from(*i)),
        Value::Float(f) => Number::from_f64(*f)
            .map(serde_json::Value::Number)
            .unwrap_or(serde_json::Value::Null),
        Value::Str(s) => serde_json::Value::String(s.to_string()),
        Value::Function(_) => return Ok(None),
        Value::List(list) => {
            let addr = list.addr();
            if path.contains(&addr) {
                return Err(Cycle);
            }
            path.push(addr);
            let mut items = Vec::with_capacity(list.len());
            for item in list.to_vec() {
                items.push(to_json(&item, path)?.unwrap_or(serde_json::Value::Null));
            }
            path.pop();
            serde_json::Value::Array(items)
        }
        Value::Object(object) => {
            let addr = object.addr();
            if path.contains(&addr) {
                return Err(Cycle);
            }
            path.push(addr);
            let mut map = Map::new();
            for (key, field) in object.fields() {
                if let Some(json) = to_json(&field, path)? {
                    map.insert(key, json);
                }
            }
            path.pop();
            serde_json::Value::Object(map)
        }
    };
    Ok(Some(json))
}
