//! Normalization of loosely typed admission input.
//!
//! Clients send classes as an id string, an object carrying the id under
//! `_id`/`id`/`value` (possibly as extended JSON `{"$oid": ...}`), a free
//! text name, or a list of any of those. Amounts arrive as numbers or
//! numeric strings. Everything is converted to typed values here.

use chrono::{DateTime, NaiveDate, Utc};
use mongodb::bson::oid::ObjectId;
use serde::{de::Error as _, Deserialize, Deserializer};
use serde_json::Value;

use crate::models::{ClassRef, ClassSelection};

const ID_KEYS: [&str; 4] = ["_id", "id", "value", "$oid"];
const NAME_KEYS: [&str; 3] = ["name", "label", "class_name"];

fn text_ref(raw: &str) -> Option<ClassRef> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    if raw.len() == 24 {
        if let Ok(id) = ObjectId::parse_str(raw) {
            return Some(ClassRef::Id(id));
        }
    }
    Some(ClassRef::Name(raw.to_string()))
}

fn collect_refs(value: &Value, out: &mut Vec<ClassRef>) {
    match value {
        Value::String(s) => out.extend(text_ref(s)),
        Value::Array(items) => {
            for item in items {
                collect_refs(item, out);
            }
        }
        Value::Object(map) => {
            let before = out.len();
            for key in ID_KEYS {
                if let Some(inner) = map.get(key) {
                    collect_refs(inner, out);
                    if out.len() > before {
                        return;
                    }
                }
            }
            for key in NAME_KEYS {
                if let Some(Value::String(name)) = map.get(key) {
                    if let Some(name) = text_ref(name) {
                        out.push(name);
                        return;
                    }
                }
            }
        }
        _ => {}
    }
}

/// Turn any accepted class shape into a de-duplicated selection.
pub fn class_selection(value: &Value) -> ClassSelection {
    let mut refs = Vec::new();
    collect_refs(value, &mut refs);

    let mut unique: Vec<ClassRef> = Vec::with_capacity(refs.len());
    for r in refs {
        if !unique.contains(&r) {
            unique.push(r);
        }
    }
    ClassSelection { refs: unique }
}

/// Number or numeric string; missing, null and blank are zero.
pub fn lenient_f64<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<Value>::deserialize(deserializer)? {
        None | Some(Value::Null) => Ok(0.0),
        Some(Value::Number(n)) => n
            .as_f64()
            .ok_or_else(|| D::Error::custom(format!("invalid amount: {}", n))),
        Some(Value::String(s)) if s.trim().is_empty() => Ok(0.0),
        Some(Value::String(s)) => s
            .trim()
            .parse::<f64>()
            .map_err(|_| D::Error::custom(format!("invalid amount: {}", s))),
        Some(other) => Err(D::Error::custom(format!("invalid amount: {}", other))),
    }
}

/// RFC 3339 timestamp or plain `YYYY-MM-DD` date.
pub fn lenient_date<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = match Option::<String>::deserialize(deserializer)? {
        Some(raw) if !raw.trim().is_empty() => raw,
        _ => return Ok(None),
    };
    let raw = raw.trim();
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Ok(Some(ts.with_timezone(&Utc)));
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|dt| Some(dt.and_utc()))
        .ok_or_else(|| D::Error::custom(format!("invalid date: {}", raw)))
}
