//! JSON and CSV renderings of replies, browsed values and key listings.
//!
//! Byte strings that are not valid UTF-8 are written as `0x` followed by their hex encoding.

use std::borrow::Cow;
use std::fmt::Write as _;

use serde_json::{json, Map, Value as Json};

use crate::browser::{KeyInfo, Ttl, Value};
use crate::frame::{format_double, Frame};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, strum_macros::Display, strum_macros::EnumString)]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum ExportFormat {
    #[default]
    Json,
    Csv,
}

impl ExportFormat {
    pub fn reply(self, reply: &Frame) -> String {
        match self {
            ExportFormat::Json => to_pretty(&reply_to_json(reply)),
            ExportFormat::Csv => reply_to_csv(reply),
        }
    }

    pub fn value(self, value: &Value) -> String {
        match self {
            ExportFormat::Json => to_pretty(&value_to_json(value)),
            ExportFormat::Csv => value_to_csv(value),
        }
    }

    /// Like [`ExportFormat::value`] for a page that starts at list index `first_index`.
    pub fn value_at(self, value: &Value, first_index: u64) -> String {
        match self {
            ExportFormat::Json => to_pretty(&value_to_json(value)),
            ExportFormat::Csv => value_to_csv_at(value, first_index),
        }
    }

    pub fn keys(self, keys: &[KeyInfo]) -> String {
        match self {
            ExportFormat::Json => to_pretty(&keys_to_json(keys)),
            ExportFormat::Csv => keys_to_csv(keys),
        }
    }
}

fn to_pretty(value: &Json) -> String {
    serde_json::to_string_pretty(value).unwrap_or_else(|_| "null".to_string())
}

/// Text form of a byte string: the string itself when it is UTF-8, `0x…` hex otherwise.
pub fn bytes_to_text(bytes: &[u8]) -> Cow<'_, str> {
    match std::str::from_utf8(bytes) {
        Ok(text) => Cow::Borrowed(text),
        Err(_) => Cow::Owned(format!("0x{}", hex::encode(bytes))),
    }
}

pub fn reply_to_json(reply: &Frame) -> Json {
    match reply {
        Frame::Simple(s) => Json::String(s.clone()),
        Frame::Error(msg) => json!({ "error": msg }),
        Frame::Integer(i) => json!(i),
        Frame::Bulk(bytes) => Json::String(bytes_to_text(bytes).into_owned()),
        Frame::Null => Json::Null,
        Frame::Double(d) => double_to_json(*d),
        Frame::Boolean(b) => Json::Bool(*b),
        Frame::BigNumber(n) => Json::String(n.clone()),
        Frame::Verbatim { text, .. } => Json::String(bytes_to_text(text).into_owned()),
        Frame::Array(items) | Frame::Set(items) | Frame::Push(items) => {
            Json::Array(items.iter().map(reply_to_json).collect())
        }
        Frame::Map(pairs) => {
            let mut object = Map::with_capacity(pairs.len());
            for (key, value) in pairs {
                object.insert(map_key(key), reply_to_json(value));
            }
            Json::Object(object)
        }
    }
}

fn map_key(key: &Frame) -> String {
    match key {
        Frame::Simple(s) | Frame::BigNumber(s) => s.clone(),
        Frame::Bulk(bytes) => bytes_to_text(bytes).into_owned(),
        Frame::Integer(i) => i.to_string(),
        other => reply_to_json(other).to_string(),
    }
}

fn double_to_json(d: f64) -> Json {
    serde_json::Number::from_f64(d)
        .map(Json::Number)
        .unwrap_or_else(|| Json::String(format_double(d)))
}

fn text(bytes: &[u8]) -> Json {
    Json::String(bytes_to_text(bytes).into_owned())
}

pub fn value_to_json(value: &Value) -> Json {
    match value {
        Value::String(bytes) => text(bytes),
        Value::List(items) | Value::Set(items) => Json::Array(items.iter().map(|b| text(b)).collect()),
        Value::Hash(pairs) => {
            let mut object = Map::with_capacity(pairs.len());
            for (field, value) in pairs {
                object.insert(bytes_to_text(field).into_owned(), text(value));
            }
            Json::Object(object)
        }
        Value::ZSet(members) => Json::Array(
            members
                .iter()
                .map(|(member, score)| json!({ "member": text(member), "score": double_to_json(*score) }))
                .collect(),
        ),
        Value::Stream(entries) => Json::Array(
            entries
                .iter()
                .map(|entry| {
                    let mut fields = Map::with_capacity(entry.fields.len());
                    for (field, value) in &entry.fields {
                        fields.insert(bytes_to_text(field).into_owned(), text(value));
                    }
                    json!({ "id": entry.id, "fields": fields })
                })
                .collect(),
        ),
    }
}

pub fn keys_to_json(keys: &[KeyInfo]) -> Json {
    Json::Array(
        keys.iter()
            .map(|info| {
                json!({
                    "key": bytes_to_text(&info.key),
                    "type": info.kind.as_str(),
                    "ttl": ttl_seconds(&info.ttl),
                    "size": info.approximate_size,
                })
            })
            .collect(),
    )
}

fn ttl_seconds(ttl: &Ttl) -> Option<u64> {
    match ttl {
        Ttl::Persistent => None,
        Ttl::Expires(d) => Some(d.as_secs()),
    }
}

/// One CSV table per value type: `value`, `index,value`, `member`, `field,value`,
/// `member,score` or `id,field,value`.
pub fn value_to_csv(value: &Value) -> String {
    value_to_csv_at(value, 0)
}

/// [`value_to_csv`] for a later page: list indexes count from `first_index`.
pub fn value_to_csv_at(value: &Value, first_index: u64) -> String {
    let mut csv = Csv::default();
    match value {
        Value::String(bytes) => {
            csv.row(["value"]);
            csv.row([bytes_to_text(bytes)]);
        }
        Value::List(items) => {
            csv.row(["index", "value"]);
            for (index, item) in (first_index..).zip(items) {
                csv.row([Cow::Owned(index.to_string()), bytes_to_text(item)]);
            }
        }
        Value::Set(items) => {
            csv.row(["member"]);
            for item in items {
                csv.row([bytes_to_text(item)]);
            }
        }
        Value::Hash(pairs) => {
            csv.row(["field", "value"]);
            for (field, value) in pairs {
                csv.row([bytes_to_text(field), bytes_to_text(value)]);
            }
        }
        Value::ZSet(members) => {
            csv.row(["member", "score"]);
            for (member, score) in members {
                csv.row([bytes_to_text(member), Cow::Owned(format_double(*score))]);
            }
        }
        Value::Stream(entries) => {
            csv.row(["id", "field", "value"]);
            for entry in entries {
                for (field, value) in &entry.fields {
                    csv.row([
                        Cow::Borrowed(entry.id.as_str()),
                        bytes_to_text(field),
                        bytes_to_text(value),
                    ]);
                }
            }
        }
    }
    csv.finish()
}

pub fn keys_to_csv(keys: &[KeyInfo]) -> String {
    let mut csv = Csv::default();
    csv.row(["key", "type", "ttl", "size"]);
    for info in keys {
        csv.row([
            bytes_to_text(&info.key),
            Cow::Borrowed(info.kind.as_str()),
            Cow::Owned(ttl_seconds(&info.ttl).map(|s| s.to_string()).unwrap_or_default()),
            Cow::Owned(info.approximate_size.map(|s| s.to_string()).unwrap_or_default()),
        ]);
    }
    csv.finish()
}

/// Maps become `key,value` rows, arrays of arrays one row per inner array, other arrays one
/// cell per row, and scalars a single cell.
pub fn reply_to_csv(reply: &Frame) -> String {
    let mut csv = Csv::default();
    match reply {
        Frame::Map(pairs) => {
            csv.row(["key", "value"]);
            for (key, value) in pairs {
                csv.row([cell(key), cell(value)]);
            }
        }
        Frame::Array(items) | Frame::Set(items) | Frame::Push(items) => {
            for item in items {
                match item {
                    Frame::Array(inner) | Frame::Set(inner) => {
                        csv.row(inner.iter().map(cell));
                    }
                    scalar => csv.row([cell(scalar)]),
                }
            }
        }
        scalar => csv.row([cell(scalar)]),
    }
    csv.finish()
}

fn cell(frame: &Frame) -> Cow<'_, str> {
    match frame {
        Frame::Simple(s) | Frame::BigNumber(s) => Cow::Borrowed(s.as_str()),
        Frame::Error(msg) => Cow::Owned(format!("ERROR: {}", msg)),
        Frame::Bulk(bytes) | Frame::Verbatim { text: bytes, .. } => bytes_to_text(bytes),
        Frame::Integer(i) => Cow::Owned(i.to_string()),
        Frame::Double(d) => Cow::Owned(format_double(*d)),
        Frame::Boolean(b) => Cow::Owned(b.to_string()),
        Frame::Null => Cow::Borrowed(""),
        aggregate => Cow::Owned(reply_to_json(aggregate).to_string()),
    }
}

#[derive(Default)]
struct Csv {
    out: String,
}

impl Csv {
    fn row<I, S>(&mut self, cells: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        for (index, cell) in cells.into_iter().enumerate() {
            if index > 0 {
                self.out.push(',');
            }
            write_field(&mut self.out, cell.as_ref());
        }
        self.out.push_str("\r\n");
    }

    fn finish(self) -> String {
        self.out
    }
}

/// RFC 4180 quoting: fields containing a comma, quote or line break are enclosed in quotes,
/// with embedded quotes doubled.
fn write_field(out: &mut String, field: &str) {
    let needs_quotes = field
        .chars()
        .any(|c| matches!(c, ',' | '"' | '\r' | '\n'))
        || field.starts_with(' ')
        || field.ends_with(' ');
    if needs_quotes {
        let _ = write!(out, "\"{}\"", field.replace('"', "\"\""));
    } else {
        out.push_str(field);
    }
}
